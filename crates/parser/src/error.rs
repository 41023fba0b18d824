//! 파서 에러 타입
//!
//! [`ParserError`]는 노드/화이트리스트/정적 할당의 컴파일 단계와
//! 이벤트 처리 단계에서 발생하는 에러를 모두 표현합니다.
//! `From<ParserError> for BulwarkError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 전파할 수 있습니다.

use bulwark_core::error::{BulwarkError, PipelineError};

/// 파서 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum ParserError {
    /// 표현식 컴파일 실패
    #[error("expression compile error: '{expr}': {reason}")]
    ExprCompile {
        /// 표현식 원문
        expr: String,
        /// 실패 사유
        reason: String,
    },

    /// 표현식 실행 실패
    #[error("expression eval error: '{expr}': {reason}")]
    ExprEval {
        /// 표현식 원문
        expr: String,
        /// 실패 사유
        reason: String,
    },

    /// 화이트리스트 컴파일 실패 (IP, CIDR, 표현식)
    #[error("parsing whitelist: {0}")]
    Whitelist(String),

    /// 정적 할당 설정 오류 (대상/값 소스 누락 또는 중복, 알 수 없는 경로)
    #[error("invalid static: {0}")]
    StaticConfig(String),

    /// 정적 할당 표현식이 변환할 수 없는 타입을 반환함
    #[error("unexpected return type for '{expr}': {type_name}")]
    StaticValue {
        /// 표현식 원문
        expr: String,
        /// 반환 타입 이름
        type_name: String,
    },

    /// 노드 설정 오류
    #[error("node '{node}': {reason}")]
    NodeConfig {
        /// 노드 이름
        node: String,
        /// 사유
        reason: String,
    },

    /// 노드 파일 로딩 실패
    #[error("node load error: {path}: {reason}")]
    NodeLoad {
        /// 파일 또는 디렉토리 경로
        path: String,
        /// 로딩 실패 사유
        reason: String,
    },

    /// 보강(enrichment) 함수 실패
    #[error("enricher '{method}' failed: {reason}")]
    Enrich {
        /// 메서드 이름
        method: String,
        /// 실패 사유
        reason: String,
    },

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 정규식 컴파일 에러
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    /// JSON 직렬화 에러
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ParserError {
    /// 로딩/컴파일 단계 에러인지 여부
    pub fn is_compile_time(&self) -> bool {
        matches!(
            self,
            Self::ExprCompile { .. }
                | Self::Whitelist(_)
                | Self::StaticConfig(_)
                | Self::NodeConfig { .. }
                | Self::NodeLoad { .. }
                | Self::Config { .. }
                | Self::Regex(_)
        )
    }
}

impl From<ParserError> for BulwarkError {
    fn from(err: ParserError) -> Self {
        if err.is_compile_time() {
            BulwarkError::Pipeline(PipelineError::Compile(err.to_string()))
        } else {
            BulwarkError::Pipeline(PipelineError::Evaluation(err.to_string()))
        }
    }
}
