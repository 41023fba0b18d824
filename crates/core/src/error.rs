//! 에러 타입 -- 도메인별 에러 정의

/// Bulwark 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum BulwarkError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 파서 파이프라인 처리 에러
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// 동기화(sync) 클라이언트 에러
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 파서 파이프라인 에러
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// 노드/화이트리스트/정적 할당 컴파일 실패
    #[error("compile failed: {0}")]
    Compile(String),

    /// 이벤트 처리 중 노드 평가 실패
    #[error("node evaluation failed: {0}")]
    Evaluation(String),
}

/// 동기화 클라이언트 에러
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// 시작 실패 (체크포인트 파싱 등)
    #[error("startup failed: {0}")]
    Startup(String),

    /// 원격 전송 계층 에러
    #[error("transport error: {0}")]
    Transport(String),
}
