//! 동기화 클라이언트 에러 타입
//!
//! [`PapiError`]는 체크포인트 저장소, 롱폴링 전송 계층, 메시지 디코딩,
//! 삭제 결정 전송에서 발생하는 에러를 표현합니다.
//! `From<PapiError> for BulwarkError` 변환이 구현되어 있습니다.

use bulwark_core::error::{BulwarkError, SyncError};

/// 동기화 도메인 에러
#[derive(Debug, thiserror::Error)]
pub enum PapiError {
    /// 체크포인트 저장소 에러
    #[error("checkpoint store error: {0}")]
    Checkpoint(String),

    /// 체크포인트 값 파싱 실패
    #[error("failed to parse last timestamp '{value}': {reason}")]
    CheckpointParse {
        /// 저장된 원문
        value: String,
        /// 실패 사유
        reason: String,
    },

    /// 롱폴링 전송 계층 에러
    #[error("transport error: {0}")]
    Transport(String),

    /// 메시지 형식 불일치
    #[error("polling message format is not compatible: {0}")]
    Decode(String),

    /// 헤더 없음
    #[error("no header in message, skipping")]
    MissingHeader,

    /// 헤더에 source 사용자 없음
    #[error("no source user in header message, skipping")]
    MissingSource,

    /// 알 수 없는 operation
    #[error("operation '{0}' unknown, continue")]
    UnknownOperation(String),

    /// operation 핸들러 실패
    #[error("'{operation} {cmd}' failed: {reason}")]
    Handler {
        /// operation 종류
        operation: String,
        /// operation 명령
        cmd: String,
        /// 실패 사유
        reason: String,
    },

    /// 원격 API 호출 실패
    #[error("api error: {0}")]
    Api(String),

    /// 원격 API 호출 타임아웃
    #[error("api call timed out after {timeout_secs}s")]
    Timeout {
        /// 타임아웃 (초)
        timeout_secs: u64,
    },

    /// 채널 에러
    #[error("channel error: {0}")]
    Channel(String),

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

    /// JSON 직렬화 에러
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PapiError {
    /// 이벤트 단위 에러인지 여부 (로그만 남기고 다음 이벤트로 진행)
    pub fn is_per_event(&self) -> bool {
        matches!(
            self,
            Self::Decode(_)
                | Self::MissingHeader
                | Self::MissingSource
                | Self::UnknownOperation(_)
                | Self::Handler { .. }
        )
    }
}

impl From<PapiError> for BulwarkError {
    fn from(err: PapiError) -> Self {
        match err {
            PapiError::CheckpointParse { .. } | PapiError::Config { .. } => {
                BulwarkError::Sync(SyncError::Startup(err.to_string()))
            }
            PapiError::Io(e) => BulwarkError::Io(e),
            other => BulwarkError::Sync(SyncError::Transport(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_errors_are_per_event() {
        assert!(PapiError::MissingHeader.is_per_event());
        assert!(PapiError::MissingSource.is_per_event());
        assert!(PapiError::UnknownOperation("bogus".to_owned()).is_per_event());
        assert!(!PapiError::Transport("reset".to_owned()).is_per_event());
    }

    #[test]
    fn unknown_operation_display() {
        let err = PapiError::UnknownOperation("bogus".to_owned());
        assert_eq!(err.to_string(), "operation 'bogus' unknown, continue");
    }

    #[test]
    fn checkpoint_parse_is_startup_error() {
        let err: BulwarkError = PapiError::CheckpointParse {
            value: "yesterday".to_owned(),
            reason: "input contains invalid characters".to_owned(),
        }
        .into();
        assert!(matches!(err, BulwarkError::Sync(SyncError::Startup(_))));
    }

    #[test]
    fn api_error_is_transport_error() {
        let err: BulwarkError = PapiError::Api("503".to_owned()).into();
        assert!(matches!(err, BulwarkError::Sync(SyncError::Transport(_))));
    }
}
