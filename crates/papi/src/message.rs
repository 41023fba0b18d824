//! 폴링 메시지 모델과 디코딩
//!
//! 전송 계층은 [`PollEvent`] (요청 ID + JSON 문자열)를 전달하고,
//! [`decode`]가 이를 헤더와 본문으로 나눈 [`Message`]로 변환합니다.
//!
//! ```json
//! {
//!   "header": {
//!     "operation_type": "decision",
//!     "operation_cmd": "delete",
//!     "timestamp": "2024-03-01T10:00:00Z",
//!     "message": "",
//!     "uuid": "...",
//!     "source": { "user": "console" },
//!     "destination": ""
//!   },
//!   "data": { ... }
//! }
//! ```

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PapiError;

/// 전송 계층이 전달하는 원시 이벤트
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollEvent {
    /// 요청 ID (로그 상관관계용)
    pub request_id: String,
    /// JSON 문자열 페이로드
    pub data: String,
}

impl PollEvent {
    /// 새 이벤트를 생성합니다.
    pub fn new(request_id: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            data: data.into(),
        }
    }
}

/// 메시지 발신자
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Source {
    /// 사용자
    pub user: String,
}

/// 메시지 헤더
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Header {
    /// operation 종류 (`decision`, `alert`, `management`)
    pub operation_type: String,
    /// operation 명령 (`add`, `delete`, ...)
    pub operation_cmd: String,
    /// 발행 시각
    pub timestamp: Option<DateTime<Utc>>,
    /// 사람이 읽는 메시지
    pub message: String,
    /// 메시지 UUID
    pub uuid: String,
    /// 발신자
    pub source: Option<Source>,
    /// 수신 대상
    pub destination: String,
}

/// 원시 메시지 (헤더가 선택적)
#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default, alias = "Header")]
    header: Option<Header>,
    #[serde(default, alias = "Data")]
    data: serde_json::Value,
}

/// 검증된 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// 헤더 (source 존재가 보장됨)
    pub header: Header,
    /// 본문
    pub data: serde_json::Value,
}

impl Message {
    /// operation 종류
    pub fn operation(&self) -> Result<OperationType, PapiError> {
        self.header.operation_type.parse()
    }

    /// 발신 사용자
    pub fn source_user(&self) -> &str {
        self.header
            .source
            .as_ref()
            .map(|s| s.user.as_str())
            .unwrap_or_default()
    }
}

/// operation 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationType {
    /// 결정 추가/삭제
    Decision,
    /// 알림 추가
    Alert,
    /// 엔진 관리
    Management,
}

impl OperationType {
    /// 소문자 이름
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Decision => "decision",
            Self::Alert => "alert",
            Self::Management => "management",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationType {
    type Err = PapiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "decision" => Ok(Self::Decision),
            "alert" => Ok(Self::Alert),
            "management" => Ok(Self::Management),
            other => Err(PapiError::UnknownOperation(other.to_owned())),
        }
    }
}

/// 삭제된 결정
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Decision {
    /// 결정 UUID
    pub uuid: String,
    /// 출처 (`cscli`, `console`, ...)
    pub origin: String,
    /// 범위 (`Ip`, `Range`, ...)
    pub scope: String,
    /// 값
    pub value: String,
}

impl Decision {
    /// UUID만 가진 결정을 생성합니다.
    pub fn with_uuid(uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            ..Self::default()
        }
    }
}

/// 폴링 이벤트를 검증된 메시지로 디코딩합니다.
///
/// # Errors
/// - JSON 형식 불일치
/// - 헤더 또는 source 누락
pub fn decode(event: &PollEvent) -> Result<Message, PapiError> {
    let raw: RawMessage = serde_json::from_str(&event.data)
        .map_err(|e| PapiError::Decode(format!("{}: {e}", event.data)))?;

    let header = raw.header.ok_or(PapiError::MissingHeader)?;
    if header.source.is_none() {
        return Err(PapiError::MissingSource);
    }

    Ok(Message {
        header,
        data: raw.data,
    })
}
