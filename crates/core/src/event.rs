//! 이벤트 모델 -- 파서 파이프라인이 처리하는 작업 단위
//!
//! [`Event`]는 원시 로그 라인 하나, 또는 버킷 오버플로우로 합성된 알림 하나를
//! 나타냅니다. 파이프라인의 각 스테이지는 같은 [`Event`] 인스턴스를 변경하며
//! 진행하고, 최종 결과는 `process` 플래그로 표현됩니다.
//!
//! 네 개의 매핑(`parsed`, `meta`, `enriched`, `unmarshaled`)은 소유된 맵이므로
//! 항상 초기화된 상태입니다. `meta`만 외부로 전송될 수 있으며 평탄한
//! 문자열 키/값 쌍만 담아야 합니다.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 로그 이벤트에서 소스 IP를 담는 meta 키
pub const META_SOURCE_IP: &str = "source_ip";

/// 이벤트 종류
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    /// 원시 로그 라인
    #[default]
    Log,
    /// 버킷 오버플로우로 합성된 알림
    Overflow,
    /// 애플리케이션 보안 요청
    Appsec,
}

impl EventType {
    /// 소문자 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Overflow => "overflow",
            Self::Appsec => "appsec",
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 수집기가 읽은 원시 라인
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Line {
    /// 원시 텍스트
    pub raw: String,
    /// 수집 소스 (파일 경로, 소켓 주소 등)
    pub src: String,
    /// 수집 모듈명 (file, syslog, journald ...)
    pub module: String,
    /// 수집 설정에서 부여한 레이블
    pub labels: HashMap<String, String>,
    /// 수집 시각
    pub time: Option<DateTime<Utc>>,
}

/// 오버플로우 알림에 집계된 소스 하나
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Source {
    /// 범위 (Ip, Range, ...)
    pub scope: String,
    /// 범위 내 값 (IP 주소, CIDR 등)
    pub value: String,
}

/// 오버플로우 이벤트의 알림 하위 레코드
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeAlert {
    /// 버킷 맵 키
    pub mapkey: String,
    /// 버킷 ID
    pub bucket_id: String,
    /// 화이트리스트 적중 여부
    pub whitelisted: bool,
    /// 재처리 필요 여부
    pub reprocess: bool,
    /// 집계된 소스 (키: IP 문자열)
    pub sources: BTreeMap<String, Source>,
    /// 원본 알림 페이로드 (불투명 JSON)
    pub alert: Option<serde_json::Value>,
}

/// 파이프라인 작업 단위
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Event {
    /// 이벤트 종류
    pub event_type: EventType,
    /// 현재 스테이지 이름 (빈 문자열은 아직 시작 전)
    pub stage: String,
    /// 모든 스테이지를 통과했는지 여부
    pub process: bool,
    /// 화이트리스트 적중 여부
    pub whitelisted: bool,
    /// 화이트리스트 적중 사유
    pub whitelist_reason: String,
    /// 원시 라인
    pub line: Line,
    /// 파서가 추출한 필드
    pub parsed: HashMap<String, String>,
    /// 외부로 전송 가능한 정규화된 메타데이터
    pub meta: HashMap<String, String>,
    /// 보강(enrichment) 결과
    pub enriched: HashMap<String, String>,
    /// JSON 디코딩된 불투명 페이로드
    pub unmarshaled: serde_json::Map<String, serde_json::Value>,
    /// 오버플로우 알림 (overflow 이벤트 전용)
    pub overflow: RuntimeAlert,
    /// 이벤트 시각
    pub time: Option<DateTime<Utc>>,
    /// 로그에서 추출한 시각 문자열
    pub str_time: String,
    /// `str_time`의 형식 힌트
    pub str_time_format: String,
    /// 정규화된 시각 문자열 (RFC 3339)
    pub marshaled_time: String,
}

impl Event {
    /// 원시 라인으로 로그 이벤트를 생성합니다.
    pub fn from_line(raw: impl Into<String>) -> Self {
        Self {
            line: Line {
                raw: raw.into(),
                ..Line::default()
            },
            ..Self::default()
        }
    }

    /// 오버플로우 알림 이벤트를 생성합니다.
    pub fn overflow(alert: RuntimeAlert) -> Self {
        Self {
            event_type: EventType::Overflow,
            overflow: alert,
            ..Self::default()
        }
    }

    /// 이벤트 종류 이름을 반환합니다.
    pub fn type_name(&self) -> &'static str {
        self.event_type.as_str()
    }

    /// meta 값을 설정합니다.
    pub fn set_meta(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.meta.insert(key.into(), value.into());
    }

    /// parsed 값을 설정합니다.
    pub fn set_parsed(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.parsed.insert(key.into(), value.into());
    }

    /// meta 값을 조회합니다.
    ///
    /// 오버플로우 이벤트는 알림 페이로드에 포함된 원본 이벤트들의 meta에서
    /// 첫 번째로 비어 있지 않은 값을 찾습니다. 값이 없으면 빈 문자열입니다.
    pub fn get_meta(&self, key: &str) -> String {
        match self.event_type {
            EventType::Log => self.meta.get(key).cloned().unwrap_or_default(),
            EventType::Overflow => self
                .overflow
                .alert
                .as_ref()
                .and_then(|alert| alert.get("events"))
                .and_then(|events| events.as_array())
                .into_iter()
                .flatten()
                .filter_map(|evt| evt.get("meta").and_then(|m| m.as_array()))
                .flatten()
                .find_map(|kv| {
                    let matches = kv.get("key").and_then(|k| k.as_str()) == Some(key);
                    kv.get("value")
                        .and_then(|v| v.as_str())
                        .filter(|v| matches && !v.is_empty())
                        .map(str::to_owned)
                })
                .unwrap_or_default(),
            EventType::Appsec => String::new(),
        }
    }

    /// 화이트리스트 검사 대상 소스 IP 목록을 추출합니다.
    ///
    /// - 로그 이벤트: `meta["source_ip"]` 하나
    /// - 오버플로우 이벤트: 집계된 소스의 키 전체
    ///
    /// 파싱할 수 없는 주소는 에러 로그를 남기고 건너뜁니다.
    pub fn parse_ip_sources(&self) -> Vec<IpAddr> {
        match self.event_type {
            EventType::Log => self
                .meta
                .get(META_SOURCE_IP)
                .and_then(|raw| parse_addr(raw))
                .into_iter()
                .collect(),
            EventType::Overflow => self
                .overflow
                .sources
                .keys()
                .filter_map(|raw| parse_addr(raw))
                .collect(),
            EventType::Appsec => Vec::new(),
        }
    }
}

fn parse_addr(raw: &str) -> Option<IpAddr> {
    match raw.parse::<IpAddr>() {
        Ok(addr) => Some(addr),
        Err(e) => {
            tracing::error!(source = raw, error = %e, "failed to parse source ip");
            None
        }
    }
}
