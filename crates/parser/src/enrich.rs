//! 보강(enrichment) 함수 레지스트리
//!
//! 정적 할당의 `method:` 항목은 이름으로 [`Enricher`]를 찾아 호출하며,
//! 반환된 키/값은 모두 `event.enriched`에 병합됩니다.
//! 기본 제공 보강 함수는 다음과 같습니다.
//!
//! - [`ParseDate`]: 시각 문자열을 RFC 3339로 정규화 (빈 입력은 현재 시각)
//! - [`UnmarshalJson`]: JSON 객체를 `event.unmarshaled`에 디코딩

use std::collections::HashMap;
use std::sync::Arc;

use bulwark_core::event::Event;
use chrono::{DateTime, Datelike, NaiveDateTime, TimeZone, Utc};

use crate::error::ParserError;

/// `ParseDate` 메서드 이름 (빈 값에서도 실행되는 유일한 메서드)
pub const PARSE_DATE: &str = "ParseDate";

/// `UnmarshalJSON` 메서드 이름
pub const UNMARSHAL_JSON: &str = "UnmarshalJSON";

/// 보강 함수
pub trait Enricher: Send + Sync {
    /// 등록 이름
    fn name(&self) -> &str;

    /// 값을 받아 보강 결과를 반환합니다. 빈 맵은 에러가 아닙니다.
    fn enrich(&self, value: &str, event: &mut Event)
    -> Result<HashMap<String, String>, ParserError>;
}

/// 이름 → 보강 함수 매핑
#[derive(Clone, Default)]
pub struct EnricherRegistry {
    enrichers: HashMap<String, Arc<dyn Enricher>>,
}

impl EnricherRegistry {
    /// 빈 레지스트리를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 기본 제공 보강 함수가 등록된 레지스트리를 생성합니다.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(ParseDate));
        registry.register(Arc::new(UnmarshalJson));
        registry
    }

    /// 보강 함수를 등록합니다. 같은 이름이 있으면 교체합니다.
    pub fn register(&mut self, enricher: Arc<dyn Enricher>) {
        self.enrichers.insert(enricher.name().to_owned(), enricher);
    }

    /// 이름으로 보강 함수를 찾습니다.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Enricher>> {
        self.enrichers.get(name)
    }

    /// 등록된 이름 목록 (정렬됨)
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.enrichers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for EnricherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnricherRegistry")
            .field("enrichers", &self.names())
            .finish()
    }
}

/// 시각 문자열 정규화
///
/// `event.str_time_format`이 지정되어 있으면 그 형식(chrono strftime)만 사용하고,
/// 아니면 RFC 3339, RFC 2822, 일반적인 날짜 형식, 연도 없는 syslog 형식을
/// 차례로 시도합니다. 성공하면 `event.time`과 `event.marshaled_time`을 갱신하고
/// `MarshaledTime` 키로 결과를 반환합니다.
#[derive(Debug, Clone, Copy, Default)]
pub struct ParseDate;

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y/%m/%d %H:%M:%S",
    "%d/%b/%Y:%H:%M:%S",
];

impl ParseDate {
    fn parse(value: &str, format: &str) -> Option<DateTime<Utc>> {
        if !format.is_empty() {
            return DateTime::parse_from_str(value, format)
                .map(|t| t.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(value, format)
                        .ok()
                        .map(|t| Utc.from_utc_datetime(&t))
                });
        }

        if let Ok(t) = DateTime::parse_from_rfc3339(value) {
            return Some(t.with_timezone(&Utc));
        }
        if let Ok(t) = DateTime::parse_from_rfc2822(value) {
            return Some(t.with_timezone(&Utc));
        }
        if let Ok(t) = DateTime::parse_from_str(value, "%d/%b/%Y:%H:%M:%S %z") {
            return Some(t.with_timezone(&Utc));
        }
        if let Some(t) = DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        {
            return Some(Utc.from_utc_datetime(&t));
        }

        // syslog 형식은 연도가 없으므로 현재 연도를 붙여 파싱
        let with_year = format!("{} {}", Utc::now().year(), value);
        NaiveDateTime::parse_from_str(&with_year, "%Y %b %e %H:%M:%S")
            .ok()
            .map(|t| Utc.from_utc_datetime(&t))
    }
}

impl Enricher for ParseDate {
    fn name(&self) -> &str {
        PARSE_DATE
    }

    fn enrich(
        &self,
        value: &str,
        event: &mut Event,
    ) -> Result<HashMap<String, String>, ParserError> {
        let parsed = if value.is_empty() {
            Utc::now()
        } else {
            Self::parse(value.trim(), &event.str_time_format).ok_or_else(|| {
                ParserError::Enrich {
                    method: PARSE_DATE.to_owned(),
                    reason: format!("unrecognized date '{value}'"),
                }
            })?
        };

        let marshaled = parsed.to_rfc3339();
        event.time = Some(parsed);
        event.marshaled_time.clone_from(&marshaled);

        Ok(HashMap::from([("MarshaledTime".to_owned(), marshaled)]))
    }
}

/// JSON 객체 디코딩
///
/// 최상위 키를 `event.unmarshaled`에 병합하며, 보강 결과로는 빈 맵을 반환합니다.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnmarshalJson;

impl Enricher for UnmarshalJson {
    fn name(&self) -> &str {
        UNMARSHAL_JSON
    }

    fn enrich(
        &self,
        value: &str,
        event: &mut Event,
    ) -> Result<HashMap<String, String>, ParserError> {
        let decoded: serde_json::Value = serde_json::from_str(value)?;
        match decoded {
            serde_json::Value::Object(obj) => {
                event.unmarshaled.extend(obj);
                Ok(HashMap::new())
            }
            other => Err(ParserError::Enrich {
                method: UNMARSHAL_JSON.to_owned(),
                reason: format!("expected a JSON object, got {other}"),
            }),
        }
    }
}
