//! 점 표기 대상 경로 -- `target: evt.Meta.log_type` 같은 정적 할당 대상
//!
//! 대상 경로는 설정 로딩 시점에 닫힌 집합 [`TargetPath`]로 파싱됩니다.
//! 허용되지 않는 경로는 로딩 단계에서 거부되므로 런타임 할당은 항상 성공합니다.
//!
//! ```text
//! [evt.]Meta.<key>            [evt.]Stage
//! [evt.]Parsed.<key>          [evt.]StrTime
//! [evt.]Enriched.<key>        [evt.]StrTimeFormat
//! [evt.]Unmarshaled.<key>     [evt.]MarshaledTime
//! [evt.]Line.Labels.<key>     [evt.]WhitelistReason
//! [evt.]Line.Raw|Src|Module   [evt.]Overflow.Mapkey|BucketId
//! ```
//!
//! 매핑 필드는 첫 번째 키까지만 주소 지정이 가능하며, 그 뒤의 세그먼트는 무시됩니다.

use std::fmt;
use std::str::FromStr;

use bulwark_core::event::Event;

use crate::error::ParserError;

/// 정적 할당이 쓸 수 있는 이벤트 위치
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetPath {
    /// `Meta.<key>`
    Meta(String),
    /// `Parsed.<key>`
    Parsed(String),
    /// `Enriched.<key>`
    Enriched(String),
    /// `Unmarshaled.<key>`
    Unmarshaled(String),
    /// `Line.Labels.<key>`
    LineLabel(String),
    /// `Line.Raw`
    LineRaw,
    /// `Line.Src`
    LineSrc,
    /// `Line.Module`
    LineModule,
    /// `Stage`
    Stage,
    /// `StrTime`
    StrTime,
    /// `StrTimeFormat`
    StrTimeFormat,
    /// `MarshaledTime`
    MarshaledTime,
    /// `WhitelistReason`
    WhitelistReason,
    /// `Overflow.Mapkey`
    OverflowMapKey,
    /// `Overflow.BucketId`
    OverflowBucketId,
}

impl TargetPath {
    /// 이벤트의 해당 위치에 값을 씁니다.
    pub fn apply(&self, event: &mut Event, value: String) {
        match self {
            Self::Meta(key) => {
                event.meta.insert(key.clone(), value);
            }
            Self::Parsed(key) => {
                event.parsed.insert(key.clone(), value);
            }
            Self::Enriched(key) => {
                event.enriched.insert(key.clone(), value);
            }
            Self::Unmarshaled(key) => {
                event
                    .unmarshaled
                    .insert(key.clone(), serde_json::Value::String(value));
            }
            Self::LineLabel(key) => {
                event.line.labels.insert(key.clone(), value);
            }
            Self::LineRaw => event.line.raw = value,
            Self::LineSrc => event.line.src = value,
            Self::LineModule => event.line.module = value,
            Self::Stage => event.stage = value,
            Self::StrTime => event.str_time = value,
            Self::StrTimeFormat => event.str_time_format = value,
            Self::MarshaledTime => event.marshaled_time = value,
            Self::WhitelistReason => event.whitelist_reason = value,
            Self::OverflowMapKey => event.overflow.mapkey = value,
            Self::OverflowBucketId => event.overflow.bucket_id = value,
        }
    }
}

fn map_key<'a>(
    target: &str,
    field: &str,
    mut rest: impl Iterator<Item = &'a str>,
) -> Result<String, ParserError> {
    match rest.next() {
        Some(key) if !key.is_empty() => Ok(key.to_owned()),
        _ => Err(ParserError::StaticConfig(format!(
            "target '{target}': '{field}' requires a key"
        ))),
    }
}

impl FromStr for TargetPath {
    type Err = ParserError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let target = raw.strip_prefix("evt.").unwrap_or(raw);
        let mut segments = target.split('.');
        let unknown = || ParserError::StaticConfig(format!("'{raw}' is not a valid target"));

        let path = match segments.next().unwrap_or_default() {
            "Meta" => Self::Meta(map_key(raw, "Meta", &mut segments)?),
            "Parsed" => Self::Parsed(map_key(raw, "Parsed", &mut segments)?),
            "Enriched" => Self::Enriched(map_key(raw, "Enriched", &mut segments)?),
            "Unmarshaled" => Self::Unmarshaled(map_key(raw, "Unmarshaled", &mut segments)?),
            "Line" => match segments.next() {
                Some("Labels") => Self::LineLabel(map_key(raw, "Line.Labels", &mut segments)?),
                Some("Raw") => Self::LineRaw,
                Some("Src") => Self::LineSrc,
                Some("Module") => Self::LineModule,
                _ => return Err(unknown()),
            },
            "Overflow" => match segments.next() {
                Some("Mapkey") => Self::OverflowMapKey,
                Some("BucketId") => Self::OverflowBucketId,
                _ => return Err(unknown()),
            },
            "Stage" => Self::Stage,
            "StrTime" => Self::StrTime,
            "StrTimeFormat" => Self::StrTimeFormat,
            "MarshaledTime" => Self::MarshaledTime,
            "WhitelistReason" => Self::WhitelistReason,
            _ => return Err(unknown()),
        };

        // 스칼라 필드 뒤에 세그먼트가 남아 있으면 쓸 수 없는 위치
        let is_map = matches!(
            path,
            Self::Meta(_)
                | Self::Parsed(_)
                | Self::Enriched(_)
                | Self::Unmarshaled(_)
                | Self::LineLabel(_)
        );
        if !is_map && segments.next().is_some() {
            return Err(unknown());
        }

        Ok(path)
    }
}

impl fmt::Display for TargetPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Meta(k) => write!(f, "Meta.{k}"),
            Self::Parsed(k) => write!(f, "Parsed.{k}"),
            Self::Enriched(k) => write!(f, "Enriched.{k}"),
            Self::Unmarshaled(k) => write!(f, "Unmarshaled.{k}"),
            Self::LineLabel(k) => write!(f, "Line.Labels.{k}"),
            Self::LineRaw => f.write_str("Line.Raw"),
            Self::LineSrc => f.write_str("Line.Src"),
            Self::LineModule => f.write_str("Line.Module"),
            Self::Stage => f.write_str("Stage"),
            Self::StrTime => f.write_str("StrTime"),
            Self::StrTimeFormat => f.write_str("StrTimeFormat"),
            Self::MarshaledTime => f.write_str("MarshaledTime"),
            Self::WhitelistReason => f.write_str("WhitelistReason"),
            Self::OverflowMapKey => f.write_str("Overflow.Mapkey"),
            Self::OverflowBucketId => f.write_str("Overflow.BucketId"),
        }
    }
}
