//! 구독 등급
//!
//! 폴링 권한은 등급으로 결정됩니다. `Enterprise`와 `SecOps`만 폴링할 수 있습니다.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::PapiError;

/// 구독 등급
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionType {
    /// 무료 등급
    #[default]
    Community,
    /// 엔터프라이즈
    Enterprise,
    /// SecOps
    SecOps,
}

impl SubscriptionType {
    /// 폴링 권한이 있는지 여부
    pub fn can_poll(self) -> bool {
        matches!(self, Self::Enterprise | Self::SecOps)
    }

    /// 소문자 이름
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Community => "community",
            Self::Enterprise => "enterprise",
            Self::SecOps => "secops",
        }
    }
}

impl fmt::Display for SubscriptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubscriptionType {
    type Err = PapiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "community" => Ok(Self::Community),
            "enterprise" => Ok(Self::Enterprise),
            "secops" => Ok(Self::SecOps),
            other => Err(PapiError::Config {
                field: "subscription".to_owned(),
                reason: format!("unknown subscription type '{other}'"),
            }),
        }
    }
}
