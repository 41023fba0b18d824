//! 동기화 클라이언트 설정
//!
//! [`PapiConfig`]는 core의 [`PapiSection`](bulwark_core::config::PapiSection)과
//! [`ConsoleConfig`](bulwark_core::config::ConsoleConfig)를 합쳐
//! 폴링 클라이언트와 삭제 결정 배치 전송기가 사용하는 설정을 제공합니다.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::PapiError;
use crate::subscription::SubscriptionType;

/// 동기화 클라이언트 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PapiConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 삭제 결정 배치 전송 주기 (초)
    pub sync_interval_secs: u64,
    /// 전송 호출 하나에 담을 최대 결정 수
    pub batch_size: usize,
    /// 전송 호출 하나의 타임아웃 (초)
    pub batch_timeout_secs: u64,
    /// 시작 시점의 구독 등급
    pub subscription: SubscriptionType,
    /// 수동 결정 공유
    pub share_manual_decisions: bool,
    /// 콘솔 관리
    pub console_management: bool,

    // --- 확장 설정 (core에 없는 추가 필드) ---
    /// 삭제 결정 수신 채널 용량
    pub channel_capacity: usize,
}

impl Default for PapiConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            sync_interval_secs: 10,
            batch_size: 50,
            batch_timeout_secs: 5,
            subscription: SubscriptionType::Community,
            share_manual_decisions: false,
            console_management: false,
            channel_capacity: 1024,
        }
    }
}

impl PapiConfig {
    /// core 설정 섹션에서 동기화 설정을 생성합니다.
    ///
    /// # Errors
    /// 구독 등급 이름을 알 수 없는 경우
    pub fn from_core(
        papi: &bulwark_core::config::PapiSection,
        console: &bulwark_core::config::ConsoleConfig,
    ) -> Result<Self, PapiError> {
        Ok(Self {
            enabled: papi.enabled,
            sync_interval_secs: papi.sync_interval_secs,
            batch_size: papi.batch_size,
            batch_timeout_secs: papi.batch_timeout_secs,
            subscription: papi.subscription.parse()?,
            share_manual_decisions: console.share_manual_decisions,
            console_management: console.console_management,
            ..Self::default()
        })
    }

    /// 삭제 결정을 누적해야 하는지 여부
    pub fn shares_deletions(&self) -> bool {
        self.share_manual_decisions || self.console_management
    }

    /// 배치 전송 주기
    pub fn sync_interval(&self) -> Duration {
        Duration::from_secs(self.sync_interval_secs)
    }

    /// 전송 호출 하나의 타임아웃
    pub fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.batch_timeout_secs)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), PapiError> {
        const MAX_SYNC_INTERVAL_SECS: u64 = 3600;
        const MAX_BATCH_SIZE: usize = 10_000;

        if self.sync_interval_secs == 0 || self.sync_interval_secs > MAX_SYNC_INTERVAL_SECS {
            return Err(PapiError::Config {
                field: "sync_interval_secs".to_owned(),
                reason: format!("must be 1-{MAX_SYNC_INTERVAL_SECS}"),
            });
        }

        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(PapiError::Config {
                field: "batch_size".to_owned(),
                reason: format!("must be 1-{MAX_BATCH_SIZE}"),
            });
        }

        if self.batch_timeout_secs == 0 {
            return Err(PapiError::Config {
                field: "batch_timeout_secs".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.channel_capacity == 0 {
            return Err(PapiError::Config {
                field: "channel_capacity".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bulwark_core::config::{ConsoleConfig, PapiSection};

    #[test]
    fn default_config_is_valid() {
        PapiConfig::default().validate().unwrap();
    }

    #[test]
    fn from_core_preserves_values() {
        let papi = PapiSection {
            enabled: true,
            sync_interval_secs: 30,
            batch_size: 20,
            batch_timeout_secs: 2,
            subscription: "secops".to_owned(),
        };
        let console = ConsoleConfig {
            share_manual_decisions: false,
            console_management: true,
        };
        let config = PapiConfig::from_core(&papi, &console).unwrap();
        assert!(config.enabled);
        assert_eq!(config.sync_interval(), Duration::from_secs(30));
        assert_eq!(config.batch_size, 20);
        assert_eq!(config.subscription, SubscriptionType::SecOps);
        assert!(config.shares_deletions());
        // 확장 필드는 기본값
        assert_eq!(config.channel_capacity, 1024);
    }

    #[test]
    fn from_core_rejects_unknown_subscription() {
        let papi = PapiSection {
            subscription: "platinum".to_owned(),
            ..Default::default()
        };
        assert!(PapiConfig::from_core(&papi, &ConsoleConfig::default()).is_err());
    }

    #[test]
    fn shares_deletions_requires_a_policy() {
        let config = PapiConfig::default();
        assert!(!config.shares_deletions());
        let config = PapiConfig {
            share_manual_decisions: true,
            ..Default::default()
        };
        assert!(config.shares_deletions());
    }

    #[test]
    fn validate_rejects_zero_values() {
        for config in [
            PapiConfig {
                sync_interval_secs: 0,
                ..Default::default()
            },
            PapiConfig {
                batch_size: 0,
                ..Default::default()
            },
            PapiConfig {
                batch_timeout_secs: 0,
                ..Default::default()
            },
        ] {
            assert!(config.validate().is_err());
        }
    }
}
