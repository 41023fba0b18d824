//! 설정 관리 -- bulwark.toml 파싱 및 런타임 설정
//!
//! [`BulwarkConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`BULWARK_PAPI_SYNC_INTERVAL_SECS=5` 형식)
//! 3. 설정 파일 (`bulwark.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), bulwark_core::error::BulwarkError> {
//! use bulwark_core::config::BulwarkConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = BulwarkConfig::load("bulwark.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = BulwarkConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{BulwarkError, ConfigError};

/// Bulwark 통합 설정
///
/// `bulwark.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulwarkConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 파서 파이프라인 설정
    #[serde(default)]
    pub parser: ParserSection,
    /// 동기화(long-poll) 클라이언트 설정
    #[serde(default)]
    pub papi: PapiSection,
    /// 콘솔 공유 정책
    #[serde(default)]
    pub console: ConsoleConfig,
    /// 메트릭 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl BulwarkConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, BulwarkError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, BulwarkError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                BulwarkError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                BulwarkError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, BulwarkError> {
        toml::from_str(toml_str).map_err(|e| {
            BulwarkError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `BULWARK_{SECTION}_{FIELD}`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "BULWARK_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "BULWARK_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "BULWARK_GENERAL_DATA_DIR");

        // Parser
        override_csv(&mut self.parser.stages, "BULWARK_PARSER_STAGES");
        override_string(&mut self.parser.config_dir, "BULWARK_PARSER_CONFIG_DIR");
        override_bool(&mut self.parser.dump, "BULWARK_PARSER_DUMP");
        override_string(&mut self.parser.dump_path, "BULWARK_PARSER_DUMP_PATH");

        // PAPI
        override_bool(&mut self.papi.enabled, "BULWARK_PAPI_ENABLED");
        override_u64(
            &mut self.papi.sync_interval_secs,
            "BULWARK_PAPI_SYNC_INTERVAL_SECS",
        );
        override_usize(&mut self.papi.batch_size, "BULWARK_PAPI_BATCH_SIZE");
        override_u64(
            &mut self.papi.batch_timeout_secs,
            "BULWARK_PAPI_BATCH_TIMEOUT_SECS",
        );
        override_string(&mut self.papi.subscription, "BULWARK_PAPI_SUBSCRIPTION");

        // Console
        override_bool(
            &mut self.console.share_manual_decisions,
            "BULWARK_CONSOLE_SHARE_MANUAL_DECISIONS",
        );
        override_bool(
            &mut self.console.console_management,
            "BULWARK_CONSOLE_CONSOLE_MANAGEMENT",
        );

        // Metrics
        override_bool(&mut self.metrics.enabled, "BULWARK_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "BULWARK_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "BULWARK_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), BulwarkError> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        // 스테이지 이름은 비어 있거나 중복될 수 없음
        for (idx, stage) in self.parser.stages.iter().enumerate() {
            if stage.is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "parser.stages".to_owned(),
                    reason: format!("stage #{idx} has an empty name"),
                }
                .into());
            }
            if self.parser.stages[..idx].contains(stage) {
                return Err(ConfigError::InvalidValue {
                    field: "parser.stages".to_owned(),
                    reason: format!("duplicate stage '{stage}'"),
                }
                .into());
            }
        }

        if self.parser.dump && self.parser.dump_path.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "parser.dump_path".to_owned(),
                reason: "dump_path must not be empty when dump is enabled".to_owned(),
            }
            .into());
        }

        if self.papi.enabled {
            if self.papi.sync_interval_secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "papi.sync_interval_secs".to_owned(),
                    reason: "must be greater than 0".to_owned(),
                }
                .into());
            }
            if self.papi.batch_size == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "papi.batch_size".to_owned(),
                    reason: "must be greater than 0".to_owned(),
                }
                .into());
            }
            if self.papi.batch_timeout_secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "papi.batch_timeout_secs".to_owned(),
                    reason: "must be greater than 0".to_owned(),
                }
                .into());
            }
            let valid_tiers = ["community", "enterprise", "secops"];
            if !valid_tiers.contains(&self.papi.subscription.to_ascii_lowercase().as_str()) {
                return Err(ConfigError::InvalidValue {
                    field: "papi.subscription".to_owned(),
                    reason: format!("must be one of: {}", valid_tiers.join(", ")),
                }
                .into());
            }
        }

        if self.metrics.enabled && self.metrics.port == 0 {
            return Err(ConfigError::InvalidValue {
                field: "metrics.port".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 데이터 디렉토리 (체크포인트 등)
    pub data_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            data_dir: "/var/lib/bulwark".to_owned(),
        }
    }
}

/// 파서 파이프라인 설정 섹션
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserSection {
    /// 순서가 정해진 스테이지 목록 (비어 있으면 노드 디렉토리에서 발견한 순서)
    pub stages: Vec<String>,
    /// 스테이지별 노드 YAML 디렉토리
    pub config_dir: String,
    /// 진단용 스테이지 덤프 활성화 여부
    pub dump: bool,
    /// 덤프 결과를 기록할 JSON 파일 경로
    pub dump_path: String,
}

impl Default for ParserSection {
    fn default() -> Self {
        Self {
            stages: Vec::new(),
            config_dir: "/etc/bulwark/parsers".to_owned(),
            dump: false,
            dump_path: "/var/lib/bulwark/parser-dump.json".to_owned(),
        }
    }
}

/// 동기화 클라이언트 설정 섹션
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PapiSection {
    /// 활성화 여부
    pub enabled: bool,
    /// 삭제 결정 배치 전송 주기 (초)
    pub sync_interval_secs: u64,
    /// 한 번의 전송 호출에 담을 최대 결정 수
    pub batch_size: usize,
    /// 전송 호출 하나의 타임아웃 (초)
    pub batch_timeout_secs: u64,
    /// 시작 시점의 구독 등급 (community, enterprise, secops)
    pub subscription: String,
}

impl Default for PapiSection {
    fn default() -> Self {
        Self {
            enabled: false,
            sync_interval_secs: 10,
            batch_size: 50,
            batch_timeout_secs: 5,
            subscription: "community".to_owned(),
        }
    }
}

/// 콘솔 공유 정책
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsoleConfig {
    /// 수동 결정 공유
    pub share_manual_decisions: bool,
    /// 콘솔 관리 활성화
    pub console_management: bool,
}

/// Prometheus 메트릭 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// 활성화 여부
    pub enabled: bool,
    /// 리스닝 주소
    pub listen_addr: String,
    /// 리스닝 포트
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9464,
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    override_parsed(target, env_key, "bool");
}

fn override_usize(target: &mut usize, env_key: &str) {
    override_parsed(target, env_key, "usize");
}

fn override_u16(target: &mut u16, env_key: &str) {
    override_parsed(target, env_key, "u16");
}

fn override_u64(target: &mut u64, env_key: &str) {
    override_parsed(target, env_key, "u64");
}

fn override_parsed<T: std::str::FromStr>(target: &mut T, env_key: &str, kind: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<T>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                kind,
                "failed to parse env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val
            .split(',')
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect();
    }
}
