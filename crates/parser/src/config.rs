//! 파서 설정
//!
//! [`ParserConfig`]는 core의 [`ParserSection`](bulwark_core::config::ParserSection)을
//! 기반으로 파서 전용 설정을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use bulwark_core::config::BulwarkConfig;
//! use bulwark_parser::config::ParserConfig;
//!
//! let core_config = BulwarkConfig::default();
//! let config = ParserConfig::from_core(&core_config.parser);
//! ```

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::ParserError;

/// 파서 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParserConfig {
    /// 순서가 정해진 스테이지 목록 (비어 있으면 노드 디렉토리에서 발견한 순서)
    pub stages: Vec<String>,
    /// 스테이지별 노드 YAML 디렉토리
    pub config_dir: String,
    /// 진단용 스테이지 덤프 활성화 여부
    pub dump: bool,
    /// 덤프 결과 JSON 파일 경로
    pub dump_path: String,

    // --- 확장 설정 (core에 없는 추가 필드) ---
    /// 노드 파일 하나의 최대 크기 (바이트)
    pub max_node_file_size: u64,
    /// 전체 노드 수 상한
    pub max_nodes: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            stages: Vec::new(),
            config_dir: "/etc/bulwark/parsers".to_owned(),
            dump: false,
            dump_path: "/var/lib/bulwark/parser-dump.json".to_owned(),
            max_node_file_size: 10 * 1024 * 1024,
            max_nodes: 10_000,
        }
    }
}

impl ParserConfig {
    /// core의 `ParserSection`에서 파서 설정을 생성합니다.
    ///
    /// core 설정에 없는 확장 필드는 기본값이 적용됩니다.
    pub fn from_core(core: &bulwark_core::config::ParserSection) -> Self {
        Self {
            stages: core.stages.clone(),
            config_dir: core.config_dir.clone(),
            dump: core.dump,
            dump_path: core.dump_path.clone(),
            ..Self::default()
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), ParserError> {
        let mut seen = HashSet::new();
        for stage in &self.stages {
            if stage.is_empty() {
                return Err(ParserError::Config {
                    field: "stages".to_owned(),
                    reason: "stage name must not be empty".to_owned(),
                });
            }
            if !seen.insert(stage.as_str()) {
                return Err(ParserError::Config {
                    field: "stages".to_owned(),
                    reason: format!("duplicate stage '{stage}'"),
                });
            }
        }

        if self.config_dir.is_empty() {
            return Err(ParserError::Config {
                field: "config_dir".to_owned(),
                reason: "must not be empty".to_owned(),
            });
        }

        if self.dump && self.dump_path.is_empty() {
            return Err(ParserError::Config {
                field: "dump_path".to_owned(),
                reason: "required when dump is enabled".to_owned(),
            });
        }

        if self.max_node_file_size == 0 {
            return Err(ParserError::Config {
                field: "max_node_file_size".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        if self.max_nodes == 0 {
            return Err(ParserError::Config {
                field: "max_nodes".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        ParserConfig::default().validate().unwrap();
    }

    #[test]
    fn from_core_preserves_values() {
        let core = bulwark_core::config::ParserSection {
            stages: vec!["s00-raw".to_owned(), "s01-parse".to_owned()],
            config_dir: "/opt/parsers".to_owned(),
            dump: true,
            dump_path: "/tmp/dump.json".to_owned(),
        };
        let config = ParserConfig::from_core(&core);
        assert_eq!(config.stages.len(), 2);
        assert_eq!(config.config_dir, "/opt/parsers");
        assert!(config.dump);
        // 확장 필드는 기본값
        assert_eq!(config.max_nodes, 10_000);
    }

    #[test]
    fn validate_rejects_duplicate_stage() {
        let config = ParserConfig {
            stages: vec!["s00".to_owned(), "s00".to_owned()],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_dump_without_path() {
        let config = ParserConfig {
            dump: true,
            dump_path: String::new(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
