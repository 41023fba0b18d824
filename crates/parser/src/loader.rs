//! 노드 파일 로더 -- 스테이지 디렉토리에서 YAML 노드 정의를 로드합니다.
//!
//! 디렉토리 구조는 다음과 같습니다.
//!
//! ```text
//! <config_dir>/
//!   s00-raw/
//!     syslog.yaml
//!   s01-parse/
//!     sshd.yaml      # `---`로 구분된 여러 노드 가능
//! ```
//!
//! 노드의 스테이지는 디렉토리 이름으로 정해지며, 같은 스테이지 안에서는
//! 파일 이름 순서, 파일 안에서는 문서 순서가 노드 실행 순서가 됩니다.
//! 잘못된 노드 파일은 시작 단계에서 에러로 처리됩니다.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::config::ParserConfig;
use crate::error::ParserError;
use crate::node::NodeConfig;

/// 로드 결과: 스테이지 순서와 노드 설정 목록
#[derive(Debug, Clone, Default)]
pub struct LoadedNodes {
    /// 스테이지 순서
    pub stages: Vec<String>,
    /// 스테이지 순서대로 정렬된 노드 설정
    pub nodes: Vec<NodeConfig>,
}

/// 노드 파일 로더
pub struct NodeLoader;

impl NodeLoader {
    /// 설정된 디렉토리에서 모든 스테이지의 노드를 로드합니다.
    ///
    /// 스테이지 목록이 비어 있으면 하위 디렉토리를 이름순으로 정렬해 사용합니다.
    ///
    /// # Errors
    /// - 디렉토리를 읽을 수 없는 경우
    /// - 노드 파일이 너무 크거나 YAML 파싱에 실패한 경우
    /// - 노드 수가 상한을 초과한 경우
    pub async fn load(config: &ParserConfig) -> Result<LoadedNodes, ParserError> {
        let root = Path::new(&config.config_dir);

        let stages = if config.stages.is_empty() {
            Self::discover_stages(root).await?
        } else {
            config.stages.clone()
        };

        let mut nodes = Vec::new();
        for stage in &stages {
            let stage_dir = root.join(stage);
            if !tokio::fs::try_exists(&stage_dir).await? {
                tracing::warn!(
                    stage = %stage,
                    path = %stage_dir.display(),
                    "stage directory not found, stage has no nodes"
                );
                continue;
            }

            for path in Self::yaml_files(&stage_dir).await? {
                let loaded = Self::load_file(&path, stage, config.max_node_file_size).await?;
                nodes.extend(loaded);

                if nodes.len() > config.max_nodes {
                    return Err(ParserError::NodeLoad {
                        path: root.display().to_string(),
                        reason: format!("too many nodes: max {}", config.max_nodes),
                    });
                }
            }
        }

        tracing::info!(
            dir = %root.display(),
            stages = ?stages,
            count = nodes.len(),
            "loaded parser nodes"
        );

        Ok(LoadedNodes { stages, nodes })
    }

    /// 하위 디렉토리 이름을 정렬해 스테이지 목록으로 사용합니다.
    async fn discover_stages(root: &Path) -> Result<Vec<String>, ParserError> {
        let mut entries = tokio::fs::read_dir(root)
            .await
            .map_err(|e| ParserError::NodeLoad {
                path: root.display().to_string(),
                reason: format!("failed to read directory: {e}"),
            })?;

        let mut stages = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    stages.push(name.to_owned());
                }
            }
        }
        stages.sort();
        Ok(stages)
    }

    /// 디렉토리의 `.yml`/`.yaml` 파일을 이름순으로 반환합니다.
    async fn yaml_files(dir: &Path) -> Result<Vec<PathBuf>, ParserError> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| ParserError::NodeLoad {
                path: dir.display().to_string(),
                reason: format!("failed to read directory: {e}"),
            })?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_yaml = path
                .extension()
                .is_some_and(|ext| ext == "yml" || ext == "yaml");
            if is_yaml {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// 노드 파일 하나를 로드하고 스테이지를 지정합니다.
    pub async fn load_file(
        path: impl AsRef<Path>,
        stage: &str,
        max_size: u64,
    ) -> Result<Vec<NodeConfig>, ParserError> {
        let path = path.as_ref();
        let load_err = |reason: String| ParserError::NodeLoad {
            path: path.display().to_string(),
            reason,
        };

        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| load_err(format!("failed to read file metadata: {e}")))?;
        if metadata.len() > max_size {
            return Err(load_err(format!(
                "file too large: {} bytes (max: {max_size})",
                metadata.len()
            )));
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| load_err(format!("failed to read file: {e}")))?;

        let mut nodes = Self::parse_yaml(&content, &path.display().to_string())?;
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        for (idx, node) in nodes.iter_mut().enumerate() {
            node.stage = stage.to_owned();
            if node.name.is_empty() {
                node.name = if idx == 0 {
                    stem.to_owned()
                } else {
                    format!("{stem}#{idx}")
                };
            }
        }
        Ok(nodes)
    }

    /// YAML 문자열을 파싱합니다. `---`로 구분된 여러 문서는 각각 하나의 노드입니다.
    pub fn parse_yaml(yaml_str: &str, source: &str) -> Result<Vec<NodeConfig>, ParserError> {
        let mut nodes = Vec::new();
        for document in serde_yaml::Deserializer::from_str(yaml_str) {
            let value =
                serde_yaml::Value::deserialize(document).map_err(|e| ParserError::NodeLoad {
                    path: source.to_owned(),
                    reason: format!("YAML parse error: {e}"),
                })?;
            if value.is_null() {
                continue;
            }
            let node: NodeConfig =
                serde_yaml::from_value(value).map_err(|e| ParserError::NodeLoad {
                    path: source.to_owned(),
                    reason: format!("YAML parse error: {e}"),
                })?;
            nodes.push(node);
        }
        Ok(nodes)
    }
}
