//! 파이프라인 조립 -- 노드 컴파일, 컨텍스트 생성, 이벤트 처리 진입점
//!
//! [`StagePipeline`]은 컴파일된 노드 집합과 [`ParserContext`]를 묶어
//! 이벤트 단위 처리 API를 제공합니다. `&self`로 호출되므로 여러 워커가
//! 서로 다른 이벤트를 동시에 처리할 수 있습니다.
//!
//! # 사용 예시
//! ```ignore
//! use bulwark_parser::{ParserConfig, StagePipelineBuilder};
//!
//! let pipeline = StagePipelineBuilder::new()
//!     .config(ParserConfig::from_core(&core_config.parser))
//!     .load_nodes()
//!     .await?
//!     .build()?;
//!
//! let event = pipeline.process(Event::from_line(line))?;
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bulwark_core::event::Event;
use bulwark_core::metrics as m;

use crate::config::ParserConfig;
use crate::context::ParserContext;
use crate::dump::StageDump;
use crate::enrich::EnricherRegistry;
use crate::error::ParserError;
use crate::expr::{ExprEngine, RhaiExprEngine};
use crate::loader::NodeLoader;
use crate::node::{Node, NodeConfig};
use crate::runtime;

/// 스테이지 파이프라인
#[derive(Debug)]
pub struct StagePipeline {
    config: ParserConfig,
    ctx: ParserContext,
    nodes: Vec<Node>,
    processed_count: AtomicU64,
    dropped_count: AtomicU64,
    error_count: AtomicU64,
}

impl StagePipeline {
    /// 이벤트 하나를 처리합니다.
    ///
    /// # Errors
    /// 노드 평가 에러 (이벤트 처리 중단)
    pub fn process(&self, event: Event) -> Result<Event, ParserError> {
        match runtime::parse(&self.ctx, event, &self.nodes) {
            Ok(event) => {
                if event.process {
                    self.processed_count.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.dropped_count.fetch_add(1, Ordering::Relaxed);
                }
                Ok(event)
            }
            Err(e) => {
                self.error_count.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// 덤프가 활성화되어 있으면 설정된 경로에 기록합니다.
    pub async fn write_dump(&self) -> Result<(), ParserError> {
        match self.ctx.dump() {
            Some(dump) => dump.write_to(&self.config.dump_path).await,
            None => Ok(()),
        }
    }

    /// 파서 컨텍스트
    pub fn context(&self) -> &ParserContext {
        &self.ctx
    }

    /// 스테이지 순서
    pub fn stages(&self) -> &[String] {
        self.ctx.stages()
    }

    /// 최상위 노드 목록
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// 모든 스테이지를 통과한 이벤트 수
    pub fn processed_count(&self) -> u64 {
        self.processed_count.load(Ordering::Relaxed)
    }

    /// 중간에 탈락한 이벤트 수
    pub fn dropped_count(&self) -> u64 {
        self.dropped_count.load(Ordering::Relaxed)
    }

    /// 에러로 중단된 이벤트 수
    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }
}

/// 파이프라인 빌더
pub struct StagePipelineBuilder {
    config: ParserConfig,
    stages: Option<Vec<String>>,
    nodes: Vec<NodeConfig>,
    engine: Option<Arc<dyn ExprEngine>>,
    enrichers: Option<EnricherRegistry>,
}

impl StagePipelineBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: ParserConfig::default(),
            stages: None,
            nodes: Vec::new(),
            engine: None,
            enrichers: None,
        }
    }

    /// 파서 설정을 지정합니다.
    pub fn config(mut self, config: ParserConfig) -> Self {
        self.config = config;
        self
    }

    /// 스테이지 순서를 직접 지정합니다 (설정보다 우선).
    pub fn stages(mut self, stages: Vec<String>) -> Self {
        self.stages = Some(stages);
        self
    }

    /// 노드 설정을 추가합니다.
    pub fn nodes(mut self, nodes: impl IntoIterator<Item = NodeConfig>) -> Self {
        self.nodes.extend(nodes);
        self
    }

    /// 표현식 엔진을 교체합니다 (기본: rhai).
    pub fn engine(mut self, engine: Arc<dyn ExprEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// 보강 함수 레지스트리를 교체합니다 (기본: 내장 함수).
    pub fn enrichers(mut self, enrichers: EnricherRegistry) -> Self {
        self.enrichers = Some(enrichers);
        self
    }

    /// 설정된 디렉토리에서 노드 파일을 로드합니다.
    ///
    /// # Errors
    /// 디렉토리/파일 읽기 또는 YAML 파싱 실패
    pub async fn load_nodes(mut self) -> Result<Self, ParserError> {
        let loaded = NodeLoader::load(&self.config).await?;
        if self.stages.is_none() {
            self.stages = Some(loaded.stages);
        }
        self.nodes.extend(loaded.nodes);
        Ok(self)
    }

    /// 설정을 검증하고 노드를 컴파일하여 파이프라인을 생성합니다.
    ///
    /// # Errors
    /// - 설정 검증 실패
    /// - 알 수 없는 스테이지에 속한 노드
    /// - 노드 컴파일 실패 (표현식, 정규식, 화이트리스트, 정적 할당)
    pub fn build(self) -> Result<StagePipeline, ParserError> {
        self.config.validate()?;

        let stages = self
            .stages
            .unwrap_or_else(|| self.config.stages.clone());
        let engine = self
            .engine
            .unwrap_or_else(|| Arc::new(RhaiExprEngine::new()));

        let mut ctx = ParserContext::new(stages, Arc::clone(&engine));
        if let Some(enrichers) = self.enrichers {
            ctx = ctx.with_enrichers(enrichers);
        }
        if self.config.dump {
            ctx = ctx.with_dump(Arc::new(StageDump::new()));
        }

        let nodes = self
            .nodes
            .iter()
            .map(|config| {
                if ctx.stage_index(&config.stage).is_none() {
                    return Err(ParserError::NodeConfig {
                        node: config.name.clone(),
                        reason: format!("unknown stage '{}'", config.stage),
                    });
                }
                Node::compile(config, engine.as_ref())
            })
            .collect::<Result<Vec<_>, _>>()?;

        metrics::gauge!(m::PARSER_NODES_LOADED).set(nodes.len() as f64);
        tracing::info!(
            stages = ?ctx.stages(),
            nodes = nodes.len(),
            dump = self.config.dump,
            "stage pipeline built"
        );

        Ok(StagePipeline {
            config: self.config,
            ctx,
            nodes,
            processed_count: AtomicU64::new(0),
            dropped_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
        })
    }
}

impl Default for StagePipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, stage: &str, on_success: &str) -> NodeConfig {
        NodeConfig {
            name: name.to_owned(),
            stage: stage.to_owned(),
            on_success: on_success.to_owned(),
            ..Default::default()
        }
    }

    #[test]
    fn builds_and_processes() {
        let pipeline = StagePipelineBuilder::new()
            .stages(vec!["s00".to_owned(), "s01".to_owned()])
            .nodes([node("a", "s00", "next_stage"), node("b", "s01", "")])
            .build()
            .unwrap();

        let evt = pipeline.process(Event::from_line("hello")).unwrap();
        assert!(evt.process);
        assert_eq!(pipeline.processed_count(), 1);
        assert_eq!(pipeline.nodes().len(), 2);
    }

    #[test]
    fn counts_dropped_events() {
        let pipeline = StagePipelineBuilder::new()
            .stages(vec!["s00".to_owned()])
            .nodes([NodeConfig {
                filter: Some("false".to_owned()),
                ..node("never", "s00", "")
            }])
            .build()
            .unwrap();

        let evt = pipeline.process(Event::default()).unwrap();
        assert!(!evt.process);
        assert_eq!(pipeline.dropped_count(), 1);
        assert_eq!(pipeline.processed_count(), 0);
    }

    #[test]
    fn rejects_node_in_unknown_stage() {
        let result = StagePipelineBuilder::new()
            .stages(vec!["s00".to_owned()])
            .nodes([node("lost", "s09", "")])
            .build();
        assert!(result.is_err());
    }

    #[test]
    fn dump_enabled_from_config() {
        let pipeline = StagePipelineBuilder::new()
            .config(ParserConfig {
                dump: true,
                ..Default::default()
            })
            .stages(vec!["s00".to_owned()])
            .nodes([node("a", "s00", "")])
            .build()
            .unwrap();
        pipeline.process(Event::default()).unwrap();
        let dump = pipeline.context().dump().unwrap();
        assert_eq!(dump.len(), 1);
    }
}
