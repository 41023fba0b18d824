//! 파서 컨텍스트 -- 스테이지 순서, 표현식 엔진, 보강 함수, 덤프
//!
//! 파이프라인이 참조하는 모든 공유 상태를 담습니다. 노드 집합을 로드할 때
//! 생성하고 리로드 시 새로 만들어 교체하므로 전역 상태가 없습니다.

use std::collections::HashMap;
use std::sync::Arc;

use crate::dump::StageDump;
use crate::enrich::EnricherRegistry;
use crate::expr::ExprEngine;

/// 파서 실행 컨텍스트
#[derive(Debug, Clone)]
pub struct ParserContext {
    stages: Vec<String>,
    stage_index: HashMap<String, usize>,
    engine: Arc<dyn ExprEngine>,
    enrichers: EnricherRegistry,
    dump: Option<Arc<StageDump>>,
}

impl ParserContext {
    /// 순서가 정해진 스테이지 목록과 표현식 엔진으로 컨텍스트를 생성합니다.
    ///
    /// 기본 제공 보강 함수가 등록되며 덤프는 비활성 상태입니다.
    pub fn new(stages: Vec<String>, engine: Arc<dyn ExprEngine>) -> Self {
        let stage_index = stages
            .iter()
            .enumerate()
            .map(|(idx, name)| (name.clone(), idx))
            .collect();
        Self {
            stages,
            stage_index,
            engine,
            enrichers: EnricherRegistry::with_builtins(),
            dump: None,
        }
    }

    /// 보강 함수 레지스트리를 교체합니다.
    pub fn with_enrichers(mut self, enrichers: EnricherRegistry) -> Self {
        self.enrichers = enrichers;
        self
    }

    /// 진단 덤프를 활성화합니다.
    pub fn with_dump(mut self, dump: Arc<StageDump>) -> Self {
        self.dump = Some(dump);
        self
    }

    /// 스테이지 목록
    pub fn stages(&self) -> &[String] {
        &self.stages
    }

    /// 스테이지의 순서 인덱스 (목록에 없으면 `None`)
    pub fn stage_index(&self, stage: &str) -> Option<usize> {
        self.stage_index.get(stage).copied()
    }

    /// 주어진 스테이지의 다음 스테이지
    pub fn next_stage(&self, stage: &str) -> Option<&str> {
        let idx = self.stage_index(stage)?;
        self.stages.get(idx + 1).map(String::as_str)
    }

    /// 표현식 엔진
    pub fn engine(&self) -> &dyn ExprEngine {
        self.engine.as_ref()
    }

    /// 보강 함수 레지스트리
    pub fn enrichers(&self) -> &EnricherRegistry {
        &self.enrichers
    }

    /// 진단 덤프 (활성화된 경우)
    pub fn dump(&self) -> Option<&Arc<StageDump>> {
        self.dump.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::RhaiExprEngine;

    fn ctx() -> ParserContext {
        ParserContext::new(
            vec!["s00".to_owned(), "s01".to_owned(), "s02".to_owned()],
            Arc::new(RhaiExprEngine::new()),
        )
    }

    #[test]
    fn stage_ordering() {
        let ctx = ctx();
        assert_eq!(ctx.stage_index("s01"), Some(1));
        assert_eq!(ctx.stage_index(""), None);
        assert_eq!(ctx.next_stage("s00"), Some("s01"));
        assert_eq!(ctx.next_stage("s02"), None);
        assert_eq!(ctx.next_stage("unknown"), None);
    }

    #[test]
    fn dump_is_off_by_default() {
        let ctx = ctx();
        assert!(ctx.dump().is_none());
        let ctx = ctx.with_dump(Arc::new(StageDump::new()));
        assert!(ctx.dump().is_some());
    }
}
