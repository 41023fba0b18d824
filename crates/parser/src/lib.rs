//! # bulwark-parser
//!
//! 스테이지 기반 이벤트 파서입니다. 원시 로그 라인이나 overflow 알림을
//! 설정된 스테이지 순서대로 통과시키며, 각 스테이지의 노드가 필드를 채우고
//! 화이트리스트를 판정합니다.
//!
//! # 모듈 구성
//!
//! - [`runtime`]: 스테이지/노드 상태 머신 ([`parse`])
//! - [`node`]: 노드 (필터, 패턴, 자식 노드, 화이트리스트, 정적 할당)
//! - [`whitelist`]: IP/CIDR/표현식 화이트리스트
//! - [`statics`]: 정적 할당 처리기
//! - [`target`]: 점 경로 할당 대상
//! - [`enrich`]: 보강 함수 레지스트리 (`ParseDate`, `UnmarshalJSON`)
//! - [`expr`]: 표현식 엔진 계약과 rhai 구현
//! - [`dump`]: 진단용 스테이지 덤프
//! - [`context`]: 파서 실행 컨텍스트
//! - [`loader`]: 스테이지 디렉토리 노드 로더
//! - [`pipeline`]: 파이프라인 조립과 처리 진입점
//! - [`config`]: 파서 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! Event -> s00 nodes -> s01 nodes -> ... -> Event { process: true }
//!            |             |
//!        filter/grok   whitelist/statics -> enrichers
//! ```

pub mod cidr;
pub mod config;
pub mod context;
pub mod dump;
pub mod enrich;
pub mod error;
pub mod expr;
pub mod loader;
pub mod node;
pub mod pipeline;
pub mod runtime;
pub mod statics;
pub mod target;
pub mod whitelist;

// --- 주요 타입 re-export ---

// 파이프라인
pub use pipeline::{StagePipeline, StagePipelineBuilder};
pub use runtime::parse;

// 설정
pub use config::ParserConfig;
pub use context::ParserContext;

// 에러
pub use error::ParserError;

// 노드와 구성 요소
pub use node::{Node, NodeConfig, OnSuccess, PatternConfig};
pub use statics::{Static, StaticConfig, apply_statics};
pub use target::TargetPath;
pub use whitelist::{Whitelist, WhitelistConfig};

// 표현식
pub use expr::{CompiledExpr, ExprEngine, ExprEnv, ExprValue, RhaiExprEngine};

// 보강 함수
pub use enrich::{Enricher, EnricherRegistry};

// 덤프와 로더
pub use dump::{DumpTree, NodeResult, StageDump};
pub use loader::{LoadedNodes, NodeLoader};
