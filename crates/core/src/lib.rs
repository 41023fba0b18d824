//! Bulwark 공통 크레이트
//!
//! 파서 파이프라인(`bulwark-parser`)과 동기화 클라이언트(`bulwark-papi`)가
//! 공유하는 이벤트 모델, 에러 타입, 설정, 메트릭 이름을 제공합니다.

pub mod config;
pub mod error;
pub mod event;
pub mod metrics;

// --- 주요 타입 re-export ---

// 에러
pub use error::{BulwarkError, ConfigError, PipelineError, SyncError};

// 설정
pub use config::BulwarkConfig;

// 이벤트
pub use event::{Event, EventType, Line, RuntimeAlert, Source};
