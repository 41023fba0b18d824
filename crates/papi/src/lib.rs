//! # bulwark-papi
//!
//! 중앙 서버와의 롱폴링 동기화 클라이언트와 삭제 결정 배치 전송기입니다.
//!
//! # 모듈 구성
//!
//! - [`client`]: 롱폴링 루프, 일괄 폴링, 체크포인트 관리 ([`PollClient`])
//! - [`batcher`]: 삭제 결정 배치 전송 ([`DeletionBatcher`])
//! - [`handler`]: operation 디스패치 계약
//! - [`message`]: 폴링 메시지 모델과 디코딩
//! - [`checkpoint`]: 체크포인트 저장소 계약과 구현
//! - [`transport`]: 롱폴링 전송 계층 계약
//! - [`subscription`]: 구독 등급
//! - [`config`]: 동기화 설정 (core 설정 확장)
//! - [`error`]: 도메인 에러 타입
//!
//! # 아키텍처
//!
//! ```text
//! LongPollTransport ──PollEvent──> PollClient ──decode──> OperationHandler
//!                                      │                    (decision/alert/management)
//!                                 CheckpointStore
//!
//! Vec<Decision> ──> DeletionBatcher ──chunks──> DecisionDeleteApi
//! ```

pub mod batcher;
pub mod checkpoint;
pub mod client;
pub mod config;
pub mod error;
pub mod handler;
pub mod message;
pub mod subscription;
pub mod transport;

// --- 주요 타입 re-export ---

// 클라이언트
pub use client::{PollClient, PollShutdown};

// 배치 전송기
pub use batcher::{DecisionDeleteApi, DeletionBatcher, PendingDeletions, send_deleted_decisions};

// 계약
pub use checkpoint::{
    CheckpointStore, FileCheckpointStore, MemoryCheckpointStore, PAPI_PULL_KEY,
};
pub use handler::{ChannelHandler, DispatchedMessage, OperationHandler, SyncContext, dispatch};
pub use transport::LongPollTransport;

// 메시지
pub use message::{Decision, Header, Message, OperationType, PollEvent, Source, decode};

// 설정
pub use config::PapiConfig;
pub use subscription::SubscriptionType;

// 에러
pub use error::PapiError;
