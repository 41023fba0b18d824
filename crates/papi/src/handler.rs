//! operation 디스패치
//!
//! 디코딩된 메시지는 헤더의 `operation_type`에 따라 [`OperationHandler`]의
//! `decision`, `alert`, `management` 중 하나로 전달됩니다. 핸들러는 메시지,
//! 현재 동기화 상태([`SyncContext`]), 일괄 폴링 여부(`bulk`)를 받습니다.

use std::future::Future;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

use crate::error::PapiError;
use crate::message::{Message, OperationType};
use crate::subscription::SubscriptionType;

/// 핸들러에 전달되는 동기화 상태
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncContext {
    /// 현재 구독 등급
    pub subscription: SubscriptionType,
    /// 마지막으로 기록된 폴링 시각
    pub last_pull: Option<DateTime<Utc>>,
}

/// operation 핸들러
pub trait OperationHandler: Send + Sync + 'static {
    /// `decision` operation
    fn decision(
        &self,
        message: &Message,
        ctx: &SyncContext,
        bulk: bool,
    ) -> impl Future<Output = Result<(), PapiError>> + Send;

    /// `alert` operation
    fn alert(
        &self,
        message: &Message,
        ctx: &SyncContext,
        bulk: bool,
    ) -> impl Future<Output = Result<(), PapiError>> + Send;

    /// `management` operation
    fn management(
        &self,
        message: &Message,
        ctx: &SyncContext,
        bulk: bool,
    ) -> impl Future<Output = Result<(), PapiError>> + Send;
}

/// 메시지를 operation 종류에 맞는 핸들러로 전달합니다.
///
/// # Errors
/// - 알 수 없는 operation (`PapiError::UnknownOperation`)
/// - 핸들러 실패 (`PapiError::Handler`)
pub async fn dispatch<H: OperationHandler>(
    handler: &H,
    message: &Message,
    ctx: &SyncContext,
    bulk: bool,
) -> Result<(), PapiError> {
    let operation = message.operation()?;
    tracing::debug!(operation = %operation, cmd = %message.header.operation_cmd, bulk, "calling operation");

    let result = match operation {
        OperationType::Decision => handler.decision(message, ctx, bulk).await,
        OperationType::Alert => handler.alert(message, ctx, bulk).await,
        OperationType::Management => handler.management(message, ctx, bulk).await,
    };

    result.map_err(|e| match e {
        PapiError::Handler { .. } => e,
        other => PapiError::Handler {
            operation: operation.to_string(),
            cmd: message.header.operation_cmd.clone(),
            reason: other.to_string(),
        },
    })
}

/// 채널로 전달된 메시지
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchedMessage {
    /// operation 종류
    pub operation: OperationType,
    /// 메시지
    pub message: Message,
    /// 일괄 폴링 여부
    pub bulk: bool,
}

/// 받은 메시지를 그대로 채널로 넘기는 핸들러
///
/// 결정/알림 저장소를 가진 쪽(데몬 등)이 수신측을 소유합니다.
#[derive(Debug, Clone)]
pub struct ChannelHandler {
    tx: mpsc::Sender<DispatchedMessage>,
}

impl ChannelHandler {
    /// 새 핸들러와 수신측을 생성합니다.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<DispatchedMessage>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    async fn forward(
        &self,
        operation: OperationType,
        message: &Message,
        bulk: bool,
    ) -> Result<(), PapiError> {
        self.tx
            .send(DispatchedMessage {
                operation,
                message: message.clone(),
                bulk,
            })
            .await
            .map_err(|_| PapiError::Channel("dispatch receiver dropped".to_owned()))
    }
}

impl OperationHandler for ChannelHandler {
    async fn decision(
        &self,
        message: &Message,
        _ctx: &SyncContext,
        bulk: bool,
    ) -> Result<(), PapiError> {
        self.forward(OperationType::Decision, message, bulk).await
    }

    async fn alert(
        &self,
        message: &Message,
        _ctx: &SyncContext,
        bulk: bool,
    ) -> Result<(), PapiError> {
        self.forward(OperationType::Alert, message, bulk).await
    }

    async fn management(
        &self,
        message: &Message,
        _ctx: &SyncContext,
        bulk: bool,
    ) -> Result<(), PapiError> {
        self.forward(OperationType::Management, message, bulk).await
    }
}
