//! 롱폴링 동기화 클라이언트
//!
//! [`PollClient`]는 구독 등급에 따라 폴링을 시작/중단하고, 받은 이벤트를
//! operation 핸들러로 디스패치하며 마지막 폴링 시각을 체크포인트로 저장합니다.
//!
//! # 상태 전이
//! ```text
//!            tier -> Enterprise | SecOps
//!   ┌──────┐ ─────────────────────────> ┌─────────┐
//!   │ idle │                            │ polling │
//!   └──────┘ <───────────────────────── └─────────┘
//!            tier -> Community
//!            (poll token 취소, transport.stop(), 새 child token)
//! ```
//!
//! 실시간 이벤트는 디스패치 전에 메모리상의 체크포인트를 현재 시각으로 옮기고,
//! 디스패치가 성공하면 저장소에 기록합니다. [`PollClient::pull_once`]는
//! 최신순 배치를 시간순으로 뒤집어 처리하며 체크포인트는 건드리지 않습니다.

use std::sync::Arc;

use bulwark_core::metrics as m;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::checkpoint::{
    CheckpointStore, PAPI_PULL_KEY, format_checkpoint, parse_checkpoint, zero_time,
};
use crate::error::PapiError;
use crate::handler::{OperationHandler, SyncContext, dispatch};
use crate::message::{PollEvent, decode};
use crate::subscription::SubscriptionType;
use crate::transport::LongPollTransport;

/// 롱폴링 동기화 클라이언트
pub struct PollClient<T, S, H> {
    transport: Arc<T>,
    store: Arc<S>,
    handler: Arc<H>,
    subscription_rx: watch::Receiver<SubscriptionType>,
    stop_tx: mpsc::Sender<()>,
    stop_rx: mpsc::Receiver<()>,
    owner: CancellationToken,
}

/// 클라이언트 종료 핸들
///
/// 클라이언트 루프가 다른 태스크에서 실행 중일 때 종료를 요청합니다.
pub struct PollShutdown<T> {
    owner: CancellationToken,
    stop_tx: mpsc::Sender<()>,
    transport: Arc<T>,
}

impl<T> Clone for PollShutdown<T> {
    fn clone(&self) -> Self {
        Self {
            owner: self.owner.clone(),
            stop_tx: self.stop_tx.clone(),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<T: LongPollTransport> PollShutdown<T> {
    /// 모든 폴링을 중단합니다.
    ///
    /// 소유 토큰을 취소하고, 중단 신호를 보내고(루프가 이미 끝났으면 버림),
    /// 전송 계층을 멈춥니다.
    pub fn shutdown(&self) {
        tracing::info!("shutting down polling client");
        self.owner.cancel();
        if self.stop_tx.try_send(()).is_err() {
            tracing::debug!("stop signal dropped, poll loop already gone");
        }
        self.transport.stop();
    }
}

impl<T, S, H> PollClient<T, S, H>
where
    T: LongPollTransport,
    S: CheckpointStore,
    H: OperationHandler,
{
    /// 새 클라이언트를 생성합니다.
    ///
    /// `owner` 토큰이 취소되면 루프가 끝나며, 폴링 토큰은 항상 그 자식입니다.
    pub fn new(
        transport: Arc<T>,
        store: Arc<S>,
        handler: Arc<H>,
        subscription_rx: watch::Receiver<SubscriptionType>,
        owner: CancellationToken,
    ) -> Self {
        let (stop_tx, stop_rx) = mpsc::channel(1);
        Self {
            transport,
            store,
            handler,
            subscription_rx,
            stop_tx,
            stop_rx,
            owner,
        }
    }

    /// 종료 핸들을 반환합니다.
    pub fn shutdown_handle(&self) -> PollShutdown<T> {
        PollShutdown {
            owner: self.owner.clone(),
            stop_tx: self.stop_tx.clone(),
            transport: Arc::clone(&self.transport),
        }
    }

    /// 저장된 체크포인트를 읽습니다. 없으면 0 시각을 기록하고 반환합니다.
    ///
    /// # Errors
    /// 저장된 값이 RFC 3339 형식이 아닌 경우
    pub async fn load_checkpoint(&self) -> Result<DateTime<Utc>, PapiError> {
        let stored = match self.store.get(PAPI_PULL_KEY).await {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "failed to get last timestamp for pull");
                None
            }
        };

        match stored.filter(|v| !v.is_empty()) {
            Some(value) => parse_checkpoint(&value),
            None => {
                let zero = zero_time();
                let value = format_checkpoint(zero);
                match self.store.set(PAPI_PULL_KEY, &value).await {
                    Ok(()) => tracing::debug!(key = PAPI_PULL_KEY, value = %value, "checkpoint initialized"),
                    Err(e) => tracing::error!(error = %e, "error setting pull checkpoint"),
                }
                Ok(zero)
            }
        }
    }

    /// 폴링 루프를 실행합니다.
    ///
    /// 소유 토큰이 취소되거나 중단 신호를 받으면 끝납니다.
    ///
    /// # Errors
    /// 시작 시 체크포인트 파싱 실패
    pub async fn run(&mut self) -> Result<(), PapiError> {
        let mut last_pull = self.load_checkpoint().await?;
        let mut current = *self.subscription_rx.borrow_and_update();
        let mut poll_token = self.owner.child_token();
        let mut events: Option<mpsc::Receiver<PollEvent>> = None;
        let mut subscription_open = true;

        tracing::debug!(subscription = %current, "current subscription type");
        if current.can_poll() {
            tracing::info!(since = %last_pull, "starting pull");
            events = Some(self.transport.start(poll_token.clone(), last_pull));
            metrics::gauge!(m::PAPI_POLLING_ACTIVE).set(1.0);
        }

        loop {
            tokio::select! {
                _ = self.owner.cancelled() => {
                    tracing::info!("polling client cancelled");
                    break;
                }
                Some(()) = self.stop_rx.recv() => {
                    tracing::info!("stop signal received");
                    poll_token.cancel();
                    break;
                }
                changed = self.subscription_rx.changed(), if subscription_open => {
                    if changed.is_err() {
                        tracing::debug!("subscription notifier dropped");
                        subscription_open = false;
                        continue;
                    }
                    let tier = *self.subscription_rx.borrow_and_update();
                    if tier == current {
                        continue;
                    }
                    let was_polling = current.can_poll();
                    current = tier;
                    tracing::info!(subscription = %tier, "subscription type changed");

                    if tier.can_poll() {
                        // 유료 등급 사이의 변경도 스트림을 새 토큰으로 다시 시작
                        if was_polling {
                            tracing::info!(since = %last_pull, "restarting pull for new subscription");
                            poll_token.cancel();
                            poll_token = self.owner.child_token();
                        } else {
                            tracing::info!(since = %last_pull, "starting pull");
                        }
                        events = Some(self.transport.start(poll_token.clone(), last_pull));
                        metrics::gauge!(m::PAPI_POLLING_ACTIVE).set(1.0);
                    } else {
                        tracing::info!("stopping pull because of plan downgrade or engine removal");
                        poll_token.cancel();
                        self.transport.stop();
                        poll_token = self.owner.child_token();
                        events = None;
                        metrics::gauge!(m::PAPI_POLLING_ACTIVE).set(0.0);
                        tracing::debug!("done stopping pull");
                    }
                }
                event = next_event(&mut events) => {
                    let Some(event) = event else {
                        tracing::warn!("poll channel closed");
                        events = None;
                        continue;
                    };

                    let now = Utc::now();
                    last_pull = now;
                    let ctx = SyncContext {
                        subscription: current,
                        last_pull: Some(now),
                    };

                    if let Err(e) = self.handle_event(&event, &ctx, false).await {
                        tracing::error!(request_id = %event.request_id, error = %e, "failed to handle event");
                        continue;
                    }

                    if let Err(e) = self.store.set(PAPI_PULL_KEY, &format_checkpoint(now)).await {
                        metrics::counter!(m::PAPI_CHECKPOINT_ERRORS_TOTAL).increment(1);
                        tracing::error!(
                            request_id = %event.request_id,
                            error = %e,
                            "failed to update last timestamp"
                        );
                        continue;
                    }
                    tracing::debug!(request_id = %event.request_id, last_pull = %now, "checkpoint updated");
                }
            }
        }

        metrics::gauge!(m::PAPI_POLLING_ACTIVE).set(0.0);
        Ok(())
    }

    /// `since` 이후 이벤트를 한 번에 가져와 시간순으로 디스패치합니다.
    ///
    /// 이벤트별 에러는 로그만 남기며, 체크포인트는 갱신하지 않습니다.
    /// 처리한 이벤트 수를 반환합니다.
    ///
    /// # Errors
    /// 전송 계층 호출 실패
    pub async fn pull_once(&self, since: DateTime<Utc>, bulk: bool) -> Result<usize, PapiError> {
        let mut events = self
            .transport
            .pull_once(self.owner.child_token(), since)
            .await?;
        // 전송 계층은 최신순으로 전달
        events.reverse();

        let count = events.len();
        tracing::info!(count, "received events");

        let ctx = SyncContext {
            subscription: *self.subscription_rx.borrow(),
            last_pull: None,
        };
        for (idx, event) in events.iter().enumerate() {
            if let Err(e) = self.handle_event(event, &ctx, bulk).await {
                tracing::error!(request_id = %event.request_id, error = %e, "failed to handle event");
            }
            tracing::debug!(idx, count, "handled event");
        }

        tracing::debug!("finished handling events");
        Ok(count)
    }

    /// 이벤트 하나를 디코딩해 디스패치합니다.
    async fn handle_event(
        &self,
        event: &PollEvent,
        ctx: &SyncContext,
        bulk: bool,
    ) -> Result<(), PapiError> {
        let span = tracing::debug_span!("papi_event", request_id = %event.request_id);
        async {
            metrics::counter!(m::PAPI_EVENTS_RECEIVED_TOTAL).increment(1);
            tracing::debug!(data = %event.data, "message received");

            let result = match decode(event) {
                Ok(message) => dispatch(self.handler.as_ref(), &message, ctx, bulk).await,
                Err(e) => Err(e),
            };
            if let Err(e) = &result {
                metrics::counter!(m::PAPI_EVENTS_FAILED_TOTAL, m::LABEL_REASON => error_label(e))
                    .increment(1);
            }
            result
        }
        .instrument(span)
        .await
    }
}

async fn next_event(events: &mut Option<mpsc::Receiver<PollEvent>>) -> Option<PollEvent> {
    match events {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn error_label(err: &PapiError) -> &'static str {
    match err {
        PapiError::Decode(_) => "decode",
        PapiError::MissingHeader => "no_header",
        PapiError::MissingSource => "no_source",
        PapiError::UnknownOperation(_) => "unknown_operation",
        PapiError::Handler { .. } => "handler",
        _ => "other",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::checkpoint::MemoryCheckpointStore;
    use crate::handler::{ChannelHandler, DispatchedMessage};
    use crate::transport::MockTransport;

    type TestClient = PollClient<MockTransport, MemoryCheckpointStore, ChannelHandler>;

    struct Harness {
        client: TestClient,
        transport: Arc<MockTransport>,
        store: Arc<MemoryCheckpointStore>,
        dispatched: mpsc::Receiver<DispatchedMessage>,
        tier_tx: watch::Sender<SubscriptionType>,
    }

    fn harness(
        transport: MockTransport,
        store: MemoryCheckpointStore,
        tier: SubscriptionType,
    ) -> Harness {
        let transport = Arc::new(transport);
        let store = Arc::new(store);
        let (handler, dispatched) = ChannelHandler::new(64);
        let (tier_tx, tier_rx) = watch::channel(tier);
        let client = PollClient::new(
            Arc::clone(&transport),
            Arc::clone(&store),
            Arc::new(handler),
            tier_rx,
            CancellationToken::new(),
        );
        Harness {
            client,
            transport,
            store,
            dispatched,
            tier_tx,
        }
    }

    fn message(op: &str, ts: &str) -> String {
        format!(
            r#"{{"header":{{"operation_type":"{op}","operation_cmd":"add","timestamp":"{ts}","source":{{"user":"console"}}}},"data":null}}"#
        )
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        for _ in 0..200 {
            if cond() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("condition not reached");
    }

    #[tokio::test]
    async fn missing_checkpoint_is_initialized_to_zero() {
        let h = harness(
            MockTransport::new(),
            MemoryCheckpointStore::new(),
            SubscriptionType::Community,
        );
        let since = h.client.load_checkpoint().await.unwrap();
        assert_eq!(since, zero_time());
        assert_eq!(
            h.store.value(PAPI_PULL_KEY).as_deref(),
            Some("0001-01-01T00:00:00Z")
        );
    }

    #[tokio::test]
    async fn unparsable_checkpoint_fails_startup() {
        let mut h = harness(
            MockTransport::new(),
            MemoryCheckpointStore::with_item(PAPI_PULL_KEY, "not-a-time"),
            SubscriptionType::Enterprise,
        );
        let err = h.client.run().await.unwrap_err();
        assert!(matches!(err, PapiError::CheckpointParse { .. }));
        assert_eq!(h.transport.start_count(), 0);
    }

    #[tokio::test]
    async fn pull_once_dispatches_oldest_first() {
        let newest_first: Vec<PollEvent> = (0..5)
            .rev()
            .map(|i| {
                PollEvent::new(
                    format!("req-{i}"),
                    message("decision", &format!("2024-03-01T10:00:0{i}Z")),
                )
            })
            .collect();
        let mut h = harness(
            MockTransport::new().with_batch(newest_first),
            MemoryCheckpointStore::with_item(PAPI_PULL_KEY, "2024-01-01T00:00:00Z"),
            SubscriptionType::Enterprise,
        );

        let count = h.client.pull_once(zero_time(), true).await.unwrap();
        assert_eq!(count, 5);

        let mut stamps = Vec::new();
        while let Ok(d) = h.dispatched.try_recv() {
            assert!(d.bulk);
            stamps.push(d.message.header.timestamp.unwrap());
        }
        assert_eq!(stamps.len(), 5);
        assert!(stamps.windows(2).all(|w| w[0] < w[1]));

        // 일괄 폴링은 체크포인트를 건드리지 않음
        assert_eq!(
            h.store.value(PAPI_PULL_KEY).as_deref(),
            Some("2024-01-01T00:00:00Z")
        );
    }

    #[tokio::test]
    async fn pull_once_skips_bad_events() {
        let batch = vec![
            PollEvent::new("3", message("alert", "2024-03-01T10:00:03Z")),
            PollEvent::new("2", r#"{"header":{"operation_type":"alert"}}"#),
            PollEvent::new("1", message("reboot", "2024-03-01T10:00:01Z")),
            PollEvent::new("0", "garbage"),
        ];
        let mut h = harness(
            MockTransport::new().with_batch(batch),
            MemoryCheckpointStore::new(),
            SubscriptionType::Enterprise,
        );
        assert_eq!(h.client.pull_once(zero_time(), false).await.unwrap(), 4);
        assert_eq!(
            h.dispatched.try_recv().unwrap().message.header.operation_type,
            "alert"
        );
        assert!(h.dispatched.try_recv().is_err());
    }

    #[tokio::test]
    async fn community_tier_stays_idle_until_upgrade() {
        let Harness {
            mut client,
            transport,
            store,
            mut dispatched,
            tier_tx,
        } = harness(
            MockTransport::new(),
            MemoryCheckpointStore::new(),
            SubscriptionType::Community,
        );
        let shutdown = client.shutdown_handle();
        let task = tokio::spawn(async move { client.run().await });

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(transport.start_count(), 0);

        tier_tx.send(SubscriptionType::Enterprise).unwrap();
        wait_until(|| transport.start_count() == 1).await;

        let tx = transport.sender().unwrap();
        tx.send(PollEvent::new("r1", message("decision", "2024-03-01T10:00:00Z")))
            .await
            .unwrap();
        let got = dispatched.recv().await.unwrap();
        assert!(!got.bulk);
        wait_until(|| store.value(PAPI_PULL_KEY).as_deref() != Some("0001-01-01T00:00:00Z"))
            .await;

        // 폴링 가능한 등급 사이의 변경은 스트림을 다시 시작
        tier_tx.send(SubscriptionType::SecOps).unwrap();
        wait_until(|| transport.start_count() == 2).await;
        assert_eq!(transport.stop_count(), 0);

        tier_tx.send(SubscriptionType::Community).unwrap();
        wait_until(|| transport.stop_count() == 1).await;

        tier_tx.send(SubscriptionType::Enterprise).unwrap();
        wait_until(|| transport.start_count() == 3).await;

        shutdown.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn failed_dispatch_does_not_persist_checkpoint() {
        let Harness {
            mut client,
            transport,
            store,
            dispatched,
            tier_tx: _tier_tx,
        } = harness(
            MockTransport::new(),
            MemoryCheckpointStore::with_item(PAPI_PULL_KEY, "2024-01-01T00:00:00Z"),
            SubscriptionType::SecOps,
        );
        drop(dispatched);
        let shutdown = client.shutdown_handle();
        let task = tokio::spawn(async move { client.run().await });

        wait_until(|| transport.start_count() == 1).await;
        let tx = transport.sender().unwrap();
        tx.send(PollEvent::new("r1", message("decision", "2024-03-01T10:00:00Z")))
            .await
            .unwrap();
        tx.send(PollEvent::new("r2", "{}")).await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(
            store.value(PAPI_PULL_KEY).as_deref(),
            Some("2024-01-01T00:00:00Z")
        );

        shutdown.shutdown();
        task.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn stop_signal_ends_loop() {
        let mut h = harness(
            MockTransport::new(),
            MemoryCheckpointStore::new(),
            SubscriptionType::Enterprise,
        );
        h.client.stop_tx.try_send(()).unwrap();
        h.client.run().await.unwrap();
        assert_eq!(h.transport.start_count(), 1);
    }

    #[tokio::test]
    async fn shutdown_after_loop_exit_does_not_block() {
        let mut h = harness(
            MockTransport::new(),
            MemoryCheckpointStore::new(),
            SubscriptionType::Community,
        );
        let shutdown = h.client.shutdown_handle();
        shutdown.shutdown();
        h.client.run().await.unwrap();
        // 루프가 끝난 뒤에도 다시 호출 가능
        shutdown.shutdown();
        assert_eq!(h.transport.stop_count(), 2);
    }
}
