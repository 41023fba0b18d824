//! 통합 테스트 -- 동기화 클라이언트와 배치 전송기 전체 흐름 검증
//!
//! 전송 계층, 핸들러, 삭제 API는 테스트 전용 구현을 사용하고
//! 체크포인트는 실제 파일 저장소에 기록합니다.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use bulwark_core::BulwarkConfig;
use bulwark_papi::{
    CheckpointStore, Decision, DecisionDeleteApi, DeletionBatcher, FileCheckpointStore,
    LongPollTransport, Message, OperationHandler, OperationType, PAPI_PULL_KEY, PapiConfig,
    PapiError, PollClient, PollEvent, SubscriptionType, SyncContext,
};
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct FakeTransport {
    since: Mutex<Vec<DateTime<Utc>>>,
    sender: Mutex<Option<mpsc::Sender<PollEvent>>>,
    batch: Vec<PollEvent>,
}

impl FakeTransport {
    fn sender(&self) -> Option<mpsc::Sender<PollEvent>> {
        self.sender.lock().unwrap().clone()
    }

    fn starts(&self) -> Vec<DateTime<Utc>> {
        self.since.lock().unwrap().clone()
    }
}

impl LongPollTransport for FakeTransport {
    fn start(&self, _token: CancellationToken, since: DateTime<Utc>) -> mpsc::Receiver<PollEvent> {
        let (tx, rx) = mpsc::channel(8);
        self.since.lock().unwrap().push(since);
        *self.sender.lock().unwrap() = Some(tx);
        rx
    }

    async fn pull_once(
        &self,
        _token: CancellationToken,
        _since: DateTime<Utc>,
    ) -> Result<Vec<PollEvent>, PapiError> {
        Ok(self.batch.clone())
    }

    fn stop(&self) {
        self.sender.lock().unwrap().take();
    }
}

#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<(OperationType, String, bool)>>,
}

impl Recorder {
    fn record(&self, op: OperationType, message: &Message, bulk: bool) {
        self.seen
            .lock()
            .unwrap()
            .push((op, message.header.uuid.clone(), bulk));
    }

    fn uuids(&self) -> Vec<String> {
        self.seen.lock().unwrap().iter().map(|s| s.1.clone()).collect()
    }
}

impl OperationHandler for Recorder {
    async fn decision(&self, m: &Message, _ctx: &SyncContext, bulk: bool) -> Result<(), PapiError> {
        self.record(OperationType::Decision, m, bulk);
        Ok(())
    }

    async fn alert(&self, m: &Message, _ctx: &SyncContext, bulk: bool) -> Result<(), PapiError> {
        self.record(OperationType::Alert, m, bulk);
        Ok(())
    }

    async fn management(&self, m: &Message, ctx: &SyncContext, bulk: bool) -> Result<(), PapiError> {
        if !ctx.subscription.can_poll() {
            return Err(PapiError::Api("management requires a paid plan".to_owned()));
        }
        self.record(OperationType::Management, m, bulk);
        Ok(())
    }
}

#[derive(Default)]
struct FakeDeleteApi {
    calls: Mutex<Vec<usize>>,
}

impl DecisionDeleteApi for FakeDeleteApi {
    async fn delete_decisions(&self, uuids: &[String]) -> Result<(), PapiError> {
        self.calls.lock().unwrap().push(uuids.len());
        Ok(())
    }
}

fn event(uuid: &str, op: &str, ts: &str) -> PollEvent {
    PollEvent::new(
        format!("req-{uuid}"),
        format!(
            r#"{{"header":{{"operation_type":"{op}","operation_cmd":"add","uuid":"{uuid}","timestamp":"{ts}","source":{{"user":"console"}}}},"data":{{}}}}"#
        ),
    )
}

async fn eventually(mut cond: impl FnMut() -> bool) {
    for _ in 0..200 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached");
}

/// 실시간 이벤트는 도착 순서대로 디스패치되고 체크포인트가 파일에 남음
#[tokio::test]
async fn test_live_events_persist_checkpoint_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("papi.json");
    let store = Arc::new(FileCheckpointStore::new(&path));
    let transport = Arc::new(FakeTransport::default());
    let recorder = Arc::new(Recorder::default());
    let (_tier_tx, tier_rx) = watch::channel(SubscriptionType::Enterprise);

    let mut client = PollClient::new(
        Arc::clone(&transport),
        Arc::clone(&store),
        Arc::clone(&recorder),
        tier_rx.clone(),
        CancellationToken::new(),
    );
    let shutdown = client.shutdown_handle();
    let task = tokio::spawn(async move { client.run().await });

    eventually(|| transport.sender().is_some()).await;
    let tx = transport.sender().unwrap();
    for uuid in ["a", "b", "c"] {
        tx.send(event(uuid, "alert", "2024-03-01T10:00:00Z"))
            .await
            .unwrap();
    }
    eventually(|| recorder.uuids().len() == 3).await;
    assert_eq!(recorder.uuids(), vec!["a", "b", "c"]);

    shutdown.shutdown();
    task.await.unwrap().unwrap();

    let stored = store.get(PAPI_PULL_KEY).await.unwrap().unwrap();
    let persisted = DateTime::parse_from_rfc3339(&stored).unwrap().with_timezone(&Utc);
    assert!(persisted > transport.starts()[0]);

    // 재시작하면 저장된 시각부터 폴링
    let restarted = Arc::new(FakeTransport::default());
    let mut client = PollClient::new(
        Arc::clone(&restarted),
        Arc::new(FileCheckpointStore::new(&path)),
        Arc::new(Recorder::default()),
        tier_rx,
        CancellationToken::new(),
    );
    let shutdown = client.shutdown_handle();
    let task = tokio::spawn(async move { client.run().await });
    eventually(|| !restarted.starts().is_empty()).await;
    assert_eq!(restarted.starts(), vec![persisted]);

    shutdown.shutdown();
    task.await.unwrap().unwrap();
}

/// 일괄 폴링은 최신순 배치를 시간순으로 재생하고 bulk 플래그를 전달
#[tokio::test]
async fn test_pull_once_replays_chronologically() {
    let transport = Arc::new(FakeTransport {
        batch: vec![
            event("3", "decision", "2024-03-01T10:00:03Z"),
            event("2", "management", "2024-03-01T10:00:02Z"),
            event("1", "alert", "2024-03-01T10:00:01Z"),
        ],
        ..Default::default()
    });
    let recorder = Arc::new(Recorder::default());
    let store = Arc::new(bulwark_papi::MemoryCheckpointStore::with_item(
        PAPI_PULL_KEY,
        "2024-01-01T00:00:00Z",
    ));
    let (_tier_tx, tier_rx) = watch::channel(SubscriptionType::Community);

    let client = PollClient::new(
        transport,
        Arc::clone(&store),
        Arc::clone(&recorder),
        tier_rx,
        CancellationToken::new(),
    );
    let since = client.load_checkpoint().await.unwrap();
    let count = client.pull_once(since, true).await.unwrap();
    assert_eq!(count, 3);

    // community 등급에서 management는 실패하지만 나머지는 처리됨
    let seen = recorder.seen.lock().unwrap().clone();
    assert_eq!(
        seen,
        vec![
            (OperationType::Alert, "1".to_owned(), true),
            (OperationType::Decision, "3".to_owned(), true),
        ]
    );
    assert_eq!(
        store.value(PAPI_PULL_KEY).as_deref(),
        Some("2024-01-01T00:00:00Z")
    );
}

/// 등급 하향 후 재상향하면 마지막 체크포인트부터 다시 폴링
#[tokio::test]
async fn test_tier_downgrade_and_upgrade() {
    let transport = Arc::new(FakeTransport::default());
    let recorder = Arc::new(Recorder::default());
    let store = Arc::new(bulwark_papi::MemoryCheckpointStore::new());
    let (tier_tx, tier_rx) = watch::channel(SubscriptionType::SecOps);

    let mut client = PollClient::new(
        Arc::clone(&transport),
        store,
        Arc::clone(&recorder),
        tier_rx,
        CancellationToken::new(),
    );
    let shutdown = client.shutdown_handle();
    let task = tokio::spawn(async move { client.run().await });

    eventually(|| transport.starts().len() == 1).await;
    transport
        .sender()
        .unwrap()
        .send(event("x", "decision", "2024-03-01T10:00:00Z"))
        .await
        .unwrap();
    eventually(|| recorder.uuids().len() == 1).await;

    tier_tx.send(SubscriptionType::Community).unwrap();
    eventually(|| transport.sender().is_none()).await;

    tier_tx.send(SubscriptionType::Enterprise).unwrap();
    eventually(|| transport.starts().len() == 2).await;
    let starts = transport.starts();
    assert!(starts[1] > starts[0]);

    shutdown.shutdown();
    task.await.unwrap().unwrap();
}

/// 종료 시 남은 삭제 결정이 50개 단위로 전송됨
#[tokio::test]
async fn test_batcher_final_flush_in_chunks() {
    let api = Arc::new(FakeDeleteApi::default());
    let token = CancellationToken::new();
    let config = PapiConfig {
        share_manual_decisions: true,
        sync_interval_secs: 3600,
        ..PapiConfig::default()
    };
    let (batcher, tx) = DeletionBatcher::new(config, Arc::clone(&api), token.clone());
    let pending = batcher.pending();
    let task = tokio::spawn(batcher.run());

    let decisions: Vec<Decision> = (0..120)
        .map(|_| Decision::with_uuid(uuid::Uuid::new_v4().to_string()))
        .collect();
    tx.send(decisions).await.unwrap();
    eventually(|| pending.len() == 120).await;

    token.cancel();
    let flush = task.await.unwrap().expect("pending deletions flushed");
    flush.await.unwrap();

    assert_eq!(*api.calls.lock().unwrap(), vec![50, 50, 20]);
    assert!(pending.is_empty());
}

/// core 설정에서 동기화 설정 생성
#[test]
fn test_papi_config_from_core_sections() {
    let mut core = BulwarkConfig::default();
    core.papi.subscription = "SecOps".to_owned();
    core.console.console_management = true;

    let config = PapiConfig::from_core(&core.papi, &core.console).unwrap();
    assert_eq!(config.subscription, SubscriptionType::SecOps);
    assert!(config.shares_deletions());
    config.validate().unwrap();

    core.papi.subscription = "platinum".to_owned();
    assert!(PapiConfig::from_core(&core.papi, &core.console).is_err());
}
