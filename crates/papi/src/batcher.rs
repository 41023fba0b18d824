//! 삭제 결정 배치 전송기
//!
//! 로컬에서 삭제된 결정의 UUID를 캐시에 모았다가 주기적으로(기본 10초),
//! 그리고 종료 시 한 번 더 중앙 API로 전송합니다.
//!
//! ```text
//! Vec<Decision> ──mpsc──> DeletionBatcher ──(tick / shutdown)──> spawn(send)
//!                              │                                    │
//!                         cache (Mutex)                chunks(50), timeout 5s each
//! ```
//!
//! 전송은 best-effort입니다. 청크 하나가 실패하면 남은 청크는 버려지고
//! 다시 큐에 넣지 않습니다.

use std::future::Future;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use bulwark_core::metrics as m;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::config::PapiConfig;
use crate::error::PapiError;
use crate::message::Decision;

/// 결정 삭제 API
pub trait DecisionDeleteApi: Send + Sync + 'static {
    /// 주어진 UUID의 결정 삭제를 중앙에 알립니다.
    fn delete_decisions(
        &self,
        uuids: &[String],
    ) -> impl Future<Output = Result<(), PapiError>> + Send;
}

/// UUID 목록을 `chunk_size` 단위로 나눠 전송합니다.
///
/// 각 청크는 `timeout` 안에 끝나야 하며, 첫 실패에서 중단합니다.
/// 전송한 UUID 수를 반환합니다.
///
/// # Errors
/// - API 호출 실패
/// - 청크 타임아웃 (`PapiError::Timeout`)
pub async fn send_deleted_decisions<A: DecisionDeleteApi>(
    api: &A,
    uuids: &[String],
    chunk_size: usize,
    timeout: Duration,
) -> Result<usize, PapiError> {
    let mut sent = 0;
    for chunk in uuids.chunks(chunk_size.max(1)) {
        match tokio::time::timeout(timeout, api.delete_decisions(chunk)).await {
            Ok(Ok(())) => {
                sent += chunk.len();
                metrics::counter!(m::PAPI_DELETED_DECISIONS_SENT_TOTAL).increment(chunk.len() as u64);
                tracing::debug!(count = chunk.len(), "sent deleted decisions chunk");
            }
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(PapiError::Timeout {
                    timeout_secs: timeout.as_secs(),
                });
            }
        }
    }
    Ok(sent)
}

/// 대기 중인 삭제 결정 캐시의 읽기 핸들
#[derive(Debug, Clone)]
pub struct PendingDeletions {
    cache: Arc<Mutex<Vec<String>>>,
}

impl PendingDeletions {
    /// 대기 중인 UUID 수
    pub fn len(&self) -> usize {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// 대기 중인 UUID가 없는지 여부
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 삭제 결정 배치 전송기
pub struct DeletionBatcher<A> {
    config: PapiConfig,
    api: Arc<A>,
    cache: Arc<Mutex<Vec<String>>>,
    rx: mpsc::Receiver<Vec<Decision>>,
    token: CancellationToken,
}

impl<A: DecisionDeleteApi> DeletionBatcher<A> {
    /// 새 전송기와 삭제 결정 송신측을 생성합니다.
    pub fn new(
        config: PapiConfig,
        api: Arc<A>,
        token: CancellationToken,
    ) -> (Self, mpsc::Sender<Vec<Decision>>) {
        let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));
        let batcher = Self {
            config,
            api,
            cache: Arc::new(Mutex::new(Vec::new())),
            rx,
            token,
        };
        (batcher, tx)
    }

    /// 캐시 읽기 핸들
    pub fn pending(&self) -> PendingDeletions {
        PendingDeletions {
            cache: Arc::clone(&self.cache),
        }
    }

    /// 전송 루프를 실행합니다.
    ///
    /// 첫 전송은 한 주기가 지난 뒤입니다. 토큰이 취소되면 캐시에 남은
    /// 항목을 마지막으로 전송하는 태스크의 핸들을 반환합니다(비어 있으면 `None`).
    pub async fn run(mut self) -> Option<JoinHandle<()>> {
        let period = self.config.sync_interval();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        let mut inbound_open = true;

        tracing::debug!(
            interval_secs = self.config.sync_interval_secs,
            shares = self.config.shares_deletions(),
            "starting deleted decisions sync"
        );

        loop {
            tokio::select! {
                _ = self.token.cancelled() => {
                    tracing::info!("sync decisions stopping, flushing pending deletions");
                    return self.flush();
                }
                _ = ticker.tick() => {
                    // 전송 완료를 기다리지 않음
                    let _ = self.flush();
                }
                batch = self.rx.recv(), if inbound_open => match batch {
                    Some(decisions) => self.enqueue(decisions),
                    None => {
                        tracing::debug!("deleted decisions channel closed");
                        inbound_open = false;
                    }
                },
            }
        }
    }

    fn enqueue(&self, decisions: Vec<Decision>) {
        if !self.config.shares_deletions() {
            tracing::debug!(count = decisions.len(), "decision sharing disabled, ignoring deletions");
            return;
        }

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache.extend(
            decisions
                .into_iter()
                .map(|d| d.uuid)
                .filter(|uuid| !uuid.is_empty()),
        );
        metrics::gauge!(m::PAPI_PENDING_DELETIONS).set(cache.len() as f64);
    }

    /// 캐시를 비우고 전송 태스크를 시작합니다.
    fn flush(&self) -> Option<JoinHandle<()>> {
        let batch = {
            let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
            if cache.is_empty() {
                return None;
            }
            std::mem::take(&mut *cache)
        };
        metrics::gauge!(m::PAPI_PENDING_DELETIONS).set(0.0);

        let api = Arc::clone(&self.api);
        let chunk_size = self.config.batch_size;
        let timeout = self.config.batch_timeout();
        tracing::debug!(count = batch.len(), "sending deleted decisions");

        Some(tokio::spawn(async move {
            match send_deleted_decisions(api.as_ref(), &batch, chunk_size, timeout).await {
                Ok(sent) => tracing::info!(sent, "deleted decisions sent"),
                Err(e) => tracing::error!(error = %e, pending = batch.len(), "sending deleted decisions failed"),
            }
        }))
    }
}
