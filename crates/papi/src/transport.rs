//! 롱폴링 전송 계층 추상화
//!
//! HTTP 롱폴링 구현은 이 crate 밖에 있으며, [`LongPollTransport`] trait으로만
//! 소비합니다. 테스트에서는 `MockTransport`를 사용합니다.
//!
//! ```text
//! PollClient ──start(token, since)──> LongPollTransport ──mpsc<PollEvent>──> PollClient
//!            ──pull_once(since)─────>                   ──Vec<PollEvent> (newest first)
//!            ──stop()───────────────>
//! ```

use std::future::Future;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::error::PapiError;
use crate::message::PollEvent;

/// 롱폴링 전송 계층
pub trait LongPollTransport: Send + Sync + 'static {
    /// `since` 이후 이벤트의 실시간 폴링을 시작합니다.
    ///
    /// 반환된 채널은 토큰이 취소되거나 [`stop`](Self::stop)이 호출되면 닫힙니다.
    fn start(&self, token: CancellationToken, since: DateTime<Utc>) -> mpsc::Receiver<PollEvent>;

    /// `since` 이후 이벤트를 한 번에 가져옵니다. 최신 이벤트가 먼저 옵니다.
    fn pull_once(
        &self,
        token: CancellationToken,
        since: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<PollEvent>, PapiError>> + Send;

    /// 진행 중인 폴링을 중단합니다.
    fn stop(&self);
}

/// 테스트용 Mock 전송 계층
///
/// `start`가 호출될 때마다 새 채널을 만들고 송신측을 보관하므로,
/// 테스트는 [`MockTransport::sender`]로 이벤트를 밀어 넣을 수 있습니다.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MockTransport {
    /// `start` 호출 기록 (since)
    pub starts: std::sync::Mutex<Vec<DateTime<Utc>>>,
    /// 가장 최근 `start`의 송신측
    pub sender: std::sync::Mutex<Option<mpsc::Sender<PollEvent>>>,
    /// `stop` 호출 수
    pub stops: std::sync::atomic::AtomicUsize,
    /// `pull_once`가 반환할 배치
    pub batch: Vec<PollEvent>,
}

#[cfg(test)]
impl MockTransport {
    /// 빈 Mock을 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// `pull_once` 응답을 설정합니다.
    pub fn with_batch(mut self, batch: Vec<PollEvent>) -> Self {
        self.batch = batch;
        self
    }

    /// 가장 최근 `start`의 송신측
    pub fn sender(&self) -> Option<mpsc::Sender<PollEvent>> {
        self.sender
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// `start` 호출 수
    pub fn start_count(&self) -> usize {
        self.starts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// `stop` 호출 수
    pub fn stop_count(&self) -> usize {
        self.stops.load(std::sync::atomic::Ordering::SeqCst)
    }
}

#[cfg(test)]
impl LongPollTransport for MockTransport {
    fn start(&self, _token: CancellationToken, since: DateTime<Utc>) -> mpsc::Receiver<PollEvent> {
        let (tx, rx) = mpsc::channel(16);
        self.starts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(since);
        *self
            .sender
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(tx);
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
        self.stops
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        self.sender
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
    }
}
