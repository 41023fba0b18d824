//! 폴링 체크포인트 저장소
//!
//! 마지막 폴링 시각은 [`PAPI_PULL_KEY`] 키 하나에 RFC 3339 문자열로 저장됩니다.
//! 저장소 구현은 [`CheckpointStore`] trait 뒤에 숨겨져 있으며,
//! 데몬은 [`FileCheckpointStore`], 테스트는 [`MemoryCheckpointStore`]를 사용합니다.

use std::collections::HashMap;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, SecondsFormat, TimeZone, Utc};

use crate::error::PapiError;

/// 폴링 체크포인트 키
pub const PAPI_PULL_KEY: &str = "papi:last_pull";

/// 키/값 설정 저장소 (`get`/`set`만 사용)
pub trait CheckpointStore: Send + Sync + 'static {
    /// 값을 조회합니다. 키가 없으면 `None`.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, PapiError>> + Send;

    /// 값을 저장합니다.
    fn set(&self, key: &str, value: &str) -> impl Future<Output = Result<(), PapiError>> + Send;
}

/// 처음 폴링할 때 사용하는 0 시각 (`0001-01-01T00:00:00Z`)
pub fn zero_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

/// 체크포인트 시각을 저장 형식으로 변환합니다.
pub fn format_checkpoint(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

/// 저장된 체크포인트 문자열을 파싱합니다.
///
/// # Errors
/// RFC 3339 형식이 아닌 경우
pub fn parse_checkpoint(value: &str) -> Result<DateTime<Utc>, PapiError> {
    DateTime::parse_from_rfc3339(value.trim())
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| PapiError::CheckpointParse {
            value: value.to_owned(),
            reason: e.to_string(),
        })
}

/// 인메모리 저장소
#[derive(Debug, Default)]
pub struct MemoryCheckpointStore {
    items: Mutex<HashMap<String, String>>,
}

impl MemoryCheckpointStore {
    /// 빈 저장소를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 초기 값을 가진 저장소를 생성합니다.
    pub fn with_item(key: impl Into<String>, value: impl Into<String>) -> Self {
        let store = Self::new();
        store
            .items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), value.into());
        store
    }

    /// 현재 값을 동기적으로 조회합니다.
    pub fn value(&self, key: &str) -> Option<String> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PapiError> {
        Ok(self.value(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PapiError> {
        self.items
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

/// JSON 파일 기반 저장소
///
/// 파일 전체를 `{ key: value }` 객체로 읽고 씁니다. 쓰기는 임시 파일에
/// 기록한 뒤 rename하므로 중간에 중단되어도 이전 내용이 유지됩니다.
#[derive(Debug)]
pub struct FileCheckpointStore {
    path: PathBuf,
    lock: tokio::sync::Mutex<()>,
}

impl FileCheckpointStore {
    /// 지정한 경로의 저장소를 생성합니다. 파일은 첫 `set`에서 만들어집니다.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: tokio::sync::Mutex::new(()),
        }
    }

    /// 파일 경로
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<HashMap<String, String>, PapiError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(body) if body.trim().is_empty() => Ok(HashMap::new()),
            Ok(body) => serde_json::from_str(&body).map_err(|e| {
                PapiError::Checkpoint(format!("{}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }
}

impl CheckpointStore for FileCheckpointStore {
    async fn get(&self, key: &str) -> Result<Option<String>, PapiError> {
        let _guard = self.lock.lock().await;
        Ok(self.read_all().await?.remove(key))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), PapiError> {
        let _guard = self.lock.lock().await;
        let mut items = self.read_all().await?;
        items.insert(key.to_owned(), value.to_owned());

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(&items)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}
