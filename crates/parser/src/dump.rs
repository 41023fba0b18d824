//! 진단용 스테이지 덤프
//!
//! 활성화되면 노드 호출마다 `stage → node → [결과]` 형태로 이벤트 스냅샷을
//! 기록합니다. 여러 이벤트가 병렬로 처리될 수 있으므로 하나의 뮤텍스로 보호하며,
//! 파이프라인 의미에는 영향을 주지 않습니다.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use bulwark_core::event::Event;
use serde::{Deserialize, Serialize};

use crate::error::ParserError;

/// 노드 호출 한 번의 기록
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    /// 노드 처리 직후의 이벤트 스냅샷
    pub evt: Event,
    /// 매칭 여부
    pub success: bool,
    /// 스테이지 안에서 노드가 처음 기록된 순서
    pub idx: usize,
}

/// 스테이지 → 노드 → 결과 목록
pub type DumpTree = BTreeMap<String, BTreeMap<String, Vec<NodeResult>>>;

/// 스테이지 덤프 저장소
#[derive(Debug, Default)]
pub struct StageDump {
    tree: Mutex<DumpTree>,
}

impl StageDump {
    /// 빈 덤프를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 노드 호출 결과를 기록합니다.
    pub fn record(&self, stage: &str, node: &str, evt: &Event, success: bool) {
        let mut tree = self.tree.lock().unwrap_or_else(PoisonError::into_inner);
        let nodes = tree.entry(stage.to_owned()).or_default();
        let idx = match nodes.get(node).and_then(|results| results.first()) {
            Some(first) => first.idx,
            None => nodes.len(),
        };
        nodes.entry(node.to_owned()).or_default().push(NodeResult {
            evt: evt.clone(),
            success,
            idx,
        });
    }

    /// 현재까지의 기록을 복사해 반환합니다.
    pub fn snapshot(&self) -> DumpTree {
        self.tree
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// 기록된 노드 호출 수
    pub fn len(&self) -> usize {
        self.tree
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .flat_map(|nodes| nodes.values())
            .map(Vec::len)
            .sum()
    }

    /// 기록이 비어 있는지 여부
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 기록을 비웁니다.
    pub fn clear(&self) {
        self.tree
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    /// 기록을 JSON 파일로 저장합니다.
    pub async fn write_to(&self, path: impl AsRef<Path>) -> Result<(), ParserError> {
        let path = path.as_ref();
        let body = serde_json::to_vec_pretty(&self.snapshot())?;
        tokio::fs::write(path, body).await?;
        tracing::info!(path = %path.display(), "parser dump written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn idx_is_assigned_on_first_record() {
        let dump = StageDump::new();
        let evt = Event::default();
        dump.record("s00", "a", &evt, true);
        dump.record("s00", "b", &evt, false);
        dump.record("s00", "a", &evt, false);
        dump.record("s01", "c", &evt, true);

        let tree = dump.snapshot();
        assert_eq!(tree["s00"]["a"].len(), 2);
        assert_eq!(tree["s00"]["a"][1].idx, 0);
        assert_eq!(tree["s00"]["b"][0].idx, 1);
        assert_eq!(tree["s01"]["c"][0].idx, 0);
        assert_eq!(dump.len(), 4);
    }

    #[test]
    fn concurrent_writers() {
        let dump = Arc::new(StageDump::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let dump = Arc::clone(&dump);
                std::thread::spawn(move || {
                    for _ in 0..100 {
                        dump.record("s00", &format!("node-{}", i % 2), &Event::default(), true);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(dump.len(), 800);
    }

    #[tokio::test]
    async fn write_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dump.json");
        let dump = StageDump::new();
        dump.record("s00", "a", &Event::from_line("x"), true);
        dump.write_to(&path).await.unwrap();

        let body = tokio::fs::read_to_string(&path).await.unwrap();
        let tree: DumpTree = serde_json::from_str(&body).unwrap();
        assert!(tree["s00"]["a"][0].success);
        assert_eq!(tree["s00"]["a"][0].evt.line.raw, "x");
    }
}
