//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다. 레코더가 설치되지 않은 경우 호출은 no-op입니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `bulwark_`
//! - 모듈명: `parser_`, `papi_`
//! - 접미어: `_total` (counter), 없음 (gauge)

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 노드 이름 레이블 키
pub const LABEL_NODE: &str = "node";

/// 스테이지 이름 레이블 키
pub const LABEL_STAGE: &str = "stage";

/// 화이트리스트 사유 레이블 키
pub const LABEL_REASON: &str = "reason";

/// 이벤트 종류 레이블 키 (log, overflow, appsec)
pub const LABEL_TYPE: &str = "type";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

/// 동작 유형 레이블 키 (decision, alert, management)
pub const LABEL_OPERATION: &str = "operation";

// ─── Parser 메트릭 ────────────────────────────────────────────────

/// Parser: 파이프라인에 들어온 이벤트 수 (counter)
pub const PARSER_EVENTS_TOTAL: &str = "bulwark_parser_events_total";

/// Parser: 모든 스테이지를 통과한 이벤트 수 (counter)
pub const PARSER_EVENTS_PROCESSED_TOTAL: &str = "bulwark_parser_events_processed_total";

/// Parser: 노드 평가 에러로 중단된 이벤트 수 (counter)
pub const PARSER_EVENTS_FAILED_TOTAL: &str = "bulwark_parser_events_failed_total";

/// Parser: 노드 평가 횟수 (counter, label: node, stage)
pub const PARSER_NODE_HITS_TOTAL: &str = "bulwark_parser_node_hits_total";

/// Parser: 노드 매칭 성공 횟수 (counter, label: node, stage)
pub const PARSER_NODE_HITS_OK_TOTAL: &str = "bulwark_parser_node_hits_ok_total";

/// Parser: 노드 매칭 실패 횟수 (counter, label: node, stage)
pub const PARSER_NODE_HITS_KO_TOTAL: &str = "bulwark_parser_node_hits_ko_total";

/// Parser: IP 화이트리스트 검사 횟수 (counter, label: node, reason)
pub const PARSER_WHITELIST_HITS_TOTAL: &str = "bulwark_parser_whitelist_hits_total";

/// Parser: IP 화이트리스트 적중 횟수 (counter, label: node, reason)
pub const PARSER_WHITELIST_HITS_OK_TOTAL: &str = "bulwark_parser_whitelist_hits_ok_total";

/// Parser: 로드된 노드 수 (gauge)
pub const PARSER_NODES_LOADED: &str = "bulwark_parser_nodes_loaded";

// ─── PAPI 메트릭 ──────────────────────────────────────────────────

/// PAPI: 수신한 폴링 이벤트 수 (counter, label: operation)
pub const PAPI_EVENTS_RECEIVED_TOTAL: &str = "bulwark_papi_events_received_total";

/// PAPI: 디스패치 실패 수 (counter)
pub const PAPI_EVENTS_FAILED_TOTAL: &str = "bulwark_papi_events_failed_total";

/// PAPI: 체크포인트 저장 실패 수 (counter)
pub const PAPI_CHECKPOINT_ERRORS_TOTAL: &str = "bulwark_papi_checkpoint_errors_total";

/// PAPI: 전송된 삭제 결정 수 (counter, label: result)
pub const PAPI_DELETED_DECISIONS_SENT_TOTAL: &str = "bulwark_papi_deleted_decisions_sent_total";

/// PAPI: 대기 중인 삭제 결정 수 (gauge)
pub const PAPI_PENDING_DELETIONS: &str = "bulwark_papi_pending_deletions";

/// PAPI: 폴링 활성 여부 (gauge, 0 또는 1)
pub const PAPI_POLLING_ACTIVE: &str = "bulwark_papi_polling_active";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// 전역 레코더 설치 후 한 번 호출합니다. 일반적으로 `bulwark-daemon`의
/// 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    // Parser
    describe_counter!(
        PARSER_EVENTS_TOTAL,
        "Total number of events submitted to the stage pipeline"
    );
    describe_counter!(
        PARSER_EVENTS_PROCESSED_TOTAL,
        "Total number of events that passed every configured stage"
    );
    describe_counter!(
        PARSER_EVENTS_FAILED_TOTAL,
        "Total number of events aborted by a node evaluation error"
    );
    describe_counter!(PARSER_NODE_HITS_TOTAL, "Node evaluations per node and stage");
    describe_counter!(PARSER_NODE_HITS_OK_TOTAL, "Successful node matches");
    describe_counter!(PARSER_NODE_HITS_KO_TOTAL, "Failed node matches");
    describe_counter!(
        PARSER_WHITELIST_HITS_TOTAL,
        "IP whitelist checks performed per node"
    );
    describe_counter!(
        PARSER_WHITELIST_HITS_OK_TOTAL,
        "IP whitelist checks that matched per node"
    );
    describe_gauge!(PARSER_NODES_LOADED, "Number of parser nodes currently loaded");

    // PAPI
    describe_counter!(
        PAPI_EVENTS_RECEIVED_TOTAL,
        "Total number of polled events received per operation type"
    );
    describe_counter!(
        PAPI_EVENTS_FAILED_TOTAL,
        "Total number of polled events that failed to decode or dispatch"
    );
    describe_counter!(
        PAPI_CHECKPOINT_ERRORS_TOTAL,
        "Total number of pull checkpoint persistence failures"
    );
    describe_counter!(
        PAPI_DELETED_DECISIONS_SENT_TOTAL,
        "Deleted decision identifiers sent upstream, by result"
    );
    describe_gauge!(
        PAPI_PENDING_DELETIONS,
        "Deleted decisions waiting for the next flush"
    );
    describe_gauge!(
        PAPI_POLLING_ACTIVE,
        "Whether the long-poll loop is currently active (1) or idle (0)"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL_METRIC_NAMES: &[&str] = &[
        PARSER_EVENTS_TOTAL,
        PARSER_EVENTS_PROCESSED_TOTAL,
        PARSER_EVENTS_FAILED_TOTAL,
        PARSER_NODE_HITS_TOTAL,
        PARSER_NODE_HITS_OK_TOTAL,
        PARSER_NODE_HITS_KO_TOTAL,
        PARSER_WHITELIST_HITS_TOTAL,
        PARSER_WHITELIST_HITS_OK_TOTAL,
        PARSER_NODES_LOADED,
        PAPI_EVENTS_RECEIVED_TOTAL,
        PAPI_EVENTS_FAILED_TOTAL,
        PAPI_CHECKPOINT_ERRORS_TOTAL,
        PAPI_DELETED_DECISIONS_SENT_TOTAL,
        PAPI_PENDING_DELETIONS,
        PAPI_POLLING_ACTIVE,
    ];

    #[test]
    fn all_metrics_start_with_bulwark_prefix() {
        for name in ALL_METRIC_NAMES {
            assert!(
                name.starts_with("bulwark_"),
                "Metric '{}' does not start with 'bulwark_' prefix",
                name
            );
        }
    }

    #[test]
    fn metric_names_are_unique() {
        let mut names = ALL_METRIC_NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), ALL_METRIC_NAMES.len());
    }

    #[test]
    fn describe_all_does_not_panic() {
        describe_all();
    }

    #[test]
    fn label_keys_are_lowercase() {
        let labels = [
            LABEL_NODE,
            LABEL_STAGE,
            LABEL_REASON,
            LABEL_TYPE,
            LABEL_RESULT,
            LABEL_OPERATION,
        ];
        for label in &labels {
            assert_eq!(label.to_lowercase(), *label);
        }
    }
}
