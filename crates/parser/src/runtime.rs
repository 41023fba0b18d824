//! 스테이지 파이프라인 실행
//!
//! [`parse`]는 이벤트 하나를 설정된 스테이지 순서대로 통과시킵니다.
//! 각 스테이지에서는 해당 스테이지에 속한 노드를 선언 순서대로 실행하며,
//! 하나라도 매칭되면 스테이지를 통과한 것으로 봅니다.
//!
//! 결과는 세 가지입니다.
//!
//! - `Ok(event)` + `event.process == true`: 모든 스테이지 통과
//! - `Ok(event)` + `event.process == false`: 어느 스테이지에서 탈락 (에러 아님)
//! - `Err(_)`: 노드 평가 에러, 이벤트 처리 중단

use bulwark_core::event::Event;
use bulwark_core::metrics as m;
use chrono::Utc;

use crate::context::ParserContext;
use crate::error::ParserError;
use crate::node::{Node, OnSuccess};

/// 이벤트를 스테이지 파이프라인에 통과시킵니다.
///
/// 이벤트의 스테이지가 비어 있으면 첫 스테이지에서 시작하고, 이미 뒤쪽
/// 스테이지에 있으면 앞 스테이지는 건너뜁니다.
///
/// # Errors
/// 노드 처리 중 발생한 에러를 그대로 전파합니다.
pub fn parse(ctx: &ParserContext, mut event: Event, nodes: &[Node]) -> Result<Event, ParserError> {
    metrics::counter!(m::PARSER_EVENTS_TOTAL, m::LABEL_TYPE => event.type_name()).increment(1);

    if event.stage.is_empty() {
        if let Some(first) = ctx.stages().first() {
            event.stage.clone_from(first);
        }
    }
    event.process = false;
    if event.time.is_none() {
        event.time = Some(Utc::now());
    }

    match run_stages(ctx, &mut event, nodes) {
        Ok(passed) => {
            event.process = passed;
            if passed {
                metrics::counter!(m::PARSER_EVENTS_PROCESSED_TOTAL).increment(1);
            }
            Ok(event)
        }
        Err(e) => {
            metrics::counter!(m::PARSER_EVENTS_FAILED_TOTAL).increment(1);
            tracing::warn!(stage = %event.stage, error = %e, "event processing aborted");
            Err(e)
        }
    }
}

/// 모든 스테이지를 통과하면 true
fn run_stages(
    ctx: &ParserContext,
    event: &mut Event,
    nodes: &[Node],
) -> Result<bool, ParserError> {
    for (idx, stage) in ctx.stages().iter().enumerate() {
        let current = ctx.stage_index(&event.stage);
        if current.is_some_and(|cur| cur > idx) {
            tracing::trace!(stage = %stage, current = %event.stage, "event is ahead, skipping stage");
            continue;
        }
        if event.stage != *stage {
            tracing::debug!(
                stage = %stage,
                current = %event.stage,
                "event did not reach stage, leaving pipeline"
            );
            return Ok(false);
        }

        if !run_stage(ctx, stage, event, nodes)? {
            tracing::debug!(stage = %stage, "no node matched, leaving pipeline");
            return Ok(false);
        }
    }
    Ok(true)
}

/// 스테이지 하나를 실행합니다. 매칭된 노드가 있으면 true.
fn run_stage(
    ctx: &ParserContext,
    stage: &str,
    event: &mut Event,
    nodes: &[Node],
) -> Result<bool, ParserError> {
    let mut stage_ok = false;

    for node in nodes.iter().filter(|n| n.stage() == stage) {
        let matched = node.process(event, ctx)?;

        if let Some(dump) = ctx.dump() {
            dump.record(stage, node.name(), event, matched);
        }

        if matched {
            stage_ok = true;
            if node.on_success() == OnSuccess::NextStage {
                break;
            }
        }
        // 매칭 여부와 무관하게 스테이지가 바뀌면 현재 스테이지의 남은 노드는 실행하지 않음
        if event.stage != stage {
            tracing::debug!(from = %stage, to = %event.stage, "stage changed by node, leaving stage");
            break;
        }
    }

    Ok(stage_ok)
}
