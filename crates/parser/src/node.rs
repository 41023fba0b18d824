//! 파서 노드 -- 스테이지 안에서 이벤트를 매칭하고 필드를 채우는 단위
//!
//! 노드 하나의 처리 순서는 다음과 같습니다.
//!
//! ```text
//! filter ──false──> 불일치
//!   │true
//!   ▼
//! whitelist (IP | expression) ──> event.whitelisted 표시
//!   │
//!   ▼
//! pattern (정규식 named capture -> parsed, 패턴 statics)
//!   │
//!   ▼
//! 자식 노드 ──> statics (화이트리스트가 없거나 적중한 경우) ──> on_success
//! ```
//!
//! 필터 평가 실패는 에러가 아니라 불일치로 처리되며, 화이트리스트 표현식
//! 실행 에러와 정적 할당의 타입 에러는 호출자에게 전파됩니다.

use std::sync::Arc;

use bulwark_core::event::{Event, EventType};
use bulwark_core::metrics as m;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::context::ParserContext;
use crate::error::ParserError;
use crate::expr::{CompiledExpr, ExprEngine, ExprEnv, ExprValue};
use crate::statics::{Static, StaticConfig, apply_statics};
use crate::whitelist::{Whitelist, WhitelistConfig};

/// `on_success` 지시문
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnSuccess {
    /// 같은 스테이지의 다음 노드로 계속
    #[default]
    Continue,
    /// 다음 스테이지로 이동
    NextStage,
}

impl OnSuccess {
    fn parse(raw: &str, node: &str) -> Result<Self, ParserError> {
        match raw {
            "" | "continue" => Ok(Self::Continue),
            "next_stage" => Ok(Self::NextStage),
            other => Err(ParserError::NodeConfig {
                node: node.to_owned(),
                reason: format!("unknown on_success '{other}' (expected 'next_stage')"),
            }),
        }
    }
}

/// 패턴 매칭 설정
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternConfig {
    /// named capture 그룹을 가진 정규식
    pub pattern: String,
    /// 매칭 대상 `parsed` 키 (비어 있으면 원시 라인)
    pub apply_on: String,
    /// 매칭 대상 문자열을 만드는 표현식 (`apply_on`보다 우선)
    pub expression: Option<String>,
    /// 패턴 매칭 성공 시 적용할 정적 할당
    pub statics: Vec<StaticConfig>,
}

/// 노드 설정 (YAML 파일 하나 또는 `nodes:` 항목 하나)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// 노드 이름
    pub name: String,
    /// 설명
    pub description: String,
    /// 소속 스테이지 (로더가 디렉토리 이름으로 채움)
    pub stage: String,
    /// 불리언 필터 표현식
    pub filter: Option<String>,
    /// `next_stage` 또는 빈 값
    pub on_success: String,
    /// 패턴 매칭
    pub grok: Option<PatternConfig>,
    /// 자식 노드
    pub nodes: Vec<NodeConfig>,
    /// 화이트리스트
    pub whitelist: Option<WhitelistConfig>,
    /// 정적 할당
    pub statics: Vec<StaticConfig>,
}

#[derive(Debug)]
enum PatternSource {
    LineRaw,
    Parsed(String),
    Expr(Arc<dyn CompiledExpr>),
}

#[derive(Debug)]
struct Pattern {
    regex: Regex,
    source: PatternSource,
    statics: Vec<Static>,
}

impl Pattern {
    fn compile(config: &PatternConfig, engine: &dyn ExprEngine) -> Result<Self, ParserError> {
        let regex = Regex::new(&config.pattern)?;
        let source = match (&config.expression, config.apply_on.as_str()) {
            (Some(src), _) => PatternSource::Expr(engine.compile(src)?),
            (None, "") => PatternSource::LineRaw,
            (None, key) => PatternSource::Parsed(key.to_owned()),
        };
        let statics = config
            .statics
            .iter()
            .map(|s| Static::compile(s, engine))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self {
            regex,
            source,
            statics,
        })
    }

    /// 매칭 대상 문자열을 결정합니다. `None`이면 대상이 없어 불일치입니다.
    fn subject(&self, event: &Event) -> Result<Option<String>, ParserError> {
        match &self.source {
            PatternSource::LineRaw => Ok(Some(event.line.raw.clone())),
            PatternSource::Parsed(key) => {
                let value = event.parsed.get(key).cloned();
                if value.is_none() {
                    tracing::debug!(field = %key, "pattern target field doesn't exist");
                }
                Ok(value)
            }
            PatternSource::Expr(expr) => match expr.eval(&ExprEnv::new(event))? {
                ExprValue::String(s) => Ok(Some(s)),
                ExprValue::Int(i) => Ok(Some(i.to_string())),
                ExprValue::Null => Ok(Some(String::new())),
                other => Err(ParserError::StaticValue {
                    expr: expr.source().to_owned(),
                    type_name: other.type_name().to_owned(),
                }),
            },
        }
    }

    /// named capture를 `parsed`에 병합합니다. 캡처가 없으면 false.
    fn apply(&self, subject: &str, event: &mut Event) -> bool {
        let Some(caps) = self.regex.captures(subject) else {
            return false;
        };
        let mut captured = false;
        for name in self.regex.capture_names().flatten() {
            if let Some(value) = caps.name(name) {
                event.set_parsed(name, value.as_str());
                captured = true;
            }
        }
        captured
    }
}

/// 컴파일된 노드
#[derive(Debug)]
pub struct Node {
    name: String,
    stage: String,
    filter: Option<Arc<dyn CompiledExpr>>,
    pattern: Option<Pattern>,
    children: Vec<Node>,
    whitelist: Option<Whitelist>,
    statics: Vec<Static>,
    on_success: OnSuccess,
}

impl Node {
    /// 설정을 컴파일합니다. 자식 노드는 부모의 스테이지를 물려받습니다.
    ///
    /// # Errors
    /// 필터/패턴/화이트리스트/정적 할당 중 하나라도 컴파일에 실패하면 에러
    pub fn compile(config: &NodeConfig, engine: &dyn ExprEngine) -> Result<Self, ParserError> {
        let node_err = |e: ParserError| ParserError::NodeConfig {
            node: config.name.clone(),
            reason: e.to_string(),
        };

        if config.stage.is_empty() {
            return Err(ParserError::NodeConfig {
                node: config.name.clone(),
                reason: "stage must not be empty".to_owned(),
            });
        }

        let filter = config
            .filter
            .as_deref()
            .map(|src| engine.compile(src))
            .transpose()
            .map_err(node_err)?;

        let pattern = config
            .grok
            .as_ref()
            .map(|p| Pattern::compile(p, engine))
            .transpose()
            .map_err(node_err)?;

        let whitelist = match &config.whitelist {
            Some(wl) => {
                let (compiled, has_entries) = Whitelist::compile(wl, engine).map_err(node_err)?;
                has_entries.then_some(compiled)
            }
            None => None,
        };

        let statics = config
            .statics
            .iter()
            .map(|s| Static::compile(s, engine))
            .collect::<Result<Vec<_>, _>>()
            .map_err(node_err)?;

        let children = config
            .nodes
            .iter()
            .map(|child| {
                let mut child = child.clone();
                if child.stage.is_empty() {
                    child.stage.clone_from(&config.stage);
                }
                Self::compile(&child, engine)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            name: config.name.clone(),
            stage: config.stage.clone(),
            filter,
            pattern,
            children,
            whitelist,
            statics,
            on_success: OnSuccess::parse(&config.on_success, &config.name)?,
        })
    }

    /// 노드 이름
    pub fn name(&self) -> &str {
        &self.name
    }

    /// 소속 스테이지
    pub fn stage(&self) -> &str {
        &self.stage
    }

    /// `on_success` 지시문
    pub fn on_success(&self) -> OnSuccess {
        self.on_success
    }

    /// 화이트리스트 (항목이 있는 경우에만)
    pub fn whitelist(&self) -> Option<&Whitelist> {
        self.whitelist.as_ref()
    }

    /// 자식 노드
    pub fn children(&self) -> &[Node] {
        &self.children
    }

    /// 이벤트에 노드를 적용하고 매칭 여부를 반환합니다.
    ///
    /// # Errors
    /// 화이트리스트 표현식 실행 에러, 패턴/정적 할당 표현식의 타입 에러
    pub fn process(&self, event: &mut Event, ctx: &ParserContext) -> Result<bool, ParserError> {
        let span = tracing::debug_span!("node", node = %self.name, stage = %self.stage);
        let _enter = span.enter();

        if let Some(filter) = &self.filter {
            match filter.eval(&ExprEnv::new(event)) {
                Ok(ExprValue::Bool(true)) => {}
                Ok(ExprValue::Bool(false)) => {
                    tracing::trace!("filter is false, event leaving node");
                    return Ok(false);
                }
                Ok(other) => {
                    tracing::warn!(
                        type_name = other.type_name(),
                        "unexpected non-bool return from filter"
                    );
                    return Ok(false);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "failed to run filter");
                    return Ok(false);
                }
            }
        }

        metrics::counter!(
            m::PARSER_NODE_HITS_TOTAL,
            m::LABEL_NODE => self.name.clone(),
            m::LABEL_STAGE => self.stage.clone()
        )
        .increment(1);

        let mut state = true;

        let is_whitelisted = match &self.whitelist {
            Some(wl) => {
                // IP 검사와 표현식 검사는 서로 독립적으로 모두 실행
                let by_ip = wl.check_ips(event);
                let by_expr = wl.check_expressions(&ExprEnv::new(event))?;
                by_ip || by_expr
            }
            None => false,
        };

        if is_whitelisted && !event.whitelisted {
            if let Some(wl) = &self.whitelist {
                event.whitelisted = true;
                event.whitelist_reason = wl.reason().to_owned();
                if event.event_type == EventType::Overflow {
                    let ips: Vec<&str> = event.overflow.sources.keys().map(String::as_str).collect();
                    tracing::info!(
                        ips = ?ips,
                        reason = %wl.reason(),
                        "ban whitelisted"
                    );
                    event.overflow.whitelisted = true;
                }
            }
        }

        let mut has_ok_pattern = false;
        if let Some(pattern) = &self.pattern {
            let matched = match pattern.subject(event)? {
                Some(subject) => pattern.apply(&subject, event),
                None => false,
            };
            if matched {
                tracing::trace!("pattern matched");
                has_ok_pattern = true;
                apply_statics(&pattern.statics, event, ctx.enrichers())?;
            } else {
                tracing::trace!("pattern didn't match");
                state = false;
            }
        }

        for child in &self.children {
            if child.process(event, ctx)? {
                state = true;
                if self.on_success == OnSuccess::NextStage {
                    tracing::trace!("child succeeded, on_success=next_stage, skipping siblings");
                    break;
                }
            } else if !has_ok_pattern {
                state = false;
            }
        }

        if !state {
            metrics::counter!(
                m::PARSER_NODE_HITS_KO_TOTAL,
                m::LABEL_NODE => self.name.clone(),
                m::LABEL_STAGE => self.stage.clone()
            )
            .increment(1);
            tracing::trace!("event leaving node: ko");
            return Ok(false);
        }

        metrics::counter!(
            m::PARSER_NODE_HITS_OK_TOTAL,
            m::LABEL_NODE => self.name.clone(),
            m::LABEL_STAGE => self.stage.clone()
        )
        .increment(1);

        if self.whitelist.is_none() || is_whitelisted {
            apply_statics(&self.statics, event, ctx.enrichers())?;
        }

        if self.on_success == OnSuccess::NextStage {
            match ctx.next_stage(&event.stage) {
                Some(next) => {
                    tracing::debug!(from = %event.stage, to = %next, "moving to next stage");
                    event.stage = next.to_owned();
                }
                None => tracing::trace!("no more stages"),
            }
        }

        tracing::trace!("event leaving node: ok");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::RhaiExprEngine;

    fn ctx() -> ParserContext {
        ParserContext::new(
            vec!["s00-raw".to_owned(), "s01-parse".to_owned()],
            Arc::new(RhaiExprEngine::new()),
        )
    }

    fn node(yaml: &str) -> Node {
        let mut config: NodeConfig = serde_yaml::from_str(yaml).unwrap();
        if config.stage.is_empty() {
            config.stage = "s00-raw".to_owned();
        }
        Node::compile(&config, &RhaiExprEngine::new()).unwrap()
    }

    #[test]
    fn bare_node_always_matches() {
        let n = node("name: always");
        let mut evt = Event::default();
        assert!(n.process(&mut evt, &ctx()).unwrap());
    }

    #[test]
    fn filter_false_or_failing_is_a_miss() {
        let c = ctx();
        let mut evt = Event::default();
        assert!(!node("filter: \"1 == 2\"").process(&mut evt, &c).unwrap());
        assert!(!node("filter: evt.Stage").process(&mut evt, &c).unwrap());
        assert!(
            !node("filter: undefined_helper()")
                .process(&mut evt, &c)
                .unwrap()
        );
    }

    #[test]
    fn pattern_fills_parsed_and_runs_pattern_statics() {
        let n = node(
            r#"
name: sshd
grok:
  pattern: 'Failed password for (?P<user>\S+) from (?P<source_ip>[\d.]+)'
  statics:
    - meta: source_ip
      expression: evt.Parsed.source_ip
"#,
        );
        let mut evt = Event::from_line("sshd[1]: Failed password for root from 10.0.0.9 port 22");
        assert!(n.process(&mut evt, &ctx()).unwrap());
        assert_eq!(evt.parsed["user"], "root");
        assert_eq!(evt.meta["source_ip"], "10.0.0.9");
    }

    #[test]
    fn pattern_miss_fails_node() {
        let n = node(
            r#"
grok:
  pattern: '(?P<word>nomatch)'
statics:
  - meta: touched
    value: "yes"
"#,
        );
        let mut evt = Event::from_line("something else");
        assert!(!n.process(&mut evt, &ctx()).unwrap());
        assert!(evt.meta.is_empty());
    }

    #[test]
    fn pattern_on_missing_parsed_field_fails_node() {
        let n = node(
            r#"
grok:
  pattern: '(?P<x>.+)'
  apply_on: message
"#,
        );
        let mut evt = Event::default();
        assert!(!n.process(&mut evt, &ctx()).unwrap());
    }

    #[test]
    fn whitelisted_event_is_marked_and_statics_run() {
        let n = node(
            r#"
name: wl
whitelist:
  reason: internal
  cidr: ["10.0.0.0/8"]
statics:
  - meta: checked
    value: "1"
"#,
        );
        let mut evt = Event::default();
        evt.set_meta("source_ip", "10.1.2.3");
        assert!(n.process(&mut evt, &ctx()).unwrap());
        assert!(evt.whitelisted);
        assert_eq!(evt.whitelist_reason, "internal");
        assert_eq!(evt.meta["checked"], "1");
    }

    #[test]
    fn statics_skipped_when_whitelist_does_not_match() {
        let n = node(
            r#"
whitelist:
  reason: internal
  ip: ["192.168.0.1"]
statics:
  - meta: checked
    value: "1"
"#,
        );
        let mut evt = Event::default();
        evt.set_meta("source_ip", "8.8.8.8");
        assert!(n.process(&mut evt, &ctx()).unwrap());
        assert!(!evt.whitelisted);
        assert!(!evt.meta.contains_key("checked"));
    }

    #[test]
    fn ip_and_expression_checks_both_run() {
        let n = node(
            r#"
whitelist:
  reason: both
  ip: ["1.2.3.4"]
  expression:
    - evt.Meta.missing.len() > 0
"#,
        );
        let mut evt = Event::default();
        evt.set_meta("source_ip", "1.2.3.4");
        // IP가 이미 적중했어도 표현식 검사는 실행되어 실행 에러가 드러남
        assert!(n.process(&mut evt, &ctx()).is_err());
    }

    #[test]
    fn overflow_whitelist_marks_alert() {
        let n = node(
            r#"
whitelist:
  reason: trusted scanner
  ip: ["9.9.9.9"]
"#,
        );
        let mut alert = bulwark_core::event::RuntimeAlert::default();
        alert
            .sources
            .insert("9.9.9.9".to_owned(), bulwark_core::event::Source::default());
        let mut evt = Event::overflow(alert);
        assert!(n.process(&mut evt, &ctx()).unwrap());
        assert!(evt.whitelisted);
        assert!(evt.overflow.whitelisted);
    }

    #[test]
    fn next_stage_advances_event() {
        let n = node("on_success: next_stage");
        let mut evt = Event {
            stage: "s00-raw".to_owned(),
            ..Event::default()
        };
        assert!(n.process(&mut evt, &ctx()).unwrap());
        assert_eq!(evt.stage, "s01-parse");
    }

    #[test]
    fn next_stage_on_last_stage_is_noop() {
        let n = node("on_success: next_stage\nstage: s01-parse");
        let mut evt = Event {
            stage: "s01-parse".to_owned(),
            ..Event::default()
        };
        assert!(n.process(&mut evt, &ctx()).unwrap());
        assert_eq!(evt.stage, "s01-parse");
    }

    #[test]
    fn children_success_makes_parent_succeed() {
        let n = node(
            r#"
on_success: next_stage
nodes:
  - filter: "false"
  - name: child-ok
    statics:
      - parsed: via
        value: child
  - filter: "false"
"#,
        );
        let mut evt = Event {
            stage: "s00-raw".to_owned(),
            ..Event::default()
        };
        assert!(n.process(&mut evt, &ctx()).unwrap());
        assert_eq!(evt.parsed["via"], "child");
        assert_eq!(evt.stage, "s01-parse");
    }

    #[test]
    fn trailing_failing_child_resets_parent_without_pattern() {
        let n = node(
            r#"
nodes:
  - name: ok
  - filter: "false"
"#,
        );
        let mut evt = Event::default();
        assert!(!n.process(&mut evt, &ctx()).unwrap());
    }

    #[test]
    fn rejects_unknown_on_success() {
        let config = NodeConfig {
            name: "bad".to_owned(),
            stage: "s00-raw".to_owned(),
            on_success: "jump".to_owned(),
            ..Default::default()
        };
        assert!(Node::compile(&config, &RhaiExprEngine::new()).is_err());
    }

    #[test]
    fn rejects_bad_regex() {
        let config = NodeConfig {
            name: "bad".to_owned(),
            stage: "s00-raw".to_owned(),
            grok: Some(PatternConfig {
                pattern: "(?P<unclosed".to_owned(),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = Node::compile(&config, &RhaiExprEngine::new()).unwrap_err();
        assert!(err.is_compile_time());
    }
}
