//! 정적 할당 -- 매칭된 노드가 이벤트 필드를 채우는 지시문
//!
//! 각 지시문([`StaticConfig`])은 정확히 하나의 대상(`method`, `parsed`, `meta`,
//! `enriched`, `target`)과 정확히 하나의 값 소스(`value`, `expression`)를 가져야
//! 하며, 이 조건은 로딩 시점에 [`Static::compile`]이 검증합니다.
//!
//! # 실행 순서
//!
//! ```text
//! 값 결정 (literal | expression) -> 빈 값이면 건너뜀 (ParseDate 제외)
//!   -> method | parsed | meta | enriched | target 중 하나에 기록
//! ```

use std::sync::Arc;

use bulwark_core::event::Event;
use serde::{Deserialize, Serialize};

use crate::enrich::{EnricherRegistry, PARSE_DATE};
use crate::error::ParserError;
use crate::expr::{CompiledExpr, ExprEngine, ExprEnv, ExprValue};
use crate::target::TargetPath;

/// 정적 할당 설정 (노드 YAML의 `statics:` 항목)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StaticConfig {
    /// 보강 함수 이름
    pub method: Option<String>,
    /// `parsed` 키
    pub parsed: Option<String>,
    /// `meta` 키
    pub meta: Option<String>,
    /// `enriched` 키
    pub enriched: Option<String>,
    /// 점 표기 대상 경로
    pub target: Option<String>,
    /// 리터럴 값
    pub value: Option<String>,
    /// 값 표현식
    pub expression: Option<String>,
}

/// 정적 할당 대상
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaticTarget {
    /// 보강 함수 호출
    Method(String),
    /// `parsed[key]`
    Parsed(String),
    /// `meta[key]`
    Meta(String),
    /// `enriched[key]`
    Enriched(String),
    /// 점 표기 경로
    Path(TargetPath),
}

/// 값 소스
#[derive(Debug, Clone)]
pub enum StaticValue {
    /// 리터럴 문자열
    Literal(String),
    /// 컴파일된 표현식
    Expr(Arc<dyn CompiledExpr>),
}

/// 컴파일된 정적 할당
#[derive(Debug, Clone)]
pub struct Static {
    target: StaticTarget,
    value: StaticValue,
}

impl Static {
    /// 설정을 검증하고 컴파일합니다.
    ///
    /// # Errors
    /// 대상/값 소스가 없거나 둘 이상인 경우, 대상 경로가 잘못된 경우,
    /// 표현식 컴파일이 실패한 경우
    pub fn compile(config: &StaticConfig, engine: &dyn ExprEngine) -> Result<Self, ParserError> {
        let mut targets = Vec::with_capacity(1);
        if let Some(method) = &config.method {
            targets.push(StaticTarget::Method(method.clone()));
        }
        if let Some(key) = &config.parsed {
            targets.push(StaticTarget::Parsed(key.clone()));
        }
        if let Some(key) = &config.meta {
            targets.push(StaticTarget::Meta(key.clone()));
        }
        if let Some(key) = &config.enriched {
            targets.push(StaticTarget::Enriched(key.clone()));
        }
        if let Some(path) = &config.target {
            targets.push(StaticTarget::Path(path.parse()?));
        }

        let target = match targets.len() {
            0 => {
                return Err(ParserError::StaticConfig(
                    "no target (method, parsed, meta, enriched, target)".to_owned(),
                ));
            }
            1 => targets.remove(0),
            n => {
                return Err(ParserError::StaticConfig(format!(
                    "{n} targets set, exactly one is allowed"
                )));
            }
        };

        if let StaticTarget::Method(name)
        | StaticTarget::Parsed(name)
        | StaticTarget::Meta(name)
        | StaticTarget::Enriched(name) = &target
        {
            if name.is_empty() {
                return Err(ParserError::StaticConfig("empty target name".to_owned()));
            }
        }

        let value = match (&config.value, &config.expression) {
            (Some(literal), None) => StaticValue::Literal(literal.clone()),
            (None, Some(src)) => StaticValue::Expr(engine.compile(src)?),
            (None, None) => {
                return Err(ParserError::StaticConfig(
                    "no value source (value, expression)".to_owned(),
                ));
            }
            (Some(_), Some(_)) => {
                return Err(ParserError::StaticConfig(
                    "both value and expression set, exactly one is allowed".to_owned(),
                ));
            }
        };

        Ok(Self { target, value })
    }

    /// 대상
    pub fn target(&self) -> &StaticTarget {
        &self.target
    }

    /// 값을 결정합니다. `None`이면 이 지시문을 건너뜁니다.
    fn resolve(&self, event: &Event) -> Result<Option<String>, ParserError> {
        let expr = match &self.value {
            StaticValue::Literal(literal) => return Ok(Some(literal.clone())),
            StaticValue::Expr(expr) => expr,
        };

        let value = match expr.eval(&ExprEnv::new(event)) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(error = %e, "failed to run static expression, skipping");
                return Ok(None);
            }
        };

        match value {
            ExprValue::String(s) => Ok(Some(s)),
            ExprValue::Int(i) => Ok(Some(i.to_string())),
            ExprValue::Float(f) => Ok(Some(f.to_string())),
            ExprValue::Map(_) | ExprValue::Array(_) => {
                tracing::warn!(
                    expr = expr.source(),
                    type_name = value.type_name(),
                    "static expression returned a non-scalar value, skipping"
                );
                Ok(None)
            }
            ExprValue::Null => Ok(None),
            ExprValue::Bool(_) | ExprValue::Other(_) => Err(ParserError::StaticValue {
                expr: expr.source().to_owned(),
                type_name: value.type_name().to_owned(),
            }),
        }
    }
}

/// 정적 할당을 선언 순서대로 적용합니다.
///
/// # Errors
/// 값 표현식이 변환할 수 없는 타입을 반환하면 남은 지시문을 중단하고 에러를 반환합니다.
pub fn apply_statics(
    statics: &[Static],
    event: &mut Event,
    enrichers: &EnricherRegistry,
) -> Result<(), ParserError> {
    for directive in statics {
        let value = directive.resolve(event)?.unwrap_or_default();

        let is_parse_date = matches!(&directive.target, StaticTarget::Method(m) if m == PARSE_DATE);
        if value.is_empty() && !is_parse_date {
            tracing::trace!(target_field = ?directive.target, "empty value, skipping static");
            continue;
        }

        match &directive.target {
            StaticTarget::Method(method) => {
                let Some(enricher) = enrichers.get(method) else {
                    tracing::debug!(method = %method, "unknown enrichment method, skipping");
                    continue;
                };
                let span = tracing::debug_span!("enrich", method = %method);
                let _enter = span.enter();
                match enricher.enrich(&value, event) {
                    Ok(entries) => {
                        if entries.is_empty() {
                            tracing::trace!("enricher returned no entries");
                        }
                        event.enriched.extend(entries);
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "enrichment failed");
                    }
                }
            }
            StaticTarget::Parsed(key) => {
                event.parsed.insert(key.clone(), value);
            }
            StaticTarget::Meta(key) => {
                event.meta.insert(key.clone(), value);
            }
            StaticTarget::Enriched(key) => {
                event.enriched.insert(key.clone(), value);
            }
            StaticTarget::Path(path) => {
                tracing::trace!(target_path = %path, "setting target");
                path.apply(event, value);
            }
        }
    }
    Ok(())
}
