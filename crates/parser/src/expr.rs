//! 표현식 평가기 -- 필터, 화이트리스트, 정적 할당에서 사용하는 표현식 계약
//!
//! 파이프라인은 [`ExprEngine`] / [`CompiledExpr`] trait만 사용하며,
//! 기본 구현은 `rhai` 기반의 [`RhaiExprEngine`]입니다.
//!
//! 표현식은 `evt` 하나의 변수를 보며, 이벤트 필드는 다음 이름으로 노출됩니다.
//!
//! ```text
//! evt.Type          "log" | "overflow" | "appsec"
//! evt.Stage         현재 스테이지
//! evt.Line.Raw      원시 라인 (Src, Module, Labels)
//! evt.Parsed.*      파서 추출 필드
//! evt.Meta.*        메타데이터
//! evt.Enriched.*    보강 결과
//! evt.Unmarshaled.* JSON 페이로드
//! evt.Overflow.*    Mapkey, BucketId, Whitelisted, Reprocess, Sources
//! ```
//!
//! 평가 결과는 닫힌 태그 유니온 [`ExprValue`]로 반환되어 호출자가 모든 경우를
//! 빠짐없이 처리합니다.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::net::IpAddr;
use std::sync::Arc;

use bulwark_core::event::Event;
use rhai::{AST, Dynamic, Engine, EvalAltResult, Scope};

use crate::cidr::IpNet;
use crate::error::ParserError;

/// 표현식 평가 결과
#[derive(Debug, Clone, PartialEq)]
pub enum ExprValue {
    /// 값 없음
    Null,
    /// 불리언
    Bool(bool),
    /// 정수
    Int(i64),
    /// 실수
    Float(f64),
    /// 문자열
    String(String),
    /// 매핑
    Map(BTreeMap<String, ExprValue>),
    /// 시퀀스
    Array(Vec<ExprValue>),
    /// 위에 속하지 않는 값 (타입 이름만 보존)
    Other(String),
}

impl ExprValue {
    /// 로그 출력용 타입 이름
    pub fn type_name(&self) -> &str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Map(_) => "map",
            Self::Array(_) => "array",
            Self::Other(name) => name,
        }
    }

    fn from_dynamic(value: Dynamic) -> Self {
        if value.is_unit() {
            return Self::Null;
        }
        if let Ok(b) = value.as_bool() {
            return Self::Bool(b);
        }
        if let Ok(i) = value.as_int() {
            return Self::Int(i);
        }
        if let Ok(f) = value.as_float() {
            return Self::Float(f);
        }
        if value.is_string() {
            return match value.into_string() {
                Ok(s) => Self::String(s),
                Err(name) => Self::Other(name.to_owned()),
            };
        }
        if value.is_map() {
            let type_name = value.type_name().to_owned();
            return match value.try_cast::<rhai::Map>() {
                Some(map) => Self::Map(
                    map.into_iter()
                        .map(|(k, v)| (k.to_string(), Self::from_dynamic(v)))
                        .collect(),
                ),
                None => Self::Other(type_name),
            };
        }
        if value.is_array() {
            return match value.into_array() {
                Ok(items) => Self::Array(items.into_iter().map(Self::from_dynamic).collect()),
                Err(name) => Self::Other(name.to_owned()),
            };
        }
        Self::Other(value.type_name().to_owned())
    }
}

/// 표현식 평가 환경: `{"evt": &event}`
#[derive(Debug, Clone, Copy)]
pub struct ExprEnv<'a> {
    /// 평가 대상 이벤트
    pub evt: &'a Event,
}

impl<'a> ExprEnv<'a> {
    /// 이벤트로 환경을 생성합니다.
    pub fn new(evt: &'a Event) -> Self {
        Self { evt }
    }
}

/// 컴파일된 표현식
pub trait CompiledExpr: Send + Sync + fmt::Debug {
    /// 표현식 원문
    fn source(&self) -> &str;

    /// 환경에 대해 표현식을 실행합니다.
    fn eval(&self, env: &ExprEnv<'_>) -> Result<ExprValue, ParserError>;

    /// 빈 이벤트 환경에서 한 번 실행해 환경에 없는 함수나 변수를 찾아냅니다.
    ///
    /// 빈 값 때문에 생기는 타입 에러처럼 데이터에 따라 달라지는 실패는
    /// 통과시킵니다.
    fn check_env(&self) -> Result<(), ParserError> {
        Ok(())
    }
}

/// 표현식 컴파일러
pub trait ExprEngine: Send + Sync + fmt::Debug {
    /// 표현식을 미리 컴파일합니다. 문법 오류는 여기서 실패합니다.
    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledExpr>, ParserError>;
}

/// `rhai` 기반 표현식 엔진
#[derive(Clone)]
pub struct RhaiExprEngine {
    engine: Arc<Engine>,
    known_fns: Arc<HashSet<String>>,
}

impl RhaiExprEngine {
    /// 안전 제한과 헬퍼 함수를 등록한 엔진을 생성합니다.
    pub fn new() -> Self {
        let mut engine = Engine::new();

        engine.set_max_expr_depths(64, 64);
        engine.set_max_call_levels(32);
        engine.set_max_operations(50_000);
        engine.set_max_string_size(1024 * 1024);
        engine.set_max_array_size(10_000);
        engine.set_max_map_size(10_000);

        register_helpers(&mut engine);

        // "name(a: T, ...) -> R" 형태의 시그니처에서 이름만 모음
        let known_fns = engine
            .gen_fn_signatures(true)
            .into_iter()
            .filter_map(|sig| sig.split_once('(').map(|(name, _)| name.trim().to_owned()))
            .collect();

        Self {
            engine: Arc::new(engine),
            known_fns: Arc::new(known_fns),
        }
    }
}

impl Default for RhaiExprEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for RhaiExprEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RhaiExprEngine").finish_non_exhaustive()
    }
}

impl ExprEngine for RhaiExprEngine {
    fn compile(&self, source: &str) -> Result<Arc<dyn CompiledExpr>, ParserError> {
        let ast = self
            .engine
            .compile_expression(source)
            .map_err(|e| ParserError::ExprCompile {
                expr: source.to_owned(),
                reason: e.to_string(),
            })?;
        Ok(Arc::new(RhaiCompiledExpr {
            engine: Arc::clone(&self.engine),
            known_fns: Arc::clone(&self.known_fns),
            ast,
            source: source.to_owned(),
        }))
    }
}

struct RhaiCompiledExpr {
    engine: Arc<Engine>,
    known_fns: Arc<HashSet<String>>,
    ast: AST,
    source: String,
}

impl fmt::Debug for RhaiCompiledExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RhaiCompiledExpr")
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

impl CompiledExpr for RhaiCompiledExpr {
    fn source(&self) -> &str {
        &self.source
    }

    fn eval(&self, env: &ExprEnv<'_>) -> Result<ExprValue, ParserError> {
        let mut scope = Scope::new();
        scope.push_dynamic("evt", event_to_dynamic(env.evt));

        self.engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &self.ast)
            .map(ExprValue::from_dynamic)
            .map_err(|e| ParserError::ExprEval {
                expr: self.source.clone(),
                reason: e.to_string(),
            })
    }

    fn check_env(&self) -> Result<(), ParserError> {
        let empty = Event::default();
        let mut scope = Scope::new();
        scope.push_dynamic("evt", event_to_dynamic(&empty));

        let Err(err) = self
            .engine
            .eval_ast_with_scope::<Dynamic>(&mut scope, &self.ast)
        else {
            return Ok(());
        };
        let unknown = match err.as_ref() {
            EvalAltResult::ErrorFunctionNotFound(sig, _) => {
                let name = called_name(sig);
                is_identifier(name) && !self.known_fns.contains(name)
            }
            EvalAltResult::ErrorVariableNotFound(..) => true,
            _ => false,
        };
        if unknown {
            return Err(ParserError::ExprCompile {
                expr: self.source.clone(),
                reason: err.to_string(),
            });
        }
        tracing::debug!(
            expr = %self.source,
            error = %err,
            "expression fails on an empty event, accepted as data dependent"
        );
        Ok(())
    }
}

/// `"name (T1, T2)"` 형태의 호출 시그니처에서 함수 이름
fn called_name(sig: &str) -> &str {
    sig.split_once('(').map_or(sig, |(name, _)| name).trim()
}

// 연산자 호출 실패는 피연산자 타입 문제일 뿐 함수가 없는 것이 아님
fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

// --- 이벤트 → rhai 값 변환 ---

fn string_map(map: &HashMap<String, String>) -> Dynamic {
    let map: rhai::Map = map
        .iter()
        .map(|(k, v)| (k.as_str().into(), Dynamic::from(v.clone())))
        .collect();
    Dynamic::from_map(map)
}

fn json_to_dynamic(value: &serde_json::Value) -> Dynamic {
    match value {
        serde_json::Value::Null => Dynamic::UNIT,
        serde_json::Value::Bool(b) => Dynamic::from_bool(*b),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Dynamic::from_int(i),
            None => Dynamic::from_float(n.as_f64().unwrap_or(f64::NAN)),
        },
        serde_json::Value::String(s) => Dynamic::from(s.clone()),
        serde_json::Value::Array(items) => {
            Dynamic::from_array(items.iter().map(json_to_dynamic).collect())
        }
        serde_json::Value::Object(obj) => Dynamic::from_map(
            obj.iter()
                .map(|(k, v)| (k.as_str().into(), json_to_dynamic(v)))
                .collect(),
        ),
    }
}

fn event_to_dynamic(evt: &Event) -> Dynamic {
    let mut line = rhai::Map::new();
    line.insert("Raw".into(), Dynamic::from(evt.line.raw.clone()));
    line.insert("Src".into(), Dynamic::from(evt.line.src.clone()));
    line.insert("Module".into(), Dynamic::from(evt.line.module.clone()));
    line.insert("Labels".into(), string_map(&evt.line.labels));

    let mut sources = rhai::Map::new();
    for (key, source) in &evt.overflow.sources {
        let mut entry = rhai::Map::new();
        entry.insert("Scope".into(), Dynamic::from(source.scope.clone()));
        entry.insert("Value".into(), Dynamic::from(source.value.clone()));
        sources.insert(key.as_str().into(), Dynamic::from_map(entry));
    }

    let mut overflow = rhai::Map::new();
    overflow.insert("Mapkey".into(), Dynamic::from(evt.overflow.mapkey.clone()));
    overflow.insert(
        "BucketId".into(),
        Dynamic::from(evt.overflow.bucket_id.clone()),
    );
    overflow.insert(
        "Whitelisted".into(),
        Dynamic::from_bool(evt.overflow.whitelisted),
    );
    overflow.insert("Reprocess".into(), Dynamic::from_bool(evt.overflow.reprocess));
    overflow.insert("Sources".into(), Dynamic::from_map(sources));
    overflow.insert(
        "Alert".into(),
        evt.overflow
            .alert
            .as_ref()
            .map(json_to_dynamic)
            .unwrap_or(Dynamic::UNIT),
    );

    let unmarshaled: rhai::Map = evt
        .unmarshaled
        .iter()
        .map(|(k, v)| (k.as_str().into(), json_to_dynamic(v)))
        .collect();

    let mut map = rhai::Map::new();
    map.insert("Type".into(), Dynamic::from(evt.type_name().to_owned()));
    map.insert("Stage".into(), Dynamic::from(evt.stage.clone()));
    map.insert("Process".into(), Dynamic::from_bool(evt.process));
    map.insert("Whitelisted".into(), Dynamic::from_bool(evt.whitelisted));
    map.insert(
        "WhitelistReason".into(),
        Dynamic::from(evt.whitelist_reason.clone()),
    );
    map.insert("Line".into(), Dynamic::from_map(line));
    map.insert("Parsed".into(), string_map(&evt.parsed));
    map.insert("Meta".into(), string_map(&evt.meta));
    map.insert("Enriched".into(), string_map(&evt.enriched));
    map.insert("Unmarshaled".into(), Dynamic::from_map(unmarshaled));
    map.insert("Overflow".into(), Dynamic::from_map(overflow));
    map.insert(
        "Time".into(),
        evt.time
            .map(|t| Dynamic::from(t.to_rfc3339()))
            .unwrap_or(Dynamic::UNIT),
    );
    map.insert("StrTime".into(), Dynamic::from(evt.str_time.clone()));
    map.insert(
        "StrTimeFormat".into(),
        Dynamic::from(evt.str_time_format.clone()),
    );
    map.insert(
        "MarshaledTime".into(),
        Dynamic::from(evt.marshaled_time.clone()),
    );
    Dynamic::from_map(map)
}

// --- 헬퍼 함수 ---

fn parse_ip(raw: &str) -> Option<IpAddr> {
    match raw.parse::<IpAddr>() {
        Ok(ip) => Some(ip),
        Err(_) => {
            tracing::debug!(ip = raw, "not a valid IP");
            None
        }
    }
}

fn register_helpers(engine: &mut Engine) {
    engine.register_fn("IpInRange", |ip: &str, range: &str| -> bool {
        let Some(ip) = parse_ip(ip) else {
            return false;
        };
        match range.parse::<IpNet>() {
            Ok(net) => net.contains(&ip),
            Err(e) => {
                tracing::debug!(range, error = %e, "not a valid IP range");
                false
            }
        }
    });
    engine.register_fn("IsIP", |ip: &str| parse_ip(ip).is_some());
    engine.register_fn("IsIPV4", |ip: &str| {
        parse_ip(ip).is_some_and(|ip| ip.to_canonical().is_ipv4())
    });
    engine.register_fn("IsIPV6", |ip: &str| {
        parse_ip(ip).is_some_and(|ip| ip.to_canonical().is_ipv6())
    });
    engine.register_fn("Upper", |s: &str| s.to_uppercase());
    engine.register_fn("Lower", |s: &str| s.to_lowercase());
    engine.register_fn("Atof", |s: &str| -> f64 {
        s.parse::<f64>().unwrap_or_else(|e| {
            tracing::warn!(value = s, error = %e, "Atof: can't convert float");
            0.0
        })
    });
    engine.register_fn("KeyExists", |key: &str, dict: rhai::Map| {
        dict.contains_key(key)
    });
}
