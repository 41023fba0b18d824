//! 화이트리스트 엔진 -- 노드별 IP/CIDR/표현식 허용 목록
//!
//! 설정([`WhitelistConfig`])은 파이프라인 실행 전에 한 번 컴파일되며,
//! 런타임 검사는 컴파일된 형태만 참조합니다. 잘못된 IP, CIDR, 표현식은
//! 컴파일 단계에서 즉시 실패합니다.

use std::net::IpAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use bulwark_core::event::Event;
use bulwark_core::metrics as m;
use serde::{Deserialize, Serialize};

use crate::cidr::IpNet;
use crate::error::ParserError;
use crate::expr::{CompiledExpr, ExprEngine, ExprEnv, ExprValue};

/// 화이트리스트 설정 (노드 YAML의 `whitelist:` 블록)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WhitelistConfig {
    /// 적중 시 이벤트에 기록할 사유
    pub reason: String,
    /// 개별 IP 주소
    pub ip: Vec<String>,
    /// CIDR 프리픽스
    pub cidr: Vec<String>,
    /// 불리언 표현식
    pub expression: Vec<String>,
}

/// 컴파일된 화이트리스트
#[derive(Debug, Default)]
pub struct Whitelist {
    reason: String,
    ips: Vec<IpAddr>,
    cidrs: Vec<IpNet>,
    exprs: Vec<Arc<dyn CompiledExpr>>,
    hits: AtomicU64,
    hits_ok: AtomicU64,
}

impl Whitelist {
    /// 설정을 컴파일합니다.
    ///
    /// 반환값의 두 번째 항목은 항목이 하나라도 있는지 여부입니다.
    ///
    /// # Errors
    /// IP, CIDR 파싱 실패, 표현식 컴파일 실패, 또는 빈 이벤트 환경에 없는
    /// 함수나 변수를 참조하는 표현식
    pub fn compile(
        config: &WhitelistConfig,
        engine: &dyn ExprEngine,
    ) -> Result<(Self, bool), ParserError> {
        let ips = config
            .ip
            .iter()
            .map(|raw| {
                raw.trim()
                    .parse::<IpAddr>()
                    .map(|ip| ip.to_canonical())
                    .map_err(|e| ParserError::Whitelist(format!("invalid IP '{raw}': {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let cidrs = config
            .cidr
            .iter()
            .map(|raw| {
                raw.trim()
                    .parse::<IpNet>()
                    .map_err(|e| ParserError::Whitelist(format!("invalid CIDR: {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let exprs = config
            .expression
            .iter()
            .map(|src| {
                engine
                    .compile(src)
                    .and_then(|expr| expr.check_env().map(|()| expr))
                    .map_err(|e| ParserError::Whitelist(e.to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let whitelist = Self {
            reason: config.reason.clone(),
            ips,
            cidrs,
            exprs,
            ..Self::default()
        };
        let has_entries = whitelist.has_entries();
        Ok((whitelist, has_entries))
    }

    /// 적중 사유
    pub fn reason(&self) -> &str {
        &self.reason
    }

    /// IP 또는 CIDR 항목이 있는지 여부
    pub fn has_ip_entries(&self) -> bool {
        !self.ips.is_empty() || !self.cidrs.is_empty()
    }

    /// 표현식 항목이 있는지 여부
    pub fn has_expressions(&self) -> bool {
        !self.exprs.is_empty()
    }

    /// 어떤 항목이든 있는지 여부
    pub fn has_entries(&self) -> bool {
        self.has_ip_entries() || self.has_expressions()
    }

    /// 검사 횟수 (IP 검사와 표현식 검사 합계)
    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    /// 검사 적중 횟수
    pub fn hits_ok(&self) -> u64 {
        self.hits_ok.load(Ordering::Relaxed)
    }

    /// 이벤트의 소스 주소가 허용 목록에 있는지 검사합니다.
    ///
    /// 로그 이벤트는 `meta["source_ip"]`, 오버플로우 이벤트는 집계된 모든 소스를
    /// 검사하며 첫 번째 적중에서 멈춥니다. IP 항목이 없으면 카운터를 건드리지
    /// 않고 false를 반환합니다.
    pub fn check_ips(&self, event: &Event) -> bool {
        if !self.has_ip_entries() {
            return false;
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::PARSER_WHITELIST_HITS_TOTAL, m::LABEL_REASON => self.reason.clone())
            .increment(1);

        let matched = event.parse_ip_sources().into_iter().find(|src| {
            let src = src.to_canonical();
            if self.ips.contains(&src) {
                tracing::debug!(ip = %src, reason = %self.reason, "event whitelisted by ip");
                return true;
            }
            if let Some(net) = self.cidrs.iter().find(|net| net.contains(&src)) {
                tracing::debug!(ip = %src, cidr = %net, reason = %self.reason, "event whitelisted by cidr");
                return true;
            }
            false
        });

        if matched.is_some() {
            self.hits_ok.fetch_add(1, Ordering::Relaxed);
            metrics::counter!(m::PARSER_WHITELIST_HITS_OK_TOTAL, m::LABEL_REASON => self.reason.clone())
                .increment(1);
            return true;
        }
        false
    }

    /// 표현식 항목을 순서대로 평가합니다. 첫 번째 true에서 멈춥니다.
    ///
    /// 불리언이 아닌 결과는 에러 로그를 남기고 불일치로 취급합니다.
    ///
    /// # Errors
    /// 표현식 실행 에러는 즉시 반환됩니다.
    pub fn check_expressions(&self, env: &ExprEnv<'_>) -> Result<bool, ParserError> {
        if !self.has_expressions() {
            return Ok(false);
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        metrics::counter!(m::PARSER_WHITELIST_HITS_TOTAL, m::LABEL_REASON => self.reason.clone())
            .increment(1);

        for expr in &self.exprs {
            match expr.eval(env)? {
                ExprValue::Bool(true) => {
                    tracing::debug!(
                        expr = expr.source(),
                        reason = %self.reason,
                        "event whitelisted by expression"
                    );
                    self.hits_ok.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!(m::PARSER_WHITELIST_HITS_OK_TOTAL, m::LABEL_REASON => self.reason.clone())
                        .increment(1);
                    return Ok(true);
                }
                ExprValue::Bool(false) => {}
                other => {
                    tracing::error!(
                        expr = expr.source(),
                        type_name = other.type_name(),
                        "whitelist expression must return a bool"
                    );
                }
            }
        }
        Ok(false)
    }
}
