//! Request stages shared by every client operation
//!
//! A request runs: require-session, validate, rate-limit, invoke, record
//! usage, cache/invalidate, record metrics. Validation and caching are
//! operation specific and live with the operations; the stages here are
//! the ones every operation runs the same way.

use crate::backend::{CanisterBackend, Principal, RemoteResult};
use crate::errors::{ConnectionError, XonoraError, XonoraResult};
use crate::logger::{self, LogTag};
use crate::monitoring::Monitor;
use crate::rate_limiter::{LimitKind, RateLimiters};
use crate::session::SessionManager;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Name and rate limit class of one client operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Operation {
    pub name: &'static str,
    pub limit: LimitKind,
}

impl Operation {
    pub const STAKE: Operation = Operation::new("stake", LimitKind::Stake);
    pub const UNSTAKE: Operation = Operation::new("unstake", LimitKind::Unstake);
    pub const INITIALIZE_SYSTEM: Operation = Operation::new("initialize_system", LimitKind::Query);
    pub const GET_POOLS: Operation = Operation::new("get_pools", LimitKind::Query);
    pub const GET_POOL: Operation = Operation::new("get_pool", LimitKind::Query);
    pub const GET_USER_STAKES: Operation = Operation::new("get_user_stakes", LimitKind::Query);
    pub const GET_PORTFOLIO: Operation = Operation::new("get_portfolio", LimitKind::Query);
    pub const GET_STAKE: Operation = Operation::new("get_stake", LimitKind::Query);
    pub const GET_SYSTEM_INFO: Operation = Operation::new("get_system_info", LimitKind::Query);
    pub const WHOAMI: Operation = Operation::new("whoami", LimitKind::Query);

    pub const fn new(name: &'static str, limit: LimitKind) -> Self {
        Self { name, limit }
    }
}

/// Session snapshot a request runs under
pub struct RequestContext {
    pub principal: Principal,
    pub backend: Arc<dyn CanisterBackend>,
}

pub struct RequestPipeline {
    session: Arc<SessionManager>,
    limiters: Arc<RateLimiters>,
    monitor: Arc<Monitor>,
}

impl RequestPipeline {
    pub fn new(
        session: Arc<SessionManager>,
        limiters: Arc<RateLimiters>,
        monitor: Arc<Monitor>,
    ) -> Self {
        Self {
            session,
            limiters,
            monitor,
        }
    }

    pub fn require_session(&self) -> XonoraResult<RequestContext> {
        let (principal, backend) = self.session.require_connected()?;
        Ok(RequestContext { principal, backend })
    }

    /// Check the operation's policy, then the global ceiling; records nothing
    pub fn admit(&self, ctx: &RequestContext, op: Operation) -> XonoraResult<()> {
        let identifier = ctx.principal.as_str();
        for limiter in [self.limiters.for_kind(op.limit), &self.limiters.global] {
            let decision = limiter.is_allowed(identifier, op.name);
            if !decision.allowed {
                let retry_after_secs = decision.retry_after_secs().unwrap_or(1);
                logger::warning(
                    LogTag::RateLimit,
                    &format!(
                        "{} blocked by {} limit for {}, retry in {}s",
                        op.name,
                        limiter.name(),
                        ctx.principal.to_display_short(),
                        retry_after_secs
                    ),
                );
                return Err(XonoraError::RateLimit {
                    operation: op.name.to_string(),
                    retry_after_secs,
                });
            }
        }
        Ok(())
    }

    pub fn record_usage(&self, ctx: &RequestContext, op: Operation, success: bool) {
        let identifier = ctx.principal.as_str();
        self.limiters
            .for_kind(op.limit)
            .record_request(identifier, op.name, success);
        self.limiters
            .global
            .record_request(identifier, op.name, success);
    }

    /// Rate-limit, call the canister, record usage
    ///
    /// Transport failures pass through as `Connection`; a canister `err`
    /// answer becomes `Remote` carrying the canister's text verbatim.
    pub async fn invoke<T, Fut>(
        &self,
        ctx: &RequestContext,
        op: Operation,
        call: Fut,
    ) -> XonoraResult<T>
    where
        Fut: Future<Output = Result<RemoteResult<T>, ConnectionError>>,
    {
        self.admit(ctx, op)?;

        let result = match call.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(message)) => Err(XonoraError::remote(op.name, message)),
            Err(e) => Err(XonoraError::from(e)),
        };

        self.record_usage(ctx, op, result.is_ok());
        result
    }

    pub fn record_outcome<T>(
        &self,
        op: Operation,
        user: Option<&Principal>,
        elapsed: Duration,
        result: &XonoraResult<T>,
    ) {
        let error = match result {
            Ok(_) => {
                self.monitor.record_performance(op.name, elapsed, true, None);
                return;
            }
            Err(e) => e,
        };

        self.monitor
            .record_performance(op.name, elapsed, false, Some(error.to_string()));

        let mut context = BTreeMap::new();
        context.insert("recoverable".to_string(), error.is_recoverable().to_string());
        if let XonoraError::Connection(conn) = error {
            context.insert("kind".to_string(), conn.kind.as_str().to_string());
        }
        if let Some(secs) = error.retry_after_secs() {
            context.insert("retry_after_secs".to_string(), secs.to_string());
        }
        self.monitor.record_error(
            &error.to_string(),
            op.name,
            error.category(),
            user.map(Principal::as_str),
            context,
        );
    }
}
