//! Staking client: every canister call goes through the request pipeline
//!
//! Reads are served from the dataset caches when fresh; a cache hit skips
//! the rate limiter. Successful mutations drop the caller's stakes and
//! portfolio entries and every cached pool, since pool totals change.

mod pipeline;

pub use pipeline::{Operation, RequestContext, RequestPipeline};

use crate::backend::{Pool, Portfolio, Principal, Stake, SystemInfo};
use crate::cache::{keys, CacheSet};
use crate::errors::{XonoraError, XonoraResult};
use crate::logger::{self, LogTag};
use crate::monitoring::Monitor;
use crate::rate_limiter::RateLimiters;
use crate::session::SessionManager;
use crate::validation::{error_message, format_btc, sanitize, ValidationResult, Validator};
use std::future::Future;
use std::sync::Arc;
use tokio::time::Instant;

pub struct XonoraClient {
    session: Arc<SessionManager>,
    caches: Arc<CacheSet>,
    validator: Validator,
    pipeline: RequestPipeline,
}

impl XonoraClient {
    pub fn new(
        session: Arc<SessionManager>,
        caches: Arc<CacheSet>,
        limiters: Arc<RateLimiters>,
        monitor: Arc<Monitor>,
        validator: Validator,
    ) -> Self {
        let pipeline = RequestPipeline::new(session.clone(), limiters, monitor);
        Self {
            session,
            caches,
            validator,
            pipeline,
        }
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    // =========================================================================
    // MUTATIONS
    // =========================================================================

    /// Stake a decimal ckBTC `amount` into `pool_id`; returns the new stake id
    pub async fn stake(&self, amount: &str, pool_id: &str) -> XonoraResult<u64> {
        self.run(Operation::STAKE, |ctx| async move {
            let pool_id = sanitize(pool_id);
            let mut inputs = self.validator.validate_stake_amount(amount);
            inputs.merge(self.validator.validate_pool_id(&pool_id));
            inputs.into_result()?;
            let amount_sats = self.validator.stake_amount_sats(amount)?;
            self.pipeline.admit(&ctx, Operation::STAKE)?;

            let existing = self.stakes_for_rules(&ctx).await?;
            self.validator
                .validate_staking_rules(amount_sats, &pool_id, &existing)
                .into_result()?;

            let stake_id = self
                .pipeline
                .invoke(&ctx, Operation::STAKE, ctx.backend.stake(amount_sats, &pool_id))
                .await?;

            self.invalidate_after_mutation(&ctx.principal);
            logger::info(
                LogTag::Backend,
                &format!(
                    "Staked {} ckBTC in {} (stake #{})",
                    format_btc(amount_sats),
                    pool_id,
                    stake_id
                ),
            );
            Ok(stake_id)
        })
        .await
    }

    /// Close a stake; returns the amount paid out in satoshis
    pub async fn unstake(&self, stake_id: &str) -> XonoraResult<u64> {
        self.run(Operation::UNSTAKE, |ctx| async move {
            let stake_id = self.validator.parse_stake_id(stake_id)?;

            let paid = self
                .pipeline
                .invoke(&ctx, Operation::UNSTAKE, ctx.backend.unstake(stake_id))
                .await?;

            self.invalidate_after_mutation(&ctx.principal);
            self.caches.stakes.delete(&keys::stake(stake_id));
            logger::info(
                LogTag::Backend,
                &format!("Unstaked #{} for {} ckBTC", stake_id, format_btc(paid)),
            );
            Ok(paid)
        })
        .await
    }

    /// One-time canister setup; the caller becomes the owner
    pub async fn initialize_system(&self) -> XonoraResult<String> {
        self.run(Operation::INITIALIZE_SYSTEM, |ctx| async move {
            let message = self
                .pipeline
                .invoke(&ctx, Operation::INITIALIZE_SYSTEM, ctx.backend.initialize())
                .await?;
            self.caches
                .system_info
                .invalidate(keys::patterns::ALL_SYSTEM);
            Ok(message)
        })
        .await
    }

    // =========================================================================
    // QUERIES
    // =========================================================================

    pub async fn get_pools(&self) -> XonoraResult<Vec<Pool>> {
        self.run(Operation::GET_POOLS, |ctx| async move {
            if let Some(pools) = self.caches.pools.get(keys::POOLS) {
                return Ok(pools);
            }

            let pools = self
                .pipeline
                .invoke(&ctx, Operation::GET_POOLS, async {
                    ctx.backend.get_pools().await.map(Ok)
                })
                .await?;
            let pools: Vec<Pool> = pools
                .into_iter()
                .filter(|pool| self.accept(&format!("pool {}", pool.id), self.validator.validate_pool(pool)))
                .collect();

            self.caches.pools.set(keys::POOLS, pools.clone());
            Ok(pools)
        })
        .await
    }

    pub async fn get_pool(&self, pool_id: &str) -> XonoraResult<Pool> {
        self.run(Operation::GET_POOL, |ctx| async move {
            let pool_id = sanitize(pool_id);
            self.validator.validate_pool_id(&pool_id).into_result()?;

            let key = keys::pool(&pool_id);
            if let Some(pool) = self.caches.pools.get(&key).and_then(|p| p.into_iter().next()) {
                return Ok(pool);
            }

            let pool = self
                .pipeline
                .invoke(&ctx, Operation::GET_POOL, ctx.backend.get_pool(&pool_id))
                .await?;
            self.check_record(Operation::GET_POOL, self.validator.validate_pool(&pool))?;

            self.caches.pools.set(key, vec![pool.clone()]);
            Ok(pool)
        })
        .await
    }

    pub async fn get_user_stakes(&self, user_id: &str) -> XonoraResult<Vec<Stake>> {
        self.run(Operation::GET_USER_STAKES, |ctx| async move {
            let user_id = sanitize(user_id);
            self.validator.validate_user_id(&user_id).into_result()?;

            let key = keys::user_stakes(&user_id);
            if let Some(stakes) = self.caches.stakes.get(&key) {
                return Ok(stakes);
            }

            let user = Principal::new(user_id);
            let stakes = self
                .pipeline
                .invoke(&ctx, Operation::GET_USER_STAKES, async {
                    ctx.backend.get_user_stakes(&user).await.map(Ok)
                })
                .await?;
            let stakes: Vec<Stake> = stakes
                .into_iter()
                .filter(|s| self.accept(&format!("stake #{}", s.id), self.validator.validate_stake(s)))
                .collect();

            self.caches.stakes.set(key, stakes.clone());
            Ok(stakes)
        })
        .await
    }

    /// Stakes of the connected user
    pub async fn my_stakes(&self) -> XonoraResult<Vec<Stake>> {
        let principal = self.session.principal().ok_or(XonoraError::NotConnected)?;
        self.get_user_stakes(principal.as_str()).await
    }

    pub async fn get_portfolio(&self, user_id: &str) -> XonoraResult<Portfolio> {
        self.run(Operation::GET_PORTFOLIO, |ctx| async move {
            let user_id = sanitize(user_id);
            self.validator.validate_user_id(&user_id).into_result()?;

            let key = keys::portfolio(&user_id);
            if let Some(portfolio) = self.caches.portfolio.get(&key) {
                return Ok(portfolio);
            }

            let user = Principal::new(user_id);
            let portfolio = self
                .pipeline
                .invoke(&ctx, Operation::GET_PORTFOLIO, ctx.backend.get_portfolio(&user))
                .await?;
            self.check_record(
                Operation::GET_PORTFOLIO,
                self.validator.validate_portfolio(&portfolio),
            )?;

            self.caches.portfolio.set(key, portfolio.clone());
            Ok(portfolio)
        })
        .await
    }

    /// Portfolio of the connected user
    pub async fn my_portfolio(&self) -> XonoraResult<Portfolio> {
        let principal = self.session.principal().ok_or(XonoraError::NotConnected)?;
        self.get_portfolio(principal.as_str()).await
    }

    pub async fn get_stake(&self, stake_id: &str) -> XonoraResult<Stake> {
        self.run(Operation::GET_STAKE, |ctx| async move {
            let stake_id = self.validator.parse_stake_id(stake_id)?;

            let key = keys::stake(stake_id);
            if let Some(stake) = self.caches.stakes.get(&key).and_then(|s| s.into_iter().next()) {
                return Ok(stake);
            }

            let stake = self
                .pipeline
                .invoke(&ctx, Operation::GET_STAKE, ctx.backend.get_stake(stake_id))
                .await?;

            self.caches.stakes.set(key, vec![stake.clone()]);
            Ok(stake)
        })
        .await
    }

    pub async fn get_system_info(&self) -> XonoraResult<SystemInfo> {
        self.run(Operation::GET_SYSTEM_INFO, |ctx| async move {
            if let Some(info) = self.caches.system_info.get(keys::SYSTEM_INFO) {
                return Ok(info);
            }

            let info = self
                .pipeline
                .invoke(&ctx, Operation::GET_SYSTEM_INFO, async {
                    ctx.backend.get_system_info().await.map(Ok)
                })
                .await?;

            self.caches.system_info.set(keys::SYSTEM_INFO, info.clone());
            Ok(info)
        })
        .await
    }

    /// Caller principal as the canister sees it
    pub async fn whoami(&self) -> XonoraResult<Principal> {
        self.run(Operation::WHOAMI, |ctx| async move {
            let key = keys::whoami(ctx.principal.as_str());
            if let Some(principal) = self.caches.whoami.get(&key) {
                return Ok(principal);
            }

            let principal = self
                .pipeline
                .invoke(&ctx, Operation::WHOAMI, async {
                    ctx.backend.whoami().await.map(Ok)
                })
                .await?;

            self.caches.whoami.set(key, principal.clone());
            Ok(principal)
        })
        .await
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    /// Require a session, run `body`, record the outcome
    async fn run<T, F, Fut>(&self, op: Operation, body: F) -> XonoraResult<T>
    where
        F: FnOnce(RequestContext) -> Fut,
        Fut: Future<Output = XonoraResult<T>>,
    {
        let started = Instant::now();
        let (user, result) = match self.pipeline.require_session() {
            Ok(ctx) => {
                let user = ctx.principal.clone();
                (Some(user), body(ctx).await)
            }
            Err(e) => (None, Err(e)),
        };
        self.pipeline
            .record_outcome(op, user.as_ref(), started.elapsed(), &result);
        result
    }

    /// The caller's stakes for the business rules, cached when possible
    async fn stakes_for_rules(&self, ctx: &RequestContext) -> XonoraResult<Vec<Stake>> {
        let key = keys::user_stakes(ctx.principal.as_str());
        if let Some(stakes) = self.caches.stakes.get(&key) {
            return Ok(stakes);
        }
        let stakes = ctx.backend.get_user_stakes(&ctx.principal).await?;
        self.caches.stakes.set(key, stakes.clone());
        Ok(stakes)
    }

    fn invalidate_after_mutation(&self, user: &Principal) {
        let removed = self.caches.invalidate_user(user.as_str())
            + self.caches.pools.invalidate(keys::patterns::ALL_POOLS);
        logger::debug(
            LogTag::Cache,
            &format!("Dropped {} cache entries after mutation", removed),
        );
    }

    /// A malformed single record from the canister is a backend fault
    fn check_record(&self, op: Operation, result: ValidationResult) -> XonoraResult<()> {
        if result.is_valid {
            Ok(())
        } else {
            Err(XonoraError::unexpected(op.name, error_message(&result)))
        }
    }

    /// Keep a record from the canister unless its shape is off
    fn accept(&self, what: &str, result: ValidationResult) -> bool {
        if !result.is_valid {
            logger::warning(
                LogTag::Validation,
                &format!("Dropping malformed {}: {}", what, result.errors.join(", ")),
            );
        }
        result.is_valid
    }
}

#[cfg(test)]
mod tests;
