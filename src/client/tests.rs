//! End-to-end tests for the request pipeline against the in-memory canister

use super::*;
use crate::backend::testing::InMemoryCanister;
use crate::backend::SATS_PER_BTC;
use crate::config::Config;
use crate::context::AppContext;
use crate::errors::{ConnectionError, ConnectionErrorKind};
use std::time::Duration;

const ALICE: &str = "alice-principal-0001";

/// Context with a resumed session for ALICE
async fn connected() -> (AppContext, InMemoryCanister) {
    let (ctx, canister) = AppContext::offline(Config::default(), Principal::new(ALICE));
    assert!(ctx.session.initialize().await.is_connected());
    (ctx, canister)
}

#[tokio::test(start_paused = true)]
async fn test_stake_invalidates_user_stakes() {
    let (ctx, canister) = connected().await;
    canister.set_next_stake_id(42);

    assert!(ctx.client.get_user_stakes(ALICE).await.unwrap().is_empty());
    assert!(ctx.caches.stakes.has(&keys::user_stakes(ALICE)));

    let stake_id = ctx.client.stake("0.5", "balanced").await.unwrap();
    assert_eq!(stake_id, 42);
    assert!(!ctx.caches.stakes.has(&keys::user_stakes(ALICE)));
    assert_eq!(ctx.limiters.stake.info(ALICE, "stake").remaining, 9);

    let stakes = ctx.client.get_user_stakes(ALICE).await.unwrap();
    assert_eq!(stakes.len(), 1);
    assert_eq!(stakes[0].id, 42);
    assert_eq!(stakes[0].amount, SATS_PER_BTC / 2);
    assert_eq!(canister.call_count("get_user_stakes"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_requests_need_a_session() {
    let (ctx, canister) = AppContext::offline(Config::default(), Principal::new(ALICE));

    let err = ctx.client.stake("0.5", "balanced").await.unwrap_err();
    assert!(matches!(err, XonoraError::NotConnected));
    assert_eq!(canister.call_count("stake"), 0);

    let errors = ctx.monitor.error_stats();
    assert_eq!(errors.total_errors, 1);
    assert_eq!(errors.recent[0].category, "not_connected");
}

#[tokio::test(start_paused = true)]
async fn test_validation_runs_before_the_network() {
    let (ctx, canister) = connected().await;

    let err = ctx.client.stake("0.0009", "vip").await.unwrap_err();
    match err {
        XonoraError::Validation { errors } => assert_eq!(errors.len(), 2),
        other => panic!("expected validation error, got {:?}", other),
    }
    assert_eq!(canister.call_count("stake"), 0);
    assert_eq!(canister.call_count("get_user_stakes"), 0);
    assert_eq!(ctx.limiters.stake.info(ALICE, "stake").remaining, 10);

    let err = ctx.client.unstake("-1").await.unwrap_err();
    assert!(matches!(err, XonoraError::Validation { .. }));
}

#[tokio::test(start_paused = true)]
async fn test_stake_rate_limit() {
    let (ctx, canister) = connected().await;

    for _ in 0..10 {
        ctx.client.stake("0.01", "stable").await.unwrap();
    }
    let err = ctx.client.stake("0.01", "stable").await.unwrap_err();
    assert!(matches!(err, XonoraError::RateLimit { .. }));
    assert!(err.retry_after_secs().unwrap() > 0);
    assert_eq!(canister.call_count("stake"), 10);

    tokio::time::advance(Duration::from_secs(61)).await;
    assert!(ctx.client.stake("0.01", "stable").await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_rate_limited_stake_stays_local() {
    let (ctx, canister) = connected().await;

    for _ in 0..10 {
        ctx.client.stake("0.01", "stable").await.unwrap();
    }
    let fetches = canister.call_count("get_user_stakes");

    let err = ctx.client.stake("0.01", "stable").await.unwrap_err();
    assert!(matches!(err, XonoraError::RateLimit { .. }));
    assert_eq!(canister.call_count("get_user_stakes"), fetches);
    assert_eq!(canister.call_count("stake"), 10);
}

#[tokio::test(start_paused = true)]
async fn test_remote_errors_surface_verbatim() {
    let (ctx, canister) = connected().await;
    canister.set_pool_active("aggressive", false);

    let err = ctx.client.stake("0.5", "aggressive").await.unwrap_err();
    assert_eq!(err.to_string(), "Pool is not active");
    assert_eq!(err.category(), "remote");
    // Failed stakes do not consume the stake budget
    assert_eq!(ctx.limiters.stake.info(ALICE, "stake").remaining, 10);

    let errors = ctx.monitor.error_stats();
    assert_eq!(errors.error_counts.get("Pool is not active"), Some(&1));
}

#[tokio::test(start_paused = true)]
async fn test_connection_errors_keep_their_kind() {
    let (ctx, canister) = connected().await;
    canister.fail_next(ConnectionError::network("connection reset"));

    let err = ctx.client.get_pools().await.unwrap_err();
    match err {
        XonoraError::Connection(e) => assert_eq!(e.kind, ConnectionErrorKind::Network),
        other => panic!("expected connection error, got {:?}", other),
    }
    assert!(ctx.client.get_pools().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_malformed_pool_is_a_backend_fault() {
    let (ctx, canister) = connected().await;
    canister.update_pool("balanced", |pool| pool.apy = 250.0);

    let err = ctx.client.get_pool("balanced").await.unwrap_err();
    match &err {
        XonoraError::Unexpected { operation, message } => {
            assert_eq!(operation, "get_pool");
            assert_eq!(message, "Pool APY must be between 0 and 100");
        }
        other => panic!("expected unexpected error, got {:?}", other),
    }
    assert_eq!(err.category(), "unexpected");
    assert!(!ctx.caches.pools.has(&keys::pool("balanced")));

    // The list view drops the bad record and keeps the rest
    let pools = ctx.client.get_pools().await.unwrap();
    assert_eq!(pools.len(), 2);
    assert!(pools.iter().all(|p| p.id != "balanced"));

    let errors = ctx.monitor.error_stats();
    assert_eq!(errors.recent[0].category, "unexpected");
}

#[tokio::test(start_paused = true)]
async fn test_reads_are_cached_until_mutation() {
    let (ctx, canister) = connected().await;

    assert_eq!(ctx.client.get_pools().await.unwrap().len(), 3);
    ctx.client.get_pools().await.unwrap();
    assert_eq!(canister.call_count("get_pools"), 1);

    let pool = ctx.client.get_pool("balanced").await.unwrap();
    assert_eq!(pool.total_staked, 0);

    ctx.client.stake("0.5", "balanced").await.unwrap();
    let pool = ctx.client.get_pool("balanced").await.unwrap();
    assert_eq!(pool.total_staked, SATS_PER_BTC / 2);
    assert_eq!(canister.call_count("get_pool"), 2);

    ctx.client.get_pools().await.unwrap();
    assert_eq!(canister.call_count("get_pools"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_cached_reads_expire() {
    let (ctx, canister) = connected().await;

    ctx.client.get_system_info().await.unwrap();
    ctx.client.get_system_info().await.unwrap();
    assert_eq!(canister.call_count("get_system_info"), 1);

    tokio::time::advance(Duration::from_secs(301)).await;
    ctx.client.get_system_info().await.unwrap();
    assert_eq!(canister.call_count("get_system_info"), 2);
}

#[tokio::test(start_paused = true)]
async fn test_daily_cap_sees_earlier_stakes() {
    let (ctx, _canister) = connected().await;

    ctx.client.stake("0.6", "stable").await.unwrap();
    let err = ctx.client.stake("0.5", "balanced").await.unwrap_err();
    match err {
        XonoraError::Validation { errors } => {
            assert_eq!(errors, vec!["Daily stake limit exceeded (1 ckBTC per day)"])
        }
        other => panic!("expected validation error, got {:?}", other),
    }
}

#[tokio::test(start_paused = true)]
async fn test_unstake_and_portfolio() {
    let (ctx, canister) = connected().await;
    canister.set_next_stake_id(7);

    let err = ctx.client.my_portfolio().await.unwrap_err();
    assert_eq!(err.to_string(), "Portfolio not found");

    ctx.client.stake("0.25", "stable").await.unwrap();
    let portfolio = ctx.client.my_portfolio().await.unwrap();
    assert_eq!(portfolio.total_staked, SATS_PER_BTC / 4);
    assert_eq!(portfolio.active_stakes, vec![7]);

    let stake = ctx.client.get_stake("7").await.unwrap();
    assert!(stake.is_active);

    assert_eq!(ctx.client.unstake("7").await.unwrap(), SATS_PER_BTC / 4);
    let portfolio = ctx.client.my_portfolio().await.unwrap();
    assert_eq!(portfolio.total_staked, 0);
    assert!(!ctx.client.get_stake("7").await.unwrap().is_active);

    let err = ctx.client.unstake("7").await.unwrap_err();
    assert_eq!(err.to_string(), "Stake is already inactive");
}

#[tokio::test(start_paused = true)]
async fn test_whoami_and_initialize_system() {
    let (ctx, canister) = connected().await;

    assert_eq!(ctx.client.whoami().await.unwrap(), Principal::new(ALICE));
    ctx.client.whoami().await.unwrap();
    assert_eq!(canister.call_count("whoami"), 1);

    assert!(!ctx.client.get_system_info().await.unwrap().is_initialized);
    ctx.client.initialize_system().await.unwrap();
    let info = ctx.client.get_system_info().await.unwrap();
    assert!(info.is_initialized);
    assert_eq!(info.owner, Principal::new(ALICE));

    let err = ctx.client.initialize_system().await.unwrap_err();
    assert_eq!(err.to_string(), "System already initialized");
}

#[tokio::test(start_paused = true)]
async fn test_outcomes_reach_monitoring() {
    let (ctx, _canister) = connected().await;

    ctx.client.get_pools().await.unwrap();
    ctx.client.stake("abc", "stable").await.unwrap_err();

    let perf = ctx.monitor.performance_stats();
    assert_eq!(perf.total_operations, 2);
    assert_eq!(perf.successful_operations, 1);
    assert!(perf.operations.contains_key("get_pools"));

    let errors = ctx.monitor.error_stats();
    assert_eq!(errors.recent[0].category, "validation");
    assert_eq!(errors.recent[0].user_id.as_deref(), Some(ALICE));
}
