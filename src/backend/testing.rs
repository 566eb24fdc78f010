//! In-memory collaborators for tests and offline mode
//!
//! `InMemoryCanister` keeps a small staking ledger behind a lock and mirrors
//! the canister's `{ok} | {err}` answers. `ScriptedIdentityProvider` replays
//! queued login outcomes. Both allow failure injection with a chosen
//! `ConnectionErrorKind`.

use super::{
    to_nanos, BackendConnector, CanisterBackend, Identity, IdentityProvider, Pool, Portfolio,
    Principal, RemoteResult, Stake, SystemInfo, SATS_PER_BTC,
};
use crate::errors::ConnectionError;
use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

// =============================================================================
// CANISTER
// =============================================================================

struct Ledger {
    owner: Principal,
    initialized: bool,
    pools: Vec<Pool>,
    stakes: Vec<Stake>,
    next_stake_id: u64,
    calls: HashMap<&'static str, usize>,
    failures: VecDeque<ConnectionError>,
}

impl Ledger {
    fn enter(&mut self, method: &'static str) -> Result<(), ConnectionError> {
        *self.calls.entry(method).or_insert(0) += 1;
        match self.failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Shared in-memory staking ledger
#[derive(Clone)]
pub struct InMemoryCanister {
    ledger: Arc<Mutex<Ledger>>,
}

impl InMemoryCanister {
    /// Ledger seeded with the three standard pools
    pub fn new() -> Self {
        let pools = vec![
            seed_pool("stable", "Stable Pool", 5.0),
            seed_pool("balanced", "Balanced Pool", 10.0),
            seed_pool("aggressive", "Aggressive Pool", 15.0),
        ];

        Self {
            ledger: Arc::new(Mutex::new(Ledger {
                owner: Principal::anonymous(),
                initialized: false,
                pools,
                stakes: Vec::new(),
                next_stake_id: 0,
                calls: HashMap::new(),
                failures: VecDeque::new(),
            })),
        }
    }

    /// Request client acting as `caller`
    pub fn bind(&self, caller: Principal) -> Arc<dyn CanisterBackend> {
        Arc::new(CanisterActor {
            ledger: self.ledger.clone(),
            caller,
        })
    }

    /// Id handed to the next successful stake
    pub fn set_next_stake_id(&self, id: u64) {
        self.ledger.lock().next_stake_id = id;
    }

    /// Make the next call (whatever method) fail at the transport level
    pub fn fail_next(&self, error: ConnectionError) {
        self.ledger.lock().failures.push_back(error);
    }

    pub fn set_pool_active(&self, pool_id: &str, active: bool) {
        let mut ledger = self.ledger.lock();
        if let Some(pool) = ledger.pools.iter_mut().find(|p| p.id == pool_id) {
            pool.is_active = active;
        }
    }

    /// Rewrite a stored pool in place; lets tests serve malformed records
    pub fn update_pool(&self, pool_id: &str, f: impl FnOnce(&mut Pool)) {
        let mut ledger = self.ledger.lock();
        if let Some(pool) = ledger.pools.iter_mut().find(|p| p.id == pool_id) {
            f(pool);
        }
    }

    /// Insert a stake directly, bypassing validation
    pub fn insert_stake(&self, stake: Stake) {
        let mut ledger = self.ledger.lock();
        if let Some(pool) = ledger.pools.iter_mut().find(|p| p.id == stake.pool_id) {
            pool.total_staked += stake.amount;
        }
        ledger.next_stake_id = ledger.next_stake_id.max(stake.id + 1);
        ledger.stakes.push(stake);
    }

    /// How many times `method` was invoked
    pub fn call_count(&self, method: &str) -> usize {
        self.ledger.lock().calls.get(method).copied().unwrap_or(0)
    }
}

impl Default for InMemoryCanister {
    fn default() -> Self {
        Self::new()
    }
}

fn seed_pool(id: &str, name: &str, apy: f64) -> Pool {
    Pool {
        id: id.to_string(),
        name: name.to_string(),
        apy,
        total_staked: 0,
        max_capacity: 100 * SATS_PER_BTC,
        is_active: true,
    }
}

struct CanisterActor {
    ledger: Arc<Mutex<Ledger>>,
    caller: Principal,
}

#[async_trait]
impl CanisterBackend for CanisterActor {
    async fn initialize(&self) -> Result<RemoteResult<String>, ConnectionError> {
        let mut ledger = self.ledger.lock();
        ledger.enter("initialize")?;
        if ledger.initialized {
            return Ok(Err("System already initialized".to_string()));
        }
        ledger.initialized = true;
        ledger.owner = self.caller.clone();
        Ok(Ok("System initialized successfully".to_string()))
    }

    async fn stake(&self, amount: u64, pool_id: &str) -> Result<RemoteResult<u64>, ConnectionError> {
        let mut ledger = self.ledger.lock();
        ledger.enter("stake")?;

        if self.caller.is_anonymous() {
            return Ok(Err("Anonymous principals cannot stake".to_string()));
        }
        if amount == 0 {
            return Ok(Err("Amount must be greater than 0".to_string()));
        }

        let pool = match ledger.pools.iter_mut().find(|p| p.id == pool_id) {
            Some(pool) => pool,
            None => return Ok(Err("Pool not found".to_string())),
        };
        if !pool.is_active {
            return Ok(Err("Pool is not active".to_string()));
        }
        if pool.total_staked.saturating_add(amount) > pool.max_capacity {
            return Ok(Err("Pool capacity exceeded".to_string()));
        }
        pool.total_staked += amount;

        let now = to_nanos(Utc::now());
        let id = ledger.next_stake_id;
        ledger.next_stake_id += 1;
        ledger.stakes.push(Stake {
            id,
            user_id: self.caller.clone(),
            amount,
            pool_id: pool_id.to_string(),
            start_time: now,
            last_claim_time: now,
            is_active: true,
        });
        Ok(Ok(id))
    }

    async fn unstake(&self, stake_id: u64) -> Result<RemoteResult<u64>, ConnectionError> {
        let mut ledger = self.ledger.lock();
        ledger.enter("unstake")?;

        let (amount, pool_id) = match ledger.stakes.iter_mut().find(|s| s.id == stake_id) {
            None => return Ok(Err("Stake not found".to_string())),
            Some(stake) if stake.user_id != self.caller => {
                return Ok(Err("Not authorized to unstake this position".to_string()))
            }
            Some(stake) if !stake.is_active => {
                return Ok(Err("Stake is already inactive".to_string()))
            }
            Some(stake) => {
                stake.is_active = false;
                (stake.amount, stake.pool_id.clone())
            }
        };

        if let Some(pool) = ledger.pools.iter_mut().find(|p| p.id == pool_id) {
            pool.total_staked = pool.total_staked.saturating_sub(amount);
        }
        Ok(Ok(amount))
    }

    async fn get_pools(&self) -> Result<Vec<Pool>, ConnectionError> {
        let mut ledger = self.ledger.lock();
        ledger.enter("get_pools")?;
        Ok(ledger.pools.clone())
    }

    async fn get_pool(&self, pool_id: &str) -> Result<RemoteResult<Pool>, ConnectionError> {
        let mut ledger = self.ledger.lock();
        ledger.enter("get_pool")?;
        Ok(ledger
            .pools
            .iter()
            .find(|p| p.id == pool_id)
            .cloned()
            .ok_or_else(|| "Pool not found".to_string()))
    }

    async fn get_user_stakes(&self, user: &Principal) -> Result<Vec<Stake>, ConnectionError> {
        let mut ledger = self.ledger.lock();
        ledger.enter("get_user_stakes")?;
        Ok(ledger
            .stakes
            .iter()
            .filter(|s| &s.user_id == user)
            .cloned()
            .collect())
    }

    async fn get_portfolio(
        &self,
        user: &Principal,
    ) -> Result<RemoteResult<Portfolio>, ConnectionError> {
        let mut ledger = self.ledger.lock();
        ledger.enter("get_portfolio")?;

        let stakes: Vec<&Stake> = ledger.stakes.iter().filter(|s| &s.user_id == user).collect();
        if stakes.is_empty() {
            return Ok(Err("Portfolio not found".to_string()));
        }
        let active: Vec<&Stake> = stakes.into_iter().filter(|s| s.is_active).collect();
        Ok(Ok(Portfolio {
            user_id: user.clone(),
            total_staked: active.iter().map(|s| s.amount).sum(),
            total_earned: 0,
            active_stakes: active.iter().map(|s| s.id).collect(),
        }))
    }

    async fn get_stake(&self, stake_id: u64) -> Result<RemoteResult<Stake>, ConnectionError> {
        let mut ledger = self.ledger.lock();
        ledger.enter("get_stake")?;
        Ok(ledger
            .stakes
            .iter()
            .find(|s| s.id == stake_id)
            .cloned()
            .ok_or_else(|| "Stake not found".to_string()))
    }

    async fn get_system_info(&self) -> Result<SystemInfo, ConnectionError> {
        let mut ledger = self.ledger.lock();
        ledger.enter("get_system_info")?;
        Ok(SystemInfo {
            owner: ledger.owner.clone(),
            is_initialized: ledger.initialized,
            total_stakes: ledger.stakes.len() as u64,
        })
    }

    async fn whoami(&self) -> Result<Principal, ConnectionError> {
        let mut ledger = self.ledger.lock();
        ledger.enter("whoami")?;
        Ok(self.caller.clone())
    }
}

// =============================================================================
// CONNECTOR
// =============================================================================

/// Binds the in-memory canister to whichever identity connects
pub struct InMemoryConnector {
    canister: InMemoryCanister,
    failures: Mutex<VecDeque<ConnectionError>>,
    connects: Mutex<usize>,
}

impl InMemoryConnector {
    pub fn new(canister: InMemoryCanister) -> Self {
        Self {
            canister,
            failures: Mutex::new(VecDeque::new()),
            connects: Mutex::new(0),
        }
    }

    /// Queue a failure for the next `connect`
    pub fn fail_next(&self, error: ConnectionError) {
        self.failures.lock().push_back(error);
    }

    pub fn connect_count(&self) -> usize {
        *self.connects.lock()
    }
}

#[async_trait]
impl BackendConnector for InMemoryConnector {
    async fn connect(&self, identity: &Identity) -> Result<Arc<dyn CanisterBackend>, ConnectionError> {
        *self.connects.lock() += 1;
        if let Some(err) = self.failures.lock().pop_front() {
            return Err(err);
        }
        Ok(self.canister.bind(identity.principal.clone()))
    }
}

// =============================================================================
// IDENTITY PROVIDER
// =============================================================================

#[derive(Default)]
struct ProviderState {
    session: Option<Identity>,
    login_outcomes: VecDeque<Result<Identity, ConnectionError>>,
    check_failures: VecDeque<ConnectionError>,
    logout_failure: Option<ConnectionError>,
    logins: usize,
}

/// Identity provider that replays queued outcomes
///
/// `login` pops the next queued outcome; with nothing queued it fails with
/// an identity error, as a cancelled popup would.
#[derive(Default)]
pub struct ScriptedIdentityProvider {
    state: Mutex<ProviderState>,
}

impl ScriptedIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provider with a resumable session already in place
    pub fn with_session(principal: Principal) -> Self {
        let provider = Self::new();
        provider.state.lock().session = Some(Identity::new(principal));
        provider
    }

    pub fn push_login(&self, outcome: Result<Identity, ConnectionError>) {
        self.state.lock().login_outcomes.push_back(outcome);
    }

    /// Fail the next `is_authenticated` / `current_identity` probe
    pub fn fail_next_check(&self, error: ConnectionError) {
        self.state.lock().check_failures.push_back(error);
    }

    pub fn fail_logout(&self, error: ConnectionError) {
        self.state.lock().logout_failure = Some(error);
    }

    /// Drop the provider-side session as if the delegation expired
    pub fn expire_session(&self) {
        self.state.lock().session = None;
    }

    pub fn set_session(&self, principal: Principal) {
        self.state.lock().session = Some(Identity::new(principal));
    }

    pub fn login_count(&self) -> usize {
        self.state.lock().logins
    }
}

#[async_trait]
impl IdentityProvider for ScriptedIdentityProvider {
    async fn is_authenticated(&self) -> Result<bool, ConnectionError> {
        let mut state = self.state.lock();
        if let Some(err) = state.check_failures.pop_front() {
            return Err(err);
        }
        Ok(state
            .session
            .as_ref()
            .map(|identity| !identity.is_expired_at(Utc::now()))
            .unwrap_or(false))
    }

    async fn current_identity(&self) -> Result<Option<Identity>, ConnectionError> {
        let mut state = self.state.lock();
        if let Some(err) = state.check_failures.pop_front() {
            return Err(err);
        }
        Ok(state.session.clone())
    }

    async fn login(&self) -> Result<Identity, ConnectionError> {
        let mut state = self.state.lock();
        state.logins += 1;
        let outcome = state
            .login_outcomes
            .pop_front()
            .unwrap_or_else(|| Err(ConnectionError::identity("Login window closed by user")));
        if let Ok(identity) = &outcome {
            state.session = Some(identity.clone());
        }
        outcome
    }

    async fn logout(&self) -> Result<(), ConnectionError> {
        let mut state = self.state.lock();
        state.session = None;
        match state.logout_failure.take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
