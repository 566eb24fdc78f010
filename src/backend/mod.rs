//! External collaborators: the staking canister and the identity provider
//!
//! The wire protocol belongs to the platform and is consumed as a black box;
//! these traits are the seams the rest of the crate talks through. Every
//! transport failure is returned as a `ConnectionError` already tagged with
//! its kind, so callers never inspect message text.

pub mod testing;
mod types;

pub use types::*;

use crate::errors::ConnectionError;
use async_trait::async_trait;
use std::sync::Arc;

/// Typed calls exposed by the staking canister
///
/// The outer `Result` is the transport; the inner `RemoteResult` is the
/// canister's own `{ok} | {err}` answer.
#[async_trait]
pub trait CanisterBackend: Send + Sync {
    async fn initialize(&self) -> Result<RemoteResult<String>, ConnectionError>;

    /// Returns the new stake id
    async fn stake(&self, amount: u64, pool_id: &str) -> Result<RemoteResult<u64>, ConnectionError>;

    /// Returns the amount paid out
    async fn unstake(&self, stake_id: u64) -> Result<RemoteResult<u64>, ConnectionError>;

    async fn get_pools(&self) -> Result<Vec<Pool>, ConnectionError>;

    async fn get_pool(&self, pool_id: &str) -> Result<RemoteResult<Pool>, ConnectionError>;

    async fn get_user_stakes(&self, user: &Principal) -> Result<Vec<Stake>, ConnectionError>;

    async fn get_portfolio(
        &self,
        user: &Principal,
    ) -> Result<RemoteResult<Portfolio>, ConnectionError>;

    async fn get_stake(&self, stake_id: u64) -> Result<RemoteResult<Stake>, ConnectionError>;

    async fn get_system_info(&self) -> Result<SystemInfo, ConnectionError>;

    async fn whoami(&self) -> Result<Principal, ConnectionError>;
}

/// Interactive login flow hosted by the identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn is_authenticated(&self) -> Result<bool, ConnectionError>;

    /// Identity of the resumable session, if any
    async fn current_identity(&self) -> Result<Option<Identity>, ConnectionError>;

    /// Open the provider's login popup and wait for it to finish
    async fn login(&self) -> Result<Identity, ConnectionError>;

    async fn logout(&self) -> Result<(), ConnectionError>;
}

/// Builds a request client bound to one identity
#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect(&self, identity: &Identity) -> Result<Arc<dyn CanisterBackend>, ConnectionError>;
}
