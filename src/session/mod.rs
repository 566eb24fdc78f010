//! Wallet session: identity, connection state and reconnection

mod backoff;
mod manager;
mod state;

pub use backoff::ExponentialBackoff;
pub use manager::SessionManager;
pub use state::SessionState;
