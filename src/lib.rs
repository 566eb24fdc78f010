//! Request governance for the Xonora staking client
//!
//! Every call to the staking canister runs through the same ordered stages:
//! the session must be connected, inputs are validated, the rate limiter
//! admits the request, the canister is invoked, usage and outcome are
//! recorded, and the dataset caches are filled or invalidated.
//!
//! [`context::AppContext`] builds and owns all components.

pub mod backend;
pub mod cache;
pub mod client;
pub mod config;
pub mod context;
pub mod errors;
pub mod logger;
pub mod monitoring;
pub mod rate_limiter;
pub mod services;
pub mod session;
pub mod validation;
