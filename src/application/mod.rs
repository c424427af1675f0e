//! Application services (use cases).
//!
//! These services orchestrate domain logic and coordinate adapters
//! to implement the gateway's use cases.

pub mod auth;
pub mod manager;
pub mod monitor;
pub mod pool;
pub mod status;
pub mod tuner;
