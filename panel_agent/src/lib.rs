//! Admin panel backend: authenticated live system metrics, a stored metric
//! history, and an action audit log.

pub mod auth;
pub mod config;
pub mod counters;
pub mod error;
pub mod metrics;
pub mod probe;
pub mod routes;
pub mod sampler;
pub mod server;
pub mod state;
pub mod store;
pub mod types;
