// src/core/mod.rs

//! The core request cache and coalescing engine.

pub mod errors;
pub mod fetch;
pub mod gateway;
pub mod inflight;
pub mod key;
pub mod metrics;
pub mod policy;
pub mod refresh;
pub mod store;

pub use errors::GatewayError;
