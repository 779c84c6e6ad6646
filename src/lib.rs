// src/lib.rs

pub mod config;
pub mod core;

// Re-export
pub use crate::config::GatewayConfig;
pub use crate::core::errors::GatewayError;
pub use crate::core::fetch::{FetchExecutor, FetchRequest, HttpExecutor, ResponsePayload};
pub use crate::core::gateway::{RequestGateway, RequestOptions};
