//! Client configuration
//!
//! - `client_config`: Configuration structure
//! - `defaults`: Default configuration values

pub mod client_config;
pub mod defaults;

pub use client_config::ClientConfig;
