//! Consul agent integration
pub mod client;
pub mod config;

pub use client::ConsulRegistry;
pub use config::ConsulConfig;
