//! Checks and handlers keeping a Consul cluster and a Sensu client registry
//! in line with reality

pub mod api;
pub mod commands;
pub mod config;
pub mod consul;
pub mod ec2;
pub mod logging;
pub mod plugin;
pub mod sensu;

pub use config::Settings;
pub use plugin::{CheckStatus, PluginOutput};
