//! Cloud Backup policy management
//!
//! - [`api`] talks to the Cloud Backup control plane
//! - [`backup`] maps declarative policy configuration to API settings and
//!   manages policy bindings
//! - [`config`] holds provider configuration

pub mod api;
pub mod backup;
pub mod config;
