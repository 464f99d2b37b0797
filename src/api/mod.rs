//! Cloud Backup API interaction module
//!
//! This module provides the remote side of the backup subsystem: wire types,
//! authentication, the HTTP client and long-running operation handling.
//!
//! # Module Structure
//!
//! - [`auth`] - IAM token handling (static token or OAuth exchange)
//! - [`client`] - The [`client::BackupApi`] trait and its REST implementation
//! - [`error`] - Status codes and API errors
//! - [`http`] - HTTP utilities for REST API calls
//! - [`operation`] - Operation handles and polling
//! - [`types`] - Policy, settings and application messages
//!
//! # Example
//!
//! ```ignore
//! use ycbackup::api::client::{list_all_policies, BackupClient};
//!
//! async fn example(client: &BackupClient) -> anyhow::Result<()> {
//!     let policies = list_all_policies(client, "b1gfolder").await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod error;
pub mod http;
pub mod operation;
pub mod types;
