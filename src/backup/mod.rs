//! Backup policy subsystem
//!
//! Maps between the declarative policy configuration and the API settings
//! tree, and manages policy-to-instance bindings.
//!
//! # Module Structure
//!
//! - [`interval`] - Interval parsing, formatting and normalization
//! - [`schema`] - Declarative configuration and its validation
//! - [`expand`] - Configuration to settings tree
//! - [`flatten`] - Settings tree to configuration, backup set hashing
//! - [`policy`] - Policy create / read / update / delete / find
//! - [`bindings`] - Apply-with-retry, read and revoke of bindings
//! - [`error`] - Error types

pub mod bindings;
pub mod error;
pub mod expand;
pub mod flatten;
pub mod interval;
pub mod policy;
pub mod schema;

pub use error::{BindingError, FlattenError, PolicyError, ValidationError};
pub use schema::PolicyConfig;
