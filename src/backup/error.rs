//! Errors raised while validating, expanding, flattening and binding policies

use crate::api::error::ApiError;
use thiserror::Error;

/// Configuration problems detected before any request is sent
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid interval {value:?}: expected digits followed by one of s, m, h, d, w, M")]
    InvalidInterval { value: String },

    #[error("{field} is required")]
    Required { field: &'static str },

    #[error("invalid time of day {value:?}: expected HH:MM in 24-hour format")]
    InvalidTimeOfDay { value: String },

    #[error("unknown {field} value {value:?}")]
    UnknownEnum { field: &'static str, value: String },

    #[error("retention rule #{index}: should be set exactly one of: max_age, max_count")]
    RetentionRuleCondition { index: usize },

    #[error("retention rule #{index}: repeat_period should not be empty")]
    EmptyRepeatPeriod { index: usize },

    #[error("should be set exactly one of: execute_by_interval, execute_by_time")]
    BackupSetSetting,

    #[error("at least one backup set should be specified")]
    NoBackupSets,

    #[error("invalid splitting_bytes {value:?}: expected a decimal number of bytes")]
    InvalidSplittingBytes { value: String },

    #[error("archive_name {value:?} must not end with a variable followed by digits")]
    InvalidArchiveName { value: String },

    #[error("{field} = {value} is out of range {min}..={max}")]
    OutOfRange {
        field: &'static str,
        value: i64,
        min: i64,
        max: i64,
    },

    #[error("{}", join_errors(.0))]
    Multiple(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl ValidationError {
    /// Collapse a list of problems into a single error, or `Ok` when empty
    pub fn from_all(mut errors: Vec<ValidationError>) -> Result<(), ValidationError> {
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Multiple(errors)),
        }
    }
}

/// The server returned settings that break the contract the flattener relies on
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FlattenError {
    #[error("expected to have at least one scheduling backup set")]
    NoBackupSets,
}

/// Errors of the policy-to-instance binding lifecycle
#[derive(Debug, Error)]
pub enum BindingError {
    /// The policy has no application for the instance; the binding is gone
    #[error("backup policy bindings not found")]
    NotFound,

    #[error("invalid backup policy bindings id {id:?}: expected \"<policy_id>:<instance_id>\"")]
    InvalidId { id: String },

    #[error("no activated backup provider in folder {folder_id}: activate Cloud Backup before binding policies")]
    NoActivatedProvider { folder_id: String },

    #[error("failed to apply policy {policy_id} to instance {instance_id} after {attempts} attempts: {reason}")]
    RetriesExhausted {
        policy_id: String,
        instance_id: String,
        attempts: u32,
        reason: String,
    },

    #[error("deadline exceeded while waiting to retry policy application")]
    DeadlineExceeded,

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// Errors of the policy resource lifecycle
#[derive(Debug, Error)]
pub enum PolicyError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Flatten(#[from] FlattenError),

    #[error("policy {0} not found")]
    NotFound(String),

    #[error("found multiple policies with name {name:?} in folder {folder_id}")]
    MultipleMatches { name: String, folder_id: String },

    #[error("folder_id is required to {0}")]
    MissingFolder(&'static str),

    #[error("operation {0} did not report a policy id")]
    MissingPolicyId(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}
