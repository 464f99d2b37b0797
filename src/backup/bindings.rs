//! Policy-to-instance bindings
//!
//! A binding is the application of a backup policy to a compute instance,
//! identified externally as `"{policy_id}:{instance_id}"`. The backend is
//! eventually consistent: a freshly created instance or policy may not be
//! visible to the apply call yet, so creation retries with a long first
//! backoff and shorter ones after that.

use super::error::BindingError;
use crate::api::client::{list_all_applications, BackupApi};
use crate::api::error::{ApiError, Code};
use crate::api::operation::{wait_operation, Operation, DEFAULT_POLL_INTERVAL};
use crate::api::types::PolicyApplication;
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;

/// Wait before the first retry of an apply call
pub const FIRST_RETRY_BACKOFF: Duration = Duration::from_secs(100);

/// Wait before every later retry
pub const RETRY_BACKOFF: Duration = Duration::from_secs(20);

pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Tuning for binding creation and removal
#[derive(Debug, Clone)]
pub struct BindingOptions {
    /// Total number of apply attempts
    pub max_retries: u32,
    pub first_backoff: Duration,
    pub backoff: Duration,
    pub poll_interval: Duration,
    /// Give up waiting once this instant passes, even mid-backoff
    pub deadline: Option<Instant>,
}

impl Default for BindingOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            first_backoff: FIRST_RETRY_BACKOFF,
            backoff: RETRY_BACKOFF,
            poll_interval: DEFAULT_POLL_INTERVAL,
            deadline: None,
        }
    }
}

/// Binding as exposed to callers
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BindingState {
    pub id: String,
    pub policy_id: String,
    pub instance_id: String,
    pub enabled: bool,
    pub processing: bool,
    /// RFC 3339
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

impl From<PolicyApplication> for BindingState {
    fn from(app: PolicyApplication) -> Self {
        Self {
            id: make_binding_id(&app.policy_id, &app.compute_instance_id),
            created_at: app.created_at.map(|t| t.to_rfc3339()),
            policy_id: app.policy_id,
            instance_id: app.compute_instance_id,
            enabled: app.enabled,
            processing: app.is_processing,
        }
    }
}

// =============================================================================
// Identity
// =============================================================================

pub fn make_binding_id(policy_id: &str, instance_id: &str) -> String {
    format!("{}:{}", policy_id, instance_id)
}

/// Split a binding id into `(policy_id, instance_id)`
pub fn parse_binding_id(id: &str) -> Result<(String, String), BindingError> {
    let parts: Vec<&str> = id.split(':').collect();
    match parts.as_slice() {
        [policy_id, instance_id] if !policy_id.is_empty() && !instance_id.is_empty() => {
            Ok((policy_id.to_string(), instance_id.to_string()))
        }
        _ => Err(BindingError::InvalidId { id: id.to_string() }),
    }
}

// =============================================================================
// Create
// =============================================================================

/// Fail unless the folder has at least one activated backup provider
pub async fn check_provider_activated<A>(api: &A, folder_id: &str) -> Result<(), BindingError>
where
    A: BackupApi + ?Sized,
{
    let providers = api.list_activated_providers(folder_id).await?;
    if providers.names.is_empty() {
        return Err(BindingError::NoActivatedProvider {
            folder_id: folder_id.to_string(),
        });
    }
    tracing::debug!("activated providers in {}: {:?}", folder_id, providers.names);
    Ok(())
}

/// Sleep for `duration`, or fail if `deadline` passes first
async fn backoff(duration: Duration, deadline: Option<Instant>) -> Result<(), BindingError> {
    let Some(deadline) = deadline else {
        tokio::time::sleep(duration).await;
        return Ok(());
    };

    tokio::select! {
        _ = tokio::time::sleep(duration) => Ok(()),
        _ = tokio::time::sleep_until(deadline) => Err(BindingError::DeadlineExceeded),
    }
}

/// Issue the apply call, retrying while the backend reports the policy or
/// instance as missing or the returned operation has already failed.
///
/// Returns the apply operation without waiting for it; applying a policy can
/// take a long time.
pub async fn create_binding_with_retry<A>(
    api: &A,
    policy_id: &str,
    instance_id: &str,
    options: &BindingOptions,
) -> Result<Operation, BindingError>
where
    A: BackupApi + ?Sized,
{
    let attempts = options.max_retries.max(1);
    let mut last_reason = String::new();

    for attempt in 1..=attempts {
        if options.deadline.is_some_and(|d| Instant::now() >= d) {
            return Err(BindingError::DeadlineExceeded);
        }

        match api.apply_policy(policy_id, instance_id).await {
            Ok(operation) if !operation.failed() => {
                tracing::info!(
                    "applying policy {} to instance {} (operation {}, attempt {})",
                    policy_id,
                    instance_id,
                    operation.id,
                    attempt
                );
                return Ok(operation);
            }
            Ok(operation) => {
                last_reason = operation
                    .error
                    .map(|status| status.message)
                    .unwrap_or_else(|| "operation failed".to_string());
            }
            Err(e) if e.is_not_found() => last_reason = e.to_string(),
            Err(e) => return Err(e.into()),
        }

        if attempt == attempts {
            break;
        }

        let wait = if attempt == 1 {
            options.first_backoff
        } else {
            options.backoff
        };
        tracing::warn!(
            "apply policy {} to instance {} attempt {}/{} failed: {}; retrying in {:?}",
            policy_id,
            instance_id,
            attempt,
            attempts,
            last_reason,
            wait
        );
        backoff(wait, options.deadline).await?;
    }

    Err(BindingError::RetriesExhausted {
        policy_id: policy_id.to_string(),
        instance_id: instance_id.to_string(),
        attempts,
        reason: last_reason,
    })
}

/// Bind a policy to an instance after checking the policy's folder has an
/// activated provider. Returns the binding id.
pub async fn create_binding<A>(
    api: &A,
    policy_id: &str,
    instance_id: &str,
    options: &BindingOptions,
) -> Result<String, BindingError>
where
    A: BackupApi + ?Sized,
{
    let policy = api.get_policy(policy_id).await?;
    check_provider_activated(api, &policy.folder_id).await?;
    create_binding_with_retry(api, policy_id, instance_id, options).await?;
    Ok(make_binding_id(policy_id, instance_id))
}

// =============================================================================
// Read
// =============================================================================

/// Find the application of `policy_id` to `instance_id`.
///
/// [`BindingError::NotFound`] means the binding no longer exists.
pub async fn get_policy_application<A>(
    api: &A,
    policy_id: &str,
    instance_id: &str,
) -> Result<PolicyApplication, BindingError>
where
    A: BackupApi + ?Sized,
{
    let applications = match list_all_applications(api, policy_id, true).await {
        Ok(applications) => applications,
        Err(e) if e.is_not_found() => return Err(BindingError::NotFound),
        Err(e) => return Err(e.into()),
    };

    applications
        .into_iter()
        .find(|app| app.compute_instance_id == instance_id)
        .ok_or(BindingError::NotFound)
}

/// Read a binding by id; `None` when it is gone
pub async fn read_binding<A>(api: &A, id: &str) -> Result<Option<BindingState>, BindingError>
where
    A: BackupApi + ?Sized,
{
    let (policy_id, instance_id) = parse_binding_id(id)?;

    match get_policy_application(api, &policy_id, &instance_id).await {
        Ok(app) => Ok(Some(app.into())),
        Err(BindingError::NotFound) => {
            tracing::warn!("backup policy binding {} not found, treating as removed", id);
            Ok(None)
        }
        Err(e) => Err(e),
    }
}

// =============================================================================
// Delete
// =============================================================================

/// Revoke the policy from the instance and wait for it. A binding that is
/// already gone counts as removed.
pub async fn delete_binding<A>(api: &A, id: &str, poll_interval: Duration) -> Result<(), BindingError>
where
    A: BackupApi + ?Sized,
{
    let (policy_id, instance_id) = parse_binding_id(id)?;

    let operation = match api.revoke_policy(&policy_id, &instance_id).await {
        Ok(operation) => operation,
        Err(ApiError::Status {
            code: Code::NotFound,
            ..
        }) => {
            tracing::warn!("backup policy binding {} already removed", id);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    wait_operation(api, operation, poll_interval).await?;
    tracing::info!("revoked policy {} from instance {}", policy_id, instance_id);
    Ok(())
}
