//! Backup policy lifecycle
//!
//! Create, read, update and delete a policy from its declarative
//! configuration, plus lookup by name. Reads always rebuild the
//! configuration from the server's copy via the flattener.

use super::error::PolicyError;
use super::expand::expand_policy_settings;
use super::flatten::{backup_sets_equal, flatten_policy_settings};
use super::schema::PolicyConfig;
use crate::api::client::{list_all_policies, BackupApi};
use crate::api::operation::{wait_operation, Operation};
use crate::api::types::{CreatePolicyRequest, Policy, PolicySettings, UpdatePolicyRequest};
use serde::Serialize;
use std::time::Duration;

/// A policy as read back from the server
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PolicyState {
    pub id: String,
    pub folder_id: String,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    pub config: PolicyConfig,
}

impl TryFrom<Policy> for PolicyState {
    type Error = PolicyError;

    fn try_from(policy: Policy) -> Result<Self, Self::Error> {
        let settings = policy.settings.unwrap_or_default();
        let mut config = flatten_policy_settings(&settings)?;
        config.name = policy.name;
        config.folder_id = Some(policy.folder_id.clone());

        Ok(Self {
            id: policy.id,
            folder_id: policy.folder_id,
            enabled: policy.enabled,
            created_at: policy.created_at.map(|t| t.to_rfc3339()),
            updated_at: policy.updated_at.map(|t| t.to_rfc3339()),
            config,
        })
    }
}

/// How to find a policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyLookup {
    Id(String),
    /// Name within a folder
    Name { folder_id: String, name: String },
}

/// Whether the server's settings differ from what `config` would produce.
///
/// Both sides go through the flattener so defaults and unit spellings
/// compare equal; backup sets are compared as unordered sets.
pub fn settings_drift(config: &PolicyConfig, server: &PolicySettings) -> Result<bool, PolicyError> {
    let mut desired = flatten_policy_settings(&expand_policy_settings(config)?)?;
    let mut actual = flatten_policy_settings(server)?;

    if !backup_sets_equal(&desired.scheduling.backup_sets, &actual.scheduling.backup_sets) {
        return Ok(true);
    }

    desired.scheduling.backup_sets.clear();
    actual.scheduling.backup_sets.clear();
    Ok(desired != actual)
}

fn policy_id_of(operation: &Operation) -> Result<String, PolicyError> {
    operation
        .metadata_str("policyId")
        .or_else(|| operation.response.as_ref()?.get("id")?.as_str())
        .map(str::to_string)
        .ok_or_else(|| PolicyError::MissingPolicyId(operation.id.clone()))
}

/// Validate, expand and create a policy, then read it back
pub async fn create_policy<A>(
    api: &A,
    default_folder_id: Option<&str>,
    config: &PolicyConfig,
    poll_interval: Duration,
) -> Result<PolicyState, PolicyError>
where
    A: BackupApi + ?Sized,
{
    config.validate()?;
    let folder_id = config
        .folder_id
        .as_deref()
        .or(default_folder_id)
        .filter(|f| !f.is_empty())
        .ok_or(PolicyError::MissingFolder("create a policy"))?;

    let request = CreatePolicyRequest {
        folder_id: folder_id.to_string(),
        name: config.name.clone(),
        settings: expand_policy_settings(config)?,
    };

    let operation = api.create_policy(request).await?;
    let operation = wait_operation(api, operation, poll_interval).await?;
    let policy_id = policy_id_of(&operation)?;
    tracing::info!("created backup policy {} ({})", config.name, policy_id);

    read_policy(api, &policy_id)
        .await?
        .ok_or(PolicyError::NotFound(policy_id))
}

/// Read a policy; `None` when it does not exist
pub async fn read_policy<A>(api: &A, policy_id: &str) -> Result<Option<PolicyState>, PolicyError>
where
    A: BackupApi + ?Sized,
{
    match api.get_policy(policy_id).await {
        Ok(policy) => Ok(Some(policy.try_into()?)),
        Err(e) if e.is_not_found() => {
            tracing::warn!("backup policy {} not found", policy_id);
            Ok(None)
        }
        Err(e) => Err(e.into()),
    }
}

/// Push `config` to an existing policy. Nothing is sent when the server
/// already matches.
pub async fn update_policy<A>(
    api: &A,
    policy_id: &str,
    config: &PolicyConfig,
    poll_interval: Duration,
) -> Result<PolicyState, PolicyError>
where
    A: BackupApi + ?Sized,
{
    config.validate()?;
    let current = api.get_policy(policy_id).await?;

    let server_settings = current.settings.clone().unwrap_or_default();
    if !settings_drift(config, &server_settings)? {
        tracing::info!("backup policy {} is up to date", policy_id);
        return current.try_into();
    }

    let request = UpdatePolicyRequest {
        policy_id: policy_id.to_string(),
        settings: expand_policy_settings(config)?,
    };
    let operation = api.update_policy(request).await?;
    wait_operation(api, operation, poll_interval).await?;
    tracing::info!("updated backup policy {}", policy_id);

    read_policy(api, policy_id)
        .await?
        .ok_or_else(|| PolicyError::NotFound(policy_id.to_string()))
}

/// Delete a policy. One that is already gone counts as deleted.
pub async fn delete_policy<A>(api: &A, policy_id: &str, poll_interval: Duration) -> Result<(), PolicyError>
where
    A: BackupApi + ?Sized,
{
    let operation = match api.delete_policy(policy_id).await {
        Ok(operation) => operation,
        Err(e) if e.is_not_found() => {
            tracing::warn!("backup policy {} already deleted", policy_id);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    wait_operation(api, operation, poll_interval).await?;
    tracing::info!("deleted backup policy {}", policy_id);
    Ok(())
}

/// Look a policy up by id, or by name within a folder
pub async fn find_policy<A>(api: &A, lookup: &PolicyLookup) -> Result<PolicyState, PolicyError>
where
    A: BackupApi + ?Sized,
{
    match lookup {
        PolicyLookup::Id(id) => read_policy(api, id)
            .await?
            .ok_or_else(|| PolicyError::NotFound(id.clone())),
        PolicyLookup::Name { folder_id, name } => {
            let mut matches: Vec<Policy> = list_all_policies(api, folder_id)
                .await?
                .into_iter()
                .filter(|p| &p.name == name)
                .collect();

            match matches.len() {
                0 => Err(PolicyError::NotFound(name.clone())),
                1 => matches.remove(0).try_into(),
                _ => Err(PolicyError::MultipleMatches {
                    name: name.clone(),
                    folder_id: folder_id.clone(),
                }),
            }
        }
    }
}
