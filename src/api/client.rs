//! Cloud Backup client
//!
//! [`BackupApi`] is the seam between the backup subsystem and the control
//! plane. [`BackupClient`] implements it over the REST gateway.

use super::auth::Credentials;
use super::error::{ApiResult, Code};
use super::http::HttpClient;
use super::operation::Operation;
use super::types::{
    ComputeInstanceRequest, CreatePolicyRequest, ListActivatedProvidersResponse,
    ListApplicationsResponse, ListPoliciesResponse, Policy, PolicyApplication, UpdatePolicyRequest,
};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use url::Url;

/// Default Cloud Backup API endpoint
pub const DEFAULT_ENDPOINT: &str = "https://backup.api.cloud.yandex.net";

/// Default Operation API endpoint
pub const DEFAULT_OPERATION_ENDPOINT: &str = "https://operation.api.cloud.yandex.net";

/// Remote calls the backup subsystem depends on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait BackupApi: Send + Sync {
    /// Names of backup providers activated in a folder
    async fn list_activated_providers(&self, folder_id: &str) -> ApiResult<ListActivatedProvidersResponse>;

    /// One page of policies in a folder
    async fn list_policies(&self, folder_id: &str, page_token: Option<String>) -> ApiResult<ListPoliciesResponse>;

    async fn get_policy(&self, policy_id: &str) -> ApiResult<Policy>;

    async fn create_policy(&self, request: CreatePolicyRequest) -> ApiResult<Operation>;

    async fn update_policy(&self, request: UpdatePolicyRequest) -> ApiResult<Operation>;

    async fn delete_policy(&self, policy_id: &str) -> ApiResult<Operation>;

    /// Bind a policy to a compute instance
    async fn apply_policy(&self, policy_id: &str, instance_id: &str) -> ApiResult<Operation>;

    /// Unbind a policy from a compute instance
    async fn revoke_policy(&self, policy_id: &str, instance_id: &str) -> ApiResult<Operation>;

    /// One page of applications of a policy
    async fn list_applications(
        &self,
        policy_id: &str,
        show_processing: bool,
        page_token: Option<String>,
    ) -> ApiResult<ListApplicationsResponse>;

    async fn get_operation(&self, operation_id: &str) -> ApiResult<Operation>;
}

/// Fetch all policies in a folder (auto-paginate)
pub async fn list_all_policies<A>(api: &A, folder_id: &str) -> ApiResult<Vec<Policy>>
where
    A: BackupApi + ?Sized,
{
    let mut all_items = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let page = api.list_policies(folder_id, page_token.take()).await?;
        all_items.extend(page.policies);

        match page.next_page_token {
            Some(token) if !token.is_empty() => page_token = Some(token),
            _ => break,
        }
    }

    Ok(all_items)
}

/// Fetch all applications of a policy (auto-paginate)
pub async fn list_all_applications<A>(
    api: &A,
    policy_id: &str,
    show_processing: bool,
) -> ApiResult<Vec<PolicyApplication>>
where
    A: BackupApi + ?Sized,
{
    let mut all_items = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let page = api
            .list_applications(policy_id, show_processing, page_token.take())
            .await?;
        all_items.extend(page.policy_applications);

        match page.next_page_token {
            Some(token) if !token.is_empty() => page_token = Some(token),
            _ => break,
        }
    }

    Ok(all_items)
}

/// REST client for the Cloud Backup API
#[derive(Clone)]
pub struct BackupClient {
    pub credentials: Credentials,
    pub http: HttpClient,
    pub endpoint: String,
    pub operation_endpoint: String,
}

impl BackupClient {
    pub fn new(credentials: Credentials, http: HttpClient, endpoint: &str, operation_endpoint: &str) -> Self {
        Self {
            credentials,
            http,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            operation_endpoint: operation_endpoint.trim_end_matches('/').to_string(),
        }
    }

    // =========================================================================
    // URL helpers
    // =========================================================================

    /// Build Cloud Backup API URL
    pub fn backup_url(&self, path: &str) -> String {
        format!("{}/backup/v1/{}", self.endpoint, path)
    }

    /// Build policy URL, optionally with a custom method suffix (`:apply`)
    pub fn policy_url(&self, policy_id: &str, suffix: &str) -> String {
        self.backup_url(&format!("policies/{}{}", urlencoding::encode(policy_id), suffix))
    }

    /// Build Operation API URL
    pub fn operation_url(&self, operation_id: &str) -> String {
        format!(
            "{}/operations/{}",
            self.operation_endpoint,
            urlencoding::encode(operation_id)
        )
    }

    fn with_query(url: &str, params: &[(&str, Option<&str>)]) -> ApiResult<String> {
        let mut url = Url::parse(url)?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in params {
                if let Some(value) = value {
                    pairs.append_pair(key, value);
                }
            }
        }
        let url = url.to_string();
        Ok(url.strip_suffix('?').map(str::to_string).unwrap_or(url))
    }

    /// GET with the current token, retrying once with a fresh one if rejected
    async fn authorized_get<T: DeserializeOwned>(&self, url: &str) -> ApiResult<T> {
        let token = self.credentials.get_token().await?;
        match self.http.get(url, &token).await {
            Err(e) if e.code() == Some(Code::Unauthenticated) => {
                tracing::debug!("token rejected for GET {}, refreshing", url);
                let token = self.credentials.refresh_token().await?;
                self.http.get(url, &token).await
            }
            other => other,
        }
    }
}

#[async_trait]
impl BackupApi for BackupClient {
    async fn list_activated_providers(&self, folder_id: &str) -> ApiResult<ListActivatedProvidersResponse> {
        let url = Self::with_query(
            &self.backup_url("providers:activated"),
            &[("folderId", Some(folder_id))],
        )?;
        self.authorized_get(&url).await
    }

    async fn list_policies(&self, folder_id: &str, page_token: Option<String>) -> ApiResult<ListPoliciesResponse> {
        let url = Self::with_query(
            &self.backup_url("policies"),
            &[("folderId", Some(folder_id)), ("pageToken", page_token.as_deref())],
        )?;
        self.authorized_get(&url).await
    }

    async fn get_policy(&self, policy_id: &str) -> ApiResult<Policy> {
        self.authorized_get(&self.policy_url(policy_id, "")).await
    }

    async fn create_policy(&self, request: CreatePolicyRequest) -> ApiResult<Operation> {
        let token = self.credentials.get_token().await?;
        self.http.post(&self.backup_url("policies"), &token, &request).await
    }

    async fn update_policy(&self, request: UpdatePolicyRequest) -> ApiResult<Operation> {
        let token = self.credentials.get_token().await?;
        let url = self.policy_url(&request.policy_id, "");
        self.http.patch(&url, &token, &request).await
    }

    async fn delete_policy(&self, policy_id: &str) -> ApiResult<Operation> {
        let token = self.credentials.get_token().await?;
        self.http.delete(&self.policy_url(policy_id, ""), &token).await
    }

    async fn apply_policy(&self, policy_id: &str, instance_id: &str) -> ApiResult<Operation> {
        let token = self.credentials.get_token().await?;
        let body = ComputeInstanceRequest {
            compute_instance_id: instance_id.to_string(),
        };
        self.http
            .post(&self.policy_url(policy_id, ":apply"), &token, &body)
            .await
    }

    async fn revoke_policy(&self, policy_id: &str, instance_id: &str) -> ApiResult<Operation> {
        let token = self.credentials.get_token().await?;
        let body = ComputeInstanceRequest {
            compute_instance_id: instance_id.to_string(),
        };
        self.http
            .post(&self.policy_url(policy_id, ":revoke"), &token, &body)
            .await
    }

    async fn list_applications(
        &self,
        policy_id: &str,
        show_processing: bool,
        page_token: Option<String>,
    ) -> ApiResult<ListApplicationsResponse> {
        let show_processing = show_processing.then_some("true");
        let url = Self::with_query(
            &self.policy_url(policy_id, "/applications"),
            &[("showProcessing", show_processing), ("pageToken", page_token.as_deref())],
        )?;
        self.authorized_get(&url).await
    }

    async fn get_operation(&self, operation_id: &str) -> ApiResult<Operation> {
        self.authorized_get(&self.operation_url(operation_id)).await
    }
}
