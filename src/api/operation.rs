//! Long-running operations
//!
//! Mutating calls return an [`Operation`] handle immediately. Callers that
//! need the outcome poll it with [`wait_operation`].

use super::client::BackupApi;
use super::error::{ApiError, ApiResult, Status};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;

/// Default interval between operation polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub id: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Status>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<Value>,
}

/// Observed state of an operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    Running,
    Done,
    Failed(String),
}

impl Operation {
    /// Finished with an error
    pub fn failed(&self) -> bool {
        self.done && self.error.is_some()
    }

    pub fn status(&self) -> OperationStatus {
        match (&self.error, self.done) {
            (_, false) => OperationStatus::Running,
            (Some(status), true) => OperationStatus::Failed(status.message.clone()),
            (None, true) => OperationStatus::Done,
        }
    }

    /// Turn a failed operation into an error
    pub fn into_result(self) -> ApiResult<Self> {
        match (&self.error, self.done) {
            (Some(status), true) => Err(ApiError::OperationFailed {
                id: self.id.clone(),
                code: status.code(),
                message: status.message.clone(),
            }),
            _ => Ok(self),
        }
    }

    /// Resource id reported in the operation metadata under `key`
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.as_ref()?.get(key)?.as_str()
    }
}

/// Poll until the operation is done, failing if it finished with an error
pub async fn wait_operation<A>(api: &A, operation: Operation, poll_interval: Duration) -> ApiResult<Operation>
where
    A: BackupApi + ?Sized,
{
    let mut operation = operation;
    let mut polls: u32 = 0;

    while !operation.done {
        tokio::time::sleep(poll_interval).await;
        operation = api.get_operation(&operation.id).await?;
        polls += 1;
        tracing::debug!(
            "operation {} polled {} times, done={}",
            operation.id,
            polls,
            operation.done
        );
    }

    if let OperationStatus::Failed(ref message) = operation.status() {
        tracing::warn!("operation {} failed: {}", operation.id, message);
    }

    operation.into_result()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::MockBackupApi;
    use crate::api::error::Code;

    fn running(id: &str) -> Operation {
        Operation {
            id: id.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_status() {
        let mut op = running("op1");
        assert_eq!(op.status(), OperationStatus::Running);
        assert!(!op.failed());

        op.done = true;
        assert_eq!(op.status(), OperationStatus::Done);

        op.error = Some(Status {
            code: 9,
            message: "instance is stopped".into(),
            details: vec![],
        });
        assert!(op.failed());
        assert_eq!(
            op.status(),
            OperationStatus::Failed("instance is stopped".into())
        );

        let err = op.into_result().unwrap_err();
        assert_eq!(err.code(), Some(Code::FailedPrecondition));
    }

    #[test]
    fn test_metadata_str() {
        let op: Operation = serde_json::from_value(serde_json::json!({
            "id": "op1",
            "metadata": {"policyId": "p1"}
        }))
        .unwrap();
        assert_eq!(op.metadata_str("policyId"), Some("p1"));
        assert_eq!(op.metadata_str("missing"), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_polls_until_done() {
        let mut api = MockBackupApi::new();
        let mut calls = 0;
        api.expect_get_operation().times(2).returning(move |id| {
            calls += 1;
            Ok(Operation {
                id: id.to_string(),
                done: calls == 2,
                ..Default::default()
            })
        });

        let op = wait_operation(&api, running("op1"), DEFAULT_POLL_INTERVAL)
            .await
            .unwrap();
        assert!(op.done);
    }

    #[tokio::test]
    async fn test_wait_returns_done_operation_without_polling() {
        let api = MockBackupApi::new();
        let op = Operation {
            id: "op1".into(),
            done: true,
            ..Default::default()
        };
        assert!(wait_operation(&api, op, DEFAULT_POLL_INTERVAL).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_surfaces_failure() {
        let mut api = MockBackupApi::new();
        api.expect_get_operation().returning(|id| {
            Ok(Operation {
                id: id.to_string(),
                done: true,
                error: Some(Status {
                    code: 13,
                    message: "internal".into(),
                    details: vec![],
                }),
                ..Default::default()
            })
        });

        let err = wait_operation(&api, running("op1"), DEFAULT_POLL_INTERVAL)
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::OperationFailed { .. }));
    }
}
