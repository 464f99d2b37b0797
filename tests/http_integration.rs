//! Integration tests for the Cloud Backup REST client using wiremock
//!
//! These tests verify the client against mocked endpoints: URL and query
//! construction, proto3 JSON decoding, gRPC status mapping, token handling
//! and the binding/operation flows built on top of it.

use serde_json::json;
use std::time::Duration;
use wiremock::matchers::{bearer_token, body_json, header_exists, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};
use ycbackup::api::auth::{Credentials, TokenSource};
use ycbackup::api::client::{list_all_applications, BackupApi, BackupClient};
use ycbackup::api::error::{ApiError, Code};
use ycbackup::api::http::HttpClient;
use ycbackup::api::operation::wait_operation;
use ycbackup::api::types::{IntervalUnit, Scheme};

fn client_with(server: &MockServer, source: TokenSource) -> BackupClient {
    let http = HttpClient::new(Duration::from_secs(5)).expect("HTTP client should build");
    let credentials = Credentials::new(source, http.clone());
    BackupClient::new(credentials, http, &server.uri(), &server.uri())
}

fn client(server: &MockServer) -> BackupClient {
    client_with(server, TokenSource::Iam("t1.test".into()))
}

/// Test module for plain request/response handling
mod http_client_tests {
    use super::*;

    /// Test policy listing sends folder and token, and decodes int64 strings
    #[tokio::test]
    async fn test_list_policies_decodes_settings() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/backup/v1/policies"))
            .and(query_param("folderId", "b1gfolder"))
            .and(bearer_token("t1.test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "policies": [{
                    "id": "cdgpolicy",
                    "name": "nightly",
                    "folderId": "b1gfolder",
                    "enabled": true,
                    "createdAt": "2024-03-01T10:00:00Z",
                    "settings": {
                        "compression": "NORMAL",
                        "splitting": {"size": "1073741824"},
                        "scheduling": {
                            "enabled": true,
                            "maxParallelBackups": "2",
                            "randomMaxDelay": {"type": "MINUTES", "count": "30"},
                            "scheme": "ALWAYS_INCREMENTAL",
                            "weeklyBackupDay": "MONDAY",
                            "backupSets": [{
                                "sinceLastExecTime": {"delay": {"type": "HOURS", "count": "6"}},
                                "type": "TYPE_AUTO"
                            }]
                        }
                    }
                }]
            })))
            .mount(&server)
            .await;

        let page = client(&server)
            .list_policies("b1gfolder", None)
            .await
            .expect("Request should succeed");

        assert_eq!(page.policies.len(), 1);
        let settings = page.policies[0].settings.as_ref().expect("settings present");
        assert_eq!(settings.splitting.map(|s| s.size), Some(1_073_741_824));

        let scheduling = settings.scheduling.as_ref().expect("scheduling present");
        assert_eq!(scheduling.max_parallel_backups, 2);
        assert_eq!(scheduling.scheme, Scheme::AlwaysIncremental);
        assert_eq!(
            scheduling.random_max_delay.map(|d| d.unit),
            Some(IntervalUnit::Minutes)
        );
    }

    /// Test a gRPC status body is mapped to its code
    #[tokio::test]
    async fn test_status_body_maps_to_code() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/backup/v1/policies/missing"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "code": 5,
                "message": "Policy missing not found"
            })))
            .mount(&server)
            .await;

        let err = client(&server).get_policy("missing").await.unwrap_err();
        assert!(err.is_not_found());
        assert!(err.to_string().contains("Policy missing not found"));
    }

    /// Test errors without a status body fall back to the HTTP status
    #[tokio::test]
    async fn test_plain_error_falls_back_to_http_status() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/backup/v1/policies/p1"))
            .respond_with(ResponseTemplate::new(503).set_body_string("upstream unavailable"))
            .mount(&server)
            .await;

        let err = client(&server).get_policy("p1").await.unwrap_err();
        assert_eq!(err.code(), Some(Code::Unavailable));
    }

    /// Test malformed JSON surfaces as a decode error
    #[tokio::test]
    async fn test_malformed_json_is_decode_error() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/backup/v1/policies/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_string("{not json"))
            .mount(&server)
            .await;

        let err = client(&server).get_policy("p1").await.unwrap_err();
        assert!(matches!(err, ApiError::Decode(_)));
    }

    /// Test apply posts the instance id with an idempotency key
    #[tokio::test]
    async fn test_apply_policy_request() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/backup/v1/policies/p1:apply"))
            .and(header_exists("Idempotency-Key"))
            .and(body_json(json!({"computeInstanceId": "i1"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "op-apply",
                "done": false
            })))
            .expect(1)
            .mount(&server)
            .await;

        let op = client(&server).apply_policy("p1", "i1").await.unwrap();
        assert_eq!(op.id, "op-apply");
        assert!(!op.done);
    }

    /// Test applications listing follows page tokens
    #[tokio::test]
    async fn test_list_all_applications_paginates() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/backup/v1/policies/p1/applications"))
            .and(query_param("pageToken", "next"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "policyApplications": [{"policyId": "p1", "computeInstanceId": "i2"}]
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/backup/v1/policies/p1/applications"))
            .and(query_param("showProcessing", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "policyApplications": [{"policyId": "p1", "computeInstanceId": "i1", "isProcessing": true}],
                "nextPageToken": "next"
            })))
            .mount(&server)
            .await;

        let apps = list_all_applications(&client(&server), "p1", true)
            .await
            .unwrap();
        let ids: Vec<_> = apps.iter().map(|a| a.compute_instance_id.as_str()).collect();
        assert_eq!(ids, vec!["i1", "i2"]);
        assert!(apps[0].is_processing);
    }
}

/// Test module for token handling
mod auth_tests {
    use super::*;

    /// Test an OAuth token is exchanged once and the IAM token reused
    #[tokio::test]
    async fn test_oauth_exchange_is_cached() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/iam/v1/tokens"))
            .and(body_json(json!({"yandexPassportOauthToken": "y0_oauth"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "iamToken": "t1.exchanged",
                "expiresAt": "2099-01-01T00:00:00Z"
            })))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/backup/v1/policies/p1"))
            .and(bearer_token("t1.exchanged"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "p1"})))
            .expect(2)
            .mount(&server)
            .await;

        let client = client_with(
            &server,
            TokenSource::OAuth {
                token: "y0_oauth".into(),
                endpoint: server.uri(),
            },
        );

        client.get_policy("p1").await.unwrap();
        client.get_policy("p1").await.unwrap();
    }

    /// Test a rejected token is refreshed and the read retried once
    #[tokio::test]
    async fn test_unauthenticated_read_is_retried() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/backup/v1/policies/p1"))
            .respond_with(ResponseTemplate::new(401).set_body_json(json!({
                "code": 16,
                "message": "token expired"
            })))
            .up_to_n_times(1)
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/backup/v1/policies/p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "p1"})))
            .mount(&server)
            .await;

        let policy = client(&server).get_policy("p1").await.unwrap();
        assert_eq!(policy.id, "p1");
    }
}

/// Test module for operation and binding flows
mod flow_tests {
    use super::*;
    use ycbackup::backup::bindings::{delete_binding, read_binding};
    use ycbackup::backup::BindingError;

    /// Test waiting polls the operation endpoint until done
    #[tokio::test]
    async fn test_wait_operation_against_server() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/operations/op1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": "op1",
                "done": true,
                "response": {"id": "p1"}
            })))
            .mount(&server)
            .await;

        let client = client(&server);
        let pending = client.get_operation("op1").await.unwrap();
        let pending = ycbackup::api::operation::Operation {
            done: false,
            ..pending
        };

        let op = wait_operation(&client, pending, Duration::from_millis(10))
            .await
            .unwrap();
        assert!(op.done);
    }

    /// Test revoke of an already removed binding succeeds
    #[tokio::test]
    async fn test_unbind_missing_binding() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/backup/v1/policies/p1:revoke"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "code": 5,
                "message": "application not found"
            })))
            .mount(&server)
            .await;

        delete_binding(&client(&server), "p1:i1", Duration::from_millis(10))
            .await
            .unwrap();
    }

    /// Test reading a binding that is not in the application list
    #[tokio::test]
    async fn test_read_missing_binding_is_none() {
        let server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/backup/v1/policies/p1/applications"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "policyApplications": [{"policyId": "p1", "computeInstanceId": "other"}]
            })))
            .mount(&server)
            .await;

        let state = read_binding(&client(&server), "p1:i1").await.unwrap();
        assert!(state.is_none());
    }

    /// Test a malformed binding id is rejected before any request
    #[tokio::test]
    async fn test_malformed_binding_id() {
        let server = MockServer::start().await;

        let err = read_binding(&client(&server), "p1:i1:extra").await.unwrap_err();
        assert!(matches!(err, BindingError::InvalidId { .. }));
        assert!(server.received_requests().await.unwrap_or_default().is_empty());
    }
}
