//! End-to-end client tests: login, retry classes, restore.

use aria_core::{MemorySecretStore, RetryPolicy};
use aria_server_client::{
    ApiRequest, AriaServerClient, ClientConfig, ClientError, Credentials,
};
use std::sync::Arc;
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config() -> ClientConfig {
    ClientConfig {
        retry: RetryPolicy {
            max_attempts: 3,
            cap: Duration::from_millis(500),
            base_rate_limited: Duration::from_millis(100),
            base_busy: Duration::from_millis(50),
            base_default: Duration::from_millis(50),
            jitter_pct: 0,
        },
        probe_attempts: 1,
        ..ClientConfig::default()
    }
}

async fn mount_login(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/api/info"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "name": "Aria Server",
            "version": "1.0.0",
            "server_id": "s1",
            "requires_auth": true,
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/api/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "token-1",
            "refresh_token": "refresh-1",
            "expires_in": 3600,
            "user_id": "u1",
            "username": "alice",
        })))
        .mount(server)
        .await;
}

// =============================================================================
// Login
// =============================================================================

mod login {
    use super::*;

    #[tokio::test]
    async fn test_login_discovers_and_authenticates() {
        let server = MockServer::start().await;
        mount_login(&server).await;

        let client = AriaServerClient::new(test_config(), Arc::new(MemorySecretStore::new()))
            .await
            .unwrap();

        let login = client
            .login(&server.uri(), &Credentials::new("alice", "secret"))
            .await
            .unwrap();

        assert_eq!(login.username, "alice");
        assert!(client.is_authenticated().await);
        assert_eq!(client.username().await.as_deref(), Some("alice"));
    }

    #[tokio::test]
    async fn test_invalid_credentials_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/info"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "name": "Aria Server",
                "version": "1.0.0",
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/auth/login"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let client = AriaServerClient::new(test_config(), Arc::new(MemorySecretStore::new()))
            .await
            .unwrap();

        let err = client
            .login(&server.uri(), &Credentials::new("alice", "wrong"))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::AuthInvalidCredentials));
        assert!(!client.is_authenticated().await);
    }

    #[tokio::test]
    async fn test_unreachable_address_is_no_endpoint() {
        let client = AriaServerClient::new(test_config(), Arc::new(MemorySecretStore::new()))
            .await
            .unwrap();

        // Nothing listens on this port
        let err = client
            .login("http://127.0.0.1:9", &Credentials::new("alice", "secret"))
            .await
            .unwrap_err();

        assert!(matches!(err, ClientError::NoReachableEndpoint { .. }));
    }

    #[tokio::test]
    async fn test_connection_reports_server_identity() {
        let server = MockServer::start().await;
        mount_login(&server).await;

        let client = AriaServerClient::new(test_config(), Arc::new(MemorySecretStore::new()))
            .await
            .unwrap();

        let info = client.test_connection(&server.uri()).await.unwrap();
        assert_eq!(info.name, "Aria Server");
        assert_eq!(info.version, "1.0.0");
    }
}

// =============================================================================
// Retry Classes
// =============================================================================

mod retry_classes {
    use super::*;

    async fn logged_in(server: &MockServer) -> AriaServerClient {
        mount_login(server).await;
        let client = AriaServerClient::new(test_config(), Arc::new(MemorySecretStore::new()))
            .await
            .unwrap();
        client
            .login(&server.uri(), &Credentials::new("alice", "secret"))
            .await
            .unwrap();
        client
    }

    #[tokio::test]
    async fn test_transient_503_retried_to_success() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;

        // Two 503s, then the request goes through
        Mock::given(method("GET"))
            .and(path("/api/library/tracks"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/library/tracks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let response = client
            .execute(&ApiRequest::get("/api/library/tracks"))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    #[tokio::test]
    async fn test_persistent_busy_surfaces_with_attempt_count() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;

        Mock::given(method("GET"))
            .and(path("/api/library/tracks"))
            .respond_with(ResponseTemplate::new(503))
            .expect(3)
            .mount(&server)
            .await;

        let err = client
            .execute(&ApiRequest::get("/api/library/tracks"))
            .await
            .unwrap_err();

        match err {
            ClientError::ServerBusy {
                hostname,
                status,
                attempts,
            } => {
                assert_eq!(status, 503);
                assert_eq!(attempts, 3);
                assert!(!hostname.is_empty());
            }
            other => panic!("expected ServerBusy, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_404_not_retried() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;

        Mock::given(method("GET"))
            .and(path("/api/library/tracks"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such thing"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client
            .execute(&ApiRequest::get("/api/library/tracks"))
            .await
            .unwrap_err();

        match err {
            ClientError::ServerError {
                status, attempts, ..
            } => {
                assert_eq!(status, 404);
                assert_eq!(attempts, 1);
            }
            other => panic!("expected ServerError, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_success_passes_through_unchanged() {
        let server = MockServer::start().await;
        let client = logged_in(&server).await;

        Mock::given(method("POST"))
            .and(path("/api/playlists"))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(serde_json::json!({"id": "p1"})),
            )
            .mount(&server)
            .await;

        let response = client
            .execute(
                &ApiRequest::post("/api/playlists")
                    .with_json(serde_json::json!({"name": "Road Trip"})),
            )
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 201);
    }
}

// =============================================================================
// Session Restore
// =============================================================================

mod restore {
    use super::*;

    #[tokio::test]
    async fn test_restore_resumes_persisted_session() {
        let server = MockServer::start().await;
        mount_login(&server).await;
        let secrets = Arc::new(MemorySecretStore::new());

        // First run: log in, which persists the session
        {
            let client = AriaServerClient::new(test_config(), secrets.clone())
                .await
                .unwrap();
            client
                .login(&server.uri(), &Credentials::new("alice", "secret"))
                .await
                .unwrap();
        }

        // Second run: resume without credentials
        let client = AriaServerClient::new(test_config(), secrets).await.unwrap();
        assert!(client.restore().await.unwrap());
        assert!(client.is_authenticated().await);
        assert_eq!(client.username().await.as_deref(), Some("alice"));

        Mock::given(method("GET"))
            .and(path("/api/library/tracks"))
            .and(header("authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .mount(&server)
            .await;

        let response = client
            .execute(&ApiRequest::get("/api/library/tracks"))
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
    }

    #[tokio::test]
    async fn test_restore_without_stored_session() {
        let client = AriaServerClient::new(test_config(), Arc::new(MemorySecretStore::new()))
            .await
            .unwrap();
        assert!(!client.restore().await.unwrap());
        assert!(!client.is_authenticated().await);
    }
}
