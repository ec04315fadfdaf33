use std::sync::Arc;
use std::time::Duration;

use adapters::{HttpRemoteContentService, SharedCredentials};
use charter_core::{
    BearerToken, ContentSnapshot, ContentType, Creator, RemoteContentService, RemoteId, UserId,
    Visibility
};
use config::{EngineConfig, RemoteConfig};
use errors::{FailureClass, RemoteError};
use serde_json::json;
use storage::MemoryStore;
use sync::{NewContent, SyncEngine};
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn service_with_timeout(server: &MockServer, timeout: Duration) -> HttpRemoteContentService {
    HttpRemoteContentService::new(
        &RemoteConfig {
            base_url: format!("{}/api/", server.uri()),
            user_agent: "charter-sync-test".to_string()
        },
        timeout
    )
    .unwrap()
}

fn service(server: &MockServer) -> HttpRemoteContentService {
    service_with_timeout(server, Duration::from_secs(30))
}

fn creator() -> Creator {
    Creator::new(UserId::new("u1").unwrap(), "Ana")
}

fn snapshot() -> ContentSnapshot {
    ContentSnapshot {
        content_id: charter_core::ContentId::new(),
        title: "Night watch".to_string(),
        content_type: ContentType::Checklist,
        body: json!({"items": ["nav lights"]}),
        visibility: Visibility::Public,
        creator: creator(),
        forked_from: None,
        original_creator: None,
        updated_at: chrono::Utc::now()
    }
}

#[tokio::test]
async fn test_create_posts_snapshot_with_bearer_token() {
    // GIVEN a remote that accepts the create
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/content"))
        .and(header("Authorization", "Bearer tok-1"))
        .and(header("User-Agent", "charter-sync-test"))
        .and(body_partial_json(json!({"title": "Night watch", "visibility": "public"})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"remoteId": "r-77"})))
        .expect(1)
        .mount(&server)
        .await;

    // WHEN the snapshot is published
    let remote_id = service(&server)
        .create(&BearerToken::new("tok-1"), &snapshot())
        .await
        .unwrap();

    // THEN the assigned remote id comes back
    assert_eq!(remote_id, RemoteId::new("r-77"));
}

#[tokio::test]
async fn test_error_statuses_map_to_failure_classes() {
    let server = MockServer::start().await;
    let token = BearerToken::new("tok-1");
    let remote = service(&server);

    let cases = [
        ("r-500", 500, FailureClass::Transient),
        ("r-429", 429, FailureClass::Transient),
        ("r-401", 401, FailureClass::Auth),
        ("r-422", 422, FailureClass::Permanent),
        ("r-403", 403, FailureClass::Permanent)
    ];
    for (id, status, _) in &cases {
        Mock::given(method("PUT"))
            .and(path(format!("/api/content/{id}")))
            .respond_with(ResponseTemplate::new(*status))
            .mount(&server)
            .await;
    }

    for (id, status, expected) in cases {
        let error = remote
            .update(&token, &RemoteId::new(id), &snapshot())
            .await
            .unwrap_err();
        assert_eq!(error.class(), expected, "status {status}");
    }
}

#[tokio::test]
async fn test_delete_of_missing_record_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/api/content/r-1"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let error = service(&server)
        .delete(&BearerToken::new("tok-1"), &RemoteId::new("r-1"))
        .await
        .unwrap_err();

    assert!(error.is_not_found());
}

#[tokio::test]
async fn test_unreachable_server_is_transient() {
    let remote = HttpRemoteContentService::new(
        &RemoteConfig {
            base_url: "http://127.0.0.1:9".to_string(),
            user_agent: "charter-sync-test".to_string()
        },
        Duration::from_secs(5)
    )
    .unwrap();

    let error = remote
        .increment_fork_count(&BearerToken::new("tok-1"), &RemoteId::new("r-1"))
        .await
        .unwrap_err();

    assert!(matches!(error, RemoteError::Network { .. } | RemoteError::Timeout { .. }));
    assert_eq!(error.class(), FailureClass::Transient);
}

#[tokio::test]
async fn test_slow_response_reports_configured_timeout() {
    // GIVEN a server that answers after the client's deadline
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/content"))
        .respond_with(
            ResponseTemplate::new(201)
                .set_body_json(json!({"remoteId": "r-9"}))
                .set_delay(Duration::from_secs(2))
        )
        .mount(&server)
        .await;

    // WHEN a create is sent with a 200ms timeout
    let error = service_with_timeout(&server, Duration::from_millis(200))
        .create(&BearerToken::new("tok-1"), &snapshot())
        .await
        .unwrap_err();

    // THEN the timeout error carries the configured bound and is retryable
    assert!(matches!(error, RemoteError::Timeout { timeout_ms: 200 }));
    assert_eq!(error.class(), FailureClass::Transient);
}

#[tokio::test]
async fn test_fetch_decodes_remote_snapshot() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/content/r-5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "remoteId": "r-5",
            "title": "Reef guide",
            "contentType": "guide",
            "body": {},
            "visibility": "public",
            "creator": {"id": "u2", "name": "Ben"},
            "forkedFrom": null,
            "originalCreator": {"id": "u1", "name": "Ana"},
            "forkCount": 3,
            "updatedAt": "2026-03-01T10:00:00Z"
        })))
        .mount(&server)
        .await;

    let snapshot = service(&server)
        .fetch(None, &RemoteId::new("r-5"))
        .await
        .unwrap();

    assert_eq!(snapshot.fork_count, 3);
    assert_eq!(snapshot.attribution_root().id.as_str(), "u1");
}

#[tokio::test]
async fn test_engine_publishes_through_http() {
    // GIVEN an engine wired to the HTTP adapter with a signed-in user
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/content"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"remoteId": "r-1"})))
        .expect(1)
        .mount(&server)
        .await;
    let engine = SyncEngine::new(
        Arc::new(MemoryStore::new()),
        Arc::new(service(&server)),
        Arc::new(SharedCredentials::with_token(BearerToken::new("tok-1"))),
        &EngineConfig::default()
    )
    .await
    .unwrap();

    // WHEN public content is created and the queue drains
    let content = engine
        .create_content(NewContent {
            visibility: Visibility::Public,
            ..NewContent::private("Night watch", ContentType::Checklist, json!({}), creator())
        })
        .await
        .unwrap();
    let report = engine.drain().await.unwrap();

    // THEN the content carries the remote id
    assert_eq!(report.succeeded, 1);
    let stored = engine.content(content.id).await.unwrap().unwrap();
    assert_eq!(stored.remote.remote_id(), Some(&RemoteId::new("r-1")));
}
