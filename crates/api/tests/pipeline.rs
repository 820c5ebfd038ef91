use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::time::Duration;

use axum::Router;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode as AxumStatus, header};
use axum::routing::get;
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use reqwest::StatusCode;
use serde_json::{Value, json};
use uuid::Uuid;

use warden_api::app::{Pipeline, UsageSettings, build_app};
use warden_auth::{Claims, ClaimsPolicy, RequiredEntitlements, RsaTokenVerifier};
use warden_events::{Delivery, Event, EventEmitter, EventType, InMemoryProducer, ServiceIdentity};
use warden_infra::{EntitlementResolver, HttpEntitlementSource, InMemoryEntitlementCache};

const PRIVATE_PEM: &str = include_str!("../../../testdata/rsa_private.pem");
const PUBLIC_PEM: &str = include_str!("../../../testdata/rsa_public.pem");
const ISSUER: &str = "https://auth.example.test";
const TENANT: &str = "6f1c2b9e-4d3a-4b8e-9f10-2a3b4c5d6e7f";
const SUBJECT: &str = "user@example.com";
const PRODUCT_ID: &str = "9a7d2c41-0b6e-4f3a-8d15-7c2e9b4a1f60";

const ADMIN: &str = r#"[{"id":"g-1","name":"orders-admin","tenant_id":"6f1c2b9e-4d3a-4b8e-9f10-2a3b4c5d6e7f"}]"#;
const VIEWER: &str = r#"[{"id":"g-2","name":"orders-viewer"}]"#;

/// Entitlement service double: fixed status/body, records every call.
#[derive(Default)]
struct MockEntitlements {
    reply: Mutex<(u16, String)>,
    hits: AtomicUsize,
    last_authorization: Mutex<Option<String>>,
}

impl MockEntitlements {
    fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    fn last_authorization(&self) -> Option<String> {
        self.last_authorization.lock().unwrap().clone()
    }
}

async fn entitlements(
    State(mock): State<Arc<MockEntitlements>>,
    headers: HeaderMap,
) -> (AxumStatus, String) {
    mock.hits.fetch_add(1, Ordering::SeqCst);
    *mock.last_authorization.lock().unwrap() = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let (status, body) = mock.reply.lock().unwrap().clone();
    (AxumStatus::from_u16(status).unwrap(), body)
}

struct TestServer {
    base_url: String,
    mock: Arc<MockEntitlements>,
    events: mpsc::Receiver<Delivery>,
    handles: Vec<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    async fn spawn(status: u16, body: &str) -> Self {
        Self::spawn_with(status, body, None, 1024 * 1024).await
    }

    async fn spawn_with(
        status: u16,
        body: &str,
        entitlement_url: Option<&str>,
        audit_body_limit: usize,
    ) -> Self {
        let mock = Arc::new(MockEntitlements {
            reply: Mutex::new((status, body.to_string())),
            ..Default::default()
        });
        let mock_app = Router::new()
            .route("/entitlements", get(entitlements))
            .with_state(mock.clone());
        let (mock_url, mock_handle) = serve(mock_app).await;

        let url = entitlement_url
            .map(str::to_string)
            .unwrap_or_else(|| format!("{mock_url}/entitlements"));

        let verifier =
            RsaTokenVerifier::from_rsa_pem(PUBLIC_PEM.as_bytes(), ClaimsPolicy::new([ISSUER]))
                .expect("public key");
        let cache = InMemoryEntitlementCache::new(Duration::from_secs(60), 1024 * 1024);
        let source = HttpEntitlementSource::new(url, Duration::from_secs(2)).expect("client");
        let resolver = EntitlementResolver::new(Arc::new(cache), Arc::new(source));

        let producer = Arc::new(InMemoryProducer::new());
        let events = producer.subscribe();
        let emitter = EventEmitter::new(
            producer,
            "security-events",
            &ServiceIdentity::new("platform", "security", "orders", "v1.4.0"),
        );

        let pipeline = Pipeline::new(
            Arc::new(verifier),
            Arc::new(resolver),
            emitter,
            UsageSettings {
                product_id: Uuid::parse_str(PRODUCT_ID).unwrap(),
                memory_mb: 512,
                service_name: "orders".to_string(),
            },
        )
        .with_audit_body_limit(audit_body_limit);

        let app = build_app(
            &pipeline,
            RequiredEntitlements::new(["orders-admin", "orders-editor"]),
        );
        let (base_url, app_handle) = serve(app).await;

        Self {
            base_url,
            mock,
            events,
            handles: vec![mock_handle, app_handle],
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Every event delivered so far.
    fn drain(&self) -> Vec<Event> {
        self.events.try_iter().map(|d| d.event).collect()
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

async fn serve(app: Router) -> (String, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("failed to bind ephemeral port");
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (format!("http://{addr}"), handle)
}

fn claims() -> Claims {
    let now = Utc::now();
    Claims {
        issuer: ISSUER.to_string(),
        subject: SUBJECT.to_string(),
        audience: vec![],
        expires_at: (now + ChronoDuration::minutes(10)).timestamp(),
        not_before: 0,
        issued_at: now.timestamp(),
        token_id: Uuid::now_v7(),
        version: "1".to_string(),
        classification: "user".to_string(),
        resource: format!("{TENANT}:acme"),
        roles: vec!["operator".to_string()],
    }
}

fn mint_jwt(claims: &Claims) -> String {
    jsonwebtoken::encode(
        &Header::new(Algorithm::RS256),
        claims,
        &EncodingKey::from_rsa_pem(PRIVATE_PEM.as_bytes()).unwrap(),
    )
    .expect("failed to encode jwt")
}

fn of_type(events: &[Event], event_type: EventType) -> Vec<&Event> {
    events.iter().filter(|e| e.event_type() == event_type).collect()
}

fn single(events: &[Event], event_type: EventType) -> &Event {
    let found = of_type(events, event_type);
    assert_eq!(found.len(), 1, "expected one {event_type} event, got {}", found.len());
    found[0]
}

#[tokio::test]
async fn health_is_open_and_echoes_request_id() {
    let srv = TestServer::spawn(200, ADMIN).await;
    let client = reqwest::Client::new();
    let rid = "3fae3c4e-2b1f-4d0c-9a43-5f6c1e7b8a90";

    let res = client
        .get(srv.url("/health"))
        .header("x-request-id", rid)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.headers()["x-request-id"], rid);
    assert!(srv.drain().is_empty());
}

#[tokio::test]
async fn invalid_request_id_is_replaced() {
    let srv = TestServer::spawn(200, ADMIN).await;

    let res = reqwest::Client::new()
        .get(srv.url("/health"))
        .header("x-request-id", "not-a-uuid")
        .send()
        .await
        .unwrap();

    let echoed = res.headers()["x-request-id"].to_str().unwrap();
    assert_ne!(echoed, "not-a-uuid");
    assert!(Uuid::parse_str(echoed).is_ok());
    assert!(Uuid::parse_str(res.headers()["x-session-id"].to_str().unwrap()).is_ok());
}

#[tokio::test]
async fn missing_token_is_rejected_with_login_failure() {
    let srv = TestServer::spawn(200, ADMIN).await;

    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let rid = res.headers()["x-request-id"].to_str().unwrap().to_string();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "missing_token");
    assert_eq!(body["request_id"], rid.as_str());

    let events = srv.drain();
    let failure = single(&events, EventType::LoginFailure);
    assert_eq!(failure.request_id().to_string(), rid);
    assert!(failure.payload()["reason"].as_str().is_some());
    assert!(of_type(&events, EventType::AuditLog).is_empty());
    assert_eq!(srv.mock.hits(), 0);
}

#[tokio::test]
async fn hmac_signed_token_is_rejected() {
    let srv = TestServer::spawn(200, ADMIN).await;
    let token = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        &claims(),
        &EncodingKey::from_secret(PUBLIC_PEM.as_bytes()),
    )
    .unwrap();

    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .bearer_auth(token)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "unexpected_signing_method");
    assert_eq!(of_type(&srv.drain(), EventType::LoginFailure).len(), 1);
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let srv = TestServer::spawn(200, ADMIN).await;
    let mut expired = claims();
    expired.expires_at = (Utc::now() - ChronoDuration::minutes(5)).timestamp();

    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .bearer_auth(mint_jwt(&expired))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(srv.mock.hits(), 0);
}

#[tokio::test]
async fn unresolvable_tenant_is_rejected() {
    let srv = TestServer::spawn(200, ADMIN).await;
    let mut bad = claims();
    bad.resource = "acme".to_string();

    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .bearer_auth(mint_jwt(&bad))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let failure = single(&srv.drain(), EventType::LoginFailure).clone();
    assert!(failure.tenant_id().is_none());
}

#[tokio::test]
async fn authorized_request_flows_through_every_stage() {
    let srv = TestServer::spawn(200, ADMIN).await;
    let claims = claims();
    let token = mint_jwt(&claims);

    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .bearer_auth(&token)
        .header("user-agent", "warden-tests/1")
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    let rid = res.headers()["x-request-id"].to_str().unwrap().to_string();
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["subject"], SUBJECT);
    assert_eq!(body["tenant_id"], TENANT);
    assert_eq!(body["tenant_name"], "acme");

    assert_eq!(srv.mock.last_authorization(), Some(format!("Bearer {token}")));

    let events = srv.drain();
    for ty in [EventType::LoginSuccess, EventType::UsageLog, EventType::AuditLog] {
        let event = single(&events, ty);
        assert_eq!(event.request_id().to_string(), rid);
        assert_eq!(event.tenant_id().unwrap().to_string(), TENANT);
        assert_eq!(event.event_source(), "platform.security.orders.v1");
        assert_eq!(event.payload()["subject"], SUBJECT);
        assert_eq!(event.payload()["user_agent"], "warden-tests/1");
    }

    let audit = single(&events, EventType::AuditLog).payload();
    assert_eq!(audit["http_method"], "GET");
    assert_eq!(audit["endpoint"], "/whoami");
    assert_eq!(audit["resource"], "whoami");
    assert_eq!(audit["status_code"], 200);
    assert_eq!(audit["source_ip"], "127.0.0.1");
    assert_eq!(audit["jti"], claims.token_id.to_string());
    assert_eq!(audit["payload"], Value::Null);
    assert!(audit.get("response_payload").is_none());

    let usage = single(&events, EventType::UsageLog).payload();
    assert_eq!(usage["product_id"], PRODUCT_ID);
    assert_eq!(usage["memory_mb"], 512);
    assert_eq!(usage["status"], "draft");
    assert_eq!(usage["user_id"], SUBJECT);
    assert_eq!(usage["service_name"], "orders");
    assert!(usage["duration_ms"].as_i64().unwrap() >= 0);
    assert!(usage.get("owner_id").is_none());
}

#[tokio::test]
async fn entitlements_are_served_from_cache_on_repeat() {
    let srv = TestServer::spawn(200, ADMIN).await;
    let client = reqwest::Client::new();
    let token = mint_jwt(&claims());

    for _ in 0..3 {
        let res = client
            .get(srv.url("/whoami"))
            .bearer_auth(&token)
            .send()
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::OK);
    }

    assert_eq!(srv.mock.hits(), 1);
}

#[tokio::test]
async fn refused_lookup_is_unauthorized() {
    let srv = TestServer::spawn(403, "forbidden").await;

    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .bearer_auth(mint_jwt(&claims()))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "entitlement_refused");

    let events = srv.drain();
    assert_eq!(of_type(&events, EventType::AuthzDenied).len(), 1);
    assert!(of_type(&events, EventType::AuditLog).is_empty());
    assert!(of_type(&events, EventType::UsageLog).is_empty());
}

#[tokio::test]
async fn subject_without_required_entitlement_is_forbidden() {
    let srv = TestServer::spawn(200, VIEWER).await;

    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .bearer_auth(mint_jwt(&claims()))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::FORBIDDEN);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "permission_denied");

    let events = srv.drain();
    let denied = single(&events, EventType::AuthzDenied);
    let mut required: Vec<String> = serde_json::from_value(denied.payload()["required"].clone()).unwrap();
    required.sort();
    assert_eq!(required, ["orders-admin", "orders-editor"]);
}

#[tokio::test]
async fn upstream_failure_is_an_internal_error() {
    let srv = TestServer::spawn(503, "maintenance").await;

    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .bearer_auth(mint_jwt(&claims()))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["error"], "entitlement_api_error");
    assert_eq!(body["message"], "internal server error");

    assert_eq!(of_type(&srv.drain(), EventType::AuthzError).len(), 1);
}

#[tokio::test]
async fn unreachable_entitlement_service_is_an_internal_error() {
    let srv =
        TestServer::spawn_with(200, ADMIN, Some("http://127.0.0.1:1/entitlements"), 1024).await;

    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .bearer_auth(mint_jwt(&claims()))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body["message"], "internal server error");
    assert!(!body.to_string().contains("127.0.0.1"));
}

#[tokio::test]
async fn json_body_is_audited_and_forwarded_unchanged() {
    let srv = TestServer::spawn(200, ADMIN).await;
    let sent = json!({ "sku": "A-100", "qty": 3, "note": "rush" });
    let bytes = serde_json::to_vec(&sent).unwrap();

    let res = reqwest::Client::new()
        .post(srv.url("/echo?dry_run=true"))
        .bearer_auth(mint_jwt(&claims()))
        .header("content-type", "application/json")
        .body(bytes.clone())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.bytes().await.unwrap().as_ref(), bytes.as_slice());

    let events = srv.drain();
    let event = single(&events, EventType::AuditLog);
    assert_eq!(event.raw_field("payload").map(str::as_bytes), Some(bytes.as_slice()));
    let audit = event.payload();
    assert_eq!(audit["payload_truncated"], false);
    assert_eq!(audit["content_type"], "application/json");
    assert_eq!(audit["http_method"], "POST");
    assert_eq!(audit["full_url"], "/echo?dry_run=true");
}

#[tokio::test]
async fn binary_body_is_not_captured() {
    let srv = TestServer::spawn(200, ADMIN).await;
    let bytes: Vec<u8> = (0..=255u8).cycle().take(4096).collect();

    let res = reqwest::Client::new()
        .put(srv.url("/echo"))
        .bearer_auth(mint_jwt(&claims()))
        .header("content-type", "application/octet-stream")
        .body(bytes.clone())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.bytes().await.unwrap().as_ref(), bytes.as_slice());

    let audit = single(&srv.drain(), EventType::AuditLog).payload().clone();
    assert_eq!(audit["payload"], Value::Null);
    assert_eq!(audit["payload_truncated"], false);
}

#[tokio::test]
async fn oversized_json_body_is_truncated_for_audit_only() {
    let srv = TestServer::spawn_with(200, ADMIN, None, 32).await;
    let sent = json!({ "lines": (0..50).map(|i| format!("line-{i}")).collect::<Vec<_>>() });
    let bytes = serde_json::to_vec(&sent).unwrap();
    assert!(bytes.len() > 32);

    let res = reqwest::Client::new()
        .patch(srv.url("/echo"))
        .bearer_auth(mint_jwt(&claims()))
        .header("content-type", "application/merge-patch+json")
        .body(bytes.clone())
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.bytes().await.unwrap().as_ref(), bytes.as_slice());

    let audit = single(&srv.drain(), EventType::AuditLog).payload().clone();
    assert_eq!(audit["payload_truncated"], true);
    assert_eq!(audit["payload"], Value::Null);
}

#[tokio::test]
async fn error_responses_are_captured_in_audit() {
    let srv = TestServer::spawn(200, ADMIN).await;

    let res = reqwest::Client::new()
        .get(srv.url("/fail"))
        .bearer_auth(mint_jwt(&claims()))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = res.json().await.unwrap();
    assert_eq!(body, json!({ "error": "boom" }));

    let events = srv.drain();
    let audit = single(&events, EventType::AuditLog);
    assert_eq!(audit.payload()["status_code"], 500);
    assert_eq!(audit.raw_field("response_payload"), Some(r#"{"error":"boom"}"#));
}

#[tokio::test]
async fn audited_payload_keeps_key_order_and_number_text() {
    let srv = TestServer::spawn(200, ADMIN).await;
    let sent = r#"{"zeta":1,"alpha":2,"big":123456789012345678901234,"f":1.50}"#;

    let res = reqwest::Client::new()
        .post(srv.url("/echo"))
        .bearer_auth(mint_jwt(&claims()))
        .header("content-type", "application/json")
        .body(sent)
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), sent);

    let events = srv.drain();
    let audit = single(&events, EventType::AuditLog);
    assert_eq!(audit.raw_field("payload"), Some(sent));

    let wire = serde_json::to_string(audit).unwrap();
    assert!(wire.contains(&format!(r#""payload":{sent}"#)), "{wire}");
}

#[tokio::test]
async fn owner_and_message_headers_are_recorded() {
    let srv = TestServer::spawn(200, ADMIN).await;

    let res = reqwest::Client::new()
        .get(srv.url("/whoami"))
        .bearer_auth(mint_jwt(&claims()))
        .header("x-owner-id", "team-7")
        .header("x-message", "nightly sync")
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), StatusCode::OK);

    let events = srv.drain();
    let usage = single(&events, EventType::UsageLog);
    assert_eq!(usage.payload()["owner_id"], "team-7");
    assert_eq!(usage.message(), Some("nightly sync"));
    assert_eq!(single(&events, EventType::AuditLog).message(), Some("nightly sync"));
}

#[tokio::test]
async fn preflight_requests_skip_authentication() {
    let srv = TestServer::spawn(200, ADMIN).await;

    let res = reqwest::Client::new()
        .request(reqwest::Method::OPTIONS, srv.url("/echo"))
        .send()
        .await
        .unwrap();

    assert_eq!(res.status(), StatusCode::OK);
    assert_eq!(srv.mock.hits(), 0);

    let events = srv.drain();
    assert!(of_type(&events, EventType::LoginFailure).is_empty());
    assert!(of_type(&events, EventType::UsageLog).is_empty());
}
