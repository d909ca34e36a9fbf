use super::*;
use std::time::Duration;

use crate::credentials::CookieJarStore;
use crate::refresh::REFRESH_PATH;
use crate::test_helpers::{MockReply, MockTransport, alice, test_config};

struct Fixture {
    jar: Arc<CookieJarStore>,
    transport: Arc<MockTransport>,
    session: Arc<SessionStore>,
    client: AuthenticatedClient,
}

fn fixture() -> Fixture {
    let jar = Arc::new(CookieJarStore::new());
    let transport = Arc::new(MockTransport::new(Arc::clone(&jar)));
    let session = Arc::new(SessionStore::new());
    let client = AuthenticatedClient::new(
        test_config(),
        Arc::clone(&transport) as Arc<dyn Transport>,
        Arc::clone(&jar) as Arc<dyn CredentialStore>,
        Arc::clone(&session),
    );
    Fixture { jar, transport, session, client }
}

fn unauthorized_then_ok(body: &str) -> Vec<MockReply> {
    vec![MockReply::status(401, r#"{"error":"Token expired"}"#), MockReply::status(200, body)]
}

// =============================================================================
// is_auth_endpoint
// =============================================================================

#[test]
fn auth_endpoints_are_recognized() {
    assert!(is_auth_endpoint("/login"));
    assert!(is_auth_endpoint("/register"));
    assert!(is_auth_endpoint("http://api.test/refresh"));
    assert!(is_auth_endpoint("/auth/logout"));
}

#[test]
fn ordinary_endpoints_are_not_auth() {
    assert!(!is_auth_endpoint("/posts"));
    assert!(!is_auth_endpoint("/me"));
    assert!(!is_auth_endpoint("/users/7"));
    assert!(!is_auth_endpoint("/posts?next=/login"));
}

// =============================================================================
// classification
// =============================================================================

#[tokio::test]
async fn success_is_returned_unchanged() {
    let fx = fixture();
    fx.transport.reply("/posts", 200, r#"[{"_id":"p1"}]"#);

    let response = fx.client.send(&RequestDescriptor::get("/posts")).await.unwrap();
    assert_eq!(response, ApiResponse::new(200, r#"[{"_id":"p1"}]"#));
}

#[tokio::test]
async fn json_content_type_and_cookies_are_attached() {
    let fx = fixture();
    fx.jar.store_set_cookies(["token=t1; Path=/"]);
    fx.transport.reply("/posts", 201, "{}");

    fx.client
        .send(&RequestDescriptor::post("/posts").body(r#"{"title":"Hi"}"#))
        .await
        .unwrap();

    let call = &fx.transport.calls()[0];
    assert_eq!(call.content_type.as_deref(), Some("application/json"));
    assert_eq!(call.cookie.as_deref(), Some("token=t1"));
    assert_eq!(call.body.as_deref(), Some(r#"{"title":"Hi"}"#));
}

#[tokio::test]
async fn error_body_message_is_surfaced() {
    let fx = fixture();
    fx.transport.reply("/posts/9", 404, r#"{"error":"Post not found"}"#);

    let err = fx.client.send(&RequestDescriptor::get("/posts/9")).await.unwrap_err();
    assert_eq!(err, ClientError::RequestFailed { status: 404, message: "Post not found".into() });
}

#[tokio::test]
async fn missing_error_body_uses_status_table() {
    let fx = fixture();
    fx.transport.reply("/users", 500, "");

    let err = fx.client.send(&RequestDescriptor::get("/users")).await.unwrap_err();
    assert_eq!(err, ClientError::RequestFailed { status: 500, message: "Server error".into() });
}

#[tokio::test]
async fn transport_failure_is_network_unavailable() {
    let fx = fixture();
    fx.transport.script("/posts", vec![MockReply::Unreachable]);

    let err = fx.client.send(&RequestDescriptor::get("/posts")).await.unwrap_err();
    assert!(matches!(err, ClientError::NetworkUnavailable { .. }));
    assert_eq!(fx.transport.calls_to("/posts"), 1);
    assert_eq!(fx.transport.calls_to(REFRESH_PATH), 0);
}

#[tokio::test]
async fn get_json_decodes() {
    let fx = fixture();
    fx.transport.reply("/me", 200, r#"{"_id":"u1","name":"Alice","email":"alice@example.com","role":"admin"}"#);

    let identity: crate::types::Identity = fx.client.get_json("/me").await.unwrap();
    assert_eq!(identity, alice());
}

// =============================================================================
// refresh and retry
// =============================================================================

#[tokio::test]
async fn expired_token_is_refreshed_and_retried_transparently() {
    let fx = fixture();
    fx.jar.store_set_cookies(["refreshToken=r1; Path=/"]);
    fx.transport.script("/posts", unauthorized_then_ok(r#"[{"_id":"p1"}]"#));
    fx.transport.script(REFRESH_PATH, vec![MockReply::status(200, "{}").with_cookie("token=t2; Path=/")]);

    let response = fx.client.send(&RequestDescriptor::get("/posts")).await.unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.text(), r#"[{"_id":"p1"}]"#);
    assert_eq!(fx.transport.calls_to("/posts"), 2);
    assert_eq!(fx.transport.calls_to(REFRESH_PATH), 1);
    let retry = fx.transport.calls().into_iter().filter(|c| c.path == "/posts").nth(1).unwrap();
    assert!(retry.cookie.unwrap().contains("token=t2"));
}

#[tokio::test]
async fn retry_is_bounded_to_one() {
    let fx = fixture();
    fx.jar.store_set_cookies(["refreshToken=r1"]);
    fx.transport.reply("/posts", 401, "");
    fx.transport.reply(REFRESH_PATH, 200, "{}");

    let err = fx.client.send(&RequestDescriptor::get("/posts")).await.unwrap_err();

    assert_eq!(err, ClientError::RequestFailed { status: 401, message: "Unauthorized".into() });
    assert_eq!(fx.transport.calls_to("/posts"), 2);
    assert_eq!(fx.transport.calls_to(REFRESH_PATH), 1);
}

#[tokio::test]
async fn retry_transport_failure_is_network_unavailable() {
    let fx = fixture();
    fx.jar.store_set_cookies(["refreshToken=r1"]);
    fx.transport.script("/posts", vec![MockReply::status(401, ""), MockReply::Unreachable]);
    fx.transport.reply(REFRESH_PATH, 200, "{}");

    let err = fx.client.send(&RequestDescriptor::get("/posts")).await.unwrap_err();
    assert!(matches!(err, ClientError::NetworkUnavailable { .. }));
}

#[tokio::test]
async fn login_401_never_refreshes() {
    let fx = fixture();
    fx.jar.store_set_cookies(["refreshToken=r1"]);
    fx.transport.reply("/login", 401, r#"{"error":"Invalid credentials"}"#);

    let err = fx.client.send(&RequestDescriptor::post("/login")).await.unwrap_err();

    assert_eq!(err, ClientError::RequestFailed { status: 401, message: "Invalid credentials".into() });
    assert_eq!(fx.transport.calls_to(REFRESH_PATH), 0);
    assert!(!fx.client.refresh_coordinator().in_flight());
}

#[tokio::test]
async fn failed_refresh_expires_session() {
    let fx = fixture();
    fx.jar.store_set_cookies(["token=old", "refreshToken=r1"]);
    fx.jar.cache_identity(&alice());
    fx.session.set_identity(alice());
    fx.transport.reply("/posts", 401, "");
    fx.transport.reply(REFRESH_PATH, 401, "");

    let err = fx.client.send(&RequestDescriptor::get("/posts")).await.unwrap_err();

    assert_eq!(err, ClientError::SessionExpired);
    assert_eq!(fx.transport.calls_to("/posts"), 1);
    assert!(fx.session.identity().is_none());
    assert!(fx.jar.cached_identity().is_none());
    assert!(!fx.jar.has_session_marker());
}

#[tokio::test]
async fn simultaneous_401s_share_one_refresh() {
    let fx = fixture();
    fx.jar.store_set_cookies(["refreshToken=r1"]);
    fx.transport.script("/posts", unauthorized_then_ok("[]"));
    fx.transport.script("/users", unauthorized_then_ok("[]"));
    fx.transport.script("/me", unauthorized_then_ok(r#"{"_id":"u1","email":"alice@example.com","role":"admin"}"#));
    fx.transport.reply(REFRESH_PATH, 200, "{}").delay(REFRESH_PATH, Duration::from_millis(50));

    let posts = RequestDescriptor::get("/posts");
    let users = RequestDescriptor::get("/users");
    let me = RequestDescriptor::get("/me");
    let (a, b, c) = tokio::join!(fx.client.send(&posts), fx.client.send(&users), fx.client.send(&me));

    assert_eq!(a.unwrap().status(), 200);
    assert_eq!(b.unwrap().status(), 200);
    assert_eq!(c.unwrap().status(), 200);
    assert_eq!(fx.transport.calls_to(REFRESH_PATH), 1);
    assert_eq!(fx.transport.peak_concurrency(REFRESH_PATH), 1);
    assert_eq!(fx.transport.calls_to("/posts"), 2);
    assert_eq!(fx.transport.calls_to("/users"), 2);
    assert_eq!(fx.transport.calls_to("/me"), 2);
}

#[tokio::test]
async fn simultaneous_401s_all_expire_together() {
    let fx = fixture();
    fx.jar.store_set_cookies(["refreshToken=r1"]);
    fx.transport.reply("/posts", 401, "");
    fx.transport.reply("/users", 401, "");
    fx.transport.reply(REFRESH_PATH, 403, "").delay(REFRESH_PATH, Duration::from_millis(50));

    let posts = RequestDescriptor::get("/posts");
    let users = RequestDescriptor::get("/users");
    let (a, b) = tokio::join!(fx.client.send(&posts), fx.client.send(&users));

    assert_eq!(a.unwrap_err(), ClientError::SessionExpired);
    assert_eq!(b.unwrap_err(), ClientError::SessionExpired);
    assert_eq!(fx.transport.calls_to(REFRESH_PATH), 1);
}

#[tokio::test]
async fn login_during_request_replays_without_refresh() {
    let fx = fixture();
    fx.transport
        .script("/posts", unauthorized_then_ok("[]"))
        .delay("/posts", Duration::from_millis(20));

    let posts = RequestDescriptor::get("/posts");
    let login = async {
        tokio::task::yield_now().await;
        fx.jar.store_set_cookies(["token=fresh"]);
        fx.session.set_identity(alice());
    };
    let (response, ()) = tokio::join!(fx.client.send(&posts), login);

    assert_eq!(response.unwrap().status(), 200);
    assert_eq!(fx.transport.calls_to(REFRESH_PATH), 0);
    assert_eq!(fx.session.identity(), Some(alice()));
    assert!(fx.jar.has_session_marker());
}

#[tokio::test]
async fn refresh_settling_after_login_replays_instead_of_expiring() {
    let fx = fixture();
    fx.jar.store_set_cookies(["refreshToken=r1"]);
    fx.transport.script("/posts", unauthorized_then_ok("[]"));
    fx.transport.reply(REFRESH_PATH, 200, "{}").delay(REFRESH_PATH, Duration::from_millis(50));

    let posts = RequestDescriptor::get("/posts");
    let login = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        fx.session.set_identity(alice());
    };
    let (response, ()) = tokio::join!(fx.client.send(&posts), login);

    assert_eq!(response.unwrap().status(), 200);
    assert_eq!(fx.transport.calls_to("/posts"), 2);
    assert_eq!(fx.session.identity(), Some(alice()));
    assert_eq!(fx.jar.read("refreshToken").as_deref(), Some("r1"));
}

#[tokio::test]
async fn expiry_in_new_session_waits_for_old_refresh() {
    let fx = fixture();
    fx.jar.store_set_cookies(["refreshToken=r1"]);
    fx.transport.script("/posts", unauthorized_then_ok("[]"));
    fx.transport.script("/users", unauthorized_then_ok("[]"));
    fx.transport.reply(REFRESH_PATH, 200, "{}").delay(REFRESH_PATH, Duration::from_millis(50));

    let posts = RequestDescriptor::get("/posts");
    let users = RequestDescriptor::get("/users");
    let after_login = async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        fx.session.set_identity(alice());
        fx.client.send(&users).await
    };
    let (a, b) = tokio::join!(fx.client.send(&posts), after_login);

    assert_eq!(a.unwrap().status(), 200);
    assert_eq!(b.unwrap().status(), 200);
    assert_eq!(fx.transport.calls_to(REFRESH_PATH), 2);
    assert_eq!(fx.transport.peak_concurrency(REFRESH_PATH), 1);
}
