#[path = "support/mod.rs"]
mod support;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use keeper_core::fingerprint;
use serde_json::json;
use support::app::{TestApp, get, post_json};

fn text_record(name: &str, data: &str) -> serde_json::Value {
    json!({
        "type": "TEXT",
        "name": name,
        "data": data,
        "checksum": fingerprint(data.as_bytes()),
    })
}

#[tokio::test]
async fn register_then_empty_listing() {
    for app in [TestApp::memory().await, TestApp::sqlite().await] {
        let response = app
            .send(post_json(
                "/api/user/register",
                None,
                &json!({ "login": "alice", "password": "pw1" }),
            ))
            .await
            .expect(StatusCode::CREATED);
        let body = response.json();
        let token = body["token"].as_str().unwrap();
        assert!(!token.is_empty());
        assert_eq!(body["expires_in"], 3 * 60 * 60);

        let listing = app
            .send(get("/api/user/records/list", Some(token)))
            .await
            .expect(StatusCode::NO_CONTENT);
        assert!(listing.body.is_empty());
    }
}

#[tokio::test]
async fn register_rejects_duplicates_and_bad_bodies() {
    let app = TestApp::memory().await;
    app.register("alice", "pw1").await;

    app.send(post_json(
        "/api/user/register",
        None,
        &json!({ "login": "alice", "password": "other" }),
    ))
    .await
    .expect(StatusCode::CONFLICT);

    let malformed = Request::builder()
        .method("POST")
        .uri("/api/user/register")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    app.send(malformed).await.expect(StatusCode::BAD_REQUEST);

    app.send(post_json(
        "/api/user/register",
        None,
        &json!({ "login": "bob", "password": "" }),
    ))
    .await
    .expect(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_checks_credentials() {
    let app = TestApp::sqlite().await;
    app.register("alice", "pw1").await;

    let response = app
        .send(post_json(
            "/api/user/login",
            None,
            &json!({ "login": "alice", "password": "pw1" }),
        ))
        .await
        .expect(StatusCode::OK);
    assert!(!response.json()["token"].as_str().unwrap().is_empty());

    app.send(post_json(
        "/api/user/login",
        None,
        &json!({ "login": "alice", "password": "nope" }),
    ))
    .await
    .expect(StatusCode::UNAUTHORIZED);

    app.send(post_json(
        "/api/user/login",
        None,
        &json!({ "login": "mallory", "password": "pw1" }),
    ))
    .await
    .expect(StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn put_assigns_id_and_rejects_tampering() {
    for app in [TestApp::memory().await, TestApp::sqlite().await] {
        let token = app.register("alice", "pw1").await;

        let created = app
            .send(post_json(
                "/api/user/records",
                Some(&token),
                &text_record("note1", "a:b"),
            ))
            .await
            .expect(StatusCode::CREATED)
            .json();
        assert_ne!(created["id"].as_u64().unwrap(), 0);
        assert_eq!(created["type"], "TEXT");
        assert_eq!(created["checksum"], fingerprint(b"a:b"));
        assert_eq!(created["blocked"], false);
        assert!(created.get("user_id").is_none());

        let mut tampered = text_record("note1", "a:b");
        tampered["checksum"] = json!(fingerprint(b"a:c"));
        let rejected = app
            .send(post_json("/api/user/records", Some(&token), &tampered))
            .await
            .expect(StatusCode::BAD_REQUEST);
        assert_eq!(rejected.json()["message"], "bad request: corrupted data");

        let fetched = app
            .send(get("/api/user/records/note1", Some(&token)))
            .await
            .expect(StatusCode::OK)
            .json();
        assert_eq!(fetched, created);
    }
}

#[tokio::test]
async fn put_requires_structured_payload() {
    let app = TestApp::memory().await;
    let token = app.register("alice", "pw1").await;
    app.send(post_json(
        "/api/user/records",
        Some(&token),
        &text_record("flat", "nodelimiter"),
    ))
    .await
    .expect(StatusCode::BAD_REQUEST);

    app.send(post_json(
        "/api/user/records",
        Some(&token),
        &json!({ "type": "CARD", "name": "x", "data": "a:b", "checksum": "" }),
    ))
    .await
    .expect(StatusCode::BAD_REQUEST);

    app.send(get("/api/user/records/list", Some(&token)))
        .await
        .expect(StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn record_named_like_the_listing_route_is_rejected() {
    let app = TestApp::memory().await;
    let token = app.register("alice", "pw1").await;
    let rejected = app
        .send(post_json(
            "/api/user/records",
            Some(&token),
            &text_record("list", "a:b"),
        ))
        .await
        .expect(StatusCode::BAD_REQUEST);
    assert_eq!(
        rejected.json()["message"],
        "bad request: record name `list` is reserved"
    );

    app.send(get("/api/user/records/list", Some(&token)))
        .await
        .expect(StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn updates_are_keyed_by_id_and_owner() {
    let app = TestApp::sqlite().await;
    let token = app.register("alice", "pw1").await;

    let created = app
        .send(post_json(
            "/api/user/records/",
            Some(&token),
            &text_record("note1", "a:b"),
        ))
        .await
        .expect(StatusCode::CREATED)
        .json();
    let id = created["id"].as_u64().unwrap();

    let mut update = text_record("note1", "a:b:c");
    update["id"] = json!(id);
    let updated = app
        .send(post_json("/api/user/records", Some(&token), &update))
        .await
        .expect(StatusCode::CREATED)
        .json();
    assert_eq!(updated["id"].as_u64(), Some(id));
    assert_eq!(updated["data"], "a:b:c");

    let mut unknown = text_record("note1", "a:b");
    unknown["id"] = json!(id + 1000);
    app.send(post_json("/api/user/records", Some(&token), &unknown))
        .await
        .expect(StatusCode::NOT_FOUND);

    let listing = app
        .send(get("/api/user/records/list", Some(&token)))
        .await
        .expect(StatusCode::OK)
        .json();
    assert_eq!(listing.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn users_never_share_record_names() {
    for app in [TestApp::memory().await, TestApp::sqlite().await] {
        let alice = app.register("alice", "pw1").await;
        let bob = app.register("bob", "pw2").await;

        let alice_record = app
            .send(post_json(
                "/api/user/records",
                Some(&alice),
                &text_record("secret", "alice:one"),
            ))
            .await
            .expect(StatusCode::CREATED)
            .json();
        let bob_record = app
            .send(post_json(
                "/api/user/records",
                Some(&bob),
                &text_record("secret", "bob:two"),
            ))
            .await
            .expect(StatusCode::CREATED)
            .json();
        assert_ne!(alice_record["id"], bob_record["id"]);

        // Bob addressing Alice's id must not touch her row.
        let mut hijack = text_record("secret", "bob:evil");
        hijack["id"] = alice_record["id"].clone();
        app.send(post_json("/api/user/records", Some(&bob), &hijack))
            .await
            .expect(StatusCode::NOT_FOUND);

        let seen_by_alice = app
            .send(get("/api/user/records/secret", Some(&alice)))
            .await
            .expect(StatusCode::OK)
            .json();
        assert_eq!(seen_by_alice["data"], "alice:one");
        let seen_by_bob = app
            .send(get("/api/user/records/secret", Some(&bob)))
            .await
            .expect(StatusCode::OK)
            .json();
        assert_eq!(seen_by_bob["data"], "bob:two");
    }
}

#[tokio::test]
async fn missing_record_is_not_found() {
    let app = TestApp::memory().await;
    let token = app.register("alice", "pw1").await;
    app.send(get("/api/user/records/nope", Some(&token)))
        .await
        .expect(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn record_routes_require_a_valid_token() {
    let app = TestApp::memory().await;
    app.register("alice", "pw1").await;

    app.send(get("/api/user/records/list", None))
        .await
        .expect(StatusCode::UNAUTHORIZED);
    app.send(post_json(
        "/api/user/records",
        None,
        &text_record("note1", "a:b"),
    ))
    .await
    .expect(StatusCode::UNAUTHORIZED);
    app.send(get("/api/user/records/list", Some("garbage")))
        .await
        .expect(StatusCode::UNAUTHORIZED);

    let expired = app.expired_token(1);
    let response = app
        .send(get("/api/user/records/list", Some(&expired)))
        .await
        .expect(StatusCode::UNAUTHORIZED);
    assert_eq!(response.json()["message"], "unauthorized: token expired");
}

#[tokio::test]
async fn correlation_id_is_echoed() {
    let app = TestApp::memory().await;
    let request = Request::builder()
        .uri("/healthz")
        .header("x-correlation-id", "trace-123")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await.expect(StatusCode::OK);
    assert_eq!(response.headers["x-correlation-id"], "trace-123");
    assert_eq!(response.json()["status"], "ok");

    let response = app
        .send(get("/api/user/records/list", None))
        .await
        .expect(StatusCode::UNAUTHORIZED);
    let generated = response.headers["x-correlation-id"].to_str().unwrap();
    assert!(!generated.is_empty());
    assert_eq!(response.json()["correlation_id"], generated);
}

#[tokio::test]
async fn unusable_correlation_ids_are_replaced() {
    let app = TestApp::memory().await;
    let request = Request::builder()
        .uri("/api/user/records/list")
        .header("x-correlation-id", "two words")
        .body(Body::empty())
        .unwrap();
    let response = app.send(request).await.expect(StatusCode::UNAUTHORIZED);
    let assigned = response.headers["x-correlation-id"].to_str().unwrap();
    assert_ne!(assigned, "two words");
    assert_eq!(response.json()["correlation_id"], assigned);
}
