//! Integration tests for the linkgraph backend.

use std::sync::Arc;

use reqwest::{Client, Response};
use serde_json::{json, Value};
use tempfile::TempDir;

use crate::app::App;
use crate::concepts::TagDeletePolicy;
use crate::config::Config;
use crate::db::init_database;
use crate::session_store::SessionStore;
use crate::{create_router, AppState};

/// Test fixture for integration tests.
struct TestFixture {
    base_url: String,
    _temp_dir: TempDir,
}

impl TestFixture {
    async fn new() -> Self {
        Self::with_policy(TagDeletePolicy::Idempotent).await
    }

    async fn with_policy(tag_delete_policy: TagDeletePolicy) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp dir");
        let db_path = temp_dir.path().join("test.sqlite");

        let config = Config {
            db_path,
            bind_addr: "127.0.0.1:0".parse().unwrap(),
            log_level: "warn".to_string(),
            session_cookie: "test_sid".to_string(),
            tag_delete_policy,
        };

        // Initialize database
        let pool = init_database(&config.db_path)
            .await
            .expect("Failed to init DB");
        let app = App::new(pool, &config).await.expect("Failed to bind collections");

        let state = AppState {
            app: Arc::new(app),
            sessions: Arc::new(SessionStore::new(config.session_cookie.clone())),
        };

        let router = create_router(state);

        // Bind to random port
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to get addr");
        let base_url = format!("http://{}", addr);

        // Spawn server
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        // Wait for server to start
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;

        TestFixture {
            base_url,
            _temp_dir: temp_dir,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// A client with its own cookie jar, so each one is a separate browser session.
    fn client(&self) -> Client {
        Client::builder().cookie_store(true).build().unwrap()
    }

    /// Register `username` and return a client logged in as them.
    async fn user(&self, username: &str) -> Client {
        let client = self.client();
        let resp = client
            .post(self.url("/api/users"))
            .json(&json!({ "username": username, "password": "pw" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);

        let resp = client
            .post(self.url("/api/login"))
            .json(&json!({ "username": username, "password": "pw" }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        client
    }

    async fn create_webapp(&self, client: &Client, name: &str, tags: &[&str]) -> String {
        let resp = client
            .post(self.url("/api/webapps"))
            .json(&json!({ "name": name, "url": format!("http://{}", name), "tags": tags }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        body["webapp"]["_id"].as_str().unwrap().to_string()
    }
}

async fn json_of(resp: Response) -> (u16, Value) {
    let status = resp.status().as_u16();
    (status, resp.json().await.unwrap())
}

#[tokio::test]
async fn test_health_check() {
    let fixture = TestFixture::new().await;

    let resp = fixture
        .client()
        .get(fixture.url("/health"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "OK");
}

#[tokio::test]
async fn test_register_login_logout() {
    let fixture = TestFixture::new().await;
    let client = fixture.client();

    let (status, body) = json_of(
        client
            .post(fixture.url("/api/users"))
            .json(&json!({ "username": "alice", "password": "secret" }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["user"]["username"], "alice");
    assert!(body["user"].get("passwordHash").is_none());

    let (status, body) = json_of(
        client
            .post(fixture.url("/api/login"))
            .json(&json!({ "username": "alice", "password": "wrong" }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 403);
    assert_eq!(body["msg"], "Username or password is incorrect.");

    let (status, _) = json_of(
        client
            .post(fixture.url("/api/login"))
            .json(&json!({ "username": "alice", "password": "secret" }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 200);

    let (status, body) = json_of(
        client
            .get(fixture.url("/api/session"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["username"], "alice");

    // Registering again while logged in is refused
    let (status, _) = json_of(
        client
            .post(fixture.url("/api/users"))
            .json(&json!({ "username": "bob", "password": "pw" }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 403);

    let (status, _) = json_of(
        client
            .post(fixture.url("/api/logout"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 200);

    let (status, body) = json_of(
        client
            .get(fixture.url("/api/session"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 401);
    assert_eq!(body["msg"], "Must be logged in!");
}

#[tokio::test]
async fn test_duplicate_username_and_invalid_input() {
    let fixture = TestFixture::new().await;
    fixture.user("alice").await;

    let client = fixture.client();
    let (status, body) = json_of(
        client
            .post(fixture.url("/api/users"))
            .json(&json!({ "username": "alice", "password": "other" }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 403);
    assert_eq!(body["msg"], "User with username alice already exists!");

    let (status, body) = json_of(
        client
            .post(fixture.url("/api/users"))
            .json(&json!({ "username": "carol" }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["msg"], "Invalid input");

    let (status, _) = json_of(
        client
            .post(fixture.url("/api/users"))
            .json(&json!({ "username": "", "password": "pw" }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 400);
}

#[tokio::test]
async fn test_tags_drive_similarity_graph() {
    let fixture = TestFixture::new().await;
    let alice = fixture.user("alice").await;

    let x = fixture.create_webapp(&alice, "x", &["news", "tech"]).await;
    let y = fixture.create_webapp(&alice, "y", &[]).await;

    let (status, body) = json_of(
        alice
            .post(fixture.url(&format!("/api/webapps/{}/tags", y)))
            .json(&json!({ "tags": ["tech"] }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["tags"], json!(["tech"]));

    let (_, similar) = json_of(
        alice
            .get(fixture.url(&format!("/api/webapps/{}/similar", x)))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(similar[0]["_id"], y.as_str());
    assert_eq!(similar[0]["owner"], "alice");

    let (_, graph) = json_of(
        alice
            .get(fixture.url("/api/graph"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(graph["nodes"].as_array().unwrap().len(), 2);
    assert_eq!(graph["edges"].as_array().unwrap().len(), 1);

    let (status, body) = json_of(
        alice
            .delete(fixture.url(&format!("/api/webapps/{}/tags", x)))
            .json(&json!({ "tags": ["tech"] }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["tags"], json!(["news"]));

    let (_, similar) = json_of(
        alice
            .get(fixture.url(&format!("/api/webapps/{}/similar", y)))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(similar, json!([]));

    let (_, top) = json_of(
        alice
            .get(fixture.url("/api/tags/top?owner=alice&limit=1"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(top.as_array().unwrap().len(), 1);
    assert_eq!(top[0]["count"], 1);

    let (status, _) = json_of(
        alice
            .get(fixture.url("/api/tags/top?limit=-1"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 400);

    // Every webapp change was logged as an activity post
    let (_, posts) = json_of(
        alice
            .get(fixture.url("/api/posts?author=alice"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(posts.as_array().unwrap().len(), 2);
    assert_eq!(posts[0]["author"], "alice");
}

#[tokio::test]
async fn test_ownership_checks() {
    let fixture = TestFixture::new().await;
    let alice = fixture.user("alice").await;
    let bob = fixture.user("bob").await;

    let x = fixture.create_webapp(&alice, "x", &["tech"]).await;

    let (status, body) = json_of(
        bob.patch(fixture.url(&format!("/api/webapps/{}", x)))
            .json(&json!({ "name": "mine now" }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(body["msg"], format!("bob is not the owner of webapp {}!", x));

    let (status, _) = json_of(
        bob.delete(fixture.url(&format!("/api/webapps/{}", x)))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 409);

    let (status, _) = json_of(
        alice
            .delete(fixture.url(&format!("/api/webapps/{}", x)))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 200);

    let (status, body) = json_of(
        alice
            .get(fixture.url(&format!("/api/webapps/{}", x)))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 404);
    assert_eq!(body["msg"], format!("Webapp {} does not exist!", x));

    let (_, tagged) = json_of(
        alice
            .get(fixture.url("/api/tags/tech/webapps"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(tagged, json!([]));
}

#[tokio::test]
async fn test_rejected_webapp_input_writes_nothing() {
    let fixture = TestFixture::new().await;
    let alice = fixture.user("alice").await;

    let (status, body) = json_of(
        alice
            .post(fixture.url("/api/webapps"))
            .json(&json!({ "name": "x", "url": "u", "tags": ["ok", " "] }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["msg"], "Tags must be non-empty!");

    let (status, _) = json_of(
        alice
            .post(fixture.url("/api/webapps"))
            .json(&json!({ "name": "  ", "url": "u" }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 400);

    let (_, webapps) = json_of(alice.get(fixture.url("/api/webapps")).send().await.unwrap()).await;
    assert_eq!(webapps, json!([]));
    let (_, posts) = json_of(alice.get(fixture.url("/api/posts")).send().await.unwrap()).await;
    assert_eq!(posts, json!([]));
    let (_, tagged) = json_of(
        alice
            .get(fixture.url("/api/tags/ok/webapps"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(tagged, json!([]));

    let x = fixture.create_webapp(&alice, "x", &[]).await;
    let (status, body) = json_of(
        alice
            .patch(fixture.url(&format!("/api/webapps/{}", x)))
            .json(&json!({ "name": "   " }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 400);
    assert_eq!(body["msg"], "Webapp name and url must be non-empty!");
}

#[tokio::test]
async fn test_strict_tag_delete_policy() {
    let fixture = TestFixture::with_policy(TagDeletePolicy::Strict).await;
    let alice = fixture.user("alice").await;
    let x = fixture.create_webapp(&alice, "x", &["tech"]).await;

    let (status, body) = json_of(
        alice
            .delete(fixture.url(&format!("/api/webapps/{}/tags", x)))
            .json(&json!({ "tags": ["news"] }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 410);
    assert_eq!(body["msg"], format!("Tag news does not exist on item {}!", x));
}

#[tokio::test]
async fn test_friend_request_flow() {
    let fixture = TestFixture::new().await;
    let alice = fixture.user("alice").await;
    let bob = fixture.user("bob").await;

    let (status, _) = json_of(
        alice
            .post(fixture.url("/api/friend/requests/bob"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 200);

    let (_, requests) = json_of(
        bob.get(fixture.url("/api/friend/requests"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(requests[0]["from"], "alice");
    assert_eq!(requests[0]["to"], "bob");

    let (status, body) = json_of(
        bob.post(fixture.url("/api/friend/requests/alice"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 403);
    assert_eq!(body["msg"], "Friend request between bob and alice already exists!");

    let (status, _) = json_of(
        bob.put(fixture.url("/api/friend/accept/alice"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 200);

    for (client, friend) in [(&alice, "bob"), (&bob, "alice")] {
        let (_, friends) = json_of(
            client
                .get(fixture.url("/api/friends"))
                .send()
                .await
                .unwrap(),
        )
        .await;
        assert_eq!(friends, json!([friend]));
    }

    let (status, _) = json_of(
        alice
            .delete(fixture.url("/api/friends/bob"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 200);

    let (status, body) = json_of(
        bob.delete(fixture.url("/api/friends/alice"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 404);
    assert_eq!(body["msg"], "bob and alice are not friends!");
}

#[tokio::test]
async fn test_posts_author_only() {
    let fixture = TestFixture::new().await;
    let alice = fixture.user("alice").await;
    let bob = fixture.user("bob").await;

    let (status, _) = json_of(
        alice
            .post(fixture.url("/api/posts"))
            .json(&json!({ "content": " " }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 400);

    let (status, body) = json_of(
        alice
            .post(fixture.url("/api/posts"))
            .json(&json!({ "content": "hello", "options": { "visibility": "friends" } }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 200);
    assert_eq!(body["post"]["author"], "alice");
    let id = body["post"]["_id"].as_str().unwrap().to_string();

    let (status, body) = json_of(
        bob.delete(fixture.url(&format!("/api/posts/{}", id)))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 409);
    assert_eq!(body["msg"], format!("bob is not the author of post {}!", id));

    let (status, _) = json_of(
        alice
            .patch(fixture.url(&format!("/api/posts/{}", id)))
            .json(&json!({ "content": "hello again" }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 200);

    let (status, _) = json_of(
        alice
            .post(fixture.url("/api/posts"))
            .json(&json!({ "content": "x", "options": { "pinned": true } }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 400);

    let (_, posts) = json_of(
        bob.get(fixture.url("/api/posts"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(posts[0]["content"], "hello again");
}

#[tokio::test]
async fn test_account_rename_password_and_delete() {
    let fixture = TestFixture::new().await;
    let alice = fixture.user("alice").await;

    let (status, _) = json_of(
        alice
            .patch(fixture.url("/api/users"))
            .json(&json!({ "username": "alicia" }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 200);

    let (status, body) = json_of(
        alice
            .patch(fixture.url("/api/password"))
            .json(&json!({ "currentPassword": "nope", "newPassword": "pw2" }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 403);
    assert_eq!(body["msg"], "The given current password is wrong!");

    let (status, _) = json_of(
        alice
            .patch(fixture.url("/api/password"))
            .json(&json!({ "currentPassword": "pw", "newPassword": "pw2" }))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 200);

    let (status, _) = json_of(
        alice
            .delete(fixture.url("/api/users"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 200);

    let (status, _) = json_of(
        alice
            .get(fixture.url("/api/users/alicia"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 404);

    let (status, _) = json_of(
        alice
            .get(fixture.url("/api/session"))
            .send()
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(status, 401);
}
