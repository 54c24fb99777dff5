//! Handler tests that drive the full router against an in-memory database
//! and a scratch upload directory.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Router,
    body::{Body, Bytes},
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;
use uuid::Uuid;

use wishwall_db::Database;

use crate::auth::{AppState, AppStateInner};
use crate::mailer::{InviteEmail, InviteMailer, LogMailer};
use crate::routes::router;
use crate::storage::Storage;

const BOUNDARY: &str = "wishwall-test-boundary";
const PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake-png-body";

struct FailingMailer;

impl InviteMailer for FailingMailer {
    fn send_invite(&self, _email: &InviteEmail) -> anyhow::Result<()> {
        anyhow::bail!("smtp unreachable")
    }
}

struct TestApp {
    app: Router,
    state: AppState,
    upload_dir: PathBuf,
}

impl Drop for TestApp {
    fn drop(&mut self) {
        std::fs::remove_dir_all(&self.upload_dir).ok();
    }
}

impl TestApp {
    async fn new() -> Self {
        Self::with_mailer(Arc::new(LogMailer)).await
    }

    async fn with_mailer(mailer: Arc<dyn InviteMailer>) -> Self {
        let upload_dir = std::env::temp_dir().join(format!("wishwall-api-{}", Uuid::new_v4()));
        let state: AppState = Arc::new(AppStateInner {
            db: Database::open_in_memory().unwrap(),
            jwt_secret: "test-secret".into(),
            token_ttl: chrono::Duration::minutes(30),
            storage: Storage::new(upload_dir.clone(), 64 * 1024).await.unwrap(),
            mailer,
            frontend_url: "http://localhost:3000".into(),
        });

        Self {
            app: router(state.clone()),
            state,
            upload_dir,
        }
    }

    async fn raw(&self, req: Request<Body>) -> (StatusCode, Bytes) {
        let response = self.app.clone().oneshot(req).await.unwrap();
        let status = response.status();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        (status, body)
    }

    async fn request(&self, req: Request<Body>) -> (StatusCode, Value) {
        let (status, body) = self.raw(req).await;
        let value = if body.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body).unwrap()
        };
        (status, value)
    }

    async fn call(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let req = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        self.request(req).await
    }

    async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.call(Method::GET, uri, token, None).await
    }

    async fn post(&self, uri: &str, token: Option<&str>, body: Value) -> (StatusCode, Value) {
        self.call(Method::POST, uri, token, Some(body)).await
    }

    async fn delete(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.call(Method::DELETE, uri, token, None).await
    }

    async fn register(&self, email: &str) -> String {
        let (status, body) = self
            .post(
                "/api/v1/auth/register",
                None,
                json!({ "email": email, "password": "correct-horse", "full_name": "Test Admin" }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body["access_token"].as_str().unwrap().to_string()
    }

    async fn create_wall(&self, token: &str, title: &str) -> Value {
        let (status, body) = self
            .post("/api/v1/walls", Some(token), json!({ "title": title }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        body
    }

    /// Invites `email` and returns (contributor id, invite token).
    async fn invite(&self, admin: &str, wall: &Value, email: &str) -> (i64, String) {
        let (status, body) = self
            .post(
                "/api/v1/contributors/invite",
                Some(admin),
                json!({ "email": email, "wall_id": wall["id"] }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{body}");
        let id = body["id"].as_i64().unwrap();
        let token = self.state.db.get_contributor(id).unwrap().unwrap().invite_token;
        (id, token)
    }

    async fn post_content(&self, form: Form) -> (StatusCode, Value) {
        self.request(form.into_request()).await
    }

    fn stored_file(&self, url: &str) -> PathBuf {
        self.upload_dir.join(url.strip_prefix("/uploads/").unwrap())
    }
}

/// Minimal multipart/form-data body builder.
#[derive(Default)]
struct Form {
    body: Vec<u8>,
}

impl Form {
    fn text(mut self, name: &str, value: impl std::fmt::Display) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
        self
    }

    fn file(mut self, name: &str, filename: &str, mime: &str, data: &[u8]) -> Self {
        self.body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{filename}\"\r\nContent-Type: {mime}\r\n\r\n"
            )
            .as_bytes(),
        );
        self.body.extend_from_slice(data);
        self.body.extend_from_slice(b"\r\n");
        self
    }

    fn into_request(mut self) -> Request<Body> {
        self.body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        Request::builder()
            .method(Method::POST)
            .uri("/api/v1/content")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(self.body))
            .unwrap()
    }
}

fn text_post(wall: &Value, token: &str, text: &str) -> Form {
    Form::default()
        .text("wall_id", &wall["id"])
        .text("content_type", "text")
        .text("text", text)
        .text("invite_token", token)
}

fn slug(wall: &Value) -> &str {
    wall["unique_url"].as_str().unwrap()
}

fn passcode(wall: &Value) -> &str {
    wall["passcode"].as_str().unwrap()
}

// -- Auth --

#[tokio::test]
async fn test_register_login_and_me() {
    let t = TestApp::new().await;

    let (status, body) = t
        .post(
            "/api/v1/auth/register",
            None,
            json!({ "email": "Ann@Example.com", "password": "correct-horse", "full_name": "Ann" }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["user"]["email"], "ann@example.com");
    assert_eq!(body["user"]["is_active"], true);

    let (status, body) = t
        .post(
            "/api/v1/auth/register",
            None,
            json!({ "email": "ann@example.com", "password": "another-pass", "full_name": "Ann 2" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Email already registered");

    let (status, _) = t
        .post(
            "/api/v1/auth/register",
            None,
            json!({ "email": "bob@example.com", "password": "short", "full_name": "Bob" }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t
        .post(
            "/api/v1/auth/login",
            None,
            json!({ "email": "ann@example.com", "password": "wrong-password" }),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = t
        .post(
            "/api/v1/auth/login",
            None,
            json!({ "email": "ann@example.com", "password": "correct-horse" }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = body["access_token"].as_str().unwrap().to_string();

    let (status, body) = t.get("/api/v1/auth/me", Some(&token)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["full_name"], "Ann");

    let (status, _) = t.get("/api/v1/auth/me", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = t.get("/api/v1/auth/me", Some("not.a.jwt")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_malformed_json_is_bad_request() {
    let t = TestApp::new().await;
    let (status, body) = t
        .post("/api/v1/auth/login", None, json!({ "email": "a@example.com" }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_health_and_root() {
    let t = TestApp::new().await;
    let (status, body) = t.get("/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");

    let (status, body) = t.get("/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "WishWall API");
}

// -- Walls --

#[tokio::test]
async fn test_wall_admin_routes_require_owner() {
    let t = TestApp::new().await;
    let ann = t.register("ann@example.com").await;
    let bob = t.register("bob@example.com").await;

    let wall = t.create_wall(&ann, "Ann's birthday").await;
    assert_eq!(slug(&wall).len(), 12);
    assert!(slug(&wall).chars().all(|c| c.is_ascii_alphanumeric()));
    assert_eq!(passcode(&wall).len(), 6);
    assert!(passcode(&wall).chars().all(|c| c.is_ascii_digit()));

    let uri = format!("/api/v1/walls/{}", wall["id"]);

    let (status, _) = t.get(&uri, Some(&bob)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = t
        .call(Method::PUT, &uri, Some(&bob), Some(json!({ "title": "Mine now" })))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = t.delete(&uri, Some(&bob)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = t.get(&uri, Some(&ann)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Ann's birthday");

    let (status, body) = t
        .call(Method::PUT, &uri, Some(&ann), Some(json!({ "is_public": true })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_public"], true);
    assert_eq!(body["title"], "Ann's birthday");
    assert!(body["updated_at"].is_string());

    let (status, _) = t
        .call(Method::PUT, &uri, Some(&ann), Some(json!({ "title": "   " })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = t.get("/api/v1/walls/9999", Some(&ann)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (_, mine) = t.get("/api/v1/walls", Some(&ann)).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
    let (_, theirs) = t.get("/api/v1/walls", Some(&bob)).await;
    assert!(theirs.as_array().unwrap().is_empty());

    let (status, _) = t.delete(&uri, Some(&ann)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = t.get(&uri, Some(&ann)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_wall_slugs_are_unique() {
    let t = TestApp::new().await;
    let ann = t.register("ann@example.com").await;

    let mut slugs = HashSet::new();
    for i in 0..25 {
        let wall = t.create_wall(&ann, &format!("Wall {i}")).await;
        slugs.insert(slug(&wall).to_string());
    }
    assert_eq!(slugs.len(), 25);
}

#[tokio::test]
async fn test_create_wall_requires_title_and_auth() {
    let t = TestApp::new().await;
    let ann = t.register("ann@example.com").await;

    let (status, _) = t.post("/api/v1/walls", Some(&ann), json!({ "title": "" })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = t.post("/api/v1/walls", None, json!({ "title": "Nope" })).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_public_wall_checks_passcode() {
    let t = TestApp::new().await;
    let ann = t.register("ann@example.com").await;
    let wall = t.create_wall(&ann, "Farewell").await;
    let (_, token) = t.invite(&ann, &wall, "guest@example.com").await;
    let (status, _) = t.post_content(text_post(&wall, &token, "Good luck!")).await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = t
        .get(&format!("/api/v1/walls/public/{}?passcode=wrong", slug(&wall)), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t
        .get("/api/v1/walls/public/doesnotexist?passcode=123456", None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = t.get(&format!("/api/v1/walls/public/{}", slug(&wall)), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = t
        .get(
            &format!("/api/v1/walls/public/{}?passcode={}", slug(&wall), passcode(&wall)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["title"], "Farewell");
    assert!(body.get("passcode").is_none());
    assert!(body.get("admin_id").is_none());
    assert_eq!(body["contents"][0]["text"], "Good luck!");

    let (status, body) = t
        .get(
            &format!("/api/v1/walls/verify/{}?passcode={}", slug(&wall), passcode(&wall)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], wall["id"]);
}

// -- Contributors --

#[tokio::test]
async fn test_invite_rules_and_verify() {
    let t = TestApp::new().await;
    let ann = t.register("ann@example.com").await;
    let bob = t.register("bob@example.com").await;
    let wall = t.create_wall(&ann, "Retirement").await;

    let (status, body) = t
        .post(
            "/api/v1/contributors/invite",
            Some(&ann),
            json!({ "email": "carol@example.com", "wall_id": wall["id"] }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["email"], "carol@example.com");
    assert!(body["accepted_at"].is_null());
    assert!(body.get("invite_token").is_none());
    let carol_id = body["id"].as_i64().unwrap();

    let (status, body) = t
        .post(
            "/api/v1/contributors/invite",
            Some(&ann),
            json!({ "email": "CAROL@example.com", "wall_id": wall["id"] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Contributor already invited");

    let (status, _) = t
        .post(
            "/api/v1/contributors/invite",
            Some(&bob),
            json!({ "email": "dave@example.com", "wall_id": wall["id"] }),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t
        .post(
            "/api/v1/contributors/invite",
            Some(&ann),
            json!({ "email": "dave@example.com", "wall_id": 9999 }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = t
        .post(
            "/api/v1/contributors/invite",
            Some(&ann),
            json!({ "email": "not-an-email", "wall_id": wall["id"] }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let list_uri = format!("/api/v1/contributors/wall/{}", wall["id"]);
    let (status, body) = t.get(&list_uri, Some(&ann)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().unwrap().len(), 1);
    let (status, _) = t.get(&list_uri, Some(&bob)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let token = t.state.db.get_contributor(carol_id).unwrap().unwrap().invite_token;
    let (status, body) = t.get(&format!("/api/v1/contributors/verify/{token}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["id"], carol_id);
    assert_eq!(body["wall_id"], wall["id"]);

    let (status, _) = t.get("/api/v1/contributors/verify/bogus-token", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invite_succeeds_when_email_fails() {
    let t = TestApp::with_mailer(Arc::new(FailingMailer)).await;
    let ann = t.register("ann@example.com").await;
    let wall = t.create_wall(&ann, "Baby shower").await;

    let (status, _) = t
        .post(
            "/api/v1/contributors/invite",
            Some(&ann),
            json!({ "email": "carol@example.com", "wall_id": wall["id"] }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_join_by_passcode() {
    let t = TestApp::new().await;
    let ann = t.register("ann@example.com").await;
    let wall = t.create_wall(&ann, "Graduation").await;
    let (invited_id, invited_token) = t.invite(&ann, &wall, "carol@example.com").await;

    let join = |email: Option<&str>, code: &str| {
        let mut body = json!({ "wall_url": slug(&wall), "passcode": code });
        if let Some(email) = email {
            body["email"] = json!(email);
        }
        body
    };

    // Invited email reuses the existing row and token
    let (status, body) = t
        .post("/api/v1/contributors/join", None, join(Some("Carol@example.com"), passcode(&wall)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["contributor"]["id"], invited_id);
    assert_eq!(body["invite_token"], invited_token.as_str());
    assert!(body["contributor"]["accepted_at"].is_string());

    // New email gets a new contributor, stable across repeat joins
    let (_, first) = t
        .post("/api/v1/contributors/join", None, join(Some("erin@example.com"), passcode(&wall)))
        .await;
    let (_, again) = t
        .post("/api/v1/contributors/join", None, join(Some("erin@example.com"), passcode(&wall)))
        .await;
    assert_eq!(first["invite_token"], again["invite_token"]);
    assert_ne!(first["contributor"]["id"], invited_id);

    // No email: guest identity
    let (status, body) = t
        .post("/api/v1/contributors/join", None, join(None, passcode(&wall)))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["contributor"]["email"].as_str().unwrap().ends_with("@wishingwall.local"));

    let (status, _) = t
        .post("/api/v1/contributors/join", None, join(Some("erin@example.com"), "nope"))
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Revoked contributors cannot rejoin
    let (status, body) = t
        .call(
            Method::PATCH,
            &format!("/api/v1/contributors/{invited_id}"),
            Some(&ann),
            Some(json!({ "is_active": false })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["is_active"], false);

    let (status, _) = t
        .post("/api/v1/contributors/join", None, join(Some("carol@example.com"), passcode(&wall)))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_remove_contributor_cascades() {
    let t = TestApp::new().await;
    let ann = t.register("ann@example.com").await;
    let bob = t.register("bob@example.com").await;
    let wall = t.create_wall(&ann, "Anniversary").await;
    let (carol_id, carol) = t.invite(&ann, &wall, "carol@example.com").await;
    let (_, dave) = t.invite(&ann, &wall, "dave@example.com").await;

    t.post_content(text_post(&wall, &carol, "from carol")).await;
    t.post_content(text_post(&wall, &dave, "from dave")).await;

    let photo = |token: &str| {
        Form::default()
            .text("wall_id", &wall["id"])
            .text("content_type", "image")
            .text("invite_token", token)
            .file("image", "us.png", "image/png", PNG)
    };
    let (status, carols) = t.post_content(photo(&carol)).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, daves) = t.post_content(photo(&dave)).await;
    assert_eq!(status, StatusCode::CREATED);
    let carols_file = t.stored_file(carols["image_url"].as_str().unwrap());
    let daves_file = t.stored_file(daves["image_url"].as_str().unwrap());
    assert!(carols_file.exists());

    let uri = format!("/api/v1/contributors/{carol_id}");
    let (status, _) = t.delete(&uri, Some(&bob)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = t.delete(&uri, Some(&ann)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!carols_file.exists());
    assert!(daves_file.exists());

    let (_, contents) = t.get(&format!("/api/v1/content/wall/{}", wall["id"]), None).await;
    let remaining: Vec<&Value> = contents.as_array().unwrap().iter().collect();
    assert_eq!(remaining.len(), 2);
    assert!(remaining.iter().all(|c| c["id"] != carols["id"]));
    assert!(remaining.iter().any(|c| c["text"] == "from dave"));
    assert!(remaining.iter().any(|c| c["id"] == daves["id"]));

    let (status, _) = t.delete(&uri, Some(&ann)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// -- Content --

#[tokio::test]
async fn test_text_post_via_token() {
    let t = TestApp::new().await;
    let ann = t.register("ann@example.com").await;
    let wall = t.create_wall(&ann, "Wedding").await;
    let other = t.create_wall(&ann, "Other wall").await;
    let (_, token) = t.invite(&ann, &wall, "carol@example.com").await;

    let (status, body) = t
        .post_content(text_post(&wall, &token, "Congratulations!").text("author_name", "Aunt Carol"))
        .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["content_type"], "text");
    assert_eq!(body["author_name"], "Aunt Carol");
    assert!(body["image_url"].is_null());
    // Token holders already know who they are
    assert!(body.get("invite_token").is_none());
    assert!(body.get("contributor_email").is_none());

    // First post accepts the invite
    let (_, contributor) = t.get(&format!("/api/v1/contributors/verify/{token}"), None).await;
    assert!(contributor["accepted_at"].is_string());

    let missing_text = Form::default()
        .text("wall_id", &wall["id"])
        .text("content_type", "text")
        .text("invite_token", &token);
    let (status, body) = t.post_content(missing_text).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Text is required for this content type");

    let (status, _) = t.post_content(text_post(&wall, "bogus", "hi")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t.post_content(text_post(&other, &token, "wrong wall")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let no_credentials = Form::default()
        .text("wall_id", &wall["id"])
        .text("content_type", "text")
        .text("text", "anonymous");
    let (status, _) = t.post_content(no_credentials).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let bad_type = Form::default()
        .text("wall_id", &wall["id"])
        .text("content_type", "video")
        .text("invite_token", &token);
    let (status, _) = t.post_content(bad_type).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_revoked_contributor_cannot_post() {
    let t = TestApp::new().await;
    let ann = t.register("ann@example.com").await;
    let wall = t.create_wall(&ann, "Reunion").await;
    let (id, token) = t.invite(&ann, &wall, "carol@example.com").await;
    let uri = format!("/api/v1/contributors/{id}");

    t.call(Method::PATCH, &uri, Some(&ann), Some(json!({ "is_active": false })))
        .await;
    let (status, _) = t.post_content(text_post(&wall, &token, "let me in")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    // Passcode route with the same email is refused too
    let via_passcode = Form::default()
        .text("wall_id", &wall["id"])
        .text("content_type", "text")
        .text("text", "sneaky")
        .text("wall_url", slug(&wall))
        .text("wall_passcode", passcode(&wall))
        .text("contributor_email", "carol@example.com");
    let (status, _) = t.post_content(via_passcode).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    t.call(Method::PATCH, &uri, Some(&ann), Some(json!({ "is_active": true })))
        .await;
    let (status, _) = t.post_content(text_post(&wall, &token, "back again")).await;
    assert_eq!(status, StatusCode::CREATED);
}

#[tokio::test]
async fn test_image_posts_are_stored_and_served() {
    let t = TestApp::new().await;
    let ann = t.register("ann@example.com").await;
    let wall = t.create_wall(&ann, "Holiday").await;

    let gallery = Form::default()
        .text("wall_id", &wall["id"])
        .text("content_type", "images_text")
        .text("text", "Our trip")
        .text("wall_url", slug(&wall))
        .text("wall_passcode", passcode(&wall))
        .text("contributor_email", "erin@example.com")
        .file("images", "one.png", "image/png", PNG)
        .file("images", "two.PNG", "image/png", PNG);
    let (status, body) = t.post_content(gallery).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");

    let urls: Vec<String> = body["image_urls"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u.as_str().unwrap().to_string())
        .collect();
    assert_eq!(urls.len(), 2);
    for url in &urls {
        assert!(url.starts_with("/uploads/") && url.ends_with(".png"));
        assert!(t.stored_file(url).exists());
    }

    let (status, served) = t
        .raw(Request::builder().uri(&urls[0]).body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(&served[..], PNG);

    // Passcode posting registered erin as an accepted contributor
    let erin = t
        .state
        .db
        .get_contributor_by_email(wall["id"].as_i64().unwrap(), "erin@example.com")
        .unwrap()
        .unwrap();
    assert!(erin.accepted_at.is_some());

    let single = Form::default()
        .text("wall_id", &wall["id"])
        .text("content_type", "image")
        .text("invite_token", &erin.invite_token)
        .file("image", "cat.gif", "image/gif", b"GIF89a");
    let (status, body) = t.post_content(single).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert!(body["image_url"].as_str().unwrap().ends_with(".gif"));
    assert!(body["image_urls"].is_null());
}

#[tokio::test]
async fn test_image_rules_reject_before_writing() {
    let t = TestApp::new().await;
    let ann = t.register("ann@example.com").await;
    let wall = t.create_wall(&ann, "Holiday").await;
    let (_, token) = t.invite(&ann, &wall, "carol@example.com").await;

    let base = |content_type: &str| {
        Form::default()
            .text("wall_id", &wall["id"])
            .text("content_type", content_type)
            .text("invite_token", &token)
    };

    let (status, _) = t.post_content(base("images")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut too_many = base("images");
    for i in 0..21 {
        too_many = too_many.file("images", &format!("{i}.png"), "image/png", PNG);
    }
    let (status, body) = t.post_content(too_many).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Maximum 20 images allowed");

    let (status, _) = t.post_content(base("image")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let pdf = base("image").file("image", "doc.pdf", "application/pdf", b"%PDF-1.7");
    let (status, _) = t.post_content(pdf).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let huge = base("image").file("image", "big.png", "image/png", &vec![0u8; 64 * 1024 + 1]);
    let (status, _) = t.post_content(huge).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Image present but caption missing
    let no_caption = base("text_image").file("image", "a.png", "image/png", PNG);
    let (status, _) = t.post_content(no_caption).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let two_singles = base("image")
        .file("image", "a.png", "image/png", PNG)
        .file("image", "b.png", "image/png", PNG);
    let (status, body) = t.post_content(two_singles).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["detail"], "Only one image allowed");

    assert_eq!(std::fs::read_dir(&t.upload_dir).unwrap().count(), 0);
}

#[tokio::test]
async fn test_list_contents_newest_first() {
    let t = TestApp::new().await;
    let ann = t.register("ann@example.com").await;
    let wall = t.create_wall(&ann, "Countdown").await;
    let (_, token) = t.invite(&ann, &wall, "carol@example.com").await;

    for text in ["three", "two", "one"] {
        let (status, _) = t.post_content(text_post(&wall, &token, text)).await;
        assert_eq!(status, StatusCode::CREATED);
    }

    let (status, body) = t.get(&format!("/api/v1/content/wall/{}", wall["id"]), None).await;
    assert_eq!(status, StatusCode::OK);
    let texts: Vec<&str> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["text"].as_str().unwrap())
        .collect();
    assert_eq!(texts, vec!["one", "two", "three"]);

    let (status, _) = t.get("/api/v1/content/wall/9999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_only_author_deletes_content() {
    let t = TestApp::new().await;
    let ann = t.register("ann@example.com").await;
    let wall = t.create_wall(&ann, "Farewell").await;
    let (carol_id, carol) = t.invite(&ann, &wall, "carol@example.com").await;
    let (_, dave) = t.invite(&ann, &wall, "dave@example.com").await;

    let photo = Form::default()
        .text("wall_id", &wall["id"])
        .text("content_type", "image")
        .text("invite_token", &carol)
        .file("image", "us.jpg", "image/jpeg", b"\xff\xd8\xff\xe0jpeg");
    let (status, content) = t.post_content(photo).await;
    assert_eq!(status, StatusCode::CREATED);
    let stored = t.stored_file(content["image_url"].as_str().unwrap());
    assert!(stored.exists());

    let uri = format!("/api/v1/content/{}", content["id"]);

    let (status, _) = t.delete(&format!("{uri}?invite_token={dave}"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = t.delete(&uri, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = t.delete(&format!("{uri}?invite_token=bogus"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Revoked authors lose delete rights too
    t.call(
        Method::PATCH,
        &format!("/api/v1/contributors/{carol_id}"),
        Some(&ann),
        Some(json!({ "is_active": false })),
    )
    .await;
    let (status, _) = t.delete(&format!("{uri}?invite_token={carol}"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    t.call(
        Method::PATCH,
        &format!("/api/v1/contributors/{carol_id}"),
        Some(&ann),
        Some(json!({ "is_active": true })),
    )
    .await;

    let (status, _) = t.delete(&format!("{uri}?invite_token={carol}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!stored.exists());

    let (status, _) = t.delete(&format!("{uri}?invite_token={carol}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_delete_content_with_passcode_and_email() {
    let t = TestApp::new().await;
    let ann = t.register("ann@example.com").await;
    let wall = t.create_wall(&ann, "Office party").await;

    let note = Form::default()
        .text("wall_id", &wall["id"])
        .text("content_type", "text")
        .text("text", "See you all")
        .text("wall_url", slug(&wall))
        .text("wall_passcode", passcode(&wall))
        .text("contributor_email", "erin@example.com");
    let (status, content) = t.post_content(note).await;
    assert_eq!(status, StatusCode::CREATED);

    let base = format!(
        "/api/v1/content/{}?wall_url={}&wall_passcode={}",
        content["id"],
        slug(&wall),
        passcode(&wall)
    );

    // Passcode alone does not identify the author
    let (status, _) = t.delete(&base, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t
        .delete(&format!("{base}&contributor_email=frank@example.com"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = t
        .delete(&format!("{base}&contributor_email=erin@example.com"), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_guest_can_delete_own_post() {
    let t = TestApp::new().await;
    let ann = t.register("ann@example.com").await;
    let wall = t.create_wall(&ann, "Open house").await;

    let guest_post = || {
        Form::default()
            .text("wall_id", &wall["id"])
            .text("content_type", "image")
            .text("wall_url", slug(&wall))
            .text("wall_passcode", passcode(&wall))
            .file("image", "hello.png", "image/png", PNG)
    };

    // No email given: the post is filed under a generated guest identity
    let (status, first) = t.post_content(guest_post()).await;
    assert_eq!(status, StatusCode::CREATED, "{first}");
    let guest_email = first["contributor_email"].as_str().unwrap().to_string();
    let guest_token = first["invite_token"].as_str().unwrap().to_string();
    assert!(guest_email.ends_with("@wishingwall.local"));
    let first_file = t.stored_file(first["image_url"].as_str().unwrap());

    let (status, _) = t
        .delete(&format!("/api/v1/content/{}?invite_token={guest_token}", first["id"]), None)
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(!first_file.exists());

    // The passcode route works with the returned guest email as well
    let (status, second) = t.post_content(guest_post()).await;
    assert_eq!(status, StatusCode::CREATED);
    let (status, _) = t
        .delete(
            &format!(
                "/api/v1/content/{}?wall_url={}&wall_passcode={}&contributor_email={}",
                second["id"],
                slug(&wall),
                passcode(&wall),
                second["contributor_email"].as_str().unwrap()
            ),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn test_delete_wall_cascades() {
    let t = TestApp::new().await;
    let ann = t.register("ann@example.com").await;
    let wall = t.create_wall(&ann, "Last day").await;
    let (contributor_id, token) = t.invite(&ann, &wall, "carol@example.com").await;

    let photo = Form::default()
        .text("wall_id", &wall["id"])
        .text("content_type", "text_image")
        .text("text", "Bye!")
        .text("invite_token", &token)
        .file("image", "wave.webp", "image/webp", b"RIFFxxxxWEBP");
    let (status, content) = t.post_content(photo).await;
    assert_eq!(status, StatusCode::CREATED);
    let stored = t.stored_file(content["image_url"].as_str().unwrap());
    assert!(stored.exists());

    let (status, _) = t.delete(&format!("/api/v1/walls/{}", wall["id"]), Some(&ann)).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    assert!(t.state.db.get_contributor(contributor_id).unwrap().is_none());
    let (status, _) = t.get(&format!("/api/v1/contributors/verify/{token}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = t.get(&format!("/api/v1/content/wall/{}", wall["id"]), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(!stored.exists());
}
