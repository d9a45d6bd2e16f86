#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{header, Method, Request, StatusCode},
};
use meme_marketplace::{
    config::{BootstrapAdmin, Config},
    domain::{DocumentStore, GeneratedAsset, ImageGenerator, Thumbnailer},
    errors::IntegrationError,
    memory::{InMemoryDocumentStore, InMemoryFileStorage},
    routes::create_router,
    startup, AppState,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub const ADMIN_EMAIL: &str = "root@memes.test";
pub const ADMIN_PASSWORD: &str = "root-password-123";
pub const PASSWORD: &str = "correct-horse-battery";
pub const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 1, 2, 3];
const BOUNDARY: &str = "meme-test-boundary";

struct StubGenerator;

#[async_trait]
impl ImageGenerator for StubGenerator {
    async fn generate(&self, _prompt: &str) -> Result<GeneratedAsset, IntegrationError> {
        Ok(GeneratedAsset { data: PNG.to_vec(), content_type: "image/png".to_string() })
    }
}

struct StubThumbnailer;

#[async_trait]
impl Thumbnailer for StubThumbnailer {
    async fn thumbnail(&self, _video: &[u8], _extension: &str) -> Result<Vec<u8>, IntegrationError> {
        Ok(PNG.to_vec())
    }
}

/// JSON bodies parse; anything else (extractor rejections are plain text) becomes a string.
fn parse_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes).unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

pub struct TestApp {
    pub state: Arc<AppState>,
    pub files: Arc<InMemoryFileStorage>,
}

/// A part of a multipart body: a text field or a file.
pub enum Part<'a> {
    Text(&'a str, &'a str),
    File { name: &'a str, file_name: &'a str, content_type: &'a str, data: &'a [u8] },
}

/// State over `store` with a bootstrap super admin, not yet seeded.
pub fn build_state(store: Arc<dyn DocumentStore>, admin: BootstrapAdmin) -> (AppState, Arc<InMemoryFileStorage>) {
    let mut config = Config::in_memory("integration-test-secret");
    config.bootstrap_admin = Some(admin);
    let files = Arc::new(InMemoryFileStorage::new());
    let state = AppState {
        config,
        store,
        file_storage: files.clone(),
        image_generator: Arc::new(StubGenerator),
        thumbnailer: Arc::new(StubThumbnailer),
    };
    (state, files)
}

pub fn root_admin() -> BootstrapAdmin {
    BootstrapAdmin {
        email: ADMIN_EMAIL.to_string(),
        username: "root".to_string(),
        password: ADMIN_PASSWORD.to_string(),
    }
}

pub async fn spawn_app_with_store(store: Arc<dyn DocumentStore>) -> TestApp {
    let (state, files) = build_state(store, root_admin());
    startup::seed(&state).await.unwrap();
    TestApp { state: Arc::new(state), files }
}

pub async fn spawn_app() -> TestApp {
    spawn_app_with_store(Arc::new(InMemoryDocumentStore::new())).await
}

impl TestApp {
    async fn send(&self, request: Request<Body>) -> (StatusCode, Vec<u8>) {
        let response = create_router(self.state.clone()).oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    pub async fn raw(&self, method: Method, uri: &str, token: Option<&str>) -> (StatusCode, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn json(&self, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };
        let (status, bytes) = self.send(builder.body(body).unwrap()).await;
        (status, parse_body(&bytes))
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.json(Method::GET, uri, token, None).await
    }

    pub async fn multipart(&self, uri: &str, token: &str, parts: &[Part<'_>]) -> (StatusCode, Value) {
        let mut body: Vec<u8> = Vec::new();
        for part in parts {
            body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
            match part {
                Part::Text(name, value) => {
                    body.extend_from_slice(
                        format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n{}\r\n", name, value).as_bytes(),
                    );
                }
                Part::File { name, file_name, content_type, data } => {
                    body.extend_from_slice(
                        format!(
                            "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {}\r\n\r\n",
                            name, file_name, content_type
                        )
                        .as_bytes(),
                    );
                    body.extend_from_slice(data);
                    body.extend_from_slice(b"\r\n");
                }
            }
        }
        body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", token))
            .header(header::CONTENT_TYPE, format!("multipart/form-data; boundary={}", BOUNDARY))
            .body(Body::from(body))
            .unwrap();
        let (status, bytes) = self.send(request).await;
        (status, parse_body(&bytes))
    }

    /// Registers `username` and returns (token, user id).
    pub async fn register(&self, username: &str) -> (String, String) {
        let (status, body) = self
            .json(
                Method::POST,
                "/auth/register",
                None,
                Some(json!({
                    "username": username,
                    "email": format!("{}@memes.test", username),
                    "password": PASSWORD,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register {}: {}", username, body);
        (
            body["token"].as_str().unwrap().to_string(),
            body["user"]["user_id"].as_str().unwrap().to_string(),
        )
    }

    /// Registers a user whose profile is public.
    pub async fn register_public(&self, username: &str) -> (String, String) {
        let (token, id) = self.register(username).await;
        let (status, _) = self
            .json(Method::PATCH, "/users/me", Some(&token), Some(json!({ "is_public": true })))
            .await;
        assert_eq!(status, StatusCode::OK);
        (token, id)
    }

    pub async fn admin_token(&self) -> String {
        let (status, body) = self
            .json(
                Method::POST,
                "/auth/login",
                None,
                Some(json!({ "email": ADMIN_EMAIL, "password": ADMIN_PASSWORD })),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "admin login: {}", body);
        body["token"].as_str().unwrap().to_string()
    }

    /// Uploads a PNG meme and returns its id.
    pub async fn upload_meme(&self, token: &str, title: &str, is_public: bool) -> String {
        let (status, body) = self
            .multipart(
                "/memes",
                token,
                &[
                    Part::Text("title", title),
                    Part::Text("tags", "cats, funny"),
                    Part::Text("is_public", if is_public { "true" } else { "false" }),
                    Part::File { name: "image", file_name: "meme.png", content_type: "image/png", data: PNG },
                ],
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "upload: {}", body);
        body["meme_id"].as_str().unwrap().to_string()
    }
}
