//! End-to-end tests driving the router with in-process providers

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tower::ServiceExt;

use invoice_rag::processing::run_cleanup;
use invoice_rag::providers::{EmbeddingProvider, LlmProvider};
use invoice_rag::server::{router, state::AppState};
use invoice_rag::types::response::{
    GREETING_WITHOUT_FILE, GREETING_WITH_FILE, NOT_INITIALIZED, UPLOAD_FIRST,
};
use invoice_rag::{ProcessingStatus, RagConfig, Result};

const INVOICE: &str = "Invoice number: INV-001\nVendor: ACME Corp\nDate: 2024-03-01\n\nTotal due: $1,250.00\n";
const ANSWER: &str = "The total due is $1,250.00.";
const BOUNDARY: &str = "invoice-rag-test-boundary";

/// Counts a few invoice keywords; the bias dimension keeps every vector non-zero
struct KeywordEmbedder;

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let lower = text.to_lowercase();
        let mut vector = vec![1.0];
        for keyword in ["invoice", "vendor", "total", "due", "date"] {
            vector.push(lower.matches(keyword).count() as f32);
        }
        Ok(vector)
    }

    fn name(&self) -> &str {
        "keyword"
    }
}

struct CannedLlm;

#[async_trait]
impl LlmProvider for CannedLlm {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if prompt.contains("Original question:") {
            Ok("1. How much is due on the invoice?\n2. What is the invoice total?".to_string())
        } else {
            Ok(ANSWER.to_string())
        }
    }

    fn name(&self) -> &str {
        "canned"
    }

    fn model(&self) -> &str {
        "canned-1"
    }
}

fn test_config(root: &Path) -> RagConfig {
    let mut config = RagConfig::default();
    config.storage.uploads_dir = root.join("uploads");
    config.storage.index_root = root.join("chroma_db");
    config
}

fn test_state(root: &Path) -> AppState {
    AppState::with_providers(test_config(root), Arc::new(KeywordEmbedder), Arc::new(CannedLlm))
        .unwrap()
}

/// One browser: shares the app and carries its session cookie between requests
struct Client {
    app: Router,
    cookie: Option<String>,
}

impl Client {
    fn new(app: Router) -> Self {
        Self { app, cookie: None }
    }

    async fn send(&mut self, mut request: Request<Body>) -> (StatusCode, Value) {
        if let Some(cookie) = &self.cookie {
            request
                .headers_mut()
                .insert(header::COOKIE, cookie.parse().unwrap());
        }

        let response = self.app.clone().oneshot(request).await.unwrap();
        if let Some(set_cookie) = response.headers().get(header::SET_COOKIE) {
            let pair = set_cookie.to_str().unwrap().split(';').next().unwrap();
            self.cookie = Some(pair.to_string());
        }

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    async fn upload(&mut self, filename: &str, data: &str) -> (StatusCode, Value) {
        let body = format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{f}\"\r\nContent-Type: application/octet-stream\r\n\r\n{d}\r\n--{b}--\r\n",
            b = BOUNDARY,
            f = filename,
            d = data
        );
        let request = Request::post("/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={}", BOUNDARY),
            )
            .body(Body::from(body))
            .unwrap();
        self.send(request).await
    }

    async fn ask(&mut self, question: &str) -> (StatusCode, Value) {
        let request = Request::post("/")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from(format!("question={}", form_encode(question))))
            .unwrap();
        self.send(request).await
    }

    async fn process(&mut self) -> (StatusCode, Value) {
        self.send(Request::post("/process").body(Body::empty()).unwrap())
            .await
    }

    async fn status(&mut self) -> Value {
        self.send(Request::get("/processing_status").body(Body::empty()).unwrap())
            .await
            .1
    }

    /// Poll until the status is terminal
    async fn wait_for_result(&mut self) -> Value {
        for _ in 0..200 {
            let status = self.status().await;
            if matches!(status["status"].as_str(), Some("completed") | Some("failed")) {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        panic!("processing did not finish");
    }
}

fn form_encode(value: &str) -> String {
    value
        .bytes()
        .map(|b| match b {
            b' ' => "+".to_string(),
            b if b.is_ascii_alphanumeric() || b"-_.".contains(&b) => (b as char).to_string(),
            b => format!("%{:02X}", b),
        })
        .collect()
}

fn upload_names(root: &Path) -> Vec<String> {
    std::fs::read_dir(root.join("uploads"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect()
}

#[tokio::test]
async fn test_endpoint_responds() {
    let dir = tempfile::tempdir().unwrap();
    let mut client = Client::new(router(test_state(dir.path())));

    let (status, body) = client
        .send(Request::get("/test").body(Body::empty()).unwrap())
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Test successful");
}

#[tokio::test]
async fn test_index_page_served() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path()));

    let response = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("<form id=\"chat-form\">"));
}

#[tokio::test]
async fn test_chat_script_served() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path()));

    let response = app
        .oneshot(Request::get("/static/script.js").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("/processing_status"));
}

#[tokio::test]
async fn test_query_without_upload_asks_for_file() {
    let dir = tempfile::tempdir().unwrap();
    let mut client = Client::new(router(test_state(dir.path())));

    let (status, body) = client.ask("What is the total?").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bot_response"], UPLOAD_FIRST);
    assert_eq!(body["source_documents"], Value::Array(vec![]));

    let (_, body) = client.ask("hello there").await;
    assert_eq!(body["bot_response"], GREETING_WITHOUT_FILE);
}

#[tokio::test]
async fn test_process_without_upload_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let mut client = Client::new(router(test_state(dir.path())));

    let (status, body) = client.process().await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file uploaded");
    assert_eq!(client.status().await["status"], "not started");
}

#[tokio::test]
async fn test_upload_without_file_part() {
    let dir = tempfile::tempdir().unwrap();
    let mut client = Client::new(router(test_state(dir.path())));

    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"note\"\r\n\r\nhello\r\n--{b}--\r\n",
        b = BOUNDARY
    );
    let request = Request::post("/upload")
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", BOUNDARY),
        )
        .body(Body::from(body))
        .unwrap();

    let (status, body) = client.send(request).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No file part");

    let (status, body) = client.upload("", "data").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], "No selected file");
}

#[tokio::test]
async fn test_upload_process_and_answer() {
    let dir = tempfile::tempdir().unwrap();
    let mut client = Client::new(router(test_state(dir.path())));

    let (status, body) = client.upload("invoice.txt", INVOICE).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "File uploaded successfully");

    let names = upload_names(dir.path());
    assert_eq!(names.len(), 1);
    assert!(names[0].ends_with("_invoice.txt"));

    let (_, body) = client.ask("What is the total?").await;
    assert_eq!(body["bot_response"], NOT_INITIALIZED);

    let (status, body) = client.process().await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Processing started");

    let result = client.wait_for_result().await;
    assert_eq!(result["status"], "completed", "{}", result);
    let stages: Vec<&str> = result["stages"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["status"].as_str().unwrap())
        .collect();
    assert_eq!(
        stages,
        vec!["started", "processing", "processing_2", "processing_3", "completed"]
    );

    let (status, body) = client.ask("What is the total due?").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bot_response"], ANSWER);
    let sources = body["source_documents"].as_array().unwrap();
    assert!(!sources.is_empty());
    for source in sources {
        assert!(source.as_str().unwrap().ends_with("..."));
    }

    let (_, body) = client.ask("hi").await;
    assert_eq!(body["bot_response"], GREETING_WITH_FILE);
}

#[tokio::test]
async fn test_second_upload_supersedes_first() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    let mut client = Client::new(router(state.clone()));

    client.upload("first.txt", INVOICE).await;
    client.process().await;
    assert_eq!(client.wait_for_result().await["status"], "completed");
    assert_eq!(state.chain_count(), 1);
    let first = upload_names(dir.path()).remove(0);

    let (status, _) = client.upload("second.txt", INVOICE).await;
    assert_eq!(status, StatusCode::OK);

    let names = upload_names(dir.path());
    assert_eq!(names.len(), 1);
    assert_ne!(names[0], first);
    assert!(names[0].ends_with("_second.txt"));
    assert!(state.qa_chain(&first).is_none());
    assert_eq!(state.chain_count(), 0);

    let (_, body) = client.ask("What is the total?").await;
    assert_eq!(body["bot_response"], NOT_INITIALIZED);
}

#[tokio::test]
async fn test_failed_upload_keeps_previous_document() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());
    let mut client = Client::new(router(state.clone()));

    client.upload("first.txt", INVOICE).await;
    client.process().await;
    assert_eq!(client.wait_for_result().await["status"], "completed");
    let first = upload_names(dir.path()).remove(0);

    // Storage name exceeds the filesystem's 255-byte limit
    let long_name = format!("{}.txt", "a".repeat(300));
    let (status, body) = client.upload(&long_name, INVOICE).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["error"]
        .as_str()
        .unwrap()
        .starts_with("File upload failed: "));

    assert_eq!(upload_names(dir.path()), vec![first.clone()]);
    assert!(state.qa_chain(&first).is_some());
    assert_eq!(client.status().await["status"], "completed");

    let (status, body) = client.ask("What is the total?").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["bot_response"], ANSWER);
}

#[tokio::test]
async fn test_concurrent_documents_keep_their_own_status() {
    let dir = tempfile::tempdir().unwrap();
    let app = router(test_state(dir.path()));
    let mut good = Client::new(app.clone());
    let mut bad = Client::new(app);

    good.upload("invoice.txt", INVOICE).await;
    bad.upload("payload.exe", "MZ not a document").await;
    good.process().await;
    bad.process().await;

    let (good_result, bad_result) = tokio::join!(good.wait_for_result(), bad.wait_for_result());

    assert_eq!(good_result["status"], "completed");
    assert!(good_result.get("error").is_none());

    assert_eq!(bad_result["status"], "failed");
    assert!(bad_result["error"]
        .as_str()
        .unwrap()
        .contains("Unsupported file type"));

    let (_, body) = good.ask("What is the total?").await;
    assert_eq!(body["bot_response"], ANSWER);
    let (_, body) = bad.ask("What is the total?").await;
    assert_eq!(body["bot_response"], NOT_INITIALIZED);
}

#[tokio::test]
async fn test_cleanup_purges_expired_documents_and_chains() {
    let dir = tempfile::tempdir().unwrap();
    let state = test_state(dir.path());

    let stored = state.uploads().save("invoice.txt", INVOICE.as_bytes()).await.unwrap();
    state.job_queue().submit(&stored.filename).unwrap();

    for _ in 0..200 {
        let status = state.job_queue().status(&stored.filename).unwrap().status;
        if status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    assert_eq!(
        state.job_queue().status(&stored.filename).unwrap().status,
        ProcessingStatus::Completed
    );
    assert!(state.qa_chain(&stored.filename).is_some());

    // Nothing is old enough yet
    let report = run_cleanup(&state, SystemTime::now()).await;
    assert!(report.removed.is_empty());
    assert_eq!(state.chain_count(), 1);

    let later = SystemTime::now() + Duration::from_secs(2 * 86_400);
    let report = run_cleanup(&state, later).await;
    assert_eq!(report.removed.len(), 2);
    assert!(report.removed.contains(&stored.filename));
    assert!(!state.uploads().exists(&stored.filename));
    assert_eq!(state.chain_count(), 0);
}
