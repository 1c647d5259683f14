use axum::extract::{Multipart, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use docqa_core::error::FILE_TOO_LARGE_MESSAGE;
use docqa_core::{
    router, AnswerBackend, ChatCompletionsModel, ChatSession, CycleOutcome, DocumentStoreConfig,
    ErrorKind, Gateway, GatewayClient, GatewayConfig, LanguageModelConfig, ListFilesRequest,
    QuestionFlow, Role, ServerConfig, SupavecStore,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::{tempdir, TempDir};

const API_KEY: &str = "test-key";

#[derive(Default)]
struct Upstream {
    uploads: AtomicUsize,
    listings: AtomicUsize,
    searches: AtomicUsize,
    completions: AtomicUsize,
    last_auth: Mutex<Option<String>>,
    last_upload: Mutex<Option<(String, String, Vec<u8>)>>,
    last_search: Mutex<Option<Value>>,
    last_listing: Mutex<Option<Value>>,
    last_prompt: Mutex<Option<String>>,
}

impl Upstream {
    fn remember_auth(&self, headers: &HeaderMap) {
        let auth = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        *self.last_auth.lock().expect("lock") = auth;
    }
}

async fn fake_upload_file(
    State(upstream): State<Arc<Upstream>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    upstream.uploads.fetch_add(1, Ordering::SeqCst);
    upstream.remember_auth(&headers);
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.file_name().unwrap_or_default().to_string();
        let mime = field.content_type().unwrap_or_default().to_string();
        let bytes = field.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
        *upstream.last_upload.lock().expect("lock") = Some((name, mime, bytes));
    }
    Json(json!({"success": true, "message": "File uploaded", "file_id": "up-1"})).into_response()
}

async fn fake_upload_text(
    State(upstream): State<Arc<Upstream>>,
    Json(body): Json<Value>,
) -> Response {
    upstream.uploads.fetch_add(1, Ordering::SeqCst);
    let name = body["name"].as_str().unwrap_or_default();
    Json(json!({"success": true, "file_id": format!("txt-{name}")})).into_response()
}

async fn fake_user_files(
    State(upstream): State<Arc<Upstream>>,
    Json(body): Json<Value>,
) -> Response {
    upstream.listings.fetch_add(1, Ordering::SeqCst);
    *upstream.last_listing.lock().expect("lock") = Some(body.clone());
    if body["pagination"]["offset"] == json!(999) {
        return (StatusCode::OK, "not json at all").into_response();
    }
    Json(json!({
        "success": true,
        "results": [
            {
                "file_id": "f1",
                "file_name": "handbook.pdf",
                "created_at": "2024-05-02T09:00:00+00:00",
                "type": "file"
            },
            {
                "file_id": "f2",
                "file_name": "handbook.pdf",
                "created_at": "2024-05-01T09:00:00+00:00",
                "type": "file"
            }
        ]
    }))
    .into_response()
}

async fn fake_embeddings(
    State(upstream): State<Arc<Upstream>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    upstream.searches.fetch_add(1, Ordering::SeqCst);
    upstream.remember_auth(&headers);
    *upstream.last_search.lock().expect("lock") = Some(body.clone());
    match body["query"].as_str() {
        Some("explode") => {
            let body = Json(json!({"error": "db down"}));
            (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
        }
        Some("nothing") => Json(json!({"success": true, "documents": []})).into_response(),
        _ => Json(json!({
            "success": true,
            "documents": [
                {"content": "Refunds are accepted within 30 days.", "file_id": "f1"},
                {"content": "Store credit is offered after 30 days.", "file_id": "f2"}
            ]
        }))
        .into_response(),
    }
}

async fn fake_chat(State(upstream): State<Arc<Upstream>>, Json(body): Json<Value>) -> Response {
    upstream.completions.fetch_add(1, Ordering::SeqCst);
    let prompt = body["messages"][1]["content"].as_str().unwrap_or_default().to_string();
    *upstream.last_prompt.lock().expect("lock") = Some(prompt.clone());
    if prompt.contains("Question: fail") {
        return (StatusCode::SERVICE_UNAVAILABLE, "model overloaded").into_response();
    }
    Json(json!({
        "id": "chatcmpl-1",
        "model": body["model"],
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": "**Answer** Refunds within 30 days."}
        }]
    }))
    .into_response()
}

async fn spawn(app: Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr
}

struct Harness {
    upstream: Arc<Upstream>,
    gateway_addr: SocketAddr,
    staging: TempDir,
}

impl Harness {
    fn api(&self) -> String {
        format!("http://{}/api", self.gateway_addr)
    }

    fn client(&self) -> GatewayClient {
        GatewayClient::new(&self.api(), Duration::from_secs(5)).expect("client")
    }

    fn staging_is_empty(&self) -> bool {
        count_entries(self.staging.path()) == 0
    }
}

fn count_entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}

async fn harness(max_upload_bytes: u64) -> Harness {
    let upstream = Arc::new(Upstream::default());
    let fake = Router::new()
        .route("/upload_file", post(fake_upload_file))
        .route("/upload_text", post(fake_upload_text))
        .route("/user_files", post(fake_user_files))
        .route("/embeddings", post(fake_embeddings))
        .route("/chat", post(fake_chat))
        .with_state(upstream.clone());
    let upstream_addr = spawn(fake).await;

    let store = SupavecStore::new(&DocumentStoreConfig {
        base_url: format!("http://{upstream_addr}"),
        api_key: Some(API_KEY.to_string()),
        timeout: Duration::from_secs(5),
    })
    .expect("store");
    let model = ChatCompletionsModel::new(&LanguageModelConfig {
        url: format!("http://{upstream_addr}/chat"),
        model: "llama".to_string(),
        api_key: None,
        timeout: Duration::from_secs(5),
    })
    .expect("model");

    let staging = tempdir().expect("tempdir");
    let gateway = Gateway::new(
        store,
        model,
        GatewayConfig {
            upstream_timeout: Duration::from_secs(5),
            staging_dir: staging.path().to_path_buf(),
            max_upload_bytes,
        },
    );
    let app = router(Arc::new(gateway), &ServerConfig::default()).expect("router");
    let gateway_addr = spawn(app).await;

    Harness {
        upstream,
        gateway_addr,
        staging,
    }
}

fn multipart_file(name: &str, mime: &str, bytes: Vec<u8>) -> reqwest::multipart::Form {
    let part = reqwest::multipart::Part::bytes(bytes)
        .file_name(name.to_string())
        .mime_str(mime)
        .expect("mime");
    reqwest::multipart::Form::new().part("file", part)
}

#[tokio::test]
async fn question_cycle_runs_end_to_end_through_the_gateway() {
    let harness = harness(1024).await;
    let flow = QuestionFlow::new(harness.client());
    let session = ChatSession::new();
    session.toggle_selection("f1");
    session.toggle_selection("f2");

    let outcome = flow.submit(&session, "refund policy").await.expect("cycle");
    assert!(outcome.is_answered());

    let transcript = session.transcript();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].role, Role::User);
    assert_eq!(transcript[1].role, Role::Assistant);
    assert_eq!(transcript[1].content, "#### Answer  Refunds within 30 days.");

    let search = harness.upstream.last_search.lock().expect("lock").clone().expect("search body");
    assert_eq!(search["k"], json!(3));
    assert_eq!(search["file_ids"], json!(["f1", "f2"]));
    assert_eq!(harness.upstream.last_auth.lock().expect("lock").as_deref(), Some(API_KEY));

    let prompt = harness.upstream.last_prompt.lock().expect("lock").clone().expect("prompt");
    assert!(prompt.starts_with(concat!(
        "Context from documents: Refunds are accepted within 30 days.\n\n",
        "Store credit is offered after 30 days.\n\n",
        "Question: refund policy"
    )));
}

#[tokio::test]
async fn upstream_search_failure_yields_one_system_error_and_no_generation() {
    let harness = harness(1024).await;
    let flow = QuestionFlow::new(harness.client());
    let session = ChatSession::new();
    session.select("f1");

    let outcome = flow.submit(&session, "explode").await.expect("cycle");
    match outcome {
        CycleOutcome::SearchFailed { error } => assert_eq!(error.kind(), ErrorKind::UpstreamError),
        other => panic!("unexpected outcome: {other:?}"),
    }

    let transcript = session.transcript();
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0].role, Role::SystemError);
    assert_eq!(harness.upstream.completions.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_search_result_still_reaches_the_model() {
    let harness = harness(1024).await;
    let flow = QuestionFlow::new(harness.client());
    let session = ChatSession::new();
    session.select("f1");

    let outcome = flow.submit(&session, "nothing").await.expect("cycle");
    assert!(outcome.is_answered());
    assert_eq!(harness.upstream.completions.load(Ordering::SeqCst), 1);

    let prompt = harness.upstream.last_prompt.lock().expect("lock").clone().expect("prompt");
    assert!(prompt.starts_with("Context from documents: \n\nQuestion: nothing"));
}

#[tokio::test]
async fn model_failure_is_reported_as_generation_failed() {
    let harness = harness(1024).await;
    let client = harness.client();

    let error = client.ask("fail", "ctx").await.expect_err("model down");
    assert_eq!(error.kind(), ErrorKind::GenerationFailed);
    assert!(error.detail().is_some_and(|detail| detail.contains("model overloaded")));
}

#[tokio::test]
async fn search_without_files_or_with_zero_k_is_rejected_locally() {
    let harness = harness(1024).await;
    let http = reqwest::Client::new();

    for body in [
        json!({"query": "refund policy"}),
        json!({"query": "refund policy", "file_ids": [], "k": 3}),
        json!({"query": "refund policy", "file_ids": ["f1"], "k": 0}),
    ] {
        let response = http
            .post(format!("{}/search", harness.api()))
            .json(&body)
            .send()
            .await
            .expect("send");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let error: Value = response.json().await.expect("json");
        assert_eq!(error["code"], json!("invalid_input"));
    }
    assert_eq!(harness.upstream.searches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn upload_is_forwarded_and_staging_is_cleaned() {
    let harness = harness(1024).await;
    let http = reqwest::Client::new();

    let response = http
        .post(format!("{}/upload", harness.api()))
        .multipart(multipart_file("notes.txt", "text/plain", b"hello world".to_vec()))
        .send()
        .await
        .expect("send");
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["file_id"], json!("up-1"));
    assert_eq!(body["success"], json!(true));

    let forwarded = harness.upstream.last_upload.lock().expect("lock").clone();
    assert_eq!(
        forwarded,
        Some(("notes.txt".to_string(), "text/plain".to_string(), b"hello world".to_vec()))
    );
    assert!(harness.staging_is_empty());
}

#[tokio::test]
async fn disallowed_or_oversized_uploads_never_reach_upstream() {
    let harness = harness(8).await;
    let http = reqwest::Client::new();

    let response = http
        .post(format!("{}/upload", harness.api()))
        .multipart(multipart_file("photo.png", "image/png", vec![1, 2, 3]))
        .send()
        .await
        .expect("send");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["code"], json!("unsupported_type"));

    let response = http
        .post(format!("{}/upload", harness.api()))
        .multipart(multipart_file("big.pdf", "application/pdf", vec![0; 64]))
        .send()
        .await
        .expect("send");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["error"], json!(FILE_TOO_LARGE_MESSAGE));

    let response = http
        .post(format!("{}/upload", harness.api()))
        .multipart(reqwest::multipart::Form::new().text("note", "no file here"))
        .send()
        .await
        .expect("send");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["error"], json!("No file uploaded"));

    assert_eq!(harness.upstream.uploads.load(Ordering::SeqCst), 0);
    assert!(harness.staging_is_empty());
}

#[tokio::test]
async fn upload_text_requires_name_and_contents() {
    let harness = harness(1024).await;
    let http = reqwest::Client::new();

    let response = http
        .post(format!("{}/upload-text", harness.api()))
        .json(&json!({"name": "memo"}))
        .send()
        .await
        .expect("send");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let receipt = harness
        .client()
        .upload_text("memo", "Quarterly numbers")
        .await
        .expect("upload text");
    assert_eq!(receipt.file_id, "txt-memo");
    assert_eq!(harness.upstream.uploads.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn listing_uses_defaults_and_is_repeatable() {
    let harness = harness(1024).await;
    let http = reqwest::Client::new();

    let first: Value = http
        .get(format!("{}/files", harness.api()))
        .send()
        .await
        .expect("send")
        .json()
        .await
        .expect("json");
    let listing = harness.upstream.last_listing.lock().expect("lock").clone().expect("body");
    assert_eq!(listing["pagination"], json!({"limit": 10, "offset": 0}));
    assert_eq!(listing["order_dir"], json!("desc"));

    let client = harness.client();
    let request = ListFilesRequest::default();
    let second = client.list_files(&request).await.expect("list");
    let third = client.list_files(&request).await.expect("list");
    assert_eq!(second, third);

    let ids: Vec<_> = second.iter().map(|file| file.file_id.as_str()).collect();
    assert_eq!(ids, vec!["f1", "f2"]);
    assert_eq!(first["results"][0]["file_id"], json!("f1"));
    assert_eq!(first["results"][0]["type"], json!("file"));
}

#[tokio::test]
async fn malformed_upstream_json_and_bad_params_are_normalized() {
    let harness = harness(1024).await;
    let http = reqwest::Client::new();

    let response = http
        .get(format!("{}/files?offset=999", harness.api()))
        .send()
        .await
        .expect("send");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["code"], json!("upstream_error"));
    assert!(body["details"].as_str().is_some_and(|d| d.contains("malformed")));

    let response = http
        .get(format!("{}/files?order_dir=sideways", harness.api()))
        .send()
        .await
        .expect("send");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = http
        .get(format!("{}/files?limit=abc", harness.api()))
        .send()
        .await
        .expect("send");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["code"], json!("invalid_input"));
}

#[tokio::test]
async fn upstream_failures_are_500_and_keep_their_code() {
    let harness = harness(1024).await;
    let http = reqwest::Client::new();

    let response = http
        .post(format!("{}/search", harness.api()))
        .json(&json!({"query": "explode", "file_ids": ["f1"], "k": 3}))
        .send()
        .await
        .expect("send");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["code"], json!("upstream_error"));
    assert!(body["details"].as_str().is_some_and(|d| d.contains("db down")));

    let response = http
        .post(format!("{}/ask", harness.api()))
        .json(&json!({"question": "fail", "context": "ctx"}))
        .send()
        .await
        .expect("send");
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["code"], json!("generation_failed"));
}

#[tokio::test]
async fn cors_allows_the_configured_frontend() {
    let harness = harness(1024).await;
    let http = reqwest::Client::new();

    let response = http
        .get(format!("http://{}/health", harness.gateway_addr))
        .header("origin", "http://localhost:3000")
        .send()
        .await
        .expect("send");
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get("access-control-allow-origin")
            .and_then(|value| value.to_str().ok()),
        Some("http://localhost:3000")
    );
    let body: Value = response.json().await.expect("json");
    assert_eq!(body["status"], json!("ok"));
}
