//! HTTP API tests: the router runs in-process on a free port with
//! deterministic providers.

use axum::{http::HeaderMap, routing::post, Json, Router};
use base64::Engine;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

use ragchat::assistant::Assistant;
use ragchat::config::Config;
use ragchat::server::{router, AppState};
use ragchat_core::embedding::Embedder;
use ragchat_core::llm::LanguageModel;
use ragchat_core::offline::HashingEmbedder;
use ragchat_core::testing::{EchoModel, FailingModel};

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Server did not become ready within 5 seconds");
}

struct TestServer {
    base: String,
    client: reqwest::Client,
    _tmp: TempDir,
}

impl TestServer {
    async fn start(llm: Box<dyn LanguageModel>) -> Self {
        Self::start_with(llm, |_| {}).await
    }

    async fn start_with(llm: Box<dyn LanguageModel>, configure: impl FnOnce(&mut Config)) -> Self {
        let tmp = TempDir::new().unwrap();
        let mut config = Config::default();
        config.index.dir = tmp.path().join("index");
        config.embedding.provider = "hash".to_string();
        config.embedding.dims = Some(64);
        config.ingest.bootstrap_dir = None;
        config.whatsapp.verify_token_env = "RAGCHAT_TEST_WA_VERIFY_UNSET".to_string();
        config.whatsapp.access_token_env = "RAGCHAT_TEST_WA_ACCESS_UNSET".to_string();
        configure(&mut config);

        let embedder: Box<dyn Embedder> = Box::new(HashingEmbedder::new(64));
        let assistant = Assistant::with_providers(config, embedder, llm).await.unwrap();
        let app = router(AppState::new(assistant).unwrap());

        let port = find_free_port();
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port)).await.unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        wait_for_server(port).await;

        Self {
            base: format!("http://127.0.0.1:{}", port),
            client: reqwest::Client::new(),
            _tmp: tmp,
        }
    }

    async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self.client.get(format!("{}{}", self.base, path)).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn get_text(&self, path: &str) -> (u16, String) {
        let resp = self.client.get(format!("{}{}", self.base, path)).send().await.unwrap();
        let status = resp.status().as_u16();
        (status, resp.text().await.unwrap())
    }

    async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .post(format!("{}{}", self.base, path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        (status, resp.json().await.unwrap())
    }

    async fn upload(&self, files: &[(&str, &str)]) -> (u16, Value) {
        let files: Vec<Value> = files
            .iter()
            .map(|(name, text)| {
                json!({
                    "name": name,
                    "content_base64": base64::engine::general_purpose::STANDARD.encode(text),
                })
            })
            .collect();
        self.post("/api/upload", json!({ "files": files })).await
    }
}

/// Stand-in for the Graph API: records `(authorization, body)` for every
/// message sent to phone number `PHONE123`.
struct GraphApi {
    base: String,
    sent: Arc<Mutex<Vec<(String, Value)>>>,
}

impl GraphApi {
    async fn start() -> Self {
        let sent: Arc<Mutex<Vec<(String, Value)>>> = Arc::default();
        let recorder = Arc::clone(&sent);
        let app = Router::new().route(
            "/v18.0/PHONE123/messages",
            post(move |headers: HeaderMap, Json(body): Json<Value>| {
                let recorder = Arc::clone(&recorder);
                async move {
                    let auth = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .unwrap_or_default()
                        .to_string();
                    recorder.lock().unwrap().push((auth, body));
                    Json(json!({ "messaging_product": "whatsapp", "messages": [{ "id": "wamid.1" }] }))
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Self {
            base: format!("http://{}/v18.0", addr),
            sent,
        }
    }

    fn sent(&self) -> Vec<(String, Value)> {
        self.sent.lock().unwrap().clone()
    }
}

fn whatsapp_text(from: &str, body: &str) -> Value {
    json!({
        "object": "whatsapp_business_account",
        "entry": [{
            "id": "WABA",
            "changes": [{
                "field": "messages",
                "value": {
                    "messaging_product": "whatsapp",
                    "metadata": { "phone_number_id": "PHONE123" },
                    "messages": [{
                        "from": from,
                        "id": "wamid.in",
                        "type": "text",
                        "text": { "body": body }
                    }]
                }
            }]
        }]
    })
}

async fn whatsapp_server(llm: Box<dyn LanguageModel>, graph: &GraphApi, token_env: &str) -> TestServer {
    let graph_url = graph.base.clone();
    let token_env = token_env.to_string();
    TestServer::start_with(llm, move |config| {
        config.whatsapp.phone_number_id = Some("PHONE123".to_string());
        config.whatsapp.graph_url = graph_url;
        config.whatsapp.access_token_env = token_env;
        config.whatsapp.max_retries = 0;
    })
    .await
}

#[tokio::test]
async fn health_reports_state() {
    let server = TestServer::start(Box::new(EchoModel)).await;
    let (status, body) = server.get("/health").await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["state"], "uninitialized");
    assert_eq!(body["entries"], 0);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn upload_then_chat_with_sources() {
    let server = TestServer::start(Box::new(EchoModel)).await;

    let (status, report) = server
        .upload(&[
            ("planets.md", "# Planets\n\nMars is the red planet. Jupiter is the largest planet."),
            ("kitchen.txt", "Bake the bread at two hundred degrees for forty minutes."),
            ("broken.docx", "not a zip archive"),
        ])
        .await;
    assert_eq!(status, 200, "{}", report);
    assert_eq!(report["documents_indexed"], 2);
    assert_eq!(report["skipped"].as_array().unwrap().len(), 1);
    assert_eq!(report["skipped"][0]["name"], "broken.docx");

    let (_, health) = server.get("/health").await;
    assert_eq!(health["state"], "ready");

    let (status, body) = server
        .post("/api/chat", json!({ "message": "Which planet is red?", "session_id": "s1" }))
        .await;
    assert_eq!(status, 200, "{}", body);
    assert_eq!(body["session_id"], "s1");
    assert!(body["timestamp"].is_string());
    let sources = body["sources"].as_array().unwrap();
    assert!(!sources.is_empty());
    assert_eq!(sources[0]["document_name"], "planets.md");
    assert!(sources[0]["score"].as_f64().unwrap() > 0.0);
}

#[tokio::test]
async fn invalid_base64_is_skipped() {
    let server = TestServer::start(Box::new(EchoModel)).await;
    let (status, report) = server
        .post(
            "/api/upload",
            json!({ "files": [
                { "name": "ok.txt", "content_base64": base64::engine::general_purpose::STANDARD.encode("fine text") },
                { "name": "bad.txt", "content_base64": "%%%not base64%%%" }
            ]}),
        )
        .await;
    assert_eq!(status, 200);
    assert_eq!(report["documents_indexed"], 1);
    assert_eq!(report["skipped"][0]["name"], "bad.txt");
}

#[tokio::test]
async fn history_and_reset_are_per_session() {
    let server = TestServer::start(Box::new(EchoModel)).await;
    server.upload(&[("notes.txt", "The meeting is on Tuesday.")]).await;

    server.post("/api/chat", json!({ "message": "When is the meeting?", "session_id": "a" })).await;
    server.post("/api/chat", json!({ "message": "Where is it?", "session_id": "b" })).await;

    // Second question in session "a" sees the first exchange.
    let (_, body) = server
        .post("/api/chat", json!({ "message": "Repeat that", "session_id": "a" }))
        .await;
    let answer = body["answer"].as_str().unwrap();
    assert!(answer.contains("User: When is the meeting?"), "{}", answer);
    assert!(!answer.contains("Where is it?"), "{}", answer);

    let (_, history) = server.get("/api/history?session_id=a").await;
    assert_eq!(history["session_id"], "a");
    let turns = history["turns"].as_array().unwrap();
    assert_eq!(turns.len(), 4);
    assert_eq!(turns[0]["role"], "user");
    assert_eq!(turns[1]["role"], "assistant");

    let (status, body) = server.post("/api/reset", json!({ "session_id": "a" })).await;
    assert_eq!(status, 200);
    assert_eq!(body["message"], "Conversation reset successfully");

    let (_, history) = server.get("/api/history?session_id=a").await;
    assert!(history["turns"].as_array().unwrap().is_empty());
    let (_, other) = server.get("/api/history?session_id=b").await;
    assert_eq!(other["turns"].as_array().unwrap().len(), 2);

    // Resetting a conversation never touches the index.
    let (_, health) = server.get("/health").await;
    assert_eq!(health["state"], "ready");
}

#[tokio::test]
async fn missing_session_id_uses_default() {
    let server = TestServer::start(Box::new(EchoModel)).await;
    let (status, body) = server.post("/api/chat", json!({ "message": "hello" })).await;
    assert_eq!(status, 200);
    assert_eq!(body["session_id"], "default");
    assert!(body["sources"].as_array().unwrap().is_empty());

    let (_, history) = server.get("/api/history").await;
    assert_eq!(history["turns"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn empty_message_is_bad_request() {
    let server = TestServer::start(Box::new(EchoModel)).await;
    let (status, body) = server.post("/api/chat", json!({ "message": "   " })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");

    let (status, body) = server.post("/api/upload", json!({ "files": [] })).await;
    assert_eq!(status, 400);
    assert_eq!(body["error"]["code"], "bad_request");
}

#[tokio::test]
async fn model_failure_is_upstream_error() {
    let server = TestServer::start(Box::new(FailingModel)).await;
    server.upload(&[("notes.txt", "Some content to retrieve.")]).await;

    let (status, body) = server
        .post("/api/chat", json!({ "message": "anything", "session_id": "x" }))
        .await;
    assert_eq!(status, 502);
    assert_eq!(body["error"]["code"], "upstream_error");
    assert!(body["error"]["message"].as_str().unwrap().contains("connection refused"));

    // A failed exchange is not recorded.
    let (_, history) = server.get("/api/history?session_id=x").await;
    assert!(history["turns"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn whatsapp_verification_accepts_configured_token() {
    std::env::set_var("RAGCHAT_TEST_WA_VERIFY_OK", "blue-panda");
    let server = TestServer::start_with(Box::new(EchoModel), |config| {
        config.whatsapp.verify_token_env = "RAGCHAT_TEST_WA_VERIFY_OK".to_string();
    })
    .await;

    let (status, body) = server
        .get_text("/webhook?hub.mode=subscribe&hub.verify_token=blue-panda&hub.challenge=1158201444")
        .await;
    assert_eq!(status, 200);
    assert_eq!(body, "1158201444");

    let (status, body) = server
        .get_text("/webhook?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=1")
        .await;
    assert_eq!(status, 403);
    assert_eq!(body, "Verification failed");

    // Without the hub parameters it is a plain liveness check.
    let (status, _) = server.get_text("/webhook").await;
    assert_eq!(status, 200);
}

#[tokio::test]
async fn whatsapp_verification_fails_without_configured_token() {
    let server = TestServer::start(Box::new(EchoModel)).await;
    let (status, _) = server
        .get_text("/webhook?hub.mode=subscribe&hub.verify_token=&hub.challenge=1")
        .await;
    assert_eq!(status, 403);
}

#[tokio::test]
async fn whatsapp_message_is_answered_through_graph_api() {
    std::env::set_var("RAGCHAT_TEST_WA_ACCESS_OK", "wa-secret");
    let graph = GraphApi::start().await;
    let server = whatsapp_server(Box::new(EchoModel), &graph, "RAGCHAT_TEST_WA_ACCESS_OK").await;
    server
        .upload(&[("planets.md", "# Planets\n\nMars is the red planet. Jupiter is the largest planet.")])
        .await;

    let (status, body) = server
        .post("/webhook", whatsapp_text("15551234567", "Which planet is red?"))
        .await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "success");

    let sent = graph.sent();
    assert_eq!(sent.len(), 1);
    let (auth, message) = &sent[0];
    assert_eq!(auth, "Bearer wa-secret");
    assert_eq!(message["messaging_product"], "whatsapp");
    assert_eq!(message["to"], "15551234567");
    assert_eq!(message["type"], "text");
    let reply = message["text"]["body"].as_str().unwrap();
    assert!(reply.contains("Question: Which planet is red?"), "{}", reply);
    assert!(reply.contains("planets.md"), "{}", reply);

    // The sender's number is the session id.
    let (_, history) = server.get("/api/history?session_id=15551234567").await;
    let turns = history["turns"].as_array().unwrap();
    assert_eq!(turns.len(), 2);
    assert_eq!(turns[0]["text"], "Which planet is red?");

    // A follow-up sees the earlier exchange.
    server.post("/webhook", whatsapp_text("15551234567", "And the largest?")).await;
    let sent = graph.sent();
    let follow_up = sent[1].1["text"]["body"].as_str().unwrap();
    assert!(follow_up.contains("User: Which planet is red?"), "{}", follow_up);
}

#[tokio::test]
async fn whatsapp_status_events_are_ignored() {
    std::env::set_var("RAGCHAT_TEST_WA_ACCESS_STATUS", "wa-secret");
    let graph = GraphApi::start().await;
    let server = whatsapp_server(Box::new(EchoModel), &graph, "RAGCHAT_TEST_WA_ACCESS_STATUS").await;

    let delivered = json!({
        "object": "whatsapp_business_account",
        "entry": [{ "changes": [{ "field": "messages", "value": {
            "statuses": [{ "id": "wamid.1", "status": "delivered", "recipient_id": "15551234567" }]
        } }] }]
    });
    let (status, body) = server.post("/webhook", delivered).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "ignored");
    assert!(graph.sent().is_empty());
}

#[tokio::test]
async fn whatsapp_model_failure_sends_apology() {
    std::env::set_var("RAGCHAT_TEST_WA_ACCESS_FAIL", "wa-secret");
    let graph = GraphApi::start().await;
    let server = whatsapp_server(Box::new(FailingModel), &graph, "RAGCHAT_TEST_WA_ACCESS_FAIL").await;

    let (status, body) = server.post("/webhook", whatsapp_text("15550000000", "hello")).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "success");

    let sent = graph.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1["text"]["body"], ragchat::whatsapp::APOLOGY);

    let (_, history) = server.get("/api/history?session_id=15550000000").await;
    assert!(history["turns"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn whatsapp_reply_without_access_token_reports_error() {
    let graph = GraphApi::start().await;
    let server = whatsapp_server(Box::new(EchoModel), &graph, "RAGCHAT_TEST_WA_ACCESS_UNSET").await;

    let (status, body) = server.post("/webhook", whatsapp_text("15559999999", "hi")).await;
    assert_eq!(status, 200);
    assert_eq!(body["status"], "error");
    assert!(graph.sent().is_empty());
}
