//! HTTP surface: public API, admin auth, request ids.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use serde_json::Value;
use tokio::net::TcpListener;

use common::{base_config, descriptor, FakeProvider};
use provider_orchestrator::{HttpServer, Orchestrator, OrchestratorConfig, Shutdown};

const ADMIN_KEY: &str = "test-admin-key";
const HARD_PROBLEM: &str = "intermittent deadlock between replicas under failover";

struct TestServer {
    addr: SocketAddr,
    shutdown: Shutdown,
    http: reqwest::Client,
}

impl TestServer {
    async fn start() -> Self {
        let mut config: OrchestratorConfig = base_config(vec![]);
        config.server.admin_api_key = ADMIN_KEY.to_string();
        let orchestrator = Orchestrator::builder(config.clone())
            .provider(descriptor("a", 1, 1.0), FakeProvider::answering("use a lock hierarchy"))
            .build()
            .unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let server = HttpServer::new(Arc::new(orchestrator), &config);
        tokio::spawn(server.run(listener, Shutdown::wait(shutdown.subscribe())));

        Self {
            addr,
            shutdown,
            http: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.shutdown.trigger();
    }
}

#[tokio::test]
async fn test_health() {
    let server = TestServer::start().await;
    let response = server.http.get(server.url("/health")).send().await.unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_solve_round_trip() {
    let server = TestServer::start().await;
    let request_id = "6f1c8f0e-2b4e-4a53-9d0b-8f3b7f6d2a11";

    let response = server
        .http
        .post(server.url("/v1/solve"))
        .header("x-request-id", request_id)
        .json(&serde_json::json!({"problem": HARD_PROBLEM, "persona": "devops"}))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    assert_eq!(response.headers()["x-request-id"], request_id);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["source"], "a");
    assert_eq!(body["content"], "use a lock hierarchy");
    assert_eq!(body["request_id"], request_id);
    assert_eq!(body["attempts"], 2);
    assert!(body.get("caller_error").is_none());
}

#[tokio::test]
async fn test_request_id_generated_when_absent() {
    let server = TestServer::start().await;
    let response = server.http.get(server.url("/health")).send().await.unwrap();
    let id = response.headers()["x-request-id"].to_str().unwrap();
    assert!(uuid::Uuid::parse_str(id).is_ok());
}

#[tokio::test]
async fn test_solve_rejects_empty_problem() {
    let server = TestServer::start().await;
    let response = server
        .http
        .post(server.url("/v1/solve"))
        .json(&serde_json::json!({"problem": "  ", "persona": "devops"}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["error"], "problem must not be empty");
}

#[tokio::test]
async fn test_public_status() {
    let server = TestServer::start().await;
    server
        .http
        .post(server.url("/v1/solve"))
        .json(&serde_json::json!({"problem": HARD_PROBLEM, "persona": "devops"}))
        .send()
        .await
        .unwrap();

    let body: Value = server
        .http
        .get(server.url("/v1/status"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["providers"][0]["id"], "a");
    assert_eq!(body["providers"][0]["circuit_state"], "closed");
    assert_eq!(body["success_rate"]["successes"], 1);
}

#[tokio::test]
async fn test_admin_requires_token() {
    let server = TestServer::start().await;

    let missing = server.http.get(server.url("/admin/status")).send().await.unwrap();
    assert_eq!(missing.status(), 401);

    let wrong = server
        .http
        .get(server.url("/admin/status"))
        .bearer_auth("nope")
        .send()
        .await
        .unwrap();
    assert_eq!(wrong.status(), 401);

    let sweep = server
        .http
        .post(server.url("/admin/circuits/sweep"))
        .send()
        .await
        .unwrap();
    assert_eq!(sweep.status(), 401);

    let ok = server
        .http
        .get(server.url("/admin/status"))
        .bearer_auth(ADMIN_KEY)
        .send()
        .await
        .unwrap();
    assert_eq!(ok.status(), 200);
}

#[tokio::test]
async fn test_admin_attempts_and_sweep() {
    let server = TestServer::start().await;
    for _ in 0..3 {
        server
            .http
            .post(server.url("/v1/solve"))
            .json(&serde_json::json!({"problem": HARD_PROBLEM, "persona": "devops"}))
            .send()
            .await
            .unwrap();
    }

    let attempts: Vec<Value> = server
        .http
        .get(server.url("/admin/attempts?limit=4"))
        .bearer_auth(ADMIN_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(attempts.len(), 4);
    assert_eq!(attempts[3]["source"], "a");
    assert_eq!(attempts[3]["success"], true);

    let sweep: Value = server
        .http
        .post(server.url("/admin/circuits/sweep"))
        .bearer_auth(ADMIN_KEY)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(sweep["half_opened"], serde_json::json!([]));
}
