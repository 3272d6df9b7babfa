//! Shared utilities for integration tests.
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use provider_orchestrator::config::{ApiKind, OrchestratorConfig, PersonaConfig, ProviderConfig};
use provider_orchestrator::error::ProviderError;
use provider_orchestrator::providers::{Completion, Prompt, ProviderClient, ProviderDescriptor};

/// What a mock backend answers to one request.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Self {
            status: 200,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn status(status: u16) -> Self {
        Self {
            status,
            body: format!("{{\"error\":\"status {status}\"}}"),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

/// OpenAI-style chat completion body.
pub fn openai_body(content: &str) -> String {
    serde_json::json!({
        "id": "chatcmpl-test",
        "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}]
    })
    .to_string()
}

/// A programmable HTTP backend listening on an ephemeral port.
pub struct MockBackend {
    pub addr: SocketAddr,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
}

impl MockBackend {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Requests fully received so far.
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }

    /// Raw text (head and body) of every request received.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

/// Start a backend whose reply is chosen per request (argument is the
/// zero-based request index).
pub async fn start_programmable_backend<F>(f: F) -> MockBackend
where
    F: Fn(usize) -> Reply + Send + Sync + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let requests = Arc::new(Mutex::new(Vec::new()));
    let f = Arc::new(f);

    let (task_hits, task_requests) = (Arc::clone(&hits), Arc::clone(&requests));
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                break;
            };
            let (f, hits, requests) = (Arc::clone(&f), Arc::clone(&task_hits), Arc::clone(&task_requests));
            tokio::spawn(async move {
                serve_one(socket, f, hits, requests).await;
            });
        }
    });

    MockBackend {
        addr,
        hits,
        requests,
    }
}

/// Start a backend that always gives the same reply.
pub async fn start_mock_backend(reply: Reply) -> MockBackend {
    start_programmable_backend(move |_| reply.clone()).await
}

async fn serve_one<F>(
    mut socket: TcpStream,
    f: Arc<F>,
    hits: Arc<AtomicUsize>,
    requests: Arc<Mutex<Vec<String>>>,
) where
    F: Fn(usize) -> Reply + Send + Sync + 'static,
{
    let Some(raw) = read_request(&mut socket).await else {
        return;
    };
    let index = hits.fetch_add(1, Ordering::SeqCst);
    requests.lock().unwrap().push(raw);

    let reply = f(index);
    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }

    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        reply.status,
        reason(reply.status),
        reply.body.len(),
        reply.body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Read one request: head up to the blank line, then Content-Length bytes.
async fn read_request(socket: &mut TcpStream) -> Option<String> {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    let head_end = loop {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            return None;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buf[..head_end]).to_lowercase();
    let content_length = head
        .lines()
        .find_map(|l| l.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while buf.len() < head_end + content_length {
        let n = socket.read(&mut chunk).await.ok()?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
    }
    Some(String::from_utf8_lossy(&buf).into_owned())
}

fn reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        401 => "Unauthorized",
        404 => "Not Found",
        408 => "Request Timeout",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// Provider entry pointing at `endpoint`.
pub fn provider_config(id: &str, endpoint: &str, priority: u32, share: f64) -> ProviderConfig {
    ProviderConfig {
        id: id.to_string(),
        display_name: id.to_uppercase(),
        endpoint: endpoint.to_string(),
        api_kind: ApiKind::OpenAi,
        model: "test-model".to_string(),
        api_key_env: format!("{}_API_KEY", id.to_uppercase()),
        timeout_secs: 5,
        max_usage_share: share,
        priority,
        max_tokens: 256,
        temperature: 0.3,
    }
}

/// Config with the complexity gate and background sweep off.
pub fn base_config(providers: Vec<ProviderConfig>) -> OrchestratorConfig {
    let mut config = OrchestratorConfig::default();
    config.providers = providers;
    config.personas = vec![
        PersonaConfig {
            name: "devops".to_string(),
            max_ai_share: 0.9,
            system_prompt: Some("You are a DevOps engineer.".to_string()),
        },
        PersonaConfig {
            name: "security".to_string(),
            max_ai_share: 0.05,
            system_prompt: None,
        },
    ];
    config.fallback.complexity_gate = false;
    config.health_check.enabled = false;
    config
}

/// Scripted in-process provider.
pub struct FakeProvider {
    script: Box<dyn Fn(usize) -> FakeReply + Send + Sync>,
    calls: AtomicUsize,
}

#[derive(Debug, Clone)]
pub enum FakeReply {
    Answer(String, Duration),
    Fail(u16, Duration),
    Timeout,
}

impl FakeProvider {
    pub fn new<F>(script: F) -> Arc<Self>
    where
        F: Fn(usize) -> FakeReply + Send + Sync + 'static,
    {
        Arc::new(Self {
            script: Box::new(script),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn answering(content: &str) -> Arc<Self> {
        let content = content.to_string();
        Self::new(move |_| FakeReply::Answer(content.clone(), Duration::ZERO))
    }

    pub fn failing(status: u16) -> Arc<Self> {
        Self::new(move |_| FakeReply::Fail(status, Duration::ZERO))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProviderClient for FakeProvider {
    async fn complete(&self, _prompt: &Prompt) -> Result<Completion, ProviderError> {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        match (self.script)(index) {
            FakeReply::Answer(content, delay) => {
                tokio::time::sleep(delay).await;
                Ok(Completion { content })
            }
            FakeReply::Fail(status, delay) => {
                tokio::time::sleep(delay).await;
                Err(ProviderError::Status {
                    status,
                    body: String::new(),
                })
            }
            FakeReply::Timeout => Err(ProviderError::Timeout(Duration::from_secs(5))),
        }
    }
}

/// Descriptor for a fake provider.
pub fn descriptor(id: &str, priority: u32, share: f64) -> ProviderDescriptor {
    ProviderDescriptor::from_config(&provider_config(
        id,
        &format!("https://{id}.invalid/v1/chat/completions"),
        priority,
        share,
    ))
    .unwrap()
}

/// Descriptor for a fake provider with its own timeout.
pub fn descriptor_with_timeout(id: &str, priority: u32, share: f64, timeout_secs: u64) -> ProviderDescriptor {
    let mut config = provider_config(
        id,
        &format!("https://{id}.invalid/v1/chat/completions"),
        priority,
        share,
    );
    config.timeout_secs = timeout_secs;
    ProviderDescriptor::from_config(&config).unwrap()
}
