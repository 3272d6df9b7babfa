//! Outbound AI provider clients.

use std::fmt;

use async_trait::async_trait;

use crate::config::ApiKind;
use crate::error::ProviderError;
use crate::providers::registry::ProviderDescriptor;
use crate::providers::wire;

/// Longest slice of an error body kept for logs.
const MAX_LOGGED_BODY: usize = 512;

/// Text sent to a provider.
#[derive(Debug, Clone)]
pub struct Prompt {
    /// Persona system prompt, if any.
    pub system: Option<String>,
    pub problem: String,
}

/// A successful provider answer.
#[derive(Debug, Clone)]
pub struct Completion {
    pub content: String,
}

/// A single AI provider endpoint.
///
/// Implementations classify failures only through [`ProviderError`]; callers
/// never look at provider-specific error bodies.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn complete(&self, prompt: &Prompt) -> Result<Completion, ProviderError>;
}

/// JSON-over-HTTP client for one provider.
pub struct HttpProviderClient {
    descriptor: ProviderDescriptor,
    api_key: String,
    http: reqwest::Client,
}

impl fmt::Debug for HttpProviderClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpProviderClient")
            .field("provider", &self.descriptor.id)
            .field("endpoint", &self.descriptor.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

impl HttpProviderClient {
    pub fn new(descriptor: ProviderDescriptor, api_key: String) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(descriptor.timeout)
            .build()
            .map_err(|e| ProviderError::Request(e.to_string()))?;
        Ok(Self {
            descriptor,
            api_key,
            http,
        })
    }

    fn request(&self, body: &serde_json::Value) -> reqwest::RequestBuilder {
        let builder = self
            .http
            .post(self.descriptor.endpoint.clone())
            .header("Content-Type", "application/json")
            .json(body);
        match self.descriptor.api_kind {
            ApiKind::OpenAi => builder.bearer_auth(&self.api_key),
            ApiKind::Anthropic => builder
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", wire::ANTHROPIC_VERSION),
            ApiKind::Gemini => builder.header("x-goog-api-key", &self.api_key),
        }
    }
}

#[async_trait]
impl ProviderClient for HttpProviderClient {
    async fn complete(&self, prompt: &Prompt) -> Result<Completion, ProviderError> {
        let timeout = self.descriptor.timeout;
        let body = wire::request_body(&self.descriptor, prompt)
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        let response = self
            .request(&body)
            .send()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, timeout))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| ProviderError::from_reqwest(e, timeout))?;

        if !status.is_success() {
            let body = truncate(&String::from_utf8_lossy(&bytes), MAX_LOGGED_BODY);
            tracing::debug!(
                provider = %self.descriptor.id,
                status = status.as_u16(),
                body = %body,
                "Provider returned error status"
            );
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }

        wire::extract_text(self.descriptor.api_kind, &bytes)
            .map(|content| Completion { content })
            .ok_or_else(|| {
                ProviderError::InvalidResponse(format!(
                    "no completion text in {} byte response",
                    bytes.len()
                ))
            })
    }
}

fn truncate(text: &str, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("abc", 5), "abc");
        assert_eq!(truncate("ééééé", 2), "éé...");
    }
}
