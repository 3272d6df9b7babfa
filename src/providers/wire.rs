//! Request and response shapes for the supported provider dialects.
//!
//! Only the fields this layer reads or writes are modelled; everything else
//! in a provider response is ignored.

use serde::{Deserialize, Serialize};

use crate::config::ApiKind;
use crate::providers::client::Prompt;
use crate::providers::registry::ProviderDescriptor;

/// `anthropic-version` header value.
pub const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct OpenAiRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct GeminiPart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
struct GeminiContent {
    #[serde(default)]
    parts: Vec<GeminiPart>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiGenerationConfig {
    max_output_tokens: u32,
    temperature: f32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest {
    contents: Vec<GeminiContent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<GeminiContent>,
    generation_config: GeminiGenerationConfig,
}

/// Build the JSON body for `descriptor`'s dialect.
pub fn request_body(descriptor: &ProviderDescriptor, prompt: &Prompt) -> serde_json::Result<serde_json::Value> {
    let system = prompt.system.as_deref();
    match descriptor.api_kind {
        ApiKind::OpenAi => {
            let mut messages = Vec::with_capacity(2);
            if let Some(system) = system {
                messages.push(ChatMessage { role: "system", content: system });
            }
            messages.push(ChatMessage { role: "user", content: &prompt.problem });
            serde_json::to_value(OpenAiRequest {
                model: &descriptor.model,
                messages,
                max_tokens: descriptor.max_tokens,
                temperature: descriptor.temperature,
            })
        }
        ApiKind::Anthropic => serde_json::to_value(AnthropicRequest {
            model: &descriptor.model,
            max_tokens: descriptor.max_tokens,
            temperature: descriptor.temperature,
            system,
            messages: vec![ChatMessage { role: "user", content: &prompt.problem }],
        }),
        ApiKind::Gemini => serde_json::to_value(GeminiRequest {
            contents: vec![GeminiContent {
                parts: vec![GeminiPart { text: prompt.problem.clone() }],
            }],
            system_instruction: system.map(|s| GeminiContent {
                parts: vec![GeminiPart { text: s.to_string() }],
            }),
            generation_config: GeminiGenerationConfig {
                max_output_tokens: descriptor.max_tokens,
                temperature: descriptor.temperature,
            },
        }),
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    #[serde(default)]
    content: Vec<AnthropicBlock>,
}

#[derive(Debug, Deserialize)]
struct AnthropicBlock {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<GeminiCandidate>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    #[serde(default)]
    content: GeminiContent,
}

/// Pull the completion text out of a 2xx body.
///
/// `None` when the body does not parse or carries no non-empty text.
pub fn extract_text(kind: ApiKind, body: &[u8]) -> Option<String> {
    let text = match kind {
        ApiKind::OpenAi => serde_json::from_slice::<OpenAiResponse>(body)
            .ok()?
            .choices
            .into_iter()
            .next()?
            .message
            .content?,
        ApiKind::Anthropic => serde_json::from_slice::<AnthropicResponse>(body)
            .ok()?
            .content
            .into_iter()
            .find_map(|block| block.text)?,
        ApiKind::Gemini => serde_json::from_slice::<GeminiResponse>(body)
            .ok()?
            .candidates
            .into_iter()
            .next()?
            .content
            .parts
            .into_iter()
            .map(|p| p.text)
            .collect::<Vec<_>>()
            .join(""),
    };
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}
