//! LLM-backed generation client.
//!
//! Supports OpenAI and Anthropic APIs, selected via configuration or
//! environment variables. Streaming requests are read as server-sent
//! events; completed generations are cached by prompt.

use std::collections::VecDeque;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::cache::PromptCache;
use crate::client::{GenerationClient, GenerationEvent, GenerationStream};
use crate::config::LlmConfig;
use crate::error::{GenerationError, GenerationResult};

const OPENAI_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_RETRIES: u32 = 3;

const SYSTEM_PROMPT: &str = "You are an expert full-stack developer specializing in creating modern web applications.

Your task is to generate clean, production-ready code based on natural language descriptions.

Guidelines:
1. Generate complete, functional applications
2. Use modern frameworks (React, Next.js, TypeScript)
3. Include proper error handling and validation
4. Write clean, readable, and maintainable code
5. Include necessary dependencies and imports
6. Follow best practices for security and performance
7. Generate responsive, accessible UI components
8. Include proper TypeScript types
9. Add comments for complex logic
10. Ensure the code is production-ready

Always provide complete, runnable code that can be deployed immediately.";

/// LLM provider type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmProvider {
    OpenAI,
    Anthropic,
}

impl LlmProvider {
    fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "openai" => Some(Self::OpenAI),
            "anthropic" => Some(Self::Anthropic),
            _ => None,
        }
    }

    fn key_var(&self) -> &'static str {
        match self {
            Self::OpenAI => "OPENAI_API_KEY",
            Self::Anthropic => "ANTHROPIC_API_KEY",
        }
    }

    fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAI => "gpt-5-mini",
            Self::Anthropic => "claude-sonnet-4.5",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

/// LLM client that handles API calls
#[derive(Clone)]
pub struct LlmClient {
    provider: LlmProvider,
    api_key: String,
    model: String,
    max_tokens: u32,
    client: reqwest::Client,
    cache: Arc<PromptCache>,
}

impl LlmClient {
    /// Create a new client with explicit configuration
    pub fn new(provider: LlmProvider, api_key: String, config: &LlmConfig) -> Self {
        Self {
            provider,
            api_key,
            model: config
                .model
                .clone()
                .unwrap_or_else(|| provider.default_model().to_string()),
            max_tokens: config.max_tokens,
            client: reqwest::Client::new(),
            cache: Arc::new(PromptCache::new(config.cache_ttl())),
        }
    }

    /// Create a client from configuration and environment variables
    ///
    /// An explicit provider reads its own key. Otherwise checks in order:
    /// 1. OPENAI_API_KEY
    /// 2. ANTHROPIC_API_KEY
    ///
    /// `FORGE_LLM_MODEL` overrides the model when the config has none.
    pub fn from_config(config: &LlmConfig) -> GenerationResult<Self> {
        let mut config = config.clone();
        if config.model.is_none() {
            config.model = std::env::var("FORGE_LLM_MODEL").ok().filter(|m| !m.is_empty());
        }

        let candidates: Vec<LlmProvider> = match config.provider.as_deref() {
            Some(name) => vec![LlmProvider::parse(name).ok_or_else(|| {
                GenerationError::Llm(format!("Unknown LLM provider: {}", name))
            })?],
            None => vec![LlmProvider::OpenAI, LlmProvider::Anthropic],
        };

        for provider in candidates {
            if let Ok(api_key) = std::env::var(provider.key_var()) {
                if !api_key.is_empty() {
                    return Ok(Self::new(provider, api_key, &config));
                }
            }
        }

        Err(GenerationError::LlmNotConfigured)
    }

    /// Get the current provider
    pub fn provider(&self) -> LlmProvider {
        self.provider
    }

    /// Get the current model
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn cache(&self) -> &PromptCache {
        &self.cache
    }

    fn system_prompt(context: &serde_json::Value) -> String {
        let has_context = match context {
            serde_json::Value::Null => false,
            serde_json::Value::Object(map) => !map.is_empty(),
            _ => true,
        };
        if has_context {
            format!("{}\n\nProject context:\n{}", SYSTEM_PROMPT, context)
        } else {
            SYSTEM_PROMPT.to_string()
        }
    }

    fn request_body(&self, system: &str, prompt: &str, stream: bool) -> serde_json::Value {
        match self.provider {
            LlmProvider::OpenAI => serde_json::json!({
                "model": self.model,
                "messages": [
                    ChatMessage { role: "system", content: system.to_string() },
                    ChatMessage { role: "user", content: prompt.to_string() },
                ],
                "max_completion_tokens": self.max_tokens,
                "stream": stream,
            }),
            LlmProvider::Anthropic => serde_json::json!({
                "model": self.model,
                "max_tokens": self.max_tokens,
                "system": system,
                "messages": [ChatMessage { role: "user", content: prompt.to_string() }],
                "stream": stream,
            }),
        }
    }

    fn request(&self, body: &serde_json::Value) -> reqwest::RequestBuilder {
        let builder = match self.provider {
            LlmProvider::OpenAI => self
                .client
                .post(OPENAI_URL)
                .header("Authorization", format!("Bearer {}", self.api_key)),
            LlmProvider::Anthropic => self
                .client
                .post(ANTHROPIC_URL)
                .header("x-api-key", &self.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
        };
        builder.header("Content-Type", "application/json").json(body)
    }

    /// Send a request, retrying transient errors (5xx, rate limits, network issues)
    async fn send_with_retry(&self, body: &serde_json::Value) -> GenerationResult<reqwest::Response> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                // Exponential backoff: 2s, 4s
                let delay = std::time::Duration::from_secs(1 << attempt);
                tokio::time::sleep(delay).await;
            }

            let response = match self.request(body).send().await {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(GenerationError::Llm(format!("Network error: {}", e)));
                    continue;
                }
            };

            let status = response.status();
            if status.is_server_error() || status.as_u16() == 429 {
                let body = response.text().await.unwrap_or_default();
                warn!(
                    "{:?} API error {} (attempt {}/{})",
                    self.provider,
                    status,
                    attempt + 1,
                    MAX_RETRIES
                );
                last_error = Some(GenerationError::Llm(format!(
                    "{:?} API error {}: {}",
                    self.provider, status, body
                )));
                continue;
            }

            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(GenerationError::Llm(format!(
                    "{:?} API error {}: {}",
                    self.provider, status, body
                )));
            }

            return Ok(response);
        }

        Err(last_error.unwrap_or_else(|| GenerationError::Llm("Max retries exceeded".to_string())))
    }

    /// Single non-streaming completion
    pub async fn complete(&self, prompt: &str, context: &serde_json::Value) -> GenerationResult<String> {
        let body = self.request_body(&Self::system_prompt(context), prompt, false);
        let response = self.send_with_retry(&body).await?;

        let content = match self.provider {
            LlmProvider::OpenAI => {
                let result: OpenAIResponse = response.json().await?;
                result.choices.into_iter().next().map(|c| c.message.content)
            }
            LlmProvider::Anthropic => {
                let result: AnthropicResponse = response.json().await?;
                result.content.into_iter().next().map(|c| c.text)
            }
        };

        content.ok_or_else(|| GenerationError::Llm(format!("No response from {:?}", self.provider)))
    }

    fn stream_completion(&self, prompt: String, context: serde_json::Value) -> GenerationStream {
        let client = self.clone();
        let opened = async move {
            let body = client.request_body(&Self::system_prompt(&context), &prompt, true);
            let state = match client.send_with_retry(&body).await {
                Ok(response) => {
                    let body = response.bytes_stream().map(|r| r.map(|b| b.to_vec())).boxed();
                    SseState::open(client, prompt, body)
                }
                Err(e) => SseState::failed(client, prompt, e.to_string()),
            };
            stream::unfold(state, SseState::next)
        };
        stream::once(opened).flatten().boxed()
    }
}

impl GenerationClient for LlmClient {
    fn generate(
        &self,
        prompt: &str,
        context: &serde_json::Value,
        streaming: bool,
    ) -> GenerationStream {
        if let Some(content) = self.cache.get(prompt) {
            debug!("Prompt cache hit");
            return stream::iter(vec![GenerationEvent::cached(content)]).boxed();
        }

        if streaming {
            return self.stream_completion(prompt.to_string(), context.clone());
        }

        let client = self.clone();
        let prompt = prompt.to_string();
        let context = context.clone();
        stream::once(async move {
            match client.complete(&prompt, &context).await {
                Ok(content) => {
                    client.cache.put(&prompt, &content);
                    GenerationEvent::complete(content)
                }
                Err(e) => {
                    error!("Error in completion generation: {}", e);
                    GenerationEvent::error(e.to_string())
                }
            }
        })
        .boxed()
    }
}

/// One decoded server-sent event payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseDelta {
    Text(String),
    Done,
    Ignore,
}

/// Splits a byte stream into `data:` payloads.
#[derive(Debug, Default)]
pub struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes and return the payload of every completed `data:` line.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));
        let mut payloads = Vec::new();
        while let Some(pos) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=pos).collect();
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(data) = line.strip_prefix("data:") {
                payloads.push(data.trim_start().to_string());
            }
        }
        payloads
    }
}

/// Interpret one payload for a provider.
pub fn parse_delta(provider: LlmProvider, data: &str) -> SseDelta {
    if data == "[DONE]" {
        return SseDelta::Done;
    }
    let Ok(value) = serde_json::from_str::<serde_json::Value>(data) else {
        return SseDelta::Ignore;
    };

    match provider {
        LlmProvider::OpenAI => value["choices"][0]["delta"]["content"]
            .as_str()
            .filter(|s| !s.is_empty())
            .map(|s| SseDelta::Text(s.to_string()))
            .unwrap_or(SseDelta::Ignore),
        LlmProvider::Anthropic => match value["type"].as_str() {
            Some("content_block_delta") => value["delta"]["text"]
                .as_str()
                .map(|s| SseDelta::Text(s.to_string()))
                .unwrap_or(SseDelta::Ignore),
            Some("message_stop") => SseDelta::Done,
            _ => SseDelta::Ignore,
        },
    }
}

type ByteStream = BoxStream<'static, reqwest::Result<Vec<u8>>>;

struct SseState {
    client: LlmClient,
    prompt: String,
    body: Option<ByteStream>,
    decoder: SseDecoder,
    accumulated: String,
    pending: VecDeque<GenerationEvent>,
    finished: bool,
}

impl SseState {
    fn open(client: LlmClient, prompt: String, body: ByteStream) -> Self {
        Self {
            client,
            prompt,
            body: Some(body),
            decoder: SseDecoder::new(),
            accumulated: String::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }

    fn failed(client: LlmClient, prompt: String, error: String) -> Self {
        let mut state = Self::open(client, prompt, stream::empty().boxed());
        state.body = None;
        state.finished = true;
        state.pending.push_back(GenerationEvent::error(error));
        state
    }

    fn finish(&mut self) {
        self.finished = true;
        self.body = None;
        self.client.cache.put(&self.prompt, &self.accumulated);
        self.pending
            .push_back(GenerationEvent::complete(self.accumulated.clone()));
    }

    async fn next(mut self) -> Option<(GenerationEvent, Self)> {
        loop {
            if let Some(event) = self.pending.pop_front() {
                return Some((event, self));
            }
            if self.finished {
                return None;
            }
            let Some(body) = self.body.as_mut() else {
                self.finish();
                continue;
            };

            match body.next().await {
                Some(Ok(bytes)) => {
                    for data in self.decoder.push(&bytes) {
                        match parse_delta(self.client.provider, &data) {
                            SseDelta::Text(text) => {
                                self.accumulated.push_str(&text);
                                self.pending.push_back(GenerationEvent::chunk(text));
                            }
                            SseDelta::Done => {
                                self.finish();
                                break;
                            }
                            SseDelta::Ignore => {}
                        }
                    }
                }
                Some(Err(e)) => {
                    error!("Error in streaming generation: {}", e);
                    self.finished = true;
                    self.body = None;
                    self.pending.push_back(GenerationEvent::error(e.to_string()));
                }
                None => self.finish(),
            }
        }
    }
}

// OpenAI API types
#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: String,
}

// Anthropic API types
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContent>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContent {
    text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(provider: LlmProvider) -> LlmClient {
        LlmClient::new(provider, "key".to_string(), &LlmConfig::default())
    }

    #[test]
    fn test_default_models() {
        assert_eq!(client(LlmProvider::OpenAI).model(), "gpt-5-mini");
        assert_eq!(client(LlmProvider::Anthropic).model(), "claude-sonnet-4.5");
    }

    #[test]
    fn test_custom_model() {
        let config = LlmConfig {
            model: Some("gpt-4o".to_string()),
            ..Default::default()
        };
        let client = LlmClient::new(LlmProvider::OpenAI, "key".to_string(), &config);
        assert_eq!(client.model(), "gpt-4o");
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let config = LlmConfig {
            provider: Some("cohere".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            LlmClient::from_config(&config),
            Err(GenerationError::Llm(msg)) if msg.contains("cohere")
        ));
    }

    #[test]
    fn test_request_bodies() {
        let openai = client(LlmProvider::OpenAI).request_body("sys", "hi", true);
        assert_eq!(openai["messages"][0]["role"], "system");
        assert_eq!(openai["messages"][1]["content"], "hi");
        assert_eq!(openai["stream"], true);

        let anthropic = client(LlmProvider::Anthropic).request_body("sys", "hi", false);
        assert_eq!(anthropic["system"], "sys");
        assert_eq!(anthropic["messages"][0]["role"], "user");
        assert_eq!(anthropic["max_tokens"], 4096);
    }

    #[test]
    fn test_system_prompt_includes_context() {
        assert_eq!(LlmClient::system_prompt(&serde_json::json!({})), SYSTEM_PROMPT);
        let with = LlmClient::system_prompt(&serde_json::json!({"framework": "react"}));
        assert!(with.ends_with(r#"{"framework":"react"}"#));
    }

    #[test]
    fn test_sse_decoder_handles_split_lines() {
        let mut decoder = SseDecoder::new();
        assert!(decoder.push(b"data: {\"a\":").is_empty());
        let payloads = decoder.push(b"1}\n\nevent: ping\ndata: [DONE]\n");
        assert_eq!(payloads, vec!["{\"a\":1}", "[DONE]"]);
    }

    #[test]
    fn test_parse_openai_delta() {
        let data = r#"{"choices":[{"delta":{"content":"Hello"}}]}"#;
        assert_eq!(parse_delta(LlmProvider::OpenAI, data), SseDelta::Text("Hello".into()));
        assert_eq!(parse_delta(LlmProvider::OpenAI, "[DONE]"), SseDelta::Done);
        assert_eq!(
            parse_delta(LlmProvider::OpenAI, r#"{"choices":[{"delta":{}}]}"#),
            SseDelta::Ignore
        );
    }

    #[test]
    fn test_parse_anthropic_delta() {
        let data = r#"{"type":"content_block_delta","delta":{"type":"text_delta","text":"Hi"}}"#;
        assert_eq!(parse_delta(LlmProvider::Anthropic, data), SseDelta::Text("Hi".into()));
        assert_eq!(
            parse_delta(LlmProvider::Anthropic, r#"{"type":"message_stop"}"#),
            SseDelta::Done
        );
        assert_eq!(
            parse_delta(LlmProvider::Anthropic, r#"{"type":"ping"}"#),
            SseDelta::Ignore
        );
    }

    #[tokio::test]
    async fn test_cache_hit_yields_cached_event() {
        let client = client(LlmProvider::OpenAI);
        client.cache().put("build a todo list", "cached app");

        let events: Vec<GenerationEvent> = client
            .generate("build a todo list", &serde_json::Value::Null, true)
            .collect()
            .await;
        assert_eq!(events, vec![GenerationEvent::cached("cached app")]);
    }
}
