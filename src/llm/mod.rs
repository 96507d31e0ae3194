//! Uniform interface over several LLM backends (C3).

pub mod anthropic;
pub mod langchain_adapter;
pub mod llama_cpp;
pub mod ollama;
pub mod openai_compatible;
pub mod options;

use crate::error::{BookGeneratorError, Result};
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Parsed `provider://model[@host][?k=v&...]` configuration string.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    pub scheme: String,
    pub model: String,
    pub host: Option<String>,
    pub params: HashMap<String, String>,
}

impl ModelConfig {
    pub fn parse(spec: &str) -> Result<Self> {
        let (scheme, rest) = spec
            .split_once("://")
            .ok_or_else(|| BookGeneratorError::InvalidModelConfig(spec.to_string()))?;
        if scheme.is_empty() {
            return Err(BookGeneratorError::InvalidModelConfig(spec.to_string()));
        }

        let (path, query) = match rest.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (rest, None),
        };

        let (model, host) = match path.split_once('@') {
            Some((m, h)) => (m.to_string(), Some(h.to_string())),
            None => (path.to_string(), None),
        };

        if model.is_empty() {
            return Err(BookGeneratorError::InvalidModelConfig(spec.to_string()));
        }

        let mut params = HashMap::new();
        if let Some(query) = query {
            for pair in query.split('&') {
                if pair.is_empty() {
                    continue;
                }
                match pair.split_once('=') {
                    Some((k, v)) => {
                        params.insert(k.to_string(), v.to_string());
                    }
                    None => {
                        params.insert(pair.to_string(), String::new());
                    }
                }
            }
        }

        Ok(Self {
            scheme: scheme.to_string(),
            model,
            host,
            params,
        })
    }

    pub fn is_static_seed(&self) -> bool {
        self.params
            .get("static_seed")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false)
    }

    pub fn context_length(&self) -> Option<usize> {
        self.params
            .get("num_ctx")
            .or_else(|| self.params.get("max_tokens"))
            .and_then(|v| v.parse().ok())
    }
}

#[derive(Debug, Clone, Default)]
pub struct GenerateOptions {
    pub seed: Option<i64>,
    pub format_json: bool,
    pub min_words: Option<usize>,
    pub stream: bool,
    pub debug: bool,
}

#[derive(Debug, Clone)]
pub struct ExecResult {
    pub content: String,
    pub json_parsed: bool,
    pub json_errors: Option<String>,
}

/// Uniform LLM interface. Variants {local-daemon, openai-compatible-http,
/// hosted-api-via-adapter, embedded-inference-server} all implement this;
/// callers never branch on which one they hold.
#[async_trait]
pub trait ModelProvider: Send + Sync {
    async fn generate_text(
        &self,
        messages: &[Message],
        model: &ModelConfig,
        opts: &GenerateOptions,
    ) -> Result<String>;

    async fn stream_text(
        &self,
        messages: &[Message],
        model: &ModelConfig,
        opts: &GenerateOptions,
    ) -> Result<BoxStream<'static, Result<String>>>;

    async fn is_model_available(&self, model: &ModelConfig) -> Result<bool>;

    async fn download_model(&self, model: &ModelConfig) -> Result<()>;

    /// Wraps `generate_text` with `format_json` set, then validates/repairs
    /// the result. Shared by every backend — no need to override.
    async fn generate_json(
        &self,
        messages: &[Message],
        model: &ModelConfig,
        required_attrs: &[String],
        opts: &GenerateOptions,
    ) -> Result<JsonValue> {
        let mut json_opts = opts.clone();
        json_opts.format_json = true;
        let raw = self.generate_text(messages, model, &json_opts).await?;
        let value = parse_json_lenient(&raw)?;
        if let JsonValue::Object(map) = &value {
            for attr in required_attrs {
                if !map.contains_key(attr) {
                    return Err(BookGeneratorError::ProviderParse(format!(
                        "missing required attribute '{attr}'"
                    )));
                }
            }
        }
        Ok(value)
    }

    /// Maintains an internal transcript: optional system message, then
    /// alternating user/assistant turns, one backend call per user turn.
    async fn generate_multistep_conversation(
        &self,
        user_messages: &[String],
        model: &ModelConfig,
        system_message: Option<&str>,
        seed: Option<i64>,
    ) -> Result<String> {
        let mut transcript = Vec::new();
        if let Some(sys) = system_message {
            transcript.push(Message::system(sys));
        }
        let mut last = String::new();
        let opts = GenerateOptions {
            seed,
            ..Default::default()
        };
        for turn in user_messages {
            transcript.push(Message::user(turn.clone()));
            let reply = self.generate_text(&transcript, model, &opts).await?;
            transcript.push(Message::assistant(reply.clone()));
            last = reply;
        }
        Ok(last)
    }
}

/// Extracts the first balanced `{...}` or `[...]` substring and parses it as
/// JSON if direct parsing fails.
pub fn parse_json_lenient(raw: &str) -> Result<JsonValue> {
    if let Ok(v) = serde_json::from_str(raw) {
        return Ok(v);
    }
    if let Some(extracted) = extract_json_substring(raw) {
        if let Ok(v) = serde_json::from_str(&extracted) {
            return Ok(v);
        }
    }
    Err(BookGeneratorError::JSONParseError)
}

fn extract_json_substring(raw: &str) -> Option<String> {
    let stripped = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();

    for (open, close) in [('{', '}'), ('[', ']')] {
        if let Some(start) = stripped.find(open) {
            let mut depth = 0i32;
            for (i, ch) in stripped[start..].char_indices() {
                if ch == open {
                    depth += 1;
                } else if ch == close {
                    depth -= 1;
                    if depth == 0 {
                        return Some(stripped[start..start + i + ch.len_utf8()].to_string());
                    }
                }
            }
        }
    }
    None
}

/// Constructs the configured backend for a [`ModelConfig`]'s scheme.
pub fn provider_for(
    model: &ModelConfig,
    config: &crate::config::Config,
) -> Result<Box<dyn ModelProvider>> {
    match model.scheme.as_str() {
        "ollama" => Ok(Box::new(ollama::OllamaProvider::new(config))),
        "openai-compatible" => Ok(Box::new(
            openai_compatible::OpenAiCompatibleProvider::new(config),
        )),
        "llama-cpp" => Ok(Box::new(llama_cpp::LlamaCppProvider::new(config))),
        "anthropic" => Ok(Box::new(anthropic::AnthropicProvider::new(config)?)),
        "langchain" => Ok(Box::new(langchain_adapter::LangchainAdapterProvider::new(
            config,
        )?)),
        other => Err(BookGeneratorError::UnsupportedLLMProvider(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_model_config() {
        let cfg = ModelConfig::parse("ollama://llama3@localhost:11434?num_ctx=8192&static_seed=true")
            .unwrap();
        assert_eq!(cfg.scheme, "ollama");
        assert_eq!(cfg.model, "llama3");
        assert_eq!(cfg.host.as_deref(), Some("localhost:11434"));
        assert_eq!(cfg.context_length(), Some(8192));
        assert!(cfg.is_static_seed());
    }

    #[test]
    fn parses_minimal_model_config() {
        let cfg = ModelConfig::parse("anthropic://claude-sonnet-4").unwrap();
        assert_eq!(cfg.scheme, "anthropic");
        assert_eq!(cfg.model, "claude-sonnet-4");
        assert!(cfg.host.is_none());
    }

    #[test]
    fn rejects_config_without_scheme() {
        assert!(ModelConfig::parse("not-a-url").is_err());
    }

    #[test]
    fn extracts_json_from_markdown_fence() {
        let raw = "```json\n{\"a\": 1}\n```";
        let v = parse_json_lenient(raw).unwrap();
        assert_eq!(v["a"], 1);
    }

    #[test]
    fn extracts_first_balanced_object_from_prose() {
        let raw = "Sure, here you go: {\"a\": {\"b\": 1}} — hope that helps!";
        let v = parse_json_lenient(raw).unwrap();
        assert_eq!(v["a"]["b"], 1);
    }

    #[test]
    fn fails_when_no_json_present() {
        assert!(parse_json_lenient("no json here at all").is_err());
    }
}
