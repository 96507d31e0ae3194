//! `llama.cpp` server backend (`llama-cpp://`). Chat is flattened into a
//! single prompt and posted to `/completion`.

use super::options::{resolve_context_length, strip_think_tags, temperature_for};
use super::{GenerateOptions, Message, ModelConfig, ModelProvider, Role};
use crate::config::Config;
use crate::error::{BookGeneratorError, Result};
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

pub struct LlamaCppProvider {
    client: reqwest::Client,
    default_context_length: usize,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    content: String,
}

impl LlamaCppProvider {
    pub fn new(config: &Config) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.provider_timeout_secs))
            .build()
            .unwrap_or_default();
        Self {
            client,
            default_context_length: config.default_context_length,
        }
    }

    fn flatten_prompt(messages: &[Message]) -> String {
        messages
            .iter()
            .map(|m| {
                let tag = match m.role {
                    Role::System => "System",
                    Role::User => "User",
                    Role::Assistant => "Assistant",
                };
                format!("### {tag}\n{}\n", m.content)
            })
            .collect::<Vec<_>>()
            .join("\n")
            + "### Assistant\n"
    }
}

#[async_trait]
impl ModelProvider for LlamaCppProvider {
    async fn generate_text(
        &self,
        messages: &[Message],
        model: &ModelConfig,
        opts: &GenerateOptions,
    ) -> Result<String> {
        let host = model.host.as_deref().unwrap_or("127.0.0.1:8080");
        let url = format!("http://{host}/completion");
        let num_ctx = resolve_context_length(model, self.default_context_length, 32_768);

        let body = json!({
            "prompt": Self::flatten_prompt(messages),
            "n_predict": num_ctx,
            "temperature": temperature_for(opts),
            "json_schema": serde_json::Value::Null,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<CompletionResponse>()
            .await
            .map_err(|e| BookGeneratorError::ProviderParse(e.to_string()))?;

        Ok(strip_think_tags(&response.content))
    }

    async fn stream_text(
        &self,
        messages: &[Message],
        model: &ModelConfig,
        opts: &GenerateOptions,
    ) -> Result<BoxStream<'static, Result<String>>> {
        let text = self.generate_text(messages, model, opts).await?;
        Ok(Box::pin(futures::stream::once(async { Ok(text) })))
    }

    async fn is_model_available(&self, model: &ModelConfig) -> Result<bool> {
        let host = model.host.as_deref().unwrap_or("127.0.0.1:8080");
        let url = format!("http://{host}/health");
        Ok(self.client.get(&url).send().await.is_ok())
    }

    async fn download_model(&self, _model: &ModelConfig) -> Result<()> {
        Err(BookGeneratorError::Other(
            "downloading models is not meaningful for an embedded inference server".to_string(),
        ))
    }
}
