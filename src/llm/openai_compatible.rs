//! OpenAI-compatible HTTP backend (`openai-compatible://`).

use super::options::{resolve_context_length, strip_think_tags, temperature_for};
use super::{GenerateOptions, Message, ModelConfig, ModelProvider, Role};
use crate::config::Config;
use crate::error::{BookGeneratorError, Result};
use async_openai::config::OpenAIConfig;
use async_openai::types::{
    ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
    ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
    CreateChatCompletionRequestArgs, ResponseFormat,
};
use async_openai::Client;
use async_trait::async_trait;
use futures_core::stream::BoxStream;

pub struct OpenAiCompatibleProvider {
    api_key: String,
    default_context_length: usize,
}

impl OpenAiCompatibleProvider {
    pub fn new(config: &Config) -> Self {
        Self {
            api_key: config.openai_api_key.clone(),
            default_context_length: config.default_context_length,
        }
    }

    fn client(&self, model: &ModelConfig) -> Client<OpenAIConfig> {
        let mut cfg = OpenAIConfig::new().with_api_key(self.api_key.clone());
        if let Some(host) = &model.host {
            cfg = cfg.with_api_base(format!("https://{host}"));
        }
        Client::with_config(cfg)
    }

    fn to_request_messages(messages: &[Message]) -> Result<Vec<ChatCompletionRequestMessage>> {
        messages
            .iter()
            .map(|m| -> Result<ChatCompletionRequestMessage> {
                Ok(match m.role {
                    Role::System => ChatCompletionRequestSystemMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(|e| BookGeneratorError::ProviderTransport(e.to_string()))?
                        .into(),
                    Role::User => ChatCompletionRequestUserMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(|e| BookGeneratorError::ProviderTransport(e.to_string()))?
                        .into(),
                    Role::Assistant => ChatCompletionRequestAssistantMessageArgs::default()
                        .content(m.content.clone())
                        .build()
                        .map_err(|e| BookGeneratorError::ProviderTransport(e.to_string()))?
                        .into(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl ModelProvider for OpenAiCompatibleProvider {
    async fn generate_text(
        &self,
        messages: &[Message],
        model: &ModelConfig,
        opts: &GenerateOptions,
    ) -> Result<String> {
        let client = self.client(model);
        let num_ctx = resolve_context_length(model, self.default_context_length, 128_000);

        let mut builder = CreateChatCompletionRequestArgs::default();
        builder
            .model(model.model.clone())
            .messages(Self::to_request_messages(messages)?)
            .temperature(temperature_for(opts))
            .max_tokens(num_ctx as u32);

        if opts.format_json {
            builder.response_format(ResponseFormat::JsonObject);
        }

        let request = builder
            .build()
            .map_err(|e| BookGeneratorError::ProviderTransport(e.to_string()))?;

        let response = client
            .chat()
            .create(request)
            .await
            .map_err(|e| BookGeneratorError::ProviderTransport(e.to_string()))?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();

        Ok(strip_think_tags(&content))
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
        let client = self.client(model);
        match client.models().retrieve(&model.model).await {
            Ok(_) => Ok(true),
            Err(_) => Ok(false),
        }
    }

    async fn download_model(&self, _model: &ModelConfig) -> Result<()> {
        Err(BookGeneratorError::Other(
            "downloading models is not meaningful for an OpenAI-compatible HTTP backend".to_string(),
        ))
    }
}
