//! Local Ollama daemon backend (`ollama://`).

use super::options::{resolve_context_length, resolve_seed, strip_think_tags, temperature_for, ThinkTagFilter};
use super::{GenerateOptions, Message, ModelConfig, ModelProvider, Role};
use crate::config::Config;
use crate::error::{BookGeneratorError, Result};
use async_trait::async_trait;
use futures::StreamExt;
use futures_core::stream::BoxStream;
use ollama_rs::generation::chat::{request::ChatMessageRequest, ChatMessage};
use ollama_rs::generation::options::GenerationOptions;
use ollama_rs::Ollama;

pub struct OllamaProvider {
    client: Ollama,
    default_context_length: usize,
    randomize_seed: bool,
}

impl OllamaProvider {
    pub fn new(config: &Config) -> Self {
        let client = Ollama::try_new(config.rag.ollama_host.clone())
            .unwrap_or_else(|_| Ollama::default());
        Self {
            client,
            default_context_length: config.default_context_length,
            randomize_seed: config.randomize_seed,
        }
    }

    fn chat_messages(messages: &[Message]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|m| match m.role {
                Role::System => ChatMessage::system(m.content.clone()),
                Role::User => ChatMessage::user(m.content.clone()),
                Role::Assistant => ChatMessage::assistant(m.content.clone()),
            })
            .collect()
    }

    fn request(&self, messages: &[Message], model: &ModelConfig, opts: &GenerateOptions) -> ChatMessageRequest {
        let num_ctx = resolve_context_length(model, self.default_context_length, 131_072);
        let seed = resolve_seed(model, opts.seed, self.randomize_seed);

        let mut gen_opts = GenerationOptions::default()
            .temperature(temperature_for(opts))
            .num_ctx(num_ctx as u64);
        if let Some(seed) = seed {
            gen_opts = gen_opts.seed(seed as i32);
        }

        let mut req = ChatMessageRequest::new(model.model.clone(), Self::chat_messages(messages))
            .options(gen_opts);
        if opts.format_json {
            req = req.format(ollama_rs::generation::parameters::FormatType::Json);
        }
        req
    }
}

#[async_trait]
impl ModelProvider for OllamaProvider {
    async fn generate_text(
        &self,
        messages: &[Message],
        model: &ModelConfig,
        opts: &GenerateOptions,
    ) -> Result<String> {
        let req = self.request(messages, model, opts);
        let response = self
            .client
            .send_chat_messages(req)
            .await
            .map_err(|e| BookGeneratorError::ProviderTransport(e.to_string()))?;
        Ok(strip_think_tags(&response.message.content))
    }

    async fn stream_text(
        &self,
        messages: &[Message],
        model: &ModelConfig,
        opts: &GenerateOptions,
    ) -> Result<BoxStream<'static, Result<String>>> {
        let req = self.request(messages, model, opts);
        let client = self.client.clone();
        let stream = async_stream_from_ollama(client, req).await?;
        Ok(stream)
    }

    async fn is_model_available(&self, model: &ModelConfig) -> Result<bool> {
        let models = self
            .client
            .list_local_models()
            .await
            .map_err(|e| BookGeneratorError::ProviderTransport(e.to_string()))?;
        Ok(models.iter().any(|m| m.name == model.model))
    }

    async fn download_model(&self, model: &ModelConfig) -> Result<()> {
        self.client
            .pull_model(model.model.clone(), false)
            .await
            .map_err(|e| BookGeneratorError::ProviderTransport(e.to_string()))?;
        Ok(())
    }
}

async fn async_stream_from_ollama(
    client: Ollama,
    req: ChatMessageRequest,
) -> Result<BoxStream<'static, Result<String>>> {
    let stream = client
        .send_chat_messages_stream(req)
        .await
        .map_err(|e| BookGeneratorError::ProviderTransport(e.to_string()))?;

    let mut filter = ThinkTagFilter::new();
    let mapped = stream.map(move |item| {
        let chunk = item
            .map_err(|_| BookGeneratorError::ProviderTransport("ollama stream error".to_string()))?
            .message
            .content;
        Ok(filter.push(&chunk))
    });
    Ok(Box::pin(mapped))
}
