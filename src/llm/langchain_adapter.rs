//! Delegated backend (`langchain://<provider>/<model>`) routing through
//! `langchain_rust` chat models, for any provider not given its own direct
//! backend above.

use super::options::strip_think_tags;
use super::{GenerateOptions, Message, ModelConfig, ModelProvider, Role};
use crate::config::Config;
use crate::error::{BookGeneratorError, Result};
use async_trait::async_trait;
use futures_core::stream::BoxStream;
use langchain_rust::language_models::llm::LLM;
use langchain_rust::llm::openai::{OpenAI, OpenAIConfig};
use langchain_rust::schemas::Message as LcMessage;

pub struct LangchainAdapterProvider {
    api_key: String,
}

impl LangchainAdapterProvider {
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self {
            api_key: config.openai_api_key.clone(),
        })
    }

    fn build_llm(&self, model: &ModelConfig) -> OpenAI<OpenAIConfig> {
        let mut cfg = OpenAIConfig::default().with_api_key(self.api_key.clone());
        if let Some(host) = &model.host {
            cfg = cfg.with_api_base(format!("https://{host}"));
        }
        OpenAI::new(cfg).with_model(model.model.clone())
    }

    fn to_lc_messages(messages: &[Message]) -> Vec<LcMessage> {
        messages
            .iter()
            .map(|m| match m.role {
                Role::System => LcMessage::new_system_message(&m.content),
                Role::User => LcMessage::new_human_message(&m.content),
                Role::Assistant => LcMessage::new_ai_message(&m.content),
            })
            .collect()
    }
}

#[async_trait]
impl ModelProvider for LangchainAdapterProvider {
    async fn generate_text(
        &self,
        messages: &[Message],
        model: &ModelConfig,
        _opts: &GenerateOptions,
    ) -> Result<String> {
        let llm = self.build_llm(model);
        let lc_messages = Self::to_lc_messages(messages);
        let result = llm
            .generate(&lc_messages)
            .await
            .map_err(|e| BookGeneratorError::ProviderTransport(e.to_string()))?;
        Ok(strip_think_tags(&result.generation))
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

    async fn is_model_available(&self, _model: &ModelConfig) -> Result<bool> {
        Ok(true)
    }

    async fn download_model(&self, _model: &ModelConfig) -> Result<()> {
        Err(BookGeneratorError::Other(
            "downloading models is not meaningful for a delegated adapter backend".to_string(),
        ))
    }
}
