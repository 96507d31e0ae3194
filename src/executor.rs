//! Glue between the savepoint store, prompt registry, and model provider
//! (C4). Every pipeline stage flows through `execute`.

use crate::error::Result;
use crate::llm::{parse_json_lenient, ExecResult, GenerateOptions, Message, ModelConfig, ModelProvider};
use crate::prompts::PromptRegistry;
use crate::savepoint::{SavepointStore, SavepointValue};
use std::collections::HashMap;

/// What to execute: a registry-backed template, or an explicit transcript
/// (used by the multi-step conversations in C10/C12).
pub enum ExecInput<'a> {
    Prompt {
        prompt_id: &'a str,
        variables: HashMap<String, String>,
    },
    Transcript(Vec<Message>),
}

pub struct ExecRequest<'a> {
    pub input: ExecInput<'a>,
    pub savepoint_id: Option<&'a str>,
    pub system_message: Option<&'a str>,
    pub model_config: &'a ModelConfig,
    pub options: GenerateOptions,
    pub expect_json: bool,
    pub required_attrs: Vec<String>,
}

pub struct PromptExecutor<'a> {
    pub savepoints: &'a SavepointStore,
    pub prompts: &'a PromptRegistry,
    pub provider: &'a dyn ModelProvider,
}

impl<'a> PromptExecutor<'a> {
    pub fn new(
        savepoints: &'a SavepointStore,
        prompts: &'a PromptRegistry,
        provider: &'a dyn ModelProvider,
    ) -> Self {
        Self {
            savepoints,
            prompts,
            provider,
        }
    }

    pub async fn execute(&self, req: ExecRequest<'_>) -> Result<ExecResult> {
        // Step 1: a savepoint hit short-circuits everything — no model call.
        if let Some(id) = req.savepoint_id {
            if let Some(value) = self.savepoints.load(id)? {
                return Ok(ExecResult {
                    content: value.into_string(),
                    json_parsed: true,
                    json_errors: None,
                });
            }
        }

        // Step 2: build messages.
        let mut messages = Vec::new();
        if let Some(sys) = req.system_message {
            messages.push(Message::system(sys));
        }
        match &req.input {
            ExecInput::Prompt {
                prompt_id,
                variables,
            } => {
                let text = self.prompts.load(prompt_id, variables)?;
                messages.push(Message::user(text));
            }
            ExecInput::Transcript(transcript) => {
                messages.extend(transcript.iter().cloned());
            }
        }

        // Step 3/4: invoke the provider, validating JSON if requested.
        let (content, json_parsed, json_errors) = if req.expect_json {
            match self
                .provider
                .generate_json(&messages, req.model_config, &req.required_attrs, &req.options)
                .await
            {
                Ok(value) => (value.to_string(), true, None),
                Err(e) => {
                    // Retry the raw text path so we still have *something* to save.
                    let raw = self
                        .provider
                        .generate_text(&messages, req.model_config, &req.options)
                        .await?;
                    match parse_json_lenient(&raw) {
                        Ok(value) => (value.to_string(), true, None),
                        Err(_) => (raw, false, Some(e.to_string())),
                    }
                }
            }
        } else {
            let text = self
                .provider
                .generate_text(&messages, req.model_config, &req.options)
                .await?;
            (text, false, None)
        };

        // Step 5: persist.
        if let Some(id) = req.savepoint_id {
            self.savepoints
                .save(id, SavepointValue::from(content.clone()))?;
        }

        Ok(ExecResult {
            content,
            json_parsed,
            json_errors,
        })
    }
}
