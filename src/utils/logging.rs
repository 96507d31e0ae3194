//! Prompt/response logging and running token accounting for one pipeline run.

use crate::error::Result;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::info;

/// Accumulates prompt/completion token counts across an entire run so a
/// final summary can be reported alongside the rendered book.
#[derive(Debug, Default)]
pub struct TokenTracker {
    prompt_tokens: AtomicU64,
    completion_tokens: AtomicU64,
}

impl TokenTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, prompt_tokens: u64, completion_tokens: u64) {
        self.prompt_tokens.fetch_add(prompt_tokens, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion_tokens, Ordering::Relaxed);
    }

    pub fn prompt_tokens(&self) -> u64 {
        self.prompt_tokens.load(Ordering::Relaxed)
    }

    pub fn completion_tokens(&self) -> u64 {
        self.completion_tokens.load(Ordering::Relaxed)
    }

    pub fn total_tokens(&self) -> u64 {
        self.prompt_tokens() + self.completion_tokens()
    }
}

/// Writes the rendered prompt template for a pipeline stage to `<output_dir>/logs/`,
/// for post-hoc inspection of what was actually sent to the model.
pub fn log_prompt(output_dir: &Path, stage: &str, template: &str, rendered_context: &str) -> Result<()> {
    let logs_dir = output_dir.join("logs");
    fs::create_dir_all(&logs_dir)?;
    let path = logs_dir.join(format!("{stage}_prompt.log"));
    fs::write(path, format!("=== template ===\n{template}\n\n=== context ===\n{rendered_context}\n"))?;
    Ok(())
}

/// Writes the model's response for a stage and records its token usage.
pub fn log_with_tracker(
    output_dir: &Path,
    stage: &str,
    response: &str,
    prompt_tokens: u64,
    completion_tokens: u64,
    tracker: &TokenTracker,
) -> Result<()> {
    let logs_dir = output_dir.join("logs");
    fs::create_dir_all(&logs_dir)?;
    let path = logs_dir.join(format!("{stage}_response.log"));
    fs::write(path, response)?;
    tracker.record(prompt_tokens, completion_tokens);
    info!(
        stage,
        prompt_tokens, completion_tokens, "recorded generation tokens"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_across_multiple_records() {
        let tracker = TokenTracker::new();
        tracker.record(100, 50);
        tracker.record(20, 10);
        assert_eq!(tracker.prompt_tokens(), 120);
        assert_eq!(tracker.completion_tokens(), 60);
        assert_eq!(tracker.total_tokens(), 180);
    }

    #[test]
    fn log_prompt_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        log_prompt(dir.path(), "genre_generation", "template text", "context text").unwrap();
        let content = fs::read_to_string(dir.path().join("logs/genre_generation_prompt.log")).unwrap();
        assert!(content.contains("template text"));
        assert!(content.contains("context text"));
    }
}
