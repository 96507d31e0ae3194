//! Shared option handling applied by every backend before a call: context
//! clamping, seed randomization, token estimation, and thinking-tag
//! stripping. Kept in one place so the five backends don't each
//! reimplement it.

use super::{GenerateOptions, Message, ModelConfig};
use rand::Rng;
use tracing::warn;

pub const DEFAULT_TEMPERATURE: f32 = 0.7;
pub const DEFAULT_TOP_P: f32 = 0.9;
pub const JSON_MODE_TEMPERATURE: f32 = 0.0;

/// If `num_ctx`/`max_tokens` is absent, inject the configured default; if
/// present and greater than the backend's cap, warn and clamp.
pub fn resolve_context_length(model: &ModelConfig, default_context: usize, backend_cap: usize) -> usize {
    match model.context_length() {
        None => default_context,
        Some(requested) if requested > backend_cap => {
            warn!(
                requested,
                backend_cap, "requested context length exceeds backend cap; clamping"
            );
            backend_cap
        }
        Some(requested) => requested,
    }
}

/// If `randomize_seed` is enabled and the model is not tagged `static_seed`,
/// add a random offset in [1, 10000] for variety; otherwise pass through.
pub fn resolve_seed(model: &ModelConfig, seed: Option<i64>, randomize: bool) -> Option<i64> {
    let seed = seed?;
    if randomize && !model.is_static_seed() {
        let offset: i64 = rand::thread_rng().gen_range(1..=10_000);
        Some(seed + offset)
    } else {
        Some(seed)
    }
}

pub fn temperature_for(opts: &GenerateOptions) -> f32 {
    if opts.format_json {
        JSON_MODE_TEMPERATURE
    } else {
        DEFAULT_TEMPERATURE
    }
}

/// Families whose backends expose a distinct "thinking" channel that should
/// be enabled when available.
const THINKING_MODEL_MARKERS: &[&str] = &["deepseek-r1", "qwq", "o1", "o3"];

pub fn is_thinking_model(model: &ModelConfig) -> bool {
    let name = model.model.to_lowercase();
    THINKING_MODEL_MARKERS.iter().any(|m| name.contains(m))
}

/// Strips `<think>...</think>` spans (and their partial/unterminated forms)
/// from model output.
pub fn strip_think_tags(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        match rest.find("<think>") {
            Some(start) => {
                out.push_str(&rest[..start]);
                match rest[start..].find("</think>") {
                    Some(end_rel) => {
                        rest = &rest[start + end_rel + "</think>".len()..];
                    }
                    None => {
                        // Unterminated thinking block: drop the remainder entirely.
                        rest = "";
                        break;
                    }
                }
            }
            None => {
                out.push_str(rest);
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Incremental think-tag filter for use across streamed chunk boundaries.
#[derive(Debug, Default)]
pub struct ThinkTagFilter {
    buffer: String,
    in_think: bool,
}

impl ThinkTagFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk; returns the portion that is safe to emit now.
    pub fn push(&mut self, chunk: &str) -> String {
        self.buffer.push_str(chunk);
        let mut emit = String::new();
        loop {
            if self.in_think {
                if let Some(end) = self.buffer.find("</think>") {
                    self.buffer.drain(..end + "</think>".len());
                    self.in_think = false;
                } else {
                    break;
                }
            } else if let Some(start) = self.buffer.find("<think>") {
                emit.push_str(&self.buffer[..start]);
                self.buffer.drain(..start + "<think>".len());
                self.in_think = true;
            } else {
                // Keep a tail that could be the start of a split "<think>" tag.
                let keep = "<think>".len().saturating_sub(1);
                let safe_len = self.buffer.len().saturating_sub(keep);
                emit.push_str(&self.buffer[..safe_len]);
                self.buffer.drain(..safe_len);
                break;
            }
        }
        emit
    }

    /// Flush any remaining buffered content at end of stream.
    pub fn finish(mut self) -> String {
        if self.in_think {
            String::new()
        } else {
            std::mem::take(&mut self.buffer)
        }
    }
}

/// words * 1.33 + 10 * message_count, used when no BPE tokenizer is available.
pub fn estimate_tokens_fallback(messages: &[Message]) -> usize {
    let words: usize = messages
        .iter()
        .map(|m| m.content.split_whitespace().count())
        .sum();
    (words as f32 * 1.33) as usize + 10 * messages.len()
}

/// Best-effort BPE estimate via `tiktoken-rs`, falling back to the word
/// heuristic if the encoder can't be constructed for this model.
pub fn estimate_tokens(messages: &[Message], model_hint: &str) -> usize {
    let _ = model_hint;
    match tiktoken_rs::cl100k_base().ok() {
        Some(bpe) => {
            messages
                .iter()
                .map(|m| bpe.encode_with_special_tokens(&m.content).len())
                .sum::<usize>()
                + 10 * messages.len()
        }
        None => estimate_tokens_fallback(messages),
    }
}

/// Warn at >=80% of context length, info at >=60%.
pub fn log_token_usage(estimated: usize, context_length: usize) {
    if context_length == 0 {
        return;
    }
    let ratio = estimated as f32 / context_length as f32;
    if ratio >= 0.8 {
        warn!(estimated, context_length, "token usage at or above 80% of context length");
    } else if ratio >= 0.6 {
        tracing::info!(estimated, context_length, "token usage at or above 60% of context length");
    }
}

/// `min_words` continuation: if `text` has fewer whitespace tokens than
/// required, returns a synthetic continuation request; otherwise `None`.
pub fn continuation_request(text: &str, min_words: Option<usize>) -> Option<String> {
    let min_words = min_words?;
    if text.split_whitespace().count() >= min_words {
        return None;
    }
    Some(format!(
        "Your previous response was too short ({} words required). Please continue and expand your answer.",
        min_words
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_complete_think_block() {
        let out = strip_think_tags("before<think>hidden reasoning</think>after");
        assert_eq!(out, "beforeafter");
        assert!(!out.contains("<think>"));
        assert!(!out.contains("</think>"));
    }

    #[test]
    fn strips_multiple_think_blocks() {
        let out = strip_think_tags("a<think>x</think>b<think>y</think>c");
        assert_eq!(out, "abc");
    }

    #[test]
    fn drops_unterminated_think_block() {
        let out = strip_think_tags("keep this<think>never closes");
        assert_eq!(out, "keep this");
    }

    #[test]
    fn streaming_filter_handles_split_tag_boundary() {
        let mut filter = ThinkTagFilter::new();
        let mut out = String::new();
        out.push_str(&filter.push("hello <thi"));
        out.push_str(&filter.push("nk>secret</thi"));
        out.push_str(&filter.push("nk> world"));
        out.push_str(&filter.finish());
        assert_eq!(out, "hello  world");
    }

    #[test]
    fn resolve_context_length_clamps_above_cap() {
        let model = ModelConfig::parse("ollama://m?num_ctx=100000").unwrap();
        assert_eq!(resolve_context_length(&model, 4096, 8192), 8192);
    }

    #[test]
    fn resolve_context_length_uses_default_when_absent() {
        let model = ModelConfig::parse("ollama://m").unwrap();
        assert_eq!(resolve_context_length(&model, 4096, 8192), 4096);
    }

    #[test]
    fn static_seed_passes_through_unmodified() {
        let model = ModelConfig::parse("ollama://m?static_seed=true").unwrap();
        assert_eq!(resolve_seed(&model, Some(42), true), Some(42));
    }

    #[test]
    fn continuation_request_triggers_below_min_words() {
        assert!(continuation_request("too short", Some(10)).is_some());
        assert!(continuation_request("one two three four five six seven eight nine ten", Some(10)).is_none());
    }
}
