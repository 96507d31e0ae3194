//! Dotted-id template registry (C2).

pub mod registry;

pub use registry::PromptRegistry;
