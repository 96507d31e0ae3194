//! Book-level types and the generation pipelines that produce them (C10/C12/C13).

pub mod chapter;
pub mod entity_manager;
pub mod outline;
pub mod scene;

pub use scene::Scene;

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChapterOutline {
    pub chapter_number: usize,
    pub synopsis: String,
    pub text: String,
}

impl fmt::Display for ChapterOutline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chapter {}: {}", self.chapter_number, self.text)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Chapter {
    pub number: usize,
    pub title: String,
    pub outline: ChapterOutline,
    pub scenes: Vec<Scene>,
    pub content: String,
    pub recap: String,
}

impl fmt::Display for Chapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Chapter {}: {}\n\n{}", self.number, self.title, self.content)
    }
}

/// Shared context threaded through the outline and chapter pipelines:
/// everything produced once per story and reused by every later stage.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Context {
    pub story_name: String,
    pub prompt_text: String,
    pub story_elements: String,
    pub story_start_date: String,
    pub base_context: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Book {
    pub story_name: String,
    pub context: Context,
    pub chapters: Vec<Chapter>,
}
