//! Progressive story-state sidecar (C14): an evolving JSON snapshot of
//! direction, characters, plot threads, and per-chapter outcomes, used only
//! when `config.progressive_story_state` opts into it. The primary pipeline
//! in [`crate::book::chapter`] never reads or writes this file.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoryContext {
    pub direction: String,
    pub themes: Vec<String>,
    pub tone: String,
    pub pacing: String,
    /// 1 (resolved) through 10 (maximally tense).
    pub tension: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CharacterState {
    pub status: String,
    pub location: String,
    pub knowledge: Vec<String>,
    pub goals: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PlotThread {
    pub description: String,
    pub status: String,
    pub introduced_chapter: usize,
    pub resolved_chapter: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChapterEntry {
    pub title: String,
    pub summary: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvolutionEvent {
    pub chapter_number: usize,
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoryState {
    pub context: StoryContext,
    pub characters: BTreeMap<String, CharacterState>,
    pub plot_threads: BTreeMap<String, PlotThread>,
    pub chapters: BTreeMap<usize, ChapterEntry>,
    pub evolution_log: Vec<EvolutionEvent>,
}

const STATE_FILENAME: &str = "story_state.json";

impl StoryState {
    pub fn load_or_default(output_dir: &Path) -> Self {
        Self::load(output_dir).unwrap_or_default()
    }

    pub fn load(output_dir: &Path) -> Result<Self> {
        let raw = fs::read_to_string(output_dir.join(STATE_FILENAME))?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn save(&self, output_dir: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(output_dir.join(STATE_FILENAME), content)?;
        Ok(())
    }

    pub fn record_chapter(&mut self, chapter_number: usize, title: &str, summary: &str) {
        self.chapters.insert(
            chapter_number,
            ChapterEntry {
                title: title.to_string(),
                summary: summary.to_string(),
            },
        );
    }

    pub fn log_event(&mut self, chapter_number: usize, description: impl Into<String>) {
        self.evolution_log.push(EvolutionEvent {
            chapter_number,
            description: description.into(),
        });
    }

    pub fn upsert_character(&mut self, name: &str, state: CharacterState) {
        self.characters.insert(name.to_string(), state);
    }

    pub fn active_plot_threads(&self) -> Vec<(&String, &PlotThread)> {
        self.plot_threads
            .iter()
            .filter(|(_, t)| t.resolved_chapter.is_none())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut state = StoryState::default();
        state.record_chapter(1, "Beginnings", "Our hero sets out.");
        state.log_event(1, "introduced the protagonist");
        state.save(dir.path()).unwrap();

        let loaded = StoryState::load(dir.path()).unwrap();
        assert_eq!(loaded.chapters[&1].title, "Beginnings");
        assert_eq!(loaded.evolution_log.len(), 1);
    }

    #[test]
    fn active_plot_threads_excludes_resolved() {
        let mut state = StoryState::default();
        state.plot_threads.insert(
            "mystery".to_string(),
            PlotThread {
                description: "who sent the letter".to_string(),
                status: "open".to_string(),
                introduced_chapter: 1,
                resolved_chapter: None,
            },
        );
        state.plot_threads.insert(
            "romance".to_string(),
            PlotThread {
                description: "will they reconcile".to_string(),
                status: "closed".to_string(),
                introduced_chapter: 1,
                resolved_chapter: Some(3),
            },
        );
        let active = state.active_plot_threads();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].0, "mystery");
    }
}
