//! Word/scene/chapter counts computed over a finished [`Book`], for the
//! renderer's summary page and metadata sidecar.

use crate::book::Book;
use crate::error::Result;
use crate::utils::logging::TokenTracker;
use std::fmt;
use std::fs;
use std::path::Path;

const WORDS_PER_PAGE: usize = 275;

#[derive(Debug, Clone, Default)]
pub struct BookStatistics {
    pub total_words: usize,
    pub total_characters: usize,
    pub estimated_pages: usize,
    pub total_chapters: usize,
    pub total_scenes: usize,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

impl BookStatistics {
    pub fn new(book: &Book) -> Self {
        Self::compute(book, None)
    }

    pub fn with_tokens(book: &Book, tracker: &TokenTracker) -> Self {
        Self::compute(book, Some(tracker))
    }

    fn compute(book: &Book, tracker: Option<&TokenTracker>) -> Self {
        let total_words: usize = book
            .chapters
            .iter()
            .map(|c| c.content.split_whitespace().count())
            .sum();
        let total_characters: usize = book.chapters.iter().map(|c| c.content.chars().count()).sum();
        let total_scenes: usize = book.chapters.iter().map(|c| c.scenes.len()).sum();

        Self {
            total_words,
            total_characters,
            estimated_pages: total_words.div_ceil(WORDS_PER_PAGE).max(1),
            total_chapters: book.chapters.len(),
            total_scenes,
            prompt_tokens: tracker.map(|t| t.prompt_tokens()).unwrap_or(0),
            completion_tokens: tracker.map(|t| t.completion_tokens()).unwrap_or(0),
        }
    }

    pub fn save_to_file(&self, output_dir: &Path) -> Result<()> {
        fs::write(output_dir.join("statistics.txt"), self.to_string())?;
        Ok(())
    }

    /// Appends/updates the `## Statistics` section of `<output_dir>/metadata.md`,
    /// leaving any other sections untouched.
    pub fn update_metadata(&self, output_dir: &Path) -> Result<()> {
        let path = output_dir.join("metadata.md");
        let existing = fs::read_to_string(&path).unwrap_or_default();
        let mut kept: Vec<&str> = Vec::new();
        let mut skipping = false;
        for line in existing.lines() {
            if line.starts_with("## Statistics") {
                skipping = true;
                continue;
            }
            if skipping && line.starts_with("## ") {
                skipping = false;
            }
            if !skipping {
                kept.push(line);
            }
        }
        let mut content = kept.join("\n");
        if !content.is_empty() {
            content.push_str("\n\n");
        }
        content.push_str(&format!("## Statistics\n{self}\n"));
        fs::write(path, content)?;
        Ok(())
    }
}

impl fmt::Display for BookStatistics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Total words: {}", self.total_words)?;
        writeln!(f, "Total characters: {}", self.total_characters)?;
        writeln!(f, "Estimated pages: {}", self.estimated_pages)?;
        writeln!(f, "Chapters: {}", self.total_chapters)?;
        writeln!(f, "Scenes: {}", self.total_scenes)?;
        if self.prompt_tokens > 0 || self.completion_tokens > 0 {
            writeln!(
                f,
                "Tokens used: {} prompt + {} completion",
                self.prompt_tokens, self.completion_tokens
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::book::{Chapter, ChapterOutline};

    fn sample_book() -> Book {
        Book {
            story_name: "test-story".to_string(),
            chapters: vec![Chapter {
                number: 1,
                title: "Beginnings".to_string(),
                outline: ChapterOutline::default(),
                scenes: vec![Default::default(), Default::default()],
                content: "one two three four five".to_string(),
                recap: String::new(),
            }],
            ..Default::default()
        }
    }

    #[test]
    fn computes_word_and_scene_counts() {
        let stats = BookStatistics::new(&sample_book());
        assert_eq!(stats.total_words, 5);
        assert_eq!(stats.total_chapters, 1);
        assert_eq!(stats.total_scenes, 2);
        assert_eq!(stats.estimated_pages, 1);
    }

    #[test]
    fn update_metadata_preserves_other_sections() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("metadata.md"), "## Genre\nFantasy\n").unwrap();
        BookStatistics::new(&sample_book()).update_metadata(dir.path()).unwrap();
        let content = fs::read_to_string(dir.path().join("metadata.md")).unwrap();
        assert!(content.contains("## Genre"));
        assert!(content.contains("## Statistics"));
    }
}
