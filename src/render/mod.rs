//! Presentational markdown/book-rendering layer: mdBook assembly plus an
//! optional pandoc-driven PDF/EPUB export. Out of scope as a *feature* —
//! kept in the teacher's idiom, simplified to assemble from `Book`/`Chapter`/`Scene`.

use crate::book::{Book, Chapter, Scene};
use crate::error::{BookGeneratorError, Result};
use crate::utils::file_utils::sanitize_filename;
use crate::utils::logging::TokenTracker;
use crate::utils::statistics::BookStatistics;
use crate::utils::string_utils::clean_chapter_title;
use mdbook::config::Config as MDBookConfig;
use mdbook::MDBook;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::info;

pub struct BookRenderer {
    output_dir: PathBuf,
}

impl BookRenderer {
    pub fn new(output_dir: PathBuf) -> Self {
        Self { output_dir }
    }

    pub async fn render(&self, book: &Book, token_tracker: Option<&TokenTracker>) -> Result<()> {
        let statistics = match token_tracker {
            Some(tracker) => BookStatistics::with_tokens(book, tracker),
            None => BookStatistics::new(book),
        };
        statistics.update_metadata(&self.output_dir)?;
        statistics.save_to_file(&self.output_dir)?;

        info!(
            words = statistics.total_words,
            pages = statistics.estimated_pages,
            chapters = statistics.total_chapters,
            scenes = statistics.total_scenes,
            "book statistics"
        );

        let book_dir = self.output_dir.join("book");
        let src_dir = self.output_dir.join("src");
        fs::create_dir_all(&book_dir)
            .map_err(|e| BookGeneratorError::Other(format!("failed to create book directory: {e}")))?;
        fs::create_dir_all(&src_dir)
            .map_err(|e| BookGeneratorError::Other(format!("failed to create src directory: {e}")))?;

        let summary_content = self.generate_summary(book);
        fs::write(book_dir.join("SUMMARY.md"), &summary_content)
            .map_err(|e| BookGeneratorError::Other(format!("failed to write book/SUMMARY.md: {e}")))?;
        fs::write(src_dir.join("SUMMARY.md"), &summary_content)
            .map_err(|e| BookGeneratorError::Other(format!("failed to write src/SUMMARY.md: {e}")))?;

        for (i, chapter) in book.chapters.iter().enumerate() {
            let chapter_content = self.format_chapter(chapter);
            let chapter_filename = format!("chapter_{}.md", i + 1);
            fs::write(book_dir.join(&chapter_filename), &chapter_content)
                .map_err(|e| BookGeneratorError::Other(format!("failed to write chapter file: {e}")))?;
            fs::write(src_dir.join(&chapter_filename), &chapter_content)
                .map_err(|e| BookGeneratorError::Other(format!("failed to write chapter file: {e}")))?;
        }

        let mut config = MDBookConfig::default();
        config.book.title = Some(format!("{} - A Novel", book.story_name));
        config.book.authors = vec!["Book Generator".to_string()];
        config.book.description = Some(statistics.to_string());
        config.book.src = book_dir
            .strip_prefix(&self.output_dir)
            .unwrap_or_else(|_| Path::new("book"))
            .to_path_buf();

        let md_book = MDBook::load_with_config(&self.output_dir, config)
            .map_err(|e| BookGeneratorError::Other(format!("failed to load MDBook: {e}")))?;
        md_book
            .build()
            .map_err(|e| BookGeneratorError::Other(format!("failed to build MDBook: {e}")))?;

        // mdBook's build occasionally relocates SUMMARY.md; restore it if so.
        for (dir, other) in [(&book_dir, &src_dir), (&src_dir, &book_dir)] {
            if !dir.join("SUMMARY.md").exists() {
                if other.join("SUMMARY.md").exists() {
                    fs::copy(other.join("SUMMARY.md"), dir.join("SUMMARY.md"))
                        .map_err(|e| BookGeneratorError::Other(format!("failed to restore SUMMARY.md: {e}")))?;
                } else {
                    fs::write(dir.join("SUMMARY.md"), &summary_content)
                        .map_err(|e| BookGeneratorError::Other(format!("failed to regenerate SUMMARY.md: {e}")))?;
                }
            }
        }

        let html_stats_path = self.output_dir.join("book").join("html").join("statistics.html");
        if let Some(parent) = html_stats_path.parent() {
            if parent.exists() {
                let html_content = format!(
                    "<!DOCTYPE html>\n<html>\n<head>\n<title>Book Statistics</title>\n</head>\n<body>\n<h1>Book Statistics</h1>\n<pre>{statistics}</pre>\n</body>\n</html>"
                );
                fs::write(html_stats_path, html_content)
                    .map_err(|e| BookGeneratorError::Other(format!("failed to write statistics HTML: {e}")))?;
            }
        }

        Ok(())
    }

    fn generate_summary(&self, book: &Book) -> String {
        let mut summary = String::from("# Summary\n\n- [Statistics](statistics.html)\n");
        for (i, chapter) in book.chapters.iter().enumerate() {
            summary.push_str(&format!("- [{}](chapter_{}.md)\n", chapter.title, i + 1));
        }
        summary
    }

    fn format_chapter(&self, chapter: &Chapter) -> String {
        let mut content = format!("# {}\n\n", chapter.title);
        if !chapter.outline.text.is_empty() {
            content.push_str(&format!("*{}*\n\n", chapter.outline.text));
        }
        for scene in &chapter.scenes {
            content.push_str(&self.format_scene(scene));
            content.push_str("\n\n");
        }
        content
    }

    fn format_scene(&self, scene: &Scene) -> String {
        scene.to_string()
    }
}

/// Concatenates all rendered chapters into a single pandoc-ready markdown
/// file and invokes `pandoc` to produce a PDF and an EPUB. A missing
/// SUMMARY.md or a missing `pandoc` binary degrades to a no-op with a
/// warning rather than failing the run.
pub fn generate_pdf_and_epub(output_dir: &Path, book_title: &str, author: &str) -> Result<()> {
    let book_dir = output_dir.join("book");
    let src_dir = output_dir.join("src");
    let (summary_path, content_dir) = if book_dir.join("SUMMARY.md").exists() {
        (book_dir.join("SUMMARY.md"), book_dir.clone())
    } else if src_dir.join("SUMMARY.md").exists() {
        (src_dir.join("SUMMARY.md"), src_dir.clone())
    } else {
        info!("SUMMARY.md not found; skipping PDF/EPUB export");
        return Ok(());
    };

    let mut full_content = String::new();
    full_content.push_str("---\n");
    full_content.push_str(&format!("title: {book_title}\n"));
    full_content.push_str(&format!("author: {author}\n"));
    full_content.push_str("lang: en-US\n");
    full_content.push_str("documentclass: book\n");
    full_content.push_str("toc-title: Contents\n");
    full_content.push_str("---\n\n");

    let summary_content = fs::read_to_string(&summary_path)?;
    let mut processed = HashSet::new();
    let mut chapter_idx = 0usize;
    for line in summary_content.lines() {
        let Some((title, file)) = line
            .trim()
            .strip_prefix("- [")
            .and_then(|s| s.split_once("]("))
        else {
            continue;
        };
        let file = file.trim_end_matches(')');
        if title.contains("Statistics") || file.contains("statistics.html") {
            continue;
        }
        if !processed.insert(title.to_string()) {
            continue;
        }
        chapter_idx += 1;

        let chapter_path = content_dir.join(file);
        let Ok(raw) = fs::read_to_string(&chapter_path) else {
            continue;
        };
        let clean_title = clean_chapter_title(title);
        full_content.push_str(&format!("# Chapter {chapter_idx}: {clean_title}\n\n"));
        full_content.push_str(raw.lines().skip(1).collect::<Vec<_>>().join("\n").trim());
        full_content.push_str("\n\n\\newpage\n\n");
    }

    let temp_file_path = output_dir.join("full_book_content.md");
    fs::write(&temp_file_path, &full_content)?;

    let sanitized_title = sanitize_filename(book_title);
    let pdf_output = format!("{sanitized_title}.pdf");
    let epub_output = format!("{sanitized_title}.epub");

    let pdf_status = Command::new("pandoc")
        .args([
            "-o",
            &pdf_output,
            temp_file_path.to_str().unwrap_or_default(),
            "--pdf-engine=xelatex",
            "--toc",
            "--standalone",
        ])
        .current_dir(output_dir)
        .status();
    match pdf_status {
        Ok(status) if status.success() => info!(%pdf_output, "pdf export complete"),
        Ok(status) => info!(%status, "pdf export failed"),
        Err(e) => info!(error = %e, "pandoc not available, skipping pdf export"),
    }

    let epub_status = Command::new("pandoc")
        .args([
            "-o",
            &epub_output,
            temp_file_path.to_str().unwrap_or_default(),
            "--from=markdown",
            "--to=epub3",
            "--toc",
            "--standalone",
        ])
        .current_dir(output_dir)
        .status();
    match epub_status {
        Ok(status) if status.success() => info!(%epub_output, "epub export complete"),
        Ok(status) => info!(%status, "epub export failed"),
        Err(e) => info!(error = %e, "pandoc not available, skipping epub export"),
    }

    let _ = fs::remove_file(&temp_file_path);
    Ok(())
}

pub async fn render_book(book: &Book, output_dir: &Path, token_tracker: Option<&TokenTracker>) -> Result<()> {
    let renderer = BookRenderer::new(output_dir.to_path_buf());
    renderer.render(book, token_tracker).await
}
