//! CLI entrypoint: runs the whole pipeline for one story from a prompt file.

use book_generator::{generate_book_with_dir, generate_pdf_and_epub, render_book, Config};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "book-generator-cli", about = "Generate a book from a prompt file")]
struct Args {
    /// Path to the text file holding the story's creative brief.
    prompt_file: PathBuf,

    /// Directory to write savepoints, the rendered book, and exports into.
    #[arg(long)]
    output_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();

    let prompt_text = match std::fs::read_to_string(&args.prompt_file) {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => {
            tracing::error!(path = %args.prompt_file.display(), "prompt file is empty");
            return ExitCode::FAILURE;
        }
        Err(e) => {
            tracing::error!(path = %args.prompt_file.display(), error = %e, "failed to read prompt file");
            return ExitCode::FAILURE;
        }
    };

    let title = args
        .prompt_file
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("untitled-story")
        .replace(['_', '-'], " ");

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "failed to load configuration");
            return ExitCode::FAILURE;
        }
    };

    let output_dir = args
        .output_dir
        .unwrap_or_else(|| PathBuf::from("output").join(book_generator::utils::file_utils::sanitize_filename(&title)));

    match run(title, prompt_text, config, output_dir).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "book generation failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(
    title: String,
    prompt_text: String,
    config: Config,
    output_dir: PathBuf,
) -> book_generator::Result<()> {
    let (book, tracker) = generate_book_with_dir(title.clone(), prompt_text, &config, &output_dir, true).await?;
    render_book(&book, &output_dir, Some(&tracker)).await?;
    if let Err(e) = generate_pdf_and_epub(&output_dir, &title, "AuthorWorks User") {
        tracing::warn!(error = %e, "pdf/epub export failed");
    }
    Ok(())
}
