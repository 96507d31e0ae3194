//! Standalone CLI driving the embedding-dimension migration routine.

use book_generator::rag::embedding::OllamaEmbeddingProvider;
use book_generator::rag::vector_store::{MigrationOutcome, VectorStore};
use book_generator::Config;
use clap::Parser;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "migrate-embeddings", about = "Migrate the content_chunks table to a new embedding model")]
struct Args {
    /// New embedding model, e.g. `ollama://mxbai-embed-large`.
    #[arg(long)]
    new_model: String,

    #[arg(long, default_value_t = false)]
    dry_run: bool,

    #[arg(long, default_value_t = false)]
    skip_cleanup: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let model_spec = match book_generator::llm::ModelConfig::parse(&args.new_model) {
        Ok(m) => m,
        Err(e) => {
            eprintln!("invalid --new-model '{}': {e}", args.new_model);
            return ExitCode::FAILURE;
        }
    };

    let mut new_config = config.clone();
    new_config.rag.embedding_model = model_spec.model.clone();
    if let Some(host) = &model_spec.host {
        new_config.rag.ollama_host = format!("http://{host}");
    }
    let new_embedding = OllamaEmbeddingProvider::new(&new_config);

    let mut vector_store = match VectorStore::connect(&config.rag.postgres_url, config.rag.vector_dimensions).await {
        Ok(vs) => vs,
        Err(e) => {
            eprintln!("failed to connect to the vector store: {e}");
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = vector_store.ensure_schema().await {
        eprintln!("failed to ensure schema: {e}");
        return ExitCode::FAILURE;
    }

    match vector_store.migrate_embeddings(&new_embedding, args.dry_run).await {
        Ok(outcome) => {
            match &outcome {
                MigrationOutcome::NoOpSameDimension { dimension } => {
                    println!("no-op: embedding dimension already {dimension}");
                }
                MigrationOutcome::DryRunPlan { from_dim, to_dim } => {
                    println!("dry run: would migrate {from_dim} -> {to_dim} dimensions");
                }
                MigrationOutcome::Migrated {
                    from_dim,
                    to_dim,
                    rows_migrated,
                    backup_table,
                } => {
                    println!("migrated {rows_migrated} rows from {from_dim} to {to_dim} dimensions");
                    if let Some(table) = backup_table {
                        println!("backup table retained: {table}");
                        if !args.skip_cleanup && !args.dry_run {
                            if let Err(e) = vector_store.drop_backup_table().await {
                                eprintln!("warning: failed to drop backup table: {e}");
                            } else {
                                println!("backup table dropped");
                            }
                        }
                    }
                }
                MigrationOutcome::FailedWithErrors { errors } => {
                    eprintln!("migration failed with {} errors:", errors.len());
                    for err in errors {
                        eprintln!("  {err}");
                    }
                    return ExitCode::FAILURE;
                }
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("migration error: {e}");
            ExitCode::FAILURE
        }
    }
}
