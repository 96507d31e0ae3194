//! Standalone CLI for inspecting and querying a story's indexed RAG content.

use book_generator::rag::embedding::OllamaEmbeddingProvider;
use book_generator::rag::reranker::{ModelStrategy, Reranker, RuleStrategy};
use book_generator::rag::vector_store::VectorStore;
use book_generator::rag::RagService;
use book_generator::Config;
use clap::Parser;
use std::io::Write;
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(name = "rag-query", about = "Query and inspect RAG-indexed story content")]
struct Args {
    #[arg(long)]
    list_stories: bool,

    #[arg(long)]
    story: Option<String>,

    #[arg(long)]
    summary: bool,

    #[arg(long)]
    stats: bool,

    #[arg(long)]
    search: Option<String>,

    #[arg(long)]
    query: Option<String>,

    #[arg(long, default_value_t = 10)]
    limit: i64,

    #[arg(long, default_value_t = 0.7)]
    threshold: f64,

    #[arg(long)]
    content_type: Option<String>,

    #[arg(long)]
    rerank: bool,

    #[arg(long, default_value = "rule_based")]
    rerank_type: String,

    #[arg(long, default_value = "hybrid")]
    rerank_strategy: String,

    #[arg(long)]
    interactive: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
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

    match run(args, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args, config: Config) -> book_generator::Result<()> {
    let vector_store = VectorStore::connect(&config.rag.postgres_url, config.rag.vector_dimensions).await?;
    vector_store.ensure_schema().await?;
    let embedding = Box::new(OllamaEmbeddingProvider::new(&config));
    let mut service = RagService::new(vector_store, embedding, config.rag.clone());

    if args.list_stories {
        for story in service.vector_store.list_stories().await? {
            println!("{}\t{}\t{}", story.id, story.story_name, story.prompt_file_name);
        }
        return Ok(());
    }

    if let Some(story_name) = &args.story {
        service.create_story(story_name, &format!("{story_name}.md")).await?;

        if args.summary || args.stats {
            let story = service
                .vector_store
                .list_stories()
                .await?
                .into_iter()
                .find(|s| &s.story_name == story_name);
            match story {
                Some(s) => {
                    let content = service.vector_store.get_story_content(s.id).await?;
                    println!("story: {} ({} chunks)", s.story_name, content.len());
                    if args.stats {
                        let mut counts = std::collections::BTreeMap::new();
                        for (_, content_type, _, _) in &content {
                            *counts.entry(content_type.clone()).or_insert(0) += 1;
                        }
                        for (content_type, count) in counts {
                            println!("  {content_type}: {count}");
                        }
                    }
                }
                None => println!("story '{story_name}' not found"),
            }
        }
    }

    let opts = QueryOptions {
        content_type: args.content_type.as_deref(),
        limit: args.limit,
        threshold: args.threshold,
        rerank: args.rerank,
        rerank_type: &args.rerank_type,
        rerank_strategy: &args.rerank_strategy,
    };
    let query_text = args.search.or(args.query);
    if args.interactive {
        run_interactive(&service, opts).await?;
    } else if let Some(query) = query_text {
        run_query(&service, &query, opts).await?;
    }

    Ok(())
}

struct QueryOptions<'a> {
    content_type: Option<&'a str>,
    limit: i64,
    threshold: f64,
    rerank: bool,
    rerank_type: &'a str,
    rerank_strategy: &'a str,
}

impl Copy for QueryOptions<'_> {}
impl Clone for QueryOptions<'_> {
    fn clone(&self) -> Self {
        *self
    }
}

fn build_reranker(rerank_type: &str, rerank_strategy: &str) -> book_generator::Result<Reranker> {
    match rerank_type {
        "model_based" => {
            let strategy = match rerank_strategy {
                "cross_encoder" => ModelStrategy::CrossEncoder,
                _ => ModelStrategy::Hybrid,
            };
            Ok(Reranker::ModelBased { strategy })
        }
        _ => {
            let strategy = match rerank_strategy {
                "keyword" => RuleStrategy::Keyword,
                "metadata" => RuleStrategy::Metadata,
                "semantic" => RuleStrategy::Semantic,
                _ => RuleStrategy::Hybrid,
            };
            Ok(Reranker::RuleBased { strategy })
        }
    }
}

async fn run_query(service: &RagService, query: &str, opts: QueryOptions<'_>) -> book_generator::Result<()> {
    if opts.rerank {
        let reranker = build_reranker(opts.rerank_type, opts.rerank_strategy)?;
        let results = service
            .search_reranked(query, opts.content_type, opts.limit, opts.threshold, &reranker)
            .await?;
        for r in results {
            println!("[{:.3}] ({}) {}", r.reranked_score, r.content_type, truncate(&r.content, 160));
        }
    } else {
        let results = service.search(query, opts.content_type, opts.limit, opts.threshold, false).await?;
        for r in results {
            println!(
                "[{:.3}] ({}) {}",
                r.similarity.unwrap_or(0.0),
                r.content_type,
                truncate(&r.content, 160)
            );
        }
    }
    Ok(())
}

async fn run_interactive(service: &RagService, opts: QueryOptions<'_>) -> book_generator::Result<()> {
    let stdin = std::io::stdin();
    loop {
        print!("query> ");
        std::io::stdout().flush().ok();
        let mut line = String::new();
        if stdin.read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim();
        if line.is_empty() || line == "quit" || line == "exit" {
            break;
        }
        if let Err(e) = run_query(service, line, opts).await {
            eprintln!("query failed: {e}");
        }
    }
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max).collect::<String>())
    }
}
