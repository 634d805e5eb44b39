use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use quarry_core::provider::OllamaProvider;
use quarry_core::rag::SearchResult;
use quarry_core::{Config, LoadReport, Provider, RagEngine, RagError};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

const PREVIEW_CHARS: usize = 200;

#[derive(Parser)]
#[command(name = "quarry")]
#[command(about = "Ask questions about a folder of local documents", long_about = None)]
#[command(version)]
struct Cli {
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Load documents and answer questions interactively (default)")]
    Chat,

    #[command(about = "Build or validate the embedding cache, then exit")]
    Index {
        #[arg(short, long, help = "Re-embed every chunk even if the cache is current")]
        force: bool,
    },

    #[command(about = "Show current configuration")]
    Show,

    #[command(about = "List models available on the model service")]
    Models,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("quarry_core=info".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => chat(config).await,
        Commands::Index { force } => index(config, force).await,
        Commands::Show => {
            show_config(&config);
            Ok(())
        }
        Commands::Models => list_models(config).await,
    }
}

fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        tracing::info!("No config file at {}, using defaults", path.display());
    }
    Config::load_or_default(path).with_context(|| format!("Failed to load config from {}", path.display()))
}

fn build_engine(config: Config) -> Result<RagEngine> {
    let provider = Arc::new(OllamaProvider::new(&config));
    RagEngine::new(config, provider).context("Failed to create engine")
}

async fn chat(config: Config) -> Result<()> {
    let mut engine = build_engine(config)?;

    let report = engine.start().await.context("Failed to start engine")?;
    print_load_report(&report);

    println!();
    println!(
        "{} Ask a question, or type {} / {} / {}",
        "→".blue(),
        "reload".bold(),
        "refresh".bold(),
        "quit".bold()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("\n{} ", "❯".cyan().bold());
        std::io::stdout().flush().context("Failed to flush stdout")?;

        let Some(line) = lines.next_line().await.context("Failed to read input")? else {
            break;
        };
        let input = line.trim();

        match input.to_lowercase().as_str() {
            "quit" | "exit" => break,
            "reload" => match engine.reload().await {
                Ok(report) => print_load_report(&report),
                Err(e) => eprintln!("{} Reload failed: {}", "✗".red().bold(), e),
            },
            "refresh" => match engine.refresh().await {
                Ok(report) => print_load_report(&report),
                Err(e) => eprintln!("{} Refresh failed: {}", "✗".red().bold(), e),
            },
            _ => match engine.query(input).await {
                Ok(outcome) => {
                    print_results(&outcome.results);
                    println!();
                    println!("{}", "Answer:".bold().green());
                    println!("{}", outcome.answer.trim());
                }
                Err(RagError::EmptyQuery) => {
                    println!("{}", "Please enter a question.".yellow());
                }
                Err(e) => eprintln!("{} {}", "✗".red().bold(), e),
            },
        }
    }

    println!("Goodbye!");
    Ok(())
}

async fn index(config: Config, force: bool) -> Result<()> {
    let mut engine = build_engine(config)?;

    let report = engine.start_with(force).await.context("Indexing failed")?;

    print_load_report(&report);
    if let Some(manifest) = engine.manifest() {
        println!("  Sources:   {}", manifest.source_count());
    }
    println!("  Cache:     {}", engine.config().storage.cache_path.display());
    Ok(())
}

fn show_config(config: &Config) {
    println!("{}", "Current Configuration:".bold().green());
    println!();
    println!("{}", "LLM:".bold());
    println!("  Model:           {}", config.llm.model.cyan());
    println!("  Base URL:        {}", config.llm.base_url);
    println!("  Temperature:     {}", config.llm.temperature);
    println!("  Timeout:         {}s", config.llm.timeout_secs);
    println!();
    println!("{}", "RAG:".bold());
    println!("  Embedding Model: {}", config.rag.embedding_model.cyan());
    println!("  Chunk Size:      {}", config.rag.chunk_size);
    println!("  Chunk Overlap:   {}", config.rag.chunk_overlap);
    println!("  Top K:           {}", config.rag.top_k);
    match config.rag.min_similarity {
        Some(min) => println!("  Min Similarity:  {}", min),
        None => println!("  Min Similarity:  none"),
    }
    println!("  Context Budget:  {} chars", config.rag.max_context_chars);
    println!();
    println!("{}", "Storage:".bold());
    println!("  Documents:       {}", config.storage.documents_dir.display());
    println!("  Cache:           {}", config.storage.cache_path.display());
}

async fn list_models(config: Config) -> Result<()> {
    let provider = OllamaProvider::new(&config);

    println!("{} Fetching models from {}...", "→".blue(), provider.base_url());
    println!();

    let models = provider
        .list_models()
        .await
        .context("Failed to connect to the model service. Is Ollama running?")?;

    if models.is_empty() {
        println!("{}", "No models found. Pull a model with 'ollama pull <model>'".yellow());
        return Ok(());
    }

    println!("{}", "Available models:".bold().green());
    println!();

    for model in models {
        let size_gb = model.size as f64 / (1024.0 * 1024.0 * 1024.0);
        let mut roles = Vec::new();
        if model.matches(&config.rag.embedding_model) {
            roles.push("embedding");
        }
        if model.matches(&config.llm.model) {
            roles.push("generation");
        }
        let roles = if roles.is_empty() {
            String::new()
        } else {
            format!(" [{}]", roles.join(", ")).green().to_string()
        };
        println!("  {} {} ({:.2} GB){}", "•".cyan(), model.name.bold(), size_gb, roles);
    }

    Ok(())
}

fn print_load_report(report: &LoadReport) {
    let origin = if report.from_cache { "from cache" } else { "freshly embedded" };
    println!(
        "{} Loaded {} documents, {} chunks ({})",
        "✓".green().bold(),
        report.documents,
        report.chunks,
        origin
    );
}

fn print_results(results: &[SearchResult]) {
    println!();
    println!("{}", "Relevant chunks:".bold());
    for (i, result) in results.iter().enumerate() {
        let preview: String = result.metadata.content.chars().take(PREVIEW_CHARS).collect();
        let ellipsis = if result.metadata.content.chars().count() > PREVIEW_CHARS { "..." } else { "" };
        println!(
            "  {}. {} ({:.2}%)",
            i + 1,
            result.metadata.source.cyan(),
            result.similarity * 100.0
        );
        println!("     {}{}", preview.replace('\n', " ").dimmed(), ellipsis);
    }
}
