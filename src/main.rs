//! DocBuddy - Main CLI Entry Point

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use docbuddy::{
    bootstrap::{self, BootstrapStatus},
    cli::{Args, Commands, Config, CorpusArgs, StepMode},
    models::OllamaClient,
    rag::{load_paths, Chunker},
    repl::{render_response, Repl},
    session::{handle_with_cancel, QueryRequest, Session},
    telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    let args = Args::parse();

    let mut config = Config::load(args.config.clone()).context("Failed to load configuration")?;
    config
        .apply_env()
        .context("Invalid environment override")?;

    telemetry::init(args.verbosity(), &config.logging.level);
    debug!(?config, "Configuration loaded");

    match &args.command {
        Commands::Ask {
            question,
            corpus,
            json,
        } => {
            let ok = run_ask(&args, &mut config, question, corpus, *json).await?;
            if !ok {
                std::process::exit(1);
            }
        }
        Commands::Chat { corpus } => {
            run_chat(&args, &mut config, corpus).await?;
        }
        Commands::Chunk { path } => {
            show_chunks(&config, path)?;
        }
        Commands::Config => {
            show_config(&args, &config)?;
        }
    }

    Ok(())
}

/// Fold per-command overrides into the configuration
fn apply_corpus_args(config: &mut Config, corpus: &CorpusArgs) -> Result<Vec<PathBuf>> {
    if let Some(top_k) = corpus.top_k {
        config.workflow.top_k = top_k;
    }
    if let Some(threshold) = corpus.threshold {
        config.workflow.critique_threshold = threshold;
    }
    config.validate().context("Invalid option")?;

    let mut paths = config.document_paths();
    paths.extend(corpus.docs.iter().cloned());
    if paths.is_empty() {
        anyhow::bail!("No documents given. Pass --docs <PATH> or set [corpus] documents.");
    }
    Ok(paths)
}

/// Make sure Ollama can serve the configured models
async fn ensure_ollama(config: &Config, mode: StepMode) -> Result<()> {
    if mode == StepMode::Offline && config.ollama.embedding_model.is_empty() {
        return Ok(());
    }

    let client = OllamaClient::with_config(
        &config.ollama_url(),
        &config.ollama.model,
        config.ollama_timeout(),
    )?;

    match bootstrap::check_ollama(&client, config).await? {
        BootstrapStatus::Ready => Ok(()),
        BootstrapStatus::OllamaNotRunning => anyhow::bail!(
            "Ollama is not reachable at {}. Start it with: ollama serve",
            config.ollama_url()
        ),
        BootstrapStatus::ModelNotAvailable(model) => {
            // Offline mode only needs the embedding model
            if mode == StepMode::Offline && model == config.ollama.model {
                return Ok(());
            }
            anyhow::bail!("Model '{}' is not installed. Pull it with: ollama pull {}", model, model)
        }
    }
}

async fn build(
    args: &Args,
    config: &mut Config,
    corpus: &CorpusArgs,
) -> Result<bootstrap::Assembly> {
    let paths = apply_corpus_args(config, corpus)?;
    ensure_ollama(config, corpus.mode).await?;

    let documents = load_paths(&paths).context("Failed to load documents")?;
    if args.verbosity().shows_info() {
        eprintln!(
            "{} {} document(s)",
            "Indexing".cyan(),
            documents.len()
        );
    }

    let assembly = bootstrap::assemble(config, corpus.mode, &documents)
        .await
        .context("Failed to build the question pipeline")?;

    if assembly.chunks == 0 {
        anyhow::bail!("The documents produced no text to search.");
    }
    Ok(assembly)
}

async fn run_ask(
    args: &Args,
    config: &mut Config,
    question: &str,
    corpus: &CorpusArgs,
    json: bool,
) -> Result<bool> {
    let assembly = build(args, config, corpus).await?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let response = handle_with_cancel(
        &assembly.orchestrator,
        QueryRequest::new(question),
        cancel,
    )
    .await;

    if json {
        println!("{}", response.to_json()?);
    } else {
        println!("{}", render_response(&response));
    }

    Ok(response.is_answer())
}

async fn run_chat(args: &Args, config: &mut Config, corpus: &CorpusArgs) -> Result<()> {
    let assembly = build(args, config, corpus).await?;
    let session = Session::new(assembly.orchestrator.clone());
    let mut repl = Repl::new(session)?;
    repl.run().await
}

fn show_chunks(config: &Config, path: &PathBuf) -> Result<()> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let chunker = Chunker::new(config.chunker_config())?;
    let pieces = chunker.split(&text);

    println!(
        "{} {} chunk(s), size {} overlap {}\n",
        path.display().to_string().bold(),
        pieces.len(),
        config.corpus.chunk_size,
        config.corpus.chunk_overlap
    );
    for (i, piece) in pieces.iter().enumerate() {
        println!(
            "{} {}..{} ({} chars)",
            format!("#{}", i).cyan(),
            piece.span.start,
            piece.span.end,
            piece.span.len()
        );
        println!("{}\n", piece.text.dimmed());
    }
    Ok(())
}

fn show_config(args: &Args, config: &Config) -> Result<()> {
    let source = match &args.config {
        Some(path) => path.display().to_string(),
        None => match Config::default_path() {
            Some(path) if path.exists() => path.display().to_string(),
            _ => "built-in defaults".to_string(),
        },
    };

    println!("{} {}\n", "Configuration from".bold(), source.cyan());
    println!(
        "{}",
        toml::to_string_pretty(config).context("Failed to render configuration")?
    );
    Ok(())
}
