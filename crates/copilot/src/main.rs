//! Retail copilot binary.
//!
//! Answers natural-language retail analytics questions over a read-only
//! SQLite store and a directory of policy documents. Supports single
//! questions and JSONL batch runs.

use anyhow::Result;
use clap::{Parser, Subcommand};
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use copilot::batch;
use copilot::config::Config;
use copilot::drafter::{DraftPolicy, LlmDrafter, TemplateDrafter};
use copilot::engine::Engine;
use copilot::ollama::OllamaClient;
use copilot::retrieval::EvidenceIndex;
use copilot::router::{LlmRouter, RoutePolicy, RuleRouter};
use copilot::store::SqlStore;

#[derive(Parser)]
#[command(name = "copilot")]
#[command(about = "Retail analytics copilot", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to a TOML config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Disable the generation service and run fully deterministic
    #[arg(long, global = true)]
    no_llm: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a JSONL batch of questions
    Run {
        /// Input JSONL file, one question record per line
        #[arg(long)]
        batch: PathBuf,

        /// Output JSONL file, one answer record per line
        #[arg(long)]
        out: PathBuf,

        /// Directory of policy/reference markdown documents
        #[arg(long, default_value = "docs")]
        docs_dir: PathBuf,

        /// SQLite database file
        #[arg(long, default_value = "data/retail.sqlite")]
        db_path: PathBuf,
    },

    /// Answer a single question and print the result
    Ask {
        question: String,

        /// Expected answer shape (int, float, {a, b}, list of a+b)
        #[arg(long, default_value = "generic")]
        format_hint: String,

        /// Directory of policy/reference markdown documents
        #[arg(long, default_value = "docs")]
        docs_dir: PathBuf,

        /// SQLite database file
        #[arg(long, default_value = "data/retail.sqlite")]
        db_path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("copilot=info".parse()?))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref());

    match cli.command {
        Commands::Run {
            batch,
            out,
            docs_dir,
            db_path,
        } => {
            let engine = build_engine(&config, &docs_dir, &db_path, cli.no_llm)?;
            run_batch(&engine, &batch, &out).await
        }
        Commands::Ask {
            question,
            format_hint,
            docs_dir,
            db_path,
        } => {
            let engine = build_engine(&config, &docs_dir, &db_path, cli.no_llm)?;
            ask(&engine, &question, &format_hint).await
        }
    }
}

fn build_engine(
    config: &Config,
    docs_dir: &std::path::Path,
    db_path: &std::path::Path,
    no_llm: bool,
) -> Result<Engine> {
    let index = EvidenceIndex::load(docs_dir, config.retrieval.chunk_size)?;
    let store = SqlStore::open(db_path)?;

    let stats = index.stats();
    info!(
        "Loaded {} chunks from {} documents, {} tables",
        stats.chunks,
        stats.documents,
        store.table_names()?.len()
    );

    let (router, drafter): (Box<dyn RoutePolicy>, Box<dyn DraftPolicy>) =
        if no_llm || !config.llm.enabled {
            info!("Generation service disabled, running deterministic policies");
            (Box::new(RuleRouter), Box::new(TemplateDrafter))
        } else {
            let client = Arc::new(OllamaClient::new(&config.llm));
            info!("Using generation model {}", client.model());
            (
                Box::new(LlmRouter::new(client.clone())),
                Box::new(LlmDrafter::new(client)),
            )
        };

    Ok(Engine::new(
        router,
        drafter,
        index,
        store,
        config.retrieval.clone(),
    ))
}

async fn run_batch(engine: &Engine, batch_path: &std::path::Path, out: &std::path::Path) -> Result<()> {
    let inputs = batch::read_batch(batch_path)?;
    println!(
        "{} {} questions from {}",
        style("Processing").cyan().bold(),
        inputs.len(),
        batch_path.display()
    );

    let bar = ProgressBar::new(inputs.len() as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner} [{bar:30}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut outputs = Vec::with_capacity(inputs.len());
    for input in &inputs {
        bar.set_message(input.id.clone());
        outputs.push(batch::process_one(engine, input).await);
        bar.inc(1);
    }
    bar.finish_and_clear();

    batch::write_batch(out, &outputs)?;

    let answered = outputs.iter().filter(|o| !o.final_answer.is_null()).count();
    let mean_confidence = if outputs.is_empty() {
        0.0
    } else {
        outputs.iter().map(|o| o.confidence).sum::<f64>() / outputs.len() as f64
    };
    println!(
        "{} {}/{} answered, mean confidence {:.2}, results in {}",
        style("Done:").green().bold(),
        answered,
        outputs.len(),
        mean_confidence,
        out.display()
    );
    Ok(())
}

async fn ask(engine: &Engine, question: &str, format_hint: &str) -> Result<()> {
    let outcome = engine.run(question, format_hint).await?;

    println!("{} {}", style("Answer:").green().bold(), serde_json::to_string(&outcome.answer)?);
    println!("{} {:.2}", style("Confidence:").cyan(), outcome.confidence);
    println!("{} {}", style("Route:").cyan(), outcome.route);
    if let Some(sql) = &outcome.query {
        println!("{} {}", style("Query:").cyan(), sql.replace('\n', " "));
    }
    if !outcome.citations.is_empty() {
        println!("{} {}", style("Citations:").cyan(), outcome.citations.join(", "));
    }
    println!("{} {}", style("Explanation:").cyan(), outcome.explanation);

    for entry in outcome.trace.entries() {
        println!("  {} {}", style(&entry.stage).dim(), style(&entry.summary).dim());
    }
    Ok(())
}
