//! # Report Forge CLI (`rforge`)
//!
//! The `rforge` binary exercises the pipeline end to end: standardize files,
//! preview optimized excerpts, ask one-shot questions, and run the report
//! decompose / fill / export cycle against a local Ollama instance.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `rforge standardize <files...>` | Standardize files and print (or save) the corpus |
//! | `rforge optimize <file>` | Print the size-bounded excerpt for one file |
//! | `rforge ask "<prompt>" <files...>` | One-shot question over a set of files |
//! | `rforge report generate <files...>` | Decompose the corpus and fill every section |
//! | `rforge report fill <index>` | Regenerate content for one saved section |
//! | `rforge report regenerate <index> "<prompt>"` | Three styled variants for one section |
//! | `rforge report export` | Render the saved report as JSON or Markdown |
//! | `rforge verify` | Best-effort score of the saved report against the corpus |
//! | `rforge models` | List models installed on the backend |
//! | `rforge context set\|show` | Manage the default context string |

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use report_forge::assemble::assemble;
use report_forge::config::{self, Config};
use report_forge::document::StandardizedDocument;
use report_forge::export;
use report_forge::inference::{InferenceBackend, InferenceClient};
use report_forge::meta::UploadedFile;
use report_forge::optimize::optimize;
use report_forge::orchestrate::Orchestrator;
use report_forge::progress::StderrProgress;
use report_forge::report::ReportBlock;
use report_forge::standardize::standardize;
use report_forge::storage::{keys, JsonFileStore, KeyValueStore};

/// Report Forge CLI — standardize documents and assemble LLM-backed reports.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Missing files fall back to built-in defaults (local Ollama on
/// 127.0.0.1:11434).
#[derive(Parser)]
#[command(
    name = "rforge",
    about = "Report Forge — a local-first document standardization and report assembly pipeline",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./rforge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Standardize files into the uniform document model.
    ///
    /// Unsupported or malformed files become error documents rather than
    /// failures, so a bad file never blocks the rest of the corpus.
    Standardize {
        /// Files to standardize.
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Persist the corpus to the store instead of printing it.
        #[arg(long)]
        save: bool,
    },

    /// Print the size-bounded excerpt the assembler would use for one file.
    Optimize {
        /// File to standardize and sample.
        file: PathBuf,

        /// Excerpt budget in characters.
        #[arg(long, default_value_t = 100_000)]
        max_chars: usize,
    },

    /// Ask a one-shot question over a set of files.
    Ask {
        /// The question.
        prompt: String,

        /// Files to use as context.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Report workflows: decompose, fill, regenerate, export.
    Report {
        #[command(subcommand)]
        action: ReportAction,
    },

    /// Grade the saved report against the saved corpus (best effort).
    ///
    /// Asks the model for a 0-100 score and extracts the first integer from
    /// the reply. Treat the number as a smell test, not a measurement.
    Verify,

    /// List models installed on the inference backend.
    Models,

    /// Manage the default context string appended to every question.
    Context {
        #[command(subcommand)]
        action: ContextAction,
    },
}

/// Report subcommands.
#[derive(Subcommand)]
enum ReportAction {
    /// Decompose the files into sections and fill each one.
    ///
    /// Saves the finished blocks to the store and prints the report as
    /// Markdown. Failed sections keep their error and the queue moves on.
    Generate {
        /// Files to build the report from.
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Regenerate content for one saved section (0-based index).
    Fill {
        /// Section index.
        index: usize,
    },

    /// Produce three styled variants for one saved section without saving.
    Regenerate {
        /// Section index.
        index: usize,

        /// Prompt for the variants.
        prompt: String,
    },

    /// Render the saved report.
    Export {
        /// Output format.
        #[arg(long, value_enum, default_value_t = ExportFormat::Markdown)]
        format: ExportFormat,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum ExportFormat {
    Json,
    Markdown,
}

/// Default-context subcommands.
#[derive(Subcommand)]
enum ContextAction {
    /// Set the default context string.
    Set { text: String },
    /// Print the default context string.
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = if cli.config.exists() {
        config::load_config(&cli.config)?
    } else {
        Config::default()
    };
    let store = JsonFileStore::open(&cfg.storage.path)?;

    match cli.command {
        Commands::Standardize { files, save } => {
            let corpus = standardize_paths(&files)?;
            if save {
                store
                    .set(keys::STANDARDIZED_FILES, serde_json::to_value(&corpus)?)
                    .await?;
                println!("Saved {} standardized file(s).", corpus.len());
            } else {
                println!("{}", export::corpus_json(&corpus)?);
            }
        }
        Commands::Optimize { file, max_chars } => {
            let doc = standardize(&UploadedFile::from_path(&file)?);
            println!("{}", optimize(&doc, max_chars));
        }
        Commands::Ask { prompt, files } => {
            let corpus = standardize_paths(&files)?;
            let refs: Vec<&StandardizedDocument> = corpus.iter().collect();
            let default_context = saved_context(&store, &cfg).await?;
            let messages = assemble(&prompt, &refs, &default_context);

            let client = InferenceClient::new(cfg.inference_config());
            let cancel = cancel_on_ctrl_c();
            let answer = client
                .query(&messages, &cancel, &StderrProgress)
                .await
                .context("inference request failed")?;
            println!("{}", answer);
        }
        Commands::Report { action } => run_report(action, &cfg, &store).await?,
        Commands::Verify => {
            let mut orch = saved_orchestrator(&cfg, &store).await?;
            let score = orch.verify().await.context("verification failed")?;
            println!("Verification score: {}/100", score);
        }
        Commands::Models => {
            let client = InferenceClient::new(cfg.inference_config());
            let models = client.list_models().await.context("model listing failed")?;
            if models.is_empty() {
                println!("No models installed.");
            }
            for model in models {
                println!("{}", model);
            }
        }
        Commands::Context { action } => match action {
            ContextAction::Set { text } => {
                store
                    .set(keys::DEFAULT_CONTEXT, serde_json::Value::String(text))
                    .await?;
                println!("Default context updated.");
            }
            ContextAction::Show => {
                println!("{}", saved_context(&store, &cfg).await?);
            }
        },
    }

    Ok(())
}

async fn run_report(action: ReportAction, cfg: &Config, store: &JsonFileStore) -> Result<()> {
    match action {
        ReportAction::Generate { files } => {
            let corpus = standardize_paths(&files)?;
            store
                .set(keys::STANDARDIZED_FILES, serde_json::to_value(&corpus)?)
                .await?;

            let mut orch = orchestrator_for(cfg, corpus);
            orch.decompose().await.context("decomposition failed")?;
            eprintln!("Decomposed into {} section(s).", orch.blocks().len());
            orch.generate_all().await.context("generation failed")?;

            store
                .set(keys::REPORT_BLOCKS, serde_json::to_value(orch.blocks())?)
                .await?;
            println!("{}", export::report_markdown(orch.blocks()));
        }
        ReportAction::Fill { index } => {
            let mut orch = saved_orchestrator(cfg, store).await?;
            if index >= orch.blocks().len() {
                bail!("no section at index {index}");
            }
            orch.generate_one(index)
                .await
                .context("generation failed")?;
            store
                .set(keys::REPORT_BLOCKS, serde_json::to_value(orch.blocks())?)
                .await?;
            let block = &orch.blocks()[index];
            match &block.error {
                Some(err) => eprintln!("{}", err),
                None => println!("{}", block.content),
            }
        }
        ReportAction::Regenerate { index, prompt } => {
            let mut orch = saved_orchestrator(cfg, store).await?;
            let variants = orch
                .regenerate(index, &prompt)
                .await
                .context("regeneration failed")?;
            for (style, content) in ["key findings", "detailed analysis", "balanced view"]
                .iter()
                .zip(variants.iter())
            {
                println!("=== {} ===\n{}\n", style, content);
            }
        }
        ReportAction::Export { format } => {
            let blocks = saved_blocks(store).await?;
            match format {
                ExportFormat::Json => println!("{}", export::report_json(&blocks)?),
                ExportFormat::Markdown => println!("{}", export::report_markdown(&blocks)),
            }
        }
    }
    Ok(())
}

fn standardize_paths(paths: &[PathBuf]) -> Result<Vec<StandardizedDocument>> {
    paths
        .iter()
        .map(|path| Ok(standardize(&UploadedFile::from_path(path)?)))
        .collect()
}

fn orchestrator_for(cfg: &Config, corpus: Vec<StandardizedDocument>) -> Orchestrator {
    let client = Arc::new(InferenceClient::new(cfg.inference_config()));
    let mut orch = Orchestrator::new(client, Arc::new(StderrProgress), corpus);
    // Ctrl-C unwinds the in-flight request as a cancellation.
    orch.bind_cancellation(cancel_on_ctrl_c());
    orch
}

/// Rebuild the orchestrator from the saved corpus and blocks.
async fn saved_orchestrator(cfg: &Config, store: &JsonFileStore) -> Result<Orchestrator> {
    let Some(value) = store.get(keys::STANDARDIZED_FILES).await? else {
        bail!("no saved corpus; run `rforge standardize --save` or `rforge report generate` first");
    };
    let corpus: Vec<StandardizedDocument> =
        serde_json::from_value(value).context("saved corpus is corrupt")?;
    let mut orch = orchestrator_for(cfg, corpus);
    *orch.blocks_mut() = saved_blocks(store).await.unwrap_or_default();
    Ok(orch)
}

async fn saved_blocks(store: &JsonFileStore) -> Result<Vec<ReportBlock>> {
    let Some(value) = store.get(keys::REPORT_BLOCKS).await? else {
        bail!("no saved report; run `rforge report generate` first");
    };
    serde_json::from_value(value).context("saved report is corrupt")
}

/// The configured default context, with the store taking precedence over the
/// config file.
async fn saved_context(store: &JsonFileStore, cfg: &Config) -> Result<String> {
    if let Some(serde_json::Value::String(text)) = store.get(keys::DEFAULT_CONTEXT).await? {
        return Ok(text);
    }
    Ok(cfg.context.default_context.clone())
}

/// A token that cancels on Ctrl-C, so an in-flight request unwinds as a
/// cancellation instead of killing the process mid-write.
fn cancel_on_ctrl_c() -> tokio_util::sync::CancellationToken {
    let cancel = tokio_util::sync::CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            trigger.cancel();
        }
    });
    cancel
}
