use anyhow::{Context, Result};
use console::style;
use dialoguer::Input;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

use crate::config::Config;
use crate::database::VectorStore;
use crate::document::find_pdf;
use crate::embeddings::OllamaClient;
use crate::pipeline::{NO_DOCUMENT_MESSAGE, Pipeline, PipelineState};

fn load_pipeline(config_dir: &Path) -> Result<Pipeline> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;
    Ok(Pipeline::with_ollama(config)?)
}

/// A PDF given directly, the first PDF in a given directory, or the first
/// PDF in the working directory
fn resolve_pdf(pdf: Option<PathBuf>) -> Result<Option<PathBuf>> {
    match pdf {
        Some(path) if path.is_dir() => find_pdf(&path),
        Some(path) => Ok(Some(path)),
        None => {
            let cwd = std::env::current_dir().context("Failed to read working directory")?;
            find_pdf(&cwd)
        }
    }
}

/// Build a fresh index from a PDF, replacing any stored one
#[inline]
pub async fn ingest_pdf(config_dir: &Path, pdf: Option<PathBuf>) -> Result<()> {
    let mut pipeline = load_pipeline(config_dir)?;

    let Some(path) = resolve_pdf(pdf)? else {
        println!("No PDF found. Pass a file or a directory containing one.");
        return Ok(());
    };

    info!("Ingesting {}", path.display());
    println!("Ingesting {}...", style(path.display()).cyan());

    let report = pipeline.ingest(&path).await?;

    if report.chunks == 0 {
        println!(
            "{}",
            style("The document contains no extractable text; nothing was indexed.").yellow()
        );
    } else {
        println!(
            "{} Indexed {} chunks from {} pages",
            style("✓").green(),
            report.chunks,
            report.pages
        );
        println!(
            "Index stored at: {}",
            style(pipeline.config().index_path().display()).dim()
        );
    }

    Ok(())
}

/// Answer a single question from the stored index
#[inline]
pub async fn ask_question(config_dir: &Path, question: &str) -> Result<()> {
    let mut pipeline = load_pipeline(config_dir)?;

    let location = pipeline.config().index_path();
    if VectorStore::exists(&location) {
        pipeline.load_existing(&location).await?;
    }

    let answer = pipeline.ask(question).await?;
    println!("{}", answer.trim());

    Ok(())
}

/// Interactive question loop over one document
#[inline]
pub async fn run_chat(config_dir: &Path, pdf: Option<PathBuf>) -> Result<()> {
    let mut pipeline = load_pipeline(config_dir)?;

    let pdf = match pdf {
        Some(path) => path,
        None => std::env::current_dir().context("Failed to read working directory")?,
    };

    match pipeline.open_or_ingest(Some(&pdf)).await? {
        PipelineState::Ready { origin, entries } => {
            eprintln!(
                "{}",
                style(format!("📄 Document {} ({} chunks)", origin, entries))
                    .bold()
                    .cyan()
            );
        }
        PipelineState::Empty | PipelineState::Building => {
            eprintln!("{}", style(NO_DOCUMENT_MESSAGE).yellow());
        }
    }
    eprintln!("Type a question, or 'exit' to quit.");
    eprintln!();

    loop {
        let question: String = match Input::new()
            .with_prompt("Question")
            .allow_empty(true)
            .interact_text()
        {
            Ok(question) => question,
            Err(e) => {
                warn!("Input closed: {}", e);
                break;
            }
        };

        let question = question.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        match pipeline.ask(question).await {
            Ok(answer) => {
                println!("{}", answer.trim());
                println!();
            }
            Err(e) => {
                error!("Failed to answer question: {}", e);
                eprintln!("{} {}", style("Error:").red().bold(), e);
            }
        }
    }

    Ok(())
}

/// Show the stored index and the Ollama connection state
#[inline]
pub async fn show_status(config_dir: &Path) -> Result<()> {
    let config = Config::load(config_dir).context("Failed to load configuration")?;
    let location = config.index_path();

    println!("{}", style("ChatPDF Status").bold().cyan());
    println!();

    println!("{}", style("Index:").bold().yellow());
    println!("  Location: {}", location.display());
    if VectorStore::exists(&location) {
        match VectorStore::open(&location).await {
            Ok(store) => {
                let count = store.count_embeddings().await?;
                println!("  State: {}", style("ready").green());
                println!("  Chunks: {}", count);
                println!("  Vector dimension: {}", store.vector_dimension());
            }
            Err(e) => {
                println!("  State: {} ({})", style("unreadable").red(), e);
            }
        }
    } else {
        println!("  State: {}", style("no document ingested").yellow());
    }

    println!();
    println!("{}", style("Ollama:").bold().yellow());
    println!("  URL: {}", config.ollama_url()?);
    let client = OllamaClient::new(&config)?;
    match client.health_check() {
        Ok(()) => println!("  Health: {}", style("ok").green()),
        Err(e) => println!("  Health: {} ({:#})", style("unavailable").red(), e),
    }

    Ok(())
}

/// Delete the stored index
#[inline]
pub async fn clear_index(config_dir: &Path) -> Result<()> {
    let mut pipeline = load_pipeline(config_dir)?;
    let location = pipeline.config().index_path();

    if pipeline.delete_storage(&location).await? {
        println!("{} Deleted index at {}", style("✓").green(), location.display());
    } else {
        println!("No index found at {}", location.display());
    }

    Ok(())
}
