use std::path::PathBuf;

use anyhow::Result;
use chatpdf::commands::{ask_question, clear_index, ingest_pdf, run_chat, show_status};
use chatpdf::config::{get_config_dir, run_interactive_config, show_config};
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "chatpdf")]
#[command(about = "Ask questions about a PDF using a local Ollama model")]
#[command(version)]
struct Cli {
    /// Directory holding config.toml and the stored index (default: ~/.chatpdf)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure Ollama connection and pipeline settings
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Index a PDF, replacing any stored index
    Ingest {
        /// PDF file, or a directory to take the first PDF from (default: current directory)
        pdf: Option<PathBuf>,
    },
    /// Answer a single question from the stored index
    Ask {
        /// The question to answer
        question: String,
    },
    /// Interactive question loop; reuses the stored index or ingests a PDF
    Chat {
        /// PDF file, or a directory to take the first PDF from (default: current directory)
        pdf: Option<PathBuf>,
    },
    /// Show the stored index and Ollama connection state
    Status,
    /// Delete the stored index
    Clear,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => get_config_dir()?,
    };

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config(&config_dir)?;
            } else {
                run_interactive_config(&config_dir)?;
            }
        }
        Commands::Ingest { pdf } => {
            ingest_pdf(&config_dir, pdf).await?;
        }
        Commands::Ask { question } => {
            ask_question(&config_dir, &question).await?;
        }
        Commands::Chat { pdf } => {
            run_chat(&config_dir, pdf).await?;
        }
        Commands::Status => {
            show_status(&config_dir).await?;
        }
        Commands::Clear => {
            clear_index(&config_dir).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn status_command() {
        let cli = Cli::try_parse_from(["chatpdf", "status"]).expect("valid command");

        assert!(matches!(cli.command, Commands::Status));
        assert_eq!(cli.config_dir, None);
    }

    #[test]
    fn ingest_with_and_without_path() {
        let cli = Cli::try_parse_from(["chatpdf", "ingest", "report.pdf"]).expect("valid command");
        assert!(
            matches!(cli.command, Commands::Ingest { pdf: Some(ref p) } if p == &PathBuf::from("report.pdf"))
        );

        let cli = Cli::try_parse_from(["chatpdf", "ingest"]).expect("valid command");
        assert!(matches!(cli.command, Commands::Ingest { pdf: None }));
    }

    #[test]
    fn ask_requires_question() {
        let cli = Cli::try_parse_from(["chatpdf", "ask", "What is the total?"])
            .expect("valid command");
        assert!(
            matches!(cli.command, Commands::Ask { ref question } if question == "What is the total?")
        );

        let missing = Cli::try_parse_from(["chatpdf", "ask"]);
        assert!(
            matches!(missing, Err(ref err) if err.kind() == ErrorKind::MissingRequiredArgument)
        );
    }

    #[test]
    fn global_config_dir() {
        let cli = Cli::try_parse_from(["chatpdf", "chat", "--config-dir", "/tmp/chatpdf"])
            .expect("valid command");

        assert_eq!(cli.config_dir, Some(PathBuf::from("/tmp/chatpdf")));
        assert!(matches!(cli.command, Commands::Chat { pdf: None }));
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["chatpdf", "config", "--show"]).expect("valid command");

        assert!(matches!(cli.command, Commands::Config { show: true }));
    }

    #[test]
    fn clear_command() {
        let cli = Cli::try_parse_from(["chatpdf", "clear"]).expect("valid command");

        assert!(matches!(cli.command, Commands::Clear));
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["chatpdf", "invalid"]);

        assert!(matches!(cli, Err(ref err) if err.kind() == ErrorKind::InvalidSubcommand));
    }

    #[test]
    fn help_message() {
        let cli = Cli::try_parse_from(["chatpdf", "--help"]);

        assert!(matches!(cli, Err(ref err) if err.kind() == ErrorKind::DisplayHelp));
    }
}
