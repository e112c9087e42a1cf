use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

/// Study a document: ingest it, ask questions, take quizzes.
#[derive(Parser, Debug)]
#[command(name = "studybot", version, about, long_about = None)]
struct Cli {
    /// Extra TOML config file (layered over ./studybot.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More log output on stderr (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Index a .txt, .md, .pdf or .docx file and start a session on it
    Ingest { file: PathBuf },
    /// Ask a question about the session's document
    Ask {
        #[arg(long)]
        session: i64,
        #[arg(long)]
        top_k: Option<usize>,
        question: String,
    },
    /// Generate a quiz over the session's document
    Quiz {
        #[arg(long)]
        session: i64,
        #[arg(long)]
        mcq: Option<usize>,
        #[arg(long)]
        tf: Option<usize>,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Grade answers (JSON object: question id -> answer)
    Submit {
        #[arg(long)]
        session: i64,
        #[arg(long)]
        quiz: i64,
        answers: PathBuf,
    },
    /// Build a short quiz from the chunks behind wrong answers
    Retest {
        #[arg(long)]
        session: i64,
        #[arg(long)]
        quiz: i64,
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Attempt totals for a quiz
    Stats {
        #[arg(long)]
        quiz: i64,
    },
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = match verbose {
        0 if quiet => "error",
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    // RUST_LOG wins when set.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    if let Some(path) = cli.config.as_deref() {
        if !path.is_file() {
            anyhow::bail!("config file not found: {}", path.display());
        }
    }
    let cfg = config::load_config(cli.config.as_deref())?;
    tracing::debug!(?cfg, "loaded configuration");

    match cli.command {
        Commands::Ingest { file } => commands::ingest_file(&cfg, &file),
        Commands::Ask {
            session,
            top_k,
            question,
        } => commands::ask(&cfg, session, &question, top_k),
        Commands::Quiz {
            session,
            mcq,
            tf,
            seed,
        } => commands::quiz(&cfg, session, mcq, tf, seed),
        Commands::Submit {
            session,
            quiz,
            answers,
        } => commands::submit(&cfg, session, quiz, &answers),
        Commands::Retest {
            session,
            quiz,
            seed,
        } => commands::retest(&cfg, session, quiz, seed),
        Commands::Stats { quiz } => commands::stats(&cfg, quiz),
    }
}
