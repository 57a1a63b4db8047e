//! Command-line entry point for the note store.
//!
//! # Responsibility
//! - Save one note or print the latest one against the configured backend.
//! - Keep output deterministic so scripts can consume it.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use log::info;
use notestore_core::{core_version, init_logging, ping, FetchOutcome, NoteStoreConfig};
use std::io::Read;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "notestore")]
#[command(about = "Save short notes and read back the latest one", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// TOML configuration file
    #[arg(short, long, global = true, env = "NOTESTORE_CONFIG")]
    config: Option<PathBuf>,

    /// Directory for rolling log files (overrides `logging.dir`)
    #[arg(long, global = true)]
    log_dir: Option<PathBuf>,

    /// Log level (overrides `logging.level`)
    #[arg(long, global = true)]
    log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Save a note and print its key
    #[command(alias = "s")]
    Save {
        /// Note text; read from stdin when omitted
        text: Option<String>,
    },

    /// Print the most recently saved note
    #[command(alias = "l")]
    Latest {
        /// Print `{"key": ..., "body": ...}` instead of the bare body
        #[arg(long)]
        json: bool,
    },

    /// Print the key a note saved at the given instant would get
    Key {
        /// RFC 3339 timestamp; defaults to now
        #[arg(long)]
        at: Option<String>,
    },

    /// Check core linkage
    Ping,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = NoteStoreConfig::load(cli.config.as_deref())
        .context("failed to load configuration")?;
    start_logging(&cli, &config)?;

    match cli.command {
        Commands::Ping => {
            println!("notestore_core ping={}", ping());
            println!("notestore_core version={}", core_version());
        }
        Commands::Key { at } => {
            let instant = match at {
                Some(raw) => DateTime::parse_from_rfc3339(raw.trim())
                    .with_context(|| format!("invalid --at timestamp `{raw}`"))?
                    .with_timezone(&Utc),
                None => Utc::now(),
            };
            println!("{}", config.key_encoder()?.encode(instant));
        }
        Commands::Save { text } => {
            let body = match text {
                Some(text) => text,
                None => read_stdin()?,
            };
            let store = config.build_store()?;
            let key = store.save(&body).await.context("save failed")?;
            info!("event=cli_save module=cli status=ok key={key}");
            println!("{key}");
        }
        Commands::Latest { json } => {
            let store = config.build_store()?;
            match store.fetch_outcome().await {
                FetchOutcome::Found(note) if json => {
                    println!("{}", serde_json::to_string(&note)?);
                }
                FetchOutcome::Found(note) => println!("{}", note.body),
                FetchOutcome::Empty if json => println!("null"),
                FetchOutcome::Empty => eprintln!("no notes yet"),
                FetchOutcome::Failed(err) => {
                    return Err(anyhow!(err).context("failed to load latest note"));
                }
            }
        }
    }
    Ok(())
}

/// Log directory and level from flags, falling back to configuration.
///
/// `None` when neither names a log directory; logging then stays off.
fn resolve_logging<'a>(cli: &'a Cli, config: &'a NoteStoreConfig) -> Option<(&'a Path, &'a str)> {
    let dir = cli.log_dir.as_deref().or(config.logging.dir.as_deref())?;
    let level = cli
        .log_level
        .as_deref()
        .unwrap_or(config.logging.effective_level());
    Some((dir, level))
}

fn start_logging(cli: &Cli, config: &NoteStoreConfig) -> Result<()> {
    match resolve_logging(cli, config) {
        Some((dir, level)) => init_logging(level, dir).map_err(|err| anyhow!(err)),
        None => {
            if cli.log_level.is_some() {
                eprintln!("warning: --log-level has no effect without --log-dir or logging.dir");
            }
            Ok(())
        }
    }
}

fn read_stdin() -> Result<String> {
    let mut body = String::new();
    std::io::stdin()
        .read_to_string(&mut body)
        .context("failed to read note from stdin")?;
    // Shell pipes add one trailing newline.
    if body.ends_with('\n') {
        body.pop();
        if body.ends_with('\r') {
            body.pop();
        }
    }
    Ok(body)
}
