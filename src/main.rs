//! # Codex20 CLI (`codex20`)
//!
//! Runs the Telegram bot and exposes the corpus search for inspection.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `codex20 search "<query>"` | Print the augmentation block for a query |
//! | `codex20 prompt "<query>"` | Print the full prompt sent to the model |
//! | `codex20 ask "<query>"` | Ask the model once and print the reply |
//! | `codex20 randompg` | Generate a random level-1 character sheet |
//! | `codex20 corpus` | List corpus documents with record counts |
//! | `codex20 health` | Run only the liveness server |
//! | `codex20 serve` | Run the liveness server and the Telegram bot |
//!
//! Logging is controlled with `RUST_LOG` (default `codex20=info`).

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use codex20::augment::Assembler;
use codex20::bot::Bot;
use codex20::character::FORGING_NOTICE;
use codex20::config::{self, Config};
use codex20::document::extract_records;
use codex20::llm::create_client;
use codex20::persona::load_persona;
use codex20::prompt::Prompt;
use codex20::server;
use codex20::telegram::{self, TelegramClient};

/// Codex20 — a tabletop rules assistant grounded in a local JSON corpus.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. Secrets are read from the environment (`TELEGRAM_TOKEN`,
/// `GEMINI_API_KEYS`, `GROQ_API_KEY`).
#[derive(Parser)]
#[command(name = "codex20", version, about)]
struct Cli {
    /// Path to configuration file (TOML). Without it,
    /// `./config/codex20.toml` is used when present, else built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the augmentation block the corpus yields for a query.
    ///
    /// Prints nothing when no record matches.
    Search {
        /// The user message to search for.
        query: String,
    },

    /// Print the complete prompt (persona, augmentation, message).
    Prompt {
        query: String,
    },

    /// Send one message through the configured model and print the reply.
    Ask {
        query: String,
    },

    /// Generate a random level-1 character grounded in corpus names.
    Randompg,

    /// List corpus documents with their category and record counts.
    Corpus,

    /// Run only the liveness HTTP server.
    Health,

    /// Run the liveness server and the Telegram bot.
    Serve,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("codex20=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => config::load_config_or_default(Path::new(config::DEFAULT_CONFIG_PATH), true)?,
    };

    match cli.command {
        Commands::Search { query } => {
            let assembler = Assembler::from_config(&cfg.corpus)?;
            print!("{}", assembler.search(&query));
        }
        Commands::Prompt { query } => {
            let assembler = Assembler::from_config(&cfg.corpus)?;
            let persona = load_persona(&cfg.persona);
            let prompt = Prompt::compose(&persona, assembler.search(&query), &query);
            println!("{}", prompt.to_single_text());
        }
        Commands::Ask { query } => {
            let bot = build_bot(&cfg)?;
            let reply = bot.handle(&query).await;
            println!("{}", reply.text);
        }
        Commands::Randompg => {
            let bot = build_bot(&cfg)?;
            eprintln!("{}", FORGING_NOTICE);
            let reply = bot.random_character().await;
            println!("{}", reply.text);
        }
        Commands::Corpus => {
            list_corpus(&cfg)?;
        }
        Commands::Health => {
            server::run_server(&cfg).await?;
        }
        Commands::Serve => {
            run_bot(&cfg).await?;
        }
    }

    Ok(())
}

fn build_bot(cfg: &Config) -> Result<Bot> {
    let assembler = Assembler::from_config(&cfg.corpus)?;
    let llm = create_client(&cfg.llm)?;
    let persona = load_persona(&cfg.persona);
    Ok(Bot::new(
        assembler,
        llm,
        persona,
        cfg.telegram.authorized_user_id,
        cfg.telegram.max_reply_chars,
    ))
}

async fn run_bot(cfg: &Config) -> Result<()> {
    let token = cfg
        .telegram
        .token
        .clone()
        .context("TELEGRAM_TOKEN not set and telegram.token is empty")?;
    let bot = Arc::new(build_bot(cfg)?);
    let client = TelegramClient::new(token, cfg.telegram.poll_timeout_secs)?;

    tracing::info!(
        provider = %cfg.llm.provider,
        model = %cfg.llm.model_name(),
        keys = cfg.llm.api_keys.len(),
        corpus = %cfg.corpus.root.display(),
        "Codex20 online"
    );

    tokio::try_join!(
        server::run_server(cfg),
        telegram::run_polling(client, bot, &cfg.telegram),
    )?;
    Ok(())
}

fn list_corpus(cfg: &Config) -> Result<()> {
    let assembler = Assembler::from_config(&cfg.corpus)?;
    let walker = assembler.walker();

    println!("{:<48} {:>10} {:>8}", "DOCUMENT", "CATEGORIES", "RECORDS");
    let (mut documents, mut unparseable, mut records) = (0usize, 0usize, 0usize);
    for path in walker.documents() {
        let document = extract_records(&path, assembler.reserved_keys());
        let relative = path.strip_prefix(walker.root()).unwrap_or(&path);
        documents += 1;
        if document.is_parseable() {
            records += document.record_count();
            println!(
                "{:<48} {:>10} {:>8}",
                relative.display(),
                document.categories().len(),
                document.record_count()
            );
        } else {
            unparseable += 1;
            println!("{:<48} {:>10} {:>8}", relative.display(), "-", "unparseable");
        }
    }
    println!(
        "{} documents ({} unparseable), {} records",
        documents, unparseable, records
    );
    Ok(())
}
