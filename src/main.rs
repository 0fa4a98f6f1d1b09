//! chunk-courier CLI
//!
//! Fetches a pending document from the local relay endpoint, drives it
//! through a browser chat interface via WebDriver, and hands the captured
//! answer back.

use chunk_courier::relay::{normalize_answer, RelayClient, ResponseRelay};
use chunk_courier::surface::WebDriverSurface;
use chunk_courier::transcript::Transcript;
use chunk_courier::{Courier, CourierConfig};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// chunk-courier - deliver oversized documents through a chat interface
#[derive(Parser, Debug)]
#[command(name = "chunk-courier")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Base URL of the local relay endpoint
    #[arg(long, default_value = "http://localhost:8765")]
    relay_url: String,

    /// WebDriver endpoint steering the browser
    #[arg(long, default_value = "http://localhost:9515")]
    webdriver_url: String,

    /// Chat page to open when creating a fresh browser session
    #[arg(long, default_value = "https://chatgpt.com/")]
    chat_url: String,

    /// Attach to an existing WebDriver session id instead of creating one
    /// (useful when the chat page needs a manual login first)
    #[arg(long)]
    session: Option<String>,

    /// Path to a TOML config overlay
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the initial chunk size (characters)
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Override the minimum chunk size (characters)
    #[arg(long)]
    min_chunk_size: Option<usize>,

    /// Do not append the answer to the transcript file
    #[arg(long)]
    no_transcript: bool,

    /// Verbose output: show per-poll observation detail
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    let mut config = match &cli.config {
        Some(path) => CourierConfig::load(path)?,
        None => CourierConfig::default(),
    };
    if let Some(size) = cli.chunk_size {
        config.initial_chunk_size = size;
    }
    if let Some(size) = cli.min_chunk_size {
        config.min_chunk_size = size;
    }

    info!("Fetching pending document from {}", cli.relay_url);
    let relay = RelayClient::new(&cli.relay_url)?;
    let job = relay.fetch_job().await?;

    let mut surface = match &cli.session {
        Some(id) => {
            info!("Attaching to WebDriver session {id}");
            WebDriverSurface::attach(&cli.webdriver_url, id)?
        }
        None => {
            info!("Opening {} via {}", cli.chat_url, cli.webdriver_url);
            WebDriverSurface::connect(&cli.webdriver_url, &cli.chat_url).await?
        }
    };

    let courier = Courier::new(config);
    let response_relay = ResponseRelay::new(relay);
    let answer = courier
        .run(&mut surface, &job.content, &job.intent, &response_relay)
        .await?;

    let formatted = normalize_answer(&answer);
    if !cli.no_transcript {
        if let Some(path) = Transcript::default_path() {
            Transcript::new(path).record_best_effort(&job.intent, &formatted);
        }
    }

    println!("{}", "=".repeat(80));
    println!("{formatted}");
    println!("{}", "=".repeat(80));

    Ok(())
}
