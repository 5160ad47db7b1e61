use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use manualbot::cli::{format_answer, format_disk_usage, run_repl};
use manualbot::{
    AppConfig, ConversationOrchestrator, GroqChatService, OrchestratorConfig, PassageIndex,
};
use manualbot_core::{CacheStore, CallMonitor, RetryingCompletionClient, COMPLETION_CALL};

#[derive(Parser)]
#[command(name = "manualbot")]
#[command(about = "Question answering over network equipment manuals", long_about = None)]
struct Cli {
    /// Cache directory (overrides CACHE_DIR)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Passage index directory (overrides INDEX_DIR)
    #[arg(long)]
    index_dir: Option<PathBuf>,

    /// Answer every question from scratch
    #[arg(long)]
    no_cache: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Ask a single question
    Ask {
        /// The question to answer
        question: String,
    },

    /// Interactive conversation
    Chat,

    /// Replace the passage index with a JSON array of passages
    Index {
        /// File with `[{"text", "source_file", "page"}, ...]`
        passages: PathBuf,
    },

    /// Show cached entry count and disk usage
    Stats,

    /// Delete all cached answers
    ClearCache,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(dir) = &cli.cache_dir {
        config.cache_dir = dir.clone();
    }
    if let Some(dir) = &cli.index_dir {
        config.index_dir = dir.clone();
    }
    if cli.no_cache {
        config.enable_cache = false;
    }

    init_logging(&config)?;

    match cli.command {
        Commands::Ask { ref question } => {
            let monitor = Arc::new(CallMonitor::new());
            let mut orch = create_orchestrator(&config, monitor.clone())?;

            let answer = orch.ask(question).await?;
            println!("{}", format_answer(&answer));

            monitor.log_summary(COMPLETION_CALL);
        }

        Commands::Chat => {
            let monitor = Arc::new(CallMonitor::new());
            let mut orch = create_orchestrator(&config, monitor.clone())?;

            println!("Network manual assistant. Commands: /clear, /clear-cache, /stats, /history, /quit");
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            run_repl(&mut orch, Some(monitor.as_ref()), stdin, tokio::io::stdout()).await?;
        }

        Commands::Index { ref passages } => {
            let mut index = PassageIndex::open(&config.index_dir)
                .with_context(|| format!("Failed to open index at {:?}", config.index_dir))?;
            let count = index.import_json(passages)?;
            println!("Indexed {} passages into {:?}", count, config.index_dir);
        }

        Commands::Stats => {
            let cache = CacheStore::new(config.to_cache_config())?;
            println!("{}", format_disk_usage(&cache.stats()));
        }

        Commands::ClearCache => {
            let cache = CacheStore::new(config.to_cache_config())?;
            let removed = cache.clear_all()?;
            println!("Removed {} cached answers", removed);
        }
    }

    Ok(())
}

/// Console logging, plus a daily file under LOG_DIR when set
fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::new(
        std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_directive()),
    );

    let file_layer = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {:?}", dir))?;
            let path = dir.join(format!(
                "chatbot_{}.log",
                chrono::Local::now().format("%Y%m%d")
            ));
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {:?}", path))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(Arc::new(file)),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    Ok(())
}

fn create_orchestrator(
    config: &AppConfig,
    monitor: Arc<CallMonitor>,
) -> Result<ConversationOrchestrator> {
    config.validate()?;

    let index = PassageIndex::open_reader_only(&config.index_dir)
        .with_context(|| format!("Failed to open index at {:?}", config.index_dir))?;
    if index.count() == 0 {
        warn!(
            "Passage index at {:?} is empty; run `manualbot index <file>` first",
            config.index_dir
        );
    }

    let service = GroqChatService::new(config.to_groq_settings()?)?;
    let client = RetryingCompletionClient::new(Arc::new(service))
        .with_config(config.to_retry_config())
        .with_metrics(monitor.clone());

    let cache = if config.enable_cache {
        Some(Arc::new(CacheStore::new(config.to_cache_config())?))
    } else {
        info!("Response cache disabled");
        None
    };

    let orch_config = OrchestratorConfig {
        search_k: config.search_k,
        ..OrchestratorConfig::default()
    };

    Ok(ConversationOrchestrator::new(Arc::new(index), client, cache)
        .with_config(orch_config)
        .with_metrics(monitor))
}
