pub mod classifier;
pub mod commands;
pub mod completion;
pub mod config;
pub mod db;
pub mod llm;
pub mod market;
pub mod prompt;
pub mod repl;
pub mod session;

use anyhow::Context;
use tracing::{info, warn};

use commands::Orchestrator;
use completion::CompletionClient;
use config::AppConfig;
use db::{Database, KeyValueBacking, MemoryBacking};
use llm::perplexity::PerplexityClient;
use market::StockDataClient;
use session::SessionStore;

/// Wire the orchestrator and optional quote client from configuration.
pub fn build(config: &AppConfig) -> anyhow::Result<(Orchestrator, Option<StockDataClient>)> {
    let backing: Box<dyn KeyValueBacking> = match &config.session_db {
        Some(path) => {
            let database = Database::new(path)
                .with_context(|| format!("failed to open session store at {}", path.display()))?;
            info!(path = %path.display(), "using file-backed session store");
            Box::new(database)
        }
        None => Box::new(MemoryBacking::new()),
    };

    let backend = PerplexityClient::new(config.perplexity()).context("failed to build HTTP client")?;
    let orchestrator = Orchestrator::new(
        CompletionClient::new(Box::new(backend)),
        SessionStore::new(backing),
    )
    .with_options(config.completion_options());

    if let Some(model) = &config.default_model {
        if orchestrator.transcript().is_empty() {
            orchestrator.change_model(model)?;
        }
    }

    let market = match &config.stock_data_url {
        Some(url) => match StockDataClient::new(url.clone(), config.timeout) {
            Ok(client) => Some(client),
            Err(e) => {
                warn!(error = %e, "quote lookups disabled");
                None
            }
        },
        None => None,
    };

    info!(
        session = %orchestrator.session_id(),
        model = %orchestrator.selected_model(),
        "session ready"
    );
    Ok((orchestrator, market))
}

pub async fn run(config: AppConfig) -> anyhow::Result<()> {
    let (orchestrator, market) = build(&config)?;
    repl::run(orchestrator, market).await
}
