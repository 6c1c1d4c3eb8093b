#![allow(clippy::result_large_err)]

use dotenvy::dotenv;
use osiris::{
    bot::{self, BotData, handlers::builtin},
    config::{self, database},
    core::{ai::OpenAiFactory, registry::CommandRegistry},
    errors::{Error, Result},
};
use std::{env, sync::Arc};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Initialize tracing (as early as possible)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // 2. Load .env file; env vars can also be set externally
    dotenv().ok();
    info!("Attempted to load .env file.");

    // 3. Load the main application configuration
    let app_config = Arc::new(config::load_default_config()?);
    info!("Successfully processed application configuration.");

    // 4. Initialize the market database (the default URL lives under data_dir)
    tokio::fs::create_dir_all(&app_config.paths.data_dir).await?;
    let db = database::create_connection()
        .await
        .inspect_err(|e| error!("Failed to connect to database: {e}"))?;
    database::create_tables(&db)
        .await
        .inspect(|()| info!("Database initialized successfully."))
        .inspect_err(|e| error!("Failed to initialize database: {e}"))?;

    // 5. Register built-in handlers and seed their manifests
    let mut registry = CommandRegistry::new(&app_config.paths.commands_dir);
    builtin::register_builtins(&mut registry);
    let seeded = registry.seed_manifests().await?;
    if !seeded.is_empty() {
        info!("Seeded manifests for {}", seeded.join(", "));
    }
    let loaded = registry.reload().await?;
    info!("Loaded {loaded} command manifest(s).");

    // 6. AI backend; LLM_API_KEY is required
    let factory = OpenAiFactory::from_env(&app_config.ai)
        .inspect_err(|e| error!("LLM_API_KEY not found: {e}"))?;

    // 7. Run the bot
    // DISCORD_BOT_TOKEN is loaded here, directly before use, not stored in AppConfig
    let token = env::var("DISCORD_BOT_TOKEN")
        .inspect_err(|e| error!("DISCORD_BOT_TOKEN not found: {e}"))
        .map_err(Error::EnvVar)?;

    let data = BotData::new(app_config, db, registry, Arc::new(factory)).await;
    bot::run_bot(token, data).await
}
