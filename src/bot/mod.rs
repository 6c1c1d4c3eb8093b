//! Bot layer - Discord-specific interface and command handlers
//!
//! This module provides the Discord interface for Osiris: slash commands,
//! built-in command handlers, the progress surface and the shared bot context.

/// Discord command implementations (executor, spectre, vault, market, maintenance, general)
pub mod commands;
/// Discord interaction handlers (built-ins, progress surface, autocomplete)
pub mod handlers;

use crate::{
    config::AppConfig,
    core::{
        ai::{BackendFactory, QueryPolicy},
        artifact::ArtifactStore,
        authoring::Authoring,
        engine::{Engine, EngineConfig},
        execution::Executor,
        maintenance::Maintenance,
        prompts::PromptLibrary,
        registry::CommandRegistry,
        undo::UndoEngine,
    },
    errors::{Error, Result},
};
use handlers::builtin::DiscordInvocation;
use poise::serenity_prelude as serenity;
use sea_orm::DatabaseConnection;
use std::{sync::Arc, time::Duration};
use tracing::{error, info, instrument};

/// How often idle authoring sessions are swept.
const IDLE_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Shared data available to all bot commands.
pub struct BotData {
    /// Market database
    pub database: DatabaseConnection,
    /// Loaded configuration
    pub config: Arc<AppConfig>,
    /// Scratch and saved command files
    pub store: ArtifactStore,
    /// Per-module maintenance switches
    pub maintenance: Maintenance,
    /// Runs command files
    pub executor: Executor<DiscordInvocation>,
    /// AI authoring sessions
    pub authoring: Arc<Authoring>,
    /// AI-proposed undo
    pub undo: UndoEngine,
}

impl BotData {
    /// Wires every service together from configuration.
    pub async fn new(
        config: Arc<AppConfig>,
        database: DatabaseConnection,
        registry: CommandRegistry<DiscordInvocation>,
        factory: Arc<dyn BackendFactory>,
    ) -> Self {
        let store = ArtifactStore::new(&config.paths.data_dir);
        let prompts = PromptLibrary::new(&config.paths.prompts_dir);
        let maintenance = Maintenance::new(Duration::from_secs(config.maintenance.grace_secs));

        let engine = Engine::new(
            Arc::new(registry),
            EngineConfig {
                progress_interval: config.executor.progress_interval(),
                notice_window: config.executor.notice_window,
                loading_lines: Arc::new(prompts.loading_lines().await),
                ..EngineConfig::default()
            },
        );
        let executor = Executor::new(engine, store.clone(), maintenance.clone());
        let authoring = Authoring::new(
            &config.ai,
            config.tiers.clone(),
            prompts.clone(),
            Arc::clone(&factory),
            store.clone(),
            maintenance.clone(),
        );
        let undo = UndoEngine::new(prompts, factory, QueryPolicy::from(&config.ai));

        Self {
            database,
            config,
            store,
            maintenance,
            executor,
            authoring: Arc::new(authoring),
            undo,
        }
    }
}

async fn on_error(error: poise::FrameworkError<'_, BotData, Error>) {
    match error {
        poise::FrameworkError::Setup { error, .. } => {
            error!("Failed to start bot: {error:?}");
        }
        poise::FrameworkError::Command { error, ctx, .. } => {
            error!("Error in command `{}`: {error:?}", ctx.command().name);
            let reply = poise::CreateReply::default()
                .content(format!("❌ {error}"))
                .ephemeral(true);
            if let Err(e) = ctx.send(reply).await {
                error!("Failed to send error message: {e}");
            }
        }
        error => {
            if let Err(e) = poise::builtins::on_error(error).await {
                error!("Error while handling error: {e}");
            }
        }
    }
}

fn spawn_idle_sweeper(authoring: Arc<Authoring>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(IDLE_SWEEP_INTERVAL);
        loop {
            ticker.tick().await;
            let closed = authoring.expire_idle().await;
            if closed > 0 {
                info!(closed, "Closed idle AI sessions");
            }
        }
    });
}

/// Starts the Discord client and blocks until it stops.
///
/// # Errors
/// Returns the serenity error if the client cannot be created or stops with one.
#[instrument(skip_all)]
pub async fn run_bot(token: String, data: BotData) -> Result<()> {
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: commands::all(),
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup(|ctx, ready, framework| {
            Box::pin(async move {
                info!("Logged in as {}", ready.user.name);
                info!("Registering commands globally...");
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                spawn_idle_sweeper(Arc::clone(&data.authoring));
                Ok(data)
            })
        })
        .build();

    let intents = serenity::GatewayIntents::non_privileged();

    info!("Setting up Serenity client for Poise framework...");
    let mut client = serenity::ClientBuilder::new(&token, intents)
        .framework(framework)
        .await
        .inspect_err(|e| error!("Error creating client: {e:?}"))?;

    info!("Starting bot client...");
    client
        .start()
        .await
        .inspect_err(|e| error!("Client error: {e:?}"))?;
    Ok(())
}
