//! Owner-only commands - maintenance switches and handler reload.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::BotData,
        core::{
            maintenance::{CutoverTarget, Module},
            market::MarketRequests,
        },
        errors::{Error, Result},
    };
    use std::sync::Arc;

    /// Module to toggle.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, poise::ChoiceParameter)]
    pub enum ModuleChoice {
        #[name = "executor"]
        Executor,
        #[name = "spectre"]
        Spectre,
        #[name = "market"]
        Market,
    }

    impl From<ModuleChoice> for Module {
        fn from(choice: ModuleChoice) -> Self {
            match choice {
                ModuleChoice::Executor => Self::Executor,
                ModuleChoice::Spectre => Self::Authoring,
                ModuleChoice::Market => Self::Market,
            }
        }
    }

    /// Toggles maintenance for a module.
    ///
    /// New work is rejected at once; sessions still running when the grace
    /// window ends are terminated.
    #[poise::command(slash_command, owners_only)]
    pub async fn maintenance(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Module to toggle"] module: ModuleChoice,
    ) -> Result<()> {
        let data = ctx.data();
        let module = Module::from(module);
        let target: Arc<dyn CutoverTarget> = match module {
            Module::Executor => Arc::new(data.executor.active().clone()),
            Module::Authoring => Arc::new(data.authoring.sessions().clone()),
            Module::Market => Arc::new(MarketRequests),
        };

        let enabled = data.maintenance.toggle(module, target);
        let message = if enabled {
            format!(
                "🔧 Maintenance enabled for `{module}`. Active sessions end in {} minute(s).",
                data.maintenance.grace().as_secs().div_ceil(60)
            )
        } else {
            format!("✅ Maintenance disabled for `{module}`.")
        };
        tracing::info!(%module, enabled, user = %ctx.author().id, "Maintenance toggled");
        ctx.say(message).await?;
        Ok(())
    }

    /// Rescans the command manifests.
    #[poise::command(slash_command, owners_only)]
    pub async fn reload_commands(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let loaded = ctx.data().executor.engine().registry().reload().await?;
        ctx.say(format!("🔄 Reloaded {loaded} command(s).")).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
