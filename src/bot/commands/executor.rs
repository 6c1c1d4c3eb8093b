//! Executor commands - `/commit` and the undo buttons on its report.
//!
//! A completed run's report carries an Undo button. Pressing it asks a fresh
//! Spectre session for the inverse file, shows it, and runs it only after the
//! user confirms. Buttons expire after the configured confirmation window.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{
            BotData,
            handlers::{
                autocomplete,
                builtin::DiscordInvocation,
                surface::{self, MessageSurface},
            },
        },
        core::{
            artifact::ArtifactRef,
            engine::UndoTicket,
            execution::CommitRequest,
            market,
            undo::commit_undo,
        },
        errors::{Error, Result},
    };
    use poise::serenity_prelude as serenity;
    use std::{sync::Arc, time::Duration};

    const UNDO_BUTTON: &str = "osiris_undo";
    const CONFIRM_BUTTON: &str = "osiris_undo_confirm";
    const CANCEL_BUTTON: &str = "osiris_undo_cancel";

    /// Which file `/commit` runs.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, poise::ChoiceParameter)]
    pub enum CommitSource {
        #[name = "temporary"]
        Temporary,
        #[name = "saved"]
        Saved,
        #[name = "market"]
        Market,
    }

    fn invocation(ctx: poise::Context<'_, BotData, Error>) -> DiscordInvocation {
        DiscordInvocation {
            serenity: ctx.serenity_context().clone(),
            guild_id: ctx.guild_id(),
            channel_id: ctx.channel_id(),
            user_id: ctx.author().id,
        }
    }

    fn progress_surface(ctx: poise::Context<'_, BotData, Error>) -> MessageSurface {
        MessageSurface::new(Arc::clone(&ctx.serenity_context().http), ctx.channel_id())
    }

    fn undo_row() -> serenity::CreateActionRow {
        serenity::CreateActionRow::Buttons(vec![
            serenity::CreateButton::new(UNDO_BUTTON)
                .label("Undo")
                .style(serenity::ButtonStyle::Secondary),
        ])
    }

    fn confirm_row() -> serenity::CreateActionRow {
        serenity::CreateActionRow::Buttons(vec![
            serenity::CreateButton::new(CONFIRM_BUTTON)
                .label("Run undo")
                .style(serenity::ButtonStyle::Danger),
            serenity::CreateButton::new(CANCEL_BUTTON)
                .label("Cancel")
                .style(serenity::ButtonStyle::Secondary),
        ])
    }

    /// Waits for the caller to press a button on `message_id`.
    async fn await_press(
        ctx: poise::Context<'_, BotData, Error>,
        message_id: serenity::MessageId,
    ) -> Option<serenity::ComponentInteraction> {
        let timeout = Duration::from_secs(ctx.data().config.executor.undo_confirm_secs);
        serenity::ComponentInteractionCollector::new(ctx.serenity_context())
            .message_id(message_id)
            .author_id(ctx.author().id)
            .timeout(timeout)
            .await
    }

    /// Acknowledges a press and strips the buttons from its message.
    async fn acknowledge(
        ctx: poise::Context<'_, BotData, Error>,
        press: &serenity::ComponentInteraction,
    ) -> Result<()> {
        press
            .create_response(
                ctx.serenity_context(),
                serenity::CreateInteractionResponse::UpdateMessage(
                    serenity::CreateInteractionResponseMessage::new().components(vec![]),
                ),
            )
            .await?;
        Ok(())
    }

    /// Works out which file to run. Returns `None` after telling the user
    /// what is missing.
    async fn resolve_artifact(
        ctx: poise::Context<'_, BotData, Error>,
        source: CommitSource,
        uid: Option<String>,
    ) -> Result<Option<ArtifactRef>> {
        let user_id = ctx.author().id.get();
        if source == CommitSource::Temporary {
            return Ok(Some(ArtifactRef::Ephemeral { user_id }));
        }

        let Some(uid) = uid.map(|u| u.trim().to_string()).filter(|u| !u.is_empty()) else {
            ctx.say("Please provide the `uid` of the file to run.").await?;
            return Ok(None);
        };

        if source == CommitSource::Saved {
            return Ok(Some(ArtifactRef::Saved { user_id, uid }));
        }

        let db = &ctx.data().database;
        if !market::has_saved(db, user_id, &uid).await? {
            ctx.say("Save this listing with `/market save` before running it.")
                .await?;
            return Ok(None);
        }
        let listing = market::get_listing(db, &uid)
            .await?
            .ok_or_else(|| Error::ListingNotFound { uid: uid.clone() })?;
        market::listing_artifact(&listing)
            .map(Some)
            .ok_or(Error::ListingNotFound { uid })
    }

    /// Runs a command file and reports the outcome.
    ///
    /// Temporary files come from `/spectre save_temp`, saved files from
    /// `/spectre save_forever`, market files from `/market save`.
    #[poise::command(slash_command, guild_only)]
    pub async fn commit(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Which file to run"] source: CommitSource,
        #[description = "UID of a saved or market file"]
        #[autocomplete = "autocomplete::autocomplete_commit_uid"]
        uid: Option<String>,
    ) -> Result<()> {
        let Some(artifact) = resolve_artifact(ctx, source, uid).await? else {
            return Ok(());
        };
        ctx.defer().await?;

        let data = ctx.data();
        let user_id = ctx.author().id.get();
        let progress = progress_surface(ctx);
        let outcome = data
            .executor
            .commit(CommitRequest { user_id, artifact }, &invocation(ctx), &progress)
            .await;
        progress.clear().await;
        let report = outcome?;

        let components = if report.undo.is_some() {
            vec![undo_row()]
        } else {
            vec![]
        };
        let handle = ctx
            .send(
                poise::CreateReply::default()
                    .embed(surface::report_embed(&report))
                    .components(components),
            )
            .await?;

        let Some(ticket) = report.undo.clone() else {
            return Ok(());
        };
        let message_id = handle.message().await?.id;
        match await_press(ctx, message_id).await {
            Some(press) => {
                acknowledge(ctx, &press).await?;
                offer_undo(ctx, &ticket).await
            }
            None => {
                handle
                    .edit(
                        ctx,
                        poise::CreateReply::default()
                            .embed(surface::report_embed(&report))
                            .components(vec![]),
                    )
                    .await?;
                Ok(())
            }
        }
    }

    /// Proposes an inverse file and runs it once confirmed.
    async fn offer_undo(ctx: poise::Context<'_, BotData, Error>, ticket: &UndoTicket) -> Result<()> {
        let data = ctx.data();
        let proposal = data.undo.propose(&ticket.original_content).await?;
        tracing::info!(session_id = %proposal.session_id, "Undo proposed");

        let handle = ctx
            .send(
                poise::CreateReply::default()
                    .embed(surface::undo_proposal_embed(&ticket.artifact, &proposal.candidate))
                    .components(vec![confirm_row()]),
            )
            .await?;
        let message_id = handle.message().await?.id;

        let confirmed = match await_press(ctx, message_id).await {
            Some(press) => {
                acknowledge(ctx, &press).await?;
                press.data.custom_id == CONFIRM_BUTTON
            }
            None => {
                handle
                    .edit(
                        ctx,
                        poise::CreateReply::default()
                            .embed(surface::undo_proposal_embed(
                                &ticket.artifact,
                                &proposal.candidate,
                            ))
                            .components(vec![]),
                    )
                    .await?;
                false
            }
        };
        if !confirmed {
            ctx.say("Undo cancelled.").await?;
            return Ok(());
        }

        let progress = progress_surface(ctx);
        let outcome = commit_undo(
            &data.executor,
            ctx.author().id.get(),
            ticket,
            &proposal.candidate,
            &invocation(ctx),
            &progress,
        )
        .await;
        progress.clear().await;
        let report = outcome?;

        ctx.send(poise::CreateReply::default().embed(surface::report_embed(&report)))
            .await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
