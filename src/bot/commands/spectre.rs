//! Spectre commands - AI-assisted writing of command files.
//!
//! A session starts with `/spectre begin`, continues with `/spectre whisper`
//! and ends with a save or `/spectre retreat`.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{
            BotData,
            handlers::{server_info, surface::colour},
        },
        config::tiers::Budget,
        core::{
            authoring::Exchange,
            prompts::Prompt,
            report::{ReportColor, truncate},
            tier::Tier,
        },
        errors::{Error, Result},
    };
    use poise::serenity_prelude as serenity;
    use std::time::Duration;

    const DETAILS_BUTTON: &str = "osiris_save_details";
    const DETAILS_TIMEOUT: Duration = Duration::from_secs(300);

    /// Tier to start a session at.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, poise::ChoiceParameter)]
    pub enum SpectreTier {
        Drifter,
        Seeker,
        Abysswalker,
    }

    impl From<SpectreTier> for Tier {
        fn from(tier: SpectreTier) -> Self {
            match tier {
                SpectreTier::Drifter => Self::Drifter,
                SpectreTier::Seeker => Self::Seeker,
                SpectreTier::Abysswalker => Self::Abysswalker,
            }
        }
    }

    fn budget_text(budget: Budget) -> String {
        match budget {
            Budget::Unlimited => "∞".to_string(),
            Budget::Limited(n) => n.to_string(),
        }
    }

    fn exchange_embed(title: &str, intro: Option<&str>, exchange: &Exchange) -> serenity::CreateEmbed {
        let mut description = String::new();
        if let Some(intro) = intro {
            description.push_str(&truncate(intro, 1000));
            description.push_str("\n\n");
        }
        description.push_str(&format!("```\n{}\n```", truncate(&exchange.reply, 3800)));

        serenity::CreateEmbed::new()
            .title(title)
            .description(description)
            .colour(colour(ReportColor::Grey))
            .footer(serenity::CreateEmbedFooter::new(format!(
                "Replies left: {} | Saves left: {}",
                budget_text(exchange.allowance.replies),
                budget_text(exchange.allowance.saves)
            )))
    }

    /// Parent command for AI-assisted file writing.
    #[poise::command(
        slash_command,
        guild_only,
        subcommands(
            "spectre_begin",
            "spectre_whisper",
            "spectre_save_temp",
            "spectre_save_forever",
            "spectre_retreat"
        )
    )]
    pub async fn spectre(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let help_text = "Spectre writes command files with you. Available subcommands:\n\
            `/spectre begin` - Start a session\n\
            `/spectre whisper` - Continue the conversation\n\
            `/spectre save_temp` - Save the last reply as your temporary file\n\
            `/spectre save_forever` - Save the last reply permanently\n\
            `/spectre retreat` - End the session without saving";

        ctx.say(help_text).await?;
        Ok(())
    }

    /// Starts a Spectre session and sends your first request.
    #[poise::command(slash_command, rename = "begin")]
    pub async fn spectre_begin(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Tier to work at"] tier: SpectreTier,
        #[description = "What the command file should do"] prompt: String,
    ) -> Result<()> {
        ctx.defer().await?;
        let data = ctx.data();
        let snapshot = server_info::guild_snapshot(ctx).await;

        let exchange = data
            .authoring
            .begin(ctx.author().id.get(), tier.into(), &prompt, snapshot.as_ref())
            .await?;

        let prompts = data.authoring.prompts();
        let intro = prompts.load(Prompt::Intro).await.ok();
        let title = format!("Spectre • {}", Tier::from(tier));
        ctx.send(poise::CreateReply::default().embed(exchange_embed(
            &title,
            intro.as_deref(),
            &exchange,
        )))
        .await?;

        if let Ok(instructions) = prompts.load(Prompt::UserInstructions).await {
            ctx.send(
                poise::CreateReply::default()
                    .content(truncate(&instructions, 2000))
                    .ephemeral(true),
            )
            .await?;
        }
        Ok(())
    }

    /// Continues your Spectre session.
    #[poise::command(slash_command, rename = "whisper")]
    pub async fn spectre_whisper(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Your next message"] prompt: String,
    ) -> Result<()> {
        ctx.defer().await?;
        let exchange = ctx
            .data()
            .authoring
            .whisper(ctx.author().id.get(), &prompt)
            .await?;
        ctx.send(poise::CreateReply::default().embed(exchange_embed("Spectre", None, &exchange)))
            .await?;
        Ok(())
    }

    /// Saves the last reply as your temporary file and ends the session.
    #[poise::command(slash_command, rename = "save_temp")]
    pub async fn spectre_save_temp(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        ctx.defer().await?;
        let content = ctx
            .data()
            .authoring
            .save_ephemeral(ctx.author().id.get())
            .await?;

        ctx.say(format!(
            "💾 Saved to your temporary file. Run it with `/commit source:temporary`.\n```\n{}\n```",
            truncate(&content, 1800)
        ))
        .await?;
        Ok(())
    }

    /// Name and description asked for once the file has been refined.
    #[derive(Debug, poise::Modal)]
    #[name = "Save File Metadata"]
    struct SaveDetails {
        #[name = "File name"]
        #[placeholder = "Shown in your vault"]
        #[max_length = 100]
        name: String,
        #[name = "Description"]
        #[placeholder = "What the file does"]
        #[paragraph]
        #[max_length = 500]
        description: Option<String>,
    }

    fn details_row() -> serenity::CreateActionRow {
        serenity::CreateActionRow::Buttons(vec![
            serenity::CreateButton::new(DETAILS_BUTTON)
                .label("Name and save")
                .style(serenity::ButtonStyle::Primary),
        ])
    }

    /// Refines the last reply, asks for a name, then saves it permanently and
    /// ends the session.
    #[poise::command(slash_command, rename = "save_forever")]
    pub async fn spectre_save_forever(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let data = ctx.data();
        let user_id = ctx.author().id.get();
        ctx.defer_ephemeral().await?;

        let staged = data.authoring.prepare_permanent(user_id).await?;
        let reply = ctx
            .send(
                poise::CreateReply::default()
                    .content(format!(
                        "📝 Refined for saving:\n```\n{}\n```",
                        truncate(&staged, 1800)
                    ))
                    .components(vec![details_row()])
                    .ephemeral(true),
            )
            .await?;
        let message = reply.message().await?;

        let press = serenity::ComponentInteractionCollector::new(ctx.serenity_context())
            .message_id(message.id)
            .author_id(ctx.author().id)
            .timeout(DETAILS_TIMEOUT)
            .await;
        let Some(press) = press else {
            reply
                .edit(
                    ctx,
                    poise::CreateReply::default()
                        .content("⌛ Save not finished. Your session is still open.")
                        .components(vec![]),
                )
                .await?;
            return Ok(());
        };

        let details = poise::execute_modal_on_component_interaction::<SaveDetails>(
            ctx,
            press,
            None,
            Some(DETAILS_TIMEOUT),
        )
        .await?;
        let Some(details) = details else {
            ctx.say("⌛ Save not finished. Your session is still open.")
                .await?;
            return Ok(());
        };

        let name = details.name.trim();
        if name.is_empty() {
            ctx.say("❌ The file name cannot be empty.").await?;
            return Ok(());
        }

        let metadata = data
            .authoring
            .save_permanent(
                user_id,
                name,
                details.description.as_deref().unwrap_or_default().trim(),
            )
            .await?;

        ctx.say(format!(
            "💾 Saved **{}** as `{}`. Run it with `/commit source:saved uid:{}`.",
            metadata.file_name, metadata.uid, metadata.uid
        ))
        .await?;
        Ok(())
    }

    /// Ends your Spectre session without saving.
    #[poise::command(slash_command, rename = "retreat")]
    pub async fn spectre_retreat(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        ctx.data().authoring.retreat(ctx.author().id.get()).await?;
        ctx.say("👻 Session ended.").await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
