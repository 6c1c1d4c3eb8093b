//! Vault command - a user's saved files and market saves.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{BotData, handlers::surface::colour},
        core::{
            market,
            report::{ReportColor, truncate},
        },
        errors::{Error, Result},
    };
    use poise::serenity_prelude as serenity;
    use std::fmt::Write;

    /// Discord allows at most 25 fields per embed.
    const MAX_FIELDS: usize = 25;

    #[allow(clippy::cast_possible_truncation)]
    fn created_date(epoch_secs: f64) -> String {
        chrono::DateTime::from_timestamp(epoch_secs as i64, 0)
            .map_or_else(|| "unknown".to_string(), |d| d.format("%Y-%m-%d").to_string())
    }

    /// Lists your saved files and the market files you saved.
    #[poise::command(slash_command)]
    pub async fn vault(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let data = ctx.data();
        let user_id = ctx.author().id.get();

        let files = data.store.list_saved(user_id).await?;
        let market_saves = market::saved_by_user(&data.database, user_id).await?;

        if files.is_empty() && market_saves.is_empty() {
            ctx.say("🗄️ Your vault is empty. Save a file with `/spectre save_forever` to get started!")
                .await?;
            return Ok(());
        }

        let mut fields = Vec::new();
        for file in files.iter().take(MAX_FIELDS) {
            let created = created_date(file.date_created);
            let mut value = String::new();
            if !file.description.is_empty() {
                writeln!(value, "{}", truncate(&file.description, 200))?;
            }
            write!(
                value,
                "UID: `{}`\nTier: {} | Saves: {} | Created: {created}",
                file.uid, file.tier_used, file.saves
            )?;
            fields.push((truncate(&file.file_name, 256), value, false));
        }

        let mut market_text = String::new();
        for listing in &market_saves {
            writeln!(market_text, "• **{}** `{}`", listing.name, listing.uid)?;
        }
        if !market_text.is_empty() && fields.len() < MAX_FIELDS {
            fields.push((
                "🛒 Market saves".to_string(),
                truncate(&market_text, 1024),
                false,
            ));
        }

        let embed = serenity::CreateEmbed::default()
            .title(format!("🗄️ {}'s Vault", ctx.author().name))
            .description(format!(
                "{} saved file(s), {} market save(s).",
                files.len(),
                market_saves.len()
            ))
            .fields(fields)
            .colour(colour(ReportColor::Grey));

        ctx.send(poise::CreateReply::default().embed(embed).ephemeral(true))
            .await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
