//! Market commands - publish saved files and find other users' files.
//!
//! Every subcommand is rejected while the market module is under maintenance.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::{
            BotData,
            handlers::{autocomplete, surface::colour},
        },
        core::{
            maintenance::Module,
            market::{self, MAX_PAGE, MarketSort},
            report::{ReportColor, truncate},
        },
        entities::market_listing,
        errors::{Error, Result},
    };
    use poise::serenity_prelude as serenity;

    /// Ordering for `/market browse`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, poise::ChoiceParameter)]
    pub enum SortChoice {
        #[name = "newest"]
        Date,
        #[name = "most saved"]
        Saves,
        #[name = "most starred"]
        Stars,
    }

    impl From<SortChoice> for MarketSort {
        fn from(choice: SortChoice) -> Self {
            match choice {
                SortChoice::Date => Self::Date,
                SortChoice::Saves => Self::Saves,
                SortChoice::Stars => Self::Stars,
            }
        }
    }

    fn listing_line(listing: &market_listing::Model) -> String {
        format!(
            "**{}** `{}`\n⭐ {} | 💾 {} | <@{}>",
            listing.name, listing.uid, listing.stars_count, listing.saves_count, listing.owner_id
        )
    }

    fn listings_embed(title: &str, listings: &[market_listing::Model]) -> serenity::CreateEmbed {
        let body = listings
            .iter()
            .map(listing_line)
            .collect::<Vec<_>>()
            .join("\n\n");
        serenity::CreateEmbed::default()
            .title(title)
            .description(truncate(&body, 4096))
            .colour(colour(ReportColor::Grey))
    }

    fn market_open(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        ctx.data().maintenance.check(Module::Market)
    }

    /// Parent command for the file market.
    #[poise::command(
        slash_command,
        subcommands(
            "market_list",
            "market_unlist",
            "market_view",
            "market_browse",
            "market_mine",
            "market_save",
            "market_star"
        )
    )]
    pub async fn market(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let help_text = "File market. Available subcommands:\n\
            `/market list` - Publish one of your saved files\n\
            `/market unlist` - Remove your listing\n\
            `/market view` - Show one listing\n\
            `/market browse` - Find files\n\
            `/market mine` - Your listings\n\
            `/market save` - Add a listing to your vault\n\
            `/market star` - Star a listing";

        ctx.say(help_text).await?;
        Ok(())
    }

    /// Publishes one of your saved files.
    #[poise::command(slash_command, rename = "list")]
    pub async fn market_list(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "UID of your saved file"]
        #[autocomplete = "autocomplete::autocomplete_saved_uid"]
        uid: String,
    ) -> Result<()> {
        market_open(ctx)?;
        let data = ctx.data();
        let listing =
            market::list_artifact(&data.database, &data.store, ctx.author().id.get(), uid.trim())
                .await?;
        ctx.say(format!("🛒 Listed **{}** (`{}`).", listing.name, listing.uid))
            .await?;
        Ok(())
    }

    /// Removes one of your listings. The file stays in your vault.
    #[poise::command(slash_command, rename = "unlist")]
    pub async fn market_unlist(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "UID of your listing"]
        #[autocomplete = "autocomplete::autocomplete_own_listing"]
        uid: String,
    ) -> Result<()> {
        market_open(ctx)?;
        market::unlist_artifact(&ctx.data().database, ctx.author().id.get(), uid.trim()).await?;
        ctx.say(format!("🗑️ Removed listing `{}`.", uid.trim())).await?;
        Ok(())
    }

    /// Shows one listing and its content.
    #[poise::command(slash_command, rename = "view")]
    pub async fn market_view(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "UID of the listing"] uid: String,
    ) -> Result<()> {
        market_open(ctx)?;
        let data = ctx.data();
        let uid = uid.trim();
        let listing = market::get_listing(&data.database, uid)
            .await?
            .ok_or_else(|| Error::ListingNotFound {
                uid: uid.to_string(),
            })?;
        let artifact = market::listing_artifact(&listing).ok_or_else(|| Error::ListingNotFound {
            uid: uid.to_string(),
        })?;
        let content = data.store.read(&artifact).await?;
        let saved = market::has_saved(&data.database, ctx.author().id.get(), uid).await?;

        let description = format!(
            "{}\n\n{}\n\n```\n{}\n```",
            listing_line(&listing),
            truncate(&listing.description, 500),
            truncate(&content, 3000)
        );
        let embed = serenity::CreateEmbed::default()
            .title(truncate(&listing.name, 256))
            .description(description)
            .footer(serenity::CreateEmbedFooter::new(if saved {
                "In your vault"
            } else {
                "Use /market save to add it to your vault"
            }))
            .colour(colour(ReportColor::Grey));
        ctx.send(poise::CreateReply::default().embed(embed)).await?;
        Ok(())
    }

    /// Finds listings, optionally matching a search term.
    #[poise::command(slash_command, rename = "browse")]
    pub async fn market_browse(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "Ordering (default: newest)"] sort: Option<SortChoice>,
        #[description = "Text to look for in names and descriptions"] search: Option<String>,
    ) -> Result<()> {
        market_open(ctx)?;
        let listings = market::browse(
            &ctx.data().database,
            sort.map(MarketSort::from).unwrap_or_default(),
            search.as_deref(),
            MAX_PAGE,
        )
        .await?;

        if listings.is_empty() {
            ctx.say("🛒 No listings found.").await?;
            return Ok(());
        }
        ctx.send(poise::CreateReply::default().embed(listings_embed("🛒 Market", &listings)))
            .await?;
        Ok(())
    }

    /// Shows your listings.
    #[poise::command(slash_command, rename = "mine")]
    pub async fn market_mine(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        market_open(ctx)?;
        let listings =
            market::listings_by_owner(&ctx.data().database, ctx.author().id.get()).await?;

        if listings.is_empty() {
            ctx.say("🛒 You have no listings. Publish one with `/market list`.")
                .await?;
            return Ok(());
        }
        ctx.send(
            poise::CreateReply::default()
                .embed(listings_embed("🛒 Your listings", &listings))
                .ephemeral(true),
        )
        .await?;
        Ok(())
    }

    /// Adds a listing to your vault so you can run it.
    #[poise::command(slash_command, rename = "save")]
    pub async fn market_save(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "UID of the listing"] uid: String,
    ) -> Result<()> {
        market_open(ctx)?;
        let data = ctx.data();
        let listing =
            market::save_listing(&data.database, &data.store, ctx.author().id.get(), uid.trim())
                .await?;
        ctx.say(format!(
            "💾 Saved **{}**. Run it with `/commit source:market uid:{}`.",
            listing.name, listing.uid
        ))
        .await?;
        Ok(())
    }

    /// Stars a listing.
    #[poise::command(slash_command, rename = "star")]
    pub async fn market_star(
        ctx: poise::Context<'_, BotData, Error>,
        #[description = "UID of the listing"] uid: String,
    ) -> Result<()> {
        market_open(ctx)?;
        let listing =
            market::award_star(&ctx.data().database, ctx.author().id.get(), uid.trim()).await?;
        ctx.say(format!(
            "⭐ Starred **{}** ({} star(s)).",
            listing.name, listing.stars_count
        ))
        .await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
