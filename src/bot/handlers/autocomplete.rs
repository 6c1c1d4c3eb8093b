//! Autocomplete handlers for Discord slash command parameters.
//!
//! Suggestions show the file's display name and fill in its UID.

use crate::{
    bot::BotData,
    core::{artifact::ArtifactMetadata, market, report::truncate},
    errors::Error,
};
use poise::serenity_prelude::AutocompleteChoice;

/// Discord shows at most 25 suggestions.
const MAX_CHOICES: usize = 25;

fn matches(partial: &str, name: &str, uid: &str) -> bool {
    let partial = partial.to_lowercase();
    name.to_lowercase().contains(&partial) || uid.starts_with(&partial)
}

fn choice(name: &str, uid: &str) -> AutocompleteChoice {
    AutocompleteChoice::new(truncate(&format!("{name} ({uid})"), 100), uid.to_string())
}

async fn own_files(ctx: poise::Context<'_, BotData, Error>) -> Vec<ArtifactMetadata> {
    let user_id = ctx.author().id.get();
    match ctx.data().store.list_saved(user_id).await {
        Ok(files) => files,
        Err(e) => {
            tracing::error!("Autocomplete: failed to list saved files for {user_id}: {e}");
            Vec::new()
        }
    }
}

/// Suggests the user's saved files.
pub async fn autocomplete_saved_uid(
    ctx: poise::Context<'_, BotData, Error>,
    partial: &str,
) -> Vec<AutocompleteChoice> {
    own_files(ctx)
        .await
        .into_iter()
        .filter(|m| matches(partial, &m.file_name, &m.uid))
        .take(MAX_CHOICES)
        .map(|m| choice(&m.file_name, &m.uid))
        .collect()
}

/// Suggests the user's saved files followed by the market listings they saved.
pub async fn autocomplete_commit_uid(
    ctx: poise::Context<'_, BotData, Error>,
    partial: &str,
) -> Vec<AutocompleteChoice> {
    let mut choices = autocomplete_saved_uid(ctx, partial).await;

    let user_id = ctx.author().id.get();
    match market::saved_by_user(&ctx.data().database, user_id).await {
        Ok(listings) => choices.extend(
            listings
                .into_iter()
                .filter(|l| matches(partial, &l.name, &l.uid))
                .map(|l| choice(&format!("🛒 {}", l.name), &l.uid)),
        ),
        Err(e) => tracing::error!("Autocomplete: failed to list market saves for {user_id}: {e}"),
    }

    choices.truncate(MAX_CHOICES);
    choices
}

/// Suggests the user's own market listings.
pub async fn autocomplete_own_listing(
    ctx: poise::Context<'_, BotData, Error>,
    partial: &str,
) -> Vec<AutocompleteChoice> {
    let user_id = ctx.author().id.get();
    match market::listings_by_owner(&ctx.data().database, user_id).await {
        Ok(listings) => listings
            .into_iter()
            .filter(|l| matches(partial, &l.name, &l.uid))
            .take(MAX_CHOICES)
            .map(|l| choice(&l.name, &l.uid))
            .collect(),
        Err(e) => {
            tracing::error!("Autocomplete: failed to list listings for {user_id}: {e}");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_name_or_uid_prefix() {
        assert!(matches("RAID", "Raid setup", "abc-123"));
        assert!(matches("abc", "Raid setup", "abc-123"));
        assert!(!matches("123", "Raid setup", "abc-123"));
    }
}
