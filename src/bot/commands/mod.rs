//! Discord command implementations organized by category.

#![allow(clippy::too_long_first_doc_paragraph)]

/// Command file execution and undo
pub mod executor;

/// General utility commands
pub mod general;

/// Owner-only maintenance commands
pub mod maintenance;

/// Market commands
pub mod market;

/// AI authoring commands
pub mod spectre;

/// Saved file listing
pub mod vault;

use crate::{bot::BotData, errors::Error};

/// Every slash command the bot registers.
#[must_use]
pub fn all() -> Vec<poise::Command<BotData, Error>> {
    vec![
        general::ping(),
        general::help(),
        executor::commit(),
        spectre::spectre(),
        vault::vault(),
        market::market(),
        maintenance::maintenance(),
        maintenance::reload_commands(),
    ]
}
