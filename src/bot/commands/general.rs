//! General Discord commands - ping and help.

// Inner module to suppress missing_docs warnings for poise macro-generated code
mod inner {
    #![allow(missing_docs)]

    use crate::{
        bot::BotData,
        core::tier::Classification,
        errors::{Error, Result},
    };
    use std::fmt::Write;

    /// Responds with "Pong!" to test bot connectivity.
    #[poise::command(slash_command, prefix_command)]
    pub async fn ping(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        ctx.say("Pong!").await?;
        Ok(())
    }

    /// Displays the bot's commands and the file commands currently loaded.
    #[poise::command(slash_command, prefix_command)]
    pub async fn help(ctx: poise::Context<'_, BotData, Error>) -> Result<()> {
        let mut help_text = String::from(
            "**Osiris Help**\n\
            Write command files and run them against this server.\n\n\
            **Running files**\n\
            • `/commit source:<temporary|saved|market> [uid]` - Runs a command file.\n\
            • `/vault` - Lists your saved files and the market files you saved.\n\n\
            **Writing files with Spectre**\n\
            • `/spectre begin <tier> <prompt>` - Starts an AI session.\n\
            • `/spectre whisper <prompt>` - Continues the conversation.\n\
            • `/spectre save_temp` - Saves the last reply as your temporary file.\n\
            • `/spectre save_forever` - Refines it, asks for a name, and saves it permanently.\n\
            • `/spectre retreat` - Ends the session without saving.\n\n\
            **Market**\n\
            • `/market list|unlist|view|browse|mine|save|star` - Share and find files.\n\n\
            **File format**\n\
            One `command key=value` per line, or several separated by `;`. \
            Lines starting with `#` are comments; `NOTICE:text` adds a log line.\n",
        );

        let available = ctx.data().executor.engine().registry().available();
        if !available.is_empty() {
            help_text.push_str("\n**File commands**\n");
            for (name, classification, description) in available {
                let marker = match classification {
                    Classification::Open => "",
                    Classification::Restricted => " 🔒",
                };
                writeln!(help_text, "• `{name}`{marker} - {description}")?;
            }
        }

        ctx.say(help_text).await?;
        Ok(())
    }
}

// Re-export all commands
pub use inner::*;
