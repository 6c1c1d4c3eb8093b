//! Built-in command handlers that act on the Discord server.
//!
//! Each handler reads its arguments by name and reports problems through
//! [`HandlerError`]; the engine turns those into failed statements.

use crate::core::{
    parser::Arguments,
    registry::{CommandHandler, CommandRegistry, HandlerError},
    tier::Classification,
};
use async_trait::async_trait;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Where a command file is being run: the Discord handle plus the caller.
#[derive(Clone)]
pub struct DiscordInvocation {
    /// Serenity context for HTTP and cache access
    pub serenity: serenity::Context,
    /// Server the command was run in, if any
    pub guild_id: Option<serenity::GuildId>,
    /// Channel the command was run in
    pub channel_id: serenity::ChannelId,
    /// User who committed the file
    pub user_id: serenity::UserId,
}

impl DiscordInvocation {
    fn guild(&self) -> Result<serenity::GuildId, HandlerError> {
        self.guild_id
            .ok_or_else(|| HandlerError::Failed("This command only works in a server".to_string()))
    }

    fn http(&self) -> &serenity::Http {
        &self.serenity.http
    }

    fn reason(&self, args: &Arguments) -> String {
        args.get("reason")
            .map_or_else(|| format!("Osiris command file run by {}", self.user_id), str::to_string)
    }

    /// Finds a channel by mention, ID or case-insensitive name.
    async fn find_channel(&self, reference: &str) -> Result<serenity::GuildChannel, HandlerError> {
        let guild_id = self.guild()?;
        let channels = guild_id.channels(self.http()).await.map_err(discord)?;
        let wanted = strip_mention(reference, "<#");

        if let Ok(id) = wanted.parse::<u64>() {
            if let Some(channel) = channels.get(&serenity::ChannelId::new(id)) {
                return Ok(channel.clone());
            }
        }
        channels
            .into_values()
            .find(|c| c.name.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| HandlerError::NotFound {
                what: format!("Channel '{reference}'"),
            })
    }

    /// Finds a role by mention, ID or case-insensitive name.
    async fn find_role(&self, reference: &str) -> Result<serenity::Role, HandlerError> {
        let guild_id = self.guild()?;
        let roles = guild_id.roles(self.http()).await.map_err(discord)?;
        let wanted = strip_mention(reference, "<@&");

        if let Ok(id) = wanted.parse::<u64>() {
            if let Some(role) = roles.get(&serenity::RoleId::new(id)) {
                return Ok(role.clone());
            }
        }
        roles
            .into_values()
            .find(|r| r.name.eq_ignore_ascii_case(wanted))
            .ok_or_else(|| HandlerError::NotFound {
                what: format!("Role '{reference}'"),
            })
    }

    /// Channel named by `key`, or the invoking channel when absent.
    async fn target_channel(
        &self,
        args: &Arguments,
        key: &str,
    ) -> Result<serenity::ChannelId, HandlerError> {
        match args.get(key) {
            Some(reference) => Ok(self.find_channel(reference).await?.id),
            None => Ok(self.channel_id),
        }
    }
}

#[allow(clippy::needless_pass_by_value)]
fn discord(e: serenity::Error) -> HandlerError {
    HandlerError::Discord(e.to_string())
}

fn strip_mention<'a>(reference: &'a str, prefix: &str) -> &'a str {
    let reference = reference.trim();
    reference
        .strip_prefix(prefix)
        .and_then(|r| r.strip_suffix('>'))
        .unwrap_or(reference)
}

fn parse_bool(args: &Arguments, key: &str) -> Result<bool, HandlerError> {
    match args.get(key).map(str::to_ascii_lowercase).as_deref() {
        None | Some("false" | "no" | "0") => Ok(false),
        Some("true" | "yes" | "1") => Ok(true),
        Some(other) => Err(HandlerError::InvalidArgument {
            name: key.to_string(),
            reason: format!("expected true or false, got '{other}'"),
        }),
    }
}

/// Parses `#rrggbb`, `rrggbb` or a decimal colour value.
fn parse_color(value: &str) -> Result<u32, HandlerError> {
    let value = value.trim();
    let parsed = value
        .strip_prefix('#')
        .or_else(|| value.strip_prefix("0x"))
        .map_or_else(|| value.parse::<u32>(), |hex| u32::from_str_radix(hex, 16));
    parsed
        .ok()
        .filter(|c| *c <= 0x00FF_FFFF)
        .ok_or_else(|| HandlerError::InvalidArgument {
            name: "color".to_string(),
            reason: format!("'{value}' is not a colour"),
        })
}

fn parse_channel_kind(value: Option<&str>) -> Result<serenity::ChannelType, HandlerError> {
    match value.map(str::to_ascii_lowercase).as_deref() {
        None | Some("text") => Ok(serenity::ChannelType::Text),
        Some("voice") => Ok(serenity::ChannelType::Voice),
        Some("category") => Ok(serenity::ChannelType::Category),
        Some("news" | "announcement") => Ok(serenity::ChannelType::News),
        Some("stage") => Ok(serenity::ChannelType::Stage),
        Some("forum") => Ok(serenity::ChannelType::Forum),
        Some(other) => Err(HandlerError::InvalidArgument {
            name: "type".to_string(),
            reason: format!("unknown channel type '{other}'"),
        }),
    }
}

/// `channel_create name=<name> [type=text|voice|category] [category=<name>] [topic=<text>]`
pub struct ChannelCreate;

#[async_trait]
impl CommandHandler<DiscordInvocation> for ChannelCreate {
    async fn execute(&self, ctx: &DiscordInvocation, args: &Arguments) -> Result<(), HandlerError> {
        let guild_id = ctx.guild()?;
        let name = args.require("name")?;
        let kind = parse_channel_kind(args.get("type"))?;
        let reason = ctx.reason(args);

        let mut builder = serenity::CreateChannel::new(name)
            .kind(kind)
            .audit_log_reason(&reason);
        if let Some(category) = args.get("category") {
            builder = builder.category(ctx.find_channel(category).await?.id);
        }
        if let Some(topic) = args.get("topic") {
            builder = builder.topic(topic);
        }

        let channel = guild_id
            .create_channel(ctx.http(), builder)
            .await
            .map_err(discord)?;
        tracing::info!(channel_id = %channel.id, "Created channel '{name}'");
        Ok(())
    }
}

/// `channel_delete channel=<name|id>`
pub struct ChannelDelete;

#[async_trait]
impl CommandHandler<DiscordInvocation> for ChannelDelete {
    async fn execute(&self, ctx: &DiscordInvocation, args: &Arguments) -> Result<(), HandlerError> {
        let channel = ctx.find_channel(args.require("channel")?).await?;
        channel.id.delete(ctx.http()).await.map_err(discord)?;
        tracing::info!(channel_id = %channel.id, "Deleted channel '{}'", channel.name);
        Ok(())
    }
}

/// `channel_slowmode slowmode=<seconds> [channel=<name|id>]`
pub struct ChannelSlowmode;

#[async_trait]
impl CommandHandler<DiscordInvocation> for ChannelSlowmode {
    async fn execute(&self, ctx: &DiscordInvocation, args: &Arguments) -> Result<(), HandlerError> {
        let raw = args.require("slowmode")?;
        let seconds = raw
            .parse::<u16>()
            .ok()
            .filter(|s| *s <= 21_600)
            .ok_or_else(|| HandlerError::InvalidArgument {
                name: "slowmode".to_string(),
                reason: format!("'{raw}' is not between 0 and 21600 seconds"),
            })?;
        let channel_id = ctx.target_channel(args, "channel").await?;
        let reason = ctx.reason(args);

        channel_id
            .edit(
                ctx.http(),
                serenity::EditChannel::new()
                    .rate_limit_per_user(seconds)
                    .audit_log_reason(&reason),
            )
            .await
            .map_err(discord)?;
        Ok(())
    }
}

/// `role_create name=<name> [color=#rrggbb] [hoist=true] [mentionable=true]`
pub struct RoleCreate;

#[async_trait]
impl CommandHandler<DiscordInvocation> for RoleCreate {
    async fn execute(&self, ctx: &DiscordInvocation, args: &Arguments) -> Result<(), HandlerError> {
        let guild_id = ctx.guild()?;
        let name = args.require("name")?;
        let reason = ctx.reason(args);

        let mut builder = serenity::EditRole::new()
            .name(name)
            .hoist(parse_bool(args, "hoist")?)
            .mentionable(parse_bool(args, "mentionable")?)
            .audit_log_reason(&reason);
        if let Some(color) = args.get("color") {
            builder = builder.colour(parse_color(color)?);
        }

        let role = guild_id
            .create_role(ctx.http(), builder)
            .await
            .map_err(discord)?;
        tracing::info!(role_id = %role.id, "Created role '{name}'");
        Ok(())
    }
}

/// `role_delete role=<name|id>`
pub struct RoleDelete;

#[async_trait]
impl CommandHandler<DiscordInvocation> for RoleDelete {
    async fn execute(&self, ctx: &DiscordInvocation, args: &Arguments) -> Result<(), HandlerError> {
        let guild_id = ctx.guild()?;
        let role = ctx.find_role(args.require("role")?).await?;
        guild_id
            .delete_role(ctx.http(), role.id)
            .await
            .map_err(discord)?;
        tracing::info!(role_id = %role.id, "Deleted role '{}'", role.name);
        Ok(())
    }
}

/// `message_send content=<text> [channel=<name|id>]`
pub struct MessageSend;

#[async_trait]
impl CommandHandler<DiscordInvocation> for MessageSend {
    async fn execute(&self, ctx: &DiscordInvocation, args: &Arguments) -> Result<(), HandlerError> {
        let content = args.require("content")?;
        let channel_id = ctx.target_channel(args, "channel").await?;
        channel_id
            .say(ctx.http(), content)
            .await
            .map_err(discord)?;
        Ok(())
    }
}

/// `notice message=<text> [channel=<name|id>] [color=#rrggbb]`: posts an embed.
pub struct Notice;

#[async_trait]
impl CommandHandler<DiscordInvocation> for Notice {
    async fn execute(&self, ctx: &DiscordInvocation, args: &Arguments) -> Result<(), HandlerError> {
        let message = args.require("message")?;
        let channel_id = ctx.target_channel(args, "channel").await?;
        let color = args.get("color").map(parse_color).transpose()?.unwrap_or(0x0034_98DB);

        let embed = serenity::CreateEmbed::new()
            .title("Notice")
            .description(message)
            .colour(color);
        channel_id
            .send_message(ctx.http(), serenity::CreateMessage::new().embed(embed))
            .await
            .map_err(discord)?;
        Ok(())
    }
}

/// Adds every built-in handler to `registry`.
pub fn register_builtins(registry: &mut CommandRegistry<DiscordInvocation>) {
    registry.register(
        "channel_create",
        Classification::Open,
        "Create a channel",
        Arc::new(ChannelCreate),
    );
    registry.register(
        "channel_delete",
        Classification::Open,
        "Delete a channel",
        Arc::new(ChannelDelete),
    );
    registry.register(
        "channel_slowmode",
        Classification::Open,
        "Set a channel's slowmode",
        Arc::new(ChannelSlowmode),
    );
    registry.register(
        "role_create",
        Classification::Open,
        "Create a role",
        Arc::new(RoleCreate),
    );
    registry.register(
        "role_delete",
        Classification::Open,
        "Delete a role",
        Arc::new(RoleDelete),
    );
    registry.register(
        "message_send",
        Classification::Restricted,
        "Send a message",
        Arc::new(MessageSend),
    );
    registry.register(
        "notice",
        Classification::Restricted,
        "Post a notice embed",
        Arc::new(Notice),
    );
}
