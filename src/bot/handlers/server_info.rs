//! Builds a [`GuildSnapshot`] from the Discord cache.

use crate::{
    bot::BotData,
    core::guild::{CategorySummary, ChannelSummary, GuildSnapshot, RoleAccess, RoleSummary},
    errors::Error,
};
use poise::serenity_prelude as serenity;
use std::collections::HashMap;

fn key_permissions(permissions: serenity::Permissions) -> Vec<String> {
    [
        (permissions.administrator(), "Administrator"),
        (permissions.manage_guild(), "Manage Server"),
        (permissions.manage_channels(), "Manage Channels"),
        (permissions.manage_roles(), "Manage Roles"),
        (permissions.manage_messages(), "Manage Messages"),
        (permissions.kick_members(), "Kick Members"),
        (permissions.ban_members(), "Ban Members"),
        (permissions.mention_everyone(), "Mention Everyone"),
    ]
    .into_iter()
    .filter(|(granted, _)| *granted)
    .map(|(_, name)| name.to_string())
    .collect()
}

fn role_access(
    overwrites: &[serenity::PermissionOverwrite],
    role_names: &HashMap<serenity::RoleId, String>,
) -> Vec<RoleAccess> {
    overwrites
        .iter()
        .filter_map(|overwrite| {
            let serenity::PermissionOverwriteType::Role(role_id) = overwrite.kind else {
                return None;
            };
            let mut access = Vec::new();
            if overwrite.allow.view_channel() {
                access.push("can view".to_string());
            }
            if overwrite.deny.view_channel() {
                access.push("cannot view".to_string());
            }
            if overwrite.allow.send_messages() {
                access.push("can send".to_string());
            }
            if overwrite.deny.send_messages() {
                access.push("cannot send".to_string());
            }
            Some(RoleAccess {
                role: role_names.get(&role_id).cloned()?,
                access,
            })
        })
        .collect()
}

fn channel_summary(
    channel: &serenity::GuildChannel,
    role_names: &HashMap<serenity::RoleId, String>,
) -> ChannelSummary {
    ChannelSummary {
        name: channel.name.clone(),
        kind: channel.kind.name().to_string(),
        position: channel.position,
        access: role_access(&channel.permission_overwrites, role_names),
    }
}

/// Snapshot of the server the command was run in, or `None` outside a
/// server or when the guild is not cached.
pub async fn guild_snapshot(ctx: poise::Context<'_, BotData, Error>) -> Option<GuildSnapshot> {
    let member_roles: Vec<serenity::RoleId> = ctx
        .author_member()
        .await
        .map(|member| member.roles.clone())
        .unwrap_or_default();
    let channel_id = ctx.channel_id();

    let guild = ctx.guild()?;
    let role_names: HashMap<serenity::RoleId, String> = guild
        .roles
        .iter()
        .map(|(id, role)| (*id, role.name.clone()))
        .collect();

    let roles = guild
        .roles
        .values()
        .map(|role| RoleSummary {
            name: role.name.clone(),
            position: role.position,
            key_permissions: key_permissions(role.permissions),
        })
        .collect();

    let mut categories: HashMap<serenity::ChannelId, CategorySummary> = guild
        .channels
        .values()
        .filter(|c| c.kind == serenity::ChannelType::Category)
        .map(|c| {
            let summary = CategorySummary {
                name: c.name.clone(),
                position: c.position,
                access: role_access(&c.permission_overwrites, &role_names),
                channels: Vec::new(),
            };
            (c.id, summary)
        })
        .collect();

    let mut uncategorized = Vec::new();
    for channel in guild.channels.values() {
        if channel.kind == serenity::ChannelType::Category {
            continue;
        }
        let summary = channel_summary(channel, &role_names);
        match channel.parent_id.and_then(|id| categories.get_mut(&id)) {
            Some(category) => category.channels.push(summary),
            None => uncategorized.push(summary),
        }
    }

    Some(GuildSnapshot {
        name: guild.name.clone(),
        member_count: Some(guild.member_count),
        roles,
        uncategorized,
        categories: categories.into_values().collect(),
        current_channel: guild.channels.get(&channel_id).map(|c| c.name.clone()),
        user_roles: member_roles
            .iter()
            .filter_map(|id| role_names.get(id).cloned())
            .collect(),
    })
}
