//! Plain-text server summary appended to the first authoring prompt.
//!
//! The bot layer fills a [`GuildSnapshot`] from the Discord cache; this module
//! only renders it, so the format can be tested without a gateway connection.

use std::fmt::Write;

/// A role and the permissions that matter for channel layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleSummary {
    /// Role name
    pub name: String,
    /// Hierarchy position, higher is more senior
    pub position: u16,
    /// Names of notable permissions the role grants
    pub key_permissions: Vec<String>,
}

/// Per-role access note on a channel or category, e.g. "can view".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleAccess {
    /// Role name
    pub role: String,
    /// Human-readable access facts
    pub access: Vec<String>,
}

/// One channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelSummary {
    /// Channel name
    pub name: String,
    /// Channel type, e.g. "text" or "voice"
    pub kind: String,
    /// Position within its category
    pub position: u16,
    /// Role overwrites worth mentioning
    pub access: Vec<RoleAccess>,
}

/// A category and its channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategorySummary {
    /// Category name
    pub name: String,
    /// Position among categories
    pub position: u16,
    /// Role overwrites on the category itself
    pub access: Vec<RoleAccess>,
    /// Channels inside the category
    pub channels: Vec<ChannelSummary>,
}

/// Everything the authoring model is told about the server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuildSnapshot {
    /// Server name
    pub name: String,
    /// Member count, if known
    pub member_count: Option<u64>,
    /// All roles
    pub roles: Vec<RoleSummary>,
    /// Channels outside any category
    pub uncategorized: Vec<ChannelSummary>,
    /// Categories with their channels
    pub categories: Vec<CategorySummary>,
    /// Channel the command was run in
    pub current_channel: Option<String>,
    /// Role names of the invoking user
    pub user_roles: Vec<String>,
}

fn write_access(out: &mut String, indent: &str, header: &str, access: &[RoleAccess]) {
    let access: Vec<_> = access.iter().filter(|a| !a.access.is_empty()).collect();
    if access.is_empty() {
        return;
    }
    let _ = writeln!(out, "{indent}{header}:");
    for entry in access {
        let _ = writeln!(out, "{indent}  {}: {}", entry.role, entry.access.join(", "));
    }
}

fn write_channel(out: &mut String, indent: &str, channel: &ChannelSummary) {
    let _ = writeln!(
        out,
        "{indent}Channel: {} (Type: {}, Position: {})",
        channel.name, channel.kind, channel.position
    );
    write_access(out, &format!("{indent}  "), "Role Access", &channel.access);
}

impl GuildSnapshot {
    /// Renders the snapshot as the text block appended to the prompt.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::from("\n\n=== SERVER STRUCTURE ===\n");
        let _ = writeln!(out, "Server Name: {}", self.name);
        if let Some(count) = self.member_count {
            let _ = writeln!(out, "Total Members: {count}");
        }

        out.push_str("\n--- ROLES ---\n");
        let mut roles: Vec<_> = self.roles.iter().collect();
        roles.sort_by(|a, b| b.position.cmp(&a.position));
        for role in roles {
            let _ = writeln!(out, "Role: {} (Position: {})", role.name, role.position);
            if !role.key_permissions.is_empty() {
                let _ = writeln!(out, "  Key Permissions: {}", role.key_permissions.join(", "));
            }
        }

        out.push_str("\n--- CHANNEL STRUCTURE ---\n");
        if !self.uncategorized.is_empty() {
            out.push_str("Channels without category:\n");
            let mut channels: Vec<_> = self.uncategorized.iter().collect();
            channels.sort_by_key(|c| c.position);
            for channel in channels {
                write_channel(&mut out, "", channel);
            }
        }

        let mut categories: Vec<_> = self.categories.iter().collect();
        categories.sort_by_key(|c| c.position);
        for category in categories {
            let _ = writeln!(
                out,
                "Category: {} (Position: {})",
                category.name, category.position
            );
            write_access(&mut out, "  ", "Category Role Access", &category.access);
            let mut channels: Vec<_> = category.channels.iter().collect();
            channels.sort_by_key(|c| c.position);
            for channel in channels {
                write_channel(&mut out, "  ", channel);
            }
        }

        out.push_str("\n--- CURRENT CONTEXT ---\n");
        if let Some(channel) = &self.current_channel {
            let _ = writeln!(out, "Current Channel: {channel}");
        }
        if !self.user_roles.is_empty() {
            let _ = writeln!(out, "User Roles: {}", self.user_roles.join(", "));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(name: &str, position: u16) -> ChannelSummary {
        ChannelSummary {
            name: name.to_string(),
            kind: "text".to_string(),
            position,
            access: Vec::new(),
        }
    }

    #[test]
    fn test_render_orders_roles_and_channels() {
        let snapshot = GuildSnapshot {
            name: "Guild".into(),
            member_count: Some(12),
            roles: vec![
                RoleSummary {
                    name: "Member".into(),
                    position: 1,
                    key_permissions: vec!["view_channel".into()],
                },
                RoleSummary {
                    name: "Admin".into(),
                    position: 5,
                    key_permissions: vec!["administrator".into()],
                },
            ],
            uncategorized: vec![channel("rules", 0)],
            categories: vec![CategorySummary {
                name: "Chat".into(),
                position: 1,
                access: vec![RoleAccess {
                    role: "Member".into(),
                    access: vec!["can view".into()],
                }],
                channels: vec![channel("memes", 2), channel("general", 1)],
            }],
            current_channel: Some("general".into()),
            user_roles: vec!["Admin".into()],
        };

        let text = snapshot.render();
        assert!(text.contains("Server Name: Guild\nTotal Members: 12\n"));
        let admin = text.find("Role: Admin").unwrap_or(usize::MAX);
        let member = text.find("Role: Member").unwrap_or(0);
        assert!(admin < member);

        let general = text.find("Channel: general").unwrap_or(usize::MAX);
        let memes = text.find("Channel: memes").unwrap_or(0);
        assert!(general < memes);

        assert!(text.contains("  Category Role Access:\n    Member: can view\n"));
        assert!(text.contains("Current Channel: general\nUser Roles: Admin\n"));
    }

    #[test]
    fn test_empty_access_is_omitted() {
        let mut c = channel("quiet", 0);
        c.access.push(RoleAccess {
            role: "Muted".into(),
            access: Vec::new(),
        });
        let snapshot = GuildSnapshot {
            name: "G".into(),
            uncategorized: vec![c],
            ..GuildSnapshot::default()
        };
        assert!(!snapshot.render().contains("Role Access"));
    }
}
