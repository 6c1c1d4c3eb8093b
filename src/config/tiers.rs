//! Per-tier limits loaded from the `[tiers]` table of config.toml.
//!
//! Limits are looked up by tier name. Tiers missing from the file use the
//! built-in defaults, so a config file only needs to list what it changes.

use crate::core::tier::Tier;
use serde::Deserialize;
use std::collections::HashMap;

/// A count that can be unlimited. Written as `-1` in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "i64")]
pub enum Budget {
    /// Never decremented, never checked
    Unlimited,
    /// At most this many uses
    Limited(u32),
}

impl TryFrom<i64> for Budget {
    type Error = String;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            -1 => Ok(Self::Unlimited),
            n if n >= 0 => u32::try_from(n)
                .map(Self::Limited)
                .map_err(|_| format!("budget {n} is too large")),
            n => Err(format!("budget must be -1 or non-negative, got {n}")),
        }
    }
}

impl Budget {
    /// Whether at least one use remains.
    #[must_use]
    pub const fn has_remaining(self) -> bool {
        match self {
            Self::Unlimited => true,
            Self::Limited(n) => n > 0,
        }
    }

    /// Consumes one use. Unlimited budgets are left untouched.
    pub fn consume(&mut self) {
        if let Self::Limited(n) = self {
            *n = n.saturating_sub(1);
        }
    }

    /// Value as stored in configuration (`-1` for unlimited).
    #[must_use]
    pub fn as_config_value(self) -> i64 {
        match self {
            Self::Unlimited => -1,
            Self::Limited(n) => i64::from(n),
        }
    }
}

/// Numeric limits for one tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TierLimits {
    /// AI replies per authoring session
    pub replies: Budget,
    /// Permanent saves per authoring session
    pub saves: Budget,
    /// Cooldown in seconds once triggered, 0 disables
    pub cooldown: u64,
    /// Session starts within the window that trigger the cooldown
    pub cooldown_uses: u32,
    /// Window in seconds over which starts are counted
    pub cooldown_window: u64,
}

impl TierLimits {
    /// Built-in limits for a tier.
    ///
    /// The free tier tolerates a short burst of sessions before cooling down;
    /// paid tiers cool down after every session.
    #[must_use]
    pub const fn default_for(tier: Tier) -> Self {
        let (replies, saves, cooldown, cooldown_uses, cooldown_window) = match tier {
            Tier::Drifter => (3, 5, 600, 3, 300),
            Tier::Seeker => (5, 12, 120, 1, 120),
            Tier::Abysswalker => (7, 30, 0, 1, 0),
        };
        Self {
            replies: Budget::Limited(replies),
            saves: Budget::Limited(saves),
            cooldown,
            cooldown_uses,
            cooldown_window,
        }
    }
}

/// One `[tiers.<Name>]` entry. Omitted fields keep the tier's defaults.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct TierEntry {
    replies: Option<Budget>,
    saves: Option<Budget>,
    cooldown: Option<u64>,
    cooldown_uses: Option<u32>,
    cooldown_window: Option<u64>,
}

impl TierEntry {
    fn apply(self, base: TierLimits) -> TierLimits {
        TierLimits {
            replies: self.replies.unwrap_or(base.replies),
            saves: self.saves.unwrap_or(base.saves),
            cooldown: self.cooldown.unwrap_or(base.cooldown),
            cooldown_uses: self.cooldown_uses.unwrap_or(base.cooldown_uses),
            cooldown_window: self.cooldown_window.unwrap_or(base.cooldown_window),
        }
    }
}

/// Limits for every tier, keyed by tier name.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct TierTable {
    entries: HashMap<String, TierEntry>,
}

impl TierTable {
    /// Returns the limits for `tier`, matching the configured name case-insensitively.
    #[must_use]
    pub fn limits(&self, tier: Tier) -> TierLimits {
        let base = TierLimits::default_for(tier);
        self.entries
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(tier.name()))
            .map_or(base, |(_, entry)| entry.apply(base))
    }

    /// Replaces the limits for `tier`.
    pub fn set(&mut self, tier: Tier, limits: TierLimits) {
        self.entries
            .retain(|name, _| !name.eq_ignore_ascii_case(tier.name()));
        self.entries.insert(
            tier.name().to_string(),
            TierEntry {
                replies: Some(limits.replies),
                saves: Some(limits.saves),
                cooldown: Some(limits.cooldown),
                cooldown_uses: Some(limits.cooldown_uses),
                cooldown_window: Some(limits.cooldown_window),
            },
        );
    }
}
