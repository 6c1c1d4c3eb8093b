//! Per-user cooldowns for authoring sessions.
//!
//! Every finished session counts as one use. When a user reaches the tier's
//! trigger count inside the counting window, they are blocked until the tier's
//! cooldown has passed since the oldest of those uses.

use crate::{
    config::tiers::TierLimits,
    errors::{Error, Result},
};
use std::{
    collections::{HashMap, VecDeque},
    sync::Mutex,
    time::Duration,
};
use tokio::time::Instant;

#[derive(Debug, Default)]
struct UserUses {
    starts: VecDeque<Instant>,
    blocked_until: Option<Instant>,
}

/// Tracks session uses per user.
#[derive(Debug, Default)]
pub struct CooldownTracker {
    users: Mutex<HashMap<u64, UserUses>>,
}

impl CooldownTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails with [`Error::Cooldown`] while the user is blocked.
    pub fn check(&self, user_id: u64) -> Result<()> {
        let Ok(users) = self.users.lock() else {
            return Ok(());
        };
        let now = Instant::now();
        match users.get(&user_id).and_then(|u| u.blocked_until) {
            Some(until) if until > now => {
                let remaining = until - now;
                Err(Error::Cooldown {
                    remaining_secs: remaining.as_secs() + u64::from(remaining.subsec_nanos() > 0),
                })
            }
            _ => Ok(()),
        }
    }

    /// Records one use under the given tier limits.
    pub fn record(&self, user_id: u64, limits: &TierLimits) {
        if limits.cooldown == 0 {
            return;
        }
        let Ok(mut users) = self.users.lock() else {
            return;
        };

        let now = Instant::now();
        let window = Duration::from_secs(limits.cooldown_window);
        let uses = users.entry(user_id).or_default();
        uses.starts.push_back(now);
        while uses
            .starts
            .front()
            .is_some_and(|start| now.duration_since(*start) > window)
        {
            uses.starts.pop_front();
        }

        let trigger = usize::try_from(limits.cooldown_uses.max(1)).unwrap_or(usize::MAX);
        if uses.starts.len() >= trigger {
            if let Some(oldest) = uses.starts.front() {
                let until = *oldest + Duration::from_secs(limits.cooldown);
                tracing::info!(
                    user_id,
                    cooldown_secs = limits.cooldown,
                    "Applied cooldown after {} starts",
                    uses.starts.len()
                );
                uses.blocked_until = Some(until);
                uses.starts.clear();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::tiers::TierLimits, core::tier::Tier};

    #[tokio::test(start_paused = true)]
    async fn test_burst_limit_triggers_cooldown_from_oldest_start() {
        let tracker = CooldownTracker::new();
        let drifter = TierLimits::default_for(Tier::Drifter);

        for _ in 0..2 {
            tracker.record(1, &drifter);
            assert!(tracker.check(1).is_ok());
            tokio::time::advance(Duration::from_secs(60)).await;
        }
        tracker.record(1, &drifter);

        // Third start at t=120; blocked until t=0+600.
        match tracker.check(1) {
            Err(Error::Cooldown { remaining_secs }) => assert_eq!(remaining_secs, 480),
            other => panic!("expected cooldown, got {other:?}"),
        }

        tokio::time::advance(Duration::from_secs(480)).await;
        assert!(tracker.check(1).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spread_out_starts_do_not_trigger() {
        let tracker = CooldownTracker::new();
        let drifter = TierLimits::default_for(Tier::Drifter);

        for _ in 0..5 {
            tracker.record(1, &drifter);
            tokio::time::advance(Duration::from_secs(200)).await;
        }
        assert!(tracker.check(1).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_use_cooldown_and_disabled() {
        let tracker = CooldownTracker::new();
        tracker.record(2, &TierLimits::default_for(Tier::Seeker));
        assert!(tracker.check(2).is_err());
        tokio::time::advance(Duration::from_secs(120)).await;
        assert!(tracker.check(2).is_ok());

        tracker.record(3, &TierLimits::default_for(Tier::Abysswalker));
        assert!(tracker.check(3).is_ok());
    }
}
