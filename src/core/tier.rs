//! Execution tiers and command authorization.
//!
//! A tier is attached to a user for the duration of one execution. It comes from
//! the metadata of the saved file being run, or defaults to the lowest tier for
//! scratch and market files.

use crate::core::artifact::ArtifactStore;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

/// Ordered capability level, lowest to highest privilege.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Tier {
    /// Free tier
    #[default]
    Drifter,
    /// First paid tier
    Seeker,
    /// Highest tier
    Abysswalker,
}

impl Tier {
    /// All tiers in ascending order.
    pub const ALL: [Self; 3] = [Self::Drifter, Self::Seeker, Self::Abysswalker];

    /// Canonical name, as stored in metadata and configuration.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Drifter => "Drifter",
            Self::Seeker => "Seeker",
            Self::Abysswalker => "Abysswalker",
        }
    }

    /// Looks up a tier by name, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        Self::ALL
            .into_iter()
            .find(|tier| tier.name().eq_ignore_ascii_case(name))
    }

    /// The tier used when nothing better is known.
    #[must_use]
    pub const fn lowest() -> Self {
        Self::Drifter
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Tier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_name(s).ok_or_else(|| format!("unknown tier `{s}`"))
    }
}

/// Which handler set a command was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    /// Usable at any tier
    Open,
    /// Requires Seeker or above
    Restricted,
}

impl Classification {
    /// Directory name backing this handler set.
    #[must_use]
    pub const fn dir_name(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Restricted => "restricted",
        }
    }
}

/// Decides whether a command of the given classification may run at `tier`.
#[must_use]
pub fn authorize(classification: Classification, tier: Tier) -> bool {
    match classification {
        Classification::Open => true,
        Classification::Restricted => tier >= Tier::Seeker,
    }
}

/// Resolves the tier a user runs with.
///
/// With a saved-file UID, the tier recorded at save time is reused. Unreadable
/// metadata or an unknown tier name falls back to the lowest tier, as does a
/// missing UID.
pub async fn resolve_tier(store: &ArtifactStore, user_id: u64, uid: Option<&str>) -> Tier {
    let Some(uid) = uid else {
        return Tier::lowest();
    };

    match store.read_metadata(user_id, uid).await {
        Ok(meta) => Tier::from_name(&meta.tier_used).unwrap_or_else(|| {
            tracing::warn!(
                user_id,
                uid,
                tier = %meta.tier_used,
                "Unknown tier in metadata, using lowest"
            );
            Tier::lowest()
        }),
        Err(e) => {
            tracing::warn!(user_id, uid, error = %e, "Could not read metadata, using lowest tier");
            Tier::lowest()
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn test_tiers_are_ordered() {
        assert!(Tier::Drifter < Tier::Seeker);
        assert!(Tier::Seeker < Tier::Abysswalker);
        assert_eq!(Tier::lowest(), Tier::Drifter);
    }

    #[test]
    fn test_from_name_is_case_insensitive() {
        assert_eq!(Tier::from_name("seeker"), Some(Tier::Seeker));
        assert_eq!(Tier::from_name(" ABYSSWALKER "), Some(Tier::Abysswalker));
        assert_eq!(Tier::from_name("Voidborn"), None);
        assert_eq!("Drifter".parse::<Tier>().unwrap(), Tier::Drifter);
    }

    #[test]
    fn test_authorize_restricted_needs_elevated_tier() {
        assert!(!authorize(Classification::Restricted, Tier::Drifter));
        assert!(authorize(Classification::Restricted, Tier::Seeker));
        assert!(authorize(Classification::Restricted, Tier::Abysswalker));
    }

    #[test]
    fn test_authorize_open_always_allowed() {
        for tier in Tier::ALL {
            assert!(authorize(Classification::Open, tier));
        }
    }

    #[tokio::test]
    async fn test_resolve_tier_without_uid_is_lowest() {
        let (_dir, store) = setup_test_store();
        assert_eq!(resolve_tier(&store, 1, None).await, Tier::Drifter);
    }

    #[tokio::test]
    async fn test_resolve_tier_reads_saved_metadata() -> crate::errors::Result<()> {
        let (_dir, store) = setup_test_store();
        let meta = save_test_artifact(&store, 7, "role_create name=x", Tier::Abysswalker).await?;
        assert_eq!(
            resolve_tier(&store, 7, Some(&meta.uid)).await,
            Tier::Abysswalker
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_resolve_tier_corrupt_metadata_defaults_to_lowest() -> crate::errors::Result<()> {
        let (_dir, store) = setup_test_store();
        let meta = save_test_artifact(&store, 7, "x", Tier::Seeker).await?;
        let path = store.metadata_path(7, &meta.uid);
        tokio::fs::write(&path, r#"{"tier_used":"Voidborn","uid":"abc"}"#).await?;
        assert_eq!(resolve_tier(&store, 7, Some(&meta.uid)).await, Tier::Drifter);

        tokio::fs::write(&path, "not json").await?;
        assert_eq!(resolve_tier(&store, 7, Some(&meta.uid)).await, Tier::Drifter);

        assert_eq!(resolve_tier(&store, 7, Some("missing")).await, Tier::Drifter);
        Ok(())
    }
}
