//! Market business logic - publishing saved files for other users.
//!
//! The market is an index over saved files. Listing copies the file's name and
//! description into `market_listings`; the content itself stays in the owner's
//! save directory and is read from there when someone commits it.

use crate::{
    core::{
        artifact::{ArtifactRef, ArtifactStore},
        maintenance::CutoverTarget,
    },
    entities::{MarketAward, MarketListing, MarketSave, market_award, market_listing, market_save},
    errors::{Error, Result},
};
use async_trait::async_trait;
use sea_orm::{
    Condition, QueryOrder, QuerySelect, Set, TransactionTrait, prelude::*, sea_query::Expr,
};

/// Sort order for [`browse`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MarketSort {
    /// Newest first
    #[default]
    Date,
    /// Most saved first
    Saves,
    /// Most starred first
    Stars,
}

/// Largest page returned by [`browse`].
pub const MAX_PAGE: u64 = 25;

/// Where a listing's content lives.
#[must_use]
pub fn listing_artifact(listing: &market_listing::Model) -> Option<ArtifactRef> {
    let owner_id = listing.owner_id.parse().ok()?;
    Some(ArtifactRef::Market {
        owner_id,
        uid: listing.uid.clone(),
    })
}

/// Publishes one of the owner's saved files.
///
/// # Errors
/// The file's metadata must be readable and the file not already listed.
pub async fn list_artifact(
    db: &DatabaseConnection,
    store: &ArtifactStore,
    owner_id: u64,
    uid: &str,
) -> Result<market_listing::Model> {
    let metadata = store.read_metadata(owner_id, uid).await?;

    if MarketListing::find_by_id(uid).one(db).await?.is_some() {
        return Err(Error::AlreadyListed {
            uid: uid.to_string(),
        });
    }

    let listing = market_listing::ActiveModel {
        uid: Set(uid.to_string()),
        owner_id: Set(owner_id.to_string()),
        name: Set(metadata.file_name),
        description: Set(metadata.description),
        listed_at: Set(chrono::Utc::now().naive_utc()),
        saves_count: Set(0),
        stars_count: Set(0),
    };
    let listing = listing.insert(db).await?;
    tracing::info!(owner_id, uid, "Listed file on the market");
    Ok(listing)
}

/// Removes a listing. Only the owner may do this; the file is untouched.
pub async fn unlist_artifact(db: &DatabaseConnection, owner_id: u64, uid: &str) -> Result<()> {
    let listing = get_listing(db, uid).await?.ok_or_else(|| Error::ListingNotFound {
        uid: uid.to_string(),
    })?;
    if listing.owner_id != owner_id.to_string() {
        return Err(Error::NotListingOwner {
            uid: uid.to_string(),
        });
    }
    MarketListing::delete_by_id(uid).exec(db).await?;
    tracing::info!(owner_id, uid, "Removed market listing");
    Ok(())
}

/// Finds a listing by UID.
pub async fn get_listing(
    db: &DatabaseConnection,
    uid: &str,
) -> Result<Option<market_listing::Model>> {
    MarketListing::find_by_id(uid)
        .one(db)
        .await
        .map_err(Into::into)
}

/// Lists market entries, optionally filtered by a substring of the name or
/// description.
///
/// # Arguments
/// * `sort` - Ordering; ties fall back to newest first
/// * `search` - Case-insensitive substring, ignored when blank
/// * `limit` - Page size, capped at [`MAX_PAGE`]
pub async fn browse(
    db: &DatabaseConnection,
    sort: MarketSort,
    search: Option<&str>,
    limit: u64,
) -> Result<Vec<market_listing::Model>> {
    let mut query = MarketListing::find();
    if let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) {
        query = query.filter(
            Condition::any()
                .add(market_listing::Column::Name.contains(term))
                .add(market_listing::Column::Description.contains(term)),
        );
    }

    query = match sort {
        MarketSort::Date => query,
        MarketSort::Saves => query.order_by_desc(market_listing::Column::SavesCount),
        MarketSort::Stars => query.order_by_desc(market_listing::Column::StarsCount),
    };

    query
        .order_by_desc(market_listing::Column::ListedAt)
        .limit(limit.min(MAX_PAGE))
        .all(db)
        .await
        .map_err(Into::into)
}

/// Listings published by one user, newest first.
pub async fn listings_by_owner(
    db: &DatabaseConnection,
    owner_id: u64,
) -> Result<Vec<market_listing::Model>> {
    MarketListing::find()
        .filter(market_listing::Column::OwnerId.eq(owner_id.to_string()))
        .order_by_desc(market_listing::Column::ListedAt)
        .all(db)
        .await
        .map_err(Into::into)
}

/// Loads a listing another user is acting on.
async fn foreign_listing<C: ConnectionTrait>(
    db: &C,
    user_id: u64,
    uid: &str,
) -> Result<market_listing::Model> {
    let listing = MarketListing::find_by_id(uid)
        .one(db)
        .await?
        .ok_or_else(|| Error::ListingNotFound {
            uid: uid.to_string(),
        })?;
    if listing.owner_id == user_id.to_string() {
        return Err(Error::OwnListing {
            uid: uid.to_string(),
        });
    }
    Ok(listing)
}

/// Imports a listing into the user's vault and bumps its save count.
///
/// The file's own metadata counter is bumped too; a failure there is logged
/// and does not undo the import.
///
/// # Errors
/// Fails for unknown listings, the user's own listing, or a repeat save.
pub async fn save_listing(
    db: &DatabaseConnection,
    store: &ArtifactStore,
    user_id: u64,
    uid: &str,
) -> Result<market_listing::Model> {
    let txn = db.begin().await?;
    let listing = foreign_listing(&txn, user_id, uid).await?;

    let existing = MarketSave::find_by_id((user_id.to_string(), uid.to_string()))
        .one(&txn)
        .await?;
    if existing.is_some() {
        return Err(Error::AlreadyRecorded {
            uid: uid.to_string(),
        });
    }

    market_save::ActiveModel {
        user_id: Set(user_id.to_string()),
        uid: Set(uid.to_string()),
        saved_at: Set(chrono::Utc::now().naive_utc()),
    }
    .insert(&txn)
    .await?;

    MarketListing::update_many()
        .col_expr(
            market_listing::Column::SavesCount,
            Expr::col(market_listing::Column::SavesCount).add(1),
        )
        .filter(market_listing::Column::Uid.eq(uid))
        .exec(&txn)
        .await?;
    txn.commit().await?;

    if let Ok(owner_id) = listing.owner_id.parse::<u64>() {
        if let Err(e) = store.record_market_save(owner_id, uid).await {
            tracing::warn!(owner_id, uid, "Could not update file save counter: {e}");
        }
    }

    tracing::info!(user_id, uid, "Saved market listing");
    get_listing(db, uid).await?.ok_or_else(|| Error::ListingNotFound {
        uid: uid.to_string(),
    })
}

/// Stars a listing once per user.
///
/// # Errors
/// Fails for unknown listings, the user's own listing, or a repeat star.
pub async fn award_star(
    db: &DatabaseConnection,
    user_id: u64,
    uid: &str,
) -> Result<market_listing::Model> {
    let txn = db.begin().await?;
    foreign_listing(&txn, user_id, uid).await?;

    let existing = MarketAward::find_by_id((user_id.to_string(), uid.to_string()))
        .one(&txn)
        .await?;
    if existing.is_some() {
        return Err(Error::AlreadyRecorded {
            uid: uid.to_string(),
        });
    }

    market_award::ActiveModel {
        user_id: Set(user_id.to_string()),
        uid: Set(uid.to_string()),
        awarded_at: Set(chrono::Utc::now().naive_utc()),
    }
    .insert(&txn)
    .await?;

    MarketListing::update_many()
        .col_expr(
            market_listing::Column::StarsCount,
            Expr::col(market_listing::Column::StarsCount).add(1),
        )
        .filter(market_listing::Column::Uid.eq(uid))
        .exec(&txn)
        .await?;
    txn.commit().await?;

    tracing::info!(user_id, uid, "Starred market listing");
    get_listing(db, uid).await?.ok_or_else(|| Error::ListingNotFound {
        uid: uid.to_string(),
    })
}

/// Listings the user has saved that are still on the market, most recent save
/// first.
pub async fn saved_by_user(
    db: &DatabaseConnection,
    user_id: u64,
) -> Result<Vec<market_listing::Model>> {
    let saves = MarketSave::find()
        .filter(market_save::Column::UserId.eq(user_id.to_string()))
        .order_by_desc(market_save::Column::SavedAt)
        .all(db)
        .await?;

    let mut listings = Vec::with_capacity(saves.len());
    for save in saves {
        if let Some(listing) = get_listing(db, &save.uid).await? {
            listings.push(listing);
        }
    }
    Ok(listings)
}

/// Whether the user has saved a listing.
pub async fn has_saved(db: &DatabaseConnection, user_id: u64, uid: &str) -> Result<bool> {
    Ok(MarketSave::find_by_id((user_id.to_string(), uid.to_string()))
        .one(db)
        .await?
        .is_some())
}

/// Market requests finish within their own interaction, so a cutover has
/// nothing to terminate.
pub struct MarketRequests;

#[async_trait]
impl CutoverTarget for MarketRequests {
    async fn terminate_all(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::{core::tier::Tier, test_utils::*};

    async fn listed(
        db: &DatabaseConnection,
        store: &ArtifactStore,
        owner: u64,
        name: &str,
        description: &str,
    ) -> Result<market_listing::Model> {
        let meta = store
            .create_saved(owner, "notice message=hi", name, description, Tier::Drifter)
            .await?;
        list_artifact(db, store, owner, &meta.uid).await
    }

    #[tokio::test]
    async fn test_list_copies_metadata_and_rejects_duplicates() -> Result<()> {
        let db = setup_test_db().await?;
        let (_dir, store) = setup_test_store();
        let listing = listed(&db, &store, 1, "Roles", "Adds roles").await?;

        assert_eq!(listing.name, "Roles");
        assert_eq!(listing.owner_id, "1");
        assert_eq!(listing.saves_count, 0);
        assert!(matches!(
            list_artifact(&db, &store, 1, &listing.uid).await,
            Err(Error::AlreadyListed { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_list_requires_own_saved_file() -> Result<()> {
        let db = setup_test_db().await?;
        let (_dir, store) = setup_test_store();
        let meta = save_test_artifact(&store, 1, "x", Tier::Drifter).await?;
        assert!(matches!(
            list_artifact(&db, &store, 2, &meta.uid).await,
            Err(Error::ArtifactNotFound { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_unlist_owner_only_and_keeps_file() -> Result<()> {
        let db = setup_test_db().await?;
        let (_dir, store) = setup_test_store();
        let listing = listed(&db, &store, 1, "Roles", "").await?;

        assert!(matches!(
            unlist_artifact(&db, 2, &listing.uid).await,
            Err(Error::NotListingOwner { .. })
        ));
        unlist_artifact(&db, 1, &listing.uid).await?;
        assert!(get_listing(&db, &listing.uid).await?.is_none());
        assert!(matches!(
            unlist_artifact(&db, 1, &listing.uid).await,
            Err(Error::ListingNotFound { .. })
        ));

        let content = store
            .read(&ArtifactRef::Saved {
                user_id: 1,
                uid: listing.uid,
            })
            .await?;
        assert_eq!(content, "notice message=hi");
        Ok(())
    }

    #[tokio::test]
    async fn test_save_once_not_own() -> Result<()> {
        let db = setup_test_db().await?;
        let (_dir, store) = setup_test_store();
        let listing = listed(&db, &store, 1, "Roles", "").await?;

        assert!(matches!(
            save_listing(&db, &store, 1, &listing.uid).await,
            Err(Error::OwnListing { .. })
        ));
        let updated = save_listing(&db, &store, 2, &listing.uid).await?;
        assert_eq!(updated.saves_count, 1);
        assert!(has_saved(&db, 2, &listing.uid).await?);
        assert!(matches!(
            save_listing(&db, &store, 2, &listing.uid).await,
            Err(Error::AlreadyRecorded { .. })
        ));
        assert_eq!(store.read_metadata(1, &listing.uid).await?.saves, 1);

        let saved = saved_by_user(&db, 2).await?;
        assert_eq!(saved.len(), 1);
        assert_eq!(
            listing_artifact(&saved[0]),
            Some(ArtifactRef::Market {
                owner_id: 1,
                uid: listing.uid.clone()
            })
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_star_once_not_own() -> Result<()> {
        let db = setup_test_db().await?;
        let (_dir, store) = setup_test_store();
        let listing = listed(&db, &store, 1, "Roles", "").await?;

        assert!(matches!(
            award_star(&db, 1, &listing.uid).await,
            Err(Error::OwnListing { .. })
        ));
        assert_eq!(award_star(&db, 3, &listing.uid).await?.stars_count, 1);
        assert_eq!(award_star(&db, 4, &listing.uid).await?.stars_count, 2);
        assert!(matches!(
            award_star(&db, 3, &listing.uid).await,
            Err(Error::AlreadyRecorded { .. })
        ));
        assert!(matches!(
            award_star(&db, 3, "missing").await,
            Err(Error::ListingNotFound { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_browse_sorts_and_searches() -> Result<()> {
        let db = setup_test_db().await?;
        let (_dir, store) = setup_test_store();
        let roles = listed(&db, &store, 1, "Role pack", "Adds roles").await?;
        let channels = listed(&db, &store, 1, "Channels", "Creates a category").await?;
        award_star(&db, 2, &roles.uid).await?;

        let by_stars = browse(&db, MarketSort::Stars, None, 10).await?;
        assert_eq!(by_stars[0].uid, roles.uid);

        let found = browse(&db, MarketSort::Date, Some("category"), 10).await?;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].uid, channels.uid);

        assert!(browse(&db, MarketSort::Saves, Some("nothing"), 10).await?.is_empty());
        assert_eq!(browse(&db, MarketSort::Date, Some("  "), 1).await?.len(), 1);

        let mine = listings_by_owner(&db, 1).await?;
        assert_eq!(mine.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_unlisted_saves_drop_out_of_vault() -> Result<()> {
        let db = setup_test_db().await?;
        let (_dir, store) = setup_test_store();
        let listing = listed(&db, &store, 1, "Roles", "").await?;
        save_listing(&db, &store, 2, &listing.uid).await?;
        unlist_artifact(&db, 1, &listing.uid).await?;
        assert!(saved_by_user(&db, 2).await?.is_empty());
        assert!(has_saved(&db, 2, &listing.uid).await?);
        Ok(())
    }
}
