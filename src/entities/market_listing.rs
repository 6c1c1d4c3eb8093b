//! Market listing entity - a saved command file published for other users.
//!
//! The listing is an index entry only. The content and metadata stay in the
//! owner's save directory; removing a listing never touches them.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Market listing database model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "market_listings")]
pub struct Model {
    /// UID of the saved file being listed
    #[sea_orm(primary_key, auto_increment = false)]
    pub uid: String,
    /// Discord user ID of the owner
    pub owner_id: String,
    /// Display name copied from the file metadata at listing time
    pub name: String,
    /// Description copied from the file metadata at listing time
    pub description: String,
    /// When the file was listed
    pub listed_at: DateTime,
    /// How many users saved this listing
    pub saves_count: i32,
    /// How many users starred this listing
    pub stars_count: i32,
}

/// Listings are looked up by UID only
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
