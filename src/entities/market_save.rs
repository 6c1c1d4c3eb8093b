//! Market save entity - records that a user imported a listing.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One row per (user, listing) import
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "market_saves")]
pub struct Model {
    /// Discord user ID of the importer
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    /// UID of the imported listing
    #[sea_orm(primary_key, auto_increment = false)]
    pub uid: String,
    /// When the listing was imported
    pub saved_at: DateTime,
}

/// Kept without a foreign key so unlisting leaves saves in place
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
