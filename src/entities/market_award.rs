//! Market award entity - one star from a user to a listing.

use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One row per (user, listing) star
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "market_awards")]
pub struct Model {
    /// Discord user ID of the user giving the star
    #[sea_orm(primary_key, auto_increment = false)]
    pub user_id: String,
    /// UID of the starred listing
    #[sea_orm(primary_key, auto_increment = false)]
    pub uid: String,
    /// When the star was given
    pub awarded_at: DateTime,
}

/// No relationships
#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
