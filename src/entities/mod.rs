//! Entity module - `SeaORM` entity definitions for the market index.
//! Each entity has a Model struct for data and an Entity struct for operations.

pub mod market_award;
pub mod market_listing;
pub mod market_save;

// Re-export specific types to avoid conflicts
pub use market_award::{
    Column as MarketAwardColumn, Entity as MarketAward, Model as MarketAwardModel,
};
pub use market_listing::{
    Column as MarketListingColumn, Entity as MarketListing, Model as MarketListingModel,
};
pub use market_save::{Column as MarketSaveColumn, Entity as MarketSave, Model as MarketSaveModel};
