//! Catalog data records and the repository behind them.
//! Relationships (Item -> Category, Item -> User) are resolved via explicit
//! lookups on the store; there is no lazy loading.

mod model;
mod store;

pub use model::{Category, Item, ItemDraft, ItemPatch, User};
pub use model::{validate_category_name, validate_item_fields};
pub use model::{CATEGORY_NAME_MAX, ITEM_DESCRIPTION_MAX, ITEM_NAME_MAX};
pub use store::{seed_demo_catalog, Catalog, CatalogStore, ItemFilter, SharedCatalog};
