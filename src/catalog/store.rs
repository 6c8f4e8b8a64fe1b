//! File-backed catalog repository.
//! The whole catalog lives in a single JSON snapshot under the configured
//! root folder. Every write validates first, applies in memory, then
//! persists; a failed persist rolls the in-memory change back so callers
//! never observe a half-applied mutation.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AppError, AppResult};

use super::model::{
    validate_category_name, validate_item_fields, Category, Item, ItemDraft, ItemPatch, User,
};

const SNAPSHOT_FILE: &str = "catalog.json";

/// Selection applied by `list_items`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemFilter {
    All,
    InCategory(i64),
    /// Newest first, at most this many.
    Latest(usize),
}

/// Repository interface consumed by the identity resolver and the HTTP
/// handlers. Typed CRUD only; a not-found condition is always distinct
/// from a validation condition.
pub trait CatalogStore {
    fn list_categories(&self) -> AppResult<Vec<Category>>;
    fn category_by_id(&self, id: i64) -> AppResult<Option<Category>>;
    fn category_by_name(&self, name: &str) -> AppResult<Option<Category>>;
    fn create_category(&mut self, name: &str) -> AppResult<Category>;

    fn list_items(&self, filter: ItemFilter) -> AppResult<Vec<Item>>;
    fn get_item(&self, id: i64) -> AppResult<Option<Item>>;
    fn item_by_name(&self, name: &str) -> AppResult<Option<Item>>;
    fn create_item(&mut self, owner_id: i64, draft: &ItemDraft) -> AppResult<Item>;
    fn update_item(&mut self, id: i64, patch: &ItemPatch) -> AppResult<Item>;
    fn delete_item(&mut self, id: i64) -> AppResult<()>;

    fn user_by_id(&self, id: i64) -> AppResult<Option<User>>;
    fn user_by_email(&self, email: &str) -> AppResult<Option<User>>;
    fn create_user(&mut self, name: &str, email: &str, picture: Option<&str>) -> AppResult<User>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct Snapshot {
    next_id: i64,
    users: Vec<User>,
    categories: Vec<Category>,
    items: Vec<Item>,
}

/// On-disk catalog store rooted at a folder containing `catalog.json`.
pub struct Catalog {
    root: PathBuf,
    snap: Snapshot,
}

impl Catalog {
    /// Open (or initialize) a catalog under the given root folder.
    pub fn open<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        let path = root.join(SNAPSHOT_FILE);
        let snap = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            serde_json::from_str(&raw)?
        } else {
            Snapshot { next_id: 1, ..Default::default() }
        };
        debug!(target: "curio::catalog", "catalog opened root='{}' users={} categories={} items={}",
            root.display(), snap.users.len(), snap.categories.len(), snap.items.len());
        Ok(Self { root, snap })
    }

    /// True when nothing has been stored yet (used for first-run seeding).
    pub fn is_empty(&self) -> bool {
        self.snap.users.is_empty() && self.snap.categories.is_empty() && self.snap.items.is_empty()
    }

    fn snapshot_path(&self) -> PathBuf {
        self.root.join(SNAPSHOT_FILE)
    }

    fn persist(&self) -> AppResult<()> {
        let raw = serde_json::to_vec_pretty(&self.snap)
            .map_err(|e| AppError::external("store_unavailable".into(), e.to_string()))?;
        fs::write(self.snapshot_path(), raw)
            .map_err(|e| AppError::external("store_unavailable".into(), e.to_string()))
    }

    fn next_id(&mut self) -> i64 {
        let id = self.snap.next_id;
        self.snap.next_id += 1;
        id
    }
}

impl CatalogStore for Catalog {
    fn list_categories(&self) -> AppResult<Vec<Category>> {
        Ok(self.snap.categories.clone())
    }

    fn category_by_id(&self, id: i64) -> AppResult<Option<Category>> {
        Ok(self.snap.categories.iter().find(|c| c.id == id).cloned())
    }

    fn category_by_name(&self, name: &str) -> AppResult<Option<Category>> {
        Ok(self.snap.categories.iter().find(|c| c.name == name).cloned())
    }

    fn create_category(&mut self, name: &str) -> AppResult<Category> {
        validate_category_name(name)?;
        if let Some(existing) = self.snap.categories.iter().find(|c| c.name == name) {
            // Category names are unique; re-creation returns the existing row.
            return Ok(existing.clone());
        }
        let category = Category { id: self.next_id(), name: name.to_string() };
        self.snap.categories.push(category.clone());
        if let Err(e) = self.persist() {
            self.snap.categories.pop();
            self.snap.next_id -= 1;
            return Err(e);
        }
        Ok(category)
    }

    fn list_items(&self, filter: ItemFilter) -> AppResult<Vec<Item>> {
        let mut items: Vec<Item> = match filter {
            ItemFilter::All => self.snap.items.clone(),
            ItemFilter::InCategory(cat) => {
                self.snap.items.iter().filter(|i| i.category_id == cat).cloned().collect()
            }
            ItemFilter::Latest(_) => self.snap.items.clone(),
        };
        if let ItemFilter::Latest(n) = filter {
            items.sort_by(|a, b| b.id.cmp(&a.id));
            items.truncate(n);
        }
        Ok(items)
    }

    fn get_item(&self, id: i64) -> AppResult<Option<Item>> {
        Ok(self.snap.items.iter().find(|i| i.id == id).cloned())
    }

    fn item_by_name(&self, name: &str) -> AppResult<Option<Item>> {
        Ok(self.snap.items.iter().find(|i| i.name == name).cloned())
    }

    fn create_item(&mut self, owner_id: i64, draft: &ItemDraft) -> AppResult<Item> {
        validate_item_fields(&draft.name, draft.description.as_deref())?;
        if self.category_by_id(draft.category_id)?.is_none() {
            return Err(AppError::not_found("category_missing", "no such category"));
        }
        let item = Item {
            id: self.next_id(),
            name: draft.name.clone(),
            description: draft.description.clone(),
            category_id: draft.category_id,
            owner_id,
            created_at: chrono::Utc::now().timestamp_millis(),
        };
        self.snap.items.push(item.clone());
        if let Err(e) = self.persist() {
            self.snap.items.pop();
            self.snap.next_id -= 1;
            return Err(e);
        }
        debug!(target: "curio::catalog", "item created id={} owner={}", item.id, owner_id);
        Ok(item)
    }

    fn update_item(&mut self, id: i64, patch: &ItemPatch) -> AppResult<Item> {
        // Empty strings behave like absent fields: the stored value stays.
        let new_name = patch.name.as_deref().filter(|s| !s.is_empty());
        let new_desc = patch.description.as_deref().filter(|s| !s.is_empty());

        let idx = self
            .snap
            .items
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| AppError::not_found("item_missing", "no such item"))?;

        let effective_name = new_name.unwrap_or(&self.snap.items[idx].name).to_string();
        let effective_desc = new_desc
            .map(|s| s.to_string())
            .or_else(|| self.snap.items[idx].description.clone());
        validate_item_fields(&effective_name, effective_desc.as_deref())?;
        if let Some(cat) = patch.category_id {
            if self.category_by_id(cat)?.is_none() {
                return Err(AppError::not_found("category_missing", "no such category"));
            }
        }

        let previous = self.snap.items[idx].clone();
        {
            let item = &mut self.snap.items[idx];
            item.name = effective_name;
            item.description = effective_desc;
            if let Some(cat) = patch.category_id {
                item.category_id = cat;
            }
        }
        if let Err(e) = self.persist() {
            self.snap.items[idx] = previous;
            return Err(e);
        }
        Ok(self.snap.items[idx].clone())
    }

    fn delete_item(&mut self, id: i64) -> AppResult<()> {
        let idx = self
            .snap
            .items
            .iter()
            .position(|i| i.id == id)
            .ok_or_else(|| AppError::not_found("item_missing", "no such item"))?;
        let removed = self.snap.items.remove(idx);
        if let Err(e) = self.persist() {
            self.snap.items.insert(idx, removed);
            return Err(e);
        }
        debug!(target: "curio::catalog", "item deleted id={}", id);
        Ok(())
    }

    fn user_by_id(&self, id: i64) -> AppResult<Option<User>> {
        Ok(self.snap.users.iter().find(|u| u.id == id).cloned())
    }

    fn user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        Ok(self.snap.users.iter().find(|u| u.email == email).cloned())
    }

    fn create_user(&mut self, name: &str, email: &str, picture: Option<&str>) -> AppResult<User> {
        // Insert is atomic per email: a second call with a known email
        // returns the existing row and writes nothing.
        if let Some(existing) = self.user_by_email(email)? {
            return Ok(existing);
        }
        let user = User {
            id: self.next_id(),
            name: name.to_string(),
            email: email.to_string(),
            picture: picture.map(|s| s.to_string()),
        };
        self.snap.users.push(user.clone());
        if let Err(e) = self.persist() {
            self.snap.users.pop();
            self.snap.next_id -= 1;
            return Err(e);
        }
        Ok(user)
    }
}

/// Thread-safe handle shared by the HTTP handlers.
#[derive(Clone)]
pub struct SharedCatalog(pub Arc<Mutex<Catalog>>);

impl SharedCatalog {
    pub fn open<P: AsRef<Path>>(root: P) -> anyhow::Result<Self> {
        Ok(Self(Arc::new(Mutex::new(Catalog::open(root)?))))
    }
}

/// Seed the starter categories and sample items on first run with an
/// empty store. Sample items belong to a synthetic seed user.
pub fn seed_demo_catalog(catalog: &SharedCatalog) -> AppResult<()> {
    let mut guard = catalog.0.lock();
    if !guard.is_empty() {
        return Ok(());
    }
    info!(target: "curio::catalog", "empty startup detected, seeding demo catalog");
    let seed_user = guard.create_user("seed", "seed@curio.local", None)?;
    let trees = guard.create_category("Trees")?;
    let herbs = guard.create_category("Herbs")?;
    let samples = [
        (trees.id, "Peach", "A deciduous tree bearing sweet juicy stone fruit."),
        (trees.id, "Pear", "The pear is any of several trees and shrubs in the family Rosaceae."),
        (herbs.id, "Rosemary", "A small evergreen shrub with leaves like pine needles."),
        (herbs.id, "Thyme", "An aromatic evergreen perennial."),
    ];
    for (category_id, name, description) in samples {
        guard.create_item(
            seed_user.id,
            &ItemDraft {
                name: name.to_string(),
                description: Some(description.to_string()),
                category_id,
            },
        )?;
    }
    Ok(())
}
