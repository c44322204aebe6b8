//! Circ Catalog - the table of loanable items.
//!
//! Items get sequential identifiers that are never reused. Retiring an
//! item leaves a tombstone row so the counter stays monotonic; readers
//! only ever see rows that still exist.

#![deny(unsafe_code)]

use circ_access::{AccessError, RoleTable};
use circ_types::{ItemId, MemberId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info};

/// A catalog entry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    pub title: String,
    pub creator: String,
    pub category: String,
    pub description: String,
    pub borrowed: bool,
    /// Soft-delete marker. A retired item keeps its row (the id is never
    /// reused) but all descriptive fields are cleared.
    pub exists: bool,
}

/// The item table plus the monotonic id counter.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Catalog {
    items: HashMap<ItemId, Item>,
    next_id: u64,
}

impl Catalog {
    /// Create an empty catalog; the first item gets `first_item_id`.
    pub fn new(first_item_id: u64) -> Self {
        Self {
            items: HashMap::new(),
            next_id: first_item_id,
        }
    }

    /// Add a new item. Staff only. The counter advances unconditionally,
    /// so identifiers stay unique even across retirements.
    pub fn add_item(
        &mut self,
        roles: &RoleTable,
        caller: &MemberId,
        title: impl Into<String>,
        creator: impl Into<String>,
        category: impl Into<String>,
        description: impl Into<String>,
    ) -> Result<ItemId, CatalogError> {
        roles.require_staff(caller)?;

        let id = ItemId(self.next_id);
        self.next_id += 1;

        let item = Item {
            id,
            title: title.into(),
            creator: creator.into(),
            category: category.into(),
            description: description.into(),
            borrowed: false,
            exists: true,
        };
        info!(item = %id, title = %item.title, "catalog item added");
        self.items.insert(id, item);
        Ok(id)
    }

    /// Retire an item. Staff only; the item must exist and must not be
    /// on loan. Clears every descriptive field.
    pub fn retire_item(
        &mut self,
        roles: &RoleTable,
        caller: &MemberId,
        id: ItemId,
    ) -> Result<(), CatalogError> {
        roles.require_staff(caller)?;
        let item = Self::editable(&mut self.items, id)?;

        item.exists = false;
        item.title.clear();
        item.creator.clear();
        item.category.clear();
        item.description.clear();
        info!(item = %id, "catalog item retired");
        Ok(())
    }

    /// Overwrite the title. Staff only; item must exist and be on shelf.
    pub fn set_title(
        &mut self,
        roles: &RoleTable,
        caller: &MemberId,
        id: ItemId,
        value: impl Into<String>,
    ) -> Result<(), CatalogError> {
        roles.require_staff(caller)?;
        Self::editable(&mut self.items, id)?.title = value.into();
        Ok(())
    }

    /// Overwrite the creator. Same guards as `set_title`.
    pub fn set_creator(
        &mut self,
        roles: &RoleTable,
        caller: &MemberId,
        id: ItemId,
        value: impl Into<String>,
    ) -> Result<(), CatalogError> {
        roles.require_staff(caller)?;
        Self::editable(&mut self.items, id)?.creator = value.into();
        Ok(())
    }

    /// Overwrite the category. Same guards as `set_title`.
    pub fn set_category(
        &mut self,
        roles: &RoleTable,
        caller: &MemberId,
        id: ItemId,
        value: impl Into<String>,
    ) -> Result<(), CatalogError> {
        roles.require_staff(caller)?;
        Self::editable(&mut self.items, id)?.category = value.into();
        Ok(())
    }

    /// Overwrite the description. Same guards as `set_title`.
    pub fn set_description(
        &mut self,
        roles: &RoleTable,
        caller: &MemberId,
        id: ItemId,
        value: impl Into<String>,
    ) -> Result<(), CatalogError> {
        roles.require_staff(caller)?;
        Self::editable(&mut self.items, id)?.description = value.into();
        Ok(())
    }

    /// Look up an item. Retired and never-created ids both come back as
    /// `None`.
    pub fn item(&self, id: ItemId) -> Option<&Item> {
        self.items.get(&id).filter(|item| item.exists)
    }

    /// Look up an existing item or fail with `NotFound`.
    pub fn existing(&self, id: ItemId) -> Result<&Item, CatalogError> {
        self.item(id).ok_or(CatalogError::NotFound(id))
    }

    /// Flip the borrowed flag. Used by the lending engine once its own
    /// guards have passed; the item must exist.
    pub fn set_borrowed(&mut self, id: ItemId, borrowed: bool) -> Result<(), CatalogError> {
        let item = self
            .items
            .get_mut(&id)
            .filter(|item| item.exists)
            .ok_or(CatalogError::NotFound(id))?;
        debug!(item = %id, borrowed, "borrowed flag updated");
        item.borrowed = borrowed;
        Ok(())
    }

    fn editable(
        items: &mut HashMap<ItemId, Item>,
        id: ItemId,
    ) -> Result<&mut Item, CatalogError> {
        let item = items
            .get_mut(&id)
            .filter(|item| item.exists)
            .ok_or(CatalogError::NotFound(id))?;
        if item.borrowed {
            return Err(CatalogError::ItemBorrowed(id));
        }
        Ok(item)
    }
}

/// Catalog operation failures.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Access(#[from] AccessError),

    #[error("Item not found: {0}")]
    NotFound(ItemId),

    #[error("Item is currently on loan: {0}")]
    ItemBorrowed(ItemId),
}
