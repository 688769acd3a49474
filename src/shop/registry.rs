//! Shop Registry
//!
//! Owns every shop, indexed by id and by container location. Each mutation
//! updates the maps, queues a snapshot for the store and rebuilds the shop's
//! display.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::definition::{Shop, ShopId};
use super::store::ShopStore;
use crate::display::DisplayEngine;
use crate::error::{Result, ShopError};
use crate::item::ItemDescriptor;
use crate::location::BlockLocation;

pub struct ShopRegistry {
    shops: DashMap<ShopId, Shop>,
    /// Location key -> shop id
    by_location: DashMap<String, ShopId>,
    store: ShopStore,
    displays: Arc<DisplayEngine>,
    /// Orders snapshots so the newest one queued always reflects every
    /// mutation that finished before it
    save_lock: Mutex<()>,
}

impl ShopRegistry {
    pub fn new(store: ShopStore, displays: Arc<DisplayEngine>) -> Self {
        Self {
            shops: DashMap::new(),
            by_location: DashMap::new(),
            store,
            displays,
            save_lock: Mutex::new(()),
        }
    }

    /// Create a shop at `location`. Fails if the location already hosts one.
    pub fn create(
        &self,
        name: &str,
        owner: Uuid,
        location: BlockLocation,
        item: ItemDescriptor,
        amount: u32,
        buy_price: f64,
    ) -> Result<Shop> {
        let mut shop = Shop::new(name, owner, location, item, amount, buy_price);
        shop.validate()?;
        if let Some(owner_name) = self.displays.known_name(owner) {
            shop.owner_name = owner_name;
        }

        // Reserve the location first so concurrent creates cannot both win
        match self.by_location.entry(shop.location.key()) {
            Entry::Occupied(_) => return Err(ShopError::DuplicateLocation),
            Entry::Vacant(slot) => {
                slot.insert(shop.id.clone());
            }
        }
        // Displays change only under the shop's entry
        {
            let entry = self.shops.entry(shop.id.clone());
            self.displays.create_display(&shop);
            entry.insert(shop.clone());
        }

        self.persist();
        info!("Shop '{}' created at {} by {}", shop.name, shop.location, owner);
        Ok(shop)
    }

    /// Remove a shop and its display. False if it did not exist.
    pub fn delete(&self, shop_id: &str) -> bool {
        let shop = match self.shops.entry(shop_id.to_string()) {
            Entry::Occupied(entry) => {
                self.displays.remove_display(shop_id);
                entry.remove()
            }
            Entry::Vacant(_) => return false,
        };
        self.by_location.remove(&shop.location.key());

        self.persist();
        info!("Shop '{}' at {} deleted", shop.name, shop.location);
        true
    }

    pub fn get(&self, shop_id: &str) -> Option<Shop> {
        self.shops.get(shop_id).map(|shop| shop.clone())
    }

    pub fn get_at_location(&self, location: &BlockLocation) -> Option<Shop> {
        let shop_id = self.by_location.get(&location.key())?.clone();
        self.get(&shop_id)
    }

    /// Shops owned by `owner`, sorted by name
    pub fn list_by_owner(&self, owner: Uuid) -> Vec<Shop> {
        let mut shops: Vec<Shop> = self
            .shops
            .iter()
            .filter(|shop| shop.is_owned_by(owner))
            .map(|shop| shop.clone())
            .collect();
        shops.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()));
        shops
    }

    /// Every shop, sorted by id
    pub fn list_all(&self) -> Vec<Shop> {
        let mut shops: Vec<Shop> = self.shops.iter().map(|shop| shop.clone()).collect();
        shops.sort_by(|a, b| a.id.cmp(&b.id));
        shops
    }

    /// Owner's shop with this name, ignoring case
    pub fn find_owned(&self, owner: Uuid, name: &str) -> Option<Shop> {
        self.shops
            .iter()
            .find(|shop| shop.is_owned_by(owner) && shop.has_name(name))
            .map(|shop| shop.clone())
    }

    /// Copy the mutable fields of `shop` onto the stored record
    pub fn update(&self, shop: &Shop) -> Result<Shop> {
        let updated = {
            let mut stored = self
                .shops
                .get_mut(&shop.id)
                .ok_or_else(|| ShopError::NotFound("Shop not found".into()))?;

            let mut candidate = stored.clone();
            candidate.active = shop.active;
            candidate.sell_price = shop.sell_price;
            candidate.sell_enabled = shop.sell_enabled;
            candidate.validate()?;

            self.displays.update_display(&candidate);
            *stored = candidate.clone();
            candidate
        };

        self.persist();
        Ok(updated)
    }

    /// Record the owner's current name on their shops and rebuild the
    /// labels that showed an older one. Returns the number of shops changed.
    pub fn refresh_owner_name(&self, owner: Uuid, name: &str) -> usize {
        if name.is_empty() {
            return 0;
        }
        let stale: Vec<ShopId> = self
            .shops
            .iter()
            .filter(|shop| shop.is_owned_by(owner) && shop.owner_name != name)
            .map(|shop| shop.key().clone())
            .collect();

        let mut changed = 0;
        for shop_id in stale {
            let Some(mut stored) = self.shops.get_mut(&shop_id) else {
                continue;
            };
            stored.owner_name = name.to_string();
            self.displays.update_display(&stored);
            changed += 1;
        }

        if changed > 0 {
            self.persist();
            info!("Owner {} is now shown as '{}' on {} shop(s)", owner, name, changed);
        }
        changed
    }

    pub fn len(&self) -> usize {
        self.shops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shops.is_empty()
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Load every valid record from the store and build its display.
    /// Returns the number of shops loaded.
    pub fn load(&self) -> Result<usize> {
        let shops = self.store.load()?;
        let mut loaded = 0;

        for shop in shops {
            match self.by_location.entry(shop.location.key()) {
                Entry::Occupied(_) => {
                    warn!("Skipping shop '{}': {} already has a shop", shop.name, shop.location);
                    continue;
                }
                Entry::Vacant(slot) => {
                    slot.insert(shop.id.clone());
                }
            }
            let entry = self.shops.entry(shop.id.clone());
            self.displays.create_display(&shop);
            entry.insert(shop);
            loaded += 1;
        }

        info!("Loaded {} shops from {:?}", loaded, self.store.path());
        Ok(loaded)
    }

    /// Wait for pending writes, drop every shop and display, and load again
    pub async fn reload(&self) -> Result<usize> {
        if self.store.flush().await.is_err() {
            warn!("Shop writer stopped before reload");
        }

        let ids: Vec<ShopId> = self.shops.iter().map(|shop| shop.key().clone()).collect();
        for shop_id in &ids {
            self.displays.remove_display(shop_id);
        }
        self.shops.clear();
        self.by_location.clear();

        self.load()
    }

    /// Resolves once every snapshot queued so far has been written
    pub async fn flush(&self) {
        let _ = self.store.flush().await;
    }

    fn persist(&self) {
        let _guard = self.save_lock.lock();
        self.store.save(&self.list_all());
    }
}
