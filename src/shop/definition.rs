use uuid::Uuid;

use crate::error::{Result, ShopError};
use crate::item::ItemDescriptor;
use crate::location::BlockLocation;

/// Shop identity: the location key of its container
pub type ShopId = String;

/// A player-owned shop bound to one container.
///
/// `id`, `owner`, `location`, `item` and `amount` never change after
/// creation; only `active`, `sell_price` and `sell_enabled` are mutable.
/// `owner_name` follows the owner's last known name.
#[derive(Debug, Clone, PartialEq)]
pub struct Shop {
    pub id: ShopId,
    pub name: String,
    pub owner: Uuid,
    /// Empty until the owner's name is known
    pub owner_name: String,
    pub location: BlockLocation,
    pub item: ItemDescriptor,
    /// Units moved per trade
    pub amount: u32,
    pub buy_price: f64,
    pub sell_price: f64,
    pub active: bool,
    pub sell_enabled: bool,
}

impl Shop {
    pub fn new(
        name: &str,
        owner: Uuid,
        location: BlockLocation,
        item: ItemDescriptor,
        amount: u32,
        buy_price: f64,
    ) -> Self {
        Self {
            id: location.key(),
            name: name.to_string(),
            owner,
            owner_name: String::new(),
            location,
            item,
            amount,
            buy_price,
            sell_price: 0.0,
            active: true,
            sell_enabled: false,
        }
    }

    /// Check the invariants every stored shop holds
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ShopError::Validation("Shop name must not be empty".into()));
        }
        if self.amount == 0 {
            return Err(ShopError::InvalidAmount);
        }
        if !is_positive_price(self.buy_price) {
            return Err(ShopError::InvalidPrice);
        }
        if !self.sell_price.is_finite() || self.sell_price < 0.0 {
            return Err(ShopError::InvalidPrice);
        }
        if self.sell_enabled && self.sell_price <= 0.0 {
            return Err(ShopError::InvalidPrice);
        }
        if self.id != self.location.key() {
            return Err(ShopError::Validation(format!(
                "Shop id {} does not match its container {}",
                self.id,
                self.location.key()
            )));
        }
        Ok(())
    }

    /// Owner name for display, the raw id while it is unknown
    pub fn owner_label(&self) -> String {
        if self.owner_name.is_empty() {
            self.owner.to_string()
        } else {
            self.owner_name.clone()
        }
    }

    pub fn is_owned_by(&self, player: Uuid) -> bool {
        self.owner == player
    }

    /// Case-insensitive name match
    pub fn has_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

pub fn is_positive_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wood_shop() -> Shop {
        Shop::new(
            "Wood",
            Uuid::new_v4(),
            BlockLocation::new("world", 10, 64, -20),
            ItemDescriptor::new("oak_log"),
            64,
            10.0,
        )
    }

    #[test]
    fn test_new_shop_defaults() {
        let shop = wood_shop();
        assert_eq!(shop.id, "world_10_64_-20");
        assert!(shop.active);
        assert!(!shop.sell_enabled);
        assert_eq!(shop.sell_price, 0.0);
        assert!(shop.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut shop = wood_shop();
        shop.amount = 0;
        assert_eq!(shop.validate(), Err(ShopError::InvalidAmount));

        let mut shop = wood_shop();
        shop.buy_price = -1.0;
        assert_eq!(shop.validate(), Err(ShopError::InvalidPrice));

        let mut shop = wood_shop();
        shop.buy_price = f64::INFINITY;
        assert_eq!(shop.validate(), Err(ShopError::InvalidPrice));

        let mut shop = wood_shop();
        shop.sell_enabled = true;
        assert_eq!(shop.validate(), Err(ShopError::InvalidPrice));

        let mut shop = wood_shop();
        shop.name = "  ".into();
        assert!(matches!(shop.validate(), Err(ShopError::Validation(_))));
    }

    #[test]
    fn test_owner_label_falls_back_to_id() {
        let mut shop = wood_shop();
        assert_eq!(shop.owner_label(), shop.owner.to_string());
        shop.owner_name = "Alice".into();
        assert_eq!(shop.owner_label(), "Alice");
    }

    #[test]
    fn test_name_match_ignores_case() {
        let shop = wood_shop();
        assert!(shop.has_name("wood"));
        assert!(shop.has_name("WOOD"));
        assert!(!shop.has_name("stone"));
    }
}
