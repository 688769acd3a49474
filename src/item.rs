use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// ============================================================================
// Item Descriptor
// ============================================================================

/// Default stack limit for materials without a smaller one
pub const DEFAULT_MAX_STACK: u32 = 64;

/// What an item is, independent of how many there are.
/// Two descriptors are the same item iff material and metadata are equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemDescriptor {
    pub material: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

impl ItemDescriptor {
    pub fn new(material: &str) -> Self {
        Self {
            material: material.to_lowercase(),
            meta: BTreeMap::new(),
        }
    }

    pub fn with_meta(mut self, key: &str, value: &str) -> Self {
        self.meta.insert(key.to_string(), value.to_string());
        self
    }

    /// Maximum number of units a single slot can hold
    pub fn max_stack(&self) -> u32 {
        let material = self.material.as_str();
        let unstackable = [
            "_sword", "_pickaxe", "_axe", "_shovel", "_hoe", "_helmet", "_chestplate",
            "_leggings", "_boots", "_boat", "potion", "bow", "shield", "elytra", "trident",
        ];
        if unstackable.iter().any(|s| material.ends_with(s)) {
            return 1;
        }
        match material {
            "ender_pearl" | "snowball" | "egg" | "bucket" | "honey_bottle" | "armor_stand" => 16,
            m if m.ends_with("_sign") || m.ends_with("_banner") => 16,
            _ => DEFAULT_MAX_STACK,
        }
    }

    /// Upper-case material name for player-facing text
    pub fn display_name(&self) -> String {
        self.material.to_uppercase()
    }
}

impl fmt::Display for ItemDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.material)?;
        if !self.meta.is_empty() {
            let pairs: Vec<String> = self.meta.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
            write!(f, "[{}]", pairs.join(","))?;
        }
        Ok(())
    }
}

// ============================================================================
// Item Stack
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub item: ItemDescriptor,
    pub count: u32,
}

impl ItemStack {
    pub fn new(item: ItemDescriptor, count: u32) -> Self {
        Self { item, count }
    }

    /// Same item, ignoring count
    pub fn is_similar(&self, item: &ItemDescriptor) -> bool {
        &self.item == item
    }
}
