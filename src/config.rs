//! Shop Configuration
//!
//! `config/shop.toml`, every key optional. Display and format sections are
//! re-read by `shop reload`.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShopConfig {
    pub storage: StorageConfig,
    pub display: DisplaySettings,
    pub format: FormatSettings,
    pub economy: EconomyConfig,
    pub server: ServerConfig,
}

impl ShopConfig {
    /// Load from a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            warn!("Config file does not exist: {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read {:?}: {}", path, e))?;
        let config: ShopConfig = toml::from_str(&contents)
            .map_err(|e| format!("Failed to parse {:?}: {}", path, e))?;

        info!("Loaded shop config from {:?}", path);
        Ok(config)
    }
}

// ============================================================================
// Sections
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct StorageConfig {
    pub shops_file: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            shops_file: "data/shops.toml".to_string(),
        }
    }
}

/// Who receives display messages
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityPolicy {
    /// Observers within `view-distance`; later messages follow the recipients
    #[default]
    Radius,
    /// Every connected observer
    Global,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct DisplaySettings {
    pub item_height: f64,
    pub price_height: f64,
    pub owner_height: f64,
    pub sell_height: f64,
    /// Degrees added per rotation tick
    pub rotation_speed: f32,
    pub rotation_interval_ms: u64,
    pub view_distance: f64,
    pub visibility: VisibilityPolicy,
    /// First display entity id, kept above the host's own id range
    pub entity_id_seed: i32,
}

impl Default for DisplaySettings {
    fn default() -> Self {
        Self {
            item_height: 1.0,
            price_height: 0.5,
            owner_height: 0.8,
            sell_height: 1.5,
            rotation_speed: 1.5,
            rotation_interval_ms: 100,
            view_distance: 100.0,
            visibility: VisibilityPolicy::Radius,
            entity_id_seed: 100_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct FormatSettings {
    pub buy_format: String,
    pub sell_format: String,
    pub owner_format: String,
    pub currency: String,
    pub decimal_places: usize,
}

impl Default for FormatSettings {
    fn default() -> Self {
        Self {
            buy_format: "Buy: {amount}x for {price} {currency}".to_string(),
            sell_format: "Sell: {amount}x for {price} {currency}".to_string(),
            owner_format: "Shop of {owner}".to_string(),
            currency: "Coins".to_string(),
            decimal_places: 2,
        }
    }
}

impl FormatSettings {
    pub fn price(&self, value: f64) -> String {
        format!("{:.*}", self.decimal_places, value)
    }

    /// Price with the currency name appended
    pub fn money(&self, value: f64) -> String {
        format!("{} {}", self.price(value), self.currency)
    }

    pub fn buy_text(&self, amount: u32, price: f64) -> String {
        self.render(&self.buy_format, amount, price)
    }

    pub fn sell_text(&self, amount: u32, price: f64) -> String {
        self.render(&self.sell_format, amount, price)
    }

    pub fn owner_text(&self, owner: &str) -> String {
        self.owner_format.replace("{owner}", owner)
    }

    fn render(&self, template: &str, amount: u32, price: f64) -> String {
        template
            .replace("{amount}", &amount.to_string())
            .replace("{price}", &self.price(price))
            .replace("{currency}", &self.currency)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct EconomyConfig {
    pub starting_balance: f64,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            starting_balance: 100.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct ServerConfig {
    pub bind: String,
    pub world_file: String,
    pub database_url: String,
    pub ledger_save_interval_secs: u64,
    /// Identities allowed to reload and to open other players' shops
    pub admins: Vec<Uuid>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:2567".to_string(),
            world_file: "data/world.json".to_string(),
            database_url: "sqlite:shops.db?mode=rwc".to_string(),
            ledger_save_interval_secs: 30,
            admins: Vec::new(),
        }
    }
}
