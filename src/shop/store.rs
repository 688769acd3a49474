//! Shop Store
//!
//! One TOML document holding a record per shop. Writes go through a
//! background task so callers never wait on the disk: each mutation hands
//! over a full snapshot, the writer keeps only the newest one queued and
//! replaces the file via a temporary copy.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::definition::Shop;
use crate::error::{Result, ShopError};
use crate::item::ItemDescriptor;
use crate::location::BlockLocation;

// ============================================================================
// Record Layout
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ShopRecord {
    pub name: String,
    pub owner: Uuid,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub owner_name: String,
    pub amount: u32,
    pub buy_price: f64,
    #[serde(default)]
    pub sell_price: f64,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub sell_enabled: bool,
    pub chest: BlockLocation,
    pub item: ItemRecord,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub material: String,
    #[serde(default = "default_item_amount")]
    pub amount: u32,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub meta: BTreeMap<String, String>,
}

fn default_true() -> bool {
    true
}

fn default_item_amount() -> u32 {
    1
}

impl From<&Shop> for ShopRecord {
    fn from(shop: &Shop) -> Self {
        Self {
            name: shop.name.clone(),
            owner: shop.owner,
            owner_name: shop.owner_name.clone(),
            amount: shop.amount,
            buy_price: shop.buy_price,
            sell_price: shop.sell_price,
            active: shop.active,
            sell_enabled: shop.sell_enabled,
            chest: shop.location.clone(),
            item: ItemRecord {
                material: shop.item.material.clone(),
                amount: 1,
                meta: shop.item.meta.clone(),
            },
        }
    }
}

impl ShopRecord {
    /// Rebuild the shop stored under `id`
    pub fn into_shop(self, id: &str) -> Result<Shop> {
        let shop = Shop {
            id: id.to_string(),
            name: self.name,
            owner: self.owner,
            owner_name: self.owner_name,
            location: self.chest,
            item: ItemDescriptor {
                material: self.item.material.to_lowercase(),
                meta: self.item.meta,
            },
            amount: self.amount,
            buy_price: self.buy_price,
            sell_price: self.sell_price,
            active: self.active,
            sell_enabled: self.sell_enabled,
        };
        shop.validate()?;
        Ok(shop)
    }
}

#[derive(Debug, Serialize)]
struct ShopDocument<'a> {
    shops: BTreeMap<&'a str, ShopRecord>,
}

/// Serialize shops into the on-disk document
pub fn render_document(shops: &[Shop]) -> Result<String> {
    let document = ShopDocument {
        shops: shops
            .iter()
            .map(|shop| (shop.id.as_str(), ShopRecord::from(shop)))
            .collect(),
    };
    toml::to_string(&document).map_err(|e| ShopError::Persistence(e.to_string()))
}

/// Parse the document, skipping records that do not describe a valid shop
pub fn parse_document(contents: &str) -> Result<Vec<Shop>> {
    let table: toml::Table = toml::from_str(contents)
        .map_err(|e| ShopError::Persistence(format!("Failed to parse shop file: {}", e)))?;

    let Some(entries) = table.get("shops").and_then(|v| v.as_table()) else {
        return Ok(Vec::new());
    };

    let mut shops = Vec::with_capacity(entries.len());
    for (id, value) in entries {
        let record: ShopRecord = match value.clone().try_into() {
            Ok(record) => record,
            Err(e) => {
                warn!("Skipping malformed shop record '{}': {}", id, e);
                continue;
            }
        };
        match record.into_shop(id) {
            Ok(shop) => shops.push(shop),
            Err(e) => warn!("Skipping invalid shop record '{}': {}", id, e),
        }
    }
    Ok(shops)
}

// ============================================================================
// Background Writer
// ============================================================================

enum WriteCommand {
    Save(String),
    Flush(oneshot::Sender<()>),
}

pub struct ShopStore {
    path: PathBuf,
    writer: Option<mpsc::UnboundedSender<WriteCommand>>,
}

impl ShopStore {
    /// Store backed by `path`, with its writer task spawned on the current
    /// tokio runtime
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(path.clone(), rx));
        Self {
            path,
            writer: Some(tx),
        }
    }

    /// Store that reads `path` but never writes
    pub fn read_only(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<Vec<Shop>> {
        if !self.path.exists() {
            info!("No shop file at {:?}, starting empty", self.path);
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&self.path).map_err(|e| {
            ShopError::Persistence(format!("Failed to read {:?}: {}", self.path, e))
        })?;
        parse_document(&contents)
    }

    /// Queue a snapshot for writing
    pub fn save(&self, shops: &[Shop]) {
        let Some(writer) = &self.writer else {
            return;
        };
        match render_document(shops) {
            Ok(contents) => {
                if writer.send(WriteCommand::Save(contents)).is_err() {
                    error!("Shop writer has stopped, snapshot for {:?} dropped", self.path);
                }
            }
            Err(e) => error!("{}", e),
        }
    }

    /// Resolves once every snapshot queued so far is on disk
    pub fn flush(&self) -> oneshot::Receiver<()> {
        let (tx, rx) = oneshot::channel();
        match &self.writer {
            Some(writer) => {
                if let Err(mpsc::error::SendError(WriteCommand::Flush(tx))) =
                    writer.send(WriteCommand::Flush(tx))
                {
                    let _ = tx.send(());
                }
            }
            None => {
                let _ = tx.send(());
            }
        }
        rx
    }
}

async fn run_writer(path: PathBuf, mut rx: mpsc::UnboundedReceiver<WriteCommand>) {
    while let Some(first) = rx.recv().await {
        let mut latest = None;
        let mut waiters = Vec::new();
        let mut next = Some(first);

        // Drain the queue so a burst of mutations costs one write
        while let Some(command) = next {
            match command {
                WriteCommand::Save(contents) => latest = Some(contents),
                WriteCommand::Flush(done) => waiters.push(done),
            }
            next = rx.try_recv().ok();
        }

        if let Some(contents) = latest {
            match write_atomically(&path, &contents).await {
                Ok(()) => debug!("Saved shops to {:?}", path),
                Err(e) => error!("{}", e),
            }
        }

        for done in waiters {
            let _ = done.send(());
        }
    }
    debug!("Shop writer for {:?} stopped", path);
}

async fn write_atomically(path: &Path, contents: &str) -> std::result::Result<(), String> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| format!("Failed to create {:?}: {}", parent, e))?;
    }
    let tmp = path.with_extension("toml.tmp");
    tokio::fs::write(&tmp, contents)
        .await
        .map_err(|e| format!("Failed to write {:?}: {}", tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| format!("Failed to replace {:?}: {}", path, e))
}
