use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::steps::{run_steps, Step};
use crate::config::FormatSettings;
use crate::container::{ContainerService, Holder};
use crate::economy::{CreditBook, Economy};
use crate::error::{Result, ShopError};
use crate::item::ItemDescriptor;
use crate::protocol::ServerMessage;
use crate::session::Sessions;
use crate::shop::{Shop, ShopId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeKind {
    Buy,
    Sell,
}

/// What happened to the owner's share of a purchase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerPayment {
    Credited,
    /// Owner was offline; held in the pending-credit book
    Deferred,
    /// Sales pay the customer, not the owner
    None,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TradeReceipt {
    pub kind: TradeKind,
    pub shop_id: ShopId,
    pub item: ItemDescriptor,
    pub amount: u32,
    pub price: f64,
    pub owner_payment: OwnerPayment,
}

pub struct TransactionEngine {
    containers: Arc<dyn ContainerService>,
    economy: Arc<dyn Economy>,
    sessions: Arc<Sessions>,
    pending: Arc<dyn CreditBook>,
    format: RwLock<FormatSettings>,
}

impl TransactionEngine {
    pub fn new(
        containers: Arc<dyn ContainerService>,
        economy: Arc<dyn Economy>,
        sessions: Arc<Sessions>,
        pending: Arc<dyn CreditBook>,
        format: FormatSettings,
    ) -> Self {
        Self {
            containers,
            economy,
            sessions,
            pending,
            format: RwLock::new(format),
        }
    }

    pub fn apply_format(&self, format: FormatSettings) {
        *self.format.write() = format;
    }

    // ========================================================================
    // Buy
    // ========================================================================

    /// Customer pays `buy_price` and receives `amount` items from the shop
    /// container
    pub fn try_buy(&self, buyer: Uuid, shop: &Shop) -> Result<TradeReceipt> {
        let container = Holder::Container(shop.location.clone());
        let inventory = Holder::Player(buyer);

        if !shop.active {
            return Err(ShopError::ShopInactive);
        }
        if !self.economy.has_funds(buyer, shop.buy_price) {
            return Err(ShopError::InsufficientFunds {
                required: self.format.read().money(shop.buy_price),
            });
        }
        if !self.containers.exists(&container) {
            return Err(ShopError::ContainerMissing);
        }
        if self.containers.count_matching(&container, &shop.item) < shop.amount {
            return Err(ShopError::OutOfStock);
        }
        if !self.containers.has_empty_slot(&inventory) {
            return Err(ShopError::InventoryFull);
        }

        let owner_online = self.sessions.is_online(shop.owner);
        let mut steps = vec![
            Step::TakeItems {
                holder: container,
                item: shop.item.clone(),
                amount: shop.amount,
            },
            Step::GiveItems {
                holder: inventory,
                item: shop.item.clone(),
                amount: shop.amount,
            },
            Step::Debit {
                player: buyer,
                amount: shop.buy_price,
            },
        ];
        if owner_online {
            steps.push(Step::Credit {
                player: shop.owner,
                amount: shop.buy_price,
            });
        }
        run_steps(&steps, self.containers.as_ref(), self.economy.as_ref())?;

        let owner_payment = if owner_online {
            OwnerPayment::Credited
        } else {
            self.pending.defer(shop.owner, shop.buy_price);
            OwnerPayment::Deferred
        };

        Ok(TradeReceipt {
            kind: TradeKind::Buy,
            shop_id: shop.id.clone(),
            item: shop.item.clone(),
            amount: shop.amount,
            price: shop.buy_price,
            owner_payment,
        })
    }

    /// Buy and tell both parties how it went
    pub fn buy(&self, buyer: Uuid, shop: &Shop) -> bool {
        match self.try_buy(buyer, shop) {
            Ok(receipt) => {
                let format = self.format.read().clone();
                let buyer_name = self.sessions.name_of(buyer);
                self.sessions.notify(
                    buyer,
                    format!(
                        "Purchase complete! Paid {} for {}x {}",
                        format.money(receipt.price),
                        receipt.amount,
                        receipt.item.display_name()
                    ),
                );
                self.sessions.notify(
                    shop.owner,
                    format!(
                        "{} bought {}x {} from your shop {} for {}",
                        buyer_name,
                        receipt.amount,
                        receipt.item.display_name(),
                        shop.name,
                        format.money(receipt.price)
                    ),
                );
                info!(
                    "{} bought {}x {} from shop {} for {:.2} (owner payment: {:?})",
                    buyer, receipt.amount, receipt.item, shop.id, receipt.price, receipt.owner_payment
                );
                true
            }
            Err(e) => {
                self.report_failure(buyer, shop, TradeKind::Buy, &e);
                false
            }
        }
    }

    // ========================================================================
    // Sell
    // ========================================================================

    /// Customer hands `amount` items to the shop container; the owner pays
    /// `sell_price`
    pub fn try_sell(&self, seller: Uuid, shop: &Shop) -> Result<TradeReceipt> {
        let container = Holder::Container(shop.location.clone());
        let inventory = Holder::Player(seller);

        if !shop.active {
            return Err(ShopError::ShopInactive);
        }
        if !shop.sell_enabled {
            return Err(ShopError::SellDisabled);
        }
        if self.containers.count_matching(&inventory, &shop.item) < shop.amount {
            return Err(ShopError::NotEnoughItems {
                required: shop.amount,
            });
        }
        if !self.containers.exists(&container) {
            return Err(ShopError::ContainerMissing);
        }
        if self.containers.free_capacity(&container, &shop.item) < shop.amount {
            return Err(ShopError::ContainerFull);
        }
        if !self.sessions.is_online(shop.owner) {
            return Err(ShopError::OwnerOffline);
        }
        if !self.economy.has_funds(shop.owner, shop.sell_price) {
            return Err(ShopError::OwnerInsufficientFunds);
        }

        let steps = [
            Step::TakeItems {
                holder: inventory,
                item: shop.item.clone(),
                amount: shop.amount,
            },
            Step::GiveItems {
                holder: container,
                item: shop.item.clone(),
                amount: shop.amount,
            },
            Step::Debit {
                player: shop.owner,
                amount: shop.sell_price,
            },
            Step::Credit {
                player: seller,
                amount: shop.sell_price,
            },
            Step::PersistLedger { player: shop.owner },
        ];
        run_steps(&steps, self.containers.as_ref(), self.economy.as_ref())?;

        self.sessions.send(
            shop.owner,
            ServerMessage::Balance {
                balance: self.economy.balance(shop.owner),
            },
        );

        Ok(TradeReceipt {
            kind: TradeKind::Sell,
            shop_id: shop.id.clone(),
            item: shop.item.clone(),
            amount: shop.amount,
            price: shop.sell_price,
            owner_payment: OwnerPayment::None,
        })
    }

    pub fn sell(&self, seller: Uuid, shop: &Shop) -> bool {
        match self.try_sell(seller, shop) {
            Ok(receipt) => {
                let format = self.format.read().clone();
                let seller_name = self.sessions.name_of(seller);
                self.sessions.notify(
                    seller,
                    format!(
                        "Sale complete! Received {} for {}x {}",
                        format.money(receipt.price),
                        receipt.amount,
                        receipt.item.display_name()
                    ),
                );
                self.sessions.notify(
                    shop.owner,
                    format!(
                        "{} sold {}x {} to your shop {} for {}",
                        seller_name,
                        receipt.amount,
                        receipt.item.display_name(),
                        shop.name,
                        format.money(receipt.price)
                    ),
                );
                info!(
                    "{} sold {}x {} to shop {} for {:.2}",
                    seller, receipt.amount, receipt.item, shop.id, receipt.price
                );
                true
            }
            Err(e) => {
                self.report_failure(seller, shop, TradeKind::Sell, &e);
                false
            }
        }
    }

    // ========================================================================
    // Pending Credits
    // ========================================================================

    /// Pay out revenue earned while `owner` was offline. Returns the amount
    /// credited.
    pub fn settle_pending(&self, owner: Uuid) -> Option<f64> {
        let amount = self.pending.take(owner)?;
        if let Err(e) = self.economy.credit(owner, amount) {
            error!("Failed to settle {:.2} owed to {}: {}", amount, owner, e);
            self.pending.defer(owner, amount);
            return None;
        }

        let money = self.format.read().money(amount);
        self.sessions.notify(owner, format!("Your shops earned {} while you were away", money));
        self.sessions.send(
            owner,
            ServerMessage::Balance {
                balance: self.economy.balance(owner),
            },
        );
        info!("Settled {:.2} of pending shop revenue for {}", amount, owner);
        Some(amount)
    }

    pub fn pending_for(&self, owner: Uuid) -> f64 {
        self.pending.owed(owner)
    }

    fn report_failure(&self, player: Uuid, shop: &Shop, kind: TradeKind, err: &ShopError) {
        warn!("{:?} by {} at shop {} rejected: {}", kind, player, shop.id, err);
        self.sessions.notify(player, err.to_string());
    }
}
