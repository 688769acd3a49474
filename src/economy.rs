//! Economy Service
//!
//! The currency ledger is owned by the host. Shops talk to it through the
//! [`Economy`] trait; [`MemoryLedger`] keeps balances in memory. Revenue for
//! owners that were offline goes into a [`CreditBook`]; [`PendingCredits`]
//! is the in-memory one.

use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    #[error("insufficient funds for {player}: balance {balance:.2}, required {required:.2}")]
    InsufficientFunds {
        player: Uuid,
        balance: f64,
        required: f64,
    },
    #[error("invalid amount {0}")]
    InvalidAmount(f64),
    #[error("failed to persist ledger record: {0}")]
    Persist(String),
}

/// Snapshot of one identity's ledger entry
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerRecord {
    pub player: Uuid,
    pub balance: f64,
}

pub trait Economy: Send + Sync {
    fn record(&self, player: Uuid) -> LedgerRecord;

    fn debit(&self, player: Uuid, amount: f64) -> Result<(), LedgerError>;

    fn credit(&self, player: Uuid, amount: f64) -> Result<(), LedgerError>;

    /// Force the player's record to durable storage
    fn persist(&self, player: Uuid) -> Result<(), LedgerError>;

    fn balance(&self, player: Uuid) -> f64 {
        self.record(player).balance
    }

    fn has_funds(&self, player: Uuid, amount: f64) -> bool {
        self.balance(player) >= amount
    }
}

fn check_amount(amount: f64) -> Result<(), LedgerError> {
    if amount.is_finite() && amount >= 0.0 {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount(amount))
    }
}

/// In-memory ledger. Unknown identities start at `starting_balance`.
pub struct MemoryLedger {
    balances: DashMap<Uuid, f64>,
    starting_balance: f64,
}

impl MemoryLedger {
    pub fn new(starting_balance: f64) -> Self {
        Self {
            balances: DashMap::new(),
            starting_balance,
        }
    }

    pub fn set_balance(&self, player: Uuid, balance: f64) {
        self.balances.insert(player, balance);
    }

    /// Every balance touched so far
    pub fn snapshot(&self) -> Vec<LedgerRecord> {
        self.balances
            .iter()
            .map(|entry| LedgerRecord {
                player: *entry.key(),
                balance: *entry.value(),
            })
            .collect()
    }
}

impl Economy for MemoryLedger {
    fn record(&self, player: Uuid) -> LedgerRecord {
        let balance = self
            .balances
            .get(&player)
            .map(|b| *b)
            .unwrap_or(self.starting_balance);
        LedgerRecord { player, balance }
    }

    fn debit(&self, player: Uuid, amount: f64) -> Result<(), LedgerError> {
        check_amount(amount)?;
        let mut balance = self.balances.entry(player).or_insert(self.starting_balance);
        if *balance < amount {
            return Err(LedgerError::InsufficientFunds {
                player,
                balance: *balance,
                required: amount,
            });
        }
        *balance -= amount;
        Ok(())
    }

    fn credit(&self, player: Uuid, amount: f64) -> Result<(), LedgerError> {
        check_amount(amount)?;
        *self.balances.entry(player).or_insert(self.starting_balance) += amount;
        Ok(())
    }

    fn persist(&self, player: Uuid) -> Result<(), LedgerError> {
        debug!("Ledger record for {} kept in memory", player);
        Ok(())
    }
}

// ============================================================================
// Pending Credits
// ============================================================================

/// Where revenue owed to offline owners waits until they return
pub trait CreditBook: Send + Sync {
    fn defer(&self, owner: Uuid, amount: f64);

    fn owed(&self, owner: Uuid) -> f64;

    /// Remove and return everything owed to `owner`
    fn take(&self, owner: Uuid) -> Option<f64>;
}

/// Shop revenue owed to owners who were offline when a sale happened
pub struct PendingCredits {
    owed: DashMap<Uuid, f64>,
}

impl PendingCredits {
    pub fn new() -> Self {
        Self {
            owed: DashMap::new(),
        }
    }

}

impl Default for PendingCredits {
    fn default() -> Self {
        Self::new()
    }
}

impl CreditBook for PendingCredits {
    fn defer(&self, owner: Uuid, amount: f64) {
        *self.owed.entry(owner).or_insert(0.0) += amount;
    }

    fn owed(&self, owner: Uuid) -> f64 {
        self.owed.get(&owner).map(|a| *a).unwrap_or(0.0)
    }

    fn take(&self, owner: Uuid) -> Option<f64> {
        self.owed.remove(&owner).map(|(_, amount)| amount)
    }
}
