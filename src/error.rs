//! Shop Errors
//!
//! Every failure a shop operation can report. Variants are specific so callers
//! and tests can match on them; `kind()` folds them into the five categories
//! the command boundary cares about, and `Display` is the single formatted
//! message shown to the player.

use thiserror::Error;

/// Coarse error category
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Permission,
    Consistency,
    Persistence,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ShopError {
    #[error("A shop already exists at this container")]
    DuplicateLocation,

    #[error("Amount must be positive")]
    InvalidAmount,

    #[error("Price must be positive")]
    InvalidPrice,

    #[error("{0}")]
    Validation(String),

    #[error("This shop is not active")]
    ShopInactive,

    #[error("You don't have enough money (required: {required})")]
    InsufficientFunds { required: String },

    #[error("Shop container not found")]
    ContainerMissing,

    #[error("Not enough items in stock")]
    OutOfStock,

    #[error("Your inventory is full")]
    InventoryFull,

    #[error("This shop does not buy items")]
    SellDisabled,

    #[error("You don't have enough items (required: {required})")]
    NotEnoughItems { required: u32 },

    #[error("The shop container has no room left")]
    ContainerFull,

    #[error("The shop owner is not online")]
    OwnerOffline,

    #[error("The shop owner doesn't have enough money")]
    OwnerInsufficientFunds,

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Permission(String),

    #[error("Transaction aborted: {0}")]
    Consistency(String),

    #[error("Failed to save shops: {0}")]
    Persistence(String),
}

impl ShopError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShopError::DuplicateLocation
            | ShopError::InvalidAmount
            | ShopError::InvalidPrice
            | ShopError::Validation(_)
            | ShopError::ShopInactive
            | ShopError::InsufficientFunds { .. }
            | ShopError::OutOfStock
            | ShopError::InventoryFull
            | ShopError::SellDisabled
            | ShopError::NotEnoughItems { .. }
            | ShopError::ContainerFull
            | ShopError::OwnerInsufficientFunds => ErrorKind::Validation,
            ShopError::ContainerMissing | ShopError::NotFound(_) => ErrorKind::NotFound,
            ShopError::Permission(_) => ErrorKind::Permission,
            ShopError::OwnerOffline | ShopError::Consistency(_) => ErrorKind::Consistency,
            ShopError::Persistence(_) => ErrorKind::Persistence,
        }
    }
}

pub type Result<T> = std::result::Result<T, ShopError>;
