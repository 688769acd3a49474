//! Player-run chest shops for a multiplayer world server: the shop registry,
//! the trade engine and the floating displays above each shop container.

pub mod command;
pub mod config;
pub mod container;
pub mod db;
pub mod display;
pub mod economy;
pub mod error;
pub mod interaction;
pub mod item;
pub mod location;
pub mod protocol;
pub mod session;
pub mod shop;
pub mod system;
pub mod transaction;
pub mod world;

pub use error::{ErrorKind, ShopError};
pub use system::ShopSystem;
