pub mod definition;
pub mod registry;
pub mod store;

pub use definition::{Shop, ShopId};
pub use registry::ShopRegistry;
pub use store::ShopStore;
