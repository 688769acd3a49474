//! Display Synchronization
//!
//! Floating labels and a rotating item preview above every shop container.
//! The entities exist only on observers' clients; this module decides what
//! to spawn, who receives it and when it goes away.

pub mod engine;
pub mod ids;

pub use crate::config::VisibilityPolicy;
pub use engine::{spawn_rotation_task, yaw_byte, DisplayEngine, LabelRole};
pub use ids::EntityIdAllocator;
