//! Transaction Engine
//!
//! Buying from and selling to shops. Every precondition is checked before
//! anything changes; the changes themselves run as reversible steps.

pub mod engine;
pub mod steps;

pub use engine::{OwnerPayment, TradeKind, TradeReceipt, TransactionEngine};
pub use steps::{run_steps, Step, StepError, Undo};
