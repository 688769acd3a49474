//! Reversible Trade Steps
//!
//! A trade is a list of steps. Each step that applies hands back the record
//! needed to undo it; if a later step fails, everything already applied is
//! undone in reverse order.

use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

use crate::container::{plan_insertion, plan_removal, ContainerError, ContainerService, Holder, SlotOp};
use crate::economy::{Economy, LedgerError};
use crate::error::ShopError;
use crate::item::ItemDescriptor;

#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    TakeItems {
        holder: Holder,
        item: ItemDescriptor,
        amount: u32,
    },
    GiveItems {
        holder: Holder,
        item: ItemDescriptor,
        amount: u32,
    },
    Debit {
        player: Uuid,
        amount: f64,
    },
    Credit {
        player: Uuid,
        amount: f64,
    },
    PersistLedger {
        player: Uuid,
    },
}

/// How to take back one applied step
#[derive(Debug, Clone, PartialEq)]
pub enum Undo {
    Slots { holder: Holder, ops: Vec<SlotOp> },
    Credit { player: Uuid, amount: f64 },
    Debit { player: Uuid, amount: f64 },
    Nothing,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StepError {
    #[error("{holder} holds fewer than {amount} {item}")]
    Shortfall {
        holder: Holder,
        item: ItemDescriptor,
        amount: u32,
    },
    #[error("{holder} has no room for {amount} {item}")]
    NoRoom {
        holder: Holder,
        item: ItemDescriptor,
        amount: u32,
    },
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

impl Step {
    /// Apply against current state. Item steps plan their slot changes
    /// from a fresh read of the holder.
    pub fn apply(&self, containers: &dyn ContainerService, economy: &dyn Economy) -> Result<Undo, StepError> {
        match self {
            Step::TakeItems { holder, item, amount } => {
                let slots = containers
                    .read(holder)
                    .ok_or_else(|| ContainerError::Missing(holder.to_string()))?;
                let ops = plan_removal(&slots, item, *amount).ok_or_else(|| StepError::Shortfall {
                    holder: holder.clone(),
                    item: item.clone(),
                    amount: *amount,
                })?;
                let undo = containers.mutate(holder, &ops)?;
                Ok(Undo::Slots {
                    holder: holder.clone(),
                    ops: undo,
                })
            }
            Step::GiveItems { holder, item, amount } => {
                let slots = containers
                    .read(holder)
                    .ok_or_else(|| ContainerError::Missing(holder.to_string()))?;
                let ops = plan_insertion(&slots, item, *amount).ok_or_else(|| StepError::NoRoom {
                    holder: holder.clone(),
                    item: item.clone(),
                    amount: *amount,
                })?;
                let undo = containers.mutate(holder, &ops)?;
                Ok(Undo::Slots {
                    holder: holder.clone(),
                    ops: undo,
                })
            }
            Step::Debit { player, amount } => {
                economy.debit(*player, *amount)?;
                Ok(Undo::Credit {
                    player: *player,
                    amount: *amount,
                })
            }
            Step::Credit { player, amount } => {
                economy.credit(*player, *amount)?;
                Ok(Undo::Debit {
                    player: *player,
                    amount: *amount,
                })
            }
            Step::PersistLedger { player } => {
                economy.persist(*player)?;
                Ok(Undo::Nothing)
            }
        }
    }

    pub fn describe(&self) -> String {
        match self {
            Step::TakeItems { holder, item, amount } => format!("taking {} {} from {}", amount, item, holder),
            Step::GiveItems { holder, item, amount } => format!("giving {} {} to {}", amount, item, holder),
            Step::Debit { player, amount } => format!("debiting {:.2} from {}", amount, player),
            Step::Credit { player, amount } => format!("crediting {:.2} to {}", amount, player),
            Step::PersistLedger { player } => format!("saving ledger of {}", player),
        }
    }
}

impl Undo {
    pub fn revert(&self, containers: &dyn ContainerService, economy: &dyn Economy) -> Result<(), StepError> {
        match self {
            Undo::Slots { holder, ops } => {
                containers.mutate(holder, ops)?;
            }
            Undo::Credit { player, amount } => economy.credit(*player, *amount)?,
            Undo::Debit { player, amount } => economy.debit(*player, *amount)?,
            Undo::Nothing => {}
        }
        Ok(())
    }
}

/// Apply `steps` in order. On the first failure every applied step is
/// reverted, last first, and the failure surfaces as a consistency error.
pub fn run_steps(
    steps: &[Step],
    containers: &dyn ContainerService,
    economy: &dyn Economy,
) -> Result<(), ShopError> {
    let mut applied: Vec<Undo> = Vec::with_capacity(steps.len());

    for step in steps {
        match step.apply(containers, economy) {
            Ok(undo) => applied.push(undo),
            Err(e) => {
                warn!("Trade step failed while {}: {}, rolling back {} steps", step.describe(), e, applied.len());
                for undo in applied.iter().rev() {
                    if let Err(undo_err) = undo.revert(containers, economy) {
                        error!("Failed to roll back {:?}: {}", undo, undo_err);
                    }
                }
                return Err(ShopError::Consistency(format!("{} failed: {}", step.describe(), e)));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::MemoryContainers;
    use crate::economy::{LedgerRecord, MemoryLedger};
    use crate::location::BlockLocation;
    use crate::error::ErrorKind;

    /// Ledger whose persist always fails
    struct BrokenDisk(MemoryLedger);

    impl Economy for BrokenDisk {
        fn record(&self, player: Uuid) -> LedgerRecord {
            self.0.record(player)
        }
        fn debit(&self, player: Uuid, amount: f64) -> Result<(), LedgerError> {
            self.0.debit(player, amount)
        }
        fn credit(&self, player: Uuid, amount: f64) -> Result<(), LedgerError> {
            self.0.credit(player, amount)
        }
        fn persist(&self, _player: Uuid) -> Result<(), LedgerError> {
            Err(LedgerError::Persist("disk full".into()))
        }
    }

    fn wood() -> ItemDescriptor {
        ItemDescriptor::new("oak_log")
    }

    #[test]
    fn test_steps_apply_in_order() {
        let containers = MemoryContainers::new();
        let ledger = MemoryLedger::new(0.0);
        let chest = Holder::Container(BlockLocation::new("world", 0, 64, 0));
        let player = Uuid::new_v4();
        let inventory = Holder::Player(player);
        containers.place(chest.clone(), 27);
        containers.place(inventory.clone(), 36);
        containers.fill(&chest, &wood(), 100);
        ledger.set_balance(player, 20.0);

        let steps = vec![
            Step::TakeItems { holder: chest.clone(), item: wood(), amount: 64 },
            Step::GiveItems { holder: inventory.clone(), item: wood(), amount: 64 },
            Step::Debit { player, amount: 10.0 },
        ];
        run_steps(&steps, &containers, &ledger).unwrap();

        assert_eq!(containers.count_matching(&chest, &wood()), 36);
        assert_eq!(containers.count_matching(&inventory, &wood()), 64);
        assert_eq!(ledger.balance(player), 10.0);
    }

    #[test]
    fn test_late_failure_rolls_everything_back() {
        let containers = MemoryContainers::new();
        let ledger = BrokenDisk(MemoryLedger::new(0.0));
        let chest = Holder::Container(BlockLocation::new("world", 0, 64, 0));
        let owner = Uuid::new_v4();
        let seller = Uuid::new_v4();
        let inventory = Holder::Player(seller);
        containers.place(chest.clone(), 27);
        containers.place(inventory.clone(), 36);
        containers.fill(&inventory, &wood(), 70);
        ledger.0.set_balance(owner, 50.0);
        ledger.0.set_balance(seller, 1.0);

        let chest_before = containers.read(&chest).unwrap();
        let inventory_before = containers.read(&inventory).unwrap();

        let steps = vec![
            Step::TakeItems { holder: inventory.clone(), item: wood(), amount: 64 },
            Step::GiveItems { holder: chest.clone(), item: wood(), amount: 64 },
            Step::Debit { player: owner, amount: 5.0 },
            Step::Credit { player: seller, amount: 5.0 },
            Step::PersistLedger { player: owner },
        ];
        let err = run_steps(&steps, &containers, &ledger).unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Consistency);
        assert_eq!(containers.read(&chest).unwrap(), chest_before);
        assert_eq!(containers.read(&inventory).unwrap(), inventory_before);
        assert_eq!(ledger.balance(owner), 50.0);
        assert_eq!(ledger.balance(seller), 1.0);
    }

    #[test]
    fn test_give_without_room_fails_cleanly() {
        let containers = MemoryContainers::new();
        let ledger = MemoryLedger::new(0.0);
        let inventory = Holder::Player(Uuid::new_v4());
        containers.place(inventory.clone(), 1);

        let step = Step::GiveItems { holder: inventory.clone(), item: wood(), amount: 65 };
        assert!(matches!(step.apply(&containers, &ledger), Err(StepError::NoRoom { .. })));
        assert_eq!(containers.count_matching(&inventory, &wood()), 0);
    }
}
