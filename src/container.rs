//! Container Service
//!
//! Slot grids owned by the host: shop containers placed in the world and
//! player inventories. The shop subsystem only reads grids and applies slot
//! operations to them through [`ContainerService`].

use dashmap::DashMap;
use thiserror::Error;
use uuid::Uuid;

use crate::item::{ItemDescriptor, ItemStack};
use crate::location::BlockLocation;

pub const CONTAINER_SIZE: usize = 27;
pub const PLAYER_INVENTORY_SIZE: usize = 36;

pub type Slot = Option<ItemStack>;

/// Owner of a slot grid
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Holder {
    Container(BlockLocation),
    Player(Uuid),
}

impl std::fmt::Display for Holder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Holder::Container(location) => write!(f, "container at {}", location),
            Holder::Player(id) => write!(f, "inventory of {}", id),
        }
    }
}

/// Replace the contents of one slot
#[derive(Debug, Clone, PartialEq)]
pub struct SlotOp {
    pub slot: usize,
    pub stack: Slot,
}

impl SlotOp {
    pub fn set(slot: usize, stack: Slot) -> Self {
        Self { slot, stack }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ContainerError {
    #[error("{0} not found")]
    Missing(String),
    #[error("slot {slot} out of range for {holder}")]
    SlotOutOfRange { holder: String, slot: usize },
}

// ============================================================================
// Slot Grid Queries
// ============================================================================

/// Units matching `item` summed across every slot
pub fn count_matching(slots: &[Slot], item: &ItemDescriptor) -> u32 {
    slots
        .iter()
        .flatten()
        .filter(|stack| stack.is_similar(item))
        .map(|stack| stack.count)
        .sum()
}

/// Units of `item` that still fit: empty slots count a full stack, matching
/// slots count what is left below the stack limit
pub fn free_capacity(slots: &[Slot], item: &ItemDescriptor) -> u32 {
    let max_stack = item.max_stack();
    slots
        .iter()
        .map(|slot| match slot {
            None => max_stack,
            Some(stack) if stack.is_similar(item) => max_stack.saturating_sub(stack.count),
            Some(_) => 0,
        })
        .sum()
}

pub fn has_empty_slot(slots: &[Slot]) -> bool {
    slots.iter().any(|slot| slot.is_none())
}

/// First non-empty stack in slot order
pub fn first_item(slots: &[Slot]) -> Option<&ItemStack> {
    slots.iter().flatten().find(|stack| stack.count > 0)
}

/// Slot operations removing `amount` matching units, front to back.
/// `None` if the grid holds fewer than `amount`.
pub fn plan_removal(slots: &[Slot], item: &ItemDescriptor, amount: u32) -> Option<Vec<SlotOp>> {
    let mut remaining = amount;
    let mut ops = Vec::new();

    for (index, slot) in slots.iter().enumerate() {
        if remaining == 0 {
            break;
        }
        if let Some(stack) = slot {
            if stack.is_similar(item) {
                if stack.count <= remaining {
                    remaining -= stack.count;
                    ops.push(SlotOp::set(index, None));
                } else {
                    let left = ItemStack::new(stack.item.clone(), stack.count - remaining);
                    remaining = 0;
                    ops.push(SlotOp::set(index, Some(left)));
                }
            }
        }
    }

    (remaining == 0).then_some(ops)
}

/// Slot operations adding `amount` units: top up matching stacks first, then
/// fill empty slots. `None` if it does not all fit.
pub fn plan_insertion(slots: &[Slot], item: &ItemDescriptor, amount: u32) -> Option<Vec<SlotOp>> {
    let max_stack = item.max_stack();
    let mut remaining = amount;
    let mut ops = Vec::new();

    for (index, slot) in slots.iter().enumerate() {
        if remaining == 0 {
            break;
        }
        if let Some(stack) = slot {
            if stack.is_similar(item) && stack.count < max_stack {
                let add = remaining.min(max_stack - stack.count);
                remaining -= add;
                ops.push(SlotOp::set(index, Some(ItemStack::new(item.clone(), stack.count + add))));
            }
        }
    }

    for (index, slot) in slots.iter().enumerate() {
        if remaining == 0 {
            break;
        }
        if slot.is_none() {
            let add = remaining.min(max_stack);
            remaining -= add;
            ops.push(SlotOp::set(index, Some(ItemStack::new(item.clone(), add))));
        }
    }

    (remaining == 0).then_some(ops)
}

// ============================================================================
// Container Service
// ============================================================================

pub trait ContainerService: Send + Sync {
    /// Snapshot of a holder's slots, `None` if it does not exist
    fn read(&self, holder: &Holder) -> Option<Vec<Slot>>;

    /// Apply slot operations atomically. Returns the operations that undo
    /// them, in the order they must be applied.
    fn mutate(&self, holder: &Holder, ops: &[SlotOp]) -> Result<Vec<SlotOp>, ContainerError>;

    fn exists(&self, holder: &Holder) -> bool {
        self.read(holder).is_some()
    }

    fn count_matching(&self, holder: &Holder, item: &ItemDescriptor) -> u32 {
        self.read(holder).map_or(0, |slots| count_matching(&slots, item))
    }

    fn free_capacity(&self, holder: &Holder, item: &ItemDescriptor) -> u32 {
        self.read(holder).map_or(0, |slots| free_capacity(&slots, item))
    }

    fn has_empty_slot(&self, holder: &Holder) -> bool {
        self.read(holder).map_or(false, |slots| has_empty_slot(&slots))
    }
}

/// Slot grids kept in memory, keyed by holder
pub struct MemoryContainers {
    grids: DashMap<Holder, Vec<Slot>>,
}

impl MemoryContainers {
    pub fn new() -> Self {
        Self {
            grids: DashMap::new(),
        }
    }

    /// Create an empty grid unless one already exists
    pub fn place(&self, holder: Holder, size: usize) -> bool {
        let mut created = false;
        self.grids.entry(holder).or_insert_with(|| {
            created = true;
            vec![None; size]
        });
        created
    }

    pub fn remove(&self, holder: &Holder) -> bool {
        self.grids.remove(holder).is_some()
    }

    /// Put `count` units into the grid, returning what didn't fit
    pub fn fill(&self, holder: &Holder, item: &ItemDescriptor, count: u32) -> u32 {
        let Some(mut grid) = self.grids.get_mut(holder) else {
            return count;
        };
        let max_stack = item.max_stack();
        let mut remaining = count;
        for slot in grid.iter_mut() {
            if remaining == 0 {
                break;
            }
            match slot {
                Some(stack) if stack.is_similar(item) && stack.count < max_stack => {
                    let add = remaining.min(max_stack - stack.count);
                    stack.count += add;
                    remaining -= add;
                }
                None => {
                    let add = remaining.min(max_stack);
                    *slot = Some(ItemStack::new(item.clone(), add));
                    remaining -= add;
                }
                _ => {}
            }
        }
        remaining
    }

    pub fn set_slot(&self, holder: &Holder, index: usize, stack: Slot) -> bool {
        match self.grids.get_mut(holder) {
            Some(mut grid) if index < grid.len() => {
                grid[index] = stack;
                true
            }
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }
}

impl Default for MemoryContainers {
    fn default() -> Self {
        Self::new()
    }
}

impl ContainerService for MemoryContainers {
    fn read(&self, holder: &Holder) -> Option<Vec<Slot>> {
        self.grids.get(holder).map(|grid| grid.clone())
    }

    fn mutate(&self, holder: &Holder, ops: &[SlotOp]) -> Result<Vec<SlotOp>, ContainerError> {
        let mut grid = self
            .grids
            .get_mut(holder)
            .ok_or_else(|| ContainerError::Missing(holder.to_string()))?;

        if let Some(op) = ops.iter().find(|op| op.slot >= grid.len()) {
            return Err(ContainerError::SlotOutOfRange {
                holder: holder.to_string(),
                slot: op.slot,
            });
        }

        let mut undo = Vec::with_capacity(ops.len());
        for op in ops {
            let previous = std::mem::replace(&mut grid[op.slot], op.stack.clone());
            undo.push(SlotOp::set(op.slot, previous));
        }
        undo.reverse();
        Ok(undo)
    }
}
