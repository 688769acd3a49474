//! Shop Container Interaction
//!
//! Decides what a click on a shop container does. Owners restock by
//! sneaking and otherwise see their shop's details; customers buy with the
//! primary button and sell with the secondary one.

use tracing::debug;
use uuid::Uuid;

use crate::command::{buyer_lines, info_lines};
use crate::error::ShopError;
use crate::location::BlockLocation;
use crate::system::ShopSystem;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickButton {
    Primary,
    Secondary,
}

/// Whether the host should still run its own handling of the click
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickOutcome {
    /// Not handled here; open or break the container as usual
    PassThrough,
    /// Handled; suppress the host's default behavior
    Cancelled,
}

pub fn handle_click(
    system: &ShopSystem,
    player: Uuid,
    location: &BlockLocation,
    button: ClickButton,
    sneaking: bool,
) -> ClickOutcome {
    let Some(shop) = system.registry().get_at_location(location) else {
        return ClickOutcome::PassThrough;
    };
    let sessions = system.sessions();
    let format = system.format();

    if shop.is_owned_by(player) {
        if sneaking {
            return ClickOutcome::PassThrough;
        }
        let mut lines = info_lines(&shop, &format);
        lines.push(format!("Use /shop toggle {} to open or close it", shop.name));
        lines.push("Sneak and click to restock".to_string());
        for line in lines {
            sessions.notify(player, line);
        }
        return ClickOutcome::Cancelled;
    }

    if sneaking && system.is_admin(player) {
        debug!("Admin {} opened shop {}", player, shop.id);
        return ClickOutcome::PassThrough;
    }

    if !shop.active {
        sessions.notify(player, ShopError::ShopInactive.to_string());
        return ClickOutcome::Cancelled;
    }

    if sneaking {
        let owner_name = sessions.known_name(shop.owner).unwrap_or_else(|| shop.owner_label());
        for line in buyer_lines(&shop, &owner_name, &format) {
            sessions.notify(player, line);
        }
        return ClickOutcome::Cancelled;
    }

    match button {
        ClickButton::Primary => {
            system.transactions().buy(player, &shop);
        }
        ClickButton::Secondary => {
            system.transactions().sell(player, &shop);
        }
    }
    ClickOutcome::Cancelled
}

/// Only the owner or an admin may break a shop container; doing so removes
/// the shop. Returns whether the break may proceed.
pub fn handle_break(system: &ShopSystem, player: Uuid, location: &BlockLocation) -> bool {
    let Some(shop) = system.registry().get_at_location(location) else {
        return true;
    };
    if !shop.is_owned_by(player) && !system.is_admin(player) {
        system
            .sessions()
            .notify(player, "You can't break someone else's shop!");
        return false;
    }
    system.registry().delete(&shop.id);
    system
        .sessions()
        .notify(player, format!("Shop {} removed", shop.name));
    true
}
