//! Connected Observers
//!
//! Tracks who is online, where they stand and how to reach them. Every
//! connection owns a bounded outbound queue; sends never block the caller.

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::location::Position;
use crate::protocol::ServerMessage;

/// Outbound queue depth per connection
pub const OUTBOUND_QUEUE_SIZE: usize = 256;

struct Session {
    position: Option<Position>,
    is_admin: bool,
    sender: mpsc::Sender<ServerMessage>,
}

pub struct Sessions {
    online: DashMap<Uuid, Session>,
    /// Last known name of every identity seen this run, online or not
    names: DashMap<Uuid, String>,
}

impl Sessions {
    pub fn new() -> Self {
        Self {
            online: DashMap::new(),
            names: DashMap::new(),
        }
    }

    /// Register a connection and return the receiving end of its queue
    pub fn connect(&self, player: Uuid, name: &str, is_admin: bool) -> mpsc::Receiver<ServerMessage> {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_SIZE);
        self.online.insert(
            player,
            Session {
                position: None,
                is_admin,
                sender: tx,
            },
        );
        self.names.insert(player, name.to_string());
        debug!("Registered session for {} ({})", name, player);
        rx
    }

    pub fn disconnect(&self, player: Uuid) -> bool {
        let removed = self.online.remove(&player).is_some();
        if removed {
            debug!("Unregistered session for {}", player);
        }
        removed
    }

    pub fn is_online(&self, player: Uuid) -> bool {
        self.online.contains_key(&player)
    }

    /// Name of an identity, falling back to the raw id for strangers
    pub fn name_of(&self, player: Uuid) -> String {
        self.names
            .get(&player)
            .map(|name| name.clone())
            .unwrap_or_else(|| player.to_string())
    }

    /// Name of an identity seen this run
    pub fn known_name(&self, player: Uuid) -> Option<String> {
        self.names.get(&player).map(|name| name.clone())
    }

    pub fn position(&self, player: Uuid) -> Option<Position> {
        self.online.get(&player).and_then(|s| s.position.clone())
    }

    pub fn is_admin(&self, player: Uuid) -> bool {
        self.online.get(&player).map_or(false, |s| s.is_admin)
    }

    /// Record a new position. Returns true when the observer entered a new
    /// block (or had no position yet).
    pub fn update_position(&self, player: Uuid, position: Position) -> bool {
        let Some(mut session) = self.online.get_mut(&player) else {
            return false;
        };
        let moved = session
            .position
            .as_ref()
            .map_or(true, |old| old.block() != position.block());
        session.position = Some(position);
        moved
    }

    /// Every connected observer with its position, if known
    pub fn online(&self) -> Vec<(Uuid, Option<Position>)> {
        self.online
            .iter()
            .map(|entry| (*entry.key(), entry.position.clone()))
            .collect()
    }

    pub fn send(&self, player: Uuid, msg: ServerMessage) {
        // Clone the sender so no map guard is held while queueing
        let sender = self.online.get(&player).map(|s| s.sender.clone());
        match sender {
            Some(sender) => {
                if let Err(e) = sender.try_send(msg) {
                    warn!("Failed to send to {}: {}", player, e);
                }
            }
            None => debug!("No session registered for {}", player),
        }
    }

    /// Send a chat line
    pub fn notify(&self, player: Uuid, text: impl Into<String>) {
        self.send(player, ServerMessage::system(text));
    }
}

impl Default for Sessions {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connect_and_notify() {
        let sessions = Sessions::new();
        let player = Uuid::new_v4();
        let mut rx = sessions.connect(player, "Alice", false);

        assert!(sessions.is_online(player));
        assert_eq!(sessions.name_of(player), "Alice");

        sessions.notify(player, "hello");
        assert_eq!(rx.try_recv().unwrap(), ServerMessage::system("hello"));
    }

    #[test]
    fn test_name_survives_disconnect() {
        let sessions = Sessions::new();
        let player = Uuid::new_v4();
        let _rx = sessions.connect(player, "Bob", true);
        assert!(sessions.is_admin(player));

        assert!(sessions.disconnect(player));
        assert!(!sessions.is_online(player));
        assert!(!sessions.is_admin(player));
        assert_eq!(sessions.name_of(player), "Bob");
        assert_eq!(sessions.known_name(player).as_deref(), Some("Bob"));
        assert_eq!(sessions.known_name(Uuid::new_v4()), None);
        assert!(!sessions.disconnect(player));
    }

    #[test]
    fn test_update_position_reports_block_changes() {
        let sessions = Sessions::new();
        let player = Uuid::new_v4();
        let _rx = sessions.connect(player, "Carol", false);

        assert!(sessions.update_position(player, Position::new("world", 0.2, 64.0, 0.2)));
        assert!(!sessions.update_position(player, Position::new("world", 0.8, 64.0, 0.9)));
        assert!(sessions.update_position(player, Position::new("world", 1.1, 64.0, 0.9)));
        assert!(!sessions.update_position(Uuid::new_v4(), Position::new("world", 0.0, 0.0, 0.0)));
    }

    #[test]
    fn test_send_to_full_queue_does_not_block() {
        let sessions = Sessions::new();
        let player = Uuid::new_v4();
        let mut rx = sessions.connect(player, "Dave", false);

        for _ in 0..OUTBOUND_QUEUE_SIZE + 10 {
            sessions.notify(player, "spam");
        }
        let mut received = 0;
        while rx.try_recv().is_ok() {
            received += 1;
        }
        assert_eq!(received, OUTBOUND_QUEUE_SIZE);
    }
}
