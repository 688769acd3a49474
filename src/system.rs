//! Shop System
//!
//! Wires the registry, display and transaction engines to the host's
//! sessions, containers and ledger, and exposes the events the host feeds
//! in: joins, moves, leaves, commands and clicks.

use parking_lot::RwLock;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::command::{self, split_command};
use crate::config::{FormatSettings, ShopConfig};
use crate::container::ContainerService;
use crate::display::{spawn_rotation_task, DisplayEngine, EntityIdAllocator};
use crate::economy::{CreditBook, Economy};
use crate::error::Result;
use crate::interaction::{self, ClickButton, ClickOutcome};
use crate::location::{BlockLocation, Position};
use crate::session::Sessions;
use crate::shop::{ShopRegistry, ShopStore};
use crate::transaction::TransactionEngine;

pub struct ShopSystem {
    config: RwLock<ShopConfig>,
    /// Where `shop reload` re-reads configuration from
    config_path: Option<PathBuf>,
    sessions: Arc<Sessions>,
    containers: Arc<dyn ContainerService>,
    economy: Arc<dyn Economy>,
    registry: Arc<ShopRegistry>,
    displays: Arc<DisplayEngine>,
    transactions: Arc<TransactionEngine>,
}

impl ShopSystem {
    pub fn new(
        config: ShopConfig,
        config_path: Option<PathBuf>,
        store: ShopStore,
        sessions: Arc<Sessions>,
        containers: Arc<dyn ContainerService>,
        economy: Arc<dyn Economy>,
        credits: Arc<dyn CreditBook>,
    ) -> Self {
        let ids = Arc::new(EntityIdAllocator::new(config.display.entity_id_seed));
        let displays = Arc::new(DisplayEngine::new(
            ids,
            sessions.clone(),
            config.display.clone(),
            config.format.clone(),
        ));
        let registry = Arc::new(ShopRegistry::new(store, displays.clone()));
        let transactions = Arc::new(TransactionEngine::new(
            containers.clone(),
            economy.clone(),
            sessions.clone(),
            credits,
            config.format.clone(),
        ));

        Self {
            config: RwLock::new(config),
            config_path,
            sessions,
            containers,
            economy,
            registry,
            displays,
            transactions,
        }
    }

    /// Load persisted shops and start the rotation task
    pub fn start(&self) -> Result<usize> {
        let loaded = self.registry.load()?;
        spawn_rotation_task(self.displays.clone());
        info!("Shop system started with {} shops", loaded);
        Ok(loaded)
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn registry(&self) -> &Arc<ShopRegistry> {
        &self.registry
    }

    pub fn displays(&self) -> &Arc<DisplayEngine> {
        &self.displays
    }

    pub fn transactions(&self) -> &Arc<TransactionEngine> {
        &self.transactions
    }

    pub fn sessions(&self) -> &Arc<Sessions> {
        &self.sessions
    }

    pub fn containers(&self) -> &Arc<dyn ContainerService> {
        &self.containers
    }

    pub fn economy(&self) -> &Arc<dyn Economy> {
        &self.economy
    }

    pub fn format(&self) -> FormatSettings {
        self.config.read().format.clone()
    }

    pub fn config(&self) -> ShopConfig {
        self.config.read().clone()
    }

    pub fn is_admin(&self, player: Uuid) -> bool {
        self.sessions.is_admin(player) || self.config.read().server.admins.contains(&player)
    }

    // ========================================================================
    // Events
    // ========================================================================

    /// A connected player entered the world at `position`
    pub fn on_join(&self, player: Uuid, position: Position) {
        self.transactions.settle_pending(player);
        if let Some(name) = self.sessions.known_name(player) {
            self.registry.refresh_owner_name(player, &name);
        }
        self.on_move(player, position);
    }

    /// Re-sync nearby displays whenever the observer enters a new block
    pub fn on_move(&self, player: Uuid, position: Position) {
        if self.sessions.update_position(player, position) {
            self.displays.sync_observer(player, &self.registry.list_all());
        }
    }

    pub fn on_leave(&self, player: Uuid) {
        self.displays.forget_observer(player);
        self.sessions.disconnect(player);
    }

    /// Handle a chat command. Returns false if it was not a `/shop` command.
    pub async fn handle_command(&self, player: Uuid, text: &str, target: Option<BlockLocation>) -> bool {
        let Some(args) = split_command(text) else {
            return false;
        };

        let result = match command::parse(&args) {
            Ok(parsed) => command::execute(self, player, parsed, target).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(lines) => {
                for line in lines {
                    self.sessions.notify(player, line);
                }
            }
            Err(e) => {
                warn!("Command '{}' from {} failed: {}", text, player, e);
                self.sessions.notify(player, e.to_string());
            }
        }
        true
    }

    /// Suggestions for a partially typed `/shop` command
    pub fn complete_command(&self, player: Uuid, text: &str) -> Vec<String> {
        let Some(mut args) = split_command(text) else {
            return Vec::new();
        };
        // A trailing space starts a new, empty argument
        if text.ends_with(char::is_whitespace) {
            args.push("");
        }
        let names: Vec<String> = self
            .registry
            .list_by_owner(player)
            .into_iter()
            .map(|shop| shop.name)
            .collect();
        command::complete(&args, &names, self.is_admin(player))
    }

    pub fn handle_click(
        &self,
        player: Uuid,
        location: &BlockLocation,
        button: ClickButton,
        sneaking: bool,
    ) -> ClickOutcome {
        interaction::handle_click(self, player, location, button, sneaking)
    }

    pub fn handle_break(&self, player: Uuid, location: &BlockLocation) -> bool {
        interaction::handle_break(self, player, location)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Re-read configuration, apply display and format settings and reload
    /// every shop from disk
    pub async fn reload(&self) -> Result<usize> {
        if let Some(path) = &self.config_path {
            match ShopConfig::load(path) {
                Ok(config) => {
                    self.displays
                        .apply_settings(config.display.clone(), config.format.clone());
                    self.transactions.apply_format(config.format.clone());
                    *self.config.write() = config;
                }
                Err(e) => error!("Keeping current shop config: {}", e),
            }
        }
        let loaded = self.registry.reload().await?;
        info!("Reloaded {} shops", loaded);
        Ok(loaded)
    }

    /// Flush pending writes and tear down every display
    pub async fn shutdown(&self) {
        self.registry.flush().await;
        self.displays.clear();
        info!("Shop system stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::{Holder, MemoryContainers, CONTAINER_SIZE, PLAYER_INVENTORY_SIZE};
    use crate::economy::{MemoryLedger, PendingCredits};
    use crate::item::ItemDescriptor;
    use crate::protocol::ServerMessage;
    use tempfile::TempDir;
    use tokio::sync::mpsc;

    struct World {
        system: ShopSystem,
        containers: Arc<MemoryContainers>,
        ledger: Arc<MemoryLedger>,
        _dir: TempDir,
    }

    fn chest() -> BlockLocation {
        BlockLocation::new("world", 10, 64, -20)
    }

    fn world() -> World {
        let dir = TempDir::new().unwrap();
        let containers = Arc::new(MemoryContainers::new());
        let ledger = Arc::new(MemoryLedger::new(0.0));
        containers.place(Holder::Container(chest()), CONTAINER_SIZE);
        containers.fill(&Holder::Container(chest()), &ItemDescriptor::new("oak_log"), 100);

        let system = ShopSystem::new(
            ShopConfig::default(),
            None,
            ShopStore::open(dir.path().join("shops.toml")),
            Arc::new(Sessions::new()),
            containers.clone(),
            ledger.clone(),
            Arc::new(PendingCredits::new()),
        );
        World { system, containers, ledger, _dir: dir }
    }

    fn join(w: &World, name: &str) -> (Uuid, mpsc::Receiver<ServerMessage>) {
        let id = Uuid::new_v4();
        let rx = w.system.sessions().connect(id, name, false);
        w.containers.place(Holder::Player(id), PLAYER_INVENTORY_SIZE);
        (id, rx)
    }

    fn texts(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<String> {
        let mut texts = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            if let ServerMessage::SystemMessage { text } = msg {
                texts.push(text);
            }
        }
        texts
    }

    #[tokio::test]
    async fn test_create_via_command_and_buy_by_click() {
        let w = world();
        let (alice, mut alice_rx) = join(&w, "Alice");
        let (bob, mut bob_rx) = join(&w, "Bob");
        w.ledger.set_balance(bob, 15.0);

        assert!(w.system.handle_command(alice, "/shop create Wood 64 10", Some(chest())).await);
        assert_eq!(texts(&mut alice_rx), vec!["Shop created! Buy price: 10.00 Coins for 64x OAK_LOG"]);
        let shop = w.system.registry().get_at_location(&chest()).unwrap();
        assert_eq!(shop.item, ItemDescriptor::new("oak_log"));

        let outcome = w.system.handle_click(bob, &chest(), ClickButton::Primary, false);
        assert_eq!(outcome, ClickOutcome::Cancelled);
        assert_eq!(w.ledger.balance(bob), 5.0);
        assert_eq!(w.ledger.balance(alice), 10.0);
        assert_eq!(w.containers.count_matching(&Holder::Player(bob), &shop.item), 64);
        assert_eq!(texts(&mut bob_rx).len(), 1);

        // Second attempt: not enough money, nothing changes
        assert_eq!(w.system.handle_click(bob, &chest(), ClickButton::Primary, false), ClickOutcome::Cancelled);
        assert_eq!(w.ledger.balance(bob), 5.0);
        assert_eq!(w.containers.count_matching(&Holder::Container(chest()), &shop.item), 36);
    }

    #[tokio::test]
    async fn test_create_requires_target_and_stock() {
        let w = world();
        let (alice, mut alice_rx) = join(&w, "Alice");

        w.system.handle_command(alice, "/shop create Wood 64 10", None).await;
        assert_eq!(texts(&mut alice_rx), vec!["You must be looking at a chest!"]);

        w.system.handle_command(alice, "/shop create Wood 200 10", Some(chest())).await;
        assert_eq!(texts(&mut alice_rx), vec!["Not enough items in the chest! Required: 200"]);

        w.system.handle_command(alice, "/shop create Wood 64 10", Some(chest())).await;
        texts(&mut alice_rx);
        w.system.handle_command(alice, "/shop create wood 64 10", Some(chest())).await;
        assert_eq!(texts(&mut alice_rx), vec!["You already own a shop named wood"]);
        assert_eq!(w.system.registry().len(), 1);
    }

    #[tokio::test]
    async fn test_owner_commands() {
        let w = world();
        let (alice, mut alice_rx) = join(&w, "Alice");
        let (bob, mut bob_rx) = join(&w, "Bob");
        w.system.handle_command(alice, "/shop create Wood 64 10", Some(chest())).await;

        w.system.handle_command(alice, "/shop sell wood 4", None).await;
        w.system.handle_command(alice, "/shop toggle WOOD", None).await;
        let shop = w.system.registry().get_at_location(&chest()).unwrap();
        assert!(shop.sell_enabled);
        assert!(!shop.active);
        assert_eq!(shop.sell_price, 4.0);

        // Someone else can't touch it
        w.system.handle_command(bob, "/shop delete Wood", None).await;
        assert_eq!(texts(&mut bob_rx), vec!["Shop not found or you are not the owner!"]);
        w.system.handle_command(bob, "/shop reload", None).await;
        assert_eq!(texts(&mut bob_rx), vec!["You don't have permission to use this command!"]);

        texts(&mut alice_rx);
        w.system.handle_command(alice, "/shop list", None).await;
        assert_eq!(
            texts(&mut alice_rx),
            vec!["Your shops:", "- [Inactive] Wood: 64x OAK_LOG for 10.00 Coins"]
        );

        w.system.handle_command(alice, "/shop delete wood", None).await;
        assert!(w.system.registry().is_empty());
        assert!(!w.system.handle_command(alice, "/spawn", None).await);
    }

    #[tokio::test]
    async fn test_click_rules() {
        let w = world();
        let (alice, mut alice_rx) = join(&w, "Alice");
        let (bob, mut bob_rx) = join(&w, "Bob");
        w.system.handle_command(alice, "/shop create Wood 64 10", Some(chest())).await;
        texts(&mut alice_rx);

        // Owner sneaking restocks, owner clicking sees info
        assert_eq!(w.system.handle_click(alice, &chest(), ClickButton::Secondary, true), ClickOutcome::PassThrough);
        assert_eq!(w.system.handle_click(alice, &chest(), ClickButton::Secondary, false), ClickOutcome::Cancelled);
        assert_eq!(texts(&mut alice_rx)[0], "== Shop: Wood ==");

        // Customer sneaking sees buyer info and nothing is traded
        assert_eq!(w.system.handle_click(bob, &chest(), ClickButton::Primary, true), ClickOutcome::Cancelled);
        assert!(texts(&mut bob_rx).contains(&"Owner: Alice".to_string()));
        assert_eq!(w.containers.count_matching(&Holder::Container(chest()), &ItemDescriptor::new("oak_log")), 100);

        // Clicks elsewhere are not ours
        let elsewhere = BlockLocation::new("world", 0, 0, 0);
        assert_eq!(w.system.handle_click(bob, &elsewhere, ClickButton::Primary, false), ClickOutcome::PassThrough);

        // Inactive shop
        w.system.handle_command(alice, "/shop toggle wood", None).await;
        w.system.handle_click(bob, &chest(), ClickButton::Primary, false);
        assert_eq!(texts(&mut bob_rx), vec!["This shop is not active"]);
    }

    #[tokio::test]
    async fn test_admin_sneak_passes_through() {
        let w = world();
        let (alice, _alice_rx) = join(&w, "Alice");
        let admin = Uuid::new_v4();
        let _admin_rx = w.system.sessions().connect(admin, "Mod", true);
        w.system.handle_command(alice, "/shop create Wood 64 10", Some(chest())).await;

        assert_eq!(w.system.handle_click(admin, &chest(), ClickButton::Primary, true), ClickOutcome::PassThrough);
        assert_eq!(w.system.handle_click(admin, &chest(), ClickButton::Primary, false), ClickOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_break_protection() {
        let w = world();
        let (alice, _alice_rx) = join(&w, "Alice");
        let (bob, _bob_rx) = join(&w, "Bob");
        w.system.handle_command(alice, "/shop create Wood 64 10", Some(chest())).await;

        assert!(!w.system.handle_break(bob, &chest()));
        assert_eq!(w.system.registry().len(), 1);
        assert!(w.system.handle_break(alice, &chest()));
        assert!(w.system.registry().is_empty());
    }

    #[tokio::test]
    async fn test_moving_into_range_spawns_displays() {
        let w = world();
        let (alice, _alice_rx) = join(&w, "Alice");
        w.system.handle_command(alice, "/shop create Wood 64 10", Some(chest())).await;

        let (carol, mut carol_rx) = join(&w, "Carol");
        w.system.on_join(carol, Position::new("world", 500.0, 64.0, 0.0));
        assert!(carol_rx.try_recv().is_err());

        w.system.on_move(carol, Position::new("world", 12.0, 64.0, -20.0));
        let mut spawns = 0;
        while let Ok(msg) = carol_rx.try_recv() {
            if matches!(msg, ServerMessage::SpawnEntity { .. }) {
                spawns += 1;
            }
        }
        assert_eq!(spawns, 3);

        // Same block: no resend
        w.system.on_move(carol, Position::new("world", 12.5, 64.0, -20.0));
        assert!(carol_rx.try_recv().is_err());

        w.system.on_leave(carol);
        let shop_id = chest().key();
        assert!(!w.system.displays().viewers(&shop_id).contains(&carol));
    }

    #[tokio::test]
    async fn test_reload_keeps_shops() {
        let w = world();
        let (alice, _alice_rx) = join(&w, "Alice");
        w.system.handle_command(alice, "/shop create Wood 64 10", Some(chest())).await;
        let before = w.system.displays().entity_ids(&chest().key());

        assert_eq!(w.system.reload().await.unwrap(), 1);
        let after = w.system.displays().entity_ids(&chest().key());
        assert_eq!(w.system.displays().len(), 1);
        assert_ne!(before, after);
    }

    #[tokio::test]
    async fn test_owner_name_survives_restart() {
        use crate::display::LabelRole;

        let w = world();
        let (alice, _alice_rx) = join(&w, "Alice");
        w.system.handle_command(alice, "/shop create Wood 64 10", Some(chest())).await;
        w.system.shutdown().await;

        // Nobody has connected since the restart
        let restarted = ShopSystem::new(
            ShopConfig::default(),
            None,
            ShopStore::open(w._dir.path().join("shops.toml")),
            Arc::new(Sessions::new()),
            w.containers.clone(),
            w.ledger.clone(),
            Arc::new(PendingCredits::new()),
        );
        assert_eq!(restarted.start().unwrap(), 1);
        let shop_id = chest().key();
        assert_eq!(
            restarted.displays().label_text(&shop_id, LabelRole::Owner).as_deref(),
            Some("Shop of Alice")
        );

        // Owner returns under a new name
        let _rx = restarted.sessions().connect(alice, "Alicia", false);
        restarted.on_join(alice, Position::new("world", 500.0, 64.0, 0.0));
        assert_eq!(
            restarted.displays().label_text(&shop_id, LabelRole::Owner).as_deref(),
            Some("Shop of Alicia")
        );
        assert_eq!(restarted.registry().get(&shop_id).unwrap().owner_name, "Alicia");

        let ids = restarted.displays().entity_ids(&shop_id);
        assert_eq!(restarted.registry().refresh_owner_name(alice, "Alicia"), 0);
        assert_eq!(restarted.displays().entity_ids(&shop_id), ids);
        restarted.shutdown().await;
    }

    #[tokio::test]
    async fn test_complete_command() {
        let w = world();
        let (alice, _alice_rx) = join(&w, "Alice");
        w.system.handle_command(alice, "/shop create Wood 64 10", Some(chest())).await;

        assert_eq!(w.system.complete_command(alice, "/shop to"), vec!["toggle"]);
        assert_eq!(w.system.complete_command(alice, "/shop toggle "), vec!["Wood"]);
        assert!(w.system.complete_command(alice, "/warp ").is_empty());
    }
}
