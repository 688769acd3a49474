use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::ids::EntityIdAllocator;
use crate::config::{DisplaySettings, FormatSettings, VisibilityPolicy};
use crate::item::ItemStack;
use crate::location::Position;
use crate::protocol::{field, EntityId, EntityKind, MetadataField, MetadataValue, ServerMessage};
use crate::session::Sessions;
use crate::shop::{Shop, ShopId};

// ============================================================================
// Display Sets
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelRole {
    Buy,
    Owner,
    Sell,
}

#[derive(Debug, Clone)]
struct Label {
    role: LabelRole,
    entity_id: EntityId,
    position: Position,
    text: String,
}

/// Every entity rendered for one shop
#[derive(Debug, Clone)]
struct DisplaySet {
    labels: Vec<Label>,
    item_entity: EntityId,
    item_position: Position,
    item: ItemStack,
    anchor: Position,
    /// Observers that were sent the spawn messages
    viewers: HashSet<Uuid>,
}

impl DisplaySet {
    fn entity_ids(&self) -> Vec<EntityId> {
        self.labels
            .iter()
            .map(|label| label.entity_id)
            .chain(std::iter::once(self.item_entity))
            .collect()
    }

    /// Spawn and metadata for every entity, labels first
    fn creation_messages(&self) -> Vec<ServerMessage> {
        let mut messages = Vec::with_capacity((self.labels.len() + 1) * 2);

        for label in &self.labels {
            messages.push(ServerMessage::SpawnEntity {
                entity_id: label.entity_id,
                correlation_id: Uuid::new_v4(),
                kind: EntityKind::TextDisplay,
                position: label.position.clone(),
            });
            messages.push(ServerMessage::EntityMetadata {
                entity_id: label.entity_id,
                fields: vec![
                    MetadataField::new(field::FLAGS, MetadataValue::Byte(field::FLAG_INVISIBLE)),
                    MetadataField::new(field::CUSTOM_NAME, MetadataValue::Text(Some(label.text.clone()))),
                    MetadataField::new(field::CUSTOM_NAME_VISIBLE, MetadataValue::Bool(true)),
                    MetadataField::new(field::NO_GRAVITY, MetadataValue::Bool(true)),
                    MetadataField::new(field::LABEL_FLAGS, MetadataValue::Byte(field::LABEL_MARKER)),
                ],
            });
        }

        messages.push(ServerMessage::SpawnEntity {
            entity_id: self.item_entity,
            correlation_id: Uuid::new_v4(),
            kind: EntityKind::ItemDisplay,
            position: self.item_position.clone(),
        });
        messages.push(ServerMessage::EntityMetadata {
            entity_id: self.item_entity,
            fields: vec![
                MetadataField::new(field::FLAGS, MetadataValue::Byte(field::FLAG_INVISIBLE)),
                MetadataField::new(field::NO_GRAVITY, MetadataValue::Bool(true)),
                MetadataField::new(field::ITEM, MetadataValue::Item(self.item.clone())),
            ],
        });

        messages
    }
}

/// Yaw in degrees packed into a protocol angle byte
pub fn yaw_byte(yaw: f32) -> u8 {
    (yaw * 256.0 / 360.0) as u8
}

// ============================================================================
// Display Engine
// ============================================================================

pub struct DisplayEngine {
    ids: Arc<EntityIdAllocator>,
    sets: DashMap<ShopId, DisplaySet>,
    /// Item entity id -> yaw in degrees, [0, 360)
    rotations: DashMap<EntityId, f32>,
    settings: RwLock<DisplaySettings>,
    format: RwLock<FormatSettings>,
    sessions: Arc<Sessions>,
    /// Wakes the rotation task when settings are swapped
    settings_changed: Notify,
}

impl DisplayEngine {
    pub fn new(
        ids: Arc<EntityIdAllocator>,
        sessions: Arc<Sessions>,
        settings: DisplaySettings,
        format: FormatSettings,
    ) -> Self {
        Self {
            ids,
            sets: DashMap::new(),
            rotations: DashMap::new(),
            settings: RwLock::new(settings),
            format: RwLock::new(format),
            sessions,
            settings_changed: Notify::new(),
        }
    }

    /// Swap in reloaded settings. Existing displays keep their layout until
    /// they are rebuilt.
    pub fn apply_settings(&self, settings: DisplaySettings, format: FormatSettings) {
        *self.settings.write() = settings;
        *self.format.write() = format;
        self.settings_changed.notify_waiters();
    }

    pub fn settings(&self) -> DisplaySettings {
        self.settings.read().clone()
    }

    /// Display name of a player seen this run
    pub fn known_name(&self, player: Uuid) -> Option<String> {
        self.sessions.known_name(player)
    }

    fn rotation_interval_ms(&self) -> u64 {
        self.settings.read().rotation_interval_ms.max(1)
    }

    /// Build the display set for `shop`, replacing any existing one
    pub fn create_display(&self, shop: &Shop) {
        self.remove_display(&shop.id);

        let settings = self.settings.read().clone();
        let format = self.format.read().clone();
        let owner_name = if shop.owner_name.is_empty() {
            self.sessions
                .known_name(shop.owner)
                .unwrap_or_else(|| shop.owner_label())
        } else {
            shop.owner_name.clone()
        };
        let location = &shop.location;

        let count = if shop.sell_enabled { 4 } else { 3 };
        let Some(ids) = (0..count).map(|_| self.ids.allocate()).collect::<Option<Vec<_>>>() else {
            error!("Entity ids exhausted, no display for shop {}", shop.id);
            return;
        };
        let (buy_id, owner_id, item_entity) = (ids[0], ids[1], ids[2]);

        let mut labels = vec![
            Label {
                role: LabelRole::Buy,
                entity_id: buy_id,
                position: location.center_at(settings.price_height),
                text: format.buy_text(shop.amount, shop.buy_price),
            },
            Label {
                role: LabelRole::Owner,
                entity_id: owner_id,
                position: location.center_at(settings.owner_height),
                text: format.owner_text(&owner_name),
            },
        ];
        if shop.sell_enabled {
            labels.push(Label {
                role: LabelRole::Sell,
                entity_id: ids[3],
                position: location.center_at(settings.sell_height),
                text: format.sell_text(shop.amount, shop.sell_price),
            });
        }

        let mut set = DisplaySet {
            labels,
            item_entity,
            item_position: location.center_at(settings.item_height),
            item: ItemStack::new(shop.item.clone(), 1),
            anchor: location.display_anchor(),
            viewers: HashSet::new(),
        };

        let audience = self.in_range(&set.anchor, &settings);
        let messages = set.creation_messages();
        for observer in &audience {
            for msg in &messages {
                self.sessions.send(*observer, msg.clone());
            }
        }
        set.viewers.extend(audience);

        debug!(
            "Created display for shop {} with entities {:?}",
            shop.id,
            set.entity_ids()
        );
        self.rotations.insert(item_entity, 0.0);
        if let Some(stale) = self.sets.insert(shop.id.clone(), set) {
            warn!("Display for shop {} was rebuilt concurrently, destroying the older one", shop.id);
            self.destroy(stale);
        }
    }

    /// Tear down and rebuild, unconditionally
    pub fn update_display(&self, shop: &Shop) {
        self.remove_display(&shop.id);
        self.create_display(shop);
    }

    /// Destroy every entity of the shop's display. False if it had none.
    pub fn remove_display(&self, shop_id: &str) -> bool {
        let Some((_, set)) = self.sets.remove(shop_id) else {
            return false;
        };
        self.destroy(set);
        debug!("Removed display for shop {}", shop_id);
        true
    }

    /// Advance every item preview by one step and broadcast the new yaw
    pub fn rotate_tick(&self) {
        let (step, visibility) = {
            let settings = self.settings.read();
            (settings.rotation_speed, settings.visibility)
        };

        let mut updates = Vec::with_capacity(self.sets.len());
        for set in self.sets.iter() {
            if let Some(mut yaw) = self.rotations.get_mut(&set.item_entity) {
                *yaw = (*yaw + step).rem_euclid(360.0);
                let viewers: Vec<Uuid> = match visibility {
                    VisibilityPolicy::Radius => set.viewers.iter().copied().collect(),
                    VisibilityPolicy::Global => Vec::new(),
                };
                updates.push((set.item_entity, *yaw, viewers));
            }
        }
        if updates.is_empty() {
            return;
        }

        let everyone = match visibility {
            VisibilityPolicy::Global => self.online_observers(),
            VisibilityPolicy::Radius => Vec::new(),
        };
        for (entity_id, yaw, viewers) in updates {
            let msg = ServerMessage::EntityLook {
                entity_id,
                yaw: yaw_byte(yaw),
                pitch: 0,
                on_ground: false,
            };
            let audience = if visibility == VisibilityPolicy::Global { &everyone } else { &viewers };
            for observer in audience {
                self.sessions.send(*observer, msg.clone());
            }
        }
    }

    /// Re-send the full creation protocol of every in-range display to one
    /// observer. Safe to repeat.
    pub fn sync_observer(&self, observer: Uuid, shops: &[Shop]) {
        let Some(position) = self.sessions.position(observer) else {
            return;
        };
        let view_distance = self.settings.read().view_distance;

        for shop in shops {
            let messages = {
                let Some(mut set) = self.sets.get_mut(&shop.id) else {
                    continue;
                };
                if !position.within(&set.anchor, view_distance) {
                    continue;
                }
                set.viewers.insert(observer);
                set.creation_messages()
            };
            for msg in messages {
                self.sessions.send(observer, msg);
            }
        }
    }

    /// Drop a disconnected observer from every viewer list
    pub fn forget_observer(&self, observer: Uuid) {
        for mut set in self.sets.iter_mut() {
            set.viewers.remove(&observer);
        }
    }

    /// Remove every display. Returns how many were removed.
    pub fn clear(&self) -> usize {
        let ids: Vec<ShopId> = self.sets.iter().map(|set| set.key().clone()).collect();
        let removed = ids.iter().filter(|id| self.remove_display(id)).count();
        self.rotations.clear();
        if removed > 0 {
            info!("Cleared {} shop displays", removed);
        }
        removed
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Entity ids of a shop's display, labels first and the item last
    pub fn entity_ids(&self, shop_id: &str) -> Vec<EntityId> {
        self.sets
            .get(shop_id)
            .map(|set| set.entity_ids())
            .unwrap_or_default()
    }

    pub fn label_text(&self, shop_id: &str, role: LabelRole) -> Option<String> {
        self.sets.get(shop_id).and_then(|set| {
            set.labels
                .iter()
                .find(|label| label.role == role)
                .map(|label| label.text.clone())
        })
    }

    pub fn yaw(&self, entity_id: EntityId) -> Option<f32> {
        self.rotations.get(&entity_id).map(|yaw| *yaw)
    }

    pub fn viewers(&self, shop_id: &str) -> Vec<Uuid> {
        self.sets
            .get(shop_id)
            .map(|set| set.viewers.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    /// Item previews currently being rotated
    pub fn rotating(&self) -> usize {
        self.rotations.len()
    }

    // ========================================================================
    // Helpers
    // ========================================================================

    fn in_range(&self, anchor: &Position, settings: &DisplaySettings) -> Vec<Uuid> {
        self.sessions
            .online()
            .into_iter()
            .filter(|(_, position)| match settings.visibility {
                VisibilityPolicy::Global => true,
                VisibilityPolicy::Radius => position
                    .as_ref()
                    .map_or(false, |p| p.within(anchor, settings.view_distance)),
            })
            .map(|(observer, _)| observer)
            .collect()
    }

    /// Stop rotating the set and tell its audience to drop every entity
    fn destroy(&self, set: DisplaySet) {
        self.rotations.remove(&set.item_entity);

        let audience = match self.settings.read().visibility {
            VisibilityPolicy::Radius => set.viewers.iter().copied().collect(),
            VisibilityPolicy::Global => self.online_observers(),
        };
        let entity_ids = set.entity_ids();
        for observer in audience {
            self.sessions.send(
                observer,
                ServerMessage::DestroyEntities {
                    entity_ids: entity_ids.clone(),
                },
            );
        }
    }

    fn online_observers(&self) -> Vec<Uuid> {
        self.sessions
            .online()
            .into_iter()
            .map(|(observer, _)| observer)
            .collect()
    }
}

/// Drive `rotate_tick` on a fixed interval. A slow tick delays the next one
/// instead of overlapping it. The interval follows reloaded settings.
pub fn spawn_rotation_task(engine: Arc<DisplayEngine>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut period_ms = engine.rotation_interval_ms();
        let mut interval = rotation_interval(period_ms);
        loop {
            tokio::select! {
                _ = interval.tick() => engine.rotate_tick(),
                _ = engine.settings_changed.notified() => {}
            }

            let current = engine.rotation_interval_ms();
            if current != period_ms {
                debug!("Rotation interval changed from {}ms to {}ms", period_ms, current);
                period_ms = current;
                interval = rotation_interval(period_ms);
            }
        }
    })
}

fn rotation_interval(period_ms: u64) -> Interval {
    let mut interval = tokio::time::interval(Duration::from_millis(period_ms));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    interval
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemDescriptor;
    use crate::location::BlockLocation;
    use tokio::sync::mpsc;

    fn engine_with(settings: DisplaySettings) -> (Arc<DisplayEngine>, Arc<Sessions>) {
        let sessions = Arc::new(Sessions::new());
        let engine = Arc::new(DisplayEngine::new(
            Arc::new(EntityIdAllocator::default()),
            sessions.clone(),
            settings,
            FormatSettings::default(),
        ));
        (engine, sessions)
    }

    fn wood_shop(owner: Uuid) -> Shop {
        Shop::new(
            "Wood",
            owner,
            BlockLocation::new("world", 10, 64, -20),
            ItemDescriptor::new("oak_log"),
            64,
            10.0,
        )
    }

    fn observer_at(sessions: &Sessions, name: &str, position: Position) -> (Uuid, mpsc::Receiver<ServerMessage>) {
        let id = Uuid::new_v4();
        let rx = sessions.connect(id, name, false);
        sessions.update_position(id, position);
        (id, rx)
    }

    fn drain(rx: &mut mpsc::Receiver<ServerMessage>) -> Vec<ServerMessage> {
        let mut messages = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            messages.push(msg);
        }
        messages
    }

    fn spawned_ids(messages: &[ServerMessage]) -> Vec<EntityId> {
        messages
            .iter()
            .filter_map(|msg| match msg {
                ServerMessage::SpawnEntity { entity_id, .. } => Some(*entity_id),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_create_display_layout() {
        let (engine, sessions) = engine_with(DisplaySettings::default());
        let owner = Uuid::new_v4();
        let _owner_rx = sessions.connect(owner, "Alice", false);
        let (_, mut near) = observer_at(&sessions, "near", Position::new("world", 12.0, 64.0, -18.0));

        let shop = wood_shop(owner);
        engine.create_display(&shop);

        assert_eq!(engine.entity_ids(&shop.id), vec![100_000, 100_001, 100_002]);
        assert_eq!(engine.yaw(100_002), Some(0.0));
        assert_eq!(engine.label_text(&shop.id, LabelRole::Buy).as_deref(), Some("Buy: 64x for 10.00 Coins"));
        assert_eq!(engine.label_text(&shop.id, LabelRole::Owner).as_deref(), Some("Shop of Alice"));
        assert_eq!(engine.label_text(&shop.id, LabelRole::Sell), None);

        let messages = drain(&mut near);
        assert_eq!(messages.len(), 6);
        assert_eq!(spawned_ids(&messages), vec![100_000, 100_001, 100_002]);
        match &messages[0] {
            ServerMessage::SpawnEntity { kind, position, .. } => {
                assert_eq!(*kind, EntityKind::TextDisplay);
                assert_eq!(*position, Position::new("world", 10.5, 64.5, -19.5));
            }
            other => panic!("unexpected message {:?}", other),
        }
        match &messages[5] {
            ServerMessage::EntityMetadata { fields, .. } => {
                let item = fields.iter().find(|f| f.index == field::ITEM).unwrap();
                assert_eq!(
                    item.value,
                    MetadataValue::Item(ItemStack::new(ItemDescriptor::new("oak_log"), 1))
                );
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_sell_label_only_when_enabled() {
        let (engine, _sessions) = engine_with(DisplaySettings::default());
        let mut shop = wood_shop(Uuid::new_v4());
        shop.sell_enabled = true;
        shop.sell_price = 4.0;
        engine.create_display(&shop);

        assert_eq!(engine.entity_ids(&shop.id).len(), 4);
        assert_eq!(engine.label_text(&shop.id, LabelRole::Sell).as_deref(), Some("Sell: 64x for 4.00 Coins"));
    }

    #[test]
    fn test_out_of_range_and_other_world_see_nothing() {
        let (engine, sessions) = engine_with(DisplaySettings::default());
        let (_, mut far) = observer_at(&sessions, "far", Position::new("world", 500.0, 64.0, 0.0));
        let (_, mut nether) = observer_at(&sessions, "nether", Position::new("nether", 10.0, 64.0, -20.0));

        engine.create_display(&wood_shop(Uuid::new_v4()));
        assert!(drain(&mut far).is_empty());
        assert!(drain(&mut nether).is_empty());
    }

    #[test]
    fn test_update_never_reuses_ids() {
        let (engine, sessions) = engine_with(DisplaySettings::default());
        let (_, mut near) = observer_at(&sessions, "near", Position::new("world", 10.0, 64.0, -20.0));
        let shop = wood_shop(Uuid::new_v4());

        engine.create_display(&shop);
        let first = engine.entity_ids(&shop.id);
        drain(&mut near);

        engine.update_display(&shop);
        let second = engine.entity_ids(&shop.id);
        assert!(first.iter().all(|id| !second.contains(id)));
        assert_eq!(engine.yaw(first[2]), None);

        let messages = drain(&mut near);
        assert_eq!(messages[0], ServerMessage::DestroyEntities { entity_ids: first });
        assert_eq!(spawned_ids(&messages), second);
    }

    #[test]
    fn test_remove_then_sync_emits_nothing() {
        let (engine, sessions) = engine_with(DisplaySettings::default());
        let (observer, mut near) = observer_at(&sessions, "near", Position::new("world", 10.0, 64.0, -20.0));
        let shop = wood_shop(Uuid::new_v4());

        engine.create_display(&shop);
        let ids = engine.entity_ids(&shop.id);
        drain(&mut near);

        assert!(engine.remove_display(&shop.id));
        assert_eq!(drain(&mut near), vec![ServerMessage::DestroyEntities { entity_ids: ids }]);
        assert!(!engine.remove_display(&shop.id));

        engine.sync_observer(observer, std::slice::from_ref(&shop));
        assert!(drain(&mut near).is_empty());
        assert!(engine.is_empty());
    }

    #[test]
    fn test_rotation_wraps() {
        let (engine, _sessions) = engine_with(DisplaySettings::default());
        let shop = wood_shop(Uuid::new_v4());
        engine.create_display(&shop);
        let item = engine.entity_ids(&shop.id)[2];

        for _ in 0..300 {
            engine.rotate_tick();
        }
        // 300 * 1.5 = 450 -> 90
        assert_eq!(engine.yaw(item), Some(90.0));
        assert_eq!(yaw_byte(90.0), 64);
    }

    #[test]
    fn test_radius_rotation_follows_viewers() {
        let (engine, sessions) = engine_with(DisplaySettings::default());
        let (_, mut viewer) = observer_at(&sessions, "viewer", Position::new("world", 10.0, 64.0, -20.0));
        let (late, mut late_rx) = observer_at(&sessions, "late", Position::new("world", 300.0, 64.0, 0.0));
        let shop = wood_shop(Uuid::new_v4());

        engine.create_display(&shop);
        drain(&mut viewer);
        engine.rotate_tick();

        let item = engine.entity_ids(&shop.id)[2];
        assert_eq!(
            drain(&mut viewer),
            vec![ServerMessage::EntityLook { entity_id: item, yaw: yaw_byte(1.5), pitch: 0, on_ground: false }]
        );
        assert!(drain(&mut late_rx).is_empty());

        // Walks up to the shop
        sessions.update_position(late, Position::new("world", 11.0, 64.0, -21.0));
        engine.sync_observer(late, std::slice::from_ref(&shop));
        assert_eq!(spawned_ids(&drain(&mut late_rx)).len(), 3);

        engine.rotate_tick();
        assert_eq!(drain(&mut late_rx).len(), 1);
    }

    #[test]
    fn test_sync_is_idempotent() {
        let (engine, sessions) = engine_with(DisplaySettings::default());
        let shop = wood_shop(Uuid::new_v4());
        engine.create_display(&shop);

        let (observer, mut rx) = observer_at(&sessions, "walker", Position::new("world", 10.0, 70.0, -20.0));
        engine.sync_observer(observer, std::slice::from_ref(&shop));
        let first = spawned_ids(&drain(&mut rx));
        engine.sync_observer(observer, std::slice::from_ref(&shop));
        let second = spawned_ids(&drain(&mut rx));

        assert_eq!(first, second);
        assert_eq!(engine.viewers(&shop.id), vec![observer]);
    }

    #[test]
    fn test_global_policy_reaches_everyone() {
        let settings = DisplaySettings {
            visibility: VisibilityPolicy::Global,
            ..DisplaySettings::default()
        };
        let (engine, sessions) = engine_with(settings);
        let (_, mut far) = observer_at(&sessions, "far", Position::new("nether", 0.0, 0.0, 0.0));
        let shop = wood_shop(Uuid::new_v4());

        engine.create_display(&shop);
        assert_eq!(drain(&mut far).len(), 6);
        engine.rotate_tick();
        assert_eq!(drain(&mut far).len(), 1);
        engine.remove_display(&shop.id);
        assert_eq!(drain(&mut far).len(), 1);
    }

    #[test]
    fn test_forget_observer_and_clear() {
        let (engine, sessions) = engine_with(DisplaySettings::default());
        let (observer, mut rx) = observer_at(&sessions, "near", Position::new("world", 10.0, 64.0, -20.0));
        let shop = wood_shop(Uuid::new_v4());
        engine.create_display(&shop);
        drain(&mut rx);

        engine.forget_observer(observer);
        assert!(engine.viewers(&shop.id).is_empty());

        assert_eq!(engine.clear(), 1);
        assert!(drain(&mut rx).is_empty());
        assert!(engine.is_empty());
    }

    #[test]
    fn test_owner_label_uses_stored_name() {
        let (engine, _sessions) = engine_with(DisplaySettings::default());
        // Owner has not connected since startup
        let mut shop = wood_shop(Uuid::new_v4());
        engine.create_display(&shop);
        assert_eq!(
            engine.label_text(&shop.id, LabelRole::Owner),
            Some(format!("Shop of {}", shop.owner))
        );

        shop.owner_name = "Alice".into();
        engine.update_display(&shop);
        assert_eq!(engine.label_text(&shop.id, LabelRole::Owner).as_deref(), Some("Shop of Alice"));
    }

    #[test]
    fn test_concurrent_rebuilds_leave_one_set() {
        let (engine, _sessions) = engine_with(DisplaySettings::default());
        let shop = wood_shop(Uuid::new_v4());

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let engine = engine.clone();
                let shop = shop.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        engine.update_display(&shop);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(engine.len(), 1);
        assert_eq!(engine.rotating(), 1);
        let item = engine.entity_ids(&shop.id)[2];
        assert_eq!(engine.yaw(item), Some(0.0));

        assert!(engine.remove_display(&shop.id));
        assert_eq!(engine.rotating(), 0);
    }

    #[test]
    fn test_exhausted_ids_skip_display() {
        let sessions = Arc::new(Sessions::new());
        let engine = DisplayEngine::new(
            Arc::new(EntityIdAllocator::new(i32::MAX - 2)),
            sessions,
            DisplaySettings::default(),
            FormatSettings::default(),
        );
        let shop = wood_shop(Uuid::new_v4());
        engine.create_display(&shop);
        assert!(engine.is_empty());
        assert_eq!(engine.rotating(), 0);
    }

    #[tokio::test]
    async fn test_rotation_interval_follows_reload() {
        let settings = DisplaySettings {
            rotation_interval_ms: 60_000,
            ..DisplaySettings::default()
        };
        let (engine, _sessions) = engine_with(settings.clone());
        let shop = wood_shop(Uuid::new_v4());
        engine.create_display(&shop);
        let item = engine.entity_ids(&shop.id)[2];

        let handle = spawn_rotation_task(engine.clone());
        tokio::time::sleep(Duration::from_millis(30)).await;
        // Only the immediate first tick so far
        assert_eq!(engine.yaw(item), Some(1.5));

        engine.apply_settings(
            DisplaySettings {
                rotation_interval_ms: 5,
                ..settings
            },
            FormatSettings::default(),
        );
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert!(engine.yaw(item).unwrap() > 3.0);
    }

    #[tokio::test]
    async fn test_rotation_task_ticks() {
        let settings = DisplaySettings {
            rotation_interval_ms: 5,
            ..DisplaySettings::default()
        };
        let (engine, _sessions) = engine_with(settings);
        let shop = wood_shop(Uuid::new_v4());
        engine.create_display(&shop);
        let item = engine.entity_ids(&shop.id)[2];

        let handle = spawn_rotation_task(engine.clone());
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.abort();

        assert!(engine.yaw(item).unwrap() > 0.0);
    }
}
