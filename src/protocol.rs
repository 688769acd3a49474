use uuid::Uuid;

use crate::interaction::ClickButton;
use crate::item::ItemStack;
use crate::location::{BlockLocation, Position};

pub type EntityId = i32;

// ============================================================================
// Entity Metadata
// ============================================================================

/// Metadata slot indices understood by observers
pub mod field {
    pub const FLAGS: u8 = 0;
    pub const CUSTOM_NAME: u8 = 2;
    pub const CUSTOM_NAME_VISIBLE: u8 = 3;
    pub const NO_GRAVITY: u8 = 5;
    pub const ITEM: u8 = 8;
    pub const LABEL_FLAGS: u8 = 15;

    pub const FLAG_INVISIBLE: u8 = 0x20;
    pub const LABEL_MARKER: u8 = 0x01;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    TextDisplay,
    ItemDisplay,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::TextDisplay => "text_display",
            EntityKind::ItemDisplay => "item_display",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MetadataValue {
    Byte(u8),
    Bool(bool),
    Text(Option<String>),
    Item(ItemStack),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetadataField {
    pub index: u8,
    pub value: MetadataValue,
}

impl MetadataField {
    pub fn new(index: u8, value: MetadataValue) -> Self {
        Self { index, value }
    }
}

// ============================================================================
// Client -> Server Messages
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Move {
        position: Position,
    },
    /// Slash command, with the container the player is looking at (if any)
    Command {
        text: String,
        target: Option<BlockLocation>,
    },
    Click {
        location: BlockLocation,
        button: ClickButton,
        sneaking: bool,
    },
    Break {
        location: BlockLocation,
    },
    /// Tab completion request for a partially typed command
    Complete {
        text: String,
    },
}

// ============================================================================
// Server -> Client Messages
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    SpawnEntity {
        entity_id: EntityId,
        correlation_id: Uuid,
        kind: EntityKind,
        position: Position,
    },
    EntityMetadata {
        entity_id: EntityId,
        fields: Vec<MetadataField>,
    },
    EntityLook {
        entity_id: EntityId,
        yaw: u8,
        pitch: u8,
        on_ground: bool,
    },
    DestroyEntities {
        entity_ids: Vec<EntityId>,
    },
    SystemMessage {
        text: String,
    },
    Balance {
        balance: f64,
    },
    Completions {
        suggestions: Vec<String>,
    },
}

impl ServerMessage {
    pub fn msg_type(&self) -> &'static str {
        match self {
            ServerMessage::SpawnEntity { .. } => "spawnEntity",
            ServerMessage::EntityMetadata { .. } => "entityMetadata",
            ServerMessage::EntityLook { .. } => "entityLook",
            ServerMessage::DestroyEntities { .. } => "destroyEntities",
            ServerMessage::SystemMessage { .. } => "systemMessage",
            ServerMessage::Balance { .. } => "balance",
            ServerMessage::Completions { .. } => "completions",
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        ServerMessage::SystemMessage { text: text.into() }
    }
}

/// Encode a server message into MessagePack: `[13, "msg_type", {data}]`
pub fn encode_server_message(msg: &ServerMessage) -> Result<Vec<u8>, String> {
    use rmpv::Value;

    fn key(name: &str) -> Value {
        Value::String(name.into())
    }

    fn position_value(position: &Position) -> Value {
        Value::Map(vec![
            (key("world"), Value::String(position.world.clone().into())),
            (key("x"), Value::F64(position.x)),
            (key("y"), Value::F64(position.y)),
            (key("z"), Value::F64(position.z)),
        ])
    }

    fn item_value(stack: &ItemStack) -> Value {
        let meta: Vec<(Value, Value)> = stack
            .item
            .meta
            .iter()
            .map(|(k, v)| (key(k), Value::String(v.clone().into())))
            .collect();
        Value::Map(vec![
            (key("material"), Value::String(stack.item.material.clone().into())),
            (key("count"), Value::Integer(stack.count.into())),
            (key("meta"), Value::Map(meta)),
        ])
    }

    let data = match msg {
        ServerMessage::SpawnEntity { entity_id, correlation_id, kind, position } => Value::Map(vec![
            (key("entityId"), Value::Integer((*entity_id).into())),
            (key("uuid"), Value::String(correlation_id.to_string().into())),
            (key("kind"), Value::String(kind.as_str().into())),
            (key("position"), position_value(position)),
        ]),
        ServerMessage::EntityMetadata { entity_id, fields } => {
            let field_values: Vec<Value> = fields
                .iter()
                .map(|f| {
                    let value = match &f.value {
                        MetadataValue::Byte(b) => Value::Integer((*b).into()),
                        MetadataValue::Bool(b) => Value::Boolean(*b),
                        MetadataValue::Text(Some(text)) => Value::String(text.clone().into()),
                        MetadataValue::Text(None) => Value::Nil,
                        MetadataValue::Item(stack) => item_value(stack),
                    };
                    Value::Array(vec![Value::Integer(f.index.into()), value])
                })
                .collect();
            Value::Map(vec![
                (key("entityId"), Value::Integer((*entity_id).into())),
                (key("fields"), Value::Array(field_values)),
            ])
        }
        ServerMessage::EntityLook { entity_id, yaw, pitch, on_ground } => Value::Map(vec![
            (key("entityId"), Value::Integer((*entity_id).into())),
            (key("yaw"), Value::Integer((*yaw).into())),
            (key("pitch"), Value::Integer((*pitch).into())),
            (key("onGround"), Value::Boolean(*on_ground)),
        ]),
        ServerMessage::DestroyEntities { entity_ids } => Value::Map(vec![(
            key("entityIds"),
            Value::Array(entity_ids.iter().map(|id| Value::Integer((*id).into())).collect()),
        )]),
        ServerMessage::SystemMessage { text } => {
            Value::Map(vec![(key("text"), Value::String(text.clone().into()))])
        }
        ServerMessage::Balance { balance } => Value::Map(vec![(key("balance"), Value::F64(*balance))]),
        ServerMessage::Completions { suggestions } => Value::Map(vec![(
            key("suggestions"),
            Value::Array(suggestions.iter().map(|s| Value::String(s.clone().into())).collect()),
        )]),
    };

    // Frame code 13 marks a data message
    let array = Value::Array(vec![
        Value::Integer(13.into()),
        Value::String(msg.msg_type().into()),
        data,
    ]);

    let mut buf = Vec::new();
    rmpv::encode::write_value(&mut buf, &array)
        .map_err(|e| format!("Failed to encode message: {}", e))?;

    Ok(buf)
}

/// Decode a client message from MessagePack format
/// Expected format: [13, "msg_type", {data}]
pub fn decode_client_message(data: &[u8]) -> Result<ClientMessage, String> {
    use rmpv::Value;
    use std::io::Cursor;

    let mut cursor = Cursor::new(data);
    let value = rmpv::decode::read_value(&mut cursor)
        .map_err(|e| format!("Failed to decode MessagePack: {}", e))?;

    let array = value.as_array().ok_or("Expected array")?;

    if array.len() < 2 {
        return Err("Array too short".to_string());
    }

    let protocol = array[0].as_u64().ok_or("Protocol code must be integer")?;
    if protocol != 13 {
        return Err(format!("Unexpected protocol code: {}", protocol));
    }

    let msg_type = array[1].as_str().ok_or("Message type must be string")?;

    let msg_data = if array.len() > 2 { &array[2] } else { &Value::Nil };

    match msg_type {
        "move" => {
            let world = extract_string(msg_data, "world").ok_or("move: missing world")?;
            let x = extract_f64(msg_data, "x").unwrap_or(0.0);
            let y = extract_f64(msg_data, "y").unwrap_or(0.0);
            let z = extract_f64(msg_data, "z").unwrap_or(0.0);
            Ok(ClientMessage::Move {
                position: Position::new(&world, x, y, z),
            })
        }
        "command" => {
            let text = extract_string(msg_data, "text").unwrap_or_default();
            let target = extract_value(msg_data, "target").and_then(extract_block);
            Ok(ClientMessage::Command { text, target })
        }
        "click" => {
            let location = extract_block(msg_data).ok_or("click: missing block location")?;
            let button = match extract_string(msg_data, "button").as_deref() {
                Some("secondary") | Some("right") => ClickButton::Secondary,
                _ => ClickButton::Primary,
            };
            let sneaking = extract_bool(msg_data, "sneaking").unwrap_or(false);
            Ok(ClientMessage::Click { location, button, sneaking })
        }
        "break" => {
            let location = extract_block(msg_data).ok_or("break: missing block location")?;
            Ok(ClientMessage::Break { location })
        }
        "complete" => {
            let text = extract_string(msg_data, "text").unwrap_or_default();
            Ok(ClientMessage::Complete { text })
        }
        _ => Err(format!("Unknown message type: {}", msg_type)),
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn extract_value<'a>(value: &'a rmpv::Value, key: &str) -> Option<&'a rmpv::Value> {
    value.as_map().and_then(|map| {
        map.iter()
            .find(|(k, _)| k.as_str() == Some(key))
            .map(|(_, v)| v)
    })
}

fn extract_string(value: &rmpv::Value, key: &str) -> Option<String> {
    extract_value(value, key).and_then(|v| v.as_str().map(|s| s.to_string()))
}

fn extract_bool(value: &rmpv::Value, key: &str) -> Option<bool> {
    extract_value(value, key).and_then(|v| v.as_bool())
}

fn extract_f64(value: &rmpv::Value, key: &str) -> Option<f64> {
    extract_value(value, key).and_then(|v| {
        v.as_f64()
            .or_else(|| v.as_i64().map(|i| i as f64))
            .or_else(|| v.as_u64().map(|u| u as f64))
    })
}

fn extract_i32(value: &rmpv::Value, key: &str) -> Option<i32> {
    extract_value(value, key).and_then(|v| {
        v.as_i64()
            .map(|i| i as i32)
            .or_else(|| v.as_u64().map(|u| u as i32))
    })
}

fn extract_block(value: &rmpv::Value) -> Option<BlockLocation> {
    Some(BlockLocation {
        world: extract_string(value, "world")?,
        x: extract_i32(value, "x")?,
        y: extract_i32(value, "y")?,
        z: extract_i32(value, "z")?,
    })
}
