use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::{net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tower_http::cors::CorsLayer;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use chest_shop::config::ShopConfig;
use chest_shop::container::{Holder, MemoryContainers, PLAYER_INVENTORY_SIZE};
use chest_shop::db::{Database, SqliteLedger, SqlitePendingCredits};
use chest_shop::economy::Economy;
use chest_shop::location::Position;
use chest_shop::protocol::{self, ClientMessage, ServerMessage};
use chest_shop::session::Sessions;
use chest_shop::shop::ShopStore;
use chest_shop::world;
use chest_shop::ShopSystem;

const CONFIG_PATH: &str = "config/shop.toml";

// ============================================================================
// App State
// ============================================================================

#[derive(Clone)]
struct AppState {
    system: Arc<ShopSystem>,
    containers: Arc<MemoryContainers>,
    ledger: Arc<SqliteLedger>,
    credits: Arc<SqlitePendingCredits>,
}

impl AppState {
    async fn new(config: ShopConfig) -> Result<Self, String> {
        let db = Arc::new(
            Database::new(&config.server.database_url)
                .await
                .map_err(|e| format!("Failed to initialize database: {}", e))?,
        );
        let ledger = Arc::new(
            SqliteLedger::open(db.clone(), config.economy.starting_balance)
                .await
                .map_err(|e| format!("Failed to load ledger: {}", e))?,
        );
        let credits = Arc::new(
            SqlitePendingCredits::open(db)
                .await
                .map_err(|e| format!("Failed to load pending credits: {}", e))?,
        );

        let containers = Arc::new(MemoryContainers::new());
        if let Err(e) = world::load_world(&PathBuf::from(&config.server.world_file), &containers) {
            error!("Failed to load world: {}", e);
        }

        let store = ShopStore::open(&config.storage.shops_file);
        let system = Arc::new(ShopSystem::new(
            config,
            Some(PathBuf::from(CONFIG_PATH)),
            store,
            Arc::new(Sessions::new()),
            containers.clone(),
            ledger.clone(),
            credits.clone(),
        ));
        if let Err(e) = system.start() {
            error!("Failed to load shops: {}", e);
        }

        Ok(Self {
            system,
            containers,
            ledger,
            credits,
        })
    }
}

// ============================================================================
// WebSocket
// ============================================================================

#[derive(Debug, Deserialize)]
struct ConnectParams {
    player: Uuid,
    name: String,
    #[serde(default = "default_world")]
    world: String,
    #[serde(default)]
    x: f64,
    #[serde(default = "default_y")]
    y: f64,
    #[serde(default)]
    z: f64,
}

fn default_world() -> String {
    "world".to_string()
}

fn default_y() -> f64 {
    64.0
}

async fn health_check() -> &'static str {
    "OK"
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<ConnectParams>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, params))
}

async fn handle_socket(socket: WebSocket, state: AppState, params: ConnectParams) {
    let (mut sender, mut receiver) = socket.split();
    let player_id = params.player;
    let system = state.system.clone();

    if system.sessions().is_online(player_id) {
        warn!("Rejecting second connection for {}", player_id);
        return;
    }

    let is_admin = system.config().server.admins.contains(&player_id);
    let mut outbound = system.sessions().connect(player_id, &params.name, is_admin);
    state
        .containers
        .place(Holder::Player(player_id), PLAYER_INVENTORY_SIZE);
    info!("Player {} ({}) connected", params.name, player_id);

    // Forward queued messages to the socket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = outbound.recv().await {
            match protocol::encode_server_message(&msg) {
                Ok(bytes) => {
                    if sender.send(Message::Binary(bytes)).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Failed to encode {}: {}", msg.msg_type(), e),
            }
        }
    });

    let spawn = Position::new(&params.world, params.x, params.y, params.z);
    system.on_join(player_id, spawn);
    system.sessions().send(
        player_id,
        ServerMessage::Balance {
            balance: state.ledger.balance(player_id),
        },
    );

    while let Some(Ok(msg)) = receiver.next().await {
        match msg {
            Message::Binary(data) => match protocol::decode_client_message(&data) {
                Ok(client_msg) => handle_client_message(&system, player_id, client_msg).await,
                Err(e) => debug!("Bad message from {}: {}", player_id, e),
            },
            Message::Close(_) => break,
            _ => {}
        }
    }

    system.on_leave(player_id);
    send_task.abort();
    info!("Player {} ({}) disconnected", params.name, player_id);
}

async fn handle_client_message(system: &ShopSystem, player_id: Uuid, msg: ClientMessage) {
    match msg {
        ClientMessage::Move { position } => system.on_move(player_id, position),
        ClientMessage::Command { text, target } => {
            if !system.handle_command(player_id, &text, target).await {
                system.sessions().notify(player_id, "Unknown command");
            }
        }
        ClientMessage::Click {
            location,
            button,
            sneaking,
        } => {
            let outcome = system.handle_click(player_id, &location, button, sneaking);
            debug!("Click by {} at {}: {:?}", player_id, location, outcome);
        }
        ClientMessage::Break { location } => {
            system.handle_break(player_id, &location);
        }
        ClientMessage::Complete { text } => {
            let suggestions = system.complete_command(player_id, &text);
            system
                .sessions()
                .send(player_id, ServerMessage::Completions { suggestions });
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("chest_shop=info".parse().unwrap())
                .add_directive("chest_shop_server=info".parse().unwrap()),
        )
        .init();

    let config = match ShopConfig::load(&PathBuf::from(CONFIG_PATH)) {
        Ok(config) => config,
        Err(e) => {
            error!("{}", e);
            return;
        }
    };
    let bind = config.server.bind.clone();
    let save_interval = Duration::from_secs(config.server.ledger_save_interval_secs.max(1));

    let state = match AppState::new(config).await {
        Ok(state) => state,
        Err(e) => {
            error!("{}", e);
            return;
        }
    };

    // Spawn ledger auto-save loop
    let save_state = state.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(save_interval);
        loop {
            interval.tick().await;
            match save_state.ledger.save_all().await {
                Ok(0) => {}
                Ok(saved) => debug!("Auto-saved {} ledger record(s)", saved),
                Err(e) => warn!("Ledger auto-save failed: {}", e),
            }
        }
    });

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/ws", get(ws_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods([axum::http::Method::GET, axum::http::Method::OPTIONS]),
        )
        .with_state(state.clone());

    let addr: SocketAddr = match bind.parse() {
        Ok(addr) => addr,
        Err(e) => {
            error!("Invalid bind address '{}': {}", bind, e);
            return;
        }
    };
    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", addr, e);
            return;
        }
    };
    info!("Shop server listening on http://{}", addr);

    let shutdown_state = state.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Shutdown requested");
    });
    if let Err(e) = server.await {
        error!("Server error: {}", e);
    }

    shutdown_state.system.shutdown().await;
    shutdown_state.credits.flush().await;
    match shutdown_state.ledger.save_all().await {
        Ok(saved) => info!("Saved {} ledger record(s)", saved),
        Err(e) => error!("Failed to save ledger on shutdown: {}", e),
    }
}
