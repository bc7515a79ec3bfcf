use axum::{
  extract::ws::{Message, WebSocket},
  extract::{ConnectInfo, Query, State, WebSocketUpgrade},
  http::{Method, StatusCode},
  response::IntoResponse,
  routing::{get, post},
  Json, Router,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::cors::{Any, CorsLayer};
use tracing_subscriber::EnvFilter;

mod admission;
mod config;
mod events;
mod player;
mod presence;
mod protocol;
mod registry;
mod roster;
mod server;
mod shared;

use config::ServerConfig;
use events::ServerEvent;
use registry::{AdminStore, Registry};
use server::GameServer;

#[derive(Clone)]
struct AppState {
  server: Arc<GameServer>,
  registry: Arc<Registry>,
  admin_commands: bool,
}

#[derive(Debug, Serialize)]
struct OkResponse {
  ok: bool,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
  ok: bool,
  error: String,
}

#[derive(Debug, Serialize)]
struct StatusResponse {
  online: usize,
  limit: usize,
  strict: bool,
}

#[derive(Debug, Deserialize)]
struct BanQuery {
  uuid: Option<String>,
  ip: Option<String>,
  subnet: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WhitelistQuery {
  uuid: Option<String>,
  enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct SettingsQuery {
  limit: Option<usize>,
  strict: Option<bool>,
  #[serde(rename = "customClients")]
  custom_clients: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ElevateQuery {
  uuid: Option<String>,
  usid: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let config = ServerConfig::from_env();
  let registry = match &config.registry_path {
    Some(path) => Arc::new(Registry::load(path)?),
    None => Arc::new(Registry::new()),
  };

  let admin_commands = config.admin_commands;
  let port = config.port;
  let server = Arc::new(GameServer::new(config, registry.clone()));
  spawn_event_logger(&server);

  let state = Arc::new(AppState {
    server,
    registry,
    admin_commands,
  });

  let cors = CorsLayer::new()
    .allow_origin(Any)
    .allow_methods([Method::GET, Method::POST])
    .allow_headers(Any);

  let mut app: Router<Arc<AppState>> = Router::new()
    .route("/api/health", get(health))
    .route("/api/status", get(status))
    .route("/api/play", get(ws_handler))
    .layer(cors);

  if admin_commands {
    app = app
      .route("/api/admin/ban", post(admin_ban))
      .route("/api/admin/whitelist", post(admin_whitelist))
      .route("/api/admin/settings", post(admin_settings))
      .route("/api/admin/elevate", post(admin_elevate));
  }

  let app: Router = app.with_state(state);

  let address = format!("0.0.0.0:{port}");
  tracing::info!("listening on {address}");

  let listener = tokio::net::TcpListener::bind(&address).await?;
  axum::serve(
    listener,
    app.into_make_service_with_connect_info::<SocketAddr>(),
  )
  .await?;

  Ok(())
}

fn spawn_event_logger(server: &Arc<GameServer>) {
  let mut events = server.subscribe();
  tokio::spawn(async move {
    loop {
      match events.recv().await {
        Ok(ServerEvent::PlayerConnected { uuid, name }) => {
          tracing::info!(uuid = %uuid, name = %name, "connect event");
        }
        Ok(ServerEvent::PlayerDisconnected { uuid, name }) => {
          tracing::info!(uuid = %uuid, name = %name, "disconnect event");
        }
        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {}
      }
    }
  });
}

async fn health() -> impl IntoResponse {
  Json(OkResponse { ok: true })
}

async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
  Json(StatusResponse {
    online: state.server.player_count().await,
    limit: state.server.player_limit(),
    strict: state.server.is_strict(),
  })
}

async fn admin_ban(
  State(state): State<Arc<AppState>>,
  Query(params): Query<BanQuery>,
) -> impl IntoResponse {
  if !state.admin_commands {
    return admin_disabled();
  }
  if params.uuid.is_none() && params.ip.is_none() && params.subnet.is_none() {
    return bad_request("Nothing to ban");
  }

  if let Some(uuid) = &params.uuid {
    state.registry.ban_id(uuid);
  }
  if let Some(ip) = &params.ip {
    state.registry.ban_ip(ip);
  }
  if let Some(subnet) = &params.subnet {
    state.registry.ban_subnet(subnet);
  }
  persist_and_reply(&state)
}

async fn admin_whitelist(
  State(state): State<Arc<AppState>>,
  Query(params): Query<WhitelistQuery>,
) -> impl IntoResponse {
  if !state.admin_commands {
    return admin_disabled();
  }
  if params.uuid.is_none() && params.enabled.is_none() {
    return bad_request("Nothing to change");
  }

  if let Some(uuid) = &params.uuid {
    state.registry.whitelist_add(uuid);
  }
  if let Some(enabled) = params.enabled {
    state.registry.set_whitelist_enabled(enabled);
  }
  persist_and_reply(&state)
}

async fn admin_settings(
  State(state): State<Arc<AppState>>,
  Query(params): Query<SettingsQuery>,
) -> impl IntoResponse {
  if !state.admin_commands {
    return admin_disabled();
  }
  if params.limit.is_none() && params.strict.is_none() && params.custom_clients.is_none() {
    return bad_request("Nothing to change");
  }

  if let Some(limit) = params.limit {
    state.registry.set_player_limit(limit);
  }
  if let Some(strict) = params.strict {
    state.registry.set_strict(strict);
  }
  if let Some(allow) = params.custom_clients {
    state.registry.set_allow_custom_clients(allow);
  }
  persist_and_reply(&state)
}

async fn admin_elevate(
  State(state): State<Arc<AppState>>,
  Query(params): Query<ElevateQuery>,
) -> impl IntoResponse {
  if !state.admin_commands {
    return admin_disabled();
  }
  let (Some(uuid), Some(usid)) = (&params.uuid, &params.usid) else {
    return bad_request("Both uuid and usid are required");
  };

  state.registry.elevate(uuid, usid);
  persist_and_reply(&state)
}

fn persist_and_reply(state: &AppState) -> axum::response::Response {
  if let Err(err) = state.registry.save() {
    tracing::warn!(error = %err, "failed to persist registry");
  }
  Json(OkResponse { ok: true }).into_response()
}

fn admin_disabled() -> axum::response::Response {
  (
    StatusCode::FORBIDDEN,
    Json(ErrorResponse {
      ok: false,
      error: "Admin commands disabled".to_string(),
    }),
  )
    .into_response()
}

fn bad_request(message: &str) -> axum::response::Response {
  (
    StatusCode::BAD_REQUEST,
    Json(ErrorResponse {
      ok: false,
      error: message.to_string(),
    }),
  )
    .into_response()
}

async fn ws_handler(
  ws: WebSocketUpgrade,
  ConnectInfo(addr): ConnectInfo<SocketAddr>,
  State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
  let server = state.server.clone();
  ws.on_upgrade(move |socket| handle_socket(socket, server, addr.ip().to_string()))
}

async fn handle_socket(socket: WebSocket, server: Arc<GameServer>, address: String) {
  let (mut sender, mut receiver) = socket.split();
  let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
  let session_id = server.add_session(tx, address).await;

  let send_task = tokio::spawn(async move {
    while let Some(payload) = rx.recv().await {
      if sender.send(Message::Binary(payload)).await.is_err() {
        break;
      }
    }
  });

  while let Some(result) = receiver.next().await {
    let Ok(message) = result else { break };
    let keep_open = match message {
      Message::Binary(data) => server.handle_binary_message(&session_id, &data).await,
      Message::Text(text) => server.handle_text_message(&session_id, &text).await,
      Message::Close(_) => false,
      _ => true,
    };
    if !keep_open {
      break;
    }
  }

  server.remove_session(&session_id).await;
  send_task.abort();
}
