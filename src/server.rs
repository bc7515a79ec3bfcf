use crate::admission::{self, factory, Rejection};
use crate::config::ServerConfig;
use crate::events::{self, ServerEvent};
use crate::player::ConnectionContext;
use crate::presence::{self, PresenceUpdate};
use crate::protocol::{self, JoinRequest};
use crate::registry::AdminStore;
use crate::roster::Roster;
use crate::shared::time::now_millis;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::Mutex;
use uuid::Uuid;

/// One lobby of connected clients. All admission and registration runs under
/// a single state lock, so the roster a check observes is the roster the
/// registration lands in.
pub struct GameServer {
  config: ServerConfig,
  store: Arc<dyn AdminStore>,
  state: Mutex<ServerState>,
  events: broadcast::Sender<ServerEvent>,
}

struct SessionEntry {
  sender: UnboundedSender<Vec<u8>>,
  context: ConnectionContext,
}

struct ServerState {
  sessions: HashMap<String, SessionEntry>,
  roster: Roster,
  write_buffer: Vec<u8>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum JsonClientMessage {
  #[serde(rename = "join")]
  Join {
    uuid: Option<String>,
    usid: Option<String>,
    name: Option<String>,
    locale: Option<String>,
    version: Option<i32>,
    #[serde(rename = "versionType")]
    version_type: Option<String>,
    mods: Option<Vec<String>>,
    mobile: Option<bool>,
    color: Option<u32>,
  },
}

impl GameServer {
  pub fn new(config: ServerConfig, store: Arc<dyn AdminStore>) -> Self {
    Self {
      config,
      store,
      state: Mutex::new(ServerState {
        sessions: HashMap::new(),
        roster: Roster::default(),
        write_buffer: Vec::new(),
      }),
      events: events::channel(),
    }
  }

  pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
    self.events.subscribe()
  }

  pub async fn player_count(&self) -> usize {
    self.state.lock().await.roster.count()
  }

  pub fn player_limit(&self) -> usize {
    self.store.player_limit()
  }

  pub fn is_strict(&self) -> bool {
    self.store.is_strict()
  }

  pub async fn add_session(&self, sender: UnboundedSender<Vec<u8>>, address: String) -> String {
    let session_id = Uuid::new_v4().to_string();
    let mut state = self.state.lock().await;
    state.sessions.insert(
      session_id.clone(),
      SessionEntry {
        sender,
        context: ConnectionContext::new(address),
      },
    );
    session_id
  }

  pub async fn remove_session(&self, session_id: &str) {
    let mut state = self.state.lock().await;
    let state = &mut *state;
    if state.sessions.remove(session_id).is_none() {
      return;
    }
    let Some(player) = state.roster.remove_by_session(session_id) else { return };
    state.broadcast(protocol::player_leave_payload(&player));
    tracing::info!(uuid = %player.uuid, name = %player.name, "player left");
    let _ = self.events.send(ServerEvent::PlayerDisconnected {
      uuid: player.uuid,
      name: player.name,
    });
    self.refresh_presence(state);
  }

  /// Returns false when the connection should be closed.
  pub async fn handle_text_message(&self, session_id: &str, text: &str) -> bool {
    let Ok(message) = serde_json::from_str::<JsonClientMessage>(text) else { return true };
    let JsonClientMessage::Join {
      uuid,
      usid,
      name,
      locale,
      version,
      version_type,
      mods,
      mobile,
      color,
    } = message;
    let request = JoinRequest {
      uuid,
      usid,
      name: name.unwrap_or_default(),
      locale,
      version: version.unwrap_or(-1),
      version_type,
      mods: mods.unwrap_or_default(),
      mobile: mobile.unwrap_or(false),
      color: color.unwrap_or(0xffffffff),
    };
    self.handle_join(session_id, request).await
  }

  /// Returns false when the connection should be closed.
  pub async fn handle_binary_message(&self, session_id: &str, data: &[u8]) -> bool {
    let Some(request) = protocol::decode_join(data) else {
      tracing::debug!(len = data.len(), "ignoring malformed frame");
      return true;
    };
    self.handle_join(session_id, request).await
  }

  async fn handle_join(&self, session_id: &str, request: JoinRequest) -> bool {
    let mut state = self.state.lock().await;
    let state = &mut *state;
    let Some(entry) = state.sessions.get_mut(session_id) else { return false };
    if entry.context.kicked {
      return false;
    }
    entry.context.connect_time = now_millis();

    let admitted = admission::admit(
      &self.config,
      self.store.as_ref(),
      &state.roster,
      &request,
      &mut entry.context,
    );
    let draft = match admitted {
      Ok(draft) => draft,
      Err(rejection) => {
        entry.context.kicked = true;
        match rejection {
          Rejection::Reason(reason) => {
            tracing::info!(address = %entry.context.address, reason = ?reason, "join rejected");
            let _ = entry.sender.send(protocol::kick_payload(reason));
          }
          Rejection::Message(text) => {
            tracing::info!(address = %entry.context.address, "join rejected with message");
            let _ = entry.sender.send(protocol::kick_message_payload(&text));
          }
          Rejection::Silent => {}
        }
        return false;
      }
    };

    let finalized = factory::finalize(
      &self.config,
      self.store.as_ref(),
      &mut state.roster,
      &mut state.write_buffer,
      draft,
      session_id,
    );
    let player = match finalized {
      Ok(player) => player,
      Err(rejection) => {
        entry.context.kicked = true;
        if let Rejection::Reason(reason) = rejection {
          let _ = entry.sender.send(protocol::kick_payload(reason));
        }
        return false;
      }
    };

    entry.context.player_id = Some(player.uuid.clone());
    let _ = entry
      .sender
      .send(protocol::welcome_payload(&player, &state.roster));
    state.broadcast_except(session_id, protocol::player_join_payload(&player));

    tracing::info!(
      uuid = %player.uuid,
      name = %player.name,
      team = player.team,
      admin = player.admin,
      "player joined"
    );
    let _ = self.events.send(ServerEvent::PlayerConnected {
      uuid: player.uuid.clone(),
      name: player.name.clone(),
    });
    self.refresh_presence(state);
    true
  }

  fn refresh_presence(&self, state: &ServerState) {
    presence::refresh(
      self.config.presence_webhook.clone(),
      PresenceUpdate {
        online: state.roster.count(),
        limit: self.store.player_limit(),
        players: state.roster.players().map(|p| p.name.clone()).collect(),
      },
    );
  }
}

impl ServerState {
  fn broadcast(&mut self, payload: Vec<u8>) {
    self.broadcast_except("", payload);
  }

  fn broadcast_except(&mut self, skip: &str, payload: Vec<u8>) {
    let mut stale = Vec::new();
    for (session_id, entry) in &self.sessions {
      if session_id == skip || entry.context.player_id.is_none() {
        continue;
      }
      if entry.sender.send(payload.clone()).is_err() {
        stale.push(session_id.clone());
      }
    }
    for session_id in stale {
      self.sessions.remove(&session_id);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::admission::handshake;
  use crate::protocol::{KickReason, TYPE_KICK, TYPE_PLAYER_JOIN, TYPE_PLAYER_LEAVE, TYPE_WELCOME};
  use crate::registry::Registry;
  use tokio::sync::mpsc::UnboundedReceiver;

  fn make_server() -> (Arc<GameServer>, Arc<Registry>) {
    let config = ServerConfig {
      version_build: 140,
      version_type: "official".to_string(),
      ..ServerConfig::default()
    };
    let registry = Arc::new(Registry::new());
    let server = Arc::new(GameServer::new(config, registry.clone()));
    (server, registry)
  }

  fn make_request(seed: u8, name: &str) -> JoinRequest {
    JoinRequest {
      uuid: Some(handshake::token_from_payload([seed; 8])),
      usid: Some(format!("usid-{seed}")),
      name: name.to_string(),
      locale: Some("en".to_string()),
      version: 140,
      version_type: Some("official".to_string()),
      mods: Vec::new(),
      mobile: false,
      color: 0xff0000ff,
    }
  }

  async fn connect(server: &GameServer, address: &str) -> (String, UnboundedReceiver<Vec<u8>>) {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    let session_id = server.add_session(tx, address.to_string()).await;
    (session_id, rx)
  }

  #[tokio::test]
  async fn binary_join_is_admitted_and_welcomed() {
    let (server, _) = make_server();
    let (session, mut rx) = connect(&server, "10.0.0.1").await;

    let data = protocol::encode_join(&make_request(1, "Player"));
    assert!(server.handle_binary_message(&session, &data).await);

    let frame = rx.try_recv().expect("welcome frame");
    assert_eq!(frame[1], TYPE_WELCOME);
    assert_eq!(server.player_count().await, 1);
  }

  #[tokio::test]
  async fn json_join_is_admitted() {
    let (server, _) = make_server();
    let (session, mut rx) = connect(&server, "10.0.0.1").await;

    let uuid = handshake::token_from_payload([9; 8]);
    let text = format!(
      r#"{{"type":"join","uuid":"{uuid}","usid":"usid-9","name":"Player","version":140,"versionType":"official","color":255}}"#
    );
    assert!(server.handle_text_message(&session, &text).await);

    let frame = rx.try_recv().expect("welcome frame");
    assert_eq!(frame[1], TYPE_WELCOME);
  }

  #[tokio::test]
  async fn duplicate_identity_is_kicked_and_told_why() {
    let (server, _) = make_server();
    let (first, _rx1) = connect(&server, "10.0.0.1").await;
    let data = protocol::encode_join(&make_request(1, "Player"));
    assert!(server.handle_binary_message(&first, &data).await);

    let (second, mut rx2) = connect(&server, "10.0.0.2").await;
    let data = protocol::encode_join(&make_request(1, "Other"));
    assert!(!server.handle_binary_message(&second, &data).await);

    let frame = rx2.try_recv().expect("kick frame");
    assert_eq!(frame[1], TYPE_KICK);
    assert_eq!(frame[4], KickReason::IdInUse.code());
    assert_eq!(server.player_count().await, 1);
  }

  #[tokio::test]
  async fn forged_token_is_kicked() {
    let (server, _) = make_server();
    let (session, mut rx) = connect(&server, "10.0.0.1").await;

    let mut request = make_request(1, "Player");
    request.uuid = Some("AAAAAAAAAAAAAAAAAAAAAA==".to_string());
    let data = protocol::encode_join(&request);
    assert!(!server.handle_binary_message(&session, &data).await);

    let frame = rx.try_recv().expect("kick frame");
    assert_eq!(frame[4], KickReason::ClientOutdated.code());
  }

  #[tokio::test]
  async fn banned_address_gets_no_reply_at_all() {
    let (server, registry) = make_server();
    registry.ban_ip("10.0.0.1");
    let (session, mut rx) = connect(&server, "10.0.0.1").await;

    let data = protocol::encode_join(&make_request(1, "Player"));
    assert!(!server.handle_binary_message(&session, &data).await);
    assert!(rx.try_recv().is_err());
  }

  #[tokio::test]
  async fn peers_see_joins_and_leaves() {
    let (server, _) = make_server();
    let (first, mut rx1) = connect(&server, "10.0.0.1").await;
    let data = protocol::encode_join(&make_request(1, "First"));
    assert!(server.handle_binary_message(&first, &data).await);

    let (second, _rx2) = connect(&server, "10.0.0.2").await;
    let data = protocol::encode_join(&make_request(2, "Second"));
    assert!(server.handle_binary_message(&second, &data).await);

    let _welcome = rx1.try_recv().expect("welcome frame");
    let join = rx1.try_recv().expect("join frame");
    assert_eq!(join[1], TYPE_PLAYER_JOIN);

    server.remove_session(&second).await;
    let leave = rx1.try_recv().expect("leave frame");
    assert_eq!(leave[1], TYPE_PLAYER_LEAVE);
    assert_eq!(server.player_count().await, 1);
  }

  #[tokio::test]
  async fn malformed_frames_keep_the_connection_open() {
    let (server, _) = make_server();
    let (session, mut rx) = connect(&server, "10.0.0.1").await;

    assert!(server.handle_binary_message(&session, &[0xff, 0x00]).await);
    assert!(server.handle_text_message(&session, "not json").await);
    assert!(rx.try_recv().is_err());
  }
}
