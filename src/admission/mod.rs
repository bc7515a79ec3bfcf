pub mod factory;
pub mod handshake;


use crate::config::ServerConfig;
use crate::player::ConnectionContext;
use crate::protocol::{JoinRequest, KickReason};
use crate::registry::AdminStore;
use crate::roster::Roster;
use crate::shared::names::sanitize_name;
use crate::shared::time::now_millis;

pub const RELAY_PREFIX: &str = "relay:";
pub const DEFAULT_LOCALE: &str = "en";

#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
  Reason(KickReason),
  Message(String),
  /// Address bans give no feedback at all, to discourage probing.
  Silent,
}

impl From<KickReason> for Rejection {
  fn from(reason: KickReason) -> Self {
    Rejection::Reason(reason)
  }
}

/// A player that passed every admission check but is not yet registered.
#[derive(Debug, Clone)]
pub struct PlayerDraft {
  pub uuid: String,
  pub usid: String,
  pub name: String,
  pub locale: String,
  pub color: u32,
  pub mobile: bool,
  pub mod_client: bool,
}

/// Runs the ordered admission checks for one join attempt. Each check
/// short-circuits; callers must hold the server state lock so the roster
/// observed here cannot change before registration.
pub fn admit(
  config: &ServerConfig,
  store: &dyn AdminStore,
  roster: &Roster,
  request: &JoinRequest,
  con: &mut ConnectionContext,
) -> Result<PlayerDraft, Rejection> {
  let mut uuid = request.uuid.clone();

  // Relay transports carry no native identity token; derive one from the
  // transport address instead.
  if let Some(tail) = con.address.strip_prefix(RELAY_PREFIX) {
    match handshake::synthesize_token(&config.relay_secret, tail) {
      Ok(token) => uuid = Some(token),
      Err(err) => {
        tracing::error!(error = %err, "failed to derive relay identity");
        return Err(KickReason::IdInUse.into());
      }
    }
  }

  if let Some(token) = uuid.as_deref() {
    if !handshake::verify_token(token) {
      return Err(KickReason::ClientOutdated.into());
    }
  }

  if store.is_ip_banned(&con.address) || store.is_subnet_banned(&con.address) {
    return Err(Rejection::Silent);
  }

  if con.has_begun_admission {
    return Err(KickReason::IdInUse.into());
  }
  con.has_begun_admission = true;
  con.mobile = request.mobile;

  let (Some(uuid), Some(usid)) = (uuid, request.usid.clone()) else {
    return Err(KickReason::IdInUse.into());
  };

  if store.is_id_banned(&uuid) {
    return Err(KickReason::Banned.into());
  }

  if now_millis() < store.kick_time(&uuid, &con.address) {
    return Err(KickReason::RecentKick.into());
  }

  let limit = store.player_limit();
  if limit > 0 && roster.count() >= limit && !store.is_admin(&uuid, &usid) {
    return Err(KickReason::PlayerLimit.into());
  }

  let missing = missing_mods(&config.required_mods, &request.mods);
  if !missing.is_empty() {
    let mut text = String::from("Incompatible mods!\n\nMissing:\n");
    for name in &missing {
      text.push_str("> ");
      text.push_str(name);
      text.push('\n');
    }
    return Err(Rejection::Message(text));
  }

  if !store.is_whitelisted(&uuid, &usid) {
    // Persist what we saw so an operator can approve the player by name.
    store.record_seen(&uuid, &usid, &request.name);
    if let Err(err) = store.save() {
      tracing::warn!(error = %err, "failed to persist registry");
    }
    tracing::info!(
      uuid = %uuid,
      name = %request.name,
      "player is not whitelisted; use whitelist-add to approve"
    );
    return Err(KickReason::Whitelist.into());
  }

  // One condition, two rejection reasons: a foreign channel tag is a type
  // mismatch, the server's own channel with a foreign build is a custom
  // client.
  let channel = request.version_type.as_deref();
  let channel_matches = channel == Some(config.version_type.as_str());
  if channel.is_none()
    || ((request.version == -1 || !channel_matches)
      && config.version_build != -1
      && !store.allows_custom_clients())
  {
    return Err(
      if !channel_matches {
        KickReason::TypeMismatch
      } else {
        KickReason::CustomClient
      }
      .into(),
    );
  }

  if config.headless && store.is_strict() {
    if roster.contains_name(&request.name) {
      return Err(KickReason::NameInUse.into());
    }
    if roster.contains_identity(&uuid, &usid) {
      return Err(KickReason::IdInUse.into());
    }
  }

  let name = sanitize_name(&request.name, config.max_name_length);
  if name.trim().is_empty() {
    return Err(KickReason::NameEmpty.into());
  }

  let locale = request
    .locale
    .clone()
    .unwrap_or_else(|| DEFAULT_LOCALE.to_string());

  if request.version != config.version_build
    && config.version_build != -1
    && request.version != -1
  {
    return Err(
      if request.version > config.version_build {
        KickReason::ServerOutdated
      } else {
        KickReason::ClientOutdated
      }
      .into(),
    );
  }

  store.update_player_joined(&uuid, &con.address, &name);

  Ok(PlayerDraft {
    uuid,
    usid,
    name,
    locale,
    color: request.color,
    mobile: request.mobile,
    mod_client: request.version == -1,
  })
}

fn missing_mods(required: &[String], declared: &[String]) -> Vec<String> {
  required
    .iter()
    .filter(|name| !declared.contains(name))
    .cloned()
    .collect()
}
