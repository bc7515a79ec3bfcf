use super::{PlayerDraft, Rejection};
use crate::config::ServerConfig;
use crate::player::Player;
use crate::protocol::{self, Encoder, KickReason};
use crate::registry::AdminStore;
use crate::roster::{self, Roster};
use crate::shared::color;

/// Turns an admitted draft into a registered player. Serializing the wire
/// state up front catches malformed entities before they can reach other
/// clients; the scratch buffer is reacquired and cleared per attempt.
pub fn finalize(
  config: &ServerConfig,
  store: &dyn AdminStore,
  roster: &mut Roster,
  write_buffer: &mut Vec<u8>,
  draft: PlayerDraft,
  session_id: &str,
) -> Result<Player, Rejection> {
  let admin = store.is_admin(&draft.uuid, &draft.usid);
  if !admin {
    // Remember the first secondary token seen so a later elevation can be
    // verified against it. Grants nothing by itself.
    store.record_admin_baseline(&draft.uuid, &draft.usid);
  }

  let player = Player {
    uuid: draft.uuid,
    usid: draft.usid,
    name: draft.name,
    locale: draft.locale,
    color: color::opaque(draft.color),
    admin,
    team: roster::assign_team(roster, config.pvp),
    mobile: draft.mobile,
    mod_client: draft.mod_client,
    session_id: session_id.to_string(),
  };

  let mut encoder = Encoder::reuse(std::mem::take(write_buffer));
  let encoded = protocol::encode_player(&mut encoder, &player);
  *write_buffer = encoder.into_vec();
  if let Err(err) = encoded {
    tracing::error!(error = %err, uuid = %player.uuid, "failed to serialize player state");
    return Err(KickReason::NameEmpty.into());
  }

  roster.register(player.clone());
  Ok(player)
}
