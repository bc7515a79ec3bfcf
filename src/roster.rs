use crate::player::Player;
use std::collections::HashMap;

pub const TEAM_DEFAULT: u8 = 0;
pub const TEAM_ALPHA: u8 = 1;
pub const TEAM_BETA: u8 = 2;

/// The live player set, keyed by session so admission and disconnect always
/// address the same entry. Identity uniqueness is the pipeline's concern.
#[derive(Debug, Default)]
pub struct Roster {
  players: HashMap<String, Player>,
}

impl Roster {
  pub fn count(&self) -> usize {
    self.players.len()
  }

  pub fn contains_name(&self, name: &str) -> bool {
    let wanted = name.trim().to_lowercase();
    self
      .players
      .values()
      .any(|player| player.name.trim().to_lowercase() == wanted)
  }

  pub fn contains_identity(&self, uuid: &str, usid: &str) -> bool {
    self
      .players
      .values()
      .any(|player| player.uuid == uuid || player.usid == usid)
  }

  pub fn register(&mut self, player: Player) {
    self.players.insert(player.session_id.clone(), player);
  }

  pub fn remove_by_session(&mut self, session_id: &str) -> Option<Player> {
    self.players.remove(session_id)
  }

  pub fn players(&self) -> impl Iterator<Item = &Player> {
    self.players.values()
  }
}

pub fn assign_team(roster: &Roster, pvp: bool) -> u8 {
  if !pvp {
    return TEAM_DEFAULT;
  }
  let alpha = roster.players().filter(|p| p.team == TEAM_ALPHA).count();
  let beta = roster.players().filter(|p| p.team == TEAM_BETA).count();
  if alpha <= beta {
    TEAM_ALPHA
  } else {
    TEAM_BETA
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn make_player(session: &str, uuid: &str, usid: &str, name: &str, team: u8) -> Player {
    Player {
      uuid: uuid.to_string(),
      usid: usid.to_string(),
      name: name.to_string(),
      locale: "en".to_string(),
      color: 0xffffffff,
      admin: false,
      team,
      mobile: false,
      mod_client: false,
      session_id: session.to_string(),
    }
  }

  #[test]
  fn name_match_ignores_case_and_padding() {
    let mut roster = Roster::default();
    roster.register(make_player("s1", "u1", "x1", " Player ", 0));

    assert!(roster.contains_name("player"));
    assert!(roster.contains_name("  PLAYER"));
    assert!(!roster.contains_name("other"));
  }

  #[test]
  fn identity_match_covers_both_tokens() {
    let mut roster = Roster::default();
    roster.register(make_player("s1", "u1", "x1", "a", 0));

    assert!(roster.contains_identity("u1", "other"));
    assert!(roster.contains_identity("other", "x1"));
    assert!(!roster.contains_identity("u2", "x2"));
  }

  #[test]
  fn remove_by_session_returns_the_player() {
    let mut roster = Roster::default();
    roster.register(make_player("s1", "u1", "x1", "a", 0));

    let removed = roster.remove_by_session("s1").expect("player");
    assert_eq!(removed.uuid, "u1");
    assert_eq!(roster.count(), 0);
    assert!(roster.remove_by_session("s1").is_none());
  }

  #[test]
  fn team_assignment_balances_in_pvp() {
    let mut roster = Roster::default();
    assert_eq!(assign_team(&roster, false), TEAM_DEFAULT);
    assert_eq!(assign_team(&roster, true), TEAM_ALPHA);

    roster.register(make_player("s1", "u1", "x1", "a", TEAM_ALPHA));
    assert_eq!(assign_team(&roster, true), TEAM_BETA);

    roster.register(make_player("s2", "u2", "x2", "b", TEAM_BETA));
    assert_eq!(assign_team(&roster, true), TEAM_ALPHA);
  }
}
