#[derive(Debug, Clone)]
pub struct Player {
  pub uuid: String,
  pub usid: String,
  pub name: String,
  pub locale: String,
  pub color: u32,
  pub admin: bool,
  pub team: u8,
  pub mobile: bool,
  pub mod_client: bool,
  pub session_id: String,
}

#[derive(Debug)]
pub struct ConnectionContext {
  pub address: String,
  pub connect_time: i64,
  pub has_begun_admission: bool,
  pub kicked: bool,
  pub mobile: bool,
  pub player_id: Option<String>,
}

impl ConnectionContext {
  pub fn new(address: String) -> Self {
    Self {
      address,
      connect_time: 0,
      has_begun_admission: false,
      kicked: false,
      mobile: false,
      player_id: None,
    }
  }
}
