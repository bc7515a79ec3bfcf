use crate::player::Player;
use crate::roster::Roster;

pub const VERSION: u8 = 1;

pub const TYPE_JOIN: u8 = 0x01;

pub const TYPE_WELCOME: u8 = 0x10;
pub const TYPE_KICK: u8 = 0x11;
pub const TYPE_PLAYER_JOIN: u8 = 0x12;
pub const TYPE_PLAYER_LEAVE: u8 = 0x13;

pub const FLAG_JOIN_UUID: u16 = 1 << 0;
pub const FLAG_JOIN_USID: u16 = 1 << 1;
pub const FLAG_JOIN_LOCALE: u16 = 1 << 2;
pub const FLAG_JOIN_VERSION_TYPE: u16 = 1 << 3;
pub const FLAG_JOIN_MOBILE: u16 = 1 << 4;

pub const FLAG_KICK_MESSAGE: u16 = 1 << 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KickReason {
  ClientOutdated = 0,
  ServerOutdated = 1,
  IdInUse = 2,
  Banned = 3,
  RecentKick = 4,
  PlayerLimit = 5,
  Whitelist = 6,
  TypeMismatch = 7,
  CustomClient = 8,
  NameInUse = 9,
  NameEmpty = 10,
}

impl KickReason {
  pub fn code(self) -> u8 {
    self as u8
  }
}

#[derive(Debug, Clone)]
pub struct JoinRequest {
  pub uuid: Option<String>,
  pub usid: Option<String>,
  pub name: String,
  pub locale: Option<String>,
  pub version: i32,
  pub version_type: Option<String>,
  pub mods: Vec<String>,
  pub mobile: bool,
  pub color: u32,
}

pub fn decode_join(data: &[u8]) -> Option<JoinRequest> {
  let mut reader = Reader::new(data);
  if reader.read_u8()? != VERSION {
    return None;
  }
  if reader.read_u8()? != TYPE_JOIN {
    return None;
  }
  let flags = reader.read_u16()?;

  let uuid = if flags & FLAG_JOIN_UUID != 0 {
    Some(reader.read_string()?)
  } else {
    None
  };
  let usid = if flags & FLAG_JOIN_USID != 0 {
    Some(reader.read_string()?)
  } else {
    None
  };
  let name = reader.read_string()?;
  let locale = if flags & FLAG_JOIN_LOCALE != 0 {
    Some(reader.read_string()?)
  } else {
    None
  };
  let version = reader.read_i32()?;
  let version_type = if flags & FLAG_JOIN_VERSION_TYPE != 0 {
    Some(reader.read_string()?)
  } else {
    None
  };
  let mod_count = reader.read_u8()?;
  let mut mods = Vec::with_capacity(mod_count as usize);
  for _ in 0..mod_count {
    mods.push(reader.read_string()?);
  }
  let color = reader.read_u32()?;

  Some(JoinRequest {
    uuid,
    usid,
    name,
    locale,
    version,
    version_type,
    mods,
    mobile: flags & FLAG_JOIN_MOBILE != 0,
    color,
  })
}

pub fn encode_join(request: &JoinRequest) -> Vec<u8> {
  let mut flags = 0;
  if request.uuid.is_some() {
    flags |= FLAG_JOIN_UUID;
  }
  if request.usid.is_some() {
    flags |= FLAG_JOIN_USID;
  }
  if request.locale.is_some() {
    flags |= FLAG_JOIN_LOCALE;
  }
  if request.version_type.is_some() {
    flags |= FLAG_JOIN_VERSION_TYPE;
  }
  if request.mobile {
    flags |= FLAG_JOIN_MOBILE;
  }

  let mut encoder = Encoder::with_capacity(128);
  encoder.write_header(TYPE_JOIN, flags);
  if let Some(uuid) = &request.uuid {
    encoder.write_string(uuid);
  }
  if let Some(usid) = &request.usid {
    encoder.write_string(usid);
  }
  encoder.write_string(&request.name);
  if let Some(locale) = &request.locale {
    encoder.write_string(locale);
  }
  encoder.write_i32(request.version);
  if let Some(version_type) = &request.version_type {
    encoder.write_string(version_type);
  }
  encoder.write_u8(request.mods.len().min(u8::MAX as usize) as u8);
  for name in request.mods.iter().take(u8::MAX as usize) {
    encoder.write_string(name);
  }
  encoder.write_u32(request.color);
  encoder.into_vec()
}

pub fn kick_payload(reason: KickReason) -> Vec<u8> {
  let mut encoder = Encoder::with_capacity(8);
  encoder.write_header(TYPE_KICK, 0);
  encoder.write_u8(reason.code());
  encoder.into_vec()
}

pub fn kick_message_payload(text: &str) -> Vec<u8> {
  let mut encoder = Encoder::with_capacity(8 + text.len());
  encoder.write_header(TYPE_KICK, FLAG_KICK_MESSAGE);
  encoder.write_text(text);
  encoder.into_vec()
}

pub fn welcome_payload(player: &Player, roster: &Roster) -> Vec<u8> {
  let mut capacity = 4 + 1 + player.uuid.len() + 1 + 2;
  for other in roster.players() {
    capacity += 1 + other.uuid.len() + 1 + other.name.len() + 4 + 2;
  }

  let mut encoder = Encoder::with_capacity(capacity);
  encoder.write_header(TYPE_WELCOME, 0);
  encoder.write_string(&player.uuid);
  encoder.write_u8(player.team);
  encoder.write_u16(roster.count().min(u16::MAX as usize) as u16);
  for other in roster.players() {
    encoder.write_string(&other.uuid);
    encoder.write_string(&other.name);
    encoder.write_u32(other.color);
    encoder.write_u8(other.team);
    encoder.write_u8(other.admin as u8);
  }
  encoder.into_vec()
}

pub fn player_join_payload(player: &Player) -> Vec<u8> {
  let mut encoder = Encoder::with_capacity(16 + player.uuid.len() + player.name.len());
  encoder.write_header(TYPE_PLAYER_JOIN, 0);
  encoder.write_string(&player.uuid);
  encoder.write_string(&player.name);
  encoder.write_u32(player.color);
  encoder.write_u8(player.team);
  encoder.write_u8(player.admin as u8);
  encoder.into_vec()
}

pub fn player_leave_payload(player: &Player) -> Vec<u8> {
  let mut encoder = Encoder::with_capacity(8 + player.uuid.len());
  encoder.write_header(TYPE_PLAYER_LEAVE, 0);
  encoder.write_string(&player.uuid);
  encoder.into_vec()
}

/// Serializes a player's full wire state. Doubles as the admission-time
/// validation pass, so every string write is the checked variant.
pub fn encode_player(encoder: &mut Encoder, player: &Player) -> anyhow::Result<()> {
  encoder.try_write_string(&player.uuid)?;
  encoder.try_write_string(&player.usid)?;
  encoder.try_write_string(&player.name)?;
  encoder.try_write_string(&player.locale)?;
  encoder.write_u32(player.color);
  encoder.write_u8(player.admin as u8);
  encoder.write_u8(player.team);
  encoder.write_u8((player.mobile as u8) | ((player.mod_client as u8) << 1));
  Ok(())
}

pub struct Encoder {
  buffer: Vec<u8>,
}

impl Encoder {
  pub fn with_capacity(capacity: usize) -> Self {
    Self {
      buffer: Vec::with_capacity(capacity),
    }
  }

  /// Reclaims an existing buffer, clearing any previous contents first.
  pub fn reuse(mut buffer: Vec<u8>) -> Self {
    buffer.clear();
    Self { buffer }
  }

  pub fn into_vec(self) -> Vec<u8> {
    self.buffer
  }

  pub fn write_header(&mut self, message_type: u8, flags: u16) {
    self.write_u8(VERSION);
    self.write_u8(message_type);
    self.write_u16(flags);
  }

  pub fn write_u8(&mut self, value: u8) {
    self.buffer.push(value);
  }

  pub fn write_u16(&mut self, value: u16) {
    self.buffer.extend_from_slice(&value.to_le_bytes());
  }

  pub fn write_i32(&mut self, value: i32) {
    self.buffer.extend_from_slice(&value.to_le_bytes());
  }

  pub fn write_u32(&mut self, value: u32) {
    self.buffer.extend_from_slice(&value.to_le_bytes());
  }

  pub fn write_string(&mut self, value: &str) {
    let bytes = value.as_bytes();
    let mut end = bytes.len().min(u8::MAX as usize);
    while !value.is_char_boundary(end) {
      end = end.saturating_sub(1);
    }
    self.write_u8(end as u8);
    self.buffer.extend_from_slice(&bytes[..end]);
  }

  pub fn try_write_string(&mut self, value: &str) -> anyhow::Result<()> {
    let bytes = value.as_bytes();
    if bytes.len() > u8::MAX as usize {
      anyhow::bail!("string field of {} bytes exceeds wire limit", bytes.len());
    }
    self.write_u8(bytes.len() as u8);
    self.buffer.extend_from_slice(bytes);
    Ok(())
  }

  pub fn write_text(&mut self, value: &str) {
    let bytes = value.as_bytes();
    let mut end = bytes.len().min(u16::MAX as usize);
    while !value.is_char_boundary(end) {
      end = end.saturating_sub(1);
    }
    self.write_u16(end as u16);
    self.buffer.extend_from_slice(&bytes[..end]);
  }
}

pub struct Reader<'a> {
  data: &'a [u8],
  offset: usize,
}

impl<'a> Reader<'a> {
  pub fn new(data: &'a [u8]) -> Self {
    Self { data, offset: 0 }
  }

  pub fn read_u8(&mut self) -> Option<u8> {
    let value = *self.data.get(self.offset)?;
    self.offset += 1;
    Some(value)
  }

  pub fn read_u16(&mut self) -> Option<u16> {
    let bytes = self.read_bytes::<2>()?;
    Some(u16::from_le_bytes(bytes))
  }

  pub fn read_i32(&mut self) -> Option<i32> {
    let bytes = self.read_bytes::<4>()?;
    Some(i32::from_le_bytes(bytes))
  }

  pub fn read_u32(&mut self) -> Option<u32> {
    let bytes = self.read_bytes::<4>()?;
    Some(u32::from_le_bytes(bytes))
  }

  pub fn read_string(&mut self) -> Option<String> {
    let len = self.read_u8()? as usize;
    if self.offset + len > self.data.len() {
      return None;
    }
    let slice = &self.data[self.offset..self.offset + len];
    self.offset += len;
    Some(String::from_utf8_lossy(slice).into_owned())
  }

  pub fn read_text(&mut self) -> Option<String> {
    let len = self.read_u16()? as usize;
    if self.offset + len > self.data.len() {
      return None;
    }
    let slice = &self.data[self.offset..self.offset + len];
    self.offset += len;
    Some(String::from_utf8_lossy(slice).into_owned())
  }

  fn read_bytes<const N: usize>(&mut self) -> Option<[u8; N]> {
    if self.offset + N > self.data.len() {
      return None;
    }
    let mut out = [0u8; N];
    out.copy_from_slice(&self.data[self.offset..self.offset + N]);
    self.offset += N;
    Some(out)
  }
}
