use anyhow::Context;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex as StdMutex;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityRecord {
  pub id: String,
  pub last_name: String,
  pub last_address: String,
  pub admin_usid: Option<String>,
  pub admin: bool,
  pub banned: bool,
  pub whitelisted: bool,
  pub times_joined: u32,
  pub times_kicked: u32,
}

/// Narrow interface the admission pipeline consumes; the pipeline never
/// reaches past it into how records are kept or persisted.
pub trait AdminStore: Send + Sync {
  fn is_ip_banned(&self, addr: &str) -> bool;
  fn is_subnet_banned(&self, addr: &str) -> bool;
  fn is_id_banned(&self, uuid: &str) -> bool;
  fn is_whitelisted(&self, uuid: &str, usid: &str) -> bool;
  fn is_admin(&self, uuid: &str, usid: &str) -> bool;
  fn kick_time(&self, uuid: &str, addr: &str) -> i64;
  fn player_limit(&self) -> usize;
  fn is_strict(&self) -> bool;
  fn allows_custom_clients(&self) -> bool;
  fn has_record(&self, uuid: &str) -> bool;
  fn info(&self, uuid: &str) -> IdentityRecord;
  fn record_seen(&self, uuid: &str, usid: &str, name: &str);
  fn record_admin_baseline(&self, uuid: &str, usid: &str);
  fn update_player_joined(&self, uuid: &str, addr: &str, name: &str);
  fn save(&self) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct Registry {
  records: DashMap<String, IdentityRecord>,
  banned_ips: StdMutex<HashSet<String>>,
  banned_subnets: StdMutex<Vec<String>>,
  kick_times: DashMap<String, i64>,
  player_limit: AtomicUsize,
  strict: AtomicBool,
  allow_custom_clients: AtomicBool,
  whitelist_enabled: AtomicBool,
  path: Option<PathBuf>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RegistrySnapshot {
  records: Vec<IdentityRecord>,
  banned_ips: Vec<String>,
  banned_subnets: Vec<String>,
  player_limit: usize,
  strict: bool,
  allow_custom_clients: bool,
  whitelist_enabled: bool,
}

impl Registry {
  pub fn new() -> Self {
    Self {
      strict: AtomicBool::new(true),
      ..Self::default()
    }
  }

  pub fn load(path: &Path) -> anyhow::Result<Self> {
    let mut registry = Self::new();
    registry.path = Some(path.to_path_buf());
    if !path.exists() {
      return Ok(registry);
    }

    let raw = std::fs::read_to_string(path)
      .with_context(|| format!("failed to read registry at {}", path.display()))?;
    let snapshot: RegistrySnapshot =
      serde_json::from_str(&raw).context("failed to parse registry snapshot")?;

    for record in snapshot.records {
      registry.records.insert(record.id.clone(), record);
    }
    *registry.banned_ips.lock().unwrap() = snapshot.banned_ips.into_iter().collect();
    *registry.banned_subnets.lock().unwrap() = snapshot.banned_subnets;
    registry.player_limit.store(snapshot.player_limit, Ordering::Relaxed);
    registry.strict.store(snapshot.strict, Ordering::Relaxed);
    registry
      .allow_custom_clients
      .store(snapshot.allow_custom_clients, Ordering::Relaxed);
    registry
      .whitelist_enabled
      .store(snapshot.whitelist_enabled, Ordering::Relaxed);
    Ok(registry)
  }

  pub fn ban_id(&self, uuid: &str) {
    self.with_record(uuid, |record| record.banned = true);
  }

  pub fn unban_id(&self, uuid: &str) {
    self.with_record(uuid, |record| record.banned = false);
  }

  pub fn ban_ip(&self, addr: &str) {
    self.banned_ips.lock().unwrap().insert(addr.to_string());
  }

  pub fn ban_subnet(&self, prefix: &str) {
    let mut subnets = self.banned_subnets.lock().unwrap();
    if !subnets.iter().any(|s| s == prefix) {
      subnets.push(prefix.to_string());
    }
  }

  pub fn whitelist_add(&self, uuid: &str) {
    self.with_record(uuid, |record| record.whitelisted = true);
  }

  pub fn set_whitelist_enabled(&self, enabled: bool) {
    self.whitelist_enabled.store(enabled, Ordering::Relaxed);
  }

  pub fn set_player_limit(&self, limit: usize) {
    self.player_limit.store(limit, Ordering::Relaxed);
  }

  pub fn set_strict(&self, strict: bool) {
    self.strict.store(strict, Ordering::Relaxed);
  }

  pub fn set_allow_custom_clients(&self, allow: bool) {
    self.allow_custom_clients.store(allow, Ordering::Relaxed);
  }

  pub fn elevate(&self, uuid: &str, usid: &str) {
    self.with_record(uuid, |record| {
      record.admin = true;
      record.admin_usid = Some(usid.to_string());
    });
  }

  /// Records a kick against both the identity and the address so a rejoin
  /// from either is held back until `until`.
  pub fn register_kick(&self, uuid: &str, addr: &str, until: i64) {
    self.kick_times.insert(uuid.to_string(), until);
    self.kick_times.insert(addr.to_string(), until);
    self.with_record(uuid, |record| record.times_kicked += 1);
  }

  fn with_record(&self, uuid: &str, apply: impl FnOnce(&mut IdentityRecord)) {
    let mut entry = self
      .records
      .entry(uuid.to_string())
      .or_insert_with(|| IdentityRecord {
        id: uuid.to_string(),
        ..IdentityRecord::default()
      });
    apply(entry.value_mut());
  }
}

impl AdminStore for Registry {
  fn is_ip_banned(&self, addr: &str) -> bool {
    self.banned_ips.lock().unwrap().contains(addr)
  }

  fn is_subnet_banned(&self, addr: &str) -> bool {
    let subnets = self.banned_subnets.lock().unwrap();
    subnets.iter().any(|prefix| addr.starts_with(prefix.as_str()))
  }

  fn is_id_banned(&self, uuid: &str) -> bool {
    self.records.get(uuid).map(|r| r.banned).unwrap_or(false)
  }

  fn is_whitelisted(&self, uuid: &str, usid: &str) -> bool {
    if !self.whitelist_enabled.load(Ordering::Relaxed) {
      return true;
    }
    self
      .records
      .get(uuid)
      .map(|record| {
        record.whitelisted
          && record
            .admin_usid
            .as_deref()
            .map_or(true, |recorded| recorded == usid)
      })
      .unwrap_or(false)
  }

  fn is_admin(&self, uuid: &str, usid: &str) -> bool {
    self
      .records
      .get(uuid)
      .map(|record| record.admin && record.admin_usid.as_deref() == Some(usid))
      .unwrap_or(false)
  }

  fn kick_time(&self, uuid: &str, addr: &str) -> i64 {
    let by_id = self.kick_times.get(uuid).map(|v| *v).unwrap_or(0);
    let by_addr = self.kick_times.get(addr).map(|v| *v).unwrap_or(0);
    by_id.max(by_addr)
  }

  fn player_limit(&self) -> usize {
    self.player_limit.load(Ordering::Relaxed)
  }

  fn is_strict(&self) -> bool {
    self.strict.load(Ordering::Relaxed)
  }

  fn allows_custom_clients(&self) -> bool {
    self.allow_custom_clients.load(Ordering::Relaxed)
  }

  fn has_record(&self, uuid: &str) -> bool {
    self.records.contains_key(uuid)
  }

  fn info(&self, uuid: &str) -> IdentityRecord {
    self
      .records
      .entry(uuid.to_string())
      .or_insert_with(|| IdentityRecord {
        id: uuid.to_string(),
        ..IdentityRecord::default()
      })
      .clone()
  }

  fn record_seen(&self, uuid: &str, usid: &str, name: &str) {
    self.with_record(uuid, |record| {
      record.last_name = name.to_string();
      // Never disturb an admin's recorded token from an unauthenticated join.
      if !record.admin {
        record.admin_usid = Some(usid.to_string());
      }
    });
  }

  fn record_admin_baseline(&self, uuid: &str, usid: &str) {
    self.with_record(uuid, |record| {
      if record.admin_usid.is_none() {
        record.admin_usid = Some(usid.to_string());
      }
    });
  }

  fn update_player_joined(&self, uuid: &str, addr: &str, name: &str) {
    self.with_record(uuid, |record| {
      record.last_name = name.to_string();
      record.last_address = addr.to_string();
      record.times_joined += 1;
    });
  }

  fn save(&self) -> anyhow::Result<()> {
    let Some(path) = &self.path else { return Ok(()) };

    let mut records: Vec<IdentityRecord> =
      self.records.iter().map(|entry| entry.value().clone()).collect();
    records.sort_by(|a, b| a.id.cmp(&b.id));

    let snapshot = RegistrySnapshot {
      records,
      banned_ips: self.banned_ips.lock().unwrap().iter().cloned().collect(),
      banned_subnets: self.banned_subnets.lock().unwrap().clone(),
      player_limit: self.player_limit.load(Ordering::Relaxed),
      strict: self.strict.load(Ordering::Relaxed),
      allow_custom_clients: self.allow_custom_clients.load(Ordering::Relaxed),
      whitelist_enabled: self.whitelist_enabled.load(Ordering::Relaxed),
    };
    let raw = serde_json::to_string_pretty(&snapshot).context("failed to serialize registry")?;
    std::fs::write(path, raw)
      .with_context(|| format!("failed to write registry at {}", path.display()))?;
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn subnet_ban_matches_by_prefix() {
    let registry = Registry::new();
    registry.ban_subnet("10.0.");

    assert!(registry.is_subnet_banned("10.0.0.1"));
    assert!(registry.is_subnet_banned("10.0.14.2"));
    assert!(!registry.is_subnet_banned("10.10.0.1"));
    assert!(!registry.is_ip_banned("10.0.0.1"));
  }

  #[test]
  fn id_ban_round_trip() {
    let registry = Registry::new();
    assert!(!registry.is_id_banned("uuid-1"));
    registry.ban_id("uuid-1");
    assert!(registry.is_id_banned("uuid-1"));
    registry.unban_id("uuid-1");
    assert!(!registry.is_id_banned("uuid-1"));
  }

  #[test]
  fn whitelist_passes_everyone_when_disabled() {
    let registry = Registry::new();
    assert!(registry.is_whitelisted("unknown", "usid"));

    registry.set_whitelist_enabled(true);
    assert!(!registry.is_whitelisted("unknown", "usid"));

    registry.whitelist_add("uuid-1");
    assert!(registry.is_whitelisted("uuid-1", "usid"));
  }

  #[test]
  fn whitelist_requires_matching_recorded_token() {
    let registry = Registry::new();
    registry.set_whitelist_enabled(true);
    registry.whitelist_add("uuid-1");
    registry.record_seen("uuid-1", "usid-a", "Player");

    assert!(registry.is_whitelisted("uuid-1", "usid-a"));
    assert!(!registry.is_whitelisted("uuid-1", "usid-b"));
  }

  #[test]
  fn admin_requires_flag_and_token_match() {
    let registry = Registry::new();
    assert!(!registry.is_admin("uuid-1", "usid-a"));

    registry.elevate("uuid-1", "usid-a");
    assert!(registry.is_admin("uuid-1", "usid-a"));
    assert!(!registry.is_admin("uuid-1", "usid-b"));
  }

  #[test]
  fn join_updates_never_clear_admin_flag() {
    let registry = Registry::new();
    registry.elevate("uuid-1", "usid-a");

    registry.update_player_joined("uuid-1", "10.0.0.1", "NewName");
    registry.record_seen("uuid-1", "usid-evil", "NewName");

    assert!(registry.is_admin("uuid-1", "usid-a"));
    let record = registry.info("uuid-1");
    assert!(record.admin);
    assert_eq!(record.admin_usid.as_deref(), Some("usid-a"));
    assert_eq!(record.last_name, "NewName");
  }

  #[test]
  fn baseline_token_is_recorded_only_once() {
    let registry = Registry::new();
    registry.record_admin_baseline("uuid-1", "usid-a");
    registry.record_admin_baseline("uuid-1", "usid-b");

    let record = registry.info("uuid-1");
    assert_eq!(record.admin_usid.as_deref(), Some("usid-a"));
    assert!(!record.admin);
  }

  #[test]
  fn kick_time_takes_the_later_of_id_and_address() {
    let registry = Registry::new();
    assert_eq!(registry.kick_time("uuid-1", "10.0.0.1"), 0);

    registry.register_kick("uuid-1", "10.0.0.1", 5_000);
    registry.kick_times.insert("10.0.0.1".to_string(), 9_000);
    assert_eq!(registry.kick_time("uuid-1", "10.0.0.1"), 9_000);
    assert_eq!(registry.kick_time("uuid-1", "10.0.0.2"), 5_000);
  }

  #[test]
  fn info_creates_a_record_on_first_lookup() {
    let registry = Registry::new();
    assert!(!registry.has_record("uuid-1"));

    let record = registry.info("uuid-1");
    assert_eq!(record.id, "uuid-1");
    assert!(registry.has_record("uuid-1"));
  }

  #[test]
  fn snapshot_survives_save_and_load() {
    let path = std::env::temp_dir().join(format!("registry-{}.json", uuid::Uuid::new_v4()));

    let registry = Registry::load(&path).expect("load empty");
    registry.ban_id("uuid-1");
    registry.ban_ip("10.0.0.9");
    registry.ban_subnet("172.16.");
    registry.whitelist_add("uuid-2");
    registry.set_whitelist_enabled(true);
    registry.set_player_limit(16);
    registry.elevate("uuid-3", "usid-3");
    registry.save().expect("save");

    let reloaded = Registry::load(&path).expect("reload");
    assert!(reloaded.is_id_banned("uuid-1"));
    assert!(reloaded.is_ip_banned("10.0.0.9"));
    assert!(reloaded.is_subnet_banned("172.16.0.4"));
    assert!(reloaded.is_whitelisted("uuid-2", "any"));
    assert_eq!(reloaded.player_limit(), 16);
    assert!(reloaded.is_admin("uuid-3", "usid-3"));

    let _ = std::fs::remove_file(&path);
  }

  #[test]
  fn save_without_a_path_is_a_no_op() {
    let registry = Registry::new();
    registry.ban_id("uuid-1");
    registry.save().expect("save");
  }
}
