use rand::Rng;
use std::env;
use std::path::PathBuf;

pub const DEFAULT_MAX_NAME_LENGTH: usize = 40;

#[derive(Debug, Clone)]
pub struct ServerConfig {
  pub port: u16,
  pub version_build: i32,
  pub version_type: String,
  pub max_name_length: usize,
  pub required_mods: Vec<String>,
  pub headless: bool,
  pub pvp: bool,
  pub relay_secret: String,
  pub presence_webhook: Option<String>,
  pub registry_path: Option<PathBuf>,
  pub admin_commands: bool,
}

impl Default for ServerConfig {
  fn default() -> Self {
    Self {
      port: 8787,
      version_build: -1,
      version_type: "official".to_string(),
      max_name_length: DEFAULT_MAX_NAME_LENGTH,
      required_mods: Vec::new(),
      headless: true,
      pvp: false,
      relay_secret: "relay".to_string(),
      presence_webhook: None,
      registry_path: None,
      admin_commands: false,
    }
  }
}

impl ServerConfig {
  pub fn from_env() -> Self {
    let defaults = Self::default();
    Self {
      port: env::var("PORT")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(defaults.port),
      version_build: env::var("VERSION_BUILD")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(defaults.version_build),
      version_type: env::var("VERSION_TYPE").unwrap_or(defaults.version_type),
      max_name_length: env::var("MAX_NAME_LENGTH")
        .ok()
        .and_then(|value| value.parse().ok())
        .unwrap_or(defaults.max_name_length),
      required_mods: env::var("REQUIRED_MODS")
        .map(|value| {
          value
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(String::from)
            .collect()
        })
        .unwrap_or_default(),
      headless: env_flag("HEADLESS", defaults.headless),
      pvp: env_flag("PVP", defaults.pvp),
      relay_secret: env::var("RELAY_SECRET").unwrap_or_else(|_| generated_secret()),
      presence_webhook: env::var("PRESENCE_WEBHOOK").ok(),
      registry_path: env::var("REGISTRY_PATH").ok().map(PathBuf::from),
      admin_commands: env_flag("ENABLE_ADMIN_COMMANDS", defaults.admin_commands),
    }
  }
}

fn env_flag(name: &str, default: bool) -> bool {
  env::var(name)
    .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE"))
    .unwrap_or(default)
}

fn generated_secret() -> String {
  format!("{:032x}", rand::thread_rng().gen::<u128>())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn defaults_are_a_dev_build() {
    let config = ServerConfig::default();
    assert_eq!(config.version_build, -1);
    assert_eq!(config.max_name_length, DEFAULT_MAX_NAME_LENGTH);
    assert!(config.headless);
    assert!(!config.pvp);
  }

  #[test]
  fn generated_secret_is_hex_and_long_enough() {
    let secret = generated_secret();
    assert_eq!(secret.len(), 32);
    assert!(secret.chars().all(|c| c.is_ascii_hexdigit()));
  }
}
