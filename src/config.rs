use crate::error::ServiceError;
use crate::types::*;
use chrono::{DateTime, Utc};
use std::{
  env,
  fs,
  net::SocketAddr,
  path::{Path, PathBuf},
};

pub fn repo_root() -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

pub fn resolve_repo_path(raw: &str) -> PathBuf {
  let path = PathBuf::from(raw);
  if path.is_absolute() {
    path
  } else {
    repo_root().join(path)
  }
}

pub fn config_path() -> PathBuf {
  if let Some(raw) = env_default("TOURNEY_CONFIG_PATH") {
    return PathBuf::from(raw);
  }
  repo_root().join("config.json")
}

pub fn env_default(key: &str) -> Option<String> {
  env::var(key)
    .ok()
    .map(|value| value.trim().to_string())
    .filter(|value| !value.is_empty())
}

pub fn env_flag_true_default(key: &str, default: bool) -> bool {
  match env::var(key) {
    Ok(value) => {
      let value = value.trim().to_ascii_lowercase();
      matches!(value.as_str(), "1" | "true" | "yes" | "on")
    }
    Err(_) => default,
  }
}

/// Fill `field` from the environment when it is blank or still the built-in
/// default; a blank field with no env value falls back to `builtin`.
fn env_or_builtin(field: &mut String, builtin: &str, key: &str) {
  let unset = field.trim().is_empty() || field.as_str() == builtin;
  if !unset {
    return;
  }
  match env_default(key) {
    Some(value) => *field = value,
    None if field.trim().is_empty() => *field = builtin.to_string(),
    None => {}
  }
}

pub fn apply_env_defaults(mut config: AppConfig) -> AppConfig {
  let builtin = AppConfig::default();
  env_or_builtin(&mut config.bind_addr, &builtin.bind_addr, "TOURNEY_BIND_ADDR");
  env_or_builtin(&mut config.data_dir, &builtin.data_dir, "TOURNEY_DATA_DIR");
  env_or_builtin(&mut config.log_dir, &builtin.log_dir, "TOURNEY_LOG_DIR");
  config.persist_stages = env_flag_true_default("TOURNEY_PERSIST_STAGES", config.persist_stages);
  config
}

pub fn load_config_from(path: &Path) -> Result<AppConfig, ServiceError> {
  if !path.is_file() {
    return Ok(apply_env_defaults(AppConfig::default()));
  }
  let data = fs::read_to_string(path)?;
  let config = serde_json::from_str::<AppConfig>(&data)?;
  Ok(apply_env_defaults(config))
}

pub fn load_config_inner() -> Result<AppConfig, ServiceError> {
  load_config_from(&config_path())
}

pub fn load_env_file() {
  let env_path = repo_root().join(".env");
  if !env_path.is_file() {
    return;
  }
  let contents = match fs::read_to_string(&env_path) {
    Ok(data) => data,
    Err(_) => return,
  };
  for line in contents.lines() {
    if let Some((key, value)) = parse_env_line(line) {
      if env::var_os(&key).is_none() {
        env::set_var(key, value);
      }
    }
  }
}

pub fn parse_env_line(line: &str) -> Option<(String, String)> {
  let trimmed = line.trim();
  if trimmed.is_empty() || trimmed.starts_with('#') {
    return None;
  }
  let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
  let (key, raw_value) = trimmed.split_once('=')?;
  let key = key.trim();
  if key.is_empty() {
    return None;
  }
  let mut value = raw_value.trim();
  if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
    value = &value[1..value.len() - 1];
  } else if value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2 {
    value = &value[1..value.len() - 1];
  } else if let Some(idx) = value.find('#') {
    value = value[..idx].trim_end();
  }
  Some((key.to_string(), value.to_string()))
}

pub fn now() -> DateTime<Utc> {
  Utc::now()
}

pub fn data_dir(config: &AppConfig) -> Option<PathBuf> {
  if !config.persist_stages {
    return None;
  }
  Some(resolve_repo_path(config.data_dir.trim()))
}

pub fn log_dir(config: &AppConfig) -> PathBuf {
  resolve_repo_path(config.log_dir.trim())
}

pub fn log_env_warnings(config: &AppConfig) {
  let mut warnings = Vec::new();

  if config.bind_addr.parse::<SocketAddr>().is_err() {
    warnings.push(format!(
      "bind address {:?} is not a socket address; falling back to {DEFAULT_BIND_ADDR}",
      config.bind_addr
    ));
  }
  match data_dir(config) {
    Some(dir) if !dir.is_dir() => {
      warnings.push(format!("stage directory {} does not exist yet; it will be created", dir.display()));
    }
    Some(_) => {}
    None => warnings.push("stage persistence is off; stages live in memory only".to_string()),
  }

  for msg in warnings {
    tracing::warn!("{}", msg);
  }
}
