//! Persisted tool configuration.
//!
//! Replaces the hard-coded host/user/image literals of a one-off deploy
//! script with a single JSON file resolved once at startup into an immutable
//! `Config` that both phases receive explicitly. Resolution order for the
//! file location: `--config` flag, `DOCKHAND_CONFIG`, then
//! `~/.config/dockhand/dockhand.json`.

use crate::error::{Error, Result};
use crate::paths;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV_VAR: &str = "DOCKHAND_CONFIG";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub image: ImageConfig,
    pub target: Target,
    pub build: BuildConfig,
    pub deploy: DeployConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ImageConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    pub repository: String,
    pub tag: String,
}

/// The deployment host. Host resolution beyond this (addresses, jump hosts,
/// agent keys) is delegated to the operator's SSH configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Target {
    pub host: String,
    pub user: String,
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identity_file: Option<String>,
}

impl Default for Target {
    fn default() -> Self {
        Self {
            host: String::new(),
            user: "root".to_string(),
            port: 22,
            identity_file: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BuildConfig {
    /// Local compile command, run in the context directory.
    pub command: String,
    /// Environment pairs for the compile step (cross-compilation target).
    pub env: BTreeMap<String, String>,
    /// Build context directory, also passed to `docker build`.
    pub context: String,
}

impl Default for BuildConfig {
    fn default() -> Self {
        let mut env = BTreeMap::new();
        env.insert("GOOS".to_string(), "linux".to_string());
        env.insert("GOARCH".to_string(), "amd64".to_string());

        Self {
            command: "go build".to_string(),
            env,
            context: ".".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeployConfig {
    /// Local compose file, uploaded verbatim (its schema belongs to the
    /// orchestration tool and is treated as opaque).
    pub compose_file: String,
    /// Remote directory the compose file is uploaded into and applied from.
    pub remote_dir: String,
    /// Container name whose logs are followed after apply.
    pub service: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            compose_file: "docker-compose.yml".to_string(),
            remote_dir: String::new(),
            service: String::new(),
        }
    }
}

impl Config {
    /// Check the keys both phases depend on. Defaults cover everything else.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("image.repository", &self.image.repository),
            ("image.tag", &self.image.tag),
            ("target.host", &self.target.host),
            ("target.user", &self.target.user),
            ("deploy.remoteDir", &self.deploy.remote_dir),
            ("deploy.service", &self.deploy.service),
        ];

        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(Error::config_missing_key(key, None));
            }
        }

        Ok(())
    }
}

/// Resolve the config file path: explicit override, env var, default.
pub fn config_path(path_override: Option<&str>) -> Result<PathBuf> {
    if let Some(path) = path_override {
        return Ok(PathBuf::from(shellexpand::tilde(path).to_string()));
    }

    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
        }
    }

    paths::dockhand_json()
}

/// Load and validate the configuration for a pipeline run.
pub fn load(path_override: Option<&str>) -> Result<Config> {
    let config = load_unchecked(path_override)?;
    config.validate()?;
    Ok(config)
}

/// Load the configuration without requiring the deployment keys to be set.
/// Used by `config show` so a half-filled file is still inspectable.
pub fn load_unchecked(path_override: Option<&str>) -> Result<Config> {
    let path = config_path(path_override)?;
    load_from(&path)
}

pub fn load_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Err(Error::config_not_found(path.display().to_string()));
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::internal_io(e.to_string(), Some("read config file".to_string())))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::config_invalid_json(path.display().to_string(), e))
}

pub fn save_to(path: &Path, config: &Config) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            Error::internal_io(e.to_string(), Some("create config directory".to_string()))
        })?;
    }

    let content = serde_json::to_string_pretty(config)
        .map_err(|e| Error::internal_json(e.to_string(), Some("serialize config".to_string())))?;

    std::fs::write(path, content)
        .map_err(|e| Error::internal_io(e.to_string(), Some("write config file".to_string())))
}

/// Shallow-merge a JSON spec into the stored config and return the updated
/// top-level keys. Nested objects are merged one level deep so
/// `{"image": {"tag": "2.0.0"}}` updates only the tag.
pub fn merge_json(path: &Path, json_spec: &str) -> Result<(Config, Vec<String>)> {
    let spec: Value = serde_json::from_str(json_spec)
        .map_err(|e| Error::config_invalid_json("<json spec>", e))?;

    let Value::Object(spec_map) = spec else {
        return Err(Error::validation_invalid_argument(
            "json",
            "Config spec must be a JSON object",
            Some(json_spec.to_string()),
        ));
    };

    let current = if path.exists() {
        load_from(path)?
    } else {
        Config::default()
    };

    let mut merged = serde_json::to_value(&current)
        .map_err(|e| Error::internal_json(e.to_string(), Some("serialize config".to_string())))?;

    let mut updated_keys: Vec<String> = Vec::new();
    if let Value::Object(ref mut base) = merged {
        for (key, value) in spec_map {
            match (base.get_mut(&key), &value) {
                (Some(Value::Object(existing)), Value::Object(incoming)) => {
                    for (sub_key, sub_value) in incoming {
                        existing.insert(sub_key.clone(), sub_value.clone());
                        updated_keys.push(format!("{}.{}", key, sub_key));
                    }
                }
                _ => {
                    base.insert(key.clone(), value);
                    updated_keys.push(key);
                }
            }
        }
    }

    let config: Config = serde_json::from_value(merged)
        .map_err(|e| Error::config_invalid_json("<merged config>", e))?;

    save_to(path, &config)?;
    Ok((config, updated_keys))
}
