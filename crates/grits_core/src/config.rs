//! Deployment configuration for the GRITS search service.
//!
//! Values come from a key/value map so callers can merge a `KEY=VALUE`
//! file with the process environment before parsing.

use std::collections::HashMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub const DEFAULT_COLLECTION: &str = "healthmap";
pub const DEFAULT_FOLDER: &str = "allAlerts";
pub const DEFAULT_OWNER_LOGIN: &str = "grits";
pub const DEFAULT_BASE_GROUP: &str = "GRITS";
pub const DEFAULT_PRIVILEGED_GROUP: &str = "GRITSPriv";
pub const DEFAULT_RESPONSE_TIMEOUT_SECS: u64 = 86_400;

const CONFIG_PATH_KEY: &str = "GRITS_CONFIG_PATH";

/// How callers are mapped onto base/privileged access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Group memberships stored alongside the directory.
    Groups,
    /// Static API keys from configuration.
    ApiKeys,
}

/// Access tier attached to one API key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiKeyTier {
    Base,
    Privileged,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GritsConfig {
    pub collection: String,
    pub folder: String,
    pub owner_login: String,
    pub base_group: String,
    pub privileged_group: String,
    /// Execution ceiling for a single search.
    pub response_timeout: Duration,
    pub access_mode: AccessMode,
    pub api_keys: HashMap<String, ApiKeyTier>,
}

impl Default for GritsConfig {
    fn default() -> Self {
        Self {
            collection: DEFAULT_COLLECTION.to_string(),
            folder: DEFAULT_FOLDER.to_string(),
            owner_login: DEFAULT_OWNER_LOGIN.to_string(),
            base_group: DEFAULT_BASE_GROUP.to_string(),
            privileged_group: DEFAULT_PRIVILEGED_GROUP.to_string(),
            response_timeout: Duration::from_secs(DEFAULT_RESPONSE_TIMEOUT_SECS),
            access_mode: AccessMode::Groups,
            api_keys: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    pub code: &'static str,
    pub message: String,
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl Error for ConfigError {}

impl GritsConfig {
    /// Loads configuration from the environment, merged over the optional
    /// file named by `GRITS_CONFIG_PATH`.
    pub fn load() -> Result<Self, ConfigError> {
        let mut merged = HashMap::new();

        if let Ok(config_path) = std::env::var(CONFIG_PATH_KEY) {
            let config_path = config_path.trim();
            if !config_path.is_empty() {
                merged.extend(parse_env_file(config_path)?);
            }
        }

        merged.extend(std::env::vars());

        Self::from_kv(&merged)
    }

    pub fn from_kv(kv: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let response_timeout = match nonempty(kv, "GRITS_RESPONSE_TIMEOUT_SECS") {
            Some(raw) => {
                let secs = raw.parse::<u64>().map_err(|_| ConfigError {
                    code: "ERR_INVALID_TIMEOUT",
                    message: format!(
                        "GRITS_RESPONSE_TIMEOUT_SECS must be a positive integer, got `{raw}`"
                    ),
                })?;
                if secs == 0 {
                    return Err(ConfigError {
                        code: "ERR_INVALID_TIMEOUT",
                        message: "GRITS_RESPONSE_TIMEOUT_SECS must be greater than zero"
                            .to_string(),
                    });
                }
                Duration::from_secs(secs)
            }
            None => defaults.response_timeout,
        };

        let access_mode = parse_access_mode(nonempty(kv, "GRITS_ACCESS_MODE"))?;
        let api_keys = match nonempty(kv, "GRITS_API_KEYS") {
            Some(raw) => parse_api_keys(&raw)?,
            None => HashMap::new(),
        };
        if access_mode == AccessMode::ApiKeys && api_keys.is_empty() {
            return Err(ConfigError {
                code: "ERR_MISSING_API_KEYS",
                message: "GRITS_ACCESS_MODE=api_keys requires GRITS_API_KEYS".to_string(),
            });
        }

        Ok(Self {
            collection: nonempty(kv, "GRITS_COLLECTION").unwrap_or(defaults.collection),
            folder: nonempty(kv, "GRITS_FOLDER").unwrap_or(defaults.folder),
            owner_login: nonempty(kv, "GRITS_OWNER_LOGIN").unwrap_or(defaults.owner_login),
            base_group: nonempty(kv, "GRITS_GROUP").unwrap_or(defaults.base_group),
            privileged_group: nonempty(kv, "GRITS_PRIVILEGED_GROUP")
                .unwrap_or(defaults.privileged_group),
            response_timeout,
            access_mode,
            api_keys,
        })
    }
}

fn nonempty(kv: &HashMap<String, String>, key: &str) -> Option<String> {
    kv.get(key)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

fn parse_access_mode(value: Option<String>) -> Result<AccessMode, ConfigError> {
    match value.as_deref() {
        None | Some("groups") => Ok(AccessMode::Groups),
        Some("api_keys") | Some("api-keys") => Ok(AccessMode::ApiKeys),
        Some(other) => Err(ConfigError {
            code: "ERR_INVALID_ACCESS_MODE",
            message: format!("GRITS_ACCESS_MODE must be groups|api_keys, got `{other}`"),
        }),
    }
}

fn parse_api_keys(raw: &str) -> Result<HashMap<String, ApiKeyTier>, ConfigError> {
    let mut keys = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|entry| !entry.is_empty()) {
        let (key, tier) = entry.split_once(':').ok_or_else(|| ConfigError {
            code: "ERR_INVALID_API_KEYS",
            message: "GRITS_API_KEYS entries must be key:tier".to_string(),
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError {
                code: "ERR_INVALID_API_KEYS",
                message: "GRITS_API_KEYS contains an empty key".to_string(),
            });
        }
        let tier = match tier.trim() {
            "base" => ApiKeyTier::Base,
            "privileged" => ApiKeyTier::Privileged,
            other => {
                return Err(ConfigError {
                    code: "ERR_INVALID_API_KEYS",
                    message: format!("unknown api key tier `{other}` (expected base|privileged)"),
                })
            }
        };
        keys.insert(key.to_string(), tier);
    }
    Ok(keys)
}

fn parse_env_file(path: &str) -> Result<HashMap<String, String>, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|_| ConfigError {
        code: "ERR_CONFIG_FILE_READ",
        message: format!("failed to read config file at {path}"),
    })?;

    let mut kv = HashMap::new();
    for (idx, raw_line) in contents.lines().enumerate() {
        let line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = line.split_once('=').ok_or_else(|| ConfigError {
            code: "ERR_CONFIG_FILE_PARSE",
            message: format!("invalid config line {} (expected KEY=VALUE)", idx + 1),
        })?;

        let key = key.trim();
        if key.is_empty() {
            return Err(ConfigError {
                code: "ERR_CONFIG_FILE_PARSE",
                message: format!("invalid config line {} (empty key)", idx + 1),
            });
        }

        let value = value.trim().trim_matches('"');
        kv.insert(key.to_string(), value.to_string());
    }

    Ok(kv)
}
