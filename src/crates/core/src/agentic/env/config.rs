//! Environment configuration.

use crate::agentic::env::action::ActionParser;
use crate::util::errors::{EnvError, EnvResult};
use serde::{de, Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_ENV_INSTRUCTION: &str = "You are solving the Sokoban puzzle. \
You are the player and you need to push all boxes to targets. \
When you are right next to a box, you can push it by moving in the same direction. \
You cannot push a box through a wall, and you cannot pull a box. \
The answer must be one of action in a turn, format is <answer>Right</answer>.";

fn default_max_steps() -> u32 {
    20
}

fn default_action_lookup() -> BTreeMap<u32, String> {
    BTreeMap::from([
        (1, "Up".to_string()),
        (2, "Down".to_string()),
        (3, "Left".to_string()),
        (4, "Right".to_string()),
    ])
}

/// Accepts integer keys (YAML) as well as numeric string keys (TOML, JSON).
fn deserialize_action_lookup<'de, D>(deserializer: D) -> Result<BTreeMap<u32, String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize, PartialEq, Eq, Hash)]
    #[serde(untagged)]
    enum ActionId {
        Num(u32),
        Text(String),
    }

    HashMap::<ActionId, String>::deserialize(deserializer)?
        .into_iter()
        .map(|(id, name)| {
            let id = match id {
                ActionId::Num(id) => id,
                ActionId::Text(text) => text.trim().parse().map_err(|_| {
                    <D::Error as de::Error>::custom(format!(
                        "action id must be an integer, got '{}'",
                        text
                    ))
                })?,
            };
            Ok((id, name))
        })
        .collect()
}

fn default_format_penalty() -> f64 {
    -0.1
}

fn default_action_pattern() -> String {
    "<answer>(.*?)</answer>".to_string()
}

fn default_special_token_list() -> Vec<String> {
    ["<think>", "</think>", "<answer>", "</answer>", "<|im_start|>", "<|im_end|>"]
        .into_iter()
        .map(str::to_string)
        .collect()
}

fn default_request_timeout_secs() -> u64 {
    180
}

fn default_client_name() -> String {
    "mcpgym".to_string()
}

fn default_client_version() -> String {
    crate::VERSION.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvConfig {
    /// MCP endpoint of the tool server.
    pub server_url: String,
    /// Episode length hint for the driving loop; not enforced by the environment.
    #[serde(default = "default_max_steps")]
    pub max_steps: u32,
    #[serde(
        default = "default_action_lookup",
        deserialize_with = "deserialize_action_lookup"
    )]
    pub action_lookup: BTreeMap<u32, String>,
    #[serde(default)]
    pub env_instruction: Option<String>,
    #[serde(default = "default_format_penalty")]
    pub format_penalty: f64,
    #[serde(default = "default_action_pattern")]
    pub action_pattern: String,
    #[serde(default = "default_special_token_list")]
    pub special_token_list: Vec<String>,
    /// Extra HTTP headers (e.g. `Authorization`) sent to the server.
    #[serde(default)]
    pub headers: HashMap<String, String>,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_client_name")]
    pub client_name: String,
    #[serde(default = "default_client_version")]
    pub client_version: String,
}

impl EnvConfig {
    pub fn new(server_url: impl Into<String>) -> Self {
        Self {
            server_url: server_url.into(),
            max_steps: default_max_steps(),
            action_lookup: default_action_lookup(),
            env_instruction: None,
            format_penalty: default_format_penalty(),
            action_pattern: default_action_pattern(),
            special_token_list: default_special_token_list(),
            headers: HashMap::new(),
            request_timeout_secs: default_request_timeout_secs(),
            client_name: default_client_name(),
            client_version: default_client_version(),
        }
    }

    /// Loads a config file; the format follows the extension (toml, yaml/yml, json).
    pub fn from_path(path: impl AsRef<Path>) -> EnvResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        let config: Self = match ext.as_str() {
            "toml" => toml::from_str(&raw)
                .map_err(|e| EnvError::config(format!("Invalid TOML in {}: {}", path.display(), e)))?,
            "yaml" | "yml" => serde_yaml::from_str(&raw)
                .map_err(|e| EnvError::config(format!("Invalid YAML in {}: {}", path.display(), e)))?,
            "json" => serde_json::from_str(&raw)
                .map_err(|e| EnvError::config(format!("Invalid JSON in {}: {}", path.display(), e)))?,
            other => {
                return Err(EnvError::config(format!(
                    "Unsupported config format '{}': {}",
                    other,
                    path.display()
                )))
            }
        };

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> EnvResult<()> {
        if self.server_url.trim().is_empty() {
            return Err(EnvError::config("server_url is required"));
        }
        if self.action_lookup.is_empty() {
            return Err(EnvError::config("action_lookup must not be empty"));
        }
        if !self.format_penalty.is_finite() {
            return Err(EnvError::config("format_penalty must be a finite number"));
        }
        ActionParser::new(&self.action_pattern, &self.action_lookup, &self.special_token_list)?;
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Action names in id order.
    pub fn action_names(&self) -> Vec<String> {
        self.action_lookup.values().cloned().collect()
    }

    /// Static task instructions followed by the available actions.
    pub fn instructions(&self) -> String {
        let base = self
            .env_instruction
            .as_deref()
            .unwrap_or(DEFAULT_ENV_INSTRUCTION);
        if self.action_lookup.is_empty() {
            return base.to_string();
        }
        format!(
            "{}\nYour available actions are:\n{}",
            base,
            self.action_names().join(", ")
        )
    }
}
