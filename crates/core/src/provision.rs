//! Inputs for one pipeline run and their translation into the
//! configuration tool's parameter blob.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Secrets shorter than or equal to this many characters are not redacted;
/// masking them would leave nothing but the prefix.
pub const MIN_REDACTED_SECRET_LEN: usize = 3;

/// A messaging integration to configure on the machine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Integration kind, e.g. `telegram`, `discord`, `slack`.
    #[serde(rename = "type")]
    pub kind: String,
    /// Bot token, when the integration needs one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// Display name for the account.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Account id (the tool defaults to `default`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
}

/// Everything a pipeline run installs on the machine.
///
/// Persisted as JSON on the machine row so a reprovision can replay the
/// same inputs. Every field is optional; absent values are left out of the
/// parameter blob.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionInputs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ssh_public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anthropic_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gemini_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wayfinder_api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub channels: Vec<ChannelConfig>,
}

/// Treat empty strings the same as absent values.
fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.is_empty())
}

impl ProvisionInputs {
    /// Whether an access key will be installed; the playbook revokes the
    /// provider's default key once it has been.
    pub fn installs_access_key(&self) -> bool {
        present(&self.ssh_public_key).is_some()
    }

    /// Build the JSON parameter blob for the configuration tool.
    ///
    /// Returns `None` when no input is present so the caller can omit the
    /// argument entirely.
    pub fn extra_vars(&self) -> Option<Value> {
        let mut vars = Map::new();

        if let Some(key) = present(&self.ssh_public_key) {
            vars.insert("clawdbot_ssh_keys".into(), Value::from(vec![key]));
        }
        let api_keys = [
            ("anthropic_api_key", &self.anthropic_api_key),
            ("openai_api_key", &self.openai_api_key),
            ("gemini_api_key", &self.gemini_api_key),
            ("wayfinder_api_key", &self.wayfinder_api_key),
        ];
        for (name, value) in api_keys {
            if let Some(value) = present(value) {
                vars.insert(name.into(), Value::from(value));
            }
        }

        if !self.channels.is_empty() {
            let channels: Vec<Value> = self
                .channels
                .iter()
                .map(|ch| {
                    let mut m = Map::new();
                    m.insert("type".into(), Value::from(ch.kind.as_str()));
                    for (name, value) in [
                        ("token", &ch.token),
                        ("name", &ch.name),
                        ("account", &ch.account),
                    ] {
                        if let Some(value) = present(value) {
                            m.insert(name.into(), Value::from(value));
                        }
                    }
                    Value::Object(m)
                })
                .collect();
            vars.insert("channels".into(), Value::Array(channels));
        }

        if vars.is_empty() {
            None
        } else {
            Some(Value::Object(vars))
        }
    }

    /// Every credential value that must never reach a log line in full.
    pub fn secrets(&self) -> Vec<String> {
        let keys = [
            &self.anthropic_api_key,
            &self.openai_api_key,
            &self.gemini_api_key,
            &self.wayfinder_api_key,
        ];
        keys.into_iter()
            .filter_map(present)
            .chain(self.channels.iter().filter_map(|ch| present(&ch.token)))
            .filter(|s| s.chars().count() > MIN_REDACTED_SECRET_LEN)
            .map(str::to_string)
            .collect()
    }

    /// Summary safe for structured logging (which inputs are present, never
    /// their values).
    pub fn describe(&self) -> String {
        let flags = [
            ("ssh_key", present(&self.ssh_public_key).is_some()),
            ("anthropic", present(&self.anthropic_api_key).is_some()),
            ("openai", present(&self.openai_api_key).is_some()),
            ("gemini", present(&self.gemini_api_key).is_some()),
            ("wayfinder", present(&self.wayfinder_api_key).is_some()),
        ];
        let mut parts: Vec<String> = flags
            .iter()
            .filter(|(_, set)| *set)
            .map(|(name, _)| (*name).to_string())
            .collect();
        parts.push(format!("channels={}", self.channels.len()));
        parts.join(",")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
