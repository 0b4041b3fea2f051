//! Hetzner Cloud implementation of [`MachineProvider`].
//!
//! Talks to the public REST API (`/v1/servers`, `/v1/actions`) with
//! [`reqwest`]. Server creation returns an action which is polled until it
//! finishes; the server is then re-fetched for its assigned IPv4.

use std::time::Duration;

use async_trait::async_trait;
use creator_core::types::DbId;
use serde::Deserialize;

use crate::provider::{MachineProvider, ProviderError, ProvisionedMachine};

/// Default API base URL.
const DEFAULT_API_URL: &str = "https://api.hetzner.cloud/v1";

/// Delay between polls of a running action.
const ACTION_POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Maximum time to wait for the create action.
const ACTION_TIMEOUT: Duration = Duration::from_secs(300);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Hetzner Cloud settings.
#[derive(Debug, Clone)]
pub struct HetznerConfig {
    /// API token (`HCLOUD_TOKEN`).
    pub token: String,
    /// Id of the project SSH key injected as the default access key.
    pub ssh_key_id: i64,
    pub server_type: String,
    pub image: String,
    pub location: String,
    pub api_url: String,
}

impl HetznerConfig {
    /// Load configuration from environment variables.
    ///
    /// | Env Var       | Default         |
    /// |---------------|-----------------|
    /// | `HCLOUD_TOKEN`| required        |
    /// | `SSH_KEY_ID`  | required        |
    /// | `SERVER_TYPE` | `cpx11`         |
    /// | `IMAGE`       | `ubuntu-24.04`  |
    /// | `LOCATION`    | `fsn1`          |
    /// | `HCLOUD_API_URL` | `https://api.hetzner.cloud/v1` |
    pub fn from_env() -> Self {
        let token = std::env::var("HCLOUD_TOKEN").expect("HCLOUD_TOKEN must be set");
        let ssh_key_id: i64 = std::env::var("SSH_KEY_ID")
            .expect("SSH_KEY_ID must be set")
            .parse()
            .expect("SSH_KEY_ID must be an integer");

        Self {
            token,
            ssh_key_id,
            server_type: std::env::var("SERVER_TYPE").unwrap_or_else(|_| "cpx11".into()),
            image: std::env::var("IMAGE").unwrap_or_else(|_| "ubuntu-24.04".into()),
            location: std::env::var("LOCATION").unwrap_or_else(|_| "fsn1".into()),
            api_url: std::env::var("HCLOUD_API_URL").unwrap_or_else(|_| DEFAULT_API_URL.into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ServerEnvelope {
    server: HetznerServer,
}

#[derive(Debug, Deserialize)]
struct CreateServerResponse {
    server: HetznerServer,
    action: HetznerAction,
}

#[derive(Debug, Deserialize)]
struct ActionEnvelope {
    action: HetznerAction,
}

#[derive(Debug, Deserialize)]
struct HetznerServer {
    id: DbId,
    name: String,
    public_net: PublicNet,
}

#[derive(Debug, Deserialize)]
struct PublicNet {
    ipv4: Option<Ipv4>,
}

#[derive(Debug, Deserialize)]
struct Ipv4 {
    ip: String,
}

#[derive(Debug, Deserialize)]
struct HetznerAction {
    id: i64,
    status: String,
    error: Option<ActionError>,
}

#[derive(Debug, Deserialize)]
struct ActionError {
    message: String,
}

impl HetznerServer {
    fn ipv4(&self) -> Option<&str> {
        self.public_net
            .ipv4
            .as_ref()
            .map(|v| v.ip.as_str())
            .filter(|ip| !ip.is_empty())
    }
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// HTTP client for the Hetzner Cloud API.
pub struct HetznerProvider {
    client: reqwest::Client,
    config: HetznerConfig,
}

impl HetznerProvider {
    pub fn new(config: HetznerConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_url)
    }

    async fn get_server(&self, id: DbId) -> Result<HetznerServer, ProviderError> {
        let response = self
            .client
            .get(self.url(&format!("/servers/{id}")))
            .bearer_auth(&self.config.token)
            .send()
            .await?;
        let envelope: ServerEnvelope = parse_response(response).await?;
        Ok(envelope.server)
    }

    /// Poll an action until it leaves the `running` state.
    async fn wait_for_action(&self, action: HetznerAction) -> Result<(), ProviderError> {
        let started = tokio::time::Instant::now();
        let mut action = action;
        loop {
            match action.status.as_str() {
                "success" => return Ok(()),
                "error" => {
                    return Err(ProviderError::ActionFailed {
                        action_id: action.id,
                        message: action
                            .error
                            .map(|e| e.message)
                            .unwrap_or_else(|| "unknown error".into()),
                    })
                }
                _ => {}
            }
            if started.elapsed() >= ACTION_TIMEOUT {
                return Err(ProviderError::ActionTimeout {
                    action_id: action.id,
                    waited_secs: ACTION_TIMEOUT.as_secs(),
                });
            }
            tokio::time::sleep(ACTION_POLL_INTERVAL).await;

            let response = self
                .client
                .get(self.url(&format!("/actions/{}", action.id)))
                .bearer_auth(&self.config.token)
                .send()
                .await?;
            let envelope: ActionEnvelope = parse_response(response).await?;
            action = envelope.action;
        }
    }
}

#[async_trait]
impl MachineProvider for HetznerProvider {
    fn name(&self) -> &'static str {
        "hetzner"
    }

    async fn create_machine(&self, name: &str) -> Result<ProvisionedMachine, ProviderError> {
        tracing::info!(
            name,
            server_type = %self.config.server_type,
            image = %self.config.image,
            location = %self.config.location,
            "Creating Hetzner server",
        );

        let body = serde_json::json!({
            "name": name,
            "server_type": self.config.server_type,
            "image": self.config.image,
            "location": self.config.location,
            "ssh_keys": [self.config.ssh_key_id],
        });
        let response = self
            .client
            .post(self.url("/servers"))
            .bearer_auth(&self.config.token)
            .json(&body)
            .send()
            .await?;
        let created: CreateServerResponse = parse_response(response).await?;

        tracing::info!(server_id = created.server.id, "Waiting for server create action");
        self.wait_for_action(created.action).await?;

        // The create response may predate IP assignment; re-fetch.
        let server = self.get_server(created.server.id).await?;
        let address = server
            .ipv4()
            .ok_or(ProviderError::MissingAddress(server.id))?
            .to_string();

        tracing::info!(server_id = server.id, name = %server.name, %address, "Hetzner server created");
        Ok(ProvisionedMachine {
            id: server.id,
            name: server.name,
            address,
        })
    }

    async fn delete_machine(&self, id: DbId) -> Result<(), ProviderError> {
        tracing::info!(server_id = id, "Deleting Hetzner server");
        let response = self
            .client
            .delete(self.url(&format!("/servers/{id}")))
            .bearer_auth(&self.config.token)
            .send()
            .await?;
        ensure_success(response).await?;
        tracing::info!(server_id = id, "Hetzner server deleted");
        Ok(())
    }
}

// ---- private helpers ----

/// Return the response unchanged on success, or an [`ProviderError::Api`]
/// carrying the status and body text.
async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        return Err(ProviderError::Api {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, ProviderError> {
    let response = ensure_success(response).await?;
    Ok(response.json::<T>().await?)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_create_response() {
        let body = r#"{
            "server": {
                "id": 4711,
                "name": "claw-0a0b0c0d",
                "status": "initializing",
                "public_net": {"ipv4": {"ip": "203.0.113.7", "blocked": false}, "ipv6": null}
            },
            "action": {"id": 13, "status": "running", "error": null},
            "next_actions": []
        }"#;
        let parsed: CreateServerResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.server.id, 4711);
        assert_eq!(parsed.server.ipv4(), Some("203.0.113.7"));
        assert_eq!(parsed.action.status, "running");
    }

    #[test]
    fn missing_ipv4_is_none() {
        let body = r#"{"server": {"id": 1, "name": "x", "public_net": {"ipv4": null}}}"#;
        let parsed: ServerEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.server.ipv4(), None);
    }

    #[test]
    fn parses_failed_action() {
        let body = r#"{"action": {"id": 9, "status": "error",
            "error": {"code": "action_failed", "message": "no capacity"}}}"#;
        let parsed: ActionEnvelope = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.action.status, "error");
        assert_eq!(parsed.action.error.unwrap().message, "no capacity");
    }

    #[tokio::test]
    async fn finished_action_needs_no_request() {
        let provider = HetznerProvider::new(HetznerConfig {
            token: "t".into(),
            ssh_key_id: 1,
            server_type: "cpx11".into(),
            image: "ubuntu-24.04".into(),
            location: "fsn1".into(),
            api_url: "http://127.0.0.1:9".into(),
        });
        let done = HetznerAction {
            id: 1,
            status: "success".into(),
            error: None,
        };
        provider.wait_for_action(done).await.unwrap();

        let failed = HetznerAction {
            id: 2,
            status: "error".into(),
            error: Some(ActionError {
                message: "boom".into(),
            }),
        };
        let err = provider.wait_for_action(failed).await.unwrap_err();
        assert!(matches!(err, ProviderError::ActionFailed { action_id: 2, .. }));
    }
}
