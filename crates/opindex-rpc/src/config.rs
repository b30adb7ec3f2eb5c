//! Node connection settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::TransportError;

fn default_protocol() -> String {
    "http".into()
}
fn default_host() -> String {
    "127.0.0.1".into()
}
fn default_port() -> u16 {
    8332
}
fn default_timeout_secs() -> u64 {
    30
}

/// Where the ledger node listens and how to authenticate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            protocol: default_protocol(),
            host: default_host(),
            port: default_port(),
            user: None,
            password: None,
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl NodeConfig {
    /// Endpoint URL, e.g. `http://127.0.0.1:8332/`.
    pub fn url(&self) -> String {
        format!("{}://{}:{}/", self.protocol, self.host, self.port)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn validate(&self) -> Result<(), TransportError> {
        if !matches!(self.protocol.as_str(), "http" | "https") {
            return Err(TransportError::Config(format!(
                "unsupported protocol '{}'",
                self.protocol
            )));
        }
        if self.host.is_empty() {
            return Err(TransportError::Config("host must not be empty".into()));
        }
        if self.user.is_some() && self.password.is_none() {
            return Err(TransportError::Config("password required when user is set".into()));
        }
        if self.timeout_secs == 0 {
            return Err(TransportError::Config("timeout_secs must be non-zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = NodeConfig::default();
        assert_eq!(cfg.url(), "http://127.0.0.1:8332/");
        assert_eq!(cfg.timeout(), Duration::from_secs(30));
        cfg.validate().unwrap();
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: NodeConfig =
            serde_json::from_str(r#"{"host":"node.local","user":"rpc","password":"secret"}"#).unwrap();
        assert_eq!(cfg.url(), "http://node.local:8332/");
        cfg.validate().unwrap();
    }

    #[test]
    fn user_without_password_rejected() {
        let cfg = NodeConfig { user: Some("rpc".into()), ..Default::default() };
        assert!(matches!(cfg.validate(), Err(TransportError::Config(_))));
    }

    #[test]
    fn unknown_protocol_rejected() {
        let cfg = NodeConfig { protocol: "ftp".into(), ..Default::default() };
        assert!(cfg.validate().is_err());
    }
}
