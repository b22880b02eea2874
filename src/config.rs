//! Configuration types.
//!
//! Loaded from a JSON file, then overridden from `RELAY_*` / `CSA_*` /
//! `CHATVOLT_*` environment variables.

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;
use serde::{Deserialize, Deserializer};

use crate::error::ConfigError;
use crate::session::LookupPolicy;

const DEFAULT_CSA_URL: &str = "https://csa.wonit.net.br";
const DEFAULT_CHATVOLT_URL: &str = "https://api.chatvolt.ai";

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub csa: CsaConfig,
    pub ia: IaConfig,
    pub dispatch: DispatchConfig,
}

/// HTTP listener.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// Outbound WhatsApp gateway (CSA).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CsaConfig {
    pub url: String,
    pub webhook_id: String,
    #[serde(deserialize_with = "deserialize_secret")]
    pub token: SecretString,
    pub instance_id: String,
    pub product: String,
    pub provider: String,
    pub sender_name: String,
}

impl Default for CsaConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_CSA_URL.to_string(),
            webhook_id: String::new(),
            token: SecretString::from(String::new()),
            instance_id: String::new(),
            product: "whatsapp".to_string(),
            provider: "gupshup".to_string(),
            sender_name: String::new(),
        }
    }
}

/// AI providers.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct IaConfig {
    pub chatvolt: ChatvoltConfig,
}

/// Chatvolt agent query API.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatvoltConfig {
    pub url: String,
    #[serde(deserialize_with = "deserialize_secret")]
    pub token: SecretString,
    pub agent_id: String,
}

impl Default for ChatvoltConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_CHATVOLT_URL.to_string(),
            token: SecretString::from(String::new()),
            agent_id: String::new(),
        }
    }
}

/// Outbound dispatch, session and status tracking knobs.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Number of concurrent send workers.
    pub workers: usize,
    /// Maximum jobs waiting in the outbound queue.
    pub queue_capacity: usize,
    pub send_timeout_secs: u64,
    pub query_timeout_secs: u64,
    /// Idle time after which a sender's session is forgotten.
    pub session_ttl_secs: u64,
    /// Upper bound on waiting for workers during shutdown.
    pub shutdown_timeout_secs: u64,
    /// Maximum retained job status records.
    pub status_capacity: usize,
    /// Whether a plain session lookup counts as activity.
    pub lookup_refreshes_session: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            workers: 3,
            queue_capacity: 100,
            send_timeout_secs: 20,
            query_timeout_secs: 25,
            session_ttl_secs: 600,
            shutdown_timeout_secs: 30,
            status_capacity: 10_000,
            lookup_refreshes_session: false,
        }
    }
}

impl DispatchConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    pub fn lookup_policy(&self) -> LookupPolicy {
        if self.lookup_refreshes_session {
            LookupPolicy::Refresh
        } else {
            LookupPolicy::Passive
        }
    }
}

impl RelayConfig {
    /// Load configuration from a JSON file, apply environment overrides and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let mut config = Self::from_json(&raw)?;
        config.apply_env();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON string. Missing sections take defaults.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }

    /// Override fields from environment variables when present.
    pub fn apply_env(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(host) = lookup("RELAY_HOST") {
            self.server.host = host;
        }
        if let Some(port) = lookup("RELAY_PORT").and_then(|s| s.parse().ok()) {
            self.server.port = port;
        }
        if let Some(workers) = lookup("RELAY_WORKERS").and_then(|s| s.parse().ok()) {
            self.dispatch.workers = workers;
        }
        if let Some(capacity) = lookup("RELAY_QUEUE_CAPACITY").and_then(|s| s.parse().ok()) {
            self.dispatch.queue_capacity = capacity;
        }
        if let Some(ttl) = lookup("RELAY_SESSION_TTL_SECS").and_then(|s| s.parse().ok()) {
            self.dispatch.session_ttl_secs = ttl;
        }
        if let Some(refresh) =
            lookup("RELAY_LOOKUP_REFRESHES_SESSION").and_then(|s| s.parse().ok())
        {
            self.dispatch.lookup_refreshes_session = refresh;
        }
        if let Some(token) = lookup("CSA_TOKEN") {
            self.csa.token = SecretString::from(token);
        }
        if let Some(token) = lookup("CHATVOLT_TOKEN") {
            self.ia.chatvolt.token = SecretString::from(token);
        }
    }

    /// Reject values the dispatcher cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dispatch.workers == 0 {
            return Err(ConfigError::InvalidValue {
                key: "dispatch.workers".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                key: "dispatch.queue_capacity".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Listener address as `host:port`.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}

fn deserialize_secret<'de, D>(deserializer: D) -> Result<SecretString, D::Error>
where
    D: Deserializer<'de>,
{
    String::deserialize(deserializer).map(SecretString::from)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn empty_object_takes_defaults() {
        let config = RelayConfig::from_json("{}").unwrap();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.dispatch.workers, 3);
        assert_eq!(config.dispatch.queue_capacity, 100);
        assert_eq!(config.dispatch.send_timeout(), Duration::from_secs(20));
        assert_eq!(config.dispatch.session_ttl(), Duration::from_secs(600));
        assert_eq!(config.csa.product, "whatsapp");
        assert_eq!(config.ia.chatvolt.url, DEFAULT_CHATVOLT_URL);
        assert_eq!(config.dispatch.lookup_policy(), LookupPolicy::Passive);
    }

    #[test]
    fn parses_nested_sections() {
        let raw = r#"{
            "server": { "port": 9090 },
            "csa": { "webhook_id": "wh-1", "token": "csa-secret" },
            "ia": { "chatvolt": { "token": "cv-secret", "agent_id": "agent-7" } },
            "dispatch": { "workers": 5, "lookup_refreshes_session": true }
        }"#;
        let config = RelayConfig::from_json(raw).unwrap();
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.csa.webhook_id, "wh-1");
        assert_eq!(config.csa.token.expose_secret(), "csa-secret");
        assert_eq!(config.ia.chatvolt.agent_id, "agent-7");
        assert_eq!(config.dispatch.workers, 5);
        assert_eq!(config.dispatch.queue_capacity, 100);
        assert_eq!(config.dispatch.lookup_policy(), LookupPolicy::Refresh);
    }

    #[test]
    fn malformed_json_is_parse_error() {
        let err = RelayConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn overrides_replace_file_values() {
        let vars: HashMap<&str, &str> = [
            ("RELAY_PORT", "7000"),
            ("RELAY_WORKERS", "8"),
            ("RELAY_QUEUE_CAPACITY", "not-a-number"),
            ("CSA_TOKEN", "from-env"),
            ("RELAY_LOOKUP_REFRESHES_SESSION", "true"),
        ]
        .into_iter()
        .collect();

        let mut config = RelayConfig::default();
        config.apply_overrides(|key| vars.get(key).map(|v| v.to_string()));

        assert_eq!(config.server.port, 7000);
        assert_eq!(config.dispatch.workers, 8);
        assert_eq!(config.dispatch.queue_capacity, 100);
        assert_eq!(config.csa.token.expose_secret(), "from-env");
        assert_eq!(config.dispatch.lookup_policy(), LookupPolicy::Refresh);
    }

    #[test]
    fn zero_workers_rejected() {
        let mut config = RelayConfig::default();
        config.dispatch.workers = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("dispatch.workers"));
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "dispatch": {{ "queue_capacity": 7 }} }}"#).unwrap();

        let config = RelayConfig::load(file.path()).unwrap();
        assert_eq!(config.dispatch.send_timeout_secs, 20);
    }

    #[test]
    fn bind_addr_joins_host_and_port() {
        let mut config = RelayConfig::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 3000;
        assert_eq!(config.bind_addr(), "127.0.0.1:3000");
    }

    #[test]
    fn load_missing_file_is_io_error() {
        let err = RelayConfig::load("/nonexistent/relay-config.json").unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
