/// Configuration management
use crate::services::{AuditAudience, FanoutConfig};
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_http_host")]
    pub http_host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Collections live in memory when unset
    pub database_url: Option<String>,
    #[serde(default = "default_db_max_connections")]
    pub database_max_connections: u32,
    #[serde(default = "default_push_channel_capacity")]
    pub push_channel_capacity: usize,
    #[serde(default = "default_push_heartbeat_secs")]
    pub push_heartbeat_secs: u64,
    #[serde(default)]
    pub audit_broadcast: AuditAudience,
    #[serde(default)]
    pub notify_previous_audience_on_publish: bool,
    #[serde(default)]
    pub log_format: LogFormat,
}

fn default_http_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    8090
}

fn default_db_max_connections() -> u32 {
    10
}

fn default_push_channel_capacity() -> usize {
    64
}

fn default_push_heartbeat_secs() -> u64 {
    25
}

impl Config {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    pub fn fanout(&self) -> FanoutConfig {
        FanoutConfig {
            audit_audience: self.audit_broadcast,
            notify_previous_audience_on_publish: self.notify_previous_audience_on_publish,
        }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.push_heartbeat_secs.max(1))
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.http_host.clone(), self.http_port)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_host: default_http_host(),
            http_port: default_http_port(),
            database_url: None,
            database_max_connections: default_db_max_connections(),
            push_channel_capacity: default_push_channel_capacity(),
            push_heartbeat_secs: default_push_heartbeat_secs(),
            audit_broadcast: AuditAudience::default(),
            notify_previous_audience_on_publish: false,
            log_format: LogFormat::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_apply_when_unset() {
        let config: Config = envy::from_iter(Vec::<(String, String)>::new()).unwrap();
        assert_eq!(config.http_port, 8090);
        assert_eq!(config.push_channel_capacity, 64);
        assert!(config.database_url.is_none());
        assert_eq!(config.audit_broadcast, AuditAudience::Admins);
        assert_eq!(config.log_format, LogFormat::Pretty);
    }

    #[test]
    fn test_values_parse_from_env() {
        let config: Config = envy::from_iter(vars(&[
            ("HTTP_PORT", "9100"),
            ("DATABASE_URL", "postgres://localhost/library"),
            ("AUDIT_BROADCAST", "all"),
            ("NOTIFY_PREVIOUS_AUDIENCE_ON_PUBLISH", "true"),
            ("LOG_FORMAT", "json"),
        ]))
        .unwrap();

        assert_eq!(config.http_port, 9100);
        assert_eq!(config.database_url.as_deref(), Some("postgres://localhost/library"));
        let fanout = config.fanout();
        assert_eq!(fanout.audit_audience, AuditAudience::All);
        assert!(fanout.notify_previous_audience_on_publish);
        assert_eq!(config.log_format, LogFormat::Json);
    }
}
