//! Deployment configuration: YAML file, then `LOADGEN_*` environment overrides.

use crate::topic::{NameError, NamespaceName};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

pub const ENV_PREFIX: &str = "LOADGEN_";

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("environment variable {key}: cannot parse '{value}'")]
    Env { key: String, value: String },
    #[error("missing required setting '{0}'")]
    Missing(&'static str),
    #[error("invalid setting '{key}': {reason}")]
    Invalid { key: &'static str, reason: String },
    #[error(transparent)]
    Name(#[from] NameError),
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub admin_service_url: String,
    pub client_service_url: String,
    pub oauth_issuer_url: String,
    pub oauth_audience: String,
    pub admin_credentials_file_url: String,
    pub client_credentials_file_url: String,
    pub cluster: String,
    pub tenant: String,
    pub namespace: String,
    pub heartbeat_role: String,
    pub num_topics: u32,
    pub num_producers_per_topic: u32,
    pub message_interval_ms: u64,
    pub producer_start_interval_ms: u64,
    pub cleanup: bool,
    pub cleanup_on_exit: bool,
    pub purge_on_start: bool,
    pub metrics_addr: String,
    pub producer_name_prefix: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            admin_service_url: String::new(),
            client_service_url: String::new(),
            oauth_issuer_url: String::new(),
            oauth_audience: String::new(),
            admin_credentials_file_url: String::new(),
            client_credentials_file_url: String::new(),
            cluster: String::new(),
            tenant: String::new(),
            namespace: String::new(),
            heartbeat_role: String::new(),
            num_topics: 1,
            num_producers_per_topic: 1,
            message_interval_ms: 1000,
            producer_start_interval_ms: 100,
            cleanup: false,
            cleanup_on_exit: false,
            purge_on_start: true,
            metrics_addr: "0.0.0.0:9090".to_string(),
            producer_name_prefix: "loadgen".to_string(),
        }
    }
}

/// Tenant/namespace/cluster/role the run provisions and targets.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Target {
    pub cluster: String,
    pub namespace: NamespaceName,
    pub role: String,
}

/// OAuth2 client-credentials settings for one of the two clients.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OAuthSettings {
    pub issuer_url: String,
    pub audience: String,
    pub credentials_file_url: String,
}

impl Config {
    /// Reads `path` when given (missing file is an error) and applies the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut cfg = match path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        cfg.apply_env(|k| std::env::var(k).ok())?;
        Ok(cfg)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        Self::from_yaml(&text).map_err(|source| ConfigError::Parse { path: display, source })
    }

    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Overrides fields from `LOADGEN_<KEY>` variables resolved through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(&format!("{}{}", ENV_PREFIX, key.to_uppercase()));

        for (key, field) in [
            ("admin_service_url", &mut self.admin_service_url),
            ("client_service_url", &mut self.client_service_url),
            ("oauth_issuer_url", &mut self.oauth_issuer_url),
            ("oauth_audience", &mut self.oauth_audience),
            ("admin_credentials_file_url", &mut self.admin_credentials_file_url),
            ("client_credentials_file_url", &mut self.client_credentials_file_url),
            ("cluster", &mut self.cluster),
            ("tenant", &mut self.tenant),
            ("namespace", &mut self.namespace),
            ("heartbeat_role", &mut self.heartbeat_role),
            ("metrics_addr", &mut self.metrics_addr),
            ("producer_name_prefix", &mut self.producer_name_prefix),
        ] {
            if let Some(v) = get(key) {
                *field = v;
            }
        }

        for (key, field) in [
            ("num_topics", &mut self.num_topics),
            ("num_producers_per_topic", &mut self.num_producers_per_topic),
        ] {
            if let Some(v) = get(key) {
                *field = parse_env(key, &v)?;
            }
        }

        for (key, field) in [
            ("message_interval_ms", &mut self.message_interval_ms),
            ("producer_start_interval_ms", &mut self.producer_start_interval_ms),
        ] {
            if let Some(v) = get(key) {
                *field = parse_env(key, &v)?;
            }
        }

        for (key, field) in [
            ("cleanup", &mut self.cleanup),
            ("cleanup_on_exit", &mut self.cleanup_on_exit),
            ("purge_on_start", &mut self.purge_on_start),
        ] {
            if let Some(v) = get(key) {
                *field = parse_bool(key, &v)?;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("admin_service_url", &self.admin_service_url),
            ("client_service_url", &self.client_service_url),
            ("cluster", &self.cluster),
            ("tenant", &self.tenant),
            ("namespace", &self.namespace),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Missing(key));
            }
        }
        if self.message_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                key: "message_interval_ms",
                reason: "must be greater than zero".into(),
            });
        }
        if self.num_topics.checked_mul(self.num_producers_per_topic).is_none() {
            return Err(ConfigError::Invalid {
                key: "num_producers_per_topic",
                reason: "num_topics × num_producers_per_topic overflows".into(),
            });
        }
        if !self.oauth_issuer_url.is_empty() {
            if self.admin_credentials_file_url.is_empty() {
                return Err(ConfigError::Missing("admin_credentials_file_url"));
            }
            if self.client_credentials_file_url.is_empty() {
                return Err(ConfigError::Missing("client_credentials_file_url"));
            }
        }
        self.metrics_socket_addr()?;
        NamespaceName::new(&self.tenant, &self.namespace)?;
        Ok(())
    }

    pub fn target(&self) -> Result<Target, ConfigError> {
        Ok(Target {
            cluster: self.cluster.clone(),
            namespace: NamespaceName::new(&self.tenant, &self.namespace)?,
            role: self.heartbeat_role.clone(),
        })
    }

    pub fn admin_oauth(&self) -> Option<OAuthSettings> {
        self.oauth(&self.admin_credentials_file_url)
    }

    pub fn client_oauth(&self) -> Option<OAuthSettings> {
        self.oauth(&self.client_credentials_file_url)
    }

    fn oauth(&self, credentials: &str) -> Option<OAuthSettings> {
        if self.oauth_issuer_url.is_empty() {
            return None;
        }
        Some(OAuthSettings {
            issuer_url: self.oauth_issuer_url.clone(),
            audience: self.oauth_audience.clone(),
            credentials_file_url: credentials.to_string(),
        })
    }

    pub fn message_interval(&self) -> Duration {
        Duration::from_millis(self.message_interval_ms)
    }

    pub fn producer_start_interval(&self) -> Duration {
        Duration::from_millis(self.producer_start_interval_ms)
    }

    pub fn metrics_socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.metrics_addr.parse().map_err(|e: std::net::AddrParseError| ConfigError::Invalid {
            key: "metrics_addr",
            reason: e.to_string(),
        })
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::Env {
        key: format!("{}{}", ENV_PREFIX, key.to_uppercase()),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ConfigError::Env {
            key: format!("{}{}", ENV_PREFIX, key.to_uppercase()),
            value: value.to_string(),
        }),
    }
}
