// Connection Configuration
// Engine-agnostic connection parameters, consumed read-only by adapters

use crate::db::registry::ConnectionSchema;
use crate::db::traits::DatabaseError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

/// Network endpoint for server engines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TcpEndpoint {
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
}

/// Database file for file-based engines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEndpoint {
    pub path: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Endpoint {
    Tcp(TcpEndpoint),
    File(FileEndpoint),
}

/// SSH jump host used to reach the database server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TunnelConfig {
    pub host: String,
    #[serde(default = "default_ssh_port")]
    pub port: u16,
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: Option<String>,
    #[serde(default)]
    pub key_path: Option<String>,
}

fn default_ssh_port() -> u16 {
    22
}

/// Connection parameters for any supported engine. `db_type` selects which
/// fields matter; the rest are ignored, not rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    pub name: String,
    pub db_type: String,
    pub endpoint: Endpoint,
    #[serde(default)]
    pub tunnel: Option<TunnelConfig>,
    /// Engine-specific extras (SQL Server auth type, Oracle role, Supabase region, ...)
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl ConnectionConfig {
    pub fn tcp(
        name: impl Into<String>,
        db_type: impl Into<String>,
        host: impl Into<String>,
        port: Option<u16>,
        database: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            db_type: db_type.into(),
            endpoint: Endpoint::Tcp(TcpEndpoint {
                host: host.into(),
                port,
                database: database.into(),
                username: username.into(),
                password: password.into(),
            }),
            tunnel: None,
            options: BTreeMap::new(),
        }
    }

    pub fn file(name: impl Into<String>, db_type: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            db_type: db_type.into(),
            endpoint: Endpoint::File(FileEndpoint { path: path.into() }),
            tunnel: None,
            options: BTreeMap::new(),
        }
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn with_tunnel(mut self, tunnel: TunnelConfig) -> Self {
        self.tunnel = Some(tunnel);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, DatabaseError> {
        serde_json::from_str(json).map_err(|e| DatabaseError::InvalidConfig(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, DatabaseError> {
        serde_json::to_string_pretty(self).map_err(|e| DatabaseError::InvalidConfig(e.to_string()))
    }

    /// Builds a config from flat connection-form values keyed by the
    /// schema's field names. Unknown keys land in `options`.
    pub fn from_form_values(
        name: &str,
        schema: &ConnectionSchema,
        values: &HashMap<String, String>,
    ) -> Result<Self, DatabaseError> {
        let get = |key: &str| values.get(key).map(|v| v.trim().to_string()).unwrap_or_default();

        let mut config = if schema.is_file_based {
            let path = get("file_path");
            if path.is_empty() {
                return Err(DatabaseError::InvalidConfig(format!(
                    "{} requires a database file path",
                    schema.display_name
                )));
            }
            Self::file(name, &schema.db_type, path)
        } else {
            let port = match get("port") {
                p if p.is_empty() => None,
                p => Some(
                    p.parse::<u16>()
                        .map_err(|_| DatabaseError::InvalidConfig(format!("Invalid port: {}", p)))?,
                ),
            };
            let password = values.get("password").cloned().unwrap_or_default();
            Self::tcp(name, &schema.db_type, get("server"), port, get("database"), get("username"), password)
        };

        let ssh_enabled = values
            .get("ssh_enabled")
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "true" | "1" | "yes" | "enabled"))
            .unwrap_or(false);
        if ssh_enabled && schema.supports_ssh {
            let port = match get("ssh_port") {
                p if p.is_empty() => default_ssh_port(),
                p => p
                    .parse::<u16>()
                    .map_err(|_| DatabaseError::InvalidConfig(format!("Invalid SSH port: {}", p)))?,
            };
            config.tunnel = Some(TunnelConfig {
                host: get("ssh_host"),
                port,
                username: get("ssh_username"),
                password: values.get("ssh_password").filter(|p| !p.is_empty()).cloned(),
                key_path: Some(get("ssh_key_path")).filter(|p| !p.is_empty()),
            });
        }

        const CORE_KEYS: &[&str] = &["server", "port", "database", "username", "password", "file_path"];
        for (key, value) in values {
            if CORE_KEYS.contains(&key.as_str()) || key.starts_with("ssh_") || value.trim().is_empty() {
                continue;
            }
            config.options.insert(key.clone(), value.trim().to_string());
        }

        Ok(config)
    }

    pub fn tcp_endpoint(&self) -> Option<&TcpEndpoint> {
        match &self.endpoint {
            Endpoint::Tcp(tcp) => Some(tcp),
            Endpoint::File(_) => None,
        }
    }

    pub fn server(&self) -> &str {
        self.tcp_endpoint().map(|t| t.host.as_str()).unwrap_or("")
    }

    pub fn port(&self) -> Option<u16> {
        self.tcp_endpoint().and_then(|t| t.port)
    }

    pub fn database(&self) -> &str {
        self.tcp_endpoint().map(|t| t.database.as_str()).unwrap_or("")
    }

    pub fn username(&self) -> &str {
        self.tcp_endpoint().map(|t| t.username.as_str()).unwrap_or("")
    }

    pub fn password(&self) -> &str {
        self.tcp_endpoint().map(|t| t.password.as_str()).unwrap_or("")
    }

    pub fn file_path(&self) -> Option<&str> {
        match &self.endpoint {
            Endpoint::File(f) => Some(f.path.as_str()),
            Endpoint::Tcp(_) => None,
        }
    }

    pub fn option(&self, key: &str) -> Option<&str> {
        self.options.get(key).map(String::as_str).filter(|v| !v.is_empty())
    }

    pub fn requires_tunnel(&self) -> bool {
        self.tunnel.is_some() && matches!(self.endpoint, Endpoint::Tcp(_))
    }

    /// Copy of this config pointing at another host and port, used to
    /// connect through a forwarded tunnel endpoint.
    pub fn with_endpoint(&self, host: &str, port: u16) -> Self {
        let mut config = self.clone();
        if let Endpoint::Tcp(tcp) = &mut config.endpoint {
            tcp.host = host.to_string();
            tcp.port = Some(port);
        }
        config
    }

    /// Copy of this config targeting another database on the same server
    pub fn with_database(&self, database: &str) -> Self {
        let mut config = self.clone();
        if let Endpoint::Tcp(tcp) = &mut config.endpoint {
            tcp.database = database.to_string();
        }
        config
    }
}

/// Resolves a database file path: expands `~`, restores a missing leading
/// `/` when that names an existing file, and makes the result absolute.
pub fn resolve_file_path(path: &str) -> PathBuf {
    let path = path.trim();

    let expanded = match path.strip_prefix('~') {
        Some(rest) if rest.is_empty() || rest.starts_with('/') => directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(rest.trim_start_matches('/')))
            .unwrap_or_else(|| PathBuf::from(path)),
        _ => PathBuf::from(path),
    };

    let candidate = if !expanded.exists() && !path.starts_with('/') && !path.starts_with('~') {
        let rooted = Path::new("/").join(path);
        if rooted.exists() {
            rooted
        } else {
            expanded
        }
    } else {
        expanded
    };

    if candidate.is_absolute() {
        candidate
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(&candidate))
            .unwrap_or(candidate)
    }
}
