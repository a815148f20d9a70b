//! Configuration handling for sqldao.
//!
//! Database connections are described by [`DatabaseConfig`], either as a
//! full URL or as a host/user/password/database/port tuple. A
//! [`ConfigSource`] resolves logical database names to configurations; the
//! registry consults it the first time a name is used. The CLI reads its
//! settings from arguments and environment variables via [`Config`].

use crate::error::{DaoError, DaoResult};
use crate::models::{DEFAULT_QUERY_TIMEOUT_SECS, DatabaseType, MAX_QUERY_TIMEOUT_SECS, Params, Value};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

/// Name used when a caller does not pick a database.
pub const DEFAULT_DATABASE: &str = "default";

// Pool configuration defaults
pub const DEFAULT_MAX_CONNECTIONS: u32 = 10;
pub const DEFAULT_MAX_CONNECTIONS_SQLITE: u32 = 1;
pub const DEFAULT_MIN_CONNECTIONS: u32 = 0;
pub const DEFAULT_POOL_RECYCLE_SECS: u64 = 3600;
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 600;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;

/// Connection settings for one logical database.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Full connection URL (sensitive - not logged). Takes precedence over the parts below.
    #[serde(default, alias = "db_url")]
    pub url: Option<String>,
    /// Driver used with the fallback tuple: postgres, mysql or sqlite (default: postgres)
    #[serde(default)]
    pub driver: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub database: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// Maximum connections in pool (default: 10, 1 for SQLite)
    #[serde(default)]
    pub pool_size: Option<u32>,
    #[serde(default)]
    pub min_connections: Option<u32>,
    /// Recycle connections older than this many seconds (default: 3600)
    #[serde(default)]
    pub pool_recycle_secs: Option<u64>,
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
    #[serde(default)]
    pub acquire_timeout_secs: Option<u64>,
    /// Default per-statement timeout (default: 30, max: 300)
    #[serde(default)]
    pub query_timeout_secs: Option<u64>,
    /// Log every statement at info level instead of debug.
    #[serde(default)]
    pub echo: bool,
}

impl DatabaseConfig {
    /// Option keys that we extract from URL query parameters.
    const OPTION_KEYS: &'static [&'static str] = &[
        "pool_size",
        "min_connections",
        "pool_recycle",
        "idle_timeout",
        "acquire_timeout",
        "query_timeout",
        "echo",
    ];

    /// Configuration from a bare connection URL.
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            ..Self::default()
        }
    }

    /// Parse a `[name=]url[?options]` specification.
    ///
    /// Returns the logical name (`"default"` when omitted) and the config.
    /// Recognised options (`pool_size`, `min_connections`, `pool_recycle`,
    /// `idle_timeout`, `acquire_timeout`, `query_timeout`, `echo`) are
    /// stripped from the URL; all other query parameters stay for the driver.
    ///
    /// # Examples
    ///
    /// ```text
    /// sqlite:heroes.db                                   # "default"
    /// reports=postgres://u:p@host/reports?pool_size=4     # "reports"
    /// mysql://u:p@host:3306/app?echo=true&charset=utf8    # "default", echo on
    /// ```
    pub fn parse(s: &str) -> Result<(String, Self), String> {
        // Split name=url format (only if '=' before the scheme separator)
        let scheme_pos = s.find(':').unwrap_or(s.len());
        let (explicit_name, url_str) = match s[..scheme_pos].find('=') {
            Some(idx) => (Some(s[..idx].trim()), &s[idx + 1..]),
            None => (None, s),
        };

        if let Some(name) = explicit_name {
            if name.is_empty() {
                return Err("Database name before '=' cannot be empty".to_string());
            }
        }

        let mut url = Url::parse(url_str.trim()).map_err(|e| format!("Invalid URL: {e}"))?;
        let mut opts = Self::extract_options(&mut url, Self::OPTION_KEYS);

        let config = Self {
            url: Some(url.to_string()),
            pool_size: opts.remove("pool_size").and_then(|v| v.parse().ok()),
            min_connections: opts.remove("min_connections").and_then(|v| v.parse().ok()),
            pool_recycle_secs: opts.remove("pool_recycle").and_then(|v| v.parse().ok()),
            idle_timeout_secs: opts.remove("idle_timeout").and_then(|v| v.parse().ok()),
            acquire_timeout_secs: opts.remove("acquire_timeout").and_then(|v| v.parse().ok()),
            query_timeout_secs: opts.remove("query_timeout").and_then(|v| v.parse().ok()),
            echo: opts
                .remove("echo")
                .is_some_and(|v| v.eq_ignore_ascii_case("true")),
            ..Self::default()
        };
        config.validate_pool()?;

        let name = explicit_name.unwrap_or(DEFAULT_DATABASE).to_string();
        Ok((name, config))
    }

    /// Extract our options from URL query params, keeping others for the driver.
    /// Uses proper URL encoding to preserve special characters in remaining params.
    fn extract_options(url: &mut Url, keys: &[&str]) -> HashMap<String, String> {
        let mut opts = HashMap::new();
        let remaining: Vec<(String, String)> = url
            .query_pairs()
            .filter_map(|(k, v)| {
                let key_lower = k.to_ascii_lowercase();
                if keys.contains(&key_lower.as_str()) {
                    opts.insert(key_lower, v.into_owned());
                    None
                } else {
                    Some((k.into_owned(), v.into_owned()))
                }
            })
            .collect();

        if remaining.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(remaining);
        }
        opts
    }

    fn validate_pool(&self) -> Result<(), String> {
        if self.pool_size == Some(0) {
            return Err("pool_size must be greater than 0".to_string());
        }
        if let (Some(min), Some(max)) = (self.min_connections, self.pool_size) {
            if min > max {
                return Err(format!(
                    "min_connections ({}) cannot exceed pool_size ({})",
                    min, max
                ));
            }
        }
        Ok(())
    }

    /// Check that enough is configured to connect, before any connection attempt.
    pub fn validate(&self) -> DaoResult<()> {
        self.connection_url().map(|_| ())
    }

    /// The URL handed to the driver: `url` when set and non-empty, otherwise
    /// assembled from the fallback tuple.
    pub fn connection_url(&self) -> DaoResult<String> {
        self.validate_pool().map_err(DaoError::configuration)?;

        if let Some(url) = self.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            if DatabaseType::from_connection_string(url).is_none() {
                return Err(DaoError::configuration(format!(
                    "Unsupported database URL scheme in '{}'",
                    crate::models::connection::mask_connection_string(url)
                )));
            }
            return Ok(url.to_string());
        }

        let db_type = self.fallback_type()?;
        let database = require("database", self.database.as_deref())?;

        if db_type == DatabaseType::SQLite {
            return Ok(format!("sqlite:{}", database));
        }

        let host = require("host", self.host.as_deref())?;
        let user = require("user", self.user.as_deref())?;
        let password = require("password", self.password.as_deref())?;
        let port = self.port.or(db_type.default_port());

        let mut url = Url::parse(&format!("{}://{}", db_type.scheme(), host))
            .map_err(|e| DaoError::configuration(format!("Invalid database host: {e}")))?;
        let credentials_ok = url.set_username(user).is_ok()
            && url.set_password(Some(password)).is_ok()
            && url.set_port(port).is_ok();
        if !credentials_ok {
            return Err(DaoError::configuration(
                "Database host cannot carry credentials or a port",
            ));
        }
        url.set_path(database);
        Ok(url.to_string())
    }

    fn fallback_type(&self) -> DaoResult<DatabaseType> {
        match self.driver.as_deref() {
            None => Ok(DatabaseType::PostgreSQL),
            Some(name) => DatabaseType::from_driver_name(name).ok_or_else(|| {
                DaoError::configuration(format!("Unsupported database driver '{}'", name))
            }),
        }
    }

    /// Backend selected by this configuration.
    pub fn database_type(&self) -> DaoResult<DatabaseType> {
        let url = self.connection_url()?;
        DatabaseType::from_connection_string(&url).ok_or_else(|| {
            DaoError::configuration("Could not determine database type from the connection URL")
        })
    }

    /// Get pool size with default value based on database type.
    pub fn max_connections_or_default(&self, is_sqlite: bool) -> u32 {
        self.pool_size.unwrap_or(if is_sqlite {
            DEFAULT_MAX_CONNECTIONS_SQLITE
        } else {
            DEFAULT_MAX_CONNECTIONS
        })
    }

    pub fn min_connections_or_default(&self) -> u32 {
        self.min_connections.unwrap_or(DEFAULT_MIN_CONNECTIONS)
    }

    pub fn pool_recycle_or_default(&self) -> Duration {
        Duration::from_secs(self.pool_recycle_secs.unwrap_or(DEFAULT_POOL_RECYCLE_SECS))
    }

    pub fn idle_timeout_or_default(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS))
    }

    pub fn acquire_timeout_or_default(&self) -> Duration {
        Duration::from_secs(
            self.acquire_timeout_secs
                .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        )
    }

    /// Per-statement timeout, clamped to [1, MAX_QUERY_TIMEOUT_SECS].
    pub fn query_timeout_or_default(&self) -> Duration {
        let secs = self
            .query_timeout_secs
            .map(|t| t.clamp(1, MAX_QUERY_TIMEOUT_SECS))
            .unwrap_or(DEFAULT_QUERY_TIMEOUT_SECS);
        Duration::from_secs(secs)
    }
}

fn require<'a>(name: &str, value: Option<&'a str>) -> DaoResult<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(DaoError::configuration(format!(
            "Database parameter \"{}\" is not set or empty and is required",
            name
        ))),
    }
}

/// Resolves logical database names to connection settings.
pub trait ConfigSource: Send + Sync {
    fn lookup(&self, name: &str) -> Option<DatabaseConfig>;
}

/// In-memory [`ConfigSource`] built from specs, JSON or code.
#[derive(Debug, Clone, Default)]
pub struct Settings {
    databases: HashMap<String, DatabaseConfig>,
}

impl Settings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a named configuration.
    pub fn with(mut self, name: impl Into<String>, config: DatabaseConfig) -> Self {
        self.databases.insert(name.into(), config);
        self
    }

    /// Build from `[name=]url[?options]` specifications; later entries win.
    pub fn from_specs<S: AsRef<str>>(specs: &[S]) -> DaoResult<Self> {
        let mut settings = Self::new();
        for spec in specs {
            let (name, config) =
                DatabaseConfig::parse(spec.as_ref()).map_err(DaoError::configuration)?;
            settings.databases.insert(name, config);
        }
        Ok(settings)
    }

    /// Build from a JSON object of `name -> DatabaseConfig`.
    pub fn from_json_str(json: &str) -> DaoResult<Self> {
        let databases: HashMap<String, DatabaseConfig> = serde_json::from_str(json)
            .map_err(|e| DaoError::configuration(format!("Invalid database settings: {e}")))?;
        Ok(Self { databases })
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.databases.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn is_empty(&self) -> bool {
        self.databases.is_empty()
    }
}

impl ConfigSource for Settings {
    fn lookup(&self, name: &str) -> Option<DatabaseConfig> {
        self.databases.get(name).cloned()
    }
}

/// Command-line configuration for the `sqldao` binary.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sqldao",
    about = "Run a named-parameter SQL template against a configured database",
    version,
    author
)]
pub struct Config {
    /// Database connections.
    /// Format: "url" (registered as "default") or "name=url".
    /// Pool options such as ?pool_size=5 or ?echo=true are read from the URL.
    #[arg(
        short = 'd',
        long = "database",
        value_name = "URL",
        env = "SQLDAO_DATABASE",
        value_delimiter = ','
    )]
    pub databases: Vec<String>,

    /// Logical database to run against
    #[arg(long = "db", default_value = DEFAULT_DATABASE, env = "SQLDAO_DB")]
    pub db: String,

    /// Named parameter for the template, as name=value. Repeatable.
    #[arg(short = 'p', long = "param", value_name = "NAME=VALUE")]
    pub params: Vec<String>,

    /// Run the template as a modifying statement and print the affected row count
    #[arg(short = 'x', long)]
    pub execute: bool,

    /// Query timeout in seconds
    #[arg(
        long,
        default_value_t = DEFAULT_QUERY_TIMEOUT_SECS,
        env = "SQLDAO_QUERY_TIMEOUT"
    )]
    pub query_timeout: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn", env = "SQLDAO_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "SQLDAO_JSON_LOGS")]
    pub json_logs: bool,

    /// SQL template with :name placeholders
    pub sql: String,
}

impl Config {
    /// Parse all database configurations.
    pub fn parse_databases(&self) -> DaoResult<Settings> {
        Settings::from_specs(&self.databases)
    }

    /// Parse `name=value` parameters. Values that look like JSON scalars keep
    /// their type; everything else is bound as text.
    pub fn parse_params(&self) -> DaoResult<Params> {
        let mut params = Params::new();
        for raw in &self.params {
            let (name, value) = raw.split_once('=').ok_or_else(|| {
                DaoError::configuration(format!("Parameter '{}' must look like name=value", raw))
            })?;
            let name = name.trim().trim_start_matches(':');
            if name.is_empty() {
                return Err(DaoError::configuration(format!(
                    "Parameter '{}' has an empty name",
                    raw
                )));
            }
            params.insert(name, Value::parse_literal(value));
        }
        Ok(params)
    }

    /// Get the query timeout as a Duration.
    pub fn query_timeout_duration(&self) -> Duration {
        Duration::from_secs(self.query_timeout.clamp(1, MAX_QUERY_TIMEOUT_SECS))
    }
}
