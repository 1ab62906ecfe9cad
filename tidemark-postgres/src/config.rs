//! PostgreSQL connection configuration.

use std::time::Duration;

use crate::error::{PgError, PgResult};

/// PostgreSQL connection configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgConfig {
    /// Host.
    pub host: String,
    /// Port (default: 5432).
    pub port: u16,
    /// Database name.
    pub database: String,
    /// Username.
    pub user: String,
    /// Password.
    pub password: Option<String>,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Statement timeout, applied right after connecting.
    pub statement_timeout: Option<Duration>,
    /// Application name (shown in pg_stat_activity).
    pub application_name: Option<String>,
}

impl Default for PgConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 5432,
            database: String::new(),
            user: "postgres".to_string(),
            password: None,
            connect_timeout: Duration::from_secs(30),
            statement_timeout: None,
            application_name: Some("tidemark".to_string()),
        }
    }
}

impl PgConfig {
    /// Parse either a `postgres://` URL or a `key=value` connection string.
    pub fn from_dsn(dsn: &str) -> PgResult<Self> {
        let dsn = dsn.trim();
        if dsn.starts_with("postgres://") || dsn.starts_with("postgresql://") {
            Self::from_url(dsn)
        } else {
            Self::from_key_value(dsn)
        }
    }

    /// Create a configuration from a database URL.
    pub fn from_url(url: &str) -> PgResult<Self> {
        let parsed = url::Url::parse(url)
            .map_err(|e| PgError::config(format!("invalid database URL: {}", e)))?;

        if parsed.scheme() != "postgresql" && parsed.scheme() != "postgres" {
            return Err(PgError::config(format!(
                "invalid scheme: expected 'postgresql' or 'postgres', got '{}'",
                parsed.scheme()
            )));
        }

        let mut config = Self {
            host: parsed
                .host_str()
                .ok_or_else(|| PgError::config("missing host in URL"))?
                .to_string(),
            port: parsed.port().unwrap_or(5432),
            database: parsed.path().trim_start_matches('/').to_string(),
            ..Default::default()
        };

        if !parsed.username().is_empty() {
            config.user = parsed.username().to_string();
        }
        config.password = parsed.password().map(String::from);

        for (key, value) in parsed.query_pairs() {
            config.set_option(&key, &value)?;
        }

        config.validate()
    }

    /// Create a configuration from `host=... dbname=...` pairs.
    pub fn from_key_value(dsn: &str) -> PgResult<Self> {
        let mut config = Self::default();

        for pair in dsn.split_whitespace() {
            let (key, value) = pair.split_once('=').ok_or_else(|| {
                PgError::config(format!("expected key=value in connection string, got '{}'", pair))
            })?;
            let value = value.trim_matches('\'');
            match key {
                "host" => config.host = value.to_string(),
                "port" => {
                    config.port = value
                        .parse()
                        .map_err(|_| PgError::config(format!("invalid port: {}", value)))?;
                }
                "dbname" => config.database = value.to_string(),
                "user" => config.user = value.to_string(),
                "password" => config.password = Some(value.to_string()),
                other => config.set_option(other, value)?,
            }
        }

        config.validate()
    }

    fn set_option(&mut self, key: &str, value: &str) -> PgResult<()> {
        match key {
            "sslmode" => match value {
                "disable" | "prefer" | "allow" => {}
                other => {
                    return Err(PgError::config(format!(
                        "sslmode '{}' needs TLS, which this driver does not provide",
                        other
                    )));
                }
            },
            "connect_timeout" => {
                let secs: u64 = value
                    .parse()
                    .map_err(|_| PgError::config("invalid connect_timeout"))?;
                self.connect_timeout = Duration::from_secs(secs);
            }
            "statement_timeout" => {
                let ms: u64 = value
                    .parse()
                    .map_err(|_| PgError::config("invalid statement_timeout"))?;
                self.statement_timeout = Some(Duration::from_millis(ms));
            }
            "application_name" => self.application_name = Some(value.to_string()),
            _ => {}
        }
        Ok(())
    }

    fn validate(self) -> PgResult<Self> {
        if self.database.is_empty() {
            return Err(PgError::config("missing database name"));
        }
        Ok(self)
    }

    /// Convert to tokio-postgres config.
    pub fn to_pg_config(&self) -> tokio_postgres::Config {
        let mut config = tokio_postgres::Config::new();
        config.host(&self.host);
        config.port(self.port);
        config.dbname(&self.database);
        config.user(&self.user);

        if let Some(ref password) = self.password {
            config.password(password);
        }

        if let Some(ref app_name) = self.application_name {
            config.application_name(app_name);
        }

        config.connect_timeout(self.connect_timeout);

        config
    }
}
