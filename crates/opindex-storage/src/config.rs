//! Record store connection settings.

use serde::{Deserialize, Serialize};
#[cfg(feature = "postgres")]
use sqlx::postgres::PgConnectOptions;

/// Which database backs the record store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Postgres,
    Sqlite,
}

impl std::fmt::Display for StoreBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Postgres => write!(f, "postgres"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

fn default_host() -> String {
    "localhost".into()
}
fn default_port() -> u16 {
    5432
}
fn default_database() -> String {
    "op_return".into()
}
fn default_path() -> String {
    "op_return.db".into()
}
fn default_max_connections() -> u32 {
    10
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_database")]
    pub database: String,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// SQLite database file; `:memory:` for an ephemeral store.
    #[serde(default = "default_path")]
    pub path: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            host: default_host(),
            port: default_port(),
            database: default_database(),
            user: None,
            password: None,
            path: default_path(),
            max_connections: default_max_connections(),
        }
    }
}

impl StoreConfig {
    /// PostgreSQL connection options. User and password are handed to the
    /// driver as-is, so reserved URL characters need no escaping.
    #[cfg(feature = "postgres")]
    pub fn pg_connect_options(&self) -> PgConnectOptions {
        let mut options = PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .database(&self.database);
        if let Some(user) = &self.user {
            options = options.username(user);
        }
        if let Some(password) = &self.password {
            options = options.password(password);
        }
        options
    }

    /// SQLite connection URL understood by `sqlx`.
    pub fn sqlite_url(&self) -> String {
        if self.path == ":memory:" {
            "sqlite::memory:".into()
        } else if self.path.starts_with("sqlite:") {
            self.path.clone()
        } else {
            format!("sqlite:{}?mode=rwc", self.path)
        }
    }

    /// Human-readable location of the store with the password masked, for logs.
    pub fn redacted_url(&self) -> String {
        match self.backend {
            StoreBackend::Postgres => {
                let auth = match (&self.user, &self.password) {
                    (Some(user), Some(_)) => format!("{user}:***@"),
                    (Some(user), None) => format!("{user}@"),
                    _ => String::new(),
                };
                format!(
                    "postgres://{auth}{}:{}/{}",
                    self.host, self.port, self.database
                )
            }
            StoreBackend::Sqlite => self.sqlite_url(),
        }
    }
}
