//! Strongly-typed configuration (spec §6), loaded from TOML via the
//! `config` crate into serde `Deserialize` structs, mirroring
//! `infra-common::config` and `rvoip-cli`'s TOML-based loading. Only the
//! *shape* is in scope here; the CLI argument parsing / YAML loader that
//! produces the TOML is an external collaborator (spec.md §1 Non-goals).

use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub server: ServerSection,
    pub database: DatabaseSection,
    pub authentication: AuthenticationSection,
    pub session_timer: SessionTimerSection,
    pub logging: LoggingSection,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            server: ServerSection::default(),
            database: DatabaseSection::default(),
            authentication: AuthenticationSection::default(),
            session_timer: SessionTimerSection::default(),
            logging: LoggingSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub udp_port: u16,
    pub tcp_port: u16,
    pub bind_address: String,
}

impl Default for ServerSection {
    fn default() -> Self {
        ServerSection { udp_port: 5060, tcp_port: 5060, bind_address: "0.0.0.0".to_string() }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSection {
    /// Path for the user + contact storage backend (spec §6). `None`
    /// (an empty string in TOML) means the in-memory reference stores.
    pub path: Option<String>,
}

impl Default for DatabaseSection {
    fn default() -> Self {
        DatabaseSection { path: None }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AuthenticationSection {
    pub realm: String,
    pub nonce_expiry: u64,
    pub require_auth: bool,
}

impl Default for AuthenticationSection {
    fn default() -> Self {
        AuthenticationSection {
            realm: "sipswitch".to_string(),
            nonce_expiry: 300,
            require_auth: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionTimerSection {
    pub min_se: i64,
    pub default_expires: i64,
    pub max_se: i64,
    pub require_support: bool,
}

impl Default for SessionTimerSection {
    fn default() -> Self {
        SessionTimerSection {
            min_se: 90,
            default_expires: 1800,
            max_se: 7200,
            require_support: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        LoggingSection { level: "info".to_string() }
    }
}

impl ServerConfig {
    /// Loads configuration from a TOML file, falling back to the
    /// built-in defaults for any section or key it omits.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path.as_ref()))
            .build()?;
        settings.try_deserialize().map_err(Error::from)
    }

    /// Validates the cross-field invariants spec §6 implies but a plain
    /// `Deserialize` can't express (e.g. `max_se >= default_expires`).
    pub fn validate(&self) -> Result<()> {
        if self.authentication.nonce_expiry < 60 {
            return Err(Error::Custom("authentication.nonce_expiry must be >= 60".to_string()));
        }
        if self.session_timer.min_se < 90 {
            return Err(Error::Custom("session_timer.min_se must be >= 90".to_string()));
        }
        if self.session_timer.default_expires < self.session_timer.min_se {
            return Err(Error::Custom(
                "session_timer.default_expires must be >= session_timer.min_se".to_string(),
            ));
        }
        if self.session_timer.max_se < self.session_timer.default_expires {
            return Err(Error::Custom(
                "session_timer.max_se must be >= session_timer.default_expires".to_string(),
            ));
        }
        Ok(())
    }
}
