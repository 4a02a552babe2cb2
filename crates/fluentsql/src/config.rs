//! Connection configuration.
//!
//! ```json
//! {
//!   "driver": "mysql",
//!   "host": "127.0.0.1",
//!   "port": 3306,
//!   "database": "shop",
//!   "user": "app",
//!   "password": "ENC:8d1f...",
//!   "max_pool_size": 20,
//!   "idle_timeout_ms": 600000,
//!   "debug": true
//! }
//! ```

use crate::dialect::Dialect;
use crate::error::{DbError, DbResult};
use crate::record::DEFAULT_MAX_BLOB_BYTES;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Prefix marking an encrypted password.
pub const ENCRYPTED_PREFIX: &str = "ENC:";

/// Database driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    #[default]
    Postgres,
    Mysql,
}

impl Driver {
    pub fn dialect(self) -> Dialect {
        match self {
            Driver::Postgres => Dialect::Postgres,
            Driver::Mysql => Dialect::MySql,
        }
    }
}

fn default_max_pool_size() -> usize {
    16
}

fn default_max_blob_bytes() -> usize {
    DEFAULT_MAX_BLOB_BYTES
}

/// Pool and execution settings, usually loaded from JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    pub driver: Driver,
    /// Full connection URL; the discrete fields below override its parts.
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub database: Option<String>,
    pub user: Option<String>,
    /// Plain or `ENC:`-prefixed password.
    pub password: Option<String>,
    pub min_pool_size: usize,
    #[serde(default = "default_max_pool_size")]
    pub max_pool_size: usize,
    pub max_lifetime_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
    /// Bounds both connecting and waiting for a free pooled connection.
    pub connection_timeout_ms: Option<u64>,
    pub statement_timeout_ms: Option<u64>,
    /// Escape quotes and backslashes in bound text values.
    pub injection_filter: bool,
    /// Emit statement text, elapsed time and result size at `debug`.
    pub debug: bool,
    #[serde(default = "default_max_blob_bytes")]
    pub max_blob_bytes: usize,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            driver: Driver::default(),
            url: None,
            host: None,
            port: None,
            database: None,
            user: None,
            password: None,
            min_pool_size: 0,
            max_pool_size: default_max_pool_size(),
            max_lifetime_ms: None,
            idle_timeout_ms: None,
            connection_timeout_ms: None,
            statement_timeout_ms: None,
            injection_filter: false,
            debug: false,
            max_blob_bytes: default_max_blob_bytes(),
        }
    }
}

impl DbConfig {
    /// Configuration for `url`; the driver is taken from the URL scheme.
    pub fn from_url(url: impl Into<String>) -> DbResult<Self> {
        let url = url.into();
        let driver = match url.split_once("://").map(|(scheme, _)| scheme) {
            Some("postgres" | "postgresql") => Driver::Postgres,
            Some("mysql" | "mariadb") => Driver::Mysql,
            Some(other) => {
                return Err(DbError::config(format!("unsupported URL scheme: {other}")));
            }
            None => return Err(DbError::config(format!("not a database URL: {url}"))),
        };
        Ok(Self {
            driver,
            url: Some(url),
            ..Self::default()
        })
    }

    pub fn from_json(json: &str) -> DbResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> DbResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    /// Check pool bounds and that some target is set.
    pub fn validate(&self) -> DbResult<()> {
        if self.url.is_none() && self.host.is_none() {
            return Err(DbError::config("either url or host must be set"));
        }
        if self.max_pool_size == 0 {
            return Err(DbError::config("max_pool_size must be at least 1"));
        }
        if self.min_pool_size > self.max_pool_size {
            return Err(DbError::config(format!(
                "min_pool_size ({}) exceeds max_pool_size ({})",
                self.min_pool_size, self.max_pool_size
            )));
        }
        Ok(())
    }

    pub fn dialect(&self) -> Dialect {
        self.driver.dialect()
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_lifetime_ms.map(Duration::from_millis)
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout_ms.map(Duration::from_millis)
    }

    pub fn connection_timeout(&self) -> Option<Duration> {
        self.connection_timeout_ms.map(Duration::from_millis)
    }

    pub fn statement_timeout(&self) -> Option<Duration> {
        self.statement_timeout_ms.map(Duration::from_millis)
    }

    /// The password to connect with, decrypted if it carries the `ENC:` prefix.
    pub fn resolve_password(&self, decryptor: &dyn PasswordDecryptor) -> DbResult<Option<String>> {
        match &self.password {
            Some(p) => match p.strip_prefix(ENCRYPTED_PREFIX) {
                Some(cipher) => decryptor.decrypt(cipher).map(Some),
                None => Ok(Some(p.clone())),
            },
            None => Ok(None),
        }
    }

    pub fn with_driver(mut self, driver: Driver) -> Self {
        self.driver = driver;
        self
    }

    pub fn with_host(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = Some(host.into());
        self.port = Some(port);
        self
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }

    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_pool_size(mut self, min: usize, max: usize) -> Self {
        self.min_pool_size = min;
        self.max_pool_size = max;
        self
    }

    pub fn with_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime_ms = Some(lifetime.as_millis() as u64);
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_connection_timeout(mut self, timeout: Duration) -> Self {
        self.connection_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_statement_timeout(mut self, timeout: Duration) -> Self {
        self.statement_timeout_ms = Some(timeout.as_millis() as u64);
        self
    }

    pub fn with_injection_filter(mut self, enabled: bool) -> Self {
        self.injection_filter = enabled;
        self
    }

    pub fn with_debug(mut self, enabled: bool) -> Self {
        self.debug = enabled;
        self
    }

    pub fn with_max_blob_bytes(mut self, max: usize) -> Self {
        self.max_blob_bytes = max;
        self
    }
}

/// Decrypts `ENC:`-prefixed passwords.
pub trait PasswordDecryptor: Send + Sync {
    /// Decrypt `cipher_text` (the password without its prefix).
    fn decrypt(&self, cipher_text: &str) -> DbResult<String>;
}

/// Decryptor used when none is configured: encrypted passwords are an error.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDecryptor;

impl PasswordDecryptor for NoDecryptor {
    fn decrypt(&self, _cipher_text: &str) -> DbResult<String> {
        Err(DbError::config(
            "password is encrypted but no PasswordDecryptor is configured",
        ))
    }
}

impl<F> PasswordDecryptor for F
where
    F: Fn(&str) -> DbResult<String> + Send + Sync,
{
    fn decrypt(&self, cipher_text: &str) -> DbResult<String> {
        self(cipher_text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_defaults() {
        let config = DbConfig::from_json(r#"{"driver":"mysql","host":"db","port":3306}"#).unwrap();
        assert_eq!(config.driver, Driver::Mysql);
        assert_eq!(config.dialect(), Dialect::MySql);
        assert_eq!(config.max_pool_size, 16);
        assert_eq!(config.max_blob_bytes, DEFAULT_MAX_BLOB_BYTES);
        assert!(!config.debug);
        assert_eq!(config.idle_timeout(), None);
    }

    #[test]
    fn json_rejects_bad_pool_bounds() {
        let err = DbConfig::from_json(
            r#"{"url":"postgres://localhost/db","min_pool_size":5,"max_pool_size":2}"#,
        )
        .unwrap_err();
        assert!(matches!(err, DbError::Configuration(_)));
        assert!(DbConfig::from_json("{}").is_err());
        assert!(DbConfig::from_json("not json").is_err());
    }

    #[test]
    fn driver_from_url_scheme() {
        assert_eq!(
            DbConfig::from_url("mysql://u:p@localhost/db").unwrap().driver,
            Driver::Mysql
        );
        assert_eq!(
            DbConfig::from_url("postgresql://localhost/db").unwrap().driver,
            Driver::Postgres
        );
        assert!(DbConfig::from_url("sqlite://x").is_err());
    }

    #[test]
    fn encrypted_password_needs_decryptor() {
        let config = DbConfig::default().with_credentials("app", "ENC:abc");
        assert!(config.resolve_password(&NoDecryptor).is_err());

        let reverse = |cipher: &str| -> DbResult<String> { Ok(cipher.chars().rev().collect()) };
        assert_eq!(
            config.resolve_password(&reverse).unwrap().as_deref(),
            Some("cba")
        );

        let plain = DbConfig::default().with_credentials("app", "secret");
        assert_eq!(
            plain.resolve_password(&NoDecryptor).unwrap().as_deref(),
            Some("secret")
        );
    }

    #[test]
    fn setters_convert_durations() {
        let config = DbConfig::default()
            .with_idle_timeout(Duration::from_secs(2))
            .with_statement_timeout(Duration::from_millis(150));
        assert_eq!(config.idle_timeout_ms, Some(2000));
        assert_eq!(config.statement_timeout(), Some(Duration::from_millis(150)));
    }
}
