//! Service settings loaded via OrthoConfig.
//!
//! Values come from CLI flags, `QUEUE_ADMIN_*` environment variables, and
//! configuration files, in OrthoConfig's usual precedence order.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;

const DEFAULT_PORT: u16 = 8080;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_POOL_MAX_SIZE: u32 = 10;
const DEFAULT_CACHE_TICK_SECS: u64 = 10;

fn non_zero_or<T: Copy + PartialEq + From<u8>>(value: T, fallback: T) -> T {
    if value == T::from(0) { fallback } else { value }
}

/// Raised when a setting required at startup is absent.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SettingsError {
    /// No usable database URL was supplied.
    #[error("database URL is not configured; set QUEUE_ADMIN_DATABASE_URL or --database-url")]
    MissingDatabaseUrl,
}

/// Settings for the admin service.
#[derive(Debug, Clone, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "QUEUE_ADMIN")]
pub struct AdminSettings {
    /// PostgreSQL connection string for the job queue database.
    pub database_url: Option<String>,
    /// Listen address.
    pub bind_addr: Option<SocketAddr>,
    /// Directory holding the single-page app build.
    pub static_dir: Option<PathBuf>,
    /// Per-request deadline in seconds.
    #[ortho_config(default = 10)]
    pub request_timeout_secs: u64,
    /// Maximum pooled database connections.
    #[ortho_config(default = 10)]
    pub pool_max_size: u32,
    /// Base refresh period of the state-count cache, in seconds.
    #[ortho_config(default = 10)]
    pub cache_tick_secs: u64,
}

impl AdminSettings {
    /// The configured database URL.
    ///
    /// # Errors
    /// Returns [`SettingsError::MissingDatabaseUrl`] when unset or blank.
    pub fn database_url(&self) -> Result<&str, SettingsError> {
        self.database_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
            .ok_or(SettingsError::MissingDatabaseUrl)
    }

    /// The listen address, defaulting to port 8080 on all interfaces.
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
            .unwrap_or_else(|| SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_PORT)))
    }

    /// The SPA build directory, if one is configured.
    pub fn static_dir(&self) -> Option<&Path> {
        self.static_dir.as_deref()
    }

    /// Zero falls back to the default.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(non_zero_or(
            self.request_timeout_secs,
            DEFAULT_REQUEST_TIMEOUT_SECS,
        ))
    }

    /// Zero falls back to the default.
    pub fn pool_max_size(&self) -> u32 {
        non_zero_or(self.pool_max_size, DEFAULT_POOL_MAX_SIZE)
    }

    /// Zero falls back to the default.
    pub fn cache_tick_period(&self) -> Duration {
        Duration::from_secs(non_zero_or(self.cache_tick_secs, DEFAULT_CACHE_TICK_SECS))
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for settings parsing.

    use super::*;
    use std::ffi::OsString;

    use env_lock::lock_env;
    use rstest::rstest;

    const VARS: [&str; 6] = [
        "QUEUE_ADMIN_DATABASE_URL",
        "QUEUE_ADMIN_BIND_ADDR",
        "QUEUE_ADMIN_STATIC_DIR",
        "QUEUE_ADMIN_REQUEST_TIMEOUT_SECS",
        "QUEUE_ADMIN_POOL_MAX_SIZE",
        "QUEUE_ADMIN_CACHE_TICK_SECS",
    ];

    fn load_from_empty_args() -> AdminSettings {
        AdminSettings::load_from_iter([OsString::from("queue-admin")])
            .expect("config should load")
    }

    #[rstest]
    fn defaults_apply_when_unset() {
        let _guard = lock_env(VARS.map(|name| (name, None::<String>)));

        let settings = load_from_empty_args();
        assert_eq!(
            settings.database_url(),
            Err(SettingsError::MissingDatabaseUrl)
        );
        assert_eq!(settings.bind_addr(), "0.0.0.0:8080".parse().expect("addr"));
        assert!(settings.static_dir().is_none());
        assert_eq!(settings.request_timeout(), Duration::from_secs(10));
        assert_eq!(settings.pool_max_size(), 10);
        assert_eq!(settings.cache_tick_period(), Duration::from_secs(10));
    }

    #[rstest]
    fn environment_overrides_are_respected() {
        let _guard = lock_env([
            (
                "QUEUE_ADMIN_DATABASE_URL",
                Some("postgres://localhost/river".to_owned()),
            ),
            ("QUEUE_ADMIN_BIND_ADDR", Some("127.0.0.1:9090".to_owned())),
            ("QUEUE_ADMIN_STATIC_DIR", Some("/srv/ui".to_owned())),
            ("QUEUE_ADMIN_REQUEST_TIMEOUT_SECS", Some("3".to_owned())),
            ("QUEUE_ADMIN_POOL_MAX_SIZE", Some("4".to_owned())),
            ("QUEUE_ADMIN_CACHE_TICK_SECS", Some("30".to_owned())),
        ]);

        let settings = load_from_empty_args();
        assert_eq!(settings.database_url(), Ok("postgres://localhost/river"));
        assert_eq!(settings.bind_addr(), "127.0.0.1:9090".parse().expect("addr"));
        assert_eq!(settings.static_dir(), Some(Path::new("/srv/ui")));
        assert_eq!(settings.request_timeout(), Duration::from_secs(3));
        assert_eq!(settings.pool_max_size(), 4);
        assert_eq!(settings.cache_tick_period(), Duration::from_secs(30));
    }

    #[rstest]
    fn zero_durations_fall_back_to_defaults() {
        let _guard = lock_env([
            ("QUEUE_ADMIN_REQUEST_TIMEOUT_SECS", Some("0".to_owned())),
            ("QUEUE_ADMIN_CACHE_TICK_SECS", Some("0".to_owned())),
            ("QUEUE_ADMIN_DATABASE_URL", Some("   ".to_owned())),
        ]);

        let settings = load_from_empty_args();
        assert_eq!(settings.request_timeout(), Duration::from_secs(10));
        assert_eq!(settings.cache_tick_period(), Duration::from_secs(10));
        assert_eq!(
            settings.database_url(),
            Err(SettingsError::MissingDatabaseUrl)
        );
    }
}
