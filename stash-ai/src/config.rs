//! Configuration resolution for stash-ai
//!
//! Provides multi-tier resolution of import tuning values with
//! Database → ENV → TOML → default priority, field by field.

use std::time::Duration;

use sqlx::SqlitePool;
use stash_common::config::TomlConfig;
use stash_common::Result;
use tracing::{debug, warn};

pub const DEFAULT_FAN_OUT_LIMIT: usize = 4;
pub const DEFAULT_BATCH_THRESHOLD: usize = 10;
pub const DEFAULT_PAUSE_POLL_MS: u64 = 500;
pub const DEFAULT_POPULATE_TIMEOUT_MS: u64 = 60_000;
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5_000;

/// Resolved import tuning
#[derive(Debug, Clone, PartialEq)]
pub struct ImportConfig {
    /// Items of one import call processed concurrently
    pub fan_out_limit: usize,
    /// Calls with more tasks than this run in batch mode
    pub batch_threshold: usize,
    pub pause_poll_interval: Duration,
    /// Upper bound for a plug-in's population step
    pub populate_timeout: Duration,
    pub max_lock_wait_ms: u64,
    pub default_pool_workers: usize,
    pub batch_pool_workers: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            fan_out_limit: DEFAULT_FAN_OUT_LIMIT,
            batch_threshold: DEFAULT_BATCH_THRESHOLD,
            pause_poll_interval: Duration::from_millis(DEFAULT_PAUSE_POLL_MS),
            populate_timeout: Duration::from_millis(DEFAULT_POPULATE_TIMEOUT_MS),
            max_lock_wait_ms: DEFAULT_MAX_LOCK_WAIT_MS,
            default_pool_workers: 1,
            batch_pool_workers: 1,
        }
    }
}

impl ImportConfig {
    /// Resolve every field from the settings table, environment and TOML
    pub async fn resolve(db: &SqlitePool, toml_config: &TomlConfig) -> Result<Self> {
        let toml_import = &toml_config.import;

        let fan_out_limit = resolve_value(
            db,
            "import_fan_out_limit",
            "STASH_IMPORT_FAN_OUT_LIMIT",
            toml_import.fan_out_limit,
            DEFAULT_FAN_OUT_LIMIT,
        )
        .await?
        .max(1);

        let batch_threshold = resolve_value(
            db,
            "import_batch_threshold",
            "STASH_IMPORT_BATCH_THRESHOLD",
            toml_import.batch_threshold,
            DEFAULT_BATCH_THRESHOLD,
        )
        .await?;

        let pause_poll_ms = resolve_value(
            db,
            "import_pause_poll_ms",
            "STASH_IMPORT_PAUSE_POLL_MS",
            toml_import.pause_poll_ms,
            DEFAULT_PAUSE_POLL_MS,
        )
        .await?
        .max(1);

        let populate_timeout_ms = resolve_value(
            db,
            "import_populate_timeout_ms",
            "STASH_IMPORT_POPULATE_TIMEOUT_MS",
            toml_import.populate_timeout_ms,
            DEFAULT_POPULATE_TIMEOUT_MS,
        )
        .await?;

        let max_lock_wait_ms = resolve_value(
            db,
            "database_max_lock_wait_ms",
            "STASH_DATABASE_MAX_LOCK_WAIT_MS",
            toml_import.max_lock_wait_ms,
            DEFAULT_MAX_LOCK_WAIT_MS,
        )
        .await?;

        Ok(Self {
            fan_out_limit,
            batch_threshold,
            pause_poll_interval: Duration::from_millis(pause_poll_ms),
            populate_timeout: Duration::from_millis(populate_timeout_ms),
            max_lock_wait_ms,
            ..Self::default()
        })
    }
}

/// Resolve one numeric value
///
/// **Priority:** Database → ENV → TOML → default. Unparseable values are
/// logged and skipped so the next tier applies.
async fn resolve_value<T>(
    db: &SqlitePool,
    setting_key: &str,
    env_var: &str,
    toml_value: Option<T>,
    default: T,
) -> Result<T>
where
    T: std::str::FromStr + std::fmt::Display + Copy,
{
    if let Some(raw) = stash_common::db::get_setting(db, setting_key).await? {
        match raw.trim().parse::<T>() {
            Ok(value) => {
                debug!(key = setting_key, %value, "Loaded from database");
                return Ok(value);
            }
            Err(_) => warn!(key = setting_key, raw = %raw, "Ignoring unparseable database setting"),
        }
    }

    if let Ok(raw) = std::env::var(env_var) {
        match raw.trim().parse::<T>() {
            Ok(value) => {
                debug!(key = env_var, %value, "Loaded from environment variable");
                return Ok(value);
            }
            Err(_) => warn!(key = env_var, raw = %raw, "Ignoring unparseable environment variable"),
        }
    }

    if let Some(value) = toml_value {
        debug!(key = setting_key, %value, "Loaded from TOML config");
        return Ok(value);
    }

    Ok(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use stash_common::config::ImportToml;
    use tempfile::TempDir;

    async fn setup() -> (TempDir, SqlitePool) {
        let temp_dir = TempDir::new().unwrap();
        let pool = stash_common::db::init_database(&temp_dir.path().join("stash.db"))
            .await
            .unwrap();
        (temp_dir, pool)
    }

    #[tokio::test]
    #[serial]
    async fn test_defaults_when_nothing_configured() {
        let (_temp_dir, pool) = setup().await;
        std::env::remove_var("STASH_IMPORT_FAN_OUT_LIMIT");

        let config = ImportConfig::resolve(&pool, &TomlConfig::default()).await.unwrap();
        assert_eq!(config, ImportConfig::default());
    }

    #[tokio::test]
    #[serial]
    async fn test_priority_database_env_toml() {
        let (_temp_dir, pool) = setup().await;
        let toml_config = TomlConfig {
            import: ImportToml {
                fan_out_limit: Some(2),
                batch_threshold: Some(20),
                pause_poll_ms: Some(100),
                ..Default::default()
            },
            ..Default::default()
        };

        std::env::set_var("STASH_IMPORT_FAN_OUT_LIMIT", "6");
        std::env::set_var("STASH_IMPORT_BATCH_THRESHOLD", "30");
        stash_common::db::set_setting(&pool, "import_fan_out_limit", "8")
            .await
            .unwrap();

        let config = ImportConfig::resolve(&pool, &toml_config).await.unwrap();

        std::env::remove_var("STASH_IMPORT_FAN_OUT_LIMIT");
        std::env::remove_var("STASH_IMPORT_BATCH_THRESHOLD");

        assert_eq!(config.fan_out_limit, 8);
        assert_eq!(config.batch_threshold, 30);
        assert_eq!(config.pause_poll_interval, Duration::from_millis(100));
        assert_eq!(config.max_lock_wait_ms, DEFAULT_MAX_LOCK_WAIT_MS);
    }

    #[tokio::test]
    #[serial]
    async fn test_unparseable_values_fall_through() {
        let (_temp_dir, pool) = setup().await;
        stash_common::db::set_setting(&pool, "import_populate_timeout_ms", "soon")
            .await
            .unwrap();
        std::env::set_var("STASH_IMPORT_POPULATE_TIMEOUT_MS", "1500");

        let config = ImportConfig::resolve(&pool, &TomlConfig::default()).await.unwrap();
        std::env::remove_var("STASH_IMPORT_POPULATE_TIMEOUT_MS");

        assert_eq!(config.populate_timeout, Duration::from_millis(1500));
    }

    #[tokio::test]
    #[serial]
    async fn test_zero_fan_out_is_clamped() {
        let (_temp_dir, pool) = setup().await;
        stash_common::db::set_setting(&pool, "import_fan_out_limit", "0")
            .await
            .unwrap();

        let config = ImportConfig::resolve(&pool, &TomlConfig::default()).await.unwrap();
        assert_eq!(config.fan_out_limit, 1);
    }
}
