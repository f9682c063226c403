use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use tracing::warn;

pub const DEFAULT_DB_PATH: &str = "./data/techpack.sqlite";
pub const DEFAULT_AUTOSAVE_MS: u64 = 1000;
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// Engine configuration loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Local SQLite file holding drafts and the list cache.
    pub db_path: PathBuf,
    /// Idle interval before a pending draft is written.
    pub autosave_idle: Duration,
    pub default_page_size: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            autosave_idle: Duration::from_millis(DEFAULT_AUTOSAVE_MS),
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

fn parse_or<T: FromStr + Copy>(key: &str, raw: Option<String>, default: T, valid: fn(&T) -> bool) -> T {
    let Some(raw) = raw else {
        return default;
    };
    match raw.trim().parse::<T>() {
        Ok(value) if valid(&value) => value,
        _ => {
            warn!(key, value = %raw, "malformed config value, using default");
            default
        }
    }
}

impl EngineConfig {
    /// Load configuration from the process environment, reading `.env` first
    /// when one exists.
    ///
    /// | Env Var                | Default                    |
    /// |------------------------|----------------------------|
    /// | `TECHPACK_DB_PATH`     | `./data/techpack.sqlite`   |
    /// | `TECHPACK_AUTOSAVE_MS` | `1000`                     |
    /// | `TECHPACK_PAGE_SIZE`   | `10`                       |
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let db_path = lookup("TECHPACK_DB_PATH")
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH));

        let autosave_ms = parse_or(
            "TECHPACK_AUTOSAVE_MS",
            lookup("TECHPACK_AUTOSAVE_MS"),
            DEFAULT_AUTOSAVE_MS,
            |_| true,
        );
        let default_page_size = parse_or(
            "TECHPACK_PAGE_SIZE",
            lookup("TECHPACK_PAGE_SIZE"),
            DEFAULT_PAGE_SIZE,
            |size| *size > 0,
        );

        Self {
            db_path,
            autosave_idle: Duration::from_millis(autosave_ms),
            default_page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_when_unset() {
        assert_eq!(EngineConfig::from_lookup(lookup(&[])), EngineConfig::default());
    }

    #[test]
    fn reads_overrides() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("TECHPACK_DB_PATH", "/tmp/tp.sqlite"),
            ("TECHPACK_AUTOSAVE_MS", "250"),
            ("TECHPACK_PAGE_SIZE", "25"),
        ]));
        assert_eq!(config.db_path, PathBuf::from("/tmp/tp.sqlite"));
        assert_eq!(config.autosave_idle, Duration::from_millis(250));
        assert_eq!(config.default_page_size, 25);
    }

    #[test]
    fn malformed_values_fall_back() {
        let config = EngineConfig::from_lookup(lookup(&[
            ("TECHPACK_AUTOSAVE_MS", "soon"),
            ("TECHPACK_PAGE_SIZE", "0"),
        ]));
        assert_eq!(config.autosave_idle, Duration::from_millis(DEFAULT_AUTOSAVE_MS));
        assert_eq!(config.default_page_size, DEFAULT_PAGE_SIZE);
    }
}
