//! Migration configuration module.
//!
//! Handles loading, validating, and merging `config.toml`. Stock defaults are
//! overridden by a user `config.toml` placed in the source root.
//!
//! ## Config File Location
//!
//! ```text
//! content/
//! ├── config.toml              # Overrides stock defaults
//! ├── sources/
//! │   ├── users/
//! │   ├── restaurants/
//! │   └── imagePosts/
//! └── generated/               # Written by `upload`
//! ```
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! [feed]
//! url = ""                  # Paged record feed (required for upload)
//!
//! [publish]
//! enabled = true            # false behaves like --dry-run
//! url = ""                  # Create-post endpoint
//! api_key = ""              # Sent as x-api-key (or set MIGRATE_API_KEY)
//! store_id = ""             # Store for records that name none
//!
//! [cdn]
//! base_url = "https://webmenu.sgp1.cdn.digitaloceanspaces.com"
//! origin_url = "https://webmenu.sgp1.digitaloceanspaces.com"
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::publish::PostSettings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// Environment variable that overrides `publish.api_key`.
pub const API_KEY_ENV: &str = "MIGRATE_API_KEY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Migration configuration loaded from `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MigrateConfig {
    /// Where records come from.
    pub feed: FeedConfig,
    /// Where posts go.
    pub publish: PublishConfig,
    /// Public URL bases for stored blobs.
    pub cdn: CdnConfig,
    /// Parallel processing settings.
    pub processing: ProcessingConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FeedConfig {
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PublishConfig {
    pub enabled: bool,
    pub url: String,
    pub api_key: String,
    /// Store id for records that carry none.
    pub store_id: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: String::new(),
            api_key: String::new(),
            store_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CdnConfig {
    pub base_url: String,
    pub origin_url: String,
}

impl Default for CdnConfig {
    fn default() -> Self {
        Self {
            base_url: "https://webmenu.sgp1.cdn.digitaloceanspaces.com".to_string(),
            origin_url: "https://webmenu.sgp1.digitaloceanspaces.com".to_string(),
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config.max_processes.map(|n| n.min(cores)).unwrap_or(cores)
}

fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

impl MigrateConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, url) in [
            ("feed.url", &self.feed.url),
            ("publish.url", &self.publish.url),
        ] {
            if !url.is_empty() && !is_http_url(url) {
                return Err(ConfigError::Validation(format!(
                    "{key} must be an http(s) URL, got {url:?}"
                )));
            }
        }
        for (key, url) in [
            ("cdn.base_url", &self.cdn.base_url),
            ("cdn.origin_url", &self.cdn.origin_url),
        ] {
            if !is_http_url(url) {
                return Err(ConfigError::Validation(format!(
                    "{key} must be an http(s) URL, got {url:?}"
                )));
            }
        }
        if self.processing.max_processes == Some(0) {
            return Err(ConfigError::Validation(
                "processing.max_processes must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Check the settings an upload run cannot do without.
    pub fn require_upload_settings(&self, publishing: bool) -> Result<(), ConfigError> {
        if self.feed.url.is_empty() {
            return Err(ConfigError::Validation("feed.url is required".into()));
        }
        if publishing {
            if self.publish.url.is_empty() {
                return Err(ConfigError::Validation("publish.url is required".into()));
            }
            if self.publish.api_key.is_empty() {
                return Err(ConfigError::Validation(format!(
                    "publish.api_key is required (or set {API_KEY_ENV})"
                )));
            }
        }
        Ok(())
    }

    /// Replace the API key with `value` when it is set and non-empty.
    pub fn apply_api_key_override(&mut self, value: Option<String>) {
        if let Some(key) = value.filter(|k| !k.is_empty()) {
            self.publish.api_key = key;
        }
    }

    pub fn post_settings(&self) -> PostSettings {
        PostSettings {
            cdn_base_url: self.cdn.base_url.clone(),
            origin_url: self.cdn.origin_url.clone(),
            default_store_id: self.publish.store_id.clone(),
        }
    }
}

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the base layer user overrides are merged onto.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    Ok(toml::Value::try_from(MigrateConfig::default())?)
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a `config.toml` from a directory as a raw TOML value.
///
/// Returns `Ok(None)` if no `config.toml` exists in the directory.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    let config_path = path.join("config.toml");
    if !config_path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(&config_path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<MigrateConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let config: MigrateConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load config from `config.toml` in the given directory.
///
/// Merges user values on top of stock defaults, rejects unknown keys,
/// applies the API key environment override and validates the result.
pub fn load_config(root: &Path) -> Result<MigrateConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(root)?;
    let mut config = resolve_config(base, overlay)?;
    config.apply_api_key_override(std::env::var(API_KEY_ENV).ok());
    Ok(config)
}

/// Returns a fully-commented stock `config.toml` with all keys and explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Media Migrate Configuration
# ===========================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults.
#
# Place this file in the source root (the --source directory).
# Unknown keys will cause an error.

# ---------------------------------------------------------------------------
# Record feed
# ---------------------------------------------------------------------------
[feed]
# Paged record feed, queried as GET <url>?cursor=<cursor>.
# Required by `upload`.
url = ""

# ---------------------------------------------------------------------------
# Post publishing
# ---------------------------------------------------------------------------
[publish]
# Set to false to derive and store renditions without creating posts.
enabled = true

# Create-post endpoint, called as POST <url> with a JSON body.
url = ""

# Sent as the x-api-key header. The MIGRATE_API_KEY environment variable
# takes precedence when set.
api_key = ""

# Store id used for records that do not name one.
store_id = ""

# ---------------------------------------------------------------------------
# Public URLs
# ---------------------------------------------------------------------------
[cdn]
# CDN base for avatar, download and regular URLs.
base_url = "https://webmenu.sgp1.cdn.digitaloceanspaces.com"

# Origin bucket base for the small_s3 URL.
origin_url = "https://webmenu.sgp1.digitaloceanspaces.com"

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel image-processing workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4
"##
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn default_config_has_cdn_urls() {
        let config = MigrateConfig::default();
        assert_eq!(
            config.cdn.base_url,
            "https://webmenu.sgp1.cdn.digitaloceanspaces.com"
        );
        assert!(config.publish.enabled);
        assert!(config.feed.url.is_empty());
    }

    #[test]
    fn parse_partial_config() {
        let toml = r#"
[feed]
url = "https://feed.example.com/records"
"#;
        let config: MigrateConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.feed.url, "https://feed.example.com/records");
        // Defaults preserved
        assert!(config.publish.enabled);
        assert_eq!(config.cdn, CdnConfig::default());
    }

    #[test]
    fn load_config_returns_default_when_no_file() {
        let tmp = TempDir::new().unwrap();
        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.cdn, CdnConfig::default());
        assert_eq!(config.processing.max_processes, None);
    }

    #[test]
    fn load_config_reads_file() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("config.toml"),
            r#"
[publish]
url = "https://api.example.com/post"
store_id = "store-1"

[cdn]
base_url = "https://cdn.example.com"
"#,
        )
        .unwrap();

        let config = load_config(tmp.path()).unwrap();
        assert_eq!(config.publish.url, "https://api.example.com/post");
        assert_eq!(config.publish.store_id, "store-1");
        assert_eq!(config.cdn.base_url, "https://cdn.example.com");
        // Unspecified values should be defaults
        assert_eq!(config.cdn.origin_url, CdnConfig::default().origin_url);
        assert!(config.publish.enabled);
    }

    #[test]
    fn load_config_invalid_toml_is_error() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("config.toml"), "this is not valid toml [[[").unwrap();

        let result = load_config(tmp.path());
        assert!(matches!(result, Err(ConfigError::Toml(_))));
    }

    #[test]
    fn post_settings_from_config() {
        let mut config = MigrateConfig::default();
        config.publish.store_id = "s".into();
        let settings = config.post_settings();
        assert_eq!(settings.cdn_base_url, config.cdn.base_url);
        assert_eq!(settings.origin_url, config.cdn.origin_url);
        assert_eq!(settings.default_store_id, "s");
    }

    // =========================================================================
    // Threads
    // =========================================================================

    #[test]
    fn effective_threads_auto() {
        let config = ProcessingConfig {
            max_processes: None,
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_clamped_to_cores() {
        let config = ProcessingConfig {
            max_processes: Some(99999),
        };
        let cores = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1);
        assert_eq!(effective_threads(&config), cores);
    }

    #[test]
    fn effective_threads_user_constrains_down() {
        let config = ProcessingConfig {
            max_processes: Some(1),
        };
        assert_eq!(effective_threads(&config), 1);
    }

    // =========================================================================
    // merge_toml tests
    // =========================================================================

    #[test]
    fn merge_toml_table_merge() {
        let base: toml::Value = toml::from_str(
            r#"
[publish]
enabled = true
url = "https://a"
"#,
        )
        .unwrap();
        let overlay: toml::Value = toml::from_str(
            r#"
[publish]
url = "https://b"
"#,
        )
        .unwrap();
        let merged = merge_toml(base, overlay);
        let publish = merged.get("publish").unwrap();
        assert_eq!(publish.get("url").unwrap().as_str(), Some("https://b"));
        // enabled preserved from base
        assert_eq!(publish.get("enabled").unwrap().as_bool(), Some(true));
    }

    #[test]
    fn merge_toml_scalar_override() {
        let base: toml::Value = toml::from_str(r#"a = 1"#).unwrap();
        let overlay: toml::Value = toml::from_str(r#"a = 10"#).unwrap();
        let merged = merge_toml(base, overlay);
        assert_eq!(merged.get("a").unwrap().as_integer(), Some(10));
    }

    // =========================================================================
    // Unknown key rejection tests
    // =========================================================================

    #[test]
    fn unknown_key_rejected() {
        let toml_str = r#"
[publish]
apikey = "x"
"#;
        let result: Result<MigrateConfig, _> = toml::from_str(toml_str);
        let err = result.unwrap_err().to_string();
        assert!(err.contains("unknown field"));
    }

    #[test]
    fn unknown_section_rejected() {
        let result: Result<MigrateConfig, _> = toml::from_str("[feeds]\nurl = \"x\"\n");
        assert!(result.is_err());
    }

    #[test]
    fn unknown_key_rejected_via_load_config() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("config.toml"), "[cdn]\nbase = \"x\"\n").unwrap();
        assert!(load_config(tmp.path()).is_err());
    }

    // =========================================================================
    // Validation tests
    // =========================================================================

    #[test]
    fn validate_default_config_passes() {
        assert!(MigrateConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_non_http_urls() {
        let mut config = MigrateConfig::default();
        config.feed.url = "ftp://feed".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("feed.url"));

        let mut config = MigrateConfig::default();
        config.cdn.base_url = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_processes() {
        let mut config = MigrateConfig::default();
        config.processing.max_processes = Some(0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn load_config_validates_values() {
        let tmp = TempDir::new().unwrap();
        fs::write(
            tmp.path().join("config.toml"),
            "[publish]\nurl = \"not a url\"\n",
        )
        .unwrap();
        assert!(matches!(
            load_config(tmp.path()),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn upload_requires_feed_url() {
        let config = MigrateConfig::default();
        let err = config.require_upload_settings(false).unwrap_err();
        assert!(err.to_string().contains("feed.url"));
    }

    #[test]
    fn publishing_requires_url_and_key() {
        let mut config = MigrateConfig::default();
        config.feed.url = "https://feed".into();
        assert!(config.require_upload_settings(false).is_ok());
        assert!(config.require_upload_settings(true).is_err());

        config.publish.url = "https://api".into();
        let err = config.require_upload_settings(true).unwrap_err();
        assert!(err.to_string().contains(API_KEY_ENV));

        config.publish.api_key = "secret".into();
        assert!(config.require_upload_settings(true).is_ok());
    }

    #[test]
    fn api_key_override() {
        let mut config = MigrateConfig::default();
        config.publish.api_key = "from-file".into();

        config.apply_api_key_override(None);
        assert_eq!(config.publish.api_key, "from-file");

        config.apply_api_key_override(Some(String::new()));
        assert_eq!(config.publish.api_key, "from-file");

        config.apply_api_key_override(Some("from-env".into()));
        assert_eq!(config.publish.api_key, "from-env");
    }

    // =========================================================================
    // stock config tests
    // =========================================================================

    #[test]
    fn stock_config_toml_roundtrips_to_defaults() {
        let config: MigrateConfig = toml::from_str(stock_config_toml()).unwrap();
        assert_eq!(config, MigrateConfig::default());
    }

    #[test]
    fn stock_config_toml_contains_all_sections() {
        let content = stock_config_toml();
        for section in ["[feed]", "[publish]", "[cdn]", "[processing]"] {
            assert!(content.contains(section), "missing {section}");
        }
    }

    #[test]
    fn stock_defaults_value_has_all_sections() {
        let val = stock_defaults_value().unwrap();
        assert!(val.is_table());
        for section in ["feed", "publish", "cdn", "processing"] {
            assert!(val.get(section).is_some(), "missing {section}");
        }
    }
}
