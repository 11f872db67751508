//! Client configuration management.
//!
//! Configuration is stored as TOML:
//! - Linux: `~/.config/resumable/client.toml`
//! - Windows: `%APPDATA%/resumable/client.toml`

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use resumable_protocol::Dialect;
use resumable_upload::UploadOptions;
use serde::{Deserialize, Serialize};

/// Client configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Creation endpoint new uploads are POSTed to.
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Wire dialect spoken to the server.
    #[serde(default)]
    pub dialect: Dialect,

    /// Maximum bytes sent per PATCH request.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Delays between retries in milliseconds; one retry per entry.
    #[serde(default = "default_retry_delays_ms")]
    pub retry_delays_ms: Vec<u64>,

    /// Number of concurrently uploaded parts (1 = no split).
    #[serde(default = "default_parallel_uploads")]
    pub parallel_uploads: usize,

    /// Requests in flight at once (0 = unlimited).
    #[serde(default)]
    pub concurrency_limit: usize,

    /// Resumption store file. Defaults to `<config dir>/resumable/uploads.json`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub store_path: Option<PathBuf>,

    /// Drop the stored record once an upload completes.
    #[serde(default)]
    pub remove_fingerprint_on_success: bool,

    /// Extra headers sent with every request.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

fn default_endpoint() -> String {
    "http://localhost:1080/files/".into()
}

fn default_chunk_size() -> u64 {
    resumable_transfer::DEFAULT_CHUNK_SIZE as u64
}

fn default_retry_delays_ms() -> Vec<u64> {
    vec![0, 1000, 3000, 5000]
}

fn default_parallel_uploads() -> usize {
    1
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            dialect: Dialect::default(),
            chunk_size: default_chunk_size(),
            retry_delays_ms: default_retry_delays_ms(),
            parallel_uploads: default_parallel_uploads(),
            concurrency_limit: 0,
            store_path: None,
            remove_fingerprint_on_success: false,
            headers: BTreeMap::new(),
        }
    }
}

impl Config {
    /// Loads configuration from the default location, creating it if missing.
    pub fn load() -> anyhow::Result<Self> {
        Self::load_from(&config_path()?)
    }

    /// Loads configuration from `path`, or writes and returns the defaults
    /// if there is nothing there yet.
    pub fn load_from(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Config = toml::from_str(&content)?;
            Ok(config)
        } else {
            let config = Config::default();
            config.save_to(path)?;
            Ok(config)
        }
    }

    /// Writes the configuration to `path`.
    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;

        // Custom headers often carry credentials.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
        }

        tracing::debug!(path = %path.display(), "configuration saved");
        Ok(())
    }

    /// Upload options for this configuration.
    pub fn upload_options(&self) -> UploadOptions {
        UploadOptions {
            dialect: self.dialect,
            chunk_size: self.chunk_size,
            retry_delays: self
                .retry_delays_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            parallel_uploads: self.parallel_uploads,
            remove_fingerprint_on_success: self.remove_fingerprint_on_success,
            headers: self
                .headers
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            ..UploadOptions::new(self.endpoint.clone())
        }
    }

    /// Where resumption records are kept.
    pub fn resolved_store_path(&self) -> anyhow::Result<PathBuf> {
        self.store_path
            .clone()
            .or_else(resumable_store::default_store_path)
            .ok_or_else(|| anyhow::anyhow!("no store path configured and no config directory found"))
    }
}

/// Returns the platform-specific configuration file path.
pub fn config_path() -> anyhow::Result<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        Ok(PathBuf::from(home)
            .join(".config")
            .join("resumable")
            .join("client.toml"))
    }

    #[cfg(target_os = "windows")]
    {
        let appdata =
            std::env::var("APPDATA").unwrap_or_else(|_| "C:\\Users\\Default\\AppData".into());
        Ok(PathBuf::from(appdata).join("resumable").join("client.toml"))
    }

    #[cfg(not(any(target_os = "linux", target_os = "windows")))]
    {
        Ok(PathBuf::from("/tmp/resumable/client.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = Config::default();
        assert_eq!(config.endpoint, "http://localhost:1080/files/");
        assert_eq!(config.dialect, Dialect::TusV1);
        assert_eq!(config.chunk_size, 4 * 1024 * 1024);
        assert_eq!(config.retry_delays_ms, [0, 1000, 3000, 5000]);
        assert_eq!(config.parallel_uploads, 1);
        assert_eq!(config.concurrency_limit, 0);
        assert!(config.store_path.is_none());
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let toml_str = r#"
            endpoint = "https://up.example.com/files/"
            dialect = "ietf-draft-05"

            [headers]
            Authorization = "Bearer abc"
        "#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.endpoint, "https://up.example.com/files/");
        assert_eq!(config.dialect, Dialect::IetfDraft05);
        assert_eq!(config.chunk_size, default_chunk_size());
        assert_eq!(config.headers["Authorization"], "Bearer abc");
    }

    #[test]
    fn unknown_dialect_is_rejected() {
        assert!(toml::from_str::<Config>(r#"dialect = "tus-v2""#).is_err());
    }

    #[test]
    fn load_creates_defaults_then_reads_back() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("client.toml");

        let created = Config::load_from(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created, Config::default());

        let edited = Config {
            parallel_uploads: 3,
            store_path: Some(tmp.path().join("uploads.json")),
            ..Config::default()
        };
        edited.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), edited);
    }

    #[test]
    fn upload_options_carry_settings() {
        let mut config = Config {
            chunk_size: 1024,
            retry_delays_ms: vec![10, 20],
            ..Config::default()
        };
        config.headers.insert("X-Tenant".into(), "a".into());

        let options = config.upload_options();
        assert_eq!(options.endpoint.as_deref(), Some("http://localhost:1080/files/"));
        assert_eq!(options.chunk_size, 1024);
        assert_eq!(
            options.retry_delays,
            [Duration::from_millis(10), Duration::from_millis(20)]
        );
        assert_eq!(options.headers, [("X-Tenant".to_string(), "a".to_string())]);
    }

    #[test]
    fn explicit_store_path_wins() {
        let config = Config {
            store_path: Some(PathBuf::from("/data/uploads.json")),
            ..Config::default()
        };
        assert_eq!(
            config.resolved_store_path().unwrap(),
            PathBuf::from("/data/uploads.json")
        );
    }
}
