//! Configuration loading.
//!
//! Replaces the Python original's dynamic `dict`-based config with a typed
//! struct. The loader accepts both the legacy TitleCase keys the original
//! JSON documents use (`Device_id`, `Table_name`, ...) and their lower
//! camelCase equivalents via `#[serde(alias = ...)]`, and resolves every
//! path field against the directory containing the config file — not the
//! process's current working directory — exactly once, at load time.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("missing required config key: {0}")]
    MissingKey(&'static str),

    #[error("empty table name")]
    EmptyTableName,
}

pub type Result<T> = std::result::Result<T, ConfigError>;

fn default_flush_interval() -> f64 {
    1.0
}

fn default_heartbeat_interval() -> f64 {
    10.0
}

fn default_network_check_host() -> String {
    "8.8.8.8".to_string()
}

fn default_network_check_interval() -> f64 {
    5.0
}

fn default_network_check_fail_threshold() -> u32 {
    2
}

/// Raw, as-deserialized configuration document. Field names are the
/// canonical lower-case keys; legacy TitleCase keys from the original
/// JSON documents are accepted as aliases.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(alias = "Device_id")]
    pub device_id: String,

    #[serde(alias = "Starting_entry_no")]
    pub starting_entry_no: i32,

    #[serde(alias = "Table_name")]
    pub table_name: String,

    #[serde(alias = "db_save_interval", default = "default_flush_interval")]
    pub db_flush_interval_sec: f64,

    #[serde(default = "default_heartbeat_interval")]
    pub db_heartbeat_interval_sec: f64,

    pub log_file_path: PathBuf,

    #[serde(default)]
    pub state_file: Option<PathBuf>,

    #[serde(default)]
    pub spool_file: Option<PathBuf>,

    #[serde(default)]
    pub spool_offset_file: Option<PathBuf>,

    #[serde(alias = "Scanner_input_device", default)]
    pub scanner_input_device: Option<String>,

    #[serde(alias = "Scanner_device_filter", default)]
    pub scanner_device_filter: Option<String>,

    #[serde(default)]
    pub scanner_user_map: HashMap<String, String>,

    #[serde(default)]
    pub user_id: Option<String>,

    #[serde(default)]
    pub sql_connection_string: Option<String>,

    #[serde(default)]
    pub speaker_enabled: bool,

    #[serde(default)]
    pub voice_files: HashMap<String, PathBuf>,

    #[serde(default = "default_network_check_host")]
    pub network_check_host: String,

    #[serde(default = "default_network_check_interval")]
    pub network_check_interval_sec: f64,

    #[serde(default = "default_network_check_fail_threshold")]
    pub network_check_fail_threshold: u32,

    /// Directory the config file lives in. Not part of the JSON document;
    /// filled in by `load` and used to resolve the relative path fields
    /// above. `#[serde(skip)]` keeps it out of (de)serialization.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl Config {
    /// Loads and validates a config document, resolving its relative path
    /// fields against `path`'s parent directory.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut cfg: Config = serde_json::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;

        if cfg.table_name.trim().is_empty() {
            return Err(ConfigError::EmptyTableName);
        }

        cfg.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        cfg.resolve_paths();
        Ok(cfg)
    }

    fn resolve_paths(&mut self) {
        self.log_file_path = self.resolve(&self.log_file_path);
        self.state_file = self.state_file.as_ref().map(|p| self.resolve(p));
        self.spool_file = self.spool_file.as_ref().map(|p| self.resolve(p));
        self.spool_offset_file = self.spool_offset_file.as_ref().map(|p| self.resolve(p));
        let voice_files = std::mem::take(&mut self.voice_files);
        self.voice_files = voice_files
            .into_iter()
            .map(|(name, p)| (name, self.resolve(&p)))
            .collect();
    }

    fn resolve(&self, p: &Path) -> PathBuf {
        if p.is_absolute() {
            p.to_path_buf()
        } else {
            self.base_dir.join(p)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(dir: &Path, json: &str) -> PathBuf {
        let path = dir.join("config.json");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(json.as_bytes()).unwrap();
        path
    }

    #[test]
    fn accepts_legacy_title_case_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"{
                "Device_id": "D1",
                "Starting_entry_no": 1,
                "Table_name": "scans",
                "db_save_interval": 2.0,
                "log_file_path": "log/scan.log"
            }"#,
        );
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.device_id, "D1");
        assert_eq!(cfg.db_flush_interval_sec, 2.0);
    }

    #[test]
    fn resolves_relative_paths_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"{
                "device_id": "D1",
                "starting_entry_no": 1,
                "table_name": "scans",
                "log_file_path": "log/scan.log",
                "spool_file": "spool/spool.jsonl"
            }"#,
        );
        let cfg = Config::load(&path).unwrap();
        assert_eq!(cfg.log_file_path, dir.path().join("log/scan.log"));
        assert_eq!(cfg.spool_file, Some(dir.path().join("spool/spool.jsonl")));
    }

    #[test]
    fn empty_table_name_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_config(
            dir.path(),
            r#"{
                "device_id": "D1",
                "starting_entry_no": 1,
                "table_name": "  ",
                "log_file_path": "log/scan.log"
            }"#,
        );
        assert!(matches!(Config::load(&path), Err(ConfigError::EmptyTableName)));
    }
}
