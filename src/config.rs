//! Configuration management for rendermedic
//!
//! Settings are layered: built-in defaults, then the user file in
//! `~/.config/rendermedic/config.toml`, then `rendermedic.toml` in the
//! project root. CLI flags are applied last by the binary.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const PROJECT_CONFIG_FILE: &str = "rendermedic.toml";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Attempts of the whole strategy chain before the nuclear fallback
    pub max_retries: usize,
    /// Upper bound on the backoff sleep between attempts
    pub max_backoff_secs: u64,
    /// Suffix appended to a file name for its pre-fix backup
    pub backup_suffix: String,
    /// Work directory name, relative to the project root
    pub work_dir: String,
    /// Files copied into every session snapshot; `name.*` matches any extension
    pub critical_paths: Vec<String>,
    /// Exact substrings the nuclear fallback knows how to remove
    pub nuclear_patterns: Vec<String>,
    /// Files larger than this are skipped by content strategies
    pub max_file_bytes: u64,
    /// Bound on the on-disk finding cache
    pub max_cache_entries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_retries: 100,
            max_backoff_secs: 30,
            backup_suffix: ".rendermedic.bak".to_string(),
            work_dir: ".rendermedic".to_string(),
            critical_paths: [
                "package.json",
                "index.html",
                "public/index.html",
                "tsconfig.json",
                "vite.config.*",
                "src/main.*",
                "src/index.*",
                "src/App.*",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            nuclear_patterns: vec!["Core Providers".to_string()],
            max_file_bytes: 1024 * 1024,
            max_cache_entries: 4096,
        }
    }
}

/// One config layer; absent keys leave the lower layer untouched.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
struct ConfigLayer {
    max_retries: Option<usize>,
    max_backoff_secs: Option<u64>,
    backup_suffix: Option<String>,
    work_dir: Option<String>,
    critical_paths: Option<Vec<String>>,
    nuclear_patterns: Option<Vec<String>>,
    max_file_bytes: Option<u64>,
    max_cache_entries: Option<usize>,
}

impl ConfigLayer {
    fn apply(self, config: &mut Config) {
        if let Some(v) = self.max_retries {
            config.max_retries = v.max(1);
        }
        if let Some(v) = self.max_backoff_secs {
            config.max_backoff_secs = v;
        }
        if let Some(v) = self.backup_suffix.filter(|s| !s.is_empty()) {
            config.backup_suffix = v;
        }
        if let Some(v) = self.work_dir.filter(|s| !s.is_empty()) {
            config.work_dir = v;
        }
        if let Some(v) = self.critical_paths {
            config.critical_paths = v;
        }
        if let Some(v) = self.nuclear_patterns {
            config.nuclear_patterns = v;
        }
        if let Some(v) = self.max_file_bytes {
            config.max_file_bytes = v;
        }
        if let Some(v) = self.max_cache_entries {
            config.max_cache_entries = v;
        }
    }
}

impl Config {
    /// Get the user config file path
    fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("rendermedic").join("config.toml"))
    }

    /// Load layered config for a project, falling back to defaults.
    pub fn load(project_root: &Path) -> Self {
        let mut config = Self::default();
        if let Some(path) = Self::user_config_path() {
            apply_layer_file(&mut config, &path);
        }
        apply_layer_file(&mut config, &project_root.join(PROJECT_CONFIG_FILE));
        config
    }

    /// Parse a single TOML document on top of the defaults.
    pub fn from_toml_str(content: &str) -> Result<Self, toml::de::Error> {
        let layer: ConfigLayer = toml::from_str(content)?;
        let mut config = Self::default();
        layer.apply(&mut config);
        Ok(config)
    }
}

fn apply_layer_file(config: &mut Config, path: &Path) {
    let Ok(content) = fs::read_to_string(path) else {
        return;
    };
    match toml::from_str::<ConfigLayer>(&content) {
        Ok(layer) => layer.apply(config),
        Err(err) => {
            preserve_corrupt_config(path, &content);
            warn!(
                path = %path.display(),
                "config file was corrupted ({}); a backup was saved and it was ignored",
                err
            );
        }
    }
}

fn preserve_corrupt_config(path: &Path, content: &str) {
    let corrupt_path = path.with_extension("toml.corrupt");
    if fs::rename(path, &corrupt_path).is_err() {
        let _ = fs::write(&corrupt_path, content);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.max_retries, 100);
        assert_eq!(config.max_backoff_secs, 30);
        assert!(config.critical_paths.iter().any(|p| p == "src/main.*"));
    }

    #[test]
    fn partial_layer_keeps_other_defaults() {
        let config = Config::from_toml_str("max_retries = 3\nbackup_suffix = \".orig\"\n").unwrap();
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.backup_suffix, ".orig");
        assert_eq!(config.work_dir, ".rendermedic");
    }

    #[test]
    fn zero_retries_is_clamped_to_one() {
        let config = Config::from_toml_str("max_retries = 0").unwrap();
        assert_eq!(config.max_retries, 1);
    }

    #[test]
    fn corrupt_project_config_is_preserved_and_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PROJECT_CONFIG_FILE);
        fs::write(&path, "max_retries = [not toml").unwrap();

        let mut config = Config::default();
        apply_layer_file(&mut config, &path);

        assert_eq!(config, Config::default());
        assert!(!path.exists());
        assert!(dir.path().join("rendermedic.toml.corrupt").exists());
    }
}
