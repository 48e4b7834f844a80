//! Pipeline configuration
//!
//! Loads `netpulse.toml` and validates cross-field invariants up front, so
//! a bad threshold pair or negative delta floor fails at startup instead of
//! mid-run.
//!
//! # Configuration Format
//!
//! ```toml
//! # netpulse.toml
//!
//! [source]
//! owner = "acme"
//! repo = "network-topology"
//! path = "Data/network_topology.json"
//! branch = "main"
//!
//! [output]
//! owner = "acme"
//! repo = "topology-scored"
//! snapshot_path = "Data/network_topology_scored.json"
//!
//! [thresholds]
//! suspicious = 0.5
//! malicious = 0.8
//!
//! [diff]
//! delta_min = 0.0
//! emit_removals = false
//! duplicate_keys = "last-wins"
//! ```

use serde::Deserialize;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("no API token found: pass --token or set NETPULSE_TOKEN / GITHUB_TOKEN")]
    MissingToken,
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    pub source: SourceConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub thresholds: Thresholds,
    #[serde(default)]
    pub diff: DiffConfig,
}

/// Where the raw snapshot is read from. Read-only.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub owner: String,
    pub repo: String,
    pub path: String,
    #[serde(default = "default_branch")]
    pub branch: String,
}

/// Where the run artifacts are published.
#[derive(Debug, Clone, Deserialize)]
pub struct OutputConfig {
    pub owner: String,
    pub repo: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    pub snapshot_path: String,
    #[serde(default = "default_changes_latest")]
    pub changes_latest: String,
    #[serde(default = "default_changes_history_dir")]
    pub changes_history_dir: String,
    #[serde(default = "default_state_index")]
    pub state_index: String,
    #[serde(default = "default_sandbox_path")]
    pub sandbox_path: String,
}

/// Score thresholds for the status classifier. Must satisfy
/// `suspicious <= malicious`; checked by [`Settings::validate`].
#[derive(Debug, Clone, Copy, Deserialize)]
pub struct Thresholds {
    #[serde(default = "default_suspicious")]
    pub suspicious: f64,
    #[serde(default = "default_malicious")]
    pub malicious: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            suspicious: default_suspicious(),
            malicious: default_malicious(),
        }
    }
}

/// Change-detection policies.
#[derive(Debug, Clone, Copy, Deserialize, Default)]
pub struct DiffConfig {
    /// Score movement at or below this magnitude is not a change.
    #[serde(default)]
    pub delta_min: f64,
    /// Emit `removed_node` records for nodes absent from the new snapshot.
    #[serde(default)]
    pub emit_removals: bool,
    #[serde(default)]
    pub duplicate_keys: DuplicateKeyPolicy,
}

/// What to do when two nodes in one snapshot derive the same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DuplicateKeyPolicy {
    /// Later occurrences replace earlier ones during key indexing.
    #[default]
    LastWins,
    /// Duplicate keys abort the run as a data-quality error.
    Reject,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_changes_latest() -> String {
    "Data/changes/latest.json".to_string()
}

fn default_changes_history_dir() -> String {
    "Data/changes/history".to_string()
}

fn default_state_index() -> String {
    "Data/state/index.json".to_string()
}

fn default_sandbox_path() -> String {
    "Data/pipeline_write_test.json".to_string()
}

fn default_suspicious() -> f64 {
    0.5
}

fn default_malicious() -> f64 {
    0.8
}

/// Load and validate configuration from a TOML file.
pub fn load_settings(path: &Path) -> Result<Settings, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    let settings: Settings = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;
    settings.validate()?;
    debug!(config = %path.display(), "loaded configuration");
    Ok(settings)
}

impl Settings {
    /// Check cross-field invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.thresholds.suspicious > self.thresholds.malicious {
            return Err(ConfigError::Invalid(format!(
                "thresholds.suspicious ({}) must not exceed thresholds.malicious ({})",
                self.thresholds.suspicious, self.thresholds.malicious
            )));
        }
        if self.diff.delta_min < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "diff.delta_min must be non-negative, got {}",
                self.diff.delta_min
            )));
        }
        for (field, value) in [
            ("source.owner", &self.source.owner),
            ("source.repo", &self.source.repo),
            ("source.path", &self.source.path),
            ("output.owner", &self.output.owner),
            ("output.repo", &self.output.repo),
            ("output.snapshot_path", &self.output.snapshot_path),
        ] {
            if value.is_empty() {
                return Err(ConfigError::Invalid(format!("{field} must not be empty")));
            }
        }
        Ok(())
    }
}

/// Resolve the store API token: an explicit `--token` / `NETPULSE_TOKEN`
/// value wins, then the conventional `GITHUB_TOKEN`.
pub fn resolve_token(explicit: Option<String>) -> Result<String, ConfigError> {
    explicit
        .or_else(|| std::env::var("GITHUB_TOKEN").ok())
        .filter(|token| !token.is_empty())
        .ok_or(ConfigError::MissingToken)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MINIMAL: &str = r#"
[source]
owner = "acme"
repo = "topology"
path = "Data/network_topology.json"

[output]
owner = "acme"
repo = "topology-scored"
snapshot_path = "Data/network_topology_scored.json"
"#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(contents.as_bytes()).expect("write config");
        file
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let file = write_config(MINIMAL);
        let settings = load_settings(file.path()).expect("load");

        assert_eq!(settings.source.branch, "main");
        assert_eq!(settings.output.changes_latest, "Data/changes/latest.json");
        assert_eq!(settings.output.changes_history_dir, "Data/changes/history");
        assert_eq!(settings.output.state_index, "Data/state/index.json");
        assert_eq!(settings.thresholds.suspicious, 0.5);
        assert_eq!(settings.thresholds.malicious, 0.8);
        assert_eq!(settings.diff.delta_min, 0.0);
        assert!(!settings.diff.emit_removals);
        assert_eq!(settings.diff.duplicate_keys, DuplicateKeyPolicy::LastWins);
    }

    #[test]
    fn test_inverted_thresholds_rejected() {
        let config = format!("{MINIMAL}\n[thresholds]\nsuspicious = 0.9\nmalicious = 0.5\n");
        let file = write_config(&config);
        let err = load_settings(file.path()).expect_err("must reject");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_negative_delta_min_rejected() {
        let config = format!("{MINIMAL}\n[diff]\ndelta_min = -0.1\n");
        let file = write_config(&config);
        let err = load_settings(file.path()).expect_err("must reject");
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_duplicate_key_policy_parses() {
        let config = format!("{MINIMAL}\n[diff]\nduplicate_keys = \"reject\"\n");
        let file = write_config(&config);
        let settings = load_settings(file.path()).expect("load");
        assert_eq!(settings.diff.duplicate_keys, DuplicateKeyPolicy::Reject);
    }

    #[test]
    fn test_missing_file_is_read_error() {
        let err = load_settings(Path::new("/nonexistent/netpulse.toml")).expect_err("must fail");
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_explicit_token_wins() {
        let token = resolve_token(Some("tok_explicit".to_string())).expect("token");
        assert_eq!(token, "tok_explicit");
    }

    #[test]
    fn test_empty_token_is_missing() {
        // An empty explicit token must not mask a missing credential.
        std::env::remove_var("GITHUB_TOKEN");
        assert!(matches!(
            resolve_token(Some(String::new())),
            Err(ConfigError::MissingToken)
        ));
    }
}
