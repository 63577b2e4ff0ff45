//! Bridge configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.tether/
//!   config.yaml              (mode 0600, optional; defaults apply when absent)
//!   run/
//!     host-<version>.sock    (one socket per host product version)
//! ```
//!
//! # API pattern
//!
//! Same two-form API as the rest of the workspace:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// What the reconciler does with the change scope when a native creation
/// call fails part-way through a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommitPolicy {
    /// Commit only when every object applied cleanly; otherwise roll back.
    #[default]
    OnSuccess,
    /// Commit whatever was applied, failures included.
    Always,
}

impl std::str::FromStr for CommitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "on_success" | "on-success" => Ok(CommitPolicy::OnSuccess),
            "always" => Ok(CommitPolicy::Always),
            other => Err(format!(
                "unknown commit policy '{other}'; expected: on_success, always"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Host product version this bridge serves; selects the socket name.
    pub host_version: String,
    /// How long a request handler waits for the host thread.
    pub wait_timeout_ms: u64,
    /// Client-side read/write timeout on the socket.
    pub client_timeout_ms: u64,
    /// Sleep between idle ticks on the host thread.
    pub idle_interval_ms: u64,
    pub queue_capacity: usize,
    pub commit_policy: CommitPolicy,
    /// Height given to walls drawn from a single curve.
    pub default_wall_height: f64,
    /// Vertical nudge applied to the hosting probe.
    pub probe_offset: f64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host_version: "2024".to_string(),
            wait_timeout_ms: 200,
            client_timeout_ms: 10_000,
            idle_interval_ms: 15,
            queue_capacity: 64,
            commit_policy: CommitPolicy::OnSuccess,
            default_wall_height: 10.0,
            probe_offset: 0.1,
        }
    }
}

impl BridgeConfig {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }

    pub fn client_timeout(&self) -> Duration {
        Duration::from_millis(self.client_timeout_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }
}

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.tether/`
pub fn tether_dir_at(home: &Path) -> PathBuf {
    home.join(".tether")
}

/// `<home>/.tether/config.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    tether_dir_at(home).join("config.yaml")
}

/// `<home>/.tether/run/`
pub fn run_dir_at(home: &Path) -> PathBuf {
    tether_dir_at(home).join("run")
}

/// `<home>/.tether/run/host-<version>.sock`
pub fn socket_path_at(home: &Path, host_version: &str) -> PathBuf {
    run_dir_at(home).join(format!("host-{host_version}.sock"))
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load `<home>/.tether/config.yaml`, or defaults when the file is absent.
///
/// Returns `CoreError::Parse` (with path + line context) if malformed YAML.
pub fn load_at(home: &Path) -> Result<BridgeConfig, CoreError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(BridgeConfig::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    serde_yaml::from_str(&contents).map_err(|e| CoreError::Parse { path, source: e })
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<BridgeConfig, CoreError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save the configuration.
///
/// Write flow: serialize → `config.yaml.tmp` sibling → `chmod 0600` → `rename`.
pub fn save_at(home: &Path, config: &BridgeConfig) -> Result<(), CoreError> {
    let dir = tether_dir_at(home);
    if !dir.exists() {
        std::fs::create_dir_all(&dir)?;
        set_dir_permissions(&dir)?;
    }
    let path = config_path_at(home);
    let tmp_path = path.with_file_name("config.yaml.tmp");

    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    set_file_permissions(&tmp_path)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(())
}

/// `save_at` convenience wrapper.
pub fn save(config: &BridgeConfig) -> Result<(), CoreError> {
    save_at(&home()?, config)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

pub fn home() -> Result<PathBuf, CoreError> {
    dirs::home_dir().ok_or(CoreError::HomeNotFound)
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), CoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    Ok(())
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), CoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn socket_path_carries_version() {
        let home = TempDir::new().expect("tempdir");
        let path = socket_path_at(home.path(), "2025");
        assert!(path.ends_with(".tether/run/host-2025.sock"));
    }

    #[test]
    fn missing_config_yields_defaults() {
        let home = TempDir::new().expect("tempdir");
        let cfg = load_at(home.path()).expect("load");
        assert_eq!(cfg, BridgeConfig::default());
        assert_eq!(cfg.wait_timeout(), Duration::from_millis(200));
        assert_eq!(cfg.commit_policy, CommitPolicy::OnSuccess);
    }

    #[test]
    fn save_and_load_roundtrip() {
        let home = TempDir::new().expect("tempdir");
        let cfg = BridgeConfig {
            host_version: "2023".into(),
            commit_policy: CommitPolicy::Always,
            ..BridgeConfig::default()
        };
        save_at(home.path(), &cfg).expect("save");
        assert!(!config_path_at(home.path())
            .with_file_name("config.yaml.tmp")
            .exists());
        assert_eq!(load_at(home.path()).expect("load"), cfg);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let home = TempDir::new().expect("tempdir");
        std::fs::create_dir_all(tether_dir_at(home.path())).expect("mkdir");
        std::fs::write(config_path_at(home.path()), "wait_timeout_ms: 50\n").expect("write");
        let cfg = load_at(home.path()).expect("load");
        assert_eq!(cfg.wait_timeout_ms, 50);
        assert_eq!(cfg.host_version, "2024");
    }

    #[test]
    fn commit_policy_from_str() {
        assert_eq!("always".parse::<CommitPolicy>(), Ok(CommitPolicy::Always));
        assert!("sometimes".parse::<CommitPolicy>().is_err());
    }
}
