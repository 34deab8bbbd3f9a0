use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_MOUNT_POINT: &str = "/System/Volumes/Update/mnt1";
pub const MANIFEST_RELPATH: &str = "System/Library/CoreServices/OpenCore-Legacy-Patcher.plist";

/// Per-invocation settings. Built once, then only borrowed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatcherConfig {
    pub patcher_version: String,
    pub support_pkg_version: String,
    pub commit_url: String,
    /// Root of the versioned payload tree: `<payload_root>/<tag>/<dir>/<file>`.
    pub payload_root: PathBuf,
    pub report_base: PathBuf,
    /// Data volume root. `/` on a live system.
    pub system_root: PathBuf,
    pub mount_point: PathBuf,
    pub manifest_relpath: PathBuf,
    pub user_home: Option<PathBuf>,
    pub force_nvidia_web: bool,
    pub dry_run: bool,
}

impl Default for PatcherConfig {
    fn default() -> Self {
        Self {
            patcher_version: env!("CARGO_PKG_VERSION").to_string(),
            support_pkg_version: "1.0.0".to_string(),
            commit_url: String::new(),
            payload_root: PathBuf::from("payloads/Universal-Binaries"),
            report_base: PathBuf::from("."),
            system_root: PathBuf::from("/"),
            mount_point: PathBuf::from(DEFAULT_MOUNT_POINT),
            manifest_relpath: PathBuf::from(MANIFEST_RELPATH),
            user_home: None,
            force_nvidia_web: false,
            dry_run: false,
        }
    }
}

impl PatcherConfig {
    /// Reads a JSON config file, then applies `PHOENIX_*` environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => {
                let data = std::fs::read_to_string(path)
                    .with_context(|| format!("read config {}", path.display()))?;
                serde_json::from_str(&data)
                    .with_context(|| format!("parse config {}", path.display()))?
            }
            None => Self::default(),
        };
        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Ok(value) = std::env::var("PHOENIX_PAYLOADS") {
            self.payload_root = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var("PHOENIX_REPORT_BASE") {
            self.report_base = PathBuf::from(value);
        }
        if self.user_home.is_none() {
            self.user_home = std::env::var_os("HOME").map(PathBuf::from);
        }
    }

    /// Absolute path of a data-volume location such as `/Library/Extensions`.
    pub fn data_path(&self, absolute: &str) -> PathBuf {
        self.system_root.join(absolute.trim_start_matches('/'))
    }

    /// Path of the manifest on the booted volume.
    pub fn installed_manifest_path(&self) -> PathBuf {
        self.system_root.join(&self.manifest_relpath)
    }

    /// Path of the manifest on the writable mount.
    pub fn mounted_manifest_path(&self, mount: &Path) -> PathBuf {
        mount.join(&self.manifest_relpath)
    }

    pub fn payload_path(&self, tag: &str, dir: &str, file: &str) -> PathBuf {
        self.payload_root
            .join(tag)
            .join(dir.trim_start_matches('/'))
            .join(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{ "force_nvidia_web": true, "commit_url": "https://example.invalid/commit" }"#).unwrap();
        let config = PatcherConfig::load(Some(&path)).unwrap();
        assert!(config.force_nvidia_web);
        assert_eq!(config.mount_point, PathBuf::from(DEFAULT_MOUNT_POINT));
        assert_eq!(config.commit_url, "https://example.invalid/commit");
    }

    #[test]
    fn payload_path_joins_tag_dir_and_file() {
        let config = PatcherConfig {
            payload_root: PathBuf::from("/payloads"),
            ..Default::default()
        };
        assert_eq!(
            config.payload_path("10.13.6", "/System/Library/Extensions", "GeForceTesla.kext"),
            PathBuf::from("/payloads/10.13.6/System/Library/Extensions/GeForceTesla.kext")
        );
    }

    #[test]
    fn data_path_is_rooted_at_system_root() {
        let config = PatcherConfig {
            system_root: PathBuf::from("/tmp/root"),
            ..Default::default()
        };
        assert_eq!(config.data_path("/Library/Extensions"), PathBuf::from("/tmp/root/Library/Extensions"));
    }
}
