use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// Host state the decision engine reads besides the hardware itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentSnapshot {
    pub boot_args: String,
    /// Raw `csr-active-config`, decoded little-endian. `None` when NVRAM has no entry.
    pub csr_active_config: Option<u32>,
    pub secure_boot_model: Option<String>,
    pub filevault_enabled: bool,
    /// Contents of the `OCLP-Settings` NVRAM variable.
    pub oclp_settings: String,
    pub nvda_drv_set: bool,
    pub loaded_kexts: BTreeSet<String>,
    pub foreign_patcher_marker: bool,
    pub network_available: bool,
    pub kdk: Option<KdkArtifact>,
}

impl EnvironmentSnapshot {
    pub fn boot_args(&self) -> impl Iterator<Item = &str> {
        self.boot_args.split_whitespace()
    }

    pub fn has_boot_arg(&self, arg: &str) -> bool {
        self.boot_args().any(|value| value == arg)
    }

    /// Value of `key=value` style boot arguments.
    pub fn boot_arg_value(&self, key: &str) -> Option<&str> {
        self.boot_args().find_map(|value| {
            value
                .strip_prefix(key)
                .and_then(|rest| rest.strip_prefix('='))
        })
    }

    pub fn kext_loaded(&self, bundle_id: &str) -> bool {
        self.loaded_kexts.contains(bundle_id)
    }
}

/// A Kernel Debug Kit already resolved to a local path by an external resolver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdkArtifact {
    pub root: PathBuf,
    pub build: String,
    pub checksum: Option<KdkChecksum>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdkChecksum {
    pub archive: PathBuf,
    pub sha256: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_boot_arg_values() {
        let env = EnvironmentSnapshot {
            boot_args: "-v amfi=0x80 ngfxgl=1 -wegnoegpu".to_string(),
            ..Default::default()
        };
        assert_eq!(env.boot_arg_value("amfi"), Some("0x80"));
        assert_eq!(env.boot_arg_value("ngfxgl"), Some("1"));
        assert!(env.has_boot_arg("-wegnoegpu"));
        assert!(!env.has_boot_arg("-v2"));
        assert_eq!(env.boot_arg_value("ngfx"), None);
    }
}
