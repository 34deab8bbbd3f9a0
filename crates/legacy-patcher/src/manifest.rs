//! The installed-patch record written onto the patched volume.

use crate::error::{PatchError, PatchResult};
use crate::runner::PrivilegedRunner;
use plist::Value;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info, warn};

pub const NOT_APPLICABLE: &str = "Not applicable";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstalledPatchRecord {
    #[serde(rename = "OpenCore Legacy Patcher")]
    pub patcher_version: String,
    #[serde(rename = "PatcherSupportPkg")]
    pub support_pkg_version: String,
    #[serde(rename = "Time Patched")]
    pub time_patched: String,
    #[serde(rename = "Commit URL")]
    pub commit_url: String,
    #[serde(rename = "Kernel Debug Kit Used")]
    pub kdk_used: String,
    #[serde(rename = "Metal Library Used")]
    pub metal_library_used: String,
    #[serde(rename = "OS Version")]
    pub os_version: String,
    #[serde(rename = "Custom Signature")]
    pub custom_signature: bool,
    /// One dictionary per applied category, keyed by category name.
    #[serde(flatten)]
    pub categories: BTreeMap<String, Value>,
}

impl Default for InstalledPatchRecord {
    fn default() -> Self {
        Self {
            patcher_version: String::new(),
            support_pkg_version: String::new(),
            time_patched: String::new(),
            commit_url: String::new(),
            kdk_used: NOT_APPLICABLE.to_string(),
            metal_library_used: NOT_APPLICABLE.to_string(),
            os_version: String::new(),
            custom_signature: false,
            categories: BTreeMap::new(),
        }
    }
}

impl InstalledPatchRecord {
    pub fn has_category(&self, name: &str) -> bool {
        self.categories.contains_key(name)
    }

    /// KDK path recorded by the last patch, if one was merged.
    pub fn kdk_path(&self) -> Option<&str> {
        (!self.kdk_used.is_empty() && self.kdk_used != NOT_APPLICABLE).then_some(self.kdk_used.as_str())
    }
}

/// `Ok(None)` when no manifest exists. A corrupt manifest is treated as absent.
pub fn read_manifest(path: &Path) -> PatchResult<Option<InstalledPatchRecord>> {
    if !path.exists() {
        return Ok(None);
    }
    match plist::from_file::<_, InstalledPatchRecord>(path) {
        Ok(record) => Ok(Some(record)),
        Err(err) => {
            warn!("ignoring unreadable manifest {}: {err}", path.display());
            Ok(None)
        }
    }
}

/// Serializes into `staging`, then copies next to `dest` and renames over it.
pub fn write_manifest_atomic(
    runner: &dyn PrivilegedRunner,
    record: &InstalledPatchRecord,
    staging: &Path,
    dest: &Path,
) -> PatchResult<()> {
    let staged = tempfile::Builder::new()
        .prefix("patch-manifest")
        .suffix(".plist")
        .tempfile_in(staging)?;
    plist::to_file_xml(staged.path(), record)?;

    let parent = dest
        .parent()
        .ok_or_else(|| PatchError::Manifest(format!("no parent for {}", dest.display())))?;
    let file_name = dest
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| PatchError::Manifest(format!("invalid manifest path {}", dest.display())))?;
    let tmp = parent.join(format!(".{file_name}.tmp"));

    let staged_path = staged.path().to_string_lossy().into_owned();
    let tmp_path = tmp.to_string_lossy().into_owned();
    let dest_path = dest.to_string_lossy().into_owned();
    debug!("staging manifest at {}", staged_path);
    runner.root("/bin/cp", &[&staged_path, &tmp_path])?;
    runner.root("/bin/chmod", &["644", &tmp_path])?;
    runner.root("/bin/mv", &["-f", &tmp_path, &dest_path])?;
    info!("wrote manifest {}", dest.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RecordingRunner;

    fn record() -> InstalledPatchRecord {
        let mut category = plist::Dictionary::new();
        category.insert(
            "Install".to_string(),
            Value::Dictionary({
                let mut dirs = plist::Dictionary::new();
                let mut files = plist::Dictionary::new();
                files.insert("GeForce.kext".to_string(), Value::String("12.0 Beta 6".to_string()));
                dirs.insert("/System/Library/Extensions".to_string(), Value::Dictionary(files));
                dirs
            }),
        );
        let mut record = InstalledPatchRecord {
            patcher_version: "v1.0.0".to_string(),
            os_version: "21.1 (21A5522h)".to_string(),
            ..Default::default()
        };
        record.categories.insert("Nvidia Kepler".to_string(), Value::Dictionary(category));
        record
    }

    #[test]
    fn categories_are_flattened_next_to_header_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("OpenCore-Legacy-Patcher.plist");
        plist::to_file_xml(&path, &record()).unwrap();

        let raw = Value::from_file(&path).unwrap();
        let dict = raw.as_dictionary().unwrap();
        assert_eq!(dict.get("OpenCore Legacy Patcher").and_then(Value::as_string), Some("v1.0.0"));
        assert!(dict.get("Nvidia Kepler").is_some());
        assert_eq!(dict.get("Kernel Debug Kit Used").and_then(Value::as_string), Some(NOT_APPLICABLE));

        let read = read_manifest(&path).unwrap().unwrap();
        assert!(read.has_category("Nvidia Kepler"));
        assert_eq!(read.kdk_path(), None);
        assert_eq!(read.os_version, "21.1 (21A5522h)");
    }

    #[test]
    fn absent_or_corrupt_manifest_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.plist");
        assert!(read_manifest(&path).unwrap().is_none());
        std::fs::write(&path, b"not a plist").unwrap();
        assert!(read_manifest(&path).unwrap().is_none());
    }

    #[test]
    fn atomic_write_goes_through_temp_and_rename() {
        let staging = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new();
        let dest = Path::new("/System/Volumes/Update/mnt1/System/Library/CoreServices/OpenCore-Legacy-Patcher.plist");
        write_manifest_atomic(&runner, &record(), staging.path(), dest).unwrap();
        let lines = runner.lines();
        assert!(lines[0].starts_with("/bin/cp "));
        assert!(lines[0].ends_with("/CoreServices/.OpenCore-Legacy-Patcher.plist.tmp"));
        assert_eq!(
            lines[2],
            "/bin/mv -f /System/Volumes/Update/mnt1/System/Library/CoreServices/.OpenCore-Legacy-Patcher.plist.tmp \
             /System/Volumes/Update/mnt1/System/Library/CoreServices/OpenCore-Legacy-Patcher.plist"
        );
    }
}
