//! Root volume mounting and APFS snapshot handling.

use crate::error::{PatchError, PatchResult};
use crate::runner::PrivilegedRunner;
use phoenix_core::kernel::{BIG_SUR, CATALINA};
use phoenix_core::{OsInfo, PatcherConfig};
use plist::Value;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::{error, info, warn};

pub const SYSTEM_VERSION_PLIST: &str = "System/Library/CoreServices/SystemVersion.plist";
const NON_SYSTEM_VOLUME: &str = "Can't use last-sealed-snapshot or create-snapshot on non system volume";

/// Booted root device, e.g. `disk1s1` for `/dev/disk1s1s1`.
pub fn root_device(runner: &dyn PrivilegedRunner) -> PatchResult<String> {
    let out = runner.run("/usr/sbin/diskutil", &["info", "-plist", "/"], false)?;
    if !out.success() {
        return Err(PatchError::MountFailed(format!("diskutil exited with {}", out.code)));
    }
    let info = Value::from_reader(Cursor::new(out.output.as_bytes()))
        .map_err(|err| PatchError::MountFailed(format!("unreadable diskutil output: {err}")))?;
    let dict = info
        .as_dictionary()
        .ok_or_else(|| PatchError::MountFailed("diskutil output is not a dictionary".to_string()))?;
    let disk = dict
        .get("DeviceIdentifier")
        .and_then(Value::as_string)
        .filter(|disk| !disk.is_empty())
        .ok_or_else(|| PatchError::MountFailed("no DeviceIdentifier for /".to_string()))?;
    let snapshot = dict.get("APFSSnapshot").and_then(Value::as_boolean).unwrap_or(false);
    if snapshot {
        // disk1s1s1 -> disk1s1
        let trimmed = disk.char_indices().rev().nth(1).map(|(idx, _)| &disk[..idx]).unwrap_or(disk);
        return Ok(trimmed.to_string());
    }
    Ok(disk.to_string())
}

/// Makes the root volume writable and returns where it lives.
pub fn mount_root(runner: &dyn PrivilegedRunner, os: &OsInfo, config: &PatcherConfig) -> PatchResult<PathBuf> {
    let major = os.major();
    if major < CATALINA {
        return Ok(config.system_root.clone());
    }
    if major == CATALINA {
        runner
            .root("/sbin/mount", &["-uw", "/"])
            .map_err(|err| PatchError::MountFailed(err.to_string()))?;
        return Ok(config.system_root.clone());
    }

    let mount = config.mount_point.clone();
    if mount.join(SYSTEM_VERSION_PLIST).exists() {
        info!("root volume already mounted at {}", mount.display());
        return Ok(mount);
    }
    let device = root_device(runner)?;
    let node = format!("/dev/{device}");
    let target = mount.to_string_lossy().into_owned();
    runner
        .root("/sbin/mount", &["-o", "nobrowse", "-t", "apfs", &node, &target])
        .map_err(|err| {
            error!("failed to mount {}: {}", node, err);
            PatchError::MountFailed(err.to_string())
        })?;
    info!("mounted {} at {}", node, mount.display());
    Ok(mount)
}

/// Best-effort. Returns whether the volume was released.
pub fn unmount_root(runner: &dyn PrivilegedRunner, os: &OsInfo, mount: &Path) -> bool {
    let major = os.major();
    if major < CATALINA {
        return true;
    }
    let target = mount.to_string_lossy().into_owned();
    let result = if major == CATALINA {
        runner.root("/sbin/umount", &["-uw", &target])
    } else {
        runner.root("/sbin/umount", &[&target])
    };
    match result {
        Ok(_) => true,
        Err(err) => {
            warn!("unmount of {} failed: {}", mount.display(), err);
            false
        }
    }
}

/// The mounted volume must be the one the running kernel booted from.
/// A pending update leaves a different build on the mount.
pub fn verify_mounted_build(mount: &Path, os: &OsInfo, dry_run: bool) -> PatchResult<()> {
    let path = mount.join(SYSTEM_VERSION_PLIST);
    if !path.exists() {
        if dry_run {
            return Ok(());
        }
        return Err(PatchError::PreconditionMissing { path });
    }
    let version = Value::from_file(&path)?;
    let build = version
        .as_dictionary()
        .and_then(|dict| dict.get("ProductBuildVersion"))
        .and_then(Value::as_string)
        .unwrap_or_default();
    if build != os.build {
        return Err(PatchError::PreconditionFailed(format!(
            "mounted volume is build {build}, running {}",
            os.build
        )));
    }
    Ok(())
}

/// Seals the mutated volume into a new bootable snapshot (Big Sur and newer).
pub fn create_snapshot(runner: &dyn PrivilegedRunner, os: &OsInfo, mount: &Path, arm_or_rosetta: bool) -> PatchResult<()> {
    if os.major() < BIG_SUR {
        return Ok(());
    }
    let target = mount.to_string_lossy().into_owned();
    let folder = mount.join("System/Library/CoreServices").to_string_lossy().into_owned();
    let args: Vec<&str> = if arm_or_rosetta {
        vec!["--mount", &target, "--create-snapshot"]
    } else {
        vec!["--folder", &folder, "--bootefi", "--create-snapshot"]
    };
    let out = runner.run("/usr/sbin/bless", &args, true)?;
    if !out.success() {
        let hint = out.output.contains(NON_SYSTEM_VOLUME).then(|| {
            "The booted volume is not the system volume. Disable FileVault or boot the patched install, then retry."
                .to_string()
        });
        return Err(PatchError::SnapshotFailed {
            output: out.output,
            hint,
        });
    }
    info!("created boot snapshot");
    Ok(())
}

/// Boots the last Apple-sealed snapshot again.
pub fn revert_snapshot(runner: &dyn PrivilegedRunner, os: &OsInfo, mount: &Path) -> PatchResult<()> {
    if os.major() < BIG_SUR {
        return Ok(());
    }
    let target = mount.to_string_lossy().into_owned();
    let out = runner.run("/usr/sbin/bless", &["--mount", &target, "--bootefi", "--last-sealed-snapshot"], true)?;
    if !out.success() {
        let hint = out
            .output
            .contains(NON_SYSTEM_VOLUME)
            .then(|| "Snapshot revert is only possible from the booted system volume.".to_string());
        return Err(PatchError::SnapshotFailed {
            output: out.output,
            hint,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RecordingRunner;
    use phoenix_core::KernelVersion;

    const DISKUTIL_SNAPSHOT: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE plist PUBLIC "-//Apple//DTD PLIST 1.0//EN" "http://www.apple.com/DTDs/PropertyList-1.0.dtd">
<plist version="1.0">
<dict>
    <key>APFSSnapshot</key>
    <true/>
    <key>DeviceIdentifier</key>
    <string>disk1s5s1</string>
</dict>
</plist>"#;

    fn config(mount: &Path) -> PatcherConfig {
        PatcherConfig {
            mount_point: mount.to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn snapshot_suffix_is_stripped() {
        let runner = RecordingRunner::new().respond("/usr/sbin/diskutil", 0, DISKUTIL_SNAPSHOT);
        assert_eq!(root_device(&runner).unwrap(), "disk1s5");
    }

    #[test]
    fn big_sur_mounts_the_snapshot_device() {
        let dir = tempfile::tempdir().unwrap();
        let runner = RecordingRunner::new().respond("/usr/sbin/diskutil", 0, DISKUTIL_SNAPSHOT);
        let os = OsInfo::new(KernelVersion::new(22, 4), "22E261", "13.3");
        let mount = mount_root(&runner, &os, &config(dir.path())).unwrap();
        assert_eq!(mount, dir.path());
        let expected = format!("/sbin/mount -o nobrowse -t apfs /dev/disk1s5 {}", dir.path().display());
        assert!(runner.lines().contains(&expected));
    }

    #[test]
    fn existing_mount_is_reused() {
        let dir = tempfile::tempdir().unwrap();
        let plist = dir.path().join(SYSTEM_VERSION_PLIST);
        std::fs::create_dir_all(plist.parent().unwrap()).unwrap();
        std::fs::write(&plist, "").unwrap();
        let runner = RecordingRunner::new();
        let os = OsInfo::new(KernelVersion::new(21, 6), "21G115", "12.5");
        mount_root(&runner, &os, &config(dir.path())).unwrap();
        assert!(runner.lines().is_empty());
    }

    #[test]
    fn catalina_remounts_root_in_place() {
        let runner = RecordingRunner::new();
        let os = OsInfo::new(KernelVersion::new(19, 6), "19H15", "10.15.7");
        let mount = mount_root(&runner, &os, &PatcherConfig::default()).unwrap();
        assert_eq!(mount, PathBuf::from("/"));
        assert_eq!(runner.lines(), vec!["/sbin/mount -uw /".to_string()]);
        assert!(unmount_root(&runner, &os, &mount));
        assert_eq!(runner.lines()[1], "/sbin/umount -uw /");
    }

    #[test]
    fn bless_non_system_volume_carries_hint() {
        let runner = RecordingRunner::new().respond("/usr/sbin/bless", 1, NON_SYSTEM_VOLUME);
        let os = OsInfo::new(KernelVersion::new(22, 0), "22A380", "13.0");
        let err = create_snapshot(&runner, &os, Path::new("/System/Volumes/Update/mnt1"), false).unwrap_err();
        assert!(matches!(err, PatchError::SnapshotFailed { hint: Some(_), .. }));
        assert!(err.requires_reboot());
        assert_eq!(
            runner.lines()[0],
            "/usr/sbin/bless --folder /System/Volumes/Update/mnt1/System/Library/CoreServices --bootefi --create-snapshot"
        );
    }

    #[test]
    fn mismatched_build_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let plist = dir.path().join(SYSTEM_VERSION_PLIST);
        std::fs::create_dir_all(plist.parent().unwrap()).unwrap();
        let mut dict = plist::Dictionary::new();
        dict.insert("ProductBuildVersion".to_string(), Value::String("22E261".to_string()));
        Value::Dictionary(dict).to_file_xml(&plist).unwrap();
        let os = OsInfo::new(KernelVersion::new(22, 5), "22F66", "13.4");
        assert!(verify_mounted_build(dir.path(), &os, false).is_err());
        let os = OsInfo::new(KernelVersion::new(22, 4), "22E261", "13.3");
        assert!(verify_mounted_build(dir.path(), &os, false).is_ok());

        let empty = tempfile::tempdir().unwrap();
        assert!(matches!(
            verify_mounted_build(empty.path(), &os, false),
            Err(PatchError::PreconditionMissing { .. })
        ));
        assert!(verify_mounted_build(empty.path(), &os, true).is_ok());
    }
}
