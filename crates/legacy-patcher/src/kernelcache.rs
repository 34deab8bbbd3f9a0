//! Kernel cache, preboot and dyld cache regeneration after files change.

use crate::error::{PatchError, PatchResult};
use crate::runner::PrivilegedRunner;
use phoenix_core::kernel::{BIG_SUR, CATALINA, VENTURA};
use phoenix_core::OsInfo;
use plist::Value;
use std::path::Path;
use tracing::{info, warn};

const AUX_KC_INSTRUCTIONS: &str =
    "private/var/db/KernelExtensionManagement/AuxKC/CurrentAuxKC/com.apple.kcgen.instructions.plist";
const KEXT_POLICY_FILES: [&str; 3] = ["KextPolicy", "KextPolicy-shm", "KextPolicy-wal"];

/// Which cache the running OS boots from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    /// Ventura+ without a KDK: only `/Library/Extensions` is rebuilt.
    AuxiliaryCollection,
    /// Big Sur+: Boot, System and optionally Auxiliary collections.
    BootSystemCollections,
    /// Catalina and older.
    PrelinkedKernel,
}

#[derive(Debug, Clone, Copy)]
pub struct KernelCacheRebuild<'a> {
    pub os: &'a OsInfo,
    pub mount: &'a Path,
    /// Data-volume kexts were installed, so kmutil must skip authorization.
    pub needs_exemptions: bool,
    pub aux_only: bool,
    /// Recorded commands have no output to validate.
    pub dry_run: bool,
}

impl KernelCacheRebuild<'_> {
    pub fn kind(&self) -> CacheKind {
        let major = self.os.major();
        if major >= VENTURA && self.aux_only {
            CacheKind::AuxiliaryCollection
        } else if major >= BIG_SUR {
            CacheKind::BootSystemCollections
        } else {
            CacheKind::PrelinkedKernel
        }
    }

    fn collection(&self, name: &str) -> String {
        self.mount
            .join("System/Library/KernelCollections")
            .join(name)
            .to_string_lossy()
            .into_owned()
    }

    pub fn kmutil_args(&self) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();
        match self.kind() {
            CacheKind::AuxiliaryCollection => {
                args.extend(["create", "--allow-missing-kdk", "--new", "aux"].map(String::from));
                args.push("--boot-path".to_string());
                args.push(self.collection("BootKernelExtensions.kc"));
                args.push("--system-path".to_string());
                args.push(self.collection("SystemKernelExtensions.kc"));
            }
            CacheKind::BootSystemCollections => {
                if self.os.major() >= VENTURA {
                    args.extend(["create", "--allow-missing-kdk"].map(String::from));
                } else {
                    args.push("install".to_string());
                }
                args.push("--volume-root".to_string());
                args.push(self.mount.to_string_lossy().into_owned());
                args.extend(["--update-all", "--variant-suffix", "release"].map(String::from));
                if self.needs_exemptions {
                    args.extend(["--no-authentication", "--no-authorization"].map(String::from));
                }
            }
            CacheKind::PrelinkedKernel => {}
        }
        args
    }

    pub fn run(&self, runner: &dyn PrivilegedRunner) -> PatchResult<()> {
        match self.kind() {
            CacheKind::AuxiliaryCollection => {
                info!("building new auxiliary kernel collection");
                self.kmutil(runner)?;
                force_auxiliary_usage(runner)
            }
            CacheKind::BootSystemCollections => {
                if self.needs_exemptions {
                    info!("rebuilding boot, system and auxiliary kernel collections");
                } else {
                    info!("rebuilding boot and system kernel collections");
                }
                self.kmutil(runner)
            }
            CacheKind::PrelinkedKernel => self.prelinked(runner),
        }
    }

    fn kmutil(&self, runner: &dyn PrivilegedRunner) -> PatchResult<()> {
        let args = self.kmutil_args();
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        let out = runner.run("/usr/bin/kmutil", &args, true)?;
        if !out.success() {
            return Err(PatchError::KernelCacheFailed { output: out.output });
        }
        Ok(())
    }

    fn prelinked(&self, runner: &dyn PrivilegedRunner) -> PatchResult<()> {
        info!("rebuilding prelinked kernel");
        let target = format!("{}/", self.mount.to_string_lossy().trim_end_matches('/'));
        let out = runner.run("/usr/sbin/kextcache", &["-invalidate", &target], true)?;
        // kextcache exits 0 even when it fails.
        if !self.dry_run && !out.output.contains("KernelCache ID") {
            return Err(PatchError::KernelCacheFailed { output: out.output });
        }
        Ok(())
    }
}

/// Nothing else makes kernelmanagerd pick up a freshly built AuxKC.
fn force_auxiliary_usage(runner: &dyn PrivilegedRunner) -> PatchResult<()> {
    info!("forcing auxiliary kernel collection usage");
    let out = runner.run("/usr/bin/killall", &["syspolicyd", "kernelmanagerd"], true)?;
    if !out.success() {
        return Err(PatchError::KernelCacheFailed { output: out.output });
    }
    for file in KEXT_POLICY_FILES {
        let path = format!("/private/var/db/SystemPolicyConfiguration/{file}");
        let out = runner.run("/bin/rm", &[&path], true)?;
        if !out.success() {
            return Err(PatchError::KernelCacheFailed { output: out.output });
        }
    }
    Ok(())
}

/// Catalina keeps a copy of the kernel cache on Preboot.
pub fn update_preboot(runner: &dyn PrivilegedRunner, os: &OsInfo) -> PatchResult<()> {
    if os.major() == CATALINA {
        info!("rebuilding preboot kernel cache");
        runner.root("/usr/sbin/kcditto", &[])?;
    }
    Ok(())
}

pub fn rebuild_dyld_cache(runner: &dyn PrivilegedRunner, os: &OsInfo, mount: &Path) -> PatchResult<()> {
    if os.major() > CATALINA {
        return Ok(());
    }
    info!("rebuilding dyld shared cache");
    let target = format!("{}/", mount.to_string_lossy().trim_end_matches('/'));
    runner.root("/usr/bin/update_dyld_shared_cache", &["-root", &target])?;
    Ok(())
}

/// Kexts not yet in the current AuxKC need user approval in System Settings.
pub fn kext_needs_approval(system_root: &Path, kext: &str) -> bool {
    if !kext.ends_with(".kext") {
        return false;
    }
    let instructions = system_root.join(AUX_KC_INSTRUCTIONS);
    let expected = format!("/Library/Extensions/{kext}");
    let built = match Value::from_file(&instructions) {
        Ok(value) => value,
        Err(err) => {
            if instructions.exists() {
                warn!("unreadable {}: {err}", instructions.display());
            }
            return true;
        }
    };
    let already_built = built
        .as_dictionary()
        .and_then(|dict| dict.get("kextsToBuild"))
        .map(|kexts| match kexts {
            Value::Dictionary(entries) => entries.values().any(|entry| bundle_path_is(entry, &expected)),
            Value::Array(entries) => entries.iter().any(|entry| bundle_path_is(entry, &expected)),
            _ => false,
        })
        .unwrap_or(false);
    !already_built
}

fn bundle_path_is(entry: &Value, expected: &str) -> bool {
    entry
        .as_dictionary()
        .and_then(|dict| dict.get("bundlePathMainOS"))
        .and_then(Value::as_string)
        == Some(expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::RecordingRunner;
    use phoenix_core::KernelVersion;

    fn rebuild<'a>(os: &'a OsInfo, mount: &'a Path, needs_exemptions: bool, aux_only: bool) -> KernelCacheRebuild<'a> {
        KernelCacheRebuild {
            os,
            mount,
            needs_exemptions,
            aux_only,
            dry_run: false,
        }
    }

    #[test]
    fn monterey_installs_with_exemptions() {
        let os = OsInfo::new(KernelVersion::new(21, 6), "21G115", "12.5");
        let mount = Path::new("/System/Volumes/Update/mnt1");
        let runner = RecordingRunner::new();
        rebuild(&os, mount, true, false).run(&runner).unwrap();
        assert_eq!(
            runner.lines(),
            vec![
                "/usr/bin/kmutil install --volume-root /System/Volumes/Update/mnt1 --update-all \
                 --variant-suffix release --no-authentication --no-authorization"
                    .to_string()
            ]
        );
    }

    #[test]
    fn ventura_aux_only_rebuilds_aux_and_resets_policy() {
        let os = OsInfo::new(KernelVersion::new(22, 4), "22E261", "13.3");
        let mount = Path::new("/System/Volumes/Update/mnt1");
        let runner = RecordingRunner::new();
        let job = rebuild(&os, mount, true, true);
        assert_eq!(job.kind(), CacheKind::AuxiliaryCollection);
        job.run(&runner).unwrap();
        let lines = runner.lines();
        assert!(lines[0].starts_with("/usr/bin/kmutil create --allow-missing-kdk --new aux --boot-path "));
        assert_eq!(lines[1], "/usr/bin/killall syspolicyd kernelmanagerd");
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[4], "/bin/rm /private/var/db/SystemPolicyConfiguration/KextPolicy-wal");
    }

    #[test]
    fn kmutil_failure_surfaces_output() {
        let os = OsInfo::new(KernelVersion::new(22, 4), "22E261", "13.3");
        let runner = RecordingRunner::new().respond("/usr/bin/kmutil", 71, "Error Domain=KMErrorDomain Code=71");
        let err = rebuild(&os, Path::new("/mnt"), false, false).run(&runner).unwrap_err();
        match &err {
            PatchError::KernelCacheFailed { output } => assert!(output.contains("KMErrorDomain")),
            other => panic!("unexpected {other:?}"),
        }
        assert!(err.requires_reboot());
    }

    #[test]
    fn kextcache_without_id_is_a_failure() {
        let os = OsInfo::new(KernelVersion::new(18, 7), "18G103", "10.14.6");
        let runner = RecordingRunner::new().respond("/usr/sbin/kextcache", 0, "Kext with invalid signature");
        let job = rebuild(&os, Path::new("/"), false, false);
        assert!(job.run(&runner).is_err());
        assert_eq!(runner.lines()[0], "/usr/sbin/kextcache -invalidate /");

        let runner = RecordingRunner::new().respond("/usr/sbin/kextcache", 0, "KernelCache ID: 4F2A");
        job.run(&runner).unwrap();
        update_preboot(&runner, &os).unwrap();
        rebuild_dyld_cache(&runner, &os, Path::new("/")).unwrap();
        assert!(!runner.ran("/usr/sbin/kcditto"));
        assert!(runner.ran("/usr/bin/update_dyld_shared_cache -root /"));
    }

    #[test]
    fn kexts_already_in_aux_kc_need_no_approval() {
        let root = tempfile::tempdir().unwrap();
        let path = root.path().join(AUX_KC_INSTRUCTIONS);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let mut entry = plist::Dictionary::new();
        entry.insert(
            "bundlePathMainOS".to_string(),
            Value::String("/Library/Extensions/AirPortBrcm4360.kext".to_string()),
        );
        let mut dict = plist::Dictionary::new();
        dict.insert("kextsToBuild".to_string(), Value::Array(vec![Value::Dictionary(entry)]));
        Value::Dictionary(dict).to_file_xml(&path).unwrap();

        assert!(!kext_needs_approval(root.path(), "AirPortBrcm4360.kext"));
        assert!(kext_needs_approval(root.path(), "IO80211FamilyLegacy.kext"));
        assert!(!kext_needs_approval(root.path(), "libgtrace.dylib"));
    }
}
