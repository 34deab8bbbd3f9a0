//! The root volume transaction: mount, preflight, apply, seal, unmount, or revert.
//!
//! Steps must run in order. Any failure after the first write leaves the volume
//! mounted and unsealed; the caller has to reboot before trying again.

use crate::compose::{compose, ResolvedCategory, AUX_EXTENSIONS};
use crate::detect::{Decision, PatchFamily, Requirements};
use crate::error::{PatchError, PatchResult};
use crate::helpers;
use crate::kdk::{KdkMerge, KdkOutcome};
use crate::kernelcache::{self, KernelCacheRebuild};
use crate::manifest::{self, InstalledPatchRecord, NOT_APPLICABLE};
use crate::mount;
use crate::patchsets::SKYLIGHT_PLUGINS;
use crate::runner::PrivilegedRunner;
use phoenix_core::kernel::{BIG_SUR, VENTURA};
use phoenix_core::{now_utc_rfc3339, EnvironmentSnapshot, HardwareProfile, OsInfo, PatcherConfig};
use plist::Value;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use time::{Date, Month, OffsetDateTime};
use tracing::{debug, info, warn};

const CORE_DISPLAY_PREFS: &str = "/Library/Preferences/com.apple.CoreDisplay";
const RELOCATED_EXTENSIONS: &str = "/Library/Relocated Extensions";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransactionState {
    Unmounted,
    Mounted,
    Patched,
    Reverted,
}

/// Composed categories plus what the transaction needs from the decision.
#[derive(Debug, Clone)]
pub struct PatchPlan {
    pub families: Vec<PatchFamily>,
    pub categories: Vec<ResolvedCategory>,
    pub requirements: Requirements,
}

impl PatchPlan {
    pub fn new(decision: &Decision, os: &OsInfo) -> Self {
        let categories = compose(&decision.selection, os.kernel);
        Self::from_categories(decision.selected().collect(), categories, decision.settings, os)
    }

    /// In aux-only mode every kext bound for the system volume goes to `/Library/Extensions`.
    pub fn from_categories(
        families: Vec<PatchFamily>,
        mut categories: Vec<ResolvedCategory>,
        requirements: Requirements,
        os: &OsInfo,
    ) -> Self {
        if requirements.aux_kc_only && os.major() >= VENTURA {
            for category in &mut categories {
                for kext in category.redirect_kexts_to_aux() {
                    debug!("{}: {} redirected to {}", category.name, kext, AUX_EXTENSIONS);
                }
            }
        }
        Self {
            families,
            categories,
            requirements,
        }
    }

    pub fn includes(&self, family: PatchFamily) -> bool {
        self.families.contains(&family)
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Preflight {
    pub kdk: Option<KdkOutcome>,
    pub sandy_board: Option<&'static str>,
}

#[derive(Debug, Clone, Default)]
pub struct ApplyOutcome {
    /// Data-volume kexts were installed; kmutil must skip authorization.
    pub needs_exemptions: bool,
    /// Some installed kext is not in the current AuxKC and needs approval in System Settings.
    pub needs_approval: bool,
    pub record: InstalledPatchRecord,
}

pub struct RootPatchTransaction<'a> {
    runner: &'a dyn PrivilegedRunner,
    config: &'a PatcherConfig,
    os: &'a OsInfo,
    state: TransactionState,
    mount: Option<PathBuf>,
    log: Vec<String>,
}

impl<'a> RootPatchTransaction<'a> {
    pub fn new(runner: &'a dyn PrivilegedRunner, config: &'a PatcherConfig, os: &'a OsInfo) -> Self {
        Self {
            runner,
            config,
            os,
            state: TransactionState::Unmounted,
            mount: None,
            log: Vec::new(),
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn mount_path(&self) -> Option<&Path> {
        self.mount.as_deref()
    }

    /// `key=value` lines for the run report.
    pub fn log(&self) -> &[String] {
        &self.log
    }

    fn note(&mut self, key: &str, value: impl std::fmt::Display) {
        self.log.push(format!("{key}={value}"));
    }

    fn require_state(&self, state: TransactionState, step: &str) -> PatchResult<PathBuf> {
        if self.state != state {
            return Err(PatchError::InvalidState(format!(
                "{step} needs {state:?}, transaction is {:?}",
                self.state
            )));
        }
        match (&self.mount, state) {
            (Some(mount), _) => Ok(mount.clone()),
            (None, TransactionState::Unmounted) => Ok(PathBuf::new()),
            (None, _) => Err(PatchError::InvalidState(format!("{step} without a mount"))),
        }
    }

    pub fn mount(&mut self) -> PatchResult<PathBuf> {
        self.require_state(TransactionState::Unmounted, "mount")?;
        let mount = mount::mount_root(self.runner, self.os, self.config)?;
        self.mount = Some(mount.clone());
        self.state = TransactionState::Mounted;
        self.note("mount", mount.display());

        if let Err(err) = mount::verify_mounted_build(&mount, self.os, self.config.dry_run) {
            warn!("sanity check failed, an update may be pending: {}", err);
            self.unmount();
            return Err(err);
        }
        Ok(mount)
    }

    /// Everything that can fail without touching the system volume.
    pub fn preflight(
        &mut self,
        plan: &PatchPlan,
        profile: &HardwareProfile,
        env: &EnvironmentSnapshot,
        installed: Option<&InstalledPatchRecord>,
    ) -> PatchResult<Preflight> {
        let mount = self.require_state(TransactionState::Mounted, "preflight")?;
        info!("running preflight checks");
        self.verify_sources(plan)?;

        self.reset_skylight_plugins()?;
        self.delete_nonmetal_enforcement()?;
        self.clean_auxiliary_kc(installed)?;

        let mut preflight = Preflight::default();
        if plan.includes(PatchFamily::IntelSandyBridge) {
            preflight.sandy_board = helpers::patch_sandy_board_id(&self.config.payload_root, profile, self.config.dry_run)?;
            if let Some(board) = preflight.sandy_board {
                self.note("sandy_board_patched", board);
            }
        }

        if self.os.major() >= VENTURA && !plan.requirements.aux_kc_only {
            let merge = KdkMerge {
                mount: &mount,
                config: self.config,
                env,
                installed,
                preserve_hid_signature: plan.includes(PatchFamily::LegacyUsb11),
            };
            let outcome = merge.run(self.runner)?;
            self.note("kdk", outcome.root().display());
            preflight.kdk = Some(outcome);
        }
        Ok(preflight)
    }

    fn source_path(&self, category: &ResolvedCategory, tag: &str, dir: &str, file: &str) -> PathBuf {
        let dir = category.source_dir(dir, file);
        if tag.starts_with('/') {
            return Path::new(tag).join(dir.trim_start_matches('/')).join(file);
        }
        self.config.payload_path(tag, dir, file)
    }

    fn verify_sources(&self, plan: &PatchPlan) -> PatchResult<()> {
        for category in &plan.categories {
            for map in [&category.install_system, &category.install_data] {
                for (dir, files) in map {
                    for (file, tag) in files {
                        let source = self.source_path(category, tag, dir, file);
                        if !source.exists() {
                            return Err(PatchError::PreconditionMissing { path: source });
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn reset_skylight_plugins(&self) -> PatchResult<()> {
        let plugins = self.config.data_path(SKYLIGHT_PLUGINS);
        let path = plugins.to_string_lossy().into_owned();
        if plugins.exists() {
            info!("removing old SkyLight plugins");
            self.runner.root("/bin/rm", &["-Rf", &path])?;
            self.runner.root("/bin/mkdir", &[&path])?;
        } else {
            self.runner.root("/bin/mkdir", &["-p", &path])?;
        }
        Ok(())
    }

    /// Forced OpenGL/Metal rendering defaults left behind by testing.
    fn delete_nonmetal_enforcement(&self) -> PatchResult<()> {
        let prefs = self.config.data_path(CORE_DISPLAY_PREFS).to_string_lossy().into_owned();
        for key in ["useMetal", "useIOP"] {
            let out = self.runner.run("/usr/bin/defaults", &["read", &prefs, key], false)?;
            if matches!(out.output.trim(), "0" | "1" | "true" | "false") {
                info!("removing non-Metal enforcement preference {}", key);
                self.runner.run("/usr/bin/defaults", &["delete", &prefs, key], true)?;
            }
        }
        Ok(())
    }

    /// Drops kexts earlier patches put in `/Library/Extensions`. A reverted boot
    /// collection would otherwise leave the AuxKC pointing at a stale UUID.
    fn clean_auxiliary_kc(&mut self, installed: Option<&InstalledPatchRecord>) -> PatchResult<()> {
        if self.os.major() < BIG_SUR {
            return Ok(());
        }
        info!("cleaning auxiliary kernel collection");
        let extensions = self.config.data_path(AUX_EXTENSIONS);
        for kext in installed.map(installed_extension_kexts).unwrap_or_default() {
            let path = extensions.join(&kext);
            if !path.exists() {
                continue;
            }
            info!("removing {}", kext);
            self.runner.root("/bin/rm", &["-Rf", &path.to_string_lossy()])?;
        }

        if self.os.major() < VENTURA {
            return Ok(());
        }
        self.relocate_stale_kexts(&extensions)
    }

    /// Third-party kexts from before Ventura's release break AuxKC builds.
    fn relocate_stale_kexts(&mut self, extensions: &Path) -> PatchResult<()> {
        let Ok(entries) = fs::read_dir(extensions) else {
            return Ok(());
        };
        let cutoff = Date::from_calendar_date(2021, Month::October, 1)
            .map(|date| date.midnight().assume_utc())
            .map_err(|err| PatchError::PreconditionFailed(err.to_string()))?;
        let relocated = self.config.data_path(RELOCATED_EXTENSIONS);
        let relocated_path = relocated.to_string_lossy().into_owned();
        let mut created = relocated.exists();

        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("kext") {
                continue;
            }
            // Dangling symlinks and unreadable entries are left alone.
            let Ok(modified) = entry.metadata().and_then(|meta| meta.modified()) else {
                continue;
            };
            if OffsetDateTime::from(modified) >= cutoff {
                continue;
            }
            if !created {
                self.runner.root("/bin/mkdir", &[&relocated_path])?;
                created = true;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            info!("relocating {} to {}", name, RELOCATED_EXTENSIONS);
            let existing = relocated.join(&name);
            if existing.exists() {
                self.runner.root("/bin/rm", &["-Rf", &existing.to_string_lossy()])?;
            }
            self.runner.root("/bin/mv", &[&path.to_string_lossy(), &relocated_path])?;
            self.note("relocated", name);
        }
        Ok(())
    }

    pub fn apply(&mut self, plan: &PatchPlan, preflight: &Preflight) -> PatchResult<ApplyOutcome> {
        let mount = self.require_state(TransactionState::Mounted, "apply")?;
        let mut outcome = ApplyOutcome::default();

        for category in &plan.categories {
            info!("installing patchset {}", category.name);
            self.note("category", &category.name);

            for (dir, files) in &category.remove_system {
                let dest = mount.join(dir.trim_start_matches('/'));
                for file in files {
                    self.remove_item(&dest, file)?;
                }
            }
            for (dir, files) in &category.remove_data {
                let dest = self.config.data_path(dir);
                for file in files {
                    self.remove_item(&dest, file)?;
                }
            }

            for (dir, files) in &category.install_system {
                let dest = mount.join(dir.trim_start_matches('/'));
                for (file, tag) in files {
                    let source = self.source_path(category, tag, dir, file);
                    self.install_item(&source, &dest, file)?;
                }
            }
            for (dir, files) in &category.install_data {
                let dest = self.config.data_path(dir);
                for (file, tag) in files {
                    let source = self.source_path(category, tag, dir, file);
                    if dir == AUX_EXTENSIONS {
                        outcome.needs_exemptions = true;
                        if kernelcache::kext_needs_approval(&self.config.system_root, file) {
                            info!("{} requires approval in System Settings", file);
                            outcome.needs_approval = true;
                        }
                        if category.aux_redirects.contains(file) {
                            self.mark_auxiliary(&source)?;
                        }
                    }
                    self.install_item(&source, &dest, file)?;
                }
            }

            for process in &category.processes {
                if process.elevated {
                    info!("running process as root: {}", process.command);
                    let mut parts = process.command.split(' ');
                    let program = parts.next().unwrap_or_default();
                    let args: Vec<&str> = parts.collect();
                    self.runner.root(program, &args)?;
                } else {
                    info!("running process: {}", process.command);
                    self.runner.run_checked("/bin/bash", &["-c", &process.command], false)?;
                }
            }
        }

        self.run_helpers(plan, &mount)?;

        let record = self.build_record(plan, preflight);
        manifest::write_manifest_atomic(
            self.runner,
            &record,
            &std::env::temp_dir(),
            &self.config.mounted_manifest_path(&mount),
        )?;
        self.note("needs_kmutil_exemptions", outcome.needs_exemptions);
        outcome.record = record;
        Ok(outcome)
    }

    fn run_helpers(&mut self, plan: &PatchPlan, mount: &Path) -> PatchResult<()> {
        if plan.families.iter().any(|family| family.is_legacy_amd()) {
            helpers::disable_window_server_caching(self.runner, self.os)?;
        }
        if plan.includes(PatchFamily::IntelIvyBridge) || plan.includes(PatchFamily::IntelHaswell) {
            let removed = helpers::remove_news_widgets(
                self.runner,
                self.os,
                self.config.user_home.as_deref(),
                self.config.dry_run,
            )?;
            if removed > 0 {
                self.note("news_widgets_removed", removed);
            }
        }
        if plan.families.iter().any(|family| family.uses_metal_3802()) {
            if let Some(merged) = helpers::patch_gpu_compiler_libraries(self.runner, self.os, mount, self.config.dry_run)? {
                self.note("gpu_compiler_merged", merged.display());
            }
        }
        Ok(())
    }

    fn build_record(&self, plan: &PatchPlan, preflight: &Preflight) -> InstalledPatchRecord {
        let kdk_used = preflight
            .kdk
            .as_ref()
            .map(|kdk| kdk.root().to_string_lossy().into_owned())
            .unwrap_or_else(|| NOT_APPLICABLE.to_string());
        InstalledPatchRecord {
            patcher_version: format!("v{}", self.config.patcher_version),
            support_pkg_version: format!("v{}", self.config.support_pkg_version),
            time_patched: now_utc_rfc3339(),
            commit_url: self.config.commit_url.clone(),
            kdk_used,
            metal_library_used: NOT_APPLICABLE.to_string(),
            os_version: self.os.manifest_label(),
            custom_signature: self.config.payload_root.join(".signed").exists(),
            categories: plan
                .categories
                .iter()
                .map(|category| (category.name.clone(), category.to_manifest_entry()))
                .collect(),
        }
    }

    /// Apple kexts only load from the AuxKC when they say so.
    fn mark_auxiliary(&self, kext: &Path) -> PatchResult<()> {
        let info_plist = kext.join("Contents/Info.plist");
        let mut info = Value::from_file(&info_plist)?;
        let Some(dict) = info.as_dictionary_mut() else {
            return Err(PatchError::PreconditionFailed(format!("{} is not a dictionary", info_plist.display())));
        };
        let apple = dict
            .get("CFBundleIdentifier")
            .and_then(Value::as_string)
            .map(|id| id.starts_with("com.apple."))
            .unwrap_or(false);
        if !apple || dict.get("OSBundleRequired").and_then(Value::as_string) == Some("Auxiliary") {
            return Ok(());
        }
        info!("adding AuxKC support to {}", kext.display());
        dict.insert("OSBundleRequired".to_string(), Value::String("Auxiliary".to_string()));
        if !self.config.dry_run {
            info.to_file_xml(&info_plist)?;
        }
        Ok(())
    }

    fn install_item(&self, source: &Path, dest_dir: &Path, file: &str) -> PatchResult<()> {
        if !dest_dir.exists() && !self.config.dry_run {
            warn!("skipping {}, {} does not exist", file, dest_dir.display());
            return Ok(());
        }
        let src = source.to_string_lossy().into_owned();
        let dir = dest_dir.to_string_lossy().into_owned();
        let target = dest_dir.join(file);
        let target_path = target.to_string_lossy().into_owned();
        let is_dir = source.is_dir();

        if is_dir && file.ends_with(".framework") {
            info!("merging {}", file);
            self.runner.root("/usr/bin/rsync", &["-r", "-i", "-a", &src, &format!("{dir}/")])?;
        } else {
            if target.exists() {
                debug!("overwriting {}", target.display());
                if is_dir {
                    self.runner.root("/bin/rm", &["-R", &target_path])?;
                } else {
                    self.runner.root("/bin/rm", &[&target_path])?;
                }
            } else {
                info!("installing {}", file);
            }
            if is_dir {
                self.runner.root("/bin/cp", &["-R", &src, &dir])?;
            } else {
                self.runner.root("/bin/cp", &[&src, &dir])?;
            }
        }

        if is_dir {
            self.runner.root("/bin/chmod", &["-Rf", "755", &target_path])?;
            self.runner.root("/usr/sbin/chown", &["-Rf", "root:wheel", &target_path])?;
        } else {
            self.runner.root("/bin/chmod", &["755", &target_path])?;
            self.runner.root("/usr/sbin/chown", &["root:wheel", &target_path])?;
        }
        Ok(())
    }

    fn remove_item(&self, dest_dir: &Path, file: &str) -> PatchResult<()> {
        let target = dest_dir.join(file);
        if !target.exists() {
            return Ok(());
        }
        info!("removing {}", file);
        let path = target.to_string_lossy().into_owned();
        if target.is_dir() {
            self.runner.root("/bin/rm", &["-R", &path])?;
        } else {
            self.runner.root("/bin/rm", &[&path])?;
        }
        Ok(())
    }

    /// Rebuilds caches and commits the volume into a new boot snapshot.
    pub fn seal(&mut self, plan: &PatchPlan, applied: &ApplyOutcome, profile: &HardwareProfile) -> PatchResult<()> {
        let mount = self.require_state(TransactionState::Mounted, "seal")?;
        let rebuild = KernelCacheRebuild {
            os: self.os,
            mount: &mount,
            needs_exemptions: applied.needs_exemptions,
            aux_only: plan.requirements.aux_kc_only,
            dry_run: self.config.dry_run,
        };
        self.note("kernel_cache", format!("{:?}", rebuild.kind()));
        rebuild.run(self.runner)?;
        kernelcache::update_preboot(self.runner, self.os)?;
        kernelcache::rebuild_dyld_cache(self.runner, self.os, &mount)?;

        mount::create_snapshot(
            self.runner,
            self.os,
            &mount,
            profile.flags.is_arm64 || profile.flags.is_rosetta,
        )?;
        self.state = TransactionState::Patched;
        self.note("state", "patched");
        info!("patching complete, reboot for patches to take effect");
        Ok(())
    }

    /// Restores the last Apple-sealed snapshot and clears data-volume leftovers.
    pub fn revert(&mut self, installed: Option<&InstalledPatchRecord>) -> PatchResult<()> {
        let mount = self.require_state(TransactionState::Mounted, "revert")?;
        mount::revert_snapshot(self.runner, self.os, &mount)?;
        self.reset_skylight_plugins()?;
        self.delete_nonmetal_enforcement()?;
        self.clean_auxiliary_kc(installed)?;
        self.state = TransactionState::Reverted;
        self.note("state", "reverted");
        info!("unpatching complete, reboot for changes to take effect");
        Ok(())
    }

    /// Best-effort. A failed unmount never undoes a committed snapshot.
    pub fn unmount(&mut self) -> bool {
        let Some(mount) = self.mount.take() else {
            self.state = TransactionState::Unmounted;
            return true;
        };
        info!("unmounting root volume");
        let released = mount::unmount_root(self.runner, self.os, &mount);
        self.note("unmounted", released);
        self.state = TransactionState::Unmounted;
        released
    }
}

/// Kexts a manifest records under any `*Extensions` install directory.
fn installed_extension_kexts(record: &InstalledPatchRecord) -> Vec<String> {
    let mut kexts = Vec::new();
    for entry in record.categories.values() {
        let Some(sections) = entry.as_dictionary() else {
            continue;
        };
        for section in [crate::compose::MANIFEST_INSTALL, crate::compose::MANIFEST_INSTALL_DATA] {
            let Some(dirs) = sections.get(section).and_then(Value::as_dictionary) else {
                continue;
            };
            for (dir, files) in dirs {
                if !dir.ends_with("Extensions") {
                    continue;
                }
                if let Some(files) = files.as_dictionary() {
                    kexts.extend(files.keys().filter(|file| file.ends_with(".kext")).cloned());
                }
            }
        }
    }
    kexts.sort();
    kexts.dedup();
    kexts
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::detect::decide;
    use crate::detect::tests::{gpu, open_env, profile};
    use crate::mount::SYSTEM_VERSION_PLIST;
    use crate::patchsets;
    use crate::runner::RecordingRunner;
    use phoenix_core::{Architecture, KernelVersion};
    use phoenix_safety::AmfiLevel;
    use tempfile::TempDir;

    /// Fake payload tree, data volume and mounted root volume.
    pub(crate) struct Fixture {
        pub(crate) payloads: TempDir,
        pub(crate) data: TempDir,
        pub(crate) mount: TempDir,
        pub(crate) config: PatcherConfig,
    }

    impl Fixture {
        pub(crate) fn new(build: &str) -> Self {
            let payloads = tempfile::tempdir().unwrap();
            let data = tempfile::tempdir().unwrap();
            let mount = tempfile::tempdir().unwrap();
            let version = mount.path().join(SYSTEM_VERSION_PLIST);
            fs::create_dir_all(version.parent().unwrap()).unwrap();
            let mut dict = plist::Dictionary::new();
            dict.insert("ProductBuildVersion".to_string(), Value::String(build.to_string()));
            Value::Dictionary(dict).to_file_xml(&version).unwrap();
            let config = PatcherConfig {
                payload_root: payloads.path().to_path_buf(),
                system_root: data.path().to_path_buf(),
                mount_point: mount.path().to_path_buf(),
                user_home: None,
                ..Default::default()
            };
            Self {
                payloads,
                data,
                mount,
                config,
            }
        }

        /// Creates every payload and destination directory the plan touches.
        pub(crate) fn stage(&self, plan: &PatchPlan) {
            for category in &plan.categories {
                let scopes = [
                    (&category.install_system, self.mount.path()),
                    (&category.install_data, self.data.path()),
                ];
                for (map, root) in scopes {
                    for (dir, files) in map {
                        fs::create_dir_all(root.join(dir.trim_start_matches('/'))).unwrap();
                        for (file, tag) in files {
                            let source_dir = category.source_dir(dir, file);
                            let source = self.payloads.path().join(tag).join(source_dir.trim_start_matches('/')).join(file);
                            if file.contains(".kext") || file.ends_with(".framework") || file.ends_with(".app") || file.ends_with(".bundle") {
                                fs::create_dir_all(source.join("Contents")).unwrap();
                            } else {
                                fs::create_dir_all(source.parent().unwrap()).unwrap();
                                fs::write(&source, b"payload").unwrap();
                            }
                        }
                    }
                }
            }
        }
    }

    fn position(lines: &[String], prefix: &str) -> usize {
        lines
            .iter()
            .position(|line| line.starts_with(prefix))
            .unwrap_or_else(|| panic!("{prefix} not run"))
    }

    #[test]
    fn unresolvable_device_leaves_volume_untouched() {
        let fixture = Fixture::new("22E261");
        let empty_mount = tempfile::tempdir().unwrap();
        let config = PatcherConfig {
            mount_point: empty_mount.path().to_path_buf(),
            ..fixture.config.clone()
        };
        let os = OsInfo::new(KernelVersion::new(22, 4), "22E261", "13.3");
        let runner = RecordingRunner::new().respond("/usr/sbin/diskutil", 1, "Could not find disk: /");
        let mut tx = RootPatchTransaction::new(&runner, &config, &os);

        assert!(matches!(tx.mount(), Err(PatchError::MountFailed(_))));
        assert_eq!(tx.state(), TransactionState::Unmounted);
        assert!(tx.mount_path().is_none());
        assert_eq!(runner.lines(), vec!["/usr/sbin/diskutil info -plist /".to_string()]);
        assert!(runner.calls().iter().all(|call| !call.elevated));
    }

    #[test]
    fn steps_out_of_order_are_rejected() {
        let fixture = Fixture::new("21C52");
        let os = OsInfo::new(KernelVersion::new(21, 1), "21C52", "12.1");
        let runner = RecordingRunner::new();
        let mut tx = RootPatchTransaction::new(&runner, &fixture.config, &os);
        let host = profile("iMac14,2", vec![gpu(0x10DE, 0x11A3, Architecture::NvidiaKepler)]);
        let decision = decide(&host, &os, &open_env(), &fixture.config, None);
        let plan = PatchPlan::new(&decision, &os);

        assert!(matches!(
            tx.apply(&plan, &Preflight::default()),
            Err(PatchError::InvalidState(_))
        ));
        assert!(matches!(tx.revert(None), Err(PatchError::InvalidState(_))));
        assert!(runner.lines().is_empty());
    }

    #[test]
    fn kepler_on_monterey_patches_in_order() {
        let fixture = Fixture::new("21C52");
        let os = OsInfo::new(KernelVersion::new(21, 1), "21C52", "12.1");
        let host = profile("iMac14,2", vec![gpu(0x10DE, 0x11A3, Architecture::NvidiaKepler)]);
        let decision = decide(&host, &os, &open_env(), &fixture.config, None);
        assert!(decision.is_selected(PatchFamily::NvidiaKepler));
        let plan = PatchPlan::new(&decision, &os);
        fixture.stage(&plan);

        let runner = RecordingRunner::new().respond("/usr/bin/defaults read", 0, "1\n");
        let mut tx = RootPatchTransaction::new(&runner, &fixture.config, &os);
        assert_eq!(tx.mount().unwrap(), fixture.mount.path());
        let preflight = tx.preflight(&plan, &host, &open_env(), None).unwrap();
        assert!(preflight.kdk.is_none());
        let applied = tx.apply(&plan, &preflight).unwrap();
        assert!(applied.record.has_category("Nvidia Kepler"));
        assert_eq!(applied.record.os_version, "21.1 (21C52)");
        tx.seal(&plan, &applied, &host).unwrap();
        assert_eq!(tx.state(), TransactionState::Patched);
        assert!(tx.unmount());
        assert_eq!(tx.state(), TransactionState::Unmounted);

        let lines = runner.lines();
        let enforcement = position(&lines, "/usr/bin/defaults delete");
        let first_copy = position(&lines, "/bin/cp");
        let manifest = position(&lines, "/bin/mv -f");
        let kmutil = position(&lines, "/usr/bin/kmutil install --volume-root");
        let bless = position(&lines, "/usr/sbin/bless --folder");
        let umount = position(&lines, "/sbin/umount");
        assert!(enforcement < first_copy);
        assert!(first_copy < manifest && manifest < kmutil && kmutil < bless && bless < umount);
        assert!(lines.iter().any(|line| line.starts_with("/usr/sbin/chown -Rf root:wheel")));
        assert!(tx.log().iter().any(|line| line == "category=Nvidia Kepler"));
    }

    #[test]
    fn missing_payload_aborts_before_any_write() {
        let fixture = Fixture::new("21C52");
        let os = OsInfo::new(KernelVersion::new(21, 1), "21C52", "12.1");
        let host = profile("iMac14,2", vec![gpu(0x10DE, 0x11A3, Architecture::NvidiaKepler)]);
        let decision = decide(&host, &os, &open_env(), &fixture.config, None);
        let plan = PatchPlan::new(&decision, &os);

        let runner = RecordingRunner::new();
        let mut tx = RootPatchTransaction::new(&runner, &fixture.config, &os);
        tx.mount().unwrap();
        let err = tx.preflight(&plan, &host, &open_env(), None).unwrap_err();
        assert!(matches!(err, PatchError::PreconditionMissing { .. }));
        assert!(!err.requires_reboot());
        assert!(runner.lines().is_empty());
        assert_eq!(tx.state(), TransactionState::Mounted);
    }

    #[test]
    fn failed_kernel_cache_leaves_volume_mounted_unsealed() {
        let fixture = Fixture::new("21C52");
        let os = OsInfo::new(KernelVersion::new(21, 1), "21C52", "12.1");
        let host = profile("iMac14,2", vec![gpu(0x10DE, 0x11A3, Architecture::NvidiaKepler)]);
        let decision = decide(&host, &os, &open_env(), &fixture.config, None);
        let plan = PatchPlan::new(&decision, &os);
        fixture.stage(&plan);

        let runner = RecordingRunner::new().respond("/usr/bin/kmutil", 71, "Error Domain=KMErrorDomain");
        let mut tx = RootPatchTransaction::new(&runner, &fixture.config, &os);
        tx.mount().unwrap();
        let preflight = tx.preflight(&plan, &host, &open_env(), None).unwrap();
        let applied = tx.apply(&plan, &preflight).unwrap();
        let err = tx.seal(&plan, &applied, &host).unwrap_err();
        assert!(err.requires_reboot());
        assert_eq!(tx.state(), TransactionState::Mounted);
        assert!(!runner.ran("/usr/sbin/bless"));
        assert!(!runner.ran("/sbin/umount"));
    }

    #[test]
    fn aux_only_plan_installs_into_library_extensions() {
        let fixture = Fixture::new("23E214");
        let os = OsInfo::new(KernelVersion::new(23, 4), "23E214", "14.4");
        let requirements = Requirements {
            amfi_level: AmfiLevel::NoCheck,
            amfi_shim_bins: false,
            requires_root_kc: false,
            supports_metal: false,
            aux_kc_only: true,
            missing_kdk: false,
        };
        let categories = vec![ResolvedCategory::resolve(&patchsets::LEGACY_USB11, os.kernel)];
        let plan = PatchPlan::from_categories(vec![PatchFamily::LegacyUsb11], categories, requirements, &os);
        fixture.stage(&plan);
        let kext = fixture
            .payloads
            .path()
            .join("12.6.2-23.4/System/Library/Extensions/IOUSBHostFamily.kext");
        let mut info = plist::Dictionary::new();
        info.insert(
            "CFBundleIdentifier".to_string(),
            Value::String("com.apple.iokit.IOUSBHostFamily".to_string()),
        );
        info.insert("OSBundleRequired".to_string(), Value::String("Root".to_string()));
        Value::Dictionary(info).to_file_xml(kext.join("Contents/Info.plist")).unwrap();

        let runner = RecordingRunner::new();
        let mut tx = RootPatchTransaction::new(&runner, &fixture.config, &os);
        let host = profile("MacPro5,1", Vec::new());
        tx.mount().unwrap();
        let preflight = tx.preflight(&plan, &host, &EnvironmentSnapshot::default(), None).unwrap();
        assert!(preflight.kdk.is_none());
        let applied = tx.apply(&plan, &preflight).unwrap();
        assert!(applied.needs_exemptions);
        assert!(applied.needs_approval);

        let marked = Value::from_file(kext.join("Contents/Info.plist")).unwrap();
        assert_eq!(
            marked.as_dictionary().and_then(|dict| dict.get("OSBundleRequired")).and_then(Value::as_string),
            Some("Auxiliary")
        );
        let expected = format!(
            "/bin/cp -R {} {}",
            kext.display(),
            fixture.data.path().join("Library/Extensions").display()
        );
        assert!(runner.lines().contains(&expected));

        tx.seal(&plan, &applied, &host).unwrap();
        assert!(runner.ran("/usr/bin/kmutil create --allow-missing-kdk --new aux"));
        assert!(runner.ran("/usr/bin/killall syspolicyd kernelmanagerd"));
    }

    #[test]
    fn revert_restores_snapshot_and_prunes_recorded_kexts() {
        let fixture = Fixture::new("22E261");
        let os = OsInfo::new(KernelVersion::new(22, 4), "22E261", "13.3");
        let stale = fixture.data.path().join("Library/Extensions/AirPortBrcm4360.kext");
        fs::create_dir_all(&stale).unwrap();

        let mut section = plist::Dictionary::new();
        let mut files = plist::Dictionary::new();
        files.insert("AirPortBrcm4360.kext".to_string(), Value::String("11.7.10".to_string()));
        section.insert("/Library/Extensions".to_string(), Value::Dictionary(files));
        let mut entry = plist::Dictionary::new();
        entry.insert("Install Non-Root".to_string(), Value::Dictionary(section));
        let mut installed = InstalledPatchRecord::default();
        installed.categories.insert("Legacy Wireless".to_string(), Value::Dictionary(entry));

        let runner = RecordingRunner::new();
        let mut tx = RootPatchTransaction::new(&runner, &fixture.config, &os);
        tx.mount().unwrap();
        tx.revert(Some(&installed)).unwrap();
        assert_eq!(tx.state(), TransactionState::Reverted);

        let lines = runner.lines();
        assert!(lines[0].starts_with("/usr/sbin/bless --mount ") && lines[0].ends_with("--bootefi --last-sealed-snapshot"));
        assert!(lines.contains(&format!("/bin/rm -Rf {}", stale.display())));
        assert!(tx.unmount());
        assert_eq!(runner.lines().last().unwrap(), &format!("/sbin/umount {}", fixture.mount.path().display()));
    }
}
