//! Merging a Kernel Debug Kit into the mounted root volume.

use crate::error::{PatchError, PatchResult};
use crate::manifest::InstalledPatchRecord;
use crate::runner::PrivilegedRunner;
use phoenix_core::{EnvironmentSnapshot, KdkArtifact, KdkChecksum, PatcherConfig};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const LIBKERN: &str = "System/Library/Extensions/System.kext/PlugIns/Libkern.kext/Libkern";
const HID_CODE_SIGNATURE: &str =
    "System/Library/Extensions/IOHIDFamily.kext/Contents/PlugIns/IOHIDEventDriver.kext/Contents/_CodeSignature";
const HID_BACKUP: &str = "IOHIDEventDriver_CodeSignature.bak";

pub struct KdkMerge<'a> {
    pub mount: &'a Path,
    pub config: &'a PatcherConfig,
    pub env: &'a EnvironmentSnapshot,
    pub installed: Option<&'a InstalledPatchRecord>,
    /// Legacy USB 1.1 ships a re-signed HID driver that the merge would clobber.
    pub preserve_hid_signature: bool,
}

/// What the merge did, for the manifest and the run log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KdkOutcome {
    AlreadyMerged(PathBuf),
    Merged(PathBuf),
}

impl KdkOutcome {
    pub fn root(&self) -> &Path {
        match self {
            Self::AlreadyMerged(root) | Self::Merged(root) => root,
        }
    }
}

pub fn sha256_file(path: &Path) -> PatchResult<String> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect())
}

fn verify_checksum(checksum: &KdkChecksum) -> PatchResult<()> {
    if !checksum.archive.exists() {
        return Err(PatchError::PreconditionMissing {
            path: checksum.archive.clone(),
        });
    }
    let actual = sha256_file(&checksum.archive)?;
    if !actual.eq_ignore_ascii_case(checksum.sha256.trim()) {
        return Err(PatchError::PreconditionFailed(format!(
            "KDK archive {} has checksum {actual}, expected {}",
            checksum.archive.display(),
            checksum.sha256
        )));
    }
    Ok(())
}

fn resolve_kdk(env: &EnvironmentSnapshot) -> PatchResult<&KdkArtifact> {
    let kdk = env.kdk.as_ref().ok_or_else(|| PatchError::PreconditionMissing {
        path: PathBuf::from(phoenix_host_macos::KDK_SEARCH_ROOT),
    })?;
    if !kdk.root.exists() {
        return Err(PatchError::PreconditionMissing { path: kdk.root.clone() });
    }
    Ok(kdk)
}

impl KdkMerge<'_> {
    pub fn run(&self, runner: &dyn PrivilegedRunner) -> PatchResult<KdkOutcome> {
        let kdk = resolve_kdk(self.env)?;
        let libkern = self.mount.join(LIBKERN);
        let recorded = self.installed.and_then(InstalledPatchRecord::kdk_path);
        if libkern.exists() && recorded == Some(kdk.root.to_string_lossy().as_ref()) {
            info!("KDK {} already merged", kdk.root.display());
            return Ok(KdkOutcome::AlreadyMerged(kdk.root.clone()));
        }
        if let Some(checksum) = &kdk.checksum {
            verify_checksum(checksum)?;
        }

        let backup = self.config.payload_root.join(HID_BACKUP);
        let hid = self.mount.join(HID_CODE_SIGNATURE);
        if self.preserve_hid_signature {
            self.backup_hid_signature(runner, &hid, &backup)?;
        }

        info!("merging KDK {} ({})", kdk.root.display(), kdk.build);
        let source = format!("{}/", kdk.root.join("System/Library/Extensions").display());
        let target = self.mount.join("System/Library/Extensions").to_string_lossy().into_owned();
        runner.root("/usr/bin/rsync", &["-r", "-i", "-a", &source, &target])?;

        if !self.config.dry_run && !libkern.exists() {
            return Err(PatchError::PreconditionFailed(format!(
                "KDK merge left no {}",
                libkern.display()
            )));
        }

        if self.preserve_hid_signature {
            self.restore_hid_signature(runner, &hid, &backup)?;
        }
        Ok(KdkOutcome::Merged(kdk.root.clone()))
    }

    fn backup_hid_signature(&self, runner: &dyn PrivilegedRunner, hid: &Path, backup: &Path) -> PatchResult<()> {
        if !self.config.dry_run && !hid.exists() {
            warn!("no HID code signature at {}", hid.display());
            return Ok(());
        }
        let backup = backup.to_string_lossy().into_owned();
        if Path::new(&backup).exists() {
            runner.root("/bin/rm", &["-rf", &backup])?;
        }
        runner.root("/bin/cp", &["-r", &hid.to_string_lossy(), &backup])?;
        Ok(())
    }

    fn restore_hid_signature(&self, runner: &dyn PrivilegedRunner, hid: &Path, backup: &Path) -> PatchResult<()> {
        if !self.config.dry_run && !backup.exists() {
            return Ok(());
        }
        let hid = hid.to_string_lossy().into_owned();
        runner.root("/bin/rm", &["-rf", &hid])?;
        runner.root("/bin/cp", &["-r", &backup.to_string_lossy(), &hid])?;
        Ok(())
    }
}
