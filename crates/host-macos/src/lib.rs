use anyhow::{anyhow, Result};
use phoenix_core::{
    CpuDescriptor, CpuGeneration, DeviceSource, EnvironmentSnapshot, HostFlags, KdkArtifact,
    MachineIdentity, OsInfo, RawPciDevice,
};
use std::collections::BTreeSet;
use std::path::Path;
use tracing::{debug, warn};

pub mod ioreg;
pub mod nvram;

pub const KDK_SEARCH_ROOT: &str = "/Library/Developer/KDKs";

const T1_VENDOR_ID: u64 = 0x05AC;
const T1_PRODUCT_ID: u64 = 0x8600;

/// Device enumeration backed by `ioreg`.
#[derive(Debug, Default, Clone, Copy)]
pub struct IoregDeviceSource;

impl DeviceSource for IoregDeviceSource {
    fn pci_devices(&self) -> Result<Vec<RawPciDevice>> {
        let output = command_stdout("/usr/sbin/ioreg", &["-a", "-r", "-c", "IOPCIDevice", "-d", "1"])?;
        ioreg::parse_pci_devices(&output)
    }
}

pub fn read_os_info() -> Result<OsInfo> {
    let release = sysctl_string("kern.osrelease").ok_or_else(|| anyhow!("kern.osrelease unavailable"))?;
    let build = sysctl_string("kern.osversion").unwrap_or_else(|| "unknown".to_string());
    let product = sysctl_string("kern.osproductversion").unwrap_or_else(|| "unknown".to_string());
    OsInfo::from_release(&release, &build, &product)
}

pub fn read_machine_identity() -> MachineIdentity {
    let model = sysctl_string("hw.model").unwrap_or_else(|| "unknown".to_string());
    let reported_board_id = device_tree_property("board-id")
        .and_then(|value| ioreg::data_string(&value))
        .unwrap_or_default();
    let brand = sysctl_string("machdep.cpu.brand_string").unwrap_or_else(|| "Unknown".to_string());
    let mut features = BTreeSet::new();
    for key in ["machdep.cpu.features", "machdep.cpu.leaf7_features"] {
        if let Some(flags) = sysctl_string(key) {
            features.extend(flags.split_whitespace().map(str::to_string));
        }
    }
    MachineIdentity {
        board_id: reported_board_id.clone(),
        reported_board_id,
        cpu: CpuDescriptor {
            generation: CpuGeneration::from_brand(&brand),
            name: brand,
            features,
        },
        model,
    }
}

pub fn read_host_flags() -> HostFlags {
    let firmware_vendor = device_tree_property("firmware-vendor").and_then(|value| ioreg::data_utf16(&value));
    let has_als = command_stdout("/usr/sbin/ioreg", &["-r", "-n", "ALS0"])
        .map(|out| !out.is_empty())
        .unwrap_or(false);
    let pcie_webcam = command_stdout("/usr/sbin/ioreg", &["-r", "-n", "CMRA"])
        .map(|out| !out.is_empty())
        .unwrap_or(false);
    let t1_chip = command_stdout("/usr/sbin/ioreg", &["-a", "-r", "-c", "IOUSBHostDevice", "-d", "1"])
        .and_then(|out| ioreg::has_usb_device(&out, T1_VENDOR_ID, T1_PRODUCT_ID))
        .unwrap_or(false);
    HostFlags {
        is_hackintosh: firmware_vendor.map(|vendor| vendor != "Apple").unwrap_or(false),
        is_rosetta: sysctl_int("sysctl.proc_translated") == Some(1),
        is_arm64: sysctl_int("hw.optional.arm64") == Some(1),
        has_ambient_light_sensor: has_als,
        third_party_ssd: false,
        pcie_webcam,
        t1_chip,
    }
}

/// Gathers security posture inputs, loaded kexts and artifact availability.
pub fn collect_environment(os: &OsInfo) -> EnvironmentSnapshot {
    let nvram = command_stdout("/usr/sbin/nvram", &["-x", "-p"])
        .and_then(|out| nvram::parse_nvram(&out))
        .unwrap_or_else(|err| {
            warn!("nvram unavailable: {err:#}");
            nvram::NvramState::default()
        });
    let filevault_enabled = command_stdout("/usr/bin/fdesetup", &["status"])
        .map(|out| filevault_reported(&String::from_utf8_lossy(&out)))
        .unwrap_or(false);
    let loaded_kexts = command_stdout("/usr/sbin/kextstat", &["-l"])
        .map(|out| parse_kextstat(&String::from_utf8_lossy(&out)))
        .unwrap_or_default();
    let foreign_patcher_marker = Path::new("/System/Library/Extensions/AppleIntelHDGraphics.kext").exists()
        && Path::new("/System/Library/Extensions/AppleIntelHD3000Graphics.kext").exists()
        && !Path::new("/System/Library/CoreServices/OpenCore-Legacy-Patcher.plist").exists();

    EnvironmentSnapshot {
        boot_args: nvram.boot_args,
        csr_active_config: nvram.csr_active_config,
        secure_boot_model: nvram.secure_boot_model,
        filevault_enabled,
        oclp_settings: nvram.oclp_settings,
        nvda_drv_set: nvram.nvda_drv,
        loaded_kexts,
        foreign_patcher_marker,
        network_available: network_reachable(),
        kdk: find_installed_kdk(Path::new(KDK_SEARCH_ROOT), &os.build),
    }
}

pub fn filevault_reported(status: &str) -> bool {
    !status.contains("FileVault is Off")
}

/// Bundle identifiers from `kextstat -l` (sixth column).
pub fn parse_kextstat(output: &str) -> BTreeSet<String> {
    output
        .lines()
        .filter_map(|line| line.split_whitespace().nth(5))
        .filter(|name| name.contains('.'))
        .map(str::to_string)
        .collect()
}

/// Looks for `<root>/KDK_<version>_<build>.kdk` matching the running build.
pub fn find_installed_kdk(root: &Path, build: &str) -> Option<KdkArtifact> {
    let entries = std::fs::read_dir(root).ok()?;
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if !name.ends_with(".kdk") || !name.contains(&format!("_{}", build)) {
            continue;
        }
        if !path.join("System/Library/Extensions").is_dir() {
            debug!("skipping incomplete KDK {}", path.display());
            continue;
        }
        return Some(KdkArtifact {
            root: path,
            build: build.to_string(),
            checksum: None,
        });
    }
    None
}

fn network_reachable() -> bool {
    use std::net::{TcpStream, ToSocketAddrs};
    use std::time::Duration;

    let Ok(mut addrs) = ("www.apple.com", 443).to_socket_addrs() else {
        return false;
    };
    addrs.any(|addr| TcpStream::connect_timeout(&addr, Duration::from_secs(3)).is_ok())
}

fn device_tree_property(key: &str) -> Option<plist::Value> {
    let output = command_stdout("/usr/sbin/ioreg", &["-a", "-p", "IODeviceTree", "-d", "3"]).ok()?;
    let value = ioreg::parse_plist(&output).ok()?;
    ioreg::find_property(&value, key).cloned()
}

#[cfg(target_os = "macos")]
fn command_stdout(cmd: &str, args: &[&str]) -> Result<Vec<u8>> {
    use anyhow::Context;

    let output = std::process::Command::new(cmd)
        .args(args)
        .output()
        .with_context(|| format!("run {}", cmd))?;
    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(anyhow!(
            "{} failed: {}",
            cmd,
            String::from_utf8_lossy(&output.stderr)
        ))
    }
}

#[cfg(not(target_os = "macos"))]
fn command_stdout(cmd: &str, _args: &[&str]) -> Result<Vec<u8>> {
    Err(anyhow!("{} requires macOS", cmd))
}

#[cfg(target_os = "macos")]
fn sysctl_string(name: &str) -> Option<String> {
    use libc::sysctlbyname;
    use std::ffi::CString;
    use std::ptr;

    let c_name = CString::new(name).ok()?;
    let mut size = 0usize;
    let res = unsafe { sysctlbyname(c_name.as_ptr(), ptr::null_mut(), &mut size, ptr::null_mut(), 0) };
    if res != 0 || size == 0 {
        return None;
    }

    let mut buffer = vec![0u8; size];
    let res = unsafe {
        sysctlbyname(
            c_name.as_ptr(),
            buffer.as_mut_ptr() as *mut _,
            &mut size,
            ptr::null_mut(),
            0,
        )
    };
    if res != 0 {
        return None;
    }
    buffer.truncate(size);
    if let Some(0) = buffer.last().copied() {
        buffer.pop();
    }
    String::from_utf8(buffer).ok()
}

#[cfg(target_os = "macos")]
fn sysctl_int(name: &str) -> Option<i32> {
    use libc::sysctlbyname;
    use std::ffi::CString;
    use std::ptr;

    let c_name = CString::new(name).ok()?;
    let mut value: i32 = 0;
    let mut size = std::mem::size_of::<i32>();
    let res = unsafe {
        sysctlbyname(
            c_name.as_ptr(),
            &mut value as *mut i32 as *mut _,
            &mut size,
            ptr::null_mut(),
            0,
        )
    };
    (res == 0).then_some(value)
}

#[cfg(not(target_os = "macos"))]
fn sysctl_string(_name: &str) -> Option<String> {
    None
}

#[cfg(not(target_os = "macos"))]
fn sysctl_int(_name: &str) -> Option<i32> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kextstat_yields_bundle_ids() {
        let output = "Index Refs Address            Size       Wired      Name (Version) UUID <Linked Against>\n\
                      1  152 0xffffff7f80a00000 0x1000 0x1000 com.apple.kpi.bsd (22.4.0) 3C2A <>\n\
                      42    0 0xffffff7f82b0e000 0x5000 0x5000 as.vit9696.WhateverGreen (1.6.4) 55A1 <12 8 6 3 1>\n";
        let kexts = parse_kextstat(output);
        assert!(kexts.contains("as.vit9696.WhateverGreen"));
        assert!(kexts.contains("com.apple.kpi.bsd"));
        assert!(!kexts.contains("Name"));
    }

    #[test]
    fn filevault_status_text() {
        assert!(!filevault_reported("FileVault is Off.\n"));
        assert!(filevault_reported("FileVault is On.\n"));
    }

    #[test]
    fn finds_kdk_for_running_build() {
        let dir = tempfile::tempdir().unwrap();
        let kdk = dir.path().join("KDK_13.4_22F66.kdk");
        std::fs::create_dir_all(kdk.join("System/Library/Extensions")).unwrap();
        std::fs::create_dir_all(dir.path().join("KDK_13.3_22E252.kdk")).unwrap();
        let found = find_installed_kdk(dir.path(), "22F66").unwrap();
        assert_eq!(found.root, kdk);
        assert!(find_installed_kdk(dir.path(), "22E252").is_none());
    }
}
