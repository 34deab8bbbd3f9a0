//! Root-patch decision engine.
//!
//! Maps a probed [`HardwareProfile`] and the running OS onto the closed set of
//! [`PatchFamily`] selections, then validates the host environment.

use crate::manifest::InstalledPatchRecord;
use phoenix_core::kernel::{BIG_SUR, CATALINA, HIGH_SIERRA, MOJAVE, MONTEREY, SEQUOIA, SONOMA, VENTURA};
use phoenix_core::{
    Architecture, CpuGeneration, EnvironmentSnapshot, HardwareProfile, OsInfo, PatcherConfig,
};
use phoenix_safety::amfi::AMFIPASS_BUNDLE_ID;
use phoenix_safety::{AmfiLevel, PostureInputs, SecurityPosture};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Every selectable hardware family. Declaration order is composition order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PatchFamily {
    IntelIronLake,
    IntelSandyBridge,
    IntelIvyBridge,
    IntelHaswell,
    IntelBroadwell,
    IntelSkylake,
    NvidiaTesla,
    NvidiaKepler,
    NvidiaWebDrivers,
    AmdTeraScale1,
    AmdTeraScale2,
    AmdLegacyGcn,
    AmdLegacyPolaris,
    AmdLegacyVega,
    LegacyWireless,
    ModernWireless,
    LegacyBacklightControl,
    LegacyGmux,
    LegacyKeyboardBacklight,
    LegacyRealtek,
    LegacyNonGop,
    LegacyUsb11,
    PcieFaceTimeCamera,
    T1SecurityChip,
}

impl PatchFamily {
    pub const ALL: [PatchFamily; 24] = [
        Self::IntelIronLake,
        Self::IntelSandyBridge,
        Self::IntelIvyBridge,
        Self::IntelHaswell,
        Self::IntelBroadwell,
        Self::IntelSkylake,
        Self::NvidiaTesla,
        Self::NvidiaKepler,
        Self::NvidiaWebDrivers,
        Self::AmdTeraScale1,
        Self::AmdTeraScale2,
        Self::AmdLegacyGcn,
        Self::AmdLegacyPolaris,
        Self::AmdLegacyVega,
        Self::LegacyWireless,
        Self::ModernWireless,
        Self::LegacyBacklightControl,
        Self::LegacyGmux,
        Self::LegacyKeyboardBacklight,
        Self::LegacyRealtek,
        Self::LegacyNonGop,
        Self::LegacyUsb11,
        Self::PcieFaceTimeCamera,
        Self::T1SecurityChip,
    ];

    pub fn display_name(self) -> &'static str {
        match self {
            Self::IntelIronLake => "Graphics: Intel Ironlake",
            Self::IntelSandyBridge => "Graphics: Intel Sandy Bridge",
            Self::IntelIvyBridge => "Graphics: Intel Ivy Bridge",
            Self::IntelHaswell => "Graphics: Intel Haswell",
            Self::IntelBroadwell => "Graphics: Intel Broadwell",
            Self::IntelSkylake => "Graphics: Intel Skylake",
            Self::NvidiaTesla => "Graphics: Nvidia Tesla",
            Self::NvidiaKepler => "Graphics: Nvidia Kepler",
            Self::NvidiaWebDrivers => "Graphics: Nvidia Web Drivers",
            Self::AmdTeraScale1 => "Graphics: AMD TeraScale 1",
            Self::AmdTeraScale2 => "Graphics: AMD TeraScale 2",
            Self::AmdLegacyGcn => "Graphics: AMD Legacy GCN",
            Self::AmdLegacyPolaris => "Graphics: AMD Legacy Polaris",
            Self::AmdLegacyVega => "Graphics: AMD Legacy Vega",
            Self::LegacyWireless => "Networking: Legacy Wireless",
            Self::ModernWireless => "Networking: Modern Wireless",
            Self::LegacyBacklightControl => "Brightness: Legacy Backlight Control",
            Self::LegacyGmux => "Miscellaneous: Legacy GMUX",
            Self::LegacyKeyboardBacklight => "Miscellaneous: Legacy Keyboard Backlight",
            Self::LegacyRealtek => "Audio: Legacy Realtek",
            Self::LegacyNonGop => "Audio: Legacy Non-GOP",
            Self::LegacyUsb11 => "Miscellaneous: Legacy USB 1.1",
            Self::PcieFaceTimeCamera => "Miscellaneous: PCIe FaceTime Camera",
            Self::T1SecurityChip => "Miscellaneous: T1 Security Chip",
        }
    }

    /// Key of the family's own entry in the installed-patch manifest.
    pub fn manifest_key(self) -> &'static str {
        let name = self.display_name();
        name.split_once(": ").map(|(_, key)| key).unwrap_or(name)
    }

    /// Families driven by the pre-Metal OpenGL stack.
    pub fn is_non_metal(self) -> bool {
        matches!(
            self,
            Self::NvidiaTesla
                | Self::NvidiaWebDrivers
                | Self::AmdTeraScale1
                | Self::AmdTeraScale2
                | Self::IntelIronLake
                | Self::IntelSandyBridge
        )
    }

    /// Families that need the 3802-era Metal compiler on Ventura and newer.
    pub fn uses_metal_3802(self) -> bool {
        matches!(self, Self::NvidiaKepler | Self::IntelIvyBridge | Self::IntelHaswell)
    }

    pub fn is_legacy_amd(self) -> bool {
        matches!(self, Self::AmdLegacyGcn | Self::AmdLegacyPolaris | Self::AmdLegacyVega)
    }

    /// Families that bring a machine back online.
    pub fn is_networking(self) -> bool {
        matches!(self, Self::LegacyWireless | Self::ModernWireless)
    }
}

/// What the selected families ask of the host, folded over every selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Requirements {
    pub amfi_level: AmfiLevel,
    pub amfi_shim_bins: bool,
    pub requires_root_kc: bool,
    pub supports_metal: bool,
    /// Only the auxiliary kernel collection is rebuilt (Ventura+, no boot/system kexts).
    pub aux_kc_only: bool,
    pub missing_kdk: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    pub unsupported_host_os: bool,
    pub sip_enabled: bool,
    pub sbm_enabled: bool,
    pub filevault_enabled: bool,
    pub amfi_enabled: bool,
    pub foreign_patcher: bool,
    pub missing_network: bool,
    pub missing_kdk: bool,
    pub missing_nvda_drv: bool,
    pub missing_web_boot_args: bool,
    pub missing_whatevergreen: bool,
    pub sip_required: u32,
    pub csr_active_config: Option<u32>,
    pub patch_allowed: bool,
    pub revert_allowed: bool,
}

impl ValidationResult {
    fn blocking(&self) -> bool {
        self.missing_network || self.blocking_besides_network()
    }

    fn blocking_besides_network(&self) -> bool {
        self.unsupported_host_os
            || self.sip_enabled
            || self.sbm_enabled
            || self.filevault_enabled
            || self.amfi_enabled
            || self.foreign_patcher
            || self.missing_nvda_drv
            || self.missing_web_boot_args
            || self.missing_whatevergreen
    }

    fn finish(&mut self) {
        self.patch_allowed = !self.blocking();
        self.revert_allowed = !self.sip_enabled;
    }

    /// One line per failing check.
    pub fn reasons(&self) -> Vec<String> {
        let mut reasons = Vec::new();
        if self.unsupported_host_os {
            reasons.push("Running OS is not supported for root patching".to_string());
        }
        if self.sip_enabled {
            let current = self
                .csr_active_config
                .map(|value| format!("{value:#x}"))
                .unwrap_or_else(|| "default".to_string());
            reasons.push(format!(
                "System Integrity Protection is enabled (booted {current}, expected {:#x})",
                self.sip_required
            ));
        }
        if self.sbm_enabled {
            reasons.push("Apple Secure Boot is enabled".to_string());
        }
        if self.filevault_enabled {
            reasons.push("FileVault is enabled".to_string());
        }
        if self.amfi_enabled {
            reasons.push("AMFI is enforcing above the level the selected patches allow".to_string());
        }
        if self.foreign_patcher {
            reasons.push("System was patched by another patcher".to_string());
        }
        if self.missing_network {
            reasons.push("Kernel Debug Kit missing and no network connection to fetch it".to_string());
        }
        if self.missing_nvda_drv {
            reasons.push("nvda_drv(_vrl) variable missing".to_string());
        }
        if self.missing_web_boot_args {
            reasons.push("ngfxgl=1 and ngfxcompat=1 boot-args missing".to_string());
        }
        if self.missing_whatevergreen {
            reasons.push("WhateverGreen is not loaded".to_string());
        }
        reasons
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub selection: BTreeMap<PatchFamily, bool>,
    pub settings: Requirements,
    pub validation: ValidationResult,
}

impl Decision {
    pub fn selected(&self) -> impl Iterator<Item = PatchFamily> + '_ {
        self.selection
            .iter()
            .filter(|(_, selected)| **selected)
            .map(|(family, _)| *family)
    }

    pub fn is_selected(&self, family: PatchFamily) -> bool {
        self.selection.get(&family).copied().unwrap_or(false)
    }

    pub fn any_selected(&self) -> bool {
        self.selection.values().any(|selected| *selected)
    }

    /// Display names of the selected families, in composition order.
    pub fn selected_names(&self) -> Vec<&'static str> {
        self.selected().map(PatchFamily::display_name).collect()
    }
}

/// Models whose firmware lacks GOP and therefore cannot use AppleALC for audio.
const LEGACY_AUDIO_MODELS: &[&str] = &[
    "MacBook4,1",
    "MacBook5,1",
    "MacBook5,2",
    "MacBook6,1",
    "MacBook7,1",
    "MacBookAir2,1",
    "MacBookAir3,1",
    "MacBookAir3,2",
    "MacBookAir4,1",
    "MacBookAir4,2",
    "MacBookPro4,1",
    "MacBookPro5,1",
    "MacBookPro5,2",
    "MacBookPro5,3",
    "MacBookPro5,4",
    "MacBookPro5,5",
    "MacBookPro6,1",
    "MacBookPro6,2",
    "MacBookPro7,1",
    "MacBookPro8,1",
    "MacBookPro8,2",
    "MacBookPro8,3",
    "Macmini3,1",
    "Macmini4,1",
    "Macmini5,1",
    "Macmini5,2",
    "Macmini5,3",
    "iMac9,1",
    "iMac10,1",
    "iMac11,1",
    "iMac11,2",
    "iMac11,3",
    "iMac12,1",
    "iMac12,2",
    "MacPro3,1",
];

const LEGACY_BRIGHTNESS_MODELS: &[&str] = &["MacBook5,2", "iMac7,1", "iMac8,1", "iMac9,1"];
const REALTEK_MODELS: &[&str] = &["iMac7,1", "iMac8,1"];
const GMUX_MODELS: &[&str] = &["MacBookPro8,2", "MacBookPro8,3"];

/// Last Monterey beta that still shipped the Kepler drivers.
const KEPLER_DROPPED_BUILD: &str = "21A5506j";

/// First Sonoma beta, which still carried the PCIe camera stack.
const PCIE_CAMERA_DROPPED_BUILD: &str = "23A5257q";

#[derive(Debug, Default)]
struct Accumulator {
    selection: BTreeMap<PatchFamily, bool>,
    amfi_must_disable: bool,
    /// Set by families whose binaries fail any AMFI check, not only library validation.
    amfi_allow_all: bool,
    amfi_shim_bins: bool,
    requires_root_kc: bool,
    supports_metal: bool,
    web_checks: bool,
}

impl Accumulator {
    fn new() -> Self {
        Self {
            selection: PatchFamily::ALL.iter().map(|family| (*family, false)).collect(),
            ..Default::default()
        }
    }

    fn set(&mut self, family: PatchFamily, selected: bool) {
        self.selection.insert(family, selected);
    }

    fn get(&self, family: PatchFamily) -> bool {
        self.selection.get(&family).copied().unwrap_or(false)
    }

    fn allow_all(&mut self, family: PatchFamily) {
        self.set(family, true);
        self.amfi_must_disable = true;
        self.amfi_allow_all = true;
    }

    fn non_metal(&mut self, family: PatchFamily, os: &OsInfo) {
        self.set(family, true);
        self.amfi_must_disable = true;
        if os.major() >= VENTURA {
            self.amfi_shim_bins = true;
        }
        self.requires_root_kc = true;
    }
}

/// Decides which families apply and whether patching may proceed.
pub fn decide(
    profile: &HardwareProfile,
    os: &OsInfo,
    env: &EnvironmentSnapshot,
    config: &PatcherConfig,
    manifest: Option<&InstalledPatchRecord>,
) -> Decision {
    let mut acc = Accumulator::new();
    detect_gpus(&mut acc, profile, os, config);
    detect_misc(&mut acc, profile, os, env);

    let mut missing_kdk = false;
    if os.major() <= MONTEREY {
        acc.requires_root_kc = true;
    } else if acc.requires_root_kc {
        missing_kdk = env.kdk.is_none();
    }

    let web_drivers = acc.get(PatchFamily::NvidiaWebDrivers);
    let posture = SecurityPosture::evaluate(&PostureInputs {
        os_major: os.major(),
        csr_active_config: env.csr_active_config,
        secure_boot_model: env.secure_boot_model.as_deref(),
        filevault_reported: env.filevault_enabled,
        boot_args: &env.boot_args,
        oclp_settings: &env.oclp_settings,
        third_party_kexts: web_drivers,
    });
    let amfi_level = amfi_level(&acc, os, env);

    let mut validation = ValidationResult {
        // Floor is High Sierra rather than Big Sur so the Mojave and Catalina tables stay reachable.
        unsupported_host_os: os.major() < HIGH_SIERRA || os.major() > SEQUOIA,
        sip_enabled: posture.sip_enabled,
        sbm_enabled: posture.sbm_enabled,
        filevault_enabled: posture.filevault_enabled,
        amfi_enabled: posture.amfi_blocks(amfi_level),
        foreign_patcher: env.foreign_patcher_marker,
        missing_network: missing_kdk && !env.network_available,
        missing_kdk,
        missing_nvda_drv: acc.web_checks && !(env.nvda_drv_set || env.boot_arg_value("nvda_drv_vrl").is_some()),
        missing_web_boot_args: acc.web_checks
            && !(env.boot_arg_value("ngfxgl").is_some() && env.boot_arg_value("ngfxcompat").is_some()),
        missing_whatevergreen: acc.web_checks
            && !env.loaded_kexts.iter().any(|kext| kext.ends_with("WhateverGreen")),
        sip_required: posture.sip_required.bits,
        csr_active_config: env.csr_active_config,
        patch_allowed: false,
        revert_allowed: false,
    };

    if network_fallback_applies(&acc, &validation, os, env, manifest) {
        info!("no network for the Kernel Debug Kit, limiting patches to networking");
        for family in PatchFamily::ALL.into_iter().filter(|family| !family.is_networking()) {
            acc.set(family, false);
        }
        acc.requires_root_kc = false;
        validation.missing_kdk = false;
        validation.missing_network = false;
    }
    validation.finish();

    let settings = Requirements {
        amfi_level,
        amfi_shim_bins: acc.amfi_shim_bins,
        requires_root_kc: acc.requires_root_kc,
        supports_metal: acc.supports_metal,
        aux_kc_only: os.major() >= VENTURA && !acc.requires_root_kc,
        missing_kdk: validation.missing_kdk,
    };

    let decision = Decision {
        selection: acc.selection,
        settings,
        validation,
    };
    info!(
        os = %os.manifest_label(),
        selected = ?decision.selected_names(),
        patch_allowed = decision.validation.patch_allowed,
        "root patch decision"
    );
    decision
}

fn detect_gpus(acc: &mut Accumulator, profile: &HardwareProfile, os: &OsInfo, config: &PatcherConfig) {
    let major = os.major();
    let minor = os.minor();
    let keyboard_backlight = profile.is_laptop() && profile.flags.has_ambient_light_sensor;

    for gpu in profile.gpus.iter().filter(|gpu| !gpu.is_disabled()) {
        debug!(
            vendor = format_args!("{:#06x}", gpu.vendor_id()),
            device = format_args!("{:#06x}", gpu.device_id()),
            arch = ?gpu.arch(),
            "gpu"
        );
        match gpu.arch() {
            Architecture::NvidiaTesla if !config.force_nvidia_web => {
                if major >= MOJAVE {
                    acc.non_metal(PatchFamily::NvidiaTesla, os);
                    if keyboard_backlight {
                        acc.set(PatchFamily::LegacyKeyboardBacklight, true);
                    }
                }
            }
            Architecture::NvidiaKepler if !config.force_nvidia_web => {
                let dropped = major >= VENTURA
                    || (major == MONTEREY && minor > 0 && !os.build.contains(KEPLER_DROPPED_BUILD));
                if major > BIG_SUR && dropped {
                    acc.set(PatchFamily::NvidiaKepler, true);
                    acc.supports_metal = true;
                    acc.amfi_must_disable = true;
                    if (major == VENTURA && minor >= 4) || major > VENTURA {
                        acc.amfi_shim_bins = true;
                    }
                }
            }
            Architecture::NvidiaFermi
            | Architecture::NvidiaKepler
            | Architecture::NvidiaMaxwell
            | Architecture::NvidiaPascal => {
                if major > MOJAVE {
                    acc.non_metal(PatchFamily::NvidiaWebDrivers, os);
                    acc.web_checks = true;
                }
            }
            Architecture::AmdTeraScale1 if major >= MOJAVE => {
                acc.non_metal(PatchFamily::AmdTeraScale1, os);
            }
            Architecture::AmdTeraScale2 if major >= MOJAVE => {
                acc.non_metal(PatchFamily::AmdTeraScale2, os);
            }
            arch @ (Architecture::AmdLegacyGcn | Architecture::AmdPolaris) => {
                if major <= MONTEREY || profile.flags.is_rosetta {
                    continue;
                }
                if arch == Architecture::AmdPolaris && profile.model != "MacBookPro13,3" {
                    if profile.cpu.has_avx2() {
                        continue;
                    }
                    acc.set(PatchFamily::AmdLegacyPolaris, true);
                } else {
                    // MacBookPro13,3 ships a framebuffer the native Polaris stack lacks.
                    acc.set(PatchFamily::AmdLegacyGcn, true);
                }
                acc.supports_metal = true;
                acc.requires_root_kc = true;
                acc.amfi_must_disable = true;
            }
            Architecture::AmdVega => {
                if major <= MONTEREY || profile.cpu.has_avx2() {
                    continue;
                }
                acc.set(PatchFamily::AmdLegacyVega, true);
                acc.supports_metal = true;
                acc.requires_root_kc = true;
                acc.amfi_must_disable = true;
            }
            Architecture::IntelIronLake | Architecture::IntelSandyBridge if major >= MOJAVE => {
                let family = if gpu.arch() == Architecture::IntelIronLake {
                    PatchFamily::IntelIronLake
                } else {
                    PatchFamily::IntelSandyBridge
                };
                acc.non_metal(family, os);
                if keyboard_backlight {
                    acc.set(PatchFamily::LegacyKeyboardBacklight, true);
                }
            }
            Architecture::IntelIvyBridge if major > BIG_SUR => {
                acc.set(PatchFamily::IntelIvyBridge, true);
                if major >= VENTURA {
                    acc.amfi_must_disable = true;
                    if (major == VENTURA && minor >= 4) || major > VENTURA {
                        acc.amfi_shim_bins = true;
                    }
                }
                acc.supports_metal = true;
            }
            Architecture::IntelHaswell if major > MONTEREY => {
                acc.set(PatchFamily::IntelHaswell, true);
                acc.amfi_must_disable = true;
                if (major == VENTURA && minor >= 4) || major > VENTURA {
                    acc.amfi_shim_bins = true;
                }
                acc.supports_metal = true;
            }
            Architecture::IntelBroadwell | Architecture::IntelSkylake if major > MONTEREY => {
                let family = if gpu.arch() == Architecture::IntelBroadwell {
                    PatchFamily::IntelBroadwell
                } else {
                    PatchFamily::IntelSkylake
                };
                acc.set(family, true);
                acc.amfi_must_disable = true;
                acc.supports_metal = true;
            }
            _ => {}
        }
    }

    // A Metal GPU drives the display pipeline; legacy OpenGL stacks would fight it.
    if acc.supports_metal {
        for family in PatchFamily::ALL.into_iter().filter(|family| family.is_non_metal()) {
            acc.set(family, false);
        }
        acc.set(PatchFamily::LegacyKeyboardBacklight, false);
    }

    // Polaris and Vega lean on parts of the native AMD stack that Legacy GCN replaces.
    if acc.get(PatchFamily::AmdLegacyGcn) {
        acc.set(PatchFamily::AmdLegacyPolaris, false);
        acc.set(PatchFamily::AmdLegacyVega, false);
    }
}

fn detect_misc(acc: &mut Accumulator, profile: &HardwareProfile, os: &OsInfo, env: &EnvironmentSnapshot) {
    let major = os.major();
    let model = profile.model.as_str();

    if let Some(wireless) = &profile.wireless {
        let legacy = matches!(
            wireless.arch(),
            Architecture::BroadcomBcm4331 | Architecture::BroadcomBcm43224 | Architecture::AtherosAr9xxx
        );
        if legacy && major > BIG_SUR {
            acc.set(PatchFamily::LegacyWireless, true);
            if major >= VENTURA {
                acc.amfi_must_disable = true;
            }
        }
        let modern = matches!(wireless.arch(), Architecture::BroadcomBcm4360 | Architecture::BroadcomBrcmNic);
        if modern && major >= SONOMA {
            acc.allow_all(PatchFamily::ModernWireless);
        }
    }

    if major >= SONOMA {
        if profile.flags.pcie_webcam && os.build != PCIE_CAMERA_DROPPED_BUILD {
            acc.allow_all(PatchFamily::PcieFaceTimeCamera);
        }
        if profile.flags.t1_chip {
            acc.allow_all(PatchFamily::T1SecurityChip);
        }
    }

    if major >= VENTURA && !profile.has_usb_arch(Architecture::UsbXhci) {
        let needs_usb11 = if profile.flags.is_hackintosh {
            profile.has_usb_arch(Architecture::UsbUhci) || profile.has_usb_arch(Architecture::UsbOhci)
        } else {
            profile.cpu.generation <= CpuGeneration::Penryn || matches!(model, "MacPro4,1" | "MacPro5,1")
        };
        if needs_usb11 {
            acc.set(PatchFamily::LegacyUsb11, true);
            acc.requires_root_kc = true;
        }
    }

    if major > CATALINA {
        if LEGACY_BRIGHTNESS_MODELS.contains(&model) {
            acc.set(PatchFamily::LegacyBacklightControl, true);
        }
        if REALTEK_MODELS.contains(&model) {
            acc.set(PatchFamily::LegacyRealtek, true);
        } else if LEGACY_AUDIO_MODELS.contains(&model)
            && !env.loaded_kexts.iter().any(|kext| kext.ends_with("AppleALC"))
        {
            acc.set(PatchFamily::LegacyNonGop, true);
        }
    }

    if major > HIGH_SIERRA && GMUX_MODELS.contains(&model) && is_demuxed(profile, env) {
        acc.set(PatchFamily::LegacyGmux, true);
    }
}

/// A demuxed machine has its discrete GPU removed or hidden by the firmware.
fn is_demuxed(profile: &HardwareProfile, env: &EnvironmentSnapshot) -> bool {
    if env.has_boot_arg("-wegnoegpu") || profile.igpu().is_none() {
        return false;
    }
    profile.dgpu().map(|dgpu| dgpu.is_disabled()).unwrap_or(true)
}

fn amfi_level(acc: &Accumulator, os: &OsInfo, env: &EnvironmentSnapshot) -> AmfiLevel {
    if !acc.amfi_must_disable || os.major() < BIG_SUR {
        return AmfiLevel::NoCheck;
    }
    if env.kext_loaded(AMFIPASS_BUNDLE_ID) {
        return AmfiLevel::NoCheck;
    }
    if acc.amfi_allow_all || (os.major() >= VENTURA && acc.amfi_shim_bins) {
        AmfiLevel::AllowAll
    } else {
        AmfiLevel::LibraryValidation
    }
}

/// Wireless-only machines must be able to get online before the KDK can be fetched.
///
/// Applies only when the missing network is the sole reason patching would be refused.
fn network_fallback_applies(
    acc: &Accumulator,
    validation: &ValidationResult,
    os: &OsInfo,
    env: &EnvironmentSnapshot,
    manifest: Option<&InstalledPatchRecord>,
) -> bool {
    let networking = PatchFamily::ALL.into_iter().filter(|family| family.is_networking());
    if os.major() < VENTURA || !networking.clone().any(|family| acc.get(family)) {
        return false;
    }
    if !acc.requires_root_kc || !validation.missing_kdk || env.network_available {
        return false;
    }
    if validation.blocking_besides_network() {
        return false;
    }
    // Wireless patches already installed: the user only has to connect.
    !manifest
        .map(|record| networking.clone().any(|family| record.has_category(family.manifest_key())))
        .unwrap_or(false)
}

/// True when the selected families differ from what the manifest records.
pub fn new_patches_needed(
    decision: &Decision,
    manifest: Option<&InstalledPatchRecord>,
    config: &PatcherConfig,
) -> bool {
    if !decision.any_selected() {
        return false;
    }
    let Some(record) = manifest else {
        return true;
    };
    if record.patcher_version != format!("v{}", config.patcher_version) || record.commit_url != config.commit_url {
        debug!("manifest written by a different build");
        return true;
    }
    decision.selected().any(|family| {
        let missing = !record.has_category(family.manifest_key());
        if missing {
            info!("{} not installed", family.display_name());
        }
        missing
    })
}
