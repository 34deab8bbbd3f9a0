//! Audio, networking, brightness, USB, camera and T1 categories.

use super::*;
use phoenix_core::kernel::{HIGH_SIERRA, MAX, MOJAVE, MONTEREY, SEQUOIA, SIERRA, SONOMA, VENTURA};

const SIERRA_KEXT: VersionTag = VersionTag::Fixed("10.12.6");
const WIFI_FRAMEWORKS: VersionTag = VersionTag::Switch {
    at: KernelVersion::new(SEQUOIA, 0),
    before: &VersionTag::Fixed("12.7.2"),
    after: &VersionTag::PerMajor("12.7.2"),
};
const USB_PLUGINS: &str = "/System/Library/Extensions/IOUSBHostFamily.kext/Contents/PlugIns";
const MODERN_WIFI: VersionTag = VersionTag::PerMajor("13.7.2");
const T1_STACK: VersionTag = VersionTag::Fixed("13.6");
const LOCAL_AUTH_SUPPORT: &str = "/System/Library/Frameworks/LocalAuthentication.framework/Support";
const NFC_FIRMWARE: &str = "/usr/standalone/firmware/nfrestore/firmware/fw";
const CAMERA_STACK: VersionTag = VersionTag::Fixed("14.0 Beta 1");

/// Realtek codec on iMac7,1 and iMac8,1.
pub static LEGACY_REALTEK: CategoryDef = CategoryDef {
    name: "Legacy Realtek",
    range: OsVersionRange::majors(SIERRA, MAX),
    ops: &[
        install(SLE, "AppleHDA.kext", fixed("10.11.6")),
        install(SLE, "IOAudioFamily.kext", fixed("10.11.6")),
        // These match the same HDA path and win against the restored AppleHDA.
        remove(SLE, "AppleVirtIO.kext"),
        remove(SLE, "AppleVirtualGraphics.kext"),
        remove(SLE, "AppleVirtualPlatform.kext"),
        remove(SLE, "ApplePVPanic.kext"),
        remove(SLE, "AppleVirtIOStorage.kext"),
        remove(SLE, "AvpFairPlayDriver.kext"),
    ],
};

/// Machines whose firmware lacks GOP and cannot run AppleALC.
pub static LEGACY_NON_GOP: CategoryDef = CategoryDef {
    name: "Legacy Non-GOP",
    range: OsVersionRange::majors(MOJAVE, MAX),
    ops: &[install(SLE, "AppleHDA.kext", fixed("10.13.6"))],
};

pub static LEGACY_WIRELESS: CategoryDef = CategoryDef {
    name: "Legacy Wireless",
    range: OsVersionRange::majors(MONTEREY, MAX),
    ops: &[
        install("/usr/libexec", "airportd", fixed("11.7.10")),
        install("/System/Library/CoreServices", "WiFiAgent.app", fixed("11.7.10")),
        install_data(
            SKYLIGHT_PLUGINS,
            "CoreWLAN.dylib",
            VersionTag::Window {
                from: KernelVersion::new(MONTEREY, 0),
                until: KernelVersion::new(VENTURA, 0),
                tag: &VersionTag::Fixed("SkyLightPlugins"),
            },
        ),
        install_data(
            SKYLIGHT_PLUGINS,
            "CoreWLAN.txt",
            VersionTag::Window {
                from: KernelVersion::new(MONTEREY, 0),
                until: KernelVersion::new(VENTURA, 0),
                tag: &VersionTag::Fixed("SkyLightPlugins"),
            },
        ),
    ],
};

pub static LEGACY_WIRELESS_EXTENDED: CategoryDef = CategoryDef {
    name: "Legacy Wireless Extended",
    range: OsVersionRange::majors(VENTURA, MAX),
    ops: &[
        install("/usr/libexec", "wps", WIFI_FRAMEWORKS),
        install("/usr/libexec", "wifip2pd", WIFI_FRAMEWORKS),
        install(SLF, "CoreWLAN.framework", WIFI_FRAMEWORKS),
        install(SLPF, "CoreWiFi.framework", WIFI_FRAMEWORKS),
        install(SLPF, "IO80211.framework", WIFI_FRAMEWORKS),
        install(SLPF, "WiFiPeerToPeer.framework", WIFI_FRAMEWORKS),
    ],
};

/// BCM4360-class and AirPortBrcmNIC cards, dropped in Sonoma.
pub static MODERN_WIRELESS: CategoryDef = CategoryDef {
    name: "Modern Wireless",
    range: OsVersionRange::majors(SONOMA, MAX),
    ops: &[
        install("/usr/libexec", "airportd", MODERN_WIFI),
        install("/usr/libexec", "wifip2pd", MODERN_WIFI),
        install(
            "/System/Library/CoreServices",
            "WiFiAgent.app",
            since(kv(SEQUOIA, 0), &VersionTag::Fixed("14.7.2")),
        ),
        install(SLF, "CoreWLAN.framework", MODERN_WIFI),
        install(SLPF, "CoreWiFi.framework", MODERN_WIFI),
        install(SLPF, "IO80211.framework", MODERN_WIFI),
        install(SLPF, "WiFiPeerToPeer.framework", MODERN_WIFI),
    ],
};

pub static LEGACY_BACKLIGHT_CONTROL: CategoryDef = CategoryDef {
    name: "Legacy Backlight Control",
    range: OsVersionRange::majors(HIGH_SIERRA, MAX),
    ops: &[
        install(SLE, "AppleBacklight.kext", SIERRA_KEXT),
        install(SLE, "AppleBacklightExpert.kext", SIERRA_KEXT),
        install(SLPF, "DisplayServices.framework", SIERRA_KEXT),
        remove(AGC_PLUGINS, "AGDCBacklightControl.kext"),
    ],
};

/// Demuxed MacBookPro8,2/8,3 running on the iGPU alone.
pub static LEGACY_GMUX: CategoryDef = CategoryDef {
    name: "Legacy GMUX",
    range: OsVersionRange::majors(HIGH_SIERRA, MAX),
    ops: &[
        install(AGC_PLUGINS, "AppleMuxControl.kext", SIERRA_KEXT),
        remove(SLE, "AppleBacklight.kext"),
        remove(AGC_PLUGINS, "AGDCBacklightControl.kext"),
        remove(AGC_PLUGINS, "AppleMuxControl.kext"),
    ],
};

pub static LEGACY_KEYBOARD_BACKLIGHT: CategoryDef = CategoryDef {
    name: "Legacy Keyboard Backlight",
    range: OsVersionRange::majors(MOJAVE, MAX),
    ops: &[run_root(
        "defaults write /Library/Preferences/.GlobalPreferences.plist Moraea_BacklightHack -bool true",
        VersionTag::Unversioned,
    )],
};

pub static LEGACY_USB11: CategoryDef = CategoryDef {
    name: "Legacy USB 1.1",
    range: OsVersionRange::majors(VENTURA, MAX),
    ops: &[install(
        SLE,
        "IOUSBHostFamily.kext",
        VersionTag::Switch {
            at: KernelVersion::new(SONOMA, 4),
            before: &VersionTag::Fixed("12.6.2"),
            after: &VersionTag::Fixed("12.6.2-23.4"),
        },
    )],
};

/// UHCI/OHCI injection through the plugin folder panics before 14.1.
pub static LEGACY_USB11_EXTENDED: CategoryDef = CategoryDef {
    name: "Legacy USB 1.1 Extended",
    range: OsVersionRange::between(SONOMA, 1, MAX, 99),
    ops: &[
        install(USB_PLUGINS, "AppleUSBOHCI.kext", fixed("12.6.2-USB")),
        install(USB_PLUGINS, "AppleUSBOHCIPCI.kext", fixed("12.6.2-USB")),
        install(USB_PLUGINS, "AppleUSBUHCI.kext", fixed("12.6.2-USB")),
        install(USB_PLUGINS, "AppleUSBUHCIPCI.kext", fixed("12.6.2-USB")),
        install(SLE, "AppleUSBAudio.kext", since(kv(SEQUOIA, 0), &VersionTag::Fixed("14.5"))),
        install(SLE, "AppleUSBCDC.kext", since(kv(SEQUOIA, 0), &VersionTag::Fixed("14.5"))),
    ],
};

/// FaceTime cameras attached over PCIe (`CMRA`), dropped in Sonoma.
pub static PCIE_FACETIME_CAMERA: CategoryDef = CategoryDef {
    name: "PCIe FaceTime Camera",
    range: OsVersionRange::majors(SONOMA, MAX),
    ops: &[
        install(
            "/System/Library/Frameworks/CoreMediaIO.framework/Versions/A/Resources",
            "AppleCamera.plugin",
            CAMERA_STACK,
        ),
        install(
            "/System/Library/LaunchDaemons",
            "com.apple.cmio.AppleCameraAssistant.plist",
            CAMERA_STACK,
        ),
    ],
};

/// Touch ID, Apple Pay and password prompts on T1 machines.
pub static T1_SECURITY_CHIP: CategoryDef = CategoryDef {
    name: "T1 Security Chip",
    range: OsVersionRange::majors(SONOMA, MAX),
    ops: &[
        install("/usr/lib", "libNFC_Comet.dylib", T1_STACK),
        install("/usr/lib", "libNFC_HAL.dylib", T1_STACK),
        install("/usr/lib", "libnfshared.dylib", T1_STACK),
        install("/usr/lib", "libnfshared.dylibOld.dylib", T1_STACK),
        install("/usr/lib", "libnfstorage.dylib", T1_STACK),
        install("/usr/lib", "libnfrestore.dylib", T1_STACK),
        install("/usr/lib", "libPN548_API.dylib", T1_STACK),
        install("/usr/libexec", "biometrickitd", T1_STACK),
        install("/usr/libexec", "nfcd", T1_STACK),
        install("/usr/libexec", "nfrestore_service", T1_STACK),
        install(NFC_FIRMWARE, "PN549_FW_02_01_5A_rev88207.bin", T1_STACK),
        install(NFC_FIRMWARE, "SN100V_FW_A3_01_01_81_rev127208.bin", T1_STACK),
        install(NFC_FIRMWARE, "SN200V_FW_B1_02_01_86_rev127266.bin", T1_STACK),
        install(NFC_FIRMWARE, "SN300V_FW_B0_02_01_22_rev129172.bin", T1_STACK),
        install(
            LOCAL_AUTH_SUPPORT,
            "SharedUtils.framework",
            VersionTag::Switch {
                at: KernelVersion::new(SEQUOIA, 0),
                before: &VersionTag::PerMajor("13.6"),
                after: &VersionTag::PerMajor("13.7.1"),
            },
        ),
        // Needed to enroll a Touch ID fingerprint.
        install(LOCAL_AUTH_SUPPORT, "MechanismPlugins", since(kv(SEQUOIA, 0), &VersionTag::Fixed("15.0 Beta 4"))),
        install(LOCAL_AUTH_SUPPORT, "ModulePlugins", since(kv(SEQUOIA, 2), &VersionTag::Fixed("15.1"))),
        install(SLPF, "EmbeddedOSInstall.framework", T1_STACK),
        install(SLPF, "NearField.framework", since(kv(SEQUOIA, 0), &VersionTag::Fixed("14.7.2"))),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wireless_skylight_plugin_only_on_monterey() {
        let plugin = LEGACY_WIRELESS.ops.iter().find(|op| op.file == "CoreWLAN.dylib").unwrap();
        assert_eq!(plugin.tag.resolve(kv(21, 6)).as_deref(), Some("SkyLightPlugins"));
        assert_eq!(plugin.tag.resolve(kv(22, 0)), None);
    }

    #[test]
    fn wireless_frameworks_are_rebuilt_per_major_on_sequoia() {
        assert_eq!(WIFI_FRAMEWORKS.resolve(kv(23, 5)).as_deref(), Some("12.7.2"));
        assert_eq!(WIFI_FRAMEWORKS.resolve(kv(24, 0)).as_deref(), Some("12.7.2-24"));
    }

    #[test]
    fn modern_wireless_tags_follow_running_major() {
        assert!(!MODERN_WIRELESS.applies_to(kv(22, 6)));
        let airportd = MODERN_WIRELESS.ops.iter().find(|op| op.file == "airportd").unwrap();
        assert_eq!(airportd.tag.resolve(kv(23, 0)).as_deref(), Some("13.7.2-23"));
        assert_eq!(airportd.tag.resolve(kv(24, 1)).as_deref(), Some("13.7.2-24"));
        let agent = MODERN_WIRELESS.ops.iter().find(|op| op.file == "WiFiAgent.app").unwrap();
        assert_eq!(agent.tag.resolve(kv(23, 6)), None);
        assert_eq!(agent.tag.resolve(kv(24, 0)).as_deref(), Some("14.7.2"));
    }

    #[test]
    fn t1_plugins_track_sequoia_point_releases() {
        let tag = |file: &str| T1_SECURITY_CHIP.ops.iter().find(|op| op.file == file).unwrap().tag;
        assert_eq!(tag("SharedUtils.framework").resolve(kv(23, 4)).as_deref(), Some("13.6-23"));
        assert_eq!(tag("SharedUtils.framework").resolve(kv(24, 0)).as_deref(), Some("13.7.1-24"));
        assert_eq!(tag("MechanismPlugins").resolve(kv(23, 4)), None);
        assert_eq!(tag("ModulePlugins").resolve(kv(24, 1)), None);
        assert_eq!(tag("ModulePlugins").resolve(kv(24, 2)).as_deref(), Some("15.1"));
        assert!(PCIE_FACETIME_CAMERA.applies_to(kv(23, 0)));
        assert!(!PCIE_FACETIME_CAMERA.applies_to(kv(22, 6)));
    }

    #[test]
    fn usb_extended_starts_at_sonoma_14_1() {
        assert!(!LEGACY_USB11_EXTENDED.applies_to(kv(23, 0)));
        assert!(LEGACY_USB11_EXTENDED.applies_to(kv(23, 1)));
        let host = LEGACY_USB11.ops[0].tag;
        assert_eq!(host.resolve(kv(23, 3)).as_deref(), Some("12.6.2"));
        assert_eq!(host.resolve(kv(23, 4)).as_deref(), Some("12.6.2-23.4"));
    }
}
