//! Per-family graphics categories.

use super::*;
use phoenix_core::kernel::{MAX, MOJAVE, MONTEREY, SEQUOIA, SONOMA, VENTURA};

const HS: VersionTag = VersionTag::Fixed("10.13.6");
const B6: VersionTag = VersionTag::Fixed("12.0 Beta 6");
const B3: VersionTag = VersionTag::Fixed("11.0 Beta 3");
const B3_PER_MAJOR: VersionTag = VersionTag::PerMajor("11.0 Beta 3");
const WEB: VersionTag = VersionTag::Fixed("WebDriver-387.10.10.10.40.140");
const MONTEREY_KEXT: VersionTag = VersionTag::Fixed("12.5");
/// Framebuffers last shipped with Monterey need a rebuilt binary on Sonoma.
const MONTEREY_FB: VersionTag = VersionTag::Switch {
    at: KernelVersion { major: SONOMA, minor: 0 },
    before: &VersionTag::Fixed("12.5"),
    after: &VersionTag::Switch {
        at: KernelVersion { major: SONOMA, minor: 4 },
        before: &VersionTag::Fixed("12.5-23"),
        after: &VersionTag::Fixed("12.5-23.4"),
    },
};
const METAL_DRIVER: VersionTag = VersionTag::Switch {
    at: KernelVersion { major: SEQUOIA, minor: 0 },
    before: &VersionTag::Fixed("12.5"),
    after: &VersionTag::Fixed("12.5-24"),
};

pub static NVIDIA_TESLA: CategoryDef = CategoryDef {
    name: "Nvidia Tesla",
    range: OsVersionRange::majors(MOJAVE, MAX),
    ops: &[
        install(SLE, "GeForceGA.bundle", HS),
        install(SLE, "GeForceTesla.kext", HS),
        install(SLE, "GeForceTeslaGLDriver.bundle", HS),
        install(SLE, "GeForceTeslaVADriver.bundle", HS),
        install(SLE, "NVDANV50HalTesla.kext", HS),
        install(SLE, "NVDAResmanTesla.kext", HS),
        // NVDAStartup left the OS with 12.0 Beta 7.
        install(SLE, "NVDAStartup.kext", since(kv(MONTEREY, 1), &B6)),
    ],
};

pub static NVIDIA_KEPLER: CategoryDef = CategoryDef {
    name: "Nvidia Kepler",
    range: OsVersionRange::between(MONTEREY, 1, MAX, 99),
    ops: &[
        install(SLE, "GeForce.kext", B6),
        install(SLE, "NVDAGF100Hal.kext", B6),
        install(SLE, "NVDAGK100Hal.kext", B6),
        install(SLE, "NVDAResman.kext", B6),
        install(SLE, "NVDAStartup.kext", B6),
        install(SLE, "GeForceAIRPlugin.bundle", B3),
        install(SLE, "GeForceGLDriver.bundle", B3),
        install(
            SLE,
            "GeForceMTLDriver.bundle",
            VersionTag::Switch {
                at: KernelVersion::new(VENTURA, 0),
                before: &B3,
                after: &B3_PER_MAJOR,
            },
        ),
        install(SLE, "GeForceVADriver.bundle", B6),
        install(
            SLF,
            "Metal.framework",
            VersionTag::Window {
                from: KernelVersion::new(MONTEREY, 6),
                until: KernelVersion::new(VENTURA, 0),
                tag: &VersionTag::Fixed("12.5 Beta 2"),
            },
        ),
        // Ventura and newer take GPUCompiler from the 3802 stack.
        install(
            SLPF,
            "GPUCompiler.framework",
            VersionTag::Window {
                from: KernelVersion::new(MONTEREY, 0),
                until: KernelVersion::new(VENTURA, 0),
                tag: &VersionTag::Fixed("11.6"),
            },
        ),
    ],
};

pub static NVIDIA_WEB_DRIVERS: CategoryDef = CategoryDef {
    name: "Nvidia Web Drivers",
    range: OsVersionRange::majors(MOJAVE, MAX),
    ops: &[
        install(SLE, "GeForceAIRPluginWeb.bundle", WEB),
        install(SLE, "GeForceGLDriverWeb.bundle", WEB),
        install(SLE, "GeForceMTLDriverWeb.bundle", WEB),
        install(SLE, "GeForceVADriverWeb.bundle", WEB),
        install(SLE, "GeForceTeslaGAWeb.bundle", WEB),
        install(SLE, "GeForceTeslaGLDriverWeb.bundle", WEB),
        install(SLE, "GeForceTeslaVADriverWeb.bundle", WEB),
        install_data("/Library/Extensions", "GeForceWeb.kext", WEB),
        install_data("/Library/Extensions", "NVDAGF100HalWeb.kext", WEB),
        install_data("/Library/Extensions", "NVDAGK100HalWeb.kext", WEB),
        install_data("/Library/Extensions", "NVDAGM100HalWeb.kext", WEB),
        install_data("/Library/Extensions", "NVDAGP100HalWeb.kext", WEB),
        install_data("/Library/Extensions", "NVDAResmanWeb.kext", WEB),
        install_data("/Library/Extensions", "NVDAStartupWeb.kext", WEB),
        install_data("/Library/Extensions", "GeForceTeslaWeb.kext", WEB),
        install_data("/Library/Extensions", "NVDANV50HalTeslaWeb.kext", WEB),
        install_data("/Library/Extensions", "NVDAResmanTeslaWeb.kext", WEB),
        // The auxiliary cache loads late, so the stock startup kext would match first.
        remove(SLE, "NVDAStartup.kext"),
    ],
};

pub static AMD_TERASCALE_COMMON: CategoryDef = CategoryDef {
    name: "AMD TeraScale Common",
    range: OsVersionRange::majors(MOJAVE, MAX),
    ops: &[
        install(SLE, "AMDFramebuffer.kext", HS),
        install(SLE, "AMDLegacyFramebuffer.kext", HS),
        install(SLE, "AMDLegacySupport.kext", HS),
        install(SLE, "AMDShared.bundle", HS),
        install(SLE, "AMDSupport.kext", HS),
        remove(SLE, "AMD7000Controller.kext"),
        remove(SLE, "AMD8000Controller.kext"),
        remove(SLE, "AMD9000Controller.kext"),
        remove(SLE, "AMD9500Controller.kext"),
        remove(SLE, "AMD10000Controller.kext"),
    ],
};

pub static AMD_TERASCALE_1: CategoryDef = CategoryDef {
    name: "AMD TeraScale 1",
    range: OsVersionRange::majors(MOJAVE, MAX),
    ops: &[
        install(SLE, "AMD2400Controller.kext", HS),
        install(SLE, "AMD2600Controller.kext", HS),
        install(SLE, "AMD3800Controller.kext", HS),
        install(SLE, "AMD4600Controller.kext", HS),
        install(SLE, "AMD4800Controller.kext", HS),
        install(SLE, "ATIRadeonX2000.kext", HS),
        install(SLE, "ATIRadeonX2000GA.plugin", HS),
        install(SLE, "ATIRadeonX2000GLDriver.bundle", HS),
        install(SLE, "ATIRadeonX2000VADriver.bundle", HS),
    ],
};

pub static AMD_TERASCALE_2: CategoryDef = CategoryDef {
    name: "AMD TeraScale 2",
    range: OsVersionRange::majors(MOJAVE, MAX),
    ops: &[
        install(SLE, "AMD5000Controller.kext", HS),
        install(SLE, "AMD6000Controller.kext", HS),
        install(SLE, "AMDRadeonVADriver.bundle", HS),
        install(SLE, "AMDRadeonVADriver2.bundle", HS),
        install(SLE, "AMDRadeonX3000.kext", HS),
        install(SLE, "AMDRadeonX3000GLDriver.bundle", HS),
    ],
};

pub static AMD_LEGACY_GCN: CategoryDef = CategoryDef {
    name: "AMD Legacy GCN",
    range: OsVersionRange::majors(VENTURA, MAX),
    ops: &[
        install(SLE, "AMD7000Controller.kext", MONTEREY_KEXT),
        install(SLE, "AMD8000Controller.kext", MONTEREY_KEXT),
        install(SLE, "AMD9000Controller.kext", MONTEREY_KEXT),
        install(SLE, "AMD9500Controller.kext", MONTEREY_KEXT),
        install(SLE, "AMD10000Controller.kext", MONTEREY_KEXT),
        install(SLE, "AMDRadeonX4000.kext", MONTEREY_FB),
        install(SLE, "AMDRadeonX4000HWServices.kext", MONTEREY_KEXT),
        install(
            SLE,
            "AMDFramebuffer.kext",
            VersionTag::Switch {
                at: KernelVersion::new(VENTURA, 4),
                before: &MONTEREY_KEXT,
                after: &VersionTag::Fixed("12.5-GCN"),
            },
        ),
        install(SLE, "AMDSupport.kext", MONTEREY_KEXT),
        install(SLE, "AMDRadeonVADriver.bundle", MONTEREY_KEXT),
        install(SLE, "AMDRadeonVADriver2.bundle", MONTEREY_KEXT),
        install(SLE, "AMDRadeonX4000GLDriver.bundle", MONTEREY_KEXT),
        install(SLE, "AMDMTLBronzeDriver.bundle", METAL_DRIVER),
        install(SLE, "AMDShared.bundle", MONTEREY_KEXT),
    ],
};

pub static AMD_LEGACY_POLARIS: CategoryDef = CategoryDef {
    name: "AMD Legacy Polaris",
    range: OsVersionRange::majors(VENTURA, MAX),
    ops: &[
        install(SLE, "AMDRadeonX4000.kext", MONTEREY_FB),
        install(SLE, "AMDRadeonX4000HWServices.kext", MONTEREY_KEXT),
        install(SLE, "AMDRadeonVADriver2.bundle", MONTEREY_KEXT),
        install(SLE, "AMDRadeonX4000GLDriver.bundle", MONTEREY_KEXT),
        install(SLE, "AMDMTLBronzeDriver.bundle", METAL_DRIVER),
        install(SLE, "AMDShared.bundle", MONTEREY_KEXT),
    ],
};

pub static AMD_LEGACY_VEGA: CategoryDef = CategoryDef {
    name: "AMD Legacy Vega",
    range: OsVersionRange::majors(VENTURA, MAX),
    ops: &[
        install(SLE, "AMDRadeonX5000.kext", MONTEREY_FB),
        install(SLE, "AMDRadeonVADriver2.bundle", MONTEREY_KEXT),
        install(SLE, "AMDRadeonX5000GLDriver.bundle", MONTEREY_KEXT),
        install(SLE, "AMDRadeonX5000MTLDriver.bundle", METAL_DRIVER),
        install(SLE, "AMDRadeonX5000Shared.bundle", MONTEREY_KEXT),
        install(SLE, "AMDShared.bundle", MONTEREY_KEXT),
    ],
};

pub static INTEL_IRONLAKE: CategoryDef = CategoryDef {
    name: "Intel Ironlake",
    range: OsVersionRange::majors(MOJAVE, MAX),
    ops: &[
        install(SLE, "AppleIntelHDGraphics.kext", HS),
        install(SLE, "AppleIntelHDGraphicsFB.kext", HS),
        install(SLE, "AppleIntelHDGraphicsGA.plugin", HS),
        install(SLE, "AppleIntelHDGraphicsGLDriver.bundle", HS),
        install(SLE, "AppleIntelHDGraphicsVADriver.bundle", HS),
    ],
};

pub static INTEL_SANDY_BRIDGE: CategoryDef = CategoryDef {
    name: "Intel Sandy Bridge",
    range: OsVersionRange::majors(MOJAVE, MAX),
    ops: &[
        install(SLE, "AppleIntelHD3000Graphics.kext", HS),
        install(SLE, "AppleIntelHD3000GraphicsGA.plugin", HS),
        install(SLE, "AppleIntelHD3000GraphicsGLDriver.bundle", HS),
        install(SLE, "AppleIntelHD3000GraphicsVADriver.bundle", HS),
        install(SLE, "AppleIntelSNBGraphicsFB.kext", HS),
        install(SLE, "AppleIntelSNBVA.bundle", HS),
    ],
};

pub static INTEL_IVY_BRIDGE: CategoryDef = CategoryDef {
    name: "Intel Ivy Bridge",
    range: OsVersionRange::majors(MONTEREY, MAX),
    ops: &[
        install(SLE, "AppleIntelHD4000GraphicsGLDriver.bundle", fixed("11.0 Beta 6")),
        install(SLE, "AppleIntelHD4000GraphicsMTLDriver.bundle", fixed("11.0 Beta 6")),
        install(SLE, "AppleIntelHD4000GraphicsVADriver.bundle", fixed("11.3 Beta 1")),
        install(SLE, "AppleIntelFramebufferCapri.kext", fixed("11.4")),
        install(SLE, "AppleIntelHD4000Graphics.kext", fixed("11.4")),
        install(SLE, "AppleIntelIVBVA.bundle", fixed("11.4")),
        install(SLE, "AppleIntelGraphicsShared.bundle", fixed("11.4")),
        run_user("defaults write com.apple.coremedia hardwareVideoDecoder -string enable"),
    ],
};

pub static INTEL_HASWELL: CategoryDef = CategoryDef {
    name: "Intel Haswell",
    range: OsVersionRange::majors(VENTURA, MAX),
    ops: &[
        install(SLE, "AppleIntelFramebufferAzul.kext", MONTEREY_FB),
        install(SLE, "AppleIntelHD5000Graphics.kext", MONTEREY_FB),
        install(SLE, "AppleIntelHD5000GraphicsGLDriver.bundle", MONTEREY_KEXT),
        install(SLE, "AppleIntelHD5000GraphicsMTLDriver.bundle", MONTEREY_KEXT),
        install(SLE, "AppleIntelHD5000GraphicsVADriver.bundle", MONTEREY_KEXT),
        install(SLE, "AppleIntelHSWVA.bundle", MONTEREY_KEXT),
        install(SLE, "AppleIntelGraphicsShared.bundle", MONTEREY_KEXT),
    ],
};

pub static INTEL_BROADWELL: CategoryDef = CategoryDef {
    name: "Intel Broadwell",
    range: OsVersionRange::majors(VENTURA, MAX),
    ops: &[
        install(SLE, "AppleIntelBDWGraphics.kext", MONTEREY_FB),
        install(SLE, "AppleIntelBDWGraphicsFramebuffer.kext", MONTEREY_FB),
        install(SLE, "AppleIntelBDWGraphicsGLDriver.bundle", MONTEREY_KEXT),
        install(SLE, "AppleIntelBDWGraphicsMTLDriver.bundle", METAL_DRIVER),
        install(SLE, "AppleIntelBDWGraphicsVADriver.bundle", MONTEREY_KEXT),
        install(SLE, "AppleIntelBDWGraphicsVAME.bundle", MONTEREY_KEXT),
        install(SLE, "AppleIntelGraphicsShared.bundle", MONTEREY_KEXT),
    ],
};

pub static INTEL_SKYLAKE: CategoryDef = CategoryDef {
    name: "Intel Skylake",
    range: OsVersionRange::majors(VENTURA, MAX),
    ops: &[
        install(SLE, "AppleIntelSKLGraphics.kext", MONTEREY_FB),
        install(SLE, "AppleIntelSKLGraphicsFramebuffer.kext", MONTEREY_FB),
        install(SLE, "AppleIntelSKLGraphicsGLDriver.bundle", MONTEREY_KEXT),
        install(SLE, "AppleIntelSKLGraphicsMTLDriver.bundle", METAL_DRIVER),
        install(SLE, "AppleIntelSKLGraphicsVADriver.bundle", MONTEREY_KEXT),
        install(SLE, "AppleIntelSKLGraphicsVAME.bundle", MONTEREY_KEXT),
        install(SLE, "AppleIntelGraphicsShared.bundle", MONTEREY_KEXT),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    fn tag_for(category: &CategoryDef, file: &str, os: KernelVersion) -> Option<String> {
        category
            .ops
            .iter()
            .find(|op| op.file == file)
            .and_then(|op| op.tag.resolve(os))
    }

    #[test]
    fn monterey_framebuffers_follow_sonoma_point_releases() {
        assert_eq!(tag_for(&INTEL_HASWELL, "AppleIntelFramebufferAzul.kext", kv(22, 6)).as_deref(), Some("12.5"));
        assert_eq!(tag_for(&INTEL_HASWELL, "AppleIntelFramebufferAzul.kext", kv(23, 0)).as_deref(), Some("12.5-23"));
        assert_eq!(tag_for(&INTEL_HASWELL, "AppleIntelFramebufferAzul.kext", kv(23, 4)).as_deref(), Some("12.5-23.4"));
    }

    #[test]
    fn kepler_metal_downgrade_only_on_late_monterey() {
        assert_eq!(tag_for(&NVIDIA_KEPLER, "Metal.framework", kv(21, 5)), None);
        assert_eq!(tag_for(&NVIDIA_KEPLER, "Metal.framework", kv(21, 6)).as_deref(), Some("12.5 Beta 2"));
        assert_eq!(tag_for(&NVIDIA_KEPLER, "Metal.framework", kv(22, 0)), None);
        assert_eq!(
            tag_for(&NVIDIA_KEPLER, "GeForceMTLDriver.bundle", kv(23, 0)).as_deref(),
            Some("11.0 Beta 3-23")
        );
    }

    #[test]
    fn tesla_startup_kext_from_monterey_beta_7() {
        assert_eq!(tag_for(&NVIDIA_TESLA, "NVDAStartup.kext", kv(21, 0)), None);
        assert_eq!(tag_for(&NVIDIA_TESLA, "NVDAStartup.kext", kv(21, 1)).as_deref(), Some("12.0 Beta 6"));
    }
}
