//! Fragments shared by several hardware families.

use super::*;
use phoenix_core::kernel::{MAX, MOJAVE, MONTEREY, VENTURA};

const ALWAYS: VersionTag = VersionTag::Unversioned;
const SKYLIGHT: VersionTag = VersionTag::Fixed("SkyLightPlugins");

pub static NON_METAL_COMMON: CategoryDef = CategoryDef {
    name: "Non-Metal Common",
    range: OsVersionRange::majors(MOJAVE, MAX),
    ops: &[
        install(SLE, "IOSurface.kext", fixed("10.15.7")),
        install(SLF, "OpenGL.framework", fixed("10.14.3")),
        install(SLF, "CoreDisplay.framework", VersionTag::PerMajor("10.14.4")),
        install(SLF, "IOSurface.framework", VersionTag::PerMajor("10.15.7")),
        install(SLF, "QuartzCore.framework", VersionTag::PerMajor("10.15.7")),
        install(SLPF, "GPUSupport.framework", fixed("10.14.3")),
        install(SLPF, "SkyLight.framework", VersionTag::PerMajor("10.14.6")),
        remove(SLE, "AMDRadeonX4000.kext"),
        remove(SLE, "AMDRadeonX4000HWServices.kext"),
        remove(SLE, "AMDRadeonX5000.kext"),
        remove(SLE, "AMDRadeonX5000HWServices.kext"),
        remove(SLE, "AMDRadeonX6000.kext"),
        remove(SLE, "AMDRadeonX6000Framebuffer.kext"),
        remove(SLE, "AMDRadeonX6000HWServices.kext"),
        remove(SLE, "AppleIntelBDWGraphics.kext"),
        remove(SLE, "AppleIntelBDWGraphicsFramebuffer.kext"),
        remove(SLE, "AppleIntelCFLGraphicsFramebuffer.kext"),
        remove(SLE, "AppleIntelHD4000Graphics.kext"),
        remove(SLE, "AppleIntelHD5000Graphics.kext"),
        remove(SLE, "AppleIntelICLGraphics.kext"),
        remove(SLE, "AppleIntelICLLPGraphicsFramebuffer.kext"),
        remove(SLE, "AppleIntelKBLGraphics.kext"),
        remove(SLE, "AppleIntelKBLGraphicsFramebuffer.kext"),
        remove(SLE, "AppleIntelSKLGraphics.kext"),
        remove(SLE, "AppleIntelSKLGraphicsFramebuffer.kext"),
        remove(SLE, "AppleIntelFramebufferAzul.kext"),
        remove(SLE, "AppleIntelFramebufferCapri.kext"),
        remove(SLE, "AppleParavirtGPU.kext"),
        remove(SLE, "GeForce.kext"),
        remove(SLE, "IOAcceleratorFamily2.kext"),
        remove(SLE, "IOGPUFamily.kext"),
        remove(SLE, "AppleAfterburner.kext"),
        install_data(SKYLIGHT_PLUGINS, "DropboxHack.dylib", since(kv(MONTEREY, 0), &SKYLIGHT)),
        install_data(SKYLIGHT_PLUGINS, "DropboxHack.txt", since(kv(MONTEREY, 0), &SKYLIGHT)),
        install_data(SKYLIGHT_PLUGINS, "CatalystButton.dylib", since(kv(MONTEREY, 0), &SKYLIGHT)),
        install_data(SKYLIGHT_PLUGINS, "CatalystButton.txt", since(kv(MONTEREY, 0), &SKYLIGHT)),
        // "When Space Allows" arrived with 12.4.
        run_root(
            "defaults write /Library/Preferences/.GlobalPreferences.plist ShowDate -int 1",
            since(kv(MONTEREY, 5), &ALWAYS),
        ),
    ],
};

/// TeraScale 2 and the web drivers need the High Sierra IOAccelerator structs.
pub static NON_METAL_IOACCEL_COMMON: CategoryDef = CategoryDef {
    name: "Non-Metal IOAccelerator Common",
    range: OsVersionRange::majors(MOJAVE, MAX),
    ops: &[
        install(SLE, "IOAcceleratorFamily2.kext", fixed("10.13.6")),
        install(SLE, "IOSurface.kext", fixed("10.14.6")),
        install(SLF, "IOSurface.framework", VersionTag::PerMajor("10.14.6")),
        install(SLF, "OpenCL.framework", fixed("10.13.6")),
        install(SLPF, "GPUSupport.framework", fixed("10.13.6")),
        install(SLPF, "IOAccelerator.framework", VersionTag::PerMajor("10.13.6")),
        remove(SLE, "AppleCameraInterface.kext"),
    ],
};

pub static NON_METAL_COREDISPLAY_COMMON: CategoryDef = CategoryDef {
    name: "Non-Metal CoreDisplay Common",
    range: OsVersionRange::majors(MOJAVE, MAX),
    ops: &[install(SLF, "CoreDisplay.framework", VersionTag::PerMajor("10.13.6"))],
};

/// Forces the High Sierra Metal kexts into their non-Metal fallback.
pub static NON_METAL_ENFORCEMENT: CategoryDef = CategoryDef {
    name: "Non-Metal Enforcement",
    range: OsVersionRange::majors(MOJAVE, MAX),
    ops: &[
        run_root(
            "defaults write /Library/Preferences/com.apple.CoreDisplay useMetal -boolean no",
            VersionTag::Unversioned,
        ),
        run_root(
            "defaults write /Library/Preferences/com.apple.CoreDisplay useIOP -boolean no",
            VersionTag::Unversioned,
        ),
    ],
};

pub static METAL_COMMON: CategoryDef = CategoryDef {
    name: "Metal Common",
    range: OsVersionRange::majors(VENTURA, MAX),
    ops: &[
        install(SLF, "Metal.framework", fixed("12.5")),
        install(SLF, "MetalPerformanceShaders.framework", fixed("12.5")),
    ],
};

/// Undoes the Metal downgrade of `Metal Common` for the 3802 stack on Ventura.
pub static REVERT_METAL_DOWNGRADE: CategoryDef = CategoryDef {
    name: "Revert Metal Downgrade",
    range: OsVersionRange::majors(VENTURA, VENTURA),
    ops: &[
        remove("/System/Library/Frameworks/Metal.framework/Versions/A/", "Metal"),
        remove("/System/Library/Frameworks/Metal.framework/Versions/A/", "MetalOld.dylib"),
        remove(
            "/System/Library/Frameworks/MetalPerformanceShaders.framework/Versions/A/Frameworks/MPSCore.framework/Versions/A",
            "MPSCore",
        ),
    ],
};

pub static WEBKIT_MONTEREY_COMMON: CategoryDef = CategoryDef {
    name: "WebKit Monterey Common",
    range: OsVersionRange::majors(MONTEREY, MONTEREY),
    ops: &[
        install(SLF, "WebKit.framework", fixed("11.6")),
        install_data(
            "/Library/Apple/System/Library/StagedFrameworks/Safari",
            "WebKit.framework",
            fixed("11.6"),
        ),
    ],
};

/// Restores the 3802 compiler for Ivy Bridge, Haswell and Kepler.
pub static METAL_3802_COMMON: CategoryDef = CategoryDef {
    name: "Metal 3802 Common",
    range: OsVersionRange::majors(VENTURA, MAX),
    ops: &[
        install(SLF, "Metal.framework", fixed("12.5-3802")),
        install(SLPF, "MTLCompiler.framework", fixed("12.5-3802")),
        install(SLPF, "GPUCompiler.framework", fixed("12.5-3802")),
        install("/System/Library/Sandbox/Profiles", "com.apple.mtlcompilerservice.sb", fixed("12.5-3802")),
    ],
};

pub static CATALINA_GVA: CategoryDef = CategoryDef {
    name: "Catalina GVA",
    range: OsVersionRange::majors(MONTEREY, MAX),
    ops: &[
        install(SLPF, "AppleGVA.framework", fixed("10.15.7")),
        install(SLPF, "AppleGVACore.framework", fixed("10.15.7")),
    ],
};

pub static MONTEREY_GVA: CategoryDef = CategoryDef {
    name: "Monterey GVA",
    range: OsVersionRange::majors(VENTURA, MAX),
    ops: &[
        install(SLPF, "AppleGVA.framework", fixed("12.5")),
        install(SLPF, "AppleGVACore.framework", fixed("12.5")),
    ],
};

pub static HIGH_SIERRA_GVA: CategoryDef = CategoryDef {
    name: "High Sierra GVA",
    range: OsVersionRange::majors(MOJAVE, MAX),
    ops: &[
        install(SLPF, "AppleGVA.framework", fixed("10.13.6")),
        install(SLPF, "AppleGVACore.framework", fixed("10.15.7")),
    ],
};

pub static BIG_SUR_OPENCL: CategoryDef = CategoryDef {
    name: "Big Sur OpenCL",
    range: OsVersionRange::majors(MONTEREY, MAX),
    ops: &[install(SLF, "OpenCL.framework", fixed("11.6"))],
};

pub static MONTEREY_OPENCL: CategoryDef = CategoryDef {
    name: "Monterey OpenCL",
    range: OsVersionRange::majors(VENTURA, MAX),
    ops: &[install(SLF, "OpenCL.framework", fixed("12.5"))],
};

/// Ventura's AMD OpenCL/GL compilers emit AVX2.
pub static AMD_OPENCL: CategoryDef = CategoryDef {
    name: "AMD OpenCL",
    range: OsVersionRange::majors(VENTURA, MAX),
    ops: &[
        install(SLF, "OpenCL.framework", fixed("12.5 non-AVX2.0")),
        install(SLF, "OpenGL.framework", fixed("12.5 non-AVX2.0")),
    ],
};
