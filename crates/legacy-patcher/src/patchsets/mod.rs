//! Static patch tables.
//!
//! Every category is plain data: a name, the kernel range it applies to and
//! a flat list of operations. Source artifacts are addressed as
//! `<payload_root>/<tag>/<dir>/<file>`; the tag is resolved per running OS.

use phoenix_core::{kernel, KernelVersion, OsVersionRange};

mod graphics;
mod misc;
mod shared;

pub use graphics::*;
pub use misc::*;
pub use shared::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationKind {
    InstallSystem,
    InstallData,
    RemoveSystem,
    RemoveData,
    RunProcess,
    RunAsRoot,
}

/// Source-artifact version tag, evaluated against the running kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionTag {
    Fixed(&'static str),
    /// `"<base>-<major>"`, for binaries stubbed per OS.
    PerMajor(&'static str),
    /// `before` below `at`, `after` from `at` on.
    Switch {
        at: KernelVersion,
        before: &'static VersionTag,
        after: &'static VersionTag,
    },
    /// `tag` only while `from <= os < until`; otherwise the entry is dropped.
    Window {
        from: KernelVersion,
        until: KernelVersion,
        tag: &'static VersionTag,
    },
    /// Removals and processes carry no version.
    Unversioned,
    Empty,
}

impl VersionTag {
    /// `None` means the entry does not apply to this OS.
    pub fn resolve(&self, os: KernelVersion) -> Option<String> {
        match self {
            Self::Fixed(tag) => (!tag.is_empty()).then(|| tag.to_string()),
            Self::PerMajor(base) => Some(format!("{}-{}", base, os.major)),
            Self::Switch { at, before, after } => {
                if os < *at {
                    before.resolve(os)
                } else {
                    after.resolve(os)
                }
            }
            Self::Window { from, until, tag } => {
                if *from <= os && os < *until {
                    tag.resolve(os)
                } else {
                    None
                }
            }
            Self::Unversioned => Some(String::new()),
            Self::Empty => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpDef {
    pub kind: OperationKind,
    /// Destination directory. Empty for processes.
    pub dir: &'static str,
    /// File name, or the full command line for processes.
    pub file: &'static str,
    pub tag: VersionTag,
}

#[derive(Debug, Clone, Copy)]
pub struct CategoryDef {
    pub name: &'static str,
    pub range: OsVersionRange,
    pub ops: &'static [OpDef],
}

impl CategoryDef {
    pub fn applies_to(&self, os: KernelVersion) -> bool {
        self.range.contains(os)
    }
}

pub(crate) const fn install(dir: &'static str, file: &'static str, tag: VersionTag) -> OpDef {
    OpDef {
        kind: OperationKind::InstallSystem,
        dir,
        file,
        tag,
    }
}

pub(crate) const fn install_data(dir: &'static str, file: &'static str, tag: VersionTag) -> OpDef {
    OpDef {
        kind: OperationKind::InstallData,
        dir,
        file,
        tag,
    }
}

pub(crate) const fn remove(dir: &'static str, file: &'static str) -> OpDef {
    OpDef {
        kind: OperationKind::RemoveSystem,
        dir,
        file,
        tag: VersionTag::Unversioned,
    }
}

pub(crate) const fn run_root(command: &'static str, tag: VersionTag) -> OpDef {
    OpDef {
        kind: OperationKind::RunAsRoot,
        dir: "",
        file: command,
        tag,
    }
}

pub(crate) const fn run_user(command: &'static str) -> OpDef {
    OpDef {
        kind: OperationKind::RunProcess,
        dir: "",
        file: command,
        tag: VersionTag::Unversioned,
    }
}

pub(crate) const fn fixed(tag: &'static str) -> VersionTag {
    VersionTag::Fixed(tag)
}

pub(crate) const fn kv(major: u32, minor: u32) -> KernelVersion {
    KernelVersion::new(major, minor)
}

/// `tag` from `from` on.
pub(crate) const fn since(from: KernelVersion, tag: &'static VersionTag) -> VersionTag {
    VersionTag::Window {
        from,
        until: KernelVersion::new(kernel::MAX, 99),
        tag,
    }
}

pub(crate) const SLE: &str = "/System/Library/Extensions";
pub(crate) const SLF: &str = "/System/Library/Frameworks";
pub(crate) const SLPF: &str = "/System/Library/PrivateFrameworks";
pub(crate) const AGC_PLUGINS: &str = "/System/Library/Extensions/AppleGraphicsControl.kext/Contents/PlugIns";
pub(crate) const SKYLIGHT_PLUGINS: &str = "/Library/Application Support/SkyLightPlugins";

static ALL_CATEGORIES: [&CategoryDef; 41] = [
    &NON_METAL_COMMON,
    &NON_METAL_IOACCEL_COMMON,
    &NON_METAL_COREDISPLAY_COMMON,
    &NON_METAL_ENFORCEMENT,
    &METAL_COMMON,
    &REVERT_METAL_DOWNGRADE,
    &WEBKIT_MONTEREY_COMMON,
    &METAL_3802_COMMON,
    &CATALINA_GVA,
    &MONTEREY_GVA,
    &HIGH_SIERRA_GVA,
    &BIG_SUR_OPENCL,
    &MONTEREY_OPENCL,
    &AMD_OPENCL,
    &NVIDIA_TESLA,
    &NVIDIA_KEPLER,
    &NVIDIA_WEB_DRIVERS,
    &AMD_TERASCALE_COMMON,
    &AMD_TERASCALE_1,
    &AMD_TERASCALE_2,
    &AMD_LEGACY_GCN,
    &AMD_LEGACY_POLARIS,
    &AMD_LEGACY_VEGA,
    &INTEL_IRONLAKE,
    &INTEL_SANDY_BRIDGE,
    &INTEL_IVY_BRIDGE,
    &INTEL_HASWELL,
    &INTEL_BROADWELL,
    &INTEL_SKYLAKE,
    &LEGACY_REALTEK,
    &LEGACY_NON_GOP,
    &LEGACY_WIRELESS,
    &LEGACY_WIRELESS_EXTENDED,
    &MODERN_WIRELESS,
    &LEGACY_BACKLIGHT_CONTROL,
    &LEGACY_GMUX,
    &LEGACY_KEYBOARD_BACKLIGHT,
    &LEGACY_USB11,
    &LEGACY_USB11_EXTENDED,
    &PCIE_FACETIME_CAMERA,
    &T1_SECURITY_CHIP,
];

/// Every table entry, for lookups by name.
pub fn all_categories() -> &'static [&'static CategoryDef] {
    &ALL_CATEGORIES
}

pub fn category(name: &str) -> Option<&'static CategoryDef> {
    all_categories().iter().copied().find(|category| category.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn per_major_and_switch_tags() {
        let tag = VersionTag::PerMajor("10.14.4");
        assert_eq!(tag.resolve(kv(22, 1)).as_deref(), Some("10.14.4-22"));

        static BEFORE: VersionTag = VersionTag::Fixed("12.6.2");
        static AFTER: VersionTag = VersionTag::Fixed("12.6.2-23.4");
        let switch = VersionTag::Switch {
            at: kv(23, 4),
            before: &BEFORE,
            after: &AFTER,
        };
        assert_eq!(switch.resolve(kv(23, 3)).as_deref(), Some("12.6.2"));
        assert_eq!(switch.resolve(kv(23, 4)).as_deref(), Some("12.6.2-23.4"));
    }

    #[test]
    fn window_tags_drop_outside_range() {
        static TAG: VersionTag = VersionTag::Fixed("12.0 Beta 6");
        let tag = since(kv(21, 1), &TAG);
        assert_eq!(tag.resolve(kv(21, 0)), None);
        assert_eq!(tag.resolve(kv(21, 1)).as_deref(), Some("12.0 Beta 6"));
        assert_eq!(VersionTag::Empty.resolve(kv(22, 0)), None);
        assert_eq!(VersionTag::Fixed("").resolve(kv(22, 0)), None);
    }

    #[test]
    fn category_names_are_unique() {
        let mut seen = HashSet::new();
        for category in all_categories() {
            assert!(seen.insert(category.name), "duplicate {}", category.name);
            assert!(category.range.min() <= category.range.max());
        }
    }

    #[test]
    fn inclusive_bounds_on_minor() {
        let kepler = category("Nvidia Kepler").unwrap();
        assert!(kepler.applies_to(kv(21, 1)));
        assert!(!kepler.applies_to(kv(21, 0)));
        assert!(!kepler.applies_to(kv(20, 99)));
    }
}
