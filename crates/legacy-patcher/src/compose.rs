//! Expands selected families into ordered, version-resolved categories.

use crate::detect::PatchFamily;
use crate::patchsets::{self, CategoryDef, OperationKind};
use phoenix_core::kernel::VENTURA;
use phoenix_core::KernelVersion;
use plist::{Dictionary, Value};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

/// One step of a family's fragment list.
#[derive(Debug, Clone, Copy)]
pub enum FragmentRef {
    Apply(&'static CategoryDef),
    /// Drops an already composed category, for fragments a later family undoes.
    Suppress(&'static str),
}

use FragmentRef::{Apply, Suppress};

fn metal_3802(os: KernelVersion, fragments: &mut Vec<FragmentRef>) {
    fragments.push(Apply(&patchsets::METAL_3802_COMMON));
    if os.major == VENTURA {
        fragments.push(Apply(&patchsets::METAL_COMMON));
        fragments.push(Apply(&patchsets::REVERT_METAL_DOWNGRADE));
    }
}

/// Shared fragments first, the family's own category last.
pub fn family_fragments(family: PatchFamily, os: KernelVersion) -> Vec<FragmentRef> {
    use patchsets::*;

    let mut fragments = Vec::new();
    match family {
        PatchFamily::NvidiaTesla => fragments.extend([
            Apply(&NON_METAL_COMMON),
            Apply(&WEBKIT_MONTEREY_COMMON),
            Apply(&NVIDIA_TESLA),
        ]),
        PatchFamily::NvidiaKepler => {
            metal_3802(os, &mut fragments);
            fragments.extend([
                Apply(&MONTEREY_OPENCL),
                Apply(&BIG_SUR_OPENCL),
                Apply(&WEBKIT_MONTEREY_COMMON),
                Apply(&NVIDIA_KEPLER),
            ]);
        }
        PatchFamily::NvidiaWebDrivers => fragments.extend([
            Apply(&NON_METAL_COMMON),
            Apply(&NON_METAL_IOACCEL_COMMON),
            Apply(&NON_METAL_COREDISPLAY_COMMON),
            Apply(&WEBKIT_MONTEREY_COMMON),
            Apply(&NVIDIA_WEB_DRIVERS),
            Apply(&NON_METAL_ENFORCEMENT),
        ]),
        PatchFamily::AmdTeraScale1 => fragments.extend([
            Apply(&NON_METAL_COMMON),
            Apply(&WEBKIT_MONTEREY_COMMON),
            Apply(&AMD_TERASCALE_COMMON),
            Apply(&AMD_TERASCALE_1),
        ]),
        PatchFamily::AmdTeraScale2 => fragments.extend([
            Apply(&NON_METAL_COMMON),
            Apply(&NON_METAL_IOACCEL_COMMON),
            Apply(&WEBKIT_MONTEREY_COMMON),
            Apply(&AMD_TERASCALE_COMMON),
            Apply(&AMD_TERASCALE_2),
        ]),
        // The AMD stack decodes fine with the stock GVA, so undo the Intel downgrade.
        PatchFamily::AmdLegacyGcn => fragments.extend([
            Suppress(MONTEREY_GVA.name),
            Apply(&MONTEREY_OPENCL),
            Apply(&AMD_OPENCL),
            Apply(&AMD_LEGACY_GCN),
        ]),
        PatchFamily::AmdLegacyPolaris => fragments.extend([
            Apply(&MONTEREY_OPENCL),
            Apply(&AMD_LEGACY_POLARIS),
            Apply(&AMD_OPENCL),
            Suppress(MONTEREY_GVA.name),
        ]),
        PatchFamily::AmdLegacyVega => fragments.extend([
            Apply(&MONTEREY_OPENCL),
            Apply(&AMD_LEGACY_VEGA),
            Apply(&AMD_OPENCL),
            Suppress(MONTEREY_GVA.name),
        ]),
        PatchFamily::IntelIronLake => fragments.extend([
            Apply(&NON_METAL_COMMON),
            Apply(&WEBKIT_MONTEREY_COMMON),
            Apply(&INTEL_IRONLAKE),
        ]),
        PatchFamily::IntelSandyBridge => fragments.extend([
            Apply(&NON_METAL_COMMON),
            Apply(&HIGH_SIERRA_GVA),
            Apply(&WEBKIT_MONTEREY_COMMON),
            Apply(&INTEL_SANDY_BRIDGE),
        ]),
        PatchFamily::IntelIvyBridge => {
            metal_3802(os, &mut fragments);
            fragments.extend([
                Apply(&CATALINA_GVA),
                Apply(&MONTEREY_OPENCL),
                Apply(&BIG_SUR_OPENCL),
                Apply(&WEBKIT_MONTEREY_COMMON),
                Apply(&INTEL_IVY_BRIDGE),
            ]);
        }
        PatchFamily::IntelHaswell => {
            metal_3802(os, &mut fragments);
            fragments.extend([Apply(&MONTEREY_GVA), Apply(&MONTEREY_OPENCL), Apply(&INTEL_HASWELL)]);
        }
        PatchFamily::IntelBroadwell => {
            fragments.extend([Apply(&MONTEREY_GVA), Apply(&MONTEREY_OPENCL), Apply(&INTEL_BROADWELL)])
        }
        PatchFamily::IntelSkylake => fragments.extend([Apply(&MONTEREY_OPENCL), Apply(&INTEL_SKYLAKE)]),
        PatchFamily::LegacyWireless => {
            fragments.extend([Apply(&LEGACY_WIRELESS), Apply(&LEGACY_WIRELESS_EXTENDED)])
        }
        PatchFamily::ModernWireless => fragments.push(Apply(&MODERN_WIRELESS)),
        PatchFamily::LegacyBacklightControl => fragments.push(Apply(&LEGACY_BACKLIGHT_CONTROL)),
        PatchFamily::LegacyGmux => fragments.push(Apply(&LEGACY_GMUX)),
        PatchFamily::LegacyKeyboardBacklight => fragments.push(Apply(&LEGACY_KEYBOARD_BACKLIGHT)),
        PatchFamily::LegacyRealtek => fragments.push(Apply(&LEGACY_REALTEK)),
        PatchFamily::LegacyNonGop => fragments.push(Apply(&LEGACY_NON_GOP)),
        PatchFamily::LegacyUsb11 => {
            fragments.extend([Apply(&LEGACY_USB11), Apply(&LEGACY_USB11_EXTENDED)])
        }
        PatchFamily::PcieFaceTimeCamera => fragments.push(Apply(&PCIE_FACETIME_CAMERA)),
        PatchFamily::T1SecurityChip => fragments.push(Apply(&T1_SECURITY_CHIP)),
    }
    fragments
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Process {
    pub command: String,
    pub elevated: bool,
}

/// `dir -> file -> version tag`.
pub type InstallMap = BTreeMap<String, BTreeMap<String, String>>;
/// `dir -> files`.
pub type RemoveMap = BTreeMap<String, BTreeSet<String>>;

/// A category with every tag resolved for one kernel version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolvedCategory {
    pub name: String,
    pub install_system: InstallMap,
    pub install_data: InstallMap,
    pub remove_system: RemoveMap,
    pub remove_data: RemoveMap,
    pub processes: Vec<Process>,
    /// Kexts moved to `/Library/Extensions`; their payload still lives under the system path.
    pub aux_redirects: BTreeSet<String>,
}

impl ResolvedCategory {
    pub fn resolve(def: &CategoryDef, os: KernelVersion) -> Self {
        let mut resolved = Self {
            name: def.name.to_string(),
            ..Default::default()
        };
        for op in def.ops {
            let Some(tag) = op.tag.resolve(os) else {
                continue;
            };
            let dir = op.dir.to_string();
            let file = op.file.to_string();
            match op.kind {
                OperationKind::InstallSystem => {
                    resolved.install_system.entry(dir).or_default().insert(file, tag);
                }
                OperationKind::InstallData => {
                    resolved.install_data.entry(dir).or_default().insert(file, tag);
                }
                OperationKind::RemoveSystem => {
                    resolved.remove_system.entry(dir).or_default().insert(file);
                }
                OperationKind::RemoveData => {
                    resolved.remove_data.entry(dir).or_default().insert(file);
                }
                OperationKind::RunProcess | OperationKind::RunAsRoot => resolved.processes.push(Process {
                    command: file,
                    elevated: op.kind == OperationKind::RunAsRoot,
                }),
            }
        }
        resolved
    }

    pub fn is_empty(&self) -> bool {
        self.install_system.is_empty()
            && self.install_data.is_empty()
            && self.remove_system.is_empty()
            && self.remove_data.is_empty()
            && self.processes.is_empty()
    }

    /// Moves `.kext` installs bound for `/System/Library/Extensions` into
    /// `/Library/Extensions`, so only the auxiliary collection is rebuilt.
    pub fn redirect_kexts_to_aux(&mut self) -> Vec<String> {
        let Some(sle) = self.install_system.get_mut(patchsets::SLE) else {
            return Vec::new();
        };
        let kexts: Vec<String> = sle.keys().filter(|file| file.ends_with(".kext")).cloned().collect();
        let mut moved = Vec::new();
        for kext in kexts {
            if let Some(tag) = sle.remove(&kext) {
                self.install_data
                    .entry(AUX_EXTENSIONS.to_string())
                    .or_default()
                    .insert(kext.clone(), tag);
                self.aux_redirects.insert(kext.clone());
                moved.push(kext);
            }
        }
        if sle.is_empty() {
            self.install_system.remove(patchsets::SLE);
        }
        moved
    }

    /// Directory under the payload tag that holds `file` for an install into `dir`.
    pub fn source_dir<'a>(&self, dir: &'a str, file: &str) -> &'a str {
        if dir == AUX_EXTENSIONS && self.aux_redirects.contains(file) {
            patchsets::SLE
        } else {
            dir
        }
    }

    /// The per-category dictionary stored in the installed-patch manifest.
    pub fn to_manifest_entry(&self) -> Value {
        let mut entry = Dictionary::new();
        let installs = |map: &InstallMap| {
            let mut dirs = Dictionary::new();
            for (dir, files) in map {
                let mut inner = Dictionary::new();
                for (file, tag) in files {
                    inner.insert(file.clone(), Value::String(tag.clone()));
                }
                dirs.insert(dir.clone(), Value::Dictionary(inner));
            }
            Value::Dictionary(dirs)
        };
        let removes = |map: &RemoveMap| {
            let mut dirs = Dictionary::new();
            for (dir, files) in map {
                let files = files.iter().map(|file| Value::String(file.clone())).collect();
                dirs.insert(dir.clone(), Value::Array(files));
            }
            Value::Dictionary(dirs)
        };
        if !self.install_system.is_empty() {
            entry.insert(MANIFEST_INSTALL.to_string(), installs(&self.install_system));
        }
        if !self.install_data.is_empty() {
            entry.insert(MANIFEST_INSTALL_DATA.to_string(), installs(&self.install_data));
        }
        if !self.remove_system.is_empty() {
            entry.insert(MANIFEST_REMOVE.to_string(), removes(&self.remove_system));
        }
        if !self.remove_data.is_empty() {
            entry.insert(MANIFEST_REMOVE_DATA.to_string(), removes(&self.remove_data));
        }
        if !self.processes.is_empty() {
            let mut processes = Dictionary::new();
            for process in &self.processes {
                processes.insert(process.command.clone(), Value::Boolean(process.elevated));
            }
            entry.insert(MANIFEST_PROCESSES.to_string(), Value::Dictionary(processes));
        }
        Value::Dictionary(entry)
    }
}

pub const AUX_EXTENSIONS: &str = "/Library/Extensions";
pub const MANIFEST_INSTALL: &str = "Install";
pub const MANIFEST_INSTALL_DATA: &str = "Install Non-Root";
pub const MANIFEST_REMOVE: &str = "Remove";
pub const MANIFEST_REMOVE_DATA: &str = "Remove Non-Root";
pub const MANIFEST_PROCESSES: &str = "Processes";

/// Ordered categories for every selected family. Deterministic for a given input.
pub fn compose(selection: &BTreeMap<PatchFamily, bool>, os: KernelVersion) -> Vec<ResolvedCategory> {
    let mut composed: Vec<ResolvedCategory> = Vec::new();
    for family in selection.iter().filter(|(_, selected)| **selected).map(|(family, _)| *family) {
        for fragment in family_fragments(family, os) {
            match fragment {
                Apply(def) => {
                    if composed.iter().any(|category| category.name == def.name) {
                        continue;
                    }
                    if !def.applies_to(os) {
                        debug!("{} does not apply to {}", def.name, os);
                        continue;
                    }
                    let resolved = ResolvedCategory::resolve(def, os);
                    if resolved.is_empty() {
                        continue;
                    }
                    composed.push(resolved);
                }
                Suppress(name) => {
                    if composed.iter().any(|category| category.name == name) {
                        debug!("{} suppressed by {}", name, family.display_name());
                    }
                    composed.retain(|category| category.name != name);
                }
            }
        }
    }
    composed
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EffectiveInstall {
    pub version: String,
    pub category: String,
    pub data_volume: bool,
}

/// Destination path to the install that ends up on disk. Later categories win.
pub fn flatten_installs(categories: &[ResolvedCategory]) -> BTreeMap<String, EffectiveInstall> {
    let mut effective: BTreeMap<String, EffectiveInstall> = BTreeMap::new();
    for category in categories {
        let scopes = [(&category.install_system, false), (&category.install_data, true)];
        for (map, data_volume) in scopes {
            for (dir, files) in map {
                for (file, version) in files {
                    let dest = format!("{}/{}", dir.trim_end_matches('/'), file);
                    let next = EffectiveInstall {
                        version: version.clone(),
                        category: category.name.clone(),
                        data_volume,
                    };
                    if let Some(previous) = effective.insert(dest.clone(), next) {
                        debug!(
                            "{} from {} ({}) replaced by {} ({})",
                            dest, previous.category, previous.version, category.name, version
                        );
                    }
                }
            }
        }
    }
    effective
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select(families: &[PatchFamily]) -> BTreeMap<PatchFamily, bool> {
        PatchFamily::ALL
            .iter()
            .map(|family| (*family, families.contains(family)))
            .collect()
    }

    fn names(categories: &[ResolvedCategory]) -> Vec<&str> {
        categories.iter().map(|category| category.name.as_str()).collect()
    }

    #[test]
    fn composition_is_deterministic() {
        let selection = select(&[
            PatchFamily::IntelHaswell,
            PatchFamily::AmdLegacyPolaris,
            PatchFamily::LegacyWireless,
        ]);
        let os = KernelVersion::new(23, 4);
        assert_eq!(compose(&selection, os), compose(&selection, os));
    }

    #[test]
    fn terascale_one_on_catalina_has_no_terascale_two_entries() {
        let categories = compose(&select(&[PatchFamily::AmdTeraScale1]), KernelVersion::new(19, 0));
        assert_eq!(names(&categories), vec!["Non-Metal Common", "AMD TeraScale Common", "AMD TeraScale 1"]);

        let ts2_only = [
            "AMD5000Controller.kext",
            "AMD6000Controller.kext",
            "AMDRadeonVADriver.bundle",
            "AMDRadeonVADriver2.bundle",
            "AMDRadeonX3000.kext",
            "AMDRadeonX3000GLDriver.bundle",
        ];
        for category in &categories {
            for files in category.remove_system.values() {
                assert!(ts2_only.iter().all(|kext| !files.contains(*kext)));
            }
            for files in category.install_system.values() {
                assert!(ts2_only.iter().all(|kext| !files.contains_key(*kext)));
            }
        }
        let ts1 = &categories[2];
        assert_eq!(
            ts1.install_system[patchsets::SLE].get("AMD2400Controller.kext").map(String::as_str),
            Some("10.13.6")
        );
    }

    #[test]
    fn amd_families_revert_the_intel_gva_downgrade() {
        let os = KernelVersion::new(22, 4);
        let haswell = compose(&select(&[PatchFamily::IntelHaswell]), os);
        assert!(names(&haswell).contains(&"Monterey GVA"));

        let both = compose(&select(&[PatchFamily::IntelHaswell, PatchFamily::AmdLegacyGcn]), os);
        assert!(!names(&both).contains(&"Monterey GVA"));
        assert!(names(&both).contains(&"AMD Legacy GCN"));
    }

    #[test]
    fn metal_downgrade_revert_follows_metal_common_on_ventura_only() {
        let ventura = compose(&select(&[PatchFamily::NvidiaKepler]), KernelVersion::new(22, 1));
        let order = names(&ventura);
        let common = order.iter().position(|name| *name == "Metal Common").unwrap();
        let revert = order.iter().position(|name| *name == "Revert Metal Downgrade").unwrap();
        assert!(common < revert);
        assert_eq!(order.last(), Some(&"Nvidia Kepler"));

        let sonoma = compose(&select(&[PatchFamily::NvidiaKepler]), KernelVersion::new(23, 0));
        assert!(!names(&sonoma).contains(&"Metal Common"));
        assert!(!names(&sonoma).contains(&"Revert Metal Downgrade"));
        assert!(!names(&sonoma).contains(&"WebKit Monterey Common"));
    }

    #[test]
    fn later_category_wins_on_shared_destination() {
        let categories = compose(
            &select(&[PatchFamily::IntelHaswell, PatchFamily::AmdLegacyPolaris]),
            KernelVersion::new(22, 0),
        );
        let effective = flatten_installs(&categories);
        let opencl = &effective["/System/Library/Frameworks/OpenCL.framework"];
        assert_eq!(opencl.version, "12.5 non-AVX2.0");
        assert_eq!(opencl.category, "AMD OpenCL");
        // Monterey OpenCL is composed once, by the first family that asks for it.
        assert_eq!(names(&categories).iter().filter(|name| **name == "Monterey OpenCL").count(), 1);
    }

    #[test]
    fn aux_redirect_moves_only_kexts() {
        let mut category = ResolvedCategory::resolve(&patchsets::LEGACY_WIRELESS, KernelVersion::new(22, 0));
        assert!(category.redirect_kexts_to_aux().is_empty());

        let mut usb = ResolvedCategory::resolve(&patchsets::LEGACY_USB11, KernelVersion::new(23, 4));
        assert_eq!(usb.redirect_kexts_to_aux(), vec!["IOUSBHostFamily.kext".to_string()]);
        assert!(usb.install_system.is_empty());
        assert_eq!(usb.install_data[AUX_EXTENSIONS]["IOUSBHostFamily.kext"], "12.6.2-23.4");
        assert_eq!(usb.source_dir(AUX_EXTENSIONS, "IOUSBHostFamily.kext"), patchsets::SLE);
        assert_eq!(usb.source_dir(AUX_EXTENSIONS, "Other.kext"), AUX_EXTENSIONS);

        let entry = usb.to_manifest_entry();
        let dict = entry.as_dictionary().unwrap();
        assert!(dict.get(MANIFEST_INSTALL_DATA).is_some());
        assert!(dict.get(MANIFEST_INSTALL).is_none());
    }
}
