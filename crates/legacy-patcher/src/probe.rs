//! Classifies enumerated PCI devices into architecture tags.

use crate::pci_ids::*;
use phoenix_core::{
    Architecture, DeviceDescriptor, DeviceKind, DeviceSource, HardwareProfile, HostFlags,
    MachineIdentity, RawPciDevice, PROFILE_SCHEMA_VERSION,
};
use tracing::{debug, warn};

const GPU_TABLE: &[(u32, &[u32], Architecture)] = &[
    (VENDOR_NVIDIA, NVIDIA_TESLA, Architecture::NvidiaTesla),
    (VENDOR_NVIDIA, NVIDIA_FERMI, Architecture::NvidiaFermi),
    (VENDOR_NVIDIA, NVIDIA_KEPLER, Architecture::NvidiaKepler),
    (VENDOR_NVIDIA, NVIDIA_MAXWELL, Architecture::NvidiaMaxwell),
    (VENDOR_NVIDIA, NVIDIA_PASCAL, Architecture::NvidiaPascal),
    (VENDOR_AMD, AMD_LEGACY_GCN, Architecture::AmdLegacyGcn),
    (VENDOR_AMD, AMD_TERASCALE_1, Architecture::AmdTeraScale1),
    (VENDOR_AMD, AMD_TERASCALE_2, Architecture::AmdTeraScale2),
    (VENDOR_AMD, AMD_POLARIS, Architecture::AmdPolaris),
    (VENDOR_AMD, AMD_VEGA, Architecture::AmdVega),
    (VENDOR_INTEL, INTEL_IRON_LAKE, Architecture::IntelIronLake),
    (VENDOR_INTEL, INTEL_SANDY_BRIDGE, Architecture::IntelSandyBridge),
    (VENDOR_INTEL, INTEL_IVY_BRIDGE, Architecture::IntelIvyBridge),
    (VENDOR_INTEL, INTEL_HASWELL, Architecture::IntelHaswell),
    (VENDOR_INTEL, INTEL_BROADWELL, Architecture::IntelBroadwell),
    (VENDOR_INTEL, INTEL_SKYLAKE, Architecture::IntelSkylake),
];

const WIRELESS_TABLE: &[(u32, &[u32], Architecture)] = &[
    (VENDOR_BROADCOM, BROADCOM_BRCM_NIC, Architecture::BroadcomBrcmNic),
    (VENDOR_BROADCOM, BROADCOM_BCM4360, Architecture::BroadcomBcm4360),
    (VENDOR_BROADCOM, BROADCOM_BCM4331, Architecture::BroadcomBcm4331),
    (VENDOR_BROADCOM, BROADCOM_BCM43224, Architecture::BroadcomBcm43224),
    (VENDOR_ATHEROS, ATHEROS_AR9XXX, Architecture::AtherosAr9xxx),
];

fn lookup(table: &[(u32, &[u32], Architecture)], raw: &RawPciDevice) -> Architecture {
    table
        .iter()
        .find(|(vendor, ids, _)| *vendor == raw.vendor_id && ids.contains(&raw.device_id))
        .map(|(_, _, arch)| *arch)
        .unwrap_or(Architecture::Unknown)
}

fn usb_arch(class_code: u32) -> Architecture {
    match class_code & 0xFF {
        0x00 => Architecture::UsbUhci,
        0x10 => Architecture::UsbOhci,
        0x20 => Architecture::UsbEhci,
        0x30 => Architecture::UsbXhci,
        _ => Architecture::Unknown,
    }
}

/// Architecture tag for one raw device. Unknown combinations map to `Architecture::Unknown`.
pub fn classify(raw: &RawPciDevice) -> Architecture {
    match DeviceKind::from_class_code(raw.class_code) {
        DeviceKind::Gpu => lookup(GPU_TABLE, raw),
        DeviceKind::Wireless => lookup(WIRELESS_TABLE, raw),
        DeviceKind::Usb => usb_arch(raw.class_code),
        // Powered-down GPUs lose their class code but keep vendor and device ids.
        DeviceKind::Other if raw.class_code == phoenix_core::hardware::CLASS_CODE_DISABLED => {
            lookup(GPU_TABLE, raw)
        }
        _ => Architecture::Unknown,
    }
}

/// Builds the hardware profile. Enumeration failures degrade to empty device lists.
pub fn probe(source: &dyn DeviceSource, identity: MachineIdentity, flags: HostFlags) -> HardwareProfile {
    let devices = match source.pci_devices() {
        Ok(devices) => devices,
        Err(err) => {
            warn!("device enumeration unavailable: {err:#}");
            Vec::new()
        }
    };

    let mut gpus = Vec::new();
    let mut wireless = None;
    let mut usb_controllers = Vec::new();
    let mut storage = Vec::new();
    let mut ethernet = Vec::new();

    for raw in &devices {
        let arch = classify(raw);
        let descriptor = DeviceDescriptor::new(raw, arch);
        debug!(
            vendor = format_args!("{:#06x}", raw.vendor_id),
            device = format_args!("{:#06x}", raw.device_id),
            ?arch,
            "classified device"
        );
        match descriptor.kind() {
            DeviceKind::Gpu => gpus.push(descriptor),
            DeviceKind::Other if descriptor.is_disabled() && arch != Architecture::Unknown => gpus.push(descriptor),
            DeviceKind::Wireless => {
                if wireless.is_none() {
                    wireless = Some(descriptor);
                }
            }
            DeviceKind::Usb => usb_controllers.push(descriptor),
            DeviceKind::Storage => storage.push(descriptor),
            DeviceKind::Ethernet => ethernet.push(descriptor),
            DeviceKind::Other => {}
        }
    }

    let igpu = gpus.iter().position(|gpu| gpu.vendor_id() == VENDOR_INTEL);
    let dgpu = gpus.iter().position(|gpu| gpu.vendor_id() != VENDOR_INTEL);

    HardwareProfile {
        schema_version: PROFILE_SCHEMA_VERSION.to_string(),
        model: identity.model,
        board_id: identity.board_id,
        reported_board_id: identity.reported_board_id,
        cpu: identity.cpu,
        gpus,
        igpu,
        dgpu,
        wireless,
        usb_controllers,
        storage,
        ethernet,
        flags,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;

    struct FixedSource(Vec<RawPciDevice>);

    impl DeviceSource for FixedSource {
        fn pci_devices(&self) -> anyhow::Result<Vec<RawPciDevice>> {
            Ok(self.0.clone())
        }
    }

    struct BrokenSource;

    impl DeviceSource for BrokenSource {
        fn pci_devices(&self) -> anyhow::Result<Vec<RawPciDevice>> {
            Err(anyhow!("ioreg missing"))
        }
    }

    fn raw(vendor_id: u32, device_id: u32, class_code: u32) -> RawPciDevice {
        RawPciDevice {
            vendor_id,
            device_id,
            class_code,
            path: None,
            model: None,
        }
    }

    #[test]
    fn classifies_gpu_wireless_and_usb() {
        assert_eq!(classify(&raw(VENDOR_NVIDIA, 0x0FE9, 0x030000)), Architecture::NvidiaKepler);
        assert_eq!(classify(&raw(VENDOR_AMD, 0x9488, 0x030000)), Architecture::AmdTeraScale1);
        assert_eq!(classify(&raw(VENDOR_AMD, 0x6720, 0x030000)), Architecture::AmdTeraScale2);
        assert_eq!(classify(&raw(VENDOR_INTEL, 0x0126, 0x030000)), Architecture::IntelSandyBridge);
        assert_eq!(classify(&raw(VENDOR_BROADCOM, 0x432B, 0x028000)), Architecture::BroadcomBcm4331);
        assert_eq!(classify(&raw(VENDOR_BROADCOM, 0x43A0, 0x028000)), Architecture::BroadcomBrcmNic);
        assert_eq!(classify(&raw(VENDOR_BROADCOM, 0x43B1, 0x028000)), Architecture::BroadcomBrcmNic);
        assert_eq!(classify(&raw(VENDOR_INTEL, 0x1E31, 0x0C0330)), Architecture::UsbXhci);
        assert_eq!(classify(&raw(VENDOR_INTEL, 0x3A37, 0x0C0300)), Architecture::UsbUhci);
    }

    #[test]
    fn unknown_ids_stay_neutral() {
        assert_eq!(classify(&raw(VENDOR_NVIDIA, 0x2684, 0x030000)), Architecture::Unknown);
        assert_eq!(classify(&raw(0x1234, 0x1111, 0x030000)), Architecture::Unknown);
        assert_eq!(classify(&raw(VENDOR_NVIDIA, 0x0FE9, 0x020000)), Architecture::Unknown);
    }

    #[test]
    fn probe_designates_integrated_and_discrete() {
        let source = FixedSource(vec![
            raw(VENDOR_INTEL, 0x0126, 0x030000),
            raw(VENDOR_AMD, 0x6741, 0x030000),
            raw(VENDOR_BROADCOM, 0x4353, 0x028000),
            raw(VENDOR_INTEL, 0x1C26, 0x0C0320),
        ]);
        let identity = MachineIdentity {
            model: "MacBookPro8,2".to_string(),
            ..Default::default()
        };
        let profile = probe(&source, identity, HostFlags::default());
        assert_eq!(profile.gpus.len(), 2);
        assert_eq!(profile.igpu().unwrap().arch(), Architecture::IntelSandyBridge);
        assert_eq!(profile.dgpu().unwrap().arch(), Architecture::AmdTeraScale2);
        assert_eq!(profile.wireless.as_ref().unwrap().arch(), Architecture::BroadcomBcm4360);
        assert!(profile.has_usb_arch(Architecture::UsbEhci));
    }

    #[test]
    fn enumeration_failure_yields_empty_profile() {
        let profile = probe(&BrokenSource, MachineIdentity::default(), HostFlags::default());
        assert!(profile.gpus.is_empty());
        assert!(profile.wireless.is_none());
        assert!(profile.igpu.is_none());
    }

    #[test]
    fn disabled_gpu_is_kept_but_ignored() {
        let source = FixedSource(vec![
            raw(VENDOR_INTEL, 0x0126, 0x030000),
            raw(VENDOR_AMD, 0x6741, phoenix_core::hardware::CLASS_CODE_DISABLED),
        ]);
        let profile = probe(&source, MachineIdentity::default(), HostFlags::default());
        assert_eq!(profile.gpus.len(), 2);
        assert!(profile.dgpu().unwrap().is_disabled());
        assert!(!profile.has_gpu_arch(Architecture::AmdTeraScale2));
    }
}
