use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Class code reported by devices that are powered down or hidden by the firmware.
pub const CLASS_CODE_DISABLED: u32 = 0xFFFF_FFFF;

/// Coarse hardware generation used by every downstream decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Architecture {
    NvidiaTesla,
    NvidiaFermi,
    NvidiaKepler,
    NvidiaMaxwell,
    NvidiaPascal,
    AmdTeraScale1,
    AmdTeraScale2,
    AmdLegacyGcn,
    AmdPolaris,
    AmdVega,
    IntelIronLake,
    IntelSandyBridge,
    IntelIvyBridge,
    IntelHaswell,
    IntelBroadwell,
    IntelSkylake,
    BroadcomBcm4331,
    BroadcomBcm43224,
    BroadcomBcm4360,
    /// AirPortBrcmNIC cards, native or through AirportBrcmFixup.
    BroadcomBrcmNic,
    AtherosAr9xxx,
    UsbUhci,
    UsbOhci,
    UsbEhci,
    UsbXhci,
    Unknown,
}

impl Architecture {
    pub fn is_nvidia(self) -> bool {
        matches!(
            self,
            Self::NvidiaTesla | Self::NvidiaFermi | Self::NvidiaKepler | Self::NvidiaMaxwell | Self::NvidiaPascal
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceKind {
    Gpu,
    Wireless,
    Usb,
    Storage,
    Ethernet,
    Other,
}

impl DeviceKind {
    pub fn from_class_code(class_code: u32) -> Self {
        match class_code >> 8 {
            0x0300..=0x03FF => Self::Gpu,
            0x0280 => Self::Wireless,
            0x0C03 => Self::Usb,
            0x0100..=0x01FF => Self::Storage,
            0x0200 => Self::Ethernet,
            _ => Self::Other,
        }
    }
}

/// Raw tuple handed over by a platform enumeration source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPciDevice {
    pub vendor_id: u32,
    pub device_id: u32,
    pub class_code: u32,
    pub path: Option<String>,
    pub model: Option<String>,
}

/// Platform device enumeration (ioreg on macOS, fixtures in tests).
pub trait DeviceSource {
    fn pci_devices(&self) -> Result<Vec<RawPciDevice>>;
}

/// One classified physical component. Built by the probe, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    vendor_id: u32,
    device_id: u32,
    class_code: u32,
    arch: Architecture,
    model: Option<String>,
    acpi_path: Option<String>,
}

impl DeviceDescriptor {
    pub fn new(raw: &RawPciDevice, arch: Architecture) -> Self {
        Self {
            vendor_id: raw.vendor_id,
            device_id: raw.device_id,
            class_code: raw.class_code,
            arch,
            model: raw.model.clone(),
            acpi_path: raw.path.clone(),
        }
    }

    pub fn vendor_id(&self) -> u32 {
        self.vendor_id
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    pub fn class_code(&self) -> u32 {
        self.class_code
    }

    pub fn arch(&self) -> Architecture {
        self.arch
    }

    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    pub fn acpi_path(&self) -> Option<&str> {
        self.acpi_path.as_deref()
    }

    pub fn kind(&self) -> DeviceKind {
        DeviceKind::from_class_code(self.class_code)
    }

    pub fn is_disabled(&self) -> bool {
        self.class_code == CLASS_CODE_DISABLED
    }
}

/// Intel CPU generations in release order; `AppleSilicon` and `Unknown` sort last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum CpuGeneration {
    Yonah,
    Conroe,
    Penryn,
    Nehalem,
    SandyBridge,
    IvyBridge,
    Haswell,
    Broadwell,
    Skylake,
    KabyLake,
    CoffeeLake,
    CometLake,
    IceLake,
    AppleSilicon,
    Unknown,
}

impl CpuGeneration {
    /// Best-effort mapping from the `machdep.cpu.brand_string`.
    pub fn from_brand(brand: &str) -> Self {
        let brand = brand.to_ascii_lowercase();
        if brand.contains("apple") {
            return Self::AppleSilicon;
        }
        if brand.contains("core(tm) duo") || brand.contains("core duo") {
            return Self::Yonah;
        }
        if brand.contains("core(tm)2") || brand.contains("core 2") {
            return if brand.contains("p8") || brand.contains("p7") || brand.contains("t9") || brand.contains("e8") {
                Self::Penryn
            } else {
                Self::Conroe
            };
        }
        let numbered = brand.split_whitespace().find_map(|token| {
            ["i3-", "i5-", "i7-", "i9-"]
                .iter()
                .find_map(|prefix| token.strip_prefix(prefix))
                .map(|rest| rest.chars().take_while(|c| c.is_ascii_digit()).collect::<String>())
        });
        if let Some(digits) = numbered {
            return match (digits.len(), digits.chars().next()) {
                (5, Some('1')) => Self::CometLake,
                (4, Some('1')) => Self::IceLake,
                (4, Some('2')) => Self::SandyBridge,
                (4, Some('3')) => Self::IvyBridge,
                (4, Some('4')) => Self::Haswell,
                (4, Some('5')) => Self::Broadwell,
                (4, Some('6')) => Self::Skylake,
                (4, Some('7')) => Self::KabyLake,
                (4, Some('8')) | (4, Some('9')) => Self::CoffeeLake,
                _ => Self::Unknown,
            };
        }
        // First generation Core i and the Nehalem/Westmere Xeons carry no dashed model number.
        if brand.contains("core(tm) i") || ["w35", "x55", "e55", "w36", "x56", "e56"].iter().any(|m| brand.contains(m)) {
            return Self::Nehalem;
        }
        Self::Unknown
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuDescriptor {
    pub name: String,
    pub features: BTreeSet<String>,
    pub generation: CpuGeneration,
}

impl CpuDescriptor {
    pub fn has_feature(&self, flag: &str) -> bool {
        self.features.contains(flag)
    }

    pub fn has_avx2(&self) -> bool {
        self.has_feature("AVX2")
    }
}

impl Default for CpuDescriptor {
    fn default() -> Self {
        Self {
            name: "Unknown".to_string(),
            features: BTreeSet::new(),
            generation: CpuGeneration::Unknown,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostFlags {
    pub is_hackintosh: bool,
    pub is_rosetta: bool,
    pub is_arm64: bool,
    pub has_ambient_light_sensor: bool,
    pub third_party_ssd: bool,
    /// FaceTime camera attached over PCIe (`CMRA`) rather than USB.
    pub pcie_webcam: bool,
    /// Apple T1 coprocessor present on the internal USB bus.
    pub t1_chip: bool,
}

/// Identity facts read by the host layer before devices are classified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineIdentity {
    pub model: String,
    pub board_id: String,
    /// Board id the firmware reports to the OS (differs from `board_id` when spoofed).
    pub reported_board_id: String,
    pub cpu: CpuDescriptor,
}

/// Full probed machine. Read-only once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareProfile {
    pub schema_version: String,
    pub model: String,
    pub board_id: String,
    pub reported_board_id: String,
    pub cpu: CpuDescriptor,
    pub gpus: Vec<DeviceDescriptor>,
    pub igpu: Option<usize>,
    pub dgpu: Option<usize>,
    pub wireless: Option<DeviceDescriptor>,
    pub usb_controllers: Vec<DeviceDescriptor>,
    pub storage: Vec<DeviceDescriptor>,
    pub ethernet: Vec<DeviceDescriptor>,
    pub flags: HostFlags,
}

impl HardwareProfile {
    pub fn igpu(&self) -> Option<&DeviceDescriptor> {
        self.igpu.and_then(|idx| self.gpus.get(idx))
    }

    pub fn dgpu(&self) -> Option<&DeviceDescriptor> {
        self.dgpu.and_then(|idx| self.gpus.get(idx))
    }

    pub fn has_gpu_arch(&self, arch: Architecture) -> bool {
        self.gpus.iter().any(|gpu| gpu.arch() == arch && !gpu.is_disabled())
    }

    pub fn has_usb_arch(&self, arch: Architecture) -> bool {
        self.usb_controllers.iter().any(|usb| usb.arch() == arch)
    }

    pub fn is_laptop(&self) -> bool {
        self.model.starts_with("MacBook")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_follows_class_code() {
        assert_eq!(DeviceKind::from_class_code(0x030000), DeviceKind::Gpu);
        assert_eq!(DeviceKind::from_class_code(0x028000), DeviceKind::Wireless);
        assert_eq!(DeviceKind::from_class_code(0x0C0330), DeviceKind::Usb);
        assert_eq!(DeviceKind::from_class_code(0x010802), DeviceKind::Storage);
        assert_eq!(DeviceKind::from_class_code(CLASS_CODE_DISABLED), DeviceKind::Other);
    }

    #[test]
    fn cpu_generation_orders_by_release() {
        assert!(CpuGeneration::Penryn < CpuGeneration::Nehalem);
        assert_eq!(
            CpuGeneration::from_brand("Intel(R) Core(TM) i7-2635QM CPU @ 2.00GHz"),
            CpuGeneration::SandyBridge
        );
        assert_eq!(
            CpuGeneration::from_brand("Intel(R) Core(TM)2 Duo CPU     P8600  @ 2.40GHz"),
            CpuGeneration::Penryn
        );
        assert_eq!(
            CpuGeneration::from_brand("Intel(R) Core(TM) i5 CPU       750  @ 2.67GHz"),
            CpuGeneration::Nehalem
        );
    }
}
