//! System Integrity Protection (`csr-active-config`) decoding.

use serde::{Deserialize, Serialize};

pub const CSR_ALLOW_UNTRUSTED_KEXTS: u32 = 0x1;
pub const CSR_ALLOW_UNRESTRICTED_FS: u32 = 0x2;
pub const CSR_ALLOW_TASK_FOR_PID: u32 = 0x4;
pub const CSR_ALLOW_KERNEL_DEBUGGER: u32 = 0x8;
pub const CSR_ALLOW_APPLE_INTERNAL: u32 = 0x10;
pub const CSR_ALLOW_UNRESTRICTED_DTRACE: u32 = 0x20;
pub const CSR_ALLOW_UNRESTRICTED_NVRAM: u32 = 0x40;
pub const CSR_ALLOW_DEVICE_CONFIGURATION: u32 = 0x80;
pub const CSR_ALLOW_ANY_RECOVERY_OS: u32 = 0x100;
pub const CSR_ALLOW_UNAPPROVED_KEXTS: u32 = 0x200;
pub const CSR_ALLOW_EXECUTABLE_POLICY_OVERRIDE: u32 = 0x400;
pub const CSR_ALLOW_UNAUTHENTICATED_ROOT: u32 = 0x800;

const CATALINA: u32 = 19;
const MONTEREY: u32 = 21;

/// Bits that must be set for a root patch to be attempted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SipRequirement {
    pub bits: u32,
}

impl SipRequirement {
    /// Required set for the running kernel major. `third_party_kexts` covers
    /// drivers installed outside the sealed volume (Nvidia web drivers).
    pub fn for_os(major: u32, third_party_kexts: bool) -> Self {
        let bits = if major <= CATALINA {
            CSR_ALLOW_UNTRUSTED_KEXTS | CSR_ALLOW_UNRESTRICTED_FS | CSR_ALLOW_UNAPPROVED_KEXTS
        } else if third_party_kexts {
            CSR_ALLOW_UNTRUSTED_KEXTS
                | CSR_ALLOW_UNRESTRICTED_FS
                | CSR_ALLOW_UNAPPROVED_KEXTS
                | CSR_ALLOW_UNAUTHENTICATED_ROOT
        } else if major <= MONTEREY {
            CSR_ALLOW_UNRESTRICTED_FS | CSR_ALLOW_UNAUTHENTICATED_ROOT
        } else {
            CSR_ALLOW_UNTRUSTED_KEXTS | CSR_ALLOW_UNRESTRICTED_FS | CSR_ALLOW_UNAUTHENTICATED_ROOT
        };
        Self { bits }
    }

    pub fn describe(&self) -> String {
        format!("{:#x}", self.bits)
    }
}

/// Decodes the NVRAM bytes of `csr-active-config` (little-endian, up to 4 bytes).
pub fn decode_csr_bytes(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .take(4)
        .enumerate()
        .fold(0u32, |acc, (idx, byte)| acc | (u32::from(*byte) << (idx * 8)))
}

/// True while integrity protection is still enforced for the given requirement.
pub fn sip_enabled(csr_active_config: Option<u32>, requirement: SipRequirement) -> bool {
    match csr_active_config {
        Some(value) => value & requirement.bits != requirement.bits,
        None => true,
    }
}
