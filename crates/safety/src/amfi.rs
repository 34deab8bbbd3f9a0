//! AppleMobileFileIntegrity configuration as seen through boot-args.

use serde::{Deserialize, Serialize};

pub const AMFI_ALLOW_TASK_FOR_PID: u32 = 0x1;
pub const AMFI_ALLOW_INVALID_SIGNATURE: u32 = 0x2;
pub const AMFI_LV_ENFORCE_THIRD_PARTY: u32 = 0x4;
pub const AMFI_ALLOW_EVERYTHING: u32 = 0x80;

pub const AMFIPASS_BUNDLE_ID: &str = "com.dhinakg.AMFIPass";

/// How much of AMFI a patch set needs out of the way, weakest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AmfiLevel {
    NoCheck,
    LibraryValidation,
    LibraryValidationAndSig,
    AllowAll,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AmfiConfiguration {
    pub allow_task_for_pid: bool,
    pub allow_invalid_signature: bool,
    pub lv_enforce_third_party: bool,
    pub allow_everything: bool,
    pub skip_library_validation: bool,
}

impl AmfiConfiguration {
    /// Builds the configuration from `boot-args` and the `OCLP-Settings` variable.
    pub fn from_nvram(boot_args: &str, oclp_settings: &str) -> Self {
        let mut config = Self::default();
        let args: Vec<&str> = boot_args.split_whitespace().collect();

        if let Some(mask) = args.iter().find_map(|arg| arg.strip_prefix("amfi=")).and_then(parse_int) {
            config.allow_task_for_pid = mask & AMFI_ALLOW_TASK_FOR_PID != 0;
            config.allow_invalid_signature = mask & AMFI_ALLOW_INVALID_SIGNATURE != 0;
            config.lv_enforce_third_party = mask & AMFI_LV_ENFORCE_THIRD_PARTY != 0;
            if mask & AMFI_ALLOW_EVERYTHING != 0 {
                config.allow_everything = true;
                config.skip_library_validation = true;
                config.allow_invalid_signature = true;
            }
        }

        for arg in &args {
            let Some((key, value)) = arg.split_once('=') else {
                continue;
            };
            if !matches!(value, "1" | "0x1") {
                continue;
            }
            match key {
                "amfi_unrestrict_task_for_pid" => config.allow_task_for_pid = true,
                "amfi_allow_any_signature" => config.allow_invalid_signature = true,
                "amfi_get_out_of_my_way" => {
                    config.allow_everything = true;
                    config.skip_library_validation = true;
                    config.allow_invalid_signature = true;
                }
                _ => {}
            }
        }

        if oclp_settings.split_whitespace().any(|arg| arg == "-allow_amfi") {
            config.skip_library_validation = true;
        }
        config
    }

    pub fn satisfies(&self, level: AmfiLevel) -> bool {
        match level {
            AmfiLevel::NoCheck => true,
            AmfiLevel::LibraryValidation => self.skip_library_validation,
            AmfiLevel::LibraryValidationAndSig => {
                self.skip_library_validation && self.allow_invalid_signature
            }
            AmfiLevel::AllowAll => self.allow_everything,
        }
    }
}

fn parse_int(value: &str) -> Option<u32> {
    match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16).ok(),
        None => value.parse().ok(),
    }
}
