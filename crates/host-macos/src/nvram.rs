//! NVRAM variables relevant to root patching, parsed from `nvram -x -p`.

use crate::ioreg::{data_string, parse_plist};
use anyhow::Result;
use phoenix_safety::sip::decode_csr_bytes;
use plist::Value;

pub const OCLP_GUID: &str = "4D1FDA02-38C7-4A6A-9CC6-4BCCA8B30102";
pub const SECURE_BOOT_GUID: &str = "94B73556-2197-4702-82A8-3E1337DAFBFB";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NvramState {
    pub boot_args: String,
    pub csr_active_config: Option<u32>,
    pub oclp_settings: String,
    pub secure_boot_model: Option<String>,
    pub nvda_drv: bool,
}

pub fn parse_nvram(bytes: &[u8]) -> Result<NvramState> {
    let value = parse_plist(bytes)?;
    let Some(dict) = value.as_dictionary() else {
        return Ok(NvramState::default());
    };
    let text = |key: &str| dict.get(key).and_then(data_string);

    let boot_args = text("boot-args").unwrap_or_default();
    let csr_active_config = dict
        .get("csr-active-config")
        .and_then(Value::as_data)
        .map(decode_csr_bytes);
    let oclp_settings = text(&format!("{}:OCLP-Settings", OCLP_GUID)).unwrap_or_default();
    let secure_boot_model = text(&format!("{}:HardwareModel", SECURE_BOOT_GUID));
    let nvda_drv = boot_args.contains("nvda_drv_vrl=")
        || dict
            .get("nvda_drv")
            .and_then(data_string)
            .map(|value| value.starts_with('1'))
            .unwrap_or(false);

    Ok(NvramState {
        boot_args,
        csr_active_config,
        oclp_settings,
        secure_boot_model,
        nvda_drv,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_patching_variables() {
        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<dict>
  <key>boot-args</key><string>-v keepsyms=1 amfi=0x80</string>
  <key>csr-active-config</key><data>AwgAAA==</data>
  <key>{}:OCLP-Settings</key><data>LWFsbG93X2FtZmk=</data>
  <key>nvda_drv</key><data>MQ==</data>
</dict>
</plist>"#,
            OCLP_GUID
        );
        let state = parse_nvram(xml.as_bytes()).unwrap();
        assert_eq!(state.boot_args, "-v keepsyms=1 amfi=0x80");
        assert_eq!(state.csr_active_config, Some(0x803));
        assert_eq!(state.oclp_settings, "-allow_amfi");
        assert!(state.nvda_drv);
        assert_eq!(state.secure_boot_model, None);
    }

    #[test]
    fn missing_variables_leave_defaults() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?><plist version="1.0"><dict/></plist>"#;
        let state = parse_nvram(xml.as_bytes()).unwrap();
        assert_eq!(state, NvramState::default());
    }
}
