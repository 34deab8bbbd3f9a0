use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

pub mod amfi;
pub mod sip;

pub use amfi::{AmfiConfiguration, AmfiLevel};
pub use sip::{sip_enabled, SipRequirement};

const BIG_SUR: u32 = 20;

/// Values of the `HardwareModel` Secure Boot variable that mean Apple Secure Boot is active.
pub const SECURE_BOOT_MODELS: &[&str] = &[
    "j130", "j132", "j137", "j140a", "j140k", "j152f", "j160", "j174", "j185", "j185f", "j213",
    "j214k", "j215", "j223", "j230k", "j680", "j780", "x86legacy",
];

#[derive(Debug, Clone)]
pub struct SafetyContext {
    pub force_mode: bool,
    pub confirmation_token: Option<String>,
}

#[derive(Debug, Clone)]
pub enum SafetyDecision {
    Allow,
    Deny(String),
}

pub fn require_confirmation_token() -> String {
    format!("PHX-{}", Uuid::new_v4())
}

/// Gate in front of every root-volume mutation. Dry runs issue no writes and skip the token.
pub fn can_mutate_root_volume(ctx: &SafetyContext, dry_run: bool) -> SafetyDecision {
    if dry_run {
        return SafetyDecision::Allow;
    }
    if !ctx.force_mode {
        return SafetyDecision::Deny("Denied: root volume changes require force-mode".to_string());
    }

    let Some(token) = &ctx.confirmation_token else {
        return SafetyDecision::Deny("Denied: confirmation token missing".to_string());
    };
    if !token.starts_with("PHX-") {
        return SafetyDecision::Deny("Denied: invalid confirmation token".to_string());
    }

    SafetyDecision::Allow
}

pub fn secure_boot_enabled(model: Option<&str>) -> bool {
    model
        .map(|value| SECURE_BOOT_MODELS.contains(&value.trim().to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

/// Inputs needed to judge whether the host is open enough for root patching.
#[derive(Debug, Clone, Default)]
pub struct PostureInputs<'a> {
    pub os_major: u32,
    pub csr_active_config: Option<u32>,
    pub secure_boot_model: Option<&'a str>,
    pub filevault_reported: bool,
    pub boot_args: &'a str,
    pub oclp_settings: &'a str,
    pub third_party_kexts: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityPosture {
    pub sip_required: SipRequirement,
    pub sip_enabled: bool,
    pub sbm_enabled: bool,
    pub filevault_enabled: bool,
    pub amfi: AmfiConfiguration,
}

impl SecurityPosture {
    pub fn evaluate(inputs: &PostureInputs<'_>) -> Self {
        let sip_required = SipRequirement::for_os(inputs.os_major, inputs.third_party_kexts);
        let allow_fv = inputs.oclp_settings.split_whitespace().any(|arg| arg == "-allow_fv");
        let posture = Self {
            sip_required,
            sip_enabled: sip_enabled(inputs.csr_active_config, sip_required),
            sbm_enabled: secure_boot_enabled(inputs.secure_boot_model),
            // FileVault only blocks root patching from Big Sur on.
            filevault_enabled: inputs.os_major >= BIG_SUR && inputs.filevault_reported && !allow_fv,
            amfi: AmfiConfiguration::from_nvram(inputs.boot_args, inputs.oclp_settings),
        };
        debug!(
            sip = posture.sip_enabled,
            sbm = posture.sbm_enabled,
            filevault = posture.filevault_enabled,
            required = %sip_required.describe(),
            "security posture evaluated"
        );
        posture
    }

    pub fn amfi_blocks(&self, level: AmfiLevel) -> bool {
        !self.amfi.satisfies(level)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denies_without_force() {
        let ctx = SafetyContext {
            force_mode: false,
            confirmation_token: None,
        };
        assert!(matches!(
            can_mutate_root_volume(&ctx, false),
            SafetyDecision::Deny(_)
        ));
    }

    #[test]
    fn denies_without_token() {
        let ctx = SafetyContext {
            force_mode: true,
            confirmation_token: None,
        };
        assert!(matches!(
            can_mutate_root_volume(&ctx, false),
            SafetyDecision::Deny(_)
        ));
    }

    #[test]
    fn denies_invalid_token() {
        let ctx = SafetyContext {
            force_mode: true,
            confirmation_token: Some("BAD".to_string()),
        };
        assert!(matches!(
            can_mutate_root_volume(&ctx, false),
            SafetyDecision::Deny(_)
        ));
    }

    #[test]
    fn allows_with_token() {
        let ctx = SafetyContext {
            force_mode: true,
            confirmation_token: Some(require_confirmation_token()),
        };
        assert!(matches!(
            can_mutate_root_volume(&ctx, false),
            SafetyDecision::Allow
        ));
    }

    #[test]
    fn dry_run_needs_no_token() {
        let ctx = SafetyContext {
            force_mode: false,
            confirmation_token: None,
        };
        assert!(matches!(can_mutate_root_volume(&ctx, true), SafetyDecision::Allow));
    }

    #[test]
    fn filevault_ignored_before_big_sur_and_with_override() {
        let mut inputs = PostureInputs {
            os_major: 19,
            filevault_reported: true,
            ..Default::default()
        };
        assert!(!SecurityPosture::evaluate(&inputs).filevault_enabled);
        inputs.os_major = 22;
        assert!(SecurityPosture::evaluate(&inputs).filevault_enabled);
        inputs.oclp_settings = "-allow_fv -allow_amfi";
        assert!(!SecurityPosture::evaluate(&inputs).filevault_enabled);
    }

    #[test]
    fn secure_boot_model_detection() {
        assert!(secure_boot_enabled(Some("j137")));
        assert!(secure_boot_enabled(Some("x86legacy")));
        assert!(!secure_boot_enabled(Some("Disabled")));
        assert!(!secure_boot_enabled(None));
    }
}
