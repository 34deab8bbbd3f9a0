use std::path::PathBuf;
use thiserror::Error;

pub type PatchResult<T> = std::result::Result<T, PatchError>;

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("root patching blocked: {}", reasons.join("; "))]
    EnvironmentBlocked { reasons: Vec<String> },

    #[error("required artifact missing: {}", path.display())]
    PreconditionMissing { path: PathBuf },

    #[error("precondition failed: {0}")]
    PreconditionFailed(String),

    #[error("command `{command}` exited with {code}: {output}")]
    CommandFailed {
        command: String,
        code: i32,
        output: String,
    },

    #[error("failed to mount root volume: {0}")]
    MountFailed(String),

    #[error("kernel cache rebuild failed: {output}")]
    KernelCacheFailed { output: String },

    #[error("snapshot creation failed: {output}")]
    SnapshotFailed { output: String, hint: Option<String> },

    #[error("invalid transaction state: {0}")]
    InvalidState(String),

    #[error("manifest error: {0}")]
    Manifest(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Plist(#[from] plist::Error),
}

impl PatchError {
    /// Failures that leave the root volume mounted but unsealed.
    pub fn requires_reboot(&self) -> bool {
        matches!(
            self,
            Self::CommandFailed { .. } | Self::KernelCacheFailed { .. } | Self::SnapshotFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_transactional_errors_need_reboot() {
        let failed = PatchError::CommandFailed {
            command: "kmutil".to_string(),
            code: 71,
            output: "error".to_string(),
        };
        assert!(failed.requires_reboot());
        assert!(!PatchError::MountFailed("no device".to_string()).requires_reboot());
        assert!(!PatchError::EnvironmentBlocked { reasons: vec!["SIP".to_string()] }.requires_reboot());
    }

    #[test]
    fn blocked_message_lists_reasons() {
        let err = PatchError::EnvironmentBlocked {
            reasons: vec!["SIP enabled".to_string(), "FileVault enabled".to_string()],
        };
        assert_eq!(err.to_string(), "root patching blocked: SIP enabled; FileVault enabled");
    }
}
