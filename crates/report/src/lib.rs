use anyhow::{Context, Result};
use phoenix_core::{now_utc_rfc3339, HardwareProfile, PROFILE_SCHEMA_VERSION};
use serde::Serialize;
use serde_json::Value;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize)]
pub struct ReportPaths {
    pub run_id: String,
    pub root: PathBuf,
    pub hardware_profile_json: PathBuf,
    pub run_json: PathBuf,
    pub logs_path: PathBuf,
}

#[derive(Debug, Serialize)]
struct RunMetadata {
    run_id: String,
    created_at_utc: String,
    profile_schema_version: String,
    meta: Option<Value>,
}

/// Writes `reports/<run-id>/` under `base` with the probed profile, run metadata and the run log.
pub fn create_report_bundle(
    base: impl AsRef<Path>,
    profile: &HardwareProfile,
    meta: Option<Value>,
    logs: Option<&str>,
) -> Result<ReportPaths> {
    let run_id = Uuid::new_v4().to_string();
    let base = base.as_ref();
    let root = base.join("reports").join(&run_id);
    std::fs::create_dir_all(&root).with_context(|| format!("create {}", root.display()))?;

    let hardware_profile_json = root.join("hardware_profile.json");
    let run_json = root.join("run.json");
    let logs_path = root.join("logs.txt");

    let profile_json = serde_json::to_string_pretty(profile)?;
    std::fs::write(&hardware_profile_json, profile_json)?;

    let run_meta = RunMetadata {
        run_id: run_id.clone(),
        created_at_utc: now_utc_rfc3339(),
        profile_schema_version: PROFILE_SCHEMA_VERSION.to_string(),
        meta,
    };
    let run_json_data = serde_json::to_string_pretty(&run_meta)?;
    std::fs::write(&run_json, run_json_data)?;

    let log_data = logs.unwrap_or("");
    std::fs::write(&logs_path, log_data)?;

    Ok(ReportPaths {
        run_id,
        root,
        hardware_profile_json,
        run_json,
        logs_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use phoenix_core::{CpuDescriptor, HostFlags};

    fn profile() -> HardwareProfile {
        HardwareProfile {
            schema_version: PROFILE_SCHEMA_VERSION.to_string(),
            model: "iMac11,3".to_string(),
            board_id: "Mac-F2238BAE".to_string(),
            reported_board_id: "Mac-F2238BAE".to_string(),
            cpu: CpuDescriptor::default(),
            gpus: Vec::new(),
            igpu: None,
            dgpu: None,
            wireless: None,
            usb_controllers: Vec::new(),
            storage: Vec::new(),
            ethernet: Vec::new(),
            flags: HostFlags::default(),
        }
    }

    #[test]
    fn writes_bundle_layout() {
        let dir = tempfile::tempdir().unwrap();
        let meta = serde_json::json!({ "status": "dry_run" });
        let paths = create_report_bundle(dir.path(), &profile(), Some(meta), Some("step=detect")).unwrap();
        assert!(paths.root.starts_with(dir.path().join("reports")));
        assert_eq!(std::fs::read_to_string(&paths.logs_path).unwrap(), "step=detect");
        let run: Value = serde_json::from_str(&std::fs::read_to_string(&paths.run_json).unwrap()).unwrap();
        assert_eq!(run["meta"]["status"], "dry_run");
        assert_eq!(run["run_id"], paths.run_id.as_str());
        let saved: HardwareProfile =
            serde_json::from_str(&std::fs::read_to_string(&paths.hardware_profile_json).unwrap()).unwrap();
        assert_eq!(saved.model, "iMac11,3");
    }
}
