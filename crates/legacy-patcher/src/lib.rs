pub mod compose;
pub mod detect;
pub mod error;
pub mod helpers;
pub mod kdk;
pub mod kernelcache;
pub mod manifest;
pub mod mount;
pub mod patchsets;
pub mod pci_ids;
pub mod probe;
pub mod runner;
pub mod transaction;

pub use detect::{decide, new_patches_needed, Decision, PatchFamily, Requirements, ValidationResult};
pub use error::{PatchError, PatchResult};
pub use manifest::{read_manifest, InstalledPatchRecord};
pub use runner::{CommandOutput, PrivilegedRunner, RecordingRunner, SystemRunner};
pub use transaction::{ApplyOutcome, PatchPlan, RootPatchTransaction, TransactionState};

use anyhow::{anyhow, Context, Result};
use phoenix_core::{EnvironmentSnapshot, HardwareProfile, OsInfo, PatcherConfig};
use phoenix_report::{create_report_bundle, ReportPaths};
use phoenix_safety::{can_mutate_root_volume, SafetyContext, SafetyDecision};
use serde::Serialize;
use tracing::{error, info, warn};

/// Read-only probes a dry run may still execute.
const DRY_RUN_PROBES: [&str; 2] = ["/usr/sbin/diskutil info", "/usr/bin/defaults read"];

/// Everything read from the host before deciding.
#[derive(Debug, Clone)]
pub struct HostSnapshot {
    pub profile: HardwareProfile,
    pub os: OsInfo,
    pub env: EnvironmentSnapshot,
}

impl HostSnapshot {
    pub fn collect() -> Result<Self> {
        let os = phoenix_host_macos::read_os_info().context("read running OS")?;
        let profile = probe::probe(
            &phoenix_host_macos::IoregDeviceSource,
            phoenix_host_macos::read_machine_identity(),
            phoenix_host_macos::read_host_flags(),
        );
        let env = phoenix_host_macos::collect_environment(&os);
        Ok(Self { profile, os, env })
    }
}

#[derive(Debug, Clone)]
pub struct PatchParams {
    pub config: PatcherConfig,
    pub force: bool,
    pub confirmation_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DetectionReport {
    pub decision: Decision,
    pub reasons: Vec<String>,
    pub new_patches_needed: bool,
    pub installed: Option<InstalledPatchRecord>,
    pub report: ReportPaths,
}

#[derive(Debug, Clone)]
pub struct RootPatchResult {
    pub report: ReportPaths,
    pub state: TransactionState,
    pub categories: Vec<String>,
    /// Commands a dry run would have issued. Empty for real runs.
    pub commands: Vec<String>,
    pub needs_approval: bool,
    pub unmounted: bool,
    pub dry_run: bool,
}

pub fn detect_patches(params: &PatchParams, host: &HostSnapshot) -> Result<DetectionReport> {
    let config = &params.config;
    let installed = load_installed(config)?;
    let decision = decide(&host.profile, &host.os, &host.env, config, installed.as_ref());
    let needed = new_patches_needed(&decision, installed.as_ref(), config);
    let reasons = decision.validation.reasons();

    let mut logs = base_log("detect", host, &decision);
    logs.push(format!("new_patches_needed={needed}"));
    logs.extend(reasons.iter().map(|reason| format!("blocked={reason}")));
    let report = write_report(config, host, &decision, "detected", &logs)?;

    Ok(DetectionReport {
        decision,
        reasons,
        new_patches_needed: needed,
        installed,
        report,
    })
}

pub fn run_root_patch(params: &PatchParams, host: &HostSnapshot) -> Result<RootPatchResult> {
    let config = &params.config;
    gate(params)?;
    let installed = load_installed(config)?;
    let decision = decide(&host.profile, &host.os, &host.env, config, installed.as_ref());
    let mut logs = base_log("root-patch", host, &decision);

    if !decision.validation.patch_allowed {
        let reasons = decision.validation.reasons();
        logs.extend(reasons.iter().map(|reason| format!("blocked={reason}")));
        write_report(config, host, &decision, "blocked", &logs)?;
        return Err(PatchError::EnvironmentBlocked { reasons }.into());
    }
    let needed = new_patches_needed(&decision, installed.as_ref(), config);
    if !needed {
        let status = if decision.any_selected() {
            info!("selected root patches are already installed");
            "no_new_patches"
        } else {
            info!("no root patches needed for this machine");
            "nothing_to_do"
        };
        logs.push("patches_applied=0".to_string());
        let report = write_report(config, host, &decision, status, &logs)?;
        return Ok(RootPatchResult {
            report,
            state: TransactionState::Unmounted,
            categories: Vec::new(),
            commands: Vec::new(),
            needs_approval: false,
            unmounted: true,
            dry_run: config.dry_run,
        });
    }

    let plan = PatchPlan::new(&decision, &host.os);
    let recorder = dry_run_recorder();
    let system = SystemRunner;
    let runner: &dyn PrivilegedRunner = if config.dry_run { &recorder } else { &system };

    let mut tx = RootPatchTransaction::new(runner, config, &host.os);
    let outcome = patch_volume(&mut tx, &plan, host, installed.as_ref());
    let unmounted = tx.state() == TransactionState::Unmounted;
    let state = if outcome.is_ok() { TransactionState::Patched } else { tx.state() };
    logs.extend(tx.log().iter().cloned());

    let status = finish_status(&outcome, config.dry_run, &mut logs);
    let report = write_report(config, host, &decision, status, &logs)?;
    let applied = outcome.with_context(|| format!("root patching failed, see {}", report.logs_path.display()))?;

    Ok(RootPatchResult {
        report,
        state,
        categories: plan.categories.iter().map(|category| category.name.clone()).collect(),
        commands: if config.dry_run { recorder.lines() } else { Vec::new() },
        needs_approval: applied.needs_approval,
        unmounted,
        dry_run: config.dry_run,
    })
}

pub fn run_root_unpatch(params: &PatchParams, host: &HostSnapshot) -> Result<RootPatchResult> {
    let config = &params.config;
    gate(params)?;
    let installed = load_installed(config)?;
    let decision = decide(&host.profile, &host.os, &host.env, config, installed.as_ref());
    let mut logs = base_log("root-unpatch", host, &decision);

    if !decision.validation.revert_allowed {
        let reasons = decision.validation.reasons();
        logs.extend(reasons.iter().map(|reason| format!("blocked={reason}")));
        write_report(config, host, &decision, "blocked", &logs)?;
        return Err(PatchError::EnvironmentBlocked { reasons }.into());
    }

    let recorder = dry_run_recorder();
    let system = SystemRunner;
    let runner: &dyn PrivilegedRunner = if config.dry_run { &recorder } else { &system };

    let mut tx = RootPatchTransaction::new(runner, config, &host.os);
    let outcome = tx.mount().and_then(|_| tx.revert(installed.as_ref()));
    let state = tx.state();
    let unmounted = tx.unmount();
    logs.extend(tx.log().iter().cloned());

    let status = finish_status(&outcome, config.dry_run, &mut logs);
    let report = write_report(config, host, &decision, status, &logs)?;
    outcome.with_context(|| format!("root unpatching failed, see {}", report.logs_path.display()))?;

    Ok(RootPatchResult {
        report,
        state,
        categories: installed
            .map(|record| record.categories.keys().cloned().collect())
            .unwrap_or_default(),
        commands: if config.dry_run { recorder.lines() } else { Vec::new() },
        needs_approval: false,
        unmounted,
        dry_run: config.dry_run,
    })
}

fn gate(params: &PatchParams) -> Result<()> {
    let ctx = SafetyContext {
        force_mode: params.force,
        confirmation_token: params.confirmation_token.clone(),
    };
    match can_mutate_root_volume(&ctx, params.config.dry_run) {
        SafetyDecision::Allow => Ok(()),
        SafetyDecision::Deny(reason) => Err(anyhow!(reason)),
    }
}

fn load_installed(config: &PatcherConfig) -> Result<Option<InstalledPatchRecord>> {
    let path = config.installed_manifest_path();
    read_manifest(&path).with_context(|| format!("read {}", path.display()))
}

fn dry_run_recorder() -> RecordingRunner {
    DRY_RUN_PROBES
        .iter()
        .fold(RecordingRunner::new(), |runner, prefix| runner.live(prefix))
}

/// Mount through unmount. A failed preflight has not written to the system
/// volume yet, so it still unmounts; later failures leave the mount in place.
fn patch_volume(
    tx: &mut RootPatchTransaction<'_>,
    plan: &PatchPlan,
    host: &HostSnapshot,
    installed: Option<&InstalledPatchRecord>,
) -> PatchResult<ApplyOutcome> {
    tx.mount()?;
    let preflight = match tx.preflight(plan, &host.profile, &host.env, installed) {
        Ok(preflight) => preflight,
        Err(err) => {
            tx.unmount();
            return Err(err);
        }
    };
    let applied = tx.apply(plan, &preflight)?;
    tx.seal(plan, &applied, &host.profile)?;
    if !tx.unmount() {
        warn!("root volume left mounted, it is released on reboot");
    }
    Ok(applied)
}

fn finish_status<T>(outcome: &PatchResult<T>, dry_run: bool, logs: &mut Vec<String>) -> &'static str {
    match outcome {
        Ok(_) if dry_run => "dry_run",
        Ok(_) => "completed",
        Err(err) => {
            error!("{}", err);
            logs.push(format!("error={err}"));
            if let PatchError::SnapshotFailed { hint: Some(hint), .. } = err {
                logs.push(format!("hint={hint}"));
            }
            if err.requires_reboot() {
                logs.push("reboot_required=true".to_string());
            }
            "failed"
        }
    }
}

fn base_log(workflow: &str, host: &HostSnapshot, decision: &Decision) -> Vec<String> {
    vec![
        format!("workflow={workflow}"),
        format!("model={}", host.profile.model),
        format!("board_id={}", host.profile.board_id),
        format!("os={}", host.os.manifest_label()),
        format!("selected={}", decision.selected_names().join(",")),
    ]
}

fn write_report(
    config: &PatcherConfig,
    host: &HostSnapshot,
    decision: &Decision,
    status: &str,
    logs: &[String],
) -> Result<ReportPaths> {
    let meta = serde_json::json!({
        "status": status,
        "dry_run": config.dry_run,
        "os": host.os.manifest_label(),
        "selected": decision.selected_names(),
        "requirements": decision.settings,
        "validation": decision.validation,
        "reasons": decision.validation.reasons(),
    });
    create_report_bundle(&config.report_base, &host.profile, Some(meta), Some(&logs.join("\n")))
}
