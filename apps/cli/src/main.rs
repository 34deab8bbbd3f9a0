use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use phoenix_core::PatcherConfig;
use phoenix_legacy_patcher::{
    detect_patches, run_root_patch, run_root_unpatch, HostSnapshot, PatchError, PatchParams, RootPatchResult,
};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "phoenix", about = "Root volume patcher for unsupported Macs")]
struct Cli {
    /// JSON configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Payload tree root, overrides config and PHOENIX_PAYLOADS.
    #[arg(long, global = true)]
    payloads: Option<PathBuf>,

    #[arg(long, global = true)]
    report_base: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show which patch families this machine needs and what blocks them.
    Detect {
        #[arg(long)]
        json: bool,
    },
    /// Install root patches.
    Patch {
        #[command(flatten)]
        gate: Gate,
        /// Record the commands instead of running them.
        #[arg(long)]
        dry_run: bool,
    },
    /// Restore the last sealed snapshot.
    Revert {
        #[command(flatten)]
        gate: Gate,
    },
    /// Print a fresh confirmation token.
    Token,
}

#[derive(Args)]
struct Gate {
    #[arg(long)]
    force: bool,
    #[arg(long)]
    token: Option<String>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut config = PatcherConfig::load(cli.config.as_deref())?;
    if let Some(payloads) = cli.payloads {
        config.payload_root = payloads;
    }
    if let Some(report_base) = cli.report_base {
        config.report_base = report_base;
    }

    match cli.command {
        Commands::Token => {
            println!("{}", phoenix_safety::require_confirmation_token());
            Ok(())
        }
        Commands::Detect { json } => {
            let host = HostSnapshot::collect()?;
            let params = PatchParams {
                config,
                force: false,
                confirmation_token: None,
            };
            let detection = detect_patches(&params, &host)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&detection)?);
                return Ok(());
            }
            println!("os: {}", host.os.manifest_label());
            println!("model: {}", host.profile.model);
            for name in detection.decision.selected_names() {
                println!("patch: {name}");
            }
            for reason in &detection.reasons {
                println!("blocked: {reason}");
            }
            println!("new_patches_needed: {}", detection.new_patches_needed);
            println!("report_root: {}", detection.report.root.display());
            Ok(())
        }
        Commands::Patch { gate, dry_run } => {
            config.dry_run = dry_run;
            let host = HostSnapshot::collect()?;
            let result = run_root_patch(&gate.into_params(config), &host);
            finish(result)
        }
        Commands::Revert { gate } => {
            let host = HostSnapshot::collect()?;
            let result = run_root_unpatch(&gate.into_params(config), &host);
            finish(result)
        }
    }
}

impl Gate {
    fn into_params(self, config: PatcherConfig) -> PatchParams {
        PatchParams {
            config,
            force: self.force,
            confirmation_token: self.token,
        }
    }
}

fn finish(result: Result<RootPatchResult>) -> Result<()> {
    let result = match result {
        Ok(result) => result,
        Err(err) => {
            if let Some(patch) = err.downcast_ref::<PatchError>() {
                if let PatchError::SnapshotFailed { hint: Some(hint), .. } = patch {
                    eprintln!("{hint}");
                }
                if patch.requires_reboot() {
                    eprintln!("The root volume is left unsealed. Reboot before trying again.");
                }
            }
            return Err(err);
        }
    };

    for line in &result.commands {
        println!("would run: {line}");
    }
    for category in &result.categories {
        println!("category: {category}");
    }
    println!("state: {:?}", result.state);
    if result.needs_approval {
        println!("Approve the new kernel extensions in System Settings, then reboot.");
    } else if !result.dry_run {
        println!("Reboot for the changes to take effect.");
    }
    println!("report_root: {}", result.report.root.display());
    println!("logs: {}", result.report.logs_path.display());
    Ok(())
}
