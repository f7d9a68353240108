use clap::{Parser, Subcommand, ValueEnum};
use miette::{Context, IntoDiagnostic, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use zereca_core::config::ZerecaRootConfig;
use zereca_core::platform::null::NullPlatform;
use zereca_core::zereca::types::RollbackTrigger;
use zereca_core::NeoController;

#[derive(Parser)]
#[command(name = "zereca", version, about = "Zereca control-plane CLI")]
struct Cli {
    #[arg(long, value_enum, default_value = "pretty")]
    log_format: LogFormat,
    #[arg(long, default_value = "info")]
    log_level: String,
    /// Directory holding target_state.json, probation.json, and
    /// zereca_dumps/. Created on first use.
    #[arg(long, default_value = "zereca_state")]
    state_dir: PathBuf,
    /// Layered pipeline + control-plane config; falls back to safe
    /// defaults when missing or malformed (§6, §7).
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Starts the Zereca control plane: installs the input hook and
    /// enters scanning mode.
    Start,
    /// Stops the control plane and releases the input hook.
    Stop,
    /// Prints the property-bridge status snapshot (§6).
    Status,
    /// Drives the control-plane mode machine for a fixed number of
    /// ticks against the deterministic null platform, printing each
    /// mode transition. Stands in for the always-on GUI/service process
    /// this CLI is a thin shell over (§11 item 4).
    Run {
        #[arg(long, default_value_t = 50)]
        ticks: u64,
        #[arg(long, default_value_t = 1000)]
        tick_ms: u64,
    },
    /// Forces an out-of-band reconciliation tick regardless of mode.
    ForceReconcile,
    /// Clears the rollback latch so the Arbiter accepts proposals again.
    AcknowledgeRollback,
    /// Clears the Probation Ledger. Reserved for Operator use after an
    /// acknowledged rollback (§4.8).
    ClearProbation,
    /// Clears Hypothesis Engine priors and the current baseline.
    ResetLearning,
    /// Captures the Pipeline's user-visible tunables for later rollback.
    Snapshot,
    /// Restores the last Pipeline snapshot, if any.
    Rollback,
    /// Fires an emergency rollback with the named trigger (§4.5).
    TriggerRollback {
        #[arg(value_enum)]
        trigger: TriggerArg,
    },
    /// Dumps the Flight Recorder ring to `zereca_dumps/` under
    /// `--state-dir` and prints the path.
    DumpAudit {
        #[arg(long, default_value = "manual")]
        reason: String,
    },
    /// Validates a config file without starting anything.
    Validate {
        #[arg(long)]
        config: PathBuf,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum TriggerArg {
    AppCrash,
    ThermalRunaway,
    BsodSignal,
    WatchdogTimeout,
    PrivilegeLost,
    UserRequested,
    Manual,
}

impl From<TriggerArg> for RollbackTrigger {
    fn from(value: TriggerArg) -> Self {
        match value {
            TriggerArg::AppCrash => RollbackTrigger::AppCrash,
            TriggerArg::ThermalRunaway => RollbackTrigger::ThermalRunaway,
            TriggerArg::BsodSignal => RollbackTrigger::BsodSignal,
            TriggerArg::WatchdogTimeout => RollbackTrigger::WatchdogTimeout,
            TriggerArg::PrivilegeLost => RollbackTrigger::PrivilegeLost,
            TriggerArg::UserRequested => RollbackTrigger::UserRequested,
            TriggerArg::Manual => RollbackTrigger::Manual,
        }
    }
}

fn init_tracing(log_format: LogFormat, log_level: &str) -> Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_new(log_level)
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
        .into_diagnostic()?;
    let fmt = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr);
    match log_format {
        LogFormat::Json => fmt.json().init(),
        LogFormat::Pretty => fmt.init(),
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_format, &cli.log_level)?;

    if let Commands::Validate { config } = &cli.command {
        return validate_command(config);
    }

    let config = load_config(cli.config.as_deref());
    std::fs::create_dir_all(&cli.state_dir)
        .into_diagnostic()
        .with_context(|| format!("Failed to create state dir {}", cli.state_dir.display()))?;

    let now_ms = monotonic_now_ms();
    let platform = Arc::new(NullPlatform::new());
    let controller = NeoController::new(
        platform,
        &config.pipeline,
        config.zereca,
        &cli.state_dir,
        now_ms,
    );

    match cli.command {
        Commands::Start => start_command(&controller, now_ms),
        Commands::Stop => stop_command(&controller, now_ms),
        Commands::Status => status_command(&controller),
        Commands::Run { ticks, tick_ms } => run_command(&controller, ticks, tick_ms, now_ms),
        Commands::ForceReconcile => force_reconcile_command(&controller, now_ms),
        Commands::AcknowledgeRollback => acknowledge_rollback_command(&controller, now_ms),
        Commands::ClearProbation => clear_probation_command(&controller),
        Commands::ResetLearning => reset_learning_command(&controller),
        Commands::Snapshot => snapshot_command(&controller),
        Commands::Rollback => rollback_command(&controller),
        Commands::TriggerRollback { trigger } => {
            trigger_rollback_command(&controller, trigger.into(), now_ms)
        }
        Commands::DumpAudit { reason } => dump_audit_command(&controller, &reason, now_ms),
        Commands::Validate { .. } => unreachable!("handled above"),
    }
}

fn start_command(controller: &NeoController<NullPlatform>, now_ms: u64) -> Result<()> {
    tracing::info!(command = "start");
    if !controller.start(now_ms) {
        println!("refused: rollback is active, run acknowledge-rollback first");
        return Ok(());
    }
    write_output(&controller.status())
}

fn stop_command(controller: &NeoController<NullPlatform>, now_ms: u64) -> Result<()> {
    tracing::info!(command = "stop");
    controller.stop(now_ms);
    write_output(&controller.status())
}

fn status_command(controller: &NeoController<NullPlatform>) -> Result<()> {
    write_output(&controller.status())
}

/// Drives the full mode machine (§4.15) against synthetic, steadily
/// improving telemetry so a fresh `--state-dir` reliably walks
/// SCANNING -> OBSERVING -> LEARNING -> TESTING -> MONITORING within a
/// bounded number of ticks, the way a short-lived CLI invocation can
/// demonstrate the always-on daemon's behavior without a real emulator.
fn run_command(
    controller: &NeoController<NullPlatform>,
    ticks: u64,
    tick_ms: u64,
    start_ms: u64,
) -> Result<()> {
    use zereca_core::zereca::types::{AggregatedTelemetry, ProcessInfo};
    use zereca_core::zereca::Mode;

    tracing::info!(command = "run", ticks, tick_ms);
    controller.platform().seed_process(ProcessInfo {
        pid: 4242,
        executable_name: "hd-player.exe".into(),
        window_class: Some("Qt5QWindowIcon".into()),
        loaded_modules: vec!["libc++_shared.so".into(), "bst_hyperv.dll".into()],
        child_count: 4,
    });
    controller.platform().set_operator(true);

    if !controller.start(start_ms) {
        println!("refused: rollback is active, run acknowledge-rollback first");
        return Ok(());
    }

    let mut now_ms = start_ms;
    let mut last_mode = controller.zereca().mode();
    for _ in 0..ticks {
        now_ms += tick_ms;
        controller.force_reconcile(now_ms);

        match controller.zereca().mode() {
            Mode::Scanning => {
                let mut log = controller.event_log();
                controller.zereca().scan(&mut log, now_ms);
            }
            Mode::Observing => {
                let sample = AggregatedTelemetry {
                    fps: 60.0,
                    avg_frame_time: 16.6,
                    fps_variance: 1.0,
                    timestamp_ms: now_ms,
                    ..Default::default()
                };
                let mut log = controller.event_log();
                controller.zereca().observe(sample, true, &mut log, now_ms);
            }
            Mode::Learning => {
                let mut log = controller.event_log();
                controller.zereca().advance_learning(&mut log, now_ms);
            }
            Mode::Testing => {
                let mut log = controller.event_log();
                controller
                    .zereca()
                    .advance_testing(63.0, true, &mut log, now_ms);
            }
            Mode::Monitoring | Mode::Standby | Mode::Rollback => {}
        }

        let mode = controller.zereca().mode();
        if mode != last_mode {
            tracing::info!(from = ?last_mode, to = ?mode, "mode transition");
            last_mode = mode;
        }
    }

    controller.stop(now_ms);
    write_output(&controller.status())
}

fn force_reconcile_command(controller: &NeoController<NullPlatform>, now_ms: u64) -> Result<()> {
    let applied = controller.force_reconcile(now_ms);
    println!("reconciliation applied {applied} change(s)");
    Ok(())
}

fn acknowledge_rollback_command(controller: &NeoController<NullPlatform>, now_ms: u64) -> Result<()> {
    controller.acknowledge_rollback(now_ms);
    write_output(&controller.status())
}

fn clear_probation_command(controller: &NeoController<NullPlatform>) -> Result<()> {
    controller.clear_probation();
    println!("probation ledger cleared");
    Ok(())
}

fn reset_learning_command(controller: &NeoController<NullPlatform>) -> Result<()> {
    controller.reset_learning();
    println!("learning priors reset");
    Ok(())
}

fn snapshot_command(controller: &NeoController<NullPlatform>) -> Result<()> {
    controller.snapshot();
    println!("pipeline snapshot captured");
    Ok(())
}

fn rollback_command(controller: &NeoController<NullPlatform>) -> Result<()> {
    if controller.rollback() {
        println!("pipeline tunables restored from snapshot");
    } else {
        println!("no snapshot to restore");
    }
    Ok(())
}

fn trigger_rollback_command(
    controller: &NeoController<NullPlatform>,
    trigger: RollbackTrigger,
    now_ms: u64,
) -> Result<()> {
    tracing::warn!(trigger = ?trigger, "manual emergency rollback requested");
    controller.trigger_rollback(trigger, now_ms);
    write_output(&controller.status())
}

fn dump_audit_command(controller: &NeoController<NullPlatform>, reason: &str, now_ms: u64) -> Result<()> {
    let path = controller
        .zereca()
        .dump_flight_recorder(reason, now_ms)
        .into_diagnostic()
        .context("Failed to dump flight recorder")?;
    println!("{}", path.display());
    Ok(())
}

fn validate_command(config_path: &Path) -> Result<()> {
    tracing::info!(command = "validate", config = %config_path.display());
    let contents = std::fs::read_to_string(config_path)
        .into_diagnostic()
        .with_context(|| format!("Failed to read config file {}", config_path.display()))?;
    let _: ZerecaRootConfig = serde_json::from_str(&contents)
        .into_diagnostic()
        .with_context(|| format!("Invalid config JSON in {}", config_path.display()))?;
    println!("Config OK");
    Ok(())
}

fn load_config(path: Option<&Path>) -> ZerecaRootConfig {
    match path {
        Some(path) => ZerecaRootConfig::load_or_default(path),
        None => ZerecaRootConfig::default(),
    }
}

fn write_output<T: Serialize>(value: &T) -> Result<()> {
    let data = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{data}");
    Ok(())
}

fn monotonic_now_ms() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
