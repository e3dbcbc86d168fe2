//! GPIO benchmark entry point.
//!
//! Loads the configuration, applies command-line overrides, runs the
//! selected benchmarks and prints one line per result.

mod signals;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use gpiobench_common::{BenchConfig, BenchReport};
use gpiobench_gpio::sim::SimBoard;
use gpiobench_gpio::GpioHost;
use gpiobench_runtime::BenchmarkOrchestrator;
use std::path::PathBuf;
use tracing::{info, warn};

use crate::signals::{wait_until, SignalHandler};

/// Environment variable naming a configuration file.
const CONFIG_ENV: &str = "GPIO_BENCH_CONFIG";
/// System-wide configuration file.
const SYSTEM_CONFIG: &str = "/etc/gpio-bench/config.toml";
/// Configuration file relative to the working directory.
const LOCAL_CONFIG: &str = "config/default.toml";

/// Pin access method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum AccessArg {
    /// Memory-mapped GPIO registers.
    Registers,
    /// Kernel GPIO character device.
    Api,
}

/// Read-write synchronization strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SyncArg {
    /// Edge interrupt handlers.
    Interrupt,
    /// Two polling worker threads.
    Polling,
}

/// Write-only benchmark mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum WriteOnlyArg {
    /// Skip the write-only benchmark.
    Off,
    /// Run it during setup on the main thread.
    Inline,
    /// Run it on its own worker thread.
    Threaded,
}

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "gpio-bench",
    about = "GPIO throughput benchmark - toggle and ping-pong rates",
    version,
    long_about = None
)]
struct Args {
    /// Path to a benchmark configuration file (TOML).
    #[arg(long, short = 'c', value_name = "FILE")]
    config: Option<PathBuf>,

    /// Run against the simulated loopback board instead of real hardware.
    #[arg(long, short = 's')]
    simulated: bool,

    /// Pin access method (overrides config file).
    #[arg(long, value_enum)]
    access: Option<AccessArg>,

    /// Read-write strategy (overrides config file).
    #[arg(long, value_enum)]
    sync: Option<SyncArg>,

    /// Yield the CPU between polls.
    #[arg(long)]
    yield_cpu: bool,

    /// Write-only benchmark mode (overrides config file).
    #[arg(long, value_enum)]
    write_only: Option<WriteOnlyArg>,

    /// Do not pin worker threads to cores.
    #[arg(long)]
    no_affinity: bool,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    print_config: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, short = 'l', default_value = "info")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args.log_level);

    info!(version = env!("CARGO_PKG_VERSION"), "Starting GPIO benchmark");

    let mut config = load_config(&args)?;
    apply_overrides(&mut config, &args);

    if args.print_config {
        print!("{}", config.to_toml().context("Failed to render configuration")?);
        return Ok(());
    }

    let signal_handler = SignalHandler::new().context("Failed to set up signal handlers")?;

    run(&config, &args, &signal_handler)
}

/// Initialize logging with the specified log level.
fn init_logging(level: &str) {
    let filter = format!(
        "gpio_bench={level},gpiobench_runtime={level},gpiobench_gpio={level},gpiobench_common={level}"
    );

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&filter)),
        )
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Where a configuration file may come from, highest priority first.
fn config_candidates(args: &Args) -> Vec<(PathBuf, &'static str)> {
    let mut candidates = Vec::new();
    if let Some(path) = &args.config {
        candidates.push((path.clone(), "--config"));
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        candidates.push((PathBuf::from(path), CONFIG_ENV));
    }
    candidates.push((PathBuf::from(SYSTEM_CONFIG), "system path"));
    candidates.push((PathBuf::from(LOCAL_CONFIG), "local path"));
    candidates
}

/// Load the first configuration file found, or the built-in defaults.
///
/// An explicit `--config` must exist; the other locations are skipped when
/// missing.
fn load_config(args: &Args) -> Result<BenchConfig> {
    for (path, origin) in config_candidates(args) {
        if origin != "--config" && !path.exists() {
            if origin == CONFIG_ENV {
                warn!(path = %path.display(), "{CONFIG_ENV} points to a missing file, ignoring");
            }
            continue;
        }
        info!(path = %path.display(), origin, "Loading configuration");
        return BenchConfig::from_file(&path)
            .with_context(|| format!("Failed to load config from {} ({origin})", path.display()));
    }

    info!("No config file found, using built-in defaults");
    Ok(BenchConfig::default())
}

/// Fold command-line switches into the loaded configuration.
fn apply_overrides(config: &mut BenchConfig, args: &Args) {
    if let Some(access) = args.access {
        config.access.use_registers = access == AccessArg::Registers;
    }
    if let Some(sync) = args.sync {
        config.read_write.interrupt = sync == SyncArg::Interrupt;
        config.read_write.polling = sync == SyncArg::Polling;
    }
    if args.yield_cpu {
        config.read_write.yield_cpu = true;
    }
    if let Some(mode) = args.write_only {
        config.write_only.blocking = mode == WriteOnlyArg::Inline;
        config.write_only.threaded = mode == WriteOnlyArg::Threaded;
    }
    if args.no_affinity {
        config.affinity.enabled = false;
    }
}

fn build_host(config: &BenchConfig, simulated: bool) -> Result<GpioHost> {
    if simulated {
        info!("Using simulated loopback board");
        return Ok(SimBoard::loopback(&config.pins).host());
    }

    #[cfg(target_os = "linux")]
    {
        Ok(GpioHost::linux(&config.access))
    }
    #[cfg(not(target_os = "linux"))]
    {
        anyhow::bail!("hardware access needs Linux; use --simulated")
    }
}

/// Run the benchmarks until every selected one has reported or a signal
/// arrives. A miswired board never completes.
fn run(config: &BenchConfig, args: &Args, signal_handler: &SignalHandler) -> Result<()> {
    let host = build_host(config, args.simulated)?;
    let mut orchestrator =
        BenchmarkOrchestrator::new(config, host).context("Invalid benchmark configuration")?;

    if let Err(e) = orchestrator.setup() {
        orchestrator.shutdown();
        return Err(e).context("Benchmark setup failed");
    }

    if wait_until(signal_handler, || orchestrator.is_complete()) {
        warn!(
            requests = signal_handler.request().count(),
            "Run stopped before all benchmarks reported"
        );
    }

    let reports = orchestrator.results();
    orchestrator.shutdown();
    print_summary(&reports);

    info!(
        reports = reports.len(),
        expected = orchestrator.plan().expected_reports(),
        "GPIO benchmark finished"
    );
    Ok(())
}

fn print_summary(reports: &[BenchReport]) {
    for report in reports {
        report.log();
        println!("{report}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gpiobench_common::{AccessKind, SyncStrategyKind, WriteOnlyMode};

    fn plan_for(argv: &[&str]) -> gpiobench_common::BenchPlan {
        let args = Args::parse_from(std::iter::once("gpio-bench").chain(argv.iter().copied()));
        let mut config = BenchConfig::default();
        apply_overrides(&mut config, &args);
        config.validate().unwrap()
    }

    #[test]
    fn test_no_flags_keep_defaults() {
        let plan = plan_for(&[]);
        assert_eq!(plan.access, AccessKind::Registers);
        assert_eq!(plan.sync, SyncStrategyKind::PollLoop { yield_cpu: false });
        assert_eq!(plan.write_only, WriteOnlyMode::Inline);
        assert!(plan.affinity.is_some());
    }

    #[test]
    fn test_flags_override_config() {
        let plan = plan_for(&[
            "--access",
            "api",
            "--sync",
            "interrupt",
            "--write-only",
            "threaded",
            "--no-affinity",
        ]);
        assert_eq!(plan.access, AccessKind::Api);
        assert_eq!(plan.sync, SyncStrategyKind::InterruptChain);
        assert_eq!(plan.write_only, WriteOnlyMode::Threaded);
        assert_eq!(plan.affinity, None);
    }

    #[test]
    fn test_write_only_off() {
        let plan = plan_for(&["--write-only", "off", "--yield-cpu"]);
        assert_eq!(plan.write_only, WriteOnlyMode::Disabled);
        assert_eq!(plan.sync, SyncStrategyKind::PollLoop { yield_cpu: true });
        assert_eq!(plan.expected_reports(), 1);
    }

    #[test]
    fn test_explicit_missing_config_is_an_error() {
        let args = Args::parse_from(["gpio-bench", "--config", "/nonexistent/gpio-bench.toml"]);
        assert!(load_config(&args).is_err());
    }
}
