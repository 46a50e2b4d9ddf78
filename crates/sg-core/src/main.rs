//! spikeguard - resource spike predictor and responder
//!
//! The main entry point, handling:
//! - `run`: the sampler and response loops until SIGINT/SIGTERM
//! - `sample`: a few sampler ticks, then the ranking as JSON
//! - `config`: the effective settings as TOML

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use sg_config::{load_settings, LoadedSettings, Settings};
use sg_core::action::syscall::SyscallSinkConfig;
use sg_core::action::{ActionSink, DryRunActionSink, SyscallActionSink, TimedSink};
use sg_core::collect::{ProcfsProvider, TimedProvider};
use sg_core::counters::{Counters, CountersSnapshot};
use sg_core::daemon::{install_signal_handler, Daemon};
use sg_core::exit_codes::ExitCode;
use sg_core::logging::{event_names, init_logging, LogConfig, LogFormat, LogLevel, Stage};
use sg_core::predict::Predictor;
use sg_core::ranking::{ActiveSpike, Metric, QuerySurface};
use sg_core::response::MonotonicClock;
use sg_core::sampler::SamplerLoop;
use sg_core::store::{ProcessSignature, SignatureStore};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// Predict per-process CPU, memory and I/O spikes and respond to them
#[derive(Parser)]
#[command(name = "spikeguard")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Global options available to all commands
#[derive(Args, Debug)]
struct GlobalOpts {
    /// Path to the configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true, value_enum)]
    log_level: Option<LogLevel>,

    /// Log format (human, jsonl)
    #[arg(long, global = true, value_enum)]
    log_format: Option<LogFormat>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the monitor until interrupted
    Run(RunArgs),

    /// Sample for a few ticks and print the ranking as JSON
    Sample(SampleArgs),

    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Log directives instead of applying them
    #[arg(long)]
    dry_run: bool,

    /// Write a JSON counter summary here at shutdown
    #[arg(long)]
    summary: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct SampleArgs {
    /// Number of sampler ticks
    #[arg(long, default_value_t = 5)]
    ticks: u32,

    /// Delay between ticks (defaults to the configured sampler interval)
    #[arg(long)]
    interval_ms: Option<u64>,

    /// How many processes to rank
    #[arg(long, default_value_t = 10)]
    top: usize,

    /// Ranking metric (total_score, cpu_roc, mem_roc, io_roc)
    #[arg(long, default_value_t = Metric::TotalScore)]
    metric: Metric,
}

fn main() {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            // `--help` and `--version` arrive here too and are not errors.
            let code = if err.use_stderr() {
                ExitCode::ArgsError
            } else {
                ExitCode::Clean
            };
            let _ = err.print();
            std::process::exit(code.as_i32());
        }
    };

    let log_config = LogConfig::from_env(cli.global.log_level, cli.global.log_format);
    init_logging(&log_config);

    let exit_code = match load(&cli.global) {
        Ok(loaded) => match cli.command {
            Commands::Run(args) => run_daemon(&loaded.settings, &args),
            Commands::Sample(args) => run_sample(&loaded.settings, &args),
            Commands::Config => print_config(&loaded.settings),
        },
        Err(code) => code,
    };

    std::process::exit(exit_code.as_i32());
}

fn load(global: &GlobalOpts) -> Result<LoadedSettings, ExitCode> {
    match load_settings(global.config.as_deref()) {
        Ok(loaded) => {
            match &loaded.path {
                Some(path) => info!(
                    event = event_names::CONFIG_LOADED,
                    stage = %Stage::Init,
                    path = %path.display(),
                    source = %loaded.source,
                    "configuration loaded"
                ),
                None => info!(
                    event = event_names::CONFIG_DEFAULT_USED,
                    stage = %Stage::Init,
                    "no configuration file found, using defaults"
                ),
            }
            Ok(loaded)
        }
        Err(e) => {
            error!(
                event = event_names::CONFIG_ERROR,
                stage = %Stage::Init,
                code = e.code(),
                "{}",
                e
            );
            Err(ExitCode::from(&e))
        }
    }
}

fn build_provider(settings: &Settings) -> std::io::Result<TimedProvider> {
    TimedProvider::new(
        ProcfsProvider::new(&settings.procfs),
        Duration::from_millis(settings.sampler.provider_timeout_ms),
    )
}

fn build_sink(settings: &Settings, dry_run: bool) -> std::io::Result<TimedSink> {
    let sink: Box<dyn ActionSink> = if dry_run {
        Box::new(DryRunActionSink)
    } else {
        Box::new(SyscallActionSink::new(SyscallSinkConfig {
            oom_score_adj: settings.response.mem.oom_score_adj,
            proc_root: settings.procfs.proc_root.clone(),
        }))
    };
    TimedSink::new(sink, Duration::from_millis(settings.response.action_timeout_ms))
}

fn run_daemon(settings: &Settings, args: &RunArgs) -> ExitCode {
    let provider = match build_provider(settings) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "cannot start provider worker");
            return ExitCode::InternalError;
        }
    };
    let sink = match build_sink(settings, args.dry_run) {
        Ok(s) => s,
        Err(e) => {
            error!(error = %e, "cannot start action worker");
            return ExitCode::InternalError;
        }
    };

    let mut daemon =
        Daemon::new(settings, provider, sink, MonotonicClock::new()).with_dry_run(args.dry_run);
    if let Err(e) = install_signal_handler(daemon.shutdown_handle()) {
        error!(code = e.code(), "{}", e);
        return ExitCode::InternalError;
    }

    let summary = match daemon.run() {
        Ok(summary) => summary,
        Err(e) => {
            error!(code = e.code(), "{}", e);
            return ExitCode::from(&e);
        }
    };

    if let Some(path) = &args.summary {
        if let Err(e) = summary.write_json(path) {
            error!(path = %path.display(), code = e.code(), "cannot write summary: {}", e);
            return ExitCode::from(&e);
        }
        info!(stage = %Stage::Shutdown, path = %path.display(), "summary written");
    }

    if summary.counters.action_failures > 0 {
        ExitCode::PartialFail
    } else {
        ExitCode::Clean
    }
}

#[derive(Serialize)]
struct SampleReport {
    ticks: u32,
    metric: Metric,
    tracked: usize,
    top: Vec<ProcessSignature>,
    active_spikes: Vec<ActiveSpike>,
    counters: CountersSnapshot,
}

fn run_sample(settings: &Settings, args: &SampleArgs) -> ExitCode {
    let provider = match build_provider(settings) {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, "cannot start provider worker");
            return ExitCode::InternalError;
        }
    };
    let store = Arc::new(SignatureStore::new(settings.sampler.capacity));
    let counters = Arc::new(Counters::new());
    let mut sampler = SamplerLoop::new(
        provider,
        Arc::clone(&store),
        Predictor::from_settings(&settings.predictor),
        Arc::clone(&counters),
    );
    let interval = Duration::from_millis(args.interval_ms.unwrap_or(settings.sampler.interval_ms));

    let mut failures = 0u32;
    for tick in 0..args.ticks {
        if tick > 0 {
            std::thread::sleep(interval);
        }
        if sampler.tick().is_err() {
            failures += 1;
        }
    }
    if args.ticks > 0 && failures == args.ticks {
        warn!(stage = %Stage::Sample, "every sampler tick failed");
        return ExitCode::ProviderError;
    }

    let query = QuerySurface::new(store);
    let report = SampleReport {
        ticks: args.ticks,
        metric: args.metric,
        tracked: query.snapshot().len(),
        top: query.top_n(args.top, args.metric),
        active_spikes: query.active_spikes(),
        counters: counters.snapshot(),
    };
    match serde_json::to_string_pretty(&report) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::Clean
        }
        Err(e) => {
            error!(error = %e, "cannot serialize report");
            ExitCode::InternalError
        }
    }
}

fn print_config(settings: &Settings) -> ExitCode {
    match settings.to_toml_string() {
        Ok(toml) => {
            print!("{}", toml);
            ExitCode::Clean
        }
        Err(e) => {
            error!(code = e.code(), "{}", e);
            ExitCode::from(&e)
        }
    }
}
