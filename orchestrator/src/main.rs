//! Main entry point for the orchestrator binary
//!
//! `setup` prepares scheme dependencies, `test local|remote` runs an
//! experiment and `annotate` appends an analysis section to a stats file.

use std::io::Read;
use std::path::PathBuf;

use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio::signal::unix::{signal, SignalKind};

use orchestrator::core::StatsFile;
use orchestrator::{
    setup_schemes, Experiment, ExperimentContext, LinkConfig, MultiFlowConfig, RemoteConfig, RemoteHost, RunConfig,
    SchemeRegistry,
};
use shared::{logging, process_error, process_info, HostSide, Mode, ProcessId};

/// Orchestrates congestion-control scheme tests over emulated or real paths
#[derive(Parser)]
#[command(name = "orchestrator")]
#[command(about = "Runs congestion-control schemes through logged tunnels and collects their traces")]
pub struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", global = true)]
    pub log_level: String,

    /// Base directory holding `schemes/` and `tmp/`
    #[arg(long, default_value = ".", global = true)]
    pub base_dir: PathBuf,

    /// Directory receiving logs, stats and metadata
    #[arg(long, default_value = "data", global = true)]
    pub data_dir: PathBuf,

    /// Scheme executables directory (defaults to <base-dir>/schemes)
    #[arg(long, global = true)]
    pub scheme_dir: Option<PathBuf>,

    /// Tunnel manager executable (defaults to the one next to this binary)
    #[arg(long, global = true)]
    pub tunnel_manager: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print dependencies of and run setup for each scheme
    Setup {
        /// Space-separated scheme names
        #[arg(long)]
        schemes: String,
    },
    /// Run an experiment
    Test {
        #[command(subcommand)]
        mode: TestMode,
    },
    /// Append a delimited section read from stdin to a run's stats file
    Annotate {
        /// Scheme or test name of the run
        name: String,
        run_id: u32,
        /// Section title
        section: String,
    },
}

#[derive(Subcommand)]
pub enum TestMode {
    /// Both endpoints on this host, behind an emulated link
    Local {
        #[command(flatten)]
        common: CommonArgs,
        #[command(flatten)]
        link: LinkArgs,
    },
    /// One endpoint on this host, the other reached over ssh
    Remote {
        #[command(flatten)]
        common: CommonArgs,
        #[command(flatten)]
        remote: RemoteArgs,
    },
}

#[derive(ClapArgs)]
pub struct CommonArgs {
    /// Space-separated scheme names
    #[arg(long)]
    pub schemes: Option<String>,

    /// Number of flows; 0 runs the schemes directly without tunnels
    #[arg(short, long, default_value = "1")]
    pub flows: u32,

    /// Runtime of each run in seconds
    #[arg(short = 't', long, default_value = "30")]
    pub runtime: u64,

    /// Seconds between starting successive flows
    #[arg(long, default_value = "0")]
    pub interval: u64,

    #[arg(long, default_value = "1")]
    pub run_times: u32,

    #[arg(long, default_value = "1")]
    pub start_run_id: u32,

    /// Shuffle the scheme order
    #[arg(long)]
    pub random_order: bool,

    /// JSON multi-scheme test configuration, one scheme per flow
    #[arg(long)]
    pub test_config: Option<PathBuf>,
}

#[derive(ClapArgs)]
pub struct LinkArgs {
    #[arg(long)]
    pub uplink_trace: PathBuf,

    #[arg(long)]
    pub downlink_trace: PathBuf,

    /// Shell fragment placed before the link command
    #[arg(long)]
    pub prepend_mm_cmds: Option<String>,

    /// Shell fragment placed after the link command
    #[arg(long)]
    pub append_mm_cmds: Option<String>,

    /// Extra arguments for the link command
    #[arg(long, allow_hyphen_values = true)]
    pub extra_mm_link_args: Option<String>,
}

#[derive(ClapArgs)]
pub struct RemoteArgs {
    /// Peer as user@host:/base/dir
    pub remote_path: String,

    #[arg(long, default_value = "remote")]
    pub sender_side: HostSide,

    #[arg(long, default_value = "remote")]
    pub server_side: HostSide,

    /// Address of this host as seen from the peer
    #[arg(long)]
    pub local_addr: Option<String>,

    #[arg(long)]
    pub local_if: Option<String>,

    #[arg(long)]
    pub remote_if: Option<String>,

    #[arg(long)]
    pub local_desc: Option<String>,

    #[arg(long)]
    pub remote_desc: Option<String>,

    /// NTP host both sides measure their clock offset against
    #[arg(long)]
    pub ntp_addr: Option<String>,
}

fn split_schemes(schemes: Option<&str>) -> Vec<String> {
    schemes
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

async fn run_config(mode: Mode, common: &CommonArgs, link: Option<LinkConfig>, remote: Option<RemoteConfig>) -> anyhow::Result<RunConfig> {
    let test_config = match &common.test_config {
        Some(path) => Some(MultiFlowConfig::load(path).await?),
        None => None,
    };

    Ok(RunConfig {
        mode,
        flows: common.flows,
        runtime: common.runtime,
        interval: common.interval,
        run_times: common.run_times,
        start_run_id: common.start_run_id,
        random_order: common.random_order,
        link,
        remote,
        test_config,
    })
}

async fn build_experiment(args: &Args, mode: &TestMode) -> anyhow::Result<Experiment> {
    let mut ctx = ExperimentContext::new(&args.base_dir, &args.data_dir);
    if let Some(dir) = &args.scheme_dir {
        ctx = ctx.with_scheme_dir(dir);
    }
    if let Some(manager) = &args.tunnel_manager {
        ctx = ctx.with_tunnel_manager(manager);
    }

    let (config, common) = match mode {
        TestMode::Local { common, link } => {
            let link = LinkConfig {
                uplink_trace: link.uplink_trace.clone(),
                downlink_trace: link.downlink_trace.clone(),
                prepend_mm_cmds: link.prepend_mm_cmds.clone(),
                append_mm_cmds: link.append_mm_cmds.clone(),
                extra_mm_link_args: link.extra_mm_link_args.clone(),
            };
            (run_config(Mode::Local, common, Some(link), None).await?, common)
        }
        TestMode::Remote { common, remote } => {
            ctx = ctx.with_remote(Some(RemoteHost::parse(&remote.remote_path)?));
            let remote = RemoteConfig {
                remote_path: remote.remote_path.clone(),
                sender_side: remote.sender_side,
                server_side: remote.server_side,
                local_addr: remote.local_addr.clone(),
                local_if: remote.local_if.clone(),
                remote_if: remote.remote_if.clone(),
                local_desc: remote.local_desc.clone(),
                remote_desc: remote.remote_desc.clone(),
                ntp_addr: remote.ntp_addr.clone(),
            };
            (run_config(Mode::Remote, common, None, Some(remote)).await?, common)
        }
    };

    let registry = SchemeRegistry::new(&ctx.scheme_dir);
    let schemes = split_schemes(common.schemes.as_deref());
    Ok(Experiment::new(ctx, config, registry, schemes)?)
}

/// Resolves on SIGINT or SIGTERM
async fn shutdown_signal() -> anyhow::Result<&'static str> {
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    Ok(tokio::select! {
        _ = interrupt.recv() => "Received SIGINT",
        _ = terminate.recv() => "Received SIGTERM",
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    ProcessId::init_orchestrator();
    logging::init_tracing_with_level(Some(&args.log_level));

    match &args.command {
        Command::Setup { schemes } => {
            let scheme_dir = args.scheme_dir.clone().unwrap_or_else(|| args.base_dir.join("schemes"));
            let registry = SchemeRegistry::new(scheme_dir);
            setup_schemes(&registry, &split_schemes(Some(schemes))).await?;
            logging::log_success(ProcessId::current(), "Scheme setup finished");
        }
        Command::Annotate { name, run_id, section } => {
            let mut body = String::new();
            std::io::stdin().read_to_string(&mut body)?;
            StatsFile::for_run(&args.data_dir, name, *run_id).annotate(section, &body).await?;
        }
        Command::Test { mode } => {
            let mut experiment = build_experiment(&args, mode).await?;
            logging::log_startup(ProcessId::current(), "experiment");

            // Dropping the run tears down every process group it owns
            let finished = tokio::select! {
                report = experiment.run() => Some(report?),
                reason = shutdown_signal() => {
                    logging::log_shutdown(ProcessId::current(), reason?);
                    None
                }
            };
            let Some(report) = finished else {
                std::process::exit(1);
            };

            if !report.all_succeeded() {
                let failed = report.failures().count();
                process_error!(ProcessId::current(), "{} of {} runs failed", failed, report.runs.len());
                std::process::exit(1);
            }
            process_info!(ProcessId::current(), "All {} runs succeeded", report.runs.len());
        }
    }

    Ok(())
}
