//! Main entry point for the tunnel-manager binary
//!
//! Standard input carries commands, standard output carries replies and
//! diagnostics go to standard error.

use std::path::PathBuf;

use clap::Parser;
use tokio::io::BufReader;
use tokio::signal::unix::{signal, SignalKind};

use shared::{logging, process_error, ProcessId};
use tunnel_manager::{ExitReason, ManagerContext, TunnelManager};

/// Runs tunnel clients/servers on behalf of the experiment orchestrator
#[derive(Parser)]
#[command(name = "tunnel-manager")]
#[command(about = "Multiplexes tunnel endpoint processes behind a line-based command channel")]
pub struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Directory containing mm-tunnelclient and mm-tunnelserver (defaults to PATH lookup)
    #[arg(long)]
    pub tool_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    ProcessId::init_tunnel_manager();
    logging::init_tracing_with_level(Some(&args.log_level));

    // Register before announcing readiness so no signal slips through
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let shutdown = async move {
        tokio::select! {
            _ = interrupt.recv() => {}
            _ = terminate.recv() => {}
        }
    };

    let mut manager = TunnelManager::new(ManagerContext { tool_dir: args.tool_dir });
    let result = manager
        .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout(), shutdown)
        .await;

    // The blocking stdin reader cannot be cancelled, so leave via exit()
    // rather than waiting for the runtime to shut down.
    let code = match result {
        Ok(ExitReason::Halted) | Ok(ExitReason::InputClosed) => 0,
        Ok(ExitReason::Signalled) => {
            logging::log_shutdown(ProcessId::current(), "caught signal and cleaned up");
            1
        }
        Err(e) => {
            process_error!(ProcessId::current(), "command channel failed: {}", e);
            2
        }
    };
    drop(manager);
    std::process::exit(code);
}
