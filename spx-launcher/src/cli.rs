use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use spx_core::Command;
use spx_launcher::config::LauncherConfig;
use spx_launcher::daemon::{self, DaemonOptions};

use crate::client;

/// SPX Launcher - start, stop and monitor a local SPX server
#[derive(Parser)]
#[command(name = "spx-launcher")]
#[command(version)]
#[command(about = "SPX Launcher - start, stop and monitor a local SPX server")]
pub struct Cli {
    /// Control socket path
    #[arg(long, global = true, env = "SPX_LAUNCHER_SOCKET")]
    pub socket: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the supervisor daemon
    Run(RunArgs),

    /// Launch the SPX server
    Start,

    /// Stop the SPX server
    Stop,

    /// Show server status
    Status {
        /// Print the raw JSON report
        #[arg(long)]
        json: bool,
    },

    /// Print the control port
    Port,

    /// Print captured server output
    Logs {
        /// Only the last N lines
        #[arg(long)]
        tail: Option<usize>,
    },

    /// Open the server's log folder
    OpenLogs,

    /// Open the help page in a browser
    OpenHelp,

    /// Open the support page in a browser
    OpenSupport,

    /// Stop the server and exit the daemon
    Shutdown,

    /// Remember where spx-server lives (saved as spxPath in the launcher config)
    SetServerPath {
        /// The spx-server binary, or the folder containing it
        path: PathBuf,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Control port of the SPX server (default: 5660)
    pub port: Option<String>,

    /// Path to spx-server, or the folder containing it
    #[arg(long)]
    pub server_path: Option<PathBuf>,

    /// Captured log lines to keep (0 = unbounded)
    #[arg(long)]
    pub log_capacity: Option<usize>,

    /// Launch the server immediately
    #[arg(long)]
    pub start: bool,
}

impl Cli {
    pub fn run(self) -> Result<(), Box<dyn std::error::Error>> {
        let socket = self
            .socket
            .unwrap_or_else(spx_launcher::paths::default_socket_path);
        let rt = tokio::runtime::Runtime::new()?;

        match self.command {
            Commands::Run(args) => {
                tracing::info!("SPX Launcher v{}", env!("CARGO_PKG_VERSION"));
                tracing::info!("Socket: {}", socket.display());
                rt.block_on(daemon::run(DaemonOptions {
                    socket,
                    port: args.port,
                    server_path: args.server_path,
                    log_capacity: args.log_capacity,
                    start: args.start,
                    config_file: None,
                }))?;
                Ok(())
            }
            Commands::Start => rt.block_on(client::print_message(&socket, Command::Start)),
            Commands::Stop => rt.block_on(client::print_message(&socket, Command::Stop)),
            Commands::Port => rt.block_on(client::print_message(&socket, Command::GetPort)),
            Commands::Status { json } => rt.block_on(client::status(&socket, json)),
            Commands::Logs { tail } => rt.block_on(client::logs(&socket, tail)),
            Commands::OpenLogs => {
                rt.block_on(client::print_message(&socket, Command::OpenLogsFolder))
            }
            Commands::Shutdown => rt.block_on(client::print_message(&socket, Command::Shutdown)),
            Commands::OpenHelp => {
                let config = LauncherConfig::load()?;
                rt.block_on(client::open_url(config.help_url()))
            }
            Commands::OpenSupport => {
                let config = LauncherConfig::load()?;
                rt.block_on(client::open_url(config.support_url()))
            }
            Commands::SetServerPath { path } => client::set_server_path(&path),
        }
    }
}
