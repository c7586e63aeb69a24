//! SPX Launcher - process-lifecycle supervisor for a locally hosted SPX server
//!
//! The supervisor launches and kills `spx-server`, confirms readiness by
//! polling its status endpoint, tracks uptime and collects the server's
//! output. A control socket exposes all of it to the `spx-launcher` CLI.

pub mod config;
pub mod control;
pub mod daemon;
pub mod defaults;
pub mod desktop;
pub mod events;
pub mod log_stream;
pub mod logbus;
pub mod paths;
pub mod port;
pub mod process;
pub mod readiness;
pub mod state;
pub mod supervisor;
pub mod task;
pub mod uptime;

pub use supervisor::{Supervisor, SupervisorConfig, SupervisorError, SupervisorHandle};
