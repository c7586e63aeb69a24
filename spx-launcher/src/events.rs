//! Messages posted to the supervisor's event mailbox by its background tasks

use spx_core::VersionInfo;
use tokio::sync::{mpsc, oneshot};

use crate::process::HostError;
use crate::supervisor::SupervisorError;

/// Where the outcome of a start/stop command is delivered to its caller
pub type Reply = oneshot::Sender<Result<String, SupervisorError>>;

pub type EventSender = mpsc::UnboundedSender<SupervisorEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SupervisorEvent>;

/// Everything except `LogLine`/`LogsSkipped` is tagged with the generation
/// that produced it; the supervisor drops events from superseded generations.
#[derive(Debug)]
pub enum SupervisorEvent {
    StartCompleted {
        generation: u64,
        result: Result<String, HostError>,
        reply: Reply,
    },
    StopCompleted {
        generation: u64,
        result: Result<String, HostError>,
        reply: Reply,
    },
    ProbeAttempt {
        generation: u64,
        attempt: u32,
    },
    ProbeSucceeded {
        generation: u64,
        attempt: u32,
        info: VersionInfo,
    },
    ProbeExhausted {
        generation: u64,
        attempts: u32,
    },
    Tick {
        generation: u64,
    },
    LogLine(String),
    /// The log subscription fell behind and lost this many lines
    LogsSkipped(u64),
}
