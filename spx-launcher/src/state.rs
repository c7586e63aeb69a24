//! Supervisor state and its transitions
//!
//! `SupervisorState` is the single source of truth for everything the
//! launcher reports. It is only mutated by the supervisor task, through the
//! transition methods below; each returns whether it was applied so stale
//! events (from a superseded generation) become no-ops.

use spx_core::{Identity, ReadinessState, RunState, StatusReport, VersionInfo};
use std::collections::VecDeque;

use crate::defaults::DEFAULT_CONTROL_PORT;

pub const MSG_STARTING: &str = "Server is starting up…";
pub const MSG_STOPPING: &str = "Stopping server…";
pub const MSG_READY: &str = "Server is running";
pub const MSG_EXHAUSTED: &str = "Failed to connect to server";
pub const MSG_IDLE: &str = "Ready to launch";

#[derive(Debug, Clone)]
pub struct SupervisorState {
    run_state: RunState,
    status_message: String,
    control_port: u16,
    port_resolved: bool,
    identity: Option<Identity>,
    uptime_secs: u64,
    readiness: ReadinessState,
    generation: u64,
    logs: VecDeque<String>,
    /// 0 = unbounded
    log_capacity: usize,
    logs_dropped: u64,
}

/// Point-in-time copy of the full state, logs included
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSnapshot {
    pub run_state: RunState,
    pub status_message: String,
    pub control_port: u16,
    pub port_resolved: bool,
    pub identity: Option<Identity>,
    pub uptime_secs: u64,
    pub readiness: ReadinessState,
    pub generation: u64,
    pub logs: Vec<String>,
    pub logs_dropped: u64,
}

impl SupervisorState {
    pub fn new(log_capacity: usize) -> Self {
        Self {
            run_state: RunState::Stopped,
            status_message: MSG_IDLE.to_string(),
            control_port: DEFAULT_CONTROL_PORT,
            port_resolved: false,
            identity: None,
            uptime_secs: 0,
            readiness: ReadinessState::Idle,
            generation: 0,
            logs: VecDeque::new(),
            log_capacity,
            logs_dropped: 0,
        }
    }

    pub fn run_state(&self) -> RunState {
        self.run_state
    }

    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    pub fn control_port(&self) -> u16 {
        self.control_port
    }

    pub fn port_resolved(&self) -> bool {
        self.port_resolved
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn uptime_secs(&self) -> u64 {
        self.uptime_secs
    }

    pub fn readiness(&self) -> ReadinessState {
        self.readiness
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn logs(&self) -> &VecDeque<String> {
        &self.logs
    }

    pub fn logs_dropped(&self) -> u64 {
        self.logs_dropped
    }

    /// Last `n` log lines, oldest first.
    pub fn logs_tail(&self, n: usize) -> Vec<String> {
        let skip = self.logs.len().saturating_sub(n);
        self.logs.iter().skip(skip).cloned().collect()
    }

    /// Record the resolved control port. Only the first resolution sticks.
    pub fn resolve_port(&mut self, port: u16) -> bool {
        if self.port_resolved {
            return false;
        }
        self.control_port = port;
        self.port_resolved = true;
        true
    }

    /// A start was requested. Opens a new generation and returns it.
    pub fn begin_start(&mut self) -> u64 {
        self.generation += 1;
        self.run_state = RunState::Starting;
        self.status_message = MSG_STARTING.to_string();
        self.identity = None;
        self.uptime_secs = 0;
        self.readiness = ReadinessState::Idle;
        self.generation
    }

    /// The start command returned successfully. The server stays `Starting`
    /// until readiness polling resolves.
    pub fn start_succeeded(&mut self, generation: u64, message: &str) -> bool {
        if generation != self.generation {
            return false;
        }
        self.status_message = message.to_string();
        true
    }

    pub fn start_failed(&mut self, generation: u64, cause: &str) -> bool {
        if generation != self.generation {
            return false;
        }
        self.status_message = format!("Error: {cause}");
        self.enter_stopped();
        true
    }

    /// A stop was requested. Opens a new generation so any in-flight probe,
    /// tick or start completion of the previous one is ignored.
    pub fn begin_stop(&mut self) -> u64 {
        self.generation += 1;
        self.status_message = MSG_STOPPING.to_string();
        self.readiness = ReadinessState::Idle;
        self.generation
    }

    /// The stop command finished. Success or not, the server is treated as
    /// stopped.
    pub fn stop_finished(&mut self, generation: u64, outcome: Result<&str, &str>) -> bool {
        if generation != self.generation {
            return false;
        }
        self.status_message = match outcome {
            Ok(message) => message.to_string(),
            Err(cause) => format!("Error: {cause}"),
        };
        self.enter_stopped();
        true
    }

    pub fn probe_attempt(&mut self, generation: u64, attempt: u32) -> bool {
        if generation != self.generation || self.run_state != RunState::Starting {
            return false;
        }
        self.readiness = ReadinessState::Probing { attempt };
        true
    }

    /// First successful probe. Returns true when this moved the server into
    /// `Running` (the caller starts the uptime clock).
    pub fn probe_succeeded(&mut self, generation: u64, info: &VersionInfo) -> bool {
        if generation != self.generation || self.run_state == RunState::Stopped {
            return false;
        }
        self.identity
            .get_or_insert_with(Identity::default)
            .merge(info);
        self.readiness = ReadinessState::Ready;
        self.status_message = MSG_READY.to_string();
        self.enter_running()
    }

    /// Retry budget spent. The process may still be alive, so this only
    /// reports; it never forces `Stopped`.
    pub fn probe_exhausted(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.run_state == RunState::Stopped {
            return false;
        }
        self.readiness = ReadinessState::Exhausted;
        self.status_message = MSG_EXHAUSTED.to_string();
        self.enter_running()
    }

    pub fn tick(&mut self, generation: u64) -> bool {
        if generation != self.generation || self.run_state != RunState::Running {
            return false;
        }
        self.uptime_secs += 1;
        true
    }

    pub fn append_log(&mut self, line: String) {
        if self.log_capacity > 0 && self.logs.len() >= self.log_capacity {
            self.logs.pop_front();
            self.logs_dropped += 1;
        }
        self.logs.push_back(line);
    }

    pub fn record_skipped_logs(&mut self, skipped: u64) {
        self.logs_dropped += skipped;
    }

    fn enter_running(&mut self) -> bool {
        if self.run_state == RunState::Running {
            return false;
        }
        self.run_state = RunState::Running;
        self.uptime_secs = 0;
        true
    }

    fn enter_stopped(&mut self) {
        self.run_state = RunState::Stopped;
        self.identity = None;
        self.uptime_secs = 0;
        self.readiness = ReadinessState::Idle;
    }

    pub fn report(&self) -> StatusReport {
        StatusReport {
            run_state: self.run_state,
            status_message: self.status_message.clone(),
            control_port: self.control_port,
            port_resolved: self.port_resolved,
            identity: self.identity.clone(),
            uptime_secs: self.uptime_secs,
            readiness: self.readiness,
            generation: self.generation,
            log_lines: self.logs.len(),
            logs_dropped: self.logs_dropped,
        }
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            run_state: self.run_state,
            status_message: self.status_message.clone(),
            control_port: self.control_port,
            port_resolved: self.port_resolved,
            identity: self.identity.clone(),
            uptime_secs: self.uptime_secs,
            readiness: self.readiness,
            generation: self.generation,
            logs: self.logs.iter().cloned().collect(),
            logs_dropped: self.logs_dropped,
        }
    }
}

impl Default for SupervisorState {
    fn default() -> Self {
        Self::new(crate::defaults::DEFAULT_LOG_CAPACITY)
    }
}
