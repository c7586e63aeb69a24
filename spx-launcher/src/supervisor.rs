//! Supervisor - owns the launcher state and orchestrates start/stop
//!
//! The supervisor runs as a single task. Callers talk to it through a
//! cloneable `SupervisorHandle`; background work (host commands, readiness
//! probes, uptime ticks, log lines) reports back through an event mailbox.
//! Every mutation happens inside `watch::Sender::send_modify`, so readers of
//! the status channel only ever see whole transitions.

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};

use crate::defaults::{DEFAULT_LOG_CAPACITY, SERVER_LOG_CHANNEL, UPTIME_TICK};
use crate::events::{EventReceiver, EventSender, Reply, SupervisorEvent};
use crate::log_stream::LogSubscription;
use crate::logbus::LogBus;
use crate::port::PortResolver;
use crate::process::{HostError, ProcessHost};
use crate::readiness::{ReadinessConfig, ReadinessPoller, StatusProbe};
use crate::state::{StatusSnapshot, SupervisorState};
use crate::uptime::UptimeClock;

#[derive(Debug, Error)]
pub enum SupervisorError {
    #[error(transparent)]
    Host(#[from] HostError),

    #[error("supervisor is not running")]
    Closed,
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub readiness: ReadinessConfig,
    pub uptime_tick: Duration,
    /// Retained log lines (0 = unbounded)
    pub log_capacity: usize,
    pub log_channel: String,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            readiness: ReadinessConfig::default(),
            uptime_tick: UPTIME_TICK,
            log_capacity: DEFAULT_LOG_CAPACITY,
            log_channel: SERVER_LOG_CHANNEL.to_string(),
        }
    }
}

enum Request {
    Start { reply: Reply },
    Stop { reply: Reply },
    Shutdown { done: oneshot::Sender<()> },
}

/// Cloneable client side of the supervisor
#[derive(Clone)]
pub struct SupervisorHandle {
    requests: mpsc::Sender<Request>,
    status: watch::Receiver<SupervisorState>,
}

impl SupervisorHandle {
    /// Launch the server. Resolves once the start command itself completes;
    /// readiness is reported later through the status channel.
    pub async fn start(&self) -> Result<String, SupervisorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Start { reply }).await?;
        rx.await.map_err(|_| SupervisorError::Closed)?
    }

    pub async fn stop(&self) -> Result<String, SupervisorError> {
        let (reply, rx) = oneshot::channel();
        self.send(Request::Stop { reply }).await?;
        rx.await.map_err(|_| SupervisorError::Closed)?
    }

    /// Tear the supervisor down: cancels polling and the uptime clock and
    /// drops the log subscription. The server process itself is left to its
    /// host.
    pub async fn shutdown(&self) {
        let (done, rx) = oneshot::channel();
        if self.send(Request::Shutdown { done }).await.is_ok() {
            let _ = rx.await;
        }
    }

    async fn send(&self, request: Request) -> Result<(), SupervisorError> {
        self.requests
            .send(request)
            .await
            .map_err(|_| SupervisorError::Closed)
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.status.borrow().snapshot()
    }

    pub fn report(&self) -> spx_core::StatusReport {
        self.status.borrow().report()
    }

    pub fn logs_tail(&self, n: usize) -> Vec<String> {
        self.status.borrow().logs_tail(n)
    }

    pub fn control_port(&self) -> u16 {
        self.status.borrow().control_port()
    }

    /// Receiver that is notified after every applied transition
    pub fn subscribe(&self) -> watch::Receiver<SupervisorState> {
        self.status.clone()
    }

    /// Wait until `predicate` holds for the current state.
    pub async fn wait_until<F>(&self, mut predicate: F) -> Result<StatusSnapshot, SupervisorError>
    where
        F: FnMut(&SupervisorState) -> bool,
    {
        let mut rx = self.status.clone();
        let state = rx
            .wait_for(|state| predicate(state))
            .await
            .map_err(|_| SupervisorError::Closed)?;
        Ok(state.snapshot())
    }
}

pub struct Supervisor {
    status: watch::Sender<SupervisorState>,
    host: Arc<dyn ProcessHost>,
    poller: ReadinessPoller,
    clock: UptimeClock,
    events: EventSender,
    _logs: LogSubscription,
}

impl Supervisor {
    /// Build the supervisor and run it on the current tokio runtime.
    ///
    /// The control port is resolved here, once; the log channel is
    /// subscribed here and stays subscribed until the supervisor exits.
    pub fn spawn(
        config: SupervisorConfig,
        host: Arc<dyn ProcessHost>,
        probe: Arc<dyn StatusProbe>,
        port: PortResolver,
        bus: &LogBus,
    ) -> SupervisorHandle {
        let mut state = SupervisorState::new(config.log_capacity);
        if let Some(port) = port.resolve() {
            state.resolve_port(port);
        }
        tracing::info!(port = state.control_port(), "Supervisor starting");

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (requests_tx, requests_rx) = mpsc::channel(32);
        let (status_tx, status_rx) = watch::channel(state);

        let logs = LogSubscription::subscribe(bus, &config.log_channel, events_tx.clone());

        let supervisor = Supervisor {
            status: status_tx,
            host,
            poller: ReadinessPoller::new(config.readiness, probe),
            clock: UptimeClock::new(config.uptime_tick),
            events: events_tx,
            _logs: logs,
        };
        tokio::spawn(supervisor.run(requests_rx, events_rx));

        SupervisorHandle {
            requests: requests_tx,
            status: status_rx,
        }
    }

    async fn run(mut self, mut requests: mpsc::Receiver<Request>, mut events: EventReceiver) {
        loop {
            tokio::select! {
                request = requests.recv() => match request {
                    Some(Request::Start { reply }) => self.begin_start(reply),
                    Some(Request::Stop { reply }) => self.begin_stop(reply),
                    Some(Request::Shutdown { done }) => {
                        self.teardown();
                        let _ = done.send(());
                        return;
                    }
                    None => break,
                },
                Some(event) = events.recv() => self.apply(event),
            }
        }
        self.teardown();
    }

    /// Apply `f` to the state as one atomic update and return its result.
    fn update<R: Default>(&self, f: impl FnOnce(&mut SupervisorState) -> R) -> R {
        let mut out = R::default();
        self.status.send_modify(|state| out = f(state));
        out
    }

    fn begin_start(&mut self, reply: Reply) {
        self.poller.cancel();
        self.clock.stop();
        let generation = self.update(SupervisorState::begin_start);
        tracing::info!(generation, "Starting server");

        let host = self.host.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = host.start().await;
            let _ = events.send(SupervisorEvent::StartCompleted {
                generation,
                result,
                reply,
            });
        });
    }

    fn begin_stop(&mut self, reply: Reply) {
        self.poller.cancel();
        self.clock.stop();
        let generation = self.update(SupervisorState::begin_stop);
        tracing::info!(generation, "Stopping server");

        let host = self.host.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            let result = host.stop().await;
            let _ = events.send(SupervisorEvent::StopCompleted {
                generation,
                result,
                reply,
            });
        });
    }

    fn apply(&mut self, event: SupervisorEvent) {
        match event {
            SupervisorEvent::StartCompleted {
                generation,
                result,
                reply,
            } => {
                let outcome = match result {
                    Ok(message) => {
                        if self.update(|s| s.start_succeeded(generation, &message)) {
                            let port = self.status.borrow().control_port();
                            self.poller.start(generation, port, self.events.clone());
                        } else {
                            tracing::debug!(generation, "Ignoring superseded start completion");
                        }
                        Ok(message)
                    }
                    Err(e) => {
                        tracing::error!(generation, error = %e, "Server failed to start");
                        self.update(|s| s.start_failed(generation, &e.to_string()));
                        Err(SupervisorError::Host(e))
                    }
                };
                let _ = reply.send(outcome);
            }
            SupervisorEvent::StopCompleted {
                generation,
                result,
                reply,
            } => {
                let outcome = match result {
                    Ok(message) => {
                        self.update(|s| s.stop_finished(generation, Ok(&message)));
                        Ok(message)
                    }
                    Err(e) => {
                        tracing::error!(generation, error = %e, "Server failed to stop");
                        self.update(|s| s.stop_finished(generation, Err(&e.to_string())));
                        Err(SupervisorError::Host(e))
                    }
                };
                let _ = reply.send(outcome);
            }
            SupervisorEvent::ProbeAttempt {
                generation,
                attempt,
            } => {
                self.update(|s| s.probe_attempt(generation, attempt));
            }
            SupervisorEvent::ProbeSucceeded {
                generation,
                attempt,
                info,
            } => {
                if self.update(|s| s.probe_succeeded(generation, &info)) {
                    tracing::info!(generation, attempt, "Server running");
                    self.clock.start(generation, self.events.clone());
                }
            }
            SupervisorEvent::ProbeExhausted {
                generation,
                attempts,
            } => {
                if self.update(|s| s.probe_exhausted(generation)) {
                    tracing::warn!(generation, attempts, "Server unreachable, reporting it as running");
                    self.clock.start(generation, self.events.clone());
                }
            }
            SupervisorEvent::Tick { generation } => {
                self.update(|s| s.tick(generation));
            }
            SupervisorEvent::LogLine(line) => {
                self.update(|s| s.append_log(line));
            }
            SupervisorEvent::LogsSkipped(skipped) => {
                self.update(|s| s.record_skipped_logs(skipped));
            }
        }
    }

    fn teardown(&mut self) {
        self.poller.cancel();
        self.clock.stop();
        tracing::info!("Supervisor stopped");
    }
}
