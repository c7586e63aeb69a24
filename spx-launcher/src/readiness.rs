//! Readiness poller - confirms the server answers on its status endpoint
//!
//! After a successful start the poller probes
//! `http://localhost:<port>/api/v1/version` up to `max_attempts` times with
//! a fixed delay between attempts. Each poll run belongs to one generation
//! and reports back through the supervisor mailbox; cancelling aborts the
//! task so no further probes are sent.

use async_trait::async_trait;
use spx_core::VersionInfo;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::defaults::{PROBE_TIMEOUT, READINESS_MAX_ATTEMPTS, READINESS_RETRY_DELAY, STATUS_PATH};
use crate::events::{EventSender, SupervisorEvent};
use crate::task::TaskGuard;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("status request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("status endpoint returned HTTP {0}")]
    Status(u16),

    #[error("malformed status body: {0}")]
    Body(#[from] serde_json::Error),

    #[error("no answer within {0:?}")]
    Timeout(Duration),
}

/// One readiness probe against the server's status endpoint
#[async_trait]
pub trait StatusProbe: Send + Sync + 'static {
    async fn probe(&self, port: u16) -> Result<VersionInfo, ProbeError>;
}

/// Probes the status endpoint over HTTP
pub struct HttpStatusProbe {
    client: reqwest::Client,
    host: String,
}

impl HttpStatusProbe {
    pub fn new(timeout: Duration) -> Result<Self, ProbeError> {
        let client = reqwest::Client::builder()
            .no_proxy()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            client,
            host: "localhost".to_string(),
        })
    }

    /// Probe a host other than `localhost`.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    pub fn url(&self, port: u16) -> String {
        format!("http://{}:{}{}", self.host, port, STATUS_PATH)
    }
}

#[async_trait]
impl StatusProbe for HttpStatusProbe {
    async fn probe(&self, port: u16) -> Result<VersionInfo, ProbeError> {
        let resp = self.client.get(self.url(port)).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }
        let body = resp.bytes().await?;
        Ok(serde_json::from_slice(&body)?)
    }
}

#[derive(Debug, Clone)]
pub struct ReadinessConfig {
    pub max_attempts: u32,
    /// Fixed delay between a failed probe and the next one
    pub retry_delay: Duration,
    pub probe_timeout: Duration,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            max_attempts: READINESS_MAX_ATTEMPTS,
            retry_delay: READINESS_RETRY_DELAY,
            probe_timeout: PROBE_TIMEOUT,
        }
    }
}

/// Owns the (at most one) active poll loop
pub struct ReadinessPoller {
    config: ReadinessConfig,
    probe: Arc<dyn StatusProbe>,
    active: Option<(u64, TaskGuard)>,
}

impl ReadinessPoller {
    pub fn new(config: ReadinessConfig, probe: Arc<dyn StatusProbe>) -> Self {
        Self {
            config,
            probe,
            active: None,
        }
    }

    /// Start polling for `generation`, cancelling any previous loop.
    pub fn start(&mut self, generation: u64, port: u16, events: EventSender) {
        self.cancel();
        tracing::debug!(generation, port, "Starting readiness polling");
        let task = TaskGuard::spawn(poll(
            generation,
            port,
            self.probe.clone(),
            self.config.clone(),
            events,
        ));
        self.active = Some((generation, task));
    }

    pub fn cancel(&mut self) {
        if let Some((generation, _task)) = self.active.take() {
            tracing::debug!(generation, "Readiness polling cancelled");
        }
    }

    /// Generation of the loop that is still probing, if any
    pub fn active_generation(&self) -> Option<u64> {
        match &self.active {
            Some((generation, task)) if !task.is_finished() => Some(*generation),
            _ => None,
        }
    }
}

async fn poll(
    generation: u64,
    port: u16,
    probe: Arc<dyn StatusProbe>,
    config: ReadinessConfig,
    events: EventSender,
) {
    for attempt in 1..=config.max_attempts {
        if events
            .send(SupervisorEvent::ProbeAttempt {
                generation,
                attempt,
            })
            .is_err()
        {
            return;
        }

        let outcome = tokio::time::timeout(config.probe_timeout, probe.probe(port))
            .await
            .unwrap_or(Err(ProbeError::Timeout(config.probe_timeout)));
        match outcome {
            Ok(info) => {
                tracing::info!(generation, attempt, version = ?info.version, "Server is ready");
                let _ = events.send(SupervisorEvent::ProbeSucceeded {
                    generation,
                    attempt,
                    info,
                });
                return;
            }
            Err(e) => {
                tracing::debug!(generation, attempt, port, error = %e, "Readiness probe failed");
            }
        }

        if attempt < config.max_attempts {
            tokio::time::sleep(config.retry_delay).await;
        }
    }

    tracing::warn!(
        generation,
        attempts = config.max_attempts,
        port,
        "Server never answered its status endpoint"
    );
    let _ = events.send(SupervisorEvent::ProbeExhausted {
        generation,
        attempts: config.max_attempts,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use tokio::sync::mpsc;
    use tokio::time::Instant;

    /// Fails the first `fail_first` probes, then answers with `info`.
    struct ScriptedProbe {
        fail_first: u32,
        info: VersionInfo,
        calls: Mutex<Vec<Instant>>,
    }

    impl ScriptedProbe {
        fn new(fail_first: u32) -> Arc<Self> {
            Arc::new(Self {
                fail_first,
                info: VersionInfo {
                    version: Some("2.1.0".to_string()),
                    ..Default::default()
                },
                calls: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Instant> {
            self.calls.lock().clone()
        }
    }

    #[async_trait]
    impl StatusProbe for ScriptedProbe {
        async fn probe(&self, _port: u16) -> Result<VersionInfo, ProbeError> {
            let n = {
                let mut calls = self.calls.lock();
                calls.push(Instant::now());
                calls.len() as u32
            };
            if n <= self.fail_first {
                Err(ProbeError::Status(503))
            } else {
                Ok(self.info.clone())
            }
        }
    }

    async fn next_terminal(rx: &mut mpsc::UnboundedReceiver<SupervisorEvent>) -> SupervisorEvent {
        loop {
            match rx.recv().await.expect("poller hung up") {
                SupervisorEvent::ProbeAttempt { .. } => continue,
                other => return other,
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_exactly_max_attempts_spaced_by_delay() {
        let probe = ScriptedProbe::new(u32::MAX);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut poller = ReadinessPoller::new(ReadinessConfig::default(), probe.clone());
        poller.start(1, 5660, tx);

        match next_terminal(&mut rx).await {
            SupervisorEvent::ProbeExhausted {
                generation,
                attempts,
            } => {
                assert_eq!(generation, 1);
                assert_eq!(attempts, 10);
            }
            other => panic!("expected exhaustion, got {other:?}"),
        }

        tokio::time::sleep(Duration::from_secs(30)).await;
        let calls = probe.calls();
        assert_eq!(calls.len(), 10);
        for pair in calls.windows(2) {
            assert_eq!(pair[1] - pair[0], Duration::from_secs(1));
        }
        assert_eq!(poller.active_generation(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn stops_probing_after_first_success() {
        let probe = ScriptedProbe::new(2);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut poller = ReadinessPoller::new(ReadinessConfig::default(), probe.clone());
        poller.start(4, 5660, tx);

        match next_terminal(&mut rx).await {
            SupervisorEvent::ProbeSucceeded {
                generation,
                attempt,
                info,
            } => {
                assert_eq!(generation, 4);
                assert_eq!(attempt, 3);
                assert_eq!(info.version.as_deref(), Some("2.1.0"));
            }
            other => panic!("expected success, got {other:?}"),
        }

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(probe.calls().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_prevents_further_probes() {
        let probe = ScriptedProbe::new(u32::MAX);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut poller = ReadinessPoller::new(ReadinessConfig::default(), probe.clone());
        poller.start(1, 5660, tx);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert_eq!(probe.calls().len(), 3);
        poller.cancel();

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(probe.calls().len(), 3);
        while let Ok(event) = rx.try_recv() {
            assert!(matches!(event, SupervisorEvent::ProbeAttempt { .. }));
        }
    }

    #[tokio::test(start_paused = true)]
    async fn restarting_replaces_previous_loop() {
        let probe = ScriptedProbe::new(u32::MAX);
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut poller = ReadinessPoller::new(ReadinessConfig::default(), probe.clone());
        poller.start(1, 5660, tx.clone());
        tokio::time::sleep(Duration::from_millis(500)).await;
        poller.start(2, 5660, tx);

        assert_eq!(poller.active_generation(), Some(2));
        tokio::time::sleep(Duration::from_secs(60)).await;
        // one probe from generation 1, ten from generation 2
        assert_eq!(probe.calls().len(), 11);
    }

    struct HangingProbe;

    #[async_trait]
    impl StatusProbe for HangingProbe {
        async fn probe(&self, _port: u16) -> Result<VersionInfo, ProbeError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Err(ProbeError::Status(504))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_probe_counts_as_failed_attempt() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut poller = ReadinessPoller::new(ReadinessConfig::default(), Arc::new(HangingProbe));
        let started = Instant::now();
        poller.start(1, 5660, tx);

        assert!(matches!(
            next_terminal(&mut rx).await,
            SupervisorEvent::ProbeExhausted { attempts: 10, .. }
        ));
        // ten 2s timeouts plus nine 1s gaps
        assert_eq!(started.elapsed(), Duration::from_secs(29));
    }

    #[test]
    fn http_probe_targets_version_endpoint() {
        let probe = HttpStatusProbe::new(PROBE_TIMEOUT).unwrap();
        assert_eq!(probe.url(5660), "http://localhost:5660/api/v1/version");
        let probe = probe.with_host("127.0.0.1");
        assert_eq!(probe.url(7001), "http://127.0.0.1:7001/api/v1/version");
    }
}
