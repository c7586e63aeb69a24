//! Uptime clock - one tick per second while the server is running

use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

use crate::events::{EventSender, SupervisorEvent};
use crate::task::TaskGuard;

pub struct UptimeClock {
    period: Duration,
    ticker: Option<TaskGuard>,
}

impl UptimeClock {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            ticker: None,
        }
    }

    /// Begin ticking for `generation`. Any previous ticker is stopped first so
    /// at most one is ever active.
    pub fn start(&mut self, generation: u64, events: EventSender) {
        self.stop();
        let period = self.period;
        self.ticker = Some(TaskGuard::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if events.send(SupervisorEvent::Tick { generation }).is_err() {
                    break;
                }
            }
        }));
    }

    pub fn stop(&mut self) {
        self.ticker = None;
    }

    pub fn is_running(&self) -> bool {
        self.ticker.is_some()
    }
}

impl Default for UptimeClock {
    fn default() -> Self {
        Self::new(crate::defaults::UPTIME_TICK)
    }
}
