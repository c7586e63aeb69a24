//! Log stream subscriber
//!
//! Subscribes once to the `server-log` channel for the whole supervisor
//! lifetime and forwards every line, in order, to the supervisor mailbox.
//! Dropping the subscription unsubscribes.

use tokio::sync::broadcast::error::RecvError;

use crate::events::{EventSender, SupervisorEvent};
use crate::logbus::LogBus;
use crate::task::TaskGuard;

pub struct LogSubscription {
    channel: String,
    _task: TaskGuard,
}

impl LogSubscription {
    pub fn subscribe(bus: &LogBus, channel: &str, events: EventSender) -> Self {
        let mut rx = bus.subscribe(channel);
        let name = channel.to_string();
        let task = TaskGuard::spawn(async move {
            loop {
                let event = match rx.recv().await {
                    Ok(line) => SupervisorEvent::LogLine(line),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(channel = %name, skipped, "Log subscriber lagged, lines lost");
                        SupervisorEvent::LogsSkipped(skipped)
                    }
                    Err(RecvError::Closed) => {
                        // Not re-established; the supervisor keeps running without logs.
                        tracing::warn!(channel = %name, "Log channel closed");
                        break;
                    }
                };
                if events.send(event).is_err() {
                    break;
                }
            }
        });
        tracing::debug!(channel, "Subscribed to log channel");

        Self {
            channel: channel.to_string(),
            _task: task,
        }
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }
}

impl Drop for LogSubscription {
    fn drop(&mut self) {
        tracing::debug!(channel = %self.channel, "Unsubscribed from log channel");
    }
}
