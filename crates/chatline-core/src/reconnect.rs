//! Reconnect policy
//!
//! After a transport loss a single timer is armed. When it fires it posts a
//! [`Signal::ReconnectDue`] back into the session queue; the session decides
//! there whether the attempt is still wanted. Retries never give up on
//! their own, only [`ReconnectPolicy::cancel`] stops them.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::transport::Signal;

pub struct ReconnectPolicy {
    delay: Duration,
    attempts: u32,
    pending: Option<JoinHandle<()>>,
}

impl ReconnectPolicy {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            attempts: 0,
            pending: None,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Attempts made since the last successful connect
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Whether a timer is armed and has not fired yet
    pub fn is_pending(&self) -> bool {
        self.pending
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }

    /// Arm the timer for `generation`. No-op if one is already armed.
    pub fn schedule(&mut self, generation: u64, tx: &mpsc::UnboundedSender<Signal>) -> bool {
        if self.is_pending() {
            return false;
        }

        let delay = self.delay;
        let tx = tx.clone();
        debug!(generation, ?delay, "Scheduling reconnect");
        self.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(Signal::ReconnectDue { generation });
        }));
        true
    }

    /// Record that the timer fired and an attempt is being made
    pub fn begin_attempt(&mut self) -> u32 {
        self.pending = None;
        self.attempts = self.attempts.saturating_add(1);
        self.attempts
    }

    /// Abort any armed timer
    pub fn cancel(&mut self) {
        if let Some(handle) = self.pending.take() {
            handle.abort();
            debug!("Cancelled pending reconnect");
        }
    }

    /// Forget the attempt count after a successful connect
    pub fn reset(&mut self) {
        self.cancel();
        self.attempts = 0;
    }
}

impl Drop for ReconnectPolicy {
    fn drop(&mut self) {
        self.cancel();
    }
}
