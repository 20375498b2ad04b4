use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::state::Event;

/// Periodic `PollTick` source. At most one ticker runs at a time.
pub struct Poller {
    interval: Duration,
    handle: Option<JoinHandle<()>>,
    cancel_token: Option<CancellationToken>,
}

impl Poller {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            handle: None,
            cancel_token: None,
        }
    }

    pub fn is_armed(&self) -> bool {
        self.cancel_token.is_some()
    }

    /// Start ticking; the first tick fires one interval from now. Re-arming
    /// cancels the previous ticker first.
    pub fn arm(&mut self, sender: async_channel::Sender<Event>) {
        self.disarm();

        let cancel_token = CancellationToken::new();
        let token_clone = cancel_token.clone();
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token_clone.cancelled() => {
                        log::debug!("Poller shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        if sender.send(Event::PollTick).await.is_err() {
                            break;
                        }
                    }
                }
            }
        });

        log::info!("Polling armed every {}s", period.as_secs());
        self.handle = Some(handle);
        self.cancel_token = Some(cancel_token);
    }

    pub fn disarm(&mut self) {
        if let Some(token) = self.cancel_token.take() {
            token.cancel();
            log::info!("Polling disarmed");
        }
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.disarm();
    }
}
