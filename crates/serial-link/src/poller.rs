//! Background polling task

use std::future::Future;
use std::time::Duration;

use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// How long `stop` waits for the polling task before abandoning it
const STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Runs a poll function periodically until stopped
pub struct Poller {
    name: &'static str,
    handle: Mutex<Option<JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
}

impl Poller {
    pub fn new(name: &'static str) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            name,
            handle: Mutex::new(None),
            shutdown_tx,
        }
    }

    /// Start calling `tick` every `period`.
    ///
    /// The first call happens one full period after start. A running task is
    /// stopped first.
    pub async fn start<F, Fut>(&self, period: Duration, mut tick: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.stop().await;
        self.shutdown_tx.send_replace(false);
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let name = self.name;

        let handle = tokio::spawn(async move {
            let mut poll_interval = interval_at(Instant::now() + period, period);
            poll_interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = poll_interval.tick() => {}
                    _ = shutdown_rx.changed() => {
                        debug!("{} polling stopped: shutdown signal received", name);
                        break;
                    }
                }
                tick().await;
            }
        });

        *self.handle.lock().await = Some(handle);
        debug!("{} polling started every {:?}", self.name, period);
    }

    /// Signal the task to stop and wait for it to finish
    pub async fn stop(&self) {
        let mut handle = self.handle.lock().await;
        if let Some(h) = handle.take() {
            self.shutdown_tx.send_replace(true);
            match tokio::time::timeout(STOP_TIMEOUT, h).await {
                Ok(_) => debug!("{} polling task stopped gracefully", self.name),
                Err(_) => {
                    warn!(
                        "{} polling task did not stop within {:?}, it will be dropped",
                        self.name, STOP_TIMEOUT
                    );
                }
            }
        }
    }

    pub async fn is_running(&self) -> bool {
        self.handle
            .lock()
            .await
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
