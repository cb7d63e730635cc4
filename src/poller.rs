//! A background poller thread that periodically reconciles the replica with the control plane.
//!
//! Polling is the correctness backstop of synchronization: notifications may be lost, polling
//! eventually catches up anyway.
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        mpsc::{self, RecvTimeoutError},
        Arc,
    },
    time::Duration,
};

use rand::{thread_rng, Rng};

use crate::{readiness::ReadinessGate, synchronizer::Synchronizer, Error, Result};

/// Configuration for [`PollerThread`].
// Not implementing `Copy` as we may add non-copyable fields in the future.
#[derive(Debug, Clone)]
pub struct PollerConfig {
    /// Interval to wait between polls.
    ///
    /// Defaults to [`PollerConfig::DEFAULT_POLL_INTERVAL`].
    pub interval: Duration,
    /// Jitter applies a randomized duration to wait between polls. This helps to avoid multiple
    /// server instances synchronizing and producing spiky network load.
    ///
    /// Defaults to [`PollerConfig::DEFAULT_POLL_JITTER`].
    pub jitter: Duration,
    /// Ceiling for the wait after consecutive failures. Each failure doubles the wait.
    ///
    /// Defaults to [`PollerConfig::DEFAULT_MAX_BACKOFF`].
    pub max_backoff: Duration,
}

impl PollerConfig {
    /// Default value for [`PollerConfig::interval`].
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);
    /// Default value for [`PollerConfig::jitter`].
    pub const DEFAULT_POLL_JITTER: Duration = Duration::from_secs(6);
    /// Default value for [`PollerConfig::max_backoff`].
    pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5 * 60);

    /// Create a new `PollerConfig` using default configuration.
    pub fn new() -> PollerConfig {
        PollerConfig::default()
    }

    /// Update poll interval with `interval`.
    pub fn with_interval(mut self, interval: Duration) -> PollerConfig {
        self.interval = interval;
        self
    }

    /// Update poll interval jitter with `jitter`.
    pub fn with_jitter(mut self, jitter: Duration) -> PollerConfig {
        self.jitter = jitter;
        self
    }

    /// Update the backoff ceiling with `max_backoff`.
    pub fn with_max_backoff(mut self, max_backoff: Duration) -> PollerConfig {
        self.max_backoff = max_backoff;
        self
    }
}

impl Default for PollerConfig {
    fn default() -> PollerConfig {
        PollerConfig {
            interval: PollerConfig::DEFAULT_POLL_INTERVAL,
            jitter: PollerConfig::DEFAULT_POLL_JITTER,
            max_backoff: PollerConfig::DEFAULT_MAX_BACKOFF,
        }
    }
}

/// The synchronization poller thread.
///
/// Every tick synchronizes all flags, then every segment referenced by a flag. The readiness gate
/// is flipped after the first fully successful tick.
pub struct PollerThread {
    join_handle: std::thread::JoinHandle<()>,

    /// Used to send a stop command to the poller thread.
    stop_sender: mpsc::SyncSender<()>,
}

impl PollerThread {
    /// Starts the poller thread.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the thread cannot be spawned.
    pub fn start(
        synchronizer: Arc<Synchronizer>,
        gate: Arc<ReadinessGate>,
        config: PollerConfig,
    ) -> std::io::Result<PollerThread> {
        // Using `sync_channel` here as it makes `stop_sender` `Sync` (shareable between
        // threads). A buffer of 1 is enough: a second stop command can be dropped.
        let (stop_sender, stop_receiver) = mpsc::sync_channel::<()>(1);

        let join_handle = std::thread::Builder::new()
            .name("splitio-poller".to_owned())
            .spawn(move || {
                let result = catch_unwind(AssertUnwindSafe(|| {
                    let mut failures = 0;
                    loop {
                        log::debug!(target: "splitio", "synchronizing replica");
                        match synchronizer.synchronize_all() {
                            Ok(()) => {
                                failures = 0;
                                if gate.mark_ready() {
                                    log::info!(target: "splitio", "replica is ready");
                                }
                            }
                            Err(Error::Unauthorized) => {
                                log::error!(target: "splitio",
                                            "client is not authorized, stopping synchronization");
                                return;
                            }
                            Err(err) => {
                                failures += 1;
                                log::warn!(target: "splitio",
                                           failures,
                                           error:display = err;
                                           "synchronization failed, retrying later");
                            }
                        }

                        let timeout = backoff(
                            jitter(config.interval, config.jitter),
                            failures,
                            config.max_backoff,
                        );
                        match stop_receiver.recv_timeout(timeout) {
                            Err(RecvTimeoutError::Timeout) => {
                                // Timed out. Loop back to synchronize again.
                            }
                            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                                log::debug!(target: "splitio", "poller thread received stop command");
                                return;
                            }
                        }
                    }
                }));

                if result.is_err() {
                    log::error!(target: "splitio", "poller thread panicked, synchronization stopped");
                }
            })?;

        Ok(PollerThread {
            join_handle,
            stop_sender,
        })
    }

    /// Stop the poller thread.
    ///
    /// This function does not wait for the thread to actually stop.
    pub fn stop(&self) {
        // Error means that the thread exited or another stop command is already queued. Either
        // way the thread stops.
        let _ = self.stop_sender.try_send(());
    }

    /// Stop the poller thread and block waiting for it to exit.
    ///
    /// A synchronization in flight is allowed to finish first.
    pub fn shutdown(self) -> Result<()> {
        self.stop();
        self.join_handle
            .join()
            .map_err(|_| Error::ThreadPanicked)?;
        Ok(())
    }
}

/// Apply randomized `jitter` to `interval`.
fn jitter(interval: Duration, jitter: Duration) -> Duration {
    Duration::saturating_sub(interval, thread_rng().gen_range(Duration::ZERO..=jitter))
}

/// Double `interval` for every consecutive failure, capped at `max_backoff`. The cap never
/// shortens the regular interval.
fn backoff(interval: Duration, failures: u32, max_backoff: Duration) -> Duration {
    if failures == 0 {
        return interval;
    }
    interval
        .saturating_mul(1 << failures.min(16))
        .min(max_backoff)
        .max(interval)
}
