use std::{collections::HashSet, sync::Arc};

use crate::{
    fetcher::ChangeFetcher,
    notification::NotificationQueue,
    poller::{PollerConfig, PollerThread},
    readiness::ReadinessGate,
    store::{FlagStore, SegmentStore},
    synchronizer::Synchronizer,
    worker::{FlagUpdate, SegmentUpdate, Worker, WorkerConfig},
    Error, Result,
};

/// Owns the background threads keeping the replica fresh: the poller and one worker per entity
/// kind.
pub struct SyncManager {
    poller: PollerThread,
    flag_worker: Worker<FlagUpdate>,
    segment_worker: Worker<SegmentUpdate>,
    notifications: NotificationQueue,
}

impl SyncManager {
    /// Start all synchronization threads.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if a thread cannot be spawned. Threads started before the failure are
    /// stopped.
    pub fn start(
        fetcher: Arc<dyn ChangeFetcher>,
        flags: Arc<FlagStore>,
        segments: Arc<SegmentStore>,
        gate: Arc<ReadinessGate>,
        flag_sets_filter: HashSet<String>,
        poller_config: PollerConfig,
    ) -> Result<SyncManager> {
        let synchronizer = Arc::new(Synchronizer::new(
            fetcher,
            flags.clone(),
            segments.clone(),
            flag_sets_filter,
        ));

        let flag_worker = Worker::start(WorkerConfig {
            name: "flags",
            current_change_number: Box::new(move |_: &FlagUpdate| flags.change_number()),
            refresh: {
                let synchronizer = synchronizer.clone();
                Box::new(move |update: &FlagUpdate| {
                    synchronizer.refresh_flags(Some(update.change_number))
                })
            },
        })?;

        let segment_worker = match Worker::start(WorkerConfig {
            name: "segments",
            current_change_number: Box::new(move |update: &SegmentUpdate| {
                segments.change_number(&update.segment_name)
            }),
            refresh: {
                let synchronizer = synchronizer.clone();
                Box::new(move |update: &SegmentUpdate| {
                    synchronizer.refresh_segment(&update.segment_name, Some(update.change_number))
                })
            },
        }) {
            Ok(worker) => worker,
            Err(err) => {
                flag_worker.stop();
                return Err(Error::from(err));
            }
        };

        let poller = match PollerThread::start(synchronizer, gate, poller_config) {
            Ok(poller) => poller,
            Err(err) => {
                flag_worker.stop();
                segment_worker.stop();
                return Err(Error::from(err));
            }
        };

        let notifications = NotificationQueue::new(flag_worker.queue(), segment_worker.queue());
        log::debug!(target: "splitio", "synchronization started");

        Ok(SyncManager {
            poller,
            flag_worker,
            segment_worker,
            notifications,
        })
    }

    /// Queue to hand push notifications to.
    pub fn notification_queue(&self) -> NotificationQueue {
        self.notifications.clone()
    }

    /// Stop all threads and wait for them to exit. Pending notifications are discarded.
    pub fn shutdown(self) -> Result<()> {
        // Signal everyone first so that threads wind down in parallel.
        self.poller.stop();
        self.flag_worker.stop();
        self.segment_worker.stop();

        let results = [
            self.poller.shutdown(),
            self.flag_worker.shutdown(),
            self.segment_worker.shutdown(),
        ];
        log::debug!(target: "splitio", "synchronization stopped");
        results.into_iter().collect()
    }
}
