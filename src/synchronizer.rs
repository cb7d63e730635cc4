//! Fetch-and-apply logic shared by the poller and the update workers.
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError},
};

use crate::{
    fetcher::{ChangeFetcher, FetchOptions},
    flag::Flag,
    models::{FlagChanges, FlagDto, SegmentChanges, Status, TryParse},
    store::{FlagStore, Segment, SegmentStore, NO_CHANGE_NUMBER},
    Result,
};

/// Upper bound on pages fetched by a single synchronization, in case the server never reports
/// that the client caught up.
const MAX_PAGES: usize = 100;

/// Brings the flag store up to date.
pub struct FlagSynchronizer {
    fetcher: Arc<dyn ChangeFetcher>,
    flags: Arc<FlagStore>,
    flag_sets_filter: HashSet<String>,
    /// Serializes refreshes so that pages are always applied in cursor order.
    lock: Mutex<()>,
}

impl FlagSynchronizer {
    /// Only flags tagged with a set of `flag_sets_filter` are kept, unless the filter is empty.
    pub fn new(
        fetcher: Arc<dyn ChangeFetcher>,
        flags: Arc<FlagStore>,
        flag_sets_filter: HashSet<String>,
    ) -> FlagSynchronizer {
        FlagSynchronizer {
            fetcher,
            flags,
            flag_sets_filter,
            lock: Mutex::new(()),
        }
    }

    /// Fetch and apply flag changes until the store has caught up with the server, or with `till`
    /// when given.
    pub fn synchronize(&self, till: Option<i64>) -> Result<()> {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);

        if till.is_some_and(|till| till <= self.flags.change_number()) {
            return Ok(());
        }

        let options = FetchOptions::new()
            .with_till(till)
            .with_flag_sets(self.flag_sets_filter.iter().cloned());

        for _ in 0..MAX_PAGES {
            let since = self.flags.change_number();
            let changes = self.fetcher.fetch_flags(since, &options)?;
            let caught_up = changes.since == changes.till;
            let new_cursor = changes.till;
            self.apply(changes);
            self.flags.advance_change_number(new_cursor);

            if caught_up || new_cursor <= since {
                return Ok(());
            }
        }

        log::warn!(target: "splitio",
                   change_number = self.flags.change_number();
                   "flag synchronization did not catch up, continuing on next refresh");
        Ok(())
    }

    fn apply(&self, changes: FlagChanges) {
        for flag in changes.flags {
            let dto = match flag {
                TryParse::Parsed(dto) => dto,
                TryParse::ParseFailed(value) => {
                    self.evict_unparsable(&value);
                    continue;
                }
            };

            if let Some(existing) = self.flags.get(&dto.name) {
                if dto.change_number <= existing.change_number() {
                    log::trace!(target: "splitio",
                                flag_name:display = dto.name,
                                change_number = dto.change_number;
                                "ignoring stale flag definition");
                    continue;
                }
            }

            if dto.status == Status::Active && self.passes_filter(&dto) {
                log::debug!(target: "splitio",
                            flag_name:display = dto.name,
                            change_number = dto.change_number;
                            "updating flag");
                self.flags.put(Flag::from(dto));
            } else if self.flags.remove(&dto.name).is_some() {
                log::debug!(target: "splitio",
                            flag_name:display = dto.name,
                            change_number = dto.change_number;
                            "removing flag");
            }
        }
    }

    /// The cursor moves past a definition that cannot be parsed, so the stored version of that
    /// flag is outdated for good. Drop it rather than keep serving it.
    fn evict_unparsable(&self, value: &serde_json::Value) {
        let Some(name) = value.get("name").and_then(|v| v.as_str()) else {
            log::warn!(target: "splitio", "failed to parse unnamed flag definition, skipping it");
            return;
        };
        let change_number = value.get("changeNumber").and_then(|v| v.as_i64());

        if let (Some(existing), Some(change_number)) = (self.flags.get(name), change_number) {
            if change_number <= existing.change_number() {
                log::trace!(target: "splitio",
                            flag_name = name,
                            change_number;
                            "ignoring stale unparsable flag definition");
                return;
            }
        }

        if self.flags.remove(name).is_some() {
            log::warn!(target: "splitio",
                       flag_name = name;
                       "failed to parse flag definition, removing the stored version");
        } else {
            log::warn!(target: "splitio",
                       flag_name = name;
                       "failed to parse flag definition, skipping it");
        }
    }

    fn passes_filter(&self, dto: &FlagDto) -> bool {
        self.flag_sets_filter.is_empty()
            || dto
                .sets
                .iter()
                .flatten()
                .any(|set| self.flag_sets_filter.contains(set))
    }
}

/// Brings segments up to date, one segment at a time.
pub struct SegmentSynchronizer {
    fetcher: Arc<dyn ChangeFetcher>,
    segments: Arc<SegmentStore>,
    /// One lock per segment: refreshes of the same segment are serialized, different segments
    /// refresh in parallel.
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl SegmentSynchronizer {
    /// Create a synchronizer writing to `segments`.
    pub fn new(fetcher: Arc<dyn ChangeFetcher>, segments: Arc<SegmentStore>) -> SegmentSynchronizer {
        SegmentSynchronizer {
            fetcher,
            segments,
            locks: Mutex::default(),
        }
    }

    fn lock_for(&self, name: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(name.to_owned()).or_default().clone()
    }

    /// Fetch and apply membership changes of segment `name`.
    pub fn synchronize(&self, name: &str, till: Option<i64>) -> Result<()> {
        let lock = self.lock_for(name);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        if till.is_some_and(|till| till <= self.segments.change_number(name)) {
            return Ok(());
        }

        let options = FetchOptions::new().with_till(till);

        for _ in 0..MAX_PAGES {
            let current = self.segments.get(name);
            let since = current
                .as_ref()
                .map_or(NO_CHANGE_NUMBER, |segment| segment.change_number());
            let changes = self.fetcher.fetch_segment(name, since, &options)?;

            if changes.till <= since {
                return Ok(());
            }

            let caught_up = changes.since == changes.till;
            self.apply(name, current.as_deref(), changes);
            if caught_up {
                return Ok(());
            }
        }

        log::warn!(target: "splitio",
                   segment_name = name;
                   "segment synchronization did not catch up, continuing on next refresh");
        Ok(())
    }

    fn apply(&self, name: &str, current: Option<&Segment>, changes: SegmentChanges) {
        log::debug!(target: "splitio",
                    segment_name = name,
                    added = changes.added.len(),
                    removed = changes.removed.len(),
                    change_number = changes.till;
                    "updating segment");
        let next = match current {
            Some(segment) => segment.apply(changes.added, &changes.removed, changes.till),
            None => Segment::new(name, changes.added.into_iter().collect(), changes.till),
        };
        self.segments.put(next);
    }
}

/// Flag and segment synchronization over a shared fetcher.
pub struct Synchronizer {
    flags: Arc<FlagStore>,
    segments: Arc<SegmentStore>,
    flag_synchronizer: FlagSynchronizer,
    segment_synchronizer: SegmentSynchronizer,
}

impl Synchronizer {
    /// Synchronize `flags` and `segments` from `fetcher`. See [`FlagSynchronizer::new`] for
    /// `flag_sets_filter`.
    pub fn new(
        fetcher: Arc<dyn ChangeFetcher>,
        flags: Arc<FlagStore>,
        segments: Arc<SegmentStore>,
        flag_sets_filter: HashSet<String>,
    ) -> Synchronizer {
        Synchronizer {
            flag_synchronizer: FlagSynchronizer::new(
                fetcher.clone(),
                flags.clone(),
                flag_sets_filter,
            ),
            segment_synchronizer: SegmentSynchronizer::new(fetcher, segments.clone()),
            flags,
            segments,
        }
    }

    /// Full reconciliation: all flag changes, then every segment referenced by a flag.
    ///
    /// A failing segment does not prevent the others from being refreshed; the first error is
    /// returned.
    pub fn synchronize_all(&self) -> Result<()> {
        self.flag_synchronizer.synchronize(None)?;

        let mut first_error = None;
        for name in self.flags.segment_names() {
            if let Err(err) = self.segment_synchronizer.synchronize(&name, None) {
                log::warn!(target: "splitio",
                           segment_name:display = name,
                           error:display = err;
                           "failed to synchronize segment");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Refresh flags up to `till`, then fetch the segments that newly referenced flags need.
    pub fn refresh_flags(&self, till: Option<i64>) -> Result<()> {
        self.flag_synchronizer.synchronize(till)?;

        for name in self.flags.segment_names() {
            if self.segments.change_number(&name) == NO_CHANGE_NUMBER {
                self.segment_synchronizer.synchronize(&name, None)?;
            }
        }
        Ok(())
    }

    /// Refresh segment `name`, up to `till` when given.
    pub fn refresh_segment(&self, name: &str, till: Option<i64>) -> Result<()> {
        self.segment_synchronizer.synchronize(name, till)
    }
}
