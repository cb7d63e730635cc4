//! Thread-safe in-memory replica of flag and segment definitions.
//!
//! Stores hand out `Arc` snapshots of immutable entries. A writer replaces an entry completely, so
//! a reader either sees the previous or the new definition, never a mix of both. Stores do not
//! check staleness: that is the job of the synchronizers writing into them.
use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc, PoisonError, RwLock,
    },
};

use crate::flag::Flag;

/// Change number meaning "nothing fetched yet".
pub const NO_CHANGE_NUMBER: i64 = -1;

#[derive(Default)]
struct FlagEntries {
    flags: HashMap<String, Arc<Flag>>,
    /// Flag set name -> names of the flags tagged with it.
    by_set: HashMap<String, HashSet<String>>,
}

impl FlagEntries {
    fn unindex(&mut self, flag: &Flag) {
        for set in flag.sets() {
            if let Some(names) = self.by_set.get_mut(set) {
                names.remove(flag.name());
                if names.is_empty() {
                    self.by_set.remove(set);
                }
            }
        }
    }
}

/// Storage for flag definitions and the flags cursor.
pub struct FlagStore {
    entries: RwLock<FlagEntries>,
    change_number: AtomicI64,
}

impl Default for FlagStore {
    fn default() -> Self {
        FlagStore {
            entries: RwLock::default(),
            change_number: AtomicI64::new(NO_CHANGE_NUMBER),
        }
    }
}

impl FlagStore {
    /// An empty store at [`NO_CHANGE_NUMBER`].
    pub fn new() -> Self {
        FlagStore::default()
    }

    /// Current definition of flag `name`.
    pub fn get(&self, name: &str) -> Option<Arc<Flag>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.flags.get(name).cloned()
    }

    /// Insert or replace a flag, returning the previous definition.
    pub fn put(&self, flag: Flag) -> Option<Arc<Flag>> {
        let flag = Arc::new(flag);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        let previous = entries.flags.insert(flag.name().to_owned(), flag.clone());
        if let Some(previous) = &previous {
            entries.unindex(previous);
        }
        for set in flag.sets() {
            entries
                .by_set
                .entry(set.clone())
                .or_default()
                .insert(flag.name().to_owned());
        }
        previous
    }

    /// Remove flag `name`, returning its last definition.
    pub fn remove(&self, name: &str) -> Option<Arc<Flag>> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let previous = entries.flags.remove(name)?;
        entries.unindex(&previous);
        Some(previous)
    }

    /// The `till` of the last applied flag changes payload, or [`NO_CHANGE_NUMBER`].
    pub fn change_number(&self) -> i64 {
        self.change_number.load(Ordering::Acquire)
    }

    /// Move the flags cursor forward. The cursor never moves backwards.
    pub fn advance_change_number(&self, change_number: i64) {
        self.change_number.fetch_max(change_number, Ordering::AcqRel);
    }

    /// Names of the flags tagged with any of `sets`, sorted.
    pub fn names_by_flag_sets(&self, sets: &[String]) -> Vec<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        sets.iter()
            .filter_map(|set| entries.by_set.get(set))
            .flatten()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Names of all segments referenced by stored flags.
    pub fn segment_names(&self) -> HashSet<String> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .flags
            .values()
            .flat_map(|flag| flag.segment_names())
            .map(str::to_owned)
            .collect()
    }

    /// Number of stored flags.
    pub fn len(&self) -> usize {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.flags.len()
    }

    /// Whether there is nothing stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Membership of a single segment at a given change number.
#[derive(Debug, Clone)]
pub struct Segment {
    name: String,
    members: HashSet<String>,
    change_number: i64,
}

impl Segment {
    /// A segment holding `members` as of `change_number`.
    pub fn new(name: impl Into<String>, members: HashSet<String>, change_number: i64) -> Segment {
        Segment {
            name: name.into(),
            members,
            change_number,
        }
    }

    /// Segment name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version of this membership.
    pub fn change_number(&self) -> i64 {
        self.change_number
    }

    /// Whether `key` is a member.
    pub fn contains(&self, key: &str) -> bool {
        self.members.contains(key)
    }

    /// Number of members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Whether there is nothing stored.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Build the next version of this segment by applying a membership delta.
    pub(crate) fn apply(&self, added: Vec<String>, removed: &[String], change_number: i64) -> Segment {
        let mut members = self.members.clone();
        for key in removed {
            members.remove(key);
        }
        members.extend(added);
        Segment {
            name: self.name.clone(),
            members,
            change_number,
        }
    }
}

/// Storage for segment memberships.
#[derive(Default)]
pub struct SegmentStore {
    segments: RwLock<HashMap<String, Arc<Segment>>>,
}

impl SegmentStore {
    /// An empty store.
    pub fn new() -> Self {
        SegmentStore::default()
    }

    /// Current version of segment `name`.
    pub fn get(&self, name: &str) -> Option<Arc<Segment>> {
        let segments = self.segments.read().unwrap_or_else(PoisonError::into_inner);
        segments.get(name).cloned()
    }

    /// Insert or replace a segment, returning the previous version.
    pub fn put(&self, segment: Segment) -> Option<Arc<Segment>> {
        let segment = Arc::new(segment);
        let mut segments = self.segments.write().unwrap_or_else(PoisonError::into_inner);
        segments.insert(segment.name().to_owned(), segment)
    }

    /// Change number of segment `name`, or [`NO_CHANGE_NUMBER`] if it was never fetched.
    pub fn change_number(&self, name: &str) -> i64 {
        self.get(name)
            .map_or(NO_CHANGE_NUMBER, |segment| segment.change_number())
    }

    /// Whether `key` is a member of segment `name`. Unknown segments contain nobody.
    pub fn contains(&self, name: &str, key: &str) -> bool {
        self.get(name).is_some_and(|segment| segment.contains(key))
    }

    /// Names of all stored segments.
    pub fn names(&self) -> HashSet<String> {
        let segments = self.segments.read().unwrap_or_else(PoisonError::into_inner);
        segments.keys().cloned().collect()
    }

    /// Number of stored segments.
    pub fn len(&self) -> usize {
        let segments = self.segments.read().unwrap_or_else(PoisonError::into_inner);
        segments.len()
    }

    /// Whether there is nothing stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashSet,
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
    };

    use super::{FlagStore, Segment, SegmentStore, NO_CHANGE_NUMBER};
    use crate::{flag::Flag, models::FlagDto};

    fn flag(name: &str, change_number: i64, sets: &[&str]) -> Flag {
        let dto: FlagDto = serde_json::from_value(serde_json::json!({
            "name": name,
            "status": "ACTIVE",
            "defaultTreatment": "off",
            "changeNumber": change_number,
            "sets": sets,
            "conditions": [{
                "matcherGroup": { "combiner": "AND", "matchers": [{
                    "matcherType": "IN_SEGMENT",
                    "userDefinedSegmentMatcherData": { "segmentName": format!("{name}-segment") }
                }] },
                "partitions": [{ "treatment": "on", "size": 100 }],
                "label": "in segment"
            }]
        }))
        .unwrap();
        Flag::from(dto)
    }

    #[test]
    fn put_replaces_wholesale() {
        let store = FlagStore::new();
        assert!(store.get("a").is_none());

        assert!(store.put(flag("a", 1, &[])).is_none());
        let previous = store.put(flag("a", 2, &[])).unwrap();

        assert_eq!(previous.change_number(), 1);
        assert_eq!(store.get("a").unwrap().change_number(), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn flag_set_index_follows_entries() {
        let store = FlagStore::new();
        store.put(flag("a", 1, &["frontend"]));
        store.put(flag("b", 1, &["frontend", "backend"]));
        store.put(flag("c", 1, &["backend"]));

        assert_eq!(
            store.names_by_flag_sets(&["frontend".to_owned()]),
            vec!["a", "b"]
        );
        assert_eq!(
            store.names_by_flag_sets(&["frontend".to_owned(), "backend".to_owned()]),
            vec!["a", "b", "c"]
        );

        // Moving "b" out of "frontend" and removing "a" must be reflected in the index.
        store.put(flag("b", 2, &["backend"]));
        store.remove("a");
        assert!(store.names_by_flag_sets(&["frontend".to_owned()]).is_empty());
        assert_eq!(
            store.names_by_flag_sets(&["backend".to_owned()]),
            vec!["b", "c"]
        );
    }

    #[test]
    fn cursor_only_moves_forward() {
        let store = FlagStore::new();
        assert_eq!(store.change_number(), NO_CHANGE_NUMBER);
        store.advance_change_number(10);
        store.advance_change_number(5);
        assert_eq!(store.change_number(), 10);
    }

    #[test]
    fn referenced_segments() {
        let store = FlagStore::new();
        store.put(flag("a", 1, &[]));
        store.put(flag("b", 1, &[]));
        assert_eq!(
            store.segment_names(),
            HashSet::from(["a-segment".to_owned(), "b-segment".to_owned()])
        );
    }

    #[test]
    fn segment_delta_builds_new_version() {
        let store = SegmentStore::new();
        assert_eq!(store.change_number("beta"), NO_CHANGE_NUMBER);
        assert!(!store.contains("beta", "alice"));

        let v1 = Segment::new("beta", HashSet::from(["alice".to_owned(), "bob".to_owned()]), 1);
        store.put(v1.clone());
        let v2 = v1.apply(vec!["carol".to_owned()], &["bob".to_owned()], 2);
        store.put(v2);

        assert_eq!(store.change_number("beta"), 2);
        assert!(store.contains("beta", "alice"));
        assert!(!store.contains("beta", "bob"));
        assert!(store.contains("beta", "carol"));
        // The previous version is untouched.
        assert!(v1.contains("bob"));
    }

    #[test]
    fn readers_and_writers_share_store_across_threads() {
        let store = Arc::new(FlagStore::new());
        let writing = Arc::new(AtomicBool::new(true));

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                let writing = writing.clone();
                std::thread::spawn(move || {
                    let mut reads = 0;
                    while writing.load(Ordering::Acquire) || reads == 0 {
                        if let Some(flag) = store.get("shared") {
                            // Each version carries the set named after its change number.
                            let expected = HashSet::from([format!("set-{}", flag.change_number())]);
                            assert_eq!(flag.sets(), &expected);
                            reads += 1;
                        }
                    }
                })
            })
            .collect();

        let writers: Vec<_> = (0..4)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for cn in 0..50 {
                        store.put(flag(&format!("flag-{i}"), cn, &["all"]));
                        let shared_cn = i * 50 + cn;
                        let set = format!("set-{shared_cn}");
                        store.put(flag("shared", shared_cn, &[set.as_str()]));
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }
        writing.store(false, Ordering::Release);
        for reader in readers {
            reader.join().unwrap();
        }

        assert_eq!(store.len(), 5);
        assert_eq!(store.names_by_flag_sets(&["all".to_owned()]).len(), 4);
        assert_eq!(store.get("flag-0").unwrap().change_number(), 49);
        assert_eq!(store.names_by_flag_sets(&["set-0".to_owned()]).len(), 0);
    }
}
