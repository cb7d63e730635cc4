#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::Mutex,
    time::{Duration, Instant},
};

use serde_json::json;
use splitio::{
    models::{FlagChanges, SegmentChanges},
    ChangeFetcher, Error, FetchOptions, Result,
};

/// A request received by [`InMemoryFetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Flags { since: i64, till: Option<i64> },
    Segment { name: String, since: i64 },
}

/// Serves canned change pages keyed by `since`. Cursors without a page answer "no changes".
#[derive(Default)]
pub struct InMemoryFetcher {
    flag_pages: Mutex<HashMap<i64, serde_json::Value>>,
    segment_pages: Mutex<HashMap<(String, i64), serde_json::Value>>,
    requests: Mutex<Vec<Request>>,
    unauthorized: Mutex<bool>,
}

impl InMemoryFetcher {
    pub fn add_flags(&self, since: i64, till: i64, flags: serde_json::Value) {
        self.flag_pages
            .lock()
            .unwrap()
            .insert(since, json!({ "splits": flags, "since": since, "till": till }));
    }

    pub fn add_segment(&self, name: &str, since: i64, till: i64, added: &[&str], removed: &[&str]) {
        self.segment_pages.lock().unwrap().insert(
            (name.to_owned(), since),
            json!({ "name": name, "added": added, "removed": removed, "since": since, "till": till }),
        );
    }

    pub fn set_unauthorized(&self) {
        *self.unauthorized.lock().unwrap() = true;
    }

    pub fn requests(&self) -> Vec<Request> {
        self.requests.lock().unwrap().clone()
    }

    pub fn segment_requests(&self, name: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| matches!(r, Request::Segment { name: n, .. } if n == name))
            .count()
    }

    pub fn flag_requests(&self) -> usize {
        self.requests()
            .iter()
            .filter(|r| matches!(r, Request::Flags { .. }))
            .count()
    }
}

impl ChangeFetcher for InMemoryFetcher {
    fn fetch_flags(&self, since: i64, options: &FetchOptions) -> Result<FlagChanges> {
        self.requests.lock().unwrap().push(Request::Flags {
            since,
            till: options.till,
        });
        if *self.unauthorized.lock().unwrap() {
            return Err(Error::Unauthorized);
        }
        let page = self
            .flag_pages
            .lock()
            .unwrap()
            .get(&since)
            .cloned()
            .unwrap_or_else(|| json!({ "splits": [], "since": since, "till": since }));
        Ok(serde_json::from_value(page).unwrap())
    }

    fn fetch_segment(&self, name: &str, since: i64, _options: &FetchOptions) -> Result<SegmentChanges> {
        self.requests.lock().unwrap().push(Request::Segment {
            name: name.to_owned(),
            since,
        });
        let page = self
            .segment_pages
            .lock()
            .unwrap()
            .get(&(name.to_owned(), since))
            .cloned()
            .unwrap_or_else(|| json!({ "name": name, "since": since, "till": since }));
        Ok(serde_json::from_value(page).unwrap())
    }
}

/// A flag with a single rollout condition.
pub fn rollout_flag(
    name: &str,
    change_number: i64,
    killed: bool,
    matcher: serde_json::Value,
    partitions: serde_json::Value,
) -> serde_json::Value {
    json!({
        "name": name,
        "trafficTypeName": "user",
        "trafficAllocation": 100,
        "trafficAllocationSeed": 1,
        "seed": 467569525,
        "status": "ACTIVE",
        "killed": killed,
        "defaultTreatment": "off",
        "changeNumber": change_number,
        "algo": 2,
        "conditions": [{
            "conditionType": "ROLLOUT",
            "matcherGroup": { "combiner": "AND", "matchers": [matcher] },
            "partitions": partitions,
            "label": "default rule"
        }]
    })
}

pub fn all_keys() -> serde_json::Value {
    json!({ "matcherType": "ALL_KEYS", "negate": false })
}

pub fn in_segment(segment_name: &str) -> serde_json::Value {
    json!({
        "matcherType": "IN_SEGMENT",
        "negate": false,
        "userDefinedSegmentMatcherData": { "segmentName": segment_name }
    })
}

pub fn full(treatment: &str) -> serde_json::Value {
    json!([{ "treatment": treatment, "size": 100 }])
}

/// Poll `condition` until it holds, panicking after a few seconds.
pub fn wait_for(what: &str, condition: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(5));
    }
}
