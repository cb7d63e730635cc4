use serde::{Deserialize, Serialize};

use crate::Attributes;

/// Record of a single evaluation served to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Impression {
    /// Key the flag was evaluated for.
    pub matching_key: String,
    /// Bucketing key, when the caller supplied one.
    pub bucketing_key: Option<String>,
    /// Evaluated flag.
    pub flag_name: String,
    /// Treatment served.
    pub treatment: String,
    /// Milliseconds since the Unix epoch.
    pub time: i64,
    /// Omitted when labels are disabled in the client configuration.
    pub label: Option<String>,
    /// Change number of the evaluated flag. `None` when the flag is unknown.
    pub change_number: Option<i64>,
    /// Attributes passed to the evaluation.
    pub attributes: Attributes,
}

/// Sink for impressions, e.g. to forward them to your data warehouse.
///
/// Implemented for closures taking an [`Impression`].
pub trait ImpressionListener {
    /// Receive one impression. Called on the evaluating thread; panics are caught and logged.
    fn log_impression(&self, impression: Impression);
}

pub(crate) struct NoopImpressionListener;
impl ImpressionListener for NoopImpressionListener {
    fn log_impression(&self, _impression: Impression) {}
}

impl<T: Fn(Impression)> ImpressionListener for T {
    fn log_impression(&self, impression: Impression) {
        self(impression);
    }
}
