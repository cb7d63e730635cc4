use std::collections::HashMap;

use derive_more::From;
use serde::{Deserialize, Serialize};

/// Caller-supplied attributes that matchers can target.
pub type Attributes = HashMap<String, AttributeValue>;

/// Value of a single attribute.
#[derive(Debug, Serialize, Deserialize, PartialEq, From, Clone)]
#[serde(untagged)]
pub enum AttributeValue {
    /// Used by the string and semver matchers.
    String(String),
    /// Used by the numeric and datetime matchers. Only whole numbers match.
    Number(f64),
    /// Used by `EQUAL_TO_BOOLEAN`.
    Boolean(bool),
    /// Used by the set matchers (`EQUAL_TO_SET`, `PART_OF_SET`, ...).
    List(Vec<String>),
    /// Never matches.
    Null,
}

impl From<&str> for AttributeValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<i64> for AttributeValue {
    fn from(value: i64) -> Self {
        Self::Number(value as f64)
    }
}

impl From<Vec<&str>> for AttributeValue {
    fn from(value: Vec<&str>) -> Self {
        Self::List(value.into_iter().map(str::to_owned).collect())
    }
}

/// Identity a flag is evaluated for.
///
/// The matching key is what matchers look at. The bucketing key, when present, is hashed instead
/// of the matching key for traffic allocation and partition bucketing.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Key {
    matching_key: String,
    bucketing_key: Option<String>,
}

impl Key {
    /// Create a key with a matching key only.
    pub fn new(matching_key: impl Into<String>) -> Key {
        Key {
            matching_key: matching_key.into(),
            bucketing_key: None,
        }
    }

    /// Create a key with a distinct bucketing key.
    pub fn with_bucketing_key(
        matching_key: impl Into<String>,
        bucketing_key: impl Into<String>,
    ) -> Key {
        Key {
            matching_key: matching_key.into(),
            bucketing_key: Some(bucketing_key.into()),
        }
    }

    /// Key targeting rules are matched against.
    pub fn matching_key(&self) -> &str {
        &self.matching_key
    }

    /// The explicit bucketing key, if one was supplied.
    pub fn explicit_bucketing_key(&self) -> Option<&str> {
        self.bucketing_key.as_deref()
    }

    /// The key used for hashing: the bucketing key, falling back to the matching key.
    pub fn bucketing_key(&self) -> &str {
        self.bucketing_key.as_deref().unwrap_or(&self.matching_key)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::new(value)
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::new(value)
    }
}

impl From<&Key> for Key {
    fn from(value: &Key) -> Self {
        value.clone()
    }
}
