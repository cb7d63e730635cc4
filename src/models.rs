//! Wire format of the change payloads served by the control plane.
use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Response of the flag changes endpoint.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FlagChanges {
    /// Each flag is wrapped in `TryParse` so that one malformed definition does not prevent the
    /// rest of the payload from being applied.
    #[serde(rename = "splits")]
    pub flags: Vec<TryParse<FlagDto>>,
    /// Cursor the request was made with.
    pub since: i64,
    /// Cursor to request the next page with. Equal to `since` once the client has caught up.
    pub till: i64,
}

/// `TryParse` allows the subfield to fail parsing without failing the parsing of the whole
/// structure.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum TryParse<T> {
    /// Successfully parsed.
    Parsed(T),
    /// Parsing failed.
    ParseFailed(serde_json::Value),
}

impl<T> From<TryParse<T>> for Option<T> {
    fn from(value: TryParse<T>) -> Self {
        match value {
            TryParse::Parsed(v) => Some(v),
            TryParse::ParseFailed(_) => None,
        }
    }
}

/// Response of the segment changes endpoint. Membership is delivered as a delta against `since`.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SegmentChanges {
    /// Segment name.
    pub name: String,
    /// Keys that joined the segment.
    #[serde(default)]
    pub added: Vec<String>,
    /// Keys that left the segment.
    #[serde(default)]
    pub removed: Vec<String>,
    /// Cursor the request was made with.
    pub since: i64,
    /// Change number of the segment after applying this delta.
    pub till: i64,
}

/// A flag ("split") definition as served by the control plane.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct FlagDto {
    /// Unique flag name.
    pub name: String,
    /// Kind of key the flag is evaluated for (e.g. `user`, `account`).
    #[serde(default)]
    pub traffic_type_name: Option<String>,
    /// Percentage (`0..=100`) of keys exposed to rollout conditions.
    #[serde(default = "default_traffic_allocation")]
    pub traffic_allocation: i32,
    /// Seed hashing keys for the traffic allocation check.
    #[serde(default)]
    pub traffic_allocation_seed: i32,
    /// Seed hashing keys for partition selection.
    #[serde(default)]
    pub seed: i32,
    /// Archived flags are removed from the replica.
    pub status: Status,
    /// A killed flag serves its default treatment to everyone.
    #[serde(default)]
    pub killed: bool,
    /// Treatment served when no condition matches or the flag is killed.
    pub default_treatment: String,
    /// Version of this definition. Larger is newer.
    pub change_number: i64,
    /// Hash algorithm identifier, see [`crate::Algorithm::from_id`].
    #[serde(default)]
    pub algo: Option<i32>,
    /// Targeting rules, tried in order.
    #[serde(default)]
    pub conditions: Vec<ConditionDto>,
    /// Configuration payload per treatment.
    #[serde(default)]
    pub configurations: Option<HashMap<String, String>>,
    /// Flag sets the flag is tagged with.
    #[serde(default)]
    pub sets: Option<Vec<String>>,
}

fn default_traffic_allocation() -> i32 {
    100
}

/// Lifecycle status of a flag definition.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    /// The flag is live.
    Active,
    /// The flag was deleted.
    Archived,
}

/// A targeting rule: when the matcher group matches, a treatment is picked from the partitions.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ConditionDto {
    /// Rollout or whitelist.
    #[serde(default)]
    pub condition_type: ConditionType,
    /// When the condition applies.
    pub matcher_group: MatcherGroupDto,
    /// Treatments and their weights. Weights add up to 100.
    #[serde(default)]
    pub partitions: Vec<PartitionDto>,
    /// Label reported in impressions when this condition decides the treatment.
    #[serde(default)]
    pub label: String,
}

/// Type of a condition. Traffic allocation only applies to `Rollout` conditions.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConditionType {
    /// Percentage rollout, subject to traffic allocation.
    #[default]
    Rollout,
    /// Explicit targeting, never subject to traffic allocation.
    Whitelist,
}

/// Matchers of a condition, joined by `combiner`.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct MatcherGroupDto {
    /// How matchers are joined.
    #[serde(default)]
    pub combiner: Combiner,
    /// Matchers of the group.
    pub matchers: Vec<MatcherDto>,
}

/// How the matchers of a group are joined. Only `AND` exists.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Combiner {
    /// All matchers must match.
    #[default]
    And,
}

/// A treatment with its weight in percent.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PartitionDto {
    /// Treatment name.
    pub treatment: String,
    /// Weight in percent.
    pub size: i32,
}

/// A single matcher. Which `*_data` field is set depends on `matcher_type`.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct MatcherDto {
    /// Attribute the matcher looks at. Without an attribute, the matching key is used.
    #[serde(default)]
    pub key_selector: Option<KeySelectorDto>,
    pub matcher_type: MatcherType,
    /// Invert the result.
    #[serde(default)]
    pub negate: bool,
    #[serde(default)]
    pub user_defined_segment_matcher_data: Option<SegmentMatcherDataDto>,
    #[serde(default)]
    pub whitelist_matcher_data: Option<WhitelistMatcherDataDto>,
    #[serde(default)]
    pub unary_numeric_matcher_data: Option<UnaryNumericMatcherDataDto>,
    #[serde(default)]
    pub between_matcher_data: Option<BetweenMatcherDataDto>,
    #[serde(default)]
    pub boolean_matcher_data: Option<bool>,
    #[serde(default)]
    pub dependency_matcher_data: Option<DependencyMatcherDataDto>,
    #[serde(default)]
    pub string_matcher_data: Option<String>,
    #[serde(default)]
    pub between_string_matcher_data: Option<BetweenStringMatcherDataDto>,
}

/// Selects the input of a matcher.
#[derive(Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct KeySelectorDto {
    /// Informational; not used for matching.
    #[serde(default)]
    pub traffic_type: Option<String>,
    /// Attribute name. `None` selects the matching key.
    #[serde(default)]
    pub attribute: Option<String>,
}

/// Matcher types known to this SDK. Anything else deserializes to `Unsupported` so that one new
/// matcher type does not break parsing of the whole payload.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[allow(missing_docs)]
pub enum MatcherType {
    AllKeys,
    InSegment,
    Whitelist,
    EqualTo,
    GreaterThanOrEqualTo,
    LessThanOrEqualTo,
    Between,
    EqualToSet,
    ContainsAnyOfSet,
    ContainsAllOfSet,
    PartOfSet,
    StartsWith,
    EndsWith,
    ContainsString,
    MatchesString,
    EqualToBoolean,
    InSplitTreatment,
    EqualToSemver,
    GreaterThanOrEqualToSemver,
    LessThanOrEqualToSemver,
    BetweenSemver,
    InListSemver,
    /// A matcher type this SDK does not know.
    #[default]
    #[serde(other)]
    Unsupported,
}

/// Data of `IN_SEGMENT`.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct SegmentMatcherDataDto {
    /// Segment the key must belong to.
    pub segment_name: String,
}

/// Data of `WHITELIST` and of the set and string matchers.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct WhitelistMatcherDataDto {
    /// Values to compare against.
    #[serde(default)]
    pub whitelist: Vec<String>,
}

/// Interpretation of the numbers of a numeric matcher.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    /// Plain integers.
    #[default]
    Number,
    /// Milliseconds since the epoch, compared with minute precision.
    Datetime,
}

/// Data of `EQUAL_TO`, `GREATER_THAN_OR_EQUAL_TO` and `LESS_THAN_OR_EQUAL_TO`.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct UnaryNumericMatcherDataDto {
    #[serde(default)]
    pub data_type: Option<DataType>,
    pub value: i64,
}

/// Data of `BETWEEN`. Both bounds are inclusive.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct BetweenMatcherDataDto {
    #[serde(default)]
    pub data_type: Option<DataType>,
    pub start: i64,
    pub end: i64,
}

/// Data of `IN_SPLIT_TREATMENT`: matches when flag `split` evaluates to one of `treatments`.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct DependencyMatcherDataDto {
    pub split: String,
    #[serde(default)]
    pub treatments: Vec<String>,
}

/// Data of `BETWEEN_SEMVER`. Both bounds are inclusive.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(rename_all = "camelCase")]
#[allow(missing_docs)]
pub struct BetweenStringMatcherDataDto {
    pub start: String,
    pub end: String,
}
