use std::collections::HashSet;

use regex::Regex;
use semver::{BuildMetadata, Version};

use crate::{
    evaluator::EvaluationContext,
    models::{DataType, MatcherDto, MatcherGroupDto, MatcherType},
    AttributeValue, Attributes, EvaluationError, Key,
};

const MILLIS_PER_MINUTE: i64 = 60 * 1000;
const MILLIS_PER_DAY: i64 = 24 * 60 * MILLIS_PER_MINUTE;

/// A matcher definition that this SDK cannot interpret.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub(crate) enum MatcherError {
    #[error("matcher type is not supported")]
    Unsupported,
    #[error("{0:?} matcher is missing its data")]
    MissingData(MatcherType),
    #[error("invalid regular expression {0:?}")]
    InvalidRegex(String),
    #[error("invalid semantic version {0:?}")]
    InvalidSemver(String),
}

/// Conjunction of attribute matchers. An empty group never matches.
#[derive(Debug)]
pub(crate) struct CombiningMatcher {
    matchers: Vec<AttributeMatcher>,
}

impl CombiningMatcher {
    pub(crate) fn all_keys() -> CombiningMatcher {
        CombiningMatcher {
            matchers: vec![AttributeMatcher {
                attribute: None,
                negate: false,
                matcher: Matcher::AllKeys,
            }],
        }
    }

    pub(crate) fn matches(
        &self,
        key: &Key,
        attributes: &Attributes,
        ctx: &EvaluationContext,
    ) -> Result<bool, EvaluationError> {
        if self.matchers.is_empty() {
            return Ok(false);
        }
        for matcher in &self.matchers {
            if !matcher.matches(key, attributes, ctx)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Names of the segments referenced by this group.
    pub(crate) fn segment_names(&self) -> impl Iterator<Item = &str> {
        self.matchers.iter().filter_map(|m| match &m.matcher {
            Matcher::InSegment(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

impl TryFrom<&MatcherGroupDto> for CombiningMatcher {
    type Error = MatcherError;

    fn try_from(group: &MatcherGroupDto) -> Result<Self, Self::Error> {
        let matchers = group
            .matchers
            .iter()
            .map(AttributeMatcher::try_from)
            .collect::<Result<_, _>>()?;
        Ok(CombiningMatcher { matchers })
    }
}

/// A primitive matcher bound to either the matching key or a named attribute.
#[derive(Debug)]
struct AttributeMatcher {
    attribute: Option<String>,
    negate: bool,
    matcher: Matcher,
}

impl AttributeMatcher {
    fn matches(
        &self,
        key: &Key,
        attributes: &Attributes,
        ctx: &EvaluationContext,
    ) -> Result<bool, EvaluationError> {
        let input = match &self.attribute {
            None => Input::Key(key.matching_key()),
            Some(attribute) => match attributes.get(attribute) {
                // A missing attribute never matches, negated or not.
                None | Some(AttributeValue::Null) => return Ok(false),
                Some(value) => Input::Attribute(value),
            },
        };
        let matches = self.matcher.matches(input, key, attributes, ctx)?;
        Ok(matches != self.negate)
    }
}

impl TryFrom<&MatcherDto> for AttributeMatcher {
    type Error = MatcherError;

    fn try_from(dto: &MatcherDto) -> Result<Self, Self::Error> {
        Ok(AttributeMatcher {
            attribute: dto.key_selector.as_ref().and_then(|s| s.attribute.clone()),
            negate: dto.negate,
            matcher: Matcher::try_from(dto)?,
        })
    }
}

/// The closed set of primitive matchers.
#[derive(Debug)]
enum Matcher {
    AllKeys,
    InSegment(String),
    Whitelist(HashSet<String>),
    EqualTo(DataType, i64),
    GreaterThanOrEqualTo(DataType, i64),
    LessThanOrEqualTo(DataType, i64),
    Between(DataType, i64, i64),
    EqualToSet(HashSet<String>),
    ContainsAnyOfSet(HashSet<String>),
    ContainsAllOfSet(HashSet<String>),
    PartOfSet(HashSet<String>),
    StartsWith(Vec<String>),
    EndsWith(Vec<String>),
    ContainsString(Vec<String>),
    MatchesString(Regex),
    EqualToBoolean(bool),
    Dependency {
        flag_name: String,
        treatments: Vec<String>,
    },
    EqualToSemver(Version),
    GreaterThanOrEqualToSemver(Version),
    LessThanOrEqualToSemver(Version),
    BetweenSemver(Version, Version),
    InListSemver(Vec<Version>),
}

impl TryFrom<&MatcherDto> for Matcher {
    type Error = MatcherError;

    fn try_from(dto: &MatcherDto) -> Result<Self, Self::Error> {
        let ty = dto.matcher_type;
        let missing = || MatcherError::MissingData(ty);

        let whitelist = || {
            dto.whitelist_matcher_data
                .as_ref()
                .map(|data| data.whitelist.clone())
                .ok_or_else(missing)
        };
        let set = || whitelist().map(|list| list.into_iter().collect::<HashSet<_>>());
        let unary = || {
            dto.unary_numeric_matcher_data
                .as_ref()
                .map(|data| (data.data_type.unwrap_or_default(), data.value))
                .ok_or_else(missing)
        };
        let string = || dto.string_matcher_data.as_deref().ok_or_else(missing);

        Ok(match ty {
            MatcherType::AllKeys => Matcher::AllKeys,
            MatcherType::InSegment => Matcher::InSegment(
                dto.user_defined_segment_matcher_data
                    .as_ref()
                    .map(|data| data.segment_name.clone())
                    .ok_or_else(missing)?,
            ),
            MatcherType::Whitelist => Matcher::Whitelist(set()?),
            MatcherType::EqualTo => {
                let (data_type, value) = unary()?;
                Matcher::EqualTo(data_type, value)
            }
            MatcherType::GreaterThanOrEqualTo => {
                let (data_type, value) = unary()?;
                Matcher::GreaterThanOrEqualTo(data_type, value)
            }
            MatcherType::LessThanOrEqualTo => {
                let (data_type, value) = unary()?;
                Matcher::LessThanOrEqualTo(data_type, value)
            }
            MatcherType::Between => {
                let data = dto.between_matcher_data.as_ref().ok_or_else(missing)?;
                Matcher::Between(data.data_type.unwrap_or_default(), data.start, data.end)
            }
            MatcherType::EqualToSet => Matcher::EqualToSet(set()?),
            MatcherType::ContainsAnyOfSet => Matcher::ContainsAnyOfSet(set()?),
            MatcherType::ContainsAllOfSet => Matcher::ContainsAllOfSet(set()?),
            MatcherType::PartOfSet => Matcher::PartOfSet(set()?),
            MatcherType::StartsWith => Matcher::StartsWith(whitelist()?),
            MatcherType::EndsWith => Matcher::EndsWith(whitelist()?),
            MatcherType::ContainsString => Matcher::ContainsString(whitelist()?),
            MatcherType::MatchesString => {
                let pattern = string()?;
                Matcher::MatchesString(
                    Regex::new(pattern)
                        .map_err(|_| MatcherError::InvalidRegex(pattern.to_owned()))?,
                )
            }
            MatcherType::EqualToBoolean => {
                Matcher::EqualToBoolean(dto.boolean_matcher_data.ok_or_else(missing)?)
            }
            MatcherType::InSplitTreatment => {
                let data = dto.dependency_matcher_data.as_ref().ok_or_else(missing)?;
                Matcher::Dependency {
                    flag_name: data.split.clone(),
                    treatments: data.treatments.clone(),
                }
            }
            MatcherType::EqualToSemver => Matcher::EqualToSemver(semver(string()?)?),
            MatcherType::GreaterThanOrEqualToSemver => {
                Matcher::GreaterThanOrEqualToSemver(semver(string()?)?)
            }
            MatcherType::LessThanOrEqualToSemver => {
                Matcher::LessThanOrEqualToSemver(semver(string()?)?)
            }
            MatcherType::BetweenSemver => {
                let data = dto
                    .between_string_matcher_data
                    .as_ref()
                    .ok_or_else(missing)?;
                Matcher::BetweenSemver(semver(&data.start)?, semver(&data.end)?)
            }
            MatcherType::InListSemver => Matcher::InListSemver(
                whitelist()?
                    .iter()
                    .map(|v| semver(v))
                    .collect::<Result<_, _>>()?,
            ),
            MatcherType::Unsupported => return Err(MatcherError::Unsupported),
        })
    }
}

/// Parse a semantic version, ignoring build metadata (it does not take part in precedence).
fn semver(s: &str) -> Result<Version, MatcherError> {
    parse_semver(s).ok_or_else(|| MatcherError::InvalidSemver(s.to_owned()))
}

fn parse_semver(s: &str) -> Option<Version> {
    let mut version = Version::parse(s.trim()).ok()?;
    version.build = BuildMetadata::EMPTY;
    Some(version)
}

/// The value a matcher is applied to.
#[derive(Clone, Copy)]
enum Input<'a> {
    Key(&'a str),
    Attribute(&'a AttributeValue),
}

impl<'a> Input<'a> {
    fn as_str(self) -> Option<&'a str> {
        match self {
            Input::Key(key) => Some(key),
            Input::Attribute(AttributeValue::String(s)) => Some(s.as_str()),
            Input::Attribute(_) => None,
        }
    }

    /// Only whole numbers take part in numeric and datetime comparisons.
    fn as_i64(self) -> Option<i64> {
        match self {
            Input::Attribute(AttributeValue::Number(n))
                if n.fract() == 0.0 && n.abs() < i64::MAX as f64 =>
            {
                Some(*n as i64)
            }
            _ => None,
        }
    }

    fn as_bool(self) -> Option<bool> {
        match self {
            Input::Attribute(AttributeValue::Boolean(b)) => Some(*b),
            _ => {
                let s = self.as_str()?;
                if s.eq_ignore_ascii_case("true") {
                    Some(true)
                } else if s.eq_ignore_ascii_case("false") {
                    Some(false)
                } else {
                    None
                }
            }
        }
    }

    fn as_set(self) -> Option<HashSet<&'a str>> {
        match self {
            Input::Attribute(AttributeValue::List(list)) => {
                Some(list.iter().map(String::as_str).collect())
            }
            _ => None,
        }
    }
}

/// Normalize a value for comparison under `data_type`. Datetimes are compared with minute
/// precision, or day precision for equality.
fn normalize(data_type: DataType, value: i64, truncate_to: i64) -> i64 {
    match data_type {
        DataType::Number => value,
        DataType::Datetime => value - value.rem_euclid(truncate_to),
    }
}

impl Matcher {
    fn matches(
        &self,
        input: Input,
        key: &Key,
        attributes: &Attributes,
        ctx: &EvaluationContext,
    ) -> Result<bool, EvaluationError> {
        Ok(self.try_match(input, key, attributes, ctx)?.unwrap_or(false))
    }

    /// Try applying the matcher to `input`, returning `None` if the input has the wrong type.
    fn try_match(
        &self,
        input: Input,
        key: &Key,
        attributes: &Attributes,
        ctx: &EvaluationContext,
    ) -> Result<Option<bool>, EvaluationError> {
        Ok(match self {
            Matcher::AllKeys => Some(true),

            Matcher::InSegment(segment_name) => input
                .as_str()
                .map(|value| ctx.segment_contains(segment_name, value)),

            Matcher::Whitelist(whitelist) => input.as_str().map(|value| whitelist.contains(value)),

            Matcher::EqualTo(data_type, expected) => input.as_i64().map(|value| {
                normalize(*data_type, value, MILLIS_PER_DAY)
                    == normalize(*data_type, *expected, MILLIS_PER_DAY)
            }),
            Matcher::GreaterThanOrEqualTo(data_type, expected) => input.as_i64().map(|value| {
                normalize(*data_type, value, MILLIS_PER_MINUTE)
                    >= normalize(*data_type, *expected, MILLIS_PER_MINUTE)
            }),
            Matcher::LessThanOrEqualTo(data_type, expected) => input.as_i64().map(|value| {
                normalize(*data_type, value, MILLIS_PER_MINUTE)
                    <= normalize(*data_type, *expected, MILLIS_PER_MINUTE)
            }),
            Matcher::Between(data_type, start, end) => input.as_i64().map(|value| {
                let value = normalize(*data_type, value, MILLIS_PER_MINUTE);
                normalize(*data_type, *start, MILLIS_PER_MINUTE) <= value
                    && value <= normalize(*data_type, *end, MILLIS_PER_MINUTE)
            }),

            Matcher::EqualToSet(expected) => input.as_set().map(|set| {
                set.len() == expected.len() && set.iter().all(|v| expected.contains(*v))
            }),
            Matcher::ContainsAnyOfSet(expected) => input
                .as_set()
                .map(|set| set.iter().any(|v| expected.contains(*v))),
            Matcher::ContainsAllOfSet(expected) => input.as_set().map(|set| {
                !expected.is_empty() && expected.iter().all(|v| set.contains(v.as_str()))
            }),
            Matcher::PartOfSet(expected) => input
                .as_set()
                .map(|set| !set.is_empty() && set.iter().all(|v| expected.contains(*v))),

            Matcher::StartsWith(prefixes) => input
                .as_str()
                .map(|value| prefixes.iter().any(|p| value.starts_with(p.as_str()))),
            Matcher::EndsWith(suffixes) => input
                .as_str()
                .map(|value| suffixes.iter().any(|s| value.ends_with(s.as_str()))),
            Matcher::ContainsString(needles) => input
                .as_str()
                .map(|value| needles.iter().any(|n| value.contains(n.as_str()))),
            Matcher::MatchesString(regex) => input.as_str().map(|value| regex.is_match(value)),

            Matcher::EqualToBoolean(expected) => input.as_bool().map(|value| value == *expected),

            Matcher::Dependency {
                flag_name,
                treatments,
            } => {
                let result = ctx.evaluate_dependency(key, flag_name, attributes)?;
                Some(treatments.iter().any(|t| *t == result.treatment))
            }

            Matcher::EqualToSemver(expected) => input
                .as_str()
                .and_then(parse_semver)
                .map(|value| value == *expected),
            Matcher::GreaterThanOrEqualToSemver(expected) => input
                .as_str()
                .and_then(parse_semver)
                .map(|value| value >= *expected),
            Matcher::LessThanOrEqualToSemver(expected) => input
                .as_str()
                .and_then(parse_semver)
                .map(|value| value <= *expected),
            Matcher::BetweenSemver(start, end) => input
                .as_str()
                .and_then(parse_semver)
                .map(|value| *start <= value && value <= *end),
            Matcher::InListSemver(versions) => input
                .as_str()
                .and_then(parse_semver)
                .map(|value| versions.contains(&value)),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::Arc};

    use super::{AttributeMatcher, CombiningMatcher, MatcherError};
    use crate::{
        evaluator::Evaluator,
        models::{
            BetweenMatcherDataDto, BetweenStringMatcherDataDto, DataType, KeySelectorDto,
            MatcherDto, MatcherGroupDto, MatcherType, SegmentMatcherDataDto,
            UnaryNumericMatcherDataDto, WhitelistMatcherDataDto,
        },
        store::{FlagStore, Segment, SegmentStore},
        AttributeValue, Attributes, Key,
    };

    fn on_attribute(attribute: &str, dto: MatcherDto) -> MatcherDto {
        MatcherDto {
            key_selector: Some(KeySelectorDto {
                traffic_type: Some("user".to_owned()),
                attribute: Some(attribute.to_owned()),
            }),
            ..dto
        }
    }

    fn whitelist(ty: MatcherType, values: &[&str]) -> MatcherDto {
        MatcherDto {
            matcher_type: ty,
            whitelist_matcher_data: Some(WhitelistMatcherDataDto {
                whitelist: values.iter().map(|v| v.to_string()).collect(),
            }),
            ..Default::default()
        }
    }

    fn unary(ty: MatcherType, data_type: DataType, value: i64) -> MatcherDto {
        MatcherDto {
            matcher_type: ty,
            unary_numeric_matcher_data: Some(UnaryNumericMatcherDataDto {
                data_type: Some(data_type),
                value,
            }),
            ..Default::default()
        }
    }

    fn string(ty: MatcherType, value: &str) -> MatcherDto {
        MatcherDto {
            matcher_type: ty,
            string_matcher_data: Some(value.to_owned()),
            ..Default::default()
        }
    }

    fn evaluator() -> Evaluator {
        let segments = SegmentStore::new();
        segments.put(Segment::new(
            "employees",
            ["alice".to_owned(), "bob".to_owned()].into(),
            1,
        ));
        Evaluator::new(Arc::new(FlagStore::new()), Arc::new(segments))
    }

    /// Evaluate a single matcher against `key` and `attributes`.
    fn check(dto: MatcherDto, key: &str, attributes: &Attributes) -> bool {
        let group = CombiningMatcher::try_from(&MatcherGroupDto {
            combiner: Default::default(),
            matchers: vec![dto],
        })
        .unwrap();
        let evaluator = evaluator();
        group
            .matches(&Key::new(key), attributes, &evaluator.context())
            .unwrap()
    }

    fn attrs(name: &str, value: impl Into<AttributeValue>) -> Attributes {
        HashMap::from([(name.to_owned(), value.into())])
    }

    #[test]
    fn all_keys() {
        let dto = MatcherDto {
            matcher_type: MatcherType::AllKeys,
            ..Default::default()
        };
        assert!(check(dto, "anyone", &HashMap::new()));
    }

    #[test]
    fn negated_all_keys_never_matches() {
        let dto = MatcherDto {
            matcher_type: MatcherType::AllKeys,
            negate: true,
            ..Default::default()
        };
        assert!(!check(dto, "anyone", &HashMap::new()));
    }

    #[test]
    fn empty_group_never_matches() {
        let group = CombiningMatcher::try_from(&MatcherGroupDto {
            combiner: Default::default(),
            matchers: vec![],
        })
        .unwrap();
        let evaluator = evaluator();
        assert!(!group
            .matches(&Key::new("alice"), &HashMap::new(), &evaluator.context())
            .unwrap());
    }

    #[test]
    fn in_segment() {
        let dto = || MatcherDto {
            matcher_type: MatcherType::InSegment,
            user_defined_segment_matcher_data: Some(SegmentMatcherDataDto {
                segment_name: "employees".to_owned(),
            }),
            ..Default::default()
        };
        assert!(check(dto(), "alice", &HashMap::new()));
        assert!(!check(dto(), "mallory", &HashMap::new()));

        let unknown = MatcherDto {
            user_defined_segment_matcher_data: Some(SegmentMatcherDataDto {
                segment_name: "unknown".to_owned(),
            }),
            ..dto()
        };
        assert!(!check(unknown, "alice", &HashMap::new()));
    }

    #[test]
    fn whitelist_on_key_and_attribute() {
        let dto = || whitelist(MatcherType::Whitelist, &["alice", "bob"]);
        assert!(check(dto(), "alice", &HashMap::new()));
        assert!(!check(dto(), "charlie", &HashMap::new()));
        assert!(check(
            on_attribute("name", dto()),
            "someone",
            &attrs("name", "bob")
        ));
        assert!(!check(
            on_attribute("name", dto()),
            "someone",
            &attrs("name", 1.0)
        ));
    }

    #[test]
    fn missing_attribute_does_not_match_even_when_negated() {
        let dto = MatcherDto {
            negate: true,
            ..on_attribute("name", whitelist(MatcherType::Whitelist, &["alice"]))
        };
        assert!(!check(dto, "alice", &HashMap::new()));
    }

    #[test]
    fn negate_inverts_result() {
        let dto = || MatcherDto {
            negate: true,
            ..on_attribute("name", whitelist(MatcherType::Whitelist, &["alice"]))
        };
        assert!(!check(dto(), "x", &attrs("name", "alice")));
        assert!(check(dto(), "x", &attrs("name", "bob")));
    }

    #[test]
    fn numeric_comparisons() {
        let gte = || on_attribute("age", unary(MatcherType::GreaterThanOrEqualTo, DataType::Number, 18));
        assert!(check(gte(), "k", &attrs("age", 18i64)));
        assert!(!check(gte(), "k", &attrs("age", 17i64)));
        assert!(!check(gte(), "k", &attrs("age", 18.5)));
        assert!(!check(gte(), "k", &attrs("age", "18")));

        let lte = on_attribute("age", unary(MatcherType::LessThanOrEqualTo, DataType::Number, 18));
        assert!(check(lte, "k", &attrs("age", -3i64)));

        let eq = on_attribute("age", unary(MatcherType::EqualTo, DataType::Number, 18));
        assert!(check(eq, "k", &attrs("age", 18i64)));

        let between = || {
            on_attribute(
                "age",
                MatcherDto {
                    matcher_type: MatcherType::Between,
                    between_matcher_data: Some(BetweenMatcherDataDto {
                        data_type: Some(DataType::Number),
                        start: 10,
                        end: 20,
                    }),
                    ..Default::default()
                },
            )
        };
        assert!(check(between(), "k", &attrs("age", 10i64)));
        assert!(check(between(), "k", &attrs("age", 20i64)));
        assert!(!check(between(), "k", &attrs("age", 21i64)));
    }

    #[test]
    fn datetime_equality_compares_days() {
        // 2023-11-14T22:00:00Z, compared against 22:13:20Z the same day and the day after.
        let eq = || on_attribute("since", unary(MatcherType::EqualTo, DataType::Datetime, 1_699_999_200_000));
        assert!(check(eq(), "k", &attrs("since", 1_700_000_000_000i64)));
        assert!(!check(eq(), "k", &attrs("since", 1_700_000_000_000i64 + 86_400_000)));
    }

    #[test]
    fn datetime_comparisons_truncate_to_minutes() {
        let gte = on_attribute(
            "since",
            unary(MatcherType::GreaterThanOrEqualTo, DataType::Datetime, 1_700_000_030_000),
        );
        // Same minute, earlier second.
        assert!(check(gte, "k", &attrs("since", 1_700_000_001_000i64)));

        let lte = on_attribute(
            "since",
            unary(MatcherType::LessThanOrEqualTo, DataType::Datetime, 1_700_000_000_000),
        );
        assert!(!check(lte, "k", &attrs("since", 1_700_000_060_000i64)));
    }

    #[test]
    fn set_matchers() {
        let user_groups = || attrs("groups", vec!["admin", "beta"]);

        let equal = on_attribute("groups", whitelist(MatcherType::EqualToSet, &["beta", "admin"]));
        assert!(check(equal, "k", &user_groups()));

        let any = on_attribute("groups", whitelist(MatcherType::ContainsAnyOfSet, &["beta", "x"]));
        assert!(check(any, "k", &user_groups()));

        let all = on_attribute("groups", whitelist(MatcherType::ContainsAllOfSet, &["beta", "x"]));
        assert!(!check(all, "k", &user_groups()));

        let part = on_attribute(
            "groups",
            whitelist(MatcherType::PartOfSet, &["admin", "beta", "staff"]),
        );
        assert!(check(part, "k", &user_groups()));

        let part_of_empty =
            on_attribute("groups", whitelist(MatcherType::PartOfSet, &["admin"]));
        assert!(!check(part_of_empty, "k", &attrs("groups", Vec::<&str>::new())));

        let not_a_list = on_attribute("groups", whitelist(MatcherType::ContainsAnyOfSet, &["admin"]));
        assert!(!check(not_a_list, "k", &attrs("groups", "admin")));
    }

    #[test]
    fn string_matchers() {
        let starts = whitelist(MatcherType::StartsWith, &["ali", "bo"]);
        assert!(check(starts, "alice", &HashMap::new()));

        let ends = on_attribute("email", whitelist(MatcherType::EndsWith, &["@split.io"]));
        assert!(check(ends, "k", &attrs("email", "pato@split.io")));

        let contains = whitelist(MatcherType::ContainsString, &["lic"]);
        assert!(check(contains, "alice", &HashMap::new()));

        let regex = || on_attribute("email", string(MatcherType::MatchesString, "^test.*"));
        assert!(check(regex(), "k", &attrs("email", "test@example.com")));
        assert!(!check(regex(), "k", &attrs("email", "example@test.com")));
    }

    #[test]
    fn boolean_matcher_accepts_bools_and_strings() {
        let dto = || {
            on_attribute(
                "beta",
                MatcherDto {
                    matcher_type: MatcherType::EqualToBoolean,
                    boolean_matcher_data: Some(true),
                    ..Default::default()
                },
            )
        };
        assert!(check(dto(), "k", &attrs("beta", true)));
        assert!(check(dto(), "k", &attrs("beta", "TRUE")));
        assert!(!check(dto(), "k", &attrs("beta", false)));
        assert!(!check(dto(), "k", &attrs("beta", "yes")));
    }

    #[test]
    fn semver_matchers() {
        let gte = || on_attribute("version", string(MatcherType::GreaterThanOrEqualToSemver, "1.5.0"));
        assert!(check(gte(), "k", &attrs("version", "1.13.0")));
        assert!(!check(gte(), "k", &attrs("version", "1.2.0")));
        assert!(!check(gte(), "k", &attrs("version", "1.5.0-rc.1")));
        assert!(!check(gte(), "k", &attrs("version", "not a version")));

        let eq = on_attribute("version", string(MatcherType::EqualToSemver, "1.0.0+build.1"));
        assert!(check(eq, "k", &attrs("version", "1.0.0+build.2")));

        let between = || {
            on_attribute(
                "version",
                MatcherDto {
                    matcher_type: MatcherType::BetweenSemver,
                    between_string_matcher_data: Some(BetweenStringMatcherDataDto {
                        start: "1.0.0".to_owned(),
                        end: "2.0.0".to_owned(),
                    }),
                    ..Default::default()
                },
            )
        };
        assert!(check(between(), "k", &attrs("version", "1.9.9")));
        assert!(!check(between(), "k", &attrs("version", "2.0.1")));

        let in_list = on_attribute(
            "version",
            whitelist(MatcherType::InListSemver, &["1.0.0", "2.0.0-beta"]),
        );
        assert!(check(in_list, "k", &attrs("version", "2.0.0-beta")));
    }

    #[test]
    fn malformed_definitions_are_rejected() {
        assert_eq!(
            AttributeMatcher::try_from(&MatcherDto::default()).unwrap_err(),
            MatcherError::Unsupported
        );
        assert_eq!(
            AttributeMatcher::try_from(&MatcherDto {
                matcher_type: MatcherType::InSegment,
                ..Default::default()
            })
            .unwrap_err(),
            MatcherError::MissingData(MatcherType::InSegment)
        );
        assert!(matches!(
            AttributeMatcher::try_from(&string(MatcherType::MatchesString, "(")),
            Err(MatcherError::InvalidRegex(_))
        ));
        assert!(matches!(
            AttributeMatcher::try_from(&string(MatcherType::EqualToSemver, "1.x")),
            Err(MatcherError::InvalidSemver(_))
        ));
    }
}
