//! Parsed flag definitions and the per-flag evaluation algorithm.
use std::collections::{HashMap, HashSet};

use crate::{
    evaluator::{labels, EvaluationContext, EvaluationResult},
    matchers::CombiningMatcher,
    models::{ConditionDto, ConditionType, FlagDto},
    splitter::{self, Algorithm},
    Attributes, EvaluationError, Key, CONTROL_TREATMENT,
};

/// An immutable, parsed flag definition.
///
/// Flags are never patched in place: every change received from the control plane replaces the
/// whole definition.
#[derive(Debug)]
pub struct Flag {
    name: String,
    traffic_type_name: Option<String>,
    traffic_allocation: i32,
    traffic_allocation_seed: i32,
    seed: i32,
    killed: bool,
    default_treatment: String,
    change_number: i64,
    algorithm: Algorithm,
    conditions: Vec<Condition>,
    configurations: HashMap<String, String>,
    sets: HashSet<String>,
}

#[derive(Debug)]
struct Condition {
    condition_type: ConditionType,
    matcher: CombiningMatcher,
    partitions: Vec<Partition>,
    label: String,
}

/// A weighted treatment of a condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    /// Treatment served to keys falling in this partition.
    pub treatment: String,
    /// Weight in percent. Weights of a condition are expected, but not required, to sum to 100.
    pub size: i32,
}

impl From<FlagDto> for Flag {
    fn from(dto: FlagDto) -> Flag {
        let conditions = match dto
            .conditions
            .iter()
            .map(Condition::try_from)
            .collect::<Result<Vec<_>, _>>()
        {
            Ok(conditions) => conditions,
            Err(err) => {
                log::warn!(target: "splitio",
                           flag_name:display = dto.name,
                           change_number = dto.change_number,
                           error:display = err;
                           "flag uses targeting rules this sdk cannot interpret, serving control");
                vec![Condition::unsupported()]
            }
        };

        Flag {
            name: dto.name,
            traffic_type_name: dto.traffic_type_name,
            traffic_allocation: dto.traffic_allocation,
            traffic_allocation_seed: dto.traffic_allocation_seed,
            seed: dto.seed,
            killed: dto.killed,
            default_treatment: dto.default_treatment,
            change_number: dto.change_number,
            algorithm: Algorithm::from_id(dto.algo),
            conditions,
            configurations: dto.configurations.unwrap_or_default(),
            sets: dto.sets.unwrap_or_default().into_iter().collect(),
        }
    }
}

impl TryFrom<&ConditionDto> for Condition {
    type Error = crate::matchers::MatcherError;

    fn try_from(dto: &ConditionDto) -> Result<Self, Self::Error> {
        Ok(Condition {
            condition_type: dto.condition_type,
            matcher: CombiningMatcher::try_from(&dto.matcher_group)?,
            partitions: dto
                .partitions
                .iter()
                .map(|p| Partition {
                    treatment: p.treatment.clone(),
                    size: p.size,
                })
                .collect(),
            label: dto.label.clone(),
        })
    }
}

impl Condition {
    /// Catch-all condition served in place of rules that could not be parsed.
    fn unsupported() -> Condition {
        Condition {
            condition_type: ConditionType::Rollout,
            matcher: CombiningMatcher::all_keys(),
            partitions: vec![Partition {
                treatment: CONTROL_TREATMENT.to_owned(),
                size: 100,
            }],
            label: labels::UNSUPPORTED_MATCHER.to_owned(),
        }
    }
}

impl Flag {
    /// Unique flag name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Version of this definition.
    pub fn change_number(&self) -> i64 {
        self.change_number
    }

    /// Kind of key the flag is evaluated for.
    pub fn traffic_type_name(&self) -> Option<&str> {
        self.traffic_type_name.as_deref()
    }

    /// Whether the flag serves its default treatment to everyone.
    pub fn killed(&self) -> bool {
        self.killed
    }

    /// Treatment served when no condition matches or the flag is killed.
    pub fn default_treatment(&self) -> &str {
        &self.default_treatment
    }

    /// Flag sets this flag belongs to.
    pub fn sets(&self) -> &HashSet<String> {
        &self.sets
    }

    /// Configuration payload attached to `treatment`, if any.
    pub fn configuration(&self, treatment: &str) -> Option<&str> {
        self.configurations.get(treatment).map(String::as_str)
    }

    /// Names of all segments referenced by this flag's conditions.
    pub fn segment_names(&self) -> impl Iterator<Item = &str> {
        self.conditions
            .iter()
            .flat_map(|condition| condition.matcher.segment_names())
    }

    /// Evaluate the flag for `key`.
    ///
    /// Conditions are tried in order. The first matching condition decides the treatment, subject
    /// to the traffic allocation check for rollout conditions.
    pub(crate) fn evaluate(
        &self,
        key: &Key,
        attributes: &Attributes,
        ctx: &EvaluationContext,
    ) -> Result<EvaluationResult, EvaluationError> {
        if self.killed {
            return Ok(self.result(&self.default_treatment, labels::KILLED));
        }

        for condition in &self.conditions {
            let matches = condition
                .matcher
                .matches(key, attributes, ctx)
                .map_err(|err| err.within(&self.name, self.change_number))?;
            if !matches {
                continue;
            }

            if condition.condition_type == ConditionType::Rollout && self.traffic_allocation < 100
            {
                let bucket = self
                    .algorithm
                    .bucket(key.bucketing_key(), self.traffic_allocation_seed)
                    .map_err(|err| self.hashing_error(&err))?;
                if bucket > self.traffic_allocation {
                    return Ok(self.result(&self.default_treatment, labels::NOT_IN_SPLIT));
                }
            }

            let treatment = splitter::get_treatment(
                key.bucketing_key(),
                self.seed,
                &condition.partitions,
                self.algorithm,
            )
            .map_err(|err| self.hashing_error(&err))?;
            return Ok(self.result(treatment, &condition.label));
        }

        Ok(self.result(&self.default_treatment, labels::DEFAULT_RULE))
    }

    fn hashing_error(&self, err: &std::io::Error) -> EvaluationError {
        EvaluationError::Hashing {
            flag_name: self.name.clone(),
            change_number: self.change_number,
            kind: err.kind(),
        }
    }

    fn result(&self, treatment: &str, label: &str) -> EvaluationResult {
        EvaluationResult {
            treatment: treatment.to_owned(),
            label: label.to_owned(),
            change_number: Some(self.change_number),
            configuration: self.configuration(treatment).map(str::to_owned),
        }
    }
}
