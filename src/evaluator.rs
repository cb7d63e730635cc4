//! Stateless flag evaluation over the replica.
use std::{collections::HashMap, sync::Arc};

use serde::Serialize;

use crate::{
    store::{FlagStore, SegmentStore},
    Attributes, EvaluationError, Key, CONTROL_TREATMENT,
};

/// Diagnostic labels explaining why a treatment was chosen.
pub mod labels {
    /// The flag is killed.
    pub const KILLED: &str = "killed";
    /// The flag is not in the replica.
    pub const DEFINITION_NOT_FOUND: &str = "definition not found";
    /// The key is outside the traffic allocation.
    pub const NOT_IN_SPLIT: &str = "not in split";
    /// No condition matched.
    pub const DEFAULT_RULE: &str = "default rule";
    /// Evaluation failed.
    pub const EXCEPTION: &str = "exception";
    /// The definition uses a matcher this SDK cannot interpret.
    pub const UNSUPPORTED_MATCHER: &str = "targeting rule type unsupported by sdk";
}

/// Flags depending on flags nest at most this deep.
const MAX_DEPENDENCY_DEPTH: usize = 10;

/// Outcome of evaluating a flag for a key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    /// Treatment served to the key.
    pub treatment: String,
    /// Why the treatment was chosen: a condition label or one of [`labels`].
    pub label: String,
    /// Change number of the evaluated flag. `None` when the flag is unknown.
    pub change_number: Option<i64>,
    /// Configuration payload attached to the treatment.
    pub configuration: Option<String>,
}

impl EvaluationResult {
    pub(crate) fn control(label: &str, change_number: Option<i64>) -> EvaluationResult {
        EvaluationResult {
            treatment: CONTROL_TREATMENT.to_owned(),
            label: label.to_owned(),
            change_number,
            configuration: None,
        }
    }
}

/// Evaluates flags against the current contents of the stores.
///
/// The evaluator holds no state of its own, so evaluations are deterministic: the same key,
/// attributes, and replica always produce the same result.
#[derive(Clone)]
pub struct Evaluator {
    flags: Arc<FlagStore>,
    segments: Arc<SegmentStore>,
}

impl Evaluator {
    /// Create an evaluator reading from `flags` and `segments`.
    pub fn new(flags: Arc<FlagStore>, segments: Arc<SegmentStore>) -> Evaluator {
        Evaluator { flags, segments }
    }

    /// Evaluate a single flag.
    ///
    /// An unknown flag evaluates to `control` with the `definition not found` label. Faults while
    /// interpreting the definition are returned as errors.
    pub fn evaluate(
        &self,
        key: &Key,
        flag_name: &str,
        attributes: &Attributes,
    ) -> Result<EvaluationResult, EvaluationError> {
        self.context().evaluate(key, flag_name, attributes)
    }

    /// Evaluate each flag of `flag_names` independently.
    pub fn evaluate_many<S: AsRef<str>>(
        &self,
        key: &Key,
        flag_names: &[S],
        attributes: &Attributes,
    ) -> HashMap<String, Result<EvaluationResult, EvaluationError>> {
        flag_names
            .iter()
            .map(|name| {
                let name = name.as_ref();
                (name.to_owned(), self.evaluate(key, name, attributes))
            })
            .collect()
    }

    /// Evaluate every flag tagged with one of `flag_sets`.
    pub fn evaluate_by_flag_sets(
        &self,
        key: &Key,
        flag_sets: &[String],
        attributes: &Attributes,
    ) -> HashMap<String, Result<EvaluationResult, EvaluationError>> {
        let names = self.flags.names_by_flag_sets(flag_sets);
        self.evaluate_many(key, names.as_slice(), attributes)
    }

    pub(crate) fn context(&self) -> EvaluationContext<'_> {
        EvaluationContext {
            evaluator: self,
            depth: 0,
        }
    }
}

/// Read-only view used for the duration of one evaluation.
pub(crate) struct EvaluationContext<'a> {
    evaluator: &'a Evaluator,
    /// Number of dependency matchers crossed to reach the flag being evaluated.
    depth: usize,
}

impl EvaluationContext<'_> {
    fn evaluate(
        &self,
        key: &Key,
        flag_name: &str,
        attributes: &Attributes,
    ) -> Result<EvaluationResult, EvaluationError> {
        let Some(flag) = self.evaluator.flags.get(flag_name) else {
            return Ok(EvaluationResult::control(labels::DEFINITION_NOT_FOUND, None));
        };

        let result = flag.evaluate(key, attributes, self)?;
        log::trace!(target: "splitio",
                    flag_name,
                    matching_key = key.matching_key(),
                    treatment:display = result.treatment,
                    label:display = result.label;
                    "evaluated flag");
        Ok(result)
    }

    pub(crate) fn segment_contains(&self, segment_name: &str, key: &str) -> bool {
        self.evaluator.segments.contains(segment_name, key)
    }

    /// Evaluate `flag_name` on behalf of a dependency matcher.
    pub(crate) fn evaluate_dependency(
        &self,
        key: &Key,
        flag_name: &str,
        attributes: &Attributes,
    ) -> Result<EvaluationResult, EvaluationError> {
        if self.depth >= MAX_DEPENDENCY_DEPTH {
            return Err(EvaluationError::DependencyDepthExceeded {
                flag_name: flag_name.to_owned(),
                change_number: self
                    .evaluator
                    .flags
                    .get(flag_name)
                    .map_or(-1, |flag| flag.change_number()),
            });
        }
        EvaluationContext {
            evaluator: self.evaluator,
            depth: self.depth + 1,
        }
        .evaluate(key, flag_name, attributes)
    }
}
