//! Checks applied to caller input before evaluation.
use std::{collections::BTreeSet, sync::OnceLock};

use regex::Regex;

use crate::Key;

/// Longest accepted matching or bucketing key.
pub const MAX_KEY_LENGTH: usize = 250;

fn is_valid_flag_set(flag_set: &str) -> bool {
    static FLAG_SET: OnceLock<Option<Regex>> = OnceLock::new();
    FLAG_SET
        .get_or_init(|| Regex::new("^[a-z0-9][_a-z0-9]{0,49}$").ok())
        .as_ref()
        .is_some_and(|regex| regex.is_match(flag_set))
}

/// Whether `key` can be evaluated. Problems are logged on behalf of `method`.
pub(crate) fn validate_key(key: &Key, method: &'static str) -> bool {
    let parts = [("matching key", Some(key.matching_key())), ("bucketing key", key.explicit_bucketing_key())];
    for (part, value) in parts {
        let Some(value) = value else {
            continue;
        };
        if value.trim().is_empty() {
            log::warn!(target: "splitio", method; "{part} must be a non-empty string");
            return false;
        }
        if value.chars().count() > MAX_KEY_LENGTH {
            log::warn!(target: "splitio", method;
                       "{part} too long, it must be at most {MAX_KEY_LENGTH} characters");
            return false;
        }
    }
    true
}

/// Trim `flag_name`, returning `None` if nothing is left.
pub(crate) fn validate_flag_name<'n>(flag_name: &'n str, method: &'static str) -> Option<&'n str> {
    let trimmed = flag_name.trim();
    if trimmed.is_empty() {
        log::warn!(target: "splitio", method; "flag name must be a non-empty string");
        return None;
    }
    if trimmed.len() != flag_name.len() {
        log::warn!(target: "splitio", method, flag_name;
                   "flag name has extra whitespace, trimming");
    }
    Some(trimmed)
}

/// Normalize flag set names: lower-case, trim, drop invalid names, sort, and deduplicate.
pub(crate) fn sanitize_flag_sets<S: AsRef<str>>(flag_sets: &[S], method: &'static str) -> Vec<String> {
    let mut sanitized = BTreeSet::new();
    for flag_set in flag_sets {
        let original = flag_set.as_ref();
        let flag_set = original.trim().to_lowercase();
        if flag_set != original {
            log::warn!(target: "splitio", method, flag_set = original;
                       "flag set name was normalized to lower case without surrounding whitespace");
        }
        if !is_valid_flag_set(&flag_set) {
            log::warn!(target: "splitio", method, flag_set:display = flag_set;
                       "you passed an invalid flag set name, it must match ^[a-z0-9][_a-z0-9]{{0,49}}$, ignoring it");
            continue;
        }
        sanitized.insert(flag_set);
    }
    sanitized.into_iter().collect()
}
