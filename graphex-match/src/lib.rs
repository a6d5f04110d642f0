//! Match expressions over tagged metrics.
//!
//! The root type is [`MatchExpr`], a boolean expression tree built by the
//! query parser and evaluated against each metric's id and tag dictionary.
//! Expressions are plain data; [`MatchExpr::compile`] turns them into a
//! [`CompiledMatcher`] with all user-supplied regexes compiled once, so that
//! invalid patterns surface as a single [`MatchError`] before any metric is
//! visited.

#![warn(missing_docs)]

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An error returned when a match expression cannot be compiled.
#[derive(Debug, Error)]
pub enum MatchError {
    /// A user-supplied pattern is not a valid regex.
    #[error("invalid pattern '{pattern}'")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },
}

/// A boolean expression over a metric's id and tags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op")]
pub enum MatchExpr {
    /// The tag `key` must equal `term` exactly.
    #[serde(rename = "match_tag_equality")]
    TagEquality {
        /// The tag name.
        key: String,
        /// The required value.
        term: String,
    },
    /// The tag `key` must exist, with any value.
    #[serde(rename = "match_tag_exists")]
    TagExists {
        /// The tag name.
        key: String,
    },
    /// Any tag, regardless of name, must have exactly the value `term`.
    #[serde(rename = "match_any_tag_value")]
    AnyTagValue {
        /// The required value.
        term: String,
    },
    /// The tag `key` must exist and its value must contain a match of the
    /// regex `term`.
    #[serde(rename = "match_tag_regex")]
    TagRegex {
        /// The tag name.
        key: String,
        /// The value regex.
        term: String,
    },
    /// Some tag name must contain a match of the regex `key`.
    #[serde(rename = "match_tag_name_regex")]
    TagNameRegex {
        /// The tag name regex.
        key: String,
    },
    /// Some tag value must contain a match of the regex `term`.
    #[serde(rename = "match_tag_value_regex")]
    TagValueRegex {
        /// The tag value regex.
        term: String,
    },
    /// The metric's raw id must contain a match of the regex.
    #[serde(rename = "match_id_regex")]
    IdRegex {
        /// The id regex.
        pattern: String,
    },
    /// Boolean NOT of the inner expression.
    #[serde(rename = "match_negate")]
    Negate {
        /// The expression to negate.
        inner: Box<MatchExpr>,
    },
    /// True if **any** inner expression matches.
    #[serde(rename = "match_or")]
    Or {
        /// Inner expressions to combine.
        inner: Vec<MatchExpr>,
    },
    /// True if **all** inner expressions match.
    #[serde(rename = "match_and")]
    And {
        /// Inner expressions to combine.
        inner: Vec<MatchExpr>,
    },
}

impl MatchExpr {
    /// Returns an expression that matches everything.
    pub fn all() -> Self {
        Self::And { inner: Vec::new() }
    }

    /// Compiles all embedded regexes, returning a reusable matcher.
    pub fn compile(&self) -> Result<CompiledMatcher, MatchError> {
        let compiled = match self {
            MatchExpr::TagEquality { key, term } => CompiledMatcher::TagEquality {
                key: key.clone(),
                term: term.clone(),
            },
            MatchExpr::TagExists { key } => CompiledMatcher::TagExists { key: key.clone() },
            MatchExpr::AnyTagValue { term } => {
                CompiledMatcher::AnyTagValue { term: term.clone() }
            }
            MatchExpr::TagRegex { key, term } => CompiledMatcher::TagRegex {
                key: key.clone(),
                regex: compile_pattern(term)?,
            },
            MatchExpr::TagNameRegex { key } => CompiledMatcher::TagNameRegex {
                regex: compile_pattern(key)?,
            },
            MatchExpr::TagValueRegex { term } => CompiledMatcher::TagValueRegex {
                regex: compile_pattern(term)?,
            },
            MatchExpr::IdRegex { pattern } => CompiledMatcher::IdRegex {
                regex: compile_pattern(pattern)?,
            },
            MatchExpr::Negate { inner } => CompiledMatcher::Negate(Box::new(inner.compile()?)),
            MatchExpr::Or { inner } => CompiledMatcher::Or(
                inner.iter().map(MatchExpr::compile).collect::<Result<_, _>>()?,
            ),
            MatchExpr::And { inner } => CompiledMatcher::And(
                inner.iter().map(MatchExpr::compile).collect::<Result<_, _>>()?,
            ),
        };

        Ok(compiled)
    }
}

fn compile_pattern(pattern: &str) -> Result<Regex, MatchError> {
    Regex::new(pattern).map_err(|source| MatchError::InvalidPattern {
        pattern: pattern.to_owned(),
        source,
    })
}

/// A [`MatchExpr`] with all regexes compiled.
#[derive(Debug, Clone)]
pub enum CompiledMatcher {
    /// See [`MatchExpr::TagEquality`].
    TagEquality {
        /// The tag name.
        key: String,
        /// The required value.
        term: String,
    },
    /// See [`MatchExpr::TagExists`].
    TagExists {
        /// The tag name.
        key: String,
    },
    /// See [`MatchExpr::AnyTagValue`].
    AnyTagValue {
        /// The required value.
        term: String,
    },
    /// See [`MatchExpr::TagRegex`].
    TagRegex {
        /// The tag name.
        key: String,
        /// The compiled value regex.
        regex: Regex,
    },
    /// See [`MatchExpr::TagNameRegex`].
    TagNameRegex {
        /// The compiled tag name regex.
        regex: Regex,
    },
    /// See [`MatchExpr::TagValueRegex`].
    TagValueRegex {
        /// The compiled tag value regex.
        regex: Regex,
    },
    /// See [`MatchExpr::IdRegex`].
    IdRegex {
        /// The compiled id regex.
        regex: Regex,
    },
    /// Boolean NOT.
    Negate(Box<CompiledMatcher>),
    /// Short-circuiting OR.
    Or(Vec<CompiledMatcher>),
    /// Short-circuiting AND.
    And(Vec<CompiledMatcher>),
}

impl CompiledMatcher {
    /// Returns `true` if the metric with the given id and tags matches.
    ///
    /// This is a pure, total function: it never fails and has no side
    /// effects.
    pub fn matches(&self, id: &str, tags: &BTreeMap<String, String>) -> bool {
        match self {
            CompiledMatcher::TagEquality { key, term } => {
                tags.get(key).is_some_and(|value| value == term)
            }
            CompiledMatcher::TagExists { key } => tags.contains_key(key),
            CompiledMatcher::AnyTagValue { term } => tags.values().any(|value| value == term),
            CompiledMatcher::TagRegex { key, regex } => {
                tags.get(key).is_some_and(|value| regex.is_match(value))
            }
            CompiledMatcher::TagNameRegex { regex } => {
                tags.keys().any(|name| regex.is_match(name))
            }
            CompiledMatcher::TagValueRegex { regex } => {
                tags.values().any(|value| regex.is_match(value))
            }
            CompiledMatcher::IdRegex { regex } => regex.is_match(id),
            CompiledMatcher::Negate(inner) => !inner.matches(id, tags),
            CompiledMatcher::Or(inner) => inner.iter().any(|expr| expr.matches(id, tags)),
            CompiledMatcher::And(inner) => inner.iter().all(|expr| expr.matches(id, tags)),
        }
    }
}
