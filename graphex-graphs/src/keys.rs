use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use graphex_query::BucketSpecs;
use regex::Regex;

use crate::TagValue;

/// The outcome of bucketing one metric's tags against the `GROUP BY` specs.
#[derive(Clone, Debug, PartialEq)]
pub struct GraphInfo {
    /// The graph key: sorted key fragments joined by `__`. Metrics with the
    /// same key land on the same graph.
    pub key: String,
    /// Tags pinned to a single value within the graph.
    pub constants: BTreeMap<String, String>,
    /// Tags that vary within the graph, with their full original values.
    pub variables: BTreeMap<String, TagValue>,
}

/// Decides which graph a metric belongs to.
///
/// Tags listed in `group_by` with a single (catch-all) bucket become graph
/// constants and contribute a `tag=value` fragment; tags with several
/// buckets contribute `tag:bucket` for the first matching bucket and stay
/// variable. Tags absent from `group_by` are variables and do not influence
/// the key. Fragments are sorted before joining, so the key does not depend
/// on tag iteration order.
pub fn graph_info(tags: &BTreeMap<String, TagValue>, group_by: &BucketSpecs) -> GraphInfo {
    let mut fragments = Vec::new();
    let mut constants = BTreeMap::new();
    let mut variables = BTreeMap::new();

    for (tag, value) in tags {
        match group_by.get(tag) {
            Some(buckets) if buckets.len() == 1 => {
                fragments.push(format!("{tag}={}", value.as_str()));
                constants.insert(tag.clone(), value.as_str().to_owned());
            }
            Some(buckets) => {
                let bucket = matching_bucket(value.as_str(), buckets);
                fragments.push(format!("{tag}:{bucket}"));
                variables.insert(tag.clone(), value.clone());
            }
            None => {
                variables.insert(tag.clone(), value.clone());
            }
        }
    }

    fragments.sort();
    GraphInfo {
        key: fragments.join("__"),
        constants,
        variables,
    }
}

/// The outcome of computing one target's aggregation identity.
#[derive(Clone, Debug, PartialEq)]
pub struct AggKey {
    /// Targets with equal keys within one graph are merged.
    pub key: String,
    /// Per aggregated tag, the bucket this target fell into.
    pub match_buckets: BTreeMap<String, String>,
}

/// Computes the aggregation key of a target's variables against a `sum by`
/// or `avg by` spec. Returns `None` when the spec is empty, i.e. no
/// aggregation was requested on this axis.
///
/// The key has three parts: the buckets found for aggregated tags the
/// target has, the aggregated tags it lacks, and the remaining variables
/// that must still match exactly. Descriptor values from earlier
/// aggregation passes have their `(N vals, M uniqs)` counts normalized to
/// `(deets)` so that already-aggregated targets with different contributor
/// counts can still merge.
pub fn agg_key(variables: &BTreeMap<String, TagValue>, agg_by: &BucketSpecs) -> Option<AggKey> {
    if agg_by.is_empty() {
        return None;
    }

    let mut found = Vec::new();
    let mut missing = Vec::new();
    let mut match_buckets = BTreeMap::new();

    for (tag, buckets) in agg_by {
        match variables.get(tag) {
            Some(value) => {
                let bucket = matching_bucket(value.as_str(), buckets);
                found.push(format!("{tag}:{bucket}"));
                match_buckets.insert(tag.clone(), bucket.to_owned());
            }
            None => missing.push(tag.as_str()),
        }
    }

    let rest: Vec<String> = variables
        .iter()
        .filter(|(tag, _)| !agg_by.contains_key(*tag))
        .map(|(tag, value)| format!("{tag}={}", normalize_deets(value.as_str())))
        .collect();

    let key = format!(
        "agg_id_found:{}__agg_id_missing:{}__variables:{}",
        found.join(","),
        missing.join(","),
        rest.join(","),
    );

    Some(AggKey { key, match_buckets })
}

/// Finds the first bucket pattern that is a substring of the value. The
/// empty catch-all bucket matches everything; if no bucket matches at all,
/// the value falls into the catch-all.
pub(crate) fn matching_bucket<'a>(value: &str, buckets: &'a [String]) -> &'a str {
    buckets
        .iter()
        .find(|bucket| value.contains(bucket.as_str()))
        .map(String::as_str)
        .unwrap_or("")
}

fn normalize_deets(value: &str) -> Cow<'_, str> {
    static DEETS: OnceLock<Regex> = OnceLock::new();
    let regex = DEETS.get_or_init(|| {
        Regex::new(r"\(\d+ vals, \d+ uniqs\)").expect("hardcoded regex must compile")
    });
    regex.replace_all(value, "(deets)")
}
