use std::collections::BTreeMap;
use std::fmt;

use graphex_classify::Metric;
use serde::{Deserialize, Serialize};

/// A tag value on a target: either the plain classified value, or the
/// descriptor left behind when the tag has been aggregated away.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TagValue {
    /// The value as produced by classification.
    Plain(String),
    /// The tag was aggregated away; `label` summarizes the fold and
    /// `values` lists the folded-in values, sorted, with `<missing>`
    /// standing in for contributors that lacked the tag.
    Aggregated {
        /// Human-readable summary, e.g. `'web' sum (3 vals, 2 uniqs)`.
        label: String,
        /// The folded-in values, sorted.
        values: Vec<String>,
    },
}

impl TagValue {
    /// The display form of the value: the plain value itself, or the
    /// aggregation label.
    pub fn as_str(&self) -> &str {
        match self {
            TagValue::Plain(value) => value,
            TagValue::Aggregated { label, .. } => label,
        }
    }

    /// The plain value, if the tag has not been aggregated away.
    pub fn plain(&self) -> Option<&str> {
        match self {
            TagValue::Plain(value) => Some(value),
            TagValue::Aggregated { .. } => None,
        }
    }
}

impl From<&str> for TagValue {
    fn from(value: &str) -> Self {
        TagValue::Plain(value.to_owned())
    }
}

impl From<String> for TagValue {
    fn from(value: String) -> Self {
        TagValue::Plain(value)
    }
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One renderable series inside a graph.
///
/// A fresh target wraps a single matched metric; aggregation merges several
/// targets into one, concatenating their ids and combining their render
/// expressions.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Target {
    /// The ids of all metrics contributing to this series.
    pub ids: Vec<String>,
    /// The full tag set, with aggregated tags replaced by descriptors.
    pub tags: BTreeMap<String, TagValue>,
    /// The subset of tags that vary within the graph; drives legend labels
    /// and aggregation keys.
    pub variables: BTreeMap<String, TagValue>,
    /// For each aggregated-by tag, the bucket this target fell into.
    pub match_buckets: BTreeMap<String, String>,
    /// The render expression, in graphite function syntax.
    pub expr: String,
    /// An explicit series color, set by graph options.
    pub color: Option<String>,
}

impl Target {
    /// Creates a target for a single matched metric.
    pub fn new(metric: &Metric) -> Self {
        Self {
            ids: vec![metric.id.clone()],
            tags: metric
                .tags
                .iter()
                .map(|(key, value)| (key.clone(), TagValue::Plain(value.clone())))
                .collect(),
            variables: BTreeMap::new(),
            match_buckets: BTreeMap::new(),
            expr: metric.id.clone(),
            color: None,
        }
    }

    /// Wraps the render expression in a single-argument function.
    pub fn wrap_expr(&mut self, function: &str) {
        self.expr = format!("{function}({})", self.expr);
    }

    /// Multiplies the rendered series by a constant factor. A factor of 1
    /// is a no-op.
    pub fn scale_expr(&mut self, factor: f64) {
        if factor != 1.0 {
            self.expr = format!("scale({},{factor})", self.expr);
        }
    }
}
