use std::collections::BTreeMap;
use std::fmt;

use graphex_match::MatchExpr;
use serde::{Deserialize, Serialize};

use crate::TargetModifier;

/// The statement type of a query, defaulting to [`Statement::Graph`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Statement {
    /// Render matching metrics as graphs.
    #[default]
    Graph,
    /// List matching metrics without rendering.
    List,
    /// Render graphs with stacked targets.
    Stack,
    /// Render graphs with line targets.
    Lines,
}

impl Statement {
    /// Returns the statement keyword.
    pub fn as_str(&self) -> &'static str {
        match self {
            Statement::Graph => "graph",
            Statement::List => "list",
            Statement::Stack => "stack",
            Statement::Lines => "lines",
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A time bucket for averaging a series over time, e.g. `10M` = 10 minutes.
///
/// Unit characters: `s`econd, `M`inute, `h`our, `d`ay, `w`eek, `mo`nth.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AvgOver {
    /// The number of time units.
    pub amount: u32,
    /// The time unit character(s).
    pub unit: String,
}

impl fmt::Display for AvgOver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit)
    }
}

/// Bucket specs per tag: an ordered, deduplicated list of substring patterns,
/// always ending with the catch-all empty bucket.
pub type BucketSpecs = BTreeMap<String, Vec<String>>;

/// A parsed query: statement, time range, grouping and aggregation specs, a
/// boolean match predicate, and the target modifiers to apply per matched
/// target during graph building.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Query {
    /// The statement type.
    pub statement: Statement,
    /// The raw match pattern tokens, for display and debugging.
    pub patterns: Vec<String>,
    /// The boolean match predicate compiled from `patterns`.
    pub ast: MatchExpr,
    /// Which tags bucket metrics into separate graphs.
    pub group_by: BucketSpecs,
    /// Which tags to sum away within a graph.
    pub sum_by: BucketSpecs,
    /// Which tags to average away within a graph.
    pub avg_by: BucketSpecs,
    /// Optional time bucket for averaging over time.
    pub avg_over: Option<AvgOver>,
    /// Lower y-axis bound.
    pub min: Option<f64>,
    /// Upper y-axis bound.
    pub max: Option<f64>,
    /// Start of the time range, passed through to rendering.
    pub from: String,
    /// End of the time range, passed through to rendering.
    pub to: String,
    /// Cap on the number of matched targets.
    pub limit_targets: usize,
    /// Free-text query for the annotations/events overlay.
    pub events_query: String,
    /// Modifiers applied to every matched target, in registration order.
    pub target_modifiers: Vec<TargetModifier>,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            statement: Statement::Graph,
            patterns: Vec::new(),
            ast: MatchExpr::all(),
            group_by: BTreeMap::new(),
            sum_by: BTreeMap::new(),
            avg_by: BTreeMap::new(),
            avg_over: None,
            min: None,
            max: None,
            from: "-24hours".to_owned(),
            to: "now".to_owned(),
            limit_targets: 500,
            events_query: "*".to_owned(),
            target_modifiers: Vec::new(),
        }
    }
}

/// Renders a bucket spec back into its query-language form, dropping the
/// implicit catch-all bucket.
fn render_buckets(specs: &BucketSpecs) -> String {
    let items: Vec<String> = specs
        .iter()
        .map(|(tag, buckets)| {
            let named: Vec<&str> = buckets
                .iter()
                .filter(|bucket| !bucket.is_empty())
                .map(String::as_str)
                .collect();
            if named.is_empty() {
                tag.clone()
            } else {
                format!("{tag}:{}", named.join("|"))
            }
        })
        .collect();
    items.join(",")
}

impl fmt::Display for Query {
    /// Re-renders the query in its own language, for logs and debugging
    /// surfaces.
    ///
    /// The rendered string is parseable again, but not guaranteed to
    /// reproduce the query byte for byte: defaults are written out
    /// explicitly and patterns injected by strong group-by tags appear as
    /// ordinary patterns.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.statement)?;
        write!(f, " from {} to {}", self.from, self.to)?;

        if !self.group_by.is_empty() {
            write!(f, " GROUP BY {}", render_buckets(&self.group_by))?;
        }
        if !self.sum_by.is_empty() {
            write!(f, " sum by {}", render_buckets(&self.sum_by))?;
        }
        if !self.avg_by.is_empty() {
            write!(f, " avg by {}", render_buckets(&self.avg_by))?;
        }
        if let Some(avg_over) = &self.avg_over {
            write!(f, " avg over {avg_over}")?;
        }
        if let Some(min) = self.min {
            write!(f, " min {min}")?;
        }
        if let Some(max) = self.max {
            write!(f, " max {max}")?;
        }
        write!(f, " limit {}", self.limit_targets)?;

        for pattern in &self.patterns {
            write!(f, " {pattern}")?;
        }
        if self.events_query != "*" {
            write!(f, " || {}", self.events_query)?;
        }

        Ok(())
    }
}
