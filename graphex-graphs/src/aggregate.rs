use std::collections::BTreeSet;

use graphex_query::BucketSpecs;
use itertools::Itertools;
use serde::{Deserialize, Serialize};

use crate::{TagValue, Target};

/// The aggregation function folding several targets into one.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AggFunc {
    /// Sum the series pointwise.
    Sum,
    /// Average the series pointwise.
    Average,
}

impl AggFunc {
    /// The graphite series function implementing the fold.
    pub fn series_function(&self) -> &'static str {
        match self {
            AggFunc::Sum => "sumSeries",
            AggFunc::Average => "averageSeries",
        }
    }

    /// The short name used in aggregate descriptors.
    pub fn abbrev(&self) -> &'static str {
        match self {
            AggFunc::Sum => "sum",
            AggFunc::Average => "avg",
        }
    }

    /// The tag value marking a series as already pre-aggregated upstream,
    /// e.g. a `core=_sum_` total emitted next to per-core metrics.
    pub fn marker(&self) -> &'static str {
        match self {
            AggFunc::Sum => "_sum_",
            AggFunc::Average => "_avg_",
        }
    }
}

/// Folds two or more targets into one aggregate target.
///
/// Ids are concatenated in order and the render expressions wrapped in the
/// fold's series function. Tags and variables start from the first
/// contributor; every aggregated-by tag is replaced with a descriptor
/// carrying a summary label and the sorted contributor values, with
/// `<missing>` standing in for contributors lacking the tag.
pub fn aggregate_targets(contributors: Vec<Target>, agg_by: &BucketSpecs, func: AggFunc) -> Target {
    debug_assert!(contributors.len() >= 2);

    let mut combined = contributors[0].clone();
    combined.ids = contributors
        .iter()
        .flat_map(|target| target.ids.iter().cloned())
        .collect();
    combined.expr = format!(
        "{}({})",
        func.series_function(),
        contributors.iter().map(|target| &target.expr).join(","),
    );

    for tag in agg_by.keys() {
        if !combined.tags.contains_key(tag) {
            continue;
        }

        let mut values: Vec<String> = contributors
            .iter()
            .map(|target| match target.tags.get(tag) {
                Some(value) => value.as_str().to_owned(),
                None => "<missing>".to_owned(),
            })
            .collect();
        let uniqs = values.iter().collect::<BTreeSet<_>>().len();
        let total = values.len();
        values.sort();

        let bucket = combined
            .match_buckets
            .get(tag)
            .map(String::as_str)
            .unwrap_or("");
        let label = if bucket.is_empty() {
            format!("{} ({total} vals, {uniqs} uniqs)", func.abbrev())
        } else {
            format!("'{bucket}' {} ({total} vals, {uniqs} uniqs)", func.abbrev())
        };

        let descriptor = TagValue::Aggregated { label, values };
        combined.tags.insert(tag.clone(), descriptor.clone());
        combined.variables.insert(tag.clone(), descriptor);
    }

    combined
}
