use std::collections::BTreeMap;
use std::mem;

use graphex_classify::Metric;
use graphex_query::{AvgOver, BucketSpecs, Query, Statement, TargetModifier};
use graphex_units::{ConvOp, Conversion};
use serde::{Deserialize, Serialize};

use crate::{AggFunc, GraphInfo, GraphOptions, Target, agg_key, aggregate_targets, graph_info};

/// Presentation settings accumulated on a graph while building it.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Rendering state, e.g. `stacked` or `lines`.
    pub state: Option<String>,
    /// Axis suffix style, e.g. `binary` for IEC units.
    pub suffixes: Option<String>,
    /// Lower y-axis bound.
    pub yaxis_min: Option<f64>,
    /// Upper y-axis bound.
    pub yaxis_max: Option<f64>,
}

/// One rendering unit: the targets sharing a graph key, the tags pinned
/// within it, and its presentation settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Graph {
    /// The group key this graph was bucketed under.
    pub key: String,
    /// Tags with a single value across all targets in this graph.
    pub constants: BTreeMap<String, String>,
    /// Tags with a single value across the entire matched set, displayed
    /// once globally rather than repeated per graph.
    pub promoted_constants: BTreeMap<String, String>,
    /// The renderable series.
    pub targets: Vec<Target>,
    /// Start of the rendered time range.
    pub from: String,
    /// End of the rendered time range.
    pub until: String,
    /// Presentation settings.
    pub config: GraphConfig,
}

/// Builds finished graphs from the matched subset of the metric store.
///
/// Building is a pure pipeline over its inputs: truncate, detect promoted
/// constants, bucket into graphs, aggregate, apply target modifiers, and
/// run the presentation rules. It holds no mutable state and may run
/// concurrently for independent queries.
#[derive(Debug)]
pub struct GraphBuilder<'a> {
    query: &'a Query,
    options: &'a GraphOptions,
}

impl<'a> GraphBuilder<'a> {
    /// Creates a builder for one query and the environment's presentation
    /// rules.
    pub fn new(query: &'a Query, options: &'a GraphOptions) -> Self {
        Self { query, options }
    }

    /// Builds the graphs for the matched metrics, keyed by graph key.
    pub fn build(&self, matched: &BTreeMap<String, Metric>) -> BTreeMap<String, Graph> {
        // Deterministic truncation: the map is ordered by id, so the limit
        // always keeps the same prefix for the same matched set.
        let metrics: Vec<&Metric> = matched
            .values()
            .take(self.query.limit_targets)
            .collect();

        let promoted = promoted_constants(&metrics);

        let mut graphs: BTreeMap<String, Graph> = BTreeMap::new();
        for metric in metrics {
            let mut target = Target::new(metric);
            let GraphInfo {
                key,
                mut constants,
                mut variables,
            } = graph_info(&target.tags, &self.query.group_by);

            constants.retain(|tag, _| !promoted.contains_key(tag));
            variables.retain(|tag, _| !promoted.contains_key(tag));
            target.variables = variables;

            let graph = graphs.entry(key.clone()).or_insert_with(|| Graph {
                key,
                constants,
                promoted_constants: promoted.clone(),
                targets: Vec::new(),
                from: self.query.from.clone(),
                until: self.query.to.clone(),
                config: GraphConfig::default(),
            });
            graph.targets.push(target);
        }

        for graph in graphs.values_mut() {
            aggregate(graph, &self.query.sum_by, AggFunc::Sum);
            aggregate(graph, &self.query.avg_by, AggFunc::Average);
            self.apply_modifiers(graph);
            self.finish(graph);
            self.options.apply(graph);
        }

        graphs
    }

    fn apply_modifiers(&self, graph: &mut Graph) {
        for modifier in &self.query.target_modifiers {
            match modifier {
                TargetModifier::ConvertUnit { compatibles, .. } => {
                    for target in &mut graph.targets {
                        convert_unit(target, compatibles);
                    }
                }
                TargetModifier::RelabelUnit { base_unit } => relabel_unit(graph, base_unit),
                TargetModifier::BinarySuffixes => {
                    graph.config.suffixes = Some("binary".to_owned());
                }
                TargetModifier::DeriveCounters => {
                    for target in &mut graph.targets {
                        let is_counter = target
                            .tags
                            .get("target_type")
                            .is_some_and(|value| value.as_str() == "counter");
                        if is_counter {
                            target.wrap_expr("nonNegativeDerivative");
                        }
                    }
                }
            }
        }
    }

    fn finish(&self, graph: &mut Graph) {
        if let Some(avg_over) = &self.query.avg_over {
            let interval = summarize_interval(avg_over);
            for target in &mut graph.targets {
                target.expr = format!("smartSummarize({},\"{interval}\",\"avg\")", target.expr);
            }
        }

        match self.query.statement {
            Statement::Stack => graph.config.state = Some("stacked".to_owned()),
            Statement::Lines => graph.config.state = Some("lines".to_owned()),
            Statement::Graph | Statement::List => {}
        }

        if self.query.min.is_some() {
            graph.config.yaxis_min = self.query.min;
        }
        if self.query.max.is_some() {
            graph.config.yaxis_max = self.query.max;
        }
    }
}

/// Tags present with an identical value on every matched metric. Absence
/// on even one metric disqualifies a tag.
fn promoted_constants(metrics: &[&Metric]) -> BTreeMap<String, String> {
    let Some((first, rest)) = metrics.split_first() else {
        return BTreeMap::new();
    };

    let mut promoted = first.tags.clone();
    for metric in rest {
        promoted.retain(|tag, value| metric.tags.get(tag).is_some_and(|other| *other == *value));
    }
    promoted
}

/// Replaces groups of aggregatable targets with their aggregate.
///
/// Targets sharing an aggregation key merge; single-member groups stay
/// untouched. When a group mixes raw series with upstream pre-aggregated
/// ones (marker values like `core=_sum_`), the pre-aggregated series are
/// dropped and the aggregate is recomputed from the raw members only, so
/// the same data is never counted twice. Groups consisting solely of
/// pre-aggregated series are kept as they are.
fn aggregate(graph: &mut Graph, agg_by: &BucketSpecs, func: AggFunc) {
    if agg_by.is_empty() {
        return;
    }

    let mut groups: BTreeMap<String, Vec<Target>> = BTreeMap::new();
    for mut target in mem::take(&mut graph.targets) {
        let Some(key) = agg_key(&target.variables, agg_by) else {
            graph.targets.push(target);
            continue;
        };
        target.match_buckets.extend(key.match_buckets);
        groups.entry(key.key).or_default().push(target);
    }

    for (_, mut members) in groups {
        if members.len() > 1 && members.iter().any(|target| !is_premade(target, agg_by, func)) {
            members.retain(|target| !is_premade(target, agg_by, func));
        }

        if members.len() > 1 {
            graph.targets.push(aggregate_targets(members, agg_by, func));
        } else {
            graph.targets.append(&mut members);
        }
    }
}

fn is_premade(target: &Target, agg_by: &BucketSpecs, func: AggFunc) -> bool {
    agg_by.keys().any(|tag| {
        target
            .tags
            .get(tag)
            .is_some_and(|value| value.as_str() == func.marker())
    })
}

fn convert_unit(target: &mut Target, compatibles: &BTreeMap<String, Conversion>) {
    let Some(unit) = target.tags.get("unit").map(|value| value.as_str().to_owned()) else {
        return;
    };

    let Some(conversion) = compatibles.get(&unit) else {
        graphex_log::warn!("no conversion for unit '{unit}', leaving target untouched");
        return;
    };

    match conversion.op {
        Some(ConvOp::Derive) => {
            target.expr = format!("scaleToSeconds(nonNegativeDerivative({}),1)", target.expr);
        }
        Some(ConvOp::Integrate) => target.wrap_expr("integral"),
        None => {}
    }
    target.scale_expr(conversion.multiplier);
}

fn relabel_unit(graph: &mut Graph, base_unit: &str) {
    if graph.constants.contains_key("unit") {
        graph
            .constants
            .insert("unit".to_owned(), base_unit.to_owned());
    }
    if graph.promoted_constants.contains_key("unit") {
        graph
            .promoted_constants
            .insert("unit".to_owned(), base_unit.to_owned());
    }
    for target in &mut graph.targets {
        if target.tags.contains_key("unit") {
            target.tags.insert("unit".to_owned(), base_unit.into());
        }
        if target.variables.contains_key("unit") {
            target.variables.insert("unit".to_owned(), base_unit.into());
        }
    }
}

/// Translates an `avg over` bucket into a graphite summarize interval.
fn summarize_interval(avg_over: &AvgOver) -> String {
    let unit = match avg_over.unit.as_str() {
        "M" => "min",
        "mo" => "mon",
        unit => unit,
    };
    format!("{}{unit}", avg_over.amount)
}
