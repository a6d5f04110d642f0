use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::Graph;

/// Presentation fields merged into a graph when a rule fires.
///
/// `None` fields are left untouched. The `color` field is special: it is
/// matched and applied per target rather than per graph.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphPatch {
    /// Rendering state, e.g. `stacked` or `lines`.
    pub state: Option<String>,
    /// Axis suffix style, e.g. `binary` for IEC units.
    pub suffixes: Option<String>,
    /// Lower y-axis bound.
    pub yaxis_min: Option<f64>,
    /// Upper y-axis bound.
    pub yaxis_max: Option<f64>,
    /// Series color for matching targets.
    pub color: Option<String>,
}

/// What to do when a rule's match conditions hold.
#[derive(Clone)]
pub enum GraphAction {
    /// Shallow-merge a patch into the graph (and matching targets).
    Merge(GraphPatch),
    /// Run an arbitrary adjustment against the graph.
    Custom(Arc<dyn Fn(&mut Graph) + Send + Sync>),
}

impl fmt::Debug for GraphAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphAction::Merge(patch) => f.debug_tuple("Merge").field(patch).finish(),
            GraphAction::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// One presentation rule: tag conditions plus the action to apply.
///
/// Conditions AND across tags and OR within each tag's value list.
#[derive(Clone, Debug)]
pub struct GraphOption {
    /// Tag name to accepted values.
    pub rules: BTreeMap<String, Vec<String>>,
    /// The action taken when all conditions hold.
    pub action: GraphAction,
}

/// An ordered rule list applied to every finished graph. Multiple rules
/// may fire; later rules override earlier ones where they overlap.
#[derive(Clone, Debug, Default)]
pub struct GraphOptions {
    options: Vec<GraphOption>,
}

impl GraphOptions {
    /// Creates an empty rule list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a merge rule.
    pub fn merge<I, K, V>(&mut self, rules: I, patch: GraphPatch)
    where
        I: IntoIterator<Item = (K, Vec<V>)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.options.push(GraphOption {
            rules: collect_rules(rules),
            action: GraphAction::Merge(patch),
        });
    }

    /// Appends a custom adjustment rule.
    pub fn custom<I, K, V, F>(&mut self, rules: I, adjust: F)
    where
        I: IntoIterator<Item = (K, Vec<V>)>,
        K: Into<String>,
        V: Into<String>,
        F: Fn(&mut Graph) + Send + Sync + 'static,
    {
        self.options.push(GraphOption {
            rules: collect_rules(rules),
            action: GraphAction::Custom(Arc::new(adjust)),
        });
    }

    /// Applies all rules to a finished graph, in order.
    ///
    /// Graph-level conditions are matched against the union of the graph's
    /// constants and promoted constants; the `color` field of a merge patch
    /// is instead matched against each target's own tags.
    pub fn apply(&self, graph: &mut Graph) {
        for option in &self.options {
            let graph_matches = {
                let context: BTreeMap<&str, &str> = graph
                    .constants
                    .iter()
                    .chain(graph.promoted_constants.iter())
                    .map(|(tag, value)| (tag.as_str(), value.as_str()))
                    .collect();
                rules_match(&option.rules, &context)
            };

            match &option.action {
                GraphAction::Merge(patch) => {
                    if graph_matches {
                        if let Some(state) = &patch.state {
                            graph.config.state = Some(state.clone());
                        }
                        if let Some(suffixes) = &patch.suffixes {
                            graph.config.suffixes = Some(suffixes.clone());
                        }
                        if let Some(min) = patch.yaxis_min {
                            graph.config.yaxis_min = Some(min);
                        }
                        if let Some(max) = patch.yaxis_max {
                            graph.config.yaxis_max = Some(max);
                        }
                    }

                    if let Some(color) = &patch.color {
                        for target in &mut graph.targets {
                            let target_matches = {
                                let context: BTreeMap<&str, &str> = target
                                    .tags
                                    .iter()
                                    .map(|(tag, value)| (tag.as_str(), value.as_str()))
                                    .collect();
                                rules_match(&option.rules, &context)
                            };
                            if target_matches {
                                target.color = Some(color.clone());
                            }
                        }
                    }
                }
                GraphAction::Custom(adjust) => {
                    if graph_matches {
                        adjust(graph);
                    }
                }
            }
        }
    }
}

fn collect_rules<I, K, V>(rules: I) -> BTreeMap<String, Vec<String>>
where
    I: IntoIterator<Item = (K, Vec<V>)>,
    K: Into<String>,
    V: Into<String>,
{
    rules
        .into_iter()
        .map(|(tag, values)| (tag.into(), values.into_iter().map(Into::into).collect()))
        .collect()
}

fn rules_match(rules: &BTreeMap<String, Vec<String>>, context: &BTreeMap<&str, &str>) -> bool {
    rules.iter().all(|(tag, allowed)| {
        context
            .get(tag.as_str())
            .is_some_and(|value| allowed.iter().any(|candidate| candidate == value))
    })
}

#[cfg(test)]
mod tests {
    use graphex_classify::Metric;
    use similar_asserts::assert_eq;

    use crate::{GraphConfig, Target};

    use super::*;

    fn sample_graph() -> Graph {
        let mut graph = Graph {
            key: "type=idle".to_owned(),
            constants: BTreeMap::from([("type".to_owned(), "idle".to_owned())]),
            promoted_constants: BTreeMap::from([("unit".to_owned(), "Jiff".to_owned())]),
            targets: Vec::new(),
            from: "-24hours".to_owned(),
            until: "now".to_owned(),
            config: GraphConfig::default(),
        };
        graph.targets.push(Target::new(&Metric::new(
            "servers.web1.cpu.cpu0.idle",
            [("type", "idle"), ("core", "cpu0")],
        )));
        graph.targets.push(Target::new(&Metric::new(
            "servers.web1.cpu.total.idle",
            [("type", "idle"), ("core", "_sum_")],
        )));
        graph
    }

    #[test]
    fn test_merge_rule_fires_on_constants() {
        let mut options = GraphOptions::new();
        options.merge(
            [("type", vec!["idle", "iowait"])],
            GraphPatch {
                state: Some("stacked".to_owned()),
                yaxis_max: Some(100.0),
                ..Default::default()
            },
        );

        let mut graph = sample_graph();
        options.apply(&mut graph);
        assert_eq!(graph.config.state.as_deref(), Some("stacked"));
        assert_eq!(graph.config.yaxis_max, Some(100.0));
        assert_eq!(graph.config.yaxis_min, None);
    }

    #[test]
    fn test_promoted_constants_participate_in_matching() {
        let mut options = GraphOptions::new();
        options.merge(
            [("unit", vec!["Jiff"])],
            GraphPatch {
                suffixes: Some("binary".to_owned()),
                ..Default::default()
            },
        );

        let mut graph = sample_graph();
        options.apply(&mut graph);
        assert_eq!(graph.config.suffixes.as_deref(), Some("binary"));
    }

    #[test]
    fn test_non_matching_rule_is_a_noop() {
        let mut options = GraphOptions::new();
        options.merge(
            [("type", vec!["user"])],
            GraphPatch {
                state: Some("stacked".to_owned()),
                ..Default::default()
            },
        );

        let mut graph = sample_graph();
        options.apply(&mut graph);
        assert_eq!(graph.config.state, None);
    }

    #[test]
    fn test_color_matches_per_target() {
        let mut options = GraphOptions::new();
        options.merge(
            [("core", vec!["_sum_"])],
            GraphPatch {
                color: Some("#aaffaa".to_owned()),
                ..Default::default()
            },
        );

        let mut graph = sample_graph();
        options.apply(&mut graph);
        assert_eq!(graph.targets[0].color, None);
        assert_eq!(graph.targets[1].color.as_deref(), Some("#aaffaa"));
    }

    #[test]
    fn test_custom_rule_adjusts_graph() {
        let mut options = GraphOptions::new();
        options.custom([("type", vec!["idle"])], |graph: &mut Graph| {
            graph.targets.retain(|target| target.color.is_none());
            graph.config.state = Some("lines".to_owned());
        });

        let mut graph = sample_graph();
        graph.targets[1].color = Some("#ff0000".to_owned());
        options.apply(&mut graph);
        assert_eq!(graph.targets.len(), 1);
        assert_eq!(graph.config.state.as_deref(), Some("lines"));
    }

    #[test]
    fn test_later_rules_override_earlier() {
        let mut options = GraphOptions::new();
        options.merge(
            [("type", vec!["idle"])],
            GraphPatch {
                state: Some("stacked".to_owned()),
                ..Default::default()
            },
        );
        options.merge(
            [("type", vec!["idle"])],
            GraphPatch {
                state: Some("lines".to_owned()),
                ..Default::default()
            },
        );

        let mut graph = sample_graph();
        options.apply(&mut graph);
        assert_eq!(graph.config.state.as_deref(), Some("lines"));
    }
}
