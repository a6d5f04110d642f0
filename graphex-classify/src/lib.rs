//! Classification of raw metric ids into tag dictionaries.
//!
//! Raw metric identifiers such as `servers.web1.cpu.cpu0.idle` carry no
//! structure of their own. Classifier plugins decompose them into key/value
//! tags (`server=web1`, `core=cpu0`, ...) which the rest of graphex matches,
//! groups and aggregates on.
//!
//! Plugins form an explicit [`ClassifierRegistry`]: they are registered once
//! at startup, ordered by descending priority (ties broken by registration
//! order), and the first plugin that does not answer
//! [`Classification::NotMine`] decides a metric's fate.

#![warn(missing_docs)]

mod plugins;
mod store;

pub use self::plugins::*;
pub use self::store::*;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// An error returned when a classifier plugin cannot be constructed.
#[derive(Debug, Error)]
pub enum ClassifyError {
    /// A plugin's target pattern is not a valid regex.
    #[error("invalid classifier pattern '{pattern}'")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// The underlying regex error.
        #[source]
        source: regex::Error,
    },
}

/// A classified metric: the original flat identifier plus its tags.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metric {
    /// The original flat identifier.
    pub id: String,
    /// Tag name → tag value.
    pub tags: BTreeMap<String, String>,
}

impl Metric {
    /// Creates a metric from an id and tag pairs.
    pub fn new<I, K, V>(id: &str, tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            id: id.to_owned(),
            tags: tags
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }
}

/// A plugin's verdict on a raw metric id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Classification {
    /// The plugin recognizes the id; these are its tags.
    Tags(BTreeMap<String, String>),
    /// The plugin does not apply; try the next one.
    NotMine,
    /// The plugin applies, but the metric must be dropped entirely.
    Drop,
}

/// Environment-specific classifier tuning, constructed once at process
/// start and passed into plugin constructors.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifyConfig {
    /// Enables the proto2 classifier for ids with embedded `key=value`
    /// segments. When disabled, such ids are dropped rather than passed on.
    pub proto2_enabled: bool,
    /// Regex fragment matching the hostname prefix of server-scoped ids.
    pub hostname_prefix: String,
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            proto2_enabled: false,
            hostname_prefix: "servers".to_owned(),
        }
    }
}

/// A classifier plugin.
pub trait Classifier {
    /// A short name for diagnostics.
    fn name(&self) -> &str;

    /// Plugins are tried in descending priority order.
    fn priority(&self) -> i32 {
        0
    }

    /// Decides whether this plugin recognizes the raw id, and if so, what
    /// its tags are.
    fn classify(&self, raw_id: &str) -> Classification;

    /// Post-processing hook invoked after tag extraction, to rename or
    /// reshape raw captures into final tag values.
    fn sanitize(&self, _metric: &mut Metric) {}
}

/// An ordered registry of classifier plugins.
#[derive(Default)]
pub struct ClassifierRegistry {
    plugins: Vec<Box<dyn Classifier + Send + Sync>>,
}

impl ClassifierRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a plugin, keeping the registry sorted by descending
    /// priority. Registration order breaks ties.
    pub fn register(&mut self, plugin: Box<dyn Classifier + Send + Sync>) {
        self.plugins.push(plugin);
        self.plugins.sort_by_key(|plugin| -plugin.priority());
    }

    /// Returns the registered plugins, in evaluation order.
    pub fn plugins(&self) -> impl Iterator<Item = &(dyn Classifier + Send + Sync)> {
        self.plugins.iter().map(Box::as_ref)
    }

    /// Classifies one raw id: the first plugin not answering
    /// [`Classification::NotMine`] wins. Returns `None` if no plugin
    /// recognizes the id or the winning plugin drops it.
    pub fn classify(&self, raw_id: &str) -> Option<Metric> {
        for plugin in &self.plugins {
            match plugin.classify(raw_id) {
                Classification::NotMine => continue,
                Classification::Drop => return None,
                Classification::Tags(tags) => {
                    let mut metric = Metric {
                        id: raw_id.to_owned(),
                        tags,
                    };
                    plugin.sanitize(&mut metric);
                    return Some(metric);
                }
            }
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    struct Fixed {
        name: &'static str,
        priority: i32,
        verdict: Classification,
    }

    impl Classifier for Fixed {
        fn name(&self) -> &str {
            self.name
        }

        fn priority(&self) -> i32 {
            self.priority
        }

        fn classify(&self, _raw_id: &str) -> Classification {
            self.verdict.clone()
        }
    }

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_priority_order_first_answer_wins() {
        let mut registry = ClassifierRegistry::new();
        registry.register(Box::new(Fixed {
            name: "low",
            priority: 0,
            verdict: Classification::Tags(tags(&[("plugin", "low")])),
        }));
        registry.register(Box::new(Fixed {
            name: "skip",
            priority: 10,
            verdict: Classification::NotMine,
        }));
        registry.register(Box::new(Fixed {
            name: "high",
            priority: 5,
            verdict: Classification::Tags(tags(&[("plugin", "high")])),
        }));

        let names: Vec<_> = registry.plugins().map(Classifier::name).collect();
        assert_eq!(names, vec!["skip", "high", "low"]);

        let metric = registry.classify("whatever").unwrap();
        assert_eq!(metric.tags["plugin"], "high");
    }

    #[test]
    fn test_registration_order_breaks_ties() {
        let mut registry = ClassifierRegistry::new();
        registry.register(Box::new(Fixed {
            name: "first",
            priority: 0,
            verdict: Classification::NotMine,
        }));
        registry.register(Box::new(Fixed {
            name: "second",
            priority: 0,
            verdict: Classification::NotMine,
        }));

        let names: Vec<_> = registry.plugins().map(Classifier::name).collect();
        assert_eq!(names, vec!["first", "second"]);
        assert_eq!(registry.classify("x"), None);
    }

    #[test]
    fn test_drop_ends_classification() {
        let mut registry = ClassifierRegistry::new();
        registry.register(Box::new(Fixed {
            name: "dropper",
            priority: 10,
            verdict: Classification::Drop,
        }));
        registry.register(Box::new(Fixed {
            name: "fallback",
            priority: 0,
            verdict: Classification::Tags(tags(&[("plugin", "fallback")])),
        }));

        assert_eq!(registry.classify("x"), None);
    }

    #[test]
    fn test_sanitize_reshapes_tags() {
        // A combined capture such as `wt=B_rate` is split by the sanitize
        // hook into separate unit and type tags.
        struct Combined;

        impl Classifier for Combined {
            fn name(&self) -> &str {
                "combined"
            }

            fn classify(&self, _raw_id: &str) -> Classification {
                Classification::Tags(tags(&[("wt", "B_rate")]))
            }

            fn sanitize(&self, metric: &mut Metric) {
                if let Some(combined) = metric.tags.remove("wt") {
                    if let Some((unit, ty)) = combined.split_once('_') {
                        metric.tags.insert("unit".to_owned(), unit.to_owned());
                        metric.tags.insert("type".to_owned(), ty.to_owned());
                    }
                }
            }
        }

        let mut registry = ClassifierRegistry::new();
        registry.register(Box::new(Combined));

        let metric = registry.classify("some.metric").unwrap();
        assert_eq!(metric.tags, tags(&[("unit", "B"), ("type", "rate")]));
    }
}
