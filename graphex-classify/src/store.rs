use std::collections::BTreeMap;

use graphex_match::CompiledMatcher;

use crate::{ClassifierRegistry, Metric};

/// An immutable snapshot of all classified metrics, keyed by id.
///
/// The store is built once from a raw id list and then only read; queries
/// running concurrently each hold their own snapshot, so no locking is
/// needed inside the match/group/aggregate pipeline. Refreshing happens
/// out-of-band by building a new store and swapping it in atomically.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MetricStore {
    metrics: BTreeMap<String, Metric>,
}

impl MetricStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a store by running the classifier registry over every raw id.
    ///
    /// Unrecognized and dropped ids are skipped.
    pub fn from_raw_ids<I>(raw_ids: I, registry: &ClassifierRegistry) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut metrics = BTreeMap::new();
        let mut total = 0usize;

        for raw_id in raw_ids {
            total += 1;
            if let Some(metric) = registry.classify(raw_id.as_ref()) {
                metrics.insert(metric.id.clone(), metric);
            }
        }

        graphex_log::debug!("classified {} of {} raw metric ids", metrics.len(), total);
        Self { metrics }
    }

    /// Inserts a single metric, for tests and incremental assembly.
    pub fn insert(&mut self, metric: Metric) {
        self.metrics.insert(metric.id.clone(), metric);
    }

    /// Looks up one metric by id.
    pub fn get(&self, id: &str) -> Option<&Metric> {
        self.metrics.get(id)
    }

    /// The number of metrics in the snapshot.
    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    /// Returns `true` if the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    /// Iterates over all metrics, ordered by id.
    pub fn iter(&self) -> impl Iterator<Item = &Metric> {
        self.metrics.values()
    }

    /// Returns the subset of metrics matching the compiled predicate,
    /// keyed by id.
    pub fn filter(&self, matcher: &CompiledMatcher) -> BTreeMap<String, Metric> {
        self.metrics
            .iter()
            .filter(|(id, metric)| matcher.matches(id, &metric.tags))
            .map(|(id, metric)| (id.clone(), metric.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use graphex_match::MatchExpr;
    use similar_asserts::assert_eq;

    use crate::{ClassifyConfig, default_registry};

    use super::*;

    #[test]
    fn test_from_raw_ids_skips_unrecognized() {
        graphex_log::init_test!();
        let registry = default_registry(&ClassifyConfig::default()).unwrap();
        let store = MetricStore::from_raw_ids(
            [
                "servers.web1.cpu.cpu0.idle",
                "servers.web1.cpu.cpu0.iowait",
                "not.a.known.shape",
            ],
            &registry,
        );

        assert_eq!(store.len(), 2);
        let metric = store.get("servers.web1.cpu.cpu0.idle").unwrap();
        assert_eq!(metric.tags["core"], "cpu0");
    }

    #[test]
    fn test_filter_returns_matching_subset() {
        let registry = default_registry(&ClassifyConfig::default()).unwrap();
        let store = MetricStore::from_raw_ids(
            [
                "servers.web1.cpu.cpu0.idle",
                "servers.web2.cpu.cpu0.idle",
                "servers.web2.cpu.cpu1.iowait",
            ],
            &registry,
        );

        let matcher = MatchExpr::TagEquality {
            key: "server".to_owned(),
            term: "web2".to_owned(),
        }
        .compile()
        .unwrap();

        let matched = store.filter(&matcher);
        assert_eq!(
            matched.keys().collect::<Vec<_>>(),
            vec![
                "servers.web2.cpu.cpu0.idle",
                "servers.web2.cpu.cpu1.iowait",
            ]
        );
    }
}
