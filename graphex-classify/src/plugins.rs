use std::collections::BTreeMap;

use regex::Regex;

use crate::{Classification, Classifier, ClassifierRegistry, ClassifyConfig, ClassifyError};

/// A classifier driven by regexes with named capture groups.
///
/// The first pattern that matches the raw id wins; every named group that
/// participated in the match becomes a tag, and the static `extra_tags` are
/// merged in afterwards. This is the base most concrete plugins build on.
pub struct RegexClassifier {
    name: String,
    priority: i32,
    patterns: Vec<Regex>,
    extra_tags: BTreeMap<String, String>,
}

impl RegexClassifier {
    /// Compiles the given patterns into a classifier.
    pub fn new<I, K, V>(
        name: &str,
        priority: i32,
        patterns: &[&str],
        extra_tags: I,
    ) -> Result<Self, ClassifyError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let patterns = patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|source| ClassifyError::InvalidPattern {
                    pattern: (*pattern).to_owned(),
                    source,
                })
            })
            .collect::<Result<_, _>>()?;

        Ok(Self {
            name: name.to_owned(),
            priority,
            patterns,
            extra_tags: extra_tags
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        })
    }
}

impl Classifier for RegexClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn priority(&self) -> i32 {
        self.priority
    }

    fn classify(&self, raw_id: &str) -> Classification {
        for pattern in &self.patterns {
            let Some(captures) = pattern.captures(raw_id) else {
                continue;
            };

            let mut tags = self.extra_tags.clone();
            for group in pattern.capture_names().flatten() {
                if let Some(value) = captures.name(group) {
                    tags.insert(group.to_owned(), value.as_str().to_owned());
                }
            }
            return Classification::Tags(tags);
        }

        Classification::NotMine
    }
}

/// Classifies ids with embedded `key=value` path segments, e.g.
/// `foo.bar=blah.baz.target_type=rate.unit=MiB/d`.
///
/// Segments containing `=` become tags directly; plain segments become
/// positional `nN` tags by their one-based position in the path. Ids without
/// any `=` segment are not this plugin's business. When the feature is
/// disabled, applicable ids are dropped entirely rather than handed to less
/// specific plugins.
pub struct Proto2Classifier {
    enabled: bool,
}

impl Proto2Classifier {
    /// Creates the plugin from the classifier config.
    pub fn new(config: &ClassifyConfig) -> Self {
        Self {
            enabled: config.proto2_enabled,
        }
    }
}

impl Classifier for Proto2Classifier {
    fn name(&self) -> &str {
        "proto2"
    }

    fn priority(&self) -> i32 {
        50
    }

    fn classify(&self, raw_id: &str) -> Classification {
        let segments: Vec<&str> = raw_id.split('.').collect();
        if !segments.iter().any(|segment| segment.contains('=')) {
            return Classification::NotMine;
        }

        if !self.enabled {
            return Classification::Drop;
        }

        let mut tags = BTreeMap::new();
        for (position, segment) in segments.iter().enumerate() {
            match segment.split_once('=') {
                Some((key, value)) if !key.is_empty() => {
                    tags.insert(key.to_owned(), value.to_owned());
                }
                _ => {
                    tags.insert(format!("n{}", position + 1), (*segment).to_owned());
                }
            }
        }

        Classification::Tags(tags)
    }
}

/// Builds the default registry: the proto2 plugin plus a cpu plugin for
/// server-scoped ids, with the hostname prefix taken from the config.
pub fn default_registry(config: &ClassifyConfig) -> Result<ClassifierRegistry, ClassifyError> {
    let mut registry = ClassifierRegistry::new();

    registry.register(Box::new(Proto2Classifier::new(config)));

    let cpu_pattern = format!(
        r"^{}\.(?P<server>[^.]+)\.cpu\.(?P<core>[^.]+)\.(?P<type>[^.]+)$",
        config.hostname_prefix
    );
    registry.register(Box::new(RegexClassifier::new(
        "cpu",
        0,
        &[&cpu_pattern],
        [("unit", "Jiff"), ("target_type", "counter")],
    )?));

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_default_registry_compiles() {
        // Every registered plugin must have structurally valid patterns.
        let registry = default_registry(&ClassifyConfig::default()).unwrap();
        assert_eq!(registry.plugins().count(), 2);
    }

    #[test]
    fn test_proto2_disabled_drops() {
        let registry = default_registry(&ClassifyConfig::default()).unwrap();
        let raw = "foo.bar=blah.baz.target_type=rate.unit=MiB/d";
        assert_eq!(registry.classify(raw), None);
    }

    #[test]
    fn test_proto2_enabled_extracts_tags() {
        let config = ClassifyConfig {
            proto2_enabled: true,
            ..Default::default()
        };
        let registry = default_registry(&config).unwrap();

        let raw = "foo.bar=blah.baz.target_type=rate.unit=MiB/d";
        let metric = registry.classify(raw).unwrap();
        assert_eq!(
            metric.tags,
            tags(&[
                ("target_type", "rate"),
                ("unit", "MiB/d"),
                ("bar", "blah"),
                ("n1", "foo"),
                ("n3", "baz"),
            ])
        );
    }

    #[test]
    fn test_proto2_ignores_plain_ids() {
        let plugin = Proto2Classifier::new(&ClassifyConfig::default());
        assert_eq!(
            plugin.classify("servers.web1.cpu.cpu0.idle"),
            Classification::NotMine
        );
    }

    #[test]
    fn test_cpu_plugin_named_groups() {
        let registry = default_registry(&ClassifyConfig::default()).unwrap();
        let metric = registry.classify("servers.web1.cpu.cpu0.idle").unwrap();
        assert_eq!(
            metric.tags,
            tags(&[
                ("server", "web1"),
                ("core", "cpu0"),
                ("type", "idle"),
                ("unit", "Jiff"),
                ("target_type", "counter"),
            ])
        );
    }

    #[test]
    fn test_hostname_prefix_is_configurable() {
        let config = ClassifyConfig {
            hostname_prefix: "hosts".to_owned(),
            ..Default::default()
        };
        let registry = default_registry(&config).unwrap();

        assert!(registry.classify("hosts.db3.cpu.total.user").is_some());
        assert!(registry.classify("servers.db3.cpu.total.user").is_none());
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let result =
            RegexClassifier::new("bad", 0, &["(?P<open"], std::iter::empty::<(&str, &str)>());
        assert!(matches!(
            result,
            Err(ClassifyError::InvalidPattern { .. })
        ));
    }
}
