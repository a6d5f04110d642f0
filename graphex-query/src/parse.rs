use std::collections::BTreeSet;
use std::sync::OnceLock;

use graphex_units::parse_number_with_prefix;
use regex::Regex;

use crate::{AvgOver, Query, QueryError, Statement, allow_compatible_units, build_ast};

macro_rules! clause_regex {
    ($pattern:expr) => {{
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new($pattern).unwrap())
    }};
}

/// Removes the first match of `regex` from `text` and returns its first
/// capture group.
///
/// The match is replaced with a single space so surrounding tokens stay
/// separated.
fn extract(text: &mut String, regex: &Regex) -> Option<String> {
    let captures = regex.captures(text)?;
    let range = captures.get(0)?.range();
    let value = captures
        .get(1)
        .map_or_else(String::new, |group| group.as_str().to_owned());
    text.replace_range(range, " ");
    Some(value)
}

/// Parses a comma-separated bucket spec: each item is either `tagname` or
/// `tagname:bucket1|bucket2|...`. Duplicates are removed preserving
/// first-seen order, and the catch-all empty bucket is always last.
fn build_buckets(spec: &str) -> Vec<(String, Vec<String>)> {
    spec.split(',')
        .filter(|item| !item.is_empty())
        .map(|item| {
            let (tag, bucket_list) = match item.split_once(':') {
                Some((tag, list)) => (tag, list.split('|').collect::<Vec<_>>()),
                None => (item, Vec::new()),
            };

            let mut buckets: Vec<String> = Vec::new();
            for bucket in bucket_list {
                if !bucket.is_empty() && !buckets.iter().any(|seen| seen == bucket) {
                    buckets.push(bucket.to_owned());
                }
            }
            buckets.push(String::new());

            (tag.to_owned(), buckets)
        })
        .collect()
}

impl Query {
    /// Parses one free-text query string.
    ///
    /// Clauses may appear anywhere in the string and are located by
    /// search-and-remove; whatever tokens remain become match patterns.
    /// Malformed clauses degrade on a best-effort basis, except for `min`
    /// and `max` bounds which must be numbers with an optional scale prefix.
    pub fn parse(input: &str) -> Result<Query, QueryError> {
        let mut query = Query::default();
        let mut text = input.to_owned();

        // Everything after the first `||` is the events overlay query.
        if let Some((head, events)) = text.split_once("||") {
            query.events_query = events.trim().to_owned();
            text = head.to_owned();
        }

        if let Some(statement) =
            extract(&mut text, clause_regex!(r"^\s*(graph|list|stack|lines)\b"))
        {
            query.statement = match statement.as_str() {
                "list" => Statement::List,
                "stack" => Statement::Stack,
                "lines" => Statement::Lines,
                _ => Statement::Graph,
            };
        }

        if let Some(to) = extract(&mut text, clause_regex!(r"\bto ([^ ]+)")) {
            query.to = to;
        }
        if let Some(from) = extract(&mut text, clause_regex!(r"\bfrom ([^ ]+)")) {
            query.from = from;
        }

        // Metrics are grouped by target_type and unit (both required to
        // exist, via the trailing '=') and by server, unless the user says
        // otherwise. Uppercase GROUP BY replaces this default wholly; the
        // lowercase form merges into it.
        let mut group_entries: Vec<(String, Vec<String>)> = vec![
            ("target_type=".to_owned(), vec![String::new()]),
            ("unit=".to_owned(), vec![String::new()]),
            ("server".to_owned(), vec![String::new()]),
        ];
        let mut explicit_group_tags = BTreeSet::new();

        if let Some(spec) = extract(&mut text, clause_regex!(r"\bGROUP BY ([^ ]+)")) {
            group_entries = build_buckets(&spec);
            explicit_group_tags = group_entries
                .iter()
                .map(|(tag, _)| tag.trim_end_matches('=').to_owned())
                .collect();
        } else if let Some(spec) = extract(&mut text, clause_regex!(r"\bgroup by ([^ ]+)")) {
            for (tag, buckets) in build_buckets(&spec) {
                let name = tag.trim_end_matches('=').to_owned();
                explicit_group_tags.insert(name.clone());
                let existing = group_entries
                    .iter_mut()
                    .find(|(existing, _)| existing.trim_end_matches('=') == name);
                match existing {
                    Some(entry) => *entry = (tag, buckets),
                    None => group_entries.push((tag, buckets)),
                }
            }
        }

        if let Some(spec) = extract(&mut text, clause_regex!(r"\bsum by ([^ ]+)")) {
            for (tag, buckets) in build_buckets(&spec) {
                query
                    .sum_by
                    .insert(tag.trim_end_matches('=').to_owned(), buckets);
            }
        }
        if let Some(spec) = extract(&mut text, clause_regex!(r"\bavg by ([^ ]+)")) {
            for (tag, buckets) in build_buckets(&spec) {
                query
                    .avg_by
                    .insert(tag.trim_end_matches('=').to_owned(), buckets);
            }
        }

        if let Some(spec) = extract(&mut text, clause_regex!(r"\bavg over ([^ ]+)")) {
            // Invalid specs are silently ignored.
            if let Some(captures) = clause_regex!(r"^([0-9]*)(s|M|h|d|w|mo)$").captures(&spec) {
                if let Ok(amount) = captures[1].parse() {
                    query.avg_over = Some(AvgOver {
                        amount,
                        unit: captures[2].to_owned(),
                    });
                }
            }
        }

        if let Some(value) = extract(&mut text, clause_regex!(r"\bmin ([^ ]+)")) {
            query.min = Some(parse_number_with_prefix(&value)?);
        }
        if let Some(value) = extract(&mut text, clause_regex!(r"\bmax ([^ ]+)")) {
            query.max = Some(parse_number_with_prefix(&value)?);
        }

        if let Some(value) = extract(&mut text, clause_regex!(r"\blimit ([^ ]+)")) {
            if let Ok(limit) = value.parse() {
                query.limit_targets = limit;
            }
        }

        // A trailing '=' on a group-by tag is both a bucket spec and an
        // existence requirement, injected as a `tag=` match pattern.
        let mut patterns = Vec::new();
        for (tag, buckets) in group_entries {
            match tag.strip_suffix('=') {
                Some(name) => {
                    patterns.push(format!("{name}="));
                    query.group_by.insert(name.to_owned(), buckets);
                }
                None => {
                    query.group_by.insert(tag, buckets);
                }
            }
        }

        // Aggregated tags leave group_by unless the user explicitly
        // re-specified them, to avoid contradictory bucket instructions.
        for tag in query.sum_by.keys().chain(query.avg_by.keys()) {
            if !explicit_group_tags.contains(tag) {
                query.group_by.remove(tag);
            }
        }

        patterns.extend(text.split_whitespace().map(str::to_owned));
        query.patterns = patterns;

        let mut ast = build_ast(&query.patterns);
        query.target_modifiers = allow_compatible_units(&mut ast);
        query.ast = ast;

        Ok(query)
    }
}
