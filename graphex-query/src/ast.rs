use graphex_match::MatchExpr;

/// Builds one AST leaf from a single pattern token, or `None` for pointless
/// patterns (neither key nor term).
///
/// The token grammar is `[!]key[=term|:term]`:
///  - `key=term`: tag `key` equals `term` exactly.
///  - `key=`: tag `key` merely exists.
///  - `=term`: any tag has exactly the value `term`.
///  - `key:term`: tag `key`'s value contains a match of the regex `term`.
///  - `key:`: some tag name matches the regex `key`.
///  - `:term`: some tag value matches the regex `term`.
///  - no `=`/`:`: the metric's raw id matches the regex.
///
/// A leading `!` negates the resulting node.
pub fn pattern_expr(pattern: &str) -> Option<MatchExpr> {
    let (negate, rest) = match pattern.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, pattern),
    };

    let expr = match rest.find(['=', ':']) {
        Some(index) => {
            let key = &rest[..index];
            let term = &rest[index + 1..];
            let delimiter = rest.as_bytes()[index];

            match (delimiter, key.is_empty(), term.is_empty()) {
                (_, true, true) => return None,
                (b'=', false, false) => MatchExpr::TagEquality {
                    key: key.to_owned(),
                    term: term.to_owned(),
                },
                (b'=', false, true) => MatchExpr::TagExists {
                    key: key.to_owned(),
                },
                (b'=', true, false) => MatchExpr::AnyTagValue {
                    term: term.to_owned(),
                },
                (b':', false, false) => MatchExpr::TagRegex {
                    key: key.to_owned(),
                    term: term.to_owned(),
                },
                (b':', false, true) => MatchExpr::TagNameRegex {
                    key: key.to_owned(),
                },
                (b':', true, false) => MatchExpr::TagValueRegex {
                    term: term.to_owned(),
                },
                _ => unreachable!("find only yields '=' or ':'"),
            }
        }
        None if rest.is_empty() => return None,
        None => MatchExpr::IdRegex {
            pattern: rest.to_owned(),
        },
    };

    Some(if negate {
        MatchExpr::Negate {
            inner: Box::new(expr),
        }
    } else {
        expr
    })
}

/// Builds the boolean match predicate from the query's pattern tokens.
///
/// A single leaf is returned unwrapped; multiple leaves are combined with
/// AND. No patterns at all yields an expression matching everything.
pub fn build_ast<S: AsRef<str>>(patterns: &[S]) -> MatchExpr {
    let mut leaves: Vec<MatchExpr> = patterns
        .iter()
        .filter_map(|pattern| pattern_expr(pattern.as_ref()))
        .collect();

    match leaves.len() {
        1 => leaves.remove(0),
        _ => MatchExpr::And { inner: leaves },
    }
}
