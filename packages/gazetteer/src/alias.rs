//! Token-level alias substitution.
//!
//! Aliases are matched on whole tokens, longest key first, so that `"kl"`
//! never fires inside `"klang"` and `"johor bahru selatan"` wins over any
//! shorter key starting at the same token.

use std::collections::BTreeMap;

/// Colloquial surface forms mapped to canonical gazetteer names.
#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    /// Keys grouped by first token. Each group is sorted longest key first.
    by_first_token: BTreeMap<String, Vec<(Vec<String>, String)>>,
    /// Cleaned key -> canonical target.
    targets: BTreeMap<String, String>,
}

impl AliasTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a rule. `key` must already be in cleaned, space-separated form.
    ///
    /// Returns the previous target if `key` was already present.
    pub fn insert(&mut self, key: &str, target: &str) -> Option<String> {
        let previous = self.targets.insert(key.to_string(), target.to_string());

        let tokens: Vec<String> = key.split(' ').map(str::to_string).collect();
        let Some(first) = tokens.first().cloned() else {
            return previous;
        };

        let group = self.by_first_token.entry(first).or_default();
        group.retain(|(existing, _)| *existing != tokens);
        group.push((tokens, target.to_string()));
        group.sort_by(|a, b| b.0.len().cmp(&a.0.len()).then_with(|| a.0.cmp(&b.0)));

        previous
    }

    /// Returns the target for a whole cleaned key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.targets.get(key).map(String::as_str)
    }

    /// Iterates over `(key, target)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.targets.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of rules.
    #[must_use]
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the table has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Rewrites every aliased token run in `cleaned` to its target.
    ///
    /// Scans left to right; at each token the longest matching key wins and
    /// the scan resumes after it.
    #[must_use]
    pub fn substitute(&self, cleaned: &str) -> String {
        let tokens: Vec<&str> = cleaned.split_whitespace().collect();
        let mut out: Vec<&str> = Vec::with_capacity(tokens.len());
        let mut i = 0;

        while i < tokens.len() {
            let matched = self.by_first_token.get(tokens[i]).and_then(|group| {
                group.iter().find(|(key, _)| {
                    i + key.len() <= tokens.len()
                        && key.iter().zip(&tokens[i..]).all(|(k, t)| k == t)
                })
            });

            if let Some((key, target)) = matched {
                out.push(target);
                i += key.len();
            } else {
                out.push(tokens[i]);
                i += 1;
            }
        }

        out.join(" ")
    }
}
