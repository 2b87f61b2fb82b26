//! Key canonicalization for configuration mappings.
//!
//! Definitions may spell a key with spaces (`one of`) or through a synonym
//! (`is` for `type`). [`canonicalize`] rewrites every key to a single
//! canonical form so the rest of the engine only ever sees one spelling.

use serde_json::{Map, Value};
use tracing::warn;

/// Maps each canonical key to the alternate spellings accepted for it.
#[derive(Debug, Clone, Copy)]
pub struct SynonymTable {
    entries: &'static [(&'static str, &'static [&'static str])],
}

impl SynonymTable {
    pub const fn new(entries: &'static [(&'static str, &'static [&'static str])]) -> Self {
        Self { entries }
    }

    /// The canonical key for `key`, if it is a canonical key or a known synonym.
    pub fn primary(&self, key: &str) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(primary, synonyms)| *primary == key || synonyms.contains(&key))
            .map(|(primary, _)| *primary)
    }
}

/// Field configuration keys.
pub const FIELD_KEY_SYNONYMS: SynonymTable = SynonymTable::new(&[
    ("type", &["is"]),
    ("whitelist", &["one_of"]),
    ("blacklist", &["prohibit"]),
    ("max_length", &["maximum_length"]),
    ("min_length", &["minimum_length"]),
    ("maximum", &["max"]),
    ("minimum", &["min"]),
    ("defaults_to", &["default", "defaults", "initial_value"]),
]);

/// Resource directive keys (first document of a two-document resource file).
pub const DIRECTIVE_SYNONYMS: SynonymTable = SynonymTable::new(&[
    ("allowed_methods", &["allow_methods", "methods"]),
    (
        "inherits",
        &[
            "inherit_from",
            "inherits_from",
            "inherit",
            "extends",
            "extend",
            "extends_from",
            "extend_from",
        ],
    ),
]);

/// Project configuration keys (`config.yaml`).
pub const CONFIG_SYNONYMS: SynonymTable = SynonymTable::new(&[
    ("contact_info", &["contact_information", "contact"]),
    ("https", &["ssl", "http_over_ssl"]),
    ("endpoints_dir", &["endpoints", "endpoints_directory"]),
    ("types_file", &["types", "types_catalog"]),
]);

/// Replace every whitespace character in `key` with `_`.
pub fn normalize_key(key: &str) -> String {
    key.chars()
        .map(|c| if c.is_whitespace() { '_' } else { c })
        .collect()
}

/// Canonicalize every key of `map`, recursing into nested mappings.
///
/// Lists are copied as-is, including any mappings inside them. When two
/// spellings of the same key appear, the later one wins.
pub fn canonicalize(map: &Map<String, Value>, table: &SynonymTable) -> Map<String, Value> {
    let mut result = Map::new();

    for (key, value) in map {
        let normalized = normalize_key(key);
        let canonical = table
            .primary(&normalized)
            .map(str::to_string)
            .unwrap_or(normalized);

        let value = match value {
            Value::Object(nested) => Value::Object(canonicalize(nested, table)),
            other => other.clone(),
        };

        if result.contains_key(&canonical) {
            warn!(key = %key, canonical = %canonical, "key spelled more than once, keeping the last");
        }
        result.insert(canonical, value);
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn whitespace_becomes_underscore() {
        assert_eq!(normalize_key("one of"), "one_of");
        assert_eq!(normalize_key("min\tlength"), "min_length");
        assert_eq!(normalize_key(" max "), "_max_");
    }

    #[test]
    fn synonyms_resolve_to_primary() {
        let map = object(json!({ "is": "string", "one of": ["a", "b"], "max": 3 }));
        let result = canonicalize(&map, &FIELD_KEY_SYNONYMS);
        assert_eq!(
            Value::Object(result),
            json!({ "type": "string", "whitelist": ["a", "b"], "maximum": 3 })
        );
    }

    #[test]
    fn unknown_keys_are_kept() {
        let map = object(json!({ "read only": true }));
        let result = canonicalize(&map, &FIELD_KEY_SYNONYMS);
        assert_eq!(Value::Object(result), json!({ "read_only": true }));
    }

    #[test]
    fn recurses_into_mappings_not_lists() {
        let map = object(json!({
            "contact": { "e mail": "x" },
            "hosts": [{ "ssl": true }]
        }));
        let result = canonicalize(&map, &CONFIG_SYNONYMS);
        assert_eq!(
            Value::Object(result),
            json!({
                "contact_info": { "e_mail": "x" },
                "hosts": [{ "ssl": true }]
            })
        );
    }

    #[test]
    fn input_is_not_mutated() {
        let map = object(json!({ "is": "date" }));
        let _ = canonicalize(&map, &FIELD_KEY_SYNONYMS);
        assert!(map.contains_key("is"));
    }

    #[test]
    fn preserves_declaration_order() {
        let map = object(json!({ "min": 1, "is": "integer", "max": 9 }));
        let keys: Vec<String> = canonicalize(&map, &FIELD_KEY_SYNONYMS)
            .keys()
            .cloned()
            .collect();
        assert_eq!(keys, vec!["minimum", "type", "maximum"]);
    }

    #[test]
    fn later_spelling_wins() {
        let map = object(json!({ "min": 1, "minimum": 2 }));
        let result = canonicalize(&map, &FIELD_KEY_SYNONYMS);
        assert_eq!(result.get("minimum"), Some(&json!(2)));
    }

    #[test]
    fn directive_synonyms() {
        assert_eq!(DIRECTIVE_SYNONYMS.primary("methods"), Some("allowed_methods"));
        assert_eq!(DIRECTIVE_SYNONYMS.primary("extends_from"), Some("inherits"));
        assert_eq!(DIRECTIVE_SYNONYMS.primary("fields"), None);
    }
}
