//! Config validation - warns about unknown fields

use serde_json::Value;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Validate JSON config and warn about unknown fields.
pub fn warn_unknown_fields(content: &str, config_name: &str) {
    warn_unknown(content, config_name, &expected_config_keys());
}

/// Validate a recipe manifest and warn about unknown fields.
pub fn warn_unknown_manifest_fields(content: &str, manifest_name: &str) {
    warn_unknown(content, manifest_name, &expected_manifest_keys());
}

fn warn_unknown(content: &str, name: &str, expected: &ExpectedKeys) {
    let Ok(value) = serde_json::from_str::<Value>(content) else {
        return;
    };

    for path in find_unknown_keys(&value, expected, "") {
        warn!("Unknown field in {name}: {path}");
    }
}

/// Find unknown keys in JSON value compared to expected keys.
/// Returns paths like "execution.unknownField" for unknown fields.
fn find_unknown_keys(value: &Value, expected: &ExpectedKeys, prefix: &str) -> Vec<String> {
    let mut unknowns = Vec::new();

    let Value::Object(obj) = value else {
        return unknowns;
    };

    for (key, child) in obj {
        let path = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };

        if let Some(nested) = expected.nested.get(key.as_str()) {
            unknowns.extend(find_unknown_keys(child, nested, &path));
        } else if !expected.fields.contains(key.as_str()) {
            unknowns.push(path);
        }
    }

    unknowns
}

/// Expected keys for a config section.
/// `fields` are leaf fields, `nested` are nested objects with their own expected keys.
struct ExpectedKeys {
    fields: HashSet<&'static str>,
    nested: HashMap<&'static str, ExpectedKeys>,
}

impl ExpectedKeys {
    fn new(fields: &[&'static str]) -> Self {
        Self {
            fields: fields.iter().copied().collect(),
            nested: HashMap::new(),
        }
    }

    fn with_nested(mut self, key: &'static str, nested: ExpectedKeys) -> Self {
        self.nested.insert(key, nested);
        self
    }
}

/// Expected keys for `Config` (settings.rs)
fn expected_config_keys() -> ExpectedKeys {
    let execution_keys = ExpectedKeys::new(&["timeoutMs", "maxOutputBytes"]);
    let actions_keys = ExpectedKeys::new(&["browser"]);

    ExpectedKeys::new(&["recipeDirectories"])
        .with_nested("execution", execution_keys)
        .with_nested("actions", actions_keys)
}

/// Expected keys for `recipe.json`
fn expected_manifest_keys() -> ExpectedKeys {
    ExpectedKeys::new(&[
        "id",
        "bundleId",
        "name",
        "description",
        "icon",
        "command",
        "args",
        "queryMode",
        "timeoutMs",
    ])
}
