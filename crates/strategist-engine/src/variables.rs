use serde::{Deserialize, Serialize};
use serde_json::Value;

use strategist_core::types::VariableMap;

/// Per-run variable store threaded between nodes.
///
/// Keys are variable names; values are arbitrary JSON. A sub-run started
/// by a trigger node gets a fresh environment holding only the forwarded
/// subset.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VariableEnv {
    data: VariableMap,
}

impl VariableEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_map(data: VariableMap) -> Self {
        Self { data }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.data.get(name)
    }

    /// Resolve a dotted path such as `price.value` or `rows.0.close`.
    ///
    /// An exact key match wins over path traversal, so a variable literally
    /// named `a.b` is still reachable.
    pub fn get_path(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.data.get(path) {
            return Some(value);
        }

        let mut segments = path.split('.');
        let mut current = self.data.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.data.contains_key(name)
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.data.insert(name.into(), value);
    }

    /// Truthiness of a variable; missing variables are falsy.
    pub fn is_truthy(&self, name: &str) -> bool {
        self.get_path(name).is_some_and(is_truthy)
    }

    /// A fresh environment holding only the named variables that exist.
    pub fn subset(&self, names: &[String]) -> Self {
        let data = names
            .iter()
            .filter_map(|name| self.data.get(name).map(|v| (name.clone(), v.clone())))
            .collect();
        Self { data }
    }

    /// Human-readable dump of every variable, keys sorted.
    pub fn dump(&self, header: &str) -> String {
        let mut keys: Vec<&String> = self.data.keys().collect();
        keys.sort();

        let mut out = String::from(header);
        for key in keys {
            out.push_str("\n- ");
            out.push_str(key);
            out.push_str(": ");
            out.push_str(&display_value(&self.data[key]));
        }
        out
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &VariableMap {
        &self.data
    }

    pub fn into_map(self) -> VariableMap {
        self.data
    }
}

/// JS-style truthiness: null, false, 0, NaN and "" are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Text form of a value: strings verbatim, everything else as JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env() -> VariableEnv {
        let mut env = VariableEnv::new();
        env.set("price", json!(60000));
        env.set("quote", json!({ "value": 1.5, "history": [1, 2, 3] }));
        env.set("name", json!("BTC"));
        env
    }

    #[test]
    fn test_get_path_nested() {
        let env = env();
        assert_eq!(env.get_path("quote.value"), Some(&json!(1.5)));
        assert_eq!(env.get_path("quote.history.2"), Some(&json!(3)));
        assert_eq!(env.get_path("quote.missing"), None);
        assert_eq!(env.get_path("price.value"), None);
    }

    #[test]
    fn test_exact_dotted_key_wins() {
        let mut env = VariableEnv::new();
        env.set("a.b", json!("exact"));
        env.set("a", json!({ "b": "nested" }));
        assert_eq!(env.get_path("a.b"), Some(&json!("exact")));
    }

    #[test]
    fn test_truthiness() {
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(0)));
        assert!(!is_truthy(&json!(0.0)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!("false")));
        assert!(is_truthy(&json!([])));
        assert!(is_truthy(&json!(-1)));

        let env = env();
        assert!(env.is_truthy("price"));
        assert!(!env.is_truthy("missing"));
    }

    #[test]
    fn test_subset_skips_missing() {
        let sub = env().subset(&["price".into(), "ghost".into()]);
        assert_eq!(sub.len(), 1);
        assert_eq!(sub.get("price"), Some(&json!(60000)));
    }

    #[test]
    fn test_dump_sorted() {
        let dump = env().dump("Current data:");
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines[0], "Current data:");
        assert_eq!(lines[1], "- name: BTC");
        assert_eq!(lines[2], "- price: 60000");
        assert!(lines[3].starts_with("- quote: {"));
    }
}
