use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::variables::{display_value, VariableEnv};

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{([A-Za-z_][A-Za-z0-9_\-]*(?:\.[A-Za-z0-9_\-]+)*)\}")
            .expect("Invalid placeholder pattern")
    })
}

/// Replace `{name}` and `{a.b}` placeholders with variable values.
///
/// Strings are inserted verbatim, other values as JSON. Placeholders that
/// name no variable are left as written.
pub fn interpolate(template: &str, env: &VariableEnv) -> String {
    if !template.contains('{') {
        return template.to_string();
    }

    placeholder()
        .replace_all(template, |caps: &Captures<'_>| match env.get_path(&caps[1]) {
            Some(value) => display_value(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn env() -> VariableEnv {
        let mut env = VariableEnv::new();
        env.set("x", json!(42));
        env.set("name", json!("BTC"));
        env.set("quote", json!({ "usd": 60000.5, "tags": ["a"] }));
        env
    }

    #[test]
    fn test_number_placeholder() {
        assert_eq!(interpolate("{x}", &env()), "42");
    }

    #[test]
    fn test_unknown_placeholder_unchanged() {
        assert_eq!(interpolate("{y}", &env()), "{y}");
        assert_eq!(interpolate("{quote.eur}", &env()), "{quote.eur}");
    }

    #[test]
    fn test_nested_and_mixed() {
        assert_eq!(
            interpolate("{name} at {quote.usd} ({quote.tags})", &env()),
            r#"BTC at 60000.5 (["a"])"#
        );
    }

    #[test]
    fn test_json_template_braces_untouched() {
        let template = r#"{"Authorization": "Bearer {name}"}"#;
        assert_eq!(
            interpolate(template, &env()),
            r#"{"Authorization": "Bearer BTC"}"#
        );
    }
}
