use serde_json::{json, Value};
use tracing::{debug, warn};

use strategist_core::error::{Result, StrategistError};
use strategist_core::traits::HttpFetcher;
use strategist_core::types::{FetchNode, FetchRequest};

use super::NodeOutput;
use crate::extract::extract_first;
use crate::interpolate::interpolate;
use crate::variables::{display_value, VariableEnv};

const ERROR_BODY_CHARS: usize = 200;

/// Parse the interpolated header template, a JSON object of name -> value.
fn parse_headers(rendered: &str) -> Result<Vec<(String, String)>> {
    let parsed: Value = serde_json::from_str(rendered)
        .map_err(|e| StrategistError::Template(format!("Headers are not valid JSON: {}", e)))?;
    let Value::Object(map) = parsed else {
        return Err(StrategistError::Template("Headers must be a JSON object".into()));
    };
    Ok(map
        .into_iter()
        .map(|(name, value)| (name, display_value(&value)))
        .collect())
}

/// Numeric cast requested by `parse_number`. On failure the value is kept.
fn cast_number(value: Value, variable: &str) -> Value {
    let parsed = match &value {
        Value::Number(_) => return value,
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .map(Value::from)
                .or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .and_then(serde_json::Number::from_f64)
                        .map(Value::Number)
                })
        }
        _ => None,
    };

    match parsed {
        Some(number) => number,
        None => {
            warn!(variable, value = %value, "Extracted value is not numeric, keeping original");
            value
        }
    }
}

pub async fn execute(
    fetcher: &dyn HttpFetcher,
    node: &FetchNode,
    env: &VariableEnv,
) -> Result<NodeOutput> {
    let url = interpolate(&node.url, env);
    let headers = match node.headers.as_deref().map(str::trim) {
        Some(template) if !template.is_empty() => parse_headers(&interpolate(template, env))?,
        _ => Vec::new(),
    };
    let body = node
        .body
        .as_deref()
        .filter(|b| !b.trim().is_empty())
        .map(|b| interpolate(b, env));

    // Header values may carry credentials; only names go into the log
    let header_names: Vec<&str> = headers.iter().map(|(name, _)| name.as_str()).collect();
    let input = json!({
        "method": node.method.to_uppercase(),
        "url": url,
        "headers": header_names,
        "body": body,
    });

    let response = fetcher
        .fetch(FetchRequest {
            method: node.method.to_uppercase(),
            url: url.clone(),
            headers,
            body,
        })
        .await?;

    if !response.is_success() {
        let text: String = display_value(&response.body)
            .chars()
            .take(ERROR_BODY_CHARS)
            .collect();
        return Err(StrategistError::Fetch {
            status: response.status,
            message: text,
        });
    }

    let mut value = match node.extract_path.as_deref().map(str::trim) {
        Some(path) if !path.is_empty() => extract_first(&response.body, path)?,
        _ => response.body,
    };

    if node.parse_number {
        value = cast_number(value, &node.output_variable);
    }

    debug!(url = %url, variable = %node.output_variable, "Fetch complete");
    Ok(NodeOutput::new(input, value).assign_output(Some(&node.output_variable)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strategist_test_utils::ScriptedFetcher;

    fn node(url: &str) -> FetchNode {
        FetchNode {
            url: url.into(),
            method: "get".into(),
            headers: None,
            body: None,
            extract_path: None,
            parse_number: false,
            output_variable: "price".into(),
        }
    }

    #[test]
    fn test_cast_number() {
        assert_eq!(cast_number(json!("60000"), "p"), json!(60000));
        assert_eq!(cast_number(json!(" 1.25 "), "p"), json!(1.25));
        assert_eq!(cast_number(json!("n/a"), "p"), json!("n/a"));
        assert_eq!(cast_number(json!(7), "p"), json!(7));
        assert_eq!(cast_number(Value::Null, "p"), Value::Null);
    }

    #[test]
    fn test_parse_headers() {
        let headers = parse_headers(r#"{"X-Key": "abc", "X-Limit": 5}"#).unwrap();
        assert!(headers.contains(&("X-Key".to_string(), "abc".to_string())));
        assert!(headers.contains(&("X-Limit".to_string(), "5".to_string())));
        assert!(parse_headers("[1]").is_err());
        assert!(parse_headers("not json").is_err());
    }

    #[tokio::test]
    async fn test_interpolates_and_extracts() {
        let fetcher = ScriptedFetcher::new().respond(
            "https://api.test/BTC",
            200,
            json!({ "data": { "price": "60000" } }),
        );
        let mut env = VariableEnv::new();
        env.set("symbol", json!("BTC"));
        env.set("token", json!("s3cret"));

        let mut spec = node("https://api.test/{symbol}");
        spec.extract_path = Some("$.data.price".into());
        spec.parse_number = true;
        spec.headers = Some(r#"{"Authorization": "Bearer {token}"}"#.into());

        let out = execute(&fetcher, &spec, &env).await.unwrap();
        assert_eq!(out.output, json!(60000));
        assert_eq!(out.assignments, vec![("price".to_string(), json!(60000))]);
        assert_eq!(out.input["headers"], json!(["Authorization"]));

        let sent = &fetcher.requests()[0];
        assert_eq!(sent.method, "GET");
        assert_eq!(
            sent.headers,
            vec![("Authorization".to_string(), "Bearer s3cret".to_string())]
        );
    }

    #[tokio::test]
    async fn test_missing_match_is_null() {
        let fetcher = ScriptedFetcher::new().respond("https://api.test", 200, json!({ "a": 1 }));
        let mut spec = node("https://api.test");
        spec.extract_path = Some("$.b".into());
        let out = execute(&fetcher, &spec, &VariableEnv::new()).await.unwrap();
        assert_eq!(out.output, Value::Null);
    }

    #[tokio::test]
    async fn test_non_2xx_fails() {
        let fetcher = ScriptedFetcher::new().respond("https://api.test", 503, json!("maintenance"));
        let err = execute(&fetcher, &node("https://api.test"), &VariableEnv::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "HTTP 503: maintenance");
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let fetcher = ScriptedFetcher::new().fail("https://api.test", "connection refused");
        let err = execute(&fetcher, &node("https://api.test"), &VariableEnv::new())
            .await
            .unwrap_err();
        assert!(matches!(err, StrategistError::Transport(_)));
    }
}
