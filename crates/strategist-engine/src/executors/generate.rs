use serde_json::{json, Value};
use tracing::warn;

use strategist_core::config::EngineConfig;
use strategist_core::error::Result;
use strategist_core::traits::LanguageModel;
use strategist_core::types::{GenerateNode, GenerateRequest};

use super::NodeOutput;
use crate::interpolate::interpolate;
use crate::variables::VariableEnv;

/// Model failures never fail the node: the configured fallback text is
/// used instead and the error is kept on the log entry.
pub async fn execute(
    llm: &dyn LanguageModel,
    settings: &EngineConfig,
    node: &GenerateNode,
    env: &VariableEnv,
) -> Result<NodeOutput> {
    let mut prompt = interpolate(&node.prompt, env);
    if node.include_variables && !env.is_empty() {
        prompt = format!("{}\n\n{}", env.dump(&settings.dump_header), prompt);
    }
    let system_prompt = node
        .system_prompt
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(|s| interpolate(s, env));

    let input = json!({
        "tier": node.tier,
        "systemPrompt": system_prompt,
        "prompt": prompt,
    });

    let request = GenerateRequest {
        prompt,
        tier: node.tier,
        system_prompt,
    };

    let mut out = match llm.generate(request).await {
        Ok(text) => NodeOutput::new(input, Value::String(text)),
        Err(e) => {
            warn!(tier = %node.tier, error = %e, "Generation failed, using fallback message");
            let mut out = NodeOutput::new(input, Value::String(settings.fallback_message.clone()));
            out.soft_error = Some(e.to_string());
            out
        }
    };
    out = out.assign_output(Some(&node.output_variable));
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use strategist_core::types::ModelTier;
    use strategist_test_utils::ScriptedLlm;

    fn node(include_variables: bool) -> GenerateNode {
        GenerateNode {
            tier: ModelTier::Deep,
            system_prompt: Some("You analyse {asset}.".into()),
            prompt: "Is {asset} at {price} a buy?".into(),
            include_variables,
            output_variable: "analysis".into(),
        }
    }

    fn env() -> VariableEnv {
        let mut env = VariableEnv::new();
        env.set("asset", json!("BTC"));
        env.set("price", json!(60000));
        env
    }

    #[tokio::test]
    async fn test_success_assigns_text() {
        let llm = ScriptedLlm::replying("Hold.");
        let out = execute(&llm, &EngineConfig::default(), &node(false), &env())
            .await
            .unwrap();

        assert_eq!(out.output, json!("Hold."));
        assert_eq!(out.assignments, vec![("analysis".to_string(), json!("Hold."))]);
        assert!(out.soft_error.is_none());

        let request = &llm.requests()[0];
        assert_eq!(request.prompt, "Is BTC at 60000 a buy?");
        assert_eq!(request.tier, ModelTier::Deep);
        assert_eq!(request.system_prompt.as_deref(), Some("You analyse BTC."));
    }

    #[tokio::test]
    async fn test_variable_dump_prepended() {
        let llm = ScriptedLlm::replying("ok");
        execute(&llm, &EngineConfig::default(), &node(true), &env())
            .await
            .unwrap();

        let prompt = &llm.requests()[0].prompt;
        assert!(prompt.starts_with("Current data:\n- asset: BTC\n- price: 60000"));
        assert!(prompt.ends_with("Is BTC at 60000 a buy?"));
    }

    #[tokio::test]
    async fn test_failure_uses_fallback() {
        let llm = ScriptedLlm::failing("HTTP 500: overloaded");
        let settings = EngineConfig::default();
        let out = execute(&llm, &settings, &node(false), &env()).await.unwrap();

        assert_eq!(out.output, json!(settings.fallback_message));
        assert_eq!(out.assignments[0].1, json!(settings.fallback_message));
        assert!(out.soft_error.unwrap().contains("overloaded"));
    }
}
