use serde_json::json;
use tracing::{debug, info};

use strategist_core::config::EngineConfig;
use strategist_core::error::Result;
use strategist_core::traits::Notifier;
use strategist_core::types::{Notification, NotifyNode};

use super::NodeOutput;
use crate::interpolate::interpolate;
use crate::variables::VariableEnv;

pub async fn execute(
    notifier: &dyn Notifier,
    settings: &EngineConfig,
    node: &NotifyNode,
    env: &VariableEnv,
) -> Result<NodeOutput> {
    if let Some(guard) = node.guard_variable.as_deref().filter(|g| !g.trim().is_empty()) {
        if !env.is_truthy(guard) {
            debug!(guard, "Notification guard is falsy, skipping");
            return Ok(NodeOutput::new(
                json!({ "guardVariable": guard }),
                json!({ "sent": false }),
            ));
        }
    }

    let mut text = interpolate(&node.message, env);
    if node.include_variables {
        text = format!("{}\n\n{}", text, env.dump(&settings.dump_header));
    }
    let chat_id = node
        .chat_id
        .as_deref()
        .filter(|c| !c.trim().is_empty())
        .map(|c| interpolate(c, env));

    let input = json!({
        "chatId": chat_id,
        "message": text,
        "severity": node.severity,
        "renderMode": node.render_mode,
    });

    let message_id = notifier
        .send(Notification {
            chat_id,
            text,
            severity: node.severity,
            render_mode: node.render_mode,
        })
        .await?;

    info!(channel = notifier.name(), message_id = %message_id, "Notification sent");
    Ok(NodeOutput::new(
        input,
        json!({ "sent": true, "messageId": message_id, "channel": notifier.name() }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use strategist_core::error::StrategistError;
    use strategist_core::types::{RenderMode, Severity};
    use strategist_test_utils::RecordingNotifier;

    fn node(guard: Option<&str>) -> NotifyNode {
        NotifyNode {
            chat_id: Some("{chat}".into()),
            message: "Price: {price}".into(),
            include_variables: false,
            guard_variable: guard.map(String::from),
            severity: Severity::Warning,
            render_mode: RenderMode::Html,
        }
    }

    fn env() -> VariableEnv {
        let mut env = VariableEnv::new();
        env.set("price", json!(60000));
        env.set("chat", json!("-100"));
        env.set("highFlag", json!(true));
        env.set("lowFlag", json!(false));
        env
    }

    #[tokio::test]
    async fn test_sends_interpolated_message() {
        let notifier = RecordingNotifier::new();
        let out = execute(&notifier, &EngineConfig::default(), &node(Some("highFlag")), &env())
            .await
            .unwrap();

        assert_eq!(out.output["sent"], json!(true));
        assert_eq!(out.output["messageId"], json!("msg-1"));
        assert!(out.assignments.is_empty());

        let sent = notifier.sent();
        assert_eq!(sent[0].text, "Price: 60000");
        assert_eq!(sent[0].chat_id.as_deref(), Some("-100"));
        assert_eq!(sent[0].severity, Severity::Warning);
        assert_eq!(sent[0].render_mode, RenderMode::Html);
    }

    #[tokio::test]
    async fn test_falsy_or_missing_guard_skips() {
        let notifier = RecordingNotifier::new();
        for guard in ["lowFlag", "ghost"] {
            let out = execute(&notifier, &EngineConfig::default(), &node(Some(guard)), &env())
                .await
                .unwrap();
            assert_eq!(out.output, json!({ "sent": false }));
        }
        assert!(notifier.sent().is_empty());
    }

    #[tokio::test]
    async fn test_appends_variable_dump() {
        let notifier = RecordingNotifier::new();
        let mut spec = node(None);
        spec.include_variables = true;
        execute(&notifier, &EngineConfig::default(), &spec, &env())
            .await
            .unwrap();

        let text = &notifier.sent()[0].text;
        assert!(text.starts_with("Price: 60000\n\nCurrent data:"));
        assert!(text.contains("- price: 60000"));
    }

    #[tokio::test]
    async fn test_delivery_failure_propagates() {
        let notifier = RecordingNotifier::failing();
        let err = execute(&notifier, &EngineConfig::default(), &node(None), &env())
            .await
            .unwrap_err();
        assert!(matches!(err, StrategistError::Notify { .. }));
    }
}
