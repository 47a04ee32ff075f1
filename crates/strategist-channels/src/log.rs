use std::path::PathBuf;

use futures::future::BoxFuture;
use tokio::io::AsyncWriteExt;
use tracing::info;

use strategist_core::error::{Result, StrategistError};
use strategist_core::traits::Notifier;
use strategist_core::types::Notification;

use crate::util::with_severity;

/// Appends notifications to a local file. Used when no bot is configured.
pub struct LogNotifier {
    path: PathBuf,
}

impl LogNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &std::path::Path {
        &self.path
    }
}

impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    fn send(&self, notification: Notification) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            if let Some(dir) = self.path.parent() {
                tokio::fs::create_dir_all(dir).await?;
            }

            let delivery_id = uuid::Uuid::new_v4().to_string();
            let timestamp = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let chat = notification.chat_id.as_deref().unwrap_or("-");
            let entry = format!(
                "[{}] [{}] [{}] {}\n",
                timestamp,
                chat,
                delivery_id,
                with_severity(notification.severity, &notification.text)
            );

            let mut file = tokio::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)
                .await
                .map_err(|e| StrategistError::Notify {
                    channel: "log".into(),
                    message: format!("{}: {}", self.path.display(), e),
                })?;
            file.write_all(entry.as_bytes()).await?;

            info!(chat, delivery_id = %delivery_id, "Notification logged");
            Ok(delivery_id)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strategist_core::types::{RenderMode, Severity};

    fn note(text: &str, severity: Severity) -> Notification {
        Notification {
            chat_id: Some("42".into()),
            text: text.into(),
            severity,
            render_mode: RenderMode::Plain,
        }
    }

    #[tokio::test]
    async fn test_appends_entries() {
        let dir = tempfile::tempdir().unwrap();
        let notifier = LogNotifier::new(dir.path().join("out").join("notifications.log"));

        let first = notifier.send(note("Price: 60000", Severity::Info)).await.unwrap();
        let second = notifier.send(note("Crash", Severity::Critical)).await.unwrap();
        assert_ne!(first, second);

        let content = std::fs::read_to_string(notifier.path()).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("[42]"));
        assert!(lines[0].ends_with("Price: 60000"));
        assert!(lines[1].contains(&second));
        assert!(lines[1].contains("🚨 Crash"));
    }
}
