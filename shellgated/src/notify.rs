// ABOUTME: delivers post-decision notices for agent-sourced confirmations to the agent platform.
// ABOUTME: ships a tracing-only notifier and a jsonl outbox that an agent runtime can tail.

use std::path::PathBuf;

use anyhow::Context;
use async_trait::async_trait;
use serde::Serialize;
use shellgate_common::ExecutionResult;
use tokio::io::AsyncWriteExt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub correlation_id: String,
    pub command: String,
    pub kind: NotificationKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationKind {
    Executed { result: ExecutionResult, reply: String },
    ExecutionFailed { message: String },
    Denied { message: String },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}

pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        tracing::info!(
            correlation_id = %notification.correlation_id,
            command = %notification.command,
            kind = ?notification.kind,
            "agent notification"
        );
        Ok(())
    }
}

pub struct OutboxNotifier {
    path: PathBuf,
}

impl OutboxNotifier {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Notifier for OutboxNotifier {
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()> {
        let mut line = serde_json::to_vec(notification)?;
        line.push(b'\n');

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .with_context(|| format!("open notification outbox at {}", self.path.display()))?;
        file.write_all(&line).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn outbox_appends_one_json_line_per_notification() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("outbox.jsonl");
        let notifier = OutboxNotifier::new(&path);

        for kind in [
            NotificationKind::Denied {
                message: "denied by operator".to_string(),
            },
            NotificationKind::ExecutionFailed {
                message: "no shell".to_string(),
            },
        ] {
            notifier
                .notify(&Notification {
                    correlation_id: "conv-1".to_string(),
                    command: "rm -rf build".to_string(),
                    kind,
                })
                .await
                .unwrap();
        }

        let text = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0]["correlation_id"], "conv-1");
        assert_eq!(lines[0]["kind"]["type"], "denied");
        assert_eq!(lines[1]["kind"]["type"], "execution_failed");
    }
}
