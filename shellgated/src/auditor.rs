// ABOUTME: defines the semantic auditor seam consulted for commands that pass the blacklist.
// ABOUTME: ships an implementation that asks an external classifier program for a safe/unsafe verdict.

use std::process::Stdio;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::AuditError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Safe,
    Unsafe,
}

#[async_trait]
pub trait SemanticAuditor: Send + Sync {
    async fn audit(&self, command: &str, correlation_id: &str) -> Result<Verdict, AuditError>;
}

/// Runs a classifier program (no shell) with the command on stdin and reads the
/// first word of its stdout. Deadlines are the caller's job.
#[derive(Debug, Clone)]
pub struct CommandAuditor {
    argv: Vec<String>,
}

impl CommandAuditor {
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }
}

#[async_trait]
impl SemanticAuditor for CommandAuditor {
    async fn audit(&self, command: &str, correlation_id: &str) -> Result<Verdict, AuditError> {
        let (program, args) = self
            .argv
            .split_first()
            .ok_or_else(|| AuditError::Failed("audit_command is empty".to_string()))?;

        let mut child = Command::new(program)
            .args(args)
            .env("SHELLGATE_CORRELATION_ID", correlation_id)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(AuditError::Spawn)?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(command.as_bytes())
                .await
                .map_err(|err| AuditError::Failed(format!("write command: {err}")))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|err| AuditError::Failed(format!("wait: {err}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AuditError::Failed(format!(
                "exit status {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        parse_verdict(&String::from_utf8_lossy(&output.stdout))
    }
}

pub fn parse_verdict(text: &str) -> Result<Verdict, AuditError> {
    let word = text
        .split_whitespace()
        .next()
        .unwrap_or("")
        .trim_matches(|c: char| !c.is_ascii_alphabetic())
        .to_ascii_lowercase();

    match word.as_str() {
        "safe" => Ok(Verdict::Safe),
        "unsafe" => Ok(Verdict::Unsafe),
        _ => Err(AuditError::Malformed(text.trim().chars().take(80).collect())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_first_word_case_insensitively() {
        assert_eq!(parse_verdict("SAFE\n").unwrap(), Verdict::Safe);
        assert_eq!(parse_verdict("  Unsafe: deletes files").unwrap(), Verdict::Unsafe);
        assert_eq!(parse_verdict("**unsafe**").unwrap(), Verdict::Unsafe);
    }

    #[test]
    fn rejects_anything_else() {
        assert!(matches!(parse_verdict(""), Err(AuditError::Malformed(_))));
        assert!(matches!(parse_verdict("maybe"), Err(AuditError::Malformed(_))));
    }

    #[tokio::test]
    async fn command_auditor_reads_stdin_and_correlation_id() {
        let auditor = CommandAuditor::new(vec![
            "/bin/sh".to_string(),
            "-c".to_string(),
            r#"read cmd; if [ "$SHELLGATE_CORRELATION_ID" = conv-1 ] && [ "$cmd" = "ls" ]; then echo safe; else echo unsafe; fi"#
                .to_string(),
        ]);

        assert_eq!(auditor.audit("ls\n", "conv-1").await.unwrap(), Verdict::Safe);
        assert_eq!(auditor.audit("ls\n", "conv-2").await.unwrap(), Verdict::Unsafe);
    }

    #[tokio::test]
    async fn command_auditor_failure_is_an_error() {
        let auditor = CommandAuditor::new(vec!["/bin/sh".to_string(), "-c".to_string(), "exit 2".to_string()]);
        assert!(matches!(auditor.audit("ls", "").await, Err(AuditError::Failed(_))));

        let missing = CommandAuditor::new(vec!["/nonexistent/judge".to_string()]);
        assert!(matches!(missing.audit("ls", "").await, Err(AuditError::Spawn(_))));
    }
}
