// ABOUTME: renders execution results and confirmation prompts as plain text for operators and agents.
// ABOUTME: operators get fenced output blocks; agent tool calls get a compact status summary.

use std::time::Duration;

use shellgate_common::{ExecutionResult, Source};

pub fn operator_reply(result: &ExecutionResult) -> String {
    let mut parts = Vec::new();
    if !result.stdout.is_empty() {
        parts.push(format!("Output:\n```\n{}\n```", result.stdout));
    }
    if !result.stderr.is_empty() {
        parts.push(format!("Error:\n```\n{}\n```", result.stderr));
    }
    if result.stdout.is_empty() && result.stderr.is_empty() {
        parts.push("Command completed with no output.".to_string());
    }
    parts.push(format!("Exit code: {}", result.exit_code));
    parts.join("\n\n")
}

pub fn agent_reply(result: &ExecutionResult) -> String {
    match (result.stdout.is_empty(), result.stderr.is_empty()) {
        (false, true) => format!(
            "Command succeeded, exit code: {}\nOutput:\n{}",
            result.exit_code, result.stdout
        ),
        (_, false) => format!(
            "Command failed, exit code: {}\nError:\n{}",
            result.exit_code, result.stderr
        ),
        (true, true) => format!("Command completed, exit code: {}, no output.", result.exit_code),
    }
}

pub fn result_reply(source: Source, result: &ExecutionResult) -> String {
    match source {
        Source::User => operator_reply(result),
        Source::Agent => agent_reply(result),
    }
}

pub fn confirmation_prompt(source: Source, command: &str, reason: &str, ttl: Duration) -> String {
    match source {
        Source::User => format!(
            "Command `{command}` was flagged ({reason}). Send `shell_allow` to run it or `shell_deny` \
             to discard it within {} seconds.",
            ttl.as_secs()
        ),
        Source::Agent => format!(
            "Command `{command}` was flagged ({reason}) and is waiting for operator approval. \
             The result will be delivered once the operator decides; do not retry."
        ),
    }
}

pub fn pending_exists(command: &str) -> String {
    format!(
        "A command is already awaiting confirmation: `{command}`. Send `shell_allow` or `shell_deny` first."
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(stdout: &str, stderr: &str, exit_code: i32) -> ExecutionResult {
        ExecutionResult {
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            exit_code,
            ..ExecutionResult::default()
        }
    }

    #[test]
    fn operator_reply_lists_streams_and_exit_code() {
        let text = operator_reply(&result("hello", "warn", 2));
        assert_eq!(text, "Output:\n```\nhello\n```\n\nError:\n```\nwarn\n```\n\nExit code: 2");

        let text = operator_reply(&result("", "", 0));
        assert_eq!(text, "Command completed with no output.\n\nExit code: 0");
    }

    #[test]
    fn agent_reply_prefers_stderr_when_present() {
        assert_eq!(
            agent_reply(&result("hello", "", 0)),
            "Command succeeded, exit code: 0\nOutput:\nhello"
        );
        assert!(agent_reply(&result("x", "boom", 1)).starts_with("Command failed, exit code: 1"));
        assert_eq!(agent_reply(&result("", "", 0)), "Command completed, exit code: 0, no output.");
    }

    #[test]
    fn prompt_names_the_reason() {
        let text = confirmation_prompt(Source::User, "rm -rf /", "blacklist: `rm`", Duration::from_secs(300));
        assert!(text.contains("blacklist: `rm`"));
        assert!(text.contains("300 seconds"));
    }
}
