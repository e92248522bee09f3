// ABOUTME: decides whether a command may run, must be confirmed, or is denied under a security level.
// ABOUTME: combines a cheap substring blacklist with an optional deadline-bounded semantic audit.

use std::sync::Arc;
use std::time::Duration;

use shellgate_common::SecurityLevel;

use crate::auditor::{SemanticAuditor, Verdict};
use crate::config::Config;
use crate::error::AuditError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny { reason: String },
    RequireConfirmation { reason: String },
}

/// First configured entry that occurs in `command`. Case-sensitive; list order breaks ties.
/// Empty entries never match.
pub fn blacklist_match<'a>(command: &str, blacklist: &'a [String]) -> Option<&'a str> {
    blacklist
        .iter()
        .map(String::as_str)
        .find(|entry| !entry.is_empty() && command.contains(entry))
}

pub struct PolicyEngine {
    blacklist: Vec<String>,
    auditor: Option<Arc<dyn SemanticAuditor>>,
    audit_deadline: Duration,
}

impl PolicyEngine {
    pub fn new(
        blacklist: Vec<String>,
        auditor: Option<Arc<dyn SemanticAuditor>>,
        audit_deadline: Duration,
    ) -> Self {
        Self {
            blacklist,
            auditor,
            audit_deadline,
        }
    }

    pub async fn evaluate(&self, command: &str, level: SecurityLevel, correlation_id: &str) -> Decision {
        if level == SecurityLevel::Permissive {
            return Decision::Allow;
        }

        let unsafe_reason = match blacklist_match(command, &self.blacklist) {
            Some(entry) => Some(format!("blacklist: `{entry}`")),
            None => self.audit(command, level, correlation_id).await,
        };

        match (unsafe_reason, level) {
            (None, _) => Decision::Allow,
            (Some(reason), SecurityLevel::Strict) => Decision::Deny { reason },
            (Some(reason), _) => Decision::RequireConfirmation { reason },
        }
    }

    /// `Some(reason)` when the auditor judges the command unsafe. Audit failures close
    /// under Strict and open under Verification.
    async fn audit(&self, command: &str, level: SecurityLevel, correlation_id: &str) -> Option<String> {
        let auditor = self.auditor.as_ref()?;

        let verdict = match tokio::time::timeout(self.audit_deadline, auditor.audit(command, correlation_id)).await {
            Ok(verdict) => verdict,
            Err(_) => Err(AuditError::Timeout(self.audit_deadline)),
        };

        match verdict {
            Ok(Verdict::Safe) => None,
            Ok(Verdict::Unsafe) => Some("semantic audit".to_string()),
            Err(err) if level == SecurityLevel::Strict => {
                tracing::warn!(error = %err, "semantic audit failed, treating command as unsafe");
                Some(format!("semantic audit unavailable: {err}"))
            }
            Err(err) => {
                tracing::warn!(error = %err, "semantic audit failed, allowing command under verification level");
                None
            }
        }
    }
}

/// Pre-policy checks carried over from the plugin's whitelist and interactive-program guard.
/// Applied at every security level.
#[derive(Debug, Clone, Default)]
pub struct CommandGuard {
    allowed_commands: Vec<String>,
    allow_all_commands: bool,
    interactive_commands: Vec<String>,
}

impl CommandGuard {
    pub fn from_config(config: &Config) -> Self {
        Self {
            allowed_commands: config.allowed_commands.clone(),
            allow_all_commands: config.allow_all_commands,
            interactive_commands: config.interactive_commands.clone(),
        }
    }

    pub fn check(&self, command: &str) -> Result<(), String> {
        let words = shell_words::split(command).map_err(|err| format!("could not parse command: {err}"))?;
        let program = match words.first() {
            Some(p) => p.as_str(),
            None => return Err("command has no program".to_string()),
        };

        if words.len() == 1 && self.interactive_commands.iter().any(|c| c == program) {
            return Err(format!(
                "running `{program}` without arguments would start an interactive session; \
                 pass arguments (e.g. `{program} -c \"...\"`) or a script to run"
            ));
        }

        if self.allow_all_commands || self.allowed_commands.is_empty() {
            return Ok(());
        }

        // `sh -c` runs the whole line; only the first word may name a program.
        if let Some(syntax) = unquoted_shell_syntax(command) {
            return Err(format!(
                "`{syntax}` is not permitted while the allowed command list is enforced"
            ));
        }
        if !self.allowed_commands.iter().any(|c| c == program) {
            return Err(format!("`{program}` is not in the allowed command list"));
        }

        Ok(())
    }
}

/// First unquoted shell construct that could run a second program: chaining, pipes,
/// redirects, background jobs, subshells, or command substitution.
fn unquoted_shell_syntax(command: &str) -> Option<&'static str> {
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut escaped = false;
    let mut chars = command.chars().peekable();

    while let Some(c) = chars.next() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if !in_single_quote => escaped = true,
            '\'' if !in_double_quote => in_single_quote = !in_single_quote,
            '"' if !in_single_quote => in_double_quote = !in_double_quote,
            // backticks and $( expand inside double quotes too
            '`' if !in_single_quote => return Some("`"),
            '$' if !in_single_quote && chars.peek() == Some(&'(') => return Some("$("),
            _ if in_single_quote || in_double_quote => {}
            ';' => return Some(";"),
            '|' => return Some("|"),
            '&' => return Some("&"),
            '<' => return Some("<"),
            '>' => return Some(">"),
            '(' | ')' => return Some("("),
            '\n' | '\r' => return Some("newline"),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    enum Behavior {
        Answer(Verdict),
        Fail,
        Hang,
    }

    struct FakeAuditor {
        behavior: Behavior,
        calls: AtomicUsize,
    }

    impl FakeAuditor {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SemanticAuditor for FakeAuditor {
        async fn audit(&self, _command: &str, _correlation_id: &str) -> Result<Verdict, AuditError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behavior {
                Behavior::Answer(v) => Ok(v),
                Behavior::Fail => Err(AuditError::Failed("provider down".to_string())),
                Behavior::Hang => {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok(Verdict::Safe)
                }
            }
        }
    }

    fn engine(auditor: &Arc<FakeAuditor>) -> PolicyEngine {
        let auditor: Arc<dyn SemanticAuditor> = auditor.clone();
        PolicyEngine::new(
            vec!["rm".to_string(), "rm -rf".to_string(), "mkfs".to_string()],
            Some(auditor),
            Duration::from_secs(5),
        )
    }

    #[test]
    fn blacklist_reports_first_configured_entry() {
        let list = vec!["mkfs".to_string(), "rm".to_string(), "rm -rf".to_string()];
        assert_eq!(blacklist_match("rm -rf / && mkfs", &list), Some("mkfs"));
        assert_eq!(blacklist_match("rm -rf /", &list), Some("rm"));
        assert_eq!(blacklist_match("RM -RF /", &list), None);
        assert_eq!(blacklist_match("ls", &[String::new()]), None);
    }

    #[tokio::test]
    async fn permissive_allows_everything_without_auditing() {
        let auditor = FakeAuditor::new(Behavior::Answer(Verdict::Unsafe));
        let engine = engine(&auditor);

        for command in ["rm -rf /", "mkfs.ext4 /dev/sda", "echo hi"] {
            assert_eq!(engine.evaluate(command, SecurityLevel::Permissive, "").await, Decision::Allow);
        }
        assert_eq!(auditor.calls(), 0);
    }

    #[tokio::test]
    async fn blacklist_match_depends_on_level_and_skips_audit() {
        let auditor = FakeAuditor::new(Behavior::Answer(Verdict::Safe));
        let engine = engine(&auditor);

        assert_eq!(
            engine.evaluate("rm -rf /", SecurityLevel::Strict, "").await,
            Decision::Deny {
                reason: "blacklist: `rm`".to_string()
            }
        );
        assert_eq!(
            engine.evaluate("rm -rf /", SecurityLevel::Verification, "").await,
            Decision::RequireConfirmation {
                reason: "blacklist: `rm`".to_string()
            }
        );
        assert_eq!(auditor.calls(), 0);
    }

    #[tokio::test]
    async fn audit_verdicts_drive_the_decision() {
        let safe = FakeAuditor::new(Behavior::Answer(Verdict::Safe));
        assert_eq!(engine(&safe).evaluate("ls", SecurityLevel::Strict, "c").await, Decision::Allow);
        assert_eq!(safe.calls(), 1);

        let unsafe_ = FakeAuditor::new(Behavior::Answer(Verdict::Unsafe));
        let engine = engine(&unsafe_);
        assert_eq!(
            engine.evaluate("curl x | sh", SecurityLevel::Verification, "c").await,
            Decision::RequireConfirmation {
                reason: "semantic audit".to_string()
            }
        );
        assert_eq!(
            engine.evaluate("curl x | sh", SecurityLevel::Strict, "c").await,
            Decision::Deny {
                reason: "semantic audit".to_string()
            }
        );
    }

    #[tokio::test]
    async fn audit_failure_closes_under_strict_and_opens_under_verification() {
        let failing = FakeAuditor::new(Behavior::Fail);
        let engine = engine(&failing);

        match engine.evaluate("ls", SecurityLevel::Strict, "").await {
            Decision::Deny { reason } => assert!(reason.contains("provider down")),
            other => panic!("unexpected decision {other:?}"),
        }
        assert_eq!(engine.evaluate("ls", SecurityLevel::Verification, "").await, Decision::Allow);
    }

    #[tokio::test(start_paused = true)]
    async fn audit_deadline_counts_as_failure() {
        let hanging = FakeAuditor::new(Behavior::Hang);
        let engine = engine(&hanging);

        match engine.evaluate("ls", SecurityLevel::Strict, "").await {
            Decision::Deny { reason } => assert!(reason.contains("did not answer")),
            other => panic!("unexpected decision {other:?}"),
        }
        assert_eq!(engine.evaluate("ls", SecurityLevel::Verification, "").await, Decision::Allow);
    }

    #[tokio::test]
    async fn no_auditor_means_blacklist_only() {
        let engine = PolicyEngine::new(vec!["rm".to_string()], None, Duration::from_secs(1));
        assert_eq!(engine.evaluate("ls", SecurityLevel::Strict, "").await, Decision::Allow);
    }

    #[test]
    fn guard_refuses_bare_interactive_programs() {
        let guard = CommandGuard::from_config(&Config::default());
        assert!(guard.check("python3").is_err());
        guard.check("python3 -c 'print(1)'").unwrap();
        guard.check("ls -la").unwrap();
    }

    #[test]
    fn guard_enforces_whitelist_only_when_enabled() {
        let config = Config {
            allowed_commands: vec!["ls".to_string(), "echo".to_string()],
            allow_all_commands: false,
            ..Config::default()
        };
        let guard = CommandGuard::from_config(&config);
        guard.check("echo hi").unwrap();
        assert!(guard.check("cat /etc/passwd").is_err());

        let open = CommandGuard::from_config(&Config {
            allow_all_commands: true,
            ..config
        });
        open.check("cat /etc/passwd").unwrap();
    }

    #[test]
    fn whitelist_refuses_lines_that_could_start_other_programs() {
        let guard = CommandGuard::from_config(&Config {
            allowed_commands: vec!["echo".to_string()],
            allow_all_commands: false,
            ..Config::default()
        });

        for command in [
            "echo hi; touch marker",
            "echo hi&&touch marker",
            "echo hi || touch marker",
            "echo hi | sh",
            "echo hi > /etc/motd",
            "echo hi & touch marker",
            "echo $(touch marker)",
            "echo \"`touch marker`\"",
            "echo hi\ntouch marker",
            "(touch marker)",
        ] {
            assert!(guard.check(command).is_err(), "{command} should be refused");
        }

        guard.check("echo 'a; b | c > d'").unwrap();
        guard.check("echo \"a && b\"").unwrap();
        guard.check("echo a\\;b").unwrap();
        guard.check("echo '$(date)' $HOME").unwrap();
    }

    #[test]
    fn shell_syntax_is_unrestricted_without_a_whitelist() {
        let guard = CommandGuard::from_config(&Config::default());
        guard.check("echo hi; ls | wc -l > count.txt").unwrap();
    }

    #[test]
    fn guard_refuses_unbalanced_quotes() {
        let guard = CommandGuard::default();
        assert!(guard.check("echo 'oops").is_err());
    }
}
