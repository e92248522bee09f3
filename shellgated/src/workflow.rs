// ABOUTME: drives a command from submission through policy, confirmation, and execution.
// ABOUTME: owns the confirmation store and dispatches agent notifications after approve/deny.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use shellgate_common::{ExecutionResult, SecurityLevel, Source};

use crate::auditor::SemanticAuditor;
use crate::config::Config;
use crate::confirmation::{ConfirmationStore, PendingConfirmation};
use crate::error::{ConfirmationError, ExecutionError, GateError};
use crate::executor::Executor;
use crate::notify::{Notification, NotificationKind, Notifier};
use crate::policy::{CommandGuard, Decision, PolicyEngine};
use crate::reply;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submission {
    Executed(ExecutionResult),
    Denied { reason: String },
    AwaitingApproval(PendingConfirmation),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Approved {
    pub confirmation: PendingConfirmation,
    pub result: ExecutionResult,
}

pub struct Workflow {
    store: ConfirmationStore,
    policy: PolicyEngine,
    guard: CommandGuard,
    executor: Executor,
    notifier: Arc<dyn Notifier>,
    working_directory: PathBuf,
    execution_timeout: Duration,
    user_level: SecurityLevel,
    agent_level: SecurityLevel,
    log_commands: bool,
}

impl Workflow {
    pub fn from_config(
        config: &Config,
        auditor: Option<Arc<dyn SemanticAuditor>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let auditor = if config.enable_llm_audit { auditor } else { None };
        Self {
            store: ConfirmationStore::new(config.confirmation_ttl()),
            policy: PolicyEngine::new(config.security_blacklist.clone(), auditor, config.audit_deadline()),
            guard: CommandGuard::from_config(config),
            executor: Executor::new(&config.shell, config.max_output_bytes),
            notifier,
            working_directory: config.working_directory.clone(),
            execution_timeout: config.execution_timeout(),
            user_level: config.level_for(Source::User),
            agent_level: config.level_for(Source::Agent),
            log_commands: config.enable_logging,
        }
    }

    pub fn store(&self) -> &ConfirmationStore {
        &self.store
    }

    fn level_for(&self, source: Source) -> SecurityLevel {
        match source {
            Source::User => self.user_level,
            Source::Agent => self.agent_level,
        }
    }

    pub async fn submit(
        &self,
        actor: &str,
        command: &str,
        source: Source,
        correlation_id: &str,
    ) -> Result<Submission, GateError> {
        let command = command.trim();
        if command.is_empty() {
            return Err(GateError::Validation("command must be non-empty".to_string()));
        }
        self.guard.check(command).map_err(GateError::Refused)?;

        if let Some(existing) = self.store.get(actor).await {
            return Err(ConfirmationError::Conflict { existing }.into());
        }

        let level = self.level_for(source);
        match self.policy.evaluate(command, level, correlation_id).await {
            Decision::Allow => Ok(Submission::Executed(self.run(command).await?)),
            Decision::Deny { reason } => {
                tracing::info!(actor, ?source, command, %reason, "command denied by policy");
                Ok(Submission::Denied { reason })
            }
            Decision::RequireConfirmation { reason } => {
                let confirmation = PendingConfirmation::new(command, reason, source, correlation_id);
                self.store.put(actor, confirmation.clone()).await?;
                tracing::info!(actor, ?source, command, reason = %confirmation.reason, "command awaiting confirmation");
                Ok(Submission::AwaitingApproval(confirmation))
            }
        }
    }

    pub async fn approve(&self, actor: &str) -> Result<Approved, GateError> {
        let confirmation = self.store.take(actor).await?;
        tracing::info!(actor, command = %confirmation.command, "confirmation approved");

        match self.run(&confirmation.command).await {
            Ok(result) => {
                if confirmation.source == Source::Agent {
                    self.dispatch(
                        &confirmation,
                        NotificationKind::Executed {
                            reply: reply::agent_reply(&result),
                            result: result.clone(),
                        },
                    );
                }
                Ok(Approved { confirmation, result })
            }
            Err(err) => {
                if confirmation.source == Source::Agent {
                    self.dispatch(
                        &confirmation,
                        NotificationKind::ExecutionFailed {
                            message: err.to_string(),
                        },
                    );
                }
                Err(err.into())
            }
        }
    }

    pub async fn deny(&self, actor: &str) -> Result<PendingConfirmation, GateError> {
        let confirmation = self
            .store
            .remove(actor)
            .await
            .ok_or(ConfirmationError::NotFound)?;
        tracing::info!(actor, command = %confirmation.command, "confirmation denied");

        if confirmation.source == Source::Agent {
            self.dispatch(
                &confirmation,
                NotificationKind::Denied {
                    message: format!("The operator denied `{}`; it was not executed.", confirmation.command),
                },
            );
        }
        Ok(confirmation)
    }

    async fn run(&self, command: &str) -> Result<ExecutionResult, ExecutionError> {
        if self.log_commands {
            tracing::info!(command, "executing command");
        }
        self.executor
            .execute(command, &self.working_directory, self.execution_timeout)
            .await
    }

    fn dispatch(&self, confirmation: &PendingConfirmation, kind: NotificationKind) {
        let notification = Notification {
            correlation_id: confirmation.correlation_id.clone(),
            command: confirmation.command.clone(),
            kind,
        };
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            if let Err(err) = notifier.notify(&notification).await {
                tracing::warn!(error = %err, correlation_id = %notification.correlation_id, "notification failed");
            }
        });
    }
}
