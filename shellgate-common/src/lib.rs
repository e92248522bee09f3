// ABOUTME: defines the request/response protocol shared by the shellgate client and daemon.
// ABOUTME: provides parsing and validation helpers so both sides reject the same malformed requests.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const PROTOCOL_VERSION: &str = "0.1";
pub const MAX_COMMAND_BYTES: usize = 16 * 1024;

/// Who originated a command.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    User,
    Agent,
}

/// Per-source policy mode.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum SecurityLevel {
    /// Every command runs without any check.
    Permissive,
    /// Unsafe commands are held for operator confirmation.
    #[default]
    Verification,
    /// Unsafe commands are rejected outright.
    Strict,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ExecutionResult {
    pub stdout: String,
    pub stdout_truncated: bool,
    pub stderr: String,
    pub stderr_truncated: bool,
    pub exit_code: i32,
    pub timed_out: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Request {
    pub version: String,
    pub request_id: String,
    pub actor: String,
    #[serde(default)]
    pub correlation_id: Option<String>,
    pub action: Action,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    /// Operator-issued command.
    Shell(CommandAction),
    /// Agent tool call.
    ExecuteShellCommand(CommandAction),
    ShellAllow,
    ShellDeny,
    Ping,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct CommandAction {
    pub command: String,
}

impl Action {
    pub fn command(&self) -> Option<&str> {
        match self {
            Action::Shell(action) | Action::ExecuteShellCommand(action) => Some(&action.command),
            Action::ShellAllow | Action::ShellDeny | Action::Ping => None,
        }
    }

    pub fn source(&self) -> Option<Source> {
        match self {
            Action::Shell(_) => Some(Source::User),
            Action::ExecuteShellCommand(_) => Some(Source::Agent),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Executed,
    Denied,
    Refused,
    ConfirmationRequired,
    PendingExists,
    Rejected,
    NoPending,
    Expired,
    Invalid,
    Forbidden,
    ExecutionFailed,
    Pong,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ParseFailed,
    ValidationFailed,
    RequestTooLarge,
    PermissionDenied,
    ExecutionFailed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RequestError {
    pub code: ErrorCode,
    pub message: String,
}

/// Summary of a pending confirmation as shown to the requester.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PendingSummary {
    pub command: String,
    pub reason: String,
    pub source: Source,
    pub expires_in_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Response {
    pub request_id: String,
    pub outcome: Outcome,
    pub message: String,
    #[serde(default)]
    pub result: Option<ExecutionResult>,
    #[serde(default)]
    pub pending: Option<PendingSummary>,
    #[serde(default)]
    pub error: Option<RequestError>,
}

impl Response {
    pub fn new(request_id: impl Into<String>, outcome: Outcome, message: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            outcome,
            message: message.into(),
            result: None,
            pending: None,
            error: None,
        }
    }

    pub fn request_error(request_id: impl Into<String>, code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let outcome = match code {
            ErrorCode::PermissionDenied => Outcome::Forbidden,
            ErrorCode::ExecutionFailed => Outcome::ExecutionFailed,
            _ => Outcome::Invalid,
        };
        Self {
            error: Some(RequestError {
                code,
                message: message.clone(),
            }),
            ..Self::new(request_id, outcome, message)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    pub message: String,
}

impl ValidationError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

pub fn parse_request(input: &str) -> Result<Request, serde_json::Error> {
    serde_json::from_str(input)
}

pub fn validate_request(request: &Request) -> Result<(), ValidationError> {
    if request.version != PROTOCOL_VERSION {
        return Err(ValidationError::new(format!(
            "unsupported version {:?}, expected {PROTOCOL_VERSION}",
            request.version
        )));
    }
    if request.request_id.trim().is_empty() {
        return Err(ValidationError::new("request_id must be non-empty"));
    }
    if request.actor.trim().is_empty() {
        return Err(ValidationError::new("actor must be non-empty"));
    }

    if let Some(command) = request.action.command() {
        if command.trim().is_empty() {
            return Err(ValidationError::new("command must be non-empty"));
        }
        if command.len() > MAX_COMMAND_BYTES {
            return Err(ValidationError::new(format!(
                "command exceeds {MAX_COMMAND_BYTES} bytes"
            )));
        }
        if command.contains('\0') {
            return Err(ValidationError::new("command must not contain NUL bytes"));
        }
    }

    Ok(())
}
