// ABOUTME: hosts the unix socket server that accepts shell, allow, and deny requests from clients.
// ABOUTME: checks peer permissions, drives the confirmation workflow, and audit-logs every response.

use std::path::Path;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::Context;
use shellgate_common::{
    parse_request, validate_request, Action, ErrorCode, Outcome, Request, Response, Source,
};
use std::os::unix::io::AsRawFd;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};

use crate::audit;
use crate::error::{ConfirmationError, GateError};
use crate::reply;
use crate::workflow::{Approved, Submission, Workflow};

const MAX_REQUEST_BYTES: usize = 64 * 1024;
#[cfg(test)]
const READ_IDLE_TIMEOUT: std::time::Duration = std::time::Duration::from_millis(50);
#[cfg(not(test))]
const READ_IDLE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

pub struct State {
    pub workflow: Workflow,
    /// Empty admits every peer.
    pub admin_uids: Vec<u32>,
}

pub async fn run(socket_path: &str, audit_path: &str, state: Arc<State>) -> anyhow::Result<()> {
    if Path::new(socket_path).exists() {
        tokio::fs::remove_file(socket_path)
            .await
            .with_context(|| format!("remove existing socket at {socket_path}"))?;
    }

    let listener = UnixListener::bind(socket_path).with_context(|| format!("bind {socket_path}"))?;
    tracing::info!(socket_path, "listening");

    loop {
        let (stream, _addr) = listener.accept().await?;
        let audit_path = audit_path.to_string();
        let state = state.clone();
        tokio::spawn(async move {
            if let Err(err) = handle_client(stream, &audit_path, &state).await {
                tracing::warn!(error = %err, "client handling failed");
            }
        });
    }
}

async fn handle_client(mut stream: UnixStream, audit_path: &str, state: &State) -> anyhow::Result<()> {
    let peer = peer_credentials(&stream);

    let mut input = Vec::new();
    let mut buf = [0u8; 4096];
    let mut exceeded = false;
    let mut idle = false;
    loop {
        let n = match tokio::time::timeout(READ_IDLE_TIMEOUT, stream.read(&mut buf)).await {
            Ok(res) => res?,
            Err(_) => {
                idle = true;
                break;
            }
        };
        if n == 0 {
            break;
        }
        if exceeded {
            continue;
        }
        if input.len() + n > MAX_REQUEST_BYTES {
            exceeded = true;
            continue;
        }
        input.extend_from_slice(&buf[..n]);
    }

    if exceeded {
        let response = Response::request_error("unknown", ErrorCode::RequestTooLarge, "request exceeds max bytes");
        return respond(&mut stream, audit_path, peer, None, &response).await;
    }

    if idle && input.is_empty() {
        let response = Response::request_error("unknown", ErrorCode::ParseFailed, "read timed out");
        return respond(&mut stream, audit_path, peer, None, &response).await;
    }

    let input_str = String::from_utf8_lossy(&input);
    let request = match parse_request(&input_str) {
        Ok(r) => r,
        Err(err) => {
            let response = Response::request_error("unknown", ErrorCode::ParseFailed, format!("parse failed: {err}"));
            return respond(&mut stream, audit_path, peer, None, &response).await;
        }
    };

    let response = if let Err(err) = validate_request(&request) {
        Response::request_error(
            &request.request_id,
            ErrorCode::ValidationFailed,
            format!("validation failed: {}", err.message),
        )
    } else if !peer_is_admin(peer, &state.admin_uids) {
        tracing::warn!(actor = %request.actor, ?peer, "peer is not permitted to run commands");
        Response::request_error(
            &request.request_id,
            ErrorCode::PermissionDenied,
            "permission denied: only administrators may run shell commands",
        )
    } else {
        handle_request(&state.workflow, &request).await
    };

    respond(&mut stream, audit_path, peer, Some(&request), &response).await
}

async fn respond(
    stream: &mut UnixStream,
    audit_path: &str,
    peer: Option<audit::PeerCredentials>,
    request: Option<&Request>,
    response: &Response,
) -> anyhow::Result<()> {
    let response_json = serde_json::to_vec(response)?;
    stream.write_all(&response_json).await?;
    let _ = stream.shutdown().await;

    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64;
    audit::append_record(audit_path, now_ms, peer, request, response).await
}

fn peer_is_admin(peer: Option<audit::PeerCredentials>, admin_uids: &[u32]) -> bool {
    if admin_uids.is_empty() {
        return true;
    }
    peer.is_some_and(|p| admin_uids.contains(&p.uid))
}

fn peer_credentials(stream: &UnixStream) -> Option<audit::PeerCredentials> {
    let fd = stream.as_raw_fd();

    let mut ucred: libc::ucred = unsafe { std::mem::zeroed() };
    let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_PEERCRED,
            (&mut ucred as *mut libc::ucred).cast(),
            &mut len,
        )
    };
    if rc != 0 {
        return None;
    }
    if len as usize != std::mem::size_of::<libc::ucred>() {
        return None;
    }

    Some(audit::PeerCredentials {
        pid: ucred.pid,
        uid: ucred.uid,
        gid: ucred.gid,
    })
}

async fn handle_request(workflow: &Workflow, request: &Request) -> Response {
    let id = request.request_id.as_str();
    let actor = request.actor.as_str();
    let correlation_id = request.correlation_id.as_deref().unwrap_or("");

    match &request.action {
        Action::Ping => Response::new(id, Outcome::Pong, "pong"),
        Action::Shell(exec) => {
            let submitted = workflow.submit(actor, &exec.command, Source::User, correlation_id).await;
            submission_response(workflow, id, Source::User, submitted)
        }
        Action::ExecuteShellCommand(exec) => {
            let submitted = workflow.submit(actor, &exec.command, Source::Agent, correlation_id).await;
            submission_response(workflow, id, Source::Agent, submitted)
        }
        Action::ShellAllow => match workflow.approve(actor).await {
            Ok(Approved { result, .. }) => {
                let mut response = Response::new(id, Outcome::Executed, reply::operator_reply(&result));
                response.result = Some(result);
                response
            }
            Err(err) => error_response(workflow, id, err),
        },
        Action::ShellDeny => match workflow.deny(actor).await {
            Ok(confirmation) => Response::new(
                id,
                Outcome::Rejected,
                format!("Denied `{}`; it was not executed.", confirmation.command),
            ),
            Err(err) => error_response(workflow, id, err),
        },
    }
}

fn submission_response(
    workflow: &Workflow,
    id: &str,
    source: Source,
    submitted: Result<Submission, GateError>,
) -> Response {
    let ttl = workflow.store().ttl();
    match submitted {
        Ok(Submission::Executed(result)) => {
            let mut response = Response::new(id, Outcome::Executed, reply::result_reply(source, &result));
            response.result = Some(result);
            response
        }
        Ok(Submission::Denied { reason }) => Response::new(
            id,
            Outcome::Denied,
            format!("Command denied by security policy ({reason})."),
        ),
        Ok(Submission::AwaitingApproval(pending)) => {
            let message = reply::confirmation_prompt(source, &pending.command, &pending.reason, ttl);
            let mut response = Response::new(id, Outcome::ConfirmationRequired, message);
            response.pending = Some(pending.summary(ttl));
            response
        }
        Err(err) => error_response(workflow, id, err),
    }
}

fn error_response(workflow: &Workflow, id: &str, err: GateError) -> Response {
    match err {
        GateError::Validation(message) => Response::request_error(id, ErrorCode::ValidationFailed, message),
        GateError::Refused(message) => Response::new(id, Outcome::Refused, message),
        GateError::Confirmation(ConfirmationError::Conflict { existing }) => {
            let mut response = Response::new(id, Outcome::PendingExists, reply::pending_exists(&existing.command));
            response.pending = Some(existing.summary(workflow.store().ttl()));
            response
        }
        GateError::Confirmation(ConfirmationError::NotFound) => {
            Response::new(id, Outcome::NoPending, "No pending confirmation.")
        }
        GateError::Confirmation(ConfirmationError::Expired) => Response::new(
            id,
            Outcome::Expired,
            "The pending confirmation expired; submit the command again.",
        ),
        GateError::Execution(err) => {
            tracing::warn!(error = %err, "command could not be executed");
            Response::request_error(id, ErrorCode::ExecutionFailed, err.to_string())
        }
    }
}
