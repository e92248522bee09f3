// ABOUTME: provides shellgate client helpers for building and validating requests before sending them.
// ABOUTME: keeps client behavior deterministic by applying the same validation the daemon enforces.

use shellgate_common::{
    parse_request, validate_request, Action, CommandAction, ErrorCode, Request, RequestError,
    PROTOCOL_VERSION,
};

pub fn build_request(
    action: Action,
    actor: &str,
    request_id: Option<&str>,
    correlation_id: Option<&str>,
) -> anyhow::Result<Request> {
    let request = Request {
        version: PROTOCOL_VERSION.to_string(),
        request_id: request_id
            .map(str::to_string)
            .unwrap_or_else(|| format!("req-{}", uuid::Uuid::new_v4())),
        actor: actor.to_string(),
        correlation_id: correlation_id.map(str::to_string),
        action,
    };
    validate_request(&request).map_err(|e| anyhow::anyhow!(e.message))?;
    Ok(request)
}

/// Joins trailing cli words back into one command line.
pub fn command_action(words: &[String]) -> CommandAction {
    CommandAction {
        command: words.join(" "),
    }
}

pub fn apply_overrides(
    mut request: Request,
    request_id: Option<&str>,
    actor: Option<&str>,
) -> anyhow::Result<Request> {
    if let Some(request_id) = request_id {
        if request_id.trim().is_empty() {
            return Err(anyhow::anyhow!("request_id override must be non-empty"));
        }
        request.request_id = request_id.to_string();
    }

    if let Some(actor) = actor {
        if actor.trim().is_empty() {
            return Err(anyhow::anyhow!("actor override must be non-empty"));
        }
        request.actor = actor.to_string();
    }

    Ok(request)
}

pub fn parse_and_validate(input: &str) -> anyhow::Result<Request> {
    let request = parse_request(input)?;
    validate_request(&request).map_err(|e| anyhow::anyhow!(e.message))?;
    Ok(request)
}

#[derive(Debug, serde::Serialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ValidateVerdict {
    pub ok: bool,
    pub error: Option<RequestError>,
}

pub fn validate_verdict(input: &str) -> ValidateVerdict {
    match parse_request(input) {
        Ok(request) => match validate_request(&request) {
            Ok(()) => ValidateVerdict { ok: true, error: None },
            Err(err) => ValidateVerdict {
                ok: false,
                error: Some(RequestError {
                    code: ErrorCode::ValidationFailed,
                    message: err.message,
                }),
            },
        },
        Err(err) => ValidateVerdict {
            ok: false,
            error: Some(RequestError {
                code: ErrorCode::ParseFailed,
                message: err.to_string(),
            }),
        },
    }
}
