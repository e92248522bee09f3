// ABOUTME: writes append-only audit records for each handled request and the daemon's response.
// ABOUTME: redacts command output so the log records decisions without leaking what commands printed.

use anyhow::Context;
use shellgate_common::{Request, Response};

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct PeerCredentials {
    pub pid: i32,
    pub uid: u32,
    pub gid: u32,
}

#[derive(Debug, serde::Serialize)]
struct AuditRecord<'a> {
    ts_unix_ms: u64,
    peer: Option<PeerCredentials>,
    request_id: &'a str,
    actor: Option<&'a str>,
    correlation_id: Option<&'a str>,
    request: Option<serde_json::Value>,
    response: serde_json::Value,
}

pub async fn append_record(
    audit_path: &str,
    ts_unix_ms: u64,
    peer: Option<PeerCredentials>,
    request: Option<&Request>,
    response: &Response,
) -> anyhow::Result<()> {
    let record = AuditRecord {
        ts_unix_ms,
        peer,
        request_id: response.request_id.as_str(),
        actor: request.map(|r| r.actor.as_str()),
        correlation_id: request.and_then(|r| r.correlation_id.as_deref()),
        request: request.map(serde_json::to_value).transpose()?,
        response: redact_response(response)?,
    };

    let mut line = serde_json::to_vec(&record)?;
    line.push(b'\n');

    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(audit_path)
        .await
        .with_context(|| format!("open audit log at {audit_path}"))?;

    use tokio::io::AsyncWriteExt;
    file.write_all(&line).await?;
    file.flush().await?;
    Ok(())
}

fn redact_response(response: &Response) -> anyhow::Result<serde_json::Value> {
    let mut v = serde_json::to_value(response)?;

    if let Some(result) = v.get_mut("result").and_then(|r| r.as_object_mut()) {
        for key in ["stdout", "stderr"] {
            if result.contains_key(key) {
                result.insert(key.to_string(), serde_json::Value::String("[redacted]".to_string()));
            }
        }
    }

    // operator replies embed the output too
    if v.get("result").is_some_and(|r| !r.is_null()) {
        if let Some(obj) = v.as_object_mut() {
            obj.insert("message".to_string(), serde_json::Value::String("[redacted]".to_string()));
        }
    }

    Ok(v)
}
