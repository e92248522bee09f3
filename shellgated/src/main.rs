// ABOUTME: runs the daemon that gates shell commands from operators and agents behind policy and confirmation.
// ABOUTME: exposes a local unix socket and writes an audit log for each request.

mod audit;
mod auditor;
mod config;
mod confirmation;
mod error;
mod executor;
mod notify;
mod policy;
mod reply;
mod server;
mod workflow;

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use crate::auditor::{CommandAuditor, SemanticAuditor};
use crate::config::Config;
use crate::notify::{LogNotifier, Notifier, OutboxNotifier};

#[derive(Debug, Parser)]
struct Args {
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long, default_value = "/tmp/shellgated.sock")]
    socket_path: String,

    #[arg(long, default_value = "./shellgated-audit.jsonl")]
    audit_path: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let args = Args::parse();
    let config = Config::load(args.config.as_deref())?;
    config.ensure_working_directory().await?;

    if config.has_fail_open_audit() {
        tracing::warn!(
            "semantic audit failures allow commands at verification level; use strict to fail closed"
        );
    }

    let auditor: Option<Arc<dyn SemanticAuditor>> = config
        .audit_command
        .clone()
        .map(|argv| Arc::new(CommandAuditor::new(argv)) as Arc<dyn SemanticAuditor>);
    let notifier: Arc<dyn Notifier> = match &config.notification_outbox {
        Some(path) => Arc::new(OutboxNotifier::new(path)),
        None => Arc::new(LogNotifier),
    };

    let state = Arc::new(server::State {
        workflow: workflow::Workflow::from_config(&config, auditor, notifier),
        admin_uids: config.admin_uids.clone(),
    });

    tracing::info!(
        working_directory = %config.working_directory.display(),
        user_level = ?config.user_security_level,
        llm_level = ?config.llm_security_level,
        audit = config.enable_llm_audit,
        "shellgated starting"
    );
    server::run(&args.socket_path, &args.audit_path, state).await
}
