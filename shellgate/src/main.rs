// ABOUTME: provides the operator and agent cli for submitting commands to the shellgate daemon.
// ABOUTME: prints the json response returned by the daemon.

use clap::{Args, Parser, Subcommand};
use shellgate_common::Action;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::UnixStream;

use shellgate::{apply_overrides, build_request, command_action, parse_and_validate, validate_verdict};

#[derive(Debug, Parser)]
#[command(name = "shellgate")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct Conn {
    #[arg(long, default_value = "/tmp/shellgated.sock")]
    socket_path: String,

    /// Defaults to $USER.
    #[arg(long)]
    actor: Option<String>,

    #[arg(long)]
    request_id: Option<String>,
}

impl Conn {
    fn actor(&self) -> String {
        self.actor
            .clone()
            .or_else(|| std::env::var("USER").ok())
            .unwrap_or_else(|| "operator".to_string())
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run a command as the operator.
    Shell {
        #[command(flatten)]
        conn: Conn,

        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
    /// Run a command on behalf of an agent session.
    Tool {
        #[command(flatten)]
        conn: Conn,

        #[arg(long)]
        correlation_id: Option<String>,

        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        command: Vec<String>,
    },
    /// Approve the pending confirmation.
    Allow {
        #[command(flatten)]
        conn: Conn,
    },
    /// Discard the pending confirmation.
    Deny {
        #[command(flatten)]
        conn: Conn,
    },
    Ping {
        #[command(flatten)]
        conn: Conn,
    },
    /// Send a raw request from a file, --json, or stdin.
    Send {
        #[command(flatten)]
        conn: Conn,

        #[arg(long)]
        file: Option<String>,

        #[arg(long)]
        json: Option<String>,
    },
    Validate {
        #[arg(long)]
        file: Option<String>,

        #[arg(long)]
        json: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (conn, request) = match cli.command {
        Command::Shell { conn, command } => {
            let request = build_request(
                Action::Shell(command_action(&command)),
                &conn.actor(),
                conn.request_id.as_deref(),
                None,
            )?;
            (conn, request)
        }
        Command::Tool {
            conn,
            correlation_id,
            command,
        } => {
            let request = build_request(
                Action::ExecuteShellCommand(command_action(&command)),
                &conn.actor(),
                conn.request_id.as_deref(),
                correlation_id.as_deref(),
            )?;
            (conn, request)
        }
        Command::Allow { conn } => {
            let request = build_request(Action::ShellAllow, &conn.actor(), conn.request_id.as_deref(), None)?;
            (conn, request)
        }
        Command::Deny { conn } => {
            let request = build_request(Action::ShellDeny, &conn.actor(), conn.request_id.as_deref(), None)?;
            (conn, request)
        }
        Command::Ping { conn } => {
            let request = build_request(Action::Ping, &conn.actor(), conn.request_id.as_deref(), None)?;
            (conn, request)
        }
        Command::Send { conn, file, json } => {
            let input = read_input(file.as_deref(), json.as_deref()).await?;
            let request = parse_and_validate(&input)?;
            let request = apply_overrides(request, conn.request_id.as_deref(), conn.actor.as_deref())?;
            (conn, request)
        }
        Command::Validate { file, json } => {
            let input = read_input(file.as_deref(), json.as_deref()).await?;
            let verdict = validate_verdict(&input);
            print!("{}", serde_json::to_string_pretty(&verdict)?);
            return Ok(());
        }
    };

    let canonical = serde_json::to_string(&request)?;
    let response = send(&conn.socket_path, &canonical).await?;
    print!("{response}");
    Ok(())
}

async fn read_input(file: Option<&str>, json: Option<&str>) -> anyhow::Result<String> {
    if let Some(json) = json {
        return Ok(json.to_string());
    }

    if let Some(file) = file {
        return Ok(tokio::fs::read_to_string(file).await?);
    }

    let mut input = String::new();
    tokio::io::stdin().read_to_string(&mut input).await?;
    Ok(input)
}

async fn send(socket_path: &str, input: &str) -> anyhow::Result<String> {
    let mut stream = UnixStream::connect(socket_path).await?;
    stream.write_all(input.as_bytes()).await?;
    stream.shutdown().await?;

    let mut response = String::new();
    stream.read_to_string(&mut response).await?;
    Ok(response)
}
