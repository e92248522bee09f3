// ABOUTME: loads the daemon configuration from an optional toml file with per-field defaults.
// ABOUTME: validates timeouts and auditor settings before the server starts accepting requests.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use shellgate_common::{SecurityLevel, Source};

use crate::error::ConfigError;

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Executor timeout in seconds.
    pub max_execution_time: u64,
    pub working_directory: PathBuf,
    pub shell: PathBuf,
    pub user_security_level: SecurityLevel,
    pub llm_security_level: SecurityLevel,
    pub security_blacklist: Vec<String>,
    pub enable_llm_audit: bool,
    /// argv of the external semantic auditor.
    pub audit_command: Option<Vec<String>>,
    pub audit_timeout: u64,
    /// Pending confirmation TTL in seconds.
    pub confirmation_timeout: u64,
    pub allowed_commands: Vec<String>,
    pub allow_all_commands: bool,
    pub interactive_commands: Vec<String>,
    pub enable_logging: bool,
    pub max_output_bytes: usize,
    /// Peer uids allowed to talk to the daemon. Empty admits every peer.
    pub admin_uids: Vec<u32>,
    pub notification_outbox: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_execution_time: 30,
            working_directory: PathBuf::from("./shellgate-workdir"),
            shell: PathBuf::from("/bin/sh"),
            user_security_level: SecurityLevel::Verification,
            llm_security_level: SecurityLevel::Verification,
            security_blacklist: ["rm -rf", "mkfs", "dd if=", "shutdown", "reboot", ":(){"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            enable_llm_audit: false,
            audit_command: None,
            audit_timeout: 20,
            confirmation_timeout: 300,
            allowed_commands: Vec::new(),
            allow_all_commands: true,
            interactive_commands: [
                "bash", "sh", "zsh", "python", "python3", "node", "vim", "vi", "nano", "top", "less",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            enable_logging: true,
            max_output_bytes: 8192,
            admin_uids: Vec::new(),
            notification_outbox: None,
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::from_toml(&text).map_err(|source| ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                })?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_execution_time == 0 {
            return Err(ConfigError::Invalid("max_execution_time must be > 0".to_string()));
        }
        if self.confirmation_timeout == 0 {
            return Err(ConfigError::Invalid("confirmation_timeout must be > 0".to_string()));
        }
        if self.enable_llm_audit {
            if self.audit_timeout == 0 {
                return Err(ConfigError::Invalid("audit_timeout must be > 0".to_string()));
            }
            match &self.audit_command {
                Some(argv) if argv.first().is_some_and(|p| !p.trim().is_empty()) => {}
                _ => {
                    return Err(ConfigError::Invalid(
                        "enable_llm_audit requires a non-empty audit_command".to_string(),
                    ))
                }
            }
        }
        Ok(())
    }

    pub fn level_for(&self, source: Source) -> SecurityLevel {
        match source {
            Source::User => self.user_security_level,
            Source::Agent => self.llm_security_level,
        }
    }

    pub fn execution_timeout(&self) -> Duration {
        Duration::from_secs(self.max_execution_time)
    }

    pub fn confirmation_ttl(&self) -> Duration {
        Duration::from_secs(self.confirmation_timeout)
    }

    pub fn audit_deadline(&self) -> Duration {
        Duration::from_secs(self.audit_timeout)
    }

    /// Verification-level commands run when the auditor fails. Worth surfacing at startup.
    pub fn has_fail_open_audit(&self) -> bool {
        self.enable_llm_audit
            && (self.user_security_level == SecurityLevel::Verification
                || self.llm_security_level == SecurityLevel::Verification)
    }

    pub async fn ensure_working_directory(&self) -> anyhow::Result<()> {
        use anyhow::Context;
        tokio::fs::create_dir_all(&self.working_directory)
            .await
            .with_context(|| format!("create working directory {}", self.working_directory.display()))
    }
}
