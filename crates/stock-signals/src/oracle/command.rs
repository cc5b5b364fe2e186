//! Oracle backed by a local command-line assistant

use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use super::{Oracle, OracleReply, extract_agent_message, parse_reply};
use crate::error::OracleError;

/// Placeholder replaced by the prompt as a single argument
pub const PROMPT_PLACEHOLDER: &str = "{prompt}";

/// Known assistant CLIs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandPreset {
    Claude,
    Codex,
    Opencode,
}

impl CommandPreset {
    pub fn template(&self) -> &'static str {
        match self {
            Self::Claude => "claude --print -p {prompt}",
            Self::Codex => "codex exec --json {prompt}",
            Self::Opencode => "opencode run {prompt} --format json",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "claude" => Some(Self::Claude),
            "codex" => Some(Self::Codex),
            "opencode" => Some(Self::Opencode),
            _ => None,
        }
    }
}

/// Runs one process per prompt
///
/// Templates are split on whitespace; quoting is not interpreted. When the
/// template has no `{prompt}` token the prompt is written to stdin.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl CommandOracle {
    pub fn from_template(template: &str, timeout: Duration) -> Result<Self, OracleError> {
        let mut parts = template.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| OracleError::Unavailable("oracle command is empty".to_string()))?;
        Ok(Self {
            program,
            args: parts.collect(),
            timeout,
        })
    }

    pub fn preset(preset: CommandPreset, timeout: Duration) -> Self {
        let mut parts = preset.template().split_whitespace().map(str::to_string);
        Self {
            program: parts.next().unwrap_or_default(),
            args: parts.collect(),
            timeout,
        }
    }

    fn uses_placeholder(&self) -> bool {
        self.args.iter().any(|arg| arg == PROMPT_PLACEHOLDER)
    }

    /// Arguments with the placeholder substituted
    fn argv(&self, prompt: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| {
                if arg == PROMPT_PLACEHOLDER {
                    prompt.to_string()
                } else {
                    arg.clone()
                }
            })
            .collect()
    }

    async fn run(&self, prompt: &str) -> Result<String, OracleError> {
        let via_stdin = !self.uses_placeholder();
        let mut command = Command::new(&self.program);
        command
            .args(self.argv(prompt))
            .stdin(if via_stdin { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn().map_err(|e| match e.kind() {
            ErrorKind::NotFound => OracleError::Unavailable(format!("{} not found", self.program)),
            _ => OracleError::Io(e),
        })?;

        if via_stdin {
            if let Some(mut stdin) = child.stdin.take() {
                let written = match stdin.write_all(prompt.as_bytes()).await {
                    Ok(()) => stdin.shutdown().await,
                    Err(e) => Err(e),
                };
                // A child that exits without reading its input is judged by its exit status
                if let Err(e) = written {
                    if e.kind() != ErrorKind::BrokenPipe {
                        return Err(OracleError::Io(e));
                    }
                }
            }
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| OracleError::Timeout(self.timeout))??;

        let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let detail = if stderr.is_empty() {
                stdout.chars().take(500).collect()
            } else {
                stderr
            };
            return Err(OracleError::ExitStatus {
                code: output.status.code(),
                stderr: detail,
            });
        }
        Ok(stdout)
    }
}

#[async_trait]
impl Oracle for CommandOracle {
    fn name(&self) -> &str {
        &self.program
    }

    #[instrument(skip(self, prompt), fields(program = %self.program))]
    async fn evaluate(&self, prompt: &str) -> Result<OracleReply, OracleError> {
        let stdout = self.run(prompt).await?;
        debug!(bytes = stdout.len(), "Oracle answered");

        let text = extract_agent_message(&stdout).unwrap_or(stdout);
        let reply = parse_reply(&text);
        if reply.unparsed {
            warn!("Oracle answer held no JSON object");
        }
        Ok(reply)
    }
}
