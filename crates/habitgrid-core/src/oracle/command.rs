//! Subprocess oracle adapter.
//!
//! Spawns a configurable text-generation CLI, writes the composed prompt to
//! its stdin, and reads the response from stdout. Raw HTTP transport stays
//! outside this crate; any CLI that reads a prompt and prints text works.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use super::{Oracle, OracleError, OracleRequest};

/// Oracle backed by a local command-line program.
#[derive(Debug, Clone)]
pub struct CommandOracle {
    /// Program name or path, resolved via `$PATH`.
    program: String,
    /// Fixed arguments passed on every invocation.
    args: Vec<String>,
}

impl CommandOracle {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Compose the stdin payload: system instruction, format hint, prompt.
    fn stdin_payload(request: &OracleRequest) -> String {
        format!(
            "{}\n\nRespond with {} only. Keep the response under {} tokens.\n\n{}",
            request.system_instruction,
            request.response_format_hint.to_uppercase(),
            request.max_output_tokens,
            request.user_prompt
        )
    }
}

#[async_trait]
impl Oracle for CommandOracle {
    fn name(&self) -> &str {
        "command"
    }

    async fn generate(&self, request: &OracleRequest) -> Result<String, OracleError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| OracleError::Network(format!("failed to spawn {}: {e}", self.program)))?;

        let payload = Self::stdin_payload(request);
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(payload.as_bytes())
                .await
                .map_err(|e| OracleError::Network(format!("failed to write prompt: {e}")))?;
            // Close stdin so the program starts processing.
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| OracleError::Network(format!("failed to collect output: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(OracleError::Server(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        let text = String::from_utf8_lossy(&output.stdout).trim().to_string();
        debug!(program = %self.program, bytes = text.len(), "oracle response received");
        if text.is_empty() {
            return Err(OracleError::Empty);
        }
        Ok(text)
    }
}
