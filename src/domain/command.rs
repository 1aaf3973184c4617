//! Command specifications
//!
//! A CommandSpec describes one invocable command: the command line, whether it
//! goes through the platform shell or is split into an argument vector, and
//! how the process's output streams are encoded.

use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::error::{HealthError, Result};

/// How the command line is handed to the OS
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecMode {
    /// Run through `cmd /C` (Windows) or `sh -c` (elsewhere)
    #[default]
    Shell,
    /// Split with shell-words quoting rules and exec the first word directly
    Argv,
}

/// Text encoding of the child's stdout/stderr
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputEncoding {
    /// Platform text, newline delimited
    #[default]
    Text,
    /// 16-bit little-endian, BOM optional (System File Checker writes this)
    Utf16le,
}

/// Immutable description of one invocable command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    command: String,
    #[serde(default)]
    mode: ExecMode,
    #[serde(default)]
    encoding: OutputEncoding,
}

impl CommandSpec {
    /// A shell-line command with text output
    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            mode: ExecMode::Shell,
            encoding: OutputEncoding::Text,
        }
    }

    /// An argument-vector command with text output
    pub fn argv(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            mode: ExecMode::Argv,
            encoding: OutputEncoding::Text,
        }
    }

    /// Same command, decoded as UTF-16LE
    pub fn wide(self) -> Self {
        self.with_encoding(OutputEncoding::Utf16le)
    }

    pub fn with_encoding(mut self, encoding: OutputEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn mode(&self) -> ExecMode {
        self.mode
    }

    pub fn encoding(&self) -> OutputEncoding {
        self.encoding
    }

    /// Build the process builder with both output streams piped.
    ///
    /// On unix the child leads its own process group so a stop request can
    /// signal the shell and everything it started.
    pub fn to_command(&self) -> Result<Command> {
        let line = self.command.trim();
        if line.is_empty() {
            return Err(HealthError::EmptyCommand);
        }

        let mut cmd = match self.mode {
            ExecMode::Shell => shell_command(line),
            ExecMode::Argv => {
                let words = shell_words::split(line)
                    .map_err(|e| HealthError::InvalidCommand(e.to_string()))?;
                let (program, args) = words.split_first().ok_or(HealthError::EmptyCommand)?;
                let mut cmd = Command::new(program);
                cmd.args(args);
                cmd
            }
        };

        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        Ok(cmd)
    }
}

#[cfg(windows)]
fn shell_command(line: &str) -> Command {
    let mut cmd = Command::new("cmd");
    cmd.arg("/C").raw_arg(line);
    cmd
}

#[cfg(not(windows))]
fn shell_command(line: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(line);
    cmd
}
