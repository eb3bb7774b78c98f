// Copyright (c) 2026 Robert L. Snyder, Sierra Vista, AZ
// Licensed under the MIT License. See LICENSE file in the project root for details.

//! External command templates.
//!
//! Generation, rendering and playback are delegated to external programs
//! configured as argument lists with `{placeholder}` substitution.

use std::collections::HashMap;
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::process::Command;

/// Errors from running an external command
#[derive(Debug, Error)]
pub enum CommandError {
    /// Template has no program
    #[error("command template is empty")]
    Empty,
    /// Program could not be spawned
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    /// Program exited unsuccessfully
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: std::process::ExitStatus,
        stderr: String,
    },
}

/// A program plus arguments, with `{name}` placeholders
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandTemplate(Vec<String>);

impl CommandTemplate {
    /// Create a template from its argument list (program first)
    pub fn new<I, S>(args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(args.into_iter().map(Into::into).collect())
    }

    /// Raw arguments
    pub fn args(&self) -> &[String] {
        &self.0
    }

    /// Whether the template names no program
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Substitute placeholders. Unknown placeholders are left as written.
    pub fn expand(&self, vars: &HashMap<&str, String>) -> Vec<String> {
        self.0
            .iter()
            .map(|arg| {
                let mut out = arg.clone();
                for (name, value) in vars {
                    out = out.replace(&format!("{{{}}}", name), value);
                }
                out
            })
            .collect()
    }

    /// Build a ready-to-spawn command
    pub fn command(&self, vars: &HashMap<&str, String>) -> Result<Command, CommandError> {
        let expanded = self.expand(vars);
        let (program, args) = expanded.split_first().ok_or(CommandError::Empty)?;
        let mut command = Command::new(program);
        command.args(args).stdin(Stdio::null()).kill_on_drop(true);
        Ok(command)
    }

    /// Run to completion and return stdout
    pub async fn run(&self, vars: &HashMap<&str, String>) -> Result<String, CommandError> {
        let program = self.0.first().cloned().ok_or(CommandError::Empty)?;
        let output = self
            .command(vars)?
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|source| CommandError::Spawn {
                program: program.clone(),
                source,
            })?;

        if !output.status.success() {
            return Err(CommandError::Failed {
                program,
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
