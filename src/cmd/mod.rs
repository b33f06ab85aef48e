use std::{
    ffi::{CString, NulError},
    fmt,
};

use itertools::Itertools;

use crate::error::ParseError;

/// One command of the pipeline. `arguments[0]` is the executable itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    executable: String,
    arguments: Vec<String>,
}

impl Command {
    /// Builds a command from a bracket group's tokens. An empty group gives an
    /// empty executable name, which [`Command::validate`] rejects.
    pub fn from_tokens(arguments: Vec<String>) -> Self {
        let executable = arguments.first().cloned().unwrap_or_default();
        Self {
            executable,
            arguments,
        }
    }

    pub fn executable(&self) -> &str {
        &self.executable
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    /// `group` is the 1-based position of this command on the command line.
    pub fn validate(&self, group: usize) -> Result<(), ParseError> {
        if self.executable.is_empty() {
            return Err(ParseError::EmptyExecutable { group });
        }
        Ok(())
    }

    pub fn to_argv(&self) -> Result<Vec<CString>, NulError> {
        self.arguments
            .iter()
            .map(|arg| CString::new(arg.as_bytes()))
            .collect()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.arguments.iter().format(" "))
    }
}
