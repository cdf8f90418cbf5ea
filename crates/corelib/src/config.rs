//! Bridge configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// How to start and validate the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Engine executable.
    pub program: PathBuf,
    /// Extra command-line arguments for the engine.
    pub args: Vec<String>,
    /// Engine-side session log, passed as `-log <path>`.
    pub session_log: Option<PathBuf>,
    /// Rewrite snake_case method names to lowerCamelCase on invoke.
    pub convert_case: bool,
    /// Value the engine must report as `system`.
    pub expected_system: String,
    /// Required prefix of the engine version; `None` accepts any.
    pub version_prefix: Option<String>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("umi"),
            args: Vec::new(),
            session_log: None,
            convert_case: true,
            expected_system: "UMI".to_string(),
            version_prefix: Some("0.8.".to_string()),
        }
    }
}

impl BridgeConfig {
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_session_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.session_log = Some(path.into());
        self
    }

    pub fn with_convert_case(mut self, convert_case: bool) -> Self {
        self.convert_case = convert_case;
        self
    }

    pub fn with_version_prefix(mut self, prefix: Option<String>) -> Self {
        self.version_prefix = prefix;
        self
    }

    /// Full argument list for the engine process.
    pub fn command_args(&self) -> Vec<String> {
        let mut args = self.args.clone();
        if let Some(log) = &self.session_log {
            args.push("-log".to_string());
            args.push(log.display().to_string());
        }
        args
    }
}
