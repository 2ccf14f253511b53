// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 Au-Zone Technologies

use std::fmt;
use std::process::ExitCode;

/// CLI-specific error type with exit code mapping
#[derive(Debug)]
pub enum CliError {
    /// Invalid command-line arguments
    InvalidArgs(String),
    /// No component registered under the requested name
    ComponentNotFound(String),
    /// Component refused a command or failed a transition
    Component(String),
    /// Component ended up in the Invalid state
    InvalidState(String),
    /// Operation timed out
    Timeout(String),
    /// General error
    General(String),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::InvalidArgs(msg) => write!(f, "Invalid arguments: {}", msg),
            CliError::ComponentNotFound(msg) => write!(f, "Component not found: {}", msg),
            CliError::Component(msg) => write!(f, "Component error: {}", msg),
            CliError::InvalidState(msg) => write!(f, "Component invalid: {}", msg),
            CliError::Timeout(msg) => write!(f, "Timeout: {}", msg),
            CliError::General(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for CliError {}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> ExitCode {
        match self {
            CliError::InvalidArgs(_) => ExitCode::from(2),
            CliError::ComponentNotFound(_) => ExitCode::from(3),
            CliError::Component(_) => ExitCode::from(4),
            CliError::InvalidState(_) => ExitCode::from(5),
            CliError::Timeout(_) => ExitCode::from(6),
            CliError::General(_) => ExitCode::from(1),
        }
    }
}

/// Map omxbase::Error to CliError with appropriate exit codes
impl From<omxbase::Error> for CliError {
    fn from(err: omxbase::Error) -> Self {
        use omxbase::Error;

        let detail = format!("{} (0x{:08X})", err, err.code());
        match err {
            Error::ComponentNotFound => CliError::ComponentNotFound(detail),
            Error::InvalidState => CliError::InvalidState(detail),
            Error::Timeout => CliError::Timeout(detail),
            Error::BadParameter | Error::BadPortIndex => CliError::InvalidArgs(detail),
            Error::SameState
            | Error::IncorrectStateTransition
            | Error::IncorrectStateOperation
            | Error::VersionMismatch
            | Error::UnsupportedIndex
            | Error::NotImplemented
            | Error::InsufficientResources => CliError::Component(detail),
            Error::Undefined => CliError::General(detail),
        }
    }
}

/// Helper function to convert result to exit code
pub fn result_to_exit_code<T>(result: Result<T, CliError>) -> ExitCode {
    match result {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", e);
            e.exit_code()
        }
    }
}
