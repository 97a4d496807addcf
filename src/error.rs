//! Structured error handling and exit codes.

use serde::Serialize;

use crate::actions::DeleteError;
use crate::register::RegisterError;

/// Exit codes for the s3dedupe application.
///
/// - 0: Success (check found duplicates, delete or verify completed)
/// - 1: General error (unexpected failure)
/// - 2: No duplicates found (the register is still written)
/// - 3: Aborted by the operator at a confirmation prompt, nothing deleted
/// - 4: A delete request failed, remaining deletions were not attempted
/// - 5: The register file is missing or malformed
/// - 6: Verification found a missing keeper
/// - 130: Interrupted by user (Ctrl+C)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ExitCode {
    /// Success: the command completed.
    Success = 0,
    /// General error: An unexpected error occurred.
    GeneralError = 1,
    /// No duplicates: listing completed but nothing is duplicated.
    NoDuplicates = 2,
    /// Aborted: the operator answered "n"; no action taken.
    Aborted = 3,
    /// Deletion failed: the first failing delete stopped the run.
    DeletionFailed = 4,
    /// Invalid register: the register could not be loaded.
    InvalidRegister = 5,
    /// Verification failed: a keeper no longer exists.
    VerificationFailed = 6,
    /// Interrupted: the run was interrupted by user (Ctrl+C).
    Interrupted = 130,
}

impl ExitCode {
    /// Get the numeric exit code.
    #[must_use]
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Get the machine-readable code prefix.
    #[must_use]
    pub fn code_prefix(self) -> &'static str {
        match self {
            Self::Success => "SD000",
            Self::GeneralError => "SD001",
            Self::NoDuplicates => "SD002",
            Self::Aborted => "SD003",
            Self::DeletionFailed => "SD004",
            Self::InvalidRegister => "SD005",
            Self::VerificationFailed => "SD006",
            Self::Interrupted => "SD130",
        }
    }
}

/// Pick the exit code for an error that ended a run.
///
/// ```
/// use s3dedupe::error::{exit_code_for, ExitCode};
/// use s3dedupe::register::RegisterError;
///
/// let err = anyhow::Error::new(RegisterError::NotFound("x.json".into()));
/// assert_eq!(exit_code_for(&err), ExitCode::InvalidRegister);
/// ```
#[must_use]
pub fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    if let Some(e) = err.downcast_ref::<DeleteError>() {
        return match e {
            DeleteError::ObjectDelete { .. } => ExitCode::DeletionFailed,
            DeleteError::Prompt(_) => ExitCode::GeneralError,
        };
    }
    if err.downcast_ref::<RegisterError>().is_some() {
        return ExitCode::InvalidRegister;
    }
    ExitCode::GeneralError
}

/// Structured error information for JSON output.
#[derive(Debug, Serialize)]
pub struct StructuredError {
    /// The error code (e.g., "SD004")
    pub code: String,
    /// The exit code number
    pub exit_code: i32,
    /// Human-readable error message, including its causes
    pub message: String,
    /// Whether the operation was interrupted
    pub interrupted: bool,
}

impl StructuredError {
    /// Create a new structured error from an anyhow error and an exit code.
    #[must_use]
    pub fn new(err: &anyhow::Error, exit_code: ExitCode) -> Self {
        Self {
            code: exit_code.code_prefix().to_string(),
            exit_code: exit_code.as_i32(),
            message: format!("{err:#}"),
            interrupted: exit_code == ExitCode::Interrupted,
        }
    }
}
