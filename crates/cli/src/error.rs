//! Orchestrator error types (component C9, spec.md §7).
//!
//! Each crate downstream defines its own `Error` enum; this one wraps them
//! via `#[from]` the same way the teacher's CLI error type wraps its
//! subsystem errors, plus the validation-level variants spec.md §7 names
//! that only make sense at the orchestration layer.

use thiserror::Error;

/// Result type for `imgshuttle-cli` operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while validating or running a copy.
#[derive(Error, Debug)]
pub enum Error {
    /// More than one (or zero) source selectors were specified.
    #[error("source-conflict: {0}")]
    SourceConflict(String),

    /// More than one (or zero) destination selectors were specified, or
    /// the source and destination tar paths were the same file.
    #[error("destination-conflict: {0}")]
    DestinationConflict(String),

    /// `--resume` was set without a tar destination.
    #[error("resume-requires-tar-dst: resume is only valid with a tar destination")]
    ResumeRequiresTarDst,

    /// `--lock-output` was set without a repository destination.
    #[error("lock-output-requires-repo-dst: lock output is only valid with a repository destination")]
    LockOutputRequiresRepoDst,

    /// Closure resolution failed.
    #[error(transparent)]
    Resolver(#[from] imgshuttle_resolver::Error),

    /// Transfer to the destination failed.
    #[error(transparent)]
    Transfer(#[from] imgshuttle_transfer::Error),

    /// Tar image set I/O failed.
    #[error(transparent)]
    Tar(#[from] imgshuttle_tar::Error),

    /// Lock-output writing failed.
    #[error(transparent)]
    Lock(#[from] imgshuttle_lock::Error),

    /// A reference model error.
    #[error(transparent)]
    Core(#[from] imgshuttle_core::Error),

    /// I/O error reading a source lockfile, writing a lock output, or
    /// similar filesystem work the orchestrator itself performs.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The run was cancelled before completion (spec.md §5).
    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// `true` if this error (including one wrapped from the resolver or
    /// transfer engine) represents a cancelled run rather than a failure
    /// (spec.md §5: cancellation is not itself an error condition).
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            Self::Cancelled
                | Self::Resolver(imgshuttle_resolver::Error::Cancelled)
                | Self::Transfer(imgshuttle_transfer::Error::Cancelled)
        )
    }

    /// The process exit code this error maps to. Validation and
    /// cancellation get dedicated codes; everything else is a generic
    /// failure, matching spec.md §6's "non-zero on any fatal error".
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        if self.is_cancelled() {
            return 130;
        }
        match self {
            Self::SourceConflict(_)
            | Self::DestinationConflict(_)
            | Self::ResumeRequiresTarDst
            | Self::LockOutputRequiresRepoDst => 2,
            _ => 1,
        }
    }
}
