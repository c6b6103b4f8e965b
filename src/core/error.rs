//! Error handling for relayctl
//!
//! The error system follows two principles:
//! 1. **Strongly-typed errors** so the orchestrator can tell a pre-mutation
//!    abort from a post-mutation failure
//! 2. **User-friendly messages** with actionable suggestions for operators
//!
//! [`RelayError`] enumerates every failure the core can produce. Functions
//! return [`anyhow::Result`] and put a `RelayError` at the root of the chain
//! where the taxonomy applies, adding `.context()` on the way up. At the
//! edge, [`user_friendly_error`] downcasts back to the typed error and
//! attaches a suggestion.
//!
//! # Failure classes
//!
//! - **Abort, zero mutation**: [`RelayError::VersionResolution`],
//!   [`RelayError::Download`], [`RelayError::Extract`],
//!   [`RelayError::ArtifactLayout`], [`RelayError::UnsupportedArchitecture`]
//! - **Abort during placement**: [`RelayError::Install`]
//! - **Post-mutation, triggers rollback**: [`RelayError::ServiceStart`],
//!   [`RelayError::HealthCheck`]
//! - **Fatal before any work**: [`RelayError::LockContention`],
//!   [`RelayError::PermissionDenied`]
//!
//! # Example
//!
//! ```rust,no_run
//! use relayctl::core::{RelayError, user_friendly_error};
//!
//! let err = anyhow::Error::from(RelayError::NotInstalled);
//! let ctx = user_friendly_error(err);
//! ctx.display();
//! ```

use colored::Colorize;
use std::fmt;
use thiserror::Error;

/// Reasons a health check can fail. The first failing check wins.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HealthCheckFailure {
    /// The supervisor does not report the service as active.
    #[error("service is not active")]
    ServiceInactive,

    /// The process runs but nothing listens on the configured port.
    #[error("nothing is listening on port {port}")]
    PortNotListening {
        /// Configured port
        port: u16,
    },

    /// Neither `ss` nor `/proc/net/tcp*` could be read.
    #[error("cannot inspect listening sockets: {reason}")]
    ProbeUnavailable {
        /// What went wrong while probing
        reason: String,
    },
}

/// The main error type for relayctl operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// Neither the metadata endpoint nor the redirect fallback produced a tag.
    #[error("Failed to resolve the latest release: {reason}")]
    VersionResolution {
        /// Combined reason from both resolution paths
        reason: String,
    },

    /// The artifact could not be downloaded within the retry budget.
    #[error("Failed to download {url}")]
    Download {
        /// Artifact URL
        url: String,
        /// Last error seen
        reason: String,
    },

    /// The archive is unreadable or corrupt.
    #[error("Failed to extract release archive: {reason}")]
    Extract {
        /// Extraction error
        reason: String,
    },

    /// The archive does not contain exactly one expected executable.
    #[error("Release archive must contain exactly one '{expected}', found {found}")]
    ArtifactLayout {
        /// Executable name that was expected
        expected: String,
        /// Number of matching entries found
        found: usize,
    },

    /// No release artifacts are published for this CPU.
    #[error("Unsupported CPU architecture: {arch}")]
    UnsupportedArchitecture {
        /// Architecture reported by the platform
        arch: String,
    },

    /// Filesystem failure while backing up or placing the binary.
    #[error("Failed to install {path}: {reason}")]
    Install {
        /// Path being written
        path: String,
        /// Underlying error
        reason: String,
    },

    /// The supervisor refused to start the service.
    #[error("Service failed to start: {reason}")]
    ServiceStart {
        /// Supervisor output
        reason: String,
    },

    /// Health check failed after the final mutating step.
    #[error("Health check failed: {0}")]
    HealthCheck(HealthCheckFailure),

    /// A service-manager command exited unsuccessfully.
    #[error("'{command}' failed: {stderr}")]
    ServiceCommand {
        /// Command line that was run
        command: String,
        /// Captured stderr
        stderr: String,
    },

    /// Another relayctl invocation holds the lock.
    #[error("Another relayctl operation is already running (lock held on {path})")]
    LockContention {
        /// Lock file path
        path: String,
    },

    /// The tool must run with root privileges.
    #[error("This operation must be run as root")]
    PermissionDenied,

    /// A configuration value is malformed.
    #[error("Invalid configuration value for {field}: {reason}")]
    InvalidConfig {
        /// Field name
        field: String,
        /// Why it is invalid
        reason: String,
    },

    /// The workflow needs an existing installation.
    #[error("relay-server is not installed")]
    NotInstalled,

    /// Destructive workflow invoked without confirmation.
    #[error("Refusing to {operation} without confirmation")]
    ConfirmationRequired {
        /// Operation that needs confirming
        operation: String,
    },

    /// Anything else, message already formatted.
    #[error("{message}")]
    Other {
        /// Formatted message
        message: String,
    },
}

impl RelayError {
    /// Builds an [`RelayError::Install`] from a path and any displayable cause.
    pub fn install(path: &std::path::Path, reason: impl fmt::Display) -> Self {
        Self::Install {
            path: path.display().to_string(),
            reason: reason.to_string(),
        }
    }

    /// Builds an [`RelayError::InvalidConfig`].
    pub fn invalid_config(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// Error wrapper carrying a suggestion and details for the operator.
#[derive(Debug)]
pub struct ErrorContext {
    /// The underlying error
    pub error: RelayError,
    /// Optional suggestion for resolving the error
    pub suggestion: Option<String>,
    /// Optional additional details about the error
    pub details: Option<String>,
}

impl ErrorContext {
    /// Creates a context without suggestion or details.
    #[must_use]
    pub const fn new(error: RelayError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    /// Adds a suggestion.
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Adds details.
    #[must_use]
    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Prints the error block to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Finds the first [`RelayError`] anywhere in an error chain.
#[must_use]
pub fn find_relay_error(error: &anyhow::Error) -> Option<&RelayError> {
    error.chain().find_map(|cause| cause.downcast_ref::<RelayError>())
}

/// Converts any error into an [`ErrorContext`] with operator guidance.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(relay_error) = find_relay_error(&error) {
        let mut ctx = create_error_context(relay_error.clone());
        // Keep the outer context lines; they say which step was running.
        let outer = error.to_string();
        if outer != relay_error.to_string() {
            ctx.details = Some(match ctx.details.take() {
                Some(details) => format!("{outer}\n{details}"),
                None => outer,
            });
        }
        return ctx;
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>()
        && io_error.kind() == std::io::ErrorKind::PermissionDenied
    {
        return ErrorContext::new(RelayError::PermissionDenied)
            .with_suggestion("Re-run the command with sudo or as root")
            .with_details(io_error.to_string());
    }

    let mut message = error.to_string();
    let chain: Vec<String> =
        error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(RelayError::Other {
        message,
    })
}

fn create_error_context(error: RelayError) -> ErrorContext {
    match &error {
        RelayError::VersionResolution { .. } => ErrorContext::new(error)
            .with_suggestion("Check outbound HTTPS access to the release host, or pass an explicit version")
            .with_details("Both the release metadata API and the latest-release redirect failed. Nothing was changed"),

        RelayError::Download { reason, .. } => {
            let reason = reason.clone();
            ErrorContext::new(error)
                .with_suggestion("Check network connectivity and that the release publishes an artifact for this architecture")
                .with_details(format!("Last attempt failed with: {reason}. Nothing was changed"))
        }

        RelayError::Extract { .. } | RelayError::ArtifactLayout { .. } => ErrorContext::new(error)
            .with_suggestion("The published archive looks broken; retry later or pin a different version")
            .with_details("The downloaded archive was discarded. Nothing was changed"),

        RelayError::UnsupportedArchitecture { .. } => ErrorContext::new(error)
            .with_suggestion("Pass --arch with one of: amd64, arm64, armv7, 386, s390x, riscv64"),

        RelayError::Install { reason, .. } => {
            let reason = reason.clone();
            ErrorContext::new(error)
                .with_suggestion("Check free disk space and that the install directory is writable")
                .with_details(reason)
        }

        RelayError::ServiceStart { .. } | RelayError::HealthCheck(_) => ErrorContext::new(error)
            .with_suggestion("Inspect the service log with 'journalctl -u relay-server -n 50'"),

        RelayError::ServiceCommand { .. } => ErrorContext::new(error)
            .with_suggestion("Make sure systemd is running and 'systemctl' is on PATH"),

        RelayError::LockContention { .. } => ErrorContext::new(error)
            .with_suggestion("Wait for the other relayctl invocation to finish, then retry")
            .with_details("Mutating operations are serialized per host. Nothing was changed"),

        RelayError::PermissionDenied => ErrorContext::new(error)
            .with_suggestion("Re-run the command with sudo or as root"),

        RelayError::InvalidConfig { .. } => ErrorContext::new(error)
            .with_suggestion("Values must be single-line; port must be between 1 and 65535"),

        RelayError::NotInstalled => ErrorContext::new(error)
            .with_suggestion("Run 'relayctl install' first"),

        RelayError::ConfirmationRequired { .. } => ErrorContext::new(error)
            .with_suggestion("Pass --yes to confirm"),

        RelayError::Other { .. } => ErrorContext::new(error),
    }
}
