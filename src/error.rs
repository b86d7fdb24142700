//! Error types for smrkv
//!
//! Every fallible operation in the engine returns [`Result`], whose error
//! half is a [`Status`]. Success carries no state at all; failures carry a
//! [`Code`], a message, and (for unexpected codes) a captured call stack.
//!
//! Statuses can only be built through the named constructors below. Those
//! constructors are where the diagnostic side channel hooks in: every code
//! except `NotFound` is appended to the rotating error log, and every code
//! except `NotFound` and `NotAttempted` also captures a bounded trace (see
//! [`crate::diagnostics`]).

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::diagnostics;

/// Result type alias using Status
pub type Result<T> = std::result::Result<T, Status>;

/// Failure category carried by a [`Status`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    // -------------------------------------------------------------------------
    // Expected outcomes (cheap, never traced or logged)
    // -------------------------------------------------------------------------
    NotFound,
    NotAttempted,

    // -------------------------------------------------------------------------
    // Data errors
    // -------------------------------------------------------------------------
    /// Malformed on-disk or wire data. Never auto-repaired.
    Corruption,

    // -------------------------------------------------------------------------
    // Caller errors
    // -------------------------------------------------------------------------
    NotSupported,
    InvalidArgument,

    // -------------------------------------------------------------------------
    // Device / resource errors
    // -------------------------------------------------------------------------
    IoError,
    SuperblockIoError,
    NoSpaceAvailable,
    DeviceFrozen,
}

impl Code {
    /// Human readable label used when rendering a status
    pub fn label(&self) -> &'static str {
        match self {
            Code::NotFound => "NotFound",
            Code::NotAttempted => "Not attempted",
            Code::Corruption => "Corruption",
            Code::NotSupported => "Not implemented",
            Code::InvalidArgument => "Invalid argument",
            Code::IoError => "IO error",
            Code::SuperblockIoError => "Superblock IO error",
            Code::NoSpaceAvailable => "No space available",
            Code::DeviceFrozen => "Drive Frozen",
        }
    }

    /// Whether constructing a status with this code captures a call stack
    pub fn is_traced(&self) -> bool {
        !matches!(self, Code::NotFound | Code::NotAttempted)
    }

    /// Whether constructing a status with this code appends to the error log
    pub fn is_logged(&self) -> bool {
        !matches!(self, Code::NotFound)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Error value threaded through every engine component
///
/// Immutable once constructed. Cloning is cheap: the captured trace is
/// shared.
#[derive(Debug, Clone, Error)]
#[error("{code}: {message}")]
pub struct Status {
    code: Code,
    message: String,
    trace: Option<Arc<str>>,
}

impl Status {
    /// Build a status from a code and message.
    ///
    /// This is the single choke point for the diagnostic side effects.
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        let mut status = Self {
            code,
            message: message.into(),
            trace: None,
        };
        if code.is_traced() {
            status.trace = diagnostics::capture_trace().map(Arc::from);
        }
        if code.is_logged() {
            diagnostics::record(&status);
        }
        status
    }

    /// Build a status whose message is `"msg: msg2"`
    pub fn with_context(code: Code, msg: impl AsRef<str>, msg2: impl AsRef<str>) -> Self {
        let (msg, msg2) = (msg.as_ref(), msg2.as_ref());
        if msg2.is_empty() {
            Self::new(code, msg)
        } else {
            Self::new(code, format!("{}: {}", msg, msg2))
        }
    }

    // =========================================================================
    // Named constructors
    // =========================================================================

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(Code::NotFound, msg)
    }

    pub fn not_attempted(msg: impl Into<String>) -> Self {
        Self::new(Code::NotAttempted, msg)
    }

    pub fn corruption(msg: impl Into<String>) -> Self {
        Self::new(Code::Corruption, msg)
    }

    pub fn not_supported(msg: impl Into<String>) -> Self {
        Self::new(Code::NotSupported, msg)
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(Code::IoError, msg)
    }

    pub fn superblock_io_error(msg: impl Into<String>) -> Self {
        Self::new(Code::SuperblockIoError, msg)
    }

    pub fn no_space(msg: impl Into<String>) -> Self {
        Self::new(Code::NoSpaceAvailable, msg)
    }

    pub fn device_frozen(msg: impl Into<String>) -> Self {
        Self::new(Code::DeviceFrozen, msg)
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn code(&self) -> Code {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Call stack captured at construction, if tracing was enabled
    pub fn trace(&self) -> Option<&str> {
        self.trace.as_deref()
    }

    pub fn is_not_found(&self) -> bool {
        self.code == Code::NotFound
    }

    pub fn is_corruption(&self) -> bool {
        self.code == Code::Corruption
    }

    pub fn is_io_error(&self) -> bool {
        self.code == Code::IoError
    }

    pub fn is_no_space(&self) -> bool {
        self.code == Code::NoSpaceAvailable
    }
}

impl From<std::io::Error> for Status {
    fn from(e: std::io::Error) -> Self {
        Status::io_error(e.to_string())
    }
}
