//! Library-wide error type.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Categorised ftpfs error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtpError {
    pub kind: FtpErrorKind,
    pub message: String,
    /// FTP reply code that triggered the error, if any.
    pub code: Option<u16>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FtpErrorKind {
    /// Server returned a 4xx reply, or a socket-level failure with no
    /// reply code. Retrying later may succeed.
    Temporary,
    /// Server returned a 5xx reply.
    Permanent,
    /// Server answered 502 to a command it does not implement.
    CommandNotImplemented,
    /// A 5xx reply meaning the file or directory does not exist, or a
    /// listing did not contain the requested entry.
    ItemNotFound,
    /// Error raised from a file-stream open/read/write.
    Io,
    /// The directory the session was in at login can no longer be entered.
    InaccessibleLoginDir,
    /// The session factory produced a session without a declared encoding,
    /// yet byte paths were supplied.
    NoEncoding,
    /// A non-ignored listing line could not be interpreted.
    ParserFailure,
    /// The remote root directory cannot be stat'ed.
    RootDir,
    /// Invalid, unset-but-required, or unmeasurable time shift.
    TimeShift,
    /// Symlink chain too deep or cyclic.
    RecursiveLink,
    /// Text and byte paths mixed within a single call.
    TypeMismatch,
}

pub type FtpResult<T> = Result<T, FtpError>;

// ── Construction helpers ─────────────────────────────────────────────

impl FtpError {
    pub fn new(kind: FtpErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            code: None,
        }
    }

    pub fn with_code(mut self, code: u16) -> Self {
        self.code = Some(code);
        self
    }

    // ── Convenience constructors ─────────────────────────────────

    pub fn temporary(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Temporary, msg)
    }

    pub fn permanent(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Permanent, msg)
    }

    pub fn command_not_implemented(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::CommandNotImplemented, msg).with_code(502)
    }

    pub fn item_not_found(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::ItemNotFound, msg)
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::Io, msg)
    }

    pub fn inaccessible_login_dir(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::InaccessibleLoginDir, msg)
    }

    pub fn no_encoding(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::NoEncoding, msg)
    }

    pub fn parser_failure(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::ParserFailure, msg)
    }

    pub fn root_dir(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::RootDir, msg)
    }

    pub fn time_shift(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::TimeShift, msg)
    }

    pub fn recursive_link(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::RecursiveLink, msg)
    }

    pub fn type_mismatch(msg: impl Into<String>) -> Self {
        Self::new(FtpErrorKind::TypeMismatch, msg)
    }

    /// Error for any operation on a host that has been closed.
    pub fn closed() -> Self {
        Self::permanent("host is already closed")
    }

    /// Classify an FTP reply code into the most appropriate error kind.
    ///
    /// 4xx replies are temporary, 5xx permanent; 502 marks an
    /// unimplemented command, and a 550/553 whose text talks about a
    /// missing file maps to `ItemNotFound`.
    pub fn from_reply(code: u16, text: &str) -> Self {
        let kind = match code {
            400..=499 => FtpErrorKind::Temporary,
            502 => FtpErrorKind::CommandNotImplemented,
            550 | 553 => {
                let lower = text.to_lowercase();
                if lower.contains("not found") || lower.contains("no such") {
                    FtpErrorKind::ItemNotFound
                } else {
                    FtpErrorKind::Permanent
                }
            }
            500..=599 => FtpErrorKind::Permanent,
            _ => FtpErrorKind::Permanent,
        };
        Self {
            kind,
            message: text.to_string(),
            code: Some(code),
        }
    }

    // ── Classification ───────────────────────────────────────────

    /// True for the 5xx family (`Permanent`, `CommandNotImplemented`,
    /// `ItemNotFound`).
    pub fn is_permanent(&self) -> bool {
        matches!(
            self.kind,
            FtpErrorKind::Permanent
                | FtpErrorKind::CommandNotImplemented
                | FtpErrorKind::ItemNotFound
        )
    }

    pub fn is_temporary(&self) -> bool {
        self.kind == FtpErrorKind::Temporary
    }

    /// True if the error means "the entry does not exist".
    pub fn is_missing(&self) -> bool {
        self.kind == FtpErrorKind::ItemNotFound
    }

    /// Re-tag an error as a stream I/O failure, keeping code and message.
    /// Open/read/write failures on remote streams surface this way,
    /// mirroring how a local `open(2)` failure is an I/O error rather
    /// than a protocol error.
    pub fn into_io(mut self) -> Self {
        self.kind = FtpErrorKind::Io;
        self
    }
}

impl fmt::Display for FtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(code) = self.code {
            write!(f, "[{:?} {}] {}", self.kind, code, self.message)
        } else {
            write!(f, "[{:?}] {}", self.kind, self.message)
        }
    }
}

impl std::error::Error for FtpError {}

impl From<std::io::Error> for FtpError {
    fn from(e: std::io::Error) -> Self {
        Self::io(e.to_string())
    }
}

impl From<FtpError> for std::io::Error {
    fn from(e: FtpError) -> Self {
        std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
    }
}
