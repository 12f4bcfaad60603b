//! The wire contract: what the virtual filesystem needs from a
//! low-level FTP protocol client.
//!
//! The library never opens sockets or speaks FTP itself. Callers supply
//! a [`SessionFactory`]; every control connection — the primary one and
//! every pooled child — is produced by it. Implementations are expected
//! to map server replies through [`FtpError::from_reply`] and socket
//! failures to [`FtpError::temporary`] / the `Io` kind.
//!
//! [`FtpError::from_reply`]: crate::error::FtpError::from_reply
//! [`FtpError::temporary`]: crate::error::FtpError::temporary

use crate::error::FtpResult;
use std::io;

/// Byte-oriented bidirectional data channel returned by
/// [`FtpSession::transfercmd`]. Dropping the connection closes it,
/// which for uploads signals end-of-file to the server.
pub trait DataConn: io::Read + io::Write {}

impl<T: io::Read + io::Write> DataConn for T {}

/// One FTP control connection.
///
/// All paths cross this boundary as text in the session's declared
/// [`encoding`](FtpSession::encoding); byte-path translation happens in
/// the host before calls arrive here.
pub trait FtpSession {
    /// Current remote working directory.
    fn pwd(&mut self) -> FtpResult<String>;

    /// Change the remote working directory.
    fn cwd(&mut self, path: &str) -> FtpResult<()>;

    fn mkd(&mut self, path: &str) -> FtpResult<()>;

    fn rmd(&mut self, path: &str) -> FtpResult<()>;

    fn dele(&mut self, path: &str) -> FtpResult<()>;

    /// `RNFR`/`RNTO` pair.
    fn rename(&mut self, source: &str, target: &str) -> FtpResult<()>;

    /// Execute a command expecting a simple completion reply
    /// (e.g. `TYPE I`, `SITE CHMOD 0644 name`).
    fn voidcmd(&mut self, command: &str) -> FtpResult<()>;

    /// Read and check the completion reply of a finished data transfer.
    fn voidresp(&mut self) -> FtpResult<()>;

    /// Execute `LIST` with the given arguments (either `[path]` or
    /// `["-a", path]`) and deliver each listing line to `callback`.
    fn dir(&mut self, args: &[&str], callback: &mut dyn FnMut(&str)) -> FtpResult<()>;

    /// Issue a data-channel command (`RETR name`, `STOR name`), optionally
    /// restarting at byte offset `rest`, and return the data connection.
    fn transfercmd(&mut self, command: &str, rest: Option<u64>)
        -> FtpResult<Box<dyn DataConn>>;

    /// Tear down the control connection.
    fn close(&mut self) -> FtpResult<()>;

    /// The path encoding this session uses on the wire, if declared.
    /// Sessions without a declared encoding cannot be used with byte
    /// paths.
    fn encoding(&self) -> Option<&str>;
}

/// Produces connected, logged-in sessions. The host keeps the factory
/// for the lifetime of the connection and uses it whenever the child
/// pool needs a fresh control connection.
pub trait SessionFactory {
    fn open_session(&self) -> FtpResult<Box<dyn FtpSession>>;
}
