//! # ftpfs — a virtual-filesystem view of an FTP server
//!
//! Presents a remote FTP server through a local-filesystem-shaped API:
//! path manipulation, directory iteration, stat with symlink
//! following, tree walk, recursive removal, conditional transfers,
//! and file-like streams — on top of any wire-level FTP client the
//! caller plugs in through the [`SessionFactory`] trait.
//!
//! Architecture:
//! - `types` — stat records, mode bits, walk entries, stats snapshots
//! - `error` — categorized error type with reply-code classification
//! - `session` — the minimal contract for the low-level FTP client
//! - `encoding` — path/text encoding conversion
//! - `fspath` — POSIX path algebra over text and byte paths
//! - `parser` — Unix and MS/DOS `LIST` output parsing
//! - `cache` — bounded LRU cache of stat records
//! - `pool` — child control connections backing concurrent streams
//! - `file` — buffered binary/text streams over data transfers
//! - `host` — the `FtpHost` facade (navigation, time shift, open, lifecycle)
//! - `stat` — lstat/stat/listdir and the filesystem predicates
//! - `dirops` — mkdir/makedirs/rmdir/rmtree/remove/rename/chmod/walk
//! - `transfer` — upload/download and the `_if_newer` variants
//!
//! ```no_run
//! use ftpfs::FtpHost;
//! # struct MySessionFactory;
//! # impl ftpfs::SessionFactory for MySessionFactory {
//! #     fn open_session(&self) -> ftpfs::FtpResult<Box<dyn ftpfs::FtpSession>> {
//! #         unimplemented!()
//! #     }
//! # }
//! # fn factory() -> MySessionFactory { MySessionFactory }
//! # fn main() -> ftpfs::FtpResult<()> {
//! let mut host = FtpHost::connect(factory())?;
//! for name in host.listdir(".")? {
//!     println!("{:?}", name);
//! }
//! let mut stream = host.open("notes.txt", "r")?;
//! let mut text = String::new();
//! stream.read_to_string(&mut text)?;
//! stream.close()?;
//! host.close()?;
//! # Ok(())
//! # }
//! ```
//!
//! One transfer per control connection is an FTP rule, so every open
//! stream borrows a dedicated child connection from a pool; the
//! primary connection stays free for stat'ing and navigation while
//! streams are open. A host must be used from one thread at a time;
//! use one host per thread for parallelism.

pub mod cache;
pub mod dirops;
pub mod encoding;
pub mod error;
pub mod file;
pub mod fspath;
pub mod host;
pub mod parser;
pub mod pool;
pub mod session;
pub mod stat;
pub mod transfer;
pub mod types;

// Re-exports for the common surface.
pub use cache::StatCache;
pub use dirops::{RmtreeHandler, RmtreeOperation, WalkHandler};
pub use encoding::EncodingErrors;
pub use error::{FtpError, FtpErrorKind, FtpResult};
pub use file::{FtpFile, OpenOptions};
pub use fspath::FsPath;
pub use host::FtpHost;
pub use parser::{MsdosParser, Parser, UnixParser};
pub use session::{DataConn, FtpSession, SessionFactory};
pub use transfer::{copy_stream, TransferCallback, MAX_COPY_CHUNK_SIZE};
pub use types::{StatRecord, WalkEntry, DAY_PRECISION, MINUTE_PRECISION};
