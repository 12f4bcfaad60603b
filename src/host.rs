//! `FtpHost` — the virtual-filesystem facade.
//!
//! Owns the primary control connection, the child-session pool, and
//! the stat cache. Filesystem-flavored operations live in sibling
//! files as `impl FtpHost` extensions: stat'ing in `stat.rs`,
//! directory/file manipulation in `dirops.rs`, transfers in
//! `transfer.rs`. This file holds construction, navigation, the
//! robust-command helpers, time-shift handling, stream opening, and
//! lifecycle.

use crate::cache::StatCache;
use crate::error::{FtpError, FtpResult};
use crate::file::{build_text_layer, parse_mode, FtpFile, OpenOptions};
use crate::fspath::{self, FsPath};
use crate::parser::{Parser, UnixParser};
use crate::pool::ChildPool;
use crate::session::{FtpSession, SessionFactory};
use crate::types::{CacheStats, PoolStats};
use crate::{encoding, encoding::EncodingErrors};
use chrono::{Datelike, TimeZone, Utc};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Default path encoding when the session factory does not declare one
/// at construction time. FTP's traditional wire encoding.
pub const DEFAULT_PATH_ENCODING: &str = "latin-1";

/// Name of the short-lived server-side file used to measure the time
/// shift.
const SYNC_PROBE_NAME: &str = "_ftpfs_sync_";

pub(crate) struct StatRuntime {
    pub parser: Box<dyn Parser>,
    /// One automatic switch to the MS/DOS parser is allowed until a
    /// listing parses successfully.
    pub allow_parser_switching: bool,
    pub cache: StatCache,
}

/// A remote FTP server viewed as a filesystem.
///
/// Not thread-safe: one host must be used by at most one thread at a
/// time. Independent hosts may run in parallel.
pub struct FtpHost {
    pub(crate) session: Box<dyn FtpSession>,
    pub(crate) pool: Rc<RefCell<ChildPool>>,
    pub(crate) stat_runtime: StatRuntime,
    current_dir: String,
    session_encoding: Option<String>,
    configured_encoding: String,
    time_shift: Option<i64>,
    /// Pass `-a` to `LIST` so dotfiles show up. Off by default; some
    /// servers take the option for a path.
    pub use_list_a_option: bool,
    closed: bool,
}

impl FtpHost {
    // ─── Construction ────────────────────────────────────────────

    pub fn connect<F: SessionFactory + 'static>(factory: F) -> FtpResult<Self> {
        Self::connect_with_encoding(factory, DEFAULT_PATH_ENCODING)
    }

    /// Connect with an explicit path encoding. A session-declared
    /// encoding takes precedence over `path_encoding`.
    pub fn connect_with_encoding<F: SessionFactory + 'static>(
        factory: F,
        path_encoding: &str,
    ) -> FtpResult<Self> {
        let factory: Rc<dyn SessionFactory> = Rc::new(factory);
        let mut session = factory.open_session()?;
        let session_encoding = session.encoding().map(str::to_string);
        if let Some(declared) = session_encoding.as_deref() {
            if !declared.eq_ignore_ascii_case(path_encoding) {
                log::debug!(
                    "session declares encoding '{}'; it takes precedence over '{}'",
                    declared,
                    path_encoding
                );
            }
        }
        let current_dir = fspath::normpath(&session.pwd()?);
        log::info!("connected, login directory '{}'", current_dir);
        Ok(Self {
            session,
            pool: Rc::new(RefCell::new(ChildPool::new(factory))),
            stat_runtime: StatRuntime {
                parser: Box::new(UnixParser::new()),
                allow_parser_switching: true,
                cache: StatCache::new(),
            },
            current_dir,
            session_encoding,
            configured_encoding: path_encoding.to_string(),
            time_shift: None,
            use_list_a_option: false,
            closed: false,
        })
    }

    // ─── Path-kind plumbing ──────────────────────────────────────

    /// The encoding used for byte paths: the session's declared
    /// encoding, falling back to the configured one.
    pub fn path_encoding(&self) -> &str {
        self.session_encoding
            .as_deref()
            .unwrap_or(&self.configured_encoding)
    }

    /// Text form of a path for the wire. Byte paths require the
    /// session to declare an encoding.
    pub(crate) fn decode_path(&self, path: &FsPath) -> FtpResult<String> {
        match path {
            FsPath::Text(text) => Ok(text.clone()),
            FsPath::Bytes(bytes) => {
                let Some(declared) = self.session_encoding.as_deref() else {
                    return Err(FtpError::no_encoding(
                        "session factory produced a session without an encoding \
                         attribute, but a byte path was supplied",
                    ));
                };
                encoding::decode(bytes, declared, EncodingErrors::Strict)
            }
        }
    }

    /// Wrap `text` in the same string kind as `like`.
    pub(crate) fn encode_like(&self, text: &str, like: &FsPath) -> FtpResult<FsPath> {
        match like {
            FsPath::Text(_) => Ok(FsPath::Text(text.to_string())),
            FsPath::Bytes(_) => {
                let declared = self
                    .session_encoding
                    .as_deref()
                    .unwrap_or(&self.configured_encoding);
                Ok(FsPath::Bytes(encoding::encode(
                    text,
                    declared,
                    EncodingErrors::Strict,
                )?))
            }
        }
    }

    /// Absolute, normalized text form resolved against the current
    /// directory.
    pub(crate) fn abs_text(&self, path: &str) -> String {
        if fspath::isabs(path) {
            fspath::normpath(path)
        } else {
            fspath::normpath(&fspath::join(&self.current_dir, path))
        }
    }

    /// Absolute path of the same string kind as the argument.
    pub fn abspath(&self, path: impl Into<FsPath>) -> FtpResult<FsPath> {
        let path = path.into();
        let text = self.decode_path(&path)?;
        self.encode_like(&self.abs_text(&text), &path)
    }

    // ─── Navigation ──────────────────────────────────────────────

    /// The current remote directory (absolute, normalized). Tracked
    /// locally; no server round trip.
    pub fn getcwd(&self) -> &str {
        &self.current_dir
    }

    pub fn chdir(&mut self, path: impl Into<FsPath>) -> FtpResult<()> {
        self.ensure_open()?;
        let text = self.decode_path(&path.into())?;
        self.chdir_text(&text)
    }

    pub(crate) fn chdir_text(&mut self, path: &str) -> FtpResult<()> {
        self.session.cwd(path)?;
        // Relative to the previous current directory.
        self.current_dir = fspath::normpath(&fspath::join(&self.current_dir, path));
        Ok(())
    }

    /// Issue a cheap command on the primary session to avoid a server
    /// idle timeout. Deliberately does not touch child sessions; they
    /// are probed when reused.
    pub fn keep_alive(&mut self) -> FtpResult<()> {
        self.ensure_open()?;
        self.session.pwd().map(|_| ())
    }

    // ─── Robust command helpers ──────────────────────────────────

    pub(crate) fn ensure_open(&self) -> FtpResult<()> {
        if self.closed {
            Err(FtpError::closed())
        } else {
            Ok(())
        }
    }

    /// The workarounds below move the session around; if the current
    /// directory itself cannot be re-entered, bail out before losing
    /// the position without hope of restoring it.
    pub(crate) fn check_accessible_current_dir(&mut self) -> FtpResult<()> {
        let current = self.current_dir.clone();
        match self.session.cwd(&current) {
            Ok(()) => Ok(()),
            Err(err) if err.is_permanent() => Err(FtpError::inaccessible_login_dir(format!(
                "directory '{}' is not accessible",
                current
            ))),
            Err(err) => Err(err),
        }
    }

    /// Run a session command on the base name of `path` from inside
    /// its parent directory, restoring the previous working directory
    /// afterwards. Some servers mishandle whitespace in the directory
    /// part of command arguments.
    pub(crate) fn robust_send(
        &mut self,
        path: &str,
        command: impl FnOnce(&mut dyn FtpSession, &str) -> FtpResult<()>,
    ) -> FtpResult<()> {
        self.ensure_open()?;
        self.check_accessible_current_dir()?;
        let old_dir = self.current_dir.clone();
        let (head, tail) = fspath::split(path);
        let head = if head.is_empty() { fspath::CURDIR } else { head };
        let (head, tail) = (head.to_string(), tail.to_string());
        self.chdir_text(&head)?;
        let result = command(self.session.as_mut(), &tail);
        let restore = self.chdir_text(&old_dir);
        result.and(restore)
    }

    /// Fetch the raw `LIST` lines for `path`, descending fully into
    /// it first (listing `""` from inside sidesteps servers that
    /// recurse on a dot argument).
    pub(crate) fn dir_lines(&mut self, path: &str) -> FtpResult<Vec<String>> {
        self.ensure_open()?;
        self.check_accessible_current_dir()?;
        let old_dir = self.current_dir.clone();
        self.chdir_text(path)?;
        let mut lines = Vec::new();
        let result = {
            let args: &[&str] = if self.use_list_a_option { &["-a", ""] } else { &[""] };
            self.session.dir(args, &mut |line: &str| {
                lines.push(line.trim_end_matches(['\r', '\n']).to_string());
            })
        };
        let restore = self.chdir_text(&old_dir);
        result.and(restore)?;
        Ok(lines)
    }

    // ─── Parser installation ─────────────────────────────────────

    /// Install a custom listing parser and disable autodetection.
    pub fn set_parser(&mut self, parser: Box<dyn Parser>) {
        // Existing cache entries were produced by the old parser.
        self.stat_runtime.cache.clear();
        self.stat_runtime.parser = parser;
        self.stat_runtime.allow_parser_switching = false;
    }

    // ─── Stat cache / pool introspection ─────────────────────────

    pub fn stat_cache(&self) -> &StatCache {
        &self.stat_runtime.cache
    }

    pub fn stat_cache_mut(&mut self) -> &mut StatCache {
        &mut self.stat_runtime.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.stat_runtime.cache.stats()
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.borrow().stats()
    }

    // ─── Time shift ──────────────────────────────────────────────

    /// The configured `server − UTC` offset in seconds, 0 while unset.
    pub fn time_shift(&self) -> i64 {
        self.time_shift.unwrap_or(0)
    }

    pub fn time_shift_is_set(&self) -> bool {
        self.time_shift.is_some()
    }

    pub(crate) fn effective_time_shift(&self) -> f64 {
        self.time_shift() as f64
    }

    /// Set the time shift. The value must be at most a day in
    /// magnitude and a whole number of 15-minute units (time zone
    /// offsets are); anything else is a `TimeShift` error.
    pub fn set_time_shift(&mut self, time_shift: i64) -> FtpResult<()> {
        if time_shift.abs() > 24 * 3600 {
            return Err(FtpError::time_shift(format!(
                "time shift abs({} s) > 1 day",
                time_shift
            )));
        }
        if time_shift % (15 * 60) != 0 {
            return Err(FtpError::time_shift(format!(
                "time shift ({} s) is not a multiple of 15 minutes",
                time_shift
            )));
        }
        if self.time_shift != Some(time_shift) {
            // Every cached timestamp was computed against the old shift.
            self.stat_runtime.cache.clear();
            self.time_shift = Some(time_shift);
            log::info!("time shift set to {} s", time_shift);
        }
        Ok(())
    }

    /// Measure the shift between server listing times and UTC by
    /// round-tripping a probe file in the current directory, which
    /// must be writable.
    pub fn synchronize_times(&mut self) -> FtpResult<()> {
        self.ensure_open()?;
        let write_result = self
            .open(SYNC_PROBE_NAME, "w")
            .and_then(|mut probe| probe.close());
        if write_result.is_err() {
            return Err(FtpError::time_shift(format!(
                "couldn't write helper file in directory '{}'",
                self.getcwd()
            )));
        }
        let server_time = match self.getmtime(SYNC_PROBE_NAME) {
            Ok(t) => t,
            Err(_) => {
                return Err(FtpError::time_shift(
                    "could write helper file but not stat it",
                ))
            }
        };
        if self.remove(SYNC_PROBE_NAME).is_err() {
            return Err(FtpError::time_shift(
                "could write helper file but not unlink it",
            ));
        }
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs_f64())
            .unwrap_or(0.0);
        let mut time_shift = server_time - now;
        // With the shift still unset, the parser may have put the probe
        // one year in the past (year inference for servers east of
        // UTC); take the year back.
        if time_shift < -360.0 * 24.0 * 3600.0 {
            if let chrono::LocalResult::Single(server_datetime) =
                Utc.timestamp_opt(server_time as i64, 0)
            {
                if let Some(corrected) = server_datetime.with_year(server_datetime.year() + 1) {
                    time_shift = corrected.timestamp() as f64 - now;
                }
            }
        }
        let rounded = (time_shift / (15.0 * 60.0)).round() as i64 * 15 * 60;
        self.set_time_shift(rounded)
    }

    // ─── Remote streams ──────────────────────────────────────────

    /// Open a remote file for reading or writing. Modes: `r`, `rb`,
    /// `rt`, `w`, `wb`, `wt`.
    pub fn open(&mut self, path: impl Into<FsPath>, mode: &str) -> FtpResult<FtpFile> {
        self.open_with(path, mode, &OpenOptions::default())
    }

    /// `open` with explicit buffering/encoding/newline/rest options.
    pub fn open_with(
        &mut self,
        path: impl Into<FsPath>,
        mode: &str,
        options: &OpenOptions,
    ) -> FtpResult<FtpFile> {
        self.ensure_open()?;
        let parsed = parse_mode(mode)?;
        if parsed.binary && options.encoding.is_some() {
            return Err(FtpError::io(
                "binary mode doesn't take an encoding argument",
            ));
        }
        if !parsed.binary && options.rest.is_some() {
            return Err(FtpError::command_not_implemented(
                "`rest` argument can't be used for text streams",
            ));
        }
        let path = path.into();
        let text = self.decode_path(&path)?;
        let effective_path = self.abs_text(&text);
        let (effective_dir, effective_file) = {
            let (d, f) = fspath::split(&effective_path);
            (d.to_string(), f.to_string())
        };
        // Validate the text options before committing a connection.
        let text_layer = build_text_layer(parsed, options)?;
        let mut child = self.pool.borrow_mut().acquire()?;
        // Change the child into the directory first; transfer commands
        // then take a bare name (whitespace-safe, see `robust_send`).
        if let Err(err) = child.session.cwd(&effective_dir) {
            self.pool.borrow_mut().release(child, false);
            return Err(if err.is_permanent() {
                FtpError::io(format!(
                    "remote directory '{}' doesn't exist or has insufficient access rights",
                    effective_dir
                ))
            } else {
                err
            });
        }
        // The transfer itself is always binary; text conversion is a
        // client-side layer.
        if let Err(err) = child.session.voidcmd("TYPE I") {
            let keep = err.is_permanent();
            self.pool.borrow_mut().release(child, !keep);
            return Err(err.into_io());
        }
        let command = format!(
            "{} {}",
            if parsed.read { "RETR" } else { "STOR" },
            effective_file
        );
        let conn = match child.session.transfercmd(&command, options.rest) {
            Ok(conn) => conn,
            Err(err) => {
                // A refused transfer leaves the control connection
                // usable; a transport failure does not.
                let keep = err.is_permanent();
                self.pool.borrow_mut().release(child, !keep);
                return Err(err.into_io());
            }
        };
        if !parsed.read {
            // Size and timestamp of the target are about to change.
            self.stat_runtime.cache.invalidate(&effective_path);
        }
        Ok(FtpFile::new(
            self.pool.clone(),
            child,
            conn,
            parsed,
            options.buffering,
            text_layer,
        ))
    }

    // ─── Lifecycle ───────────────────────────────────────────────

    /// Close the host: every pooled child session, the primary
    /// session, and the cache. Idempotent; any operation after the
    /// first `close` fails with a `Permanent` error.
    pub fn close(&mut self) -> FtpResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.pool.borrow_mut().close_all();
        let result = self.session.close();
        self.stat_runtime.cache.clear();
        log::info!("host closed");
        result
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl Drop for FtpHost {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(err) = self.close() {
                log::warn!("error while closing host on drop: {}", err);
            }
        }
    }
}
