//! Stat engine — directory listings turned into stat records.
//!
//! `lstat` works by listing the *parent* directory and picking the
//! entry out of it (FTP has no per-file stat), caching every sibling
//! record on the way. `stat` follows symlink targets on top of
//! `lstat`. The first listing that fails to parse may switch the host
//! from the Unix parser to the MS/DOS parser once; the choice locks as
//! soon as any listing yields entries.

use crate::error::{FtpError, FtpErrorKind, FtpResult};
use crate::fspath::{self, FsPath};
use crate::host::FtpHost;
use crate::parser::MsdosParser;
use crate::types::StatRecord;
use std::collections::HashSet;

/// Give up following a symlink chain after this many hops.
const MAX_LINK_HOPS: usize = 20;

impl FtpHost {
    // ─── Directory maps ──────────────────────────────────────────

    /// List `dir_path` and parse every entry, populating the cache.
    /// `.` and `..` are skipped.
    fn stat_records_of_dir(&mut self, dir_path: &str) -> FtpResult<Vec<StatRecord>> {
        let lines = self.dir_lines(dir_path)?;
        // Grow the cache if this one directory would not fit; a
        // listing that immediately evicts its own entries would make
        // the cache useless.
        let cache = &mut self.stat_runtime.cache;
        if cache.is_enabled() && lines.len() >= cache.size_limit() {
            let new_size = (1.1 * lines.len() as f64).ceil() as usize;
            log::debug!("growing stat cache to {} entries", new_size);
            cache.resize(new_size)?;
        }
        let time_shift = self.effective_time_shift();
        let mut records = Vec::new();
        for line in &lines {
            if self.stat_runtime.parser.ignores_line(line) {
                continue;
            }
            let record = self.stat_runtime.parser.parse_line(line, time_shift)?;
            if record.name == fspath::CURDIR || record.name == fspath::PARDIR {
                continue;
            }
            let key = fspath::join(dir_path, &record.name);
            self.stat_runtime.cache.put(&key, record.clone());
            records.push(record);
        }
        Ok(records)
    }

    // ─── Core algorithms (fixed parser) ──────────────────────────

    fn real_lstat(&mut self, path: &str, want_error: bool) -> FtpResult<Option<StatRecord>> {
        let path = self.abs_text(path);
        if let Some(record) = self.stat_runtime.cache.get(&path) {
            return Ok(Some(record));
        }
        // The root is not an entry of any parent listing.
        if path == "/" {
            return Err(FtpError::root_dir("can't stat remote root directory"));
        }
        let (dirname, basename) = {
            let (d, b) = fspath::split(&path);
            (d.to_string(), b.to_string())
        };
        // When the caller suppresses the missing-path error, a missing
        // parent is the same as a missing entry. (The recursion ends
        // at the root at the latest.)
        if !want_error && !self.isdir(dirname.as_str())? {
            return Ok(None);
        }
        // Walk the whole listing; the siblings fill the cache.
        let mut found = None;
        for record in self.stat_records_of_dir(&dirname)? {
            if record.name == basename {
                found = Some(record);
            }
        }
        if found.is_some() {
            return Ok(found);
        }
        if want_error {
            Err(FtpError::item_not_found(format!(
                "550 {}: no such file or directory",
                path
            ))
            .with_code(550))
        } else {
            Ok(None)
        }
    }

    fn real_stat(&mut self, path: &str, want_error: bool) -> FtpResult<Option<StatRecord>> {
        let original_path = path.to_string();
        let mut path = self.abs_text(path);
        let mut visited: HashSet<String> = HashSet::new();
        let mut hops = 0;
        loop {
            let Some(record) = self.real_lstat(&path, want_error)? else {
                return Ok(None);
            };
            if !record.is_symlink() {
                return Ok(Some(record));
            }
            let Some(target) = record.target.clone() else {
                return Err(FtpError::parser_failure(format!(
                    "symlink '{}' has no target",
                    path
                )));
            };
            // Relative targets resolve against the link's directory.
            let (dirname, _) = fspath::split(&path);
            path = self.abs_text(&fspath::join(dirname, &target));
            hops += 1;
            if visited.contains(&path) || hops >= MAX_LINK_HOPS {
                return Err(FtpError::recursive_link(format!(
                    "recursive link structure detected for remote path '{}'",
                    original_path
                )));
            }
            visited.insert(path.clone());
        }
    }

    fn real_listdir(&mut self, path: &str) -> FtpResult<Vec<String>> {
        let path = self.abs_text(path);
        if !self.isdir(path.as_str())? {
            return if self.exists(path.as_str())? {
                Err(FtpError::permanent(format!(
                    "550 {}: no such directory or wrong directory parser used",
                    path
                ))
                .with_code(550))
            } else {
                Err(FtpError::item_not_found(format!(
                    "550 {}: no such directory",
                    path
                ))
                .with_code(550))
            };
        }
        let mut names: Vec<String> = self
            .stat_records_of_dir(&path)?
            .into_iter()
            .map(|record| record.name)
            .collect();
        names.sort();
        Ok(names)
    }

    // ─── Parser autodetection ────────────────────────────────────

    /// Run a listing operation; on the first `ParserFailure`, switch
    /// to the MS/DOS parser once and retry. `locks_choice` decides
    /// from a successful result whether the parser is now proven
    /// (an empty directory proves nothing).
    fn with_parser_retry<T>(
        &mut self,
        run: impl Fn(&mut Self) -> FtpResult<T>,
        locks_choice: impl Fn(&T) -> bool,
    ) -> FtpResult<T> {
        match run(self) {
            Ok(value) => {
                if locks_choice(&value) {
                    self.stat_runtime.allow_parser_switching = false;
                }
                Ok(value)
            }
            Err(err)
                if err.kind == FtpErrorKind::ParserFailure
                    && self.stat_runtime.allow_parser_switching =>
            {
                log::info!("listing did not parse as Unix format, trying MS/DOS parser");
                self.stat_runtime.allow_parser_switching = false;
                self.stat_runtime.parser = Box::new(MsdosParser::new());
                run(self)
            }
            Err(err) => Err(err),
        }
    }

    // ─── Internal text-path entry points ─────────────────────────

    pub(crate) fn lstat_opt(&mut self, path: &str) -> FtpResult<Option<StatRecord>> {
        self.ensure_open()?;
        let path = path.to_string();
        self.with_parser_retry(|host| host.real_lstat(&path, false), |found| found.is_some())
    }

    pub(crate) fn stat_opt(&mut self, path: &str) -> FtpResult<Option<StatRecord>> {
        self.ensure_open()?;
        let path = path.to_string();
        self.with_parser_retry(|host| host.real_stat(&path, false), |found| found.is_some())
    }

    pub(crate) fn listdir_text(&mut self, path: &str) -> FtpResult<Vec<String>> {
        self.ensure_open()?;
        let path = path.to_string();
        // A successful but empty `listdir` proves nothing about the
        // parser, and a non-empty one already proved it via the
        // underlying stat calls.
        self.with_parser_retry(|host| host.real_listdir(&path), |_| false)
    }

    // ─── Public surface ──────────────────────────────────────────

    /// Stat without following symlinks.
    pub fn lstat(&mut self, path: impl Into<FsPath>) -> FtpResult<StatRecord> {
        self.ensure_open()?;
        let text = self.decode_path(&path.into())?;
        let text_for_error = text.clone();
        self.with_parser_retry(|host| host.real_lstat(&text, true), |_| true)?
            .ok_or_else(|| {
                FtpError::item_not_found(format!(
                    "550 {}: no such file or directory",
                    text_for_error
                ))
            })
    }

    /// Stat, following symlinks.
    pub fn stat(&mut self, path: impl Into<FsPath>) -> FtpResult<StatRecord> {
        self.ensure_open()?;
        let text = self.decode_path(&path.into())?;
        let text_for_error = text.clone();
        self.with_parser_retry(|host| host.real_stat(&text, true), |_| true)?
            .ok_or_else(|| {
                FtpError::item_not_found(format!(
                    "550 {}: no such file or directory",
                    text_for_error
                ))
            })
    }

    /// Sorted base names of the entries of directory `path`, in the
    /// same string kind as `path`.
    pub fn listdir(&mut self, path: impl Into<FsPath>) -> FtpResult<Vec<FsPath>> {
        self.ensure_open()?;
        let path = path.into();
        let text = self.decode_path(&path)?;
        let names = self.listdir_text(&text)?;
        names
            .iter()
            .map(|name| self.encode_like(name, &path))
            .collect()
    }

    // ─── Predicates ──────────────────────────────────────────────

    /// Whether the path exists (symlinks not followed, so a dangling
    /// link exists).
    pub fn exists(&mut self, path: impl Into<FsPath>) -> FtpResult<bool> {
        self.ensure_open()?;
        let path = path.into();
        if path.is_empty() {
            return Ok(false);
        }
        let text = self.decode_path(&path)?;
        match self.lstat_opt(&text) {
            Ok(found) => Ok(found.is_some()),
            Err(err) if err.kind == FtpErrorKind::RootDir => Ok(true),
            Err(err) => Err(err),
        }
    }

    fn is_entity(&mut self, path: FsPath, want_dir: bool) -> FtpResult<bool> {
        self.ensure_open()?;
        if path.is_empty() {
            return Ok(false);
        }
        let text = self.decode_path(&path)?;
        // If we can't list the parent of the current directory, the
        // current directory is still known to be a directory.
        if fspath::normpath(&text) == self.getcwd() {
            return Ok(want_dir);
        }
        match self.stat_opt(&text) {
            Ok(None) => Ok(false),
            Ok(Some(record)) => Ok(if want_dir {
                record.is_dir()
            } else {
                record.is_regular()
            }),
            Err(err) if err.kind == FtpErrorKind::RootDir => Ok(want_dir),
            Err(err) if err.kind == FtpErrorKind::RecursiveLink => Ok(false),
            Err(err) => Err(err),
        }
    }

    /// Whether the path is a directory (following links).
    pub fn isdir(&mut self, path: impl Into<FsPath>) -> FtpResult<bool> {
        self.is_entity(path.into(), true)
    }

    /// Whether the path is a regular file (following links).
    pub fn isfile(&mut self, path: impl Into<FsPath>) -> FtpResult<bool> {
        self.is_entity(path.into(), false)
    }

    /// Whether the path itself is a symlink.
    pub fn islink(&mut self, path: impl Into<FsPath>) -> FtpResult<bool> {
        self.ensure_open()?;
        let path = path.into();
        if path.is_empty() {
            return Ok(false);
        }
        let text = self.decode_path(&path)?;
        match self.lstat_opt(&text) {
            Ok(None) => Ok(false),
            Ok(Some(record)) => Ok(record.is_symlink()),
            Err(err) if err.kind == FtpErrorKind::RootDir => Ok(false),
            Err(err) => Err(err),
        }
    }

    // ─── Derived accessors ───────────────────────────────────────

    /// Modification time (UTC epoch seconds) of the path, following
    /// links.
    pub fn getmtime(&mut self, path: impl Into<FsPath>) -> FtpResult<f64> {
        let path = path.into();
        if path.is_empty() {
            return Err(FtpError::item_not_found("empty path"));
        }
        Ok(self.stat(path)?.mtime)
    }

    /// Size in bytes of the path, following links.
    pub fn getsize(&mut self, path: impl Into<FsPath>) -> FtpResult<u64> {
        let path = path.into();
        if path.is_empty() {
            return Err(FtpError::item_not_found("empty path"));
        }
        Ok(self.stat(path)?.size)
    }
}
