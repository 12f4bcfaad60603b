//! Up- and downloads, plain and conditional.
//!
//! Transfers are always binary and stream in 64 KiB chunks; an
//! optional callback sees every chunk as it goes over the wire. The
//! `_if_newer` variants compare modification times padded by their
//! precisions — when in doubt, they transfer.

use crate::error::{FtpError, FtpResult};
use crate::fspath::FsPath;
use crate::host::FtpHost;
use crate::types::MINUTE_PRECISION;
use std::fs;
use std::io::{Read, Write};
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Chunk size for streamed copies.
pub const MAX_COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Local filesystems keep mtimes at least second-precise.
const LOCAL_MTIME_PRECISION: f64 = 1.0;

/// Per-chunk progress callback.
pub type TransferCallback<'a> = &'a mut dyn FnMut(&[u8]);

/// Pump `source` into `target`, reporting each chunk; returns the
/// number of bytes copied.
pub fn copy_stream(
    source: &mut dyn Read,
    target: &mut dyn Write,
    mut callback: Option<TransferCallback<'_>>,
) -> FtpResult<u64> {
    let mut buffer = vec![0u8; MAX_COPY_CHUNK_SIZE];
    let mut transferred = 0u64;
    loop {
        let n = source.read(&mut buffer).map_err(FtpError::from)?;
        if n == 0 {
            break;
        }
        target.write_all(&buffer[..n]).map_err(FtpError::from)?;
        transferred += n as u64;
        if let Some(cb) = callback.as_mut() {
            cb(&buffer[..n]);
        }
    }
    Ok(transferred)
}

/// The transfer decision of the `_if_newer` methods: transfer unless
/// the source is provably not newer, padding both sides with their
/// timestamp precisions.
pub(crate) fn source_is_newer_than_target(
    source_mtime: f64,
    source_precision: f64,
    target_mtime: f64,
    target_precision: f64,
) -> bool {
    source_mtime + source_precision > target_mtime - target_precision
}

fn local_mtime(path: &Path) -> FtpResult<f64> {
    let modified = fs::metadata(path)
        .and_then(|meta| meta.modified())
        .map_err(FtpError::from)?;
    Ok(modified
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0))
}

impl FtpHost {
    // ─── Unconditional transfers ─────────────────────────────────

    /// Upload the local file `source` to the remote `target`.
    pub fn upload(
        &mut self,
        source: impl AsRef<Path>,
        target: impl Into<FsPath>,
        callback: Option<TransferCallback<'_>>,
    ) -> FtpResult<()> {
        self.ensure_open()?;
        let mut local = fs::File::open(source.as_ref()).map_err(FtpError::from)?;
        let mut remote = self.open(target, "wb")?;
        let copied = copy_stream(&mut local, &mut remote, callback);
        let closed = remote.close();
        match (copied, closed) {
            (Err(err), _) => Err(err),
            (Ok(_), Err(err)) => Err(err),
            (Ok(bytes), Ok(())) => {
                log::debug!("uploaded {} bytes", bytes);
                Ok(())
            }
        }
    }

    /// Download the remote file `source` to the local `target`.
    pub fn download(
        &mut self,
        source: impl Into<FsPath>,
        target: impl AsRef<Path>,
        callback: Option<TransferCallback<'_>>,
    ) -> FtpResult<()> {
        self.ensure_open()?;
        let mut remote = self.open(source, "rb")?;
        let mut local = fs::File::create(target.as_ref()).map_err(FtpError::from)?;
        let copied = copy_stream(&mut remote, &mut local, callback);
        let flushed = local.flush().map_err(FtpError::from);
        let closed = remote.close();
        match (copied, flushed.and(closed)) {
            (Err(err), _) => Err(err),
            (Ok(_), Err(err)) => Err(err),
            (Ok(bytes), Ok(())) => {
                log::debug!("downloaded {} bytes", bytes);
                Ok(())
            }
        }
    }

    // ─── Conditional transfers ───────────────────────────────────

    fn require_time_shift(&self) -> FtpResult<()> {
        if self.time_shift_is_set() {
            Ok(())
        } else {
            Err(FtpError::time_shift(
                "time shift is not set; call set_time_shift or synchronize_times \
                 before conditional transfers",
            ))
        }
    }

    /// Upload only if the local source is newer than the remote
    /// target or the target is missing. Returns whether data was
    /// transferred.
    pub fn upload_if_newer(
        &mut self,
        source: impl AsRef<Path>,
        target: impl Into<FsPath>,
        callback: Option<TransferCallback<'_>>,
    ) -> FtpResult<bool> {
        self.ensure_open()?;
        self.require_time_shift()?;
        let source = source.as_ref();
        let target = target.into();
        let source_mtime = local_mtime(source)?;
        let target_text = self.decode_path(&target)?;
        let should_transfer = match self.stat_opt(&target_text)? {
            None => true,
            Some(record) => source_is_newer_than_target(
                source_mtime,
                LOCAL_MTIME_PRECISION,
                record.mtime,
                record.mtime_precision.unwrap_or(MINUTE_PRECISION),
            ),
        };
        if should_transfer {
            // `upload` opens the target for writing, which also
            // invalidates its cache entry.
            self.upload(source, target, callback)?;
        }
        Ok(should_transfer)
    }

    /// Download only if the remote source is newer than the local
    /// target or the target is missing. Returns whether data was
    /// transferred.
    pub fn download_if_newer(
        &mut self,
        source: impl Into<FsPath>,
        target: impl AsRef<Path>,
        callback: Option<TransferCallback<'_>>,
    ) -> FtpResult<bool> {
        self.ensure_open()?;
        self.require_time_shift()?;
        let source = source.into();
        let target = target.as_ref();
        let source_text = self.decode_path(&source)?;
        let record = self.stat(source_text.as_str())?;
        let should_transfer = if target.exists() {
            source_is_newer_than_target(
                record.mtime,
                record.mtime_precision.unwrap_or(MINUTE_PRECISION),
                local_mtime(target)?,
                LOCAL_MTIME_PRECISION,
            )
        } else {
            true
        };
        if should_transfer {
            self.download(source, target, callback)?;
        }
        Ok(should_transfer)
    }
}
