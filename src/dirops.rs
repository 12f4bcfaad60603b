//! Directory and file manipulation — mkdir, makedirs, rmdir, rmtree,
//! remove, rename, chmod, walk.
//!
//! Every mutating operation invalidates the target's cache entry
//! under its absolute normalized path.

use crate::error::{FtpError, FtpResult};
use crate::fspath::{self, FsPath};
use crate::host::FtpHost;
use crate::types::WalkEntry;

/// Which step of `rmtree` failed, for `onerror` reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RmtreeOperation {
    Listdir,
    Remove,
    Rmdir,
}

/// `onerror` callback for `rmtree`.
pub type RmtreeHandler<'a> = &'a mut dyn FnMut(RmtreeOperation, &str, &FtpError);

/// `onerror` callback for `walk`.
pub type WalkHandler<'a> = &'a mut dyn FnMut(&FtpError);

impl FtpHost {
    // ─── mkdir / makedirs ────────────────────────────────────────

    /// Create the directory `path` on the server.
    pub fn mkdir(&mut self, path: impl Into<FsPath>) -> FtpResult<()> {
        let text = self.decode_path(&path.into())?;
        self.mkdir_text(&text)
    }

    pub(crate) fn mkdir_text(&mut self, path: &str) -> FtpResult<()> {
        self.robust_send(path, |session, tail| session.mkd(tail))?;
        let absolute = self.abs_text(path);
        self.stat_runtime.cache.invalidate(&absolute);
        Ok(())
    }

    /// Create `path` and any missing intermediate directories.
    ///
    /// Components are probed by `chdir` rather than by listing the
    /// parent, so virtual directories that never show up in listings
    /// are handled. With `exist_ok` false an already existing leaf is
    /// an error; existing intermediate directories never are.
    pub fn makedirs(&mut self, path: impl Into<FsPath>, exist_ok: bool) -> FtpResult<()> {
        self.ensure_open()?;
        let text = self.decode_path(&path.into())?;
        let absolute = self.abs_text(&text);
        let old_dir = self.getcwd().to_string();
        let result = self.makedirs_inner(&absolute, exist_ok);
        let restore = self.chdir_text(&old_dir);
        result.and(restore)
    }

    fn makedirs_inner(&mut self, absolute: &str, exist_ok: bool) -> FtpResult<()> {
        let components: Vec<&str> = absolute.split('/').collect();
        for index in 1..components.len() {
            let next_dir = format!("/{}", components[1..=index].join("/"));
            match self.chdir_text(&next_dir) {
                Ok(()) => {
                    if index == components.len() - 1 && !exist_ok {
                        return Err(FtpError::permanent(format!(
                            "path '{}' exists",
                            absolute
                        )));
                    }
                }
                Err(err) if err.is_permanent() => {
                    // Presumably missing; create it.
                    if let Err(mkdir_err) = self.mkdir_text(&next_dir) {
                        if !mkdir_err.is_permanent() {
                            return Err(mkdir_err);
                        }
                        // Re-raise only if the component still isn't a
                        // directory (e.g. a file is in the way);
                        // otherwise someone else created it first.
                        if !self.isdir(next_dir.as_str())? {
                            return Err(mkdir_err);
                        }
                    }
                }
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    // ─── rmdir / remove ──────────────────────────────────────────

    /// Remove the *empty* directory `path`.
    pub fn rmdir(&mut self, path: impl Into<FsPath>) -> FtpResult<()> {
        let text = self.decode_path(&path.into())?;
        self.rmdir_text(&text)
    }

    pub(crate) fn rmdir_text(&mut self, path: &str) -> FtpResult<()> {
        let absolute = self.abs_text(path);
        if !self.listdir_text(&absolute)?.is_empty() {
            return Err(FtpError::permanent(format!(
                "directory '{}' not empty",
                absolute
            )));
        }
        self.robust_send(&absolute, |session, tail| session.rmd(tail))?;
        self.stat_runtime.cache.invalidate(&absolute);
        Ok(())
    }

    /// Remove the file or link `path`; directories are refused.
    pub fn remove(&mut self, path: impl Into<FsPath>) -> FtpResult<()> {
        let text = self.decode_path(&path.into())?;
        self.remove_text(&text)
    }

    /// Alias for [`remove`](FtpHost::remove).
    pub fn unlink(&mut self, path: impl Into<FsPath>) -> FtpResult<()> {
        self.remove(path)
    }

    pub(crate) fn remove_text(&mut self, path: &str) -> FtpResult<()> {
        let absolute = self.abs_text(path);
        // `isfile` follows links to files, `islink` additionally
        // covers links to directories. A missing path is left to the
        // server so its own error message surfaces.
        let removable = self.isfile(absolute.as_str())?
            || self.islink(absolute.as_str())?
            || !self.exists(absolute.as_str())?;
        if !removable {
            return Err(FtpError::permanent(
                "remove/unlink can only delete files and links, not directories",
            ));
        }
        self.robust_send(&absolute, |session, tail| session.dele(tail))?;
        self.stat_runtime.cache.invalidate(&absolute);
        Ok(())
    }

    // ─── rename ──────────────────────────────────────────────────

    /// Rename `source` to `target`. Both must be of the same string
    /// kind.
    pub fn rename(
        &mut self,
        source: impl Into<FsPath>,
        target: impl Into<FsPath>,
    ) -> FtpResult<()> {
        self.ensure_open()?;
        let source = source.into();
        let target = target.into();
        if !source.same_kind(&target) {
            return Err(FtpError::type_mismatch(
                "text and byte paths mixed in a single call",
            ));
        }
        let source_text = self.decode_path(&source)?;
        let target_text = self.decode_path(&target)?;
        self.check_accessible_current_dir()?;
        let (source_head, source_tail) = {
            let (h, t) = fspath::split(&source_text);
            (h.to_string(), t.to_string())
        };
        let (target_head, target_tail) = {
            let (h, t) = fspath::split(&target_text);
            (h.to_string(), t.to_string())
        };
        let heads_contain_whitespace =
            source_head.contains(' ') || target_head.contains(' ');
        if heads_contain_whitespace && source_head == target_head {
            // Rename base names from inside the common directory.
            let old_dir = self.getcwd().to_string();
            self.chdir_text(&source_head)?;
            let result = self.session.rename(&source_tail, &target_tail);
            let restore = self.chdir_text(&old_dir);
            result.and(restore)?;
        } else {
            self.session.rename(&source_text, &target_text)?;
        }
        let source_abs = self.abs_text(&source_text);
        let target_abs = self.abs_text(&target_text);
        self.stat_runtime.cache.invalidate(&source_abs);
        self.stat_runtime.cache.invalidate(&target_abs);
        Ok(())
    }

    // ─── chmod ───────────────────────────────────────────────────

    /// Change permission bits via `SITE CHMOD`. Servers that don't
    /// implement the command answer 502, which surfaces as
    /// `CommandNotImplemented`.
    pub fn chmod(&mut self, path: impl Into<FsPath>, mode: u32) -> FtpResult<()> {
        let text = self.decode_path(&path.into())?;
        let absolute = self.abs_text(&text);
        self.robust_send(&absolute, |session, tail| {
            session.voidcmd(&format!("SITE CHMOD 0{:o} {}", mode, tail))
        })?;
        self.stat_runtime.cache.invalidate(&absolute);
        Ok(())
    }

    // ─── rmtree ──────────────────────────────────────────────────

    /// Remove the directory tree rooted at `path`.
    ///
    /// With `ignore_errors` every failure is swallowed. With an
    /// `onerror` handler each failure is reported as
    /// `(operation, path, error)` and the traversal continues.
    /// Otherwise the first failure aborts.
    pub fn rmtree(
        &mut self,
        path: impl Into<FsPath>,
        ignore_errors: bool,
        mut onerror: Option<RmtreeHandler<'_>>,
    ) -> FtpResult<()> {
        self.ensure_open()?;
        let text = self.decode_path(&path.into())?;
        let absolute = self.abs_text(&text);
        self.rmtree_inner(&absolute, ignore_errors, &mut onerror)
    }

    fn rmtree_inner(
        &mut self,
        path: &str,
        ignore_errors: bool,
        onerror: &mut Option<RmtreeHandler<'_>>,
    ) -> FtpResult<()> {
        let names = match self.listdir_text(path) {
            Ok(names) => names,
            Err(err) if err.is_permanent() => {
                report(ignore_errors, onerror, RmtreeOperation::Listdir, path, err)?;
                Vec::new()
            }
            Err(err) => return Err(err),
        };
        for name in names {
            let full_name = fspath::join(path, &name);
            let is_dir = match self.lstat_opt(&full_name) {
                Ok(Some(record)) => record.is_dir(),
                Ok(None) => false,
                // A vanished entry is treated as a plain file so the
                // removal step reports it; anything else (transient
                // failure, unparseable listing) aborts the traversal.
                Err(err) if err.is_permanent() => false,
                Err(err) => return Err(err),
            };
            if is_dir {
                self.rmtree_inner(&full_name, ignore_errors, onerror)?;
            } else if let Err(err) = self.remove_text(&full_name) {
                if err.is_permanent() {
                    report(
                        ignore_errors,
                        onerror,
                        RmtreeOperation::Remove,
                        &full_name,
                        err,
                    )?;
                } else {
                    return Err(err);
                }
            }
        }
        if let Err(err) = self.rmdir_text(path) {
            // Unlike the steps above, the final rmdir also routes
            // temporary failures through the error contract.
            if err.is_permanent() || err.is_temporary() {
                report(ignore_errors, onerror, RmtreeOperation::Rmdir, path, err)?;
            } else {
                return Err(err);
            }
        }
        Ok(())
    }

    // ─── walk ────────────────────────────────────────────────────

    /// Walk the tree rooted at `top`, like the usual filesystem walk:
    /// one [`WalkEntry`] per visited directory, parents before
    /// children when `topdown`, after them otherwise. Directories
    /// reached through symlinks are descended into only with
    /// `followlinks`. Listing failures are reported to `onerror` and
    /// the affected directory is skipped.
    pub fn walk(
        &mut self,
        top: impl Into<FsPath>,
        topdown: bool,
        followlinks: bool,
        mut onerror: Option<WalkHandler<'_>>,
    ) -> FtpResult<Vec<WalkEntry>> {
        self.ensure_open()?;
        let top = top.into();
        if top.is_empty() {
            return Err(FtpError::item_not_found("empty path"));
        }
        let text = self.decode_path(&top)?;
        let mut entries = Vec::new();
        self.walk_inner(&text, topdown, followlinks, &mut onerror, &mut entries)?;
        Ok(entries)
    }

    fn walk_inner(
        &mut self,
        top: &str,
        topdown: bool,
        followlinks: bool,
        onerror: &mut Option<WalkHandler<'_>>,
        entries: &mut Vec<WalkEntry>,
    ) -> FtpResult<()> {
        let names = match self.listdir_text(top) {
            Ok(names) => names,
            Err(err) if err.is_permanent() || err.is_temporary() => {
                if let Some(handler) = onerror {
                    handler(&err);
                }
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        let mut dirnames = Vec::new();
        let mut filenames = Vec::new();
        for name in names {
            if self.isdir(fspath::join(top, &name).as_str())? {
                dirnames.push(name);
            } else {
                filenames.push(name);
            }
        }
        if topdown {
            entries.push(WalkEntry {
                dirpath: top.to_string(),
                dirnames: dirnames.clone(),
                filenames: filenames.clone(),
            });
        }
        for name in &dirnames {
            let path = fspath::join(top, name);
            if followlinks || !self.islink(path.as_str())? {
                self.walk_inner(&path, topdown, followlinks, onerror, entries)?;
            }
        }
        if !topdown {
            entries.push(WalkEntry {
                dirpath: top.to_string(),
                dirnames,
                filenames,
            });
        }
        Ok(())
    }
}

fn report(
    ignore_errors: bool,
    onerror: &mut Option<RmtreeHandler<'_>>,
    operation: RmtreeOperation,
    path: &str,
    err: FtpError,
) -> FtpResult<()> {
    if ignore_errors {
        return Ok(());
    }
    match onerror {
        Some(handler) => {
            handler(operation, path, &err);
            Ok(())
        }
        None => Err(err),
    }
}
