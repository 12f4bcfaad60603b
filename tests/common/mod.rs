//! Scripted in-memory FTP session for integration tests.
//!
//! `ServerState` models a tiny remote filesystem: a map of absolute
//! directory paths to listing entries (raw `LIST` lines plus file
//! content). `MockSession` implements the session contract against
//! that state and records a transcript of every command, so tests can
//! assert on both outcomes and wire traffic.

use chrono::{DateTime, Datelike, Duration, Timelike, Utc};
use ftpfs::fspath;
use ftpfs::{DataConn, FtpError, FtpResult, FtpSession, SessionFactory};
use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io::{self, Cursor, Read, Write};
use std::rc::Rc;

pub struct ServerEntry {
    pub line: String,
    pub content: Vec<u8>,
}

pub struct ServerState {
    /// Absolute directory path → name → entry.
    pub dirs: HashMap<String, BTreeMap<String, ServerEntry>>,
    /// Every command any session issued, in order.
    pub transcript: Vec<String>,
    /// Emit a `total N` preamble before listings.
    pub emit_total: bool,
    /// Reply code for `SITE CHMOD` commands (e.g. 502); `None` accepts.
    pub chmod_code: Option<u16>,
    /// Reply code for `RMD` commands (e.g. 450); `None` accepts.
    pub rmd_code: Option<u16>,
    /// Refuse `STOR` with 550.
    pub deny_stor: bool,
    /// Scripted results for upcoming `voidresp` calls; empty → Ok.
    pub voidresp_results: VecDeque<FtpResult<()>>,
    /// Server clock offset against UTC, seconds; used when rendering
    /// listing lines for stored files.
    pub server_offset: i64,
}

impl ServerState {
    pub fn new() -> Rc<RefCell<Self>> {
        let mut dirs = HashMap::new();
        dirs.insert("/".to_string(), BTreeMap::new());
        Rc::new(RefCell::new(Self {
            dirs,
            transcript: Vec::new(),
            emit_total: true,
            chmod_code: None,
            rmd_code: None,
            deny_stor: false,
            voidresp_results: VecDeque::new(),
            server_offset: 0,
        }))
    }

    // ─── Fixture helpers ─────────────────────────────────────────

    pub fn add_entry(&mut self, dir: &str, name: &str, line: String, content: Vec<u8>) {
        self.dirs
            .entry(dir.to_string())
            .or_default()
            .insert(name.to_string(), ServerEntry { line, content });
    }

    pub fn add_dir(&mut self, path: &str) {
        let (parent, name) = owned_split(path);
        self.add_entry(
            &parent,
            &name,
            format!("drwxr-xr-x   2 mock     mock         4096 Jan  2  2020 {}", name),
            Vec::new(),
        );
        self.dirs.entry(path.to_string()).or_default();
    }

    pub fn add_file(&mut self, path: &str, content: &[u8]) {
        let (parent, name) = owned_split(path);
        let line = format!(
            "-rw-r--r--   1 mock     mock     {:>8} Jan  2  2020 {}",
            content.len(),
            name
        );
        self.add_entry(&parent, &name, line, content.to_vec());
    }

    pub fn add_file_at(&mut self, path: &str, content: &[u8], mtime: DateTime<Utc>) {
        let (parent, name) = owned_split(path);
        let line = unix_listing_line(mtime, content.len() as u64, &name);
        self.add_entry(&parent, &name, line, content.to_vec());
    }

    pub fn add_symlink(&mut self, path: &str, target: &str) {
        let (parent, name) = owned_split(path);
        let line = format!(
            "lrwxrwxrwx   1 mock     mock     {:>8} Jan  2  2020 {} -> {}",
            target.len(),
            name,
            target
        );
        self.add_entry(&parent, &name, line, Vec::new());
    }

    pub fn add_raw_line(&mut self, dir: &str, name: &str, line: &str) {
        self.add_entry(dir, name, line.to_string(), Vec::new());
    }

    pub fn file_content(&self, path: &str) -> Option<Vec<u8>> {
        let (parent, name) = owned_split(path);
        self.dirs
            .get(&parent)
            .and_then(|entries| entries.get(&name))
            .map(|entry| entry.content.clone())
    }

    pub fn count_in_transcript(&self, prefix: &str) -> usize {
        self.transcript
            .iter()
            .filter(|line| line.starts_with(prefix))
            .count()
    }

    // ─── Server behavior ─────────────────────────────────────────

    fn is_dir(&self, path: &str) -> bool {
        self.dirs.contains_key(path)
    }

    fn finish_stor(&mut self, path: &str, content: Vec<u8>) {
        let server_now = Utc::now() + Duration::seconds(self.server_offset);
        let (parent, name) = owned_split(path);
        let line = unix_listing_line(server_now, content.len() as u64, &name);
        self.add_entry(&parent, &name, line, content);
    }
}

fn owned_split(path: &str) -> (String, String) {
    let (head, tail) = fspath::split(path);
    (head.to_string(), tail.to_string())
}

/// Render a listing line in the `HH:MM` (recent entry) form.
pub fn unix_listing_line(mtime: DateTime<Utc>, size: u64, name: &str) -> String {
    let month = match mtime.month() {
        1 => "Jan",
        2 => "Feb",
        3 => "Mar",
        4 => "Apr",
        5 => "May",
        6 => "Jun",
        7 => "Jul",
        8 => "Aug",
        9 => "Sep",
        10 => "Oct",
        11 => "Nov",
        _ => "Dec",
    };
    format!(
        "-rw-r--r--   1 mock     mock     {:>8} {} {:02} {:02}:{:02} {}",
        size,
        month,
        mtime.day(),
        mtime.hour(),
        mtime.minute(),
        name
    )
}

// ─── Data connection ─────────────────────────────────────────────────

pub struct MockDataConn {
    read_data: Cursor<Vec<u8>>,
    written: Vec<u8>,
    /// Target of a `STOR`; registered with the server when the
    /// connection drops (= the client closed the data socket).
    stor_target: Option<(Rc<RefCell<ServerState>>, String)>,
}

impl Read for MockDataConn {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.read_data.read(buf)
    }
}

impl Write for MockDataConn {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.written.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for MockDataConn {
    fn drop(&mut self) {
        if let Some((state, path)) = self.stor_target.take() {
            state
                .borrow_mut()
                .finish_stor(&path, std::mem::take(&mut self.written));
        }
    }
}

// ─── Session ─────────────────────────────────────────────────────────

pub struct MockSession {
    state: Rc<RefCell<ServerState>>,
    cwd: String,
    encoding: Option<String>,
}

impl MockSession {
    fn resolve(&self, path: &str) -> String {
        if path.is_empty() {
            self.cwd.clone()
        } else {
            fspath::normpath(&fspath::join(&self.cwd, path))
        }
    }

    fn record(&self, line: String) {
        self.state.borrow_mut().transcript.push(line);
    }

    fn not_found(path: &str) -> FtpError {
        FtpError::from_reply(550, &format!("550 {}: no such file or directory", path))
    }
}

impl FtpSession for MockSession {
    fn pwd(&mut self) -> FtpResult<String> {
        self.record("PWD".to_string());
        Ok(self.cwd.clone())
    }

    fn cwd(&mut self, path: &str) -> FtpResult<()> {
        self.record(format!("CWD {}", path));
        let resolved = self.resolve(path);
        if self.state.borrow().is_dir(&resolved) {
            self.cwd = resolved;
            Ok(())
        } else {
            Err(Self::not_found(&resolved))
        }
    }

    fn mkd(&mut self, path: &str) -> FtpResult<()> {
        self.record(format!("MKD {}", path));
        let resolved = self.resolve(path);
        let mut state = self.state.borrow_mut();
        if state.is_dir(&resolved) {
            return Err(FtpError::from_reply(
                550,
                &format!("550 {}: file exists", resolved),
            ));
        }
        let (parent, _) = owned_split(&resolved);
        if !state.is_dir(&parent) {
            return Err(Self::not_found(&parent));
        }
        state.add_dir(&resolved);
        Ok(())
    }

    fn rmd(&mut self, path: &str) -> FtpResult<()> {
        self.record(format!("RMD {}", path));
        if let Some(code) = self.state.borrow().rmd_code {
            return Err(FtpError::from_reply(
                code,
                &format!("{} requested action not taken", code),
            ));
        }
        let resolved = self.resolve(path);
        let mut state = self.state.borrow_mut();
        match state.dirs.get(&resolved) {
            None => return Err(Self::not_found(&resolved)),
            Some(entries) if !entries.is_empty() => {
                return Err(FtpError::from_reply(
                    550,
                    &format!("550 {}: directory not empty", resolved),
                ))
            }
            Some(_) => {}
        }
        state.dirs.remove(&resolved);
        let (parent, name) = owned_split(&resolved);
        if let Some(entries) = state.dirs.get_mut(&parent) {
            entries.remove(&name);
        }
        Ok(())
    }

    fn dele(&mut self, path: &str) -> FtpResult<()> {
        self.record(format!("DELE {}", path));
        let resolved = self.resolve(path);
        let (parent, name) = owned_split(&resolved);
        let mut state = self.state.borrow_mut();
        let removed = state
            .dirs
            .get_mut(&parent)
            .and_then(|entries| entries.remove(&name));
        if removed.is_some() {
            Ok(())
        } else {
            Err(Self::not_found(&resolved))
        }
    }

    fn rename(&mut self, source: &str, target: &str) -> FtpResult<()> {
        self.record(format!("RNFR {} RNTO {}", source, target));
        let source = self.resolve(source);
        let target = self.resolve(target);
        let (source_parent, source_name) = owned_split(&source);
        let (target_parent, target_name) = owned_split(&target);
        let mut state = self.state.borrow_mut();
        let Some(mut entry) = state
            .dirs
            .get_mut(&source_parent)
            .and_then(|entries| entries.remove(&source_name))
        else {
            return Err(Self::not_found(&source));
        };
        if let Some(prefix) = entry.line.strip_suffix(&source_name).map(str::to_string) {
            entry.line = format!("{}{}", prefix, target_name);
        }
        state
            .dirs
            .entry(target_parent)
            .or_default()
            .insert(target_name, entry);
        Ok(())
    }

    fn voidcmd(&mut self, command: &str) -> FtpResult<()> {
        self.record(command.to_string());
        if command.starts_with("SITE CHMOD") {
            if let Some(code) = self.state.borrow().chmod_code {
                return Err(FtpError::from_reply(
                    code,
                    &format!("{} command not implemented", code),
                ));
            }
        }
        Ok(())
    }

    fn voidresp(&mut self) -> FtpResult<()> {
        self.record("VOIDRESP".to_string());
        self.state
            .borrow_mut()
            .voidresp_results
            .pop_front()
            .unwrap_or(Ok(()))
    }

    fn dir(&mut self, args: &[&str], callback: &mut dyn FnMut(&str)) -> FtpResult<()> {
        self.record(format!("LIST {}", args.join(" ")));
        let target = self.resolve(args.last().copied().unwrap_or(""));
        let state = self.state.borrow();
        let Some(entries) = state.dirs.get(&target) else {
            return Err(Self::not_found(&target));
        };
        if state.emit_total {
            callback(&format!("total {}", entries.len()));
        }
        for entry in entries.values() {
            callback(&entry.line);
        }
        Ok(())
    }

    fn transfercmd(
        &mut self,
        command: &str,
        rest: Option<u64>,
    ) -> FtpResult<Box<dyn DataConn>> {
        self.record(format!("TRANSFER {} rest={:?}", command, rest));
        let (verb, name) = command
            .split_once(' ')
            .ok_or_else(|| FtpError::from_reply(500, "500 syntax error"))?;
        let resolved = self.resolve(name);
        match verb {
            "RETR" => {
                let content = self
                    .state
                    .borrow()
                    .file_content(&resolved)
                    .ok_or_else(|| Self::not_found(&resolved))?;
                let offset = rest.unwrap_or(0).min(content.len() as u64) as usize;
                Ok(Box::new(MockDataConn {
                    read_data: Cursor::new(content[offset..].to_vec()),
                    written: Vec::new(),
                    stor_target: None,
                }))
            }
            "STOR" => {
                if self.state.borrow().deny_stor {
                    return Err(FtpError::from_reply(
                        550,
                        &format!("550 {}: permission denied", resolved),
                    ));
                }
                Ok(Box::new(MockDataConn {
                    read_data: Cursor::new(Vec::new()),
                    written: Vec::new(),
                    stor_target: Some((self.state.clone(), resolved)),
                }))
            }
            _ => Err(FtpError::from_reply(500, "500 unknown transfer command")),
        }
    }

    fn close(&mut self) -> FtpResult<()> {
        self.record("QUIT".to_string());
        Ok(())
    }

    fn encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }
}

// ─── Factory ─────────────────────────────────────────────────────────

pub struct MockFactory {
    pub state: Rc<RefCell<ServerState>>,
    pub encoding: Option<String>,
    pub initial_dir: String,
}

impl MockFactory {
    pub fn new(state: Rc<RefCell<ServerState>>) -> Self {
        Self {
            state,
            encoding: Some("latin-1".to_string()),
            initial_dir: "/".to_string(),
        }
    }

    pub fn without_encoding(state: Rc<RefCell<ServerState>>) -> Self {
        Self {
            state,
            encoding: None,
            initial_dir: "/".to_string(),
        }
    }
}

impl SessionFactory for MockFactory {
    fn open_session(&self) -> FtpResult<Box<dyn FtpSession>> {
        self.state.borrow_mut().transcript.push("CONNECT".to_string());
        Ok(Box::new(MockSession {
            state: self.state.clone(),
            cwd: self.initial_dir.clone(),
            encoding: self.encoding.clone(),
        }))
    }
}
