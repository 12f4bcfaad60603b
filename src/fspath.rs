//! POSIX-style path algebra for remote paths.
//!
//! Remote paths are text or raw bytes ([`FsPath`]); the algebra itself
//! works on `&str` and is purely textual — nothing here talks to the
//! server. Byte paths are mapped through the lossless latin-1 byte ↔
//! char correspondence for the duration of an operation, so the path
//! separator and dot components are recognised without assuming
//! anything about the real path encoding.

use crate::encoding;
use crate::error::{FtpError, FtpResult};

pub const SEP: &str = "/";
pub const CURDIR: &str = ".";
pub const PARDIR: &str = "..";

// ─── String-level algebra ────────────────────────────────────────────

/// Join two path fragments. An absolute `tail` replaces `head`.
pub fn join(head: &str, tail: &str) -> String {
    if tail.starts_with('/') {
        tail.to_string()
    } else if head.is_empty() || head.ends_with('/') {
        format!("{}{}", head, tail)
    } else {
        format!("{}/{}", head, tail)
    }
}

/// Split a path into `(head, tail)` around the last separator. The
/// head keeps no trailing slash unless it is entirely slashes.
pub fn split(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        None => ("", path),
        Some(index) => {
            let (head, tail) = (&path[..index + 1], &path[index + 1..]);
            if head.bytes().all(|b| b == b'/') {
                (head, tail)
            } else {
                (head.trim_end_matches('/'), tail)
            }
        }
    }
}

pub fn dirname(path: &str) -> &str {
    split(path).0
}

pub fn basename(path: &str) -> &str {
    split(path).1
}

/// Split off the extension: `(root, ext)` where `ext` starts with a
/// dot. Leading dots of the base name never start an extension.
pub fn splitext(path: &str) -> (&str, &str) {
    let sep_index = path.rfind('/').map(|i| i as isize).unwrap_or(-1);
    let dot_index = match path.rfind('.') {
        Some(i) if i as isize > sep_index => i,
        _ => return (path, ""),
    };
    // Reject if everything between the separator and the dot is dots.
    let base_start = (sep_index + 1) as usize;
    if path[base_start..dot_index].bytes().all(|b| b == b'.') {
        return (path, "");
    }
    (&path[..dot_index], &path[dot_index..])
}

/// Remote paths have no drive component.
pub fn splitdrive(path: &str) -> (&str, &str) {
    ("", path)
}

/// Case is significant on remote servers; this is the identity.
pub fn normcase(path: &str) -> &str {
    path
}

pub fn isabs(path: &str) -> bool {
    path.starts_with('/')
}

/// Collapse separator runs and resolve `.`/`..` textually. The parent
/// of the root is the root. Exactly two leading slashes are kept
/// (POSIX allows them to mean something else).
pub fn normpath(path: &str) -> String {
    if path.is_empty() {
        return CURDIR.to_string();
    }
    let initial_slashes = if path.starts_with("//") && !path.starts_with("///") {
        2
    } else if path.starts_with('/') {
        1
    } else {
        0
    };
    let mut parts: Vec<&str> = Vec::new();
    for comp in path.split('/') {
        if comp.is_empty() || comp == CURDIR {
            continue;
        }
        if comp != PARDIR
            || (initial_slashes == 0 && parts.is_empty())
            || parts.last() == Some(&PARDIR)
        {
            parts.push(comp);
        } else if !parts.is_empty() {
            parts.pop();
        }
    }
    let mut result = SEP.repeat(initial_slashes);
    result.push_str(&parts.join(SEP));
    if result.is_empty() {
        CURDIR.to_string()
    } else {
        result
    }
}

/// Longest common prefix, character-wise (not component-wise).
pub fn commonprefix<'a>(paths: &[&'a str]) -> &'a str {
    let Some(first) = paths.first() else {
        return "";
    };
    let mut prefix_len = first.len();
    for path in &paths[1..] {
        prefix_len = first
            .bytes()
            .zip(path.bytes())
            .take(prefix_len)
            .take_while(|(a, b)| a == b)
            .count();
    }
    // Byte-wise matching over equal prefixes never splits a UTF-8
    // sequence: a partial sequence would have differed earlier.
    &first[..prefix_len]
}

// ─── FsPath: text or bytes ───────────────────────────────────────────

/// A remote path, carrying its original string kind.
///
/// Every host call accepts either kind, but one call must not mix
/// them; results that echo path data preserve the kind of the input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FsPath {
    Text(String),
    Bytes(Vec<u8>),
}

impl FsPath {
    pub fn is_text(&self) -> bool {
        matches!(self, FsPath::Text(_))
    }

    pub fn is_bytes(&self) -> bool {
        matches!(self, FsPath::Bytes(_))
    }

    /// Whether `other` has the same string kind as `self`.
    pub fn same_kind(&self, other: &FsPath) -> bool {
        self.is_text() == other.is_text()
    }

    /// Internal text view for the algebra (latin-1 for byte paths,
    /// which round-trips losslessly).
    pub(crate) fn algebra_text(&self) -> String {
        match self {
            FsPath::Text(s) => s.clone(),
            FsPath::Bytes(b) => encoding::latin1_decode(b),
        }
    }

    /// Rebuild a path of the same kind as `self` from algebra text.
    pub(crate) fn with_kind_of(&self, text: String) -> FsPath {
        match self {
            FsPath::Text(_) => FsPath::Text(text),
            // Total for text produced by `algebra_text`.
            FsPath::Bytes(_) => FsPath::Bytes(
                encoding::latin1_encode(&text, encoding::EncodingErrors::Replace)
                    .unwrap_or_default(),
            ),
        }
    }

    fn mismatch() -> FtpError {
        FtpError::type_mismatch("text and byte paths mixed in a single call")
    }

    // ── Kind-preserving algebra ──────────────────────────────────

    pub fn join(&self, tail: &FsPath) -> FtpResult<FsPath> {
        if !self.same_kind(tail) {
            return Err(Self::mismatch());
        }
        Ok(self.with_kind_of(join(&self.algebra_text(), &tail.algebra_text())))
    }

    pub fn split(&self) -> (FsPath, FsPath) {
        let text = self.algebra_text();
        let (head, tail) = split(&text);
        (
            self.with_kind_of(head.to_string()),
            self.with_kind_of(tail.to_string()),
        )
    }

    pub fn dirname(&self) -> FsPath {
        self.split().0
    }

    pub fn basename(&self) -> FsPath {
        self.split().1
    }

    pub fn splitext(&self) -> (FsPath, FsPath) {
        let text = self.algebra_text();
        let (root, ext) = splitext(&text);
        (
            self.with_kind_of(root.to_string()),
            self.with_kind_of(ext.to_string()),
        )
    }

    pub fn splitdrive(&self) -> (FsPath, FsPath) {
        (self.with_kind_of(String::new()), self.clone())
    }

    pub fn normpath(&self) -> FsPath {
        self.with_kind_of(normpath(&self.algebra_text()))
    }

    pub fn normcase(&self) -> FsPath {
        self.clone()
    }

    pub fn isabs(&self) -> bool {
        isabs(&self.algebra_text())
    }

    pub fn is_empty(&self) -> bool {
        match self {
            FsPath::Text(s) => s.is_empty(),
            FsPath::Bytes(b) => b.is_empty(),
        }
    }

    /// Longest common prefix of `paths`, all of which must share one
    /// string kind.
    pub fn commonprefix(paths: &[FsPath]) -> FtpResult<FsPath> {
        let Some(first) = paths.first() else {
            return Ok(FsPath::Text(String::new()));
        };
        if paths.iter().any(|p| !first.same_kind(p)) {
            return Err(Self::mismatch());
        }
        let texts: Vec<String> = paths.iter().map(|p| p.algebra_text()).collect();
        let views: Vec<&str> = texts.iter().map(String::as_str).collect();
        Ok(first.with_kind_of(commonprefix(&views).to_string()))
    }
}

impl From<&str> for FsPath {
    fn from(s: &str) -> Self {
        FsPath::Text(s.to_string())
    }
}

impl From<String> for FsPath {
    fn from(s: String) -> Self {
        FsPath::Text(s)
    }
}

impl From<&[u8]> for FsPath {
    fn from(b: &[u8]) -> Self {
        FsPath::Bytes(b.to_vec())
    }
}

impl<const N: usize> From<&[u8; N]> for FsPath {
    fn from(b: &[u8; N]) -> Self {
        FsPath::Bytes(b.to_vec())
    }
}

impl From<Vec<u8>> for FsPath {
    fn from(b: Vec<u8>) -> Self {
        FsPath::Bytes(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join() {
        assert_eq!(join("/a", "b"), "/a/b");
        assert_eq!(join("/a/", "b"), "/a/b");
        assert_eq!(join("/a", "/b"), "/b");
        assert_eq!(join("", "b"), "b");
    }

    #[test]
    fn test_split() {
        assert_eq!(split("/a/b"), ("/a", "b"));
        assert_eq!(split("/a/b/"), ("/a/b", ""));
        assert_eq!(split("name"), ("", "name"));
        assert_eq!(split("/name"), ("/", "name"));
        assert_eq!(split("/"), ("/", ""));
    }

    #[test]
    fn test_normpath() {
        assert_eq!(normpath("/a//b///c"), "/a/b/c");
        assert_eq!(normpath("/a/./b"), "/a/b");
        assert_eq!(normpath("/a/b/../c"), "/a/c");
        assert_eq!(normpath("/.."), "/");
        assert_eq!(normpath("a/.."), ".");
        assert_eq!(normpath(""), ".");
        assert_eq!(normpath("../x"), "../x");
        assert_eq!(normpath("//a"), "//a");
        assert_eq!(normpath("///a"), "/a");
    }

    #[test]
    fn test_splitext() {
        assert_eq!(splitext("/a/b.txt"), ("/a/b", ".txt"));
        assert_eq!(splitext("/a/.profile"), ("/a/.profile", ""));
        assert_eq!(splitext("archive.tar.gz"), ("archive.tar", ".gz"));
        assert_eq!(splitext("noext"), ("noext", ""));
        assert_eq!(splitext("/a.b/c"), ("/a.b/c", ""));
    }

    #[test]
    fn test_commonprefix() {
        assert_eq!(commonprefix(&["/usr/lib", "/usr/local"]), "/usr/l");
        assert_eq!(commonprefix(&[]), "");
    }

    #[test]
    fn test_join_dirname_basename_identity() {
        for p in ["/a/b/c", "/x", "rel/path", "/a/b.txt"] {
            assert_eq!(join(dirname(p), basename(p)), normpath(p));
        }
    }

    #[test]
    fn test_fspath_kind_preserved() {
        let p: FsPath = b"/srv/data".into();
        let joined = p.join(&b"file.bin".into()).unwrap();
        assert_eq!(joined, FsPath::Bytes(b"/srv/data/file.bin".to_vec()));
        assert_eq!(p.basename(), FsPath::Bytes(b"data".to_vec()));
    }

    #[test]
    fn test_fspath_mixed_kinds_fail() {
        let text: FsPath = "/a".into();
        let bytes: FsPath = b"/b".into();
        let err = text.join(&bytes).unwrap_err();
        assert_eq!(err.kind, crate::error::FtpErrorKind::TypeMismatch);
        assert!(FsPath::commonprefix(&[text, bytes]).is_err());
    }

    #[test]
    fn test_fspath_bytes_round_trip_non_ascii() {
        // 0xE9 is not valid UTF-8 on its own; the algebra must not care.
        let p = FsPath::Bytes(vec![0x2f, 0xe9, 0x2f, 0x66]);
        assert_eq!(p.normpath(), FsPath::Bytes(vec![0x2f, 0xe9, 0x2f, 0x66]));
        assert_eq!(p.basename(), FsPath::Bytes(vec![0x66]));
    }
}
