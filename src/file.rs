//! File-like streams over FTP data-channel transfers.
//!
//! An [`FtpFile`] is a small state machine (open → transferring →
//! closed) over a data connection and a borrowed child session. The
//! transfer itself is always binary (`TYPE I`); text mode is a
//! client-side layer that decodes, applies the newline policy, and
//! encodes on write. Closing is deterministic: wrappers are flushed,
//! the data connection is dropped, the transfer's completion reply is
//! read on the child session, and the child goes back to the pool.

use crate::encoding::{self, EncodingErrors};
use crate::error::{FtpError, FtpResult};
use crate::pool::{ChildPool, PooledSession};
use crate::session::DataConn;
use std::cell::RefCell;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::rc::Rc;

const DEFAULT_BUFFER_SIZE: usize = 8 * 1024;
pub(crate) const DEFAULT_TEXT_ENCODING: &str = "utf-8";

// ─── Open parameters ─────────────────────────────────────────────────

/// Options for `FtpHost::open_with`, mirroring the usual file-open
/// parameters.
#[derive(Default)]
pub struct OpenOptions {
    /// Buffer capacity in bytes; `None` selects the default.
    pub buffering: Option<usize>,
    /// Text encoding; only valid in text mode (default UTF-8).
    pub encoding: Option<String>,
    /// Decode/encode error handling for text mode.
    pub errors: EncodingErrors,
    /// `None`: universal newline translation on read, `\n` written
    /// untranslated. `Some("")`: no translation. `Some(nl)`: no read
    /// translation, `\n` → `nl` on write.
    pub newline: Option<String>,
    /// Start the transfer at this byte offset (binary mode only).
    pub rest: Option<u64>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct ParsedMode {
    pub read: bool,
    pub binary: bool,
}

pub(crate) fn parse_mode(mode: &str) -> FtpResult<ParsedMode> {
    if mode.contains('a') {
        return Err(FtpError::io("append mode not supported"));
    }
    let parsed = match mode {
        "r" | "rt" => ParsedMode {
            read: true,
            binary: false,
        },
        "rb" => ParsedMode {
            read: true,
            binary: true,
        },
        "w" | "wt" => ParsedMode {
            read: false,
            binary: false,
        },
        "wb" => ParsedMode {
            read: false,
            binary: true,
        },
        other => return Err(FtpError::io(format!("invalid mode '{}'", other))),
    };
    Ok(parsed)
}

// ─── Text layer ──────────────────────────────────────────────────────

enum NewlineMode {
    Universal,
    Passthrough,
    Fixed(String),
}

impl NewlineMode {
    fn from_option(newline: Option<&str>) -> FtpResult<Self> {
        match newline {
            None => Ok(NewlineMode::Universal),
            Some("") => Ok(NewlineMode::Passthrough),
            Some(nl @ ("\n" | "\r" | "\r\n")) => Ok(NewlineMode::Fixed(nl.to_string())),
            Some(other) => Err(FtpError::io(format!(
                "illegal newline value {:?}",
                other
            ))),
        }
    }
}

enum TextDecoder {
    /// Stateless byte → U+00xx mapping.
    Latin1,
    Rs(encoding_rs::Decoder),
}

impl TextDecoder {
    fn new(label: &str) -> FtpResult<Self> {
        match label.to_ascii_lowercase().as_str() {
            "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" | "l1" => Ok(TextDecoder::Latin1),
            _ => encoding_rs::Encoding::for_label(label.as_bytes())
                .map(|e| TextDecoder::Rs(e.new_decoder()))
                .ok_or_else(|| FtpError::io(format!("unsupported encoding '{}'", label))),
        }
    }

    fn decode_chunk(
        &mut self,
        input: &[u8],
        last: bool,
        errors: EncodingErrors,
        out: &mut String,
    ) -> FtpResult<()> {
        match self {
            TextDecoder::Latin1 => {
                out.extend(input.iter().map(|&b| char::from(b)));
                Ok(())
            }
            TextDecoder::Rs(decoder) => {
                let needed = decoder
                    .max_utf8_buffer_length(input.len())
                    .unwrap_or(input.len() * 3 + 16);
                out.reserve(needed);
                match errors {
                    EncodingErrors::Replace => {
                        let _ = decoder.decode_to_string(input, out, last);
                        Ok(())
                    }
                    EncodingErrors::Strict => {
                        let (result, _) =
                            decoder.decode_to_string_without_replacement(input, out, last);
                        match result {
                            encoding_rs::DecoderResult::Malformed(..) => Err(FtpError::io(
                                "byte sequence is not valid for the stream encoding",
                            )),
                            _ => Ok(()),
                        }
                    }
                }
            }
        }
    }
}

pub(crate) struct TextLayer {
    encoding: String,
    errors: EncodingErrors,
    newline: NewlineMode,
    decoder: TextDecoder,
    /// Decoded, newline-translated text not yet handed to the caller.
    pending: String,
    /// A chunk ended in `\r`; swallow an immediately following `\n`.
    pending_cr: bool,
    eof: bool,
}

/// Validate the text-mode options up front, before any connection is
/// committed to the stream. `None` for binary mode.
pub(crate) fn build_text_layer(
    mode: ParsedMode,
    options: &OpenOptions,
) -> FtpResult<Option<TextLayer>> {
    if mode.binary {
        return Ok(None);
    }
    let label = options
        .encoding
        .clone()
        .unwrap_or_else(|| DEFAULT_TEXT_ENCODING.to_string());
    Ok(Some(TextLayer {
        decoder: TextDecoder::new(&label)?,
        encoding: label,
        errors: options.errors,
        newline: NewlineMode::from_option(options.newline.as_deref())?,
        pending: String::new(),
        pending_cr: false,
        eof: false,
    }))
}

impl TextLayer {
    fn push_decoded(&mut self, decoded: &str) {
        match self.newline {
            NewlineMode::Universal => {
                for c in decoded.chars() {
                    match c {
                        '\r' => {
                            self.pending.push('\n');
                            self.pending_cr = true;
                        }
                        '\n' if self.pending_cr => {
                            self.pending_cr = false;
                        }
                        other => {
                            self.pending.push(other);
                            self.pending_cr = false;
                        }
                    }
                }
            }
            NewlineMode::Passthrough | NewlineMode::Fixed(_) => {
                self.pending.push_str(decoded);
            }
        }
    }
}

// ─── The stream ──────────────────────────────────────────────────────

enum StreamIo {
    Reader(BufReader<Box<dyn DataConn>>),
    Writer(BufWriter<Box<dyn DataConn>>),
}

/// A file-like stream over one remote transfer.
pub struct FtpFile {
    pool: Rc<RefCell<ChildPool>>,
    child: Option<PooledSession>,
    io: Option<StreamIo>,
    text: Option<TextLayer>,
    closed: bool,
}

impl std::fmt::Debug for FtpFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FtpFile")
            .field("closed", &self.closed)
            .finish()
    }
}

impl FtpFile {
    pub(crate) fn new(
        pool: Rc<RefCell<ChildPool>>,
        child: PooledSession,
        conn: Box<dyn DataConn>,
        mode: ParsedMode,
        buffering: Option<usize>,
        text: Option<TextLayer>,
    ) -> Self {
        let capacity = buffering.unwrap_or(DEFAULT_BUFFER_SIZE).max(1);
        let io = if mode.read {
            StreamIo::Reader(BufReader::with_capacity(capacity, conn))
        } else {
            StreamIo::Writer(BufWriter::with_capacity(capacity, conn))
        };
        Self {
            pool,
            child: Some(child),
            io: Some(io),
            text,
            closed: false,
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn check_open(&self) -> FtpResult<()> {
        if self.closed {
            Err(FtpError::io("I/O operation on closed stream"))
        } else {
            Ok(())
        }
    }

    // ── Text reads ───────────────────────────────────────────────

    /// Pull one raw chunk through the decoder into the pending text.
    fn fill_text(&mut self) -> FtpResult<()> {
        let reader = match self.io.as_mut() {
            Some(StreamIo::Reader(r)) => r,
            _ => return Err(FtpError::io("stream is not open for reading")),
        };
        let chunk = reader.fill_buf().map_err(FtpError::from)?.to_vec();
        let layer = match self.text.as_mut() {
            Some(l) => l,
            None => return Err(FtpError::io("stream is not in text mode")),
        };
        if chunk.is_empty() {
            let mut decoded = String::new();
            layer
                .decoder
                .decode_chunk(&[], true, layer.errors, &mut decoded)?;
            layer.eof = true;
            let decoded_owned = decoded;
            layer.push_decoded(&decoded_owned);
            return Ok(());
        }
        let mut decoded = String::new();
        layer
            .decoder
            .decode_chunk(&chunk, false, layer.errors, &mut decoded)?;
        layer.push_decoded(&decoded);
        if let Some(StreamIo::Reader(r)) = self.io.as_mut() {
            r.consume(chunk.len());
        }
        Ok(())
    }

    /// Read one line (terminator included) into `buf`; returns the
    /// number of characters appended, 0 at end of stream.
    pub fn read_line(&mut self, buf: &mut String) -> FtpResult<usize> {
        self.check_open()?;
        loop {
            let (eof, newline_at) = match self.text.as_ref() {
                Some(layer) => (layer.eof, layer.pending.find('\n')),
                None => return Err(FtpError::io("stream is not in text mode")),
            };
            if let Some(pos) = newline_at {
                let layer = self.text.as_mut().ok_or_else(|| FtpError::io("text layer gone"))?;
                let line: String = layer.pending.drain(..=pos).collect();
                buf.push_str(&line);
                return Ok(line.chars().count());
            }
            if eof {
                let layer = self.text.as_mut().ok_or_else(|| FtpError::io("text layer gone"))?;
                let line: String = layer.pending.drain(..).collect();
                buf.push_str(&line);
                return Ok(line.chars().count());
            }
            self.fill_text()?;
        }
    }

    /// Read the remainder of the stream as text.
    pub fn read_to_string(&mut self, buf: &mut String) -> FtpResult<usize> {
        self.check_open()?;
        loop {
            let eof = match self.text.as_ref() {
                Some(layer) => layer.eof,
                None => return Err(FtpError::io("stream is not in text mode")),
            };
            if eof {
                break;
            }
            self.fill_text()?;
        }
        let layer = self.text.as_mut().ok_or_else(|| FtpError::io("text layer gone"))?;
        let rest: String = layer.pending.drain(..).collect();
        buf.push_str(&rest);
        Ok(rest.chars().count())
    }

    /// Iterate over the stream's lines (terminators stripped).
    pub fn lines(&mut self) -> Lines<'_> {
        Lines { file: self }
    }

    // ── Text writes ──────────────────────────────────────────────

    /// Encode and write text, applying the newline policy.
    pub fn write_str(&mut self, text: &str) -> FtpResult<()> {
        self.check_open()?;
        let layer = match self.text.as_ref() {
            Some(l) => l,
            None => return Err(FtpError::io("stream is not in text mode")),
        };
        let translated = match &layer.newline {
            NewlineMode::Fixed(nl) if nl != "\n" => text.replace('\n', nl),
            _ => text.to_string(),
        };
        let bytes = encoding::encode(&translated, &layer.encoding, layer.errors)?;
        match self.io.as_mut() {
            Some(StreamIo::Writer(w)) => w.write_all(&bytes).map_err(FtpError::from),
            _ => Err(FtpError::io("stream is not open for writing")),
        }
    }

    // ── Close ────────────────────────────────────────────────────

    /// Whether a `voidresp` failure at close time is the benign
    /// "transfer already complete, 226 delayed or swallowed" case.
    fn is_benign_close_error(err: &FtpError) -> bool {
        if matches!(err.code, Some(150 | 426 | 450 | 451)) {
            return true;
        }
        err.message
            .lines()
            .next()
            .map(|line| line.starts_with("timed out"))
            .unwrap_or(false)
    }

    /// Flush and close the stream, read the transfer's completion
    /// reply, and recycle the child session. Idempotent.
    pub fn close(&mut self) -> FtpResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let mut errored = false;
        let mut failure: Option<FtpError> = None;
        match self.io.take() {
            Some(StreamIo::Writer(mut writer)) => {
                if let Err(err) = writer.flush() {
                    errored = true;
                    failure = Some(err.into());
                }
                // Dropping the connection sends EOF to the server.
                drop(writer);
            }
            Some(StreamIo::Reader(reader)) => drop(reader),
            None => {}
        }
        if let Some(mut child) = self.child.take() {
            match child.session.voidresp() {
                Ok(()) => {}
                Err(err) if Self::is_benign_close_error(&err) => {}
                Err(err) => {
                    errored = true;
                    if failure.is_none() {
                        failure = Some(err.into_io());
                    }
                }
            }
            self.pool.borrow_mut().release(child, errored);
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for FtpFile {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        // A dropped-but-unclosed stream leaves the transfer state of
        // its session unknown; discard the session instead of
        // recycling it.
        self.closed = true;
        self.io = None;
        if let Some(mut child) = self.child.take() {
            log::warn!(
                "remote stream dropped without close; discarding child session {}",
                child.id
            );
            let _ = child.session.close();
            if let Ok(mut pool) = self.pool.try_borrow_mut() {
                pool.release(child, true);
            }
        }
    }
}

// ─── Byte-level traits (binary mode) ─────────────────────────────────

impl Read for FtpFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "I/O operation on closed stream",
            ));
        }
        if self.text.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "byte read from text-mode stream",
            ));
        }
        match self.io.as_mut() {
            Some(StreamIo::Reader(reader)) => reader.read(buf),
            _ => Err(io::Error::new(
                io::ErrorKind::Other,
                "stream is not open for reading",
            )),
        }
    }
}

impl BufRead for FtpFile {
    fn fill_buf(&mut self) -> io::Result<&[u8]> {
        if self.closed || self.text.is_some() {
            return Err(io::Error::new(io::ErrorKind::Other, "stream not byte-readable"));
        }
        match self.io.as_mut() {
            Some(StreamIo::Reader(reader)) => reader.fill_buf(),
            _ => Err(io::Error::new(
                io::ErrorKind::Other,
                "stream is not open for reading",
            )),
        }
    }

    fn consume(&mut self, amt: usize) {
        if let Some(StreamIo::Reader(reader)) = self.io.as_mut() {
            reader.consume(amt);
        }
    }
}

impl Write for FtpFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "I/O operation on closed stream",
            ));
        }
        if self.text.is_some() {
            return Err(io::Error::new(
                io::ErrorKind::Other,
                "byte write to text-mode stream",
            ));
        }
        match self.io.as_mut() {
            Some(StreamIo::Writer(writer)) => writer.write(buf),
            _ => Err(io::Error::new(
                io::ErrorKind::Other,
                "stream is not open for writing",
            )),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.io.as_mut() {
            Some(StreamIo::Writer(writer)) => writer.flush(),
            _ => Ok(()),
        }
    }
}

/// Line iterator returned by [`FtpFile::lines`]. Terminators are
/// stripped from the yielded lines.
pub struct Lines<'a> {
    file: &'a mut FtpFile,
}

impl Iterator for Lines<'_> {
    type Item = FtpResult<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut line = String::new();
        match self.file.read_line(&mut line) {
            Err(err) => Some(Err(err)),
            Ok(0) => None,
            Ok(_) => {
                if line.ends_with('\n') {
                    line.pop();
                    if line.ends_with('\r') {
                        line.pop();
                    }
                }
                Some(Ok(line))
            }
        }
    }
}
