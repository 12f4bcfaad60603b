//! Character-encoding conversion for remote paths and text streams.
//!
//! Latin-1 gets a dedicated code path: FTP's traditional path encoding
//! is the lossless byte ↔ U+00xx mapping, while the WHATWG label
//! `latin1` that `encoding_rs` resolves aliases windows-1252 and would
//! remap the 0x80–0x9F range. Every other label is resolved through
//! `encoding_rs`.

use crate::error::{FtpError, FtpResult};
use encoding_rs::Encoding;

/// How to handle undecodable/unencodable input in text streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodingErrors {
    /// Fail with an `Io`-kind error.
    #[default]
    Strict,
    /// Substitute U+FFFD (decoding) or `?` (encoding).
    Replace,
}

fn is_latin1_label(label: &str) -> bool {
    matches!(
        label.to_ascii_lowercase().as_str(),
        "latin-1" | "latin1" | "iso-8859-1" | "iso8859-1" | "l1"
    )
}

fn resolve(label: &str) -> FtpResult<&'static Encoding> {
    Encoding::for_label(label.as_bytes())
        .ok_or_else(|| FtpError::io(format!("unsupported encoding '{}'", label)))
}

/// Decode raw bytes with the named encoding.
pub fn decode(bytes: &[u8], label: &str, errors: EncodingErrors) -> FtpResult<String> {
    if is_latin1_label(label) {
        // Lossless for any byte sequence.
        return Ok(latin1_decode(bytes));
    }
    let encoding = resolve(label)?;
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors && errors == EncodingErrors::Strict {
        return Err(FtpError::io(format!(
            "byte sequence is not valid {}",
            label
        )));
    }
    Ok(text.into_owned())
}

/// Encode text with the named encoding.
pub fn encode(text: &str, label: &str, errors: EncodingErrors) -> FtpResult<Vec<u8>> {
    if is_latin1_label(label) {
        return latin1_encode(text, errors);
    }
    let encoding = resolve(label)?;
    let (bytes, _, had_errors) = encoding.encode(text);
    if had_errors && errors == EncodingErrors::Strict {
        return Err(FtpError::io(format!(
            "text is not representable in {}",
            label
        )));
    }
    Ok(bytes.into_owned())
}

/// Byte → U+00xx mapping. Total, so path round trips never lose data.
pub(crate) fn latin1_decode(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

pub(crate) fn latin1_encode(text: &str, errors: EncodingErrors) -> FtpResult<Vec<u8>> {
    let mut out = Vec::with_capacity(text.len());
    for c in text.chars() {
        let cp = c as u32;
        if cp <= 0xFF {
            out.push(cp as u8);
        } else if errors == EncodingErrors::Replace {
            out.push(b'?');
        } else {
            return Err(FtpError::io(format!(
                "character {:?} is not representable in latin-1",
                c
            )));
        }
    }
    Ok(out)
}
