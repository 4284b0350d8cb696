//! Content-Encoding decoding (gzip, deflate) using `flate2`.

use crate::base::neterror::NetError;
use flate2::read::{DeflateDecoder, GzDecoder, ZlibDecoder};
use std::io::Read;

/// Encodings this engine can undo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Gzip,
    Deflate,
}

impl ContentEncoding {
    /// Map a single `Content-Encoding` token. Unknown codings yield `None`.
    pub fn from_token(token: &str) -> Option<Self> {
        match token.trim().to_ascii_lowercase().as_str() {
            "" | "identity" => Some(ContentEncoding::Identity),
            "gzip" | "x-gzip" => Some(ContentEncoding::Gzip),
            "deflate" => Some(ContentEncoding::Deflate),
            _ => None,
        }
    }
}

/// Undo every coding listed in a `Content-Encoding` value, last applied first.
///
/// If any listed coding is unsupported the body is returned untouched, since
/// partial decoding would only produce garbage.
pub fn decode_body(content_encoding: &str, body: &[u8]) -> Result<Vec<u8>, NetError> {
    let codings: Option<Vec<ContentEncoding>> =
        content_encoding.split(',').map(ContentEncoding::from_token).collect();
    let Some(codings) = codings else {
        tracing::debug!(encoding = %content_encoding, "unsupported content encoding, passing through");
        return Ok(body.to_vec());
    };

    let mut data = body.to_vec();
    for coding in codings.into_iter().rev() {
        data = match coding {
            ContentEncoding::Identity => data,
            ContentEncoding::Gzip => gunzip(&data)?,
            ContentEncoding::Deflate => inflate(&data)?,
        };
    }
    Ok(data)
}

fn gunzip(data: &[u8]) -> Result<Vec<u8>, NetError> {
    let mut out = Vec::new();
    GzDecoder::new(data).read_to_end(&mut out).map_err(|e| {
        tracing::debug!(error = %e, "gzip decoding failed");
        NetError::ContentDecodingFailed
    })?;
    Ok(out)
}

/// `deflate` is specified as zlib-wrapped, but servers often send raw
/// DEFLATE; try zlib first and fall back to raw.
fn inflate(data: &[u8]) -> Result<Vec<u8>, NetError> {
    let mut out = Vec::new();
    if ZlibDecoder::new(data).read_to_end(&mut out).is_ok() {
        return Ok(out);
    }
    out.clear();
    DeflateDecoder::new(data).read_to_end(&mut out).map_err(|e| {
        tracing::debug!(error = %e, "deflate decoding failed");
        NetError::ContentDecodingFailed
    })?;
    Ok(out)
}
