//! Chunked transfer-coding decoder.
//!
//! Incremental: bytes can be fed as they arrive from the socket, and the
//! decoder reports how much input it consumed and whether the terminating
//! zero-size chunk plus trailer section has been seen.

use crate::base::neterror::NetError;
use bytes::BytesMut;

/// Longest chunk-size line (size plus extensions) we accept.
const MAX_CHUNK_LINE: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Size,
    Data { remaining: usize },
    DataEnd,
    Trailer,
    Complete,
}

#[derive(Debug)]
pub struct ChunkedDecoder {
    state: State,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self { state: State::Size }
    }

    pub fn is_complete(&self) -> bool {
        self.state == State::Complete
    }

    /// Decode as much of `input` as possible into `out`.
    ///
    /// Returns the number of input bytes consumed. Leftover bytes belong to a
    /// partial line and must be presented again with more data appended.
    pub fn decode(&mut self, input: &[u8], out: &mut BytesMut) -> Result<usize, NetError> {
        let mut pos = 0;
        loop {
            match self.state {
                State::Size => {
                    let Some(end) = find_crlf(&input[pos..]) else {
                        if input.len() - pos > MAX_CHUNK_LINE {
                            return Err(NetError::InvalidChunkedEncoding);
                        }
                        return Ok(pos);
                    };
                    let size = parse_chunk_size(&input[pos..pos + end])?;
                    pos += end + 2;
                    self.state = if size == 0 {
                        State::Trailer
                    } else {
                        State::Data { remaining: size }
                    };
                }
                State::Data { remaining } => {
                    let available = input.len() - pos;
                    if available == 0 {
                        return Ok(pos);
                    }
                    let take = remaining.min(available);
                    out.extend_from_slice(&input[pos..pos + take]);
                    pos += take;
                    self.state = if take == remaining {
                        State::DataEnd
                    } else {
                        State::Data { remaining: remaining - take }
                    };
                }
                State::DataEnd => {
                    if input.len() - pos < 2 {
                        return Ok(pos);
                    }
                    if &input[pos..pos + 2] != b"\r\n" {
                        return Err(NetError::InvalidChunkedEncoding);
                    }
                    pos += 2;
                    self.state = State::Size;
                }
                State::Trailer => {
                    // Trailer fields are skipped; an empty line ends the body.
                    let Some(end) = find_crlf(&input[pos..]) else {
                        return Ok(pos);
                    };
                    pos += end + 2;
                    if end == 0 {
                        self.state = State::Complete;
                    }
                }
                State::Complete => return Ok(pos),
            }
        }
    }
}

fn parse_chunk_size(line: &[u8]) -> Result<usize, NetError> {
    let line = std::str::from_utf8(line).map_err(|_| NetError::InvalidChunkedEncoding)?;
    // Chunk extensions after ';' are discarded.
    let digits = line.split(';').next().unwrap_or("").trim();
    if digits.is_empty() || digits.len() > 15 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Err(NetError::InvalidChunkedEncoding);
    }
    usize::from_str_radix(digits, 16).map_err(|_| NetError::InvalidChunkedEncoding)
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == b"\r\n")
}

/// Decode a complete chunked body held in memory.
///
/// Returns the decoded bytes and how many input bytes the body occupied.
pub fn decode_all(input: &[u8]) -> Result<(BytesMut, usize), NetError> {
    let mut decoder = ChunkedDecoder::new();
    let mut out = BytesMut::new();
    let consumed = decoder.decode(input, &mut out)?;
    if !decoder.is_complete() {
        return Err(NetError::IncompleteChunkedEncoding);
    }
    Ok((out, consumed))
}
