//! HPACK header compression (RFC 7541).
//!
//! The encoder and decoder each own one dynamic table. A connection keeps a
//! single encoder in its writer task and a single decoder in its reader
//! task, so both tables change in exactly the order header blocks hit the
//! wire.

use super::error::H2Error;
use super::huffman;
use std::collections::VecDeque;

/// Per-entry overhead counted against the table size (RFC 7541 Section 4.1).
const ENTRY_OVERHEAD: usize = 32;

/// Headers whose values must never enter a compression table.
const SENSITIVE_HEADERS: &[&str] = &["authorization", "cookie", "proxy-authorization", "set-cookie"];

/// A header name/value pair as carried in a header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderField {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

impl HeaderField {
    pub fn new(name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self { name: name.into(), value: value.into() }
    }

    pub fn size(&self) -> usize {
        self.name.len() + self.value.len() + ENTRY_OVERHEAD
    }

    fn is_sensitive(&self) -> bool {
        SENSITIVE_HEADERS.iter().any(|s| s.as_bytes() == self.name.as_slice())
    }
}

/// Append `value` using an N-bit prefix; `pattern` supplies the high bits.
pub fn encode_prefix_int(buf: &mut Vec<u8>, value: usize, prefix_bits: u8, pattern: u8) {
    let max = (1usize << prefix_bits) - 1;
    if value < max {
        buf.push(pattern | value as u8);
        return;
    }
    buf.push(pattern | max as u8);
    let mut rest = value - max;
    while rest >= 0x80 {
        buf.push(0x80 | (rest & 0x7f) as u8);
        rest >>= 7;
    }
    buf.push(rest as u8);
}

/// Decode an N-bit prefix integer. Returns the value and bytes consumed.
pub fn decode_prefix_int(buf: &[u8], prefix_bits: u8) -> Result<(usize, usize), H2Error> {
    let (&first, rest) = buf.split_first().ok_or(H2Error::Compression)?;
    let max = (1usize << prefix_bits) - 1;
    let mut value = usize::from(first) & max;
    if value < max {
        return Ok((value, 1));
    }
    let mut shift = 0u32;
    for (i, &b) in rest.iter().enumerate() {
        if shift > 28 {
            return Err(H2Error::Compression);
        }
        value += usize::from(b & 0x7f) << shift;
        shift += 7;
        if b & 0x80 == 0 {
            return Ok((value, i + 2));
        }
    }
    Err(H2Error::Compression)
}

/// Static table (RFC 7541 Appendix A), indices 1..=61.
pub const STATIC_TABLE: [(&str, &str); 61] = [
    (":authority", ""),
    (":method", "GET"),
    (":method", "POST"),
    (":path", "/"),
    (":path", "/index.html"),
    (":scheme", "http"),
    (":scheme", "https"),
    (":status", "200"),
    (":status", "204"),
    (":status", "206"),
    (":status", "304"),
    (":status", "400"),
    (":status", "404"),
    (":status", "500"),
    ("accept-charset", ""),
    ("accept-encoding", "gzip, deflate"),
    ("accept-language", ""),
    ("accept-ranges", ""),
    ("accept", ""),
    ("access-control-allow-origin", ""),
    ("age", ""),
    ("allow", ""),
    ("authorization", ""),
    ("cache-control", ""),
    ("content-disposition", ""),
    ("content-encoding", ""),
    ("content-language", ""),
    ("content-length", ""),
    ("content-location", ""),
    ("content-range", ""),
    ("content-type", ""),
    ("cookie", ""),
    ("date", ""),
    ("etag", ""),
    ("expect", ""),
    ("expires", ""),
    ("from", ""),
    ("host", ""),
    ("if-match", ""),
    ("if-modified-since", ""),
    ("if-none-match", ""),
    ("if-range", ""),
    ("if-unmodified-since", ""),
    ("last-modified", ""),
    ("link", ""),
    ("location", ""),
    ("max-forwards", ""),
    ("proxy-authenticate", ""),
    ("proxy-authorization", ""),
    ("range", ""),
    ("referer", ""),
    ("refresh", ""),
    ("retry-after", ""),
    ("server", ""),
    ("set-cookie", ""),
    ("strict-transport-security", ""),
    ("transfer-encoding", ""),
    ("user-agent", ""),
    ("vary", ""),
    ("via", ""),
    ("www-authenticate", ""),
];

/// FIFO of recently indexed fields; index 0 is the newest entry.
#[derive(Debug, Clone)]
pub struct DynamicTable {
    entries: VecDeque<HeaderField>,
    size: usize,
    max_size: usize,
}

impl DynamicTable {
    pub fn new(max_size: usize) -> Self {
        Self { entries: VecDeque::new(), size: 0, max_size }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&HeaderField> {
        self.entries.get(index)
    }

    /// Insert at the front, evicting the oldest entries until it fits.
    /// An entry larger than the whole table empties it and is not stored.
    pub fn insert(&mut self, field: HeaderField) {
        let size = field.size();
        if size > self.max_size {
            self.entries.clear();
            self.size = 0;
            return;
        }
        self.evict_to(self.max_size - size);
        self.size += size;
        self.entries.push_front(field);
    }

    pub fn set_max_size(&mut self, max_size: usize) {
        self.max_size = max_size;
        self.evict_to(max_size);
    }

    fn evict_to(&mut self, target: usize) {
        while self.size > target {
            match self.entries.pop_back() {
                Some(old) => self.size -= old.size(),
                None => break,
            }
        }
    }

    fn find(&self, field: &HeaderField) -> (Option<usize>, Option<usize>) {
        let mut name_match = None;
        for (i, entry) in self.entries.iter().enumerate() {
            if entry.name == field.name {
                if entry.value == field.value {
                    return (Some(i), name_match.or(Some(i)));
                }
                name_match.get_or_insert(i);
            }
        }
        (None, name_match)
    }
}

fn static_find(field: &HeaderField) -> (Option<usize>, Option<usize>) {
    let mut name_match = None;
    for (i, (name, value)) in STATIC_TABLE.iter().enumerate() {
        if name.as_bytes() == field.name.as_slice() {
            if value.as_bytes() == field.value.as_slice() {
                return (Some(i + 1), name_match.or(Some(i + 1)));
            }
            name_match.get_or_insert(i + 1);
        }
    }
    (None, name_match)
}

fn encode_string(buf: &mut Vec<u8>, data: &[u8]) {
    let huffman_len = huffman::encoded_len(data);
    if huffman_len < data.len() {
        encode_prefix_int(buf, huffman_len, 7, 0x80);
        huffman::encode(data, buf);
    } else {
        encode_prefix_int(buf, data.len(), 7, 0x00);
        buf.extend_from_slice(data);
    }
}

/// HPACK encoder for one direction of a connection.
#[derive(Debug, Clone)]
pub struct Encoder {
    table: DynamicTable,
    /// Smallest and final size requested since the last header block.
    pending_size_update: Option<(usize, usize)>,
}

impl Default for Encoder {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl Encoder {
    pub fn new(max_table_size: usize) -> Self {
        Self { table: DynamicTable::new(max_table_size), pending_size_update: None }
    }

    pub fn table(&self) -> &DynamicTable {
        &self.table
    }

    /// Follow the peer's SETTINGS_HEADER_TABLE_SIZE. The change is signalled
    /// at the start of the next header block.
    pub fn set_max_table_size(&mut self, size: usize) {
        self.pending_size_update = Some(match self.pending_size_update {
            Some((min, _)) => (min.min(size), size),
            None => (size, size),
        });
    }

    /// Encode a complete header block.
    pub fn encode(&mut self, headers: &[HeaderField], out: &mut Vec<u8>) {
        if let Some((min, last)) = self.pending_size_update.take() {
            if min < last {
                self.table.set_max_size(min);
                encode_prefix_int(out, min, 5, 0x20);
            }
            self.table.set_max_size(last);
            encode_prefix_int(out, last, 5, 0x20);
        }
        for field in headers {
            self.encode_field(field, out);
        }
    }

    fn encode_field(&mut self, field: &HeaderField, out: &mut Vec<u8>) {
        let (static_exact, static_name) = static_find(field);
        let (dynamic_exact, dynamic_name) = self.table.find(field);

        if field.is_sensitive() {
            // Literal never indexed, name by index when possible.
            let name_index = static_name.or(dynamic_name.map(|i| i + STATIC_TABLE.len() + 1));
            self.encode_literal(out, field, name_index, 4, 0x10);
            return;
        }

        if let Some(index) = static_exact {
            encode_prefix_int(out, index, 7, 0x80);
            return;
        }
        if let Some(index) = dynamic_exact {
            encode_prefix_int(out, index + STATIC_TABLE.len() + 1, 7, 0x80);
            return;
        }

        let name_index = static_name.or(dynamic_name.map(|i| i + STATIC_TABLE.len() + 1));
        if field.size() <= self.table.max_size() {
            self.encode_literal(out, field, name_index, 6, 0x40);
            self.table.insert(field.clone());
        } else {
            // Would only flush the table; send without indexing.
            self.encode_literal(out, field, name_index, 4, 0x00);
        }
    }

    fn encode_literal(
        &self,
        out: &mut Vec<u8>,
        field: &HeaderField,
        name_index: Option<usize>,
        prefix_bits: u8,
        pattern: u8,
    ) {
        match name_index {
            Some(index) => encode_prefix_int(out, index, prefix_bits, pattern),
            None => {
                out.push(pattern);
                encode_string(out, &field.name);
            }
        }
        encode_string(out, &field.value);
    }
}

/// HPACK decoder for one direction of a connection.
#[derive(Debug, Clone)]
pub struct Decoder {
    table: DynamicTable,
    /// Upper bound on table size updates: our advertised header table size.
    max_allowed_size: usize,
    max_header_list_size: usize,
}

impl Default for Decoder {
    fn default() -> Self {
        Self::new(4096)
    }
}

impl Decoder {
    pub fn new(max_table_size: usize) -> Self {
        Self {
            table: DynamicTable::new(max_table_size),
            max_allowed_size: max_table_size,
            max_header_list_size: usize::MAX,
        }
    }

    pub fn with_max_header_list_size(mut self, size: usize) -> Self {
        self.max_header_list_size = size;
        self
    }

    pub fn table(&self) -> &DynamicTable {
        &self.table
    }

    fn lookup(&self, index: usize) -> Result<HeaderField, H2Error> {
        match index {
            0 => Err(H2Error::Compression),
            1..=61 => {
                let (name, value) = STATIC_TABLE[index - 1];
                Ok(HeaderField::new(name, value))
            }
            _ => self
                .table
                .get(index - STATIC_TABLE.len() - 1)
                .cloned()
                .ok_or(H2Error::Compression),
        }
    }

    /// Decode a complete header block. Every failure is connection-fatal.
    pub fn decode(&mut self, block: &[u8]) -> Result<Vec<HeaderField>, H2Error> {
        let mut headers = Vec::new();
        let mut list_size = 0usize;
        let mut pos = 0;
        let mut size_update_allowed = true;

        while pos < block.len() {
            let byte = block[pos];
            let field = if byte & 0x80 != 0 {
                // Indexed header field.
                let (index, used) = decode_prefix_int(&block[pos..], 7)?;
                pos += used;
                self.lookup(index)?
            } else if byte & 0x40 != 0 {
                // Literal with incremental indexing.
                let (field, used) = self.decode_literal(&block[pos..], 6)?;
                pos += used;
                self.table.insert(field.clone());
                field
            } else if byte & 0x20 != 0 {
                // Dynamic table size update, only before the first field.
                if !size_update_allowed {
                    return Err(H2Error::Compression);
                }
                let (size, used) = decode_prefix_int(&block[pos..], 5)?;
                pos += used;
                if size > self.max_allowed_size {
                    return Err(H2Error::Compression);
                }
                self.table.set_max_size(size);
                continue;
            } else {
                // Literal without indexing (0000) or never indexed (0001).
                let (field, used) = self.decode_literal(&block[pos..], 4)?;
                pos += used;
                field
            };

            size_update_allowed = false;
            list_size += field.size();
            if list_size > self.max_header_list_size {
                return Err(H2Error::Protocol("header list too large"));
            }
            headers.push(field);
        }
        Ok(headers)
    }

    fn decode_literal(&self, buf: &[u8], prefix_bits: u8) -> Result<(HeaderField, usize), H2Error> {
        let (index, mut pos) = decode_prefix_int(buf, prefix_bits)?;
        let name = if index == 0 {
            let (name, used) = decode_string(&buf[pos..])?;
            pos += used;
            name
        } else {
            self.lookup(index)?.name
        };
        let (value, used) = decode_string(&buf[pos..])?;
        pos += used;
        Ok((HeaderField { name, value }, pos))
    }
}

fn decode_string(buf: &[u8]) -> Result<(Vec<u8>, usize), H2Error> {
    let first = *buf.first().ok_or(H2Error::Compression)?;
    let (len, used) = decode_prefix_int(buf, 7)?;
    let end = used.checked_add(len).ok_or(H2Error::Compression)?;
    let raw = buf.get(used..end).ok_or(H2Error::Compression)?;
    let data = if first & 0x80 != 0 { huffman::decode(raw)? } else { raw.to_vec() };
    Ok((data, end))
}
