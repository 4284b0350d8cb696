//! HTTP/2 SETTINGS parameters (RFC 7540 Section 6.5).
//!
//! A SETTINGS frame only carries the parameters that change, so a frame is
//! decoded into raw `(id, value)` pairs and then applied on top of the
//! settings already in effect.

use super::error::H2Error;
use bytes::BufMut;

pub const SETTINGS_HEADER_TABLE_SIZE: u16 = 0x1;
pub const SETTINGS_ENABLE_PUSH: u16 = 0x2;
pub const SETTINGS_MAX_CONCURRENT_STREAMS: u16 = 0x3;
pub const SETTINGS_INITIAL_WINDOW_SIZE: u16 = 0x4;
pub const SETTINGS_MAX_FRAME_SIZE: u16 = 0x5;
pub const SETTINGS_MAX_HEADER_LIST_SIZE: u16 = 0x6;

/// Largest legal flow-control window.
pub const MAX_WINDOW_SIZE: u32 = 0x7fff_ffff;
/// Default frame payload limit; also the smallest legal MAX_FRAME_SIZE.
pub const DEFAULT_MAX_FRAME_SIZE: u32 = 16_384;
const MAX_MAX_FRAME_SIZE: u32 = 16_777_215;

/// One SETTINGS parameter as it appears on the wire.
pub type Setting = (u16, u32);

/// Settings in effect for one direction of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct H2Settings {
    /// SETTINGS_HEADER_TABLE_SIZE (0x1) - HPACK dynamic table size
    pub header_table_size: u32,
    /// SETTINGS_ENABLE_PUSH (0x2)
    pub enable_push: bool,
    /// SETTINGS_MAX_CONCURRENT_STREAMS (0x3), `None` is unlimited
    pub max_concurrent_streams: Option<u32>,
    /// SETTINGS_INITIAL_WINDOW_SIZE (0x4)
    pub initial_window_size: u32,
    /// SETTINGS_MAX_FRAME_SIZE (0x5)
    pub max_frame_size: u32,
    /// SETTINGS_MAX_HEADER_LIST_SIZE (0x6), `None` is unlimited
    pub max_header_list_size: Option<u32>,
}

impl Default for H2Settings {
    /// What this client advertises: push off, 64 KiB header lists.
    fn default() -> Self {
        Self {
            header_table_size: 4096,
            enable_push: false,
            max_concurrent_streams: None,
            initial_window_size: 65_535,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_header_list_size: Some(65_536),
        }
    }
}

impl H2Settings {
    /// Initial values assumed for the peer until its SETTINGS frame arrives.
    pub fn protocol_default() -> Self {
        Self {
            header_table_size: 4096,
            enable_push: true,
            max_concurrent_streams: None,
            initial_window_size: 65_535,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            max_header_list_size: None,
        }
    }

    /// Parameters to put in our SETTINGS frame.
    pub fn to_params(&self) -> Vec<Setting> {
        let mut params = vec![
            (SETTINGS_HEADER_TABLE_SIZE, self.header_table_size),
            (SETTINGS_ENABLE_PUSH, u32::from(self.enable_push)),
        ];
        if let Some(v) = self.max_concurrent_streams {
            params.push((SETTINGS_MAX_CONCURRENT_STREAMS, v));
        }
        params.push((SETTINGS_INITIAL_WINDOW_SIZE, self.initial_window_size));
        params.push((SETTINGS_MAX_FRAME_SIZE, self.max_frame_size));
        if let Some(v) = self.max_header_list_size {
            params.push((SETTINGS_MAX_HEADER_LIST_SIZE, v));
        }
        params
    }

    /// Apply parameters received from the peer, validating each one.
    pub fn apply(&mut self, params: &[Setting]) -> Result<(), H2Error> {
        for &(id, value) in params {
            match id {
                SETTINGS_HEADER_TABLE_SIZE => self.header_table_size = value,
                SETTINGS_ENABLE_PUSH => {
                    if value > 1 {
                        return Err(H2Error::Protocol("ENABLE_PUSH must be 0 or 1"));
                    }
                    self.enable_push = value == 1;
                }
                SETTINGS_MAX_CONCURRENT_STREAMS => self.max_concurrent_streams = Some(value),
                SETTINGS_INITIAL_WINDOW_SIZE => {
                    if value > MAX_WINDOW_SIZE {
                        return Err(H2Error::FlowControl);
                    }
                    self.initial_window_size = value;
                }
                SETTINGS_MAX_FRAME_SIZE => {
                    if !(DEFAULT_MAX_FRAME_SIZE..=MAX_MAX_FRAME_SIZE).contains(&value) {
                        return Err(H2Error::Protocol("MAX_FRAME_SIZE out of range"));
                    }
                    self.max_frame_size = value;
                }
                SETTINGS_MAX_HEADER_LIST_SIZE => self.max_header_list_size = Some(value),
                // Unknown settings MUST be ignored (RFC 7540 Section 6.5.2).
                _ => {}
            }
        }
        Ok(())
    }
}

/// Encode parameters as 6-byte (id, value) pairs.
pub fn encode_params(params: &[Setting], buf: &mut impl BufMut) {
    for &(id, value) in params {
        buf.put_u16(id);
        buf.put_u32(value);
    }
}

/// Decode a SETTINGS payload into its parameters.
pub fn decode_params(payload: &[u8]) -> Result<Vec<Setting>, H2Error> {
    if payload.len() % 6 != 0 {
        return Err(H2Error::FrameSize);
    }
    Ok(payload
        .chunks_exact(6)
        .map(|c| {
            (
                u16::from_be_bytes([c[0], c[1]]),
                u32::from_be_bytes([c[2], c[3], c[4], c[5]]),
            )
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_defaults() {
        let s = H2Settings::default();
        assert_eq!(s.header_table_size, 4096);
        assert!(!s.enable_push);
        assert_eq!(s.initial_window_size, 65_535);
        assert_eq!(s.max_frame_size, 16_384);
        assert_eq!(s.max_header_list_size, Some(65_536));
    }

    #[test]
    fn test_apply_only_changes_listed_params() {
        let mut s = H2Settings::protocol_default();
        s.apply(&[(SETTINGS_MAX_CONCURRENT_STREAMS, 100)]).unwrap();
        assert_eq!(s.max_concurrent_streams, Some(100));
        assert_eq!(s.initial_window_size, 65_535);
        assert!(s.enable_push);
    }

    #[test]
    fn test_params_wire_format() {
        let mut buf = Vec::new();
        encode_params(&H2Settings::default().to_params(), &mut buf);
        assert_eq!(buf.len() % 6, 0);
        assert_eq!(&buf[..6], &[0, 1, 0, 0, 0x10, 0]);

        let mut peer = H2Settings::protocol_default();
        peer.apply(&decode_params(&buf).unwrap()).unwrap();
        assert_eq!(peer, H2Settings::default());
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut s = H2Settings::protocol_default();
        assert!(s.apply(&[(SETTINGS_ENABLE_PUSH, 2)]).is_err());
        assert_eq!(s.apply(&[(SETTINGS_INITIAL_WINDOW_SIZE, 0x8000_0000)]), Err(H2Error::FlowControl));
        assert!(s.apply(&[(SETTINGS_MAX_FRAME_SIZE, 100)]).is_err());
        assert_eq!(decode_params(&[0, 1, 0]), Err(H2Error::FrameSize));
    }

    #[test]
    fn test_unknown_setting_ignored() {
        let mut s = H2Settings::protocol_default();
        s.apply(&[(0xff, 42)]).unwrap();
        assert_eq!(s, H2Settings::protocol_default());
    }
}
