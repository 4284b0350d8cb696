//! Flow-control window accounting (RFC 7540 Section 6.9).

use super::error::H2Error;
use super::settings::MAX_WINDOW_SIZE;

/// Initial window size for connections and streams.
pub const DEFAULT_WINDOW_SIZE: i64 = 65_535;

/// A receive window below this many bytes triggers a WINDOW_UPDATE.
pub const WINDOW_UPDATE_THRESHOLD: i64 = 32_768;

/// A send or receive window.
///
/// Consuming never drives the window below zero. Only a SETTINGS change to
/// INITIAL_WINDOW_SIZE can make a send window negative (RFC 7540 Section 6.9.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowControl {
    window: i64,
}

impl FlowControl {
    pub fn new(initial: i64) -> Self {
        Self { window: initial }
    }

    pub fn window(&self) -> i64 {
        self.window
    }

    /// Bytes that may be sent right now.
    pub fn available(&self) -> usize {
        usize::try_from(self.window.max(0)).unwrap_or(0)
    }

    pub fn consume(&mut self, amount: u32) -> Result<(), H2Error> {
        let new = self.window - i64::from(amount);
        if new < 0 {
            return Err(H2Error::FlowControl);
        }
        self.window = new;
        Ok(())
    }

    /// Apply a WINDOW_UPDATE increment.
    pub fn increase(&mut self, increment: u32) -> Result<(), H2Error> {
        let new = self.window + i64::from(increment);
        if new > i64::from(MAX_WINDOW_SIZE) {
            return Err(H2Error::FlowControl);
        }
        self.window = new;
        Ok(())
    }

    /// Shift the window by `new_initial - old_initial` after a SETTINGS change.
    pub fn adjust(&mut self, delta: i64) -> Result<(), H2Error> {
        let new = self.window + delta;
        if new > i64::from(MAX_WINDOW_SIZE) {
            return Err(H2Error::FlowControl);
        }
        self.window = new;
        Ok(())
    }

    /// For a receive window: once it falls below the low-water mark, return
    /// the increment that restores it to `target` and credit it locally.
    pub fn take_update(&mut self, target: i64) -> Option<u32> {
        if self.window >= WINDOW_UPDATE_THRESHOLD.min(target) {
            return None;
        }
        let increment = u32::try_from(target - self.window).ok()?;
        if increment == 0 {
            return None;
        }
        self.window = target;
        Some(increment)
    }
}

impl Default for FlowControl {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW_SIZE)
    }
}
