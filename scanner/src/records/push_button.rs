//! Parsed view over the `get-push-button-status` reply.
//!
//! Only the most recent push event is exposed; the protocol gives no way
//! to tell when it happened or to enumerate events that occurred in
//! between (open question carried over from the source, see `DESIGN.md`).

use crate::codes::push_button_size;
use crate::wire;

/// Size of the `get-push-button-status` reply.
pub const SIZE: usize = 1;

const RESERVED_MASK: u8 = 0x0c;
const RESERVED_SIZE: u8 = 0xe0;

/// Parsed, read-only view over a 1-byte push-button-status reply.
#[derive(Debug, Clone)]
pub struct PushButtonStatus {
    byte: u8,
}

impl PushButtonStatus {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        debug_assert!(bytes.len() >= SIZE, "push-button-status reply too short");
        Self { byte: bytes[0] }
    }

    /// Runs the pedantic-mode reserved-bit check, plus a `brief`-level log
    /// (debug, here) for the reserved `document-size` encoding.
    pub fn check_reserved_bits(&self) {
        wire::check_reserved_bits(self.byte, !RESERVED_MASK, "push-button-status.flags");
        if self.byte & RESERVED_SIZE == RESERVED_SIZE {
            tracing::debug!(target: "esci::pedantic", byte = self.byte, "reserved document size");
        }
    }

    /// The device-side requested scan-area size code, top 3 bits.
    /// [`push_button_size::CUSTOM`] means the device did not indicate a
    /// size and the driver's own scan-area options should be used.
    pub fn size_request(&self) -> u8 {
        self.byte >> 5
    }

    /// Whether the device will scan in duplex mode.
    pub fn is_duplexing(&self) -> bool {
        self.byte & 0x10 != 0
    }

    /// Status of the most recent push event; `0x00` means no button was
    /// pushed. Values up to `0x03` are documented but undeciphered.
    pub fn status(&self) -> u8 {
        self.byte & 0x03
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_custom_size_request_by_default() {
        let status = PushButtonStatus::from_bytes(vec![0x00]);
        assert_eq!(status.size_request(), push_button_size::CUSTOM);
        assert!(!status.is_duplexing());
        assert_eq!(status.status(), 0);
    }

    #[test]
    fn decodes_duplex_and_size_request() {
        let status = PushButtonStatus::from_bytes(vec![(push_button_size::A4 << 5) | 0x10 | 0x01]);
        assert_eq!(status.size_request(), push_button_size::A4);
        assert!(status.is_duplexing());
        assert_eq!(status.status(), 0x01);
    }
}
