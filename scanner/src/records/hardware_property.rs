//! Parsed view over the `get-hardware-property` reply.
//!
//! `D#`-level scanners support this additional capability query: sensor
//! structure plus two resolution sets that supersede
//! [`crate::records::capability::Capability`]'s own resolution range. Several
//! fields here are undocumented upstream (see `DESIGN.md`); this record
//! exposes them as raw accessors rather than guessing their meaning.

use crate::wire;

/// Reply buffer size. The trailing bytes hold a zero-terminated list of
/// main-direction resolutions followed by a zero-terminated list of
/// sub-direction resolutions; this bound comfortably covers the resolution
/// counts seen on real devices.
pub const SIZE: usize = 48;

const BASE_RESOLUTION: usize = 0;
const SENSOR: usize = 2;
const COLOR_SEQUENCE: usize = 3;
const LINE_SPACING: usize = 4;
const RESOLUTIONS: usize = 14;

mod reserved {
    pub const BYTES: [usize; 8] = [6, 7, 8, 9, 10, 11, 12, 13];
}

/// The device's color sequence, as reported by [`HardwareProperty::color_sequence`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorSequence {
    Rgb,
}

/// A color component, for [`HardwareProperty::line_number`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorComponent {
    Red,
    Green,
    Blue,
}

/// Parsed, read-only view over a `get-hardware-property` reply.
#[derive(Debug, Clone)]
pub struct HardwareProperty {
    bytes: Vec<u8>,
}

impl HardwareProperty {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        debug_assert!(bytes.len() >= RESOLUTIONS + 2, "hardware-property reply too short");
        Self { bytes }
    }

    /// Runs the pedantic-mode reserved-bit check over the 8 fully-reserved
    /// bytes at offsets 6..=13 (logged only, never raised).
    pub fn check_reserved_bits(&self) {
        for &offset in &reserved::BYTES {
            wire::check_reserved_bits(self.bytes[offset], 0x00, "hardware-property.reserved");
        }
    }

    /// The device's base resolution. Not necessarily the same as
    /// [`crate::records::capability::Capability::base_resolution`].
    pub fn base_resolution(&self) -> u32 {
        u32::from(wire::to_u16(&self.bytes[BASE_RESOLUTION..]))
    }

    /// Whether the device uses a contact image sensor.
    pub fn is_cis(&self) -> bool {
        self.bytes[SENSOR] & 0x80 == 0
    }

    /// The sensor type; normally `1` per the protocol documentation, but
    /// its exact meaning is not otherwise pinned down.
    pub fn sensor_type(&self) -> u8 {
        self.bytes[SENSOR] & 0x40
    }

    /// The device's color sequence. Any value other than `0` is
    /// undocumented and is surfaced as `None` rather than guessed at.
    pub fn color_sequence(&self) -> Option<ColorSequence> {
        if self.bytes[COLOR_SEQUENCE] == 0 {
            Some(ColorSequence::Rgb)
        } else {
            None
        }
    }

    /// The device's line number for color component `c`; see §9's open
    /// question on this field's exact semantics. Exposed raw.
    pub fn line_number(&self, c: ColorComponent) -> u8 {
        let shift = match c {
            ColorComponent::Red => 4,
            ColorComponent::Green => 2,
            ColorComponent::Blue => 0,
        };
        0x03 & (self.bytes[SENSOR] >> shift)
    }

    /// Base line spacing `(main, sub)`, relating scan resolution to the
    /// distance in scan lines between a pixel's color components.
    pub fn line_spacing(&self) -> (u8, u8) {
        (self.bytes[LINE_SPACING], self.bytes[LINE_SPACING + 1])
    }

    /// Available resolutions in the main (x) direction.
    pub fn x_resolutions(&self) -> Vec<u32> {
        resolutions(&self.bytes[RESOLUTIONS..])
    }

    /// Available resolutions in the sub (y) direction; the list
    /// immediately following the zero-terminated x-resolution list.
    pub fn y_resolutions(&self) -> Vec<u32> {
        let mut offset = RESOLUTIONS;
        while offset + 1 < self.bytes.len() && wire::to_u16(&self.bytes[offset..]) != 0 {
            offset += 2;
        }
        offset += 2;
        if offset >= self.bytes.len() {
            return Vec::new();
        }
        resolutions(&self.bytes[offset..])
    }
}

fn resolutions(buf: &[u8]) -> Vec<u32> {
    let mut result = Vec::new();
    let mut offset = 0;
    while offset + 1 < buf.len() {
        let value = wire::to_u16(&buf[offset..]);
        if value == 0 {
            break;
        }
        result.push(u32::from(value));
        offset += 2;
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        let mut bytes = vec![0u8; SIZE];
        wire::from_u16(&mut bytes[BASE_RESOLUTION..], 600);
        bytes[SENSOR] = 0x01; // cis, sensor_type 0, blue line number 1
        wire::from_u16(&mut bytes[RESOLUTIONS..], 300);
        wire::from_u16(&mut bytes[RESOLUTIONS + 2..], 600);
        wire::from_u16(&mut bytes[RESOLUTIONS + 4..], 1200);
        // x-resolution list terminates at offset RESOLUTIONS + 6
        wire::from_u16(&mut bytes[RESOLUTIONS + 8..], 300);
        wire::from_u16(&mut bytes[RESOLUTIONS + 10..], 600);
        bytes
    }

    #[test]
    fn parses_base_resolution_and_sensor() {
        let hw = HardwareProperty::from_bytes(sample());
        assert_eq!(hw.base_resolution(), 600);
        assert!(hw.is_cis());
        assert_eq!(hw.color_sequence(), Some(ColorSequence::Rgb));
    }

    #[test]
    fn parses_x_and_y_resolution_lists() {
        let hw = HardwareProperty::from_bytes(sample());
        assert_eq!(hw.x_resolutions(), vec![300, 600, 1200]);
        assert_eq!(hw.y_resolutions(), vec![300, 600]);
    }

    #[test]
    fn line_number_reads_two_bit_fields() {
        let hw = HardwareProperty::from_bytes(sample());
        assert_eq!(hw.line_number(ColorComponent::Red), 0);
        assert_eq!(hw.line_number(ColorComponent::Blue), 1);
    }
}
