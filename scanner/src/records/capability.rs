//! Parsed view over the `get-extended-identity` reply.

use crate::wire;

const SIZE: usize = 80;

const COMMAND_LEVEL: usize = 0;
const BASE_RESOLUTION: usize = 4;
const MIN_RESOLUTION: usize = 8;
const MAX_RESOLUTION: usize = 12;
const MAX_SCAN_WIDTH: usize = 16;
const MAIN_AREA: usize = 20;
const ADF_AREA: usize = 28;
const TPU_AREA: usize = 68;
const CAPABILITY_FLAGS_1: usize = 44;
const CAPABILITY_FLAGS_2: usize = 45;
const PRODUCT_NAME: usize = 46;
const PRODUCT_NAME_LEN: usize = 16;
const ROM_VERSION: usize = 62;
const ROM_VERSION_LEN: usize = 4;
const INPUT_BIT_DEPTH: usize = 66;
const OUTPUT_BIT_DEPTH: usize = 67;
const DOCUMENT_ALIGNMENT: usize = 76;

/// Capability flag bits within [`CAPABILITY_FLAGS_1`].
mod flag1 {
    pub const FLATBED: u8 = 0x01;
    pub const ADF: u8 = 0x02;
    pub const ADF_DUPLEX: u8 = 0x04;
    pub const TPU: u8 = 0x08;
    pub const TPU_IR: u8 = 0x10;
    pub const LAMP_CHANGE: u8 = 0x20;
    pub const PAGE_END_DETECTION: u8 = 0x40;
    pub const AUTO_POWER_OFF: u8 = 0x80;
}

/// Capability flag bits within [`CAPABILITY_FLAGS_2`].
mod flag2 {
    pub const QUIET_MODE: u8 = 0x01;
    pub const COMPOUND_COMMANDS: u8 = 0x02;
    pub const DOUBLE_FEED_DETECTION: u8 = 0x04;
    pub const AUTHENTICATION: u8 = 0x08;
}

/// The maximum scan area (in pixels at the device's base resolution) for
/// one physical source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceArea {
    pub tl_x: u16,
    pub tl_y: u16,
    pub br_x: u16,
    pub br_y: u16,
}

fn read_area(buf: &[u8]) -> SourceArea {
    SourceArea {
        tl_x: wire::to_u16(&buf[0..2]),
        tl_y: wire::to_u16(&buf[2..4]),
        br_x: wire::to_u16(&buf[4..6]),
        br_y: wire::to_u16(&buf[6..8]),
    }
}

/// Parsed, read-only view over the extended-identity reply. Read once at
/// scanner construction and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Capability {
    bytes: Vec<u8>,
}

impl Capability {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        debug_assert!(bytes.len() >= SIZE, "extended-identity reply too short");
        Self { bytes }
    }

    pub fn command_level(&self) -> String {
        String::from_utf8_lossy(&self.bytes[COMMAND_LEVEL..COMMAND_LEVEL + 2]).into_owned()
    }

    pub fn base_resolution(&self) -> u32 {
        wire::to_u32(&self.bytes[BASE_RESOLUTION..])
    }

    pub fn min_resolution(&self) -> u32 {
        wire::to_u32(&self.bytes[MIN_RESOLUTION..])
    }

    pub fn max_resolution(&self) -> u32 {
        wire::to_u32(&self.bytes[MAX_RESOLUTION..])
    }

    pub fn max_scan_width(&self) -> u32 {
        wire::to_u32(&self.bytes[MAX_SCAN_WIDTH..])
    }

    pub fn main_area(&self) -> SourceArea {
        read_area(&self.bytes[MAIN_AREA..])
    }

    pub fn adf_area(&self) -> SourceArea {
        read_area(&self.bytes[ADF_AREA..])
    }

    pub fn tpu_area(&self) -> SourceArea {
        read_area(&self.bytes[TPU_AREA..])
    }

    pub fn has_flatbed(&self) -> bool {
        self.bytes[CAPABILITY_FLAGS_1] & flag1::FLATBED != 0
    }

    pub fn has_adf(&self) -> bool {
        self.bytes[CAPABILITY_FLAGS_1] & flag1::ADF != 0
    }

    pub fn has_adf_duplex(&self) -> bool {
        self.bytes[CAPABILITY_FLAGS_1] & flag1::ADF_DUPLEX != 0
    }

    pub fn has_tpu(&self) -> bool {
        self.bytes[CAPABILITY_FLAGS_1] & flag1::TPU != 0
    }

    pub fn has_tpu_ir(&self) -> bool {
        self.bytes[CAPABILITY_FLAGS_1] & flag1::TPU_IR != 0
    }

    pub fn supports_lamp_change(&self) -> bool {
        self.bytes[CAPABILITY_FLAGS_1] & flag1::LAMP_CHANGE != 0
    }

    pub fn detects_page_end(&self) -> bool {
        self.bytes[CAPABILITY_FLAGS_1] & flag1::PAGE_END_DETECTION != 0
    }

    pub fn has_auto_power_off(&self) -> bool {
        self.bytes[CAPABILITY_FLAGS_1] & flag1::AUTO_POWER_OFF != 0
    }

    pub fn supports_quiet_mode(&self) -> bool {
        self.bytes[CAPABILITY_FLAGS_2] & flag2::QUIET_MODE != 0
    }

    pub fn supports_compound_commands(&self) -> bool {
        self.bytes[CAPABILITY_FLAGS_2] & flag2::COMPOUND_COMMANDS != 0
    }

    pub fn detects_double_feed(&self) -> bool {
        self.bytes[CAPABILITY_FLAGS_2] & flag2::DOUBLE_FEED_DETECTION != 0
    }

    pub fn supports_authentication(&self) -> bool {
        self.bytes[CAPABILITY_FLAGS_2] & flag2::AUTHENTICATION != 0
    }

    pub fn product_name(&self) -> String {
        trim_padding(&self.bytes[PRODUCT_NAME..PRODUCT_NAME + PRODUCT_NAME_LEN])
    }

    pub fn rom_version(&self) -> String {
        trim_padding(&self.bytes[ROM_VERSION..ROM_VERSION + ROM_VERSION_LEN])
    }

    pub fn input_bit_depth(&self) -> u8 {
        self.bytes[INPUT_BIT_DEPTH]
    }

    pub fn output_bit_depth(&self) -> u8 {
        self.bytes[OUTPUT_BIT_DEPTH]
    }

    pub fn document_alignment(&self) -> u8 {
        self.bytes[DOCUMENT_ALIGNMENT]
    }
}

fn trim_padding(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf).trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        let mut bytes = vec![0u8; SIZE];
        bytes[COMMAND_LEVEL] = b'D';
        bytes[COMMAND_LEVEL + 1] = b'1';
        wire::from_u32(&mut bytes[BASE_RESOLUTION..], 600);
        wire::from_u32(&mut bytes[MAX_RESOLUTION..], 1200);
        bytes[CAPABILITY_FLAGS_1] = flag1::FLATBED | flag1::ADF;
        bytes[PRODUCT_NAME..PRODUCT_NAME + 8].copy_from_slice(b"Scanner ");
        bytes
    }

    #[test]
    fn parses_scalar_fields() {
        let cap = Capability::from_bytes(sample());
        assert_eq!(cap.command_level(), "D1");
        assert_eq!(cap.base_resolution(), 600);
        assert_eq!(cap.max_resolution(), 1200);
    }

    #[test]
    fn parses_capability_flags() {
        let cap = Capability::from_bytes(sample());
        assert!(cap.has_flatbed());
        assert!(cap.has_adf());
        assert!(!cap.has_tpu());
    }

    #[test]
    fn trims_trailing_whitespace_from_strings() {
        let cap = Capability::from_bytes(sample());
        assert_eq!(cap.product_name(), "Scanner");
    }
}
