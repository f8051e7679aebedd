//! Parsed view over the `get-scanner-status` / `get-extended-status` reply.
//!
//! Field layout below is this driver's own encoding of the status bits the
//! component design calls for (general/warm-up flags, then per-source
//! presence/error/cover/media flags, then detected media-size codes); see
//! `DESIGN.md` for why the exact bit numbering was chosen rather than
//! inherited verbatim.

use crate::dictionary::{self, PaperSize};
use crate::wire;

const SIZE: usize = 16;

const GENERAL: usize = 0;
const MAIN: usize = 1;
const ADF: usize = 2;
const TPU1: usize = 3;
const TPU2: usize = 4;
const MAIN_MEDIA_SIZE: usize = 5;
const ADF_MEDIA_SIZE: usize = 7;
const HOLDER_TYPE: usize = 9;
const HOLDER_ERROR: usize = 10;

mod general {
    pub const FATAL_ERROR: u8 = 0x80;
    pub const NOT_READY: u8 = 0x40;
    pub const WARMING_UP: u8 = 0x20;
    pub const CANNOT_CANCEL_WARMING_UP: u8 = 0x10;
}

mod source {
    pub const ENABLED: u8 = 0x01;
    pub const ERROR: u8 = 0x02;
    pub const COVER_OPEN: u8 = 0x04;
    pub const MEDIA_OUT: u8 = 0x08;
    pub const MEDIA_JAM: u8 = 0x10;
    pub const DOUBLE_FEED: u8 = 0x20;
    pub const TRAY_OPEN: u8 = 0x40;
    pub const DUPLEXING: u8 = 0x80;
}

/// Which physical source a per-source status query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Source {
    Main,
    Adf,
    Tpu1,
    Tpu2,
}

/// Parsed, read-only view over a 16-byte scanner-status reply.
#[derive(Debug, Clone)]
pub struct Status {
    bytes: Vec<u8>,
}

impl Status {
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        debug_assert!(bytes.len() >= SIZE, "scanner-status reply too short");
        Self { bytes }
    }

    pub fn detected_fatal_error(&self) -> bool {
        self.bytes[GENERAL] & general::FATAL_ERROR != 0
    }

    pub fn is_ready(&self) -> bool {
        self.bytes[GENERAL] & general::NOT_READY == 0
    }

    pub fn is_warming_up(&self) -> bool {
        self.bytes[GENERAL] & general::WARMING_UP != 0
    }

    pub fn can_cancel_warming_up(&self) -> bool {
        self.bytes[GENERAL] & general::CANNOT_CANCEL_WARMING_UP == 0
    }

    fn source_byte(&self, src: Source) -> u8 {
        let idx = match src {
            Source::Main => MAIN,
            Source::Adf => ADF,
            Source::Tpu1 => TPU1,
            Source::Tpu2 => TPU2,
        };
        self.bytes[idx]
    }

    pub fn source_enabled(&self, src: Source) -> bool {
        self.source_byte(src) & source::ENABLED != 0
    }

    pub fn source_error(&self, src: Source) -> bool {
        self.source_byte(src) & source::ERROR != 0
    }

    pub fn cover_open(&self, src: Source) -> bool {
        self.source_byte(src) & source::COVER_OPEN != 0
    }

    pub fn media_out(&self, src: Source) -> bool {
        self.source_byte(src) & source::MEDIA_OUT != 0
    }

    pub fn media_jam(&self, src: Source) -> bool {
        self.source_byte(src) & source::MEDIA_JAM != 0
    }

    pub fn double_feed(&self, src: Source) -> bool {
        self.source_byte(src) & source::DOUBLE_FEED != 0
    }

    pub fn tray_open(&self, src: Source) -> bool {
        self.source_byte(src) & source::TRAY_OPEN != 0
    }

    pub fn duplexing(&self, src: Source) -> bool {
        self.source_byte(src) & source::DUPLEXING != 0
    }

    pub fn main_media_size_code(&self) -> u16 {
        wire::to_u16(&self.bytes[MAIN_MEDIA_SIZE..])
    }

    pub fn adf_media_size_code(&self) -> u16 {
        wire::to_u16(&self.bytes[ADF_MEDIA_SIZE..])
    }

    pub fn main_media_size(&self) -> Option<PaperSize> {
        dictionary::paper_size_for(self.main_media_size_code())
    }

    pub fn adf_media_size(&self) -> Option<PaperSize> {
        dictionary::paper_size_for(self.adf_media_size_code())
    }

    pub fn holder_type(&self) -> u8 {
        self.bytes[HOLDER_TYPE]
    }

    pub fn holder_error(&self) -> bool {
        self.bytes[HOLDER_ERROR] != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Vec<u8> {
        vec![0u8; SIZE]
    }

    #[test]
    fn ready_by_default() {
        let status = Status::from_bytes(sample());
        assert!(status.is_ready());
        assert!(!status.detected_fatal_error());
        assert!(!status.is_warming_up());
    }

    #[test]
    fn per_source_flags_are_independent() {
        let mut bytes = sample();
        bytes[ADF] = source::MEDIA_OUT | source::ENABLED;
        let status = Status::from_bytes(bytes);
        assert!(status.media_out(Source::Adf));
        assert!(status.source_enabled(Source::Adf));
        assert!(!status.media_out(Source::Main));
    }

    #[test]
    fn unknown_media_size_resolves_to_none() {
        let status = Status::from_bytes(sample());
        assert_eq!(status.main_media_size(), None);
    }
}
