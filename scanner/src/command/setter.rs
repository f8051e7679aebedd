//! Setter commands: a two-stage handshake of command bytes then parameter
//! bytes, each acknowledged separately.

use crate::connexion::Connexion;
use crate::error::ScanError;
use crate::wire::{ACK, NAK};

/// `set-option-unit`: `{ESC, 'e'}`.
pub const SET_OPTION_UNIT: [u8; 2] = [0x1b, b'e'];
/// `set-color-mode`: `{ESC, 'C'}`.
pub const SET_COLOR_MODE: [u8; 2] = [0x1b, b'C'];
/// `set-bit-depth`: `{ESC, 'D'}`.
pub const SET_BIT_DEPTH: [u8; 2] = [0x1b, b'D'];
/// `set-mirroring`: `{ESC, 'K'}`.
pub const SET_MIRRORING: [u8; 2] = [0x1b, b'K'];
/// `set-sharpness`: `{ESC, 'Q'}`.
pub const SET_SHARPNESS: [u8; 2] = [0x1b, b'Q'];
/// `set-brightness`: `{ESC, 'L'}`.
pub const SET_BRIGHTNESS: [u8; 2] = [0x1b, b'L'];
/// `set-gamma-correction`: `{ESC, 'Z'}`.
pub const SET_GAMMA_CORRECTION: [u8; 2] = [0x1b, b'Z'];
/// `set-color-correction`: `{ESC, 'M'}`.
pub const SET_COLOR_CORRECTION: [u8; 2] = [0x1b, b'M'];
/// `set-halftone-processing`: `{ESC, 'B'}`.
pub const SET_HALFTONE_PROCESSING: [u8; 2] = [0x1b, b'B'];
/// `set-auto-area-segmentation`: `{ESC, 's'}`.
pub const SET_AUTO_AREA_SEGMENTATION: [u8; 2] = [0x1b, b's'];
/// `set-threshold`: `{ESC, 't'}`.
pub const SET_THRESHOLD: [u8; 2] = [0x1b, b't'];
/// `set-scan-mode`: `{ESC, 'g'}`.
pub const SET_SCAN_MODE: [u8; 2] = [0x1b, b'g'];
/// `set-line-count`: `{ESC, 'd'}`.
pub const SET_LINE_COUNT: [u8; 2] = [0x1b, b'd'];
/// `set-film-type`: `{ESC, 'N'}`.
pub const SET_FILM_TYPE: [u8; 2] = [0x1b, b'N'];
/// `set-focus-position`: `{ESC, 'p'}`.
pub const SET_FOCUS_POSITION: [u8; 2] = [0x1b, b'p'];
/// `set-energy-saving-time`: `{ESC, 'P'}`.
pub const SET_ENERGY_SAVING_TIME: [u8; 2] = [0x1b, b'P'];
/// `set-scan-area`: `{ESC, 'A'}`.
pub const SET_SCAN_AREA: [u8; 2] = [0x1b, b'A'];
/// `set-zoom`: `{ESC, 'H'}`.
pub const SET_ZOOM: [u8; 2] = [0x1b, b'H'];
/// `set-dither-pattern`: `{ESC, 'b'}`.
pub const SET_DITHER_PATTERN: [u8; 2] = [0x1b, b'b'];
/// `set-gamma-table`: `{ESC, 'z'}`.
pub const SET_GAMMA_TABLE: [u8; 2] = [0x1b, b'z'];
/// `set-color-matrix`: `{ESC, 'm'}`.
pub const SET_COLOR_MATRIX: [u8; 2] = [0x1b, b'm'];
/// `set-scan-parameters`: `{FS, 'W'}`.
pub const SET_SCAN_PARAMETERS: [u8; 2] = [0x1c, b'W'];

/// The two possible setter-handshake outcomes, distinguished because their
/// error kinds differ (the original spec requires each be reported
/// separately rather than collapsed into one result).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetterOutcome {
    Accepted,
}

/// Runs a setter's full handshake: `cmd` bytes, then command-accepted
/// reply, then `params` bytes, then parameters-accepted reply.
///
/// Setters do not validate parameter ranges client-side in general -- the
/// device is the authority -- except for the dither-pattern, gamma-table,
/// and color-matrix setters, which enforce their documented structural
/// constraints before ever reaching the wire (see
/// [`crate::command::setter::dither_pattern_size_is_valid`] and friends).
pub fn send(cnx: &mut dyn Connexion, cmd: &[u8], params: &[u8]) -> Result<SetterOutcome, ScanError> {
    cnx.send(cmd)?;
    let mut reply = [0u8];
    cnx.recv(&mut reply)?;
    match reply[0] {
        ACK => {}
        NAK => return Err(ScanError::InvalidCommand),
        other => return Err(ScanError::UnknownReply(other)),
    }

    cnx.send(params)?;
    cnx.recv(&mut reply)?;
    match reply[0] {
        ACK => Ok(SetterOutcome::Accepted),
        NAK => Err(ScanError::InvalidParameter),
        other => Err(ScanError::UnknownReply(other)),
    }
}

/// The dither-pattern setter accepts only square matrices of these sizes.
pub fn dither_pattern_size_is_valid(side: usize) -> bool {
    matches!(side, 4 | 8 | 16)
}

/// The component a gamma table upload applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GammaComponent {
    Red,
    Green,
    Blue,
    RgbMaster,
}

impl GammaComponent {
    pub fn selector_byte(self) -> u8 {
        match self {
            GammaComponent::Red => b'R',
            GammaComponent::Green => b'G',
            GammaComponent::Blue => b'B',
            GammaComponent::RgbMaster => b'M',
        }
    }
}
