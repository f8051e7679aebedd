//! Action commands: one or two request bytes, one reply byte.

use crate::connexion::Connexion;
use crate::error::ScanError;
use crate::wire::{ACK, CAN, EOT, FF, NAK, PF};

/// `capture-scanner`: `{ESC, '('}`.
pub const CAPTURE_SCANNER: [u8; 2] = [0x1b, b'('];
/// `release-scanner`: `{ESC, ')'}`.
pub const RELEASE_SCANNER: [u8; 2] = [0x1b, b')'];
/// `initialize`: `{ESC, '@'}`.
pub const INITIALIZE: [u8; 2] = [0x1b, b'@'];
/// `cancel-warming-up`: `{ESC, 'w'}`.
pub const CANCEL_WARMING_UP: [u8; 2] = [0x1b, b'w'];
/// `eject-media`: a single form-feed byte.
pub const EJECT_MEDIA: [u8; 1] = [FF];
/// `load-media`: a single page-feed byte.
pub const LOAD_MEDIA: [u8; 1] = [PF];
/// `abort-scan`: a single cancel byte.
pub const ABORT_SCAN: [u8; 1] = [CAN];
/// `end-of-transmission`: a single EOT byte.
pub const END_OF_TRANSMISSION: [u8; 1] = [EOT];

/// Sends `cmd` and validates the reply under the standard action policy:
/// ACK succeeds, NAK is `InvalidCommand`, anything else is `UnknownReply`.
pub fn send(cnx: &mut dyn Connexion, cmd: &[u8]) -> Result<(), ScanError> {
    cnx.send(cmd)?;
    let mut reply = [0u8];
    cnx.recv(&mut reply)?;
    match reply[0] {
        ACK => Ok(()),
        NAK => Err(ScanError::InvalidCommand),
        other => Err(ScanError::UnknownReply(other)),
    }
}

/// `capture-scanner`'s reply table overrides the standard one: 0x80 is
/// success, 0x40 is `DeviceBusy`, NAK is `InvalidCommand`, anything else is
/// `UnknownReply`.
pub fn capture_scanner(cnx: &mut dyn Connexion) -> Result<(), ScanError> {
    cnx.send(&CAPTURE_SCANNER)?;
    let mut reply = [0u8];
    cnx.recv(&mut reply)?;
    match reply[0] {
        0x80 => Ok(()),
        0x40 => Err(ScanError::DeviceBusy),
        NAK => Err(ScanError::InvalidCommand),
        other => Err(ScanError::UnknownReply(other)),
    }
}

/// `release-scanner`: 0x80 is success, NAK is `InvalidCommand`, anything
/// else is `UnknownReply`. There is no busy reply on release.
pub fn release_scanner(cnx: &mut dyn Connexion) -> Result<(), ScanError> {
    cnx.send(&RELEASE_SCANNER)?;
    let mut reply = [0u8];
    cnx.recv(&mut reply)?;
    match reply[0] {
        0x80 => Ok(()),
        NAK => Err(ScanError::InvalidCommand),
        other => Err(ScanError::UnknownReply(other)),
    }
}

/// `initialize`: resets most scan settings to model defaults, but leaves
/// uploaded gamma tables, color matrices, and dither patterns in place
/// (only their *selection* reverts). Focus position and last-detected media
/// size are also left untouched. The device documents no NAK case for this
/// command: ACK succeeds, anything else is `UnknownReply`.
pub fn initialize(cnx: &mut dyn Connexion) -> Result<(), ScanError> {
    cnx.send(&INITIALIZE)?;
    let mut reply = [0u8];
    cnx.recv(&mut reply)?;
    match reply[0] {
        ACK => Ok(()),
        other => Err(ScanError::UnknownReply(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connexion::ScriptedConnexion;

    #[test]
    fn standard_action_nak_is_invalid_command() {
        let mut cnx = ScriptedConnexion::new()
            .expect_send(EJECT_MEDIA)
            .then_recv([NAK]);
        assert!(matches!(send(&mut cnx, &EJECT_MEDIA), Err(ScanError::InvalidCommand)));
    }

    #[test]
    fn standard_action_unknown_byte_is_unknown_reply() {
        let mut cnx = ScriptedConnexion::new()
            .expect_send(EJECT_MEDIA)
            .then_recv([0x42]);
        assert!(matches!(send(&mut cnx, &EJECT_MEDIA), Err(ScanError::UnknownReply(0x42))));
    }

    #[test]
    fn capture_scanner_busy() {
        let mut cnx = ScriptedConnexion::new()
            .expect_send(CAPTURE_SCANNER)
            .then_recv([0x40]);
        assert!(matches!(capture_scanner(&mut cnx), Err(ScanError::DeviceBusy)));
    }

    #[test]
    fn capture_scanner_success() {
        let mut cnx = ScriptedConnexion::new()
            .expect_send(CAPTURE_SCANNER)
            .then_recv([0x80]);
        assert!(capture_scanner(&mut cnx).is_ok());
    }

    #[test]
    fn initialize_has_no_nak_case() {
        let mut cnx = ScriptedConnexion::new()
            .expect_send(INITIALIZE)
            .then_recv([NAK]);
        assert!(matches!(initialize(&mut cnx), Err(ScanError::UnknownReply(NAK))));
    }
}
