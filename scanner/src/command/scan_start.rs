//! The extended scan-start command: the chunked image acquisition
//! handshake described in the component design's scan-start section.

use crate::command::action;
use crate::connexion::Connexion;
use crate::error::ScanError;
use crate::records::chunk::Chunk;
use crate::wire::{self, STX};

/// `start-extended-scan`: `{FS, 'G'}`.
pub const START_EXTENDED_SCAN: [u8; 2] = [0x1c, b'G'];

const RESERVED_ERROR_CODE_BITS: u8 = 0x0f;

/// Drives the extended-scan chunk stream over a single `connexion`.
///
/// Call [`ExtendedScan::start`] once to issue the command and read the
/// initial info block, then call [`ExtendedScan::next_chunk`] repeatedly
/// until it returns a null [`Chunk`]; the stream is exhausted at that
/// point. [`ExtendedScan::cancel`] may be called at any time between
/// chunks to request early termination, from either this host or (when
/// the device itself signals cancellation) automatically.
pub struct ExtendedScan {
    pedantic: bool,
    reuse_buffer: bool,
    error_code_mask: u8,

    blk: [u8; 14],
    cancelled: bool,
    do_cancel: bool,
    do_at_end: bool,
    error_code: u8,
    chunk_count: u32,
    final_bytes: u32,

    reused: Option<Chunk>,
}

impl ExtendedScan {
    /// `reuse_buffer` selects between the two concrete acquisition
    /// strategies the source offers: allocating a fresh chunk per read, or
    /// reusing one buffer across the whole stream. Callers that copy chunk
    /// contents out immediately (e.g. into their own image buffer) can use
    /// the cheaper reused-buffer strategy; callers that hold onto returned
    /// chunks need fresh allocations.
    pub fn new(pedantic: bool, reuse_buffer: bool) -> Self {
        Self::with_error_code_mask(!RESERVED_ERROR_CODE_BITS, pedantic, reuse_buffer)
    }

    pub fn with_error_code_mask(error_code_mask: u8, pedantic: bool, reuse_buffer: bool) -> Self {
        Self {
            pedantic,
            reuse_buffer,
            error_code_mask,
            blk: [0; 14],
            cancelled: false,
            do_cancel: false,
            do_at_end: false,
            error_code: 0,
            chunk_count: 0,
            final_bytes: 0,
            reused: None,
        }
    }

    /// Issues the scan-start command and reads the 14-byte info block.
    pub fn start(&mut self, cnx: &mut dyn Connexion) -> Result<(), ScanError> {
        self.cancelled = false;
        self.do_cancel = false;
        self.do_at_end = false;

        cnx.send(&START_EXTENDED_SCAN)?;
        cnx.recv(&mut self.blk)?;

        self.validate_info_block()?;

        if self.detected_fatal_error() || !self.is_ready() {
            self.blk[2..].fill(0);
        }

        self.chunk_count = wire::to_u32(&self.blk[6..10]);
        self.final_bytes = wire::to_u32(&self.blk[10..14]);

        Ok(())
    }

    /// Reads the next chunk, or returns a null chunk once the stream has
    /// ended. Sends the appropriate `ACK`/`CAN`/`EOT` to the device as
    /// dictated by the current cancel state before returning.
    pub fn next_chunk(&mut self, cnx: &mut dyn Connexion) -> Result<Chunk, ScanError> {
        if !self.more_chunks() || self.cancelled {
            return Ok(Chunk::null());
        }

        let size = self.chunk_size();
        if size == 0 {
            return Ok(Chunk::null());
        }

        let mut img = self.take_chunk_buffer(size);
        let mut wire_buf = img.recv_buffer();
        cnx.recv(&mut wire_buf)?;
        img.fill_from_wire(&wire_buf);

        self.error_code = img.error_code();
        self.scrub_error_code();

        if self.chunk_count > 0 {
            self.chunk_count -= 1;
        } else {
            self.final_bytes = 0;
        }

        if self.detected_fatal_error() || !self.is_ready() {
            self.chunk_count = 0;
            self.final_bytes = 0;
        }

        if self.more_chunks() {
            if self.is_cancel_requested() {
                self.cancel(false);
            }

            if !self.do_cancel {
                cnx.send(&[wire::ACK])?;
            } else {
                self.cancelled = true;
                if self.is_at_page_end() && self.do_at_end {
                    action::send(cnx, &action::END_OF_TRANSMISSION)?;
                } else {
                    action::send(cnx, &action::ABORT_SCAN)?;
                }
            }
        }

        if self.reuse_buffer {
            self.reused = Some(img.clone());
        }

        Ok(img)
    }

    /// Requests cancellation. `at_page_end`, when set, prefers `EOT`
    /// (stop-at-page-end) over `CAN` (abort) if the device has signalled
    /// that the current page has ended.
    pub fn cancel(&mut self, at_page_end: bool) {
        self.do_cancel = true;
        self.do_at_end = at_page_end;
    }

    pub fn was_cancelled(&self) -> bool {
        self.cancelled
    }

    pub fn detected_fatal_error(&self) -> bool {
        (0x80 & self.error_code) != 0 || (0x80 & self.blk[1]) != 0
    }

    pub fn is_ready(&self) -> bool {
        (0x40 & self.error_code) == 0 && (0x40 & self.blk[1]) == 0
    }

    pub fn is_at_page_end(&self) -> bool {
        (0x20 & self.error_code) != 0
    }

    pub fn is_cancel_requested(&self) -> bool {
        (0x10 & self.error_code) != 0
    }

    fn chunk_size(&self) -> u32 {
        if self.chunk_count == 0 {
            self.final_bytes
        } else {
            wire::to_u32(&self.blk[2..6])
        }
    }

    fn more_chunks(&self) -> bool {
        !(self.chunk_count == 0 && self.final_bytes == 0 && !self.cancelled)
    }

    fn take_chunk_buffer(&mut self, size: u32) -> Chunk {
        if self.reuse_buffer {
            self.reused
                .take()
                .filter(|c| c.image_bytes().len() == size as usize)
                .unwrap_or_else(|| Chunk::with_capacity(size as usize, true))
        } else {
            Chunk::with_capacity(size as usize, true)
        }
    }

    fn validate_info_block(&self) -> Result<(), ScanError> {
        if self.blk[0] != STX {
            return Err(ScanError::UnknownReply(self.blk[0]));
        }
        if self.pedantic {
            wire::check_reserved_bits(self.blk[1], 0x2d, "info");
        }
        Ok(())
    }

    fn scrub_error_code(&mut self) {
        if self.pedantic {
            wire::check_reserved_bits(self.error_code, !RESERVED_ERROR_CODE_BITS, "errc");
        }
        self.error_code &= !RESERVED_ERROR_CODE_BITS;

        let unsupported = !self.error_code_mask & self.error_code;
        if self.pedantic && unsupported != 0 {
            tracing::debug!(target: "esci::pedantic", unsupported, "clearing unsupported error code bits");
        }
        self.error_code &= self.error_code_mask;
    }
}

/// `start-scan`: `{ESC, 'G'}`, the legacy (non-chunked) scan-start command.
///
/// Older firmware that never negotiated extended-command support (see
/// [`crate::command::getter::InfoBlock::supports_extended_commands`])
/// speaks this simpler protocol instead of [`ExtendedScan`]: no chunk
/// counters, no per-block error-code byte, no device-side cancel
/// signaling. Each block carries its own small header and the stream ends
/// when the status byte's area-end bit is observed.
pub const START_SCAN: [u8; 2] = [0x1b, b'G'];

/// Drives the legacy scan-start block stream.
pub struct StandardScan {
    done: bool,
    area_end_bit: u8,
}

impl Default for StandardScan {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardScan {
    pub fn new() -> Self {
        Self { done: false, area_end_bit: 0x20 }
    }

    pub fn start(&mut self, cnx: &mut dyn Connexion) -> Result<(), ScanError> {
        self.done = false;
        cnx.send(&START_SCAN)
    }

    /// Reads the next block's header and payload, or `None` once the
    /// area-end status bit has been observed in a prior block.
    pub fn next_block(&mut self, cnx: &mut dyn Connexion) -> Result<Option<Vec<u8>>, ScanError> {
        if self.done {
            return Ok(None);
        }

        let mut hdr = [0u8; 4];
        cnx.recv(&mut hdr)?;
        if hdr[0] != STX {
            return Err(ScanError::UnknownReply(hdr[0]));
        }

        let status = hdr[1];
        let size = wire::to_u16(&hdr[2..4]) as usize;
        let mut data = vec![0u8; size];
        if size > 0 {
            cnx.recv(&mut data)?;
        }

        if status & self.area_end_bit != 0 {
            self.done = true;
        }

        Ok(Some(data))
    }

    pub fn is_done(&self) -> bool {
        self.done
    }
}

/// Picks between the two concrete scan-start handshakes, decided once when
/// a [`crate::scanner::Scanner`] is opened (from
/// [`crate::command::getter::InfoBlock::supports_extended_commands`]) and
/// never switched mid-session: older firmware that never negotiated
/// extended-command support only understands [`StandardScan`]'s simpler,
/// non-chunked block stream.
pub enum ScanStream {
    Extended(ExtendedScan),
    Standard(StandardScan),
}

impl ScanStream {
    pub fn start(&mut self, cnx: &mut dyn Connexion) -> Result<(), ScanError> {
        match self {
            Self::Extended(s) => s.start(cnx),
            Self::Standard(s) => s.start(cnx),
        }
    }

    /// Reads the next chunk, or a null [`Chunk`] once the stream has ended.
    /// [`StandardScan`] carries no error-code byte, so a chunk sourced from
    /// it never signals a fatal or cancel-requested condition on its own.
    pub fn next_chunk(&mut self, cnx: &mut dyn Connexion) -> Result<Chunk, ScanError> {
        match self {
            Self::Extended(s) => s.next_chunk(cnx),
            Self::Standard(s) => Ok(s.next_block(cnx)?.map(Chunk::from_bytes).unwrap_or_else(Chunk::null)),
        }
    }

    /// Requests cancellation. The legacy block stream offers no device-side
    /// cancel signal, so this is a no-op for [`StandardScan`]; a caller still
    /// gets to stop reading from the returned [`std::io::Read`] early.
    pub fn cancel(&mut self, at_page_end: bool) {
        if let Self::Extended(s) = self {
            s.cancel(at_page_end);
        }
    }

    pub fn was_cancelled(&self) -> bool {
        match self {
            Self::Extended(s) => s.was_cancelled(),
            Self::Standard(_) => false,
        }
    }

    pub fn detected_fatal_error(&self) -> bool {
        match self {
            Self::Extended(s) => s.detected_fatal_error(),
            Self::Standard(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connexion::ScriptedConnexion;

    fn info_block(status: u8, chunk_size: u32, chunk_count: u32, final_size: u32) -> Vec<u8> {
        let mut blk = vec![STX, status];
        let mut tmp = [0u8; 4];
        wire::from_u32(&mut tmp, chunk_size);
        blk.extend_from_slice(&tmp);
        wire::from_u32(&mut tmp, chunk_count);
        blk.extend_from_slice(&tmp);
        wire::from_u32(&mut tmp, final_size);
        blk.extend_from_slice(&tmp);
        blk
    }

    #[test]
    fn empty_stream_ends_immediately_after_info_block() {
        let mut cnx = ScriptedConnexion::new()
            .expect_send(START_EXTENDED_SCAN)
            .then_recv(info_block(0x00, 0, 0, 0));
        let mut scan = ExtendedScan::new(false, false);
        scan.start(&mut cnx).unwrap();
        assert!(scan.next_chunk(&mut cnx).unwrap().is_null());
    }

    #[test]
    fn single_final_chunk_then_stream_ends() {
        let mut cnx = ScriptedConnexion::new()
            .expect_send(START_EXTENDED_SCAN)
            .then_recv(info_block(0x00, 100, 0, 5))
            .then_recv([1, 2, 3, 4, 5, 0x00]);
        let mut scan = ExtendedScan::new(false, false);
        scan.start(&mut cnx).unwrap();
        let chunk = scan.next_chunk(&mut cnx).unwrap();
        assert_eq!(chunk.image_bytes(), &[1, 2, 3, 4, 5]);
        assert!(scan.next_chunk(&mut cnx).unwrap().is_null());
    }

    #[test]
    fn reserved_error_code_bits_are_scrubbed() {
        let mut cnx = ScriptedConnexion::new()
            .expect_send(START_EXTENDED_SCAN)
            .then_recv(info_block(0x00, 4, 0, 4))
            .then_recv([1, 2, 3, 4, 0x0f]);
        let mut scan = ExtendedScan::new(false, false);
        scan.start(&mut cnx).unwrap();
        let chunk = scan.next_chunk(&mut cnx).unwrap();
        assert_eq!(chunk.error_code(), 0);
    }

    #[test]
    fn fatal_error_in_info_block_zeroes_remaining_fields() {
        let mut cnx = ScriptedConnexion::new()
            .expect_send(START_EXTENDED_SCAN)
            .then_recv(info_block(0x80, 100, 5, 50));
        let mut scan = ExtendedScan::new(false, false);
        scan.start(&mut cnx).unwrap();
        assert!(scan.detected_fatal_error());
        assert!(scan.next_chunk(&mut cnx).unwrap().is_null());
    }

    #[test]
    fn host_cancel_sends_exactly_one_can() {
        let mut cnx = ScriptedConnexion::new()
            .expect_send(START_EXTENDED_SCAN)
            .then_recv(info_block(0x00, 4, 2, 4))
            .then_recv([1, 2, 3, 4, 0x00])
            .expect_send([0x18])
            .then_recv([0x06]);
        let mut scan = ExtendedScan::new(false, false);
        scan.start(&mut cnx).unwrap();
        scan.cancel(false);
        let chunk = scan.next_chunk(&mut cnx).unwrap();
        assert!(!chunk.is_null());
        assert!(scan.was_cancelled());
        assert!(scan.next_chunk(&mut cnx).unwrap().is_null());
    }

    #[test]
    fn device_side_cancel_bit_triggers_can() {
        let mut cnx = ScriptedConnexion::new()
            .expect_send(START_EXTENDED_SCAN)
            .then_recv(info_block(0x00, 4, 2, 4))
            .then_recv([1, 2, 3, 4, 0x10])
            .expect_send([0x18])
            .then_recv([0x06]);
        let mut scan = ExtendedScan::new(false, false);
        scan.start(&mut cnx).unwrap();
        let chunk = scan.next_chunk(&mut cnx).unwrap();
        assert!(!chunk.is_null());
        assert!(scan.was_cancelled());
    }
}
