//! The scanner orchestration state machine.
//!
//! [`Scanner`] owns a [`Connexion`] plus the state derived from it
//! (capability, the device's default parameters, last-seen status, and the
//! user-facing [`OptionMap`]) and sequences the four command families into
//! the higher-level flows a caller actually wants: open a session, acquire
//! one image at a time, stream its bytes, tear down cleanly no matter how
//! an acquisition ends.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::codes;
use crate::command::action;
use crate::command::getter;
use crate::command::scan_start::{ExtendedScan, ScanStream, StandardScan, START_EXTENDED_SCAN};
use crate::command::setter;
use crate::config::AcquisitionConfig;
use crate::connexion::Connexion;
use crate::error::{ScanError, SystemErrorCode};
use crate::command::setter::GammaComponent;
use crate::geometry::{BoundingBox, Matrix, Point};
use crate::option_map::{DocSource, ImageType, OptionMap, ScanAreaSelection};
use crate::records::capability::Capability;
use crate::records::chunk::Chunk;
use crate::records::focus::{self, FocusPosition};
use crate::records::hardware_property::{self, HardwareProperty};
use crate::records::push_button::{self, PushButtonStatus};
use crate::records::scan_parameters::ScanParameters;
use crate::records::status::{Source, Status};

/// Interval between status polls while waiting out a warm-up or an
/// auto-detect probe (§4.6).
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Auto-detect gives the device this many polls to report a media size
/// before falling back to the source's full physical bounds.
const AUTO_DETECT_POLL_ATTEMPTS: u32 = 5;

/// A cheaply cloned flag a caller can flip (from another thread, or right
/// before a blocking read) to ask an in-progress acquisition to stop at the
/// next inter-chunk boundary instead of running to completion.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

fn status_source_for(doc_source: DocSource) -> Source {
    match doc_source {
        DocSource::Flatbed => Source::Main,
        DocSource::AdfSimplex | DocSource::AdfDuplex => Source::Adf,
        DocSource::Tpu1 => Source::Tpu1,
        DocSource::Tpu2 => Source::Tpu2,
    }
}

/// Turns a fatal [`Status`] into a descriptive [`ScanError::System`].
fn system_error_from_status(status: &Status, source: Source) -> ScanError {
    let (code, message) = if status.cover_open(source) {
        (SystemErrorCode::CoverOpen, "cover open".to_string())
    } else if status.media_out(source) {
        (SystemErrorCode::MediaOut, "media out".to_string())
    } else if status.media_jam(source) {
        (SystemErrorCode::MediaJam, "media jam".to_string())
    } else if status.source_error(source) {
        (SystemErrorCode::UnknownError, "source reports an error".to_string())
    } else {
        (SystemErrorCode::UnknownError, "device reported a fatal error".to_string())
    };
    ScanError::System { code, message }
}

/// The right-edge pixel boundary a scan area must snap down to: the device
/// requires a flat 8-pixel boundary for any bit depth of 4 or less (not a
/// minimal pixels-per-byte boundary), and one model reports a wider,
/// hardware-specific alignment that overrides the general rule outright.
fn byte_boundary_for_bit_depth(bit_depth: u8, product_name: &str) -> u32 {
    let mut boundary = if bit_depth <= 4 { 8 } else { 0 };
    if product_name == "ES-H300" {
        boundary = if bit_depth == 1 { 32 } else { 4 };
    }
    boundary
}

fn align_down(value: u32, boundary: u32) -> u32 {
    if boundary <= 1 {
        value
    } else {
        value - value % boundary
    }
}

/// Snaps `area`'s right edge down to the active bit depth's byte boundary,
/// and clips its width to the device's reported maximum scan width (a
/// report of `0` means the device places no separate limit beyond the
/// source's own bounds).
fn align_scan_area(area: BoundingBox<u32>, caps: &Capability, bit_depth: u8) -> BoundingBox<u32> {
    let boundary = byte_boundary_for_bit_depth(bit_depth, &caps.product_name());
    let mut width = align_down(area.width(), boundary);

    let max_width = caps.max_scan_width();
    if max_width > 0 {
        width = width.min(align_down(max_width, boundary));
    }

    let top_left = area.top_left();
    BoundingBox::from_points(top_left, Point::new(top_left.x + width, area.bottom_right().y))
}

/// Translates the resolved option map into a device-ready parameters
/// record, leaving any field the option map has no opinion on (gamma
/// table/color matrix uploads, focus, energy saving) at its current value.
fn apply_option_map(params: &mut ScanParameters, opts: &OptionMap, caps: &Capability) {
    params.set_resolution_main(opts.resolution());
    params.set_resolution_sub(opts.resolution());

    let option_unit = match opts.doc_source() {
        DocSource::Flatbed => codes::option_unit::MAIN_BODY,
        DocSource::AdfSimplex => codes::option_unit::ADF_SIMPLEX,
        DocSource::AdfDuplex => codes::option_unit::ADF_DUPLEX,
        DocSource::Tpu1 => codes::option_unit::TPU_AREA_1,
        DocSource::Tpu2 => codes::option_unit::TPU_AREA_2,
    };
    params.set_option_unit(option_unit);

    let color_mode = match opts.image_type() {
        ImageType::Color => opts.transfer_format().color_mode_byte(),
        ImageType::Grayscale | ImageType::Monochrome => codes::color_mode::MONOCHROME,
    };
    params.set_color_mode(color_mode);
    params.set_bit_depth(opts.bit_depth());

    if let Some(area) = opts.resolved_area() {
        let aligned = align_scan_area(area, caps, opts.bit_depth());
        let offset = aligned.offset();
        let extent = aligned.extent();
        params.set_scan_area(offset.x, offset.y, extent.x, extent.y);
    }

    params.set_threshold(opts.threshold());
    params.set_sharpness(opts.sharpness());
    params.set_brightness(opts.brightness());
    params.set_gamma_correction(opts.gamma_correction());
    params.set_color_correction(opts.color_correction());
    params.set_halftone_processing(opts.dither_pattern());
    params.set_auto_area_segmentation(opts.auto_area_segmentation());
    params.set_mirroring(opts.mirror());
    if let Some(film_type) = opts.film_type() {
        params.set_film_type(film_type);
    }
    params.set_scan_mode(if opts.speed_hi() {
        codes::scan_mode::HI_SPEED
    } else {
        codes::scan_mode::NORMAL_SPEED
    });
    params.set_line_count(opts.line_count());
}

fn parse_scan_parameters(bytes: &[u8]) -> Result<ScanParameters, ScanError> {
    let array: [u8; ScanParameters::SIZE] = bytes
        .get(..ScanParameters::SIZE)
        .and_then(|slice| slice.try_into().ok())
        .ok_or_else(|| {
            ScanError::Protocol(format!(
                "scan-parameters reply too short: {} bytes",
                bytes.len()
            ))
        })?;
    Ok(ScanParameters::from_bytes(array))
}

/// RAII guard over `capture-scanner`/`release-scanner` (§5).
///
/// Holding one is proof that `capture-scanner` succeeded (or that the
/// scanner was already locked, in which case this guard is an inert
/// passthrough -- see [`CaptureGuard::acquire`]). Dropping it always
/// attempts `release-scanner`, on every return path including an early `?`,
/// so a fatal error mid-acquisition can never leave the device exclusively
/// held by a session that has stopped talking to it.
struct CaptureGuard<'a, C: Connexion> {
    scanner: &'a mut Scanner<C>,
    active: bool,
}

impl<'a, C: Connexion> CaptureGuard<'a, C> {
    fn acquire(scanner: &'a mut Scanner<C>) -> Result<Self, ScanError> {
        if scanner.locked {
            tracing::warn!("capture-scanner requested while already locked; no-op");
            return Ok(Self { scanner, active: false });
        }
        action::capture_scanner(&mut scanner.connexion)?;
        scanner.locked = true;
        Ok(Self { scanner, active: true })
    }

    fn scanner_mut(&mut self) -> &mut Scanner<C> {
        self.scanner
    }

    fn release(mut self) -> Result<(), ScanError> {
        self.release_inner()
    }

    fn release_inner(&mut self) -> Result<(), ScanError> {
        if !self.active {
            return Ok(());
        }
        self.active = false;
        match action::release_scanner(&mut self.scanner.connexion) {
            Ok(()) => {
                self.scanner.locked = false;
                Ok(())
            }
            Err(ScanError::InvalidCommand) => {
                tracing::debug!("release-scanner: invalid-command, treating as already released");
                self.scanner.locked = false;
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "release-scanner failed; lock left held");
                Err(e)
            }
        }
    }
}

impl<'a, C: Connexion> Drop for CaptureGuard<'a, C> {
    fn drop(&mut self) {
        let _ = self.release_inner();
    }
}

/// The scanner orchestration state machine described in §4.6.
pub struct Scanner<C: Connexion> {
    connexion: C,
    caps: Capability,
    defaults: ScanParameters,
    active_params: ScanParameters,
    last_status: Option<Status>,
    option_map: OptionMap,
    locked: bool,
    images_started: u32,
    pedantic: bool,
    reuse_chunk_buffer: bool,
    error_code_mask: Option<u8>,
    buffer_size: u32,
    supports_extended: bool,
}

impl<C: Connexion> Scanner<C> {
    /// Opens a session: capture, initialize, read extended identity and
    /// default scan parameters and status, then release. The option map
    /// starts out at its defaults, seeded with the device's base
    /// resolution.
    pub fn open(mut connexion: C, config: &AcquisitionConfig) -> Result<Self, ScanError> {
        action::capture_scanner(&mut connexion)?;
        action::initialize(&mut connexion)?;

        let (identity_info, identity) = getter::variable(&mut connexion, &getter::GET_EXTENDED_IDENTITY)?;
        let caps = Capability::from_bytes(identity);
        let supports_extended = identity_info.supports_extended_commands();

        let (_info, params_bytes) = getter::variable(&mut connexion, &getter::GET_SCAN_PARAMETERS)?;
        let defaults = parse_scan_parameters(&params_bytes)?;

        let (_info, status_bytes) = getter::variable(&mut connexion, &getter::GET_STATUS)?;
        let status = Status::from_bytes(status_bytes);

        action::release_scanner(&mut connexion)?;

        let option_map = OptionMap::new(caps.base_resolution());

        Ok(Self {
            connexion,
            defaults,
            active_params: defaults,
            last_status: Some(status),
            caps,
            option_map,
            locked: false,
            images_started: 0,
            pedantic: config.pedantic,
            reuse_chunk_buffer: config.reuse_chunk_buffer,
            error_code_mask: config.error_code_mask,
            buffer_size: config.buffer_size,
            supports_extended,
        })
    }

    /// Whether the device negotiated extended-command support at open time
    /// (`get-extended-identity`'s info block). Fixed for the life of this
    /// `Scanner`; acquisitions use [`StandardScan`] instead of
    /// [`ExtendedScan`] when this is `false`.
    pub fn supports_extended_commands(&self) -> bool {
        self.supports_extended
    }

    pub fn caps(&self) -> &Capability {
        &self.caps
    }

    pub fn option_map(&self) -> &OptionMap {
        &self.option_map
    }

    pub fn option_map_mut(&mut self) -> &mut OptionMap {
        &mut self.option_map
    }

    pub fn last_status(&self) -> Option<&Status> {
        self.last_status.as_ref()
    }

    pub fn active_parameters(&self) -> &ScanParameters {
        &self.active_params
    }

    pub fn images_started(&self) -> u32 {
        self.images_started
    }

    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// `cancel-warming-up`: asks the device to skip the remainder of its
    /// warm-up period, when [`Capability`] reports it is willing to.
    pub fn cancel_warming_up(&mut self) -> Result<(), ScanError> {
        action::send(&mut self.connexion, &action::CANCEL_WARMING_UP)
    }

    /// `get-focus-position`: not reset by `initialize`, so this reflects
    /// whatever the device's focus mechanism was last left at.
    pub fn focus_position(&mut self) -> Result<FocusPosition, ScanError> {
        let bytes = getter::fixed(&mut self.connexion, &getter::GET_FOCUS_POSITION, focus::SIZE)?;
        let position = FocusPosition::from_bytes(bytes);
        if self.pedantic {
            position.check_reserved_bits();
        }
        Ok(position)
    }

    /// `set-focus-position`: requests a new focus position
    /// ([`codes::focus::FOCUS_GLASS`] or [`codes::focus::FOCUS_AUTO`], or a
    /// model-specific offset relative to the glass plate).
    pub fn set_focus_position(&mut self, position: u8) -> Result<(), ScanError> {
        setter::send(&mut self.connexion, &setter::SET_FOCUS_POSITION, &[position])?;
        Ok(())
    }

    /// `get-push-button-status`: the most recent front-panel button push
    /// event, if any. The protocol gives no way to tell when it happened.
    pub fn push_button_status(&mut self) -> Result<PushButtonStatus, ScanError> {
        let bytes = getter::fixed(&mut self.connexion, &getter::GET_PUSH_BUTTON_STATUS, push_button::SIZE)?;
        let status = PushButtonStatus::from_bytes(bytes);
        if self.pedantic {
            status.check_reserved_bits();
        }
        Ok(status)
    }

    /// `get-hardware-property`: `D#`-level sensor structure and resolution
    /// sets that supersede [`Capability`]'s own resolution range.
    pub fn hardware_property(&mut self) -> Result<HardwareProperty, ScanError> {
        let bytes = getter::fixed(&mut self.connexion, &getter::GET_HARDWARE_PROPERTY, hardware_property::SIZE)?;
        let property = HardwareProperty::from_bytes(bytes);
        if self.pedantic {
            property.check_reserved_bits();
        }
        Ok(property)
    }

    /// `set-gamma-table`: uploads a 256-entry table for one color
    /// component. Not reset by `initialize` -- only the *selection* of
    /// which table is active reverts (§4.2).
    pub fn upload_gamma_table(&mut self, component: GammaComponent, table: &[u8; 256]) -> Result<(), ScanError> {
        let mut payload = Vec::with_capacity(257);
        payload.push(component.selector_byte());
        payload.extend_from_slice(table);
        setter::send(&mut self.connexion, &setter::SET_GAMMA_TABLE, &payload)?;
        Ok(())
    }

    /// `set-color-matrix`: uploads a 3x3 color-correction matrix. Coefficients
    /// are already clamped to `[CCT_MIN, CCT_MAX]` and snapped to 1/32
    /// resolution by [`Matrix::from_rows`]; this just re-encodes them into the
    /// protocol's signed fixed-point byte (value * 32, two's complement),
    /// column-major as the device expects.
    pub fn upload_color_matrix(&mut self, matrix: &Matrix<3>) -> Result<(), ScanError> {
        let mut payload = [0u8; 9];
        for row in 0..3 {
            for col in 0..3 {
                let raw = (matrix.get(row, col) * 32.0).round() as i8;
                payload[col * 3 + row] = raw as u8;
            }
        }
        setter::send(&mut self.connexion, &setter::SET_COLOR_MATRIX, &payload)?;
        Ok(())
    }

    /// `set-dither-pattern`: uploads a custom `side x side` pattern
    /// (`side` must be 4, 8, or 16) tagged with `pattern_id`, selected later
    /// via [`OptionMap::set_dither_pattern`] and
    /// `codes::halftone::CUSTOM_DITHER_A`/`CUSTOM_DITHER_B`. Not reset by
    /// `initialize` (§4.2).
    pub fn upload_dither_pattern(&mut self, pattern_id: u8, side: usize, pattern: &[u8]) -> Result<(), ScanError> {
        if !setter::dither_pattern_size_is_valid(side) || pattern.len() != side * side {
            return Err(ScanError::ConstraintViolation(format!(
                "dither pattern must be 4x4, 8x8, or 16x16 ({side}x{side} with {} entries given)",
                pattern.len()
            )));
        }
        let mut payload = Vec::with_capacity(2 + pattern.len());
        payload.push(pattern_id);
        payload.push(side as u8);
        payload.extend_from_slice(pattern);
        setter::send(&mut self.connexion, &setter::SET_DITHER_PATTERN, &payload)?;
        Ok(())
    }

    fn read_status(&mut self) -> Result<Status, ScanError> {
        let (_info, bytes) = getter::variable(&mut self.connexion, &getter::GET_STATUS)?;
        let status = Status::from_bytes(bytes);
        self.last_status = Some(status.clone());
        Ok(status)
    }

    /// Polls status every [`POLL_INTERVAL`] until the device reports it is
    /// no longer warming up, surfacing a fatal status as a typed error along
    /// the way.
    fn wait_for_ready(&mut self) -> Result<Status, ScanError> {
        loop {
            let status = self.read_status()?;
            if status.detected_fatal_error() {
                let source = status_source_for(self.option_map.doc_source());
                return Err(system_error_from_status(&status, source));
            }
            if !status.is_warming_up() {
                return Ok(status);
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    /// Step 1 of the per-image loop: resolve the option map, running the
    /// auto-detect status-probe loop first when the active scan area is
    /// [`ScanAreaSelection::AutoDetect`].
    fn set_up_initialize(&mut self) -> Result<(), ScanError> {
        let detected = if matches!(self.option_map.scan_area_selection(), ScanAreaSelection::AutoDetect) {
            self.probe_auto_detect_size()?
        } else {
            None
        };
        self.option_map.finalize(&self.caps, detected)
    }

    fn probe_auto_detect_size(&mut self) -> Result<Option<(f64, f64)>, ScanError> {
        let source = status_source_for(self.option_map.doc_source());
        for attempt in 0..AUTO_DETECT_POLL_ATTEMPTS {
            let status = self.read_status()?;
            let size = match source {
                Source::Main => status.main_media_size(),
                Source::Adf => status.adf_media_size(),
                Source::Tpu1 | Source::Tpu2 => None,
            };
            if let Some(paper) = size {
                return Ok(Some((paper.width_in, paper.height_in)));
            }
            if attempt + 1 < AUTO_DETECT_POLL_ATTEMPTS {
                thread::sleep(POLL_INTERVAL);
            }
        }
        tracing::debug!("auto-detect: no media size reported, falling back to source bounds");
        Ok(None)
    }

    /// Step 2 of the per-image loop: for ADF sources, issues `load-media`
    /// (best-effort: an invalid-command or unknown reply here is logged,
    /// not fatal) and reports whether media is actually present afterwards.
    /// Flatbed and TPU sources have nothing to load and always return
    /// `true`.
    fn obtain_media(&mut self) -> Result<bool, ScanError> {
        if !matches!(self.option_map.doc_source(), DocSource::AdfSimplex | DocSource::AdfDuplex) {
            return Ok(true);
        }

        match action::send(&mut self.connexion, &action::LOAD_MEDIA) {
            Ok(()) => {}
            Err(ScanError::InvalidCommand) => {
                tracing::debug!("load-media: invalid-command, proceeding without it");
            }
            Err(ScanError::UnknownReply(reply)) => {
                tracing::warn!(reply, "load-media: unexpected reply, proceeding anyway");
            }
            Err(e) => return Err(e),
        }

        let status = self.read_status()?;
        if status.detected_fatal_error() {
            return Err(system_error_from_status(&status, Source::Adf));
        }
        Ok(!status.media_out(Source::Adf))
    }

    fn push_scan_parameters(&mut self, params: &ScanParameters) -> Result<(), ScanError> {
        setter::send(&mut self.connexion, &setter::SET_SCAN_PARAMETERS, &params.to_bytes())?;
        Ok(())
    }

    /// Pushes `params`, bisecting the requested line count downward (halving
    /// on every invalid-parameter reply, stopping at 1) when the device
    /// rejects it -- the device's buffer is smaller than the host assumed.
    fn push_scan_parameters_with_line_count_tuning(
        &mut self,
        params: &mut ScanParameters,
    ) -> Result<(), ScanError> {
        loop {
            match self.push_scan_parameters(params) {
                Ok(()) => return Ok(()),
                Err(ScanError::InvalidParameter) => {
                    let current = params.line_count();
                    if current <= 1 {
                        return Err(ScanError::InvalidParameter);
                    }
                    let tuned = (current / 2).max(1);
                    tracing::debug!(from = current, to = tuned, "line-count rejected, halving");
                    params.set_line_count(tuned);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Step 3 of the per-image loop: waits out any warm-up, builds scan
    /// parameters from the option map, pushes them (tuning the line count if
    /// rejected), and starts the chunked scan.
    fn set_up_image(&mut self) -> Result<ScanStream, ScanError> {
        self.wait_for_ready()?;

        let mut params = self.defaults;
        apply_option_map(&mut params, &self.option_map, &self.caps);
        self.push_scan_parameters_with_line_count_tuning(&mut params)?;
        self.active_params = params;

        let mut scan = if self.supports_extended {
            ScanStream::Extended(ExtendedScan::with_error_code_mask(
                self.error_code_mask.unwrap_or(!0x0f),
                self.pedantic,
                self.reuse_chunk_buffer,
            ))
        } else {
            ScanStream::Standard(StandardScan::new())
        };
        scan.start(&mut self.connexion)?;

        if scan.detected_fatal_error() {
            let source = status_source_for(self.option_map.doc_source());
            let status = self.read_status()?;
            return Err(system_error_from_status(&status, source));
        }

        Ok(scan)
    }

    /// Acquires the next image, if one is available.
    ///
    /// Returns `Ok(None)` when the source has no more media (an ADF run out
    /// after its last page, say) -- this is an ordinary end of a multi-page
    /// job, not an error. The exclusive lock is held for the lifetime of the
    /// returned [`ImageSession`] and released when it is dropped.
    pub fn acquire_image(&mut self, cancel: &CancelFlag) -> Result<Option<ImageSession<'_, C>>, ScanError> {
        let mut guard = CaptureGuard::acquire(self)?;

        Self::set_up_initialize(guard.scanner_mut())?;

        if !Self::obtain_media(guard.scanner_mut())? {
            return Ok(None);
        }

        let scan = Self::set_up_image(guard.scanner_mut())?;

        let is_adf_page_source = matches!(
            guard.scanner_mut().option_map.doc_source(),
            DocSource::AdfSimplex | DocSource::AdfDuplex
        );
        guard.scanner_mut().images_started += 1;

        Ok(Some(ImageSession {
            guard,
            scan,
            current: Chunk::null(),
            offset: 0,
            done: false,
            is_adf_page_source,
            cancel: cancel.clone(),
        }))
    }
}

/// A single image's chunk stream, readable via [`std::io::Read`].
///
/// Dropping a session (whether it ran to completion, was cancelled, or is
/// abandoned mid-stream after an error) ejects the page for ADF sources and
/// always releases the exclusive lock acquired by
/// [`Scanner::acquire_image`] -- the same RAII guarantee [`CaptureGuard`]
/// gives the construction path.
pub struct ImageSession<'a, C: Connexion> {
    guard: CaptureGuard<'a, C>,
    scan: ScanStream,
    current: Chunk,
    offset: usize,
    done: bool,
    is_adf_page_source: bool,
    cancel: CancelFlag,
}

impl<'a, C: Connexion> ImageSession<'a, C> {
    pub fn was_cancelled(&self) -> bool {
        self.scan.was_cancelled()
    }

    /// Requests cancellation explicitly, in addition to whatever the shared
    /// [`CancelFlag`] passed to [`Scanner::acquire_image`] is doing.
    pub fn request_cancel(&mut self, at_page_end: bool) {
        self.scan.cancel(at_page_end);
    }

    /// Drains any unread chunks left in the stream, cancelling first if the
    /// stream hadn't already ended on its own (§4.5 point 8, §5: "destroying
    /// a scan-start object while a scan is in progress implicitly cancels
    /// and drains"). Called from [`Drop`] before the eject/lock-release
    /// logic, so `was_cancelled()` below reflects a mid-stream drop too.
    fn drain_on_drop(&mut self) {
        if self.done {
            return;
        }
        if !self.scan.was_cancelled() {
            self.scan.cancel(true);
        }
        loop {
            match self.scan.next_chunk(&mut self.guard.scanner_mut().connexion) {
                Ok(chunk) if chunk.is_null() => break,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to drain scan stream while dropping image session");
                    break;
                }
            }
        }
        self.done = true;
    }

    fn fill_current(&mut self) -> Result<(), ScanError> {
        while self.offset >= self.current.image_bytes().len() && !self.done {
            if self.cancel.is_set() && !self.scan.was_cancelled() {
                self.scan.cancel(true);
            }
            let chunk = self.scan.next_chunk(&mut self.guard.scanner_mut().connexion)?;
            if chunk.is_null() {
                self.done = true;
                self.current = Chunk::null();
            } else {
                self.current = chunk;
            }
            self.offset = 0;
        }
        Ok(())
    }
}

impl<'a, C: Connexion> std::io::Read for ImageSession<'a, C> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.fill_current()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        let remaining = &self.current.image_bytes()[self.offset..];
        if remaining.is_empty() {
            return Ok(0);
        }
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.offset += n;
        Ok(n)
    }
}

impl<'a, C: Connexion> Drop for ImageSession<'a, C> {
    fn drop(&mut self) {
        self.drain_on_drop();

        if self.is_adf_page_source || self.scan.was_cancelled() {
            match action::send(&mut self.guard.scanner_mut().connexion, &action::EJECT_MEDIA) {
                Ok(()) => {}
                Err(ScanError::InvalidCommand) => {
                    tracing::debug!("eject-media: invalid-command, nothing to eject");
                }
                Err(ScanError::UnknownReply(reply)) => {
                    tracing::debug!(reply, "eject-media: unexpected reply");
                }
                Err(e) => tracing::warn!(error = %e, "eject-media failed"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connexion::ScriptedConnexion;
    use crate::wire;
    use std::io::Read as _;

    fn info4(status: u8, payload_len: u16) -> Vec<u8> {
        let mut blk = vec![wire::STX, status];
        let mut size = [0u8; 2];
        wire::from_u16(&mut size, payload_len);
        blk.extend_from_slice(&size);
        blk
    }

    fn info14(status: u8, chunk_size: u32, chunk_count: u32, final_bytes: u32) -> Vec<u8> {
        let mut blk = vec![wire::STX, status];
        let mut tmp = [0u8; 4];
        wire::from_u32(&mut tmp, chunk_size);
        blk.extend_from_slice(&tmp);
        wire::from_u32(&mut tmp, chunk_count);
        blk.extend_from_slice(&tmp);
        wire::from_u32(&mut tmp, final_bytes);
        blk.extend_from_slice(&tmp);
        blk
    }

    fn sample_capability_bytes() -> Vec<u8> {
        let mut bytes = vec![0u8; 80];
        wire::from_u32(&mut bytes[4..], 300);
        wire::from_u32(&mut bytes[8..], 50);
        wire::from_u32(&mut bytes[12..], 1200);
        wire::from_u16(&mut bytes[20..], 0);
        wire::from_u16(&mut bytes[22..], 0);
        wire::from_u16(&mut bytes[24..], 2550);
        wire::from_u16(&mut bytes[26..], 3300);
        wire::from_u16(&mut bytes[28..], 0);
        wire::from_u16(&mut bytes[30..], 0);
        wire::from_u16(&mut bytes[32..], 2550);
        wire::from_u16(&mut bytes[34..], 3300);
        bytes[44] = 0x01 | 0x02; // flatbed | adf
        bytes
    }

    fn ready_status_bytes() -> Vec<u8> {
        vec![0u8; 16]
    }

    /// Queues the full `Scanner::open` command sequence.
    fn open_script() -> ScriptedConnexion {
        let identity = sample_capability_bytes();
        let defaults = ScanParameters::default().to_bytes().to_vec();
        let status = ready_status_bytes();

        ScriptedConnexion::new()
            .expect_send(action::CAPTURE_SCANNER)
            .then_recv([0x80])
            .expect_send(action::INITIALIZE)
            .then_recv([wire::ACK])
            .expect_send(getter::GET_EXTENDED_IDENTITY)
            .then_recv(info4(0x02, identity.len() as u16))
            .then_recv(identity)
            .expect_send(getter::GET_SCAN_PARAMETERS)
            .then_recv(info4(0x00, defaults.len() as u16))
            .then_recv(defaults)
            .expect_send(getter::GET_STATUS)
            .then_recv(info4(0x00, status.len() as u16))
            .then_recv(status)
            .expect_send(action::RELEASE_SCANNER)
            .then_recv([0x80])
    }

    #[test]
    fn device_busy_on_open_fails_construction_without_further_commands() {
        let cnx = ScriptedConnexion::new()
            .expect_send(action::CAPTURE_SCANNER)
            .then_recv([0x40]);
        let result = Scanner::open(cnx, &AcquisitionConfig::default());
        assert!(matches!(result, Err(ScanError::DeviceBusy)));
    }

    #[test]
    fn happy_path_flatbed_color_scan() {
        let caps = Capability::from_bytes(sample_capability_bytes());
        let mut opts = OptionMap::new(caps.base_resolution());
        opts.set_scan_area(ScanAreaSelection::Named("Letter".into()));
        opts.finalize(&caps, None).unwrap();

        let mut expected_params = ScanParameters::default();
        apply_option_map(&mut expected_params, &opts, &caps);
        let expected_bytes = expected_params.to_bytes();
        assert_eq!(expected_params.scan_area(), (0, 0, 2550, 3300));
        assert_eq!(expected_params.color_mode(), codes::color_mode::PIXEL_RGB);
        assert_eq!(expected_params.bit_depth(), 8);

        let chunk_a: Vec<u8> = std::iter::repeat(0xaa).take(65536).chain([0x00]).collect();
        let chunk_b: Vec<u8> = std::iter::repeat(0xbb).take(65536).chain([0x00]).collect();
        let chunk_final: Vec<u8> = std::iter::repeat(0xcc).take(12345).chain([0x00]).collect();

        let cnx = open_script()
            .expect_send(action::CAPTURE_SCANNER)
            .then_recv([0x80])
            .expect_send(getter::GET_STATUS)
            .then_recv(info4(0x00, 16))
            .then_recv(ready_status_bytes())
            .expect_send(setter::SET_SCAN_PARAMETERS)
            .then_recv([wire::ACK])
            .expect_send(expected_bytes.to_vec())
            .then_recv([wire::ACK])
            .expect_send(START_EXTENDED_SCAN)
            .then_recv(info14(0x00, 65536, 2, 12345))
            .then_recv(chunk_a)
            .expect_send([wire::ACK])
            .then_recv(chunk_b)
            .expect_send([wire::ACK])
            .then_recv(chunk_final);

        let mut scanner = Scanner::open(cnx, &AcquisitionConfig::default()).unwrap();
        *scanner.option_map_mut() = opts;

        let cancel = CancelFlag::new();
        let mut session = scanner.acquire_image(&cancel).unwrap().expect("an image");

        let mut image = Vec::new();
        session.read_to_end(&mut image).unwrap();
        assert_eq!(image.len(), 2 * 65536 + 12345);
        assert!(!session.was_cancelled());
        drop(session);
        assert_eq!(scanner.images_started(), 1);
    }

    fn zero_chunk_scan_start() -> (Vec<u8>, Vec<u8>) {
        (START_EXTENDED_SCAN.to_vec(), info14(0x00, 0, 0, 0))
    }

    #[test]
    fn warm_up_polls_status_until_ready_then_scans() {
        let mut warming = ready_status_bytes();
        warming[0] = 0x20; // general::WARMING_UP

        let (start_cmd, start_reply) = zero_chunk_scan_start();

        let caps = Capability::from_bytes(sample_capability_bytes());
        let mut opts = OptionMap::new(caps.base_resolution());
        opts.finalize(&caps, None).unwrap();
        let mut expected_params = ScanParameters::default();
        apply_option_map(&mut expected_params, &opts, &caps);

        let cnx = open_script()
            .expect_send(action::CAPTURE_SCANNER)
            .then_recv([0x80])
            .expect_send(getter::GET_STATUS)
            .then_recv(info4(0x00, 16))
            .then_recv(warming)
            .expect_send(getter::GET_STATUS)
            .then_recv(info4(0x00, 16))
            .then_recv(ready_status_bytes())
            .expect_send(setter::SET_SCAN_PARAMETERS)
            .then_recv([wire::ACK])
            .expect_send(expected_params.to_bytes().to_vec())
            .then_recv([wire::ACK])
            .expect_send(start_cmd)
            .then_recv(start_reply);

        let mut scanner = Scanner::open(cnx, &AcquisitionConfig::default()).unwrap();
        let cancel = CancelFlag::new();
        let session = scanner.acquire_image(&cancel).unwrap().expect("an image");
        drop(session);
    }

    #[test]
    fn line_count_rejected_is_halved_and_retried() {
        let caps = Capability::from_bytes(sample_capability_bytes());
        let mut opts = OptionMap::new(caps.base_resolution());
        opts.set_line_count(200);
        opts.finalize(&caps, None).unwrap();

        let mut rejected_params = ScanParameters::default();
        apply_option_map(&mut rejected_params, &opts, &caps);
        assert_eq!(rejected_params.line_count(), 200);

        let mut accepted_params = rejected_params;
        accepted_params.set_line_count(100);

        let (start_cmd, start_reply) = zero_chunk_scan_start();

        let cnx = open_script()
            .expect_send(action::CAPTURE_SCANNER)
            .then_recv([0x80])
            .expect_send(getter::GET_STATUS)
            .then_recv(info4(0x00, 16))
            .then_recv(ready_status_bytes())
            .expect_send(setter::SET_SCAN_PARAMETERS)
            .then_recv([wire::ACK])
            .expect_send(rejected_params.to_bytes().to_vec())
            .then_recv([wire::NAK])
            .expect_send(setter::SET_SCAN_PARAMETERS)
            .then_recv([wire::ACK])
            .expect_send(accepted_params.to_bytes().to_vec())
            .then_recv([wire::ACK])
            .expect_send(start_cmd)
            .then_recv(start_reply);

        let mut scanner = Scanner::open(cnx, &AcquisitionConfig::default()).unwrap();
        *scanner.option_map_mut() = opts;
        let cancel = CancelFlag::new();
        let session = scanner.acquire_image(&cancel).unwrap().expect("an image");
        drop(session);
        assert_eq!(scanner.active_parameters().line_count(), 100);
    }

    #[test]
    fn mid_scan_host_cancel_drains_to_empty() {
        let caps = Capability::from_bytes(sample_capability_bytes());
        let mut opts = OptionMap::new(caps.base_resolution());
        opts.finalize(&caps, None).unwrap();
        let mut expected_params = ScanParameters::default();
        apply_option_map(&mut expected_params, &opts, &caps);

        let chunk_a: Vec<u8> = std::iter::repeat(1).take(4).chain([0x00]).collect();
        let chunk_b: Vec<u8> = std::iter::repeat(2).take(4).chain([0x00]).collect();

        let cnx = open_script()
            .expect_send(action::CAPTURE_SCANNER)
            .then_recv([0x80])
            .expect_send(getter::GET_STATUS)
            .then_recv(info4(0x00, 16))
            .then_recv(ready_status_bytes())
            .expect_send(setter::SET_SCAN_PARAMETERS)
            .then_recv([wire::ACK])
            .expect_send(expected_params.to_bytes().to_vec())
            .then_recv([wire::ACK])
            .expect_send(START_EXTENDED_SCAN)
            .then_recv(info14(0x00, 4, 3, 4))
            .then_recv(chunk_a)
            .expect_send([wire::ACK])
            .then_recv(chunk_b)
            .expect_send([wire::CAN])
            .then_recv([wire::ACK]);

        let mut scanner = Scanner::open(cnx, &AcquisitionConfig::default()).unwrap();
        let cancel = CancelFlag::new();
        let mut session = scanner.acquire_image(&cancel).unwrap().expect("an image");

        let mut buf = [0u8; 4];
        assert_eq!(session.read(&mut buf).unwrap(), 4);
        assert_eq!(buf, [1, 1, 1, 1]);

        cancel.set();
        assert_eq!(session.read(&mut buf).unwrap(), 4);
        assert_eq!(buf, [2, 2, 2, 2]);

        assert_eq!(session.read(&mut buf).unwrap(), 0);
        assert!(session.was_cancelled());
    }

    /// §4.5 point 8 / §5: dropping an in-progress image session without
    /// reading it to completion implicitly cancels and drains the
    /// remaining chunk stream rather than leaving it mid-handshake.
    #[test]
    fn dropping_session_mid_stream_cancels_and_drains() {
        let caps = Capability::from_bytes(sample_capability_bytes());
        let mut opts = OptionMap::new(caps.base_resolution());
        opts.finalize(&caps, None).unwrap();
        let mut expected_params = ScanParameters::default();
        apply_option_map(&mut expected_params, &opts, &caps);

        let chunk_a: Vec<u8> = std::iter::repeat(1).take(4).chain([0x00]).collect();
        let chunk_b: Vec<u8> = std::iter::repeat(2).take(4).chain([0x00]).collect();

        let cnx = open_script()
            .expect_send(action::CAPTURE_SCANNER)
            .then_recv([0x80])
            .expect_send(getter::GET_STATUS)
            .then_recv(info4(0x00, 16))
            .then_recv(ready_status_bytes())
            .expect_send(setter::SET_SCAN_PARAMETERS)
            .then_recv([wire::ACK])
            .expect_send(expected_params.to_bytes().to_vec())
            .then_recv([wire::ACK])
            .expect_send(START_EXTENDED_SCAN)
            .then_recv(info14(0x00, 4, 2, 4))
            .then_recv(chunk_a)
            .expect_send([wire::ACK])
            .then_recv(chunk_b)
            .expect_send([wire::CAN])
            .then_recv([wire::ACK])
            // dropping mid-stream cancels (above) then, since the stream
            // ends cancelled, ejects and releases the lock.
            .expect_send(action::EJECT_MEDIA)
            .then_recv([wire::ACK])
            .expect_send(action::RELEASE_SCANNER)
            .then_recv([0x80]);

        let mut scanner = Scanner::open(cnx, &AcquisitionConfig::default()).unwrap();
        let cancel = CancelFlag::new();
        let mut session = scanner.acquire_image(&cancel).unwrap().expect("an image");

        let mut buf = [0u8; 4];
        assert_eq!(session.read(&mut buf).unwrap(), 4);
        assert_eq!(buf, [1, 1, 1, 1]);

        // Drop without reading the remaining chunk: should cancel and drain
        // on its own, then release the lock.
        drop(session);
        assert!(!scanner.is_locked());
    }

    #[test]
    fn adf_media_out_after_first_page_ends_the_job_without_error() {
        let mut caps_bytes = sample_capability_bytes();
        caps_bytes[44] = 0x01 | 0x02; // flatbed | adf
        let caps = Capability::from_bytes(caps_bytes);
        let mut opts = OptionMap::new(caps.base_resolution());
        opts.set_doc_source(DocSource::AdfSimplex);
        opts.finalize(&caps, None).unwrap();

        let mut expected_params = ScanParameters::default();
        apply_option_map(&mut expected_params, &opts, &caps);

        let (start_cmd, start_reply) = zero_chunk_scan_start();

        let mut media_out_status = ready_status_bytes();
        media_out_status[2] = 0x08; // source::MEDIA_OUT on the ADF byte

        let cnx = open_script()
            // first page: load-media ACKs, status shows media present
            .expect_send(action::CAPTURE_SCANNER)
            .then_recv([0x80])
            .expect_send(action::LOAD_MEDIA)
            .then_recv([wire::ACK])
            .expect_send(getter::GET_STATUS)
            .then_recv(info4(0x00, 16))
            .then_recv(ready_status_bytes())
            .expect_send(getter::GET_STATUS)
            .then_recv(info4(0x00, 16))
            .then_recv(ready_status_bytes())
            .expect_send(setter::SET_SCAN_PARAMETERS)
            .then_recv([wire::ACK])
            .expect_send(expected_params.to_bytes().to_vec())
            .then_recv([wire::ACK])
            .expect_send(start_cmd.clone())
            .then_recv(start_reply.clone())
            // second page: load-media ACKs, status shows media out
            .expect_send(action::CAPTURE_SCANNER)
            .then_recv([0x80])
            .expect_send(action::LOAD_MEDIA)
            .then_recv([wire::ACK])
            .expect_send(getter::GET_STATUS)
            .then_recv(info4(0x00, 16))
            .then_recv(media_out_status);

        let mut scanner = Scanner::open(cnx, &AcquisitionConfig::default()).unwrap();
        *scanner.option_map_mut() = opts;
        let cancel = CancelFlag::new();

        let first = scanner.acquire_image(&cancel).unwrap();
        assert!(first.is_some());
        drop(first);
        assert_eq!(scanner.images_started(), 1);

        let second = scanner.acquire_image(&cancel).unwrap();
        assert!(second.is_none());
        assert_eq!(scanner.images_started(), 1);
    }

    /// A device that never set the `supports-extended-commands` bit in its
    /// `get-extended-identity` reply is driven with `start-scan`'s simpler
    /// block stream instead of the chunked `start-extended-scan` handshake.
    #[test]
    fn legacy_device_uses_standard_scan() {
        let identity = sample_capability_bytes();
        let defaults = ScanParameters::default().to_bytes().to_vec();
        let status = ready_status_bytes();

        let caps = Capability::from_bytes(sample_capability_bytes());
        let mut opts = OptionMap::new(caps.base_resolution());
        opts.finalize(&caps, None).unwrap();
        let mut expected_params = ScanParameters::default();
        apply_option_map(&mut expected_params, &opts, &caps);

        let mut header = vec![wire::STX, 0x20]; // area-end bit set on this block
        let mut size = [0u8; 2];
        wire::from_u16(&mut size, 3);
        header.extend_from_slice(&size);
        let data = vec![1u8, 2, 3];

        let cnx = ScriptedConnexion::new()
            .expect_send(action::CAPTURE_SCANNER)
            .then_recv([0x80])
            .expect_send(action::INITIALIZE)
            .then_recv([wire::ACK])
            .expect_send(getter::GET_EXTENDED_IDENTITY)
            .then_recv(info4(0x00, identity.len() as u16)) // bit 0x02 unset: no extended-command support
            .then_recv(identity)
            .expect_send(getter::GET_SCAN_PARAMETERS)
            .then_recv(info4(0x00, defaults.len() as u16))
            .then_recv(defaults)
            .expect_send(getter::GET_STATUS)
            .then_recv(info4(0x00, status.len() as u16))
            .then_recv(status)
            .expect_send(action::RELEASE_SCANNER)
            .then_recv([0x80])
            .expect_send(action::CAPTURE_SCANNER)
            .then_recv([0x80])
            .expect_send(getter::GET_STATUS)
            .then_recv(info4(0x00, 16))
            .then_recv(ready_status_bytes())
            .expect_send(setter::SET_SCAN_PARAMETERS)
            .then_recv([wire::ACK])
            .expect_send(expected_params.to_bytes().to_vec())
            .then_recv([wire::ACK])
            .expect_send(crate::command::scan_start::START_SCAN)
            .then_recv(header)
            .then_recv(data);

        let mut scanner = Scanner::open(cnx, &AcquisitionConfig::default()).unwrap();
        assert!(!scanner.supports_extended_commands());

        let cancel = CancelFlag::new();
        let mut session = scanner.acquire_image(&cancel).unwrap().expect("an image");

        let mut image = Vec::new();
        session.read_to_end(&mut image).unwrap();
        assert_eq!(image, vec![1, 2, 3]);
    }
}
