//! The option map: user-facing scan settings, with doc-source dependent
//! subsets routed in and out as the selected source changes.
//!
//! Doc-source sub-maps (flatbed / ADF / TPU) are owned directly by
//! [`OptionMap`] as indexed entries rather than as a cyclic structure with
//! back-references into the active map: [`OptionMap::set_doc_source`]
//! copies the previous source's live values back into its slot and swaps
//! the new source's slot into the active fields.

use std::collections::HashMap;

use crate::codes::document_alignment;
use crate::dictionary;
use crate::error::ScanError;
use crate::geometry::{BoundingBox, Matrix, Point};
use crate::records::capability::Capability;

/// The physical input currently selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocSource {
    Flatbed,
    AdfSimplex,
    AdfDuplex,
    Tpu1,
    Tpu2,
}

/// How the active scan area should be resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanAreaSelection {
    /// Keep the user-supplied corners as-is.
    Manual(BoundingBox<u32>),
    /// Use the source's full reported bounds.
    Maximum,
    /// Probe device status for a detected media size (flatbed/ADF only).
    AutoDetect,
    /// Look up a named paper size and apply doc-source alignment.
    Named(String),
}

/// The user-facing image type, independent of the device's color-mode byte
/// encoding (which also depends on bit depth and color-mode sequence).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageType {
    Monochrome,
    Grayscale,
    Color,
}

/// The byte order color samples are delivered in, one of `codes::color_mode`'s
/// page/line/pixel-sequence families (§3). Only meaningful when
/// [`ImageType::Color`] is selected; monochrome and grayscale always use
/// `codes::color_mode::MONOCHROME` regardless of this setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorOrder {
    Grb,
    Rgb,
    /// Not representable in page sequence; [`TransferFormat::color_mode_byte`]
    /// falls back to `Rgb` for `TransferFormat::Page(Bgr)`.
    Bgr,
}

/// `transfer-format`: which of the device's page/line/pixel sequence color
/// modes is requested (§3's color-mode enumeration). The default, and the
/// only option most callers need, is `Pixel(Rgb)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferFormat {
    Page(ColorOrder),
    Line(ColorOrder),
    Pixel(ColorOrder),
}

impl Default for TransferFormat {
    fn default() -> Self {
        TransferFormat::Pixel(ColorOrder::Rgb)
    }
}

impl TransferFormat {
    /// The `color_mode` byte this format maps to, for use once
    /// [`ImageType::Color`] is already known to be selected.
    pub fn color_mode_byte(&self) -> u8 {
        use crate::codes::color_mode;
        match self {
            TransferFormat::Page(ColorOrder::Grb) => color_mode::PAGE_GRB,
            TransferFormat::Page(_) => color_mode::PAGE_RGB,
            TransferFormat::Line(ColorOrder::Grb) => color_mode::LINE_GRB,
            TransferFormat::Line(ColorOrder::Bgr) => color_mode::LINE_BGR,
            TransferFormat::Line(ColorOrder::Rgb) => color_mode::LINE_RGB,
            TransferFormat::Pixel(ColorOrder::Grb) => color_mode::PIXEL_GRB,
            TransferFormat::Pixel(ColorOrder::Bgr) => color_mode::PIXEL_BGR,
            TransferFormat::Pixel(ColorOrder::Rgb) => color_mode::PIXEL_RGB,
        }
    }
}

/// Per-source option values that persist across doc-source changes, so
/// switching back to a previously configured source restores it exactly as
/// the user left it.
#[derive(Debug, Clone)]
struct SourceOptions {
    scan_area: ScanAreaSelection,
    film_type: Option<u8>,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            scan_area: ScanAreaSelection::Maximum,
            film_type: None,
        }
    }
}

/// The derived pixel format for downstream consumers, recomputed on every
/// finalization pass from bit depth and color mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Mono1,
    Gray8,
    Gray16,
    Rgb8,
    Rgb16,
}

/// The minimum scan area accepted by [`OptionMap::finalize`]: 0.05 x 0.05
/// inches, expressed once finalization knows the active resolution.
pub const MIN_SCAN_AREA_IN: (f64, f64) = (0.05, 0.05);

/// The full set of user-facing scan options, plus the doc-source sub-maps
/// they are routed through.
#[derive(Debug, Clone)]
pub struct OptionMap {
    doc_source: DocSource,
    image_type: ImageType,
    bit_depth: u8,
    resolution: u32,
    duplex: bool,
    gamma_correction: u8,
    color_correction: u8,
    dither_pattern: u8,
    threshold: u8,
    sharpness: u8,
    brightness: u8,
    auto_area_segmentation: bool,
    mirror: bool,
    speed_hi: bool,
    line_count: u8,
    enable_resampling: bool,
    sw_resolution: u32,
    sw_color_correction: bool,
    cct: Option<Matrix<3>>,
    transfer_format: TransferFormat,

    active_scan_area: ScanAreaSelection,
    active_film_type: Option<u8>,
    sources: HashMap<DocSource, SourceOptions>,

    resolved_area: Option<BoundingBox<u32>>,
    pixel_format: Option<PixelFormat>,
    resolved_cct: Option<Matrix<3>>,
}

impl OptionMap {
    pub fn new(defaults_resolution: u32) -> Self {
        Self {
            doc_source: DocSource::Flatbed,
            image_type: ImageType::Color,
            bit_depth: 8,
            resolution: defaults_resolution,
            duplex: false,
            gamma_correction: 0,
            color_correction: 0,
            dither_pattern: 0,
            threshold: 0x80,
            sharpness: 0,
            brightness: 0,
            auto_area_segmentation: false,
            mirror: false,
            speed_hi: false,
            line_count: 0,
            enable_resampling: false,
            sw_resolution: defaults_resolution,
            sw_color_correction: false,
            cct: None,
            transfer_format: TransferFormat::default(),
            active_scan_area: ScanAreaSelection::Maximum,
            active_film_type: None,
            sources: HashMap::new(),
            resolved_area: None,
            pixel_format: None,
            resolved_cct: None,
        }
    }

    pub fn doc_source(&self) -> DocSource {
        self.doc_source
    }

    /// Switches the active doc-source, saving the outgoing source's live
    /// values into its own slot and restoring (or defaulting) the incoming
    /// source's values.
    pub fn set_doc_source(&mut self, source: DocSource) {
        if source == self.doc_source {
            return;
        }

        self.sources.insert(
            self.doc_source,
            SourceOptions {
                scan_area: self.active_scan_area.clone(),
                film_type: self.active_film_type,
            },
        );

        let incoming = self.sources.remove(&source).unwrap_or_default();
        self.active_scan_area = incoming.scan_area;
        self.active_film_type = incoming.film_type;
        self.duplex = matches!(source, DocSource::AdfDuplex);
        self.doc_source = source;
    }

    pub fn set_scan_area(&mut self, selection: ScanAreaSelection) {
        self.active_scan_area = selection;
    }

    pub fn set_image_type(&mut self, image_type: ImageType) {
        self.image_type = image_type;
    }

    pub fn set_resolution(&mut self, resolution: u32) {
        self.resolution = resolution;
        self.sw_resolution = resolution;
    }

    pub fn set_film_type(&mut self, film_type: u8) {
        self.active_film_type = Some(film_type);
    }

    pub fn set_threshold(&mut self, threshold: u8) {
        self.threshold = threshold;
    }

    pub fn set_mirror(&mut self, mirror: bool) {
        self.mirror = mirror;
    }

    pub fn set_speed_hi(&mut self, hi: bool) {
        self.speed_hi = hi;
    }

    pub fn set_line_count(&mut self, line_count: u8) {
        self.line_count = line_count;
    }

    pub fn set_bit_depth(&mut self, bit_depth: u8) {
        self.bit_depth = bit_depth;
    }

    pub fn set_gamma_correction(&mut self, v: u8) {
        self.gamma_correction = v;
    }

    pub fn set_color_correction(&mut self, v: u8) {
        self.color_correction = v;
    }

    pub fn set_dither_pattern(&mut self, v: u8) {
        self.dither_pattern = v;
    }

    pub fn set_sharpness(&mut self, v: u8) {
        self.sharpness = v;
    }

    pub fn set_brightness(&mut self, v: u8) {
        self.brightness = v;
    }

    pub fn set_auto_area_segmentation(&mut self, v: bool) {
        self.auto_area_segmentation = v;
    }

    pub fn set_enable_resampling(&mut self, v: bool) {
        self.enable_resampling = v;
    }

    pub fn set_sw_resolution(&mut self, v: u32) {
        self.sw_resolution = v;
    }

    pub fn set_transfer_format(&mut self, format: TransferFormat) {
        self.transfer_format = format;
    }

    pub fn transfer_format(&self) -> TransferFormat {
        self.transfer_format
    }

    pub fn set_sw_color_correction(&mut self, v: bool) {
        self.sw_color_correction = v;
    }

    pub fn sw_color_correction(&self) -> bool {
        self.sw_color_correction
    }

    /// Sets the nine `cct-N` color-correction coefficients (row-major 3x3),
    /// clamped and snapped to the protocol's representable range by
    /// [`Matrix::from_rows`]. Only consulted by callers when
    /// `color_correction` selects `codes::color_matrix::USER_DEFINED`; the
    /// scanner uploads it explicitly via `Scanner::upload_color_matrix`.
    pub fn set_cct(&mut self, coefficients: [[f64; 3]; 3]) {
        self.cct = Some(Matrix::from_rows(coefficients));
    }

    pub fn cct(&self) -> Option<Matrix<3>> {
        self.cct
    }

    /// The resolved color-correction matrix as of the last [`Self::finalize`]
    /// call, or `None` if no `cct-N` coefficients have been set.
    pub fn resolved_cct(&self) -> Option<Matrix<3>> {
        self.resolved_cct
    }

    pub fn scan_area_selection(&self) -> &ScanAreaSelection {
        &self.active_scan_area
    }

    pub fn bit_depth(&self) -> u8 {
        self.bit_depth
    }

    pub fn gamma_correction(&self) -> u8 {
        self.gamma_correction
    }

    pub fn color_correction(&self) -> u8 {
        self.color_correction
    }

    pub fn dither_pattern(&self) -> u8 {
        self.dither_pattern
    }

    pub fn sharpness(&self) -> u8 {
        self.sharpness
    }

    pub fn brightness(&self) -> u8 {
        self.brightness
    }

    pub fn auto_area_segmentation(&self) -> bool {
        self.auto_area_segmentation
    }

    pub fn enable_resampling(&self) -> bool {
        self.enable_resampling
    }

    pub fn sw_resolution(&self) -> u32 {
        self.sw_resolution
    }

    pub fn image_type(&self) -> ImageType {
        self.image_type
    }

    pub fn resolution(&self) -> u32 {
        self.resolution
    }

    pub fn duplex(&self) -> bool {
        self.duplex
    }

    pub fn film_type(&self) -> Option<u8> {
        self.active_film_type
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    pub fn mirror(&self) -> bool {
        self.mirror
    }

    pub fn speed_hi(&self) -> bool {
        self.speed_hi
    }

    pub fn line_count(&self) -> u8 {
        self.line_count
    }

    pub fn resolved_area(&self) -> Option<BoundingBox<u32>> {
        self.resolved_area
    }

    pub fn pixel_format(&self) -> Option<PixelFormat> {
        self.pixel_format
    }

    /// Re-resolves the scan area and pixel format from the current option
    /// values. Must be called after every mutation before the option map is
    /// translated into scan parameters.
    ///
    /// `detected_main_size_in` / `detected_adf_size_in` supply a
    /// already-probed auto-detect result (see the scanner orchestration's
    /// auto-detect polling loop); finalization itself never talks to the
    /// device.
    pub fn finalize(
        &mut self,
        caps: &Capability,
        detected_size_in: Option<(f64, f64)>,
    ) -> Result<(), ScanError> {
        let bounds = self.source_bounds(caps);

        let area = match &self.active_scan_area {
            ScanAreaSelection::Manual(bb) => *bb,
            ScanAreaSelection::Maximum => bounds,
            ScanAreaSelection::AutoDetect => match detected_size_in {
                Some((w_in, h_in)) => inches_to_pixels(w_in, h_in, self.resolution),
                None => bounds,
            },
            ScanAreaSelection::Named(name) => match named_paper_size_in(name) {
                Some((w_in, h_in)) => {
                    let area = inches_to_pixels(w_in, h_in, self.resolution);
                    self.align_to_doc_source(area, bounds, caps)
                }
                None => bounds,
            },
        };

        self.validate_min_area(&area)?;
        self.resolved_area = Some(area);

        if self.enable_resampling {
            // Software resampling exposes a wider store; no hardware
            // snapping needed.
        } else {
            self.resolution = nearest_hardware_resolution(caps, self.resolution);
        }

        self.pixel_format = Some(pixel_format_for(self.bit_depth, self.image_type, self.mirror));
        self.resolved_cct = self.cct;

        Ok(())
    }

    /// Shifts a named-paper-size area horizontally to match the feeder's
    /// reference edge (§4.6 "Document alignment"). Only ADF sources carry a
    /// meaningful alignment; flatbed and TPU areas are left at the
    /// top-left origin `named_paper_size_in` already produced. Unknown
    /// alignment is treated as left, i.e. no shift.
    fn align_to_doc_source(
        &self,
        area: BoundingBox<u32>,
        physical_bounds: BoundingBox<u32>,
        caps: &Capability,
    ) -> BoundingBox<u32> {
        if !matches!(self.doc_source, DocSource::AdfSimplex | DocSource::AdfDuplex) {
            return area;
        }

        let shift = match caps.document_alignment() {
            document_alignment::CENTER => {
                physical_bounds.width().saturating_sub(area.width()) / 2
            }
            document_alignment::RIGHT => physical_bounds.width().saturating_sub(area.width()),
            _ => 0,
        };

        BoundingBox::from_points(
            Point::new(physical_bounds.top_left().x + shift, area.top_left().y),
            Point::new(physical_bounds.top_left().x + shift + area.width(), area.bottom_right().y),
        )
    }

    fn source_bounds(&self, caps: &Capability) -> BoundingBox<u32> {
        let area = match self.doc_source {
            DocSource::Flatbed => caps.main_area(),
            DocSource::AdfSimplex | DocSource::AdfDuplex => caps.adf_area(),
            DocSource::Tpu1 | DocSource::Tpu2 => caps.tpu_area(),
        };
        BoundingBox::from_points(
            Point::new(u32::from(area.tl_x), u32::from(area.tl_y)),
            Point::new(u32::from(area.br_x), u32::from(area.br_y)),
        )
    }

    fn validate_min_area(&self, area: &BoundingBox<u32>) -> Result<(), ScanError> {
        let (min_w_in, min_h_in) = MIN_SCAN_AREA_IN;
        let min_w = (min_w_in * f64::from(self.resolution)).round() as u32;
        let min_h = (min_h_in * f64::from(self.resolution)).round() as u32;
        if area.width() < min_w || area.height() < min_h {
            return Err(ScanError::ConstraintViolation(format!(
                "scan area {}x{} pixels is smaller than the minimum {}x{} pixels \
                 ({min_w_in}x{min_h_in} inches at {} dpi)",
                area.width(),
                area.height(),
                min_w,
                min_h,
                self.resolution,
            )));
        }
        Ok(())
    }
}

fn inches_to_pixels(w_in: f64, h_in: f64, resolution: u32) -> BoundingBox<u32> {
    let w = (w_in * f64::from(resolution)).round() as u32;
    let h = (h_in * f64::from(resolution)).round() as u32;
    BoundingBox::from_points(Point::new(0, 0), Point::new(w, h))
}

/// Named paper sizes this driver knows how to resolve without a status
/// probe, in inches; callers convert to pixels at the active resolution via
/// [`inches_to_pixels`]. Kept intentionally small: this is not a general
/// paper-size database, just the handful the upstream option surface names
/// in its glossary.
fn named_paper_size_in(name: &str) -> Option<(f64, f64)> {
    Some(match name {
        "Letter" => (8.5, 11.0),
        "Legal" => (8.5, 14.0),
        "A4" => (8.27, 11.69),
        "A5" => (5.83, 8.27),
        "B5" => (7.17, 10.12),
        "Tabloid" => (11.0, 17.0),
        _ => return None,
    })
}

fn nearest_hardware_resolution(caps: &Capability, requested: u32) -> u32 {
    requested.clamp(caps.min_resolution(), caps.max_resolution())
}

fn pixel_format_for(bit_depth: u8, image_type: ImageType, _mirror: bool) -> PixelFormat {
    match (bit_depth, image_type) {
        (1, _) => PixelFormat::Mono1,
        (8, ImageType::Color) => PixelFormat::Rgb8,
        (16, ImageType::Color) => PixelFormat::Rgb16,
        (16, _) => PixelFormat::Gray16,
        (_, _) => PixelFormat::Gray8,
    }
}
