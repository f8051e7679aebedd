//! Process-wide, lazily built byte-value -> label / dimension lookup
//! tables.
//!
//! The source keeps these as heap-allocated globals built on first use and
//! never mutated again. `OnceLock` gives the same one-time initialization
//! with the happens-before guarantee the source relied on an implicit
//! memory barrier for, without needing `unsafe`.

use std::collections::HashMap;
use std::sync::OnceLock;

/// Physical dimensions, in inches, of a detected-media-size bit flag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PaperSize {
    pub width_in: f64,
    pub height_in: f64,
}

fn media_sizes() -> &'static HashMap<u16, PaperSize> {
    static TABLE: OnceLock<HashMap<u16, PaperSize>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let mut m = HashMap::new();
        m.insert(0x0001, PaperSize { width_in: 8.5, height_in: 14.0 }); // LTH (landscape)
        m.insert(0x0002, PaperSize { width_in: 8.5, height_in: 11.0 }); // LTV (Letter)
        m.insert(0x0004, PaperSize { width_in: 8.27, height_in: 11.69 }); // A4H
        m.insert(0x0008, PaperSize { width_in: 8.27, height_in: 11.69 }); // A4V
        m.insert(0x0010, PaperSize { width_in: 8.5, height_in: 14.0 }); // LGV (Legal)
        m.insert(0x0020, PaperSize { width_in: 10.12, height_in: 14.33 }); // B4V
        m.insert(0x0040, PaperSize { width_in: 11.0, height_in: 17.0 }); // WLT (Tabloid)
        m.insert(0x0080, PaperSize { width_in: 11.69, height_in: 16.54 }); // A3V
        m.insert(0x0400, PaperSize { width_in: 9.5, height_in: 14.0 }); // EXH
        m.insert(0x0800, PaperSize { width_in: 9.5, height_in: 14.0 }); // EXV
        m.insert(0x1000, PaperSize { width_in: 5.83, height_in: 8.27 }); // A5H
        m.insert(0x2000, PaperSize { width_in: 5.83, height_in: 8.27 }); // A5V
        m.insert(0x4000, PaperSize { width_in: 7.17, height_in: 10.12 }); // B5H
        m.insert(0x8000, PaperSize { width_in: 7.17, height_in: 10.12 }); // B5V
        m
    })
}

/// Resolves a detected-media-size code to its physical dimensions, if the
/// code is one this driver recognizes (the `UNK`/`UNKNOWN` code, and any
/// code this table has no entry for, resolve to `None`).
pub fn paper_size_for(code: u16) -> Option<PaperSize> {
    media_sizes().get(&code).copied()
}

fn film_types() -> &'static HashMap<u8, &'static str> {
    static TABLE: OnceLock<HashMap<u8, &'static str>> = OnceLock::new();
    TABLE.get_or_init(|| HashMap::from([(0x00, "Positive Film"), (0x01, "Negative Film")]))
}

pub fn film_type_label(code: u8) -> Option<&'static str> {
    film_types().get(&code).copied()
}

fn gamma_correction_labels() -> &'static HashMap<u8, &'static str> {
    static TABLE: OnceLock<HashMap<u8, &'static str>> = OnceLock::new();
    TABLE.get_or_init(|| {
        HashMap::from([
            (0x01, "Bi-level CRT"),
            (0x02, "Multi-level CRT"),
            (0x00, "High Density Print"),
            (0x10, "Low Density Print"),
            (0x20, "High Contrast Print"),
            (0x03, "Custom (Base Gamma = 1.0)"),
            (0x04, "Custom (Base Gamma = 1.8)"),
        ])
    })
}

pub fn gamma_correction_label(code: u8) -> Option<&'static str> {
    gamma_correction_labels().get(&code).copied()
}

fn color_correction_labels() -> &'static HashMap<u8, &'static str> {
    static TABLE: OnceLock<HashMap<u8, &'static str>> = OnceLock::new();
    TABLE.get_or_init(|| {
        HashMap::from([
            (0x00, "None"),
            (0x10, "Dot Matrix Printer"),
            (0x20, "Thermal Printer"),
            (0x40, "Inkjet Printer"),
            (0x80, "CRT Display"),
        ])
    })
}

pub fn color_correction_label(code: u8) -> Option<&'static str> {
    color_correction_labels().get(&code).copied()
}

fn dither_pattern_labels() -> &'static HashMap<u8, &'static str> {
    static TABLE: OnceLock<HashMap<u8, &'static str>> = OnceLock::new();
    TABLE.get_or_init(|| {
        HashMap::from([
            (0x01, "Bi-level"),
            (0x03, "Text Enhanced"),
            (0x00, "Hard Tone"),
            (0x10, "Soft Tone"),
            (0x20, "Net Screen"),
            (0x80, "Bayer 4x4"),
            (0x90, "Spiral 4x4"),
            (0xa0, "Net Screen 4x4"),
            (0xb0, "Net Screen 8x4"),
        ])
    })
}

pub fn dither_pattern_label(code: u8) -> Option<&'static str> {
    dither_pattern_labels().get(&code).copied()
}

/// Pre-calibrated 3x3 software color-correction matrices, keyed by the
/// exact product name a device reports in its extended identity (see
/// [`crate::records::capability::Capability::product_name`]). Only a
/// handful of calibrated models are known; everything else resolves to
/// `None` rather than guessing a matrix for unrecognized hardware.
fn color_correction_profiles() -> &'static HashMap<&'static str, [[f64; 3]; 3]> {
    static TABLE: OnceLock<HashMap<&'static str, [[f64; 3]; 3]>> = OnceLock::new();
    TABLE.get_or_init(|| {
        let profile_1 = [
            [1.2748, -0.2000, -0.0748],
            [-0.1512, 1.3811, -0.2299],
            [0.0000, -0.3582, 1.3582],
        ];
        let profile_2 = [
            [1.0567, 0.0415, -0.0982],
            [0.0289, 1.1112, -0.1401],
            [0.0193, -0.2250, 1.2057],
        ];
        HashMap::from([
            ("PID 08C0", profile_1),
            ("PID 08C2", profile_1),
            ("PID 08D1", profile_1),
            ("PID 08D2", profile_1),
            ("PID 08D3", profile_1),
            ("GT-X900", profile_2),
            ("Perfection V500", profile_2),
        ])
    })
}

/// Resolves a device's reported product name to its pre-calibrated software
/// color-correction matrix, if this driver has one on file.
pub fn color_correction_profile(product_name: &str) -> Option<[[f64; 3]; 3]> {
    color_correction_profiles().get(product_name).copied()
}
