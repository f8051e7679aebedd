//! Loopback smoke-test CLI for the ESC/I scanner driver.
//!
//! There is no real transport crate in this workspace (device discovery and
//! enumeration are out of scope for the protocol engine) -- this binary
//! drives [`esci_scanner::Scanner`] against a scripted in-memory
//! [`esci_scanner::ScriptedConnexion`] standing in for a device, so the
//! orchestration logic can be exercised end to end without hardware.

use std::io::Read;

use anyhow::{Context, Result};
use esci_scanner::{
    load_config, AcquisitionConfig, CancelFlag, DocSource, ImageType, OptionMap,
    ScanAreaSelection, ScriptedConnexion, Scanner,
};

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let config = load_config().context("loading configuration")?;
    tracing::info!(address = %config.transport.address, "loopback smoke test (no real transport attached)");

    let cnx = loopback_device();
    let mut scanner = Scanner::open(cnx, &config.acquisition).context("opening scanner session")?;
    tracing::info!(
        product = %scanner.caps().product_name(),
        base_resolution = scanner.caps().base_resolution(),
        "session opened"
    );

    configure_options(&mut scanner, &config.acquisition);

    let cancel = CancelFlag::new();
    match scanner.acquire_image(&cancel).context("acquiring image")? {
        Some(mut session) => {
            let mut image = Vec::new();
            session.read_to_end(&mut image).context("reading image bytes")?;
            tracing::info!(bytes = image.len(), "page captured");
        }
        None => tracing::info!("no media available"),
    }

    tracing::info!("scan job complete");
    Ok(())
}

fn configure_options(scanner: &mut Scanner<ScriptedConnexion>, _config: &AcquisitionConfig) {
    let opts = scanner.option_map_mut();
    opts.set_doc_source(DocSource::Flatbed);
    opts.set_image_type(ImageType::Color);
    opts.set_scan_area(ScanAreaSelection::Named("Letter".to_string()));
}

/// Scripts a single-page flatbed color scan against the protocol engine: the
/// full `open` handshake, one `acquire-image` lock/unlock cycle, and a short
/// two-chunk image stream.
fn loopback_device() -> ScriptedConnexion {
    use esci_scanner::wire;

    let identity = sample_capability_bytes();
    let defaults = [0u8; 64];
    let status = [0u8; 16];

    let info4 = |status: u8, len: u16| -> Vec<u8> {
        let mut blk = vec![wire::STX, status];
        let mut size = [0u8; 2];
        wire::from_u16(&mut size, len);
        blk.extend_from_slice(&size);
        blk
    };
    let info14 = |status: u8, chunk_size: u32, chunk_count: u32, final_bytes: u32| -> Vec<u8> {
        let mut blk = vec![wire::STX, status];
        let mut tmp = [0u8; 4];
        wire::from_u32(&mut tmp, chunk_size);
        blk.extend_from_slice(&tmp);
        wire::from_u32(&mut tmp, chunk_count);
        blk.extend_from_slice(&tmp);
        wire::from_u32(&mut tmp, final_bytes);
        blk.extend_from_slice(&tmp);
        blk
    };

    let chunk: Vec<u8> = std::iter::repeat(0xaa).take(4096).chain([0x00]).collect();
    let final_chunk: Vec<u8> = std::iter::repeat(0xbb).take(1024).chain([0x00]).collect();

    ScriptedConnexion::new()
        .expect_send([0x1b, b'('])
        .then_recv([0x80])
        .expect_send([0x1b, b'@'])
        .then_recv([wire::ACK])
        .expect_send([0x1c, b'I'])
        .then_recv(info4(0x02, identity.len() as u16))
        .then_recv(identity)
        .expect_send([0x1c, b'S'])
        .then_recv(info4(0x00, defaults.len() as u16))
        .then_recv(defaults.to_vec())
        .expect_send([0x1b, b'F'])
        .then_recv(info4(0x00, status.len() as u16))
        .then_recv(status.to_vec())
        .expect_send([0x1b, b')'])
        .then_recv([0x80])
        // acquire_image: capture, status poll, push params, start scan
        .expect_send([0x1b, b'('])
        .then_recv([0x80])
        .expect_send([0x1b, b'F'])
        .then_recv(info4(0x00, 16))
        .then_recv(status.to_vec())
        .expect_send([0x1c, b'W'])
        .then_recv([wire::ACK])
        .expect_send(sample_scan_parameters_bytes())
        .then_recv([wire::ACK])
        .expect_send([0x1c, b'G'])
        .then_recv(info14(0x00, 4096, 2, 1024))
        .then_recv(chunk)
        .expect_send([wire::ACK])
        .then_recv(final_chunk)
}

fn sample_capability_bytes() -> Vec<u8> {
    use esci_scanner::wire;

    let mut bytes = vec![0u8; 80];
    wire::from_u32(&mut bytes[4..], 300);
    wire::from_u32(&mut bytes[8..], 50);
    wire::from_u32(&mut bytes[12..], 1200);
    wire::from_u16(&mut bytes[20..], 0);
    wire::from_u16(&mut bytes[22..], 0);
    wire::from_u16(&mut bytes[24..], 2550);
    wire::from_u16(&mut bytes[26..], 3300);
    bytes[44] = 0x01; // flatbed only
    bytes
}

/// Matches the parameters [`configure_options`] resolves against
/// [`sample_capability_bytes`]: flatbed, full Letter area at 300dpi, 8-bit
/// color.
fn sample_scan_parameters_bytes() -> Vec<u8> {
    use esci_scanner::{codes, Capability, ScanParameters};

    let caps = Capability::from_bytes(sample_capability_bytes());
    let mut opts = OptionMap::new(caps.base_resolution());
    opts.set_doc_source(DocSource::Flatbed);
    opts.set_image_type(ImageType::Color);
    opts.set_scan_area(ScanAreaSelection::Named("Letter".to_string()));
    opts.finalize(&caps, None).expect("sample options resolve cleanly");

    let mut params = ScanParameters::default();
    params.set_resolution_main(opts.resolution());
    params.set_resolution_sub(opts.resolution());
    params.set_option_unit(codes::option_unit::MAIN_BODY);
    params.set_color_mode(codes::color_mode::PIXEL_RGB);
    params.set_bit_depth(opts.bit_depth());
    if let Some(area) = opts.resolved_area() {
        let offset = area.offset();
        let extent = area.extent();
        params.set_scan_area(offset.x, offset.y, extent.x, extent.y);
    }
    params.set_threshold(opts.threshold());
    params.to_bytes().to_vec()
}
