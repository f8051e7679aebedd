//! `esci-scanner`: a protocol engine and orchestration layer for ESC/I-style
//! document scanners.
//!
//! The crate is split into a wire layer (command byte-strings, fixed-size
//! records, little-endian integer helpers), a user-facing option surface
//! ([`option_map`]), and the [`scanner`] module that sequences both into the
//! flows a caller actually wants -- open a session, acquire one image at a
//! time, stream its bytes, tear down cleanly no matter how an acquisition
//! ends. [`connexion::Connexion`] is the one seam a downstream crate has to
//! fill in: this crate never opens a transport itself.

pub mod codes;
pub mod command;
pub mod config;
pub mod config_storage;
pub mod connexion;
pub mod dictionary;
pub mod error;
pub mod geometry;
pub mod option_map;
pub mod records;
pub mod scanner;
pub mod wire;

pub use config::{AcquisitionConfig, ScannerConfig, TransportConfig};
pub use config_storage::{load_config, load_config_from, save_config, save_config_to, ConfigError};
pub use connexion::{Connexion, ScriptedConnexion};
pub use error::{ScanError, SystemErrorCode};
pub use option_map::{DocSource, ImageType, OptionMap, PixelFormat, ScanAreaSelection};
pub use records::capability::Capability;
pub use records::chunk::Chunk;
pub use records::focus::FocusPosition;
pub use records::hardware_property::HardwareProperty;
pub use records::push_button::PushButtonStatus;
pub use records::scan_parameters::ScanParameters;
pub use records::status::Status;
pub use scanner::{CancelFlag, ImageSession, Scanner};
