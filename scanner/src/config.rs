//! Configuration for a scanner driver session.
//!
//! This is ambient tooling for a demo binary or CLI harness, not part of
//! the protocol engine's public API: [`crate::scanner::Scanner`] itself
//! takes already-resolved Rust values and never reads a config file. A
//! caller loads [`ScannerConfig`] once (e.g. from `~/.config/esci-scanner/
//! config.toml`) and uses its fields to build the transport and the
//! `Scanner`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration for a scanner session.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ScannerConfig {
    pub transport: TransportConfig,
    pub acquisition: AcquisitionConfig,
}

/// How to reach the device.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Path or address of the underlying transport (serial device node,
    /// USB bulk endpoint identifier, or `host:port` for a network
    /// connexion). Interpreting this string is entirely up to the
    /// transport implementation the caller plugs in; the protocol engine
    /// never opens a transport itself.
    pub address: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            address: "/dev/usb/scanner0".to_string(),
        }
    }
}

/// Defaults applied when constructing a [`crate::scanner::Scanner`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionConfig {
    /// Whether to run reserved-bit pedantic checks (logged, never fatal).
    pub pedantic: bool,
    /// Byte size of the host-side transfer buffer, used as one input to
    /// the line-count bisection (§4.6).
    pub buffer_size: u32,
    /// Reuse one chunk buffer across a whole scan instead of allocating
    /// fresh per chunk.
    pub reuse_chunk_buffer: bool,
    /// When set, overrides the default error-code mask (`0xf0`) that the
    /// extended-scan chunk stream applies after scrubbing the always-
    /// reserved low nibble -- useful for a transport known not to honour
    /// one of the documented bits.
    pub error_code_mask: Option<u8>,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            pedantic: false,
            buffer_size: 65536,
            reuse_chunk_buffer: true,
            error_code_mask: None,
        }
    }
}

impl ScannerConfig {
    pub fn config_dir() -> PathBuf {
        if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
            PathBuf::from(xdg).join("esci-scanner")
        } else if let Ok(home) = std::env::var("HOME") {
            PathBuf::from(home).join(".config").join("esci-scanner")
        } else {
            PathBuf::from(".config").join("esci-scanner")
        }
    }

    pub fn config_file() -> PathBuf {
        Self::config_dir().join("config.toml")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = ScannerConfig::default();
        assert!(!config.acquisition.pedantic);
        assert!(config.acquisition.buffer_size > 0);
        assert!(config.acquisition.error_code_mask.is_none());
    }
}
