//! A single unit of image data delivered by the extended scan protocol.

/// Image bytes, optionally followed by a one-byte error code.
///
/// The empty, error-code-less chunk ([`Chunk::default`] / [`Chunk::null`])
/// is the terminal sentinel for the chunk stream: [`Chunk::is_null`] is
/// `true` for it and `false` for anything actually read from the device.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Chunk {
    bytes: Vec<u8>,
    error_code: Option<u8>,
}

impl Chunk {
    /// The terminal, empty chunk.
    pub fn null() -> Self {
        Self::default()
    }

    /// Allocates a chunk of `size` image bytes, with a trailing error-code
    /// byte slot when `with_error_code` is set.
    pub fn with_capacity(size: usize, with_error_code: bool) -> Self {
        Self {
            bytes: vec![0u8; size],
            error_code: with_error_code.then_some(0),
        }
    }

    /// Wraps already-read image bytes with no error-code byte, for the
    /// legacy block stream that carries none.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes, error_code: None }
    }

    pub fn is_null(&self) -> bool {
        self.bytes.is_empty() && self.error_code.is_none()
    }

    /// The number of bytes to read from the wire: the image bytes, plus one
    /// more when `with_error_code` carries a trailing error-code byte.
    pub fn wire_size(&self) -> usize {
        self.bytes.len() + usize::from(self.error_code.is_some())
    }

    /// A mutable view suitable for `recv`ing the full wire payload
    /// (image bytes followed by the error-code byte, if any) into.
    pub fn recv_buffer(&mut self) -> Vec<u8> {
        vec![0u8; self.wire_size()]
    }

    /// Splits a just-received wire payload into image bytes and error code.
    pub fn fill_from_wire(&mut self, wire: &[u8]) {
        let n = self.bytes.len();
        self.bytes.copy_from_slice(&wire[..n]);
        if self.error_code.is_some() {
            self.error_code = Some(wire[n]);
        }
    }

    pub fn image_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn error_code(&self) -> u8 {
        self.error_code.unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_chunk_is_falsy() {
        assert!(Chunk::null().is_null());
        assert!(Chunk::default().is_null());
    }

    #[test]
    fn allocated_chunk_is_not_null() {
        let c = Chunk::with_capacity(10, true);
        assert!(!c.is_null());
        assert_eq!(c.wire_size(), 11);
    }

    #[test]
    fn fill_from_wire_splits_error_code() {
        let mut c = Chunk::with_capacity(3, true);
        c.fill_from_wire(&[1, 2, 3, 0x20]);
        assert_eq!(c.image_bytes(), &[1, 2, 3]);
        assert_eq!(c.error_code(), 0x20);
    }
}
