//! The transport abstraction the protocol engine is built on.
//!
//! A `Connexion` delivers bytes reliably and in order; it says nothing about
//! how they get there. Serial ports, USB bulk endpoints, and network
//! sockets are all out of scope for this crate (transport implementation is
//! explicitly a downstream concern) -- the [`ScriptedConnexion`] below
//! exists purely so this crate's own tests and demo binary can drive the
//! protocol engine without real hardware.

use std::collections::VecDeque;

use crate::error::ScanError;

/// A blocking, ordered, reliable byte transport.
pub trait Connexion {
    /// Sends exactly `buf.len()` bytes, blocking until done or failing.
    fn send(&mut self, buf: &[u8]) -> Result<(), ScanError>;

    /// Fills `buf` completely, blocking until done or failing.
    fn recv(&mut self, buf: &mut [u8]) -> Result<(), ScanError>;
}

/// A scripted step of a [`ScriptedConnexion`]: either the bytes a `send`
/// call is expected to write, or the bytes the next `recv` call should
/// return.
#[derive(Debug, Clone)]
enum Step {
    ExpectSend(Vec<u8>),
    Recv(Vec<u8>),
}

/// An in-memory `Connexion` that plays back a fixed script of expected
/// sends and canned replies.
///
/// Used by this crate's own test suite and by `esci-scanner-cli` to
/// smoke-test the orchestration logic without a physical device. Panics
/// (via a returned [`ScanError::Protocol`]) on any divergence from the
/// script, which is exactly what a protocol-conformance test wants.
#[derive(Debug, Default)]
pub struct ScriptedConnexion {
    steps: VecDeque<Step>,
}

impl ScriptedConnexion {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues an expectation that the next `send` will write exactly `bytes`.
    pub fn expect_send(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.steps.push_back(Step::ExpectSend(bytes.into()));
        self
    }

    /// Queues a reply the next `recv` will return.
    pub fn then_recv(mut self, bytes: impl Into<Vec<u8>>) -> Self {
        self.steps.push_back(Step::Recv(bytes.into()));
        self
    }

    /// `true` once every scripted step has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.steps.is_empty()
    }
}

impl Connexion for ScriptedConnexion {
    fn send(&mut self, buf: &[u8]) -> Result<(), ScanError> {
        match self.steps.pop_front() {
            Some(Step::ExpectSend(expected)) if expected == buf => Ok(()),
            Some(Step::ExpectSend(expected)) => Err(ScanError::Protocol(format!(
                "unexpected send: got {buf:02x?}, expected {expected:02x?}"
            ))),
            Some(Step::Recv(_)) => Err(ScanError::Protocol(
                "send called but script expected a recv".into(),
            )),
            None => Err(ScanError::Protocol("send called but script is empty".into())),
        }
    }

    fn recv(&mut self, buf: &mut [u8]) -> Result<(), ScanError> {
        match self.steps.pop_front() {
            Some(Step::Recv(bytes)) if bytes.len() == buf.len() => {
                buf.copy_from_slice(&bytes);
                Ok(())
            }
            Some(Step::Recv(bytes)) => Err(ScanError::Protocol(format!(
                "recv size mismatch: buffer wants {}, script has {}",
                buf.len(),
                bytes.len()
            ))),
            Some(Step::ExpectSend(_)) => Err(ScanError::Protocol(
                "recv called but script expected a send".into(),
            )),
            None => Err(ScanError::Protocol("recv called but script is empty".into())),
        }
    }
}
