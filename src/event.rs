//! Local events for the DTLS state machines.
//!
//! Queued by the engine and the handshake drivers, delivered via `poll_output`.

use crate::message::AlertDescription;
use crate::Output;

/// Events queued for delivery to the application.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum LocalEvent {
    /// First certificate of the peer's chain, DER.
    PeerCert(Vec<u8>),
    /// Handshake completed, both Finished verified.
    Connected,
    /// Decrypted application data.
    ApplicationData(Vec<u8>),
    /// Non-fatal alert from the peer.
    Warning(AlertDescription),
    /// The peer sent close_notify.
    Closed,
}

impl LocalEvent {
    /// Convert this event into an `Output`, copying any payload into `buf`.
    pub(crate) fn into_output(self, buf: &mut [u8]) -> Output<'_> {
        match self {
            LocalEvent::PeerCert(der) => Output::PeerCert(copy_into(buf, &der)),
            LocalEvent::Connected => Output::Connected,
            LocalEvent::ApplicationData(data) => Output::ApplicationData(copy_into(buf, &data)),
            LocalEvent::Warning(description) => Output::Warning(description),
            LocalEvent::Closed => Output::Closed,
        }
    }
}

pub(crate) fn copy_into<'a>(buf: &'a mut [u8], data: &[u8]) -> &'a [u8] {
    let len = data.len();
    assert!(
        len <= buf.len(),
        "Output buffer too small {} > {}",
        len,
        buf.len()
    );
    buf[..len].copy_from_slice(data);
    &buf[..len]
}
