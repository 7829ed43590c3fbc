//! Flash cross-domain policy escape hatch.
//!
//! Old Flash-based WebSocket shims open the socket with
//! `<policy-file-request/>` before anything else. When a provider is
//! configured the session answers with the policy text (NUL-terminated) and
//! closes, bypassing the handshake entirely.

/// Literal sent by a Flash client asking for the policy file.
pub const POLICY_REQUEST: &[u8] = b"<policy-file-request/>";

/// Source of the cross-domain policy document.
pub trait PolicyProvider: Send + Sync {
    /// Policy text to serve, or `None` to close without answering.
    fn policy_data(&self) -> Option<String>;
}

/// Serves a fixed policy document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaticPolicy(pub String);

impl PolicyProvider for StaticPolicy {
    fn policy_data(&self) -> Option<String> {
        (!self.0.is_empty()).then(|| self.0.clone())
    }
}

/// Returns `true` if `buf` contains a policy request.
#[must_use]
pub fn is_policy_request(buf: &[u8]) -> bool {
    buf.windows(POLICY_REQUEST.len())
        .any(|window| window == POLICY_REQUEST)
}
