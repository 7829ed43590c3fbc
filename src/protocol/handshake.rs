//! Upgrade handshake negotiation for both protocol generations.
//!
//! # Modern Request (RFC 6455)
//!
//! ```http
//! GET /chat HTTP/1.1
//! Host: server.example.com
//! Upgrade: websocket
//! Connection: Upgrade
//! Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==
//! Sec-WebSocket-Version: 13
//! ```
//!
//! Answered as soon as the header block ends.
//!
//! # Legacy Request (draft)
//!
//! ```http
//! GET /demo HTTP/1.1
//! Host: example.com
//! Connection: Upgrade
//! Upgrade: WebSocket
//! Sec-WebSocket-Key1: 4 @1  46546xW%0l 1 5
//! Sec-WebSocket-Key2: 12998 5 Y3 1  .P00
//!
//! ^n:ds[4U
//! ```
//!
//! Answered only after the 8-byte challenge body following the headers has
//! arrived.
//!
//! # State Machine
//!
//! ```text
//! AwaitingRequestLine -> AwaitingHeaders -+-> AwaitingModernReply --+-> Handshaked
//!                                         +-> AwaitingLegacyBody ---+
//!                  (any error) -> Failed
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::borrow::Cow;

use base64::Engine;
use base64::engine::general_purpose::STANDARD as Base64Standard;
use md5::Md5;
use rustc_hash::FxHashMap;
use sha1::{Digest, Sha1};
use tracing::{debug, trace};
use url::Url;

use crate::error::{Error, Result};

use super::ProtocolVariant;
use super::line::{LineReader, is_end_of_headers};

// ============================================================================
// Constants
// ============================================================================

/// RFC 6455 GUID appended to the client key before hashing.
pub const WS_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Size of the legacy challenge body.
pub const LEGACY_BODY_LEN: usize = 8;

// ============================================================================
// Token Computation
// ============================================================================

/// Computes the `Sec-WebSocket-Accept` value for a modern client key.
///
/// `base64(sha1(key + GUID))`.
///
/// # Example
///
/// ```
/// use websocket_server::protocol::handshake::compute_accept_key;
///
/// let accept = compute_accept_key("dGhlIHNhbXBsZSBub25jZQ==");
/// assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
/// ```
#[must_use]
pub fn compute_accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WS_GUID.as_bytes());
    Base64Standard.encode(hasher.finalize())
}

/// Extracts the number encoded in a legacy `Sec-WebSocket-Key1/2` value.
///
/// The digits form a number which is divided by the count of spaces (when
/// there are any). The result is truncated to 32 bits.
///
/// # Errors
///
/// Returns [`Error::MalformedHandshake`] if the digits do not fit in 128 bits.
pub fn legacy_key_number(key: &str) -> Result<u32> {
    let digits: String = key.chars().filter(char::is_ascii_digit).collect();
    let spaces = key.bytes().filter(|&b| b == b' ').count();

    let number: u128 = if digits.is_empty() {
        0
    } else {
        digits
            .parse()
            .map_err(|_| Error::malformed_handshake("legacy key number out of range"))?
    };

    let value = if spaces > 0 {
        number / spaces as u128
    } else {
        number
    };

    Ok(value as u32)
}

/// Computes the 16-byte legacy handshake token.
///
/// `md5(be32(key1) ++ be32(key2) ++ body)`.
///
/// # Errors
///
/// Propagates [`legacy_key_number`] failures.
pub fn legacy_token(key1: &str, key2: &str, body: &[u8; LEGACY_BODY_LEN]) -> Result<[u8; 16]> {
    let mut hasher = Md5::new();
    hasher.update(legacy_key_number(key1)?.to_be_bytes());
    hasher.update(legacy_key_number(key2)?.to_be_bytes());
    hasher.update(body);

    let mut token = [0u8; 16];
    token.copy_from_slice(&hasher.finalize());
    Ok(token)
}

// ============================================================================
// Headers
// ============================================================================

/// Request headers keyed by normalized name.
///
/// Names are upper-cased with `-` replaced by `_`, so `Sec-WebSocket-Key`,
/// `sec-websocket-key` and `SEC_WEBSOCKET_KEY` are the same header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    map: FxHashMap<String, String>,
}

impl Headers {
    /// Creates an empty header set.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalizes a header name.
    #[must_use]
    pub fn normalize(name: &str) -> String {
        name.trim().to_ascii_uppercase().replace('-', "_")
    }

    /// Inserts a header, replacing any previous value.
    pub fn insert(&mut self, name: &str, value: impl Into<String>) {
        self.map.insert(Self::normalize(name), value.into());
    }

    /// Looks up a header by any spelling of its name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(&Self::normalize(name)).map(String::as_str)
    }

    /// Looks up a header and treats an empty value as absent.
    #[must_use]
    pub fn get_non_empty(&self, name: &str) -> Option<&str> {
        self.get(name).filter(|v| !v.is_empty())
    }

    /// Number of headers.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Returns `true` if no header was parsed.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Iterates over `(normalized name, value)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.map.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parses one `Name: Value` line. Lines without `": "` are ignored.
    fn insert_line(&mut self, line: &str) {
        if let Some((name, value)) = line.split_once(": ") {
            self.insert(name, value.trim_end_matches(['\r', '\n']));
        }
    }
}

// ============================================================================
// HandshakeRequest
// ============================================================================

/// The parsed upgrade request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeRequest {
    /// Request method, e.g. `GET`.
    pub method: String,
    /// Raw request target as sent.
    pub target: String,
    /// Protocol version, e.g. `HTTP/1.1`. Empty if omitted.
    pub protocol: String,
    /// Path component, `/` when the target has none.
    pub path: String,
    /// Query component without the `?`.
    pub query: Option<String>,
    /// Request headers.
    pub headers: Headers,
    /// Cookies from the `Cookie` header, percent-decoded.
    pub cookies: FxHashMap<String, String>,
}

impl HandshakeRequest {
    /// Parses a request line such as `GET /chat?room=1 HTTP/1.1`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MalformedHandshake`] if the method or target is
    /// missing, or an absolute-form target is not a valid URL.
    pub fn from_request_line(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let mut parts = line.split(' ');

        let method = parts.next().filter(|m| !m.is_empty()).ok_or_else(|| {
            Error::malformed_handshake("empty request line")
        })?;
        let target = parts
            .next()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Error::malformed_handshake(format!("no request target in {line:?}")))?;
        let protocol = parts.next().unwrap_or_default();

        let (path, query) = split_target(target)?;

        Ok(Self {
            method: method.to_string(),
            target: target.to_string(),
            protocol: protocol.to_string(),
            path,
            query,
            headers: Headers::new(),
            cookies: FxHashMap::default(),
        })
    }

    /// Path plus query, as it appeared on the wire.
    #[must_use]
    pub fn request_uri(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{}", self.path, query),
            None => self.path.clone(),
        }
    }

    /// First path segment after the leading slash.
    ///
    /// `/chat/room` yields `chat`; `/` yields the empty string.
    #[must_use]
    pub fn route_name(&self) -> &str {
        self.path.split('/').nth(1).unwrap_or_default()
    }

    fn parse_cookies(&mut self) {
        if let Some(raw) = self.headers.get("Cookie") {
            self.cookies = parse_cookie_header(raw);
        }
    }
}

/// Splits a request target into path and query.
///
/// Absolute-form targets (`ws://host/chat`) go through the URL parser.
/// Origin-form targets (`/chat?x=1`) keep their path as sent, dot segments
/// included. Anything else has path `/`.
fn split_target(target: &str) -> Result<(String, Option<String>)> {
    if target.contains("://") {
        let url = Url::parse(target)
            .map_err(|e| Error::malformed_handshake(format!("bad request target {target:?}: {e}")))?;
        let path = match url.path() {
            "" => "/",
            p => p,
        };
        return Ok((path.to_string(), url.query().map(str::to_string)));
    }

    let (raw_path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query.to_string())),
        None => (target, None),
    };

    let path = if raw_path.starts_with('/') { raw_path } else { "/" };
    Ok((path.to_string(), query))
}

/// Parses `name=value; name2=value2` with percent-decoding.
#[must_use]
pub fn parse_cookie_header(raw: &str) -> FxHashMap<String, String> {
    raw.split(';')
        .filter_map(|pair| {
            let pair = pair.trim();
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let name = decode_component(name);
            (!name.is_empty()).then(|| (name, decode_component(value)))
        })
        .collect()
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(Cow::Borrowed(s)) => s.to_string(),
        Ok(Cow::Owned(s)) => s,
        Err(_) => spaced,
    }
}

// ============================================================================
// HandshakeState
// ============================================================================

/// Negotiation progress. Transitions only move forward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    /// Waiting for `GET /path HTTP/1.1`.
    AwaitingRequestLine,
    /// Collecting header lines.
    AwaitingHeaders,
    /// Legacy request classified; waiting for the 8-byte challenge.
    AwaitingLegacyBody {
        /// `Sec-WebSocket-Key1` value.
        key1: String,
        /// `Sec-WebSocket-Key2` value.
        key2: String,
    },
    /// Modern request classified; reply ready once the upstream accepts.
    AwaitingModernReply,
    /// Reply sent.
    Handshaked,
    /// Negotiation failed. Terminal.
    Failed,
}

// ============================================================================
// Negotiation Result
// ============================================================================

/// A negotiated upgrade waiting for upstream approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upgrade {
    /// Selected protocol generation.
    pub variant: ProtocolVariant,
    /// Bytes to write once the upstream accepts.
    pub reply: Vec<u8>,
}

/// Outcome of [`Negotiator::advance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    /// More bytes are required.
    Pending,
    /// The wire-level negotiation succeeded.
    Ready(Upgrade),
}

// ============================================================================
// Negotiator
// ============================================================================

/// Drives the handshake state machine over a receive buffer.
#[derive(Debug, Clone)]
pub struct Negotiator {
    state: HandshakeState,
    reader: LineReader,
    request: Option<HandshakeRequest>,
    max_pending: usize,
}

impl Negotiator {
    /// Creates a negotiator waiting for a request line.
    ///
    /// `max_pending` bounds the bytes buffered while no complete line is
    /// available.
    #[must_use]
    pub fn new(max_pending: usize) -> Self {
        Self {
            state: HandshakeState::AwaitingRequestLine,
            reader: LineReader::new(),
            request: None,
            max_pending,
        }
    }

    /// Creates a negotiator for a request whose head was already parsed
    /// elsewhere (an HTTP server handing over an upgrade).
    ///
    /// Negotiation resumes at the end of the header block.
    #[must_use]
    pub fn resume(request: HandshakeRequest, max_pending: usize) -> Self {
        Self {
            state: HandshakeState::AwaitingHeaders,
            reader: LineReader::new(),
            request: Some(request),
            max_pending,
        }
    }

    /// Current state.
    #[inline]
    #[must_use]
    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    /// The request parsed so far.
    #[inline]
    #[must_use]
    pub fn request(&self) -> Option<&HandshakeRequest> {
        self.request.as_ref()
    }

    /// Consumes handshake bytes from the head of `buf`.
    ///
    /// Bytes following the handshake stay in `buf`.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedHandshake`] for a bad request line or missing
    ///   upgrade headers
    /// - [`Error::HeaderLimit`] if the header block is too long
    ///
    /// Any error moves the negotiator to [`HandshakeState::Failed`].
    pub fn advance(&mut self, buf: &mut Vec<u8>) -> Result<Progress> {
        let result = self.step(buf);
        if result.is_err() {
            self.state = HandshakeState::Failed;
        }
        result
    }

    /// Marks the reply as sent.
    pub fn complete(&mut self) {
        self.state = HandshakeState::Handshaked;
    }

    /// Marks the negotiation as failed.
    pub fn fail(&mut self) {
        self.state = HandshakeState::Failed;
    }

    fn step(&mut self, buf: &mut Vec<u8>) -> Result<Progress> {
        loop {
            match &self.state {
                HandshakeState::AwaitingRequestLine | HandshakeState::AwaitingHeaders => {
                    let Some(line) = self.reader.next_line(buf)? else {
                        if buf.len() >= self.max_pending {
                            return Err(Error::malformed_handshake(format!(
                                "no line terminator within {} bytes",
                                self.max_pending
                            )));
                        }
                        return Ok(Progress::Pending);
                    };

                    if let Some(upgrade) = self.on_line(&line)? {
                        return Ok(Progress::Ready(upgrade));
                    }
                }

                HandshakeState::AwaitingLegacyBody { key1, key2 } => {
                    if buf.len() < LEGACY_BODY_LEN {
                        return Ok(Progress::Pending);
                    }

                    let mut body = [0u8; LEGACY_BODY_LEN];
                    body.copy_from_slice(&buf[..LEGACY_BODY_LEN]);
                    buf.drain(..LEGACY_BODY_LEN);

                    let token = legacy_token(key1, key2, &body)?;
                    let request = self.parsed_request()?;
                    debug!(path = %request.path, "Legacy handshake body received");

                    return Ok(Progress::Ready(Upgrade {
                        variant: ProtocolVariant::Legacy,
                        reply: legacy_reply(request, &token),
                    }));
                }

                HandshakeState::AwaitingModernReply | HandshakeState::Handshaked => {
                    return Ok(Progress::Pending);
                }

                HandshakeState::Failed => {
                    return Err(Error::malformed_handshake("handshake already failed"));
                }
            }
        }
    }

    /// Handles one line. Returns an upgrade when a modern request completes.
    fn on_line(&mut self, raw: &[u8]) -> Result<Option<Upgrade>> {
        let line = String::from_utf8_lossy(raw);

        if self.state == HandshakeState::AwaitingRequestLine {
            if is_end_of_headers(raw) {
                return Ok(None);
            }

            let request = HandshakeRequest::from_request_line(&line)?;
            trace!(method = %request.method, target = %request.target, "Request line parsed");

            self.request = Some(request);
            self.state = HandshakeState::AwaitingHeaders;
            return Ok(None);
        }

        if !is_end_of_headers(raw) {
            if let Some(request) = self.request.as_mut() {
                request.headers.insert_line(&line);
            }
            return Ok(None);
        }

        self.classify()
    }

    /// Chooses the protocol generation once the header block has ended.
    fn classify(&mut self) -> Result<Option<Upgrade>> {
        let request = self
            .request
            .as_mut()
            .ok_or_else(|| Error::malformed_handshake("headers ended before request line"))?;
        request.parse_cookies();

        let headers = &request.headers;

        let connection = headers.get("Connection").unwrap_or_default();
        if !contains_ignore_case(connection, "upgrade") {
            return Err(Error::malformed_handshake(
                "Connection header does not request an upgrade",
            ));
        }

        let upgrade = headers.get("Upgrade").unwrap_or_default();

        if let (Some(key), Some(_), Some(_)) = (
            headers.get_non_empty("Sec-WebSocket-Key"),
            headers.get_non_empty("Sec-WebSocket-Version"),
            headers.get_non_empty("Host"),
        ) && !request.path.is_empty()
        {
            if !contains_ignore_case(upgrade, "websocket") {
                return Err(Error::malformed_handshake(format!(
                    "unexpected Upgrade header {upgrade:?}"
                )));
            }

            let accept = compute_accept_key(key);
            debug!(path = %request.path, "Modern handshake negotiated");

            self.state = HandshakeState::AwaitingModernReply;
            return Ok(Some(Upgrade {
                variant: ProtocolVariant::Modern,
                reply: modern_reply(&accept),
            }));
        }

        if let (Some(key1), Some(key2)) = (
            headers.get("Sec-WebSocket-Key1"),
            headers.get("Sec-WebSocket-Key2"),
        ) {
            if upgrade != "WebSocket" {
                return Err(Error::malformed_handshake(format!(
                    "legacy request with Upgrade header {upgrade:?}"
                )));
            }

            debug!(path = %request.path, "Legacy handshake negotiated, awaiting body");

            self.state = HandshakeState::AwaitingLegacyBody {
                key1: key1.to_string(),
                key2: key2.to_string(),
            };
            return Ok(None);
        }

        Err(Error::malformed_handshake(
            "neither Sec-WebSocket-Key nor Sec-WebSocket-Key1/Key2 present",
        ))
    }

    fn parsed_request(&self) -> Result<&HandshakeRequest> {
        self.request
            .as_ref()
            .ok_or_else(|| Error::malformed_handshake("no request parsed"))
    }
}

// ============================================================================
// Replies
// ============================================================================

/// Builds the RFC 6455 `101 Switching Protocols` reply.
#[must_use]
pub fn modern_reply(accept: &str) -> Vec<u8> {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Protocol: chat\r\n\
         Sec-WebSocket-Accept: {accept}\r\n\r\n"
    )
    .into_bytes()
}

/// Builds the draft `101 Web Socket Protocol Handshake` reply.
#[must_use]
pub fn legacy_reply(request: &HandshakeRequest, token: &[u8; 16]) -> Vec<u8> {
    let headers = &request.headers;
    let mut reply = format!(
        "HTTP/1.1 101 Web Socket Protocol Handshake\r\n\
         Upgrade: WebSocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Origin: {}\r\n\
         Sec-WebSocket-Location: ws://{}{}\r\n",
        headers.get("Origin").unwrap_or_default(),
        headers.get("Host").unwrap_or_default(),
        request.request_uri(),
    );

    if let Some(protocol) = headers.get("Sec-WebSocket-Protocol") {
        reply.push_str(&format!("Sec-WebSocket-Protocol: {protocol}\r\n"));
    }
    reply.push_str("\r\n");

    let mut bytes = reply.into_bytes();
    bytes.extend_from_slice(token);
    bytes
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack
        .to_ascii_lowercase()
        .contains(&needle.to_ascii_lowercase())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 16384;

    const MODERN_REQUEST: &[u8] = b"GET /chat HTTP/1.1\r\n\
        Host: x\r\n\
        Connection: Upgrade\r\n\
        Upgrade: websocket\r\n\
        Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
        Sec-WebSocket-Version: 13\r\n\r\n";

    const LEGACY_REQUEST: &[u8] = b"GET /demo HTTP/1.1\r\n\
        Host: example.com\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key2: 12998 5 Y3 1  .P00\r\n\
        Sec-WebSocket-Protocol: sample\r\n\
        Upgrade: WebSocket\r\n\
        Sec-WebSocket-Key1: 4 @1  46546xW%0l 1 5\r\n\
        Origin: http://example.com\r\n\r\n";

    const LEGACY_BODY: &[u8; 8] = b"^n:ds[4U";

    /// Token from the draft-76 example exchange.
    const LEGACY_TOKEN: &[u8; 16] = b"8jKS'y:G*Co,Wxa-";

    fn advance_all(negotiator: &mut Negotiator, input: &[u8]) -> (Result<Progress>, Vec<u8>) {
        let mut buf = input.to_vec();
        let progress = negotiator.advance(&mut buf);
        (progress, buf)
    }

    #[test]
    fn test_compute_accept_key() {
        assert_eq!(
            compute_accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn test_legacy_key_number() {
        assert_eq!(legacy_key_number("4 @1  46546xW%0l 1 5").ok(), Some(829_309_203));
        assert_eq!(legacy_key_number("12998 5 Y3 1  .P00").ok(), Some(259_970_620));
        assert_eq!(legacy_key_number("no digits").ok(), Some(0));
        assert_eq!(legacy_key_number("12345").ok(), Some(12345));
    }

    #[test]
    fn test_legacy_token() {
        let token = legacy_token(
            "4 @1  46546xW%0l 1 5",
            "12998 5 Y3 1  .P00",
            LEGACY_BODY,
        )
        .expect("token");
        assert_eq!(&token, LEGACY_TOKEN);
    }

    #[test]
    fn test_headers_normalized() {
        let mut headers = Headers::new();
        headers.insert("Sec-WebSocket-Key", "abc");
        assert_eq!(headers.get("sec-websocket-key"), Some("abc"));
        assert_eq!(headers.get("SEC_WEBSOCKET_KEY"), Some("abc"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_header_value_keeps_later_separators() {
        let mut headers = Headers::new();
        headers.insert_line("Origin: http://a: b\r\n");
        headers.insert_line("NoSeparator\r\n");
        assert_eq!(headers.get("Origin"), Some("http://a: b"));
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_request_line_parsing() {
        let request =
            HandshakeRequest::from_request_line("GET /chat/room?id=7 HTTP/1.1\r\n").expect("parse");
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/chat/room");
        assert_eq!(request.query.as_deref(), Some("id=7"));
        assert_eq!(request.protocol, "HTTP/1.1");
        assert_eq!(request.request_uri(), "/chat/room?id=7");
        assert_eq!(request.route_name(), "chat");
    }

    #[test]
    fn test_request_line_absolute_target() {
        let request =
            HandshakeRequest::from_request_line("GET ws://host:8047 HTTP/1.1").expect("parse");
        assert_eq!(request.path, "/");
        assert_eq!(request.route_name(), "");
    }

    #[test]
    fn test_request_line_relative_target_has_root_path() {
        let request = HandshakeRequest::from_request_line("GET chat HTTP/1.1").expect("parse");
        assert_eq!(request.path, "/");
        assert_eq!(request.route_name(), "");
        assert_eq!(request.request_uri(), "/");
    }

    #[test]
    fn test_request_line_keeps_dot_segments() {
        let request =
            HandshakeRequest::from_request_line("GET /a/../chat?x=1 HTTP/1.1").expect("parse");
        assert_eq!(request.path, "/a/../chat");
        assert_eq!(request.route_name(), "a");
        assert_eq!(request.request_uri(), "/a/../chat?x=1");
    }

    #[test]
    fn test_request_line_bad_absolute_target() {
        assert!(matches!(
            HandshakeRequest::from_request_line("GET ws://[bad HTTP/1.1"),
            Err(Error::MalformedHandshake { .. })
        ));
    }

    #[test]
    fn test_request_line_missing_target() {
        assert!(matches!(
            HandshakeRequest::from_request_line("GET\r\n"),
            Err(Error::MalformedHandshake { .. })
        ));
        assert!(HandshakeRequest::from_request_line("\r\n").is_err());
    }

    #[test]
    fn test_cookie_parsing() {
        let cookies = parse_cookie_header("sid=a%20b; theme=dark+mode;;flag");
        assert_eq!(cookies.get("sid").map(String::as_str), Some("a b"));
        assert_eq!(cookies.get("theme").map(String::as_str), Some("dark mode"));
        assert_eq!(cookies.get("flag").map(String::as_str), Some(""));
        assert_eq!(cookies.len(), 3);
    }

    #[test]
    fn test_modern_negotiation() {
        let mut negotiator = Negotiator::new(MAX);
        let (progress, rest) = advance_all(&mut negotiator, MODERN_REQUEST);

        let Progress::Ready(upgrade) = progress.expect("negotiate") else {
            panic!("modern handshake should be ready");
        };
        assert_eq!(upgrade.variant, ProtocolVariant::Modern);
        let reply = String::from_utf8(upgrade.reply).expect("utf8");
        assert!(reply.starts_with("HTTP/1.1 101 Switching Protocols\r\n"));
        assert!(reply.contains("Sec-WebSocket-Accept: s3pPLMBiTxaQ9kYGzzhZRbK+xOo=\r\n"));
        assert!(reply.ends_with("\r\n\r\n"));
        assert!(rest.is_empty());
        assert_eq!(negotiator.state(), &HandshakeState::AwaitingModernReply);

        negotiator.complete();
        assert_eq!(negotiator.state(), &HandshakeState::Handshaked);
    }

    #[test]
    fn test_modern_negotiation_byte_by_byte() {
        let mut negotiator = Negotiator::new(MAX);
        let mut buf = Vec::new();
        let mut ready = None;

        for &byte in MODERN_REQUEST {
            buf.push(byte);
            if let Progress::Ready(upgrade) = negotiator.advance(&mut buf).expect("advance") {
                ready = Some(upgrade);
            }
        }

        assert_eq!(ready.map(|u| u.variant), Some(ProtocolVariant::Modern));
    }

    #[test]
    fn test_trailing_bytes_stay_buffered() {
        let mut input = MODERN_REQUEST.to_vec();
        input.extend_from_slice(&[0x81, 0x80]);

        let mut negotiator = Negotiator::new(MAX);
        let (progress, rest) = advance_all(&mut negotiator, &input);
        assert!(matches!(progress, Ok(Progress::Ready(_))));
        assert_eq!(rest, [0x81, 0x80]);
    }

    #[test]
    fn test_legacy_waits_for_body() {
        let mut negotiator = Negotiator::new(MAX);
        let mut buf = LEGACY_REQUEST.to_vec();
        buf.extend_from_slice(&LEGACY_BODY[..7]);

        assert_eq!(negotiator.advance(&mut buf).ok(), Some(Progress::Pending));
        assert!(matches!(
            negotiator.state(),
            HandshakeState::AwaitingLegacyBody { .. }
        ));
        assert_eq!(buf.len(), 7);

        buf.push(LEGACY_BODY[7]);
        let Progress::Ready(upgrade) = negotiator.advance(&mut buf).expect("advance") else {
            panic!("legacy handshake should be ready");
        };

        assert_eq!(upgrade.variant, ProtocolVariant::Legacy);
        assert!(buf.is_empty());

        let expected_head = "HTTP/1.1 101 Web Socket Protocol Handshake\r\n\
            Upgrade: WebSocket\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Origin: http://example.com\r\n\
            Sec-WebSocket-Location: ws://example.com/demo\r\n\
            Sec-WebSocket-Protocol: sample\r\n\r\n";
        let mut expected = expected_head.as_bytes().to_vec();
        expected.extend_from_slice(LEGACY_TOKEN);
        assert_eq!(upgrade.reply, expected);
    }

    #[test]
    fn test_legacy_requires_exact_upgrade() {
        let request = String::from_utf8_lossy(LEGACY_REQUEST).replace("Upgrade: WebSocket", "Upgrade: websocket");
        let mut negotiator = Negotiator::new(MAX);
        let (progress, _) = advance_all(&mut negotiator, request.as_bytes());
        assert!(matches!(progress, Err(Error::MalformedHandshake { .. })));
        assert_eq!(negotiator.state(), &HandshakeState::Failed);
    }

    #[test]
    fn test_missing_connection_upgrade_fails() {
        let request = String::from_utf8_lossy(MODERN_REQUEST).replace("Connection: Upgrade", "Connection: keep-alive");
        let mut negotiator = Negotiator::new(MAX);
        let (progress, _) = advance_all(&mut negotiator, request.as_bytes());
        assert!(matches!(progress, Err(Error::MalformedHandshake { .. })));
    }

    #[test]
    fn test_connection_header_substring_match() {
        let request = String::from_utf8_lossy(MODERN_REQUEST)
            .replace("Connection: Upgrade", "Connection: keep-alive, upgrade");
        let mut negotiator = Negotiator::new(MAX);
        let (progress, _) = advance_all(&mut negotiator, request.as_bytes());
        assert!(matches!(progress, Ok(Progress::Ready(_))));
    }

    #[test]
    fn test_missing_version_fails() {
        let request = String::from_utf8_lossy(MODERN_REQUEST).replace("Sec-WebSocket-Version: 13\r\n", "");
        let mut negotiator = Negotiator::new(MAX);
        let (progress, _) = advance_all(&mut negotiator, request.as_bytes());
        assert!(progress.is_err());
    }

    #[test]
    fn test_modern_preferred_over_legacy_keys() {
        let request = String::from_utf8_lossy(MODERN_REQUEST).replace(
            "Sec-WebSocket-Version: 13\r\n",
            "Sec-WebSocket-Version: 13\r\nSec-WebSocket-Key1: 1 2\r\nSec-WebSocket-Key2: 3 4\r\n",
        );
        let mut negotiator = Negotiator::new(MAX);
        let (progress, _) = advance_all(&mut negotiator, request.as_bytes());
        let Ok(Progress::Ready(upgrade)) = progress else {
            panic!("expected modern upgrade");
        };
        assert_eq!(upgrade.variant, ProtocolVariant::Modern);
    }

    #[test]
    fn test_leading_blank_lines_skipped() {
        let mut input = b"\r\n".to_vec();
        input.extend_from_slice(MODERN_REQUEST);
        let mut negotiator = Negotiator::new(MAX);
        let (progress, _) = advance_all(&mut negotiator, &input);
        assert!(matches!(progress, Ok(Progress::Ready(_))));
    }

    #[test]
    fn test_unterminated_line_bounded() {
        let mut negotiator = Negotiator::new(64);
        let (progress, _) = advance_all(&mut negotiator, &[b'a'; 64]);
        assert!(matches!(progress, Err(Error::MalformedHandshake { .. })));
    }

    #[test]
    fn test_header_flood_rejected() {
        let mut input = b"GET / HTTP/1.1\r\n".to_vec();
        input.extend(b"X-Filler: 1\r\n".repeat(120));
        let mut negotiator = Negotiator::new(1 << 20);
        let (progress, _) = advance_all(&mut negotiator, &input);
        assert!(matches!(progress, Err(Error::HeaderLimit { .. })));
    }

    #[test]
    fn test_resume_from_parsed_request() {
        let mut request = HandshakeRequest::from_request_line("GET /chat HTTP/1.1").expect("parse");
        request.headers.insert("Host", "x");
        request.headers.insert("Connection", "Upgrade");
        request.headers.insert("Upgrade", "websocket");
        request.headers.insert("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==");
        request.headers.insert("Sec-WebSocket-Version", "13");
        request.headers.insert("Cookie", "user=bob");

        let mut negotiator = Negotiator::resume(request, MAX);
        let (progress, _) = advance_all(&mut negotiator, b"\r\n");
        assert!(matches!(progress, Ok(Progress::Ready(_))));

        let cookies = &negotiator.request().expect("request").cookies;
        assert_eq!(cookies.get("user").map(String::as_str), Some("bob"));
    }
}
