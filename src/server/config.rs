//! Listener configuration.
//!
//! # Example
//!
//! ```no_run
//! use websocket_server::ServerConfig;
//!
//! # fn example() -> websocket_server::Result<()> {
//! let config = ServerConfig::builder()
//!     .listen_port(9000)
//!     .max_allowed_packet_size("64k")
//!     .enable(true)
//!     .build()?;
//! # Ok(())
//! # }
//! ```
//!
//! # Defaults
//!
//! | Key | Default |
//! |-----|---------|
//! | `listen` | `0.0.0.0` |
//! | `listen_port` | `8047` |
//! | `max_allowed_packet` | `16384` (accepts `"16k"`, `"1M"`) |
//! | `enable` | `false` |

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::{Deserialize, Deserializer};

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Default bind address (all interfaces).
pub const DEFAULT_LISTEN: IpAddr = IpAddr::V4(Ipv4Addr::UNSPECIFIED);

/// Default TCP port.
pub const DEFAULT_PORT: u16 = 8047;

/// Default frame payload limit in bytes.
pub const DEFAULT_MAX_PACKET: usize = 16 * 1024;

// ============================================================================
// ServerConfig
// ============================================================================

/// Listener settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address to bind.
    pub listen: IpAddr,

    /// Port to bind. `0` picks a free port.
    pub listen_port: u16,

    /// Largest accepted frame payload, in bytes.
    #[serde(deserialize_with = "deserialize_size")]
    pub max_allowed_packet: usize,

    /// The listener refuses to start unless this is set.
    pub enable: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: DEFAULT_LISTEN,
            listen_port: DEFAULT_PORT,
            max_allowed_packet: DEFAULT_MAX_PACKET,
            enable: false,
        }
    }
}

impl ServerConfig {
    /// Creates a builder starting from the defaults.
    #[inline]
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::new()
    }

    /// Socket address to bind.
    #[inline]
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.listen, self.listen_port)
    }

    /// Checks values that deserialization alone cannot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `max_allowed_packet` is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_allowed_packet == 0 {
            return Err(Error::config("max_allowed_packet must be greater than zero"));
        }
        Ok(())
    }
}

// ============================================================================
// ServerConfigBuilder
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
enum PacketLimit {
    Bytes(usize),
    Size(String),
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone, Default)]
pub struct ServerConfigBuilder {
    listen: Option<IpAddr>,
    listen_port: Option<u16>,
    max_allowed_packet: Option<PacketLimit>,
    enable: bool,
}

impl ServerConfigBuilder {
    /// Creates a builder with every value at its default.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bind address.
    #[inline]
    #[must_use]
    pub fn listen(mut self, ip: IpAddr) -> Self {
        self.listen = Some(ip);
        self
    }

    /// Sets the bind port.
    #[inline]
    #[must_use]
    pub fn listen_port(mut self, port: u16) -> Self {
        self.listen_port = Some(port);
        self
    }

    /// Sets the packet limit in bytes.
    #[inline]
    #[must_use]
    pub fn max_allowed_packet(mut self, bytes: usize) -> Self {
        self.max_allowed_packet = Some(PacketLimit::Bytes(bytes));
        self
    }

    /// Sets the packet limit from a size string such as `"16k"` or `"1M"`.
    ///
    /// The string is parsed by [`ServerConfigBuilder::build`].
    #[inline]
    #[must_use]
    pub fn max_allowed_packet_size(mut self, size: impl Into<String>) -> Self {
        self.max_allowed_packet = Some(PacketLimit::Size(size.into()));
        self
    }

    /// Enables the listener.
    #[inline]
    #[must_use]
    pub fn enable(mut self, enable: bool) -> Self {
        self.enable = enable;
        self
    }

    /// Builds the configuration with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the size string cannot be parsed
    /// - [`Error::Config`] if the packet limit is zero
    pub fn build(self) -> Result<ServerConfig> {
        let max_allowed_packet = match self.max_allowed_packet {
            None => DEFAULT_MAX_PACKET,
            Some(PacketLimit::Bytes(bytes)) => bytes,
            Some(PacketLimit::Size(size)) => parse_size(&size)?,
        };

        let config = ServerConfig {
            listen: self.listen.unwrap_or(DEFAULT_LISTEN),
            listen_port: self.listen_port.unwrap_or(DEFAULT_PORT),
            max_allowed_packet,
            enable: self.enable,
        };

        config.validate()?;
        Ok(config)
    }
}

// ============================================================================
// Size Strings
// ============================================================================

/// Parses a byte count with an optional binary suffix.
///
/// `k`, `m` and `g` (either case) multiply by 1024, 1024² and 1024³.
///
/// # Errors
///
/// Returns [`Error::Config`] for an empty string, a non-numeric value, an
/// unknown suffix, or a value that overflows `usize`.
pub fn parse_size(raw: &str) -> Result<usize> {
    let trimmed = raw.trim();

    let (digits, multiplier) = match trimmed.char_indices().last() {
        Some((i, c)) if c.is_ascii_alphabetic() => {
            let multiplier: usize = match c.to_ascii_lowercase() {
                'k' => 1 << 10,
                'm' => 1 << 20,
                'g' => 1 << 30,
                _ => return Err(Error::config(format!("unknown size suffix in {raw:?}"))),
            };
            (&trimmed[..i], multiplier)
        }
        Some(_) => (trimmed, 1),
        None => return Err(Error::config("empty size string")),
    };

    let value: usize = digits
        .trim()
        .parse()
        .map_err(|e| Error::config(format!("invalid size {raw:?}: {e}")))?;

    value
        .checked_mul(multiplier)
        .ok_or_else(|| Error::config(format!("size {raw:?} is too large")))
}

fn deserialize_size<'de, D>(deserializer: D) -> std::result::Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Bytes(usize),
        Text(String),
    }

    match Size::deserialize(deserializer)? {
        Size::Bytes(bytes) => Ok(bytes),
        Size::Text(text) => parse_size(&text).map_err(serde::de::Error::custom),
    }
}

// ============================================================================
// Tests
// ============================================================================
