//! Error types for etherbone-server.

use thiserror::Error;

/// Coarse classification of an [`EtherboneError`].
///
/// The transport loop uses this to decide whether a failure is local to one
/// datagram or terminates the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No packet could be located in the datagram, or it was cut short.
    Framing,
    /// A packet was located but its contents are not acceptable.
    Validation,
    /// The private request copy could not be allocated.
    Allocation,
    /// Socket receive/send or memory mapping failure.
    Transport,
    /// Invalid startup configuration.
    Config,
}

/// Main error type for all EtherBone operations.
#[derive(Debug, Error)]
pub enum EtherboneError {
    /// Packet magic not present anywhere in the received bytes.
    #[error("Could not find packet magic: recv_len={recv_len}")]
    MagicNotFound { recv_len: usize },

    /// Fewer bytes after the magic than the header declares.
    #[error("Received less bytes than packet_len: len={needed}, available={available}")]
    Truncated { needed: usize, available: usize },

    /// Magic mismatch in the copied request.
    #[error("Wrong magic: 0x{0:04x}")]
    BadMagic(u16),

    /// Protocol version other than 1.
    #[error("Wrong version: {0}")]
    UnsupportedVersion(u8),

    /// Address width other than 32 bits.
    #[error("Wrong addr_size: {0}")]
    UnsupportedAddrSize(u8),

    /// Data width other than 32 bits.
    #[error("Wrong port_size: {0}")]
    UnsupportedPortSize(u8),

    /// Request touches an address the memory region does not accept.
    #[error("Address out of range: 0x{address:08x}")]
    AddressOutOfRange { address: u32 },

    /// More than 255 records in one direction.
    #[error("Too many records for one packet: {count}")]
    TooManyRecords { count: usize },

    /// Response does not fit in the destination buffer.
    #[error("Response of {needed} bytes does not fit in {capacity} byte buffer")]
    ResponseTooLarge { needed: usize, capacity: usize },

    /// Could not allocate the request copy.
    #[error("Could not allocate buffer for packet: len={len}")]
    Allocation { len: usize },

    /// I/O error during socket or mapping operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration value.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration file could not be parsed.
    #[error("Configuration file error: {0}")]
    ConfigFile(#[from] serde_json::Error),
}

impl EtherboneError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MagicNotFound { .. } | Self::Truncated { .. } => ErrorKind::Framing,
            Self::BadMagic(_)
            | Self::UnsupportedVersion(_)
            | Self::UnsupportedAddrSize(_)
            | Self::UnsupportedPortSize(_)
            | Self::AddressOutOfRange { .. }
            | Self::TooManyRecords { .. }
            | Self::ResponseTooLarge { .. } => ErrorKind::Validation,
            Self::Allocation { .. } => ErrorKind::Allocation,
            Self::Io(_) => ErrorKind::Transport,
            Self::Config(_) | Self::ConfigFile(_) => ErrorKind::Config,
        }
    }

    /// Whether this error ends the transport loop regardless of policy.
    #[inline]
    pub fn is_fatal(&self) -> bool {
        !matches!(self.kind(), ErrorKind::Framing | ErrorKind::Validation)
    }
}

/// Result type alias using EtherboneError.
pub type Result<T> = std::result::Result<T, EtherboneError>;
