//! Wire format encoding and decoding.
//!
//! Implements the 8-byte EtherBone packet header:
//! ```text
//! ┌──────────┬────────────────────┬───────────────────────┬──────────┐
//! │ Magic    │ Ver | R | NR PR PF │ Addr size | Port size │ Padding  │
//! │ 2 bytes  │ 1 byte             │ 1 byte                │ 4 bytes  │
//! │ uint16 BE│ hi nibble | bits   │ hi nibble | lo nibble │          │
//! └──────────┴────────────────────┴───────────────────────┴──────────┘
//! ```
//!
//! followed, for non-probe packets, by the 4-byte record header:
//! ```text
//! ┌──────────────┬─────────────┬────────┬────────┐
//! │ Cycle flags  │ Byte enable │ WCount │ RCount │
//! │ 1 byte       │ 1 byte      │ 1 byte │ 1 byte │
//! └──────────────┴─────────────┴────────┴────────┘
//! ```
//!
//! All multi-byte integers are Big Endian.

use crate::error::{EtherboneError, Result};

/// Packet magic, first two bytes of every EtherBone packet.
pub const MAGIC: u16 = 0x4E6F;

/// The only supported protocol version.
pub const VERSION: u8 = 1;

/// Address/port size nibble for 32-bit buses.
pub const SIZE_32: u8 = 4;

/// Packet header size in bytes.
pub const HEADER_SIZE: usize = 8;

/// Record header size in bytes.
pub const RECORD_HEADER_SIZE: usize = 4;

/// Size of one record slot (value, address or base address).
pub const WORD_SIZE: usize = 4;

/// Offset of the first base address field (after both headers).
pub const BASE_OFFSET: usize = HEADER_SIZE + RECORD_HEADER_SIZE;

/// Packet header flag bits (byte 2, low nibble).
pub mod flags {
    /// Probe request.
    pub const PROBE: u8 = 0b0000_0001;
    /// Probe reply.
    pub const PROBE_REPLY: u8 = 0b0000_0010;
    /// No reply expected for this packet.
    pub const NO_REPLY: u8 = 0b0000_0100;
    /// Reserved bit.
    pub const RESERVED: u8 = 0b0000_1000;

    /// Mask of all flag bits in byte 2.
    pub const MASK: u8 = 0b0000_1111;

    /// Check if a specific flag is set.
    #[inline]
    pub fn has_flag(flags: u8, flag: u8) -> bool {
        flags & flag != 0
    }
}

/// Record header cycle flag bits (byte 8).
///
/// Parsed and carried through; the engine does not act on them.
pub mod record_flags {
    /// Base (return) address is a config space address.
    pub const BCA: u8 = 0b0000_0001;
    /// Read addresses are config space addresses.
    pub const RCA: u8 = 0b0000_0010;
    /// Read from a FIFO.
    pub const RFF: u8 = 0b0000_0100;
    /// Drop the bus cycle after this record.
    pub const CYC: u8 = 0b0001_0000;
    /// Write addresses are config space addresses.
    pub const WCA: u8 = 0b0010_0000;
    /// Write to a FIFO.
    pub const WFF: u8 = 0b0100_0000;
}

/// Decoded packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Packet magic (expected [`MAGIC`]).
    pub magic: u16,
    /// Flag bits (see [`flags`]).
    pub flags: u8,
    /// Protocol version.
    pub version: u8,
    /// Address width nibble.
    pub addr_size: u8,
    /// Data width nibble.
    pub port_size: u8,
}

impl Header {
    /// Create a header for this responder (magic, version 1, 32-bit widths).
    pub fn new(flags: u8) -> Self {
        Self {
            magic: MAGIC,
            flags: flags & flags::MASK,
            version: VERSION,
            addr_size: SIZE_32,
            port_size: SIZE_32,
        }
    }

    /// Header of a probe request.
    pub fn probe() -> Self {
        Self::new(flags::PROBE)
    }

    /// Header of the reply to a probe.
    pub fn probe_reply() -> Self {
        Self::new(flags::NO_REPLY | flags::PROBE_REPLY)
    }

    /// Header of a record reply carrying read data.
    pub fn record_reply() -> Self {
        Self::new(flags::NO_REPLY)
    }

    /// Encode header to bytes (padding zeroed).
    ///
    /// # Example
    ///
    /// ```
    /// use etherbone_server::protocol::Header;
    ///
    /// let bytes = Header::probe().encode();
    /// assert_eq!(&bytes[..4], &[0x4e, 0x6f, 0x11, 0x44]);
    /// ```
    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        self.encode_into(&mut buf);
        buf
    }

    /// Encode header into an existing buffer, zeroing the padding.
    ///
    /// # Panics
    ///
    /// Panics if buffer is smaller than `HEADER_SIZE` (8 bytes).
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= HEADER_SIZE);
        buf[0..2].copy_from_slice(&self.magic.to_be_bytes());
        buf[2] = (self.version << 4) | (self.flags & flags::MASK);
        buf[3] = (self.addr_size << 4) | (self.port_size & 0x0F);
        buf[4..8].fill(0);
    }

    /// Decode header from bytes.
    ///
    /// Returns `None` if buffer is too short.
    ///
    /// # Example
    ///
    /// ```
    /// use etherbone_server::protocol::Header;
    ///
    /// let header = Header::decode(&[0x4e, 0x6f, 0x11, 0x44, 0, 0, 0, 0]).unwrap();
    /// assert!(header.is_probe());
    /// assert_eq!(header.version, 1);
    /// ```
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < HEADER_SIZE {
            return None;
        }
        Some(Self {
            magic: u16::from_be_bytes([buf[0], buf[1]]),
            flags: buf[2] & flags::MASK,
            version: buf[2] >> 4,
            addr_size: buf[3] >> 4,
            port_size: buf[3] & 0x0F,
        })
    }

    /// Validate the header for protocol compliance.
    ///
    /// Checks, in order: magic, version, address size, port size.
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(EtherboneError::BadMagic(self.magic));
        }
        if self.version != VERSION {
            return Err(EtherboneError::UnsupportedVersion(self.version));
        }
        if self.addr_size != SIZE_32 {
            return Err(EtherboneError::UnsupportedAddrSize(self.addr_size));
        }
        if self.port_size != SIZE_32 {
            return Err(EtherboneError::UnsupportedPortSize(self.port_size));
        }
        Ok(())
    }

    /// Check if this is a probe request.
    #[inline]
    pub fn is_probe(&self) -> bool {
        flags::has_flag(self.flags, flags::PROBE)
    }

    /// Check if this is a probe reply.
    #[inline]
    pub fn is_probe_reply(&self) -> bool {
        flags::has_flag(self.flags, flags::PROBE_REPLY)
    }

    /// Check if the sender asked for no reply.
    #[inline]
    pub fn is_no_reply(&self) -> bool {
        flags::has_flag(self.flags, flags::NO_REPLY)
    }
}

/// Decoded record header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecordHeader {
    /// Cycle flag bits (see [`record_flags`]).
    pub flags: u8,
    /// Byte enable mask.
    pub byte_enable: u8,
    /// Number of words to write.
    pub wcount: u8,
    /// Number of words to read.
    pub rcount: u8,
}

impl RecordHeader {
    /// Create a new record header.
    pub fn new(flags: u8, byte_enable: u8, wcount: u8, rcount: u8) -> Self {
        Self {
            flags,
            byte_enable,
            wcount,
            rcount,
        }
    }

    /// Encode record header to bytes.
    pub fn encode(&self) -> [u8; RECORD_HEADER_SIZE] {
        [self.flags, self.byte_enable, self.wcount, self.rcount]
    }

    /// Encode record header into an existing buffer.
    pub fn encode_into(&self, buf: &mut [u8]) {
        debug_assert!(buf.len() >= RECORD_HEADER_SIZE);
        buf[..RECORD_HEADER_SIZE].copy_from_slice(&self.encode());
    }

    /// Decode record header from bytes.
    ///
    /// Returns `None` if buffer is too short.
    pub fn decode(buf: &[u8]) -> Option<Self> {
        if buf.len() < RECORD_HEADER_SIZE {
            return None;
        }
        Some(Self::new(buf[0], buf[1], buf[2], buf[3]))
    }

    /// Bytes taken by the write section (base address + values), 0 if empty.
    ///
    /// The implicit extra word is the section's base address.
    #[inline]
    pub fn write_section_len(&self) -> usize {
        section_len(self.wcount)
    }

    /// Bytes taken by the read section (base return address + addresses), 0 if empty.
    #[inline]
    pub fn read_section_len(&self) -> usize {
        section_len(self.rcount)
    }

    #[inline]
    pub fn bca(&self) -> bool {
        flags::has_flag(self.flags, record_flags::BCA)
    }

    #[inline]
    pub fn rca(&self) -> bool {
        flags::has_flag(self.flags, record_flags::RCA)
    }

    #[inline]
    pub fn rff(&self) -> bool {
        flags::has_flag(self.flags, record_flags::RFF)
    }

    #[inline]
    pub fn cyc(&self) -> bool {
        flags::has_flag(self.flags, record_flags::CYC)
    }

    #[inline]
    pub fn wca(&self) -> bool {
        flags::has_flag(self.flags, record_flags::WCA)
    }

    #[inline]
    pub fn wff(&self) -> bool {
        flags::has_flag(self.flags, record_flags::WFF)
    }
}

#[inline]
fn section_len(count: u8) -> usize {
    if count == 0 {
        0
    } else {
        (1 + count as usize) * WORD_SIZE
    }
}

/// Read a big endian word at `offset`.
#[inline]
pub(crate) fn read_be_u32(buf: &[u8], offset: usize) -> u32 {
    u32::from_be_bytes([
        buf[offset],
        buf[offset + 1],
        buf[offset + 2],
        buf[offset + 3],
    ])
}

/// Write a big endian word at `offset`.
#[inline]
pub(crate) fn write_be_u32(buf: &mut [u8], offset: usize, value: u32) {
    buf[offset..offset + WORD_SIZE].copy_from_slice(&value.to_be_bytes());
}
