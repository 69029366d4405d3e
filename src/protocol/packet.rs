//! Packet recognition and framing.
//!
//! A received datagram may carry padding before and after the packet. The
//! packet start is the first offset holding the magic; from there the
//! declared length is checked against what was received and exactly that
//! many bytes are copied into a private buffer. The copy is the request for
//! the rest of processing, so the receive buffer can be overwritten by the
//! response while the request is still being read.
//!
//! Record section layout after the record header:
//!
//! ```text
//! [base write addr][wcount values]   only if wcount > 0
//! [base ret addr  ][rcount addrs ]   only if rcount > 0
//! ```

use bytes::Bytes;

use super::wire_format::{
    read_be_u32, write_be_u32, Header, RecordHeader, BASE_OFFSET, HEADER_SIZE, MAGIC,
    RECORD_HEADER_SIZE, WORD_SIZE,
};
use crate::error::{EtherboneError, Result};

/// A located request, copied out of the receive buffer.
#[derive(Debug, Clone)]
pub struct Packet {
    /// Offset of the magic in the receive buffer.
    offset: usize,
    /// Decoded packet header.
    header: Header,
    /// Decoded record header (`None` for probes).
    record: Option<RecordHeader>,
    /// Private copy of exactly the packet bytes.
    bytes: Bytes,
}

impl Packet {
    /// Locate a packet within the first `recv_len` bytes of `buf`.
    ///
    /// # Errors
    ///
    /// - `MagicNotFound` if no offset holds the magic
    /// - `Truncated` if fewer bytes follow the magic than the packet declares
    /// - `Allocation` if the private copy cannot be allocated
    pub fn locate(buf: &[u8], recv_len: usize) -> Result<Self> {
        let data = &buf[..recv_len.min(buf.len())];
        let magic = MAGIC.to_be_bytes();

        let offset = data
            .windows(2)
            .position(|w| w == magic)
            .ok_or(EtherboneError::MagicNotFound { recv_len })?;

        let available = data.len() - offset;
        let packet = &data[offset..];

        let header = Header::decode(packet).ok_or(EtherboneError::Truncated {
            needed: HEADER_SIZE,
            available,
        })?;

        let (record, len) = if header.is_probe() {
            (None, HEADER_SIZE)
        } else {
            let record = RecordHeader::decode(&packet[HEADER_SIZE..]).ok_or(
                EtherboneError::Truncated {
                    needed: HEADER_SIZE + RECORD_HEADER_SIZE,
                    available,
                },
            )?;
            (Some(record), packet_len(&record))
        };

        if available < len {
            return Err(EtherboneError::Truncated {
                needed: len,
                available,
            });
        }

        let mut copy = Vec::new();
        copy.try_reserve_exact(len)
            .map_err(|_| EtherboneError::Allocation { len })?;
        copy.extend_from_slice(&packet[..len]);

        Ok(Self {
            offset,
            header,
            record,
            bytes: Bytes::from(copy),
        })
    }

    /// Offset of the packet within the receive buffer.
    #[inline]
    pub fn offset(&self) -> usize {
        self.offset
    }

    /// The packet header.
    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// The record header, if this is not a probe.
    #[inline]
    pub fn record_header(&self) -> Option<&RecordHeader> {
        self.record.as_ref()
    }

    /// The copied packet bytes.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Total packet length.
    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Always false: a located packet holds at least a header.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Base address of the write section, decoded to host order.
    pub fn write_base(&self) -> Option<u32> {
        match self.record {
            Some(r) if r.wcount > 0 => Some(read_be_u32(&self.bytes, BASE_OFFSET)),
            _ => None,
        }
    }

    /// Write values in request order, decoded to host order.
    pub fn write_values(&self) -> impl Iterator<Item = u32> + '_ {
        let count = self.record.map_or(0, |r| r.wcount as usize);
        let start = BASE_OFFSET + WORD_SIZE;
        (0..count).map(move |i| read_be_u32(&self.bytes, start + i * WORD_SIZE))
    }

    /// Base return address of the read section, exactly as received.
    pub fn read_base_raw(&self) -> Option<[u8; WORD_SIZE]> {
        let offset = self.read_section_offset()?;
        let mut raw = [0u8; WORD_SIZE];
        raw.copy_from_slice(&self.bytes[offset..offset + WORD_SIZE]);
        Some(raw)
    }

    /// Per-record read addresses in request order, decoded to host order.
    pub fn read_addresses(&self) -> impl Iterator<Item = u32> + '_ {
        let count = self.record.map_or(0, |r| r.rcount as usize);
        let start = self.read_section_offset().unwrap_or(0) + WORD_SIZE;
        (0..count).map(move |i| read_be_u32(&self.bytes, start + i * WORD_SIZE))
    }

    fn read_section_offset(&self) -> Option<usize> {
        match self.record {
            Some(r) if r.rcount > 0 => Some(BASE_OFFSET + r.write_section_len()),
            _ => None,
        }
    }
}

/// Length of a non-probe packet described by `record`.
#[inline]
pub fn packet_len(record: &RecordHeader) -> usize {
    HEADER_SIZE + RECORD_HEADER_SIZE + record.write_section_len() + record.read_section_len()
}

/// Build a probe request.
pub fn build_probe() -> [u8; HEADER_SIZE] {
    Header::probe().encode()
}

/// Build a record request.
///
/// `writes` is the base write address and the values to write starting
/// there; `reads` is the base return address and the addresses to read.
/// Either may be empty.
///
/// # Errors
///
/// Returns `TooManyRecords` if either list holds more than 255 words.
///
/// # Example
///
/// ```
/// use etherbone_server::protocol::build_request;
///
/// let request = build_request((0x10, &[0xDEADBEEF]), (0, &[])).unwrap();
/// assert_eq!(request.len(), 20);
/// ```
pub fn build_request(writes: (u32, &[u32]), reads: (u32, &[u32])) -> Result<Vec<u8>> {
    let (write_base, values) = writes;
    let (read_base, addresses) = reads;

    let wcount = record_count(values.len())?;
    let rcount = record_count(addresses.len())?;
    let record = RecordHeader::new(0, 0x0F, wcount, rcount);

    let mut buf = vec![0u8; packet_len(&record)];
    Header::new(0).encode_into(&mut buf);
    record.encode_into(&mut buf[HEADER_SIZE..]);

    let mut offset = BASE_OFFSET;
    for (base, words) in [(write_base, values), (read_base, addresses)] {
        if words.is_empty() {
            continue;
        }
        write_be_u32(&mut buf, offset, base);
        offset += WORD_SIZE;
        for &word in words {
            write_be_u32(&mut buf, offset, word);
            offset += WORD_SIZE;
        }
    }

    Ok(buf)
}

fn record_count(len: usize) -> Result<u8> {
    u8::try_from(len).map_err(|_| EtherboneError::TooManyRecords { count: len })
}
