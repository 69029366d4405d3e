//! Protocol engine.
//!
//! Executes one located packet against a [`MemoryAccess`] and encodes the
//! response. Responses are written from offset 0 of the destination, which
//! is usually the receive buffer itself; the request is only ever read from
//! the private copy held by [`Packet`].
//!
//! Return contract: `Ok(n)` is the number of response bytes to send, with
//! `Ok(0)` meaning no reply (probe-less requests without reads); `Err(_)`
//! means the datagram could not be processed.

use tracing::trace;

use super::packet::Packet;
use super::wire_format::{
    write_be_u32, Header, RecordHeader, BASE_OFFSET, HEADER_SIZE, RECORD_HEADER_SIZE, WORD_SIZE,
};
use crate::error::{EtherboneError, Result};
use crate::memory::MemoryAccess;

/// Probe responses are always exactly one header.
pub const PROBE_RESPONSE_LEN: usize = HEADER_SIZE;

/// Offset of the first data record in a read response.
pub const RESPONSE_DATA_OFFSET: usize = BASE_OFFSET + WORD_SIZE;

/// Response length for a request reading `rcount` words.
#[inline]
pub fn read_response_len(rcount: u8) -> usize {
    RESPONSE_DATA_OFFSET + rcount as usize * WORD_SIZE
}

/// EtherBone request executor.
#[derive(Debug)]
pub struct Engine<M> {
    memory: M,
}

impl<M: MemoryAccess> Engine<M> {
    /// Create an engine over `memory`.
    pub fn new(memory: M) -> Self {
        Self { memory }
    }

    /// Get a reference to the memory.
    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Get a mutable reference to the memory.
    pub fn memory_mut(&mut self) -> &mut M {
        &mut self.memory
    }

    /// Consume the engine, returning the memory.
    pub fn into_inner(self) -> M {
        self.memory
    }

    /// Process the packet in the first `recv_len` bytes of `buf`, writing
    /// the response back into `buf`.
    ///
    /// # Example
    ///
    /// ```
    /// use etherbone_server::memory::RamRegion;
    /// use etherbone_server::protocol::{build_probe, Engine};
    ///
    /// let mut engine = Engine::new(RamRegion::new(64));
    /// let mut buf = build_probe().to_vec();
    /// let len = buf.len();
    /// assert_eq!(engine.process(&mut buf, len).unwrap(), 8);
    /// ```
    pub fn process(&mut self, buf: &mut [u8], recv_len: usize) -> Result<usize> {
        let packet = Packet::locate(buf, recv_len)?;
        self.execute(&packet, buf)
    }

    /// Process the packet in the first `recv_len` bytes of `src`, writing
    /// the response into `dst`.
    pub fn process_into(&mut self, src: &[u8], recv_len: usize, dst: &mut [u8]) -> Result<usize> {
        let packet = Packet::locate(src, recv_len)?;
        self.execute(&packet, dst)
    }

    /// Validate and execute a located packet, encoding the response in `dst`.
    pub fn execute(&mut self, packet: &Packet, dst: &mut [u8]) -> Result<usize> {
        let header = packet.header();
        header.validate()?;

        let record = match packet.record_header() {
            Some(record) if !header.is_probe() => *record,
            _ => return probe_response(dst),
        };

        let response_len = if record.rcount > 0 {
            read_response_len(record.rcount)
        } else {
            0
        };
        ensure_capacity(dst, response_len)?;
        self.check_addresses(packet, &record)?;

        if let Some(base) = packet.write_base() {
            let mut address = base;
            for value in packet.write_values() {
                trace!("0x{:08x} <= 0x{:08x}", address, value);
                self.memory.write(address, value);
                address = address.wrapping_add(WORD_SIZE as u32);
            }
        }

        if record.rcount == 0 {
            return Ok(0);
        }

        for (i, address) in packet.read_addresses().enumerate() {
            let value = self.memory.read(address);
            trace!("0x{:08x} => 0x{:08x}", address, value);
            write_be_u32(dst, RESPONSE_DATA_OFFSET + i * WORD_SIZE, value);
        }

        Header::record_reply().encode_into(dst);
        RecordHeader::new(record.flags, record.byte_enable, record.rcount, 0)
            .encode_into(&mut dst[HEADER_SIZE..HEADER_SIZE + RECORD_HEADER_SIZE]);
        // Echoed as received: it was never decoded, so it is not re-encoded.
        if let Some(raw) = packet.read_base_raw() {
            dst[BASE_OFFSET..BASE_OFFSET + WORD_SIZE].copy_from_slice(&raw);
        }

        Ok(response_len)
    }

    /// Reject the request before any access if one of its addresses is
    /// outside what the memory accepts.
    fn check_addresses(&self, packet: &Packet, record: &RecordHeader) -> Result<()> {
        if let Some(base) = packet.write_base() {
            let mut address = base;
            for _ in 0..record.wcount {
                if !self.memory.check(address) {
                    return Err(EtherboneError::AddressOutOfRange { address });
                }
                address = address.wrapping_add(WORD_SIZE as u32);
            }
        }

        match packet.read_addresses().find(|&a| !self.memory.check(a)) {
            Some(address) => Err(EtherboneError::AddressOutOfRange { address }),
            None => Ok(()),
        }
    }
}

fn probe_response(dst: &mut [u8]) -> Result<usize> {
    ensure_capacity(dst, PROBE_RESPONSE_LEN)?;
    Header::probe_reply().encode_into(dst);
    Ok(PROBE_RESPONSE_LEN)
}

#[inline]
fn ensure_capacity(dst: &[u8], needed: usize) -> Result<()> {
    if dst.len() < needed {
        return Err(EtherboneError::ResponseTooLarge {
            needed,
            capacity: dst.len(),
        });
    }
    Ok(())
}
