//! Protocol module - wire format, framing, and execution.
//!
//! This module implements the EtherBone protocol:
//! - 8-byte packet header and 4-byte record header encoding/decoding
//! - Packet recognition inside a padded datagram
//! - Engine executing probes and records against a memory region

mod engine;
mod packet;
mod wire_format;

pub use engine::{read_response_len, Engine, PROBE_RESPONSE_LEN, RESPONSE_DATA_OFFSET};
pub use packet::{build_probe, build_request, packet_len, Packet};
pub use wire_format::{
    flags, record_flags, Header, RecordHeader, BASE_OFFSET, HEADER_SIZE, MAGIC,
    RECORD_HEADER_SIZE, SIZE_32, VERSION, WORD_SIZE,
};
