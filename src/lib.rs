//! # etherbone-server
//!
//! EtherBone (Wishbone over UDP) responder.
//!
//! A host sends datagrams asking to read or write 32-bit words in a memory
//! window; the server executes them and replies with the data read.
//!
//! ## Architecture
//!
//! - **Protocol** ([`protocol`]): packet framing, header validation, probe
//!   and record execution, in-place response encoding
//! - **Memory** ([`memory`]): the [`MemoryAccess`] capability the engine runs
//!   against, with heap and `/dev/mem` backed regions
//! - **Server** ([`server`]): single-threaded UDP receive/execute/reply loop
//!
//! ## Example
//!
//! ```
//! use etherbone_server::protocol::{build_request, Engine};
//! use etherbone_server::RamRegion;
//!
//! let mut engine = Engine::new(RamRegion::new(64));
//!
//! let mut buf = build_request((0x10, &[0xDEADBEEF]), (0, &[])).unwrap();
//! let len = buf.len();
//! assert_eq!(engine.process(&mut buf, len).unwrap(), 0);
//!
//! let mut buf = build_request((0, &[]), (0, &[0x10])).unwrap();
//! let len = buf.len();
//! assert_eq!(engine.process(&mut buf, len).unwrap(), 20);
//! assert_eq!(&buf[16..20], &[0xDE, 0xAD, 0xBE, 0xEF]);
//! ```

pub mod config;
pub mod error;
pub mod memory;
pub mod protocol;
pub mod server;

pub use config::{Config, ErrorPolicy};
pub use error::{ErrorKind, EtherboneError};
pub use memory::{MappedRegion, MemoryAccess, RamRegion};
pub use server::{Server, State};
