//! Server configuration.
//!
//! A [`Config`] is built once at startup (defaults, optionally a JSON file,
//! then command line overrides) and handed by value to the server. Nothing
//! changes it afterwards.
//!
//! # Example
//!
//! ```
//! use etherbone_server::config::{Config, ErrorPolicy};
//!
//! let config: Config = serde_json::from_str(r#"{ "udp_port": 5000, "policy": "abort" }"#).unwrap();
//! assert_eq!(config.udp_port, 5000);
//! assert_eq!(config.policy, ErrorPolicy::Abort);
//! assert_eq!(config.buffer_size, 4096);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{EtherboneError, Result};
use crate::protocol::HEADER_SIZE;

/// Default base physical address of the memory window.
pub const DEFAULT_MEM_BASE: u64 = 0x4_0000_0000;

/// Default size of the memory window.
pub const DEFAULT_MEM_SIZE: u64 = 0x1_0000_0000;

/// Default UDP port.
pub const DEFAULT_UDP_PORT: u16 = 1234;

/// Default receive/response buffer size.
pub const DEFAULT_BUFFER_SIZE: usize = 4096;

/// What the server does when a datagram cannot be processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorPolicy {
    /// Terminate the server.
    Abort,
    /// Log, drop the datagram, keep serving.
    #[default]
    Continue,
}

/// Immutable server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Base physical address of the memory window.
    pub mem_base: u64,
    /// Size of the memory window in bytes.
    pub mem_size: u64,
    /// UDP port to serve on.
    pub udp_port: u16,
    /// Receive/response buffer size in bytes.
    pub buffer_size: usize,
    /// Handling of malformed datagrams.
    pub policy: ErrorPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mem_base: DEFAULT_MEM_BASE,
            mem_size: DEFAULT_MEM_SIZE,
            udp_port: DEFAULT_UDP_PORT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            policy: ErrorPolicy::default(),
        }
    }
}

impl Config {
    /// Load a configuration from a JSON file. Missing fields take defaults.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// Check the configuration before serving.
    pub fn validate(&self) -> Result<()> {
        if self.buffer_size < HEADER_SIZE {
            return Err(EtherboneError::Config(format!(
                "Buffer size {} is smaller than a packet header",
                self.buffer_size
            )));
        }
        if self.mem_size == 0 {
            return Err(EtherboneError::Config(
                "Memory size must not be 0".to_string(),
            ));
        }
        if self.mem_size > 1 << 32 {
            return Err(EtherboneError::Config(format!(
                "Memory size 0x{:x} exceeds the 32-bit address space",
                self.mem_size
            )));
        }
        if self.mem_base % 4 != 0 {
            return Err(EtherboneError::Config(format!(
                "Memory base 0x{:x} is not word aligned",
                self.mem_base
            )));
        }
        Ok(())
    }

    /// Whether malformed datagrams terminate the server.
    #[inline]
    pub fn abort_on_error(&self) -> bool {
        self.policy == ErrorPolicy::Abort
    }
}

/// Parse an unsigned number in decimal, or hex with a `0x` prefix.
///
/// # Example
///
/// ```
/// use etherbone_server::config::parse_number;
///
/// assert_eq!(parse_number("4096"), Ok(4096));
/// assert_eq!(parse_number("0x400000000"), Ok(0x4_0000_0000));
/// ```
pub fn parse_number(s: &str) -> std::result::Result<u64, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|e| format!("Wrong value '{}': {}", s, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.mem_base, 0x4_0000_0000);
        assert_eq!(config.mem_size, 0x1_0000_0000);
        assert_eq!(config.udp_port, 1234);
        assert_eq!(config.buffer_size, 4096);
        assert_eq!(config.policy, ErrorPolicy::Continue);
        assert!(!config.abort_on_error());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number("0"), Ok(0));
        assert_eq!(parse_number("1234"), Ok(1234));
        assert_eq!(parse_number("0x10"), Ok(16));
        assert_eq!(parse_number("0XfF"), Ok(255));
        assert!(parse_number("").is_err());
        assert!(parse_number("0x").is_err());
        assert!(parse_number("12ab").is_err());
        assert!(parse_number("-1").is_err());
    }

    #[test]
    fn test_validate_buffer_size() {
        let config = Config {
            buffer_size: 7,
            ..Config::default()
        };
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Buffer size 7"));
    }

    #[test]
    fn test_validate_memory_window() {
        let zero = Config {
            mem_size: 0,
            ..Config::default()
        };
        assert!(zero.validate().is_err());

        let huge = Config {
            mem_size: (1 << 32) + 4,
            ..Config::default()
        };
        assert!(huge.validate().is_err());

        let unaligned = Config {
            mem_base: 0x1002,
            ..Config::default()
        };
        assert!(unaligned.validate().is_err());
    }

    #[test]
    fn test_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "mem_base": 4096, "mem_size": 65536, "policy": "abort" }}"#
        )
        .unwrap();

        let config = Config::from_json_file(file.path()).unwrap();
        assert_eq!(config.mem_base, 4096);
        assert_eq!(config.mem_size, 65536);
        assert_eq!(config.udp_port, DEFAULT_UDP_PORT);
        assert!(config.abort_on_error());
    }

    #[test]
    fn test_from_json_file_rejects_unknown_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "port": 1 }}"#).unwrap();

        let err = Config::from_json_file(file.path()).unwrap_err();
        assert!(matches!(err, EtherboneError::ConfigFile(_)));
    }

    #[test]
    fn test_from_missing_file() {
        let err = Config::from_json_file("/nonexistent/etherbone.json").unwrap_err();
        assert!(matches!(err, EtherboneError::Io(_)));
    }
}
