//! Memory access - the capability the engine executes records against.
//!
//! - [`MemoryAccess`] - word read/write trait injected into the engine
//! - [`RamRegion`] - heap-backed region (tests, `--emulate`)
//! - [`MappedRegion`] - physical window mapped from `/dev/mem`
//!
//! Addresses are byte offsets from the start of the region and advance by
//! 4 per word.

mod mapped;

pub use mapped::MappedRegion;

use crate::protocol::WORD_SIZE;

/// Synchronous word access to a memory region.
///
/// `read` and `write` have no error channel; the engine calls [`check`]
/// for every address of a request before performing any access.
///
/// [`check`]: MemoryAccess::check
pub trait MemoryAccess {
    /// Read the word at `address`.
    fn read(&mut self, address: u32) -> u32;

    /// Write `value` to the word at `address`.
    fn write(&mut self, address: u32, value: u32);

    /// Whether `address` may be accessed. Accepts everything by default.
    fn check(&self, address: u32) -> bool {
        let _ = address;
        true
    }
}

impl<M: MemoryAccess + ?Sized> MemoryAccess for &mut M {
    fn read(&mut self, address: u32) -> u32 {
        (**self).read(address)
    }

    fn write(&mut self, address: u32, value: u32) {
        (**self).write(address, value)
    }

    fn check(&self, address: u32) -> bool {
        (**self).check(address)
    }
}

impl<M: MemoryAccess + ?Sized> MemoryAccess for Box<M> {
    fn read(&mut self, address: u32) -> u32 {
        (**self).read(address)
    }

    fn write(&mut self, address: u32, value: u32) {
        (**self).write(address, value)
    }

    fn check(&self, address: u32) -> bool {
        (**self).check(address)
    }
}

/// Whether a word at `address` lies inside a region of `size` bytes.
#[inline]
pub(crate) fn word_in_bounds(address: u32, size: u64) -> bool {
    address as usize % WORD_SIZE == 0 && address as u64 + WORD_SIZE as u64 <= size
}

/// Heap-backed memory region.
///
/// Accepts word-aligned addresses below its size. Accesses to rejected
/// addresses are ignored (writes) or read as zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RamRegion {
    words: Vec<u32>,
}

impl RamRegion {
    /// Create a zeroed region of `size` bytes (rounded down to whole words).
    pub fn new(size: usize) -> Self {
        Self {
            words: vec![0; size / WORD_SIZE],
        }
    }

    /// Create a region holding `words`, the first at address 0.
    pub fn from_words(words: Vec<u32>) -> Self {
        Self { words }
    }

    /// Region size in bytes.
    #[inline]
    pub fn size(&self) -> usize {
        self.words.len() * WORD_SIZE
    }

    /// The region contents.
    #[inline]
    pub fn words(&self) -> &[u32] {
        &self.words
    }

    /// The word at `address`, if it is in range.
    pub fn get(&self, address: u32) -> Option<u32> {
        if self.check(address) {
            Some(self.words[address as usize / WORD_SIZE])
        } else {
            None
        }
    }
}

impl MemoryAccess for RamRegion {
    fn read(&mut self, address: u32) -> u32 {
        self.get(address).unwrap_or(0)
    }

    fn write(&mut self, address: u32, value: u32) {
        if self.check(address) {
            self.words[address as usize / WORD_SIZE] = value;
        }
    }

    fn check(&self, address: u32) -> bool {
        word_in_bounds(address, self.size() as u64)
    }
}
