//! Physical memory window mapped into the process.
//!
//! The window is mapped shared read/write from `/dev/mem` (or any file that
//! supports `mmap`). The base is rounded down to a page boundary for the
//! mapping; word addresses are relative to the requested base.

use std::fs::OpenOptions;
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::os::unix::io::AsRawFd;
use std::path::Path;

use super::{word_in_bounds, MemoryAccess};
use crate::error::Result;

/// Default device exposing physical memory.
pub const DEV_MEM: &str = "/dev/mem";

/// A mapped memory window.
pub struct MappedRegion {
    ptr: *mut u8,
    map_len: usize,
    page_offset: usize,
    base: u64,
    size: u64,
}

// The mapping is owned exclusively by this value.
unsafe impl Send for MappedRegion {}

impl MappedRegion {
    /// Map `size` bytes of physical memory starting at `base`.
    pub fn open(base: u64, size: u64) -> Result<Self> {
        Self::open_path(DEV_MEM, base, size)
    }

    /// Map `size` bytes of `path` starting at byte offset `base`.
    ///
    /// `base` must be word aligned and `size` non-zero.
    pub fn open_path<P: AsRef<Path>>(path: P, base: u64, size: u64) -> Result<Self> {
        if base % 4 != 0 || size == 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Bad memory window: base=0x{base:x}, size=0x{size:x}"),
            )
            .into());
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(path)?;

        let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        if page_size <= 0 {
            return Err(io::Error::last_os_error().into());
        }
        let page_size = page_size as u64;

        let page_base = base / page_size * page_size;
        let page_offset = (base - page_base) as usize;
        let map_len = usize::try_from(size)
            .ok()
            .and_then(|size| size.checked_add(page_offset))
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "Window too large"))?;

        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                map_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                page_base as libc::off_t,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error().into());
        }

        tracing::debug!(
            "Mapped 0x{:x} bytes at 0x{:x} (page base 0x{:x})",
            size,
            base,
            page_base
        );

        Ok(Self {
            ptr: ptr as *mut u8,
            map_len,
            page_offset,
            base,
            size,
        })
    }

    /// Requested base address of the window.
    #[inline]
    pub fn base(&self) -> u64 {
        self.base
    }

    /// Window size in bytes.
    #[inline]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[inline]
    fn word_ptr(&self, address: u32) -> *mut u32 {
        unsafe { self.ptr.add(self.page_offset + address as usize) as *mut u32 }
    }
}

impl MemoryAccess for MappedRegion {
    fn read(&mut self, address: u32) -> u32 {
        if !self.check(address) {
            return 0;
        }
        unsafe { self.word_ptr(address).read_volatile() }
    }

    fn write(&mut self, address: u32, value: u32) {
        if !self.check(address) {
            return;
        }
        unsafe { self.word_ptr(address).write_volatile(value) }
    }

    fn check(&self, address: u32) -> bool {
        word_in_bounds(address, self.size)
    }
}

impl Drop for MappedRegion {
    fn drop(&mut self) {
        unsafe {
            if libc::munmap(self.ptr as *mut libc::c_void, self.map_len) != 0 {
                tracing::error!("Could not unmap memory: {}", io::Error::last_os_error());
            }
        }
    }
}

impl std::fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedRegion")
            .field("base", &format_args!("0x{:x}", self.base))
            .field("size", &format_args!("0x{:x}", self.size))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Seek, SeekFrom, Write};

    fn backing_file(len: usize) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&vec![0u8; len]).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_write_reaches_backing_file() {
        let file = backing_file(8192);
        {
            let mut region = MappedRegion::open_path(file.path(), 0, 4096).unwrap();
            region.write(0x10, 0x11223344);
            assert_eq!(region.read(0x10), 0x11223344);
        }

        let mut contents = Vec::new();
        file.reopen().unwrap().read_to_end(&mut contents).unwrap();
        assert_eq!(
            &contents[0x10..0x14],
            &0x11223344u32.to_ne_bytes()
        );
    }

    #[test]
    fn test_unaligned_base_uses_page_offset() {
        let mut file = backing_file(8192);
        file.seek(SeekFrom::Start(0x108)).unwrap();
        file.write_all(&0xCAFEF00Du32.to_ne_bytes()).unwrap();
        file.flush().unwrap();

        let mut region = MappedRegion::open_path(file.path(), 0x100, 0x200).unwrap();
        assert_eq!(region.base(), 0x100);
        assert_eq!(region.size(), 0x200);
        assert_eq!(region.read(0x8), 0xCAFEF00D);
    }

    #[test]
    fn test_out_of_window_access_is_rejected() {
        let file = backing_file(4096);
        let mut region = MappedRegion::open_path(file.path(), 0, 64).unwrap();

        assert!(region.check(60));
        assert!(!region.check(64));
        assert!(!region.check(3));

        region.write(64, 0xFFFF_FFFF);
        assert_eq!(region.read(64), 0);
    }

    #[test]
    fn test_bad_window_rejected() {
        let file = backing_file(4096);
        assert!(MappedRegion::open_path(file.path(), 2, 64).is_err());
        assert!(MappedRegion::open_path(file.path(), 0, 0).is_err());
    }

    #[test]
    fn test_missing_file() {
        let err = MappedRegion::open_path("/nonexistent/etherbone-mem", 0, 64).unwrap_err();
        assert!(err.is_fatal());
    }
}
