//! Memory balloon for swap-pressure testing via anonymous mmap.
//!
//! [`MemoryBalloon`] allocates a contiguous block of anonymous memory using
//! `mmap(MAP_ANONYMOUS | MAP_PRIVATE | MAP_POPULATE)`.  The `MAP_POPULATE`
//! flag forces the kernel to fault in all pages immediately, ensuring the
//! allocation actually consumes physical memory (or swap).  On [`Drop`],
//! the mapping is released via `munmap`.
//!
//! Use [`should_enable_balloon`] to check whether the system has sufficient
//! swap headroom before inflating.

use anyhow::{Context, Result, bail};

/// Hard upper limit: 16 GiB.  Prevents accidental OOM from absurd values.
const MAX_BALLOON_SIZE: u64 = 16 * 1024 * 1024 * 1024;

/// Anonymous mmap-backed memory balloon.
///
/// Inflates on construction, deflates on drop.  The mapping is `PROT_READ |
/// PROT_WRITE` so the kernel commits physical pages (via `MAP_POPULATE`).
pub struct MemoryBalloon {
    ptr: *mut libc::c_void,
    size: usize,
}

impl std::fmt::Debug for MemoryBalloon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryBalloon")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

// SAFETY: The mmap region is private (MAP_PRIVATE) and owned exclusively by
// this struct.  No aliasing or shared mutation is possible.
unsafe impl Send for MemoryBalloon {}
unsafe impl Sync for MemoryBalloon {}

impl MemoryBalloon {
    /// Inflate a balloon of exactly `size_bytes` bytes.
    ///
    /// Returns an error if `size_bytes` exceeds [`MAX_BALLOON_SIZE`] (16 GiB),
    /// is zero, or if the `mmap` syscall fails.
    pub fn inflate(size_bytes: usize) -> Result<Self> {
        if size_bytes == 0 {
            bail!("balloon size must be > 0");
        }

        if size_bytes as u64 > MAX_BALLOON_SIZE {
            bail!(
                "balloon size {} bytes exceeds hard limit of {} bytes (16 GiB)",
                size_bytes,
                MAX_BALLOON_SIZE
            );
        }

        // SAFETY: mmap with MAP_ANONYMOUS does not require a file descriptor.
        // We pass -1 for fd and 0 for offset.  The returned pointer is either
        // MAP_FAILED (checked below) or a valid mapping of `size_bytes` length.
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size_bytes,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_ANONYMOUS | libc::MAP_PRIVATE | libc::MAP_POPULATE,
                -1,
                0,
            )
        };

        if ptr == libc::MAP_FAILED {
            return Err(std::io::Error::last_os_error())
                .context(format!("mmap({} bytes) failed", size_bytes));
        }

        Ok(Self {
            ptr,
            size: size_bytes,
        })
    }

    /// Size of the inflated balloon in bytes.
    pub fn size(&self) -> usize {
        self.size
    }
}

impl Drop for MemoryBalloon {
    fn drop(&mut self) {
        // SAFETY: `self.ptr` was returned by a successful mmap call and
        // `self.size` matches the original mapping length.  After munmap
        // the pointer is invalid — but we never use it again.
        let ret = unsafe { libc::munmap(self.ptr, self.size) };
        if ret != 0 {
            // Best-effort warning; cannot propagate errors from Drop.
            tracing::warn!(
                size = self.size,
                err = %std::io::Error::last_os_error(),
                "munmap failed during balloon deflation"
            );
        }
    }
}

/// Check whether a memory balloon should be enabled given current swap
/// availability.
///
/// Returns `true` only when:
/// 1. `balloon_size` does not exceed [`MAX_BALLOON_SIZE`] (16 GiB), AND
/// 2. `available_swap_bytes` is at least as large as `balloon_size`.
pub fn should_enable_balloon(available_swap_bytes: u64, balloon_size: u64) -> bool {
    balloon_size <= MAX_BALLOON_SIZE && available_swap_bytes >= balloon_size
}
