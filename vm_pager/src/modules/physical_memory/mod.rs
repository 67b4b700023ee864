mod user_pool;

pub use user_pool::UserPool;

use crate::address::{PhysFrame, PAGE_SIZE};

/// Allocator for the physical pages that back user memory.
pub trait PhysicalMemoryModule: Send + Sync {
    /// Total number of frames managed by this module.
    ///
    /// Every frame number returned by [`PhysicalMemoryModule::alloc_user_page`]
    /// is smaller than this.
    fn frame_count(&self) -> usize;

    /// Hands out one free frame, `None` if all frames are in use
    fn alloc_user_page(&self) -> Option<PhysFrame>;

    /// Returns a frame to the pool.
    ///
    /// **Freeing a frame that is not allocated is a kernel bug and panics.**
    fn free_user_page(&self, frame: PhysFrame);

    /// Runs `f` with exclusive access to the contents of `frame`
    fn with_frame<R, F: FnOnce(&mut [u8; PAGE_SIZE]) -> R>(&self, frame: PhysFrame, f: F) -> R;

    /// Copies `dest.len()` bytes starting at `offset` out of `frame`
    fn read_frame(&self, frame: PhysFrame, offset: usize, dest: &mut [u8]) {
        self.with_frame(frame, |bytes| {
            dest.copy_from_slice(&bytes[offset..offset + dest.len()])
        })
    }

    /// Copies `src` into `frame` starting at `offset`
    fn write_frame(&self, frame: PhysFrame, offset: usize, src: &[u8]) {
        self.with_frame(frame, |bytes| {
            bytes[offset..offset + src.len()].copy_from_slice(src)
        })
    }
}
