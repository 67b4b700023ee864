mod soft;

pub use soft::SoftPageDirectory;

use crate::address::{PhysFrame, VirtualPage};

/// Per process hardware page table (MMU interface).
///
/// Only the bits the pager needs are exposed: mapping a page, and reading or
/// clearing the accessed and dirty bits the hardware sets on access.
pub trait HardwarePageTableModule: Send {
    /// Creates an empty page directory
    fn new() -> Self
    where
        Self: Sized;

    /// Maps `page` to `frame`.
    ///
    /// Returns `false` if `page` is already mapped. A freshly installed
    /// mapping is neither accessed nor dirty.
    fn install(&mut self, page: VirtualPage, frame: PhysFrame, writable: bool) -> bool;

    /// Removes the mapping of `page`, later accesses fault again
    fn clear(&mut self, page: VirtualPage);

    /// Returns the frame and writability `page` is mapped to
    fn translate(&self, page: VirtualPage) -> Option<(PhysFrame, bool)>;

    fn is_accessed(&self, page: VirtualPage) -> bool;

    fn set_accessed(&mut self, page: VirtualPage, accessed: bool);

    fn is_dirty(&self, page: VirtualPage) -> bool;

    fn set_dirty(&mut self, page: VirtualPage, dirty: bool);
}
