mod host_file;
mod memory_file;

pub use host_file::HostFile;
pub use memory_file::MemoryFile;

use std::sync::Arc;

/// Shared handle to an open file
pub type FileRef = Arc<dyn FileModule>;

/// Byte addressed file as provided by the file system.
pub trait FileModule: Send + Sync {
    /// Reads up to `dest.len()` bytes starting at `offset`.
    ///
    /// Returns the number of bytes read, which is smaller than requested if
    /// the end of the file was reached.
    fn read_at(&self, dest: &mut [u8], offset: u64) -> Result<usize, ()>;

    /// Writes `src` starting at `offset`.
    ///
    /// Files do not grow: returns the number of bytes written, which is smaller
    /// than `src.len()` if the end of the file was reached.
    fn write_at(&self, src: &[u8], offset: u64) -> Result<usize, ()>;

    /// Opens a new, independent handle to the same file
    fn reopen(&self) -> Result<FileRef, ()>;

    /// Returns the size of the file in bytes
    fn length(&self) -> u64;
}
