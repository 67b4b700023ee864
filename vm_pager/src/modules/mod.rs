pub mod block_device;
pub mod file;
pub mod page_directory;
pub mod physical_memory;
