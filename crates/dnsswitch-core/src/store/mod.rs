// # Profile Store Implementations
//
// This module provides implementations of the ProfileStore trait for
// different persistence strategies.

pub mod file;
pub mod memory;

pub use file::FileProfileStore;
pub use memory::MemoryProfileStore;
