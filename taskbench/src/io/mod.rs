//! I/O helpers: project file, process spawning, and the executor seam.

pub mod config;
pub mod executor;
pub mod process;
