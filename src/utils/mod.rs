//! Utility modules for client internals.

pub mod cache;

// Re-export commonly used types
pub use cache::LocalCache;
