// Public modules
pub mod build;
pub mod config;
pub mod deploy;
pub mod error;
pub mod image;
pub mod ssh;

// Internal modules - not part of public API
pub(crate) mod paths;

// Re-export common types for convenience
pub use error::{Error, ErrorCode, Result};
