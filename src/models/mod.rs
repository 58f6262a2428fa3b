//! Data models for page blob uploads.

mod blob;
mod page;

pub use blob::*;
pub use page::*;
