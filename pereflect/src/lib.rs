//! Read-only reflection over PE/COFF images, either as files on disk or as mapped by the loader.


pub mod clr;
pub mod cursor;
pub mod debug;
pub mod error;
pub mod export;
pub mod file;
pub mod guid;
pub mod import;
pub mod pe;
pub mod provider;
pub mod resource;
#[cfg(test)] mod test_image;
pub mod version;


pub use crate::error::{Error, FormatError, Result};
pub use crate::file::PeFile;
pub use crate::provider::PeFileProvider;
