//! Entry points for parsing PE images from paths, readers and byte buffers.


use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek};
use std::path::Path;

use tracing::debug;

use crate::cursor::BinaryCursor;
use crate::error::Result;
use crate::file::PeFile;


pub struct PeFileProvider;
impl PeFileProvider {
    /// Opens and parses the file at the given path.
    pub fn open<P: AsRef<Path>>(path: P, is_loaded_image: bool) -> Result<PeFile> {
        let path = path.as_ref();
        debug!("parsing {}", path.display());
        let file = File::open(path)?;
        Self::read(BufReader::new(file), is_loaded_image)
    }

    /// Parses an image from any seekable byte source.
    pub fn read<R: Read + Seek>(reader: R, is_loaded_image: bool) -> Result<PeFile> {
        let mut cursor = BinaryCursor::new(reader);
        PeFile::read(&mut cursor, is_loaded_image)
    }

    pub fn from_bytes(bytes: &[u8], is_loaded_image: bool) -> Result<PeFile> {
        Self::read(Cursor::new(bytes), is_loaded_image)
    }
}


#[cfg(test)]
mod tests {
    use super::PeFileProvider;
    use crate::error::Error;
    use crate::test_image::TestImage;

    #[test]
    fn test_from_bytes() {
        let bytes = TestImage::new().build();
        let pe = PeFileProvider::from_bytes(&bytes, false).unwrap();
        assert_eq!(pe.section_headers().len(), 2);
        assert!(!pe.is_loaded_image());
    }

    #[test]
    fn test_open_missing_file() {
        let err = PeFileProvider::open("/nonexistent/pereflect/missing.dll", false).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_empty_input_is_truncated() {
        let err = PeFileProvider::from_bytes(&[], false).unwrap_err();
        assert!(err.is_truncated());
    }
}
