//! A fully parsed PE image: headers, sections and every directory this crate understands.


use std::io::{Read, Seek};

use tracing::debug;

use crate::clr::ImageCor20Header;
use crate::cursor::BinaryCursor;
use crate::debug::{CodeViewInfo, ImageDebugDirectoryInfo};
use crate::error::Result;
use crate::export::ImageExportDirectoryInfo;
use crate::import::ImageImportDescriptorInfo;
use crate::pe::{ImageDataDirectory, ImageFileHeader, ImageOptionalHeader, ImageSectionHeader, PeHeaders};
use crate::resource::ImageResourceDirectoryInfo;
use crate::version::VsVersionInfo;


#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct PeFile {
    pub headers: PeHeaders,
    pub export_directory: Option<ImageExportDirectoryInfo>,
    pub import_descriptors: Vec<ImageImportDescriptorInfo>,
    pub debug_directory: Vec<ImageDebugDirectoryInfo>,
    pub resource_directory: ImageResourceDirectoryInfo,
    pub cor20_header: Option<ImageCor20Header>,
}
impl PeFile {
    /// Parses the headers and all directories from the byte source.
    ///
    /// With `is_loaded_image`, the bytes are taken to be laid out the way the loader maps them, so
    /// every RVA is also a position within the byte source.
    pub fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>, is_loaded_image: bool) -> Result<Self> {
        let headers = PeHeaders::read(cursor, is_loaded_image)?;
        debug!(
            "{} sections, {}, {}",
            headers.section_headers.len(),
            if headers.is_coff_only() { "COFF object" } else if headers.is_64bit() { "PE32+" } else { "PE32" },
            if is_loaded_image { "loaded layout" } else { "file layout" },
        );

        let cor20_header = ImageCor20Header::read_from_image(cursor, &headers)?;
        let export_directory = ImageExportDirectoryInfo::read(cursor, &headers)?;
        let import_descriptors = ImageImportDescriptorInfo::read_all(cursor, &headers)?;
        let debug_directory = ImageDebugDirectoryInfo::read_all(cursor, &headers)?;
        let resource_directory = ImageResourceDirectoryInfo::read(cursor, &headers);

        Ok(Self {
            headers,
            export_directory,
            import_descriptors,
            debug_directory,
            resource_directory,
            cor20_header,
        })
    }

    pub fn is_loaded_image(&self) -> bool {
        self.headers.is_loaded_image
    }

    pub fn file_header(&self) -> &ImageFileHeader {
        &self.headers.file_header
    }

    /// `None` for bare COFF objects.
    pub fn optional_header(&self) -> Option<&ImageOptionalHeader> {
        self.headers.optional_header.as_ref()
    }

    pub fn section_headers(&self) -> &[ImageSectionHeader] {
        &self.headers.section_headers
    }

    pub fn is_64bit(&self) -> bool {
        self.headers.is_64bit()
    }

    pub fn image_base(&self) -> u64 {
        self.headers.image_base()
    }

    pub fn section_containing(&self, rva: u32) -> Option<usize> {
        self.headers.section_containing(rva)
    }

    pub fn try_offset(&self, rva: u32) -> Option<u64> {
        self.headers.try_offset(rva)
    }

    pub fn try_directory_offset(&self, directory: &ImageDataDirectory, allow_cross_section_boundary: bool) -> Result<Option<u64>> {
        self.headers.try_directory_offset(directory, allow_cross_section_boundary)
    }

    pub fn version_info(&self) -> Option<&VsVersionInfo> {
        self.resource_directory.version_info.as_ref()
    }

    /// The first CodeView record of the debug directory, which names the matching PDB.
    pub fn pdb_info(&self) -> Option<&CodeViewInfo> {
        self.debug_directory
            .iter()
            .filter_map(|d| d.code_view.as_ref())
            .next()
    }
}
