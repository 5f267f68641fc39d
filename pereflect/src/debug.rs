//! The debug directory and the CodeView (RSDS) records linking an image to its PDB.


use std::io::{Read, Seek};

use from_to_repr::from_to_other;
use tracing::debug;

use crate::cursor::BinaryCursor;
use crate::error::{FormatError, Result};
use crate::guid::Guid;
use crate::pe::{KnownDataDirectory, PeHeaders};


pub const DEBUG_DIRECTORY_ENTRY_SIZE: u32 = 28;
pub const CODE_VIEW_SIGNATURE: [u8; 4] = *b"RSDS";


#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[from_to_other(base_type = u32, derive_compare = "as_int")]
pub enum DebugType {
    Unknown = 0,
    Coff = 1,
    CodeView = 2,
    Fpo = 3,
    Misc = 4,
    Exception = 5,
    Fixup = 6,
    OmapToSrc = 7,
    OmapFromSrc = 8,
    Borland = 9,
    Reserved10 = 10,
    Clsid = 11,
    VcFeature = 12,
    Pogo = 13,
    Iltcg = 14,
    Mpx = 15,
    Repro = 16,
    EmbeddedPortablePdb = 17,
    PdbChecksum = 19,
    ExDllCharacteristics = 20,
    Other(u32),
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ImageDebugDirectory {
    pub characteristics: u32, // must be 0
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub debug_type: DebugType, // u32
    pub size_of_data: u32,
    pub address_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
}
impl ImageDebugDirectory {
    pub fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Self> {
        let characteristics = cursor.read_u32()?;
        if characteristics != 0 {
            debug!("debug directory entry has characteristics {:#010X}", characteristics);
            return Err(FormatError::DebugCharacteristics { obtained: characteristics }.into());
        }
        let time_date_stamp = cursor.read_u32()?;
        let major_version = cursor.read_u16()?;
        let minor_version = cursor.read_u16()?;
        let debug_type = DebugType::from_base_type(cursor.read_u32()?);
        let size_of_data = cursor.read_u32()?;
        let address_of_raw_data = cursor.read_u32()?;
        let pointer_to_raw_data = cursor.read_u32()?;

        Ok(Self {
            characteristics,
            time_date_stamp,
            major_version,
            minor_version,
            debug_type,
            size_of_data,
            address_of_raw_data,
            pointer_to_raw_data,
        })
    }
}

/// The program database a binary was linked against.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct CodeViewInfo {
    // magic: b"RSDS",
    pub signature: Guid,
    pub age: i32,
    pub path: String,
}
impl CodeViewInfo {
    pub fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Self> {
        let magic: [u8; 4] = cursor.read_array()?;
        if magic != CODE_VIEW_SIGNATURE {
            debug!("CodeView record has magic {:?}", magic);
            return Err(FormatError::CodeViewMagic { obtained: magic }.into());
        }
        let signature = cursor.read_guid()?;
        let age = cursor.read_i32()?;
        let path = cursor.read_nul_terminated_ascii_string()?;

        Ok(Self {
            signature,
            age,
            path,
        })
    }
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ImageDebugDirectoryInfo {
    pub directory: ImageDebugDirectory,
    pub code_view: Option<CodeViewInfo>, // only for DebugType::CodeView
}
impl ImageDebugDirectoryInfo {
    /// Reads every entry of the debug directory; an absent or unmapped directory has no entries.
    pub fn read_all<R: Read + Seek>(cursor: &mut BinaryCursor<R>, headers: &PeHeaders) -> Result<Vec<Self>> {
        let debug_entry = headers.data_directory(KnownDataDirectory::Debug);
        let Some(directory_offset) = headers.try_directory_offset(&debug_entry, false)? else {
            return Ok(Vec::new());
        };
        if debug_entry.size % DEBUG_DIRECTORY_ENTRY_SIZE != 0 {
            debug!("debug directory size {} is not a multiple of {}", debug_entry.size, DEBUG_DIRECTORY_ENTRY_SIZE);
            return Err(FormatError::DirectorySize { size: debug_entry.size, entry_size: DEBUG_DIRECTORY_ENTRY_SIZE }.into());
        }
        let entry_count = debug_entry.size / DEBUG_DIRECTORY_ENTRY_SIZE;

        cursor.seek(directory_offset)?;
        let mut directories = Vec::with_capacity(entry_count.try_into().unwrap());
        for _ in 0..entry_count {
            directories.push(ImageDebugDirectory::read(cursor)?);
        }

        let mut ret = Vec::with_capacity(directories.len());
        for directory in directories {
            let code_view = if directory.debug_type == DebugType::CodeView {
                let data_offset = if headers.is_loaded_image {
                    directory.address_of_raw_data
                } else {
                    directory.pointer_to_raw_data
                };
                if data_offset == 0 {
                    // not mapped into this layout
                    debug!("CodeView entry has no data in this image layout");
                    None
                } else {
                    cursor.seek(data_offset.into())?;
                    Some(CodeViewInfo::read(cursor)?)
                }
            } else {
                None
            };
            ret.push(Self {
                directory,
                code_view,
            });
        }
        Ok(ret)
    }
}


#[cfg(test)]
mod tests {
    use super::{DebugType, ImageDebugDirectoryInfo};
    use crate::cursor::BinaryCursor;
    use crate::guid::Guid;
    use crate::pe::{KnownDataDirectory, PeHeaders};
    use crate::test_image::TestImage;
    use std::io::Cursor;
    use tracing_test::traced_test;

    const GUID_BYTES: [u8; 16] = [
        0x78, 0x56, 0x34, 0x12, 0xBC, 0x9A, 0xF0, 0xDE,
        0x01, 0x23, 0x45, 0x67, 0x89, 0xAB, 0xCD, 0xEF,
    ];

    /// One CodeView entry at RVA 0x2000 whose record lives at RVA 0x2100 (file offset 0x1300), plus
    /// a POGO entry without a record.
    fn debug_image(magic: &[u8; 4]) -> TestImage {
        let mut image = TestImage::new();
        image.set_directory(KnownDataDirectory::Debug, 0x2000, 56);

        image.write_u32_at_rva(0x2000 + 12, 2); // CodeView
        image.write_u32_at_rva(0x2000 + 16, 24 + 12);
        image.write_u32_at_rva(0x2000 + 20, 0x2100);
        image.write_u32_at_rva(0x2000 + 24, 0x1300);

        image.write_u32_at_rva(0x201C + 12, 13); // POGO
        image.write_u32_at_rva(0x201C + 16, 4);

        image.write_at_rva(0x2100, magic);
        image.write_at_rva(0x2104, &GUID_BYTES);
        image.write_u32_at_rva(0x2114, 3);
        image.write_at_rva(0x2118, b"C:\\sym\\t.pdb\0");
        image
    }

    fn read_debug(bytes: Vec<u8>, is_loaded_image: bool) -> crate::Result<Vec<ImageDebugDirectoryInfo>> {
        let mut cursor = BinaryCursor::new(Cursor::new(bytes));
        let headers = PeHeaders::read(&mut cursor, is_loaded_image)?;
        ImageDebugDirectoryInfo::read_all(&mut cursor, &headers)
    }

    #[test]
    #[traced_test]
    fn test_code_view_on_disk() {
        let entries = read_debug(debug_image(b"RSDS").build(), false).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].directory.debug_type, DebugType::CodeView);
        let code_view = entries[0].code_view.as_ref().unwrap();
        assert_eq!(code_view.signature, Guid::from_le_bytes(GUID_BYTES));
        assert_eq!(code_view.signature.to_string(), "{12345678-9ABC-DEF0-0123-456789ABCDEF}");
        assert_eq!(code_view.age, 3);
        assert_eq!(code_view.path, "C:\\sym\\t.pdb");

        assert_eq!(entries[1].directory.debug_type, DebugType::Pogo);
        assert!(entries[1].code_view.is_none());
    }

    #[test]
    fn test_code_view_loaded() {
        let entries = read_debug(debug_image(b"RSDS").build_loaded(), true).unwrap();
        assert_eq!(entries[0].code_view.as_ref().unwrap().path, "C:\\sym\\t.pdb");
    }

    #[test]
    fn test_wrong_code_view_magic() {
        let err = read_debug(debug_image(b"NB10").build(), false).unwrap_err();
        assert!(err.is_invalid_format());
    }

    #[test]
    #[traced_test]
    fn test_code_view_without_data_in_layout() {
        // the record is only present in the loaded layout
        let mut image = debug_image(b"NB10");
        image.write_u32_at_rva(0x2000 + 24, 0);
        let entries = read_debug(image.build(), false).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].directory.debug_type, DebugType::CodeView);
        assert!(entries[0].code_view.is_none());
        assert!(logs_contain("CodeView entry has no data in this image layout"));
    }

    #[test]
    fn test_nonzero_characteristics() {
        let mut image = debug_image(b"RSDS");
        image.write_u32_at_rva(0x201C, 1);
        let err = read_debug(image.build(), false).unwrap_err();
        assert!(err.is_invalid_format());
    }

    #[test]
    fn test_size_not_multiple_of_entry() {
        let mut image = debug_image(b"RSDS");
        image.set_directory(KnownDataDirectory::Debug, 0x2000, 30);
        let err = read_debug(image.build(), false).unwrap_err();
        assert!(err.is_invalid_format());
    }

    #[test]
    fn test_absent_directory() {
        let entries = read_debug(TestImage::new().build(), false).unwrap();
        assert!(entries.is_empty());
    }
}
