//! Import descriptors, one per imported module.
//!
//! Only the module name is resolved; the thunk arrays are left alone.


use std::io::{Read, Seek};

use tracing::debug;

use crate::cursor::BinaryCursor;
use crate::error::Result;
use crate::pe::{KnownDataDirectory, PeHeaders};


pub const IMPORT_DESCRIPTOR_SIZE: u32 = 20;


#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ImageImportDescriptor {
    pub original_first_thunk: u32, // RVA of the import lookup table
    pub time_date_stamp: u32,
    pub forwarder_chain: u32,
    pub name: u32, // RVA
    pub first_thunk: u32, // RVA of the import address table
}
impl ImageImportDescriptor {
    pub fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Self> {
        let original_first_thunk = cursor.read_u32()?;
        let time_date_stamp = cursor.read_u32()?;
        let forwarder_chain = cursor.read_u32()?;
        let name = cursor.read_u32()?;
        let first_thunk = cursor.read_u32()?;
        Ok(Self {
            original_first_thunk,
            time_date_stamp,
            forwarder_chain,
            name,
            first_thunk,
        })
    }

    /// The all-zero descriptor terminates the table.
    pub fn is_terminator(&self) -> bool {
        *self == Self::default()
    }

    /// Whether the imports are bound, i.e. the address table already holds real addresses.
    pub fn is_bound(&self) -> bool {
        self.time_date_stamp != 0
    }
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ImageImportDescriptorInfo {
    pub descriptor: ImageImportDescriptor,
    pub name: Option<String>, // None if the name RVA is not mapped
}
impl ImageImportDescriptorInfo {
    fn read_name<R: Read + Seek>(cursor: &mut BinaryCursor<R>, headers: &PeHeaders, name_rva: u32) -> Result<Option<String>> {
        let Some(name_offset) = headers.try_offset(name_rva) else {
            debug!("import name RVA {:#010X} is not mapped", name_rva);
            return Ok(None);
        };
        cursor.seek(name_offset)?;
        Ok(Some(cursor.read_nul_terminated_ascii_string()?))
    }

    /// Reads the import descriptors up to the terminator or the end of the import directory,
    /// whichever comes first.
    pub fn read_all<R: Read + Seek>(cursor: &mut BinaryCursor<R>, headers: &PeHeaders) -> Result<Vec<Self>> {
        let import_entry = headers.data_directory(KnownDataDirectory::Import);
        let Some(table_offset) = headers.try_directory_offset(&import_entry, false)? else {
            return Ok(Vec::new());
        };

        let max_count = import_entry.size / IMPORT_DESCRIPTOR_SIZE;
        let mut ret = Vec::new();
        for index in 0..max_count {
            cursor.seek(table_offset + u64::from(index * IMPORT_DESCRIPTOR_SIZE))?;
            let descriptor = ImageImportDescriptor::read(cursor)?;
            if descriptor.is_terminator() {
                break;
            }
            let name = Self::read_name(cursor, headers, descriptor.name)?;
            ret.push(Self {
                descriptor,
                name,
            });
        }
        Ok(ret)
    }
}


#[cfg(test)]
mod tests {
    use super::ImageImportDescriptorInfo;
    use crate::cursor::BinaryCursor;
    use crate::pe::{KnownDataDirectory, PeHeaders};
    use crate::test_image::TestImage;
    use std::io::Cursor;
    use tracing_test::traced_test;

    fn import_image() -> TestImage {
        let mut image = TestImage::new();
        image.set_directory(KnownDataDirectory::Import, 0x2000, 60);

        image.write_u32_at_rva(0x2000, 0x2300);
        image.write_u32_at_rva(0x200C, 0x2200);
        image.write_u32_at_rva(0x2010, 0x2400);

        image.write_u32_at_rva(0x2014, 0x2310);
        image.write_u32_at_rva(0x2014 + 4, 0xFFFF_FFFF);
        image.write_u32_at_rva(0x2014 + 12, 0x2210);
        image.write_u32_at_rva(0x2014 + 16, 0x2410);

        image.write_at_rva(0x2200, b"KERNEL32.dll\0");
        image.write_at_rva(0x2210, b"USER32.dll\0");
        image
    }

    fn read_imports(bytes: Vec<u8>, is_loaded_image: bool) -> crate::Result<Vec<ImageImportDescriptorInfo>> {
        let mut cursor = BinaryCursor::new(Cursor::new(bytes));
        let headers = PeHeaders::read(&mut cursor, is_loaded_image)?;
        ImageImportDescriptorInfo::read_all(&mut cursor, &headers)
    }

    #[test]
    #[traced_test]
    fn test_import_descriptors() {
        for (bytes, is_loaded_image) in [(import_image().build(), false), (import_image().build_loaded(), true)] {
            let imports = read_imports(bytes, is_loaded_image).unwrap();
            assert_eq!(imports.len(), 2);
            assert_eq!(imports[0].name.as_deref(), Some("KERNEL32.dll"));
            assert_eq!(imports[0].descriptor.original_first_thunk, 0x2300);
            assert_eq!(imports[0].descriptor.first_thunk, 0x2400);
            assert!(!imports[0].descriptor.is_bound());
            assert_eq!(imports[1].name.as_deref(), Some("USER32.dll"));
            assert!(imports[1].descriptor.is_bound());
        }
    }

    #[test]
    fn test_unmapped_name() {
        let mut image = import_image();
        image.write_u32_at_rva(0x200C, 0x9000);
        let imports = read_imports(image.build(), false).unwrap();
        assert_eq!(imports[0].name, None);
        assert_eq!(imports[1].name.as_deref(), Some("USER32.dll"));
    }

    #[test]
    fn test_missing_terminator_stops_at_directory_end() {
        let mut image = import_image();
        image.set_directory(KnownDataDirectory::Import, 0x2000, 20);
        let imports = read_imports(image.build(), false).unwrap();
        assert_eq!(imports.len(), 1);
    }

    #[test]
    fn test_no_imports() {
        assert!(read_imports(TestImage::new().build(), false).unwrap().is_empty());
    }
}
