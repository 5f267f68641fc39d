//! The export directory: names, ordinals and addresses of exported functions.


use std::io::{Read, Seek};

use tracing::debug;

use crate::cursor::BinaryCursor;
use crate::error::{FormatError, Result};
use crate::pe::{KnownDataDirectory, PeHeaders};


/// The fixed 40-byte header of the export directory.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ImageExportDirectory {
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub name: u32, // RVA of the module name
    pub base: u32,
    pub number_of_functions: u32,
    pub number_of_names: u32,
    pub address_of_functions: u32,
    pub address_of_names: u32,
    pub address_of_name_ordinals: u32,
}
impl ImageExportDirectory {
    pub fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Self> {
        let characteristics = cursor.read_u32()?;
        let time_date_stamp = cursor.read_u32()?;
        let major_version = cursor.read_u16()?;
        let minor_version = cursor.read_u16()?;
        let name = cursor.read_u32()?;
        let base = cursor.read_u32()?;
        let number_of_functions = cursor.read_u32()?;
        let number_of_names = cursor.read_u32()?;
        let address_of_functions = cursor.read_u32()?;
        let address_of_names = cursor.read_u32()?;
        let address_of_name_ordinals = cursor.read_u32()?;

        Ok(Self {
            characteristics,
            time_date_stamp,
            major_version,
            minor_version,
            name,
            base,
            number_of_functions,
            number_of_names,
            address_of_functions,
            address_of_names,
            address_of_name_ordinals,
        })
    }
}

/// A named export pointing at code or data within the image.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ImageExportInfo {
    pub name: String,
    pub index: u32, // position in the name table
    pub ordinal: u32, // biased by the export base
    pub address: u64, // image base + function RVA
}

/// A named export that refers to a function in another module.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ImageForwardedExportInfo {
    pub name: String,
    pub index: u32,
    pub ordinal: u32,
    pub target_function: String, // "Module.Function"
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ImageExport {
    Code(ImageExportInfo),
    Forwarded(ImageForwardedExportInfo),
}
impl ImageExport {
    pub fn name(&self) -> &str {
        match self {
            Self::Code(e) => &e.name,
            Self::Forwarded(e) => &e.name,
        }
    }

    pub fn index(&self) -> u32 {
        match self {
            Self::Code(e) => e.index,
            Self::Forwarded(e) => e.index,
        }
    }

    pub fn ordinal(&self) -> u32 {
        match self {
            Self::Code(e) => e.ordinal,
            Self::Forwarded(e) => e.ordinal,
        }
    }

    pub fn is_forwarded(&self) -> bool {
        matches!(self, Self::Forwarded(_))
    }
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ImageExportDirectoryInfo {
    pub directory: ImageExportDirectory,
    pub module_name: Option<String>,
    pub exports: Vec<ImageExport>, // [ImageExport; directory.number_of_names]
}
impl ImageExportDirectoryInfo {
    /// Reads the export directory of the image, if it has one.
    pub fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>, headers: &PeHeaders) -> Result<Option<Self>> {
        let export_entry = headers.data_directory(KnownDataDirectory::Export);
        let Some(directory_offset) = headers.try_directory_offset(&export_entry, false)? else {
            return Ok(None);
        };

        cursor.seek(directory_offset)?;
        let directory = ImageExportDirectory::read(cursor)?;

        let module_name = match headers.try_offset(directory.name) {
            Some(name_offset) => {
                cursor.seek(name_offset)?;
                Some(cursor.read_nul_terminated_ascii_string()?)
            },
            None => {
                debug!("export module name RVA {:#010X} is not mapped", directory.name);
                None
            },
        };

        let Some(function_addresses) = read_array(cursor, headers, directory.address_of_functions, directory.number_of_functions, |c| c.read_u32())? else {
            return Ok(None);
        };
        let Some(name_addresses) = read_array(cursor, headers, directory.address_of_names, directory.number_of_names, |c| c.read_u32())? else {
            return Ok(None);
        };
        let Some(name_ordinals) = read_array(cursor, headers, directory.address_of_name_ordinals, directory.number_of_names, |c| c.read_u16())? else {
            return Ok(None);
        };

        let export_range = u64::from(export_entry.rva)..u64::from(export_entry.rva) + u64::from(export_entry.size);
        let mut exports = Vec::with_capacity(name_addresses.len());
        for (index, (name_rva, table_ordinal)) in name_addresses.iter().zip(name_ordinals.iter()).enumerate() {
            let index = u32::try_from(index).unwrap();

            let Some(name_offset) = headers.try_offset(*name_rva) else {
                debug!("skipping export {}: name RVA {:#010X} is not mapped", index, name_rva);
                continue;
            };
            cursor.seek(name_offset)?;
            let name = cursor.read_nul_terminated_ascii_string()?;

            // The name table is sorted by name, so its index has no relation to the position in the
            // function table; modules with ordinal-only exports make the two diverge visibly.
            // Always go through the ordinal table, even where the name index and the biased ordinal
            // happen to coincide; this is also what the loader does.
            let table_ordinal = u32::from(*table_ordinal);
            let ordinal = table_ordinal.wrapping_add(directory.base);
            let Some(function_rva) = function_addresses.get(usize::try_from(table_ordinal).unwrap()).copied() else {
                debug!(
                    "export {:?} refers to function {} of {}",
                    name, table_ordinal, directory.number_of_functions,
                );
                return Err(FormatError::ExportOrdinal { ordinal: table_ordinal, function_count: directory.number_of_functions }.into());
            };

            if export_range.contains(&u64::from(function_rva)) {
                // not code but the name of the forwarding target
                let Some(target_offset) = headers.try_offset(function_rva) else {
                    debug!("skipping export {:?}: forwarder RVA {:#010X} is not mapped", name, function_rva);
                    continue;
                };
                cursor.seek(target_offset)?;
                let target_function = cursor.read_nul_terminated_ascii_string()?;
                exports.push(ImageExport::Forwarded(ImageForwardedExportInfo {
                    name,
                    index,
                    ordinal,
                    target_function,
                }));
            } else {
                exports.push(ImageExport::Code(ImageExportInfo {
                    name,
                    index,
                    ordinal,
                    address: headers.image_base().wrapping_add(function_rva.into()),
                }));
            }
        }

        Ok(Some(Self {
            directory,
            module_name,
            exports,
        }))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&ImageExport> {
        self.exports
            .iter()
            .find(|e| e.name() == name)
    }

    pub fn find_by_ordinal(&self, ordinal: u32) -> Option<&ImageExport> {
        self.exports
            .iter()
            .find(|e| e.ordinal() == ordinal)
    }
}

/// Reads `count` consecutive values at `rva`; `None` if a non-empty table is not mapped.
fn read_array<R, T, F>(cursor: &mut BinaryCursor<R>, headers: &PeHeaders, rva: u32, count: u32, mut read_one: F) -> Result<Option<Vec<T>>>
    where
        R: Read + Seek,
        F: FnMut(&mut BinaryCursor<R>) -> Result<T>,
{
    let mut ret = Vec::new();
    if count == 0 {
        return Ok(Some(ret));
    }
    let Some(offset) = headers.try_offset(rva) else {
        debug!("export table at RVA {:#010X} is not mapped", rva);
        return Ok(None);
    };
    cursor.seek(offset)?;
    for _ in 0..count {
        ret.push(read_one(cursor)?);
    }
    Ok(Some(ret))
}


#[cfg(test)]
pub(crate) mod tests {
    use super::{ImageExport, ImageExportDirectoryInfo};
    use crate::cursor::BinaryCursor;
    use crate::pe::{KnownDataDirectory, PeHeaders};
    use crate::test_image::TestImage;
    use std::io::Cursor;
    use tracing_test::traced_test;

    const EXPORT_RVA: u32 = 0x2000;

    /// Lays out an export directory at 0x2000 with tables at 0x2100 (functions), 0x2200 (name RVAs),
    /// 0x2300 (ordinals) and strings from 0x2400 on.
    pub(crate) fn export_image(base: u32, functions: &[u32], names: &[(&str, u16)]) -> TestImage {
        let mut image = TestImage::new();
        image.set_directory(KnownDataDirectory::Export, EXPORT_RVA, 0x800);

        image.write_u32_at_rva(EXPORT_RVA + 12, 0x2400); // name
        image.write_u32_at_rva(EXPORT_RVA + 16, base);
        image.write_u32_at_rva(EXPORT_RVA + 20, functions.len().try_into().unwrap());
        image.write_u32_at_rva(EXPORT_RVA + 24, names.len().try_into().unwrap());
        image.write_u32_at_rva(EXPORT_RVA + 28, 0x2100);
        image.write_u32_at_rva(EXPORT_RVA + 32, 0x2200);
        image.write_u32_at_rva(EXPORT_RVA + 36, 0x2300);
        image.write_at_rva(0x2400, b"test.dll\0");

        for (i, function_rva) in functions.iter().enumerate() {
            let i = u32::try_from(i).unwrap();
            image.write_u32_at_rva(0x2100 + 4*i, *function_rva);
        }

        let mut string_rva = 0x2410;
        for (i, (name, ordinal)) in names.iter().enumerate() {
            let i = u32::try_from(i).unwrap();
            image.write_u32_at_rva(0x2200 + 4*i, string_rva);
            image.write_u16_at_rva(0x2300 + 2*i, *ordinal);
            image.write_at_rva(string_rva, name.as_bytes());
            string_rva += u32::try_from(name.len()).unwrap() + 1;
        }

        image
    }

    fn read_exports(bytes: Vec<u8>, is_loaded_image: bool) -> crate::Result<Option<ImageExportDirectoryInfo>> {
        let mut cursor = BinaryCursor::new(Cursor::new(bytes));
        let headers = PeHeaders::read(&mut cursor, is_loaded_image)?;
        ImageExportDirectoryInfo::read(&mut cursor, &headers)
    }

    #[test]
    #[traced_test]
    fn test_single_export() {
        let image = export_image(1, &[0x1010], &[("Foo", 0)]);
        let info = read_exports(image.build(), false).unwrap().unwrap();

        assert_eq!(info.module_name.as_deref(), Some("test.dll"));
        assert_eq!(info.exports.len(), 1);
        match &info.exports[0] {
            ImageExport::Code(export) => {
                assert_eq!(export.name, "Foo");
                assert_eq!(export.index, 0);
                assert_eq!(export.ordinal, 1);
                assert_eq!(export.address, 0x1000_0000 + 0x1010);
            },
            other => panic!("unexpected export {:?}", other),
        }
    }

    #[test]
    fn test_single_export_loaded() {
        let image = export_image(1, &[0x1010], &[("Foo", 0)]);
        let info = read_exports(image.build_loaded(), true).unwrap().unwrap();
        assert_eq!(info.exports.len(), 1);
        assert_eq!(info.exports[0].name(), "Foo");
        assert_eq!(info.find_by_ordinal(1).unwrap().name(), "Foo");
    }

    #[test]
    fn test_hidden_ordinal_gap() {
        // three functions, the first of which is exported by ordinal only
        let image = export_image(
            1,
            &[0x1100, 0x1200, 0x1300],
            &[("Alpha", 1), ("Beta", 2)],
        );
        let info = read_exports(image.build(), false).unwrap().unwrap();

        let alpha = match info.find_by_name("Alpha").unwrap() {
            ImageExport::Code(e) => e.clone(),
            other => panic!("unexpected export {:?}", other),
        };
        assert_eq!(alpha.index, 0);
        assert_eq!(alpha.ordinal, 2);
        assert_eq!(alpha.address, 0x1000_0000 + 0x1200);

        let beta = match info.find_by_name("Beta").unwrap() {
            ImageExport::Code(e) => e.clone(),
            other => panic!("unexpected export {:?}", other),
        };
        assert_eq!(beta.index, 1);
        assert_eq!(beta.ordinal, 3);
        assert_eq!(beta.address, 0x1000_0000 + 0x1300);
    }

    #[test]
    fn test_forwarded_export() {
        let mut image = export_image(1, &[0x1010, 0x2600], &[("Bar", 1), ("Foo", 0)]);
        image.write_at_rva(0x2600, b"NTDLL.RtlAllocateHeap\0");
        let info = read_exports(image.build(), false).unwrap().unwrap();

        assert_eq!(info.exports.len(), 2);
        match info.find_by_name("Bar").unwrap() {
            ImageExport::Forwarded(e) => {
                assert_eq!(e.target_function, "NTDLL.RtlAllocateHeap");
                assert_eq!(e.ordinal, 2);
            },
            other => panic!("unexpected export {:?}", other),
        }
        assert!(!info.find_by_name("Foo").unwrap().is_forwarded());
    }

    #[test]
    fn test_ordinal_out_of_range() {
        let image = export_image(1, &[0x1010], &[("Foo", 5)]);
        let err = read_exports(image.build(), false).unwrap_err();
        assert!(err.is_invalid_format());
    }

    #[test]
    #[traced_test]
    fn test_unmapped_name_skips_export() {
        let mut image = export_image(1, &[0x1010, 0x1020], &[("Bar", 1), ("Foo", 0)]);
        image.write_u32_at_rva(0x2200, 0x9000);
        let info = read_exports(image.build(), false).unwrap().unwrap();
        assert_eq!(info.exports.len(), 1);
        assert_eq!(info.exports[0].name(), "Foo");
        assert_eq!(info.exports[0].index(), 1);
        assert!(logs_contain("name RVA 0x00009000 is not mapped"));
    }

    #[test]
    fn test_unmapped_function_table_drops_directory() {
        let mut image = export_image(1, &[0x1010], &[("Foo", 0)]);
        image.write_u32_at_rva(EXPORT_RVA + 28, 0x9000);
        let info = read_exports(image.build(), false).unwrap();
        assert!(info.is_none());
    }

    #[test]
    fn test_matching_index_still_uses_ordinal_table() {
        // "B" sits at name index 1 while its biased ordinal is 1 too; the ordinal table wins
        let image = export_image(1, &[0x1100, 0x1200], &[("A", 1), ("B", 0)]);
        let info = read_exports(image.build(), false).unwrap().unwrap();
        match info.find_by_name("B").unwrap() {
            ImageExport::Code(e) => {
                assert_eq!(e.ordinal, 1);
                assert_eq!(e.address, 0x1000_0000 + 0x1100);
            },
            other => panic!("unexpected export {:?}", other),
        }
    }

    #[test]
    fn test_no_export_directory() {
        let info = read_exports(TestImage::new().build(), false).unwrap();
        assert!(info.is_none());
    }
}
