//! The COR20 header of images containing managed code.


use std::io::{Read, Seek};

use bitflags::bitflags;
use tracing::debug;

use crate::cursor::BinaryCursor;
use crate::error::{FormatError, Result};
use crate::pe::{ImageDataDirectory, KnownDataDirectory, PeHeaders};


pub const COR20_HEADER_SIZE: u32 = 72;


bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    #[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
    pub struct ComImageFlags : u32 {
        const IL_ONLY = 0x0000_0001;
        const REQUIRES_32BIT = 0x0000_0002;
        const IL_LIBRARY = 0x0000_0004;
        const STRONG_NAME_SIGNED = 0x0000_0008;
        const NATIVE_ENTRY_POINT = 0x0000_0010;
        const TRACK_DEBUG_DATA = 0x0001_0000;
        const PREFERS_32BIT = 0x0002_0000;
    }
}


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ImageCor20Header {
    pub cb: u32,
    pub major_runtime_version: u16,
    pub minor_runtime_version: u16,
    pub metadata: ImageDataDirectory, // 64
    pub flags: ComImageFlags, // u32
    pub entry_point_token_or_rva: u32, // RVA if flags contains NATIVE_ENTRY_POINT
    pub resources: ImageDataDirectory, // 64
    pub strong_name_signature: ImageDataDirectory, // 64
    pub code_manager_table: ImageDataDirectory, // 64
    pub vtable_fixups: ImageDataDirectory, // 64
    pub export_address_table_jumps: ImageDataDirectory, // 64
    pub managed_native_header: ImageDataDirectory, // 64
}
impl ImageCor20Header {
    pub fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Self> {
        let cb = cursor.read_u32()?;
        let major_runtime_version = cursor.read_u16()?;
        let minor_runtime_version = cursor.read_u16()?;
        let metadata = ImageDataDirectory::read(cursor)?;
        let flags = ComImageFlags::from_bits_retain(cursor.read_u32()?);
        let entry_point_token_or_rva = cursor.read_u32()?;
        let resources = ImageDataDirectory::read(cursor)?;
        let strong_name_signature = ImageDataDirectory::read(cursor)?;
        let code_manager_table = ImageDataDirectory::read(cursor)?;
        let vtable_fixups = ImageDataDirectory::read(cursor)?;
        let export_address_table_jumps = ImageDataDirectory::read(cursor)?;
        let managed_native_header = ImageDataDirectory::read(cursor)?;

        Ok(Self {
            cb,
            major_runtime_version,
            minor_runtime_version,
            metadata,
            flags,
            entry_point_token_or_rva,
            resources,
            strong_name_signature,
            code_manager_table,
            vtable_fixups,
            export_address_table_jumps,
            managed_native_header,
        })
    }

    /// Reads the header pointed to by the COM descriptor directory; `Ok(None)` if there is none.
    pub fn read_from_image<R: Read + Seek>(cursor: &mut BinaryCursor<R>, headers: &PeHeaders) -> Result<Option<Self>> {
        let cor20_entry = headers.data_directory(KnownDataDirectory::ComDescriptor);
        let Some(header_offset) = headers.try_directory_offset(&cor20_entry, false)? else {
            return Ok(None);
        };
        if cor20_entry.size < COR20_HEADER_SIZE {
            debug!("COR20 directory is only {} bytes long", cor20_entry.size);
            return Err(FormatError::Cor20HeaderSize { expected_at_least: COR20_HEADER_SIZE, obtained: cor20_entry.size }.into());
        }

        cursor.seek(header_offset)?;
        Ok(Some(Self::read(cursor)?))
    }

    pub fn runtime_version(&self) -> (u16, u16) {
        (self.major_runtime_version, self.minor_runtime_version)
    }

    pub fn is_il_only(&self) -> bool {
        self.flags.contains(ComImageFlags::IL_ONLY)
    }
}
