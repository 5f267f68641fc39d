//! The fixed part of the version resource (`VS_VERSIONINFO` with its `VS_FIXEDFILEINFO`).


use std::fmt;
use std::io::{Read, Seek};

use bitflags::bitflags;
use tracing::debug;

use crate::cursor::BinaryCursor;
use crate::error::Result;
use crate::resource::ImageResourceDirectoryLevel;


pub const RT_VERSION: u16 = 16;
pub const VS_VERSION_INFO_ID: u16 = 1;
pub const FIXED_FILE_INFO_SIGNATURE: u32 = 0xFEEF04BD;
const VERSION_KEY_LENGTH: usize = 16; // UTF-16 code units including NULs


/// A four-part version number.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct FileVersion {
    pub major: u16,
    pub minor: u16,
    pub build: u16,
    pub revision: u16,
}
impl fmt::Display for FileVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}.{}", self.major, self.minor, self.build, self.revision)
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
    #[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
    pub struct FileFlags : u32 {
        const DEBUG = 0x0000_0001;
        const PRERELEASE = 0x0000_0002;
        const PATCHED = 0x0000_0004;
        const PRIVATE_BUILD = 0x0000_0008;
        const INFO_INFERRED = 0x0000_0010;
        const SPECIAL_BUILD = 0x0000_0020;
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct VsFixedFileInfo {
    pub signature: u32, // FIXED_FILE_INFO_SIGNATURE
    pub struc_version: u32,
    pub file_version_minor: u16,
    pub file_version_major: u16,
    pub file_version_revision: u16,
    pub file_version_build: u16,
    pub product_version_minor: u16,
    pub product_version_major: u16,
    pub product_version_revision: u16,
    pub product_version_build: u16,
    pub file_flags_mask: u32,
    pub file_flags: FileFlags, // u32
    pub file_os: u32,
    pub file_type: u32,
    pub file_subtype: u32,
    pub file_date_ms: u32,
    pub file_date_ls: u32,
}
impl VsFixedFileInfo {
    pub fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Self> {
        let signature = cursor.read_u32()?;
        let struc_version = cursor.read_u32()?;
        let file_version_minor = cursor.read_u16()?;
        let file_version_major = cursor.read_u16()?;
        let file_version_revision = cursor.read_u16()?;
        let file_version_build = cursor.read_u16()?;
        let product_version_minor = cursor.read_u16()?;
        let product_version_major = cursor.read_u16()?;
        let product_version_revision = cursor.read_u16()?;
        let product_version_build = cursor.read_u16()?;
        let file_flags_mask = cursor.read_u32()?;
        let file_flags = FileFlags::from_bits_retain(cursor.read_u32()?);
        let file_os = cursor.read_u32()?;
        let file_type = cursor.read_u32()?;
        let file_subtype = cursor.read_u32()?;
        let file_date_ms = cursor.read_u32()?;
        let file_date_ls = cursor.read_u32()?;

        Ok(Self {
            signature,
            struc_version,
            file_version_minor,
            file_version_major,
            file_version_revision,
            file_version_build,
            product_version_minor,
            product_version_major,
            product_version_revision,
            product_version_build,
            file_flags_mask,
            file_flags,
            file_os,
            file_type,
            file_subtype,
            file_date_ms,
            file_date_ls,
        })
    }

    pub fn file_version(&self) -> FileVersion {
        FileVersion {
            major: self.file_version_major,
            minor: self.file_version_minor,
            build: self.file_version_build,
            revision: self.file_version_revision,
        }
    }

    pub fn product_version(&self) -> FileVersion {
        FileVersion {
            major: self.product_version_major,
            minor: self.product_version_minor,
            build: self.product_version_build,
            revision: self.product_version_revision,
        }
    }
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct VsVersionInfo {
    pub length: u16,
    pub value_length: u16,
    pub value_type: u16,
    pub key: String, // "VS_VERSION_INFO"
    // padding: u16,
    pub fixed_file_info: VsFixedFileInfo,
}
impl VsVersionInfo {
    /// Reads the record at the current position.
    ///
    /// Returns `Ok(None)` if the embedded fixed file info carries the wrong signature.
    pub fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Option<Self>> {
        let length = cursor.read_u16()?;
        let value_length = cursor.read_u16()?;
        let value_type = cursor.read_u16()?;
        let key = cursor.read_utf16_string(VERSION_KEY_LENGTH)?
            .trim_end_matches('\0')
            .to_owned();
        let _padding = cursor.read_u16()?;
        let fixed_file_info = VsFixedFileInfo::read(cursor)?;
        if fixed_file_info.signature != FIXED_FILE_INFO_SIGNATURE {
            debug!("fixed file info has signature {:#010X}", fixed_file_info.signature);
            return Ok(None);
        }

        Ok(Some(Self {
            length,
            value_length,
            value_type,
            key,
            fixed_file_info,
        }))
    }

    /// Follows root -> RT_VERSION -> 1 -> first language to the version record.
    pub fn find<R: Read + Seek>(cursor: &mut BinaryCursor<R>, root: &ImageResourceDirectoryLevel) -> Option<Self> {
        let data_entry = root
            .find_by_id(RT_VERSION)?
            .subdirectory()?
            .find_by_id(VS_VERSION_INFO_ID)?
            .subdirectory()?
            .entries
            .first()?
            .data()?;
        let data_offset = data_entry.data_offset?;

        let read_result = cursor.seek(data_offset)
            .and_then(|()| Self::read(cursor));
        match read_result {
            Ok(vi) => vi,
            Err(e) => {
                debug!("failed to read version record at {:#X}: {}", data_offset, e);
                None
            },
        }
    }

    pub fn file_version(&self) -> FileVersion {
        self.fixed_file_info.file_version()
    }

    pub fn product_version(&self) -> FileVersion {
        self.fixed_file_info.product_version()
    }
}
