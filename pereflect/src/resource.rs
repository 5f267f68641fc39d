//! The resource directory: a tree of named or numbered nodes ending in raw data blobs.
//!
//! All name and subdirectory offsets within the tree are relative to the start of the resource
//! directory (the root), not to the node containing them. The data entries at the leaves point to
//! their data through an RVA.


use std::io::{Read, Seek};

use tracing::{debug, warn};

use crate::cursor::BinaryCursor;
use crate::error::{FormatError, Result};
use crate::pe::{KnownDataDirectory, PeHeaders};
use crate::version::VsVersionInfo;


/// Resource trees are three levels deep (type, name, language) in practice.
pub const MAX_RESOURCE_DEPTH: usize = 8;

/// Limit on the entries of a whole tree. Entries may share subdirectories, so the expanded tree can
/// be far larger than the directory itself.
pub const MAX_RESOURCE_ENTRIES: usize = 65536;

const HIGH_BIT: u32 = 0x8000_0000;
const OFFSET_MASK: u32 = 0x7FFF_FFFF;


/// The first field of a resource directory entry.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ResourceNameOrId {
    /// Offset of an [`ImageResourceDirectoryString`] relative to the root.
    Name(u32),
    Id(u16),
}
impl ResourceNameOrId {
    pub fn from_raw(raw: u32) -> Self {
        if raw & HIGH_BIT != 0 {
            Self::Name(raw & OFFSET_MASK)
        } else {
            Self::Id((raw & 0xFFFF) as u16)
        }
    }
}

/// The second field of a resource directory entry.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ResourceChildOffset {
    /// Offset of another [`ImageResourceDirectoryLevel`] relative to the root.
    Directory(u32),
    /// Offset of an [`ImageResourceDataEntry`] relative to the root.
    Data(u32),
}
impl ResourceChildOffset {
    pub fn from_raw(raw: u32) -> Self {
        if raw & HIGH_BIT != 0 {
            Self::Directory(raw & OFFSET_MASK)
        } else {
            Self::Data(raw)
        }
    }
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ImageResourceDirectoryString {
    pub length: u16, // in UTF-16 code units
    pub value: String,
}
impl ImageResourceDirectoryString {
    pub fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Self> {
        let length = cursor.read_u16()?;
        let value = cursor.read_utf16_string(length.into())?;
        Ok(Self {
            length,
            value,
        })
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ImageResourceDataEntry {
    pub offset_to_data: u32, // RVA
    pub size: u32,
    pub code_page: u32,
    pub reserved: u32,

    /// Position of the data within the byte source; `None` if its RVA is not mapped.
    pub data_offset: Option<u64>,
}
impl ImageResourceDataEntry {
    pub fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>, headers: &PeHeaders) -> Result<Self> {
        let offset_to_data = cursor.read_u32()?;
        let size = cursor.read_u32()?;
        let code_page = cursor.read_u32()?;
        let reserved = cursor.read_u32()?;

        let data_offset = headers.try_offset(offset_to_data);
        if data_offset.is_none() {
            debug!("resource data RVA {:#010X} is not mapped", offset_to_data);
        }

        Ok(Self {
            offset_to_data,
            size,
            code_page,
            reserved,
            data_offset,
        })
    }

    /// Reads the raw bytes of the resource from the byte source the image was parsed from.
    pub fn read_data<R: Read + Seek>(&self, cursor: &mut BinaryCursor<R>) -> Result<Option<Vec<u8>>> {
        let Some(data_offset) = self.data_offset else {
            return Ok(None);
        };
        cursor.seek(data_offset)?;
        let data = cursor.read_bytes(self.size.try_into().unwrap())?;
        Ok(Some(data))
    }
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum ResourceChild {
    Directory(ImageResourceDirectoryLevel),
    Data(ImageResourceDataEntry),
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ImageResourceDirectoryEntryInfo {
    pub name_or_id: ResourceNameOrId,
    pub child_offset: ResourceChildOffset,
    pub name: Option<ImageResourceDirectoryString>, // resolved for ResourceNameOrId::Name
    pub child: ResourceChild,
}
impl ImageResourceDirectoryEntryInfo {
    pub fn id(&self) -> Option<u16> {
        match self.name_or_id {
            ResourceNameOrId::Id(id) => Some(id),
            ResourceNameOrId::Name(_) => None,
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name
            .as_ref()
            .map(|n| n.value.as_str())
    }

    pub fn subdirectory(&self) -> Option<&ImageResourceDirectoryLevel> {
        match &self.child {
            ResourceChild::Directory(level) => Some(level),
            ResourceChild::Data(_) => None,
        }
    }

    pub fn data(&self) -> Option<&ImageResourceDataEntry> {
        match &self.child {
            ResourceChild::Data(data) => Some(data),
            ResourceChild::Directory(_) => None,
        }
    }
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ImageResourceDirectoryLevel {
    pub characteristics: u32,
    pub time_date_stamp: u32,
    pub major_version: u16,
    pub minor_version: u16,
    pub number_of_named_entries: u16,
    pub number_of_id_entries: u16,
    pub entries: Vec<ImageResourceDirectoryEntryInfo>, // [_; number_of_named_entries + number_of_id_entries]
}
impl ImageResourceDirectoryLevel {
    /// Reads the level at `root_offset + level_offset`, recursing into its subdirectories.
    ///
    /// Every entry read, at this level or below, is deducted from `remaining_entries`.
    pub fn read<R: Read + Seek>(
        cursor: &mut BinaryCursor<R>,
        headers: &PeHeaders,
        root_offset: u64,
        level_offset: u32,
        depth: usize,
        remaining_entries: &mut usize,
    ) -> Result<Self> {
        if depth >= MAX_RESOURCE_DEPTH {
            debug!("resource directory at {:#X} nested {} levels deep", level_offset, depth);
            return Err(FormatError::ResourceTreeDepth { max_depth: MAX_RESOURCE_DEPTH }.into());
        }

        cursor.seek(root_offset + u64::from(level_offset))?;
        let characteristics = cursor.read_u32()?;
        let time_date_stamp = cursor.read_u32()?;
        let major_version = cursor.read_u16()?;
        let minor_version = cursor.read_u16()?;
        let number_of_named_entries = cursor.read_u16()?;
        let number_of_id_entries = cursor.read_u16()?;

        let total_entry_count = usize::from(number_of_named_entries) + usize::from(number_of_id_entries);
        if total_entry_count > *remaining_entries {
            debug!("resource directory at {:#X} exceeds the entry limit", level_offset);
            return Err(FormatError::ResourceEntryCount { max_entries: MAX_RESOURCE_ENTRIES }.into());
        }
        *remaining_entries -= total_entry_count;
        let mut raw_entries = Vec::with_capacity(total_entry_count);
        for _ in 0..total_entry_count {
            let name_or_id = ResourceNameOrId::from_raw(cursor.read_u32()?);
            let child_offset = ResourceChildOffset::from_raw(cursor.read_u32()?);
            raw_entries.push((name_or_id, child_offset));
        }

        let mut entries = Vec::with_capacity(total_entry_count);
        for (name_or_id, child_offset) in raw_entries {
            let name = match name_or_id {
                ResourceNameOrId::Name(name_offset) => {
                    cursor.seek(root_offset + u64::from(name_offset))?;
                    Some(ImageResourceDirectoryString::read(cursor)?)
                },
                ResourceNameOrId::Id(_) => None,
            };

            let child = match child_offset {
                ResourceChildOffset::Directory(subdirectory_offset) => {
                    let level = Self::read(cursor, headers, root_offset, subdirectory_offset, depth + 1, remaining_entries)?;
                    ResourceChild::Directory(level)
                },
                ResourceChildOffset::Data(data_offset) => {
                    cursor.seek(root_offset + u64::from(data_offset))?;
                    ResourceChild::Data(ImageResourceDataEntry::read(cursor, headers)?)
                },
            };

            entries.push(ImageResourceDirectoryEntryInfo {
                name_or_id,
                child_offset,
                name,
                child,
            });
        }

        Ok(Self {
            characteristics,
            time_date_stamp,
            major_version,
            minor_version,
            number_of_named_entries,
            number_of_id_entries,
            entries,
        })
    }

    pub fn find_by_id(&self, id: u16) -> Option<&ImageResourceDirectoryEntryInfo> {
        self.entries
            .iter()
            .find(|e| e.id() == Some(id))
    }

    pub fn find_by_name(&self, name: &str) -> Option<&ImageResourceDirectoryEntryInfo> {
        self.entries
            .iter()
            .find(|e| e.name() == Some(name))
    }
}

#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ImageResourceDirectoryInfo {
    pub root_offset: Option<u64>,
    pub root: ImageResourceDirectoryLevel, // empty if absent or unreadable
    pub version_info: Option<VsVersionInfo>,
}
impl ImageResourceDirectoryInfo {
    /// Reads the resource tree. Never fails: a missing or unreadable tree reads as an empty one.
    pub fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>, headers: &PeHeaders) -> Self {
        let resource_entry = headers.data_directory(KnownDataDirectory::Resource);
        let root_offset = match headers.try_directory_offset(&resource_entry, false) {
            Ok(Some(ro)) => ro,
            Ok(None) => return Self::default(),
            Err(e) => {
                warn!("ignoring resource directory: {}", e);
                return Self::default();
            },
        };

        let mut remaining_entries = MAX_RESOURCE_ENTRIES;
        let root = match ImageResourceDirectoryLevel::read(cursor, headers, root_offset, 0, 0, &mut remaining_entries) {
            Ok(r) => r,
            Err(e) => {
                warn!("ignoring unreadable resource tree at {:#X}: {}", root_offset, e);
                return Self {
                    root_offset: Some(root_offset),
                    ..Self::default()
                };
            },
        };

        let version_info = VsVersionInfo::find(cursor, &root);

        Self {
            root_offset: Some(root_offset),
            root,
            version_info,
        }
    }
}
