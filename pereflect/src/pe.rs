//! Portable Executable headers, section table and address translation.
//!
//! The PE format was introduced in Windows NT 3.1 and Windows 95; it is based on COFF and used by
//! Windows to this day. Every structure in an image outside of the headers is located through a
//! relative virtual address (RVA), which is translated to a position in the byte source through the
//! section table. How that translation works depends on whether the bytes are laid out as on disk
//! or as already mapped by the loader.

use std::io::{Read, Seek};

use bitflags::bitflags;
use from_to_repr::from_to_other;
use tracing::debug;

use crate::cursor::BinaryCursor;
use crate::error::{FormatError, Result};


pub const DOS_SIGNATURE: u16 = 0x5A4D; // "MZ"
pub const PE_SIGNATURE: u32 = 0x0000_4550; // "PE\0\0"

const NT_HEADER_OFFSET_OFFSET: u64 = 0x3C;
const FILE_HEADER_SIZE: u64 = 20;
pub const SECTION_HEADER_SIZE: u64 = 40;


#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ImageDataDirectory {
    pub rva: u32,
    pub size: u32,
}
impl ImageDataDirectory {
    pub fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Self> {
        let rva = cursor.read_u32()?;
        let size = cursor.read_u32()?;
        Ok(Self {
            rva,
            size,
        })
    }

    /// Whether the directory exists at all. The RVA of an absent directory is meaningless.
    pub fn is_present(&self) -> bool {
        self.size != 0
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub enum KnownDataDirectory {
    Export,
    Import,
    Resource,
    Exception,
    Certificate,
    BaseRelocation,
    Debug,
    Architecture,
    GlobalPtr,
    Tls,
    LoadConfig,
    BoundImport,
    ImportAddressTable,
    DelayImport,
    ComDescriptor,
    Reserved15,
}
impl From<KnownDataDirectory> for usize {
    fn from(value: KnownDataDirectory) -> Self {
        match value {
            KnownDataDirectory::Export => 0,
            KnownDataDirectory::Import => 1,
            KnownDataDirectory::Resource => 2,
            KnownDataDirectory::Exception => 3,
            KnownDataDirectory::Certificate => 4,
            KnownDataDirectory::BaseRelocation => 5,
            KnownDataDirectory::Debug => 6,
            KnownDataDirectory::Architecture => 7,
            KnownDataDirectory::GlobalPtr => 8,
            KnownDataDirectory::Tls => 9,
            KnownDataDirectory::LoadConfig => 10,
            KnownDataDirectory::BoundImport => 11,
            KnownDataDirectory::ImportAddressTable => 12,
            KnownDataDirectory::DelayImport => 13,
            KnownDataDirectory::ComDescriptor => 14,
            KnownDataDirectory::Reserved15 => 15,
        }
    }
}


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ImageFileHeader {
    pub machine: MachineType, // u16
    pub number_of_sections: u16, // stored as i16, negative values rejected
    pub time_date_stamp: u32,
    pub pointer_to_symbol_table: u32, // COFF debug info, deprecated
    pub number_of_symbols: u32, // COFF debug info, deprecated
    pub size_of_optional_header: u16,
    pub characteristics: Characteristics, // u16
}
impl ImageFileHeader {
    pub fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Self> {
        let machine = MachineType::from_base_type(cursor.read_u16()?);
        let section_count = cursor.read_i16()?;
        if section_count < 0 {
            debug!("file header announces a negative section count {}", section_count);
            return Err(FormatError::NegativeSectionCount { obtained: section_count }.into());
        }
        let number_of_sections = section_count.unsigned_abs();
        let time_date_stamp = cursor.read_u32()?;
        let pointer_to_symbol_table = cursor.read_u32()?;
        let number_of_symbols = cursor.read_u32()?;
        let size_of_optional_header = cursor.read_u16()?;
        let characteristics = Characteristics::from_bits_retain(cursor.read_u16()?);

        Ok(Self {
            machine,
            number_of_sections,
            time_date_stamp,
            pointer_to_symbol_table,
            number_of_symbols,
            size_of_optional_header,
            characteristics,
        })
    }
}

#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[from_to_other(base_type = u16, derive_compare = "as_int")]
pub enum MachineType {
    Unknown = 0x0000,
    AlphaAxp = 0x0184,
    Alpha64 = 0x0284,
    MatsushitaAm33 = 0x01D3,
    Amd64 = 0x8664,
    Arm = 0x01C0,
    Arm64 = 0xAA64,
    ArmThumb2 = 0x01C4,
    EfiByteCode = 0x0EBC,
    I386 = 0x014C,
    Itanium = 0x0200,
    LoongArch32 = 0x6232,
    LoongArch64 = 0x6264,
    MitsubishiM32r = 0x9041,
    Mips16 = 0x0266,
    MipsWithFpu = 0x0366,
    Mips16WithFpu = 0x0466,
    PowerPc = 0x01F0,
    PowerPcWithFpu = 0x01F1,
    MipsR3kBigEndian = 0x0160,
    MipsR3kLittleEndian = 0x0162,
    MipsR4k = 0x0166,
    MipsR10k = 0x0168,
    RiscV32 = 0x5032,
    RiscV64 = 0x5064,
    RiscV128 = 0x5128,
    HitachiSh3 = 0x01A2,
    HitachiSh3Dsp = 0x01A3,
    HitachiSh4 = 0x01A6,
    HitachiSh5 = 0x01A8,
    ArmThumb = 0x01C2,
    WceMipsV2 = 0x0169,
    Other(u16),
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    #[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
    pub struct Characteristics : u16 {
        /// Relocation data has been stripped; image must be loaded at its preferred address.
        const RELOCS_STRIPPED = 0x0001;

        /// Image is valid and can be run. Lack of this flag indicates a linker error.
        const EXECUTABLE_IMAGE = 0x0002;

        /// COFF line numbers have been stripped. Deprecated.
        const LINE_NUMS_STRIPPED = 0x0004;

        /// COFF local symbols have been stripped. Deprecated.
        const LOCAL_SYMS_STRIPPED = 0x0008;

        /// Aggressively trim working set. Deprecated.
        const AGGRESSIVE_WS_TRIM = 0x0010;

        /// Application can handle addresses beyond 2GB.
        const LARGE_ADDRESS_AWARE = 0x0020;

        // 0x0040 reserved

        /// Little-endian integers on a big-endian machine. Deprecated.
        const BYTES_REVERSED_LO = 0x0080;

        /// Machine is based on a 32-bit word architecture.
        const IS_32BIT_MACHINE = 0x0100;

        /// Debugging information has been stripped.
        const DEBUG_STRIPPED = 0x0200;

        /// If run from a removable device, copy to swap and run from there.
        const REMOVABLE_RUN_FROM_SWAP = 0x0400;

        /// If run from a network path, copy to swap and run from there.
        const NET_RUN_FROM_SWAP = 0x0800;

        /// Image is a system file (e.g. driver) and not a user program.
        const SYSTEM = 0x1000;

        /// Image is a dynamic-link library.
        const DLL = 0x2000;

        /// Should only be run on uniprocessor machines.
        const UP_SYSTEM_ONLY = 0x4000;

        /// Big-endian integers on little-endian machines. Deprecated.
        const BYTES_REVERSED_HI = 0x8000;
    }
}


#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[from_to_other(base_type = u16, derive_compare = "as_int")]
pub enum OptionalHeaderMagic {
    Pe32 = 0x010B,
    Pe32Plus = 0x020B,
    Other(u16),
}

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ImageOptionalHeader {
    pub magic: OptionalHeaderMagic, // u16
    pub major_linker_version: u8,
    pub minor_linker_version: u8,
    pub size_of_code: u32,
    pub size_of_initialized_data: u32,
    pub size_of_uninitialized_data: u32,
    pub address_of_entry_point: u32,
    pub base_of_code: u32,
    pub base_of_data: Option<u32>, // PE32 only, not in PE32+
    pub image_base: u64, // u32 on PE32
    pub section_alignment: u32,
    pub file_alignment: u32,
    pub major_operating_system_version: u16,
    pub minor_operating_system_version: u16,
    pub major_image_version: u16,
    pub minor_image_version: u16,
    pub major_subsystem_version: u16,
    pub minor_subsystem_version: u16,
    pub win32_version_value: u32,
    pub size_of_image: u32,
    pub size_of_headers: u32,
    pub checksum: u32,
    pub subsystem: Subsystem, // u16
    pub dll_characteristics: DllCharacteristics, // u16
    pub size_of_stack_reserve: u64, // u32 on PE32
    pub size_of_stack_commit: u64, // u32 on PE32
    pub size_of_heap_reserve: u64, // u32 on PE32
    pub size_of_heap_commit: u64, // u32 on PE32
    pub loader_flags: u32,
    pub number_of_rva_and_sizes: u32,
    pub data_directories: Vec<ImageDataDirectory>, // [ImageDataDirectory; min(number_of_rva_and_sizes, room in header)]
}
impl ImageOptionalHeader {
    pub fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>, size_of_optional_header: u16) -> Result<Self> {
        if size_of_optional_header < 2 {
            debug!("optional header of {} bytes cannot even hold its magic", size_of_optional_header);
            return Err(FormatError::OptionalHeaderSize { expected_at_least: 2, obtained: size_of_optional_header }.into());
        }

        let magic = OptionalHeaderMagic::from_base_type(cursor.read_u16()?);
        let (is_64, fixed_size) = match magic {
            OptionalHeaderMagic::Pe32 => (false, 96),
            OptionalHeaderMagic::Pe32Plus => (true, 112),
            OptionalHeaderMagic::Other(other) => {
                debug!("unknown optional header magic {:#06X}", other);
                return Err(FormatError::OptionalHeaderMagic { obtained: other }.into());
            },
        };
        if size_of_optional_header < fixed_size {
            debug!("optional header of {} bytes is smaller than the fixed part ({} bytes)", size_of_optional_header, fixed_size);
            return Err(FormatError::OptionalHeaderSize { expected_at_least: fixed_size, obtained: size_of_optional_header }.into());
        }

        let major_linker_version = cursor.read_u8()?;
        let minor_linker_version = cursor.read_u8()?;
        let size_of_code = cursor.read_u32()?;
        let size_of_initialized_data = cursor.read_u32()?;
        let size_of_uninitialized_data = cursor.read_u32()?;
        let address_of_entry_point = cursor.read_u32()?;
        let base_of_code = cursor.read_u32()?;
        let base_of_data = if is_64 {
            None
        } else {
            Some(cursor.read_u32()?)
        };

        let image_base = read_pointer_sized(cursor, is_64)?;
        let section_alignment = cursor.read_u32()?;
        let file_alignment = cursor.read_u32()?;
        let major_operating_system_version = cursor.read_u16()?;
        let minor_operating_system_version = cursor.read_u16()?;
        let major_image_version = cursor.read_u16()?;
        let minor_image_version = cursor.read_u16()?;
        let major_subsystem_version = cursor.read_u16()?;
        let minor_subsystem_version = cursor.read_u16()?;
        let win32_version_value = cursor.read_u32()?;
        let size_of_image = cursor.read_u32()?;
        let size_of_headers = cursor.read_u32()?;
        let checksum = cursor.read_u32()?;
        let subsystem = Subsystem::from_base_type(cursor.read_u16()?);
        let dll_characteristics = DllCharacteristics::from_bits_retain(cursor.read_u16()?);
        let size_of_stack_reserve = read_pointer_sized(cursor, is_64)?;
        let size_of_stack_commit = read_pointer_sized(cursor, is_64)?;
        let size_of_heap_reserve = read_pointer_sized(cursor, is_64)?;
        let size_of_heap_commit = read_pointer_sized(cursor, is_64)?;
        let loader_flags = cursor.read_u32()?;
        let number_of_rva_and_sizes = cursor.read_u32()?;

        // only read as many directories as both the count and the header size allow
        let room_for_directories = u32::from(size_of_optional_header - fixed_size) / 8;
        let data_directory_count = number_of_rva_and_sizes.min(room_for_directories);
        if data_directory_count < number_of_rva_and_sizes {
            debug!(
                "optional header announces {} data directories but only has room for {}",
                number_of_rva_and_sizes, room_for_directories,
            );
        }
        let mut data_directories = Vec::with_capacity(data_directory_count.try_into().unwrap());
        for _ in 0..data_directory_count {
            data_directories.push(ImageDataDirectory::read(cursor)?);
        }

        Ok(Self {
            magic,
            major_linker_version,
            minor_linker_version,
            size_of_code,
            size_of_initialized_data,
            size_of_uninitialized_data,
            address_of_entry_point,
            base_of_code,
            base_of_data,
            image_base,
            section_alignment,
            file_alignment,
            major_operating_system_version,
            minor_operating_system_version,
            major_image_version,
            minor_image_version,
            major_subsystem_version,
            minor_subsystem_version,
            win32_version_value,
            size_of_image,
            size_of_headers,
            checksum,
            subsystem,
            dll_characteristics,
            size_of_stack_reserve,
            size_of_stack_commit,
            size_of_heap_reserve,
            size_of_heap_commit,
            loader_flags,
            number_of_rva_and_sizes,
            data_directories,
        })
    }

    pub fn is_64bit(&self) -> bool {
        self.magic == OptionalHeaderMagic::Pe32Plus
    }

    /// Returns the given data directory, or the absent directory if the header has no such slot.
    pub fn data_directory(&self, known: KnownDataDirectory) -> ImageDataDirectory {
        let index: usize = known.into();
        self.data_directories
            .get(index)
            .copied()
            .unwrap_or_default()
    }
}

fn read_pointer_sized<R: Read + Seek>(cursor: &mut BinaryCursor<R>, is_64: bool) -> Result<u64> {
    if is_64 {
        cursor.read_u64()
    } else {
        Ok(cursor.read_u32()?.into())
    }
}

#[derive(Clone, Copy, Debug)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
#[from_to_other(base_type = u16, derive_compare = "as_int")]
pub enum Subsystem {
    /// Unknown subsystem.
    Unknown = 0,

    /// Driver or native process.
    Native = 1,

    /// Windows GUI process.
    WindowsGui = 2,

    /// Windows CLI process.
    WindowsCui = 3,

    /// OS/2 CLI process.
    Os2Cui = 5,

    /// POSIX CLI process.
    PosixCui = 7,

    /// Native Windows 9x driver.
    NativeWindows = 8,

    /// Windows CE GUI process.
    WindowsCeGui = 9,

    EfiApplication = 10,
    EfiBootServiceDriver = 11,
    EfiRuntimeDriver = 12,
    EfiRom = 13,
    Xbox = 14,
    WindowsBootApplication = 16,

    Other(u16),
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    #[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
    pub struct DllCharacteristics : u16 {
        // 0x0001 through 0x0010 reserved

        /// Image can handle high-entropy 64-bit virtual addresses.
        const HIGH_ENTROPY_VIRTUAL_ADDRESSES = 0x0020;

        /// DLL can be relocated at load time.
        const DYNAMIC_BASE = 0x0040;

        /// Code integrity checks are enforced.
        const FORCE_INTEGRITY = 0x0080;

        /// Image is compatible with the No-Execute flag.
        const NX_COMPATIBILITY = 0x0100;

        const NO_ISOLATION = 0x0200;
        const NO_SEH = 0x0400;
        const NO_BIND = 0x0800;
        const APPCONTAINER = 0x1000;
        const WDM_DRIVER = 0x2000;
        const GUARD_CF = 0x4000;
        const TERMINAL_SERVER_AWARE = 0x8000;
    }
}


#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct ImageSectionHeader {
    pub name: [u8; 8],
    pub virtual_size: u32,
    pub virtual_address: u32,
    pub size_of_raw_data: u32,
    pub pointer_to_raw_data: u32,
    pub pointer_to_relocations: u32,
    pub pointer_to_line_numbers: u32,
    pub number_of_relocations: u16,
    pub number_of_line_numbers: u16,
    pub characteristics: SectionCharacteristics, // u32
}
impl ImageSectionHeader {
    pub fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>) -> Result<Self> {
        let name = cursor.read_array()?;
        let virtual_size = cursor.read_u32()?;
        let virtual_address = cursor.read_u32()?;
        let size_of_raw_data = cursor.read_u32()?;
        let pointer_to_raw_data = cursor.read_u32()?;
        let pointer_to_relocations = cursor.read_u32()?;
        let pointer_to_line_numbers = cursor.read_u32()?;
        let number_of_relocations = cursor.read_u16()?;
        let number_of_line_numbers = cursor.read_u16()?;
        let characteristics = SectionCharacteristics::from_bits_retain(cursor.read_u32()?);

        Ok(Self {
            name,
            virtual_size,
            virtual_address,
            size_of_raw_data,
            pointer_to_raw_data,
            pointer_to_relocations,
            pointer_to_line_numbers,
            number_of_relocations,
            number_of_line_numbers,
            characteristics,
        })
    }

    /// The section name up to the first NUL byte.
    pub fn name(&self) -> String {
        let length = self.name
            .iter()
            .position(|b| *b == 0x00)
            .unwrap_or(self.name.len());
        String::from_utf8_lossy(&self.name[..length]).into_owned()
    }

    pub fn contains_rva(&self, rva: u32) -> bool {
        rva >= self.virtual_address && rva - self.virtual_address < self.virtual_size
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
    #[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
    pub struct SectionCharacteristics : u32 {
        const NO_PAD = 0x0000_0008;
        const CONTAINS_CODE = 0x0000_0020;
        const CONTAINS_INITIALIZED_DATA = 0x0000_0040;
        const CONTAINS_UNINITIALIZED_DATA = 0x0000_0080;
        const LINK_OTHER = 0x0000_0100;
        const LINK_INFO = 0x0000_0200;
        const LINK_REMOVE = 0x0000_0800;
        const LINK_COMDAT = 0x0000_1000;
        const GLOBAL_POINTER_RELATIVE = 0x0000_8000;
        const MEM_LOCKED = 0x0004_0000;
        const MEM_PRELOAD = 0x0008_0000;
        const ALIGN_BYTES_SHIFT_COUNT_1 = 0x0010_0000;
        const ALIGN_BYTES_SHIFT_COUNT_2 = 0x0020_0000;
        const ALIGN_BYTES_SHIFT_COUNT_4 = 0x0040_0000;
        const ALIGN_BYTES_SHIFT_COUNT_8 = 0x0080_0000;
        const LINK_NRELOC_OVFL = 0x0100_0000;
        const MEM_DISCARDABLE = 0x0200_0000;
        const MEM_NOT_CACHED = 0x0400_0000;
        const MEM_NOT_PAGED = 0x0800_0000;
        const MEM_SHARED = 0x1000_0000;
        const MEM_EXECUTE = 0x2000_0000;
        const MEM_READ = 0x4000_0000;
        const MEM_WRITE = 0x8000_0000;
    }
}


/// The headers and section table of an image, together with the addressing regime.
///
/// This is the addressing authority all directory parsers go through: they only ever call
/// [`PeHeaders::try_offset`] and [`PeHeaders::try_directory_offset`] and never look at whether the
/// bytes come from a file on disk or from a mapped image.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct PeHeaders {
    pub is_loaded_image: bool,
    pub nt_header_offset: Option<u32>, // None for a bare COFF object
    pub file_header: ImageFileHeader,
    pub optional_header: Option<ImageOptionalHeader>,
    pub section_headers: Vec<ImageSectionHeader>, // [ImageSectionHeader; file_header.number_of_sections]
}
impl PeHeaders {
    pub fn read<R: Read + Seek>(cursor: &mut BinaryCursor<R>, is_loaded_image: bool) -> Result<Self> {
        cursor.seek(0)?;
        let dos_magic = cursor.read_u16()?;

        let nt_header_offset = if dos_magic == DOS_SIGNATURE {
            // follow the 32-bit offset at 0x3C to the NT headers
            cursor.seek(NT_HEADER_OFFSET_OFFSET)?;
            let nt_header_offset = cursor.read_u32()?;
            cursor.seek(nt_header_offset.into())?;

            let signature = cursor.read_u32()?;
            if signature != PE_SIGNATURE {
                debug!("wrong PE signature {:#010X} at {:#X}", signature, nt_header_offset);
                return Err(FormatError::PeSignature { obtained: signature }.into());
            }
            Some(nt_header_offset)
        } else {
            if dos_magic == 0x0000 && cursor.read_u16()? == 0xFFFF {
                debug!("file starts with an anonymous object header");
                return Err(FormatError::AnonymousObjectHeader.into());
            }

            // no DOS stub; assume a COFF object starting right at the beginning
            debug!("no DOS signature ({:#06X}); reading as a COFF object", dos_magic);
            cursor.seek(0)?;
            None
        };

        let file_header = ImageFileHeader::read(cursor)?;
        let optional_header_offset = match nt_header_offset {
            Some(nho) => u64::from(nho) + 4 + FILE_HEADER_SIZE,
            None => FILE_HEADER_SIZE,
        };

        let optional_header = if nt_header_offset.is_some() && file_header.size_of_optional_header > 0 {
            Some(ImageOptionalHeader::read(cursor, file_header.size_of_optional_header)?)
        } else {
            None
        };

        // the section table follows the optional header, however much of it we understood
        cursor.seek(optional_header_offset + u64::from(file_header.size_of_optional_header))?;

        let mut section_headers = Vec::with_capacity(file_header.number_of_sections.into());
        for _ in 0..file_header.number_of_sections {
            section_headers.push(ImageSectionHeader::read(cursor)?);
        }

        Ok(Self {
            is_loaded_image,
            nt_header_offset,
            file_header,
            optional_header,
            section_headers,
        })
    }

    pub fn is_coff_only(&self) -> bool {
        self.nt_header_offset.is_none()
    }

    pub fn is_64bit(&self) -> bool {
        self.optional_header
            .as_ref()
            .map(|oh| oh.is_64bit())
            .unwrap_or(false)
    }

    pub fn image_base(&self) -> u64 {
        self.optional_header
            .as_ref()
            .map(|oh| oh.image_base)
            .unwrap_or(0)
    }

    /// Returns the given data directory, or the absent directory for images without one.
    pub fn data_directory(&self, known: KnownDataDirectory) -> ImageDataDirectory {
        self.optional_header
            .as_ref()
            .map(|oh| oh.data_directory(known))
            .unwrap_or_default()
    }

    /// Index of the first section whose virtual range contains the RVA.
    pub fn section_containing(&self, rva: u32) -> Option<usize> {
        self.section_headers
            .iter()
            .position(|s| s.contains_rva(rva))
    }

    /// Translates an RVA into a position within the byte source.
    ///
    /// For a loaded image, the position is the RVA itself; otherwise it is relative to the raw data
    /// of the containing section. Fails if no section contains the RVA.
    pub fn try_offset(&self, rva: u32) -> Option<u64> {
        let section = &self.section_headers[self.section_containing(rva)?];
        Some(self.offset_within(section, rva))
    }

    /// Translates the RVA of a directory into a position within the byte source.
    ///
    /// Returns `Ok(None)` if the directory is absent or not contained in any section. Unless
    /// `allow_cross_section_boundary` is set, a directory whose size runs past the end of its
    /// containing section is rejected.
    pub fn try_directory_offset(&self, directory: &ImageDataDirectory, allow_cross_section_boundary: bool) -> Result<Option<u64>> {
        if !directory.is_present() {
            return Ok(None);
        }
        let Some(index) = self.section_containing(directory.rva) else {
            debug!("directory RVA {:#010X} is not contained in any section", directory.rva);
            return Ok(None);
        };
        let section = &self.section_headers[index];

        let remaining_in_section = section.virtual_size - (directory.rva - section.virtual_address);
        if !allow_cross_section_boundary && directory.size > remaining_in_section {
            debug!(
                "directory at RVA {:#010X} with size {:#X} exceeds the {:#X} bytes left in section {}",
                directory.rva, directory.size, remaining_in_section, index,
            );
            return Err(FormatError::DirectoryCrossesSection { rva: directory.rva, size: directory.size }.into());
        }

        Ok(Some(self.offset_within(section, directory.rva)))
    }

    fn offset_within(&self, section: &ImageSectionHeader, rva: u32) -> u64 {
        if self.is_loaded_image {
            rva.into()
        } else {
            u64::from(section.pointer_to_raw_data) + u64::from(rva - section.virtual_address)
        }
    }
}
