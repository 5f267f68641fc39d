use std::fmt;
use std::io;


pub type Result<T> = std::result::Result<T, Error>;


/// An error encountered while reading a PE/COFF image.
#[derive(Debug)]
pub enum Error {
    /// The bytes violate a structural invariant of the format.
    InvalidFormat(FormatError),

    /// A read ran past the end of the byte source.
    Truncated { position: u64, requested: usize },

    /// The byte source itself failed.
    Io(io::Error),
}
impl Error {
    pub fn is_invalid_format(&self) -> bool {
        matches!(self, Self::InvalidFormat(_))
    }

    pub fn is_truncated(&self) -> bool {
        matches!(self, Self::Truncated { .. })
    }

    pub fn format_error(&self) -> Option<&FormatError> {
        match self {
            Self::InvalidFormat(e) => Some(e),
            _ => None,
        }
    }
}
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidFormat(e)
                => write!(f, "invalid format: {}", e),
            Self::Truncated { position, requested }
                => write!(f, "truncated input: failed to read {} bytes at offset {:#X}", requested, position),
            Self::Io(e)
                => write!(f, "I/O error: {}", e),
        }
    }
}
impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::InvalidFormat(e) => Some(e),
            Self::Truncated { .. } => None,
            Self::Io(e) => Some(e),
        }
    }
}
impl From<FormatError> for Error {
    fn from(value: FormatError) -> Self { Self::InvalidFormat(value) }
}
impl From<io::Error> for Error {
    fn from(value: io::Error) -> Self { Self::Io(value) }
}


#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum FormatError {
    AnonymousObjectHeader,
    PeSignature { obtained: u32 },
    NegativeSectionCount { obtained: i16 },
    OptionalHeaderMagic { obtained: u16 },
    OptionalHeaderSize { expected_at_least: u16, obtained: u16 },
    DirectoryCrossesSection { rva: u32, size: u32 },
    DirectorySize { size: u32, entry_size: u32 },
    Cor20HeaderSize { expected_at_least: u32, obtained: u32 },
    DebugCharacteristics { obtained: u32 },
    CodeViewMagic { obtained: [u8; 4] },
    ExportOrdinal { ordinal: u32, function_count: u32 },
    ResourceEntryCount { max_entries: usize },
    ResourceTreeDepth { max_depth: usize },
    InvalidText,
}
impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AnonymousObjectHeader
                => write!(f, "anonymous object headers are not supported"),
            Self::PeSignature { obtained }
                => write!(f, "wrong PE signature (expected 0x00004550, obtained {:#010X})", obtained),
            Self::NegativeSectionCount { obtained }
                => write!(f, "negative section count {}", obtained),
            Self::OptionalHeaderMagic { obtained }
                => write!(f, "unknown optional header magic {:#06X}", obtained),
            Self::OptionalHeaderSize { expected_at_least, obtained }
                => write!(f, "optional header too small (expected at least {}, obtained {})", expected_at_least, obtained),
            Self::DirectoryCrossesSection { rva, size }
                => write!(f, "directory at RVA {:#010X} with size {:#X} runs past the end of its section", rva, size),
            Self::DirectorySize { size, entry_size }
                => write!(f, "directory size {} is not a multiple of the entry size {}", size, entry_size),
            Self::Cor20HeaderSize { expected_at_least, obtained }
                => write!(f, "COR20 header has unexpected size (expected at least {}, obtained {})", expected_at_least, obtained),
            Self::DebugCharacteristics { obtained }
                => write!(f, "debug directory entry has non-zero characteristics {:#010X}", obtained),
            Self::CodeViewMagic { obtained }
                => write!(f, "CodeView record has wrong magic {:?} (expected \"RSDS\")", obtained),
            Self::ExportOrdinal { ordinal, function_count }
                => write!(f, "export ordinal {} out of range ({} functions)", ordinal, function_count),
            Self::ResourceEntryCount { max_entries }
                => write!(f, "resource directory holds more than {} entries", max_entries),
            Self::ResourceTreeDepth { max_depth }
                => write!(f, "resource directory nested deeper than {} levels", max_depth),
            Self::InvalidText
                => write!(f, "invalid encoding of a textual string"),
        }
    }
}
impl std::error::Error for FormatError {
}
