//! Assembles small synthetic PE images for tests.


use crate::pe::{KnownDataDirectory, SECTION_HEADER_SIZE};


pub(crate) struct TestSection {
    pub name: &'static [u8],
    pub virtual_address: u32,
    pub virtual_size: u32,
    pub pointer_to_raw_data: u32,
    pub size_of_raw_data: u32,
    pub data: Vec<u8>, // [u8; virtual_size]
}

pub(crate) struct TestImage {
    pub pe32_plus: bool,
    pub image_base: u64,
    pub sections: Vec<TestSection>,
    pub directories: [(u32, u32); 16],
}
impl TestImage {
    pub const NT_HEADER_OFFSET: u64 = 0x80;
    pub const SECTION_TABLE_OFFSET: u64 = Self::NT_HEADER_OFFSET + 4 + 20 + 224; // PE32

    /// `.text` at RVA 0x1000 (file offset 0x200) and `.rdata` at RVA 0x2000 (file offset 0x1200),
    /// each 0x1000 bytes long.
    pub fn new() -> Self {
        Self {
            pe32_plus: false,
            image_base: 0x1000_0000,
            sections: vec![
                TestSection {
                    name: b".text",
                    virtual_address: 0x1000,
                    virtual_size: 0x1000,
                    pointer_to_raw_data: 0x200,
                    size_of_raw_data: 0x1000,
                    data: vec![0u8; 0x1000],
                },
                TestSection {
                    name: b".rdata",
                    virtual_address: 0x2000,
                    virtual_size: 0x1000,
                    pointer_to_raw_data: 0x1200,
                    size_of_raw_data: 0x1000,
                    data: vec![0u8; 0x1000],
                },
            ],
            directories: [(0, 0); 16],
        }
    }

    pub fn set_directory(&mut self, known: KnownDataDirectory, rva: u32, size: u32) {
        let index: usize = known.into();
        self.directories[index] = (rva, size);
    }

    pub fn write_at_rva(&mut self, rva: u32, bytes: &[u8]) {
        let section = self.sections
            .iter_mut()
            .find(|s| rva >= s.virtual_address && rva < s.virtual_address + s.virtual_size)
            .expect("RVA not within any test section");
        let start = usize::try_from(rva - section.virtual_address).unwrap();
        section.data[start..start + bytes.len()].copy_from_slice(bytes);
    }

    pub fn write_u16_at_rva(&mut self, rva: u32, value: u16) {
        self.write_at_rva(rva, &value.to_le_bytes());
    }

    pub fn write_u32_at_rva(&mut self, rva: u32, value: u32) {
        self.write_at_rva(rva, &value.to_le_bytes());
    }

    /// Lays the image out as a file on disk.
    pub fn build(&self) -> Vec<u8> {
        let mut bytes = self.build_headers();
        for section in &self.sections {
            let start = usize::try_from(section.pointer_to_raw_data).unwrap();
            let raw_size = usize::try_from(section.size_of_raw_data).unwrap().min(section.data.len());
            if bytes.len() < start + raw_size {
                bytes.resize(start + raw_size, 0x00);
            }
            bytes[start..start + raw_size].copy_from_slice(&section.data[..raw_size]);
        }
        bytes
    }

    /// Lays the image out as mapped by the loader.
    pub fn build_loaded(&self) -> Vec<u8> {
        let mut bytes = self.build_headers();
        for section in &self.sections {
            let start = usize::try_from(section.virtual_address).unwrap();
            let size = section.data.len();
            if bytes.len() < start + size {
                bytes.resize(start + size, 0x00);
            }
            bytes[start..start + size].copy_from_slice(&section.data);
        }
        bytes
    }

    fn build_headers(&self) -> Vec<u8> {
        let mut bytes = vec![0u8; usize::try_from(Self::NT_HEADER_OFFSET).unwrap()];
        bytes[0..2].copy_from_slice(b"MZ");
        bytes[0x3C..0x40].copy_from_slice(&u32::try_from(Self::NT_HEADER_OFFSET).unwrap().to_le_bytes());

        let optional_header_size: u16 = if self.pe32_plus { 240 } else { 224 };

        bytes.extend_from_slice(b"PE\0\0");
        let machine: u16 = if self.pe32_plus { 0x8664 } else { 0x014C };
        bytes.extend_from_slice(&machine.to_le_bytes());
        bytes.extend_from_slice(&u16::try_from(self.sections.len()).unwrap().to_le_bytes());
        bytes.extend_from_slice(&0x5E00_0000u32.to_le_bytes()); // time_date_stamp
        bytes.extend_from_slice(&0u32.to_le_bytes()); // pointer_to_symbol_table
        bytes.extend_from_slice(&0u32.to_le_bytes()); // number_of_symbols
        bytes.extend_from_slice(&optional_header_size.to_le_bytes());
        bytes.extend_from_slice(&0x2102u16.to_le_bytes()); // EXECUTABLE_IMAGE | IS_32BIT_MACHINE | DLL

        let magic: u16 = if self.pe32_plus { 0x020B } else { 0x010B };
        bytes.extend_from_slice(&magic.to_le_bytes());
        bytes.push(14); // major_linker_version
        bytes.push(0); // minor_linker_version
        bytes.extend_from_slice(&0x1000u32.to_le_bytes()); // size_of_code
        bytes.extend_from_slice(&0x1000u32.to_le_bytes()); // size_of_initialized_data
        bytes.extend_from_slice(&0u32.to_le_bytes()); // size_of_uninitialized_data
        bytes.extend_from_slice(&0x1000u32.to_le_bytes()); // address_of_entry_point
        bytes.extend_from_slice(&0x1000u32.to_le_bytes()); // base_of_code
        if self.pe32_plus {
            bytes.extend_from_slice(&self.image_base.to_le_bytes());
        } else {
            bytes.extend_from_slice(&0x2000u32.to_le_bytes()); // base_of_data
            bytes.extend_from_slice(&u32::try_from(self.image_base).unwrap().to_le_bytes());
        }
        bytes.extend_from_slice(&0x1000u32.to_le_bytes()); // section_alignment
        bytes.extend_from_slice(&0x200u32.to_le_bytes()); // file_alignment
        for version_part in [6u16, 0, 0, 0, 6, 0] {
            bytes.extend_from_slice(&version_part.to_le_bytes());
        }
        bytes.extend_from_slice(&0u32.to_le_bytes()); // win32_version_value
        bytes.extend_from_slice(&0x3000u32.to_le_bytes()); // size_of_image
        bytes.extend_from_slice(&0x200u32.to_le_bytes()); // size_of_headers
        bytes.extend_from_slice(&0u32.to_le_bytes()); // checksum
        bytes.extend_from_slice(&3u16.to_le_bytes()); // subsystem
        bytes.extend_from_slice(&0x0140u16.to_le_bytes()); // dll_characteristics
        for size in [0x10_0000u64, 0x1000, 0x10_0000, 0x1000] {
            if self.pe32_plus {
                bytes.extend_from_slice(&size.to_le_bytes());
            } else {
                bytes.extend_from_slice(&u32::try_from(size).unwrap().to_le_bytes());
            }
        }
        bytes.extend_from_slice(&0u32.to_le_bytes()); // loader_flags
        bytes.extend_from_slice(&16u32.to_le_bytes()); // number_of_rva_and_sizes
        for (rva, size) in &self.directories {
            bytes.extend_from_slice(&rva.to_le_bytes());
            bytes.extend_from_slice(&size.to_le_bytes());
        }

        for section in &self.sections {
            let mut header = [0u8; SECTION_HEADER_SIZE as usize];
            header[0..section.name.len()].copy_from_slice(section.name);
            header[8..12].copy_from_slice(&section.virtual_size.to_le_bytes());
            header[12..16].copy_from_slice(&section.virtual_address.to_le_bytes());
            header[16..20].copy_from_slice(&section.size_of_raw_data.to_le_bytes());
            header[20..24].copy_from_slice(&section.pointer_to_raw_data.to_le_bytes());
            header[36..40].copy_from_slice(&0x4000_0040u32.to_le_bytes());
            bytes.extend_from_slice(&header);
        }

        bytes
    }
}
