use std::fmt;


/// A globally unique identifier in its mixed-endian on-disk layout.
#[derive(Clone, Copy, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(serde::Deserialize, serde::Serialize))]
pub struct Guid {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}
impl Guid {
    pub fn from_le_bytes(bytes: [u8; 16]) -> Self {
        let data1 = u32::from_le_bytes(bytes[0..4].try_into().unwrap());
        let data2 = u16::from_le_bytes(bytes[4..6].try_into().unwrap());
        let data3 = u16::from_le_bytes(bytes[6..8].try_into().unwrap());
        let data4 = bytes[8..16].try_into().unwrap();
        Self {
            data1,
            data2,
            data3,
            data4,
        }
    }

    pub fn to_le_bytes(&self) -> [u8; 16] {
        let mut ret = [0u8; 16];
        ret[0..4].copy_from_slice(&self.data1.to_le_bytes());
        ret[4..6].copy_from_slice(&self.data2.to_le_bytes());
        ret[6..8].copy_from_slice(&self.data3.to_le_bytes());
        ret[8..16].copy_from_slice(&self.data4);
        ret
    }
}
impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{:08X}-{:04X}-{:04X}-{:02X}{:02X}-",
            self.data1, self.data2, self.data3, self.data4[0], self.data4[1],
        )?;
        for b in &self.data4[2..] {
            write!(f, "{:02X}", b)?;
        }
        write!(f, "}}")
    }
}
