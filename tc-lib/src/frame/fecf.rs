use crc::{Crc, CRC_16_IBM_3740};
use serde::{Deserialize, Serialize};

/// CRC-16/CCITT-FALSE: poly 0x1021, init 0xffff, no reflection, no final xor.
pub const CRC_CCITT_FALSE: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

/// Compute the CRC-16/CCITT-FALSE checksum of `dat`.
#[must_use]
pub fn crc16(dat: &[u8]) -> u16 {
    CRC_CCITT_FALSE.checksum(dat)
}

/// Frame Error Control Field algorithm.
#[derive(Serialize, Deserialize, Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum FecfAlgorithm {
    /// No FECF is appended.
    None,
    /// 2-byte CRC-16/CCITT-FALSE over all preceding frame bytes.
    #[default]
    Crc16,
}

impl FecfAlgorithm {
    /// Length in bytes of the FECF produced by this algorithm.
    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::None => 0,
            Self::Crc16 => 2,
        }
    }

    #[must_use]
    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Compute the FECF for `dat`, i.e., every frame byte preceding the FECF.
    #[must_use]
    pub fn compute(&self, dat: &[u8]) -> Option<u16> {
        match self {
            Self::None => None,
            Self::Crc16 => Some(crc16(dat)),
        }
    }
}
