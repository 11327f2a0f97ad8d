//! BCH code blocks, the atomic payload unit of a CLTU.
//!
//! See CCSDS 231.0-B-4, section 3.
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::{Error, Result};

/// Code block layout.
#[derive(TypedBuilder, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct BchConfig {
    /// Number of information bytes in each code block.
    #[builder(default = BchConfig::DATA_LEN)]
    pub data_length: usize,
    /// Number of EDAC (parity + filler) bytes in each code block.
    #[builder(default = BchConfig::EDAC_LEN)]
    pub edac_length: usize,
    /// Byte used to right-pad short data.
    #[builder(default = BchConfig::FILL_BYTE)]
    pub fill_byte: u8,
}

impl BchConfig {
    pub const DATA_LEN: usize = 7;
    pub const EDAC_LEN: usize = 1;
    pub const FILL_BYTE: u8 = 0x55;

    /// Total code block length in bytes.
    #[must_use]
    pub fn bch_length(&self) -> usize {
        self.data_length + self.edac_length
    }

    /// Parse a fill byte given as exactly two hex digits, e.g., `"55"`.
    ///
    /// # Errors
    /// [Error::InvalidArgument] if `s` is not two hex digits.
    pub fn parse_fill_byte(s: &str) -> Result<u8> {
        if s.len() != 2 {
            return Err(Error::InvalidArgument(format!(
                "fill byte must be 2 hex digits, got {s:?}"
            )));
        }
        let mut buf = [0u8; 1];
        hex::decode_to_slice(s, &mut buf)
            .map_err(|e| Error::InvalidArgument(format!("invalid fill byte {s:?}: {e}")))?;
        Ok(buf[0])
    }

    /// # Errors
    /// [Error::InvalidArgument] if code blocks would carry no data.
    pub fn validate(&self) -> Result<()> {
        if self.data_length == 0 {
            return Err(Error::InvalidArgument(
                "code block data length must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn is_standard(&self) -> bool {
        self.data_length == Self::DATA_LEN && self.edac_length == Self::EDAC_LEN
    }
}

impl Default for BchConfig {
    fn default() -> Self {
        Self {
            data_length: Self::DATA_LEN,
            edac_length: Self::EDAC_LEN,
            fill_byte: Self::FILL_BYTE,
        }
    }
}

/// A single code block: `data_length` information bytes followed by
/// `edac_length` error detection and correction bytes.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct BchCodeblock {
    data: Vec<u8>,
    edac: Vec<u8>,
}

impl BchCodeblock {
    #[must_use]
    pub fn builder(config: BchConfig) -> BchCodeblockBuilder {
        BchCodeblockBuilder {
            config,
            data: None,
            edac: None,
        }
    }

    /// Build a code block from `data`, computing the EDAC byte using the CCSDS
    /// (63,56) modified BCH code.
    ///
    /// # Errors
    /// [Error::InvalidArgument] if `config` is not the standard 7+1 layout or `data`
    /// is longer than `config.data_length`.
    pub fn encode(data: &[u8], config: BchConfig) -> Result<Self> {
        if !config.is_standard() {
            return Err(Error::InvalidArgument(format!(
                "EDAC computation requires a {}+{} code block, got {}+{}",
                BchConfig::DATA_LEN,
                BchConfig::EDAC_LEN,
                config.data_length,
                config.edac_length
            )));
        }
        if data.len() > config.data_length {
            return Err(Error::InvalidArgument(format!(
                "code block data len={} exceeds {}",
                data.len(),
                config.data_length
            )));
        }
        let mut padded = data.to_vec();
        padded.resize(config.data_length, config.fill_byte);
        let edac = edac(&padded);
        Ok(BchCodeblock {
            data: padded,
            edac: vec![edac],
        })
    }

    /// Decode a code block from the first `config.bch_length()` bytes of `dat`.
    ///
    /// # Errors
    /// [Error::InvalidArgument] if there are fewer than `config.bch_length()` bytes.
    pub fn parse(dat: &[u8], config: &BchConfig) -> Result<Self> {
        let len = config.bch_length();
        if dat.len() < len {
            return Err(Error::InvalidArgument(format!(
                "code block requires {len} bytes, got {}",
                dat.len()
            )));
        }
        Ok(BchCodeblock {
            data: dat[..config.data_length].to_vec(),
            edac: dat[config.data_length..len].to_vec(),
        })
    }

    /// Decode as many full code blocks as are available in `dat`. Trailing bytes
    /// not making up a full block are ignored.
    #[must_use]
    pub fn parse_list(dat: &[u8], config: &BchConfig) -> Vec<Self> {
        let len = config.bch_length();
        if len == 0 {
            return Vec::new();
        }
        dat.chunks_exact(len)
            .map(|chunk| BchCodeblock {
                data: chunk[..config.data_length].to_vec(),
                edac: chunk[config.data_length..].to_vec(),
            })
            .collect()
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn edac(&self) -> &[u8] {
        &self.edac
    }

    /// Total length of this code block in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len() + self.edac.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.len());
        buf.extend_from_slice(&self.data);
        buf.extend_from_slice(&self.edac);
        buf
    }

    /// True if the EDAC byte matches the one computed from the data. Only
    /// standard 7+1 code blocks can be checked; anything else is `false`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        if self.data.len() != BchConfig::DATA_LEN || self.edac.len() != BchConfig::EDAC_LEN {
            return false;
        }
        edac(&self.data) == self.edac[0]
    }
}

/// Builds a [BchCodeblock] with explicitly provided EDAC bytes.
#[derive(Debug, Clone)]
pub struct BchCodeblockBuilder {
    config: BchConfig,
    data: Option<Vec<u8>>,
    edac: Option<Vec<u8>>,
}

impl BchCodeblockBuilder {
    #[must_use]
    pub fn data(mut self, data: &[u8]) -> Self {
        self.data = Some(data.to_vec());
        self
    }

    #[must_use]
    pub fn edac(mut self, edac: &[u8]) -> Self {
        self.edac = Some(edac.to_vec());
        self
    }

    /// # Errors
    /// [Error::InvalidState] listing every unmet precondition.
    pub fn build(self) -> Result<BchCodeblock> {
        let mut problems = Vec::new();
        match &self.data {
            None => problems.push("data not set".to_string()),
            Some(data) if data.len() > self.config.data_length => problems.push(format!(
                "data len={} exceeds {}",
                data.len(),
                self.config.data_length
            )),
            _ => {}
        }
        match &self.edac {
            None => problems.push("edac not set".to_string()),
            Some(edac) if edac.len() != self.config.edac_length => problems.push(format!(
                "edac len={} must be exactly {}",
                edac.len(),
                self.config.edac_length
            )),
            _ => {}
        }
        if !problems.is_empty() {
            return Err(Error::InvalidState(problems));
        }

        let (Some(mut data), Some(edac)) = (self.data, self.edac) else {
            return Err(Error::InvalidState(vec!["data and edac not set".to_string()]));
        };
        data.resize(self.config.data_length, self.config.fill_byte);
        Ok(BchCodeblock { data, edac })
    }
}

/// BCH generator polynomial g(x) = x^7 + x^6 + x^2 + 1, without the x^7 term.
const GENERATOR: u8 = 0x45;

/// Compute the EDAC byte for 7 information bytes: the complement of the 7 parity
/// bits followed by a zero filler bit.
fn edac(data: &[u8]) -> u8 {
    let mut sr: u8 = 0;
    for byte in data {
        for i in (0..8).rev() {
            let bit = (byte >> i) & 0x1;
            let feedback = ((sr >> 6) & 0x1) ^ bit;
            sr = (sr << 1) & 0x7f;
            if feedback == 1 {
                sr ^= GENERATOR;
            }
        }
    }
    (!sr & 0x7f) << 1
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test]
    fn encode_zeros() {
        let block = BchCodeblock::encode(&[0u8; 7], BchConfig::default()).unwrap();
        // all parity bits zero, complemented, filler bit 0
        assert_eq!(block.edac(), &[0xfe]);
        assert!(block.is_valid());
    }

    #[test]
    fn encode_pads_short_data() {
        let block = BchCodeblock::encode(&[0x01, 0x02], BchConfig::default()).unwrap();
        assert_eq!(block.data(), &[0x01, 0x02, 0x55, 0x55, 0x55, 0x55, 0x55]);
        assert_eq!(block.edac()[0] & 0x1, 0, "filler bit must be zero");
        assert!(block.is_valid());
    }

    #[test]
    fn encode_detects_bit_flip() {
        let block = BchCodeblock::encode(&[0xde, 0xad, 0xbe, 0xef, 0, 1, 2], BchConfig::default())
            .unwrap();
        let mut bytes = block.to_bytes();
        bytes[3] ^= 0x10;
        let corrupt = BchCodeblock::parse(&bytes, &BchConfig::default()).unwrap();
        assert!(!corrupt.is_valid());
    }

    #[test]
    fn encode_rejects_nonstandard_layout() {
        let config = BchConfig::builder().data_length(6).build();
        let zult = BchCodeblock::encode(&[0u8; 6], config);
        assert!(matches!(zult, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn builder_roundtrip() {
        let config = BchConfig::default();
        let block = BchCodeblock::builder(config)
            .data(&[1, 2, 3])
            .edac(&[0xaa])
            .build()
            .unwrap();
        let parsed = BchCodeblock::parse(&block.to_bytes(), &config).unwrap();

        assert_eq!(parsed.data(), &[1, 2, 3, 0x55, 0x55, 0x55, 0x55]);
        assert_eq!(parsed.edac(), &[0xaa]);
        assert_eq!(parsed, block);
    }

    #[test]
    fn builder_reports_all_problems() {
        let zult = BchCodeblock::builder(BchConfig::default()).build();
        let Err(Error::InvalidState(problems)) = zult else {
            panic!("expected invalid state, got {zult:?}");
        };
        assert_eq!(problems.len(), 2, "{problems:?}");
    }

    #[test_case(&[] ; "empty")]
    #[test_case(&[0xaa, 0xbb] ; "too long")]
    fn builder_rejects_bad_edac(edac: &[u8]) {
        let zult = BchCodeblock::builder(BchConfig::default())
            .data(&[0u8; 7])
            .edac(edac)
            .build();
        assert!(matches!(zult, Err(Error::InvalidState(_))), "{zult:?}");
    }

    #[test]
    fn builder_rejects_long_data() {
        let zult = BchCodeblock::builder(BchConfig::default())
            .data(&[0u8; 8])
            .edac(&[0])
            .build();
        assert!(matches!(zult, Err(Error::InvalidState(_))));
    }

    #[test_case(0 ; "empty")]
    #[test_case(1 ; "one byte")]
    #[test_case(7 ; "one short")]
    fn parse_too_short(len: usize) {
        let zult = BchCodeblock::parse(&vec![0u8; len], &BchConfig::default());
        assert!(matches!(zult, Err(Error::InvalidArgument(_))));
    }

    #[test_case(16, 2 ; "exact multiple")]
    #[test_case(21, 2 ; "trailing remainder dropped")]
    #[test_case(7, 0 ; "less than one block")]
    fn parse_list_counts(len: usize, expected: usize) {
        let dat: Vec<u8> = (0..len).map(|i| i as u8).collect();
        let blocks = BchCodeblock::parse_list(&dat, &BchConfig::default());
        assert_eq!(blocks.len(), expected);
        if expected > 0 {
            assert_eq!(blocks[1].data(), &dat[8..15]);
            assert_eq!(blocks[1].edac(), &dat[15..16]);
        }
    }

    #[test_case("55", 0x55)]
    #[test_case("00", 0x00)]
    #[test_case("fF", 0xff)]
    fn parse_fill_byte(s: &str, expected: u8) {
        assert_eq!(BchConfig::parse_fill_byte(s).unwrap(), expected);
    }

    #[test_case("5" ; "one digit")]
    #[test_case("555" ; "three digits")]
    #[test_case("zz" ; "not hex")]
    fn parse_fill_byte_invalid(s: &str) {
        assert!(BchConfig::parse_fill_byte(s).is_err());
    }

    #[test]
    fn config_without_data_is_invalid() {
        let config = BchConfig::builder().data_length(0).edac_length(0).build();
        assert!(matches!(config.validate(), Err(Error::InvalidArgument(_))));
        assert!(BchConfig::default().validate().is_ok());
    }
}
