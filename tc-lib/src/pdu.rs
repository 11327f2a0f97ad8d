//! CFDP Protocol Data Units carried in TC frame data fields.
//!
//! Only the fixed PDU header is decoded; the data field is carried opaquely. See
//! CCSDS 727.0-B-5, section 5.1.
use std::fmt::Display;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};
use typed_builder::TypedBuilder;

use crate::aggregator::EntityId;
use crate::frame::crc16;
use crate::{Error, Result};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PduType {
    #[default]
    FileDirective,
    FileData,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    TowardReceiver,
    TowardSender,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransmissionMode {
    Acknowledged,
    #[default]
    Unacknowledged,
}

/// Fixed CFDP PDU header.
#[derive(TypedBuilder, Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct PduHeader {
    #[builder(default = PduHeader::VERSION)]
    pub version: u8,
    #[builder(default)]
    pub pdu_type: PduType,
    #[builder(default)]
    pub direction: Direction,
    #[builder(default)]
    pub mode: TransmissionMode,
    /// A CRC-16 occupies the last 2 bytes of the data field.
    #[builder(default)]
    pub crc_flag: bool,
    #[builder(default)]
    pub large_file: bool,
    /// Data field length in bytes, including any CRC.
    #[builder(default)]
    pub data_field_len: u16,
    #[builder(default)]
    pub segmentation_control: bool,
    /// Length of the entity ids in bytes, 1 to 8.
    #[builder(default = 1)]
    pub entity_id_len: u8,
    #[builder(default)]
    pub segment_metadata: bool,
    /// Length of the transaction sequence number in bytes, 1 to 8.
    #[builder(default = 1)]
    pub sequence_number_len: u8,
    pub source_entity: EntityId,
    pub sequence_number: u64,
    pub dest_entity: EntityId,
}

impl PduHeader {
    /// Version for CCSDS 727.0-B-4 and later.
    pub const VERSION: u8 = 1;
    /// Length of the fixed portion preceding the variable length ids.
    pub const FIXED_LEN: usize = 4;
    const CRC_LEN: usize = 2;

    /// Header length in bytes, including the entity ids and sequence number.
    #[must_use]
    pub fn header_len(&self) -> usize {
        Self::FIXED_LEN + 2 * self.entity_id_len as usize + self.sequence_number_len as usize
    }

    /// Total PDU length indicated by this header.
    #[must_use]
    pub fn pdu_len(&self) -> usize {
        self.header_len() + self.data_field_len as usize
    }

    /// Decode a header from the start of `dat`, or `None` if there are not enough
    /// bytes for the fixed portion and the ids it describes.
    #[must_use]
    pub fn decode(dat: &[u8]) -> Option<Self> {
        if dat.len() < Self::FIXED_LEN {
            return None;
        }
        let entity_id_len = ((dat[3] >> 4) & 0x7) + 1;
        let sequence_number_len = (dat[3] & 0x7) + 1;
        let eid = entity_id_len as usize;
        let seq = sequence_number_len as usize;
        if dat.len() < Self::FIXED_LEN + 2 * eid + seq {
            return None;
        }

        let mut offset = Self::FIXED_LEN;
        let source_entity = read_uint(&dat[offset..offset + eid]);
        offset += eid;
        let sequence_number = read_uint(&dat[offset..offset + seq]);
        offset += seq;
        let dest_entity = read_uint(&dat[offset..offset + eid]);

        Some(PduHeader {
            version: (dat[0] >> 5) & 0x7,
            pdu_type: if (dat[0] >> 4) & 0x1 == 0 {
                PduType::FileDirective
            } else {
                PduType::FileData
            },
            direction: if (dat[0] >> 3) & 0x1 == 0 {
                Direction::TowardReceiver
            } else {
                Direction::TowardSender
            },
            mode: if (dat[0] >> 2) & 0x1 == 0 {
                TransmissionMode::Acknowledged
            } else {
                TransmissionMode::Unacknowledged
            },
            crc_flag: (dat[0] >> 1) & 0x1 == 1,
            large_file: dat[0] & 0x1 == 1,
            data_field_len: u16::from_be_bytes([dat[1], dat[2]]),
            segmentation_control: (dat[3] >> 7) & 0x1 == 1,
            entity_id_len,
            segment_metadata: (dat[3] >> 3) & 0x1 == 1,
            sequence_number_len,
            source_entity,
            sequence_number,
            dest_entity,
        })
    }

    /// Serialize to header bytes.
    ///
    /// # Errors
    /// [Error::InvalidArgument] if a length is not in 1..=8 or an id does not fit
    /// in its configured length.
    pub fn encode(&self) -> Result<Vec<u8>> {
        for (name, len) in [
            ("entity id", self.entity_id_len),
            ("sequence number", self.sequence_number_len),
        ] {
            if !(1..=8).contains(&len) {
                return Err(Error::InvalidArgument(format!(
                    "{name} length {len} not in [1, 8]"
                )));
            }
        }
        let eid = self.entity_id_len as usize;
        let seq = self.sequence_number_len as usize;

        let mut buf = Vec::with_capacity(self.header_len());
        buf.push(
            ((self.version & 0x7) << 5)
                | (u8::from(self.pdu_type == PduType::FileData) << 4)
                | (u8::from(self.direction == Direction::TowardSender) << 3)
                | (u8::from(self.mode == TransmissionMode::Unacknowledged) << 2)
                | (u8::from(self.crc_flag) << 1)
                | u8::from(self.large_file),
        );
        buf.extend_from_slice(&self.data_field_len.to_be_bytes());
        buf.push(
            (u8::from(self.segmentation_control) << 7)
                | ((self.entity_id_len - 1) << 4)
                | (u8::from(self.segment_metadata) << 3)
                | (self.sequence_number_len - 1),
        );
        write_uint(&mut buf, "source entity", self.source_entity, eid)?;
        write_uint(&mut buf, "sequence number", self.sequence_number, seq)?;
        write_uint(&mut buf, "destination entity", self.dest_entity, eid)?;
        Ok(buf)
    }
}

impl Display for PduHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "PduHeader{{type={:?}, dir={:?}, mode={:?}, crc={}, src={}, seq={}, dest={}, data_len={}}}",
            self.pdu_type,
            self.direction,
            self.mode,
            self.crc_flag,
            self.source_entity,
            self.sequence_number,
            self.dest_entity,
            self.data_field_len,
        )
    }
}

fn read_uint(dat: &[u8]) -> u64 {
    dat.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b))
}

fn write_uint(buf: &mut Vec<u8>, name: &str, val: u64, len: usize) -> Result<()> {
    if len < 8 && val >> (len * 8) != 0 {
        return Err(Error::InvalidArgument(format!(
            "{name} {val} does not fit in {len} bytes"
        )));
    }
    buf.extend_from_slice(&val.to_be_bytes()[8 - len..]);
    Ok(())
}

/// A single CFDP PDU.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Pdu {
    pub header: PduHeader,
    /// All PDU bytes, including the header.
    pub data: Vec<u8>,
}

impl Pdu {
    /// Create a PDU from a header template and data field. The header's data field
    /// length is computed, and a CRC is appended if the header's CRC flag is set.
    ///
    /// # Errors
    /// [Error::InvalidArgument] if the header cannot be encoded or the data field is
    /// too long.
    pub fn new(mut header: PduHeader, data_field: &[u8]) -> Result<Self> {
        let crc_len = if header.crc_flag {
            PduHeader::CRC_LEN
        } else {
            0
        };
        header.data_field_len = u16::try_from(data_field.len() + crc_len).map_err(|_| {
            Error::InvalidArgument(format!("data field len={} too long", data_field.len()))
        })?;
        let mut data = header.encode()?;
        data.extend_from_slice(data_field);
        if header.crc_flag {
            let crc = crc16(&data);
            data.extend_from_slice(&crc.to_be_bytes());
        }
        Ok(Pdu { header, data })
    }

    /// Data field bytes, excluding any CRC.
    #[must_use]
    pub fn data_field(&self) -> &[u8] {
        let end = if self.header.crc_flag {
            self.data.len().saturating_sub(PduHeader::CRC_LEN)
        } else {
            self.data.len()
        };
        &self.data[self.header.header_len().min(end)..end]
    }

    /// True if there is no CRC or the CRC matches.
    #[must_use]
    pub fn crc_valid(&self) -> bool {
        !self.header.crc_flag || crc16(&self.data) == 0
    }
}

/// Outcome of [PduParser::parse]: every PDU decoded before any error, and the
/// error that stopped parsing, if any.
#[derive(Debug, Default)]
pub struct PduParserResult {
    pub pdus: Vec<Pdu>,
    pub error: Option<Error>,
}

impl PduParserResult {
    #[must_use]
    pub fn has_error(&self) -> bool {
        self.error.is_some()
    }

    /// Raw bytes of each PDU, in order.
    #[must_use]
    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.pdus.iter().map(|p| p.data.clone()).collect()
    }

    /// Convert into a [Result], dropping any PDUs decoded before an error.
    ///
    /// # Errors
    /// The error captured while parsing.
    pub fn into_result(self) -> Result<Vec<Pdu>> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.pdus),
        }
    }
}

/// Extracts back-to-back PDUs from a frame data field.
#[derive(Debug, Clone, Copy)]
pub struct PduParser {
    stop_byte: Option<u8>,
    verify_crc: bool,
}

impl Default for PduParser {
    fn default() -> Self {
        PduParser {
            stop_byte: None,
            verify_crc: true,
        }
    }
}

impl PduParser {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop parsing, without error, when this byte is found where a PDU would start.
    /// Used to ignore idle fill at the end of a data field.
    #[must_use]
    pub fn with_stop_byte(mut self, byte: u8) -> Self {
        self.stop_byte = Some(byte);
        self
    }

    /// Verify the CRC of PDUs with the CRC flag set.
    #[must_use]
    pub fn with_crc_check(mut self, verify: bool) -> Self {
        self.verify_crc = verify;
        self
    }

    /// Parse PDUs from `dat` until it is exhausted, a stop byte is reached, or a
    /// structural error occurs. PDUs decoded before an error are kept.
    #[must_use]
    pub fn parse(&self, dat: &[u8]) -> PduParserResult {
        let mut zult = PduParserResult::default();
        let mut offset = 0;

        while offset < dat.len() {
            if self.stop_byte == Some(dat[offset]) {
                trace!(offset, "stop byte");
                break;
            }
            match self.parse_one(&dat[offset..], offset) {
                Ok(pdu) => {
                    trace!(offset, header = %pdu.header, "pdu");
                    offset += pdu.data.len();
                    zult.pdus.push(pdu);
                }
                Err(err) => {
                    debug!(offset, num_pdus = zult.pdus.len(), "pdu parse failed: {err}");
                    zult.error = Some(err);
                    break;
                }
            }
        }
        zult
    }

    fn parse_one(&self, dat: &[u8], offset: usize) -> Result<Pdu> {
        let header = PduHeader::decode(dat).ok_or_else(|| Error::ParseFailure {
            offset,
            message: format!("truncated pdu header; {} bytes remaining", dat.len()),
        })?;
        if header.data_field_len == 0 {
            return Err(Error::ParseFailure {
                offset,
                message: "pdu data field length is zero".to_string(),
            });
        }
        if header.crc_flag && (header.data_field_len as usize) < PduHeader::CRC_LEN {
            return Err(Error::ParseFailure {
                offset,
                message: "pdu data field too short for crc".to_string(),
            });
        }
        let len = header.pdu_len();
        if dat.len() < len {
            return Err(Error::ParseFailure {
                offset,
                message: format!("pdu len={len} exceeds remaining {} bytes", dat.len()),
            });
        }
        let pdu = Pdu {
            header,
            data: dat[..len].to_vec(),
        };
        if self.verify_crc && !pdu.crc_valid() {
            return Err(Error::ParseFailure {
                offset,
                message: "pdu crc mismatch".to_string(),
            });
        }
        Ok(pdu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn header(src: EntityId, seq: u64, dest: EntityId) -> PduHeader {
        PduHeader::builder()
            .source_entity(src)
            .sequence_number(seq)
            .dest_entity(dest)
            .build()
    }

    #[test]
    fn decode_header() {
        #[rustfmt::skip]
        let dat = [
            0x34,       // version 1, file data, toward receiver, unack, no crc, small file
            0x00, 0x03, // data field len
            0x11,       // 2 byte entity ids, 2 byte sequence number
            0x00, 0x05, // source
            0x01, 0x02, // seq
            0x00, 0x07, // dest
            0xaa, 0xbb, 0xcc,
        ];
        let header = PduHeader::decode(&dat).unwrap();

        assert_eq!(header.version, 1);
        assert_eq!(header.pdu_type, PduType::FileData);
        assert_eq!(header.direction, Direction::TowardReceiver);
        assert_eq!(header.mode, TransmissionMode::Unacknowledged);
        assert!(!header.crc_flag);
        assert!(!header.large_file);
        assert_eq!(header.data_field_len, 3);
        assert_eq!(header.entity_id_len, 2);
        assert_eq!(header.sequence_number_len, 2);
        assert_eq!(header.source_entity, 5);
        assert_eq!(header.sequence_number, 0x0102);
        assert_eq!(header.dest_entity, 7);
        assert_eq!(header.header_len(), 10);
        assert_eq!(header.pdu_len(), dat.len());
        assert_eq!(header.encode().unwrap(), &dat[..10]);
    }

    #[test_case(&[] ; "empty")]
    #[test_case(&[0x20, 0x00, 0x01] ; "fixed portion")]
    #[test_case(&[0x20, 0x00, 0x01, 0x77, 0, 0, 0, 0] ; "ids")]
    fn decode_header_too_short(dat: &[u8]) {
        assert!(PduHeader::decode(dat).is_none());
    }

    #[test]
    fn encode_rejects_wide_ids() {
        let mut hdr = header(0x1ff, 1, 2);
        assert!(hdr.encode().is_err());
        hdr.entity_id_len = 2;
        assert!(hdr.encode().is_ok());
        hdr.entity_id_len = 9;
        assert!(hdr.encode().is_err());
    }

    #[test]
    fn new_pdu_with_crc() {
        let mut hdr = header(1, 2, 3);
        hdr.crc_flag = true;
        let pdu = Pdu::new(hdr, &[0x10, 0x20]).unwrap();

        assert_eq!(pdu.header.data_field_len, 4);
        assert_eq!(pdu.data.len(), 7 + 4);
        assert_eq!(pdu.data_field(), &[0x10, 0x20]);
        assert!(pdu.crc_valid());
    }

    #[test]
    fn parse_multiple() {
        let a = Pdu::new(header(1, 1, 2), &[0x04, 0xaa]).unwrap();
        let b = Pdu::new(header(1, 2, 2), &[0x05, 0xbb, 0xcc]).unwrap();
        let mut dat = a.data.clone();
        dat.extend_from_slice(&b.data);

        let zult = PduParser::new().parse(&dat);
        assert!(!zult.has_error(), "{:?}", zult.error);
        assert_eq!(zult.pdus, vec![a.clone(), b.clone()]);
        assert_eq!(zult.payloads(), vec![a.data, b.data]);
    }

    #[test]
    fn parse_keeps_pdus_before_error() {
        let a = Pdu::new(header(1, 1, 2), &[0x04, 0xaa]).unwrap();
        let b = Pdu::new(header(1, 2, 2), &[0x05, 0xbb, 0xcc]).unwrap();
        let mut dat = a.data.clone();
        dat.extend_from_slice(&b.data[..b.data.len() - 1]);

        let zult = PduParser::new().parse(&dat);
        assert_eq!(zult.pdus, vec![a]);
        let Some(Error::ParseFailure { offset, .. }) = zult.error else {
            panic!("expected parse failure, got {:?}", zult.error);
        };
        assert_eq!(offset, 9);
    }

    #[test]
    fn parse_detects_crc_mismatch() {
        let mut hdr = header(1, 1, 2);
        hdr.crc_flag = true;
        let mut pdu = Pdu::new(hdr, &[0x04, 0xaa]).unwrap();
        pdu.data[5] ^= 0x80;

        let zult = PduParser::new().parse(&pdu.data);
        assert!(zult.pdus.is_empty());
        assert!(zult.has_error());

        let zult = PduParser::new().with_crc_check(false).parse(&pdu.data);
        assert_eq!(zult.pdus.len(), 1);
        assert!(!zult.has_error());
    }

    #[test]
    fn parse_stop_byte() {
        let a = Pdu::new(header(1, 1, 2), &[0x04, 0xaa]).unwrap();
        let mut dat = a.data.clone();
        dat.extend_from_slice(&[0xff; 5]);

        let zult = PduParser::new().with_stop_byte(0xff).parse(&dat);
        assert_eq!(zult.pdus.len(), 1);
        assert!(!zult.has_error());

        let zult = PduParser::new().parse(&dat);
        assert_eq!(zult.pdus.len(), 1);
        assert!(zult.has_error(), "trailing fill is an error without a stop byte");
    }

    #[test]
    fn parse_empty() {
        let zult = PduParser::new().parse(&[]);
        assert!(zult.pdus.is_empty());
        assert!(zult.into_result().unwrap().is_empty());
    }
}
