//! CCSDS TC Transfer Frames.
//!
//! See CCSDS 232.0-B-4, section 4.1.
mod builder;
mod fecf;
mod wrap;

pub use builder::*;
pub use fecf::*;
pub use wrap::*;

use std::fmt::Display;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub type Scid = u16;
pub type Vcid = u8;

/// Compose a 6-bit virtual channel id from a 3-bit execution string selector and a
/// 3-bit virtual channel number.
#[must_use]
pub fn compose_vcid(execution_string: u8, vc_number: u8) -> Vcid {
    ((execution_string & 0x7) << 3) | (vc_number & 0x7)
}

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone, Copy)]
pub struct TcFrameHeader {
    pub version: u8,
    pub bypass: bool,
    pub control_command: bool,
    pub spare: u8,
    pub scid: Scid,
    pub vcid: Vcid,
    /// Total frame length in bytes minus 1.
    pub len_minus1: u16,
    pub sequence: u8,
}

impl TcFrameHeader {
    /// Header length in bytes
    pub const LEN: usize = 5;
    /// Largest TC transfer frame permitted by the 10-bit length field.
    pub const MAX_FRAME_LEN: usize = 1024;
    pub const SCID_MAX: Scid = 1023;
    pub const VCID_MAX: Vcid = 63;

    /// Construct from the provided bytes, or `None` if there are not enough bytes.
    #[must_use]
    pub fn decode(dat: &[u8]) -> Option<Self> {
        if dat.len() < Self::LEN {
            return None;
        }
        let x = u16::from_be_bytes([dat[0], dat[1]]);
        let y = u16::from_be_bytes([dat[2], dat[3]]);
        Some(TcFrameHeader {
            version: (dat[0] >> 6) & 0x3,
            bypass: (dat[0] >> 5) & 0x1 == 1,
            control_command: (dat[0] >> 4) & 0x1 == 1,
            spare: (dat[0] >> 2) & 0x3,
            scid: x & 0x3ff,
            vcid: ((y >> 10) & 0x3f) as u8,
            len_minus1: y & 0x3ff,
            sequence: dat[4],
        })
    }

    /// Serialize to header bytes. Values wider than their fields are masked.
    #[must_use]
    pub fn encode(&self) -> [u8; Self::LEN] {
        let x = (u16::from(self.version & 0x3) << 14)
            | (u16::from(self.bypass) << 13)
            | (u16::from(self.control_command) << 12)
            | (u16::from(self.spare & 0x3) << 10)
            | (self.scid & 0x3ff);
        let y = (u16::from(self.vcid & 0x3f) << 10) | (self.len_minus1 & 0x3ff);
        let [x0, x1] = x.to_be_bytes();
        let [y0, y1] = y.to_be_bytes();
        [x0, x1, y0, y1, self.sequence]
    }

    /// Total frame length in bytes indicated by the header.
    #[must_use]
    pub fn frame_len(&self) -> usize {
        self.len_minus1 as usize + 1
    }

    #[must_use]
    pub fn execution_string(&self) -> u8 {
        (self.vcid >> 3) & 0x7
    }

    #[must_use]
    pub fn vc_number(&self) -> u8 {
        self.vcid & 0x7
    }
}

impl Display for TcFrameHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "TcFrameHeader{{version={}, bypass={}, cc={}, scid={}, vcid={} (es={}, vc={}), len={}, seq={}}}",
            self.version,
            self.bypass,
            self.control_command,
            self.scid,
            self.vcid,
            self.execution_string(),
            self.vc_number(),
            self.frame_len(),
            self.sequence,
        )
    }
}

/// A TC transfer frame: header, data field and optional FECF.
#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
pub struct TcTransferFrame {
    pub header: TcFrameHeader,
    /// Frame data field bytes
    pub data: Vec<u8>,
    pub fecf: Option<u16>,
}

impl TcTransferFrame {
    /// Decode a frame from the start of `dat` using the header length field.
    ///
    /// # Errors
    /// [Error::FrameWrapUnwrap] if there are not enough bytes for the header, for
    /// the length indicated by the header, or for the FECF.
    pub fn decode(dat: &[u8], has_fecf: bool) -> Result<Self> {
        let header = TcFrameHeader::decode(dat).ok_or_else(|| {
            Error::FrameWrapUnwrap(format!(
                "frame requires at least {} header bytes, got {}",
                TcFrameHeader::LEN,
                dat.len()
            ))
        })?;
        let frame_len = header.frame_len();
        if dat.len() < frame_len {
            return Err(Error::FrameWrapUnwrap(format!(
                "header indicates frame len={frame_len}, only {} bytes available",
                dat.len()
            )));
        }
        let fecf_len = if has_fecf { 2 } else { 0 };
        if frame_len < TcFrameHeader::LEN + fecf_len {
            return Err(Error::FrameWrapUnwrap(format!(
                "frame len={frame_len} too short for header and {fecf_len} FECF bytes"
            )));
        }
        let end = frame_len - fecf_len;
        let fecf = has_fecf.then(|| u16::from_be_bytes([dat[end], dat[end + 1]]));

        Ok(TcTransferFrame {
            header,
            data: dat[TcFrameHeader::LEN..end].to_vec(),
            fecf,
        })
    }

    #[must_use]
    pub fn builder() -> TcFrameBuilder {
        TcFrameBuilder::default()
    }

    #[must_use]
    pub fn has_fecf(&self) -> bool {
        self.fecf.is_some()
    }

    #[must_use]
    pub fn execution_string(&self) -> u8 {
        self.header.execution_string()
    }

    #[must_use]
    pub fn vc_number(&self) -> u8 {
        self.header.vc_number()
    }

    /// Number of bytes this frame occupies when serialized.
    #[must_use]
    pub fn len(&self) -> usize {
        TcFrameHeader::LEN + self.data.len() + if self.has_fecf() { 2 } else { 0 }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.len());
        buf.extend_from_slice(&self.header.encode());
        buf.extend_from_slice(&self.data);
        if let Some(fecf) = self.fecf {
            buf.extend_from_slice(&fecf.to_be_bytes());
        }
        buf
    }

    /// Recompute the CRC over the header and data and compare it to the FECF.
    /// Frames without a FECF are always valid.
    #[must_use]
    pub fn fecf_valid(&self) -> bool {
        match self.fecf {
            None => true,
            Some(fecf) => {
                let bytes = self.to_bytes();
                crc16(&bytes[..bytes.len() - 2]) == fecf
            }
        }
    }
}

/// Decode a stream of back-to-back frames.
///
/// # Errors
/// [Error::FrameWrapUnwrap] if any frame cannot be decoded, e.g., the stream is
/// truncated. Frames decoded before the error are not returned.
pub fn decode_frames(dat: &[u8], has_fecf: bool) -> Result<Vec<TcTransferFrame>> {
    let mut frames = Vec::new();
    let mut offset = 0;
    while offset < dat.len() {
        let frame = TcTransferFrame::decode(&dat[offset..], has_fecf).map_err(|err| {
            Error::FrameWrapUnwrap(format!("frame {} at offset {offset}: {err}", frames.len()))
        })?;
        offset += frame.header.frame_len();
        frames.push(frame);
    }
    Ok(frames)
}

/// Split a stream of back-to-back frames into per-frame byte buffers.
///
/// # Errors
/// [Error::FrameWrapUnwrap] if the stream is truncated.
pub fn split_frames(dat: &[u8]) -> Result<Vec<Vec<u8>>> {
    let mut frames = Vec::new();
    let mut offset = 0;
    while offset < dat.len() {
        let Some(header) = TcFrameHeader::decode(&dat[offset..]) else {
            return Err(Error::FrameWrapUnwrap(format!(
                "truncated frame header at offset {offset}"
            )));
        };
        let end = offset + header.frame_len();
        if end > dat.len() {
            return Err(Error::FrameWrapUnwrap(format!(
                "truncated frame at offset {offset}; need {} bytes, have {}",
                header.frame_len(),
                dat.len() - offset
            )));
        }
        frames.push(dat[offset..end].to_vec());
        offset = end;
    }
    Ok(frames)
}

/// Serializable overview of a frame, used for reporting.
#[derive(Serialize, Debug, Clone)]
pub struct FrameSummary {
    pub header: TcFrameHeader,
    pub execution_string: u8,
    pub vc_number: u8,
    pub data_len: usize,
    pub fecf: Option<u16>,
    pub fecf_valid: bool,
}

impl From<&TcTransferFrame> for FrameSummary {
    fn from(frame: &TcTransferFrame) -> Self {
        FrameSummary {
            header: frame.header,
            execution_string: frame.execution_string(),
            vc_number: frame.vc_number(),
            data_len: frame.data.len(),
            fecf: frame.fecf,
            fecf_valid: frame.fecf_valid(),
        }
    }
}
