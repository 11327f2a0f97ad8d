use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use super::wrap::validate;
use super::{compose_vcid, wrap, FecfAlgorithm, Scid, TcFrameHeader, TcTransferFrame, Vcid, WrapParams};
use crate::{Error, Result};

/// Per-VCID rolling frame sequence numbers, shared between builders.
#[derive(Debug)]
pub struct SequenceCounter {
    counters: Vec<AtomicU8>,
}

impl Default for SequenceCounter {
    fn default() -> Self {
        SequenceCounter {
            counters: (0..=TcFrameHeader::VCID_MAX).map(|_| AtomicU8::new(0)).collect(),
        }
    }
}

impl SequenceCounter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the next sequence number for `vcid`, wrapping from 255 to 0.
    pub fn next(&self, vcid: Vcid) -> u8 {
        self.counters[(vcid & TcFrameHeader::VCID_MAX) as usize].fetch_add(1, Ordering::SeqCst)
    }

    /// Sequence number the next frame for `vcid` will get.
    #[must_use]
    pub fn peek(&self, vcid: Vcid) -> u8 {
        self.counters[(vcid & TcFrameHeader::VCID_MAX) as usize].load(Ordering::SeqCst)
    }

    pub fn reset(&self, vcid: Vcid, value: u8) {
        self.counters[(vcid & TcFrameHeader::VCID_MAX) as usize].store(value, Ordering::SeqCst);
    }
}

/// Source of frame sequence numbers for a [TcFrameBuilder].
#[derive(Debug, Clone)]
pub enum FrameSequence {
    /// Start at this value; frames split from the same data count up from it.
    Fixed(u8),
    /// Draw each frame's number from a shared counter.
    AutoRoll(Arc<SequenceCounter>),
}

impl Default for FrameSequence {
    fn default() -> Self {
        Self::Fixed(0)
    }
}

/// Fluent builder for [TcTransferFrame]s.
///
/// # Example
/// ```
/// use ccsds_tc::frame::{FecfAlgorithm, TcTransferFrame};
///
/// let frames = TcTransferFrame::builder()
///     .scid(512)
///     .vcid(10)
///     .data(&[0x01, 0x02, 0x03])
///     .fecf(FecfAlgorithm::None)
///     .build()
///     .unwrap();
/// assert_eq!(frames.len(), 1);
/// assert_eq!(frames[0].header.scid, 512);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TcFrameBuilder {
    version: u8,
    bypass: bool,
    control_command: bool,
    spare: u8,
    scid: Option<Scid>,
    vcid: Option<Vcid>,
    sequence: FrameSequence,
    data: Option<Vec<u8>>,
    fecf: FecfAlgorithm,
    fecf_length: Option<usize>,
    fecf_value: Option<u16>,
    frame_length: Option<u16>,
    max_frame_length: Option<usize>,
}

impl TcFrameBuilder {
    #[must_use]
    pub fn version(mut self, version: u8) -> Self {
        self.version = version;
        self
    }

    #[must_use]
    pub fn bypass(mut self, bypass: bool) -> Self {
        self.bypass = bypass;
        self
    }

    #[must_use]
    pub fn control_command(mut self, control_command: bool) -> Self {
        self.control_command = control_command;
        self
    }

    /// Reserved spare bits.
    #[must_use]
    pub fn spare(mut self, spare: u8) -> Self {
        self.spare = spare;
        self
    }

    #[must_use]
    pub fn scid(mut self, scid: Scid) -> Self {
        self.scid = Some(scid);
        self
    }

    #[must_use]
    pub fn vcid(mut self, vcid: Vcid) -> Self {
        self.vcid = Some(vcid);
        self
    }

    /// Set the virtual channel id from its execution string and virtual channel number.
    #[must_use]
    pub fn execution_string(mut self, execution_string: u8, vc_number: u8) -> Self {
        self.vcid = Some(compose_vcid(execution_string, vc_number));
        self
    }

    #[must_use]
    pub fn sequence(mut self, sequence: u8) -> Self {
        self.sequence = FrameSequence::Fixed(sequence);
        self
    }

    #[must_use]
    pub fn auto_sequence(mut self, counter: Arc<SequenceCounter>) -> Self {
        self.sequence = FrameSequence::AutoRoll(counter);
        self
    }

    #[must_use]
    pub fn data(mut self, data: &[u8]) -> Self {
        self.data = Some(data.to_vec());
        self
    }

    #[must_use]
    pub fn fecf(mut self, fecf: FecfAlgorithm) -> Self {
        self.fecf = fecf;
        self
    }

    #[must_use]
    pub fn fecf_length(mut self, len: usize) -> Self {
        self.fecf_length = Some(len);
        self
    }

    /// Use `value` as the FECF rather than computing it.
    #[must_use]
    pub fn fecf_value(mut self, value: u16) -> Self {
        self.fecf_value = Some(value);
        self
    }

    /// Write `len` to the header length field rather than the actual frame length.
    #[must_use]
    pub fn frame_length(mut self, len: u16) -> Self {
        self.frame_length = Some(len);
        self
    }

    /// Largest frame to produce. Data exceeding a single frame is split.
    #[must_use]
    pub fn max_frame_length(mut self, len: usize) -> Self {
        self.max_frame_length = Some(len);
        self
    }

    /// Build the frame(s). More than one frame is produced only when the data
    /// does not fit in a single frame.
    ///
    /// # Errors
    /// [Error::FrameWrapUnwrap] if scid, vcid or data are not set, or if wrapping
    /// reports any errors.
    pub fn build(self) -> Result<Vec<TcTransferFrame>> {
        let mut missing = Vec::new();
        if self.scid.is_none() {
            missing.push("scid");
        }
        if self.vcid.is_none() {
            missing.push("vcid");
        }
        if self.data.is_none() {
            missing.push("data");
        }
        if !missing.is_empty() {
            return Err(Error::FrameWrapUnwrap(format!(
                "required values not set: {}",
                missing.join(", ")
            )));
        }

        let vcid = self.vcid.unwrap_or_default();
        let params = WrapParams {
            version: self.version,
            bypass: self.bypass,
            control_command: self.control_command,
            spare: self.spare,
            scid: self.scid.unwrap_or_default(),
            vcid,
            data: self.data.unwrap_or_default(),
            fecf: self.fecf,
            fecf_length: self.fecf_length,
            fecf_value: self.fecf_value,
            frame_length: self.frame_length,
            max_frame_length: self
                .max_frame_length
                .unwrap_or(TcFrameHeader::MAX_FRAME_LEN),
        };

        // Invalid parameters must not draw numbers from a shared counter.
        let errors = validate(&params);
        if !errors.is_empty() {
            return Err(Error::FrameWrapUnwrap(format!(
                "{} error(s): {}",
                errors.len(),
                errors.join("; ")
            )));
        }

        let wrapped = match self.sequence {
            FrameSequence::Fixed(start) => {
                let mut seq = start;
                wrap(&params, || {
                    let cur = seq;
                    seq = seq.wrapping_add(1);
                    cur
                })
            }
            FrameSequence::AutoRoll(counter) => wrap(&params, || counter.next(vcid)),
        };

        let mut frames = Vec::with_capacity(wrapped.len());
        for (idx, wf) in wrapped.into_iter().enumerate() {
            if !wf.is_ok() {
                return Err(Error::FrameWrapUnwrap(format!(
                    "frame {idx} reported {} error(s): {}",
                    wf.error_count, wf.error_message
                )));
            }
            frames.push(wf.frame);
        }
        Ok(frames)
    }
}
