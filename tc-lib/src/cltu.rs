//! Communications Link Transmission Units.
//!
//! A CLTU is the acquisition sequence, start sequence, a series of BCH code blocks
//! and a tail sequence. See CCSDS 231.0-B-4, section 5.
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::bch::{BchCodeblock, BchConfig};
use crate::frame::TcTransferFrame;
use crate::{Error, Result};

/// Default acquisition sequence length in bytes.
pub const ACQUISITION_LEN: usize = 22;
/// Default start sequence.
pub const START_SEQUENCE: [u8; 2] = [0xeb, 0x90];
/// Default tail sequence.
pub const TAIL_SEQUENCE: [u8; 8] = [0xc5, 0xc5, 0xc5, 0xc5, 0xc5, 0xc5, 0xc5, 0x79];
/// Default idle sequence length in bytes.
pub const IDLE_LEN: usize = 8;
const ALTERNATING: u8 = 0x55;

static GLOBAL_SEQUENCES: OnceLock<CltuSequences> = OnceLock::new();

/// The sequences surrounding the code blocks of a CLTU.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct CltuSequences {
    pub acquisition: Vec<u8>,
    pub start: Vec<u8>,
    pub tail: Vec<u8>,
    pub idle: Vec<u8>,
}

impl Default for CltuSequences {
    fn default() -> Self {
        CltuSequences {
            acquisition: vec![ALTERNATING; ACQUISITION_LEN],
            start: START_SEQUENCE.to_vec(),
            tail: TAIL_SEQUENCE.to_vec(),
            idle: vec![ALTERNATING; IDLE_LEN],
        }
    }
}

impl CltuSequences {
    /// Install process-wide default sequences. May only be done once per process.
    ///
    /// # Errors
    /// [Error::InvalidState] if the defaults have already been set.
    pub fn set_global(sequences: CltuSequences) -> Result<()> {
        GLOBAL_SEQUENCES.set(sequences).map_err(|_| {
            Error::InvalidState(vec!["process-wide CLTU sequences already set".to_string()])
        })
    }

    /// The process-wide sequences, or the CCSDS defaults if none were set.
    #[must_use]
    pub fn global() -> CltuSequences {
        GLOBAL_SEQUENCES.get().cloned().unwrap_or_default()
    }

    /// Decode a hex string sequence such as `"EB90"`.
    ///
    /// # Errors
    /// [Error::InvalidArgument] if `s` is not valid hex.
    pub fn parse_hex(s: &str) -> Result<Vec<u8>> {
        let s = s.trim_start_matches("0x").trim_start_matches("0X");
        hex::decode(s).map_err(|e| Error::InvalidArgument(format!("invalid hex sequence {s:?}: {e}")))
    }
}

/// An immutable CLTU, created with [CltuBuilder].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct Cltu {
    codeblocks: Vec<BchCodeblock>,
    data: Vec<u8>,
    sequences: CltuSequences,
    order_id: Option<u32>,
    frames: Vec<TcTransferFrame>,
}

impl Cltu {
    #[must_use]
    pub fn builder() -> CltuBuilder {
        CltuBuilder::default()
    }

    /// Create a CLTU whose data is the concatenation of `codeblocks`.
    ///
    /// # Errors
    /// Never in practice; see [CltuBuilder::build].
    pub fn from_codeblocks(codeblocks: Vec<BchCodeblock>) -> Result<Self> {
        let data: Vec<u8> = codeblocks.iter().flat_map(BchCodeblock::to_bytes).collect();
        Cltu::builder().codeblocks(codeblocks).data(data).build()
    }

    /// Encode `frames` into a CLTU. The frame bytes are concatenated and split into
    /// code block sized chunks, the last padded with the fill byte, and the EDAC
    /// computed for each.
    ///
    /// # Errors
    /// [Error::InvalidArgument] if `config` is not the standard 7+1 code block layout.
    pub fn from_frames(frames: Vec<TcTransferFrame>, config: BchConfig) -> Result<Self> {
        config.validate()?;
        let bytes: Vec<u8> = frames.iter().flat_map(TcTransferFrame::to_bytes).collect();
        let codeblocks = bytes
            .chunks(config.data_length)
            .map(|chunk| BchCodeblock::encode(chunk, config))
            .collect::<Result<Vec<_>>>()?;
        debug!(
            num_frames = frames.len(),
            num_codeblocks = codeblocks.len(),
            "encoded frames into cltu"
        );
        let data: Vec<u8> = codeblocks.iter().flat_map(BchCodeblock::to_bytes).collect();
        Cltu::builder()
            .codeblocks(codeblocks)
            .data(data)
            .frames(frames)
            .build()
    }

    /// Decode a CLTU from `dat`.
    ///
    /// Everything before the first occurrence of the start sequence is taken to be
    /// the acquisition sequence. Code blocks are read until a block-sized window
    /// equals the tail sequence.
    ///
    /// # Errors
    /// [Error::InvalidArgument] if `config` has no data bytes. [Error::ParseFailure]
    /// if there is no start sequence, the tail sequence is never found, or a code
    /// block fails its EDAC check (standard layout only).
    pub fn parse(dat: &[u8], sequences: &CltuSequences, config: &BchConfig) -> Result<Self> {
        config.validate()?;
        let start = find(dat, &sequences.start).ok_or_else(|| Error::ParseFailure {
            offset: 0,
            message: "start sequence not found".to_string(),
        })?;
        let acquisition = dat[..start].to_vec();
        let mut offset = start + sequences.start.len();
        let block_len = config.bch_length();
        let check_edac = config.data_length == BchConfig::DATA_LEN
            && config.edac_length == BchConfig::EDAC_LEN;

        let mut codeblocks = Vec::new();
        loop {
            let window = &dat[offset..];
            if window.len() >= sequences.tail.len() && window.starts_with(&sequences.tail) {
                trace!(offset, "found tail sequence");
                break;
            }
            if window.len() < block_len {
                return Err(Error::ParseFailure {
                    offset,
                    message: "tail sequence not found".to_string(),
                });
            }
            let block = BchCodeblock::parse(window, config)?;
            if check_edac && !block.is_valid() {
                return Err(Error::ParseFailure {
                    offset,
                    message: format!("code block {} failed EDAC check", codeblocks.len()),
                });
            }
            codeblocks.push(block);
            offset += block_len;
        }

        let data: Vec<u8> = codeblocks.iter().flat_map(BchCodeblock::to_bytes).collect();
        Cltu::builder()
            .codeblocks(codeblocks)
            .data(data)
            .acquisition_sequence(acquisition)
            .start_sequence(sequences.start.clone())
            .tail_sequence(sequences.tail.clone())
            .idle_sequence(sequences.idle.clone())
            .build()
    }

    #[must_use]
    pub fn codeblocks(&self) -> &[BchCodeblock] {
        &self.codeblocks
    }

    /// Bytes between the start and tail sequences.
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Concatenated information bytes of every code block, i.e., without EDAC.
    /// Any fill padding is still present.
    #[must_use]
    pub fn frame_bytes(&self) -> Vec<u8> {
        self.codeblocks
            .iter()
            .flat_map(|b| b.data().to_vec())
            .collect()
    }

    #[must_use]
    pub fn acquisition_sequence(&self) -> &[u8] {
        &self.sequences.acquisition
    }

    #[must_use]
    pub fn start_sequence(&self) -> &[u8] {
        &self.sequences.start
    }

    #[must_use]
    pub fn tail_sequence(&self) -> &[u8] {
        &self.sequences.tail
    }

    /// Idle sequence to be sent by the transmission layer between CLTUs. It is not
    /// part of [Cltu::to_bytes].
    #[must_use]
    pub fn idle_sequence(&self) -> &[u8] {
        &self.sequences.idle
    }

    #[must_use]
    pub fn order_id(&self) -> Option<u32> {
        self.order_id
    }

    /// Frames this CLTU was created from, if any.
    #[must_use]
    pub fn frames(&self) -> &[TcTransferFrame] {
        &self.frames
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sequences.acquisition.len()
            + self.sequences.start.len()
            + self.data.len()
            + self.sequences.tail.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Serialize as acquisition + start + data + tail.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.len());
        buf.extend_from_slice(&self.sequences.acquisition);
        buf.extend_from_slice(&self.sequences.start);
        buf.extend_from_slice(&self.data);
        buf.extend_from_slice(&self.sequences.tail);
        buf
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

/// Builds a [Cltu]. Sequences not explicitly set use [CltuSequences::global].
#[derive(Debug, Clone, Default)]
pub struct CltuBuilder {
    codeblocks: Option<Vec<BchCodeblock>>,
    data: Option<Vec<u8>>,
    acquisition: Option<Vec<u8>>,
    start: Option<Vec<u8>>,
    tail: Option<Vec<u8>>,
    idle: Option<Vec<u8>>,
    order_id: Option<u32>,
    frames: Option<Vec<TcTransferFrame>>,
}

impl CltuBuilder {
    #[must_use]
    pub fn codeblocks(mut self, codeblocks: Vec<BchCodeblock>) -> Self {
        self.codeblocks = Some(codeblocks);
        self
    }

    #[must_use]
    pub fn data(mut self, data: Vec<u8>) -> Self {
        self.data = Some(data);
        self
    }

    #[must_use]
    pub fn acquisition_sequence(mut self, seq: Vec<u8>) -> Self {
        self.acquisition = Some(seq);
        self
    }

    #[must_use]
    pub fn start_sequence(mut self, seq: Vec<u8>) -> Self {
        self.start = Some(seq);
        self
    }

    #[must_use]
    pub fn tail_sequence(mut self, seq: Vec<u8>) -> Self {
        self.tail = Some(seq);
        self
    }

    #[must_use]
    pub fn idle_sequence(mut self, seq: Vec<u8>) -> Self {
        self.idle = Some(seq);
        self
    }

    #[must_use]
    pub fn order_id(mut self, id: u32) -> Self {
        self.order_id = Some(id);
        self
    }

    #[must_use]
    pub fn frames(mut self, frames: Vec<TcTransferFrame>) -> Self {
        self.frames = Some(frames);
        self
    }

    /// # Errors
    /// [Error::InvalidState] listing every unmet precondition.
    pub fn build(self) -> Result<Cltu> {
        let mut problems = Vec::new();
        if self.data.is_none() {
            problems.push("data not set".to_string());
        }
        if self.codeblocks.is_none() {
            problems.push("codeblocks not set".to_string());
        }
        if !problems.is_empty() {
            return Err(Error::InvalidState(problems));
        }

        let defaults = CltuSequences::global();
        Ok(Cltu {
            codeblocks: self.codeblocks.unwrap_or_default(),
            data: self.data.unwrap_or_default(),
            sequences: CltuSequences {
                acquisition: self.acquisition.unwrap_or(defaults.acquisition),
                start: self.start.unwrap_or(defaults.start),
                tail: self.tail.unwrap_or(defaults.tail),
                idle: self.idle.unwrap_or(defaults.idle),
            },
            order_id: self.order_id,
            frames: self.frames.unwrap_or_default(),
        })
    }
}
