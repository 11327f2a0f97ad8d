use tracing::{debug, trace};

use super::{FecfAlgorithm, Scid, TcFrameHeader, TcTransferFrame, Vcid};

/// Inputs to [wrap].
#[derive(Debug, Clone)]
pub struct WrapParams {
    pub version: u8,
    pub bypass: bool,
    pub control_command: bool,
    pub spare: u8,
    pub scid: Scid,
    pub vcid: Vcid,
    pub data: Vec<u8>,
    pub fecf: FecfAlgorithm,
    /// Explicit FECF length in bytes. Only 2 is supported when a FECF is in use.
    pub fecf_length: Option<usize>,
    /// Explicit FECF value used instead of the computed one.
    pub fecf_value: Option<u16>,
    /// Explicit total frame length written to the header instead of the actual length.
    pub frame_length: Option<u16>,
    /// Maximum total frame length; larger payloads are split over several frames.
    pub max_frame_length: usize,
}

impl Default for WrapParams {
    fn default() -> Self {
        WrapParams {
            version: 0,
            bypass: false,
            control_command: false,
            spare: 0,
            scid: 0,
            vcid: 0,
            data: Vec::new(),
            fecf: FecfAlgorithm::default(),
            fecf_length: None,
            fecf_value: None,
            frame_length: None,
            max_frame_length: TcFrameHeader::MAX_FRAME_LEN,
        }
    }
}

/// A frame produced by [wrap] along with any errors encountered producing it.
#[derive(Debug, Clone)]
pub struct WrappedFrame {
    pub frame: TcTransferFrame,
    pub error_count: usize,
    pub error_message: String,
}

impl WrappedFrame {
    #[must_use]
    pub fn bytes(&self) -> Vec<u8> {
        self.frame.to_bytes()
    }

    #[must_use]
    pub fn is_ok(&self) -> bool {
        self.error_count == 0
    }
}

pub(super) fn validate(params: &WrapParams) -> Vec<String> {
    let mut errors = Vec::new();
    if params.version > 0x3 {
        errors.push(format!("version {} exceeds 2 bits", params.version));
    }
    if params.spare > 0x3 {
        errors.push(format!("spare {} exceeds 2 bits", params.spare));
    }
    if params.scid > TcFrameHeader::SCID_MAX {
        errors.push(format!(
            "scid {} not in [0, {}]",
            params.scid,
            TcFrameHeader::SCID_MAX
        ));
    }
    if params.vcid > TcFrameHeader::VCID_MAX {
        errors.push(format!(
            "vcid {} not in [0, {}]",
            params.vcid,
            TcFrameHeader::VCID_MAX
        ));
    }
    if params.data.is_empty() {
        errors.push("frame data field is empty".to_string());
    }
    match params.fecf_length {
        Some(len) if params.fecf.is_none() && len != 0 => {
            errors.push(format!("fecf length {len} given without a FECF algorithm"));
        }
        Some(len) if !params.fecf.is_none() && len != params.fecf.len() => {
            errors.push(format!(
                "unsupported fecf length {len}; {:?} produces {} bytes",
                params.fecf,
                params.fecf.len()
            ));
        }
        _ => {}
    }
    if params.fecf_value.is_some() && params.fecf.is_none() {
        errors.push("fecf value given without a FECF algorithm".to_string());
    }
    if let Some(len) = params.frame_length {
        if len == 0 || len as usize > TcFrameHeader::MAX_FRAME_LEN {
            errors.push(format!(
                "frame length override {len} not in [1, {}]",
                TcFrameHeader::MAX_FRAME_LEN
            ));
        }
    }
    if params.max_frame_length <= TcFrameHeader::LEN + params.fecf.len()
        || params.max_frame_length > TcFrameHeader::MAX_FRAME_LEN
    {
        errors.push(format!(
            "max frame length {} cannot hold any data",
            params.max_frame_length
        ));
    }
    errors
}

/// Serialize `params` into one or more TC transfer frames.
///
/// Data that does not fit in a single frame of `max_frame_length` bytes is split
/// across consecutive frames, each drawing its sequence number from `next_sequence`.
/// Problems with the parameters do not stop frame production; instead every
/// frame reports them through its error count and message.
pub fn wrap<F>(params: &WrapParams, mut next_sequence: F) -> Vec<WrappedFrame>
where
    F: FnMut() -> u8,
{
    let errors = validate(params);
    let error_message = errors.join("; ");
    let fecf_len = params.fecf.len();
    let max_data = params
        .max_frame_length
        .saturating_sub(TcFrameHeader::LEN + fecf_len)
        .max(1);

    let chunks: Vec<&[u8]> = if params.data.is_empty() {
        vec![&params.data[..]]
    } else {
        params.data.chunks(max_data).collect()
    };
    if chunks.len() > 1 {
        debug!(
            scid = params.scid,
            vcid = params.vcid,
            data_len = params.data.len(),
            num_frames = chunks.len(),
            "splitting oversized frame data"
        );
    }

    chunks
        .into_iter()
        .map(|chunk| {
            let actual_len = TcFrameHeader::LEN + chunk.len() + fecf_len;
            let len = params.frame_length.map_or(actual_len, usize::from);
            let header = TcFrameHeader {
                version: params.version,
                bypass: params.bypass,
                control_command: params.control_command,
                spare: params.spare,
                scid: params.scid,
                vcid: params.vcid,
                len_minus1: len.saturating_sub(1) as u16,
                sequence: next_sequence(),
            };
            let mut frame = TcTransferFrame {
                header,
                data: chunk.to_vec(),
                fecf: None,
            };
            if !params.fecf.is_none() {
                frame.fecf = params
                    .fecf_value
                    .or_else(|| params.fecf.compute(&frame.to_bytes()));
            }
            trace!(header = %frame.header, fecf = ?frame.fecf, "wrapped frame");
            WrappedFrame {
                frame,
                error_count: errors.len(),
                error_message: error_message.clone(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::crc16;

    fn counter() -> impl FnMut() -> u8 {
        let mut seq = 0u8;
        move || {
            let cur = seq;
            seq = seq.wrapping_add(1);
            cur
        }
    }

    #[test]
    fn wrap_single() {
        let params = WrapParams {
            scid: 0x1ab,
            vcid: 5,
            data: vec![1, 2, 3, 4],
            ..Default::default()
        };
        let frames = wrap(&params, counter());

        assert_eq!(frames.len(), 1);
        let wrapped = &frames[0];
        assert!(wrapped.is_ok(), "{}", wrapped.error_message);

        let bytes = wrapped.bytes();
        assert_eq!(bytes.len(), 5 + 4 + 2);
        assert_eq!(bytes[3], 10, "length field must be len-1");
        assert_eq!(crc16(&bytes), 0, "crc over frame and fecf must be zero residue");
    }

    #[test]
    fn wrap_splits_oversized_data() {
        let params = WrapParams {
            scid: 1,
            vcid: 1,
            data: vec![0xaa; 25],
            max_frame_length: 17,
            ..Default::default()
        };
        let frames = wrap(&params, counter());

        // 17 - 5 header - 2 fecf = 10 bytes of data per frame
        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].frame.data.len(), 10);
        assert_eq!(frames[2].frame.data.len(), 5);
        for (idx, wrapped) in frames.iter().enumerate() {
            assert!(wrapped.is_ok());
            assert_eq!(wrapped.frame.header.sequence as usize, idx);
            assert!(wrapped.frame.fecf_valid());
        }
    }

    #[test]
    fn wrap_reports_errors() {
        let params = WrapParams {
            scid: 2000,
            vcid: 64,
            data: vec![1],
            ..Default::default()
        };
        let frames = wrap(&params, counter());
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].error_count, 2, "{}", frames[0].error_message);
        assert!(frames[0].error_message.contains("scid"));
        assert!(frames[0].error_message.contains("vcid"));
    }

    #[test]
    fn wrap_empty_data_is_error() {
        let frames = wrap(&WrapParams::default(), counter());
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].error_count, 1);
    }

    #[test]
    fn wrap_overrides() {
        let params = WrapParams {
            data: vec![1, 2],
            fecf_value: Some(0xdead),
            frame_length: Some(100),
            ..Default::default()
        };
        let frames = wrap(&params, counter());
        let frame = &frames[0].frame;
        assert!(frames[0].is_ok(), "{}", frames[0].error_message);
        assert_eq!(frame.fecf, Some(0xdead));
        assert!(!frame.fecf_valid());
        assert_eq!(frame.header.frame_len(), 100);
    }

    #[test]
    fn wrap_fecf_length_mismatch() {
        let params = WrapParams {
            data: vec![1],
            fecf_length: Some(4),
            ..Default::default()
        };
        let frames = wrap(&params, counter());
        assert_eq!(frames[0].error_count, 1);
    }
}
