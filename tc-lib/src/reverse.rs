//! Reverse processing of TC transfer frames back into the PDUs they carry.
use std::io::Write;

use tracing::{debug, error, span, Level};

use crate::frame::{TcFrameHeader, TcTransferFrame};
use crate::pdu::{PduParser, PduParserResult};
use crate::{Error, Result};

const HEXDUMP_WIDTH: usize = 16;

/// Write `dat` as offset-prefixed lines of upper-case hex.
///
/// # Errors
/// Any error writing to `out`.
pub fn write_hexdump<W: Write>(out: &mut W, dat: &[u8]) -> std::io::Result<()> {
    for (idx, chunk) in dat.chunks(HEXDUMP_WIDTH).enumerate() {
        let hex = chunk
            .iter()
            .map(|b| format!("{b:02X}"))
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(out, "{:06X}  {hex}", idx * HEXDUMP_WIDTH)?;
    }
    Ok(())
}

/// Decomposes TC transfer frames into PDUs, reporting each frame to a writer.
///
/// # Example
/// ```
/// use ccsds_tc::frame::{FecfAlgorithm, TcTransferFrame};
/// use ccsds_tc::pdu::{Pdu, PduHeader};
/// use ccsds_tc::reverse::FrameReverser;
///
/// let hdr = PduHeader::builder().source_entity(1).sequence_number(1).dest_entity(2).build();
/// let pdu = Pdu::new(hdr, &[0x04, 0x00]).unwrap();
/// let frames = TcTransferFrame::builder()
///     .scid(1)
///     .vcid(0)
///     .data(&pdu.data)
///     .build()
///     .unwrap();
///
/// let mut reverser = FrameReverser::new(std::io::sink(), true).with_suppressed_output(true);
/// let pdus = reverser.do_reverse_frames(&[frames[0].to_bytes()]).unwrap();
/// assert_eq!(pdus, vec![pdu.data]);
/// ```
pub struct FrameReverser<W: Write> {
    out: W,
    has_fecf: bool,
    suppress_output: bool,
    parser: PduParser,
}

impl<W: Write> FrameReverser<W> {
    pub fn new(out: W, has_fecf: bool) -> Self {
        FrameReverser {
            out,
            has_fecf,
            suppress_output: false,
            parser: PduParser::default(),
        }
    }

    /// Do not write frame header blocks. Error banners are always written.
    #[must_use]
    pub fn with_suppressed_output(mut self, suppress: bool) -> Self {
        self.suppress_output = suppress;
        self
    }

    #[must_use]
    pub fn with_parser(mut self, parser: PduParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Extract the PDU payloads from every frame in `frames`.
    ///
    /// Frames that cannot be decoded, or whose data field does not parse cleanly,
    /// are reported with an error banner. PDUs parsed before the error are kept
    /// and processing continues with the next frame.
    ///
    /// # Errors
    /// Only errors writing to the output.
    pub fn do_reverse_frames(&mut self, frames: &[Vec<u8>]) -> Result<Vec<Vec<u8>>> {
        let mut payloads = Vec::new();
        for (frame_idx, dat) in frames.iter().enumerate() {
            let span = span!(Level::DEBUG, "frame", frame_idx);
            let _guard = span.enter();

            if !self.suppress_output {
                self.write_header_block(frame_idx, dat)?;
            }
            let zult = self.get_pdus_from_frame(dat);
            debug!(num_pdus = zult.pdus.len(), "extracted pdus");
            payloads.extend(zult.pdus.into_iter().map(|p| p.data));
            if let Some(err) = zult.error {
                error!("failed to extract pdus from frame {frame_idx}: {err}");
                let data_field = self.data_field(dat);
                writeln!(self.out, "**** ERROR frame {frame_idx}: {err}")?;
                write_hexdump(&mut self.out, data_field)?;
                writeln!(self.out, "****")?;
            }
        }
        Ok(payloads)
    }

    /// Strip the frame header and any FECF and parse the remaining data field into
    /// PDUs.
    ///
    /// The result carries the PDUs parsed before any error alongside the error:
    /// [Error::FrameWrapUnwrap] if the frame is too short, otherwise the error
    /// captured by the PDU parser.
    pub fn get_pdus_from_frame(&self, frame: &[u8]) -> PduParserResult {
        let fecf_len = if self.has_fecf { 2 } else { 0 };
        if frame.len() < TcFrameHeader::LEN + fecf_len {
            return PduParserResult {
                pdus: Vec::new(),
                error: Some(Error::FrameWrapUnwrap(format!(
                    "frame len={} too short for header and {fecf_len} FECF bytes",
                    frame.len()
                ))),
            };
        }
        self.parser.parse(self.data_field(frame))
    }

    fn data_field<'a>(&self, frame: &'a [u8]) -> &'a [u8] {
        let fecf_len = if self.has_fecf { 2 } else { 0 };
        let end = frame.len().saturating_sub(fecf_len);
        &frame[TcFrameHeader::LEN.min(end)..end]
    }

    fn write_header_block(&mut self, frame_idx: usize, dat: &[u8]) -> Result<()> {
        writeln!(self.out, "---- frame {frame_idx} ({} bytes)", dat.len())?;
        match TcTransferFrame::decode(dat, self.has_fecf) {
            Ok(frame) => {
                let hdr = &frame.header;
                writeln!(self.out, "  version          {}", hdr.version)?;
                writeln!(self.out, "  bypass           {}", hdr.bypass)?;
                writeln!(self.out, "  control command  {}", hdr.control_command)?;
                writeln!(self.out, "  scid             {}", hdr.scid)?;
                writeln!(
                    self.out,
                    "  vcid             {} (es={}, vc={})",
                    hdr.vcid,
                    hdr.execution_string(),
                    hdr.vc_number()
                )?;
                writeln!(self.out, "  length           {}", hdr.frame_len())?;
                writeln!(self.out, "  sequence         {}", hdr.sequence)?;
                if let Some(fecf) = frame.fecf {
                    writeln!(
                        self.out,
                        "  fecf             0x{fecf:04X} ({})",
                        if frame.fecf_valid() { "ok" } else { "BAD" }
                    )?;
                }
            }
            Err(err) => writeln!(self.out, "  undecodable header: {err}")?,
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FecfAlgorithm;
    use crate::pdu::{Pdu, PduHeader};

    fn pdu(seq: u64, body: &[u8]) -> Pdu {
        let hdr = PduHeader::builder()
            .source_entity(1)
            .sequence_number(seq)
            .dest_entity(5)
            .build();
        Pdu::new(hdr, body).unwrap()
    }

    fn frame(data: &[u8], fecf: FecfAlgorithm) -> Vec<u8> {
        TcTransferFrame::builder()
            .scid(7)
            .vcid(2)
            .data(data)
            .fecf(fecf)
            .build()
            .unwrap()[0]
            .to_bytes()
    }

    #[test]
    fn reverse_multi_pdu_frame() {
        let a = pdu(1, &[0x04, 0x01]);
        let b = pdu(2, &[0x05, 0x02, 0x03]);
        let mut dat = a.data.clone();
        dat.extend_from_slice(&b.data);

        let mut reverser = FrameReverser::new(Vec::new(), true);
        let zult = reverser
            .do_reverse_frames(&[frame(&dat, FecfAlgorithm::Crc16)])
            .unwrap();
        assert_eq!(zult, vec![a.data, b.data]);

        let out = String::from_utf8(reverser.into_inner()).unwrap();
        let scid_line = out.lines().find(|l| l.trim_start().starts_with("scid")).unwrap();
        assert!(scid_line.ends_with(" 7"), "{out}");
        assert!(out.contains("(ok)"), "{out}");
        assert!(!out.contains("ERROR"), "{out}");
    }

    #[test]
    fn reverse_continues_past_bad_frame() {
        let a = pdu(1, &[0x04, 0x01]);
        let b = pdu(2, &[0x05]);
        let frames = vec![
            frame(&a.data, FecfAlgorithm::None),
            frame(&[0x20, 0x00, 0x40, 0x00, 0x01], FecfAlgorithm::None),
            frame(&b.data, FecfAlgorithm::None),
        ];

        let mut reverser = FrameReverser::new(Vec::new(), false).with_suppressed_output(true);
        let zult = reverser.do_reverse_frames(&frames).unwrap();
        assert_eq!(zult, vec![a.data, b.data]);

        let out = String::from_utf8(reverser.into_inner()).unwrap();
        assert!(out.contains("**** ERROR frame 1"), "{out}");
        assert!(out.contains("000000  20 00 40 00 01"), "{out}");
        assert!(!out.contains("---- frame"), "header blocks are suppressed");
    }

    #[test]
    fn frame_with_partial_pdus_keeps_good_pdus() {
        let a = pdu(1, &[0x04, 0x01]);
        let mut dat = a.data.clone();
        dat.extend_from_slice(&[0x20, 0x00]);
        let dat = frame(&dat, FecfAlgorithm::Crc16);

        let reverser = FrameReverser::new(std::io::sink(), true);
        let zult = reverser.get_pdus_from_frame(&dat);
        assert_eq!(zult.payloads(), vec![a.data.clone()]);
        assert!(matches!(zult.error, Some(Error::ParseFailure { .. })), "{zult:?}");

        let mut reverser = FrameReverser::new(Vec::new(), true).with_suppressed_output(true);
        assert_eq!(reverser.do_reverse_frames(&[dat]).unwrap(), vec![a.data]);
        let out = String::from_utf8(reverser.into_inner()).unwrap();
        assert!(out.contains("**** ERROR frame 0"), "{out}");
    }

    #[test]
    fn short_frame() {
        let reverser = FrameReverser::new(std::io::sink(), true);
        let zult = reverser.get_pdus_from_frame(&[0, 1, 2, 3, 4, 5]);
        assert!(zult.pdus.is_empty());
        assert!(matches!(zult.error, Some(Error::FrameWrapUnwrap(_))));
    }

    #[test]
    fn hexdump_lines() {
        let mut out = Vec::new();
        write_hexdump(&mut out, &(0u8..18).collect::<Vec<_>>()).unwrap();
        let out = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1], "000010  10 11");
    }
}
