use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use ccsds_tc::bch::BchConfig;
use ccsds_tc::cltu::{Cltu, CltuSequences};
use ccsds_tc::frame::{decode_frames, FecfAlgorithm, Scid, TcFrameHeader, TcTransferFrame, Vcid};
use tracing::{debug, info};

pub struct FrameOpts {
    pub scid: Scid,
    pub vcid: Vcid,
    pub sequence: u8,
    pub bypass: bool,
    pub control_command: bool,
    pub fecf: bool,
    pub max_frame_length: usize,
}

pub fn frame(srcpath: &Path, dstpath: &Path, opts: &FrameOpts) -> Result<()> {
    let data = fs::read(srcpath).context("reading input")?;
    let frames = TcTransferFrame::builder()
        .scid(opts.scid)
        .vcid(opts.vcid)
        .sequence(opts.sequence)
        .bypass(opts.bypass)
        .control_command(opts.control_command)
        .fecf(if opts.fecf {
            FecfAlgorithm::Crc16
        } else {
            FecfAlgorithm::None
        })
        .max_frame_length(opts.max_frame_length)
        .data(&data)
        .build()
        .context("building frames")?;

    let mut dst = File::create(dstpath).context("creating dest")?;
    for frame in &frames {
        debug!("{}", frame.header);
        dst.write_all(&frame.to_bytes())?;
    }
    info!(num_frames = frames.len(), "wrote frames to {dstpath:?}");
    Ok(())
}

pub fn cltu(srcpath: &Path, dstpath: &Path, has_fecf: bool, fill_byte: &str) -> Result<()> {
    let config = BchConfig::builder()
        .fill_byte(BchConfig::parse_fill_byte(fill_byte)?)
        .build();
    let dat = fs::read(srcpath).context("reading input")?;
    let frames = decode_frames(&dat, has_fecf).context("decoding frames")?;
    let num_frames = frames.len();
    let cltu = Cltu::from_frames(frames, config).context("encoding cltu")?;

    fs::write(dstpath, cltu.to_bytes()).context("writing cltu")?;
    info!(
        num_frames,
        num_codeblocks = cltu.codeblocks().len(),
        "wrote cltu to {dstpath:?}"
    );
    Ok(())
}

/// Frames at the start of `dat`, stopping at the first header describing a frame
/// longer than the bytes remaining, i.e., code block fill.
fn leading_frames(dat: &[u8]) -> &[u8] {
    let mut offset = 0;
    while let Some(header) = TcFrameHeader::decode(&dat[offset..]) {
        if offset + header.frame_len() > dat.len() {
            break;
        }
        offset += header.frame_len();
    }
    &dat[..offset]
}

pub fn uncltu(srcpath: &Path, dstpath: &Path, start: &str, tail: &str) -> Result<()> {
    let sequences = CltuSequences {
        start: CltuSequences::parse_hex(start)?,
        tail: CltuSequences::parse_hex(tail)?,
        ..CltuSequences::global()
    };
    let dat = fs::read(srcpath).context("reading input")?;
    let cltu = Cltu::parse(&dat, &sequences, &BchConfig::default()).context("parsing cltu")?;
    let frame_bytes = cltu.frame_bytes();
    let frames = leading_frames(&frame_bytes);

    fs::write(dstpath, frames).context("writing frames")?;
    info!(
        num_codeblocks = cltu.codeblocks().len(),
        len = frames.len(),
        "wrote frame bytes to {dstpath:?}"
    );
    Ok(())
}
