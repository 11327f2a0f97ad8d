use std::fs;
use std::io::{stdout, BufWriter, Write};
use std::path::Path;

use anyhow::{Context, Result};
use ccsds_tc::bch::BchConfig;
use ccsds_tc::frame::split_frames;
use ccsds_tc::pdu::PduParser;
use ccsds_tc::reverse::FrameReverser;
use tracing::info;

pub fn reverse(
    srcpath: &Path,
    dstpath: &Path,
    has_fecf: bool,
    quiet: bool,
    stop_byte: Option<&str>,
) -> Result<()> {
    let dat = fs::read(srcpath).context("reading input")?;
    let frames = split_frames(&dat).context("splitting frames")?;

    let mut parser = PduParser::new();
    if let Some(s) = stop_byte {
        // same 2 hex digit format as a code block fill byte
        parser = parser.with_stop_byte(BchConfig::parse_fill_byte(s).context("invalid stop byte")?);
    }
    let mut reverser = FrameReverser::new(BufWriter::new(stdout().lock()), has_fecf)
        .with_suppressed_output(quiet)
        .with_parser(parser);
    let pdus = reverser.do_reverse_frames(&frames)?;
    reverser.into_inner().flush().context("writing to stdout")?;

    fs::write(dstpath, pdus.concat()).context("writing pdus")?;
    info!(
        num_frames = frames.len(),
        num_pdus = pdus.len(),
        "wrote pdus to {dstpath:?}"
    );
    Ok(())
}
