use std::fs;
use std::io::{stdout, Write};
use std::path::Path;

use anyhow::{Context, Result};
use ccsds_tc::frame::{decode_frames, FrameSummary};
use ccsds_tc::pdu::PduParser;
use handlebars::handlebars_helper;
use serde::Serialize;

#[derive(Debug, Clone)]
pub enum Format {
    Json,
    Text,
}

impl clap::ValueEnum for Format {
    fn value_variants<'a>() -> &'a [Self] {
        &[Self::Json, Self::Text]
    }

    fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
        match self {
            Self::Json => Some(clap::builder::PossibleValue::new("json")),
            Self::Text => Some(clap::builder::PossibleValue::new("text")),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
struct FrameInfo {
    #[serde(flatten)]
    summary: FrameSummary,
    num_pdus: usize,
    pdu_error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct Info {
    filename: String,
    total_frames: usize,
    bad_fecf: usize,
    frames: Vec<FrameInfo>,
}

fn summarize(fpath: &Path, has_fecf: bool) -> Result<Info> {
    let dat = fs::read(fpath).context("reading input")?;
    let frames = decode_frames(&dat, has_fecf).context("decoding frames")?;
    let parser = PduParser::new();

    let frames: Vec<FrameInfo> = frames
        .iter()
        .map(|frame| {
            let zult = parser.parse(&frame.data);
            FrameInfo {
                summary: FrameSummary::from(frame),
                num_pdus: zult.pdus.len(),
                pdu_error: zult.error.map(|e| e.to_string()),
            }
        })
        .collect();

    Ok(Info {
        filename: fpath.to_string_lossy().to_string(),
        total_frames: frames.len(),
        bad_fecf: frames.iter().filter(|f| !f.summary.fecf_valid).count(),
        frames,
    })
}

pub fn info(fpath: &Path, has_fecf: bool, format: &Format) -> Result<()> {
    let info = summarize(fpath, has_fecf)?;

    match format {
        Format::Json => {
            serde_json::to_writer_pretty(stdout(), &info).context("serializing to json")
        }
        Format::Text => {
            let data = render_text(&info).context("serializing info")?;
            stdout()
                .write_all(str::as_bytes(&data))
                .context("writing to stdout")
        }
    }
}

fn render_text(info: &Info) -> Result<String> {
    handlebars_helper!(left_pad: |num: u64, v: Json| {
        let v = match v {
            serde_json::Value::String(s) => s.to_owned(),
            serde_json::Value::Null => String::new(),
            _ => v.to_string()
        };
        let width = usize::try_from(num).unwrap_or(0).max(v.len());
        format!("{v:>width$}")
    });
    let mut hb = handlebars::Handlebars::new();
    hb.register_escape_fn(handlebars::no_escape);
    hb.register_helper("lpad", Box::new(left_pad));
    hb.register_template_string("info", TEXT_TEMPLATE)
        .context("registering template")?;

    hb.render("info", &info).context("rendering text")
}

const TEXT_TEMPLATE: &str = r"{{ filename }}
===============================================================================
Frames:    {{ total_frames }}
Bad FECF:  {{ bad_fecf }}
-------------------------------------------------------------------------------
 SCID  VCID  ES  VC   Seq   Len  FECF        PDUs  Error
-------------------------------------------------------------------------------
{{ #each frames }}{{ lpad 5 header.scid }}  {{ lpad 4 header.vcid }}  {{ lpad 2 execution_string }}  {{ lpad 2 vc_number }}  {{ lpad 4 header.sequence }}  {{ lpad 4 data_len }}  {{ #if fecf_valid }}ok  {{ else }}BAD {{ /if }}  {{ lpad 10 num_pdus }}  {{ pdu_error }}
{{/each }}
";

#[cfg(test)]
mod tests {
    use super::*;
    use ccsds_tc::frame::TcTransferFrame;

    #[test]
    fn render_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frames.dat");
        let mut dat = Vec::new();
        for seq in 0..2 {
            let frames = TcTransferFrame::builder()
                .scid(77)
                .execution_string(2, 1)
                .sequence(seq)
                .data(&[0xff; 4])
                .build()
                .unwrap();
            dat.extend(frames[0].to_bytes());
        }
        fs::write(&path, &dat).unwrap();

        let info = summarize(&path, true).unwrap();
        assert_eq!(info.total_frames, 2);
        assert_eq!(info.bad_fecf, 0);
        assert!(info.frames[0].pdu_error.is_some(), "0xff is not a valid pdu");

        let text = render_text(&info).unwrap();
        assert!(text.contains("Frames:    2"), "{text}");
        assert!(text.contains("   77    17"), "{text}");

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["frames"][1]["header"]["sequence"], 1);
        assert_eq!(json["frames"][1]["vc_number"], 1);
    }
}
