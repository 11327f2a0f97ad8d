mod aggregate;
mod encode;
mod info;
mod reverse;

use std::io::stderr;
use std::path::{Path, PathBuf};

use anyhow::{bail, Result};
use ccsds_tc::frame::{Scid, Vcid};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Wrap the contents of a file in TC transfer frames.
    ///
    /// Data larger than will fit in a single frame is split across multiple frames
    /// with successive sequence numbers.
    Frame {
        /// Spacecraft identifier
        #[arg(short, long)]
        scid: Scid,

        /// Virtual channel identifier. Mutually exclusive with --es/--vc.
        #[arg(short, long, conflicts_with_all = ["es", "vc"])]
        vcid: Option<Vcid>,

        /// Execution string, used with --vc to compose the virtual channel id.
        #[arg(long, requires = "vc")]
        es: Option<u8>,

        /// Virtual channel number, used with --es to compose the virtual channel id.
        #[arg(long, requires = "es")]
        vc: Option<u8>,

        /// Frame sequence number of the first frame.
        #[arg(long, default_value_t = 0)]
        sequence: u8,

        /// Set the bypass flag.
        #[arg(long, action)]
        bypass: bool,

        /// Set the control command flag.
        #[arg(long, action)]
        control_command: bool,

        /// Do not append a FECF.
        #[arg(long, action)]
        no_fecf: bool,

        /// Maximum frame length; data is split into as many frames as needed.
        #[arg(long, default_value_t = 1024)]
        max_frame_length: usize,

        /// Delete output file if it already exists
        #[arg(long, action)]
        clobber: bool,

        /// Output file path.
        #[arg(short, long, default_value = "frames.dat", value_name = "path")]
        output: PathBuf,

        /// File containing the frame data.
        input: PathBuf,
    },
    /// Encode a file of TC transfer frames into a single CLTU.
    Cltu {
        /// Input frames do not have a FECF.
        #[arg(long, action)]
        no_fecf: bool,

        /// Code block fill byte as 2 hex digits.
        #[arg(long, default_value = "55")]
        fill_byte: String,

        /// Delete output file if it already exists
        #[arg(long, action)]
        clobber: bool,

        /// Output file path.
        #[arg(short, long, default_value = "cltu.dat", value_name = "path")]
        output: PathBuf,

        /// Input frames file.
        input: PathBuf,
    },
    /// Decode a CLTU back into the TC transfer frames it contains.
    Uncltu {
        /// Start sequence as hex
        #[arg(long, default_value = "EB90")]
        start: String,

        /// Tail sequence as hex
        #[arg(long, default_value = "C5C5C5C5C5C5C579")]
        tail: String,

        /// Delete output file if it already exists
        #[arg(long, action)]
        clobber: bool,

        /// Output file path.
        #[arg(short, long, default_value = "frames.dat", value_name = "path")]
        output: PathBuf,

        /// Input CLTU file.
        input: PathBuf,
    },
    /// Extract the CFDP PDUs contained in a file of TC transfer frames.
    ///
    /// A header block is written to stdout for each frame along with an error banner
    /// for any frame whose PDUs could not be extracted.
    Reverse {
        /// Input frames do not have a FECF.
        #[arg(long, action)]
        no_fecf: bool,

        /// Do not write frame header blocks.
        #[arg(short, long, action)]
        quiet: bool,

        /// Stop extracting PDUs from a frame at this byte, given as 2 hex digits.
        #[arg(long)]
        stop_byte: Option<String>,

        /// Delete output file if it already exists
        #[arg(long, action)]
        clobber: bool,

        /// Output file path for the extracted PDUs.
        #[arg(short, long, default_value = "pdus.dat", value_name = "path")]
        output: PathBuf,

        /// Input frames file.
        input: PathBuf,
    },
    /// Show information about a file of TC transfer frames.
    Info {
        /// Input frames do not have a FECF.
        #[arg(long, action)]
        no_fecf: bool,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: info::Format,

        /// Input frames file.
        input: PathBuf,
    },
    /// Aggregate a file of CFDP PDUs into per-destination-entity output files.
    ///
    /// PDUs are batched per destination entity according to the aggregator
    /// configuration and each aggregate payload is appended to
    /// <outdir>/entity-<id>.dat.
    Aggregate {
        /// Aggregator configuration JSON file. Defaults are used if not provided.
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Virtual channel the PDUs are received on.
        #[arg(short, long, default_value_t = 0)]
        vcid: Vcid,

        /// Output directory.
        #[arg(short, long, default_value = ".", value_name = "path")]
        outdir: PathBuf,

        /// Input PDU file.
        input: PathBuf,
    },
}

fn check_clobber(path: &Path, clobber: bool) -> Result<()> {
    if !clobber && path.exists() {
        bail!("{path:?} exists; use --clobber");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(stderr)
        .with_ansi(false)
        .without_time()
        .with_env_filter(
            EnvFilter::try_from_env("TCTOOL_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    debug!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    match &cli.command {
        Commands::Frame {
            scid,
            vcid,
            es,
            vc,
            sequence,
            bypass,
            control_command,
            no_fecf,
            max_frame_length,
            clobber,
            output,
            input,
        } => {
            check_clobber(output, *clobber)?;
            let vcid = match (vcid, es, vc) {
                (Some(vcid), _, _) => *vcid,
                (None, Some(es), Some(vc)) => ccsds_tc::frame::compose_vcid(*es, *vc),
                _ => bail!("one of --vcid or --es/--vc is required"),
            };
            let opts = encode::FrameOpts {
                scid: *scid,
                vcid,
                sequence: *sequence,
                bypass: *bypass,
                control_command: *control_command,
                fecf: !no_fecf,
                max_frame_length: *max_frame_length,
            };
            encode::frame(input, output, &opts)
        }
        Commands::Cltu {
            no_fecf,
            fill_byte,
            clobber,
            output,
            input,
        } => {
            check_clobber(output, *clobber)?;
            encode::cltu(input, output, !no_fecf, fill_byte)
        }
        Commands::Uncltu {
            start,
            tail,
            clobber,
            output,
            input,
        } => {
            check_clobber(output, *clobber)?;
            encode::uncltu(input, output, start, tail)
        }
        Commands::Reverse {
            no_fecf,
            quiet,
            stop_byte,
            clobber,
            output,
            input,
        } => {
            check_clobber(output, *clobber)?;
            reverse::reverse(input, output, !no_fecf, *quiet, stop_byte.as_deref())
        }
        Commands::Info {
            no_fecf,
            format,
            input,
        } => info::info(input, !no_fecf, format),
        Commands::Aggregate {
            config,
            vcid,
            outdir,
            input,
        } => aggregate::aggregate(input, config.as_deref(), *vcid, outdir),
    }
}
