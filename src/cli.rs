use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "tapefile")]
#[command(about = "Label, write and read files on labelled tape images")]
#[command(version = "0.1.0")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Log as JSON lines
    #[arg(long, global = true)]
    pub json: bool,

    /// Specify configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Write a volume label, creating the tape image if needed
    Label {
        /// Tape image file
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Volume ID to write
        #[arg(value_name = "VID")]
        vid: String,

        /// Relabel a non-empty tape without checking its current label
        #[arg(short, long)]
        force: bool,

        /// Label expected on the non-empty tape (defaults to VID)
        #[arg(long, value_name = "LABEL")]
        old_label: Option<String>,

        /// Label without logical block protection
        #[arg(long)]
        no_lbp: bool,
    },

    /// Append a local file to the tape
    Write {
        /// Tape image file
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Volume ID of the tape
        #[arg(value_name = "VID")]
        vid: String,

        /// Local file to write
        #[arg(value_name = "SOURCE")]
        source: PathBuf,

        /// fSeq of the new file, one past the last file on tape
        #[arg(long)]
        fseq: u64,

        /// Archive file id (decimal or 0x-prefixed hex)
        #[arg(long, value_parser = parse_file_id)]
        file_id: u64,

        /// Payload block size in bytes (defaults to the configured size)
        #[arg(long)]
        block_size: Option<usize>,
    },

    /// Read a file back from the tape
    Read {
        /// Tape image file
        #[arg(value_name = "IMAGE")]
        image: PathBuf,

        /// Volume ID of the tape
        #[arg(value_name = "VID")]
        vid: String,

        /// fSeq of the file
        #[arg(long)]
        fseq: u64,

        /// Archive file id (decimal or 0x-prefixed hex)
        #[arg(long, value_parser = parse_file_id)]
        file_id: u64,

        /// Position by block id instead of counting file marks
        #[arg(long)]
        block_id: Option<u64>,

        /// Local destination (stdout when omitted)
        #[arg(value_name = "DESTINATION")]
        destination: Option<PathBuf>,
    },

    /// List the label blocks and files of a tape image
    Dump {
        /// Tape image file
        #[arg(value_name = "IMAGE")]
        image: PathBuf,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

fn parse_file_id(value: &str) -> Result<u64, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid file id \"{}\": {}", value, e))
}
