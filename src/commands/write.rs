//! Write Command Handler
//!
//! Handles the `write` subcommand: appends one local file to the tape image.

use super::load_image;
use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;
use std::time::Instant;
use tapefile::config::TapeConfig;
use tapefile::error::{Result, TapeFileError};
use tapefile::file::FileWriter;
use tapefile::job::{ArchiveJob, VolumeInfo};
use tapefile::session::{Session, WriteSession};
use tapefile::utils;
use tracing::info;

pub async fn execute(
    image: PathBuf,
    vid: String,
    source: PathBuf,
    fseq: u64,
    file_id: u64,
    block_size: Option<usize>,
    config: &TapeConfig,
) -> Result<()> {
    let block_size = block_size.unwrap_or(config.block_size);
    info!(
        "Starting write operation: {:?} -> {} fSeq {}",
        source, vid, fseq
    );
    if fseq == 0 {
        return Err(TapeFileError::invalid_argument("fSeq must be at least 1"));
    }

    let file = File::open(&source).with_context(|| format!("Failed to open {:?}", source))?;
    let file_size = file
        .metadata()
        .with_context(|| format!("Failed to stat {:?}", source))?
        .len();
    let mut input = BufReader::new(file);

    let mut drive = load_image(&image, config)?;
    let identity = config.site_identity();
    let started = Instant::now();

    let (block_id, blocks) = {
        let session = WriteSession::new(
            &mut drive,
            VolumeInfo::new(vid.as_str()),
            fseq - 1,
            config.compression,
            config.use_lbp,
            identity,
        )?;
        let job = ArchiveJob {
            archive_file_id: file_id,
            fseq,
            file_size,
        };
        let mut writer = FileWriter::open(&session, &job, block_size)?;
        println!(
            "📼 Writing {:?} to {} fSeq {} ({})",
            source,
            vid,
            fseq,
            session.lbp_mode()
        );

        let progress = ProgressBar::new(file_size);
        progress.set_style(
            ProgressStyle::with_template(
                "[eta {eta}] {bar:40.cyan/blue} {bytes:>9}/{total_bytes:9} {msg}",
            )
            .context("Invalid progress template")?
            .progress_chars("##-"),
        );

        let mut buffer = vec![0u8; block_size];
        loop {
            let n = read_full(&mut input, &mut buffer)
                .with_context(|| format!("Failed to read {:?}", source))?;
            if n == 0 {
                break;
            }
            writer.write(&buffer[..n])?;
            progress.inc(n as u64);
        }
        writer.close()?;
        progress.finish_and_clear();
        (writer.block_id(), writer.blocks_written())
    };

    drive.save(&image)?;
    let elapsed = started.elapsed().as_secs_f64();
    println!("✅ Write Operation Completed");
    println!("  fSeq: {}", fseq);
    println!("  Block id: {}", block_id);
    println!("  Blocks: {} of {}", blocks, utils::format_bytes(block_size as u64));
    println!(
        "  Size: {} ({})",
        utils::format_bytes(file_size),
        utils::format_speed(file_size, elapsed)
    );
    Ok(())
}

/// Fills `buffer` unless the input ends first; returns the bytes read.
fn read_full<R: Read>(input: &mut R, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match input.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
