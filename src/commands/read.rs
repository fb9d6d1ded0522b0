//! Read Command Handler
//!
//! Handles the `read` subcommand: copies one tape file to a local file or
//! to stdout.

use super::load_image;
use anyhow::Context;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::time::Instant;
use tapefile::config::TapeConfig;
use tapefile::drive::TapeDrive;
use tapefile::error::Result;
use tapefile::file::{BlockRead, FileReader};
use tapefile::job::{RetrieveJob, VolumeInfo};
use tapefile::session::{ReadSession, Session};
use tapefile::utils;
use tracing::{info, warn};

pub async fn execute(
    image: PathBuf,
    vid: String,
    fseq: u64,
    file_id: u64,
    block_id: Option<u64>,
    destination: Option<PathBuf>,
    config: &TapeConfig,
) -> Result<()> {
    info!(
        "Starting read operation: {} fSeq {} -> {:?}",
        vid, fseq, destination
    );

    let job = match block_id {
        Some(block_id) => RetrieveJob::by_block(file_id, fseq, block_id),
        None => RetrieveJob::by_fseq(file_id, fseq),
    };

    let mut drive = load_image(&image, config)?;
    let session = ReadSession::new(&mut drive, VolumeInfo::new(vid.as_str()), config.use_lbp)?;
    let mut reader = FileReader::open(&session, &job)?;
    info!(
        "Reading fSeq {} with block size {} ({})",
        fseq,
        reader.block_size(),
        session.lbp_mode()
    );

    let started = Instant::now();
    let total = match &destination {
        Some(path) => {
            let file =
                File::create(path).with_context(|| format!("Failed to create {:?}", path))?;
            let progress = ProgressBar::new_spinner();
            progress.set_style(
                ProgressStyle::with_template("{spinner:.green} {bytes} read {msg}")
                    .context("Invalid progress template")?,
            );
            let copied = copy_file(&mut reader, BufWriter::new(file), &progress);
            progress.finish_and_clear();
            if copied.is_err() {
                warn!("Removing partial output {:?}", path);
                if let Err(e) = fs::remove_file(path) {
                    warn!("Cannot remove {:?}: {}", path, e);
                }
            }
            copied?
        }
        None => copy_file(
            &mut reader,
            BufWriter::new(io::stdout().lock()),
            &ProgressBar::hidden(),
        )?,
    };

    if let Some(path) = destination {
        println!(
            "✅ Read {} from {} fSeq {} into {:?} ({})",
            utils::format_bytes(total),
            vid,
            fseq,
            path,
            utils::format_speed(total, started.elapsed().as_secs_f64())
        );
    }
    Ok(())
}

/// Copies the payload of `reader` into `output`; returns the byte count.
fn copy_file<D: TapeDrive, W: Write>(
    reader: &mut FileReader<'_, '_, D>,
    mut output: W,
    progress: &ProgressBar,
) -> Result<u64> {
    let mut total = 0u64;
    let mut buffer = vec![0u8; reader.block_size()];
    loop {
        match reader.read(&mut buffer)? {
            BlockRead::Data(n) => {
                output
                    .write_all(&buffer[..n])
                    .context("Failed to write output")?;
                total += n as u64;
                progress.inc(n as u64);
            }
            BlockRead::EndOfFile => break,
        }
    }
    output.flush().context("Failed to flush output")?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tapefile::drive::VirtualDrive;
    use tapefile::file::FileWriter;
    use tapefile::job::ArchiveJob;
    use tapefile::session::{LabelSession, SiteIdentity, WriteSession};
    use tempfile::TempDir;

    const BLOCK: usize = 64;

    fn image_with_file(dir: &TempDir) -> PathBuf {
        let mut drive = VirtualDrive::new();
        drive
            .enable_crc32c_logical_block_protection_read_write()
            .unwrap();
        LabelSession::label(&mut drive, "K00001", true).unwrap();
        {
            let session = WriteSession::new(
                &mut drive,
                VolumeInfo::new("K00001"),
                0,
                false,
                true,
                SiteIdentity::new("CERN", "TPSRV01"),
            )
            .unwrap();
            let job = ArchiveJob {
                archive_file_id: 0x77,
                fseq: 1,
                file_size: 2 * BLOCK as u64,
            };
            let mut writer = FileWriter::open(&session, &job, BLOCK).unwrap();
            writer.write(&[1u8; BLOCK]).unwrap();
            writer.write(&[2u8; BLOCK]).unwrap();
            writer.close().unwrap();
        }
        // VOL1 HDR1 HDR2 UHL1 FM, then the two payload blocks
        drive.corrupt_block(6).unwrap();
        let image = dir.path().join("tape.json");
        drive.save(&image).unwrap();
        image
    }

    #[tokio::test]
    async fn test_failed_read_leaves_no_output() {
        let dir = TempDir::new().unwrap();
        let image = image_with_file(&dir);
        let destination = dir.path().join("out.bin");

        let result = execute(
            image,
            "K00001".to_string(),
            1,
            0x77,
            None,
            Some(destination.clone()),
            &TapeConfig::default(),
        )
        .await;
        assert!(result.is_err());
        assert!(!destination.exists());
    }

    #[tokio::test]
    async fn test_failed_open_creates_no_output() {
        let dir = TempDir::new().unwrap();
        let image = image_with_file(&dir);
        let destination = dir.path().join("out.bin");

        let result = execute(
            image,
            "K00001".to_string(),
            1,
            0x78,
            None,
            Some(destination.clone()),
            &TapeConfig::default(),
        )
        .await;
        assert!(result.unwrap_err().is_format());
        assert!(!destination.exists());
    }
}
