//! Dump Command Handler
//!
//! Handles the `dump` subcommand: walks a tape image from the beginning and
//! prints every label block plus a summary of each data section.

use super::load_image;
use std::path::PathBuf;
use tapefile::config::TapeConfig;
use tapefile::drive::TapeDrive;
use tapefile::error::{Result, TapeFileError};
use tapefile::label::LABEL_BLOCK_SIZE;
use tapefile::utils;
use tracing::info;

/// One object seen while walking the tape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DumpEntry {
    /// An 80-byte block, rendered printable
    Label { block_id: u64, text: String },
    /// A run of data blocks between two file marks
    Data { first_block_id: u64, blocks: u64, bytes: u64 },
    FileMark { block_id: u64 },
}

pub async fn execute(image: PathBuf, config: &TapeConfig) -> Result<()> {
    let mut drive = load_image(&image, config)?;
    let buffer_size = drive.largest_block().max(LABEL_BLOCK_SIZE);
    info!("Dumping {:?} ({} objects)", image, drive.object_count());

    let entries = walk_tape(&mut drive, buffer_size)?;
    let mut file_marks = 0u64;
    for entry in &entries {
        match entry {
            DumpEntry::Label { block_id, text } => println!("{:>8}  {}", block_id, text),
            DumpEntry::Data {
                first_block_id,
                blocks,
                bytes,
            } => println!(
                "{:>8}  <{} data blocks, {}>",
                first_block_id,
                blocks,
                utils::format_bytes(*bytes)
            ),
            DumpEntry::FileMark { block_id } => {
                file_marks += 1;
                println!("{:>8}  --- file mark {} ---", block_id, file_marks);
            }
        }
    }
    println!("📊 {} objects, {} file marks", drive.object_count(), file_marks);
    Ok(())
}

/// Reads the whole tape with protection disabled, grouping consecutive
/// data blocks.
///
/// Sections are told apart by the file marks seen so far: payloads sit
/// after the first mark of each file (counts 1, 4, 7, ...), labels
/// everywhere else.
pub fn walk_tape<D: TapeDrive>(drive: &mut D, buffer_size: usize) -> Result<Vec<DumpEntry>> {
    drive.disable_logical_block_protection()?;
    drive.rewind()?;

    let mut entries = Vec::new();
    let mut buffer = vec![0u8; buffer_size];
    let mut file_marks = 0u64;
    loop {
        let block_id = drive.position()?.block_number;
        let n = match drive.read_block(&mut buffer) {
            Ok(n) => n,
            Err(TapeFileError::EndOfData(_)) => break,
            Err(e) => return Err(e),
        };
        let in_payload = file_marks % 3 == 1;
        if n == 0 {
            file_marks += 1;
            entries.push(DumpEntry::FileMark { block_id });
        } else if n == LABEL_BLOCK_SIZE && !in_payload {
            entries.push(DumpEntry::Label {
                block_id,
                text: utils::printable_block(&buffer[..n]),
            });
        } else if let Some(DumpEntry::Data { blocks, bytes, .. }) = entries.last_mut() {
            *blocks += 1;
            *bytes += n as u64;
        } else {
            entries.push(DumpEntry::Data {
                first_block_id: block_id,
                blocks: 1,
                bytes: n as u64,
            });
        }
    }
    Ok(entries)
}
