//! Command Handlers Module
//!
//! This module contains handlers for all CLI subcommands. Every command
//! works on a tape image loaded into a [`VirtualDrive`].

pub mod dump;
pub mod label;
pub mod read;
pub mod write;

use std::path::Path;
use tapefile::config::TapeConfig;
use tapefile::drive::{TapeDrive, VirtualDrive};
use tapefile::error::{Result, TapeFileError};
use tracing::info;

/// Loads an existing tape image and waits for the drive to be ready.
pub fn load_image(image: &Path, config: &TapeConfig) -> Result<VirtualDrive> {
    if !image.exists() {
        return Err(TapeFileError::invalid_argument(format!(
            "Tape image {:?} does not exist, label it first",
            image
        )));
    }
    let mut drive = VirtualDrive::open(image)?;
    drive.wait_until_ready(config.load_timeout())?;
    info!("Tape image {:?} mounted", image);
    Ok(drive)
}
