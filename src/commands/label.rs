//! Label Command Handler
//!
//! Handles the `label` subcommand. A non-empty tape is only relabelled when
//! its current label matches `--old-label` (or the VID), unless `--force`.

use super::load_image;
use std::path::PathBuf;
use std::time::Duration;
use tapefile::config::TapeConfig;
use tapefile::drive::{TapeDrive, VirtualDrive};
use tapefile::error::{Result, TapeFileError};
use tapefile::header_checker;
use tapefile::label::{LbpMethod, VolumeLabel, LABEL_BLOCK_SIZE};
use tapefile::session::LabelSession;
use tracing::{info, warn};

#[derive(Debug, Clone)]
pub struct LabelOptions {
    pub vid: String,
    pub old_label: Option<String>,
    pub force: bool,
    pub use_lbp: bool,
}

pub async fn execute(
    image: PathBuf,
    vid: String,
    force: bool,
    old_label: Option<String>,
    no_lbp: bool,
    config: &TapeConfig,
) -> Result<()> {
    info!(
        vid = %vid,
        old_label = ?old_label,
        force,
        "Label session started"
    );

    let mut drive = if image.exists() {
        load_image(&image, config)?
    } else {
        info!("Creating blank tape image {:?}", image);
        VirtualDrive::with_device_info(config.drive.clone())
    };

    let options = LabelOptions {
        vid,
        old_label,
        force,
        use_lbp: config.use_lbp && !no_lbp,
    };
    let result = label_volume(&mut drive, &options, config.load_timeout());
    drive.disable_logical_block_protection()?;
    result?;

    drive.save(&image)?;
    println!("✅ Tape {} labelled ({:?})", options.vid, image);
    Ok(())
}

/// Labels the tape in `drive` according to `options`.
pub fn label_volume<D: TapeDrive>(
    drive: &mut D,
    options: &LabelOptions,
    load_timeout: Duration,
) -> Result<()> {
    drive.wait_until_ready(load_timeout)?;
    if drive.is_write_protected()? {
        return Err(TapeFileError::WriteProtected);
    }

    let drive_supports_lbp = drive.device_info()?.supports_lbp;
    if options.use_lbp && !drive_supports_lbp {
        warn!("Drive does not support LBP, labelling without it");
    }

    drive.rewind()?;
    if !drive.is_tape_blank()? {
        if options.force {
            warn!(vid = %options.vid, "Labelling a non-empty tape with force option");
        } else {
            let expected = options.old_label.as_deref().unwrap_or(&options.vid);
            if options.old_label.is_none() {
                warn!(vid = %options.vid, "Labelling a non-empty tape without the old label option");
            }
            check_tape_label(drive, expected, options.use_lbp)?;
        }
        drive.rewind()?;
    }

    let lbp = options.use_lbp && drive_supports_lbp;
    if lbp {
        drive.enable_crc32c_logical_block_protection_read_write()?;
    } else {
        drive.disable_logical_block_protection()?;
    }
    LabelSession::label(drive, &options.vid, lbp)
}

/// The current VOL1 must be readable under its own protection mode and
/// carry `expected`.
fn check_tape_label<D: TapeDrive>(drive: &mut D, expected: &str, use_lbp: bool) -> Result<()> {
    info!(expected, "Checking label of non-empty tape");
    drive.disable_logical_block_protection()?;
    let vol1 = read_vol1(drive)?;
    match vol1.lbp_method().map_err(|_| TapeFileError::TapeNotEmpty)? {
        LbpMethod::Crc32c if use_lbp => drive.enable_crc32c_logical_block_protection_read_write()?,
        LbpMethod::Crc32c => {
            return Err(TapeFileError::invalid_argument(
                "Tape labelled with crc32c logical block protection but labelling without LBP",
            ))
        }
        LbpMethod::ReedSolomon => {
            return Err(TapeFileError::unsupported(
                "ReedSolomon LBP method not supported",
            ))
        }
        LbpMethod::Disabled => drive.disable_logical_block_protection()?,
    }

    drive.rewind()?;
    let vol1 = read_vol1(drive)?;
    header_checker::check_vol1(&vol1, expected)
}

/// Anything that is not a VOL1 means the tape holds foreign data.
fn read_vol1<D: TapeDrive>(drive: &mut D) -> Result<VolumeLabel> {
    let mut block = [0u8; LABEL_BLOCK_SIZE];
    drive
        .read_exact_block(&mut block, "Reading VOL1 of non-empty tape")
        .map_err(|e| {
            warn!("Cannot read VOL1: {}", e);
            TapeFileError::TapeNotEmpty
        })?;
    let vol1 = VolumeLabel::from_bytes(&block)?;
    vol1.verify().map_err(|e| {
        warn!("Existing VOL1 is not valid: {}", e);
        TapeFileError::TapeNotEmpty
    })?;
    Ok(vol1)
}
