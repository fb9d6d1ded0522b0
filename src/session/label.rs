use crate::drive::TapeDrive;
use crate::error::Result;
use crate::label::{FileHeader, LbpMethod, VolumeLabel};
use tracing::info;

/// Writes the label of a fresh volume
pub struct LabelSession;

impl LabelSession {
    /// Writes VOL1, a PRELABEL HDR1 and a synchronous file mark at the
    /// current position, which must be the beginning of tape.
    ///
    /// The drive protection mode is left to the caller. With `lbp` the
    /// volume is marked as CRC32C protected.
    pub fn label<D: TapeDrive + ?Sized>(drive: &mut D, vid: &str, lbp: bool) -> Result<()> {
        let method = if lbp {
            LbpMethod::Crc32c
        } else {
            LbpMethod::Disabled
        };
        let mut vol1 = VolumeLabel::default();
        vol1.fill(vid, method)?;
        let mut prelabel = FileHeader::default();
        prelabel.fill_prelabel(vid)?;

        drive.write_block(vol1.as_bytes())?;
        drive.write_block(prelabel.as_bytes())?;
        drive.write_sync_file_marks(1)?;
        info!(vid, lbp = %method, "Volume labelled");
        Ok(())
    }
}
