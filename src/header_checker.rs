//! Cross-checks of decoded label blocks against the job being served

use crate::error::{Result, TapeFileError};
use crate::job::{RetrieveJob, VolumeInfo};
use crate::label::{numeric_field_matches, FileHeader, NumericBase, UserHeader, UserTrailer, VolumeLabel};
use tracing::warn;

pub fn check_vol1(vol1: &VolumeLabel, expected_vid: &str) -> Result<()> {
    let vsn = vol1.vsn();
    if vsn != expected_vid {
        warn!(found = %vsn, expected = %expected_vid, "VSN mismatch in VOL1");
        return Err(TapeFileError::format(format!(
            "VSN of tape ({}) is not the one requested ({})",
            vsn, expected_vid
        )));
    }
    Ok(())
}

/// File id (hex) and VSN of HDR1 must match the job and the mounted volume.
pub fn check_hdr1(hdr1: &FileHeader, job: &RetrieveJob, volume: &VolumeInfo) -> Result<()> {
    let file_id = hdr1.file_id();
    if !numeric_field_matches(&file_id, job.archive_file_id, NumericBase::Hexadecimal) {
        warn!(
            found = %file_id,
            expected = job.archive_file_id,
            fseq = job.fseq,
            "File id mismatch in HDR1"
        );
        return Err(TapeFileError::format(format!(
            "Invalid file id detected in HDR1: (0x)\"{}\", wanted 0x{:x}",
            file_id, job.archive_file_id
        )));
    }

    let vsn = hdr1.vsn();
    if vsn != volume.vid {
        return Err(TapeFileError::format(format!(
            "Wrong volume ID found in HDR1: {}, wanted {}",
            vsn, volume.vid
        )));
    }
    Ok(())
}

/// HDR1 only keeps the fSeq modulo 10000, so the exact check is done on UHL1.
pub fn check_uhl1(uhl1: &UserHeader, job: &RetrieveJob) -> Result<()> {
    let field = uhl1.fseq_field();
    if !numeric_field_matches(&field, job.fseq, NumericBase::Decimal) {
        warn!(found = %field, expected = job.fseq, "fSeq mismatch in UHL1");
        return Err(TapeFileError::format(format!(
            "Invalid fSeq detected in UHL1: \"{}\", wanted {}",
            field, job.fseq
        )));
    }
    Ok(())
}

pub fn check_utl1(utl1: &UserTrailer, fseq: u64) -> Result<()> {
    let field = utl1.fseq_field();
    if !numeric_field_matches(&field, fseq, NumericBase::Decimal) {
        warn!(found = %field, expected = fseq, "fSeq mismatch in UTL1");
        return Err(TapeFileError::format(format!(
            "Invalid fSeq detected in UTL1: \"{}\", wanted {}",
            field, fseq
        )));
    }
    Ok(())
}
