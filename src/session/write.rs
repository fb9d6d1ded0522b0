use super::{
    detect_lbp_method, read_label_block, read_volume_label, LbpMode, Session, SessionLock,
};
use crate::drive::{DeviceInfo, TapeDrive};
use crate::error::{Result, TapeFileError};
use crate::header_checker;
use crate::job::VolumeInfo;
use crate::label::{FileTrailer, FileTrailer2, LbpMethod, UserTrailer};
use parking_lot::{Mutex, MutexGuard};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Site and mover host names stamped into UHL1/UTL1
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteIdentity {
    pub site_name: String,
    pub host_name: String,
}

impl SiteIdentity {
    pub fn new(site_name: impl Into<String>, host_name: impl Into<String>) -> Self {
        Self {
            site_name: site_name.into(),
            host_name: host_name.into(),
        }
    }
}

#[derive(Debug)]
struct WriteState {
    lock: SessionLock,
    last_written_fseq: u64,
}

/// Append access to one mounted volume
pub struct WriteSession<'d, D: TapeDrive> {
    drive: Mutex<&'d mut D>,
    volume: VolumeInfo,
    compression: bool,
    use_lbp: bool,
    detected_lbp: bool,
    identity: SiteIdentity,
    device_info: DeviceInfo,
    state: Mutex<WriteState>,
}

impl<'d, D: TapeDrive> WriteSession<'d, D> {
    /// Opens a write session positioned for appending file `last_fseq + 1`.
    ///
    /// With `last_fseq > 0` the trailer of that file is read back and must
    /// carry the same fSeq.
    pub fn new(
        drive: &'d mut D,
        volume: VolumeInfo,
        last_fseq: u64,
        compression: bool,
        use_lbp: bool,
        identity: SiteIdentity,
    ) -> Result<Self> {
        volume.validate()?;
        if identity.site_name.trim().is_empty() || identity.host_name.trim().is_empty() {
            return Err(TapeFileError::invalid_argument(
                "Site name and host name are required to write files",
            ));
        }

        if drive.is_tape_blank()? {
            return Err(TapeFileError::format(format!(
                "Tape {} is blank, it must be labelled before writing",
                volume.vid
            )));
        }

        let detected_lbp = match detect_lbp_method(&mut *drive, "Reading VOL1 to detect LBP")? {
            LbpMethod::Crc32c => {
                if !use_lbp {
                    return Err(TapeFileError::invalid_argument(format!(
                        "Tape {} is labelled with crc32c logical block protection but LBP is disabled",
                        volume.vid
                    )));
                }
                drive.enable_crc32c_logical_block_protection_read_write()?;
                true
            }
            LbpMethod::ReedSolomon => {
                return Err(TapeFileError::unsupported(
                    "ReedSolomon LBP method not supported",
                ))
            }
            LbpMethod::Disabled => {
                drive.disable_logical_block_protection()?;
                false
            }
        };

        drive.rewind()?;
        let vol1 = read_volume_label(&mut *drive, "Reading VOL1")?;
        vol1.verify()?;
        header_checker::check_vol1(&vol1, &volume.vid)?;

        if last_fseq > 0 {
            skip_to_end_of_file(&mut *drive, last_fseq)?;
        }

        let device_info = drive.device_info()?;

        let session = Self {
            drive: Mutex::new(drive),
            volume,
            compression,
            use_lbp,
            detected_lbp,
            identity,
            device_info,
            state: Mutex::new(WriteState {
                lock: SessionLock::default(),
                last_written_fseq: last_fseq,
            }),
        };
        info!(
            vid = %session.volume.vid,
            last_fseq,
            lbp = %session.lbp_mode(),
            site = %session.identity.site_name,
            host = %session.identity.host_name,
            "Write session opened"
        );
        Ok(session)
    }

    /// `fseq` must directly follow the last file written.
    pub fn validate_next_fseq(&self, fseq: u64) -> Result<()> {
        let last_written = self.state.lock().last_written_fseq;
        check_adjacent(last_written, fseq)
    }

    /// Records `fseq` as written once its trailer is on tape.
    pub fn report_written_fseq(&self, fseq: u64) -> Result<()> {
        let mut state = self.state.lock();
        check_adjacent(state.last_written_fseq, fseq)?;
        state.last_written_fseq = fseq;
        debug!(vid = %self.volume.vid, fseq, "fSeq written");
        Ok(())
    }

    pub fn last_written_fseq(&self) -> u64 {
        self.state.lock().last_written_fseq
    }

    pub fn volume_info(&self) -> &VolumeInfo {
        &self.volume
    }

    pub fn vid(&self) -> &str {
        &self.volume.vid
    }

    pub fn compression(&self) -> bool {
        self.compression
    }

    pub fn site_name(&self) -> &str {
        &self.identity.site_name
    }

    pub fn host_name(&self) -> &str {
        &self.identity.host_name
    }

    pub fn device_info(&self) -> &DeviceInfo {
        &self.device_info
    }

    pub(crate) fn drive(&self) -> MutexGuard<'_, &'d mut D> {
        self.drive.lock()
    }
}

impl<D: TapeDrive> Session for WriteSession<'_, D> {
    fn lock(&self) -> Result<()> {
        self.state.lock().lock.lock()
    }

    fn release(&self) {
        self.state.lock().lock.release()
    }

    fn is_locked(&self) -> bool {
        self.state.lock().lock.is_locked()
    }

    fn is_corrupted(&self) -> bool {
        self.state.lock().lock.is_corrupted()
    }

    fn set_corrupted(&self) {
        warn!(vid = %self.volume.vid, "Write session marked corrupted");
        self.state.lock().lock.set_corrupted()
    }

    fn lbp_mode(&self) -> LbpMode {
        LbpMode::from_flags(self.use_lbp, self.detected_lbp)
    }
}

fn check_adjacent(last_written: u64, requested: u64) -> Result<()> {
    match last_written.checked_add(1) {
        Some(next) if next == requested => Ok(()),
        Some(_) => Err(TapeFileError::FSeqSequence {
            last_written,
            requested,
        }),
        None => Err(TapeFileError::invalid_argument(format!(
            "fSeq {} cannot be followed by another file",
            last_written
        ))),
    }
}

/// Moves from right after VOL1 to right after the trailer of file `last_fseq`
/// and checks that trailer.
fn skip_to_end_of_file<D: TapeDrive + ?Sized>(drive: &mut D, last_fseq: u64) -> Result<()> {
    // 3 file marks per file, stopping before the trailer of the last one
    let file_marks = last_fseq
        .checked_mul(3)
        .map(|n| n - 1)
        .ok_or_else(|| TapeFileError::invalid_argument(format!("fSeq {} out of range", last_fseq)))?;
    drive
        .space_file_marks_forward(file_marks)
        .map_err(TapeFileError::into_format)?;

    let eof1 = read_label_block(drive, "Reading EOF1")?;
    let eof2 = read_label_block(drive, "Reading EOF2")?;
    let utl1 = read_label_block(drive, "Reading UTL1")?;
    drive
        .read_file_mark("Reading file mark at the end of file trailer")
        .map_err(TapeFileError::into_format)?;

    FileTrailer::from_bytes(&eof1)?.verify()?;
    FileTrailer2::from_bytes(&eof2)?.verify()?;
    let utl1 = UserTrailer::from_bytes(&utl1)?;
    utl1.verify()?;
    header_checker::check_utl1(&utl1, last_fseq)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::{DriveProtection, VirtualDrive};
    use crate::session::LabelSession;

    fn identity() -> SiteIdentity {
        SiteIdentity::new("CERN", "TPSRV01")
    }

    fn labelled(lbp: bool) -> VirtualDrive {
        let mut drive = VirtualDrive::new();
        if lbp {
            drive
                .enable_crc32c_logical_block_protection_read_write()
                .unwrap();
        }
        LabelSession::label(&mut drive, "K00001", lbp).unwrap();
        drive
    }

    #[test]
    fn test_fseq_adjacency() {
        let mut drive = labelled(false);
        let session = WriteSession::new(
            &mut drive,
            VolumeInfo::new("K00001"),
            0,
            false,
            false,
            identity(),
        )
        .unwrap();
        for n in [0, 2, 3, u64::MAX] {
            assert!(session.validate_next_fseq(n).is_err());
        }
        session.validate_next_fseq(1).unwrap();
        session.report_written_fseq(1).unwrap();
        assert_eq!(session.last_written_fseq(), 1);
        assert!(matches!(
            session.report_written_fseq(3),
            Err(TapeFileError::FSeqSequence {
                last_written: 1,
                requested: 3
            })
        ));
        assert_eq!(session.last_written_fseq(), 1);
    }

    #[test]
    fn test_check_adjacent_overflow() {
        assert!(matches!(
            check_adjacent(u64::MAX, 0),
            Err(TapeFileError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_blank_tape_is_refused() {
        let mut drive = VirtualDrive::new();
        let result = WriteSession::new(
            &mut drive,
            VolumeInfo::new("K00001"),
            0,
            false,
            true,
            identity(),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_crc32c_volume_requires_lbp() {
        let mut drive = labelled(true);
        assert!(matches!(
            WriteSession::new(
                &mut drive,
                VolumeInfo::new("K00001"),
                0,
                false,
                false,
                identity(),
            ),
            Err(TapeFileError::InvalidArgument(_))
        ));

        let session = WriteSession::new(
            &mut drive,
            VolumeInfo::new("K00001"),
            0,
            false,
            true,
            identity(),
        )
        .unwrap();
        assert_eq!(session.lbp_mode(), LbpMode::On);
        drop(session);
        assert_eq!(drive.protection(), DriveProtection::Crc32cReadWrite);
    }

    #[test]
    fn test_missing_identity_is_invalid() {
        let mut drive = labelled(false);
        let result = WriteSession::new(
            &mut drive,
            VolumeInfo::new("K00001"),
            0,
            false,
            false,
            SiteIdentity::new("", "HOST"),
        );
        assert!(matches!(result, Err(TapeFileError::InvalidArgument(_))));
    }

    #[test]
    fn test_last_fseq_beyond_tape_content() {
        let mut drive = labelled(false);
        let result = WriteSession::new(
            &mut drive,
            VolumeInfo::new("K00001"),
            1,
            false,
            false,
            identity(),
        );
        assert!(result.err().unwrap().is_format());
    }

    #[test]
    fn test_reed_solomon_volume_is_unsupported() {
        let mut drive = VirtualDrive::new();
        let mut vol1 = crate::label::VolumeLabel::default();
        vol1.fill("K00001", LbpMethod::ReedSolomon).unwrap();
        drive.write_block(vol1.as_bytes()).unwrap();
        let result = WriteSession::new(
            &mut drive,
            VolumeInfo::new("K00001"),
            0,
            false,
            true,
            identity(),
        );
        assert!(matches!(result, Err(TapeFileError::Unsupported(_))));
    }

    #[test]
    fn test_trailer_of_last_file_must_carry_its_fseq() {
        use crate::label::{FileHeader, FileHeader2, UserHeader};

        let mut drive = labelled(false);
        let device = DeviceInfo::default();
        let mut hdr1 = FileHeader::default();
        let mut hdr2 = FileHeader2::default();
        let mut uhl1 = UserHeader::default();
        let mut eof1 = FileTrailer::default();
        let mut eof2 = FileTrailer2::default();
        let mut utl1 = UserTrailer::default();
        hdr1.fill("ABC", "K00001", 1).unwrap();
        hdr2.fill(1024, false).unwrap();
        uhl1.fill(1, 1024, "CERN", "TPSRV01", &device).unwrap();
        eof1.fill("ABC", "K00001", 1, 1).unwrap();
        eof2.fill(1024, false).unwrap();
        // trailer written as if this were file 2
        utl1.fill(2, 1024, "CERN", "TPSRV01", &device).unwrap();

        drive.position_to_logical_object(1).unwrap();
        for block in [hdr1.as_bytes(), hdr2.as_bytes(), uhl1.as_bytes()] {
            drive.write_block(block).unwrap();
        }
        drive.write_immediate_file_marks(1).unwrap();
        drive.write_block(b"payload").unwrap();
        drive.write_immediate_file_marks(1).unwrap();
        for block in [eof1.as_bytes(), eof2.as_bytes(), utl1.as_bytes()] {
            drive.write_block(block).unwrap();
        }
        drive.write_immediate_file_marks(1).unwrap();

        let err = WriteSession::new(
            &mut drive,
            VolumeInfo::new("K00001"),
            1,
            false,
            false,
            identity(),
        )
        .err()
        .unwrap();
        assert!(err.is_format());
        assert!(err.to_string().contains("UTL1"));
    }
}
