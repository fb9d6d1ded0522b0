use crate::drive::TapeDrive;
use crate::error::{Result, TapeFileError};
use crate::job::ArchiveJob;
use crate::label::{
    file_id_hex, FileHeader, FileHeader2, FileTrailer, FileTrailer2, LabelBlock, UserHeader,
    UserTrailer,
};
use crate::session::{LbpMode, Session, SessionGuard, WriteSession};
use tracing::{debug, info, warn};

/// Writes one file through a [`WriteSession`]
///
/// The file must be closed with [`close`](Self::close); dropping an open
/// writer leaves an unterminated file on tape and corrupts the session.
pub struct FileWriter<'s, 'd, D: TapeDrive> {
    guard: SessionGuard<'s, WriteSession<'d, D>>,
    job: ArchiveJob,
    file_id: String,
    block_size: usize,
    block_id: u64,
    block_count: u64,
    lbp_mode: LbpMode,
    open: bool,
}

impl<'s, 'd, D: TapeDrive> FileWriter<'s, 'd, D> {
    /// Locks the session and writes the file header.
    pub fn open(session: &'s WriteSession<'d, D>, job: &ArchiveJob, block_size: usize) -> Result<Self> {
        if job.archive_file_id == 0 || job.fseq < 1 {
            return Err(TapeFileError::invalid_argument(format!(
                "Unexpected file id (expected != 0, got {}) or fSeq (expected >= 1, got {})",
                job.archive_file_id, job.fseq
            )));
        }
        if block_size == 0 {
            return Err(TapeFileError::invalid_argument("Block size cannot be 0"));
        }
        let guard = SessionGuard::acquire(session)?;
        session.validate_next_fseq(job.fseq)?;

        let file_id = file_id_hex(job.archive_file_id);
        let mut hdr1 = FileHeader::default();
        let mut hdr2 = FileHeader2::default();
        let mut uhl1 = UserHeader::default();
        hdr1.fill(&file_id, session.vid(), job.fseq)?;
        hdr2.fill(block_size, session.compression())?;
        uhl1.fill(
            job.fseq,
            block_size,
            session.site_name(),
            session.host_name(),
            session.device_info(),
        )?;

        let headers = [hdr1.as_bytes(), hdr2.as_bytes(), uhl1.as_bytes()];
        let block_id = write_header(&mut **session.drive(), job.fseq, headers).map_err(|e| {
            session.set_corrupted();
            e
        })?;

        info!(
            vid = %session.vid(),
            fseq = job.fseq,
            file_id = %file_id,
            block_id,
            block_size,
            "Opened tape file for writing"
        );
        Ok(Self {
            lbp_mode: session.lbp_mode(),
            guard,
            job: job.clone(),
            file_id,
            block_size,
            block_id,
            block_count: 0,
            open: true,
        })
    }

    /// Writes one payload block, at most [`block_size`](Self::block_size) bytes.
    pub fn write(&mut self, data: &[u8]) -> Result<()> {
        if !self.open {
            return Err(TapeFileError::invalid_argument(format!(
                "File fSeq {} is already closed",
                self.job.fseq
            )));
        }
        if data.len() > self.block_size {
            return Err(TapeFileError::WrongBlockSize {
                expected: self.block_size,
                actual: data.len(),
            });
        }
        self.guard.session().drive().write_block(data)?;
        if !data.is_empty() {
            self.block_count += 1;
        }
        Ok(())
    }

    /// Terminates the payload and writes the trailer.
    pub fn close(&mut self) -> Result<()> {
        let session = self.guard.session();
        if !self.open {
            session.set_corrupted();
            return Err(TapeFileError::FileClosedTwice);
        }
        if self.block_count == 0 {
            session.set_corrupted();
            return Err(TapeFileError::ZeroFileWritten);
        }

        let mut eof1 = FileTrailer::default();
        let mut eof2 = FileTrailer2::default();
        let mut utl1 = UserTrailer::default();
        eof1.fill(&self.file_id, session.vid(), self.job.fseq, self.block_count)?;
        eof2.fill(self.block_size, session.compression())?;
        utl1.fill(
            self.job.fseq,
            self.block_size,
            session.site_name(),
            session.host_name(),
            session.device_info(),
        )?;

        {
            let mut drive = session.drive();
            drive.write_immediate_file_marks(1)?;
            drive.write_block(eof1.as_bytes())?;
            drive.write_block(eof2.as_bytes())?;
            drive.write_block(utl1.as_bytes())?;
            drive.write_immediate_file_marks(1)?;
        }
        self.open = false;
        session.report_written_fseq(self.job.fseq)?;
        debug!(
            fseq = self.job.fseq,
            blocks = self.block_count,
            "Closed tape file"
        );
        Ok(())
    }

    /// Current logical object id of the drive
    pub fn position(&self) -> Result<u64> {
        Ok(self.guard.session().drive().position()?.block_number)
    }

    /// Logical object id of the file's HDR1, 0 for the first file on tape
    pub fn block_id(&self) -> u64 {
        self.block_id
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn lbp_mode(&self) -> LbpMode {
        self.lbp_mode
    }

    pub fn blocks_written(&self) -> u64 {
        self.block_count
    }
}

/// Writes the three header blocks and their file mark, returning the block id
/// of HDR1.
fn write_header<D: TapeDrive + ?Sized>(
    drive: &mut D,
    fseq: u64,
    blocks: [&LabelBlock; 3],
) -> Result<u64> {
    let block_id = if fseq == 1 {
        0
    } else {
        drive.position()?.block_number
    };
    for block in blocks {
        drive.write_block(block)?;
    }
    drive.write_immediate_file_marks(1)?;
    Ok(block_id)
}

impl<D: TapeDrive> Drop for FileWriter<'_, '_, D> {
    fn drop(&mut self) {
        if self.open {
            warn!(fseq = self.job.fseq, "Tape file dropped without being closed");
            self.guard.session().set_corrupted();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drive::VirtualDrive;
    use crate::job::VolumeInfo;
    use crate::session::{LabelSession, SiteIdentity};

    fn labelled() -> VirtualDrive {
        let mut drive = VirtualDrive::new();
        LabelSession::label(&mut drive, "K00001", false).unwrap();
        drive
    }

    fn open_session(drive: &mut VirtualDrive, last_fseq: u64) -> WriteSession<'_, VirtualDrive> {
        WriteSession::new(
            drive,
            VolumeInfo::new("K00001"),
            last_fseq,
            false,
            false,
            SiteIdentity::new("CERN", "TPSRV01"),
        )
        .unwrap()
    }

    fn job(fseq: u64) -> ArchiveJob {
        ArchiveJob {
            archive_file_id: 0xABC,
            fseq,
            file_size: 5,
        }
    }

    #[test]
    fn test_invalid_arguments() {
        let mut drive = labelled();
        let session = open_session(&mut drive, 0);
        let zero_id = ArchiveJob {
            archive_file_id: 0,
            ..job(1)
        };
        assert!(matches!(
            FileWriter::open(&session, &zero_id, 1024),
            Err(TapeFileError::InvalidArgument(_))
        ));
        assert!(matches!(
            FileWriter::open(&session, &job(0), 1024),
            Err(TapeFileError::InvalidArgument(_))
        ));
        assert!(matches!(
            FileWriter::open(&session, &job(1), 0),
            Err(TapeFileError::InvalidArgument(_))
        ));
        assert!(!session.is_locked());
        assert!(!session.is_corrupted());
    }

    #[test]
    fn test_out_of_sequence_fseq_is_refused() {
        let mut drive = labelled();
        let session = open_session(&mut drive, 0);
        assert!(matches!(
            FileWriter::open(&session, &job(2), 1024),
            Err(TapeFileError::FSeqSequence { .. })
        ));
        assert!(!session.is_locked());
    }

    #[test]
    fn test_block_ids_and_append() {
        let mut drive = labelled();
        {
            let session = open_session(&mut drive, 0);
            let mut writer = FileWriter::open(&session, &job(1), 1024).unwrap();
            assert_eq!(writer.block_id(), 0);
            writer.write(b"first").unwrap();
            writer.close().unwrap();
            assert_eq!(writer.position().unwrap(), 11);
            drop(writer);

            let mut writer = FileWriter::open(&session, &job(2), 1024).unwrap();
            assert_eq!(writer.block_id(), 11);
            writer.write(b"second").unwrap();
            writer.close().unwrap();
            drop(writer);
            assert_eq!(session.last_written_fseq(), 2);
        }

        // reopening after fSeq 2 appends fSeq 3 behind it
        let session = open_session(&mut drive, 2);
        let mut writer = FileWriter::open(&session, &job(3), 1024).unwrap();
        assert_eq!(writer.block_id(), 21);
        writer.write(b"third").unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn test_oversized_block_is_refused() {
        let mut drive = labelled();
        let session = open_session(&mut drive, 0);
        let mut writer = FileWriter::open(&session, &job(1), 4).unwrap();
        assert!(matches!(
            writer.write(b"too long"),
            Err(TapeFileError::WrongBlockSize {
                expected: 4,
                actual: 8
            })
        ));
        writer.write(b"ok").unwrap();
        writer.close().unwrap();
    }

    #[test]
    fn test_close_twice_corrupts() {
        let mut drive = labelled();
        let session = open_session(&mut drive, 0);
        let mut writer = FileWriter::open(&session, &job(1), 1024).unwrap();
        writer.write(b"data").unwrap();
        writer.close().unwrap();
        assert!(matches!(
            writer.close(),
            Err(TapeFileError::FileClosedTwice)
        ));
        drop(writer);
        assert!(session.is_corrupted());
    }

    #[test]
    fn test_empty_blocks_do_not_count() {
        let mut drive = labelled();
        let session = open_session(&mut drive, 0);
        let mut writer = FileWriter::open(&session, &job(1), 1024).unwrap();
        writer.write(b"").unwrap();
        assert!(matches!(
            writer.close(),
            Err(TapeFileError::ZeroFileWritten)
        ));
        drop(writer);
        assert!(session.is_corrupted());
    }

    #[test]
    fn test_drop_without_close_corrupts() {
        let mut drive = labelled();
        let session = open_session(&mut drive, 0);
        {
            let mut writer = FileWriter::open(&session, &job(1), 1024).unwrap();
            writer.write(b"data").unwrap();
        }
        assert!(session.is_corrupted());
        assert!(!session.is_locked());
        assert!(matches!(
            FileWriter::open(&session, &job(1), 1024),
            Err(TapeFileError::SessionCorrupted)
        ));
    }

    #[test]
    fn test_write_protected_tape_corrupts_on_open() {
        let mut drive = labelled();
        drive.set_write_protected(true);
        let session = open_session(&mut drive, 0);
        assert!(matches!(
            FileWriter::open(&session, &job(1), 1024),
            Err(TapeFileError::WriteProtected)
        ));
        assert!(session.is_corrupted());
    }
}
