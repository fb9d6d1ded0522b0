use super::BlockRead;
use crate::drive::TapeDrive;
use crate::error::{Result, TapeFileError};
use crate::header_checker;
use crate::job::{PositioningMethod, RetrieveJob};
use crate::label::file::BLOCK_COUNT_MODULUS;
use crate::label::{FileHeader, FileHeader2, FileTrailer, FileTrailer2, UserHeader, UserTrailer};
use crate::session::{
    read_label_block, read_volume_label, LbpMode, PartOfFile, ReadSession, Session, SessionGuard,
};
use tracing::{debug, info, warn};

/// Reads one file from a [`ReadSession`]
pub struct FileReader<'s, 'd, D: TapeDrive> {
    guard: SessionGuard<'s, ReadSession<'d, D>>,
    fseq: u64,
    positioning: PositioningMethod,
    block_size: usize,
    blocks_read: u64,
    lbp_mode: LbpMode,
    end_of_file: bool,
}

impl<'s, 'd, D: TapeDrive> FileReader<'s, 'd, D> {
    /// Locks the session, positions on the file's header and checks it.
    ///
    /// A header that does not match `job` is a format error. The session
    /// lock is released on every error path.
    pub fn open(session: &'s ReadSession<'d, D>, job: &RetrieveJob) -> Result<Self> {
        let guard = SessionGuard::acquire(session)?;
        if session.is_blank() {
            return Err(TapeFileError::format(format!(
                "Tape {} is blank, cannot read fSeq {}",
                session.vid(),
                job.fseq
            )));
        }
        if job.fseq < 1 {
            return Err(TapeFileError::invalid_argument(format!(
                "fSeq must be at least 1, got {}",
                job.fseq
            )));
        }
        if job.positioning == PositioningMethod::ByBlock && job.block_id > u64::from(u32::MAX) {
            return Err(TapeFileError::invalid_argument(format!(
                "Block id larger than the supported uint32 limit: {}",
                job.block_id
            )));
        }

        if session.current_file_part() != PartOfFile::Header
            && job.positioning == PositioningMethod::ByFSeq
        {
            session.set_corrupted();
            return Err(TapeFileError::SessionCorrupted);
        }
        // A later open finds this state if we fail half way
        session.set_current_file_part(PartOfFile::HeaderProcessing);

        match job.positioning {
            PositioningMethod::ByBlock => position_by_block(session, job)?,
            PositioningMethod::ByFSeq => position_by_fseq(session, job)?,
        }
        session.set_current_fseq(job.fseq);

        let (hdr1, hdr2, uhl1) = {
            let mut drive = session.drive();
            let hdr1 = read_label_block(&mut **drive, "Reading HDR1")?;
            let hdr2 = read_label_block(&mut **drive, "Reading HDR2")?;
            let uhl1 = read_label_block(&mut **drive, "Reading UHL1")?;
            drive
                .read_file_mark("Reading file mark at the end of file header")
                .map_err(TapeFileError::into_format)?;
            (hdr1, hdr2, uhl1)
        };
        session.set_current_file_part(PartOfFile::Payload);

        let hdr1 = FileHeader::from_bytes(&hdr1)?;
        let hdr2 = FileHeader2::from_bytes(&hdr2)?;
        let uhl1 = UserHeader::from_bytes(&uhl1)?;
        hdr1.verify()?;
        hdr2.verify()?;
        uhl1.verify()?;

        header_checker::check_hdr1(&hdr1, job, session.volume_info())?;
        header_checker::check_uhl1(&uhl1, job)?;

        let block_size = uhl1
            .block_size()
            .ok()
            .and_then(|size| usize::try_from(size).ok())
            .filter(|size| *size >= 1)
            .ok_or_else(|| TapeFileError::format("Invalid block size in UHL1"))?;

        info!(
            vid = %session.vid(),
            fseq = job.fseq,
            block_size,
            positioning = ?job.positioning,
            "Opened tape file for reading"
        );
        Ok(Self {
            lbp_mode: session.lbp_mode(),
            guard,
            fseq: job.fseq,
            positioning: job.positioning,
            block_size,
            blocks_read: 0,
            end_of_file: false,
        })
    }

    /// Block size declared in UHL1
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn lbp_mode(&self) -> LbpMode {
        self.lbp_mode
    }

    pub fn fseq(&self) -> u64 {
        self.fseq
    }

    /// Reads the next payload block into `buffer`, which must be exactly
    /// [`block_size`](Self::block_size) long.
    ///
    /// At the end of the payload the trailer is read and checked and
    /// [`BlockRead::EndOfFile`] is returned. Reading past that point is an
    /// [`TapeFileError::EndOfFile`] error.
    pub fn read(&mut self, buffer: &mut [u8]) -> Result<BlockRead> {
        if self.end_of_file {
            return Err(TapeFileError::EndOfFile);
        }
        if buffer.len() != self.block_size {
            return Err(TapeFileError::WrongBlockSize {
                expected: self.block_size,
                actual: buffer.len(),
            });
        }

        let session = self.guard.session();
        let bytes_read = session.drive().read_block(buffer)?;
        if bytes_read > 0 {
            self.blocks_read += 1;
            return Ok(BlockRead::Data(bytes_read));
        }

        session.set_current_file_part(PartOfFile::Trailer);
        let (eof1, eof2, utl1) = {
            let mut drive = session.drive();
            let eof1 = read_label_block(&mut **drive, "Reading EOF1")?;
            let eof2 = read_label_block(&mut **drive, "Reading EOF2")?;
            let utl1 = read_label_block(&mut **drive, "Reading UTL1")?;
            drive
                .read_file_mark("Reading file mark at the end of file trailer")
                .map_err(TapeFileError::into_format)?;
            (eof1, eof2, utl1)
        };
        session.set_current_fseq(session.current_fseq() + 1);
        session.set_current_file_part(PartOfFile::Header);
        self.end_of_file = true;

        let eof1 = FileTrailer::from_bytes(&eof1)?;
        let eof2 = FileTrailer2::from_bytes(&eof2)?;
        let utl1 = UserTrailer::from_bytes(&utl1)?;
        eof1.verify()?;
        eof2.verify()?;
        utl1.verify()?;
        header_checker::check_utl1(&utl1, self.fseq)?;

        let recorded = eof1.block_count()?;
        if recorded != self.blocks_read % BLOCK_COUNT_MODULUS {
            warn!(
                fseq = self.fseq,
                recorded,
                read = self.blocks_read,
                "Block count in EOF1 differs from blocks read"
            );
        }
        debug!(fseq = self.fseq, blocks = self.blocks_read, "End of file");
        Ok(BlockRead::EndOfFile)
    }
}

impl<D: TapeDrive> Drop for FileReader<'_, '_, D> {
    fn drop(&mut self) {
        let session = self.guard.session();
        if self.positioning == PositioningMethod::ByFSeq
            && session.current_file_part() != PartOfFile::Header
        {
            warn!(fseq = self.fseq, "Tape file abandoned before its trailer");
            session.set_corrupted();
        }
    }
}

fn position_by_block<D: TapeDrive>(session: &ReadSession<'_, D>, job: &RetrieveJob) -> Result<()> {
    // block 0 is VOL1, the first file starts right after it
    let destination = job.block_id.max(1);
    debug!(block = destination, fseq = job.fseq, "Positioning by block id");
    session
        .drive()
        .position_to_logical_object(destination)
        .map_err(TapeFileError::into_format)
}

fn position_by_fseq<D: TapeDrive>(session: &ReadSession<'_, D>, job: &RetrieveJob) -> Result<()> {
    let current = session.current_fseq();
    let mut drive = session.drive();
    debug!(from = current, to = job.fseq, "Positioning by fSeq");

    if job.fseq == 1 {
        drive.rewind()?;
        let vol1 = read_volume_label(&mut **drive, "Reading VOL1")?;
        return vol1.verify();
    }

    let out_of_range = || TapeFileError::invalid_argument(format!("fSeq {} out of range", job.fseq));
    if job.fseq > current {
        // header, payload and trailer marks of every file in between
        let marks = (job.fseq - current).checked_mul(3).ok_or_else(out_of_range)?;
        drive
            .space_file_marks_forward(marks)
            .map_err(TapeFileError::into_format)?;
    } else if job.fseq < current {
        // one more to land on the BOT side of the mark before the header
        let marks = (current - job.fseq)
            .checked_mul(3)
            .and_then(|n| n.checked_add(1))
            .ok_or_else(out_of_range)?;
        drive.space_file_marks_backwards(marks)?;
        drive
            .read_file_mark("Reading file mark right before the header")
            .map_err(TapeFileError::into_format)?;
    }
    Ok(())
}
