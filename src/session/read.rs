use super::{detect_lbp_method, read_volume_label, LbpMode, Session, SessionLock};
use crate::drive::TapeDrive;
use crate::error::{Result, TapeFileError};
use crate::header_checker;
use crate::job::VolumeInfo;
use crate::label::LbpMethod;
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

/// Where the head is relative to the current file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartOfFile {
    Header,
    HeaderProcessing,
    Payload,
    Trailer,
}

#[derive(Debug)]
struct ReadState {
    lock: SessionLock,
    current_fseq: u64,
    part: PartOfFile,
}

/// Read access to one mounted volume
pub struct ReadSession<'d, D: TapeDrive> {
    drive: Mutex<&'d mut D>,
    volume: VolumeInfo,
    use_lbp: bool,
    detected_lbp: bool,
    blank: bool,
    state: Mutex<ReadState>,
}

impl<'d, D: TapeDrive> ReadSession<'d, D> {
    /// Opens a read session and leaves the head right after VOL1.
    ///
    /// A blank tape gives a session on which every file open fails.
    pub fn new(drive: &'d mut D, volume: VolumeInfo, use_lbp: bool) -> Result<Self> {
        volume.validate()?;

        let mut session = Self {
            drive: Mutex::new(drive),
            volume,
            use_lbp,
            detected_lbp: false,
            blank: false,
            state: Mutex::new(ReadState {
                lock: SessionLock::default(),
                current_fseq: 1,
                part: PartOfFile::Header,
            }),
        };

        {
            let drive = session.drive.get_mut();
            if drive.is_tape_blank()? {
                warn!(vid = %session.volume.vid, "Tape is blank, no file can be read");
                session.blank = true;
                return Ok(session);
            }

            match detect_lbp_method(&mut **drive, "Reading VOL1 to detect LBP")? {
                LbpMethod::Crc32c => {
                    session.detected_lbp = true;
                    if use_lbp {
                        drive.enable_crc32c_logical_block_protection_read_only()?;
                    } else {
                        drive.disable_logical_block_protection()?;
                    }
                }
                LbpMethod::ReedSolomon => {
                    return Err(TapeFileError::unsupported(
                        "ReedSolomon LBP method not supported",
                    ))
                }
                LbpMethod::Disabled => {
                    drive.disable_logical_block_protection()?;
                }
            }

            drive.rewind()?;
            let vol1 = read_volume_label(&mut **drive, "Reading VOL1")?;
            vol1.verify()?;
            header_checker::check_vol1(&vol1, &session.volume.vid)?;
        }

        info!(
            vid = %session.volume.vid,
            lbp = %session.lbp_mode(),
            "Read session opened"
        );
        Ok(session)
    }

    pub fn volume_info(&self) -> &VolumeInfo {
        &self.volume
    }

    pub fn vid(&self) -> &str {
        &self.volume.vid
    }

    pub fn is_blank(&self) -> bool {
        self.blank
    }

    pub fn current_fseq(&self) -> u64 {
        self.state.lock().current_fseq
    }

    pub fn current_file_part(&self) -> PartOfFile {
        self.state.lock().part
    }

    pub(crate) fn set_current_fseq(&self, fseq: u64) {
        self.state.lock().current_fseq = fseq;
    }

    pub(crate) fn set_current_file_part(&self, part: PartOfFile) {
        debug!(vid = %self.volume.vid, ?part, "Read session file part");
        self.state.lock().part = part;
    }

    pub(crate) fn drive(&self) -> MutexGuard<'_, &'d mut D> {
        self.drive.lock()
    }
}

impl<D: TapeDrive> Session for ReadSession<'_, D> {
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
        warn!(vid = %self.volume.vid, "Read session marked corrupted");
        self.state.lock().lock.set_corrupted()
    }

    fn lbp_mode(&self) -> LbpMode {
        LbpMode::from_flags(self.use_lbp, self.detected_lbp)
    }
}
