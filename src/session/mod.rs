//! Per-mount tape sessions
//!
//! A session owns the drive for the duration of a mount and hands it to at
//! most one file handle at a time. The lock here is a reentrancy guard, not
//! a thread mutex: a drive cannot be at two positions at once, so a second
//! handle on the same session is refused.

use crate::drive::TapeDrive;
use crate::error::{Result, TapeFileError};
use crate::label::{LabelBlock, LbpMethod, VolumeLabel, LABEL_BLOCK_SIZE};
use serde::Serialize;
use std::fmt;
use tracing::warn;

pub mod label;
pub mod read;
pub mod write;

pub use label::LabelSession;
pub use read::{PartOfFile, ReadSession};
pub use write::{SiteIdentity, WriteSession};

/// Logical block protection state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LbpMode {
    /// Volume is protected and the drive checks it
    On,
    /// Volume is protected but checking was not requested
    OffButPresent,
    /// Volume carries no protection
    Off,
}

impl LbpMode {
    pub(crate) fn from_flags(use_lbp: bool, detected_lbp: bool) -> Self {
        match (use_lbp, detected_lbp) {
            (true, true) => LbpMode::On,
            (false, true) => LbpMode::OffButPresent,
            (_, false) => LbpMode::Off,
        }
    }
}

impl fmt::Display for LbpMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LbpMode::On => "LBP_On",
            LbpMode::OffButPresent => "LBP_Off_but_present",
            LbpMode::Off => "LBP_Off",
        };
        f.write_str(name)
    }
}

/// Lock and corruption flags shared by both session kinds
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct SessionLock {
    locked: bool,
    corrupted: bool,
}

impl SessionLock {
    pub(crate) fn lock(&mut self) -> Result<()> {
        if self.locked {
            return Err(TapeFileError::SessionAlreadyInUse);
        }
        if self.corrupted {
            return Err(TapeFileError::SessionCorrupted);
        }
        self.locked = true;
        Ok(())
    }

    /// Releasing a session that is not locked means a handle went missing;
    /// the session is marked corrupted.
    pub(crate) fn release(&mut self) {
        if !self.locked {
            warn!("Releasing a session that was not locked, marking it corrupted");
            self.corrupted = true;
        }
        self.locked = false;
    }

    pub(crate) fn set_corrupted(&mut self) {
        self.corrupted = true;
    }

    pub(crate) fn is_locked(&self) -> bool {
        self.locked
    }

    pub(crate) fn is_corrupted(&self) -> bool {
        self.corrupted
    }
}

/// Lock discipline common to read and write sessions
pub trait Session {
    fn lock(&self) -> Result<()>;
    fn release(&self);
    fn is_locked(&self) -> bool;
    fn is_corrupted(&self) -> bool;
    fn set_corrupted(&self);
    fn lbp_mode(&self) -> LbpMode;
}

/// Scoped session lock, released when dropped
pub struct SessionGuard<'s, S: Session> {
    session: &'s S,
}

impl<'s, S: Session> SessionGuard<'s, S> {
    /// Locks `session`, refusing a corrupted one.
    pub fn acquire(session: &'s S) -> Result<Self> {
        if session.is_corrupted() {
            return Err(TapeFileError::SessionCorrupted);
        }
        session.lock()?;
        Ok(Self { session })
    }

    pub fn session(&self) -> &'s S {
        self.session
    }
}

impl<S: Session> Drop for SessionGuard<'_, S> {
    fn drop(&mut self) {
        self.session.release();
    }
}

/// Reads one label block; a short block or a file mark is a format error.
pub(crate) fn read_label_block<D: TapeDrive + ?Sized>(
    drive: &mut D,
    context: &str,
) -> Result<LabelBlock> {
    let mut block = [0u8; LABEL_BLOCK_SIZE];
    drive
        .read_exact_block(&mut block, context)
        .map_err(TapeFileError::into_format)?;
    Ok(block)
}

pub(crate) fn read_volume_label<D: TapeDrive + ?Sized>(
    drive: &mut D,
    context: &str,
) -> Result<VolumeLabel> {
    VolumeLabel::from_bytes(&read_label_block(drive, context)?)
}

/// Rewinds with protection off and reads the protection method from VOL1.
pub(crate) fn detect_lbp_method<D: TapeDrive + ?Sized>(
    drive: &mut D,
    context: &str,
) -> Result<LbpMethod> {
    drive.rewind()?;
    drive.disable_logical_block_protection()?;
    let vol1 = read_volume_label(drive, context)?;
    vol1.lbp_method()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn test_lbp_mode_strings() {
        assert_eq!(LbpMode::from_flags(true, true).to_string(), "LBP_On");
        assert_eq!(
            LbpMode::from_flags(false, true).to_string(),
            "LBP_Off_but_present"
        );
        assert_eq!(LbpMode::from_flags(true, false).to_string(), "LBP_Off");
        assert_eq!(LbpMode::from_flags(false, false), LbpMode::Off);
    }

    #[test]
    fn test_lock_release_cycle() {
        let mut lock = SessionLock::default();
        lock.lock().unwrap();
        assert!(matches!(lock.lock(), Err(TapeFileError::SessionAlreadyInUse)));
        lock.release();
        lock.lock().unwrap();
        lock.release();
        assert!(!lock.is_corrupted());
    }

    #[test]
    fn test_release_without_lock_corrupts() {
        let mut lock = SessionLock::default();
        lock.release();
        assert!(lock.is_corrupted());
        assert!(matches!(lock.lock(), Err(TapeFileError::SessionCorrupted)));
    }

    struct FakeSession(RefCell<SessionLock>);

    impl Session for FakeSession {
        fn lock(&self) -> Result<()> {
            self.0.borrow_mut().lock()
        }
        fn release(&self) {
            self.0.borrow_mut().release()
        }
        fn is_locked(&self) -> bool {
            self.0.borrow().is_locked()
        }
        fn is_corrupted(&self) -> bool {
            self.0.borrow().is_corrupted()
        }
        fn set_corrupted(&self) {
            self.0.borrow_mut().set_corrupted()
        }
        fn lbp_mode(&self) -> LbpMode {
            LbpMode::Off
        }
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let session = FakeSession(RefCell::new(SessionLock::default()));
        {
            let _guard = SessionGuard::acquire(&session).unwrap();
            assert!(session.is_locked());
            assert!(SessionGuard::acquire(&session).is_err());
        }
        assert!(!session.is_locked());
        assert!(!session.is_corrupted());

        session.set_corrupted();
        assert!(matches!(
            SessionGuard::acquire(&session),
            Err(TapeFileError::SessionCorrupted)
        ));
    }
}
