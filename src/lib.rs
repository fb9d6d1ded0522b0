//! tapefile
//!
//! Reads and writes files on labelled magnetic tapes. Each file is framed by
//! ANSI-style 80-byte header and trailer labels, and a volume carries a VOL1
//! label recording its VID and logical block protection method.

pub mod config;
pub mod drive;
pub mod error;
pub mod file;
pub mod header_checker;
pub mod job;
pub mod label;
pub mod logger;
pub mod session;
pub mod utils;


// Re-export key types for easier use
pub use drive::{TapeDrive, VirtualDrive};
pub use error::{Result, TapeFileError};
pub use file::{BlockRead, FileReader, FileWriter};
pub use job::{ArchiveJob, LabelFormat, PositioningMethod, RetrieveJob, VolumeInfo};
pub use session::{LabelSession, LbpMode, ReadSession, Session, SiteIdentity, WriteSession};
