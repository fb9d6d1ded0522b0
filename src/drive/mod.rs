//! Tape drive capability interface
//!
//! Sessions drive the tape exclusively through [`TapeDrive`]. The trait is
//! synchronous: every call may block on real hardware for as long as the
//! operation takes (rewind and spacing can take minutes).

use crate::error::Result;
use std::time::Duration;

pub mod types;
pub mod virtual_drive;

pub use types::{DeviceInfo, DriveProtection, TapePosition};
pub use virtual_drive::VirtualDrive;

pub trait TapeDrive {
    fn device_info(&mut self) -> Result<DeviceInfo>;

    fn position(&mut self) -> Result<TapePosition>;

    /// LOCATE to a logical object (block or file mark) identifier.
    fn position_to_logical_object(&mut self, block_id: u64) -> Result<()>;

    fn rewind(&mut self) -> Result<()>;

    /// Moves forward past `count` file marks, leaving the head on their EOT side.
    fn space_file_marks_forward(&mut self, count: u64) -> Result<()>;

    /// Moves backward past `count` file marks, leaving the head on the BOT side
    /// of the last one crossed.
    fn space_file_marks_backwards(&mut self, count: u64) -> Result<()>;

    fn write_block(&mut self, data: &[u8]) -> Result<()>;

    /// Writes file marks without flushing the drive buffer.
    fn write_immediate_file_marks(&mut self, count: u32) -> Result<()>;

    /// Writes file marks and flushes the drive buffer to the medium.
    fn write_sync_file_marks(&mut self, count: u32) -> Result<()>;

    /// Reads the next block into `buffer` and returns its length.
    /// Returns 0 when a file mark is read.
    fn read_block(&mut self, buffer: &mut [u8]) -> Result<usize>;

    /// Reads the next block, which must be exactly `buffer.len()` bytes long.
    fn read_exact_block(&mut self, buffer: &mut [u8], context: &str) -> Result<()>;

    /// Reads the next object, which must be a file mark.
    fn read_file_mark(&mut self, context: &str) -> Result<()>;

    fn is_tape_blank(&mut self) -> Result<bool>;

    fn is_write_protected(&mut self) -> Result<bool>;

    fn disable_logical_block_protection(&mut self) -> Result<()>;

    fn enable_crc32c_logical_block_protection_read_only(&mut self) -> Result<()>;

    fn enable_crc32c_logical_block_protection_read_write(&mut self) -> Result<()>;

    fn unload_tape(&mut self) -> Result<()>;

    fn wait_until_ready(&mut self, timeout: Duration) -> Result<()>;
}
