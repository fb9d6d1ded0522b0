use serde::{Deserialize, Serialize};
use std::fmt;

/// Drive identity, as returned by INQUIRY and stamped into user labels
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub vendor: String,
    pub product: String,
    pub product_revision: String,
    pub serial_number: String,
    /// Drive supports logical block protection (protection information)
    #[serde(default)]
    pub supports_lbp: bool,
}

impl fmt::Display for DeviceInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} (rev {}, serial {})",
            self.vendor, self.product, self.product_revision, self.serial_number
        )
    }
}

/// Tape position information
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TapePosition {
    /// Logical object identifier of the next object under the head.
    /// Blocks and file marks both count.
    pub block_number: u64,
    /// Number of file marks between the beginning of tape and the head
    pub file_number: u64,
    pub end_of_data: bool,
    pub beginning_of_partition: bool,
}

/// Logical block protection setting of the drive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriveProtection {
    #[default]
    Disabled,
    /// CRC32C checked on read only
    Crc32cReadOnly,
    /// CRC32C generated on write and checked on read
    Crc32cReadWrite,
}

impl DriveProtection {
    pub fn checks_on_read(self) -> bool {
        !matches!(self, DriveProtection::Disabled)
    }

    pub fn protects_on_write(self) -> bool {
        matches!(self, DriveProtection::Crc32cReadWrite)
    }
}
