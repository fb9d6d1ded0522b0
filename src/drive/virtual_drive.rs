//! In-memory emulated tape drive
//!
//! Keeps the tape as a sequence of blocks and file marks with one head
//! position. Writing anywhere discards everything after the head, as on a
//! real linear tape. Logical block protection is emulated with CRC32C kept
//! alongside each block written in read-write protection mode.

use super::{DeviceInfo, DriveProtection, TapeDrive, TapePosition};
use crate::error::{Result, TapeFileError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};

const IMAGE_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
enum TapeObject {
    Block { data: Vec<u8>, crc: Option<u32> },
    FileMark,
}

/// Serialized form of a tape image
#[derive(Debug, Serialize, Deserialize)]
struct TapeImage {
    version: u32,
    write_protected: bool,
    device: DeviceInfo,
    objects: Vec<ImageObject>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum ImageObject {
    Block {
        data: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        crc32c: Option<u32>,
    },
    FileMark,
}

pub struct VirtualDrive {
    objects: Vec<TapeObject>,
    head: usize,
    protection: DriveProtection,
    write_protected: bool,
    loaded: bool,
    device: DeviceInfo,
}

impl Default for VirtualDrive {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualDrive {
    /// Creates a drive with a blank tape loaded.
    pub fn new() -> Self {
        Self::with_device_info(DeviceInfo {
            vendor: "VIRTUAL".to_string(),
            product: "VDRIVE".to_string(),
            product_revision: "0001".to_string(),
            serial_number: "VD0000000001".to_string(),
            supports_lbp: true,
        })
    }

    pub fn with_device_info(device: DeviceInfo) -> Self {
        Self {
            objects: Vec::new(),
            head: 0,
            protection: DriveProtection::Disabled,
            write_protected: false,
            loaded: true,
            device,
        }
    }

    pub fn set_write_protected(&mut self, write_protected: bool) {
        self.write_protected = write_protected;
    }

    pub fn protection(&self) -> DriveProtection {
        self.protection
    }

    /// Number of objects (blocks and file marks) on the tape
    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// Size of the largest data block on the tape
    pub fn largest_block(&self) -> usize {
        self.objects
            .iter()
            .map(|object| match object {
                TapeObject::Block { data, .. } => data.len(),
                TapeObject::FileMark => 0,
            })
            .max()
            .unwrap_or(0)
    }

    /// Loads a cartridge previously unloaded with [`TapeDrive::unload_tape`].
    pub fn load_tape(&mut self) {
        self.loaded = true;
        self.head = 0;
    }

    /// Flips one byte of the block at `index` without touching its CRC.
    pub fn corrupt_block(&mut self, index: usize) -> Result<()> {
        match self.objects.get_mut(index) {
            Some(TapeObject::Block { data, .. }) if !data.is_empty() => {
                data[0] ^= 0xFF;
                Ok(())
            }
            _ => Err(TapeFileError::invalid_argument(format!(
                "No data block at logical object {}",
                index
            ))),
        }
    }

    /// Saves the tape content as a JSON image.
    pub fn save(&self, path: &Path) -> Result<()> {
        let image = TapeImage {
            version: IMAGE_VERSION,
            write_protected: self.write_protected,
            device: self.device.clone(),
            objects: self
                .objects
                .iter()
                .map(|object| match object {
                    TapeObject::Block { data, crc } => ImageObject::Block {
                        data: hex::encode(data),
                        crc32c: *crc,
                    },
                    TapeObject::FileMark => ImageObject::FileMark,
                })
                .collect(),
        };
        let json = serde_json::to_string_pretty(&image)
            .map_err(|e| TapeFileError::media(format!("Failed to serialize tape image: {}", e)))?;
        std::fs::write(path, json)?;
        debug!("Saved tape image {:?} ({} objects)", path, self.objects.len());
        Ok(())
    }

    /// Loads a JSON tape image, positioned at the beginning of tape.
    pub fn open(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let image: TapeImage = serde_json::from_str(&json)
            .map_err(|e| TapeFileError::media(format!("Unable to parse tape image {:?}: {}", path, e)))?;
        if image.version != IMAGE_VERSION {
            return Err(TapeFileError::media(format!(
                "Unsupported tape image version {} in {:?}",
                image.version, path
            )));
        }
        let objects = image
            .objects
            .into_iter()
            .map(|object| match object {
                ImageObject::Block { data, crc32c } => hex::decode(&data)
                    .map(|data| TapeObject::Block { data, crc: crc32c })
                    .map_err(|e| TapeFileError::media(format!("Corrupted block in tape image: {}", e))),
                ImageObject::FileMark => Ok(TapeObject::FileMark),
            })
            .collect::<Result<Vec<_>>>()?;
        info!("Loaded tape image {:?} ({} objects)", path, objects.len());
        let mut drive = Self::with_device_info(image.device);
        drive.objects = objects;
        drive.write_protected = image.write_protected;
        Ok(drive)
    }

    fn ensure_loaded(&self) -> Result<()> {
        if !self.loaded {
            return Err(TapeFileError::media("No tape loaded in drive"));
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_loaded()?;
        if self.write_protected {
            return Err(TapeFileError::WriteProtected);
        }
        Ok(())
    }

    fn append(&mut self, object: TapeObject) {
        self.objects.truncate(self.head);
        self.objects.push(object);
        self.head += 1;
    }

    /// Consumes the next object; blocks come back with their protection checked.
    fn next_object(&mut self, context: &str) -> Result<Option<Vec<u8>>> {
        self.ensure_loaded()?;
        let object = self
            .objects
            .get(self.head)
            .ok_or_else(|| TapeFileError::end_of_data(context.to_string()))?;
        let result = match object {
            TapeObject::FileMark => None,
            TapeObject::Block { data, crc } => {
                if self.protection.checks_on_read() {
                    if let Some(expected) = crc {
                        let actual = crc32c::crc32c(data);
                        if actual != *expected {
                            warn!(
                                "CRC32C mismatch at logical object {}: expected {:08X}, got {:08X}",
                                self.head, expected, actual
                            );
                            return Err(TapeFileError::media(format!(
                                "{}: failed checksum verification at logical object {}",
                                context, self.head
                            )));
                        }
                    }
                }
                Some(data.clone())
            }
        };
        self.head += 1;
        Ok(result)
    }

    fn file_marks_before(&self, index: usize) -> u64 {
        self.objects[..index.min(self.objects.len())]
            .iter()
            .filter(|o| matches!(o, TapeObject::FileMark))
            .count() as u64
    }
}

impl TapeDrive for VirtualDrive {
    fn device_info(&mut self) -> Result<DeviceInfo> {
        Ok(self.device.clone())
    }

    fn position(&mut self) -> Result<TapePosition> {
        self.ensure_loaded()?;
        Ok(TapePosition {
            block_number: self.head as u64,
            file_number: self.file_marks_before(self.head),
            end_of_data: self.head >= self.objects.len(),
            beginning_of_partition: self.head == 0,
        })
    }

    fn position_to_logical_object(&mut self, block_id: u64) -> Result<()> {
        self.ensure_loaded()?;
        debug!("Locating to logical object {}", block_id);
        let target = usize::try_from(block_id)
            .map_err(|_| TapeFileError::invalid_argument(format!("Block id {} out of range", block_id)))?;
        if target > self.objects.len() {
            self.head = self.objects.len();
            return Err(TapeFileError::end_of_data(format!(
                "Locate to logical object {} beyond end of data ({})",
                block_id,
                self.objects.len()
            )));
        }
        self.head = target;
        Ok(())
    }

    fn rewind(&mut self) -> Result<()> {
        self.ensure_loaded()?;
        self.head = 0;
        Ok(())
    }

    fn space_file_marks_forward(&mut self, count: u64) -> Result<()> {
        self.ensure_loaded()?;
        debug!("Spacing {} file marks forward from {}", count, self.head);
        let mut remaining = count;
        while remaining > 0 {
            match self.objects.get(self.head) {
                None => {
                    return Err(TapeFileError::end_of_data(format!(
                        "Spacing {} file marks forward, {} still to go",
                        count, remaining
                    )))
                }
                Some(TapeObject::FileMark) => remaining -= 1,
                Some(TapeObject::Block { .. }) => {}
            }
            self.head += 1;
        }
        Ok(())
    }

    fn space_file_marks_backwards(&mut self, count: u64) -> Result<()> {
        self.ensure_loaded()?;
        debug!("Spacing {} file marks backwards from {}", count, self.head);
        let mut remaining = count;
        while remaining > 0 {
            if self.head == 0 {
                return Err(TapeFileError::media(format!(
                    "Beginning of tape reached spacing {} file marks backwards",
                    count
                )));
            }
            self.head -= 1;
            if matches!(self.objects.get(self.head), Some(TapeObject::FileMark)) {
                remaining -= 1;
            }
        }
        Ok(())
    }

    fn write_block(&mut self, data: &[u8]) -> Result<()> {
        self.ensure_writable()?;
        let crc = self
            .protection
            .protects_on_write()
            .then(|| crc32c::crc32c(data));
        self.append(TapeObject::Block {
            data: data.to_vec(),
            crc,
        });
        Ok(())
    }

    fn write_immediate_file_marks(&mut self, count: u32) -> Result<()> {
        self.ensure_writable()?;
        for _ in 0..count {
            self.append(TapeObject::FileMark);
        }
        Ok(())
    }

    fn write_sync_file_marks(&mut self, count: u32) -> Result<()> {
        self.write_immediate_file_marks(count)
    }

    fn read_block(&mut self, buffer: &mut [u8]) -> Result<usize> {
        match self.next_object("read_block")? {
            None => Ok(0),
            Some(data) => {
                if data.len() > buffer.len() {
                    return Err(TapeFileError::media(format!(
                        "Block of {} bytes does not fit a {} bytes buffer",
                        data.len(),
                        buffer.len()
                    )));
                }
                buffer[..data.len()].copy_from_slice(&data);
                Ok(data.len())
            }
        }
    }

    fn read_exact_block(&mut self, buffer: &mut [u8], context: &str) -> Result<()> {
        let data = self.next_object(context)?.unwrap_or_default();
        if data.len() != buffer.len() {
            return Err(TapeFileError::UnexpectedSize {
                context: context.to_string(),
                expected: buffer.len(),
                actual: data.len(),
            });
        }
        buffer.copy_from_slice(&data);
        Ok(())
    }

    fn read_file_mark(&mut self, context: &str) -> Result<()> {
        match self.next_object(context)? {
            None => Ok(()),
            Some(_) => Err(TapeFileError::not_a_file_mark(context.to_string())),
        }
    }

    fn is_tape_blank(&mut self) -> Result<bool> {
        self.ensure_loaded()?;
        Ok(self.objects.is_empty())
    }

    fn is_write_protected(&mut self) -> Result<bool> {
        self.ensure_loaded()?;
        Ok(self.write_protected)
    }

    fn disable_logical_block_protection(&mut self) -> Result<()> {
        self.protection = DriveProtection::Disabled;
        Ok(())
    }

    fn enable_crc32c_logical_block_protection_read_only(&mut self) -> Result<()> {
        self.enable_protection(DriveProtection::Crc32cReadOnly)
    }

    fn enable_crc32c_logical_block_protection_read_write(&mut self) -> Result<()> {
        self.enable_protection(DriveProtection::Crc32cReadWrite)
    }

    fn unload_tape(&mut self) -> Result<()> {
        self.ensure_loaded()?;
        self.loaded = false;
        self.head = 0;
        info!("Tape unloaded");
        Ok(())
    }

    fn wait_until_ready(&mut self, timeout: Duration) -> Result<()> {
        if !self.loaded {
            return Err(TapeFileError::media(format!(
                "Drive not ready after {:?}: no tape loaded",
                timeout
            )));
        }
        Ok(())
    }
}

impl VirtualDrive {
    fn enable_protection(&mut self, protection: DriveProtection) -> Result<()> {
        if !self.device.supports_lbp {
            return Err(TapeFileError::unsupported(format!(
                "Drive {} does not support logical block protection",
                self.device
            )));
        }
        self.protection = protection;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blank_tape() {
        let mut drive = VirtualDrive::new();
        assert!(drive.is_tape_blank().unwrap());
        let mut buf = [0u8; 80];
        let err = drive.read_exact_block(&mut buf, "Reading VOL1").unwrap_err();
        assert!(matches!(err, TapeFileError::EndOfData(_)));
    }

    #[test]
    fn test_write_truncates_after_head() {
        let mut drive = VirtualDrive::new();
        drive.write_block(b"one").unwrap();
        drive.write_block(b"two").unwrap();
        drive.write_immediate_file_marks(1).unwrap();
        assert_eq!(drive.largest_block(), 3);
        drive.position_to_logical_object(1).unwrap();
        drive.write_block(b"TWO").unwrap();
        assert_eq!(drive.object_count(), 2);

        drive.rewind().unwrap();
        let mut buf = [0u8; 3];
        drive.read_exact_block(&mut buf, "first").unwrap();
        assert_eq!(&buf, b"one");
        drive.read_exact_block(&mut buf, "second").unwrap();
        assert_eq!(&buf, b"TWO");
    }

    #[test]
    fn test_read_block_returns_zero_on_file_mark() {
        let mut drive = VirtualDrive::new();
        drive.write_block(b"payload").unwrap();
        drive.write_immediate_file_marks(1).unwrap();
        drive.rewind().unwrap();
        let mut buf = [0u8; 16];
        assert_eq!(drive.read_block(&mut buf).unwrap(), 7);
        assert_eq!(drive.read_block(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_read_exact_block_size_mismatch() {
        let mut drive = VirtualDrive::new();
        drive.write_block(b"short").unwrap();
        drive.rewind().unwrap();
        let mut buf = [0u8; 80];
        let err = drive.read_exact_block(&mut buf, "Reading HDR1").unwrap_err();
        assert!(matches!(
            err,
            TapeFileError::UnexpectedSize {
                expected: 80,
                actual: 5,
                ..
            }
        ));
    }

    #[test]
    fn test_space_file_marks() {
        let mut drive = VirtualDrive::new();
        for _ in 0..3 {
            drive.write_block(b"a").unwrap();
            drive.write_immediate_file_marks(1).unwrap();
        }
        drive.rewind().unwrap();
        drive.space_file_marks_forward(2).unwrap();
        assert_eq!(drive.position().unwrap().block_number, 4);
        assert_eq!(drive.position().unwrap().file_number, 2);

        drive.space_file_marks_backwards(1).unwrap();
        assert_eq!(drive.position().unwrap().block_number, 3);
        drive.read_file_mark("file mark before block 4").unwrap();

        assert!(drive.space_file_marks_forward(5).is_err());
        assert!(drive.position().unwrap().end_of_data);
    }

    #[test]
    fn test_read_file_mark_on_block() {
        let mut drive = VirtualDrive::new();
        drive.write_block(b"a").unwrap();
        drive.rewind().unwrap();
        let err = drive.read_file_mark("expecting mark").unwrap_err();
        assert!(matches!(err, TapeFileError::NotAFileMark(_)));
    }

    #[test]
    fn test_crc32c_protection_detects_corruption() {
        let mut drive = VirtualDrive::new();
        drive.enable_crc32c_logical_block_protection_read_write().unwrap();
        drive.write_block(b"protected").unwrap();
        drive.corrupt_block(0).unwrap();

        drive.rewind().unwrap();
        let mut buf = [0u8; 9];
        let err = drive.read_exact_block(&mut buf, "protected read").unwrap_err();
        assert!(matches!(err, TapeFileError::Media(_)));

        drive.disable_logical_block_protection().unwrap();
        drive.rewind().unwrap();
        drive.read_exact_block(&mut buf, "unprotected read").unwrap();
    }

    #[test]
    fn test_lbp_unsupported_drive() {
        let mut drive = VirtualDrive::with_device_info(DeviceInfo::default());
        assert!(drive
            .enable_crc32c_logical_block_protection_read_only()
            .is_err());
    }

    #[test]
    fn test_write_protected() {
        let mut drive = VirtualDrive::new();
        drive.set_write_protected(true);
        assert!(drive.is_write_protected().unwrap());
        assert!(matches!(
            drive.write_block(b"x"),
            Err(TapeFileError::WriteProtected)
        ));
    }

    #[test]
    fn test_unload_and_wait_until_ready() {
        let mut drive = VirtualDrive::new();
        drive.wait_until_ready(Duration::from_secs(1)).unwrap();
        drive.unload_tape().unwrap();
        assert!(drive.wait_until_ready(Duration::from_secs(1)).is_err());
        assert!(drive.rewind().is_err());
        drive.load_tape();
        drive.rewind().unwrap();
    }

    #[test]
    fn test_image_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tape.json");

        let mut drive = VirtualDrive::new();
        drive.enable_crc32c_logical_block_protection_read_write().unwrap();
        drive.write_block(b"hello").unwrap();
        drive.write_immediate_file_marks(1).unwrap();
        drive.save(&path).unwrap();

        let mut reopened = VirtualDrive::open(&path).unwrap();
        assert_eq!(reopened.object_count(), 2);
        reopened
            .enable_crc32c_logical_block_protection_read_only()
            .unwrap();
        let mut buf = [0u8; 5];
        reopened.read_exact_block(&mut buf, "image block").unwrap();
        assert_eq!(&buf, b"hello");
        reopened.read_file_mark("image mark").unwrap();
    }
}
