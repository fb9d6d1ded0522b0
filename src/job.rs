//! Job and volume descriptors handed to the tape file layer

use crate::error::{Result, TapeFileError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Way a file is located on tape before reading it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositioningMethod {
    /// Count file marks from the current file
    ByFSeq,
    /// Locate directly to the block id recorded at write time
    ByBlock,
}

/// Label format of a mounted volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum LabelFormat {
    #[default]
    Cta,
    Osm,
    Enstore,
    EnstoreLarge,
}

impl fmt::Display for LabelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LabelFormat::Cta => "CTA",
            LabelFormat::Osm => "OSM",
            LabelFormat::Enstore => "Enstore",
            LabelFormat::EnstoreLarge => "EnstoreLarge",
        };
        f.write_str(name)
    }
}

/// Mounted volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeInfo {
    pub vid: String,
    #[serde(default)]
    pub label_format: LabelFormat,
}

impl VolumeInfo {
    pub fn new(vid: impl Into<String>) -> Self {
        Self {
            vid: vid.into(),
            label_format: LabelFormat::Cta,
        }
    }

    /// Rejects volumes the sessions cannot handle: an empty VID or a
    /// label format other than CTA.
    pub(crate) fn validate(&self) -> Result<()> {
        if self.vid.trim().is_empty() {
            return Err(TapeFileError::invalid_argument("Volume ID cannot be empty"));
        }
        if self.label_format != LabelFormat::Cta {
            return Err(TapeFileError::unsupported(format!(
                "{} label format on volume {}",
                self.label_format, self.vid
            )));
        }
        Ok(())
    }
}

/// File to be written to tape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveJob {
    pub archive_file_id: u64,
    pub fseq: u64,
    pub file_size: u64,
}

/// File to be read back from tape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrieveJob {
    pub archive_file_id: u64,
    pub fseq: u64,
    /// Logical object id of the file's HDR1, as recorded by the writer
    pub block_id: u64,
    pub positioning: PositioningMethod,
    pub file_size: u64,
}

impl RetrieveJob {
    pub fn by_fseq(archive_file_id: u64, fseq: u64) -> Self {
        Self {
            archive_file_id,
            fseq,
            block_id: 0,
            positioning: PositioningMethod::ByFSeq,
            file_size: 0,
        }
    }

    pub fn by_block(archive_file_id: u64, fseq: u64, block_id: u64) -> Self {
        Self {
            archive_file_id,
            fseq,
            block_id,
            positioning: PositioningMethod::ByBlock,
            file_size: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_volume_validation() {
        VolumeInfo::new("K00001").validate().unwrap();

        let err = VolumeInfo::new("").validate().unwrap_err();
        assert!(matches!(err, TapeFileError::InvalidArgument(_)));

        let osm = VolumeInfo {
            vid: "K00001".to_string(),
            label_format: LabelFormat::Osm,
        };
        assert!(matches!(
            osm.validate().unwrap_err(),
            TapeFileError::Unsupported(_)
        ));
    }

    #[test]
    fn test_retrieve_job_constructors() {
        let job = RetrieveJob::by_block(0x2A, 3, 17);
        assert_eq!(job.positioning, PositioningMethod::ByBlock);
        assert_eq!(job.block_id, 17);
        assert_eq!(RetrieveJob::by_fseq(1, 1).positioning, PositioningMethod::ByFSeq);
    }
}
