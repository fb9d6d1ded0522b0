//! VOL1 volume label

use super::{
    block_from_bytes, expect_not_blank, expect_text, put_number, put_text, raw_text, text,
    validate_vsn, Field, LabelBlock, NumericBase, LABEL_BLOCK_SIZE,
};
use crate::error::{Result, TapeFileError};
use serde::{Deserialize, Serialize};
use std::fmt;

const MARKER: &str = "VOL1";
const IMPLEMENTATION_ID: &str = "CASTOR";
const OWNER_ID: &str = "CASTOR";
const LABEL_STANDARD: &str = "3";

const LABEL: Field = Field::new(0, 4);
const VSN: Field = LABEL.next(6);
const ACCESSIBILITY: Field = VSN.next(1);
const RESERVED1: Field = ACCESSIBILITY.next(13);
const IMPL_ID: Field = RESERVED1.next(13);
const OWNER: Field = IMPL_ID.next(14);
const RESERVED2: Field = OWNER.next(26);
const LBP_METHOD: Field = RESERVED2.next(2);
const STANDARD: Field = LBP_METHOD.next(1);

/// Logical block protection method recorded in the volume label
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LbpMethod {
    /// No protection
    Disabled,
    /// Reed-Solomon CRC as specified in ECMA-319
    ReedSolomon,
    /// CRC32C (iSCSI polynomial)
    Crc32c,
}

impl LbpMethod {
    pub fn code(self) -> u8 {
        match self {
            LbpMethod::Disabled => 0x00,
            LbpMethod::ReedSolomon => 0x01,
            LbpMethod::Crc32c => 0x02,
        }
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0x00 => Ok(LbpMethod::Disabled),
            0x01 => Ok(LbpMethod::ReedSolomon),
            0x02 => Ok(LbpMethod::Crc32c),
            other => Err(TapeFileError::invalid_argument(format!(
                "Unknown LBP method code 0x{:02X}",
                other
            ))),
        }
    }
}

impl fmt::Display for LbpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LbpMethod::Disabled => write!(f, "none"),
            LbpMethod::ReedSolomon => write!(f, "reed-solomon"),
            LbpMethod::Crc32c => write!(f, "crc32c"),
        }
    }
}

/// The VOL1 block at the very beginning of the tape
#[derive(Clone, PartialEq, Eq)]
pub struct VolumeLabel {
    block: LabelBlock,
}

impl Default for VolumeLabel {
    fn default() -> Self {
        Self {
            block: [0u8; LABEL_BLOCK_SIZE],
        }
    }
}

impl VolumeLabel {
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            block: block_from_bytes(bytes, MARKER)?,
        })
    }

    pub fn as_bytes(&self) -> &LabelBlock {
        &self.block
    }

    pub fn fill(&mut self, vsn: &str, lbp_method: LbpMethod) -> Result<()> {
        validate_vsn(vsn)?;
        let mut block = [b' '; LABEL_BLOCK_SIZE];
        put_text(&mut block, LABEL, MARKER);
        put_text(&mut block, VSN, vsn);
        put_text(&mut block, ACCESSIBILITY, " ");
        put_text(&mut block, IMPL_ID, IMPLEMENTATION_ID);
        put_text(&mut block, OWNER, OWNER_ID);
        put_number(
            &mut block,
            LBP_METHOD,
            lbp_method.code() as u64,
            NumericBase::Hexadecimal,
            "LBP method",
        )?;
        put_text(&mut block, STANDARD, LABEL_STANDARD);
        self.block = block;
        Ok(())
    }

    pub fn verify(&self) -> Result<()> {
        expect_text(&self.block, LABEL, MARKER, MARKER, "label")?;
        expect_not_blank(&self.block, VSN, MARKER, "VSN")?;
        expect_text(&self.block, ACCESSIBILITY, " ", MARKER, "accessibility")?;
        expect_text(&self.block, OWNER, OWNER_ID, MARKER, "owner id")?;
        expect_text(&self.block, STANDARD, LABEL_STANDARD, MARKER, "label standard")?;
        Ok(())
    }

    pub fn vsn(&self) -> String {
        text(&self.block, VSN)
    }

    /// Decodes the two-character hex LBP code.
    pub fn lbp_method(&self) -> Result<LbpMethod> {
        let raw = raw_text(&self.block, LBP_METHOD);
        let code = u8::from_str_radix(raw.trim(), 16).map_err(|_| {
            TapeFileError::invalid_argument(format!("Malformed LBP method code \"{}\"", raw))
        })?;
        LbpMethod::from_code(code)
    }
}

impl fmt::Debug for VolumeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VolumeLabel")
            .field("raw", &String::from_utf8_lossy(&self.block))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fill_and_verify() {
        let mut vol1 = VolumeLabel::default();
        vol1.fill("K00001", LbpMethod::Crc32c).unwrap();
        vol1.verify().unwrap();
        vol1.verify().unwrap();
        assert_eq!(vol1.vsn(), "K00001");
        assert_eq!(vol1.lbp_method().unwrap(), LbpMethod::Crc32c);
        assert_eq!(&vol1.as_bytes()[0..10], b"VOL1K00001");
        assert_eq!(&vol1.as_bytes()[77..80], b"023");
    }

    #[test]
    fn test_layout_is_eighty_bytes() {
        assert_eq!(STANDARD.offset + STANDARD.len, LABEL_BLOCK_SIZE);
    }

    #[test]
    fn test_short_vsn_is_padded() {
        let mut vol1 = VolumeLabel::default();
        vol1.fill("V1", LbpMethod::Disabled).unwrap();
        assert_eq!(&vol1.as_bytes()[4..10], b"V1    ");
        assert_eq!(vol1.vsn(), "V1");
        assert_eq!(vol1.lbp_method().unwrap(), LbpMethod::Disabled);
    }

    #[test]
    fn test_default_block_fails_verify() {
        let err = VolumeLabel::default().verify().unwrap_err();
        assert!(err.is_format());
    }

    #[test]
    fn test_wrong_marker_fails_verify() {
        let mut vol1 = VolumeLabel::default();
        vol1.fill("K00001", LbpMethod::Disabled).unwrap();
        let mut bytes = *vol1.as_bytes();
        bytes[0..4].copy_from_slice(b"HDR1");
        let tampered = VolumeLabel::from_bytes(&bytes).unwrap();
        assert!(tampered.verify().is_err());
    }

    #[test]
    fn test_unknown_lbp_code_is_invalid_argument() {
        let mut vol1 = VolumeLabel::default();
        vol1.fill("K00001", LbpMethod::Disabled).unwrap();
        let mut bytes = *vol1.as_bytes();
        bytes[77..79].copy_from_slice(b"07");
        let odd = VolumeLabel::from_bytes(&bytes).unwrap();
        assert!(matches!(
            odd.lbp_method(),
            Err(TapeFileError::InvalidArgument(_))
        ));
        bytes[77..79].copy_from_slice(b"ZZ");
        let odd = VolumeLabel::from_bytes(&bytes).unwrap();
        assert!(matches!(
            odd.lbp_method(),
            Err(TapeFileError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_fill_rejects_bad_vsn() {
        let mut vol1 = VolumeLabel::default();
        assert!(vol1.fill("", LbpMethod::Disabled).is_err());
        assert!(vol1.fill("K000011", LbpMethod::Disabled).is_err());
    }

    #[test]
    fn test_from_bytes_wrong_length() {
        assert!(VolumeLabel::from_bytes(&[b' '; 79]).is_err());
    }
}
