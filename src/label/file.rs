//! HDR1/EOF1 and HDR2/EOF2 file label blocks
//!
//! The header and trailer of a pair share one layout and differ only in their
//! marker. The fSeq and block count fields are legacy-sized: they only keep
//! the value modulo their decimal width, so readers trust the user labels
//! (UHL1/UTL1) for exact values.

use super::{
    block_from_bytes, expect_label_date, expect_not_blank, expect_number, expect_text,
    label_date, put_decimal_wrapping, put_number, put_text, text, validate_vsn, Field,
    LabelBlock, NumericBase, LABEL_BLOCK_SIZE,
};
use crate::error::{Result, TapeFileError};
use chrono::NaiveDate;
use std::fmt;

/// fSeq values in HDR1/EOF1 wrap at this modulus
pub const FSEQ_MODULUS: u64 = 10_000;
/// Block counts in EOF1 wrap at this modulus
pub const BLOCK_COUNT_MODULUS: u64 = 1_000_000;
/// File id written by the label session in place of an archive file id
pub const PRELABEL_FILE_ID: &str = "PRELABEL";

const SYSTEM_CODE: &str = "CASTOR 2.1.15";

// HDR1 / EOF1
const LABEL: Field = Field::new(0, 4);
const FILE_ID: Field = LABEL.next(17);
const VSN: Field = FILE_ID.next(6);
const FILE_SECTION: Field = VSN.next(4);
const FSEQ: Field = FILE_SECTION.next(4);
const GENERATION: Field = FSEQ.next(4);
const GENERATION_VERSION: Field = GENERATION.next(2);
const CREATION_DATE: Field = GENERATION_VERSION.next(6);
const EXPIRATION_DATE: Field = CREATION_DATE.next(6);
const ACCESSIBILITY: Field = EXPIRATION_DATE.next(1);
const BLOCK_COUNT: Field = ACCESSIBILITY.next(6);
const SYS_CODE: Field = BLOCK_COUNT.next(13);

// HDR2 / EOF2
const RECORD_FORMAT: Field = LABEL.next(1);
const BLOCK_LENGTH: Field = RECORD_FORMAT.next(5);
const RECORD_LENGTH: Field = BLOCK_LENGTH.next(5);
const DENSITY: Field = RECORD_LENGTH.next(1);
const RESERVED_2A: Field = DENSITY.next(18);
const RECORDING_TECHNIQUE: Field = RESERVED_2A.next(2);
const RESERVED_2B: Field = RECORDING_TECHNIQUE.next(14);
const AUL_ID: Field = RESERVED_2B.next(2);

const LENGTH_LIMIT: u64 = 100_000;

struct FileLabelFields<'a> {
    marker: &'a str,
    file_id: &'a str,
    vsn: &'a str,
    fseq: u64,
    block_count: u64,
    date: NaiveDate,
}

fn fill_hdr1_eof1(fields: FileLabelFields<'_>) -> Result<LabelBlock> {
    validate_vsn(fields.vsn)?;
    if fields.file_id.is_empty() {
        return Err(TapeFileError::invalid_argument("File id cannot be empty"));
    }
    let date = label_date(fields.date);
    let mut block = [b' '; LABEL_BLOCK_SIZE];
    put_text(&mut block, LABEL, fields.marker);
    put_text(&mut block, FILE_ID, fields.file_id);
    put_text(&mut block, VSN, fields.vsn);
    put_text(&mut block, FILE_SECTION, "0001");
    put_decimal_wrapping(&mut block, FSEQ, fields.fseq);
    put_text(&mut block, GENERATION, "0001");
    put_text(&mut block, GENERATION_VERSION, "00");
    put_text(&mut block, CREATION_DATE, &date);
    put_text(&mut block, EXPIRATION_DATE, &date);
    put_text(&mut block, ACCESSIBILITY, " ");
    put_decimal_wrapping(&mut block, BLOCK_COUNT, fields.block_count);
    put_text(&mut block, SYS_CODE, SYSTEM_CODE);
    Ok(block)
}

fn verify_hdr1_eof1(block: &LabelBlock, marker: &str) -> Result<()> {
    expect_text(block, LABEL, marker, marker, "label")?;
    expect_not_blank(block, FILE_ID, marker, "file id")?;
    expect_not_blank(block, VSN, marker, "VSN")?;
    expect_text(block, FILE_SECTION, "0001", marker, "file section")?;
    expect_number(block, FSEQ, NumericBase::Decimal, marker, "fSeq")?;
    expect_text(block, GENERATION, "0001", marker, "generation")?;
    expect_text(block, GENERATION_VERSION, "00", marker, "generation version")?;
    expect_label_date(block, CREATION_DATE, marker, "creation date")?;
    expect_label_date(block, EXPIRATION_DATE, marker, "expiration date")?;
    expect_text(block, ACCESSIBILITY, " ", marker, "accessibility")?;
    expect_number(block, BLOCK_COUNT, NumericBase::Decimal, marker, "block count")?;
    Ok(())
}

fn fill_hdr2_eof2(marker: &str, block_size: usize, compression: bool) -> Result<LabelBlock> {
    let length = if (block_size as u64) < LENGTH_LIMIT {
        block_size as u64
    } else {
        0
    };
    let mut block = [b' '; LABEL_BLOCK_SIZE];
    put_text(&mut block, LABEL, marker);
    put_text(&mut block, RECORD_FORMAT, "F");
    put_number(&mut block, BLOCK_LENGTH, length, NumericBase::Decimal, "block length")?;
    put_number(&mut block, RECORD_LENGTH, length, NumericBase::Decimal, "record length")?;
    put_text(&mut block, DENSITY, "2");
    put_text(
        &mut block,
        RECORDING_TECHNIQUE,
        if compression { "P " } else { "  " },
    );
    put_text(&mut block, AUL_ID, "00");
    Ok(block)
}

fn verify_hdr2_eof2(block: &LabelBlock, marker: &str) -> Result<()> {
    expect_text(block, LABEL, marker, marker, "label")?;
    expect_text(block, RECORD_FORMAT, "F", marker, "record format")?;
    expect_number(block, BLOCK_LENGTH, NumericBase::Decimal, marker, "block length")?;
    expect_number(block, RECORD_LENGTH, NumericBase::Decimal, marker, "record length")?;
    expect_text(block, AUL_ID, "00", marker, "AUL id")?;
    Ok(())
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}

/// HDR1: first block of a file header
#[derive(Clone, PartialEq, Eq)]
pub struct FileHeader {
    block: LabelBlock,
}

impl FileHeader {
    const MARKER: &'static str = "HDR1";

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            block: block_from_bytes(bytes, Self::MARKER)?,
        })
    }

    pub fn as_bytes(&self) -> &LabelBlock {
        &self.block
    }

    /// Fills the header. `fseq` is stored modulo [`FSEQ_MODULUS`].
    pub fn fill(&mut self, file_id: &str, vsn: &str, fseq: u64) -> Result<()> {
        self.block = fill_hdr1_eof1(FileLabelFields {
            marker: Self::MARKER,
            file_id,
            vsn,
            fseq,
            block_count: 0,
            date: today(),
        })?;
        Ok(())
    }

    /// Fills the placeholder header written right after a fresh volume label.
    pub fn fill_prelabel(&mut self, vsn: &str) -> Result<()> {
        self.fill(PRELABEL_FILE_ID, vsn, 1)
    }

    pub fn verify(&self) -> Result<()> {
        verify_hdr1_eof1(&self.block, Self::MARKER)
    }

    pub fn file_id(&self) -> String {
        text(&self.block, FILE_ID)
    }

    pub fn vsn(&self) -> String {
        text(&self.block, VSN)
    }

    /// fSeq modulo [`FSEQ_MODULUS`]
    pub fn fseq(&self) -> Result<u64> {
        expect_number(&self.block, FSEQ, NumericBase::Decimal, Self::MARKER, "fSeq")
    }

    pub fn is_prelabel(&self) -> bool {
        self.file_id() == PRELABEL_FILE_ID
    }
}

/// EOF1: first block of a file trailer
#[derive(Clone, PartialEq, Eq)]
pub struct FileTrailer {
    block: LabelBlock,
}

impl FileTrailer {
    const MARKER: &'static str = "EOF1";

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            block: block_from_bytes(bytes, Self::MARKER)?,
        })
    }

    pub fn as_bytes(&self) -> &LabelBlock {
        &self.block
    }

    /// Fills the trailer. `fseq` and `block_count` are stored modulo
    /// [`FSEQ_MODULUS`] and [`BLOCK_COUNT_MODULUS`].
    pub fn fill(&mut self, file_id: &str, vsn: &str, fseq: u64, block_count: u64) -> Result<()> {
        self.block = fill_hdr1_eof1(FileLabelFields {
            marker: Self::MARKER,
            file_id,
            vsn,
            fseq,
            block_count,
            date: today(),
        })?;
        Ok(())
    }

    pub fn verify(&self) -> Result<()> {
        verify_hdr1_eof1(&self.block, Self::MARKER)
    }

    pub fn file_id(&self) -> String {
        text(&self.block, FILE_ID)
    }

    pub fn vsn(&self) -> String {
        text(&self.block, VSN)
    }

    pub fn fseq(&self) -> Result<u64> {
        expect_number(&self.block, FSEQ, NumericBase::Decimal, Self::MARKER, "fSeq")
    }

    pub fn block_count(&self) -> Result<u64> {
        expect_number(
            &self.block,
            BLOCK_COUNT,
            NumericBase::Decimal,
            Self::MARKER,
            "block count",
        )
    }
}

/// HDR2: second block of a file header
#[derive(Clone, PartialEq, Eq)]
pub struct FileHeader2 {
    block: LabelBlock,
}

impl FileHeader2 {
    const MARKER: &'static str = "HDR2";

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            block: block_from_bytes(bytes, Self::MARKER)?,
        })
    }

    pub fn as_bytes(&self) -> &LabelBlock {
        &self.block
    }

    /// Block sizes of 100000 bytes and more are recorded as 0.
    pub fn fill(&mut self, block_size: usize, compression: bool) -> Result<()> {
        self.block = fill_hdr2_eof2(Self::MARKER, block_size, compression)?;
        Ok(())
    }

    pub fn verify(&self) -> Result<()> {
        verify_hdr2_eof2(&self.block, Self::MARKER)
    }

    pub fn block_length(&self) -> Result<u64> {
        expect_number(
            &self.block,
            BLOCK_LENGTH,
            NumericBase::Decimal,
            Self::MARKER,
            "block length",
        )
    }

    pub fn compression(&self) -> bool {
        text(&self.block, RECORDING_TECHNIQUE) == "P"
    }
}

/// EOF2: second block of a file trailer
#[derive(Clone, PartialEq, Eq)]
pub struct FileTrailer2 {
    block: LabelBlock,
}

impl FileTrailer2 {
    const MARKER: &'static str = "EOF2";

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(Self {
            block: block_from_bytes(bytes, Self::MARKER)?,
        })
    }

    pub fn as_bytes(&self) -> &LabelBlock {
        &self.block
    }

    pub fn fill(&mut self, block_size: usize, compression: bool) -> Result<()> {
        self.block = fill_hdr2_eof2(Self::MARKER, block_size, compression)?;
        Ok(())
    }

    pub fn verify(&self) -> Result<()> {
        verify_hdr2_eof2(&self.block, Self::MARKER)
    }

    pub fn block_length(&self) -> Result<u64> {
        expect_number(
            &self.block,
            BLOCK_LENGTH,
            NumericBase::Decimal,
            Self::MARKER,
            "block length",
        )
    }

    pub fn compression(&self) -> bool {
        text(&self.block, RECORDING_TECHNIQUE) == "P"
    }
}

macro_rules! impl_default_and_debug {
    ($($ty:ident),*) => {
        $(
            impl Default for $ty {
                fn default() -> Self {
                    Self { block: [0u8; LABEL_BLOCK_SIZE] }
                }
            }

            impl fmt::Debug for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.debug_struct(stringify!($ty))
                        .field("raw", &String::from_utf8_lossy(&self.block))
                        .finish()
                }
            }
        )*
    };
}

impl_default_and_debug!(FileHeader, FileTrailer, FileHeader2, FileTrailer2);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layouts_are_eighty_bytes() {
        // trailing reserved areas of HDR1 and HDR2
        const RESERVED: Field = SYS_CODE.next(7);
        const RESERVED_2C: Field = AUL_ID.next(28);
        assert_eq!(RESERVED.offset + RESERVED.len, LABEL_BLOCK_SIZE);
        assert_eq!(RESERVED_2C.offset + RESERVED_2C.len, LABEL_BLOCK_SIZE);
    }

    #[test]
    fn test_hdr1_fill_and_verify() {
        let mut hdr1 = FileHeader::default();
        hdr1.fill("1F2E", "K00001", 42).unwrap();
        hdr1.verify().unwrap();
        hdr1.verify().unwrap();
        assert_eq!(hdr1.file_id(), "1F2E");
        assert_eq!(hdr1.vsn(), "K00001");
        assert_eq!(hdr1.fseq().unwrap(), 42);
        assert!(!hdr1.is_prelabel());
        assert_eq!(&hdr1.as_bytes()[0..8], b"HDR11F2E");
    }

    #[test]
    fn test_hdr1_fseq_wraps() {
        let mut hdr1 = FileHeader::default();
        hdr1.fill("A", "K00001", 123_456).unwrap();
        hdr1.verify().unwrap();
        assert_eq!(hdr1.fseq().unwrap(), 123_456 % FSEQ_MODULUS);
    }

    #[test]
    fn test_eof1_block_count_wraps() {
        let mut eof1 = FileTrailer::default();
        eof1.fill("A", "K00001", 10_001, 1_234_567).unwrap();
        eof1.verify().unwrap();
        assert_eq!(eof1.fseq().unwrap(), 1);
        assert_eq!(eof1.block_count().unwrap(), 234_567);
    }

    #[test]
    fn test_header_is_not_a_trailer() {
        let mut hdr1 = FileHeader::default();
        hdr1.fill("A", "K00001", 1).unwrap();
        let as_trailer = FileTrailer::from_bytes(hdr1.as_bytes()).unwrap();
        assert!(as_trailer.verify().is_err());
    }

    #[test]
    fn test_prelabel() {
        let mut hdr1 = FileHeader::default();
        hdr1.fill_prelabel("K00001").unwrap();
        hdr1.verify().unwrap();
        assert!(hdr1.is_prelabel());
        assert_eq!(hdr1.fseq().unwrap(), 1);
    }

    #[test]
    fn test_malformed_fseq_fails_verify() {
        let mut hdr1 = FileHeader::default();
        hdr1.fill("A", "K00001", 7).unwrap();
        let mut bytes = *hdr1.as_bytes();
        bytes[FSEQ.offset] = b'X';
        let bad = FileHeader::from_bytes(&bytes).unwrap();
        assert!(bad.verify().unwrap_err().is_format());
    }

    #[test]
    fn test_hdr2_fill_and_verify() {
        let mut hdr2 = FileHeader2::default();
        hdr2.fill(32_768, true).unwrap();
        hdr2.verify().unwrap();
        assert_eq!(hdr2.block_length().unwrap(), 32_768);
        assert!(hdr2.compression());

        let mut eof2 = FileTrailer2::default();
        eof2.fill(262_144, false).unwrap();
        eof2.verify().unwrap();
        assert_eq!(eof2.block_length().unwrap(), 0);
        assert!(!eof2.compression());
    }

    #[test]
    fn test_fill_rejects_empty_vsn_and_file_id() {
        let mut hdr1 = FileHeader::default();
        assert!(hdr1.fill("A", "", 1).is_err());
        assert!(hdr1.fill("", "K00001", 1).is_err());
    }
}
