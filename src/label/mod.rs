//! Fixed-width tape label blocks
//!
//! Every label block is exactly [`LABEL_BLOCK_SIZE`] bytes of ASCII. Text
//! fields are left-justified and space-padded, numeric fields are
//! right-justified and zero-padded in the base declared for the field.
//! The block types only share the field codec functions below; each one owns
//! its own layout table.

use crate::error::{Result, TapeFileError};
use chrono::{Datelike, NaiveDate};

pub mod file;
pub mod user;
pub mod volume;

pub use file::{FileHeader, FileHeader2, FileTrailer, FileTrailer2};
pub use user::{UserHeader, UserTrailer};
pub use volume::{LbpMethod, VolumeLabel};

/// Size in bytes of every label block on tape
pub const LABEL_BLOCK_SIZE: usize = 80;

/// Raw bytes of one label block
pub type LabelBlock = [u8; LABEL_BLOCK_SIZE];

/// Maximum length of a volume serial number
pub const VSN_LENGTH: usize = 6;

/// Base in which a numeric label field is written
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericBase {
    Octal,
    Decimal,
    Hexadecimal,
}

impl NumericBase {
    pub fn radix(self) -> u32 {
        match self {
            NumericBase::Octal => 8,
            NumericBase::Decimal => 10,
            NumericBase::Hexadecimal => 16,
        }
    }

    fn render(self, value: u64, width: usize) -> String {
        match self {
            NumericBase::Octal => format!("{:0width$o}", value, width = width),
            NumericBase::Decimal => format!("{:0width$}", value, width = width),
            NumericBase::Hexadecimal => format!("{:0width$X}", value, width = width),
        }
    }
}

/// Position of a field inside a label block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Field {
    pub offset: usize,
    pub len: usize,
}

impl Field {
    pub(crate) const fn new(offset: usize, len: usize) -> Self {
        Self { offset, len }
    }

    /// Field starting right after `self`
    pub(crate) const fn next(self, len: usize) -> Self {
        Self {
            offset: self.offset + self.len,
            len,
        }
    }

    fn range(self) -> std::ops::Range<usize> {
        self.offset..self.offset + self.len
    }
}

/// Writes `value` left-justified and space-padded, truncated to the field width.
/// Non-ASCII characters are replaced with `?`.
pub(crate) fn put_text(block: &mut LabelBlock, field: Field, value: &str) {
    let dst = &mut block[field.range()];
    dst.fill(b' ');
    for (slot, byte) in dst.iter_mut().zip(value.bytes()) {
        *slot = if byte.is_ascii() && !byte.is_ascii_control() {
            byte
        } else {
            b'?'
        };
    }
}

/// Writes `value` right-justified and zero-padded. Values that do not fit the
/// field are an invalid argument.
pub(crate) fn put_number(
    block: &mut LabelBlock,
    field: Field,
    value: u64,
    base: NumericBase,
    what: &str,
) -> Result<()> {
    let rendered = base.render(value, field.len);
    if rendered.len() > field.len {
        return Err(TapeFileError::invalid_argument(format!(
            "{} value {} does not fit a {}-character field",
            what, value, field.len
        )));
    }
    block[field.range()].copy_from_slice(rendered.as_bytes());
    Ok(())
}

/// Writes `value` modulo the decimal capacity of the field.
pub(crate) fn put_decimal_wrapping(block: &mut LabelBlock, field: Field, value: u64) {
    let modulus = 10u64.pow(field.len as u32);
    let rendered = NumericBase::Decimal.render(value % modulus, field.len);
    block[field.range()].copy_from_slice(rendered.as_bytes());
}

/// Raw field content, padding included
pub(crate) fn raw_text(block: &LabelBlock, field: Field) -> String {
    String::from_utf8_lossy(&block[field.range()]).into_owned()
}

/// Field content with the trailing space padding removed
pub(crate) fn text(block: &LabelBlock, field: Field) -> String {
    raw_text(block, field).trim_end().to_string()
}

/// Checks a field holds exactly `expected` (after padding).
pub(crate) fn expect_text(
    block: &LabelBlock,
    field: Field,
    expected: &str,
    label: &str,
    what: &str,
) -> Result<()> {
    let mut wanted: LabelBlock = [b' '; LABEL_BLOCK_SIZE];
    put_text(&mut wanted, field, expected);
    if block[field.range()] != wanted[field.range()] {
        return Err(TapeFileError::format(format!(
            "Failed verify for the {} of {}: expected \"{}\", found \"{}\"",
            what,
            label,
            expected,
            raw_text(block, field)
        )));
    }
    Ok(())
}

/// Checks a text field is not all spaces.
pub(crate) fn expect_not_blank(
    block: &LabelBlock,
    field: Field,
    label: &str,
    what: &str,
) -> Result<()> {
    if block[field.range()].iter().all(|b| *b == b' ') {
        return Err(TapeFileError::format(format!(
            "Failed verify for the {} of {}: field is empty",
            what, label
        )));
    }
    Ok(())
}

/// Parses a numeric field in which every character must be a digit of `base`.
pub(crate) fn expect_number(
    block: &LabelBlock,
    field: Field,
    base: NumericBase,
    label: &str,
    what: &str,
) -> Result<u64> {
    let raw = raw_text(block, field);
    u64::from_str_radix(&raw, base.radix())
        .ok()
        .filter(|_| raw.bytes().all(|b| (b as char).is_digit(base.radix())))
        .ok_or_else(|| {
            TapeFileError::format(format!(
                "Failed verify for the {} of {}: \"{}\" is not a base {} number",
                what,
                label,
                raw,
                base.radix()
            ))
        })
}

/// Compares a padded textual field with an expected value.
///
/// Surrounding spaces are ignored; a field holding anything but digits of
/// `base` never matches.
pub fn numeric_field_matches(field: &str, value: u64, base: NumericBase) -> bool {
    let digits = field.trim();
    if !digits.chars().all(|c| c.is_digit(base.radix())) {
        return false;
    }
    u64::from_str_radix(digits, base.radix())
        .map(|parsed| parsed == value)
        .unwrap_or(false)
}

/// Renders a date as the six-character `cyyddd` label date, where `c` is a
/// space for the 1900s and `0` from 2000 on.
pub(crate) fn label_date(date: NaiveDate) -> String {
    let century = if date.year() >= 2000 { '0' } else { ' ' };
    format!(
        "{}{:02}{:03}",
        century,
        date.year().rem_euclid(100),
        date.ordinal()
    )
}

pub(crate) fn expect_label_date(
    block: &LabelBlock,
    field: Field,
    label: &str,
    what: &str,
) -> Result<()> {
    let raw = &block[field.range()];
    let century_ok = raw[0] == b' ' || raw[0] == b'0';
    if !century_ok || !raw[1..].iter().all(u8::is_ascii_digit) {
        return Err(TapeFileError::format(format!(
            "Failed verify for the {} of {}: \"{}\" is not a cyyddd date",
            what,
            label,
            raw_text(block, field)
        )));
    }
    Ok(())
}

pub(crate) fn block_from_bytes(bytes: &[u8], label: &str) -> Result<LabelBlock> {
    bytes.try_into().map_err(|_| {
        TapeFileError::format(format!(
            "{} block must be {} bytes, got {}",
            label,
            LABEL_BLOCK_SIZE,
            bytes.len()
        ))
    })
}

/// Checks a volume serial number can be written into a label.
pub(crate) fn validate_vsn(vsn: &str) -> Result<()> {
    if vsn.is_empty() || vsn.trim().is_empty() {
        return Err(TapeFileError::invalid_argument("VSN cannot be empty"));
    }
    if vsn.len() > VSN_LENGTH || !vsn.is_ascii() {
        return Err(TapeFileError::invalid_argument(format!(
            "VSN \"{}\" must be at most {} ASCII characters",
            vsn, VSN_LENGTH
        )));
    }
    Ok(())
}

/// Archive file id as written into HDR1/EOF1: uppercase hex, no prefix
pub fn file_id_hex(archive_file_id: u64) -> String {
    format!("{:X}", archive_file_id)
}
