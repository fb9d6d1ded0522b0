//! UHL1/UTL1 user label blocks
//!
//! These carry the actual fSeq and block size without truncation, plus the
//! identity of the site, mover host and drive that wrote the file.

use super::{
    block_from_bytes, expect_not_blank, expect_number, expect_text, put_number, put_text,
    raw_text, text, Field, LabelBlock, NumericBase, LABEL_BLOCK_SIZE,
};
use crate::drive::DeviceInfo;
use crate::error::{Result, TapeFileError};
use std::fmt;

const LABEL: Field = Field::new(0, 4);
const ACTUAL_FSEQ: Field = LABEL.next(10);
const ACTUAL_BLOCK_SIZE: Field = ACTUAL_FSEQ.next(10);
const ACTUAL_RECORD_LENGTH: Field = ACTUAL_BLOCK_SIZE.next(10);
const SITE: Field = ACTUAL_RECORD_LENGTH.next(8);
const MOVER_HOST: Field = SITE.next(10);
const DRIVE_VENDOR: Field = MOVER_HOST.next(8);
const DRIVE_MODEL: Field = DRIVE_VENDOR.next(8);
const DRIVE_SERIAL: Field = DRIVE_MODEL.next(12);

/// Values written into a user header or trailer
#[derive(Debug, Clone, Copy)]
pub struct UserLabelFields<'a> {
    pub fseq: u64,
    pub block_size: usize,
    pub site_name: &'a str,
    pub host_name: &'a str,
    pub drive_info: &'a DeviceInfo,
}

fn fill_uhl1_utl1(marker: &str, fields: UserLabelFields<'_>) -> Result<LabelBlock> {
    if fields.site_name.trim().is_empty() || fields.host_name.trim().is_empty() {
        return Err(TapeFileError::invalid_argument(format!(
            "{} needs a site name and a host name",
            marker
        )));
    }
    let mut block = [b' '; LABEL_BLOCK_SIZE];
    put_text(&mut block, LABEL, marker);
    put_number(&mut block, ACTUAL_FSEQ, fields.fseq, NumericBase::Decimal, "fSeq")?;
    put_number(
        &mut block,
        ACTUAL_BLOCK_SIZE,
        fields.block_size as u64,
        NumericBase::Decimal,
        "block size",
    )?;
    put_number(
        &mut block,
        ACTUAL_RECORD_LENGTH,
        fields.block_size as u64,
        NumericBase::Decimal,
        "record length",
    )?;
    put_text(&mut block, SITE, fields.site_name);
    put_text(&mut block, MOVER_HOST, fields.host_name);
    put_text(&mut block, DRIVE_VENDOR, &fields.drive_info.vendor);
    put_text(&mut block, DRIVE_MODEL, &fields.drive_info.product);
    put_text(&mut block, DRIVE_SERIAL, &fields.drive_info.serial_number);
    Ok(block)
}

fn verify_uhl1_utl1(block: &LabelBlock, marker: &str) -> Result<()> {
    expect_text(block, LABEL, marker, marker, "label")?;
    expect_number(block, ACTUAL_FSEQ, NumericBase::Decimal, marker, "actual fSeq")?;
    expect_number(
        block,
        ACTUAL_BLOCK_SIZE,
        NumericBase::Decimal,
        marker,
        "actual block size",
    )?;
    expect_number(
        block,
        ACTUAL_RECORD_LENGTH,
        NumericBase::Decimal,
        marker,
        "actual record length",
    )?;
    expect_not_blank(block, SITE, marker, "site")?;
    expect_not_blank(block, MOVER_HOST, marker, "mover host")?;
    Ok(())
}

/// UHL1: last block of a file header
#[derive(Clone, PartialEq, Eq)]
pub struct UserHeader {
    block: LabelBlock,
}

/// UTL1: last block of a file trailer
#[derive(Clone, PartialEq, Eq)]
pub struct UserTrailer {
    block: LabelBlock,
}

macro_rules! user_label_impl {
    ($ty:ident, $marker:literal) => {
        impl $ty {
            const MARKER: &'static str = $marker;

            pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
                Ok(Self {
                    block: block_from_bytes(bytes, Self::MARKER)?,
                })
            }

            pub fn as_bytes(&self) -> &LabelBlock {
                &self.block
            }

            /// Fills the block. Values that do not fit their field are an
            /// invalid argument rather than being truncated.
            pub fn fill(
                &mut self,
                fseq: u64,
                block_size: usize,
                site_name: &str,
                host_name: &str,
                drive_info: &DeviceInfo,
            ) -> Result<()> {
                self.block = fill_uhl1_utl1(
                    Self::MARKER,
                    UserLabelFields {
                        fseq,
                        block_size,
                        site_name,
                        host_name,
                        drive_info,
                    },
                )?;
                Ok(())
            }

            pub fn verify(&self) -> Result<()> {
                verify_uhl1_utl1(&self.block, Self::MARKER)
            }

            /// Raw fSeq field, zero padding included
            pub fn fseq_field(&self) -> String {
                raw_text(&self.block, ACTUAL_FSEQ)
            }

            pub fn fseq(&self) -> Result<u64> {
                expect_number(
                    &self.block,
                    ACTUAL_FSEQ,
                    NumericBase::Decimal,
                    Self::MARKER,
                    "actual fSeq",
                )
            }

            pub fn block_size(&self) -> Result<u64> {
                expect_number(
                    &self.block,
                    ACTUAL_BLOCK_SIZE,
                    NumericBase::Decimal,
                    Self::MARKER,
                    "actual block size",
                )
            }

            pub fn site_name(&self) -> String {
                text(&self.block, SITE)
            }

            pub fn host_name(&self) -> String {
                text(&self.block, MOVER_HOST)
            }

            pub fn drive_vendor(&self) -> String {
                text(&self.block, DRIVE_VENDOR)
            }

            pub fn drive_model(&self) -> String {
                text(&self.block, DRIVE_MODEL)
            }

            pub fn drive_serial(&self) -> String {
                text(&self.block, DRIVE_SERIAL)
            }
        }

        impl Default for $ty {
            fn default() -> Self {
                Self {
                    block: [0u8; LABEL_BLOCK_SIZE],
                }
            }
        }

        impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($ty))
                    .field("raw", &String::from_utf8_lossy(&self.block))
                    .finish()
            }
        }
    };
}

user_label_impl!(UserHeader, "UHL1");
user_label_impl!(UserTrailer, "UTL1");
