//! File handles bound to a tape session
//!
//! On tape each file is laid out as
//! `HDR1 HDR2 UHL1 FM <payload blocks> FM EOF1 EOF2 UTL1 FM`.

pub mod reader;
pub mod writer;

pub use reader::FileReader;
pub use writer::FileWriter;

/// Outcome of reading one payload block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockRead {
    /// A block of the given length was copied into the buffer
    Data(usize),
    /// The payload is exhausted and the trailer has been checked
    EndOfFile,
}
