use thiserror::Error;

pub type Result<T> = std::result::Result<T, TapeFileError>;

#[derive(Error, Debug)]
pub enum TapeFileError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// On-tape bytes do not parse or do not match what the job expects.
    #[error("Tape format error: {0}")]
    Format(String),

    #[error("Tape media error: {0}")]
    Media(String),

    #[error("Reached end of data: {0}")]
    EndOfData(String),

    #[error("Unexpected block size: {context} (expected {expected} bytes, got {actual})")]
    UnexpectedSize {
        context: String,
        expected: usize,
        actual: usize,
    },

    #[error("Expected a file mark: {0}")]
    NotAFileMark(String),

    #[error("Tape is write protected")]
    WriteProtected,

    #[error("Session already in use")]
    SessionAlreadyInUse,

    #[error("Session corrupted")]
    SessionCorrupted,

    #[error("End of file reached")]
    EndOfFile,

    #[error("Trying to close a file twice")]
    FileClosedTwice,

    #[error("Trying to write a file with size 0")]
    ZeroFileWritten,

    #[error("Trying to label a non-empty tape without the \"force\" setting")]
    TapeNotEmpty,

    #[error("Unsupported positioning mode or format: {0}")]
    Unsupported(String),

    #[error("Wrong block size: expected {expected} bytes, got {actual}")]
    WrongBlockSize { expected: usize, actual: usize },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Wrong fSeq sequence: last written fSeq {last_written}, got {requested}")]
    FSeqSequence { last_written: u64, requested: u64 },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Generic error: {0}")]
    Generic(#[from] anyhow::Error),
}

impl TapeFileError {
    pub fn format<T: Into<String>>(msg: T) -> Self {
        Self::Format(msg.into())
    }

    pub fn media<T: Into<String>>(msg: T) -> Self {
        Self::Media(msg.into())
    }

    pub fn end_of_data<T: Into<String>>(context: T) -> Self {
        Self::EndOfData(context.into())
    }

    pub fn not_a_file_mark<T: Into<String>>(context: T) -> Self {
        Self::NotAFileMark(context.into())
    }

    pub fn unsupported<T: Into<String>>(msg: T) -> Self {
        Self::Unsupported(msg.into())
    }

    pub fn invalid_argument<T: Into<String>>(msg: T) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }

    /// True for errors meaning the bytes on tape are not what was expected.
    pub fn is_format(&self) -> bool {
        matches!(
            self,
            Self::Format(_) | Self::UnexpectedSize { .. } | Self::NotAFileMark(_)
        )
    }

    /// True for errors after which the tape position can no longer be trusted.
    pub fn is_fatal_for_session(&self) -> bool {
        matches!(
            self,
            Self::Media(_) | Self::SessionCorrupted | Self::FileClosedTwice | Self::ZeroFileWritten
        )
    }

    /// Re-wraps low level read errors as format errors, keeping the rest as-is.
    pub(crate) fn into_format(self) -> Self {
        match self {
            Self::UnexpectedSize { .. } | Self::NotAFileMark(_) | Self::EndOfData(_) => {
                Self::Format(self.to_string())
            }
            other => other,
        }
    }
}
