use std::io;

use thiserror::Error;

/// Stream-level failures of a conversion.
///
/// Anomalies of single entities (open ways, dangling node references,
/// degenerate rings) are never reported through this type; they are counted in
/// [`Stats`](crate::Stats) and excluded from the output.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or truncated input bytes
    #[error("malformed input at byte {offset}: {reason}")]
    Format { offset: u64, reason: String },

    /// Input is not one of the accepted OSM serializations
    #[error("unsupported input format: {0}")]
    UnsupportedFormat(String),

    /// Writing to the output sink failed; partial output is unusable
    #[error("failed to write GeoJSON: {0}")]
    Serialization(#[source] io::Error),

    /// Reading the input failed for a reason other than truncation
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    pub fn format(offset: u64, reason: impl Into<String>) -> Self {
        Self::Format {
            offset,
            reason: reason.into(),
        }
    }

    /// Maps an error of reading the input at `offset`.
    ///
    /// Running out of bytes in the middle of a structure is a format error,
    /// everything else is passed through as I/O error.
    pub(crate) fn from_read(offset: u64, e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            Self::format(offset, "unexpected end of input")
        } else {
            Self::Io(e)
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
