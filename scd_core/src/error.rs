use std::io;

use thiserror::Error;

/// Everything that can go wrong while compressing or decompressing a container.
///
/// `NegativeCompression` and `UnsupportedBitDepth` are outcomes rather than
/// faults: the caller keeps the original file and reports a distinct status.
#[derive(Error, Debug)]
pub enum ScdError {
    #[error("format error: {0}")]
    Format(String),

    #[error("unexpected error or eof while reading the input stream")]
    UnexpectedEof,

    #[error("compression would not shrink the data ({compressed} >= {raw} bytes)")]
    NegativeCompression { raw: u64, compressed: u64 },

    #[error("unsupported BITPIX {0}; only 16-bit images are pixel-coded")]
    UnsupportedBitDepth(i64),

    #[error("I/O error: {0}")]
    Io(io::Error),
}

impl ScdError {
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }
}

impl From<io::Error> for ScdError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::UnexpectedEof
        } else {
            Self::Io(err)
        }
    }
}

pub type Result<T> = std::result::Result<T, ScdError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn io_eof_maps_to_unexpected_eof() {
        let err: ScdError = io::Error::new(io::ErrorKind::UnexpectedEof, "short read").into();
        assert!(matches!(err, ScdError::UnexpectedEof));

        let err: ScdError = io::Error::new(io::ErrorKind::PermissionDenied, "nope").into();
        assert!(matches!(err, ScdError::Io(_)));
    }

    #[test]
    fn negative_compression_message_names_sizes() {
        let err = ScdError::NegativeCompression {
            raw: 100,
            compressed: 120,
        };
        let msg = err.to_string();
        assert!(msg.contains("120"), "{msg}");
        assert!(msg.contains("100"), "{msg}");
    }
}
