use thiserror::Error;

/// How a failure should travel through the pipeline.
///
/// Fatal errors unwind the whole conversion. Recoverable ones may be
/// downgraded to a warning by the caller when the failing structure is
/// optional (extra profiles, maker notes, single malformed tags).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Fatal,
    Recoverable,
}

#[derive(Error, Debug)]
pub enum DngError {
    #[error("Bad format: {0}")]
    BadFormat(String),

    #[error("Memory allocation failed: {0}")]
    MemoryFull(String),

    #[error("Unknown error: {0}")]
    Unknown(String),

    #[error("Operation canceled by user")]
    UserCanceled,

    #[error("Host does not support the requested operation: {0}")]
    HostInsufficient(String),

    #[error("Matrix math error: {0}")]
    MatrixMath(String),

    #[error("Failed to open file: {0}")]
    OpenFile(String),

    #[error("Failed to read file: {0}")]
    ReadFile(String),

    #[error("Failed to write file: {0}")]
    WriteFile(String),

    #[error("Unexpected end of file at offset {0}")]
    EndOfFile(u64),

    #[error("File is damaged: {0}")]
    FileDamaged(String),

    #[error("Failed to decode image data: {0}")]
    Decode(String),

    #[error("Failed to encode image data: {0}")]
    Encode(String),

    #[error("Invalid image dimensions: width={0}, height={1}")]
    InvalidDimensions(usize, usize),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DngError {
    pub fn bad_format(msg: impl Into<String>) -> Self {
        DngError::BadFormat(msg.into())
    }

    pub fn program(msg: impl Into<String>) -> Self {
        DngError::Unknown(msg.into())
    }

    pub fn severity(&self) -> Severity {
        match self {
            DngError::BadFormat(_)
            | DngError::EndOfFile(_)
            | DngError::FileDamaged(_)
            | DngError::MatrixMath(_)
            | DngError::Decode(_) => Severity::Recoverable,
            _ => Severity::Fatal,
        }
    }

    pub fn is_recoverable(&self) -> bool {
        self.severity() == Severity::Recoverable
    }
}

pub type Result<T> = std::result::Result<T, DngError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_is_never_recoverable() {
        assert_eq!(DngError::UserCanceled.severity(), Severity::Fatal);
        assert!(DngError::bad_format("tag 0xC612 count").is_recoverable());
        assert!(!DngError::MemoryFull("stage 3".into()).is_recoverable());
    }
}
