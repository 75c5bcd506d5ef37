use thiserror::Error;

/// The broad class a [`RopeError`] belongs to.
///
/// Outside code usually only needs this to decide which exception to raise.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ArgumentInvalid,
    Overflow,
    EncodingBroken,
    NativeCapacity,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RopeError {
    #[error("range {offset}+{length} out of bounds for byte length {byte_length}")]
    OutOfBounds {
        offset: usize,
        length: usize,
        byte_length: usize,
    },

    #[error("index {index} out of bounds (limit {limit})")]
    IndexOutOfBounds { index: usize, limit: usize },

    #[error("unknown encoding: {name}")]
    UnknownEncoding { name: String },

    #[error("byte length overflow: {lhs} and {rhs} exceed the limit of {limit} bytes")]
    Overflow { lhs: usize, rhs: usize, limit: usize },

    #[error("invalid byte sequence in {encoding} at offset {offset}")]
    InvalidByteSequence { encoding: &'static str, offset: usize },

    #[error("incomplete character in {encoding} at offset {offset}: {needed} more byte(s) needed")]
    IncompleteCharacter {
        encoding: &'static str,
        offset: usize,
        needed: usize,
    },

    #[error("requested byte length {requested} exceeds native capacity {capacity}")]
    NativeCapacity { requested: usize, capacity: usize },

    #[error("configuration was already installed or read")]
    ConfigLocked,
}

impl RopeError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RopeError::OutOfBounds { .. }
            | RopeError::IndexOutOfBounds { .. }
            | RopeError::UnknownEncoding { .. }
            | RopeError::ConfigLocked => ErrorKind::ArgumentInvalid,
            RopeError::Overflow { .. } => ErrorKind::Overflow,
            RopeError::InvalidByteSequence { .. } | RopeError::IncompleteCharacter { .. } => {
                ErrorKind::EncodingBroken
            }
            RopeError::NativeCapacity { .. } => ErrorKind::NativeCapacity,
        }
    }
}

pub type Result<T, E = RopeError> = std::result::Result<T, E>;
