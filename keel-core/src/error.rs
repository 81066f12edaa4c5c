use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    #[error("Type error: {0}")]
    Type(String),

    #[error("Invalid data type: expected {expected}, got {actual}")]
    InvalidDataType { expected: String, actual: String },

    #[error("Shape error: {0}")]
    Shape(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Execution error: {0}")]
    Execution(String),
}

/// Coarse classification of an [`Error`], for callers that only care about
/// which family of failure occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Schema,
    Type,
    NotFound,
    Shape,
    InvalidArgument,
    InvalidOperation,
    Configuration,
    Execution,
    Io,
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Io(_) => ErrorKind::Io,
            Error::Schema(_) => ErrorKind::Schema,
            Error::ColumnNotFound(_) => ErrorKind::NotFound,
            Error::Type(_) | Error::InvalidDataType { .. } => ErrorKind::Type,
            Error::Shape(_) => ErrorKind::Shape,
            Error::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Error::InvalidOperation(_) => ErrorKind::InvalidOperation,
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::Execution(_) => ErrorKind::Execution,
        }
    }

    pub fn data_type(expected: impl ToString, actual: impl ToString) -> Self {
        Error::InvalidDataType {
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kind() {
        assert_eq!(Error::ColumnNotFound("a".into()).kind(), ErrorKind::NotFound);
        assert_eq!(Error::data_type("Int64", "Utf8").kind(), ErrorKind::Type);
        assert_eq!(Error::Shape("empty keys".into()).kind(), ErrorKind::Shape);
    }

    #[test]
    fn test_error_display() {
        let err = Error::data_type("Int64", "Utf8");
        assert_eq!(err.to_string(), "Invalid data type: expected Int64, got Utf8");
        assert_eq!(
            Error::ColumnNotFound("price".into()).to_string(),
            "Column not found: price"
        );
    }
}
