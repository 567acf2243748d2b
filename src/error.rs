use std::fmt;
use std::io;
use std::result;

/// A column type, as named in error messages and problem reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Logical,
    Integer,
    Double,
    NumberWithGrouping,
    Time,
    Date,
    DateTime,
    Character,
    Factor,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            ColumnType::Logical => "logical",
            ColumnType::Integer => "integer",
            ColumnType::Double => "double",
            ColumnType::NumberWithGrouping => "number",
            ColumnType::Time => "time",
            ColumnType::Date => "date",
            ColumnType::DateTime => "datetime",
            ColumnType::Character => "character",
            ColumnType::Factor => "factor",
        };

        write!(f, "{}", name)
    }
}

#[derive(Debug)]
enum ErrorKind {
    DelimiterUnknown,
    MalformedQuote {
        offset: u64,
    },
    UnterminatedQuote {
        offset: u64,
    },
    ColumnCountMismatch {
        row: u64,
        expected: usize,
        found: usize,
    },
    ParseFailure {
        row: u64,
        col: usize,
        expected_type: ColumnType,
        bytes: Vec<u8>,
    },
    UnknownColumn {
        name: String,
    },
    SchemaMismatch {
        file: String,
        expected_cols: usize,
        found_cols: usize,
    },
    Io(io::Error),
    Codec(String),
    Cancelled,
}

/// The crate's single error type.
///
/// Mirrors the hand-rolled, allocation-light style used throughout this
/// crate: a private [`ErrorKind`] wrapped by an opaque public newtype, with
/// no `Box<dyn Error>` indirection.
#[derive(Debug)]
pub struct Error(ErrorKind);

impl Error {
    pub(crate) fn delimiter_unknown() -> Self {
        Error(ErrorKind::DelimiterUnknown)
    }

    pub(crate) fn malformed_quote(offset: u64) -> Self {
        Error(ErrorKind::MalformedQuote { offset })
    }

    pub(crate) fn unterminated_quote(offset: u64) -> Self {
        Error(ErrorKind::UnterminatedQuote { offset })
    }

    pub(crate) fn column_count_mismatch(row: u64, expected: usize, found: usize) -> Self {
        Error(ErrorKind::ColumnCountMismatch {
            row,
            expected,
            found,
        })
    }

    pub(crate) fn parse_failure(
        row: u64,
        col: usize,
        expected_type: ColumnType,
        bytes: &[u8],
    ) -> Self {
        Error(ErrorKind::ParseFailure {
            row,
            col,
            expected_type,
            bytes: bytes.to_vec(),
        })
    }

    pub(crate) fn unknown_column(name: impl Into<String>) -> Self {
        Error(ErrorKind::UnknownColumn { name: name.into() })
    }

    pub(crate) fn schema_mismatch(
        file: impl Into<String>,
        expected_cols: usize,
        found_cols: usize,
    ) -> Self {
        Error(ErrorKind::SchemaMismatch {
            file: file.into(),
            expected_cols,
            found_cols,
        })
    }

    pub(crate) fn codec(message: impl Into<String>) -> Self {
        Error(ErrorKind::Codec(message.into()))
    }

    pub(crate) fn cancelled() -> Self {
        Error(ErrorKind::Cancelled)
    }

    /// Whether this error is a per-cell/per-row warning that a caller could
    /// choose to tolerate rather than aborting the whole read.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self.0,
            ErrorKind::ColumnCountMismatch { .. } | ErrorKind::ParseFailure { .. }
        )
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error(ErrorKind::Io(err))
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err.0 {
            ErrorKind::Io(inner) => inner,
            other => io::Error::new(io::ErrorKind::InvalidData, other.to_string()),
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ErrorKind::DelimiterUnknown => {
                write!(f, "could not guess the delimiter from the sample")
            }
            ErrorKind::MalformedQuote { offset } => {
                write!(f, "malformed quote at byte offset {}", offset)
            }
            ErrorKind::UnterminatedQuote { offset } => {
                write!(f, "unterminated quote starting at byte offset {}", offset)
            }
            ErrorKind::ColumnCountMismatch {
                row,
                expected,
                found,
            } => write!(
                f,
                "row {} has {} columns, expected {}",
                row, found, expected
            ),
            ErrorKind::ParseFailure {
                row,
                col,
                expected_type,
                bytes,
            } => write!(
                f,
                "could not parse {:?} as {} at row {}, column {}",
                String::from_utf8_lossy(bytes),
                expected_type,
                row,
                col
            ),
            ErrorKind::UnknownColumn { name } => write!(f, "unknown column {:?}", name),
            ErrorKind::SchemaMismatch {
                file,
                expected_cols,
                found_cols,
            } => write!(
                f,
                "{} has {} columns, expected {} to match the rest of the file set",
                file, found_cols, expected_cols
            ),
            ErrorKind::Io(err) => write!(f, "{}", err),
            ErrorKind::Codec(message) => write!(f, "{}", message),
            ErrorKind::Cancelled => write!(f, "operation was cancelled"),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.0 {
            ErrorKind::Io(err) => Some(err),
            _ => None,
        }
    }
}

pub type Result<T> = result::Result<T, Error>;

/// One recorded per-cell or per-row deviation encountered while building a
/// table. Structural errors abort the call; these are attached to the
/// resulting table instead, ordered by `(row, col)`.
#[derive(Debug, Clone)]
pub struct Problem {
    pub row: u64,
    pub col: usize,
    pub kind: ProblemKind,
}

#[derive(Debug, Clone)]
pub enum ProblemKind {
    ColumnCountMismatch { expected: usize, found: usize },
    ParseFailure {
        expected_type: ColumnType,
        bytes: Vec<u8>,
    },
}
