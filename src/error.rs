use std::path::PathBuf;

/// Errors that abort a whole run. These are raised by the loaders, writers and
/// configuration before or after evaluation, never by a single record.
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("source file not found: {0}")]
    SourceNotFound(PathBuf),
    #[error("missing required columns: {}", .0.join(", "))]
    Schema(Vec<String>),
    #[error("no file name")]
    NoFileName,
    #[error("invalid file name")]
    InvalidFileName,
    #[error("No file extension")]
    NoFileExtension,
    #[error("unsupported file type: {0}")]
    UnsupportedFileType(String),
    #[error("empty input file")]
    EmptyFile,
    #[error("line {line} has {found} fields, expected {expected}")]
    FieldCountMismatch {
        line: usize,
        found: usize,
        expected: usize,
    },
    #[error("significance level {0} must be between 0 and 1")]
    InvalidAlpha(f64),
    #[error("invalid value {value:?} for {name}")]
    InvalidConfig { name: &'static str, value: String },
    #[error("unsupported regression type: {0}")]
    UnsupportedRegressionType(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cbor error: {0}")]
    Cbor(#[from] serde_cbor::Error),
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("xlsx read error: {0}")]
    XlsxRead(#[from] calamine::XlsxError),
    #[error("xlsx write error: {0}")]
    XlsxWrite(#[from] rust_xlsxwriter::XlsxError),
    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),
    #[error("thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Errors local to one record. The batch processor turns these into error outcomes so
/// that they never reach sibling records.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RecordError {
    #[error("{0}")]
    InvalidInput(String),
    #[error("missing field {0}")]
    MissingField(&'static str),
    #[error("regression type must be 'simple' or 'multiple', got {0:?}")]
    UnsupportedRegressionType(String),
    #[error("cannot read {field}: {reason}")]
    FieldCoercion { field: &'static str, reason: String },
}

impl RecordError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RecordError::InvalidInput(_) => ErrorKind::InvalidInput,
            RecordError::MissingField(_) => ErrorKind::MissingField,
            RecordError::UnsupportedRegressionType(_) => ErrorKind::UnsupportedRegressionType,
            RecordError::FieldCoercion { .. } => ErrorKind::FieldCoercion,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum ErrorKind {
    #[serde(rename = "InvalidInputError")]
    InvalidInput,
    #[serde(rename = "MissingFieldError")]
    MissingField,
    #[serde(rename = "UnsupportedRegressionTypeError")]
    UnsupportedRegressionType,
    #[serde(rename = "FieldCoercionError")]
    FieldCoercion,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "InvalidInputError",
            ErrorKind::MissingField => "MissingFieldError",
            ErrorKind::UnsupportedRegressionType => "UnsupportedRegressionTypeError",
            ErrorKind::FieldCoercion => "FieldCoercionError",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.pad(self.as_str())
    }
}
