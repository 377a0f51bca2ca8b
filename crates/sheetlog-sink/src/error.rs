use std::path::PathBuf;

use sheetlog_model::WorksheetError;
use sheetlog_xlsx::XlsxError;
use thiserror::Error;

/// A broken sink setup; reported when the sink is built, never per batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("destination file name template must not be blank")]
    BlankFileName,
    #[error("output template must not be blank")]
    BlankOutputTemplate,
    #[error("template mode needs a seed document path")]
    BlankSeedPath,
    #[error("batch size limit must be at least 1")]
    ZeroBatchSize,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DestinationError {
    #[error("destination template `{template}` rendered to an empty name")]
    Empty { template: String },
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Xlsx(#[from] XlsxError),
    #[error("no document at {0}")]
    NotFound(PathBuf),
    #[error("{path}: {message}")]
    Rejected { path: PathBuf, message: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("schema has no columns")]
    Empty,
}

/// Why one event's row could not be written.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowError {
    #[error("row {row} column {column} is outside the worksheet")]
    OutOfGrid { row: u32, column: u32 },
    #[error(transparent)]
    Worksheet(#[from] WorksheetError),
}

/// Why a whole destination was dropped for one batch.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("cannot create directory for {path}: {source}")]
    ParentDir {
        path: PathBuf,
        #[source]
        source: StoreError,
    },
    #[error("cannot create document for {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: StoreError,
    },
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: StoreError,
    },
    #[error("cannot save {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: StoreError,
    },
    #[error("seed document {seed} for {path} does not exist")]
    MissingSeed { path: PathBuf, seed: PathBuf },
    #[error("{path} has no first worksheet")]
    NoWorksheet { path: PathBuf },
    #[error("cannot resolve columns for {path}: {source}")]
    Schema {
        path: PathBuf,
        #[source]
        source: SchemaError,
    },
    #[error("cannot write header row of {path}: {source}")]
    Header {
        path: PathBuf,
        #[source]
        source: RowError,
    },
}
