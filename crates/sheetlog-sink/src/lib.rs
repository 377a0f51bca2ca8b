//! Append structured log events to spreadsheet documents.
//!
//! Each batch is split by destination (a file path rendered from the event),
//! every destination gets a column schema (derived from the output layout, or
//! read from directives in row 2 of a seed workbook), and the events become
//! rows appended below whatever the worksheet already holds.
//!
//! ```no_run
//! use sheetlog_sink::{SinkOptions, SpreadsheetSink, XlsxStore};
//! use sheetlog_template::{Level, LogEvent};
//!
//! let options = SinkOptions::default()
//!     .with_file_name("logs/{Timestamp:%Y-%m-%d}.xlsx")
//!     .with_output_template("{Message}");
//! let mut sink = SpreadsheetSink::new(options, XlsxStore::new())?;
//!
//! let events = vec![LogEvent::new(Level::Information, "{Id},{Name}").with_args([1, 2])];
//! let report = sink.process_batch(&events);
//! assert_eq!(report.rows_written(), 1);
//! # Ok::<(), sheetlog_sink::ConfigError>(())
//! ```

mod append;
mod batching;
mod cache;
mod coerce;
mod config;
mod destination;
mod error;
mod renderer;
mod schema;
mod sink;
mod store;

pub use append::{append_rows, instantiate_formula, strip_quotes, write_header, AppendOutcome};
pub use batching::{BatchingOptions, BatchingSink};
pub use cache::{CacheStats, SchemaCache};
pub use coerce::{coerce, parse_duration};
pub use config::{
    Naming, SchemaMode, SeedSource, SinkOptions, SinkSettings, DEFAULT_FILE_NAME,
    DEFAULT_OUTPUT_TEMPLATE,
};
pub use destination::{DestinationResolver, GroupedBatch};
pub use error::{ConfigError, DestinationError, RowError, SchemaError, SinkError, StoreError};
pub use renderer::{FieldRenderer, TemplateRenderer};
pub use schema::{
    parse_directive, resolve_auto, resolve_from_template, CoercionType, ColumnSource,
    ColumnSpec, Directive, FixedField, Schema, DIRECTIVE_ROW,
};
pub use sink::{BatchReport, DestinationReport, SpreadsheetSink};
pub use store::{first_sheet, first_sheet_mut, DocumentStore, MemoryStore, XlsxStore};
