//! `sheetlog-model` defines the in-memory grid the log sink appends to.
//!
//! The model is deliberately small: one workbook holds an ordered list of
//! worksheets, each worksheet is a sparse map of cells. Persistence lives in
//! `sheetlog-xlsx`; the sink only talks to these types.

mod address;
mod cell;
mod date_system;
mod error;
mod value;
mod workbook;
mod worksheet;

pub use address::{A1ParseError, CellRef, Range};
pub use cell::{Cell, EXCEL_MAX_COLS, EXCEL_MAX_ROWS};
pub use date_system::DateSystem;
pub use error::ErrorValue;
pub use value::{CellType, CellValue};
pub use workbook::Workbook;
pub use worksheet::{Worksheet, WorksheetError};
