//! XLSX persistence for the sheetlog worksheet model.
//!
//! Only worksheet 1 is materialized into a [`sheetlog_model::Workbook`]; every
//! other package part (further sheets, drawings, custom XML, themes) is carried
//! through a load/save cycle untouched. On save only the rows that changed are
//! re-serialized, so template formatting on untouched rows survives verbatim.

mod document;
mod openxml;
mod package;
mod read;
mod shared_strings;
mod styles;
mod write;

pub use document::{load_from_bytes, load_from_path, XlsxDocument};
pub use openxml::{parse_relationships, rels_part_name, resolve_target, Relationship};
pub use package::{XlsxError, XlsxPackage, MAX_XLSX_PACKAGE_PART_BYTES};
pub use styles::{classify_format_code, NumberFormatKind};
