use serde::{Deserialize, Serialize};

use crate::CellValue;

/// Excel-compatible maximum rows per worksheet (1,048,576).
pub const EXCEL_MAX_ROWS: u32 = 1_048_576;

/// Excel-compatible maximum columns per worksheet (16,384).
pub const EXCEL_MAX_COLS: u32 = 16_384;

/// A single cell record.
///
/// Cells are stored sparsely: a cell with no value, no formula and the default
/// style is removed from the worksheet map.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Cell {
    #[serde(default)]
    pub value: CellValue,

    /// Formula text without the leading `=`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,

    /// Cell format (`xf`) index as found in the source document.
    #[serde(default)]
    pub style_id: u32,
}

impl Cell {
    pub fn new(value: CellValue) -> Self {
        Self {
            value,
            ..Self::default()
        }
    }

    /// A cell counts as "used" once it has a value or a formula; formatting alone does not.
    pub fn has_content(&self) -> bool {
        !self.value.is_empty() || self.formula.is_some()
    }

    pub fn is_truly_empty(&self) -> bool {
        !self.has_content() && self.style_id == 0
    }
}
