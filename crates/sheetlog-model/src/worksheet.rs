use std::collections::{BTreeMap, BTreeSet};

use thiserror::Error;

use crate::{Cell, CellRef, CellValue, Range};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorksheetError {
    #[error("cell {0:?} is outside the worksheet grid")]
    OutOfBounds(CellRef),
}

/// A sparse grid of cells.
///
/// Every mutation records the touched row so persistence layers can rewrite
/// only the rows that changed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Worksheet {
    name: String,
    cells: BTreeMap<CellRef, Cell>,
    dirty_rows: BTreeSet<u32>,
}

static EMPTY: CellValue = CellValue::Empty;

impl Worksheet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cell(&self, cell: CellRef) -> Option<&Cell> {
        self.cells.get(&cell)
    }

    pub fn value(&self, cell: CellRef) -> &CellValue {
        self.cells.get(&cell).map_or(&EMPTY, |c| &c.value)
    }

    pub fn formula(&self, cell: CellRef) -> Option<&str> {
        self.cells.get(&cell).and_then(|c| c.formula.as_deref())
    }

    /// Replace a cell's value, keeping its formatting and dropping any formula.
    pub fn set_value(&mut self, cell: CellRef, value: CellValue) -> Result<(), WorksheetError> {
        self.update(cell, |c| {
            c.value = value;
            c.formula = None;
        })
    }

    /// Store a formula (leading `=` is accepted and dropped); the cached value is cleared.
    pub fn set_formula(&mut self, cell: CellRef, formula: &str) -> Result<(), WorksheetError> {
        let formula = formula.trim();
        let formula = formula.strip_prefix('=').unwrap_or(formula).to_string();
        self.update(cell, |c| {
            c.value = CellValue::Empty;
            c.formula = Some(formula);
        })
    }

    /// Insert a fully-formed cell, as loaded from a document.
    pub fn set_cell(&mut self, at: CellRef, cell: Cell) -> Result<(), WorksheetError> {
        self.update(at, |c| *c = cell)
    }

    fn update(
        &mut self,
        at: CellRef,
        f: impl FnOnce(&mut Cell),
    ) -> Result<(), WorksheetError> {
        if !at.in_bounds() {
            return Err(WorksheetError::OutOfBounds(at));
        }
        let cell = self.cells.entry(at).or_default();
        f(cell);
        if cell.is_truly_empty() {
            self.cells.remove(&at);
        }
        self.dirty_rows.insert(at.row);
        Ok(())
    }

    /// Number of the last row holding a value or formula (1-based; `0` when empty).
    pub fn last_row_number(&self) -> u32 {
        self.cells
            .iter()
            .rev()
            .find(|(_, cell)| cell.has_content())
            .map_or(0, |(at, _)| at.row_number())
    }

    /// Number of the last column holding a value or formula (1-based; `0` when empty).
    pub fn last_column_number(&self) -> u32 {
        self.cells
            .iter()
            .filter(|(_, cell)| cell.has_content())
            .map(|(at, _)| at.column_number())
            .max()
            .unwrap_or(0)
    }

    /// Bounding box of every stored cell, formatting-only cells included.
    pub fn used_range(&self) -> Option<Range> {
        let mut iter = self.cells.keys();
        let first = *iter.next()?;
        let mut range = Range::new(first, first);
        for at in iter {
            range.extend_to(*at);
        }
        Some(range)
    }

    /// Cells in row-major order.
    pub fn iter_cells(&self) -> impl Iterator<Item = (CellRef, &Cell)> {
        self.cells.iter().map(|(at, cell)| (*at, cell))
    }

    /// Cells of one 0-indexed row, left to right.
    pub fn row_cells(&self, row: u32) -> impl Iterator<Item = (CellRef, &Cell)> {
        self.cells
            .range(CellRef::new(row, 0)..CellRef::new(row + 1, 0))
            .map(|(at, cell)| (*at, cell))
    }

    /// 0-indexed rows mutated since the last [`Worksheet::mark_clean`].
    pub fn dirty_rows(&self) -> &BTreeSet<u32> {
        &self.dirty_rows
    }

    pub fn mark_clean(&mut self) {
        self.dirty_rows.clear();
    }
}
