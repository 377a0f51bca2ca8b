use crate::{DateSystem, Worksheet};

/// An ordered collection of worksheets.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Workbook {
    sheets: Vec<Worksheet>,
    pub date_system: DateSystem,
}

impl Workbook {
    pub fn new() -> Self {
        Self::default()
    }

    /// A workbook holding one empty worksheet named `name`.
    pub fn with_sheet(name: impl Into<String>) -> Self {
        let mut workbook = Self::new();
        workbook.add_sheet(name);
        workbook
    }

    /// Append a worksheet and return its 1-based position.
    pub fn add_sheet(&mut self, name: impl Into<String>) -> usize {
        self.sheets.push(Worksheet::new(name));
        self.sheets.len()
    }

    /// Worksheet by 1-based position.
    pub fn sheet(&self, position: usize) -> Option<&Worksheet> {
        self.sheets.get(position.checked_sub(1)?)
    }

    pub fn sheet_mut(&mut self, position: usize) -> Option<&mut Worksheet> {
        self.sheets.get_mut(position.checked_sub(1)?)
    }

    pub fn sheets(&self) -> &[Worksheet] {
        &self.sheets
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.len()
    }
}

impl AsRef<Workbook> for Workbook {
    fn as_ref(&self) -> &Workbook {
        self
    }
}

impl AsMut<Workbook> for Workbook {
    fn as_mut(&mut self) -> &mut Workbook {
        self
    }
}
