use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use sheetlog_model::{Workbook, Worksheet};
use sheetlog_xlsx::XlsxDocument;

use crate::StoreError;

/// Name given to worksheet 1 of documents the sink creates.
const FIRST_SHEET_NAME: &str = "Sheet1";

/// File-backed (or fake) documents the sink appends to.
///
/// Documents are plain owned values: whoever holds one has exclusive access and
/// dropping it releases it.
pub trait DocumentStore {
    type Document: AsRef<Workbook> + AsMut<Workbook>;

    fn exists(&self, path: &Path) -> bool;

    /// Create the directory `path` will live in, if missing.
    fn ensure_parent(&self, path: &Path) -> Result<(), StoreError>;

    /// A new, unsaved document holding one empty worksheet.
    fn create(&self) -> Result<Self::Document, StoreError>;

    fn open(&self, path: &Path) -> Result<Self::Document, StoreError>;

    /// Write `document` to `path`, replacing whatever is there.
    fn save(&self, document: &mut Self::Document, path: &Path) -> Result<(), StoreError>;
}

impl<T: DocumentStore + ?Sized> DocumentStore for &T {
    type Document = T::Document;

    fn exists(&self, path: &Path) -> bool {
        (**self).exists(path)
    }

    fn ensure_parent(&self, path: &Path) -> Result<(), StoreError> {
        (**self).ensure_parent(path)
    }

    fn create(&self) -> Result<Self::Document, StoreError> {
        (**self).create()
    }

    fn open(&self, path: &Path) -> Result<Self::Document, StoreError> {
        (**self).open(path)
    }

    fn save(&self, document: &mut Self::Document, path: &Path) -> Result<(), StoreError> {
        (**self).save(document, path)
    }
}

pub fn first_sheet<D: AsRef<Workbook>>(document: &D) -> Option<&Worksheet> {
    document.as_ref().sheet(1)
}

pub fn first_sheet_mut<D: AsMut<Workbook>>(document: &mut D) -> Option<&mut Worksheet> {
    document.as_mut().sheet_mut(1)
}

/// `.xlsx` files on the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct XlsxStore;

impl XlsxStore {
    pub fn new() -> Self {
        Self
    }
}

impl DocumentStore for XlsxStore {
    type Document = XlsxDocument;

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn ensure_parent(&self, path: &Path) -> Result<(), StoreError> {
        sheetlog_fs::ensure_parent_dir(path)?;
        Ok(())
    }

    fn create(&self) -> Result<XlsxDocument, StoreError> {
        Ok(XlsxDocument::new()?)
    }

    fn open(&self, path: &Path) -> Result<XlsxDocument, StoreError> {
        if !path.is_file() {
            return Err(StoreError::NotFound(path.to_path_buf()));
        }
        Ok(sheetlog_xlsx::load_from_path(path)?)
    }

    fn save(&self, document: &mut XlsxDocument, path: &Path) -> Result<(), StoreError> {
        document.save_to_path(path)?;
        Ok(())
    }
}

#[derive(Default)]
struct MemoryState {
    documents: HashMap<PathBuf, Workbook>,
    failing_dirs: HashSet<PathBuf>,
    saves: usize,
}

/// In-memory documents keyed by path, for tests and dry runs.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub fn insert(&self, path: impl Into<PathBuf>, workbook: Workbook) {
        self.lock().documents.insert(path.into(), workbook);
    }

    /// A copy of the saved document at `path`.
    pub fn get(&self, path: impl AsRef<Path>) -> Option<Workbook> {
        self.lock().documents.get(path.as_ref()).cloned()
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.lock().documents.keys().cloned().collect();
        paths.sort();
        paths
    }

    /// Make `ensure_parent` fail for every path under `dir`.
    pub fn fail_directory(&self, dir: impl Into<PathBuf>) {
        self.lock().failing_dirs.insert(dir.into());
    }

    pub fn save_count(&self) -> usize {
        self.lock().saves
    }
}

impl DocumentStore for MemoryStore {
    type Document = Workbook;

    fn exists(&self, path: &Path) -> bool {
        self.lock().documents.contains_key(path)
    }

    fn ensure_parent(&self, path: &Path) -> Result<(), StoreError> {
        let state = self.lock();
        match state.failing_dirs.iter().find(|dir| path.starts_with(dir)) {
            Some(dir) => Err(StoreError::Rejected {
                path: path.to_path_buf(),
                message: format!("cannot create directory {}", dir.display()),
            }),
            None => Ok(()),
        }
    }

    fn create(&self) -> Result<Workbook, StoreError> {
        Ok(Workbook::with_sheet(FIRST_SHEET_NAME))
    }

    fn open(&self, path: &Path) -> Result<Workbook, StoreError> {
        self.get(path)
            .ok_or_else(|| StoreError::NotFound(path.to_path_buf()))
    }

    fn save(&self, document: &mut Workbook, path: &Path) -> Result<(), StoreError> {
        for position in 1..=document.sheet_count() {
            if let Some(sheet) = document.sheet_mut(position) {
                sheet.mark_clean();
            }
        }
        let mut state = self.lock();
        state.documents.insert(path.to_path_buf(), document.clone());
        state.saves += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sheetlog_model::{CellRef, CellValue};

    #[test]
    fn memory_store_round_trips_documents() {
        let store = MemoryStore::new();
        let path = Path::new("logs/a.xlsx");
        assert!(!store.exists(path));

        let mut doc = store.create().unwrap();
        first_sheet_mut(&mut doc)
            .unwrap()
            .set_value(CellRef::new(0, 0), CellValue::Number(1.0))
            .unwrap();
        store.save(&mut doc, path).unwrap();

        assert!(store.exists(path));
        let reopened = store.open(path).unwrap();
        assert_eq!(
            first_sheet(&reopened).unwrap().value(CellRef::new(0, 0)),
            &CellValue::Number(1.0)
        );
        assert_eq!(store.save_count(), 1);
    }

    #[test]
    fn memory_store_injects_directory_failures() {
        let store = MemoryStore::new();
        store.fail_directory("a/b");
        assert!(store.ensure_parent(Path::new("a/b/out.xlsx")).is_err());
        assert!(store.ensure_parent(Path::new("a/c/out.xlsx")).is_ok());
        assert!(matches!(
            store.open(Path::new("missing.xlsx")),
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn xlsx_store_saves_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub").join("out.xlsx");
        let store = XlsxStore::new();

        store.ensure_parent(&path).unwrap();
        let mut doc = store.create().unwrap();
        first_sheet_mut(&mut doc)
            .unwrap()
            .set_value(CellRef::new(0, 0), CellValue::String("Id".to_string()))
            .unwrap();
        store.save(&mut doc, &path).unwrap();

        assert!(store.exists(&path));
        let reopened = store.open(&path).unwrap();
        assert_eq!(first_sheet(&reopened).unwrap().last_row_number(), 1);
    }
}
