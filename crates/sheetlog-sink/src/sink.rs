use std::path::{Path, PathBuf};
use std::sync::Arc;

use sheetlog_template::{LogEvent, MessageTemplate};

use crate::config::{resolve_path, SchemaMode, SinkOptions};
use crate::{
    append_rows, first_sheet, first_sheet_mut, resolve_auto, resolve_from_template, write_header,
    CacheStats, ConfigError, DestinationResolver, DocumentStore, FieldRenderer, Schema,
    SchemaCache, SinkError, TemplateRenderer,
};

/// What happened to one destination during a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DestinationReport {
    pub path: PathBuf,
    pub events: usize,
    /// The document did not exist before this batch.
    pub created: bool,
    pub rows_written: usize,
    pub rows_failed: usize,
    /// Set when the destination was dropped for this batch.
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub destinations: Vec<DestinationReport>,
    /// Events dropped because their destination rendered empty.
    pub skipped_events: usize,
}

impl BatchReport {
    pub fn rows_written(&self) -> usize {
        self.destinations.iter().map(|d| d.rows_written).sum()
    }

    pub fn rows_failed(&self) -> usize {
        self.destinations.iter().map(|d| d.rows_failed).sum()
    }

    pub fn failed_destinations(&self) -> impl Iterator<Item = &DestinationReport> {
        self.destinations.iter().filter(|d| d.error.is_some())
    }

    pub fn destination(&self, path: impl AsRef<Path>) -> Option<&DestinationReport> {
        self.destinations.iter().find(|d| d.path == path.as_ref())
    }
}

struct Appended {
    created: bool,
    rows_written: usize,
    rows_failed: usize,
}

/// Appends batches of events to per-destination documents of a [`DocumentStore`].
///
/// Destinations are handled one after another; each document is opened, appended
/// to, saved and dropped before the next one is touched.
pub struct SpreadsheetSink<S: DocumentStore, R: FieldRenderer = TemplateRenderer> {
    store: S,
    renderer: R,
    destinations: DestinationResolver,
    output_template: MessageTemplate,
    schema_mode: SchemaMode,
    base_dir: Option<PathBuf>,
    schemas: SchemaCache,
}

impl<S: DocumentStore> SpreadsheetSink<S> {
    pub fn new(options: SinkOptions, store: S) -> Result<Self, ConfigError> {
        Self::with_renderer(options, store, TemplateRenderer)
    }
}

impl<S: DocumentStore, R: FieldRenderer> SpreadsheetSink<S, R> {
    pub fn with_renderer(options: SinkOptions, store: S, renderer: R) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self {
            destinations: DestinationResolver::new(&options.naming, options.base_dir.clone()),
            output_template: MessageTemplate::parse(&options.output_template),
            schemas: SchemaCache::new(options.schema_cache_capacity),
            schema_mode: options.schema,
            base_dir: options.base_dir,
            store,
            renderer,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.schemas.stats()
    }

    /// The schema remembered for `destination`, if any.
    pub fn schema_for(&self, destination: impl AsRef<Path>) -> Option<Arc<Schema>> {
        self.schemas.peek(destination.as_ref())
    }

    /// Write one batch. Failures never escape: they are logged and reported per destination.
    pub fn process_batch(&mut self, events: &[LogEvent]) -> BatchReport {
        let batch = self.destinations.group(&self.renderer, events);
        let mut report = BatchReport {
            destinations: Vec::with_capacity(batch.groups.len()),
            skipped_events: batch.skipped,
        };

        for (path, group) in batch.groups {
            let mut entry = DestinationReport {
                path: path.clone(),
                events: group.len(),
                ..DestinationReport::default()
            };
            match self.write_destination(&path, &group) {
                Ok(appended) => {
                    entry.created = appended.created;
                    entry.rows_written = appended.rows_written;
                    entry.rows_failed = appended.rows_failed;
                }
                Err(err) => {
                    log::error!("dropping {} event(s) for {}: {err}", group.len(), path.display());
                    entry.error = Some(err.to_string());
                }
            }
            report.destinations.push(entry);
        }
        report
    }

    fn write_destination(&mut self, path: &Path, events: &[&LogEvent]) -> Result<Appended, SinkError> {
        self.store
            .ensure_parent(path)
            .map_err(|source| SinkError::ParentDir {
                path: path.to_path_buf(),
                source,
            })?;

        if self.store.exists(path) {
            self.append_existing(path, events)
        } else {
            self.create_new(path, events)
        }
    }

    fn create_new(&mut self, path: &Path, events: &[&LogEvent]) -> Result<Appended, SinkError> {
        let Some(sample) = events.first().copied() else {
            return Ok(Appended {
                created: false,
                rows_written: 0,
                rows_failed: 0,
            });
        };

        let (mut document, schema, header) = match &self.schema_mode {
            SchemaMode::Auto {
                include_message_properties,
            } => {
                let document = self.store.create().map_err(|source| SinkError::Create {
                    path: path.to_path_buf(),
                    source,
                })?;
                let include = *include_message_properties;
                let (renderer, output) = (&self.renderer, &self.output_template);
                let schema = self
                    .schemas
                    .get_or_resolve(path, || resolve_auto(renderer, output, sample, include))
                    .map_err(|source| SinkError::Schema {
                        path: path.to_path_buf(),
                        source,
                    })?;
                (document, schema, true)
            }
            SchemaMode::Template(seed) => {
                let seed = resolve_path(self.base_dir.as_deref(), &seed.resolve(sample));
                if !self.store.exists(&seed) {
                    log::warn!("seed document {} is missing; first event: {sample}", seed.display());
                    return Err(SinkError::MissingSeed {
                        path: path.to_path_buf(),
                        seed,
                    });
                }
                let document = self.store.open(&seed).map_err(|source| SinkError::Open {
                    path: seed.clone(),
                    source,
                })?;
                let sheet = first_sheet(&document).ok_or_else(|| SinkError::NoWorksheet {
                    path: seed.clone(),
                })?;
                let schema = self
                    .schemas
                    .get_or_resolve(path, || resolve_from_template(sheet))
                    .map_err(|source| SinkError::Schema {
                        path: path.to_path_buf(),
                        source,
                    })?;
                (document, schema, false)
            }
        };

        let sheet = first_sheet_mut(&mut document).ok_or_else(|| SinkError::NoWorksheet {
            path: path.to_path_buf(),
        })?;
        if header {
            write_header(sheet, &schema).map_err(|source| SinkError::Header {
                path: path.to_path_buf(),
                source,
            })?;
        }
        let outcome = append_rows(sheet, &schema, events, &self.renderer);

        self.store
            .save(&mut document, path)
            .map_err(|source| SinkError::Save {
                path: path.to_path_buf(),
                source,
            })?;
        log::debug!(
            "created {} with {} row(s)",
            path.display(),
            outcome.rows_written
        );

        Ok(Appended {
            created: true,
            rows_written: outcome.rows_written,
            rows_failed: outcome.rows_failed,
        })
    }

    fn append_existing(&mut self, path: &Path, events: &[&LogEvent]) -> Result<Appended, SinkError> {
        let mut document = self.store.open(path).map_err(|source| SinkError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        let schema = {
            let sheet = first_sheet(&document).ok_or_else(|| SinkError::NoWorksheet {
                path: path.to_path_buf(),
            })?;
            let (renderer, output) = (&self.renderer, &self.output_template);
            let mode = &self.schema_mode;
            self.schemas
                .get_or_resolve(path, || match mode {
                    SchemaMode::Auto {
                        include_message_properties,
                    } => match events.first() {
                        Some(sample) => {
                            resolve_auto(renderer, output, sample, *include_message_properties)
                        }
                        None => Err(crate::SchemaError::Empty),
                    },
                    SchemaMode::Template(_) => resolve_from_template(sheet),
                })
                .map_err(|source| SinkError::Schema {
                    path: path.to_path_buf(),
                    source,
                })?
        };

        let sheet = first_sheet_mut(&mut document).ok_or_else(|| SinkError::NoWorksheet {
            path: path.to_path_buf(),
        })?;
        let outcome = append_rows(sheet, &schema, events, &self.renderer);

        self.store
            .save(&mut document, path)
            .map_err(|source| SinkError::Save {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Appended {
            created: false,
            rows_written: outcome.rows_written,
            rows_failed: outcome.rows_failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ColumnSource, MemoryStore};
    use pretty_assertions::assert_eq;
    use sheetlog_model::{CellRef, CellValue, Workbook};
    use sheetlog_template::Level;

    fn person(id: i64) -> LogEvent {
        LogEvent::new(Level::Information, "{Id},{Name},{Age}").with_args([
            sheetlog_template::PropertyValue::from(id),
            format!("Name {id}").into(),
            (20 + id).into(),
        ])
    }

    fn message_only() -> SinkOptions {
        SinkOptions::default()
            .with_file_name("out.xlsx")
            .with_output_template("{Message}")
    }

    #[test]
    fn new_destination_gets_header_and_rows() {
        let mut sink = SpreadsheetSink::new(message_only(), MemoryStore::new()).unwrap();
        let events: Vec<LogEvent> = (1..=10).map(person).collect();

        let report = sink.process_batch(&events);
        assert_eq!(report.rows_written(), 10);
        assert!(report.destination("out.xlsx").unwrap().created);

        let workbook = sink.store().get("out.xlsx").unwrap();
        let sheet = workbook.sheet(1).unwrap();
        let header: Vec<String> = (0..4).map(|c| sheet.value(CellRef::new(0, c)).to_text()).collect();
        assert_eq!(header, vec!["Id", "Name", "Age", "Message"]);
        assert_eq!(sheet.value(CellRef::new(1, 0)), &CellValue::String("1".to_string()));
        assert_eq!(sheet.value(CellRef::new(10, 0)), &CellValue::String("10".to_string()));
        assert_eq!(
            sheet.value(CellRef::new(1, 1)),
            &CellValue::String("Name 1".to_string())
        );
        assert_eq!(sheet.last_row_number(), 11);
    }

    #[test]
    fn existing_destination_appends_below_previous_rows() {
        let mut sink = SpreadsheetSink::new(message_only(), MemoryStore::new()).unwrap();
        let first: Vec<LogEvent> = (1..=10).map(person).collect();
        let second: Vec<LogEvent> = (11..=15).map(person).collect();

        sink.process_batch(&first);
        let report = sink.process_batch(&second);
        assert!(!report.destination("out.xlsx").unwrap().created);

        let workbook = sink.store().get("out.xlsx").unwrap();
        let sheet = workbook.sheet(1).unwrap();
        assert_eq!(sheet.last_row_number(), 16);
        assert_eq!(sheet.value(CellRef::new(10, 0)), &CellValue::String("10".to_string()));
        assert_eq!(sheet.value(CellRef::new(11, 0)), &CellValue::String("11".to_string()));
        assert_eq!(
            sheet.value(CellRef::new(0, 0)),
            &CellValue::String("Id".to_string())
        );
        assert_eq!(sink.cache_stats().misses, 1);
        assert_eq!(sink.cache_stats().hits, 1);
    }

    #[test]
    fn template_mode_requires_a_seed() {
        let options = SinkOptions::default()
            .with_file_name("out.xlsx")
            .with_template("seed.xlsx");
        let mut sink = SpreadsheetSink::new(options, MemoryStore::new()).unwrap();

        let report = sink.process_batch(&[person(1)]);
        let entry = report.destination("out.xlsx").unwrap();
        assert!(entry.error.as_deref().unwrap().contains("seed.xlsx"));
        assert!(!sink.store().exists(Path::new("out.xlsx")));
    }

    #[test]
    fn template_mode_copies_the_seed_and_caches_its_schema() {
        let store = MemoryStore::new();
        let mut seed = Workbook::with_sheet("Orders");
        let sheet = seed.sheet_mut(1).unwrap();
        for (col, (label, directive)) in [("Id", "Id:Number"), ("Name", "Name"), ("Twice", "FUN:=A{0}*2")]
            .into_iter()
            .enumerate()
        {
            let col = col as u32;
            sheet.set_value(CellRef::new(0, col), CellValue::String(label.to_string())).unwrap();
            sheet
                .set_value(CellRef::new(1, col), CellValue::String(directive.to_string()))
                .unwrap();
        }
        store.insert("seed.xlsx", seed);

        let options = SinkOptions::default()
            .with_file_name("out.xlsx")
            .with_template("seed.xlsx");
        let mut sink = SpreadsheetSink::new(options, store).unwrap();
        sink.process_batch(&[person(1), person(2)]);
        sink.process_batch(&[person(3)]);

        let out = sink.store().get("out.xlsx").unwrap();
        let sheet = out.sheet(1).unwrap();
        assert_eq!(sheet.name(), "Orders");
        assert_eq!(sheet.value(CellRef::new(2, 0)), &CellValue::Number(1.0));
        assert_eq!(sheet.value(CellRef::new(4, 0)), &CellValue::Number(3.0));
        assert_eq!(sheet.formula(CellRef::new(4, 2)), Some("A5*2"));
        assert_eq!(sheet.value(CellRef::new(1, 0)), &CellValue::String("Id:Number".to_string()));

        let seed = sink.store().get("seed.xlsx").unwrap();
        assert_eq!(seed.sheet(1).unwrap().last_row_number(), 2);

        let schema = sink.schema_for("out.xlsx").unwrap();
        assert!(matches!(schema.columns()[2].source, ColumnSource::Formula { .. }));
    }

    #[test]
    fn directory_failure_only_drops_that_destination() {
        let store = MemoryStore::new();
        store.fail_directory("a/b");
        let options = SinkOptions::default()
            .with_file_name_factory(|e: &LogEvent| match e.property("Id") {
                Some(id) if id.to_string() == "1" => "a/b/out.xlsx".to_string(),
                _ => "ok/out.xlsx".to_string(),
            })
            .with_output_template("{Message}");
        let mut sink = SpreadsheetSink::new(options, store).unwrap();

        let report = sink.process_batch(&[person(1), person(2), person(3)]);
        assert_eq!(report.failed_destinations().count(), 1);
        assert_eq!(report.destination("a/b/out.xlsx").unwrap().events, 1);
        assert_eq!(report.destination("ok/out.xlsx").unwrap().rows_written, 2);
        assert_eq!(sink.store().paths(), vec![PathBuf::from("ok/out.xlsx")]);
    }

    #[test]
    fn blank_destinations_are_skipped() {
        let options = SinkOptions::default()
            .with_file_name("{Missing}")
            .with_output_template("{Message}");
        let mut sink = SpreadsheetSink::new(options, MemoryStore::new()).unwrap();
        let report = sink.process_batch(&[person(1)]);
        assert_eq!(report.skipped_events, 1);
        assert!(report.destinations.is_empty());
    }

    #[test]
    fn blank_configuration_is_rejected() {
        let result = SpreadsheetSink::new(SinkOptions::default().with_file_name(""), MemoryStore::new());
        assert_eq!(result.err().map(|e| e.to_string()), Some(ConfigError::BlankFileName.to_string()));
    }
}
