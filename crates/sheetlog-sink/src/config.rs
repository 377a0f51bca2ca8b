use std::fmt;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use sheetlog_template::{Level, LogEvent};

use crate::{BatchingOptions, ConfigError};

pub const DEFAULT_FILE_NAME: &str = "{Timestamp:%Y-%m-%d}.xlsx";
pub const DEFAULT_OUTPUT_TEMPLATE: &str =
    "[{Timestamp:%Y-%m-%d %H:%M:%S%.3f} {Level:u3}] {Message:lj}{NewLine}{Exception}";

pub(crate) type EventFn<T> = Arc<dyn Fn(&LogEvent) -> T + Send + Sync>;

/// How an event's destination file name is computed.
#[derive(Clone)]
pub enum Naming {
    /// Output-style template rendered against the event, e.g. `logs/{Timestamp:%Y-%m}.xlsx`.
    Template(String),
    /// Computes a template per event; the result is rendered against the same event.
    Factory(EventFn<String>),
}

impl Naming {
    pub fn factory(f: impl Fn(&LogEvent) -> String + Send + Sync + 'static) -> Self {
        Naming::Factory(Arc::new(f))
    }
}

impl Default for Naming {
    fn default() -> Self {
        Naming::Template(DEFAULT_FILE_NAME.to_string())
    }
}

impl fmt::Debug for Naming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Naming::Template(template) => f.debug_tuple("Template").field(template).finish(),
            Naming::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// Where template mode copies new documents from.
#[derive(Clone)]
pub enum SeedSource {
    Path(PathBuf),
    /// Picks the seed from the first event routed to a new destination.
    Factory(EventFn<PathBuf>),
}

impl SeedSource {
    pub fn factory(f: impl Fn(&LogEvent) -> PathBuf + Send + Sync + 'static) -> Self {
        SeedSource::Factory(Arc::new(f))
    }

    pub fn resolve(&self, event: &LogEvent) -> PathBuf {
        match self {
            SeedSource::Path(path) => path.clone(),
            SeedSource::Factory(f) => f(event),
        }
    }
}

impl fmt::Debug for SeedSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SeedSource::Path(path) => f.debug_tuple("Path").field(path).finish(),
            SeedSource::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

/// How a destination's columns are decided.
#[derive(Debug, Clone)]
pub enum SchemaMode {
    /// One column per field of the output template; with `include_message_properties`
    /// the message's own properties get columns too.
    Auto { include_message_properties: bool },
    /// Columns come from directives in row 2 of a seed workbook.
    Template(SeedSource),
}

impl Default for SchemaMode {
    fn default() -> Self {
        SchemaMode::Auto {
            include_message_properties: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SinkOptions {
    pub naming: Naming,
    pub output_template: String,
    pub schema: SchemaMode,
    /// Directory that relative destination and seed paths resolve against.
    pub base_dir: Option<PathBuf>,
    /// Bound on remembered per-destination schemas; `None` keeps them for the sink's lifetime.
    pub schema_cache_capacity: Option<NonZeroUsize>,
}

impl Default for SinkOptions {
    fn default() -> Self {
        Self {
            naming: Naming::default(),
            output_template: DEFAULT_OUTPUT_TEMPLATE.to_string(),
            schema: SchemaMode::default(),
            base_dir: None,
            schema_cache_capacity: None,
        }
    }
}

impl SinkOptions {
    pub fn with_file_name(mut self, template: impl Into<String>) -> Self {
        self.naming = Naming::Template(template.into());
        self
    }

    pub fn with_file_name_factory(
        mut self,
        f: impl Fn(&LogEvent) -> String + Send + Sync + 'static,
    ) -> Self {
        self.naming = Naming::factory(f);
        self
    }

    pub fn with_output_template(mut self, template: impl Into<String>) -> Self {
        self.output_template = template.into();
        self
    }

    pub fn with_message_properties(mut self, include: bool) -> Self {
        self.schema = SchemaMode::Auto {
            include_message_properties: include,
        };
        self
    }

    pub fn with_template(mut self, seed: impl Into<PathBuf>) -> Self {
        self.schema = SchemaMode::Template(SeedSource::Path(seed.into()));
        self
    }

    pub fn with_template_factory(
        mut self,
        f: impl Fn(&LogEvent) -> PathBuf + Send + Sync + 'static,
    ) -> Self {
        self.schema = SchemaMode::Template(SeedSource::factory(f));
        self
    }

    pub fn with_base_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.base_dir = Some(dir.into());
        self
    }

    pub fn with_schema_cache_capacity(mut self, capacity: NonZeroUsize) -> Self {
        self.schema_cache_capacity = Some(capacity);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Naming::Template(template) = &self.naming {
            if template.trim().is_empty() {
                return Err(ConfigError::BlankFileName);
            }
        }
        if self.output_template.trim().is_empty() {
            return Err(ConfigError::BlankOutputTemplate);
        }
        if let SchemaMode::Template(SeedSource::Path(path)) = &self.schema {
            if path.as_os_str().is_empty() {
                return Err(ConfigError::BlankSeedPath);
            }
        }
        Ok(())
    }
}

/// `path` joined onto `base_dir` when it is relative.
pub(crate) fn resolve_path(base_dir: Option<&Path>, path: &Path) -> PathBuf {
    match base_dir {
        Some(base) if path.is_relative() => base.join(path),
        _ => path.to_path_buf(),
    }
}

/// Serializable sink settings, e.g. from a host application's config file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SinkSettings {
    pub file_name: String,
    pub output_template: String,
    pub include_message_properties: bool,
    pub template_path: Option<PathBuf>,
    pub base_dir: Option<PathBuf>,
    pub schema_cache_capacity: Option<usize>,
    pub batch_size_limit: usize,
    pub period_ms: u64,
    pub minimum_level: Level,
}

impl Default for SinkSettings {
    fn default() -> Self {
        let batching = BatchingOptions::default();
        Self {
            file_name: DEFAULT_FILE_NAME.to_string(),
            output_template: DEFAULT_OUTPUT_TEMPLATE.to_string(),
            include_message_properties: true,
            template_path: None,
            base_dir: None,
            schema_cache_capacity: None,
            batch_size_limit: batching.batch_size_limit,
            period_ms: batching.period.as_millis() as u64,
            minimum_level: batching.minimum_level,
        }
    }
}

impl SinkSettings {
    pub fn into_options(self) -> Result<(SinkOptions, BatchingOptions), ConfigError> {
        let schema = match self.template_path {
            Some(path) => SchemaMode::Template(SeedSource::Path(path)),
            None => SchemaMode::Auto {
                include_message_properties: self.include_message_properties,
            },
        };
        let options = SinkOptions {
            naming: Naming::Template(self.file_name),
            output_template: self.output_template,
            schema,
            base_dir: self.base_dir,
            schema_cache_capacity: self.schema_cache_capacity.and_then(NonZeroUsize::new),
        };
        options.validate()?;

        let batching = BatchingOptions {
            batch_size_limit: self.batch_size_limit,
            period: Duration::from_millis(self.period_ms),
            minimum_level: self.minimum_level,
        };
        batching.validate()?;
        Ok((options, batching))
    }
}
