use std::collections::HashMap;
use std::path::{Path, PathBuf};

use sheetlog_template::{LogEvent, MessageTemplate};

use crate::config::{resolve_path, EventFn, Naming};
use crate::{DestinationError, FieldRenderer};

enum NameSource {
    Template(MessageTemplate),
    Factory(EventFn<String>),
}

/// Computes each event's destination path.
pub struct DestinationResolver {
    source: NameSource,
    base_dir: Option<PathBuf>,
}

/// A batch split by destination, in first-seen order.
#[derive(Debug, Default)]
pub struct GroupedBatch<'e> {
    pub groups: Vec<(PathBuf, Vec<&'e LogEvent>)>,
    /// Events whose destination rendered empty.
    pub skipped: usize,
}

impl DestinationResolver {
    pub fn new(naming: &Naming, base_dir: Option<PathBuf>) -> Self {
        let source = match naming {
            Naming::Template(template) => NameSource::Template(MessageTemplate::parse(template)),
            Naming::Factory(f) => NameSource::Factory(f.clone()),
        };
        Self { source, base_dir }
    }

    pub fn resolve<R: FieldRenderer + ?Sized>(
        &self,
        renderer: &R,
        event: &LogEvent,
    ) -> Result<PathBuf, DestinationError> {
        let (template, rendered) = match &self.source {
            NameSource::Template(template) => {
                (template.text().to_string(), renderer.render_name(template, event))
            }
            NameSource::Factory(f) => {
                let computed = f(event);
                let rendered = renderer.render_name(&MessageTemplate::parse(&computed), event);
                (computed, rendered)
            }
        };

        let name = rendered.trim();
        if name.is_empty() {
            return Err(DestinationError::Empty { template });
        }
        Ok(resolve_path(self.base_dir.as_deref(), Path::new(name)))
    }

    /// Split `events` by destination. Destinations keep the order they were first seen in;
    /// events keep their relative order inside each destination.
    pub fn group<'e, R: FieldRenderer + ?Sized>(
        &self,
        renderer: &R,
        events: &'e [LogEvent],
    ) -> GroupedBatch<'e> {
        let mut batch = GroupedBatch::default();
        let mut index: HashMap<PathBuf, usize> = HashMap::new();

        for event in events {
            let path = match self.resolve(renderer, event) {
                Ok(path) => path,
                Err(err) => {
                    log::warn!("skipping event: {err}; event: {event}");
                    batch.skipped += 1;
                    continue;
                }
            };
            match index.get(&path) {
                Some(&slot) => batch.groups[slot].1.push(event),
                None => {
                    index.insert(path.clone(), batch.groups.len());
                    batch.groups.push((path, vec![event]));
                }
            }
        }
        batch
    }
}
