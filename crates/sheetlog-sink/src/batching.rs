use std::time::{Duration, Instant};

use sheetlog_template::{Level, LogEvent};

use crate::{BatchReport, ConfigError, DocumentStore, FieldRenderer, SpreadsheetSink};

/// When buffered events are handed to the sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchingOptions {
    /// Flush once this many events are buffered.
    pub batch_size_limit: usize,
    /// Flush once the oldest buffered event has waited this long.
    pub period: Duration,
    /// Events below this level are dropped on arrival.
    pub minimum_level: Level,
}

impl Default for BatchingOptions {
    fn default() -> Self {
        Self {
            batch_size_limit: 50,
            period: Duration::from_secs(5),
            minimum_level: Level::Verbose,
        }
    }
}

impl BatchingOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.batch_size_limit == 0 {
            return Err(ConfigError::ZeroBatchSize);
        }
        Ok(())
    }
}

struct Buffer {
    events: Vec<LogEvent>,
    started: Instant,
}

impl Buffer {
    fn new(capacity: usize) -> Self {
        Self {
            events: Vec::with_capacity(capacity),
            started: Instant::now(),
        }
    }

    fn push(&mut self, event: LogEvent) {
        // The period counts from the first buffered event, not from the last flush.
        if self.events.is_empty() {
            self.started = Instant::now();
        }
        self.events.push(event);
    }

    fn take(&mut self) -> Vec<LogEvent> {
        self.started = Instant::now();
        std::mem::take(&mut self.events)
    }
}

/// Buffers single events and writes them through a [`SpreadsheetSink`] in batches.
///
/// Flushing happens on [`emit`](Self::emit) when a threshold is crossed, on
/// [`flush_if_due`](Self::flush_if_due) for callers driving a timer, and on drop.
pub struct BatchingSink<S: DocumentStore, R: FieldRenderer = crate::TemplateRenderer> {
    sink: SpreadsheetSink<S, R>,
    options: BatchingOptions,
    buffer: Buffer,
}

impl<S: DocumentStore, R: FieldRenderer> BatchingSink<S, R> {
    pub fn new(sink: SpreadsheetSink<S, R>, options: BatchingOptions) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self {
            buffer: Buffer::new(options.batch_size_limit),
            sink,
            options,
        })
    }

    pub fn sink(&self) -> &SpreadsheetSink<S, R> {
        &self.sink
    }

    pub fn pending(&self) -> usize {
        self.buffer.events.len()
    }

    /// Buffer `event`, returning the report of the flush it triggered, if any.
    pub fn emit(&mut self, event: LogEvent) -> Option<BatchReport> {
        if event.level() < self.options.minimum_level {
            return None;
        }
        self.buffer.push(event);
        self.flush_if_due()
    }

    /// Flush when the buffer is full or its oldest event is older than the period.
    pub fn flush_if_due(&mut self) -> Option<BatchReport> {
        let events = &self.buffer.events;
        let due = events.len() >= self.options.batch_size_limit
            || (!events.is_empty() && self.buffer.started.elapsed() >= self.options.period);
        due.then(|| self.flush())
    }

    /// Write everything buffered, whatever the thresholds say.
    pub fn flush(&mut self) -> BatchReport {
        let events = self.buffer.take();
        if events.is_empty() {
            return BatchReport::default();
        }
        log::trace!("flushing {} buffered event(s)", events.len());
        self.sink.process_batch(&events)
    }
}

impl<S: DocumentStore, R: FieldRenderer> Drop for BatchingSink<S, R> {
    fn drop(&mut self) {
        if self.pending() > 0 {
            let report = self.flush();
            if report.failed_destinations().next().is_some() {
                log::error!("final flush left {} destination(s) unwritten", report.failed_destinations().count());
            }
        }
    }
}
