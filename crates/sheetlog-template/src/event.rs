use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, FixedOffset, Local};

use crate::{render_message, Level, MessageTemplate, PropertyValue};

/// One structured log event: when, how severe, what template, which property values.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEvent {
    timestamp: DateTime<FixedOffset>,
    level: Level,
    template: MessageTemplate,
    properties: BTreeMap<String, PropertyValue>,
    exception: Option<String>,
}

impl LogEvent {
    /// An event stamped with the current local time and no properties.
    pub fn new(level: Level, template: impl Into<MessageTemplate>) -> Self {
        Self {
            timestamp: Local::now().fixed_offset(),
            level,
            template: template.into(),
            properties: BTreeMap::new(),
            exception: None,
        }
    }

    pub fn with_timestamp(mut self, timestamp: DateTime<FixedOffset>) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn with_property(mut self, name: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.properties.insert(name.into(), value.into());
        self
    }

    /// Bind positional arguments to the template's holes.
    ///
    /// Templates made only of `{0}`-style holes bind by index; otherwise arguments
    /// fill named holes in order of first appearance. Surplus arguments are ignored.
    pub fn with_args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<PropertyValue>,
    {
        let args: Vec<PropertyValue> = args.into_iter().map(Into::into).collect();
        let positional = self.template.property_tokens().next().is_some()
            && self.template.property_tokens().all(|p| p.position().is_some());

        let bindings: Vec<(String, PropertyValue)> = if positional {
            self.template
                .property_tokens()
                .filter_map(|p| {
                    let index = p.position()?;
                    Some((p.name.clone(), args.get(index)?.clone()))
                })
                .collect()
        } else {
            self.template
                .distinct_property_names()
                .into_iter()
                .zip(args)
                .map(|(name, value)| (name.to_string(), value))
                .collect()
        };
        self.properties.extend(bindings);
        self
    }

    pub fn with_exception(mut self, exception: impl fmt::Display) -> Self {
        self.exception = Some(exception.to_string());
        self
    }

    pub fn timestamp(&self) -> DateTime<FixedOffset> {
        self.timestamp
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn template(&self) -> &MessageTemplate {
        &self.template
    }

    pub fn properties(&self) -> &BTreeMap<String, PropertyValue> {
        &self.properties
    }

    pub fn property(&self, name: &str) -> Option<&PropertyValue> {
        self.properties.get(name)
    }

    pub fn exception(&self) -> Option<&str> {
        self.exception.as_deref()
    }

    /// The message with properties substituted, strings quoted.
    pub fn render_message(&self) -> String {
        render_message(self, None)
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}] {}",
            self.timestamp.to_rfc3339(),
            self.level.format(Some("u3")),
            self.render_message()
        )?;
        if let Some(exception) = &self.exception {
            write!(f, " ({exception})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn named_args_bind_in_first_appearance_order() {
        let event = LogEvent::new(Level::Information, "{Id},{Name},{Age} ({Id})")
            .with_args([PropertyValue::from(1), "Ada".into(), 36.into()]);
        assert_eq!(event.property("Id"), Some(&PropertyValue::from(1)));
        assert_eq!(event.property("Name"), Some(&PropertyValue::from("Ada")));
        assert_eq!(event.property("Age"), Some(&PropertyValue::from(36)));
        assert_eq!(event.render_message(), r#"1,"Ada",36 (1)"#);
    }

    #[test]
    fn positional_args_bind_by_index() {
        let event = LogEvent::new(Level::Information, "{1} before {0}").with_args(["a", "b"]);
        assert_eq!(event.render_message(), r#""b" before "a""#);
    }

    #[test]
    fn missing_args_leave_holes_unbound() {
        let event = LogEvent::new(Level::Information, "{A} {B}").with_args([1]);
        assert_eq!(event.property("B"), None);
        assert_eq!(event.render_message(), "1 {B}");
    }

    #[test]
    fn display_includes_level_and_exception() {
        let ts = DateTime::parse_from_rfc3339("2024-01-01T00:00:00+00:00").unwrap();
        let event = LogEvent::new(Level::Error, "failed")
            .with_timestamp(ts)
            .with_exception("disk full");
        assert_eq!(event.to_string(), "2024-01-01T00:00:00+00:00 [ERR] failed (disk full)");
    }
}
