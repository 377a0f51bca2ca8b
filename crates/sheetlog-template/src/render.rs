use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset};

use crate::parser::{Capturing, MessageTemplate, PropertyToken, Token};
use crate::value::{PropertyValue, ScalarValue};
use crate::LogEvent;

pub const TIMESTAMP: &str = "Timestamp";
pub const LEVEL: &str = "Level";
pub const MESSAGE: &str = "Message";
pub const EXCEPTION: &str = "Exception";
pub const NEW_LINE: &str = "NewLine";

pub const DEFAULT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f %:z";

/// `None` when `format` is not a valid strftime pattern.
pub(crate) fn format_datetime(dt: &DateTime<FixedOffset>, format: &str) -> Option<String> {
    let items: Vec<Item<'_>> = StrftimeItems::new(format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return None;
    }
    let mut out = String::new();
    write!(out, "{}", dt.format_with_items(items.into_iter())).ok()?;
    Some(out)
}

/// Render an event timestamp with a strftime format, falling back to the default on bad input.
pub fn render_timestamp(dt: &DateTime<FixedOffset>, format: Option<&str>) -> String {
    format
        .and_then(|f| format_datetime(dt, f))
        .or_else(|| format_datetime(dt, DEFAULT_TIMESTAMP_FORMAT))
        .unwrap_or_else(|| dt.to_rfc3339())
}

/// The event's message with its properties substituted.
///
/// `format` applies to every hole that has no format of its own; `Message:lj` in an
/// output template passes `lj` here.
pub fn render_message(event: &LogEvent, format: Option<&str>) -> String {
    let mut out = String::new();
    for token in event.template().tokens() {
        match token {
            Token::Text(text) => out.push_str(text),
            Token::Property(hole) => match event.property(&hole.name) {
                Some(value) => {
                    let text = render_hole_value(hole, value, format);
                    out.push_str(&align(hole, text));
                }
                None => out.push_str(&hole.raw),
            },
        }
    }
    out
}

fn render_hole_value(hole: &PropertyToken, value: &PropertyValue, outer: Option<&str>) -> String {
    let format = hole.format.as_deref().or(outer);
    match hole.capturing {
        Capturing::Stringify => {
            let literal = format.is_some_and(|f| f.contains('l'));
            let text = match value {
                PropertyValue::Scalar(ScalarValue::String(s)) => s.clone(),
                other => other.to_string(),
            };
            if literal {
                text
            } else {
                PropertyValue::from(text).to_string()
            }
        }
        Capturing::Default | Capturing::Destructure => value.render(format),
    }
}

fn align(hole: &PropertyToken, text: String) -> String {
    match hole.alignment {
        Some(alignment) => alignment.apply(&text),
        None => text,
    }
}

/// Render an output template (`{Timestamp}`, `{Level}`, `{Message}`, `{Exception}`,
/// `{NewLine}`, or any event property) against one event.
pub fn render_output(template: &MessageTemplate, event: &LogEvent) -> String {
    render_tokens(template, event, None)
}

/// Like [`render_output`], but property holes without a format of their own render
/// literally, so `logs/{Tenant}.xlsx` becomes `logs/acme.xlsx`.
pub fn render_name(template: &MessageTemplate, event: &LogEvent) -> String {
    render_tokens(template, event, Some("l"))
}

fn render_tokens(template: &MessageTemplate, event: &LogEvent, outer: Option<&str>) -> String {
    let mut out = String::new();
    for token in template.tokens() {
        match token {
            Token::Text(text) => out.push_str(text),
            Token::Property(hole) => {
                let text = render_field(hole, event, outer);
                out.push_str(&align(hole, text));
            }
        }
    }
    out
}

fn render_field(hole: &PropertyToken, event: &LogEvent, outer: Option<&str>) -> String {
    let format = hole.format.as_deref();
    match hole.name.as_str() {
        TIMESTAMP => render_timestamp(&event.timestamp(), format),
        LEVEL => event.level().format(format),
        MESSAGE => render_message(event, format.or(outer)),
        EXCEPTION => event.exception().unwrap_or_default().to_string(),
        NEW_LINE => "\n".to_string(),
        name => event
            .property(name)
            .map(|value| render_hole_value(hole, value, outer))
            .unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Level;
    use pretty_assertions::assert_eq;

    fn event() -> LogEvent {
        LogEvent::new(Level::Warning, "Order {Id} for {Customer} from {Missing}")
            .with_timestamp(DateTime::parse_from_rfc3339("2024-03-05T14:30:00.250+01:00").unwrap())
            .with_property("Id", 42)
            .with_property("Customer", "Ada")
    }

    #[test]
    fn message_renders_properties_and_keeps_missing_holes() {
        assert_eq!(
            render_message(&event(), None),
            r#"Order 42 for "Ada" from {Missing}"#
        );
        assert_eq!(
            render_message(&event(), Some("l")),
            "Order 42 for Ada from {Missing}"
        );
    }

    #[test]
    fn output_template_fields() {
        let template = MessageTemplate::parse(
            "[{Timestamp:%Y-%m-%d %H:%M:%S%.3f} {Level:u3}] {Message:lj}{NewLine}{Exception}",
        );
        let event = event().with_exception("boom");
        assert_eq!(
            render_output(&template, &event),
            "[2024-03-05 14:30:00.250 WRN] Order 42 for Ada from {Missing}\nboom"
        );
    }

    #[test]
    fn output_template_property_and_unknown_fields() {
        let template = MessageTemplate::parse("{Customer}|{Nope}|{Id,5}");
        assert_eq!(render_output(&template, &event()), r#""Ada"||   42"#);
    }

    #[test]
    fn names_render_properties_literally() {
        let template = MessageTemplate::parse("logs/{Customer}/{Timestamp:%Y}-{Id}.xlsx");
        assert_eq!(render_name(&template, &event()), "logs/Ada/2024-42.xlsx");
        assert_eq!(
            render_name(&MessageTemplate::parse("{Customer:j}"), &event()),
            r#""Ada""#
        );
    }

    #[test]
    fn invalid_timestamp_format_falls_back() {
        let dt = DateTime::parse_from_rfc3339("2024-03-05T14:30:00+00:00").unwrap();
        assert_eq!(render_timestamp(&dt, Some("%Q")), "2024-03-05 14:30:00.000 +00:00");
        assert_eq!(render_timestamp(&dt, Some("%Y-%m-%d")), "2024-03-05");
    }

    #[test]
    fn stringify_hint_quotes_display_text() {
        let event = LogEvent::new(Level::Information, "{$Items}")
            .with_property("Items", vec![1, 2]);
        assert_eq!(render_message(&event, None), r#""[1, 2]""#);
        assert_eq!(render_message(&event, Some("l")), "[1, 2]");
    }
}
