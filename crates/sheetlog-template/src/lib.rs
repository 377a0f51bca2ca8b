//! Structured log events and the message templates that describe them.
//!
//! A template such as `"Order {Id} placed by {@Customer}"` is parsed once into
//! literal text and property holes. Events carry the template together with
//! their property values; rendering substitutes one into the other. The same
//! parser handles output templates (`"[{Timestamp:%H:%M:%S} {Level:u3}] {Message:lj}"`),
//! where the hole names refer to event fields rather than properties.

mod event;
mod level;
mod parser;
mod render;
mod value;

pub use event::LogEvent;
pub use level::{Level, ParseLevelError};
pub use parser::{Alignment, Capturing, MessageTemplate, PropertyToken, Token};
pub use render::{
    render_message, render_name, render_output, render_timestamp, DEFAULT_TIMESTAMP_FORMAT,
    EXCEPTION, LEVEL, MESSAGE, NEW_LINE, TIMESTAMP,
};
pub use value::{PropertyValue, ScalarValue};
