use std::fmt::{self, Write as _};

use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};

/// A leaf property value.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarValue {
    Null,
    Bool(bool),
    I64(i64),
    U64(u64),
    F64(f64),
    String(String),
    DateTime(DateTime<FixedOffset>),
    Duration(chrono::Duration),
}

/// A captured event property.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Scalar(ScalarValue),
    Sequence(Vec<PropertyValue>),
    Structure {
        type_tag: Option<String>,
        members: Vec<(String, PropertyValue)>,
    },
}

impl PropertyValue {
    pub fn structure<N: Into<String>>(
        type_tag: Option<&str>,
        members: impl IntoIterator<Item = (N, PropertyValue)>,
    ) -> Self {
        PropertyValue::Structure {
            type_tag: type_tag.map(str::to_string),
            members: members
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        }
    }

    pub fn is_structure(&self) -> bool {
        matches!(self, PropertyValue::Structure { .. })
    }

    /// Render with a hole format: `l` leaves strings unquoted, `j` renders
    /// sequences and structures as JSON. Other formats apply to timestamps only.
    pub fn render(&self, format: Option<&str>) -> String {
        let format = format.unwrap_or_default();
        let literal_json = !format.is_empty() && format.chars().all(|c| c == 'l' || c == 'j');
        let literal = literal_json && format.contains('l');
        let json = literal_json && format.contains('j');

        match self {
            PropertyValue::Scalar(ScalarValue::String(s)) if literal => s.clone(),
            PropertyValue::Scalar(ScalarValue::DateTime(dt)) if !format.is_empty() && !literal_json => {
                crate::render::format_datetime(dt, format).unwrap_or_else(|| self.to_string())
            }
            PropertyValue::Scalar(scalar) if json => scalar_to_json(scalar).to_string(),
            PropertyValue::Sequence(_) | PropertyValue::Structure { .. } if json => {
                self.to_json().to_string()
            }
            PropertyValue::Sequence(_) | PropertyValue::Structure { .. } if literal => {
                let mut out = String::new();
                match write_value(&mut out, self, true) {
                    Ok(()) => out,
                    Err(_) => self.to_string(),
                }
            }
            _ => self.to_string(),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            PropertyValue::Scalar(scalar) => scalar_to_json(scalar),
            PropertyValue::Sequence(items) => {
                serde_json::Value::Array(items.iter().map(PropertyValue::to_json).collect())
            }
            PropertyValue::Structure { type_tag, members } => {
                let mut map = serde_json::Map::new();
                for (name, value) in members {
                    map.insert(name.clone(), value.to_json());
                }
                if let Some(tag) = type_tag {
                    map.insert("$type".to_string(), serde_json::Value::String(tag.clone()));
                }
                serde_json::Value::Object(map)
            }
        }
    }
}

fn scalar_to_json(scalar: &ScalarValue) -> serde_json::Value {
    match scalar {
        ScalarValue::Null => serde_json::Value::Null,
        ScalarValue::Bool(b) => serde_json::Value::Bool(*b),
        ScalarValue::I64(n) => serde_json::Value::from(*n),
        ScalarValue::U64(n) => serde_json::Value::from(*n),
        ScalarValue::F64(n) => serde_json::Number::from_f64(*n)
            .map_or_else(|| serde_json::Value::String(n.to_string()), serde_json::Value::Number),
        ScalarValue::String(s) => serde_json::Value::String(s.clone()),
        other => serde_json::Value::String(other.to_string()),
    }
}

/// `[-][d.]hh:mm:ss[.fffffff]`
pub(crate) fn format_duration(d: &chrono::Duration) -> String {
    let negative = *d < chrono::Duration::zero();
    let d = if negative { -*d } else { *d };
    let total_seconds = d.num_seconds();
    let ticks = (d - chrono::Duration::seconds(total_seconds))
        .num_nanoseconds()
        .unwrap_or(0)
        / 100;

    let mut out = String::new();
    if negative {
        out.push('-');
    }
    let days = total_seconds / 86_400;
    if days > 0 {
        let _ = write!(out, "{days}.");
    }
    let _ = write!(
        out,
        "{:02}:{:02}:{:02}",
        (total_seconds / 3600) % 24,
        (total_seconds / 60) % 60,
        total_seconds % 60
    );
    if ticks > 0 {
        let _ = write!(out, ".{ticks:07}");
    }
    out
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    f.write_char('"')?;
    f.write_str(&s.replace('"', "\\\""))?;
    f.write_char('"')
}

impl fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalarValue::Null => f.write_str("null"),
            ScalarValue::Bool(b) => write!(f, "{b}"),
            ScalarValue::I64(n) => write!(f, "{n}"),
            ScalarValue::U64(n) => write!(f, "{n}"),
            ScalarValue::F64(n) => write!(f, "{n}"),
            ScalarValue::String(s) => write_quoted(f, s),
            ScalarValue::DateTime(dt) => {
                f.write_str(&dt.to_rfc3339_opts(SecondsFormat::AutoSi, false))
            }
            ScalarValue::Duration(d) => f.write_str(&format_duration(d)),
        }
    }
}

/// Default text form: strings quoted, sequences as `[a, b]`, structures as `Tag { A: 1 }`.
impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_value(f, self, false)
    }
}

/// `literal` leaves strings unquoted at every nesting level.
fn write_value<W: fmt::Write>(out: &mut W, value: &PropertyValue, literal: bool) -> fmt::Result {
    match value {
        PropertyValue::Scalar(ScalarValue::String(s)) if literal => out.write_str(s),
        PropertyValue::Scalar(scalar) => write!(out, "{scalar}"),
        PropertyValue::Sequence(items) => {
            out.write_char('[')?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.write_str(", ")?;
                }
                write_value(out, item, literal)?;
            }
            out.write_char(']')
        }
        PropertyValue::Structure { type_tag, members } => {
            if let Some(tag) = type_tag {
                write!(out, "{tag} ")?;
            }
            out.write_str("{ ")?;
            for (i, (name, member)) in members.iter().enumerate() {
                if i > 0 {
                    out.write_str(", ")?;
                }
                write!(out, "{name}: ")?;
                write_value(out, member, literal)?;
            }
            out.write_str(" }")
        }
    }
}

impl From<ScalarValue> for PropertyValue {
    fn from(value: ScalarValue) -> Self {
        PropertyValue::Scalar(value)
    }
}

macro_rules! scalar_from {
    ($($ty:ty => $variant:ident as $cast:ty),* $(,)?) => {
        $(
            impl From<$ty> for PropertyValue {
                fn from(value: $ty) -> Self {
                    PropertyValue::Scalar(ScalarValue::$variant(value as $cast))
                }
            }
        )*
    };
}

scalar_from!(
    i8 => I64 as i64,
    i16 => I64 as i64,
    i32 => I64 as i64,
    i64 => I64 as i64,
    u8 => U64 as u64,
    u16 => U64 as u64,
    u32 => U64 as u64,
    u64 => U64 as u64,
    usize => U64 as u64,
    f32 => F64 as f64,
    f64 => F64 as f64,
);

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Scalar(ScalarValue::Bool(value))
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Scalar(ScalarValue::String(value.to_string()))
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Scalar(ScalarValue::String(value))
    }
}

impl From<DateTime<FixedOffset>> for PropertyValue {
    fn from(value: DateTime<FixedOffset>) -> Self {
        PropertyValue::Scalar(ScalarValue::DateTime(value))
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(value: DateTime<Utc>) -> Self {
        PropertyValue::Scalar(ScalarValue::DateTime(value.fixed_offset()))
    }
}

impl From<chrono::Duration> for PropertyValue {
    fn from(value: chrono::Duration) -> Self {
        PropertyValue::Scalar(ScalarValue::Duration(value))
    }
}

impl<T: Into<PropertyValue>> From<Option<T>> for PropertyValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(PropertyValue::Scalar(ScalarValue::Null), Into::into)
    }
}

impl<T: Into<PropertyValue>> From<Vec<T>> for PropertyValue {
    fn from(value: Vec<T>) -> Self {
        PropertyValue::Sequence(value.into_iter().map(Into::into).collect())
    }
}
