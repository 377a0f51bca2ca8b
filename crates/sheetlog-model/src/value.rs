use std::fmt;

use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::ErrorValue;

/// Typed content of a single cell.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CellValue {
    /// Empty / unset cell value.
    #[default]
    Empty,
    Number(f64),
    String(String),
    Boolean(bool),
    Error(ErrorValue),
    /// Wall-clock timestamp; persisted as a date serial with a date number format.
    DateTime(NaiveDateTime),
    /// Elapsed time; persisted as a fraction of days with an `[h]:mm:ss` format.
    Duration(#[serde(with = "duration_millis")] Duration),
}

/// Coarse classification of a [`CellValue`], mirroring what a spreadsheet UI reports.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CellType {
    Blank,
    Error,
    Text,
    Number,
    Boolean,
    DateTime,
    Duration,
}

impl CellValue {
    pub fn is_empty(&self) -> bool {
        matches!(self, CellValue::Empty)
    }

    pub fn cell_type(&self) -> CellType {
        match self {
            CellValue::Empty => CellType::Blank,
            CellValue::Number(_) => CellType::Number,
            CellValue::String(_) => CellType::Text,
            CellValue::Boolean(_) => CellType::Boolean,
            CellValue::Error(_) => CellType::Error,
            CellValue::DateTime(_) => CellType::DateTime,
            CellValue::Duration(_) => CellType::Duration,
        }
    }

    /// Text the value displays as, without any number format applied.
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Empty => Ok(()),
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::String(s) => f.write_str(s),
            CellValue::Boolean(true) => f.write_str("TRUE"),
            CellValue::Boolean(false) => f.write_str("FALSE"),
            CellValue::Error(err) => write!(f, "{err}"),
            CellValue::DateTime(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.f")),
            CellValue::Duration(d) => {
                let total = d.num_seconds();
                let sign = if total < 0 { "-" } else { "" };
                let total = total.abs();
                write!(
                    f,
                    "{sign}{}:{:02}:{:02}",
                    total / 3600,
                    (total / 60) % 60,
                    total % 60
                )
            }
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        CellValue::Number(value)
    }
}

impl From<bool> for CellValue {
    fn from(value: bool) -> Self {
        CellValue::Boolean(value)
    }
}

impl From<String> for CellValue {
    fn from(value: String) -> Self {
        CellValue::String(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        CellValue::String(value.to_string())
    }
}

impl From<ErrorValue> for CellValue {
    fn from(value: ErrorValue) -> Self {
        CellValue::Error(value)
    }
}

impl From<NaiveDateTime> for CellValue {
    fn from(value: NaiveDateTime) -> Self {
        CellValue::DateTime(value)
    }
}

impl From<Duration> for CellValue {
    fn from(value: Duration) -> Self {
        CellValue::Duration(value)
    }
}

mod duration_millis {
    use chrono::Duration;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(value.num_milliseconds())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        i64::deserialize(deserializer).map(Duration::milliseconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_forms() {
        assert_eq!(CellValue::Number(7.0).to_text(), "7");
        assert_eq!(CellValue::Number(2.5).to_text(), "2.5");
        assert_eq!(CellValue::Boolean(true).to_text(), "TRUE");
        assert_eq!(CellValue::Empty.to_text(), "");
        assert_eq!(CellValue::Error(ErrorValue::NA).to_text(), "#N/A");
        assert_eq!(
            CellValue::Duration(Duration::seconds(3 * 3600 + 5 * 60 + 9)).to_text(),
            "3:05:09"
        );
    }

    #[test]
    fn serde_uses_tagged_layout() {
        let json = serde_json::to_string(&CellValue::Number(1.5)).unwrap();
        assert_eq!(json, r#"{"type":"number","value":1.5}"#);
    }
}
