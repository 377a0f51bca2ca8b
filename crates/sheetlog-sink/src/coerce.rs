use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use sheetlog_model::CellValue;

use crate::CoercionType;

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S%.f",
    "%Y/%m/%d %H:%M",
    "%m/%d/%Y %H:%M:%S%.f",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Parse `text` as `coercion`; anything unparsable (or untyped) stays text.
pub fn coerce(text: &str, coercion: Option<CoercionType>) -> CellValue {
    let parsed = match coercion {
        None | Some(CoercionType::Text) => None,
        Some(CoercionType::Number) => parse_number(text).map(CellValue::Number),
        Some(CoercionType::Boolean) => parse_bool(text).map(CellValue::Boolean),
        Some(CoercionType::DateTime) => parse_datetime(text).map(CellValue::DateTime),
        Some(CoercionType::Duration) => parse_duration(text).map(CellValue::Duration),
    };
    parsed.unwrap_or_else(|| CellValue::String(text.to_string()))
}

fn parse_number(text: &str) -> Option<f64> {
    text.trim().parse::<f64>().ok().filter(|n| n.is_finite())
}

fn parse_bool(text: &str) -> Option<bool> {
    let text = text.trim();
    if text.eq_ignore_ascii_case("true") {
        Some(true)
    } else if text.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Wall-clock time as written; offsets are dropped rather than converted.
fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_local());
    }
    if let Ok(dt) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f %:z") {
        return Some(dt.naive_local());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Parse `[-]d`, or `[-][d.]hh:mm[:ss[.fffffff]]`.
pub fn parse_duration(text: &str) -> Option<Duration> {
    let text = text.trim();
    let (negative, body) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    if body.is_empty() {
        return None;
    }

    let duration = if body.contains(':') {
        let parts: Vec<&str> = body.split(':').collect();
        if parts.len() > 3 {
            return None;
        }
        let (days, hours) = match parts[0].split_once('.') {
            Some((days, hours)) => (whole(days)?, whole(hours)?),
            None => (0, whole(parts[0])?),
        };
        let minutes = whole(parts[1])?;
        let (seconds, nanos) = match parts.get(2) {
            Some(seconds) => seconds_with_fraction(seconds)?,
            None => (0, 0),
        };
        if hours > 23 || minutes > 59 || seconds > 59 {
            return None;
        }
        Duration::try_days(days)?
            .checked_add(&Duration::try_hours(hours)?)?
            .checked_add(&Duration::try_minutes(minutes)?)?
            .checked_add(&Duration::try_seconds(seconds)?)?
            .checked_add(&Duration::nanoseconds(nanos))?
    } else {
        Duration::try_days(whole(body)?)?
    };

    Some(if negative { -duration } else { duration })
}

fn whole(text: &str) -> Option<i64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

fn seconds_with_fraction(text: &str) -> Option<(i64, i64)> {
    let (seconds, fraction) = match text.split_once('.') {
        Some((seconds, fraction)) => (seconds, fraction),
        None => return Some((whole(text)?, 0)),
    };
    if fraction.is_empty() || fraction.len() > 9 || !fraction.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let nanos: i64 = format!("{fraction:0<9}").parse().ok()?;
    Some((whole(seconds)?, nanos))
}
