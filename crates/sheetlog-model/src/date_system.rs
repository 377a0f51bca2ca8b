use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};

const MILLIS_PER_DAY: f64 = 86_400_000.0;

/// Serial of 1970-01-01 in each date system.
const UNIX_EPOCH_SERIAL_1900: i64 = 25_569;
const UNIX_EPOCH_SERIAL_1904: i64 = 24_107;

/// Excel workbook date system used to interpret serial date values.
///
/// Excel supports two base date systems:
/// - `Excel1900` (default on Windows; includes the Lotus 1-2-3 leap year bug)
/// - `Excel1904` (default on older Mac versions)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DateSystem {
    #[default]
    #[serde(rename = "excel1900")]
    Excel1900,
    #[serde(rename = "excel1904")]
    Excel1904,
}

impl DateSystem {
    /// Timestamp that serial `0` maps to for serials past the 1900 leap-year bug.
    fn base(self) -> NaiveDateTime {
        let epoch_serial = match self {
            DateSystem::Excel1900 => UNIX_EPOCH_SERIAL_1900,
            DateSystem::Excel1904 => UNIX_EPOCH_SERIAL_1904,
        };
        NaiveDateTime::default() - Duration::days(epoch_serial)
    }

    pub fn datetime_to_serial(self, value: NaiveDateTime) -> f64 {
        let mut serial = (value - self.base()).num_milliseconds() as f64 / MILLIS_PER_DAY;
        // 1900-01-01 ..= 1900-02-28 sit before the phantom 1900-02-29 (serial 60).
        if self == DateSystem::Excel1900 && serial < 61.0 {
            serial -= 1.0;
        }
        serial
    }

    pub fn serial_to_datetime(self, serial: f64) -> Option<NaiveDateTime> {
        if !serial.is_finite() || serial < 0.0 {
            return None;
        }
        let adjusted = if self == DateSystem::Excel1900 && serial < 60.0 {
            serial + 1.0
        } else {
            serial
        };
        let millis = (adjusted * MILLIS_PER_DAY).round();
        if millis > i64::MAX as f64 {
            return None;
        }
        self.base()
            .checked_add_signed(Duration::milliseconds(millis as i64))
    }

    pub fn duration_to_serial(value: Duration) -> f64 {
        value.num_milliseconds() as f64 / MILLIS_PER_DAY
    }

    pub fn serial_to_duration(serial: f64) -> Option<Duration> {
        if !serial.is_finite() {
            return None;
        }
        let millis = (serial * MILLIS_PER_DAY).round();
        if millis.abs() > i64::MAX as f64 / 2.0 {
            return None;
        }
        Some(Duration::milliseconds(millis as i64))
    }
}
