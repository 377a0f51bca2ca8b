use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Event severity, least to most severe.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Level {
    Verbose,
    Debug,
    #[default]
    Information,
    Warning,
    Error,
    Fatal,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown log level `{0}`")]
pub struct ParseLevelError(String);

impl Level {
    pub const ALL: [Level; 6] = [
        Level::Verbose,
        Level::Debug,
        Level::Information,
        Level::Warning,
        Level::Error,
        Level::Fatal,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Level::Verbose => "Verbose",
            Level::Debug => "Debug",
            Level::Information => "Information",
            Level::Warning => "Warning",
            Level::Error => "Error",
            Level::Fatal => "Fatal",
        }
    }

    const fn abbreviation(self) -> &'static str {
        match self {
            Level::Verbose => "VRB",
            Level::Debug => "DBG",
            Level::Information => "INF",
            Level::Warning => "WRN",
            Level::Error => "ERR",
            Level::Fatal => "FTL",
        }
    }

    /// Render with a level format: `u`/`w`/`t` pick upper, lower or title case and an
    /// optional width (`u3` -> `INF`). Anything else renders the full name.
    pub fn format(self, spec: Option<&str>) -> String {
        let Some(spec) = spec.map(str::trim).filter(|s| !s.is_empty()) else {
            return self.name().to_string();
        };
        let mut chars = spec.chars();
        let case = chars.next().unwrap_or('t');
        let width = chars.as_str();
        let width = if width.is_empty() {
            None
        } else {
            match width.parse::<usize>() {
                Ok(w) if w > 0 => Some(w),
                _ => return self.name().to_string(),
            }
        };

        let text: String = match width {
            Some(w) if w <= 3 => self.abbreviation().chars().take(w).collect(),
            Some(w) => self.name().chars().take(w).collect(),
            None => self.name().to_string(),
        };
        match case {
            'u' => text.to_uppercase(),
            'w' => text.to_lowercase(),
            't' => {
                let lower = text.to_lowercase();
                let mut chars = lower.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect(),
                    None => lower,
                }
            }
            _ => self.name().to_string(),
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Level {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Level::ALL
            .into_iter()
            .find(|level| {
                level.name().eq_ignore_ascii_case(s) || level.abbreviation().eq_ignore_ascii_case(s)
            })
            .or_else(|| match s.to_ascii_lowercase().as_str() {
                "trace" => Some(Level::Verbose),
                "info" => Some(Level::Information),
                "warn" => Some(Level::Warning),
                "critical" => Some(Level::Fatal),
                _ => None,
            })
            .ok_or_else(|| ParseLevelError(s.to_string()))
    }
}
