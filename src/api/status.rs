// Driver status codes and the severity levels a directive can report

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Status of a single driver status entry
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub enum StatusCode {
    /// Entry registered, driver has not acted yet
    #[default]
    Pending,
    /// Driver is working, or reported a minor error
    Running,
    /// Driver finished its work for the watched state
    Completed,
    /// Driver hit a major error that may clear on its own
    TransientCondition,
    /// Driver hit a fatal error
    Error,
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Pending => "Pending",
            StatusCode::Running => "Running",
            StatusCode::Completed => "Completed",
            StatusCode::TransientCondition => "TransientCondition",
            StatusCode::Error => "Error",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SeverityError {
    #[error("invalid severity '{0}': expected one of minor, major, fatal")]
    Invalid(String),
}

/// Severity attached to an `action=error` directive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Minor,
    Major,
    Fatal,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Minor => "minor",
            Severity::Major => "major",
            Severity::Fatal => "fatal",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Severity::Minor => StatusCode::Running,
            Severity::Major => StatusCode::TransientCondition,
            Severity::Fatal => StatusCode::Error,
        }
    }

    /// Map a raw severity string to the status it implies.
    ///
    /// An absent or empty severity means `Running`. A string that names no
    /// known severity is an error rather than a silent default.
    pub fn status_for(severity: Option<&str>) -> Result<StatusCode, SeverityError> {
        match severity {
            None | Some("") => Ok(StatusCode::Running),
            Some(raw) => raw.parse::<Severity>().map(|s| s.status()),
        }
    }
}

impl FromStr for Severity {
    type Err = SeverityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minor" => Ok(Severity::Minor),
            "major" => Ok(Severity::Major),
            "fatal" => Ok(Severity::Fatal),
            other => Err(SeverityError::Invalid(other.to_string())),
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
