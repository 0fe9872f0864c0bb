use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Caution,
    Warning,
    Critical,
}

impl AlertSeverity {
    /// Maps a 0-10 risk level onto a severity.
    ///
    /// Levels 8 and above are critical, 5-7 warnings, 3-4 cautions.
    #[must_use]
    pub const fn from_level(level: u8) -> Self {
        match level {
            8.. => Self::Critical,
            5..=7 => Self::Warning,
            3..=4 => Self::Caution,
            _ => Self::Info,
        }
    }
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Caution => "caution",
            Self::Warning => "warning",
            Self::Critical => "critical",
        };
        f.write_str(s)
    }
}

/// A risk finding raised by the risk-assessment worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAlert {
    pub severity: AlertSeverity,
    pub message: String,
    /// Name of the metric that triggered the alert.
    pub metric: String,
    pub value: f64,
    pub threshold: f64,
    pub raised_at: DateTime<Utc>,
}

impl RiskAlert {
    pub fn new(
        severity: AlertSeverity,
        metric: impl Into<String>,
        value: f64,
        threshold: f64,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            message: message.into(),
            metric: metric.into(),
            value,
            threshold,
            raised_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_from_level() {
        assert_eq!(AlertSeverity::from_level(0), AlertSeverity::Info);
        assert_eq!(AlertSeverity::from_level(3), AlertSeverity::Caution);
        assert_eq!(AlertSeverity::from_level(5), AlertSeverity::Warning);
        assert_eq!(AlertSeverity::from_level(8), AlertSeverity::Critical);
        assert_eq!(AlertSeverity::from_level(10), AlertSeverity::Critical);
        assert!(AlertSeverity::Critical > AlertSeverity::Warning);
    }
}
