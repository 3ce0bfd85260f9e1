//! Intent classification
//!
//! Maps an utterance to one of four routing intents plus the parameters the
//! downstream stages need (report format, recipient).

pub mod classifier;
pub mod keywords;

pub use classifier::IntentClassifier;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Recipient placeholder meaning "the requesting user's own address"
pub const SELF_RECIPIENT: &str = "self";

/// Routing intent for a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    /// Retrieve data only
    Query,
    /// Retrieve data and produce a report file
    Report,
    /// Retrieve data and send it as a message
    Notify,
    /// Retrieve, report, and send the report
    Combined,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Query => "query",
            Intent::Report => "report",
            Intent::Notify => "notify",
            Intent::Combined => "combined",
        }
    }

    pub fn wants_report(&self) -> bool {
        matches!(self, Intent::Report | Intent::Combined)
    }

    pub fn wants_notify(&self) -> bool {
        matches!(self, Intent::Notify | Intent::Combined)
    }

    /// Report and notify payloads are derived from query rows
    pub fn needs_query(&self) -> bool {
        true
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "query" => Ok(Intent::Query),
            "report" => Ok(Intent::Report),
            "notify" => Ok(Intent::Notify),
            "combined" => Ok(Intent::Combined),
            other => Err(format!("unknown intent '{}'", other)),
        }
    }
}

/// Output formats the report tool supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Excel,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Excel => "excel",
        }
    }

    /// Map model output ("excel", "xlsx", "spreadsheet") onto a supported format
    pub fn parse_lenient(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "excel" | "xlsx" | "xls" | "spreadsheet" => Some(ReportFormat::Excel),
            _ => None,
        }
    }
}

/// Where a classification came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Model,
    Keywords,
}

/// Classified intent plus extracted parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentClassification {
    pub intent: Intent,
    pub report_format: Option<ReportFormat>,
    /// Explicit address, or [`SELF_RECIPIENT`]
    pub recipient: Option<String>,
    pub source: ClassificationSource,
}

impl IntentClassification {
    pub fn query(source: ClassificationSource) -> Self {
        Self {
            intent: Intent::Query,
            report_format: None,
            recipient: None,
            source,
        }
    }

    pub fn recipient_is_self(&self) -> bool {
        self.recipient.as_deref() == Some(SELF_RECIPIENT)
    }
}
