use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_schema_version() -> String {
    "1.0".to_string()
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    #[serde(rename = "critical")]
    Critical = 5,
    #[serde(rename = "high")]
    High = 4,
    #[serde(rename = "medium")]
    Medium = 3,
    #[serde(rename = "low")]
    Low = 2,
    #[serde(rename = "info")]
    Info = 1,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Finding {
    pub severity: Severity,
    pub fid: String,
    pub file: String,
    #[serde(default)]
    pub line: Option<u32>,
    pub rule_id: String,
    pub summary: String,
    pub engine: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq, Eq)]
pub struct SeveritySummary {
    #[serde(default)]
    pub critical: u32,
    #[serde(default)]
    pub high: u32,
    #[serde(default)]
    pub medium: u32,
    #[serde(default)]
    pub low: u32,
    #[serde(default)]
    pub info: u32,
}

impl SeveritySummary {
    pub fn from_findings(findings: &[Finding]) -> Self {
        let mut summary = Self::default();
        for finding in findings {
            match finding.severity {
                Severity::Critical => summary.critical += 1,
                Severity::High => summary.high += 1,
                Severity::Medium => summary.medium += 1,
                Severity::Low => summary.low += 1,
                Severity::Info => summary.info += 1,
            }
        }
        summary
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct ReviewArtifact {
    #[serde(default)]
    pub findings: Vec<Finding>,
    #[serde(default)]
    pub severity_summary: SeveritySummary,
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
}
