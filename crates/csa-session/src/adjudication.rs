use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

fn default_schema_version() -> String {
    "1.0".to_string()
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected,
    Deferred,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AdjudicationRecord {
    pub finding_fid: String,
    pub verdict: Verdict,
    pub rationale: String,
    pub reviewer: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AdjudicationSet {
    #[serde(default)]
    pub records: Vec<AdjudicationRecord>,
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
}

impl AdjudicationSet {
    pub fn new() -> Self {
        Self {
            records: Vec::new(),
            schema_version: default_schema_version(),
        }
    }

    pub fn add(&mut self, record: AdjudicationRecord) {
        self.records.push(record);
    }

    pub fn verdict_for(&self, fid: &str) -> Option<&Verdict> {
        self.records
            .iter()
            .rev()
            .find(|record| record.finding_fid == fid)
            .map(|record| &record.verdict)
    }
}
