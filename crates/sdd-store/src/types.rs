use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Project,
    Personal,
}

impl Scope {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scope::Project => "project",
            Scope::Personal => "personal",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "project" => Some(Scope::Project),
            "personal" => Some(Scope::Personal),
            _ => None,
        }
    }
}

impl Default for Scope {
    fn default() -> Self {
        Scope::Project
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelationType {
    RelatesTo,
    DependsOn,
    CausedBy,
    Implements,
    Supersedes,
    PartOf,
}

impl RelationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelationType::RelatesTo => "relates_to",
            RelationType::DependsOn => "depends_on",
            RelationType::CausedBy => "caused_by",
            RelationType::Implements => "implements",
            RelationType::Supersedes => "supersedes",
            RelationType::PartOf => "part_of",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "relates_to" => Some(RelationType::RelatesTo),
            "depends_on" => Some(RelationType::DependsOn),
            "caused_by" => Some(RelationType::CausedBy),
            "implements" => Some(RelationType::Implements),
            "supersedes" => Some(RelationType::Supersedes),
            "part_of" => Some(RelationType::PartOf),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Observation {
    pub id: i64,
    pub session_id: Option<i64>,
    #[serde(rename = "type")]
    pub obs_type: String,
    pub title: String,
    pub content: String,
    pub project: Option<String>,
    pub scope: Scope,
    pub topic_key: Option<String>,
    pub namespace: Option<String>,
    pub revision_count: i64,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relation {
    pub id: i64,
    pub from_obs_id: i64,
    pub to_obs_id: i64,
    pub relation_type: RelationType,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserPrompt {
    pub id: i64,
    pub session_id: Option<i64>,
    pub content: String,
    pub project: Option<String>,
    pub namespace: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Default)]
pub struct ObservationFilter {
    pub project: Option<String>,
    pub scope: Option<Scope>,
    pub namespace: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct AddObservationParams {
    pub session_id: Option<i64>,
    pub obs_type: String,
    pub title: String,
    pub content: String,
    pub project: Option<String>,
    pub scope: Scope,
    pub topic_key: Option<String>,
    pub namespace: Option<String>,
}
