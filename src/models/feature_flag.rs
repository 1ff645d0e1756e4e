use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A feature flag and its full revision history.
///
/// Revisions are append-only and kept in chronological order, so index 0 is
/// the first revision ever written. At most one revision is `Live` at a time;
/// the store archives the previous live revision whenever another one goes
/// live.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureFlag {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub organization_id: Uuid,
    pub user_id: Uuid,
    /// Schema version of the flag itself, not a revision counter.
    pub version: i32,
    pub name: String,
    #[serde(rename = "type")]
    pub flag_type: FlagType,
    pub revisions: Vec<Revision>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FeatureFlag {
    /// A version 1 flag with a single draft revision authored by `user_id`.
    pub fn new(
        organization_id: Uuid,
        user_id: Uuid,
        name: impl Into<String>,
        flag_type: FlagType,
        default_value: impl Into<String>,
        rules: Vec<Rule>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            organization_id,
            user_id,
            version: 1,
            name: name.into(),
            flag_type,
            revisions: vec![Revision::new(user_id, default_value, rules)],
            created_at: now,
            updated_at: now,
        }
    }

    pub fn live_revision(&self) -> Option<&Revision> {
        self.revisions
            .iter()
            .find(|r| r.status == RevisionStatus::Live)
    }

    pub fn revision_index(&self, revision_id: Uuid) -> Option<usize> {
        self.revisions.iter().position(|r| r.id == revision_id)
    }
}

/// One snapshot of a flag's default value and rules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Revision {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub user_id: Uuid,
    pub status: RevisionStatus,
    pub default_value: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

impl Revision {
    /// A draft revision with a fresh id.
    pub fn new(user_id: Uuid, default_value: impl Into<String>, rules: Vec<Rule>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            status: RevisionStatus::Draft,
            default_value: default_value.into(),
            rules,
        }
    }
}

/// Lifecycle of a revision: Draft → Live → Archived.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RevisionStatus {
    Draft,
    Live,
    Archived,
}

impl RevisionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Live => "live",
            Self::Archived => "archived",
        }
    }
}

/// An environment-scoped predicate/value pair.
///
/// Rules are ordered; any evaluator checks earlier rules first, skips rules
/// for other environments and skips disabled rules.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub predicate: String,
    pub value: String,
    pub env: String,
    pub is_enabled: bool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FlagType {
    Boolean,
    Json,
    String,
    Number,
}

impl FlagType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Json => "json",
            Self::String => "string",
            Self::Number => "number",
        }
    }

    /// Whether a string-encoded value can be read as this type.
    pub fn accepts(&self, value: &str) -> bool {
        match self {
            Self::Boolean => matches!(value, "true" | "false"),
            Self::Number => value.parse::<f64>().is_ok_and(f64::is_finite),
            Self::Json => serde_json::from_str::<serde_json::Value>(value).is_ok(),
            Self::String => true,
        }
    }
}

/// Input for creating a flag in an organization.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateFlagInput {
    pub name: String,
    #[serde(rename = "type")]
    pub flag_type: FlagType,
    pub default_value: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// Input for appending a new draft revision to a flag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateRevisionInput {
    pub default_value: String,
    #[serde(default)]
    pub rules: Vec<Rule>,
}

/// Partial edit of a draft revision. Absent fields are left alone.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateRevisionInput {
    pub default_value: Option<String>,
    pub rules: Option<Vec<Rule>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenameFlagInput {
    pub name: String,
}
