use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// An organization owns its members and invites and, by reference, a set of
/// feature flags.
///
/// Records built with [`Organization::new`] carry no id; the store assigns
/// one on insert, and `_id` is left out of the serialized form until then.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Organization {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    pub name: String,
    pub members: Vec<OrganizationMember>,
    #[serde(default)]
    pub invites: Vec<OrganizationInvite>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Organization {
    /// A fresh organization whose only member is `admin`, with ADMIN rights.
    pub fn new(name: impl Into<String>, admin: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            name: name.into(),
            members: vec![OrganizationMember {
                user_id: admin,
                permission_level: PermissionLevel::Admin,
            }],
            invites: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn member(&self, user_id: Uuid) -> Option<&OrganizationMember> {
        self.members.iter().find(|m| m.user_id == user_id)
    }

    pub fn admin_count(&self) -> usize {
        self.members
            .iter()
            .filter(|m| m.permission_level == PermissionLevel::Admin)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationMember {
    pub user_id: Uuid,
    pub permission_level: PermissionLevel,
}

/// Coarse role of a member within an organization.
///
/// - `Admin`: manages members and invites, and may change flags
/// - `Collaborator`: may create and change flags
/// - `ReadOnly`: may only read flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionLevel {
    Admin,
    Collaborator,
    ReadOnly,
}

impl PermissionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "ADMIN",
            Self::Collaborator => "COLLABORATOR",
            Self::ReadOnly => "READ_ONLY",
        }
    }

    pub fn can_write(&self) -> bool {
        matches!(self, Self::Admin | Self::Collaborator)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationInvite {
    pub email: String,
    pub status: InviteStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Denied,
    #[serde(alias = "CANCELED")]
    Cancelled,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Accepted => "ACCEPTED",
            Self::Denied => "DENIED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

/// Input for creating an organization. The creator comes from the caller's
/// identity, not the request body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateOrganizationInput {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddMemberInput {
    pub user_id: Uuid,
    pub permission_level: PermissionLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetPermissionInput {
    pub permission_level: PermissionLevel,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InviteInput {
    pub email: String,
}
