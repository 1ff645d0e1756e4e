use std::collections::HashSet;
use std::sync::Arc;

use uuid::Uuid;

use super::{guarded_update, insert, require_name, to_value, ORGANIZATION_COLLECTION};
use crate::db::{DocumentStore, Update};
use crate::error::{Error, Result};
use crate::models::*;

/// Organization records, their members and their invites.
#[derive(Clone)]
pub struct OrganizationStore {
    db: Arc<dyn DocumentStore>,
}

impl OrganizationStore {
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        Self { db }
    }

    /// Persists `record` under a fresh id, writes the id back into it and
    /// returns it. Any id already on the record is replaced.
    pub fn create(&self, record: &mut Organization) -> Result<Uuid> {
        require_name(&record.name, "organization")?;
        check_members(&record.members)?;
        record.id = None;
        let id = insert(self.db.as_ref(), ORGANIZATION_COLLECTION, &*record)?;
        record.id = Some(id);
        tracing::info!(organization_id = %id, name = %record.name, "Organization created");
        Ok(id)
    }

    pub fn find_by_id(&self, id: Uuid) -> Result<Organization> {
        super::find_by_id(self.db.as_ref(), ORGANIZATION_COLLECTION, id)
    }

    /// Succeeds if `user_id` is any kind of member of the organization.
    pub fn has_read_permission(&self, user_id: Uuid, organization_id: Uuid) -> Result<()> {
        let organization = self.find_by_id(organization_id)?;
        organization
            .member(user_id)
            .map(|_| ())
            .ok_or(Error::PermissionDenied)
    }

    /// Succeeds if `user_id` is an ADMIN or COLLABORATOR member.
    pub fn has_write_permission(&self, user_id: Uuid, organization_id: Uuid) -> Result<()> {
        self.require_level(user_id, organization_id, PermissionLevel::can_write)
    }

    /// Succeeds if `user_id` is an ADMIN member.
    pub fn has_admin_permission(&self, user_id: Uuid, organization_id: Uuid) -> Result<()> {
        self.require_level(user_id, organization_id, |level| {
            *level == PermissionLevel::Admin
        })
    }

    fn require_level(
        &self,
        user_id: Uuid,
        organization_id: Uuid,
        allowed: impl Fn(&PermissionLevel) -> bool,
    ) -> Result<()> {
        let organization = self.find_by_id(organization_id)?;
        match organization.member(user_id) {
            Some(member) if allowed(&member.permission_level) => Ok(()),
            _ => Err(Error::PermissionDenied),
        }
    }

    pub fn add_member(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        permission_level: PermissionLevel,
    ) -> Result<Organization> {
        let organization = self.find_by_id(organization_id)?;
        if organization.member(user_id).is_some() {
            return Err(Error::Conflict(format!(
                "user {user_id} is already a member of organization {organization_id}"
            )));
        }

        let member = OrganizationMember {
            user_id,
            permission_level,
        };
        self.write(&organization, Update::new().push("members", to_value(&member)?))?;
        tracing::info!(%organization_id, %user_id, level = permission_level.as_str(), "Member added");
        self.find_by_id(organization_id)
    }

    pub fn set_member_permission(
        &self,
        organization_id: Uuid,
        user_id: Uuid,
        permission_level: PermissionLevel,
    ) -> Result<Organization> {
        let organization = self.find_by_id(organization_id)?;
        let index = member_index(&organization, user_id)?;
        let current = organization.members[index].permission_level;
        if current == permission_level {
            return Ok(organization);
        }
        if current == PermissionLevel::Admin && organization.admin_count() == 1 {
            return Err(Error::Validation(
                "an organization must keep at least one admin".to_string(),
            ));
        }

        self.write(
            &organization,
            Update::new().set(
                format!("members.{index}.permission_level"),
                permission_level.as_str(),
            ),
        )?;
        tracing::info!(%organization_id, %user_id, level = permission_level.as_str(), "Member permission changed");
        self.find_by_id(organization_id)
    }

    pub fn remove_member(&self, organization_id: Uuid, user_id: Uuid) -> Result<Organization> {
        let organization = self.find_by_id(organization_id)?;
        let index = member_index(&organization, user_id)?;
        if organization.members[index].permission_level == PermissionLevel::Admin
            && organization.admin_count() == 1
        {
            return Err(Error::Validation(
                "cannot remove the last admin of an organization".to_string(),
            ));
        }

        let mut members = organization.members.clone();
        members.remove(index);
        self.write(&organization, Update::new().set("members", to_value(&members)?))?;
        tracing::info!(%organization_id, %user_id, "Member removed");
        self.find_by_id(organization_id)
    }

    /// Records a pending invite for `email`. At most one pending invite may
    /// exist per address.
    pub fn invite(&self, organization_id: Uuid, email: &str) -> Result<Organization> {
        let email = normalize_email(email)?;
        let organization = self.find_by_id(organization_id)?;
        if pending_invite_index(&organization, &email).is_some() {
            return Err(Error::Conflict(format!("{email} already has a pending invite")));
        }

        let invite = OrganizationInvite {
            email,
            status: InviteStatus::Pending,
        };
        self.write(&organization, Update::new().push("invites", to_value(&invite)?))?;
        tracing::info!(%organization_id, "Invite created");
        self.find_by_id(organization_id)
    }

    pub fn cancel_invite(&self, organization_id: Uuid, email: &str) -> Result<Organization> {
        let email = normalize_email(email)?;
        let organization = self.find_by_id(organization_id)?;
        let index = pending_invite_index(&organization, &email)
            .ok_or_else(|| Error::not_found("invite", &email))?;

        self.write(
            &organization,
            Update::new().set(
                format!("invites.{index}.status"),
                InviteStatus::Cancelled.as_str(),
            ),
        )?;
        tracing::info!(%organization_id, "Invite cancelled");
        self.find_by_id(organization_id)
    }

    fn write(&self, organization: &Organization, update: Update) -> Result<()> {
        let id = organization
            .id
            .ok_or_else(|| anyhow::anyhow!("organization loaded without an id"))?;
        guarded_update(
            self.db.as_ref(),
            ORGANIZATION_COLLECTION,
            id,
            organization.updated_at,
            update,
        )
    }
}

/// Member ids are unique and at least one member is an admin.
fn check_members(members: &[OrganizationMember]) -> Result<()> {
    let mut seen = HashSet::new();
    if let Some(duplicate) = members.iter().find(|m| !seen.insert(m.user_id)) {
        return Err(Error::Conflict(format!(
            "user {} is listed as a member more than once",
            duplicate.user_id
        )));
    }
    if !members
        .iter()
        .any(|m| m.permission_level == PermissionLevel::Admin)
    {
        return Err(Error::Validation(
            "an organization must have at least one admin".to_string(),
        ));
    }
    Ok(())
}

fn member_index(organization: &Organization, user_id: Uuid) -> Result<usize> {
    organization
        .members
        .iter()
        .position(|m| m.user_id == user_id)
        .ok_or_else(|| Error::not_found("member", user_id))
}

fn pending_invite_index(organization: &Organization, email: &str) -> Option<usize> {
    organization
        .invites
        .iter()
        .position(|i| i.status == InviteStatus::Pending && i.email == email)
}

fn normalize_email(email: &str) -> Result<String> {
    let email = email.trim().to_lowercase();
    let valid = matches!(
        email.split_once('@'),
        Some((local, domain)) if !local.is_empty() && !domain.is_empty()
    );
    if !valid {
        return Err(Error::Validation(format!("{email:?} is not an email address")));
    }
    Ok(email)
}
