use uuid::Uuid;

use crate::error::Result;
use crate::identity::Identity;
use crate::store::OrganizationStore;

/// Decides whether an identity may touch an organization's flags.
///
/// Reading only requires membership. Changing flags additionally requires
/// ADMIN or COLLABORATOR, and managing members and invites requires ADMIN.
/// Nothing is cached; every check reads the current membership.
#[derive(Clone)]
pub struct AccessGate {
    organizations: OrganizationStore,
}

impl AccessGate {
    pub fn new(organizations: OrganizationStore) -> Self {
        Self { organizations }
    }

    pub fn authorize_read(&self, identity: &Identity, organization_id: Uuid) -> Result<()> {
        self.organizations
            .has_read_permission(identity.user_id, organization_id)
            .inspect_err(|e| deny("read", identity, organization_id, e))
    }

    pub fn authorize_write(&self, identity: &Identity, organization_id: Uuid) -> Result<()> {
        self.organizations
            .has_write_permission(identity.user_id, organization_id)
            .inspect_err(|e| deny("write", identity, organization_id, e))
    }

    pub fn authorize_admin(&self, identity: &Identity, organization_id: Uuid) -> Result<()> {
        self.organizations
            .has_admin_permission(identity.user_id, organization_id)
            .inspect_err(|e| deny("admin", identity, organization_id, e))
    }
}

fn deny(access: &str, identity: &Identity, organization_id: Uuid, error: &crate::Error) {
    if matches!(error, crate::Error::PermissionDenied) {
        tracing::warn!(access, user_id = %identity.user_id, %organization_id, "Access denied");
    }
}
