use std::sync::Arc;

use uuid::Uuid;

use super::{
    decode, guarded_update, insert, require_name, to_value, FEATURE_FLAG_COLLECTION,
};
use crate::db::{DocumentStore, Filter, Update};
use crate::error::{Error, Result};
use crate::models::*;

/// Feature flag records and their revision history.
///
/// Besides create and lookup, flags only change through the named mutations
/// below. A revision going live supersedes everything older than it: the
/// previously live revision and any older drafts are archived in the same
/// write, so a flag never has two live revisions.
#[derive(Clone)]
pub struct FeatureFlagStore {
    db: Arc<dyn DocumentStore>,
}

impl FeatureFlagStore {
    pub fn new(db: Arc<dyn DocumentStore>) -> Self {
        Self { db }
    }

    /// Persists `record` under a fresh id, writes the id back into it and
    /// returns it. Any id already on the record is replaced.
    pub fn create(&self, record: &mut FeatureFlag) -> Result<Uuid> {
        require_name(&record.name, "flag")?;
        for revision in &record.revisions {
            check_values(record.flag_type, &revision.default_value, &revision.rules)?;
        }
        if record.revisions.iter().filter(|r| r.status == RevisionStatus::Live).count() > 1 {
            return Err(Error::Validation(
                "a flag may have at most one live revision".to_string(),
            ));
        }

        record.id = None;
        let id = insert(self.db.as_ref(), FEATURE_FLAG_COLLECTION, &*record)?;
        record.id = Some(id);
        tracing::info!(
            flag_id = %id,
            organization_id = %record.organization_id,
            name = %record.name,
            "Feature flag created"
        );
        Ok(id)
    }

    pub fn find_by_id(&self, id: Uuid) -> Result<FeatureFlag> {
        super::find_by_id(self.db.as_ref(), FEATURE_FLAG_COLLECTION, id)
    }

    /// Every flag of an organization, in storage order. An organization
    /// without flags yields an empty list.
    pub fn find_many(&self, organization_id: Uuid) -> Result<Vec<FeatureFlag>> {
        let filter = Filter::eq("organization_id", organization_id.to_string());
        self.db
            .find_many(FEATURE_FLAG_COLLECTION, &filter)?
            .into_iter()
            .map(|document| decode(FEATURE_FLAG_COLLECTION, document))
            .collect()
    }

    /// Appends `revision` to the flag's history. Appending a live revision
    /// supersedes every existing revision.
    pub fn append_revision(&self, flag_id: Uuid, revision: Revision) -> Result<FeatureFlag> {
        let flag = self.find_by_id(flag_id)?;
        check_values(flag.flag_type, &revision.default_value, &revision.rules)?;
        if flag.revision_index(revision.id).is_some() {
            return Err(Error::Conflict(format!(
                "revision {} already exists on flag {flag_id}",
                revision.id
            )));
        }

        let mut update = Update::new();
        if revision.status == RevisionStatus::Live {
            update = supersede(&flag, flag.revisions.len(), update);
        }
        update = update.push("revisions", to_value(&revision)?);

        self.write(&flag, update)?;
        tracing::info!(
            %flag_id,
            revision_id = %revision.id,
            status = revision.status.as_str(),
            "Revision appended"
        );
        self.find_by_id(flag_id)
    }

    /// Makes a draft or archived revision live, archiving the current live
    /// revision and older drafts. Newer drafts are left alone. Promoting the
    /// live revision again changes nothing.
    pub fn promote_revision(&self, flag_id: Uuid, revision_id: Uuid) -> Result<FeatureFlag> {
        let flag = self.find_by_id(flag_id)?;
        let index = revision_index(&flag, revision_id)?;
        if flag.revisions[index].status == RevisionStatus::Live {
            return Ok(flag);
        }

        let update = supersede(&flag, index, Update::new()).set(
            format!("revisions.{index}.status"),
            RevisionStatus::Live.as_str(),
        );
        self.write(&flag, update)?;
        tracing::info!(%flag_id, %revision_id, "Revision promoted to live");
        self.find_by_id(flag_id)
    }

    /// Archives a revision. Archiving the live revision leaves the flag with
    /// no live revision.
    pub fn archive_revision(&self, flag_id: Uuid, revision_id: Uuid) -> Result<FeatureFlag> {
        let flag = self.find_by_id(flag_id)?;
        let index = revision_index(&flag, revision_id)?;
        if flag.revisions[index].status == RevisionStatus::Archived {
            return Ok(flag);
        }

        self.write(
            &flag,
            Update::new().set(
                format!("revisions.{index}.status"),
                RevisionStatus::Archived.as_str(),
            ),
        )?;
        tracing::info!(%flag_id, %revision_id, "Revision archived");
        self.find_by_id(flag_id)
    }

    pub fn set_default_value(
        &self,
        flag_id: Uuid,
        revision_id: Uuid,
        default_value: &str,
    ) -> Result<FeatureFlag> {
        let edit = UpdateRevisionInput {
            default_value: Some(default_value.to_string()),
            rules: None,
        };
        self.edit_draft(flag_id, revision_id, &edit)
    }

    pub fn set_rules(&self, flag_id: Uuid, revision_id: Uuid, rules: &[Rule]) -> Result<FeatureFlag> {
        let edit = UpdateRevisionInput {
            default_value: None,
            rules: Some(rules.to_vec()),
        };
        self.edit_draft(flag_id, revision_id, &edit)
    }

    /// Changes a draft's default value and rules in a single write. Both are
    /// checked against the flag type first, so a rejected edit changes
    /// nothing.
    pub fn edit_draft(
        &self,
        flag_id: Uuid,
        revision_id: Uuid,
        edit: &UpdateRevisionInput,
    ) -> Result<FeatureFlag> {
        let flag = self.find_by_id(flag_id)?;
        let index = draft_index(&flag, revision_id)?;
        let draft = &flag.revisions[index];
        let default_value = edit.default_value.as_deref().unwrap_or(&draft.default_value);
        let rules = edit.rules.as_deref().unwrap_or(&draft.rules);
        check_values(flag.flag_type, default_value, rules)?;

        let mut update = Update::new();
        if let Some(default_value) = &edit.default_value {
            update = update.set(format!("revisions.{index}.default_value"), default_value.as_str());
        }
        if let Some(rules) = &edit.rules {
            update = update.set(format!("revisions.{index}.rules"), to_value(rules)?);
        }
        if update.is_empty() {
            return Ok(flag);
        }

        self.write(&flag, update)?;
        tracing::debug!(
            %flag_id,
            %revision_id,
            default_value = edit.default_value.is_some(),
            rules = edit.rules.as_ref().map(Vec::len),
            "Draft edited"
        );
        self.find_by_id(flag_id)
    }

    pub fn rename(&self, flag_id: Uuid, name: &str) -> Result<FeatureFlag> {
        require_name(name, "flag")?;
        let flag = self.find_by_id(flag_id)?;
        if flag.name == name {
            return Ok(flag);
        }

        self.write(&flag, Update::new().set("name", name))?;
        tracing::info!(%flag_id, name, "Feature flag renamed");
        self.find_by_id(flag_id)
    }

    fn write(&self, flag: &FeatureFlag, update: Update) -> Result<()> {
        let id = flag
            .id
            .ok_or_else(|| anyhow::anyhow!("feature flag loaded without an id"))?;
        guarded_update(
            self.db.as_ref(),
            FEATURE_FLAG_COLLECTION,
            id,
            flag.updated_at,
            update,
        )
    }
}

/// Archives the live revision and every draft before `index`.
fn supersede(flag: &FeatureFlag, index: usize, update: Update) -> Update {
    flag.revisions
        .iter()
        .enumerate()
        .filter(|(i, r)| match r.status {
            RevisionStatus::Live => *i != index,
            RevisionStatus::Draft => *i < index,
            RevisionStatus::Archived => false,
        })
        .fold(update, |update, (index, _)| {
            update.set(
                format!("revisions.{index}.status"),
                RevisionStatus::Archived.as_str(),
            )
        })
}

fn revision_index(flag: &FeatureFlag, revision_id: Uuid) -> Result<usize> {
    flag.revision_index(revision_id)
        .ok_or_else(|| Error::not_found("revision", revision_id))
}

/// Only drafts are editable; live and archived revisions are history.
fn draft_index(flag: &FeatureFlag, revision_id: Uuid) -> Result<usize> {
    let index = revision_index(flag, revision_id)?;
    let status = flag.revisions[index].status;
    if status != RevisionStatus::Draft {
        return Err(Error::Validation(format!(
            "revision {revision_id} is {} and can no longer be edited",
            status.as_str()
        )));
    }
    Ok(index)
}

fn check_values(flag_type: FlagType, default_value: &str, rules: &[Rule]) -> Result<()> {
    let rule_values = rules.iter().map(|r| r.value.as_str());
    for value in std::iter::once(default_value).chain(rule_values) {
        if !flag_type.accepts(value) {
            return Err(Error::Validation(format!(
                "{value:?} is not a valid {} value",
                flag_type.as_str()
            )));
        }
    }
    if let Some(rule) = rules.iter().find(|r| r.env.trim().is_empty()) {
        return Err(Error::Validation(format!(
            "rule {:?} has no environment",
            rule.predicate
        )));
    }
    Ok(())
}
