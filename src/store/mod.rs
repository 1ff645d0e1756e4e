//! Organization and feature flag stores over a [`DocumentStore`].
//!
//! Stores keep no state besides the injected document store handle, so they
//! are cheap to clone and safe to share between concurrent requests. Every
//! mutation is a single guarded document update: the filter pins the
//! `updated_at` value that was read, so a concurrent writer makes the update
//! match nothing and the call fails with [`Error::Conflict`] instead of
//! overwriting newer state.

mod feature_flag;
mod organization;

pub use feature_flag::FeatureFlagStore;
pub use organization::OrganizationStore;

use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use crate::db::{DocumentStore, Filter, Update};
use crate::error::{Error, Result};

pub const ORGANIZATION_COLLECTION: &str = "organization";
pub const FEATURE_FLAG_COLLECTION: &str = "feature_flag";

fn to_value<T: Serialize>(value: &T) -> Result<Value> {
    Ok(serde_json::to_value(value).context("Failed to encode document")?)
}

fn decode<T: DeserializeOwned>(collection: &str, document: Value) -> Result<T> {
    Ok(serde_json::from_value(document)
        .with_context(|| format!("Failed to decode {collection} document"))?)
}

/// Inserts `record` under a freshly generated id and checks that the store
/// recorded that same id.
fn insert<T: Serialize>(db: &dyn DocumentStore, collection: &str, record: &T) -> Result<Uuid> {
    let id = Uuid::new_v4();
    let mut document = to_value(record)?;
    let Some(fields) = document.as_object_mut() else {
        return Err(anyhow::anyhow!("{collection} record is not an object").into());
    };
    fields.insert("_id".to_string(), Value::String(id.to_string()));

    let stored = db.insert_one(collection, document)?;
    if stored != id {
        tracing::error!(collection, %id, %stored, "Storage returned a different identifier");
        return Err(Error::IdentityAssertion {
            expected: id,
            actual: stored,
        });
    }
    Ok(id)
}

fn find_by_id<T: DeserializeOwned>(
    db: &dyn DocumentStore,
    collection: &'static str,
    id: Uuid,
) -> Result<T> {
    match db.find_one(collection, &Filter::id(id))? {
        Some(document) => decode(collection, document),
        None => Err(Error::not_found(collection, id)),
    }
}

/// A timestamp strictly after `previous`, so the guard of the next writer
/// always sees a change.
fn next_timestamp(previous: DateTime<Utc>) -> DateTime<Utc> {
    Utc::now().max(previous + Duration::microseconds(1))
}

/// Applies `update` to document `id` only if it still carries
/// `read_updated_at`, refreshing `updated_at` in the same write.
fn guarded_update(
    db: &dyn DocumentStore,
    collection: &'static str,
    id: Uuid,
    read_updated_at: DateTime<Utc>,
    update: Update,
) -> Result<()> {
    let filter = Filter::id(id).and("updated_at", to_value(&read_updated_at)?);
    let update = update.set("updated_at", to_value(&next_timestamp(read_updated_at))?);

    if db.update_one(collection, &filter, &update)? {
        tracing::debug!(collection, %id, ops = update.ops().len(), "Document updated");
        Ok(())
    } else {
        tracing::warn!(collection, %id, "Concurrent modification detected");
        Err(Error::Conflict(format!(
            "{collection} {id} was modified concurrently, reload and retry"
        )))
    }
}

fn require_name(name: &str, what: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(Error::Validation(format!("{what} name must not be empty")));
    }
    Ok(())
}
