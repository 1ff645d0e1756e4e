//! Domain models for flagkeeper.
//!
//! - [`Organization`]: owns its members (user + [`PermissionLevel`]) and
//!   invites. Flags are linked to it by `organization_id`, never embedded.
//! - [`FeatureFlag`]: owns an append-only list of [`Revision`]s, each with
//!   its own ordered [`Rule`]s.
//!
//! Constructors on these types establish the initial state of new records;
//! the stores in [`crate::store`] persist them.

mod feature_flag;
mod organization;

pub use feature_flag::*;
pub use organization::*;
