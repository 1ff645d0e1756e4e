//! Authenticated caller identities.
//!
//! Credential checks and token issuance live outside this crate. All the
//! stores ever see is the opaque user id an [`Authenticator`] resolves from a
//! bearer token.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub user_id: Uuid,
}

/// Resolves a bearer token to the identity it was issued for.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, token: &str) -> Option<Identity>;
}

/// Fixed token table, typically loaded from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticTokens {
    tokens: HashMap<String, Uuid>,
}

impl StaticTokens {
    pub fn new(tokens: HashMap<String, Uuid>) -> Self {
        Self { tokens }
    }

    pub fn with_token(mut self, token: impl Into<String>, user_id: Uuid) -> Self {
        self.tokens.insert(token.into(), user_id);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

impl Authenticator for StaticTokens {
    fn authenticate(&self, token: &str) -> Option<Identity> {
        self.tokens
            .get(token)
            .map(|&user_id| Identity { user_id })
    }
}
