//! Authentication primitives for Granska.
//!
//! The surrounding application owns the real sign-in flow; the core only
//! needs a resolved principal per request. `Authenticator` is the seam
//! where the HTTP layer turns credentials into a principal, and
//! `RequestContext` is what the orchestrator checks before creating any
//! task record.

use crate::error::{GranskaError, Result};
use std::collections::HashMap;

/// An authenticated principal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    /// Opaque identifier; every task and query is scoped to it.
    pub id: String,
}

impl Principal {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Per-request context handed to the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// The resolved principal, if any. `None` means the request was not
    /// authenticated; the orchestrator rejects it before touching the
    /// store.
    pub principal: Option<Principal>,
}

impl RequestContext {
    /// Context for an authenticated principal.
    pub fn authenticated(id: impl Into<String>) -> Self {
        Self {
            principal: Some(Principal::new(id)),
        }
    }

    /// Context with no principal.
    pub fn anonymous() -> Self {
        Self { principal: None }
    }

    /// The principal, or `Unauthenticated` if the request carries none.
    pub fn require_principal(&self) -> Result<&Principal> {
        self.principal
            .as_ref()
            .ok_or(GranskaError::Unauthenticated)
    }
}

/// Resolves request credentials to a principal.
pub trait Authenticator: Send + Sync {
    /// Resolve a bearer token to a principal, or `Unauthenticated`.
    fn authenticate(&self, bearer_token: Option<&str>) -> Result<Principal>;
}

/// Static token-to-principal mapping, loaded from configuration.
///
/// Stands in for the session-based auth of the surrounding application.
pub struct TokenAuthenticator {
    tokens: HashMap<String, String>,
}

impl TokenAuthenticator {
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self { tokens }
    }
}

impl Authenticator for TokenAuthenticator {
    fn authenticate(&self, bearer_token: Option<&str>) -> Result<Principal> {
        let token = bearer_token.ok_or(GranskaError::Unauthenticated)?;
        self.tokens
            .get(token)
            .map(|id| Principal::new(id.clone()))
            .ok_or(GranskaError::Unauthenticated)
    }
}
