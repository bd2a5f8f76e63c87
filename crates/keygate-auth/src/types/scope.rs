//! Scope lists and the [`ScopeHolder`] capability.

use serde::{Deserialize, Serialize};

/// An ordered, duplicate-free list of granted scopes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scopes(Vec<String>);

impl Scopes {
    /// Creates a scope list, dropping duplicates while keeping first-seen order.
    pub fn new<I, S>(scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Self::default();
        list.extend(scopes);
        list
    }

    /// The scopes in grant order.
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Returns `true` if `scope` is granted.
    pub fn contains(&self, scope: &str) -> bool {
        self.0.iter().any(|s| s == scope)
    }

    /// Grants `scope`. Returns `false` if it was already granted.
    pub fn insert(&mut self, scope: impl Into<String>) -> bool {
        let scope = scope.into();
        if self.contains(&scope) {
            return false;
        }
        self.0.push(scope);
        true
    }

    /// Grants every scope in `scopes`. Returns `true` if anything was added.
    pub fn extend<I, S>(&mut self, scopes: I) -> bool
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        scopes
            .into_iter()
            .fold(false, |changed, scope| self.insert(scope) || changed)
    }

    /// Revokes `scope`. Returns `false` if it was not granted.
    pub fn remove(&mut self, scope: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|s| s != scope);
        self.0.len() != before
    }

    /// Number of granted scopes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if nothing is granted.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Capability of entities that carry granted scopes.
///
/// Mutators report whether anything changed so callers only persist real
/// changes.
pub trait ScopeHolder {
    fn scopes(&self) -> &Scopes;

    fn scopes_mut(&mut self) -> &mut Scopes;

    fn has_scope(&self, scope: &str) -> bool {
        self.scopes().contains(scope)
    }

    fn add_scope(&mut self, scope: &str) -> bool {
        self.scopes_mut().insert(scope)
    }

    fn add_scopes(&mut self, scopes: &[&str]) -> bool {
        self.scopes_mut().extend(scopes.iter().copied())
    }

    fn remove_scope(&mut self, scope: &str) -> bool {
        self.scopes_mut().remove(scope)
    }

    fn remove_scopes(&mut self, scopes: &[&str]) -> bool {
        scopes
            .iter()
            .fold(false, |changed, scope| self.remove_scope(scope) || changed)
    }

    /// Returns `true` if any of `requested` is not granted.
    fn is_scope_exceeded(&self, requested: &[&str]) -> bool {
        requested.iter().any(|scope| !self.has_scope(scope))
    }
}
