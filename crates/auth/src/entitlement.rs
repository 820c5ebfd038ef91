//! Entitlement records and membership checks (no IO).

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// A named group/role grant for a subject, as returned by the entitlement service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entitlement {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub tenant_id: String,
}

/// Point-in-time snapshot of a subject's entitlements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntitlementSet(Vec<Entitlement>);

impl EntitlementSet {
    pub fn new(entitlements: Vec<Entitlement>) -> Self {
        Self(entitlements)
    }

    /// Decode the entitlement service's JSON array body.
    pub fn from_json(body: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(body)
    }

    /// First entitlement whose name is required. First match wins; no scoring.
    pub fn first_match(&self, required: &RequiredEntitlements) -> Option<&Entitlement> {
        self.0.iter().find(|e| required.contains(&e.name))
    }

    pub fn iter(&self) -> impl Iterator<Item = &Entitlement> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Names a caller must hold at least one of.
///
/// An empty requirement matches nothing: a route protected with no names is
/// closed, not open.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequiredEntitlements(HashSet<String>);

impl RequiredEntitlements {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(names.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Sorted names (stable output for logs/events).
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.0.iter().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}
