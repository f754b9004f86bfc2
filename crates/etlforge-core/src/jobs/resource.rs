//! Named external resources shared across job run-functions
//!
//! Mirrors the source's `Resource`/`ResourceManager`: a small, keyed
//! registry of shared handles (a DB connection, an HTTP client, a file
//! lock) that run-functions may look up by key at startup instead of
//! each job hard-wiring its own. Registered once alongside the job
//! catalog and validated for key-uniqueness the same way job names are.

use std::collections::HashSet;

/// A named external resource the embedding application registers
/// alongside its job catalog. `open`/`close` are left to the embedding
/// application (this crate only owns the key-uniqueness contract); the
/// handle itself is opaque to the orchestrator, the same way a job's
/// `config` is.
#[derive(Clone)]
pub struct Resource {
    pub key: String,
}

impl Resource {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }
}

/// Check that no two resources share a key, the way
/// `JobCatalog::build_with_resources` checks job names. Returns the set
/// of duplicated keys, empty if all keys are unique.
pub fn duplicate_keys<'a>(resources: impl IntoIterator<Item = &'a Resource>) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut duplicates = Vec::new();
    for resource in resources {
        if !seen.insert(resource.key.clone()) {
            duplicates.push(resource.key.clone());
        }
    }
    duplicates
}
