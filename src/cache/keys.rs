//! Cache key definitions.
//!
//! Entries are keyed `<namespace>:<id>` for single entities and
//! `<namespace>:all` for the full collection. Identifiers are UUIDs, so the
//! literal `all` never collides with an entity key.

use std::fmt;

use uuid::Uuid;

pub const BOOKS_NAMESPACE: &str = "books";

const COLLECTION_SUFFIX: &str = "all";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn entity(namespace: &str, id: Uuid) -> Self {
        Self(format!("{namespace}:{id}"))
    }

    pub fn collection(namespace: &str) -> Self {
        Self(format!("{namespace}:{COLLECTION_SUFFIX}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub fn book(id: Uuid) -> CacheKey {
    CacheKey::entity(BOOKS_NAMESPACE, id)
}

pub fn all_books() -> CacheKey {
    CacheKey::collection(BOOKS_NAMESPACE)
}

/// Every key a change to the given book makes stale.
pub fn book_dependents(id: Uuid) -> [CacheKey; 2] {
    [book(id), all_books()]
}
