use std::fmt;

/// Opaque fingerprint over the full registry state at a point in time.
///
/// Identical registry state produces an identical token; any mutation to any
/// tracked file produces a different one. The token is the optimistic-
/// concurrency guard for batch submissions: a caller holding a token computed
/// from state the registry has since left is told to refresh, never allowed
/// to barge ahead. Tokens are never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SnapshotToken(String);

impl SnapshotToken {
    /// Wrap a finished digest. Only the snapshot generator should call this.
    #[must_use]
    pub fn from_digest(digest: String) -> Self {
        Self(digest)
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SnapshotToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
