//! Copy-on-write limit profile table.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokenguard_types::LimitProfile;

/// Immutable snapshot of the default profile and per-identity overrides.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LimitTable {
    pub default: LimitProfile,
    pub profiles: HashMap<String, LimitProfile>,
}

impl LimitTable {
    /// Exact-match lookup, falling back to the default profile.
    pub fn resolve(&self, identity: &str) -> &LimitProfile {
        self.profiles.get(identity).unwrap_or(&self.default)
    }
}

/// Readers clone the current `Arc`; every write swaps in a fresh table.
#[derive(Debug, Default)]
pub struct LimitRegistry {
    table: RwLock<Arc<LimitTable>>,
}

impl LimitRegistry {
    pub fn new(default: LimitProfile) -> Self {
        Self::from_table(LimitTable { default, profiles: HashMap::new() })
    }

    pub fn from_table(table: LimitTable) -> Self {
        Self { table: RwLock::new(Arc::new(table)) }
    }

    pub fn snapshot(&self) -> Arc<LimitTable> {
        Arc::clone(&self.table.read())
    }

    pub fn resolve(&self, identity: &str) -> LimitProfile {
        self.snapshot().resolve(identity).clone()
    }

    pub fn default_profile(&self) -> LimitProfile {
        self.snapshot().default.clone()
    }

    fn update(&self, f: impl FnOnce(&mut LimitTable)) {
        let mut guard = self.table.write();
        let mut next = LimitTable::clone(&guard);
        f(&mut next);
        *guard = Arc::new(next);
    }

    pub fn set_default(&self, profile: LimitProfile) {
        self.update(|table| table.default = profile);
    }

    pub fn set_profile(&self, identity: &str, profile: LimitProfile) {
        self.update(|table| {
            table.profiles.insert(identity.to_string(), profile);
        });
    }

    pub fn remove_profile(&self, identity: &str) -> bool {
        let mut removed = false;
        self.update(|table| removed = table.profiles.remove(identity).is_some());
        removed
    }

    /// Replace every per-identity profile (and optionally the default).
    /// Returns the number of profiles now in effect.
    pub fn replace_profiles(
        &self,
        profiles: HashMap<String, LimitProfile>,
        default: Option<LimitProfile>,
    ) -> usize {
        let count = profiles.len();
        self.update(|table| {
            table.profiles = profiles;
            if let Some(default) = default {
                table.default = default;
            }
        });
        tracing::info!(profiles = count, "Limit profiles replaced");
        count
    }
}
