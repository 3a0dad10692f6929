//! Striped write locks
//!
//! Writers to the same id serialize on one stripe; writers to different
//! ids usually land on different stripes and proceed in parallel.
//! Multi-id operations take their stripes in ascending index order, which
//! keeps lock acquisition deadlock-free.

use itertools::Itertools;
use parking_lot::{Mutex, MutexGuard};
use std::collections::hash_map::RandomState;
use std::hash::BuildHasher;

#[derive(Debug)]
pub struct StripedLocks {
    stripes: Vec<Mutex<()>>,
    hasher: RandomState,
}

/// Guards held for a multi-id operation
pub type StripeGuards<'a> = Vec<MutexGuard<'a, ()>>;

impl StripedLocks {
    pub fn new(stripes: usize) -> Self {
        Self {
            stripes: (0..stripes.max(1)).map(|_| Mutex::new(())).collect(),
            hasher: RandomState::new(),
        }
    }

    pub fn stripe_count(&self) -> usize {
        self.stripes.len()
    }

    pub fn stripe_of(&self, key: &str) -> usize {
        (self.hasher.hash_one(key) % self.stripes.len() as u64) as usize
    }

    pub fn lock(&self, key: &str) -> MutexGuard<'_, ()> {
        self.stripes[self.stripe_of(key)].lock()
    }

    /// Lock every stripe touched by `keys`, each once, in index order
    pub fn lock_many<'k>(&self, keys: impl IntoIterator<Item = &'k str>) -> StripeGuards<'_> {
        keys.into_iter()
            .map(|key| self.stripe_of(key))
            .sorted_unstable()
            .dedup()
            .map(|idx| self.stripes[idx].lock())
            .collect()
    }
}
