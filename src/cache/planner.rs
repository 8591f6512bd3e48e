//! Invalidation plan generation.
//!
//! Resolves the tags a mutation declares into the concrete cache keys to act
//! on, split by whether anyone is still watching them.

use std::collections::BTreeSet;
use std::fmt;

use super::keys::{QueryKey, Tag};
use super::registry::TagIndex;

/// Keys to act on after a successful mutation.
///
/// Tags are deduplicated, and a key reachable through several tags appears
/// once.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct InvalidationPlan {
    /// Tags the mutation declared.
    pub tags: BTreeSet<Tag>,
    /// Keys with no subscriber; dropped outright.
    pub evict: BTreeSet<QueryKey>,
    /// Keys still observed; evicted and fetched again.
    pub refetch: BTreeSet<QueryKey>,
}

impl fmt::Display for InvalidationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InvalidationPlan {{ tags: {}, evict: {}, refetch: {} }}",
            self.tags.len(),
            self.evict.len(),
            self.refetch.len(),
        )
    }
}

impl InvalidationPlan {
    /// Build a plan from declared tags against the current index.
    ///
    /// `subscribers` reports the live subscriber count of a key.
    pub fn from_tags<I, F>(tags: I, index: &TagIndex, subscribers: F) -> Self
    where
        I: IntoIterator<Item = Tag>,
        F: Fn(&QueryKey) -> usize,
    {
        Self::from_resolver(tags, |tag| index.resolve_tag(tag), subscribers)
    }

    /// Build a plan with a custom tag resolver, e.g. one that also reports
    /// keys whose first fetch is still in flight.
    pub fn from_resolver<I, R, F>(tags: I, resolve: R, subscribers: F) -> Self
    where
        I: IntoIterator<Item = Tag>,
        R: Fn(&Tag) -> BTreeSet<QueryKey>,
        F: Fn(&QueryKey) -> usize,
    {
        let mut plan = Self {
            tags: tags.into_iter().collect(),
            ..Self::default()
        };

        for tag in &plan.tags {
            for key in resolve(tag) {
                if plan.evict.contains(&key) || plan.refetch.contains(&key) {
                    continue;
                }
                if subscribers(&key) > 0 {
                    plan.refetch.insert(key);
                } else {
                    plan.evict.insert(key);
                }
            }
        }

        plan
    }

    /// Every key the plan touches, in key order.
    pub fn keys(&self) -> impl Iterator<Item = &QueryKey> {
        let mut all: Vec<&QueryKey> = self.evict.iter().chain(&self.refetch).collect();
        all.sort();
        all.into_iter()
    }

    pub fn key_count(&self) -> usize {
        self.evict.len() + self.refetch.len()
    }

    /// Check if the plan has any keys to act on.
    pub fn is_empty(&self) -> bool {
        self.evict.is_empty() && self.refetch.is_empty()
    }
}
