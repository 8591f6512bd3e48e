//! Cache configuration.
//!
//! Controlled by the `[cache]` section of `syncdeck.toml`.

use std::num::NonZeroUsize;

use serde::Deserialize;

const DEFAULT_IDLE_ENTRY_LIMIT: usize = 128;

/// Cache configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum entries kept without any subscriber before LRU eviction.
    pub idle_entry_limit: usize,
    /// Refetch subscribed entries right after a mutation invalidates them.
    ///
    /// When off, subscribers observe `Evicted` and must request again.
    pub refetch_on_invalidate: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            idle_entry_limit: DEFAULT_IDLE_ENTRY_LIMIT,
            refetch_on_invalidate: true,
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            idle_entry_limit: settings.idle_entry_limit.get(),
            refetch_on_invalidate: settings.refetch_on_invalidate,
        }
    }
}

impl CacheConfig {
    /// Returns the idle entry limit as NonZeroUsize, clamping to 1 if zero.
    pub fn idle_entry_limit_non_zero(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.idle_entry_limit).unwrap_or(NonZeroUsize::MIN)
    }
}
