//! Bidirectional tag index.
//!
//! Tracks which cached queries provide which tags so a mutation can find
//! every entry it affects.

use std::collections::{BTreeSet, HashMap};
use std::sync::RwLock;

use super::keys::{QueryKey, Tag};
use super::lock::{rw_read, rw_write};

const SOURCE: &str = "cache::registry";

#[derive(Default)]
struct Maps {
    /// Maps tags to every query key that declared them
    tag_to_keys: HashMap<Tag, BTreeSet<QueryKey>>,
    /// Maps query keys to the tags of their latest successful fetch
    key_to_tags: HashMap<QueryKey, BTreeSet<Tag>>,
}

/// Tracks tag → query keys and query key → tags mappings.
///
/// Membership is exact: a key is listed under a tag only while its most
/// recent successful fetch declared that tag. Re-tagging a key replaces its
/// previous tag set.
pub struct TagIndex {
    maps: RwLock<Maps>,
}

impl TagIndex {
    /// Create a new empty index.
    pub fn new() -> Self {
        Self {
            maps: RwLock::new(Maps::default()),
        }
    }

    /// Record the tags declared by the latest successful fetch of `key`.
    pub fn tag<I>(&self, key: &QueryKey, tags: I)
    where
        I: IntoIterator<Item = Tag>,
    {
        let tags: BTreeSet<Tag> = tags.into_iter().collect();
        let mut maps = rw_write(&self.maps, SOURCE, "tag");
        detach(&mut maps, key);
        if tags.is_empty() {
            return;
        }
        for tag in &tags {
            maps.tag_to_keys
                .entry(tag.clone())
                .or_default()
                .insert(key.clone());
        }
        maps.key_to_tags.insert(key.clone(), tags);
    }

    /// Every query key currently tagged with `tag`, in key order.
    pub fn resolve_tag(&self, tag: &Tag) -> BTreeSet<QueryKey> {
        rw_read(&self.maps, SOURCE, "resolve_tag")
            .tag_to_keys
            .get(tag)
            .cloned()
            .unwrap_or_default()
    }

    /// Tags currently recorded for `key`.
    pub fn tags_for(&self, key: &QueryKey) -> BTreeSet<Tag> {
        rw_read(&self.maps, SOURCE, "tags_for")
            .key_to_tags
            .get(key)
            .cloned()
            .unwrap_or_default()
    }

    /// Forget `key` entirely. Called when its entry is evicted.
    pub fn untag(&self, key: &QueryKey) {
        let mut maps = rw_write(&self.maps, SOURCE, "untag");
        detach(&mut maps, key);
    }

    /// Clear all mappings.
    pub fn clear(&self) {
        let mut maps = rw_write(&self.maps, SOURCE, "clear");
        maps.tag_to_keys.clear();
        maps.key_to_tags.clear();
    }

    /// Get the number of tags with at least one member.
    pub fn tag_count(&self) -> usize {
        rw_read(&self.maps, SOURCE, "tag_count").tag_to_keys.len()
    }

    /// Get the number of tagged query keys.
    pub fn key_count(&self) -> usize {
        rw_read(&self.maps, SOURCE, "key_count").key_to_tags.len()
    }
}

impl Default for TagIndex {
    fn default() -> Self {
        Self::new()
    }
}

fn detach(maps: &mut Maps, key: &QueryKey) {
    let Some(tags) = maps.key_to_tags.remove(key) else {
        return;
    };
    for tag in tags {
        if let Some(keys) = maps.tag_to_keys.get_mut(&tag) {
            keys.remove(key);
            if keys.is_empty() {
                maps.tag_to_keys.remove(&tag);
            }
        }
    }
}
