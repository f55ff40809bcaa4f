//! Reverse indices from component type name and tag to entity ids.
//!
//! The [`ReverseIndex`] is a derived cache: it always mirrors the union of the
//! registered entities' own component maps and tag sets. Every mutation path
//! funnels through the two idempotent primitives [`add_to_index`] and
//! [`remove_from_index`].

use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::entity::{Entity, EntityId};

/// Key (component type name or tag) to the set of entity ids holding it.
pub type IndexMap = HashMap<String, HashSet<EntityId>>;

// ---------------------------------------------------------------------------
// Change
// ---------------------------------------------------------------------------

/// A membership change reported by an entity to its engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Change {
    ComponentAdded,
    ComponentRemoved,
    TagAdded,
    TagRemoved,
}

impl Change {
    /// Which index this change applies to.
    pub fn index_kind(self) -> IndexKind {
        match self {
            Change::ComponentAdded | Change::ComponentRemoved => IndexKind::Component,
            Change::TagAdded | Change::TagRemoved => IndexKind::Tag,
        }
    }
}

/// Distinguishes the two reverse indices in diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexKind {
    Component,
    Tag,
}

impl fmt::Display for IndexKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndexKind::Component => f.write_str("component"),
            IndexKind::Tag => f.write_str("tag"),
        }
    }
}

// ---------------------------------------------------------------------------
// Index primitives
// ---------------------------------------------------------------------------

/// Insert `entity` into the bucket for `key`, creating the bucket if needed.
///
/// Returns `true` if the id was not already present.
pub fn add_to_index(index: &mut IndexMap, key: &str, entity: EntityId) -> bool {
    match index.get_mut(key) {
        Some(bucket) => bucket.insert(entity),
        None => {
            index.insert(key.to_owned(), HashSet::from([entity]));
            true
        }
    }
}

/// Remove `entity` from the bucket for `key`. No-op if either is absent.
///
/// Empty buckets are kept; a bucket's existence only records that the key
/// has been indexed at some point.
pub fn remove_from_index(index: &mut IndexMap, key: &str, entity: EntityId) -> bool {
    index
        .get_mut(key)
        .is_some_and(|bucket| bucket.remove(&entity))
}

// ---------------------------------------------------------------------------
// IndexStats
// ---------------------------------------------------------------------------

/// Summary counts for the reverse indices.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    /// Registered entities.
    pub entities: usize,
    /// Component type names with at least one entity.
    pub component_types: usize,
    /// Tags with at least one entity.
    pub tags: usize,
    /// Sum of component bucket sizes.
    pub component_entries: usize,
    /// Sum of tag bucket sizes.
    pub tag_entries: usize,
}

// ---------------------------------------------------------------------------
// ReverseIndex
// ---------------------------------------------------------------------------

/// The component-type and tag reverse indices kept by an engine.
#[derive(Debug, Default)]
pub struct ReverseIndex {
    components: IndexMap,
    tags: IndexMap,
}

impl ReverseIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply a single membership change.
    pub fn entity_has_changed(&mut self, change: Change, key: &str, entity: EntityId) {
        let changed = match change {
            Change::ComponentAdded => add_to_index(&mut self.components, key, entity),
            Change::ComponentRemoved => remove_from_index(&mut self.components, key, entity),
            Change::TagAdded => add_to_index(&mut self.tags, key, entity),
            Change::TagRemoved => remove_from_index(&mut self.tags, key, entity),
        };
        trace!(?change, key, %entity, changed, "index updated");
    }

    /// Index every component type and tag `entity` currently carries.
    pub fn index_entity(&mut self, entity: &Entity) {
        for type_name in entity.component_types() {
            self.entity_has_changed(Change::ComponentAdded, type_name, entity.id());
        }
        for tag in entity.tags() {
            self.entity_has_changed(Change::TagAdded, tag, entity.id());
        }
    }

    /// Purge `entity` from every bucket matching its components and tags.
    pub fn unindex_entity(&mut self, entity: &Entity) {
        for type_name in entity.component_types() {
            self.entity_has_changed(Change::ComponentRemoved, type_name, entity.id());
        }
        for tag in entity.tags() {
            self.entity_has_changed(Change::TagRemoved, tag, entity.id());
        }
    }

    pub fn map(&self, kind: IndexKind) -> &IndexMap {
        match kind {
            IndexKind::Component => &self.components,
            IndexKind::Tag => &self.tags,
        }
    }

    /// The bucket for `key` in the given index, if it was ever created.
    pub fn bucket(&self, kind: IndexKind, key: &str) -> Option<&HashSet<EntityId>> {
        self.map(kind).get(key)
    }

    /// Ids present in the bucket of any of `keys`.
    pub fn union(&self, kind: IndexKind, keys: &[&str]) -> BTreeSet<EntityId> {
        let map = self.map(kind);
        keys.iter()
            .filter_map(|key| map.get(*key))
            .flatten()
            .copied()
            .collect()
    }

    /// Ids present in the buckets of all of `keys`. Empty when `keys` is empty.
    pub fn intersection(&self, kind: IndexKind, keys: &[&str]) -> BTreeSet<EntityId> {
        let map = self.map(kind);
        let mut buckets = Vec::with_capacity(keys.len());
        for key in keys {
            match map.get(*key) {
                Some(bucket) => buckets.push(bucket),
                None => return BTreeSet::new(),
            }
        }
        // Probe from the smallest bucket.
        buckets.sort_by_key(|bucket| bucket.len());
        let Some((smallest, rest)) = buckets.split_first() else {
            return BTreeSet::new();
        };
        smallest
            .iter()
            .filter(|id| rest.iter().all(|bucket| bucket.contains(*id)))
            .copied()
            .collect()
    }

    pub fn stats(&self, entities: usize) -> IndexStats {
        let non_empty = |map: &IndexMap| map.values().filter(|b| !b.is_empty()).count();
        let entries = |map: &IndexMap| map.values().map(HashSet::len).sum::<usize>();
        IndexStats {
            entities,
            component_types: non_empty(&self.components),
            tags: non_empty(&self.tags),
            component_entries: entries(&self.components),
            tag_entries: entries(&self.tags),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
