//! Type-combination and tag queries answered from the reverse indices.
//!
//! Every query reads one or more index buckets and never scans the entity
//! registry, except [`Engine::entity_by_name`], which is a documented linear
//! scan. Results are ordered by [`EntityId`] so iteration order does not
//! depend on hash seeds.
//!
//! Two flavours exist for multi-type queries:
//!
//! - [`Engine::entities_for_components`] returns the **union**: entities
//!   carrying *any* of the requested types. Callers needing every type must
//!   re-check [`Entity::contains_component`].
//! - [`Engine::entities_with_all`] returns the **intersection**, which is what
//!   most systems actually want (e.g. movement over `Position` + `Velocity`).
//!
//! The `ids_*` variants return ids instead of references, so a system can
//! collect matches and then take [`Engine::entity_mut`] for each one.

use std::collections::BTreeSet;

use crate::engine::Engine;
use crate::entity::{Entity, EntityId};
use crate::index::IndexKind;

impl Engine {
    fn sorted_bucket(&self, kind: IndexKind, key: &str) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self
            .index
            .bucket(kind, key)
            .map(|bucket| bucket.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    fn resolve<I>(&self, ids: I) -> Vec<&Entity>
    where
        I: IntoIterator<Item = EntityId>,
    {
        ids.into_iter()
            .filter_map(|id| self.entities.get(&id))
            .collect()
    }

    // -- single component type ----------------------------------------------

    /// Ids of entities holding a component of type `type_name`.
    pub fn ids_for_component(&self, type_name: &str) -> Vec<EntityId> {
        self.sorted_bucket(IndexKind::Component, type_name)
    }

    /// Entities holding a component of type `type_name`. Empty if the type
    /// was never indexed.
    pub fn entities_for_component(&self, type_name: &str) -> Vec<&Entity> {
        self.resolve(self.ids_for_component(type_name))
    }

    // -- multiple component types -------------------------------------------

    /// Ids of entities holding *any* of `type_names`.
    pub fn ids_for_components(&self, type_names: &[&str]) -> Vec<EntityId> {
        self.index
            .union(IndexKind::Component, type_names)
            .into_iter()
            .collect()
    }

    /// Entities holding *any* of `type_names` (set union).
    pub fn entities_for_components(&self, type_names: &[&str]) -> Vec<&Entity> {
        self.resolve(self.index.union(IndexKind::Component, type_names))
    }

    /// Ids of entities holding *every* one of `type_names`.
    ///
    /// An empty `type_names` matches nothing.
    pub fn ids_with_all(&self, type_names: &[&str]) -> Vec<EntityId> {
        self.index
            .intersection(IndexKind::Component, type_names)
            .into_iter()
            .collect()
    }

    /// Entities holding *every* one of `type_names` (set intersection).
    pub fn entities_with_all(&self, type_names: &[&str]) -> Vec<&Entity> {
        self.resolve(self.index.intersection(IndexKind::Component, type_names))
    }

    // -- tags ---------------------------------------------------------------

    pub fn ids_by_tag(&self, tag: &str) -> Vec<EntityId> {
        self.sorted_bucket(IndexKind::Tag, tag)
    }

    /// Entities carrying `tag`. Empty if the tag was never indexed.
    pub fn entities_by_tag(&self, tag: &str) -> Vec<&Entity> {
        self.resolve(self.ids_by_tag(tag))
    }

    /// Ids carrying any of `tags`.
    pub fn ids_by_any_tag(&self, tags: &[&str]) -> Vec<EntityId> {
        let ids: BTreeSet<EntityId> = self.index.union(IndexKind::Tag, tags);
        ids.into_iter().collect()
    }

    // -- by name ------------------------------------------------------------

    /// Find a registered entity by name.
    ///
    /// This is a linear scan over the registry, O(n) in entity count. The
    /// name set only short-circuits misses.
    pub fn entity_by_name(&self, name: &str) -> Option<&Entity> {
        if !self.contains_name(name) {
            return None;
        }
        self.entities.values().find(|e| e.name() == name)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
