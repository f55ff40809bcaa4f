//! Entity identifiers, id allocation, and the [`Entity`] container.
//!
//! An [`EntityId`] is a plain 64-bit handle handed out by an
//! [`EntityIdAllocator`]. Ids are monotonic and never recycled, so an id that
//! once named an entity can never silently name a different one later.
//!
//! An [`Entity`] owns its components (at most one per type name) and a set of
//! string tags. While detached it can be mutated freely and notifies nobody.
//! Once handed to an [`Engine`](crate::engine::Engine) it is only reachable
//! mutably through [`EntityMut`](crate::engine::EntityMut), which forwards
//! every membership change to the engine's reverse indices.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::component::{Component, TypedComponent};
use crate::EcsError;

// ---------------------------------------------------------------------------
// EntityId
// ---------------------------------------------------------------------------

/// A unique, never-reused entity identifier.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u64);

impl EntityId {
    /// Raw `u64` representation.
    #[inline]
    pub fn to_raw(self) -> u64 {
        self.0
    }

    /// Reconstruct from a raw `u64`.
    #[inline]
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// EntityIdAllocator
// ---------------------------------------------------------------------------

/// Hands out monotonically increasing [`EntityId`]s.
///
/// Each allocator is an independent id space. The [`Engine`](crate::engine::Engine)
/// owns one for [`create_entity`](crate::engine::Engine::create_entity); callers
/// building entities elsewhere own theirs.
#[derive(Debug)]
pub struct EntityIdAllocator {
    /// `None` once `u64::MAX` has been handed out.
    next: Option<u64>,
}

impl EntityIdAllocator {
    /// Create an allocator whose first id is `0`.
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Create an allocator whose first id is `first`.
    pub fn starting_at(first: u64) -> Self {
        Self { next: Some(first) }
    }

    /// Allocate the next id.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityIdsExhausted`] if every id in this allocator's space
    /// has already been handed out.
    pub fn try_allocate(&mut self) -> Result<EntityId, EcsError> {
        let raw = self.next.ok_or(EcsError::EntityIdsExhausted)?;
        self.next = raw.checked_add(1);
        Ok(EntityId(raw))
    }

    /// Allocate the next id.
    ///
    /// # Panics
    ///
    /// Panics if a previous call already handed out `u64::MAX`. Use
    /// [`try_allocate`](Self::try_allocate) to handle that case.
    pub fn allocate(&mut self) -> EntityId {
        match self.try_allocate() {
            Ok(id) => id,
            Err(err) => panic!("{err}"),
        }
    }

    /// The id the next call to [`allocate`](Self::allocate) will return, or
    /// `None` if the space is exhausted.
    pub fn peek(&self) -> Option<EntityId> {
        self.next.map(EntityId)
    }
}

impl Default for EntityIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

/// A named bag of components and tags.
///
/// The entity's own `components` map and `tags` set are the source of truth.
/// Engine indices are derived from them.
#[derive(Debug)]
pub struct Entity {
    id: EntityId,
    name: String,
    components: HashMap<String, Box<dyn Component>>,
    tags: HashSet<String>,
    /// Set while the entity is owned by an engine.
    registered: bool,
}

impl Entity {
    /// Create a detached entity with an id drawn from `ids`.
    ///
    /// # Panics
    ///
    /// Panics if `ids` is exhausted. See [`EntityIdAllocator::allocate`].
    pub fn new(ids: &mut EntityIdAllocator, name: impl Into<String>) -> Self {
        Self::with_id(ids.allocate(), name)
    }

    pub(crate) fn with_id(id: EntityId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            components: HashMap::new(),
            tags: HashSet::new(),
            registered: false,
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the entity is currently owned by an engine.
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    pub(crate) fn set_registered(&mut self, registered: bool) {
        self.registered = registered;
    }

    // -- components ---------------------------------------------------------

    /// Add a component, replacing any existing component with the same type
    /// name. Returns the replaced component, if any.
    pub fn add_component<C: Component>(&mut self, component: C) -> Option<Box<dyn Component>> {
        self.insert_component(Box::new(component)).1
    }

    /// Boxed variant of [`add_component`](Self::add_component).
    pub fn add_boxed_component(
        &mut self,
        component: Box<dyn Component>,
    ) -> Option<Box<dyn Component>> {
        self.insert_component(component).1
    }

    /// Remove the component with the given type name. No-op if absent.
    pub fn remove_component(&mut self, type_name: &str) -> Option<Box<dyn Component>> {
        self.take_component(type_name)
    }

    /// Insert and report the type name the component was stored under.
    pub(crate) fn insert_component(
        &mut self,
        component: Box<dyn Component>,
    ) -> (String, Option<Box<dyn Component>>) {
        let key = component.type_name().to_owned();
        let replaced = self.components.insert(key.clone(), component);
        (key, replaced)
    }

    pub(crate) fn take_component(&mut self, type_name: &str) -> Option<Box<dyn Component>> {
        self.components.remove(type_name)
    }

    /// Look up a component by type name.
    pub fn component(&self, type_name: &str) -> Option<&dyn Component> {
        self.components.get(type_name).map(|c| &**c)
    }

    /// Mutable lookup by type name. Changing component data does not affect
    /// membership, so no notification is involved.
    pub fn component_mut(&mut self, type_name: &str) -> Option<&mut (dyn Component + 'static)> {
        self.components.get_mut(type_name).map(Box::as_mut)
    }

    /// Typed lookup keyed by [`TypedComponent::TYPE_NAME`].
    pub fn get<T: TypedComponent>(&self) -> Option<&T> {
        self.components
            .get(T::TYPE_NAME)
            .and_then(|c| c.as_any().downcast_ref::<T>())
    }

    /// Typed mutable lookup keyed by [`TypedComponent::TYPE_NAME`].
    pub fn get_mut<T: TypedComponent>(&mut self) -> Option<&mut T> {
        self.components
            .get_mut(T::TYPE_NAME)
            .and_then(|c| c.as_any_mut().downcast_mut::<T>())
    }

    pub fn contains_component(&self, type_name: &str) -> bool {
        self.components.contains_key(type_name)
    }

    /// Type names of all components currently present, sorted.
    pub fn component_types(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.components.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn component_count(&self) -> usize {
        self.components.len()
    }

    // -- tags ---------------------------------------------------------------

    /// Add a tag. Returns `true` if it was not already present.
    pub fn add_tag(&mut self, tag: impl Into<String>) -> bool {
        self.tags.insert(tag.into())
    }

    /// Remove a tag. Returns `true` if it was present.
    pub fn remove_tag(&mut self, tag: &str) -> bool {
        self.tags.remove(tag)
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// All tags, sorted.
    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.tags.iter().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
