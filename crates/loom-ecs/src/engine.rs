//! The [`Engine`] owns registered entities, keeps the reverse indices in sync
//! with them, and drives the registered systems.
//!
//! Registration is the moment an entity becomes indexed. From then on it is
//! only reachable mutably through an [`EntityMut`], which reports every
//! component and tag membership change to the engine. Detached entities
//! never notify anyone, which is why [`Engine::add_entity`] seeds the indices
//! from the entity's current state.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::ops::Deref;

use tracing::{debug, debug_span, error, trace, warn};

use crate::component::{Component, TypedComponent};
use crate::entity::{Entity, EntityId, EntityIdAllocator};
use crate::index::{Change, IndexKind, IndexStats, ReverseIndex};
use crate::system::{System, SystemRegistry};
use crate::EcsError;

// ---------------------------------------------------------------------------
// EngineConfig
// ---------------------------------------------------------------------------

/// Configuration for an [`Engine`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Re-derive both reverse indices after every [`Engine::update`] and log
    /// any disagreement. Costs a full scan per frame.
    pub verify_indices_each_frame: bool,
    /// First id handed out by [`Engine::create_entity`].
    pub first_entity_id: u64,
}

// ---------------------------------------------------------------------------
// RejectedEntity
// ---------------------------------------------------------------------------

/// A refused registration. The entity comes back untouched so the caller can
/// fix the conflict and try again.
#[derive(Debug, thiserror::Error)]
#[error("{error}")]
pub struct RejectedEntity {
    pub error: EcsError,
    pub entity: Entity,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The entity registry, reverse indices, and system scheduler.
pub struct Engine {
    config: EngineConfig,
    /// Ids for [`create_entity`](Self::create_entity).
    ids: EntityIdAllocator,
    /// Membership here is membership in the simulation.
    pub(crate) entities: HashMap<EntityId, Entity>,
    /// Names of registered entities.
    entity_names: HashSet<String>,
    pub(crate) index: ReverseIndex,
    systems: SystemRegistry,
    frame_count: u64,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("entity_count", &self.entities.len())
            .field("systems", &self.systems)
            .field("frame_count", &self.frame_count)
            .finish()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    /// Create an empty engine with the default configuration.
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self {
            ids: EntityIdAllocator::starting_at(config.first_entity_id),
            config,
            entities: HashMap::new(),
            entity_names: HashSet::new(),
            index: ReverseIndex::new(),
            systems: SystemRegistry::default(),
            frame_count: 0,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -- entity lifecycle ---------------------------------------------------

    /// Build a detached entity with an id from this engine's allocator.
    ///
    /// The entity is not registered; pass it to [`add_entity`](Self::add_entity).
    ///
    /// # Panics
    ///
    /// Panics if the allocator is exhausted. See
    /// [`try_create_entity`](Self::try_create_entity).
    pub fn create_entity(&mut self, name: impl Into<String>) -> Entity {
        Entity::with_id(self.ids.allocate(), name)
    }

    /// Like [`create_entity`](Self::create_entity), but reports an exhausted
    /// id space instead of panicking.
    ///
    /// # Errors
    ///
    /// [`EcsError::EntityIdsExhausted`] once `u64::MAX` has been handed out.
    pub fn try_create_entity(&mut self, name: impl Into<String>) -> Result<Entity, EcsError> {
        Ok(Entity::with_id(self.ids.try_allocate()?, name))
    }

    /// Check whether `entity` could be registered right now.
    ///
    /// # Errors
    ///
    /// [`EcsError::DuplicateEntityId`] or [`EcsError::DuplicateEntityName`]
    /// if an entity with the same id or name is already registered.
    pub fn check_registration(&self, entity: &Entity) -> Result<(), EcsError> {
        if self.entities.contains_key(&entity.id()) {
            return Err(EcsError::DuplicateEntityId {
                entity: entity.id(),
            });
        }
        if self.entity_names.contains(entity.name()) {
            return Err(EcsError::DuplicateEntityName {
                name: entity.name().to_owned(),
            });
        }
        Ok(())
    }

    /// Register an entity and index its current components and tags.
    ///
    /// # Errors
    ///
    /// A [`RejectedEntity`] holding the reason from
    /// [`check_registration`](Self::check_registration) and the entity itself,
    /// unchanged. Nothing in the engine is modified on error.
    pub fn try_add_entity(&mut self, mut entity: Entity) -> Result<EntityId, RejectedEntity> {
        if let Err(error) = self.check_registration(&entity) {
            warn!(entity = %entity.id(), name = entity.name(), %error, "entity registration rejected");
            return Err(RejectedEntity { error, entity });
        }
        let id = entity.id();
        entity.set_registered(true);
        self.index.index_entity(&entity);
        self.entity_names.insert(entity.name().to_owned());
        debug!(
            entity = %id,
            name = entity.name(),
            components = entity.component_count(),
            "entity registered"
        );
        self.entities.insert(id, entity);
        Ok(id)
    }

    /// Register an entity. Returns `false`, with no side effects, if the id
    /// or the name is already taken. The rejected entity is dropped; use
    /// [`try_add_entity`](Self::try_add_entity) to get it back.
    pub fn add_entity(&mut self, entity: Entity) -> bool {
        self.try_add_entity(entity).is_ok()
    }

    /// Deregister an entity, purging it from every index and releasing its
    /// name. The detached entity is handed back with its state intact.
    pub fn remove_entity(&mut self, id: EntityId) -> Option<Entity> {
        let mut entity = self.entities.remove(&id)?;
        self.index.unindex_entity(&entity);
        self.entity_names.remove(entity.name());
        entity.set_registered(false);
        debug!(entity = %id, name = entity.name(), "entity removed");
        Some(entity)
    }

    pub fn contains_entity(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    /// Whether a registered entity uses `name`.
    pub fn contains_name(&self, name: &str) -> bool {
        self.entity_names.contains(name)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Ids of all registered entities, sorted.
    pub fn entity_ids(&self) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = self.entities.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    /// Mutable access to a registered entity. Membership changes made through
    /// the returned handle update the indices immediately.
    pub fn entity_mut(&mut self, id: EntityId) -> Option<EntityMut<'_>> {
        let entity = self.entities.get_mut(&id)?;
        Some(EntityMut {
            entity,
            index: &mut self.index,
        })
    }

    // -- notifications ------------------------------------------------------

    /// Apply a membership change reported for a registered entity. Returns
    /// whether the index was updated.
    ///
    /// The change must agree with the entity's own state: an added key the
    /// entity does not carry, a removed key it still carries, or any change
    /// for an unregistered id is ignored. The indices therefore never drift
    /// from entity state through this path.
    pub fn entity_has_changed(&mut self, change: Change, key: &str, entity: EntityId) -> bool {
        let Some(target) = self.entities.get(&entity) else {
            warn!(?change, key, %entity, "change reported for unregistered entity");
            return false;
        };
        let holds = match change.index_kind() {
            IndexKind::Component => target.contains_component(key),
            IndexKind::Tag => target.has_tag(key),
        };
        let added = matches!(change, Change::ComponentAdded | Change::TagAdded);
        if holds != added {
            warn!(?change, key, %entity, "change disagrees with entity state");
            return false;
        }
        self.index.entity_has_changed(change, key, entity);
        true
    }

    // -- systems ------------------------------------------------------------

    /// Register a system under `name`. If the name is taken the call is a
    /// no-op and returns `false`.
    pub fn add_system(&mut self, name: &str, system: impl System + 'static) -> bool {
        let added = self.systems.insert(name, Box::new(system));
        if added {
            debug!(system = name, "system registered");
        } else {
            warn!(system = name, "system already registered, keeping the first");
        }
        added
    }

    /// Remove the system registered under `name`. No-op if absent.
    pub fn remove_system(&mut self, name: &str) -> bool {
        let removed = self.systems.remove(name);
        if removed {
            debug!(system = name, "system removed");
        }
        removed
    }

    pub fn has_system(&self, name: &str) -> bool {
        self.systems.contains(name)
    }

    /// System names in execution order.
    pub fn system_names(&self) -> Vec<String> {
        self.systems.names()
    }

    pub fn system_count(&self) -> usize {
        self.systems.len()
    }

    /// Number of completed [`update`](Self::update) calls.
    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    /// Advance the simulation by `dt`, running every system once, to
    /// completion, in registration order.
    ///
    /// The set of systems is fixed when the frame starts. A system added
    /// during the frame first runs on the next one; a system removed during
    /// the frame does not run again.
    pub fn update(&mut self, dt: f64) {
        let span = debug_span!("frame", frame = self.frame_count, dt);
        let _enter = span.enter();

        for name in self.systems.names() {
            let Some(mut system) = self.systems.take(&name) else {
                trace!(system = %name, "system skipped");
                continue;
            };
            trace!(system = %name, "running system");
            system.update(dt, self);
            self.systems.restore(&name, system);
        }

        self.frame_count += 1;

        if self.config.verify_indices_each_frame {
            if let Err(err) = self.verify_indices() {
                error!(%err, "reverse index diverged from entity state");
            }
        }
    }

    // -- diagnostics --------------------------------------------------------

    /// Recompute both indices from entity state and compare them with the
    /// maintained ones. Empty buckets are equivalent to absent ones.
    ///
    /// # Errors
    ///
    /// [`EcsError::IndexMismatch`] describing the first disagreeing key,
    /// component index first, keys in sorted order.
    pub fn verify_indices(&self) -> Result<(), EcsError> {
        let mut expected_components: BTreeMap<&str, BTreeSet<EntityId>> = BTreeMap::new();
        let mut expected_tags: BTreeMap<&str, BTreeSet<EntityId>> = BTreeMap::new();
        for entity in self.entities.values() {
            for type_name in entity.component_types() {
                expected_components
                    .entry(type_name)
                    .or_default()
                    .insert(entity.id());
            }
            for tag in entity.tags() {
                expected_tags.entry(tag).or_default().insert(entity.id());
            }
        }

        self.compare_index(IndexKind::Component, &expected_components)?;
        self.compare_index(IndexKind::Tag, &expected_tags)
    }

    fn compare_index(
        &self,
        kind: IndexKind,
        expected: &BTreeMap<&str, BTreeSet<EntityId>>,
    ) -> Result<(), EcsError> {
        let actual = self.index.map(kind);
        let mut keys: BTreeSet<&str> = expected.keys().copied().collect();
        keys.extend(actual.keys().map(String::as_str));

        let empty = BTreeSet::new();
        for key in keys {
            let want = expected.get(key).unwrap_or(&empty);
            let have: BTreeSet<EntityId> = actual
                .get(key)
                .map(|bucket| bucket.iter().copied().collect())
                .unwrap_or_default();
            if *want != have {
                return Err(EcsError::IndexMismatch {
                    index: kind,
                    key: key.to_owned(),
                    expected: want.iter().copied().collect(),
                    actual: have.into_iter().collect(),
                });
            }
        }
        Ok(())
    }

    /// Bucket and entry counts for both indices.
    pub fn index_stats(&self) -> IndexStats {
        self.index.stats(self.entities.len())
    }
}

// ---------------------------------------------------------------------------
// EntityMut
// ---------------------------------------------------------------------------

/// Mutable handle to a registered entity.
///
/// This is the entity's link back to its engine: every membership change is
/// forwarded to the engine's indices as exactly one notification. Read access
/// goes through `Deref<Target = Entity>`.
pub struct EntityMut<'e> {
    entity: &'e mut Entity,
    index: &'e mut ReverseIndex,
}

impl EntityMut<'_> {
    fn notify(&mut self, change: Change, key: &str) {
        self.index.entity_has_changed(change, key, self.entity.id());
    }

    /// Add or replace a component. Always notifies, even on replace.
    pub fn add_component<C: Component>(&mut self, component: C) -> Option<Box<dyn Component>> {
        self.add_boxed_component(Box::new(component))
    }

    pub fn add_boxed_component(
        &mut self,
        component: Box<dyn Component>,
    ) -> Option<Box<dyn Component>> {
        let (key, replaced) = self.entity.insert_component(component);
        self.notify(Change::ComponentAdded, &key);
        replaced
    }

    /// Remove a component. No-op, without notification, if absent.
    pub fn remove_component(&mut self, type_name: &str) -> Option<Box<dyn Component>> {
        let removed = self.entity.take_component(type_name)?;
        self.notify(Change::ComponentRemoved, type_name);
        Some(removed)
    }

    /// Add a tag. Always notifies; re-indexing an existing tag is harmless.
    pub fn add_tag(&mut self, tag: impl Into<String>) -> bool {
        let tag = tag.into();
        self.notify(Change::TagAdded, &tag);
        self.entity.add_tag(tag)
    }

    /// Remove a tag. No-op, without notification, if absent.
    pub fn remove_tag(&mut self, tag: &str) -> bool {
        if !self.entity.remove_tag(tag) {
            return false;
        }
        self.notify(Change::TagRemoved, tag);
        true
    }

    /// Typed mutable component access. Data edits do not touch the indices.
    pub fn get_mut<T: TypedComponent>(&mut self) -> Option<&mut T> {
        self.entity.get_mut::<T>()
    }

    pub fn component_mut(&mut self, type_name: &str) -> Option<&mut (dyn Component + 'static)> {
        self.entity.component_mut(type_name)
    }
}

impl Deref for EntityMut<'_> {
    type Target = Entity;

    fn deref(&self) -> &Entity {
        &*self.entity
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[derive(Debug, Clone, PartialEq)]
    struct Position {
        x: f32,
        y: f32,
    }

    impl TypedComponent for Position {
        const TYPE_NAME: &'static str = "Position";
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Velocity {
        dx: f32,
        dy: f32,
    }

    impl TypedComponent for Velocity {
        const TYPE_NAME: &'static str = "Velocity";
    }

    fn bucket(engine: &Engine, kind: IndexKind, key: &str) -> Vec<EntityId> {
        let mut ids: Vec<EntityId> = engine
            .index
            .bucket(kind, key)
            .map(|b| b.iter().copied().collect())
            .unwrap_or_default();
        ids.sort_unstable();
        ids
    }

    // -- registration -------------------------------------------------------

    #[test]
    fn add_entity_seeds_indices_from_detached_state() {
        let mut engine = Engine::new();
        let mut e = engine.create_entity("hero");
        e.add_component(Position { x: 0.0, y: 0.0 });
        e.add_tag("player");
        let id = e.id();

        assert!(engine.add_entity(e));
        assert!(engine.entity(id).unwrap().is_registered());
        assert_eq!(bucket(&engine, IndexKind::Component, "Position"), vec![id]);
        assert_eq!(bucket(&engine, IndexKind::Tag, "player"), vec![id]);
        assert!(engine.verify_indices().is_ok());
    }

    #[test]
    fn duplicate_id_rejected_without_side_effects() {
        let mut engine = Engine::new();
        let a = engine.create_entity("a");
        let id = a.id();
        engine.add_entity(a);

        let mut clash = Entity::with_id(id, "other");
        clash.add_component(Velocity { dx: 1.0, dy: 0.0 });
        let rejected = engine.try_add_entity(clash).unwrap_err();

        assert!(matches!(rejected.error, EcsError::DuplicateEntityId { .. }));
        assert!(rejected.entity.contains_component("Velocity"));
        assert!(!rejected.entity.is_registered());
        assert_eq!(engine.entity_count(), 1);
        assert!(!engine.contains_name("other"));
        assert!(engine.index.bucket(IndexKind::Component, "Velocity").is_none());
    }

    #[test]
    fn duplicate_name_rejected_even_with_new_id() {
        let mut engine = Engine::new();
        let a = engine.create_entity("A");
        engine.add_entity(a);

        let mut a2 = engine.create_entity("A");
        a2.add_tag("boss");
        assert!(!engine.add_entity(a2));
        assert_eq!(engine.entity_count(), 1);
        assert!(engine.index.bucket(IndexKind::Tag, "boss").is_none());
    }

    #[test]
    fn rejected_entity_can_be_retried_after_conflict_clears() {
        let mut engine = Engine::new();
        let first = engine.create_entity("A");
        let first_id = first.id();
        engine.add_entity(first);

        let mut second = engine.create_entity("A");
        second.add_tag("boss");
        let rejected = engine.try_add_entity(second).unwrap_err();
        assert!(matches!(
            &rejected.error,
            EcsError::DuplicateEntityName { name } if name == "A"
        ));

        engine.remove_entity(first_id);
        let id = engine.try_add_entity(rejected.entity).unwrap();
        assert_eq!(bucket(&engine, IndexKind::Tag, "boss"), vec![id]);
        assert!(engine.verify_indices().is_ok());
    }

    #[test]
    fn remove_entity_purges_indices_and_releases_name() {
        let mut engine = Engine::new();
        let mut e = engine.create_entity("hero");
        e.add_component(Position { x: 0.0, y: 0.0 });
        e.add_tag("player");
        let id = e.id();
        engine.add_entity(e);

        let detached = engine.remove_entity(id).unwrap();
        assert!(!detached.is_registered());
        assert!(detached.contains_component("Position"));
        assert!(bucket(&engine, IndexKind::Component, "Position").is_empty());
        assert!(bucket(&engine, IndexKind::Tag, "player").is_empty());
        assert!(!engine.contains_name("hero"));

        let again = engine.create_entity("hero");
        assert!(engine.add_entity(again));
    }

    #[test]
    fn remove_unregistered_entity_is_noop() {
        let mut engine = Engine::new();
        assert!(engine.remove_entity(EntityId::from_raw(9)).is_none());
    }

    #[test]
    fn detached_entity_can_be_re_registered() {
        let mut engine = Engine::new();
        let mut e = engine.create_entity("hero");
        e.add_tag("player");
        let id = e.id();
        engine.add_entity(e);

        let mut detached = engine.remove_entity(id).unwrap();
        detached.add_component(Velocity { dx: 1.0, dy: 1.0 });
        assert!(engine.add_entity(detached));
        assert_eq!(bucket(&engine, IndexKind::Component, "Velocity"), vec![id]);
        assert_eq!(bucket(&engine, IndexKind::Tag, "player"), vec![id]);
    }

    #[test]
    fn config_seeds_entity_ids() {
        let mut engine = Engine::with_config(EngineConfig {
            first_entity_id: 1_000,
            ..Default::default()
        });
        assert_eq!(engine.create_entity("a").id(), EntityId::from_raw(1_000));
    }

    #[test]
    fn last_entity_id_is_usable() {
        let mut engine = Engine::with_config(EngineConfig {
            first_entity_id: u64::MAX,
            ..Default::default()
        });
        let last = engine.try_create_entity("last").unwrap();
        assert_eq!(last.id(), EntityId::from_raw(u64::MAX));
        assert!(engine.add_entity(last));

        assert!(matches!(
            engine.try_create_entity("overflow"),
            Err(EcsError::EntityIdsExhausted)
        ));
        assert_eq!(engine.entity_count(), 1);
    }

    // -- notifications through EntityMut ------------------------------------

    #[test]
    fn entity_mut_notifies_on_component_changes() {
        let mut engine = Engine::new();
        let e = engine.create_entity("hero");
        let id = e.id();
        engine.add_entity(e);

        {
            let mut hero = engine.entity_mut(id).unwrap();
            hero.add_component(Velocity { dx: 1.0, dy: 0.0 });
            assert!(hero.contains_component("Velocity"));
        }
        assert_eq!(bucket(&engine, IndexKind::Component, "Velocity"), vec![id]);

        engine.entity_mut(id).unwrap().remove_component("Velocity");
        assert!(bucket(&engine, IndexKind::Component, "Velocity").is_empty());
    }

    #[test]
    fn replacing_component_does_not_duplicate_index_entry() {
        let mut engine = Engine::new();
        let e = engine.create_entity("hero");
        let id = e.id();
        engine.add_entity(e);

        let mut hero = engine.entity_mut(id).unwrap();
        hero.add_component(Position { x: 1.0, y: 1.0 });
        let old = hero.add_component(Position { x: 2.0, y: 2.0 });
        assert!(old.is_some());
        assert_eq!(hero.get::<Position>(), Some(&Position { x: 2.0, y: 2.0 }));
        assert_eq!(hero.component_count(), 1);

        assert_eq!(bucket(&engine, IndexKind::Component, "Position"), vec![id]);
    }

    #[test]
    fn entity_mut_tag_changes() {
        let mut engine = Engine::new();
        let e = engine.create_entity("ogre");
        let id = e.id();
        engine.add_entity(e);

        let mut ogre = engine.entity_mut(id).unwrap();
        assert!(ogre.add_tag("boss"));
        assert!(!ogre.add_tag("boss"));
        assert!(!ogre.remove_tag("minion"));
        assert_eq!(bucket(&engine, IndexKind::Tag, "boss"), vec![id]);

        engine.entity_mut(id).unwrap().remove_tag("boss");
        assert!(bucket(&engine, IndexKind::Tag, "boss").is_empty());
        assert!(engine.index.bucket(IndexKind::Tag, "minion").is_none());
    }

    #[test]
    fn data_edits_through_entity_mut() {
        let mut engine = Engine::new();
        let mut e = engine.create_entity("hero");
        e.add_component(Position { x: 0.0, y: 0.0 });
        let id = e.id();
        engine.add_entity(e);

        if let Some(pos) = engine.entity_mut(id).unwrap().get_mut::<Position>() {
            pos.x = 5.0;
        }
        assert_eq!(engine.entity(id).unwrap().get::<Position>().unwrap().x, 5.0);
    }

    #[test]
    fn stray_notification_for_unregistered_id_is_ignored() {
        let mut engine = Engine::new();
        assert!(!engine.entity_has_changed(
            Change::ComponentAdded,
            "Position",
            EntityId::from_raw(77)
        ));
        assert!(engine.index.bucket(IndexKind::Component, "Position").is_none());
    }

    #[test]
    fn notification_contradicting_entity_state_is_ignored() {
        let mut engine = Engine::new();
        let mut e = engine.create_entity("hero");
        e.add_component(Position { x: 0.0, y: 0.0 });
        e.add_tag("player");
        let id = e.id();
        engine.add_entity(e);

        assert!(!engine.entity_has_changed(Change::ComponentAdded, "Ghost", id));
        assert!(!engine.entity_has_changed(Change::TagAdded, "boss", id));
        assert!(!engine.entity_has_changed(Change::ComponentRemoved, "Position", id));
        assert!(!engine.entity_has_changed(Change::TagRemoved, "player", id));

        assert!(bucket(&engine, IndexKind::Component, "Ghost").is_empty());
        assert!(bucket(&engine, IndexKind::Tag, "boss").is_empty());
        assert_eq!(bucket(&engine, IndexKind::Component, "Position"), vec![id]);
        assert_eq!(bucket(&engine, IndexKind::Tag, "player"), vec![id]);
        assert!(engine.verify_indices().is_ok());
    }

    #[test]
    fn notification_matching_entity_state_is_applied() {
        let mut engine = Engine::new();
        let mut e = engine.create_entity("hero");
        e.add_component(Position { x: 0.0, y: 0.0 });
        let id = e.id();
        engine.add_entity(e);

        // Drop the bucket entry, then let a truthful notification restore it.
        engine
            .index
            .entity_has_changed(Change::ComponentRemoved, "Position", id);
        assert!(engine.verify_indices().is_err());

        assert!(engine.entity_has_changed(Change::ComponentAdded, "Position", id));
        assert_eq!(bucket(&engine, IndexKind::Component, "Position"), vec![id]);
        assert!(engine.verify_indices().is_ok());
    }

    // -- systems ------------------------------------------------------------

    #[test]
    fn systems_run_in_registration_order() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut engine = Engine::new();
        for name in ["input", "movement", "render"] {
            let log = Rc::clone(&log);
            engine.add_system(name, move |_dt: f64, _engine: &mut Engine| {
                log.borrow_mut().push(name);
            });
        }

        engine.update(0.016);
        engine.update(0.016);

        assert_eq!(
            *log.borrow(),
            vec!["input", "movement", "render", "input", "movement", "render"]
        );
        assert_eq!(engine.frame_count(), 2);
    }

    #[test]
    fn first_system_registration_wins() {
        let hits = Rc::new(RefCell::new(Vec::new()));
        let mut engine = Engine::new();
        let first = Rc::clone(&hits);
        let second = Rc::clone(&hits);
        assert!(engine.add_system("movement", move |_dt: f64, _e: &mut Engine| {
            first.borrow_mut().push("first");
        }));
        assert!(!engine.add_system("movement", move |_dt: f64, _e: &mut Engine| {
            second.borrow_mut().push("second");
        }));

        engine.update(1.0);
        assert_eq!(*hits.borrow(), vec!["first"]);
    }

    #[test]
    fn remove_system_when_present() {
        let mut engine = Engine::new();
        engine.add_system("movement", |_dt: f64, _e: &mut Engine| {});
        assert!(!engine.remove_system("physics"));
        assert!(engine.remove_system("movement"));
        assert!(!engine.has_system("movement"));
        assert_eq!(engine.system_count(), 0);
    }

    #[test]
    fn system_receives_dt_and_mutates_entities() {
        let mut engine = Engine::new();
        let mut e = engine.create_entity("hero");
        e.add_component(Position { x: 0.0, y: 0.0 });
        e.add_component(Velocity { dx: 2.0, dy: -1.0 });
        let id = e.id();
        engine.add_entity(e);

        engine.add_system("movement", |dt: f64, engine: &mut Engine| {
            for id in engine.ids_with_all(&["Position", "Velocity"]) {
                let Some(mut entity) = engine.entity_mut(id) else {
                    continue;
                };
                let Some(vel) = entity.get::<Velocity>().cloned() else {
                    continue;
                };
                if let Some(pos) = entity.get_mut::<Position>() {
                    pos.x += vel.dx * dt as f32;
                    pos.y += vel.dy * dt as f32;
                }
            }
        });

        engine.update(0.5);
        assert_eq!(
            engine.entity(id).unwrap().get::<Position>(),
            Some(&Position { x: 1.0, y: -0.5 })
        );
    }

    #[test]
    fn later_system_sees_index_changes_from_earlier_system() {
        let seen = Rc::new(RefCell::new(0usize));
        let mut engine = Engine::new();
        let e = engine.create_entity("hero");
        let id = e.id();
        engine.add_entity(e);

        engine.add_system("spawn_velocity", move |_dt: f64, engine: &mut Engine| {
            if let Some(mut hero) = engine.entity_mut(id) {
                hero.add_component(Velocity { dx: 1.0, dy: 0.0 });
            }
        });
        let counter = Rc::clone(&seen);
        engine.add_system("count", move |_dt: f64, engine: &mut Engine| {
            *counter.borrow_mut() = engine.ids_for_component("Velocity").len();
        });

        engine.update(0.1);
        assert_eq!(*seen.borrow(), 1);
    }

    #[test]
    fn system_added_mid_frame_runs_next_frame() {
        let runs = Rc::new(RefCell::new(0u32));
        let mut engine = Engine::new();
        let counter = Rc::clone(&runs);
        engine.add_system("installer", move |_dt: f64, engine: &mut Engine| {
            let counter = Rc::clone(&counter);
            engine.add_system("late", move |_dt: f64, _e: &mut Engine| {
                *counter.borrow_mut() += 1;
            });
        });

        engine.update(0.1);
        assert_eq!(*runs.borrow(), 0);
        engine.update(0.1);
        assert_eq!(*runs.borrow(), 1);
        assert_eq!(engine.system_names(), vec!["installer", "late"]);
    }

    #[test]
    fn system_can_remove_itself() {
        let runs = Rc::new(RefCell::new(0u32));
        let mut engine = Engine::new();
        let counter = Rc::clone(&runs);
        engine.add_system("once", move |_dt: f64, engine: &mut Engine| {
            *counter.borrow_mut() += 1;
            engine.remove_system("once");
        });

        engine.update(0.1);
        engine.update(0.1);
        assert_eq!(*runs.borrow(), 1);
        assert!(!engine.has_system("once"));
    }

    #[test]
    fn system_removed_by_earlier_system_is_skipped() {
        let runs = Rc::new(RefCell::new(0u32));
        let mut engine = Engine::new();
        engine.add_system("killer", |_dt: f64, engine: &mut Engine| {
            engine.remove_system("victim");
        });
        let counter = Rc::clone(&runs);
        engine.add_system("victim", move |_dt: f64, _e: &mut Engine| {
            *counter.borrow_mut() += 1;
        });

        engine.update(0.1);
        assert_eq!(*runs.borrow(), 0);
    }

    // -- diagnostics --------------------------------------------------------

    #[test]
    fn verify_indices_detects_divergence() {
        let mut engine = Engine::new();
        let mut e = engine.create_entity("hero");
        e.add_component(Position { x: 0.0, y: 0.0 });
        let id = e.id();
        engine.add_entity(e);

        // Corrupt the cache behind the entity's back.
        engine
            .index
            .entity_has_changed(Change::ComponentRemoved, "Position", id);

        let err = engine.verify_indices().unwrap_err();
        match err {
            EcsError::IndexMismatch {
                index,
                key,
                expected,
                actual,
            } => {
                assert_eq!(index, IndexKind::Component);
                assert_eq!(key, "Position");
                assert_eq!(expected, vec![id]);
                assert!(actual.is_empty());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn per_frame_verification_keeps_running() {
        let mut engine = Engine::with_config(EngineConfig {
            verify_indices_each_frame: true,
            ..Default::default()
        });
        let e = engine.create_entity("hero");
        let id = e.id();
        engine.add_entity(e);
        engine.add_system("tagger", move |_dt: f64, engine: &mut Engine| {
            if let Some(mut hero) = engine.entity_mut(id) {
                hero.add_tag("seen");
            }
        });

        engine.update(0.1);
        assert_eq!(engine.frame_count(), 1);
        assert!(engine.verify_indices().is_ok());
    }

    #[test]
    fn index_stats_reflect_registry() {
        let mut engine = Engine::new();
        let mut a = engine.create_entity("a");
        a.add_component(Position { x: 0.0, y: 0.0 });
        a.add_tag("player");
        let mut b = engine.create_entity("b");
        b.add_component(Position { x: 0.0, y: 0.0 });
        b.add_component(Velocity { dx: 0.0, dy: 0.0 });
        engine.add_entity(a);
        engine.add_entity(b);

        let stats = engine.index_stats();
        assert_eq!(stats.entities, 2);
        assert_eq!(stats.component_types, 2);
        assert_eq!(stats.component_entries, 3);
        assert_eq!(stats.tags, 1);
        assert_eq!(stats.tag_entries, 1);
    }
}
