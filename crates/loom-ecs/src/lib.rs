//! Loom ECS -- an Entity Component System built around incrementally
//! maintained reverse indices.
//!
//! Entities are named bags of components (one per type name) and string tags.
//! The [`Engine`](engine::Engine) keeps two reverse indices, component type
//! name to entity ids and tag to entity ids, in sync with every registered
//! entity, so type and tag queries read a bucket instead of scanning all
//! entities. Systems run once per [`update`](engine::Engine::update), in
//! registration order.
//!
//! # Quick Start
//!
//! ```
//! use loom_ecs::prelude::*;
//!
//! #[derive(Debug, PartialEq)]
//! struct Position { x: f32, y: f32 }
//! impl TypedComponent for Position { const TYPE_NAME: &'static str = "Position"; }
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Velocity { dx: f32, dy: f32 }
//! impl TypedComponent for Velocity { const TYPE_NAME: &'static str = "Velocity"; }
//!
//! let mut engine = Engine::new();
//! let mut ship = engine.create_entity("ship");
//! ship.add_component(Position { x: 0.0, y: 0.0 });
//! ship.add_component(Velocity { dx: 1.0, dy: 0.0 });
//! let id = ship.id();
//! assert!(engine.add_entity(ship));
//!
//! engine.add_system("movement", |dt: f64, engine: &mut Engine| {
//!     for id in engine.ids_with_all(&["Position", "Velocity"]) {
//!         let Some(mut e) = engine.entity_mut(id) else { continue };
//!         let Some(vel) = e.get::<Velocity>().cloned() else { continue };
//!         if let Some(pos) = e.get_mut::<Position>() {
//!             pos.x += vel.dx * dt as f32;
//!             pos.y += vel.dy * dt as f32;
//!         }
//!     }
//! });
//!
//! engine.update(2.0);
//! assert_eq!(
//!     engine.entity(id).and_then(|e| e.get::<Position>()),
//!     Some(&Position { x: 2.0, y: 0.0 })
//! );
//! ```

#![deny(unsafe_code)]

pub mod component;
pub mod engine;
pub mod entity;
pub mod index;
pub mod query;
pub mod system;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors produced by ECS operations.
///
/// Lookups that simply miss return `Option`; redundant removals are silent
/// no-ops. Only registration conflicts, id exhaustion, payload decoding and
/// index verification produce errors.
#[derive(Debug, thiserror::Error)]
pub enum EcsError {
    /// An entity with this id is already registered.
    #[error("entity {entity} is already registered")]
    DuplicateEntityId { entity: entity::EntityId },

    /// A registered entity already uses this name.
    #[error("an entity named '{name}' is already registered")]
    DuplicateEntityName { name: String },

    /// An id allocator has already handed out `u64::MAX`.
    #[error("entity id space is exhausted")]
    EntityIdsExhausted,

    /// A dynamic component payload did not (de)serialize.
    #[error("failed to (de)serialize component '{component}': {details}")]
    ComponentSerialization { component: String, details: String },

    /// The maintained reverse index disagrees with entity state.
    #[error("{index} index out of sync for '{key}': expected {expected:?}, found {actual:?}")]
    IndexMismatch {
        index: index::IndexKind,
        key: String,
        expected: Vec<entity::EntityId>,
        actual: Vec<entity::EntityId>,
    },
}

// ---------------------------------------------------------------------------
// Prelude
// ---------------------------------------------------------------------------

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::component::{Component, DynamicComponent, TypedComponent};
    pub use crate::engine::{Engine, EngineConfig, EntityMut, RejectedEntity};
    pub use crate::entity::{Entity, EntityId, EntityIdAllocator};
    pub use crate::index::{Change, IndexKind, IndexStats};
    pub use crate::system::System;
    pub use crate::EcsError;
}

// ---------------------------------------------------------------------------
// Integration Tests
// ---------------------------------------------------------------------------
