//! Component traits and the JSON-backed [`DynamicComponent`].
//!
//! Every component reports a string type name. That name is the key used by
//! an entity's component map and by the engine's component index. There is
//! no registration step: two components with the same type name occupy the
//! same slot.
//!
//! Most game code implements [`TypedComponent`], which fixes the name at
//! compile time and enables typed access through
//! [`Entity::get`](crate::entity::Entity::get). Components whose name is only
//! known at runtime (scripted or data-driven content) use
//! [`DynamicComponent`].

use std::any::Any;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::EcsError;

// ---------------------------------------------------------------------------
// Component
// ---------------------------------------------------------------------------

/// An opaque, type-tagged data record owned by exactly one entity.
pub trait Component: Any + fmt::Debug {
    /// The type identifier this component is stored and indexed under.
    fn type_name(&self) -> &str;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<'a> dyn Component + 'a {
    /// Whether the concrete type behind this component is `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.as_any().is::<T>()
    }

    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.as_any_mut().downcast_mut::<T>()
    }
}

// ---------------------------------------------------------------------------
// TypedComponent
// ---------------------------------------------------------------------------

/// A component whose type name is fixed at compile time.
///
/// ```
/// use loom_ecs::component::TypedComponent;
///
/// #[derive(Debug)]
/// struct Velocity { dx: f32, dy: f32 }
///
/// impl TypedComponent for Velocity {
///     const TYPE_NAME: &'static str = "Velocity";
/// }
/// ```
pub trait TypedComponent: Any + fmt::Debug {
    const TYPE_NAME: &'static str;
}

impl<T: TypedComponent> Component for T {
    fn type_name(&self) -> &str {
        T::TYPE_NAME
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// DynamicComponent
// ---------------------------------------------------------------------------

/// A component identified by a runtime name and carrying JSON data.
#[derive(Debug, Clone, PartialEq)]
pub struct DynamicComponent {
    type_name: String,
    data: serde_json::Value,
}

impl DynamicComponent {
    pub fn new(type_name: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            type_name: type_name.into(),
            data,
        }
    }

    /// Build a dynamic component by serializing a typed value.
    pub fn from_value<T: Serialize>(
        type_name: impl Into<String>,
        value: &T,
    ) -> Result<Self, EcsError> {
        let type_name = type_name.into();
        let data = serde_json::to_value(value).map_err(|e| EcsError::ComponentSerialization {
            component: type_name.clone(),
            details: e.to_string(),
        })?;
        Ok(Self { type_name, data })
    }

    pub fn data(&self) -> &serde_json::Value {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut serde_json::Value {
        &mut self.data
    }

    /// Decode the JSON payload into a typed value.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ComponentSerialization`] if the payload does not
    /// match `T`'s schema.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, EcsError> {
        serde_json::from_value(self.data.clone()).map_err(|e| EcsError::ComponentSerialization {
            component: self.type_name.clone(),
            details: e.to_string(),
        })
    }
}

impl Component for DynamicComponent {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
