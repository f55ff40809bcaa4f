//! Systems and the ordered registry the engine runs each frame.
//!
//! A system is anything implementing [`System`]; closures of the form
//! `FnMut(f64, &mut Engine)` qualify directly. Systems are keyed by a name
//! and run in registration order, so cross-system ordering within a frame is
//! reproducible.

use crate::engine::Engine;

// ---------------------------------------------------------------------------
// System
// ---------------------------------------------------------------------------

/// A behavioural unit invoked once per [`Engine::update`].
pub trait System {
    /// Advance this system by `dt` seconds.
    ///
    /// The engine is passed mutably: systems may query it, mutate entity
    /// components and tags, and add or remove entities. Index changes are
    /// visible to every system that runs afterwards in the same frame.
    fn update(&mut self, dt: f64, engine: &mut Engine);
}

impl<F: FnMut(f64, &mut Engine)> System for F {
    fn update(&mut self, dt: f64, engine: &mut Engine) {
        (self)(dt, engine);
    }
}

// ---------------------------------------------------------------------------
// SystemRegistry
// ---------------------------------------------------------------------------

/// A named slot. `system` is `None` while the system is running.
struct RegisteredSystem {
    name: String,
    system: Option<Box<dyn System>>,
}

/// Insertion-ordered map from system name to system.
#[derive(Default)]
pub(crate) struct SystemRegistry {
    entries: Vec<RegisteredSystem>,
}

impl SystemRegistry {
    pub(crate) fn contains(&self, name: &str) -> bool {
        self.entries.iter().any(|s| s.name == name)
    }

    /// Append unless `name` is already registered. First registration wins.
    pub(crate) fn insert(&mut self, name: &str, system: Box<dyn System>) -> bool {
        if self.contains(name) {
            return false;
        }
        self.entries.push(RegisteredSystem {
            name: name.to_owned(),
            system: Some(system),
        });
        true
    }

    /// Remove the registration for `name`, dropping the system.
    pub(crate) fn remove(&mut self, name: &str) -> bool {
        let before = self.entries.len();
        self.entries.retain(|s| s.name != name);
        self.entries.len() != before
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.entries.iter().map(|s| s.name.clone()).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Take a system out of its slot so it can run against the engine.
    ///
    /// Returns `None` if `name` is not registered or is already running.
    pub(crate) fn take(&mut self, name: &str) -> Option<Box<dyn System>> {
        self.entries
            .iter_mut()
            .find(|s| s.name == name)
            .and_then(|s| s.system.take())
    }

    /// Put a system back into its empty slot.
    ///
    /// If the registration was removed while the system ran, the system is
    /// dropped and `false` is returned.
    pub(crate) fn restore(&mut self, name: &str, system: Box<dyn System>) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|s| s.name == name && s.system.is_none())
        {
            Some(slot) => {
                slot.system = Some(system);
                true
            }
            None => false,
        }
    }
}

impl std::fmt::Debug for SystemRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|s| &s.name))
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
