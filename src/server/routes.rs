//! Route name to upstream factory registry.
//!
//! The first path segment of an upgrade request names the route:
//! `ws://host/chat/lobby` resolves `chat`.

// ============================================================================
// Imports
// ============================================================================

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::session::UpstreamFactory;

// ============================================================================
// RouteRegistry
// ============================================================================

/// Thread-safe map of route names to upstream factories.
///
/// Shared between the listener and every session through an `Arc`.
#[derive(Default)]
pub struct RouteRegistry {
    routes: RwLock<FxHashMap<String, UpstreamFactory>>,
}

impl RouteRegistry {
    /// Creates an empty registry.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `factory` under `name` unless the name is taken.
    ///
    /// Returns `false` (and keeps the existing route) if it is.
    pub fn add(&self, name: impl Into<String>, factory: UpstreamFactory) -> bool {
        let name = name.into();
        let mut routes = self.routes.write();

        if routes.contains_key(&name) {
            warn!(route = %name, "Route already registered");
            return false;
        }

        debug!(route = %name, "Route added");
        routes.insert(name, factory);
        true
    }

    /// Registers `factory` under `name`, replacing any existing route.
    pub fn set(&self, name: impl Into<String>, factory: UpstreamFactory) {
        let name = name.into();
        debug!(route = %name, "Route set");
        self.routes.write().insert(name, factory);
    }

    /// Removes a route. Returns `true` if it existed.
    pub fn remove(&self, name: &str) -> bool {
        self.routes.write().remove(name).is_some()
    }

    /// Looks up the factory for `name`.
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<UpstreamFactory> {
        self.routes.read().get(name).cloned()
    }

    /// Number of registered routes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    /// Returns `true` if no route is registered.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.read().is_empty()
    }
}

impl std::fmt::Debug for RouteRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let routes = self.routes.read();
        f.debug_struct("RouteRegistry")
            .field("routes", &routes.keys().collect::<Vec<_>>())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
