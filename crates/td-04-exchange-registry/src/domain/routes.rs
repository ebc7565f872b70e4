//! Resource routes.
//!
//! A process instance listening on a REST-style resource registers a route
//! keyed by `url~method`. The route lives exactly as long as its instance.

use crate::error::{RegistryError, RegistryResult};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use shared_types::InstanceId;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RouteKey {
    pub url: String,
    pub method: String,
}

impl RouteKey {
    pub fn new(url: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: method.into(),
        }
    }
}

impl fmt::Display for RouteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}~{}", self.url, self.method)
    }
}

/// A listener bound to a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRoute {
    pub key: RouteKey,
    /// Correlation selector used to pick the receive activity.
    pub pick_selector: String,
    pub instance_id: InstanceId,
    /// Response channel of the receive activity.
    pub channel: String,
}

impl ResourceRoute {
    pub fn new(
        key: RouteKey,
        pick_selector: impl Into<String>,
        instance_id: InstanceId,
        channel: impl Into<String>,
    ) -> Self {
        Self {
            key,
            pick_selector: pick_selector.into(),
            instance_id,
            channel: channel.into(),
        }
    }
}

/// Route table keyed by `url~method`.
#[derive(Debug, Default)]
pub struct RouteTable {
    routes: RwLock<HashMap<RouteKey, ResourceRoute>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route. The owning instance may replace its own route; any other
    /// instance gets [`RegistryError::RouteConflict`].
    pub fn add(&self, route: ResourceRoute) -> RegistryResult<()> {
        let mut routes = self.routes.write();
        if let Some(existing) = routes.get(&route.key) {
            if existing.instance_id != route.instance_id {
                return Err(RegistryError::RouteConflict {
                    url: route.key.url.clone(),
                    method: route.key.method.clone(),
                    holder: existing.instance_id.clone(),
                });
            }
        }
        debug!(route = %route.key, instance = %route.instance_id, "resource route added");
        routes.insert(route.key.clone(), route);
        Ok(())
    }

    pub fn get(&self, url: &str, method: &str) -> Option<ResourceRoute> {
        self.routes.read().get(&RouteKey::new(url, method)).cloned()
    }

    pub fn remove(&self, key: &RouteKey) -> Option<ResourceRoute> {
        self.routes.write().remove(key)
    }

    /// Drops every route held by `instance`. Returns how many were removed.
    pub fn cleanup_for_instance(&self, instance: &InstanceId) -> usize {
        let mut routes = self.routes.write();
        let before = routes.len();
        routes.retain(|_, route| &route.instance_id != instance);
        let removed = before - routes.len();
        if removed > 0 {
            debug!(%instance, removed, "resource routes cleaned up");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.routes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
