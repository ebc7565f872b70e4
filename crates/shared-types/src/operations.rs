//! # Operation Catalog
//!
//! Process-wide registry mapping `(service, operation)` to the interaction
//! pattern of that operation. The binding layer registers operations when a
//! process is deployed and the exchange registry consults the catalog when an
//! exchange is bound to an operation.
//!
//! ## Lifecycle
//!
//! ```text
//! OperationCatalog::new_shared() ──register()──→ [populated] ──clear()──→ [empty]
//! ```
//!
//! The catalog is an explicit value: it is created at node start-up, shared by
//! `Arc`, and torn down with `clear()` when the node stops.

use crate::errors::CatalogError;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Message exchange pattern of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InteractionPattern {
    /// Fire-and-forget; no response expected.
    OneWay,
    /// A response (or fault) is expected for every request.
    RequestResponse,
    /// Pattern not known yet (operation not bound).
    Unknown,
}

impl fmt::Display for InteractionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OneWay => write!(f, "ONE_WAY"),
            Self::RequestResponse => write!(f, "REQUEST_RESPONSE"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// Key of a catalogued operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationKey {
    pub service: String,
    pub operation: String,
}

impl OperationKey {
    pub fn new(service: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            operation: operation.into(),
        }
    }
}

/// Explicit process-wide operation registry.
#[derive(Debug, Default)]
pub struct OperationCatalog {
    operations: RwLock<HashMap<OperationKey, InteractionPattern>>,
}

impl OperationCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a catalog wrapped in Arc for shared ownership.
    pub fn new_shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Registers an operation. Re-registering with the same pattern is a no-op.
    pub fn register(
        &self,
        key: OperationKey,
        pattern: InteractionPattern,
    ) -> Result<(), CatalogError> {
        let mut operations = self.operations.write();
        match operations.get(&key) {
            Some(existing) if *existing != pattern => Err(CatalogError::ConflictingOperation {
                service: key.service,
                operation: key.operation,
                existing: existing.to_string(),
            }),
            Some(_) => Ok(()),
            None => {
                debug!(service = %key.service, operation = %key.operation, %pattern, "operation registered");
                operations.insert(key, pattern);
                Ok(())
            }
        }
    }

    /// Looks up the pattern of an operation.
    pub fn pattern(&self, key: &OperationKey) -> Option<InteractionPattern> {
        self.operations.read().get(key).copied()
    }

    /// Removes every operation of a service (process undeployed).
    pub fn unregister_service(&self, service: &str) -> usize {
        let mut operations = self.operations.write();
        let before = operations.len();
        operations.retain(|key, _| key.service != service);
        before - operations.len()
    }

    /// Tears the catalog down.
    pub fn clear(&self) {
        self.operations.write().clear();
    }

    pub fn len(&self) -> usize {
        self.operations.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let catalog = OperationCatalog::new();
        let key = OperationKey::new("OrderService", "placeOrder");
        catalog
            .register(key.clone(), InteractionPattern::RequestResponse)
            .unwrap();

        assert_eq!(
            catalog.pattern(&key),
            Some(InteractionPattern::RequestResponse)
        );
        assert_eq!(
            catalog.pattern(&OperationKey::new("OrderService", "cancel")),
            None
        );
    }

    #[test]
    fn test_conflicting_registration_rejected() {
        let catalog = OperationCatalog::new();
        let key = OperationKey::new("Billing", "notify");
        catalog.register(key.clone(), InteractionPattern::OneWay).unwrap();
        catalog.register(key.clone(), InteractionPattern::OneWay).unwrap();

        let err = catalog
            .register(key, InteractionPattern::RequestResponse)
            .unwrap_err();
        assert!(err.to_string().contains("ONE_WAY"));
    }

    #[test]
    fn test_unregister_service_and_clear() {
        let catalog = OperationCatalog::new();
        catalog
            .register(OperationKey::new("A", "x"), InteractionPattern::OneWay)
            .unwrap();
        catalog
            .register(OperationKey::new("A", "y"), InteractionPattern::OneWay)
            .unwrap();
        catalog
            .register(OperationKey::new("B", "z"), InteractionPattern::OneWay)
            .unwrap();

        assert_eq!(catalog.unregister_service("A"), 2);
        assert_eq!(catalog.len(), 1);

        catalog.clear();
        assert!(catalog.is_empty());
    }
}
