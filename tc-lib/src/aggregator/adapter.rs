use std::sync::Arc;

use dashmap::DashMap;

use super::EntityId;
use crate::frame::{Scid, Vcid};

pub type Apid = u16;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AdapterError {
    /// The uplink transport rejected or failed to deliver the data.
    #[error("uplink failure: {0}")]
    Uplink(String),
    #[error("malformed argument: {0}")]
    MalformedArgument(String),
}

/// Destination for aggregated PDU payloads.
///
/// `send` may block on the underlying transport.
pub trait OutputAdapter: Send + Sync {
    /// Send `pdu` on virtual channel `vcid` of spacecraft `scid`.
    ///
    /// # Errors
    /// [AdapterError] if the payload could not be sent.
    fn send(&self, pdu: &[u8], vcid: Vcid, scid: Scid, apid: Apid) -> Result<(), AdapterError>;
}

/// Output adapters keyed by the entity they serve.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: DashMap<EntityId, Arc<dyn OutputAdapter>>,
}

impl AdapterRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, entity: EntityId) -> Option<Arc<dyn OutputAdapter>> {
        self.adapters.get(&entity).map(|a| a.value().clone())
    }

    /// Register `adapter` for `entity`, returning any adapter it replaces.
    pub fn put(
        &self,
        entity: EntityId,
        adapter: Arc<dyn OutputAdapter>,
    ) -> Option<Arc<dyn OutputAdapter>> {
        self.adapters.insert(entity, adapter)
    }

    pub fn evict(&self, entity: EntityId) -> Option<Arc<dyn OutputAdapter>> {
        self.adapters.remove(&entity).map(|(_, a)| a)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.adapters.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut entities: Vec<EntityId> = self.adapters.iter().map(|e| *e.key()).collect();
        entities.sort_unstable();
        f.debug_struct("AdapterRegistry")
            .field("entities", &entities)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Nop;

    impl OutputAdapter for Nop {
        fn send(&self, _: &[u8], _: Vcid, _: Scid, _: Apid) -> Result<(), AdapterError> {
            Ok(())
        }
    }

    #[test]
    fn registry_get_put_evict() {
        let registry = AdapterRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get(1).is_none());

        assert!(registry.put(1, Arc::new(Nop)).is_none());
        assert!(registry.put(1, Arc::new(Nop)).is_some(), "replaces existing");
        registry.put(2, Arc::new(Nop));
        assert_eq!(registry.len(), 2);
        assert!(registry.get(1).is_some());

        assert!(registry.evict(1).is_some());
        assert!(registry.evict(1).is_none());
        assert!(registry.get(1).is_none());
        assert_eq!(format!("{registry:?}"), "AdapterRegistry { entities: [2] }");
    }
}
