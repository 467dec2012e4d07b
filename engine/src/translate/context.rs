//! Per-translation state threaded through parse and serialize.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::config::EngineConfig;
use crate::error::RegistryResult;
use crate::registry::{IdRegistry, RegistryExport, ReverseEntry};
use crate::units::{UnitPolicy, UnitSystem};

/// Id registry owned by one translation or shared by a batch.
#[derive(Debug, Clone)]
pub enum RegistryHandle {
    Private(IdRegistry),
    Shared(Arc<Mutex<IdRegistry>>),
}

impl RegistryHandle {
    fn with<R>(&mut self, f: impl FnOnce(&mut IdRegistry) -> R) -> R {
        match self {
            Self::Private(registry) => f(registry),
            Self::Shared(shared) => f(&mut lock(shared)),
        }
    }
}

/// Lock a shared registry. A poisoned lock still holds consistent data
/// because every registry mutation completes before returning.
pub fn lock(shared: &Mutex<IdRegistry>) -> MutexGuard<'_, IdRegistry> {
    shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Everything an adapter may consult or mutate while translating.
#[derive(Debug, Clone)]
pub struct TranslationContext {
    registry: RegistryHandle,
    config: Arc<EngineConfig>,
}

impl TranslationContext {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self::with_registry(IdRegistry::new(), config)
    }

    pub fn with_registry(registry: IdRegistry, config: Arc<EngineConfig>) -> Self {
        Self {
            registry: RegistryHandle::Private(registry),
            config,
        }
    }

    pub fn shared(registry: Arc<Mutex<IdRegistry>>, config: Arc<EngineConfig>) -> Self {
        Self {
            registry: RegistryHandle::Shared(registry),
            config,
        }
    }

    /// Fresh context with a private empty registry and the same config.
    pub fn fresh(&self) -> Self {
        Self::new(Arc::clone(&self.config))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn config_arc(&self) -> Arc<EngineConfig> {
        Arc::clone(&self.config)
    }

    pub fn unit_policy(&self, default_system: UnitSystem) -> UnitPolicy {
        self.config.unit_policy(default_system)
    }

    pub fn generate_id(
        &mut self,
        prefix: &str,
        source_id: &str,
        context: &str,
        source_format: &str,
    ) -> String {
        self.registry
            .with(|r| r.generate_id(prefix, source_id, context, source_format))
    }

    pub fn claim(&mut self, id: &str, source_id: &str, context: &str, source_format: &str) -> bool {
        self.registry
            .with(|r| r.claim(id, source_id, context, source_format))
    }

    /// Recorded origin of an id.
    pub fn origin(&mut self, id: &str) -> Option<ReverseEntry> {
        self.registry.with(|r| r.resolve(id).cloned())
    }

    pub fn import_registry(&mut self, export: RegistryExport) -> RegistryResult<usize> {
        self.registry.with(|r| r.import(export))
    }

    pub fn export_registry(&mut self) -> RegistryExport {
        self.registry.with(|r| r.export())
    }

    /// Take the private registry back out, e.g. to persist it.
    pub fn into_registry(self) -> IdRegistry {
        match self.registry {
            RegistryHandle::Private(registry) => registry,
            RegistryHandle::Shared(shared) => lock(&shared).clone(),
        }
    }
}

impl Default for TranslationContext {
    fn default() -> Self {
        Self::new(Arc::new(EngineConfig::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_context_is_deterministic() {
        let mut a = TranslationContext::default();
        let mut b = TranslationContext::default();
        let ida = a.generate_id("Z", "Living", "", "CIBD22X");
        let idb = b.generate_id("Z", "Living", "", "CIBD22X");
        assert_eq!(ida, idb);
        assert_eq!(a.generate_id("Z", "Living", "", "CIBD22X"), ida);
    }

    #[test]
    fn test_shared_contexts_see_each_other() {
        let shared = Arc::new(Mutex::new(IdRegistry::new()));
        let config = Arc::new(EngineConfig::default());
        let mut a = TranslationContext::shared(Arc::clone(&shared), Arc::clone(&config));
        let mut b = TranslationContext::shared(Arc::clone(&shared), config);

        let id = a.generate_id("Z", "Living", "", "CIBD22X");
        assert_eq!(b.generate_id("Z", "Living", "", "CIBD22X"), id);
        assert_eq!(lock(&shared).len(), 1);
    }

    #[test]
    fn test_fresh_context_forgets_ids() {
        let mut ctx = TranslationContext::default();
        ctx.generate_id("Z", "", "ResZn#0", "CIBD22X");
        let mut fresh = ctx.fresh();
        assert!(fresh.export_registry().forward_map.is_empty());
        assert_eq!(ctx.into_registry().len(), 1);
    }
}
