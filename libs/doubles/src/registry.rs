//! Double registry
//!
//! Process-wide directory mapping a double's public identifier to its actor
//! address, owning test address, source descriptor, and configuration.
//! Lookup misses are a normal outcome (the double may already be torn down);
//! callers that required the entry turn the miss into a fatal error.
//!
//! Entries are never reclaimed automatically. Test-lifecycle managers call
//! [`DoubleRegistry::reset`] between tests.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;
use sha3::{Digest, Sha3_256};
use tokio::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::actor::DoubleHandle;
use crate::error::{DoubleError, Result};
use crate::recorder::TestAddress;
use crate::source::{Installer, SourceDescriptor};

/// Suffix counter for identifiers derived from a source name
static NEXT_SUFFIX: AtomicU64 = AtomicU64::new(1);

/// Opaque, process-unique double identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DoubleId(String);

impl DoubleId {
    /// Use a caller-supplied name verbatim
    pub fn from_name(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Derive from the doubled source's own name plus a uniqueness suffix
    pub fn derived_from_source(source_name: &str) -> Self {
        let suffix = NEXT_SUFFIX.fetch_add(1, Ordering::Relaxed);
        Self(format!("{source_name}-{suffix}"))
    }

    /// Fallback when no name is determinable: content hash of a fresh
    /// per-instance unique value. Uniqueness is probabilistic by design.
    pub fn anonymous() -> Self {
        let digest = Sha3_256::digest(Uuid::new_v4().as_bytes());
        Self(format!("double-{}", &hex::encode(digest)[..16]))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DoubleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Recognized per-double options
#[derive(Clone)]
pub struct DoubleConfig {
    /// Reject stubs whose signature is absent from the verified source
    pub verify: bool,
    /// Include the doubled source's identity in recorded-call messages
    pub send_source_in_messages: bool,
    /// Identifier override; wins over derivation when supplied
    pub name: Option<String>,
    /// Collaborator that installs the module surface on a live target
    pub installer: Option<Arc<dyn Installer>>,
}

impl Default for DoubleConfig {
    fn default() -> Self {
        Self {
            verify: true,
            send_source_in_messages: false,
            name: None,
            installer: None,
        }
    }
}

impl fmt::Debug for DoubleConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DoubleConfig")
            .field("verify", &self.verify)
            .field("send_source_in_messages", &self.send_source_in_messages)
            .field("name", &self.name)
            .field("has_installer", &self.installer.is_some())
            .finish()
    }
}

/// Everything the registry knows about one double
#[derive(Debug, Clone)]
pub struct RegistryEntry {
    pub actor: DoubleHandle,
    pub test: TestAddress,
    pub source: Option<SourceDescriptor>,
    pub config: DoubleConfig,
}

/// Process-wide directory of live doubles
#[derive(Debug, Default)]
pub struct DoubleRegistry {
    entries: Arc<RwLock<HashMap<DoubleId, RegistryEntry>>>,
}

static GLOBAL: Lazy<DoubleRegistry> = Lazy::new(DoubleRegistry::new);

/// The process-global registry used by the facade operations
pub fn global() -> &'static DoubleRegistry {
    &GLOBAL
}

impl DoubleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a double. Refuses an identifier already in use; the write
    /// lock makes registration linearizable per key.
    pub async fn register(&self, id: DoubleId, entry: RegistryEntry) -> Result<()> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&id) {
            warn!(double = %id, "registration refused: identifier already in use");
            return Err(DoubleError::IdentifierTaken { id: id.to_string() });
        }
        debug!(double = %id, "registering double");
        entries.insert(id, entry);
        Ok(())
    }

    /// Actor address for an identifier, if still registered
    pub async fn lookup_actor(&self, id: &DoubleId) -> Option<DoubleHandle> {
        self.entries.read().await.get(id).map(|e| e.actor.clone())
    }

    /// Owning test's address for an identifier, if still registered
    pub async fn lookup_test(&self, id: &DoubleId) -> Option<TestAddress> {
        self.entries.read().await.get(id).map(|e| e.test.clone())
    }

    /// Configuration recorded at creation time
    pub async fn configuration_for(&self, id: &DoubleId) -> Option<DoubleConfig> {
        self.entries.read().await.get(id).map(|e| e.config.clone())
    }

    /// Source descriptor recorded at creation time
    pub async fn source_for(&self, id: &DoubleId) -> Option<SourceDescriptor> {
        self.entries.read().await.get(id).and_then(|e| e.source.clone())
    }

    /// Full entry for an identifier, if still registered
    pub async fn entry_for(&self, id: &DoubleId) -> Option<RegistryEntry> {
        self.entries.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &DoubleId) -> bool {
        self.entries.read().await.contains_key(id)
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Teardown hook for test-lifecycle managers: drop every entry.
    /// Actors stop once the last handle to their mailbox is dropped.
    pub async fn reset(&self) {
        let mut entries = self.entries.write().await;
        let dropped = entries.len();
        entries.clear();
        debug!(dropped, "registry reset");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor;
    use crate::recorder::TestInbox;

    fn entry() -> (DoubleId, RegistryEntry) {
        let id = DoubleId::anonymous();
        let (address, _inbox) = TestInbox::channel();
        let entry = RegistryEntry {
            actor: actor::spawn(id.clone()),
            test: address,
            source: None,
            config: DoubleConfig::default(),
        };
        (id, entry)
    }

    #[test]
    fn anonymous_ids_are_unique_and_prefixed() {
        let a = DoubleId::anonymous();
        let b = DoubleId::anonymous();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("double-"));
        // "double-" plus 16 hex chars of the digest
        assert_eq!(a.as_str().len(), "double-".len() + 16);
    }

    #[test]
    fn source_derived_ids_carry_a_uniqueness_suffix() {
        let a = DoubleId::derived_from_source("Gateway");
        let b = DoubleId::derived_from_source("Gateway");
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("Gateway-"));
    }

    #[tokio::test]
    async fn register_lookup_and_miss() {
        let registry = DoubleRegistry::new();
        let (id, e) = entry();

        registry.register(id.clone(), e).await.unwrap();
        assert!(registry.contains(&id).await);
        assert!(registry.lookup_actor(&id).await.is_some());
        assert!(registry.lookup_test(&id).await.is_some());

        // Misses are a normal Option-shaped outcome, not an error.
        let ghost = DoubleId::from_name("ghost");
        assert!(registry.lookup_actor(&ghost).await.is_none());
        assert!(registry.configuration_for(&ghost).await.is_none());
    }

    #[tokio::test]
    async fn duplicate_identifiers_are_refused() {
        let registry = DoubleRegistry::new();
        let (_, e1) = entry();
        let (_, e2) = entry();
        let id = DoubleId::from_name("shared");

        registry.register(id.clone(), e1).await.unwrap();
        let err = registry.register(id.clone(), e2).await.unwrap_err();
        assert_eq!(
            err,
            DoubleError::IdentifierTaken {
                id: "shared".to_string()
            }
        );
        assert_eq!(registry.len().await, 1);
    }

    #[tokio::test]
    async fn reset_drops_every_entry() {
        let registry = DoubleRegistry::new();
        for _ in 0..3 {
            let (id, e) = entry();
            registry.register(id, e).await.unwrap();
        }
        assert_eq!(registry.len().await, 3);

        registry.reset().await;
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn concurrent_registration_claims_one_id_once() {
        let registry = Arc::new(DoubleRegistry::new());
        let id = DoubleId::from_name("contested");

        let mut tasks = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            let id = id.clone();
            let (_, e) = entry();
            tasks.push(tokio::spawn(async move { registry.register(id, e).await }));
        }

        let mut wins = 0;
        for task in tasks {
            if task.await.unwrap().is_ok() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
        assert_eq!(registry.len().await, 1);
    }
}
