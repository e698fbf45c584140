//! modelgraph - embeddable reactive record graph.
//!
//! Re-exports the core model layer and adds [`Env`], a cloneable handle
//! around one [`ModelManager`] that serializes writers while letting readers
//! run between mutations.
//!
//! # Example
//!
//! ```
//! use modelgraph::{Data, Env, FieldDefinition, ModelDecl};
//!
//! let env = Env::default();
//! env.declare(
//!     ModelDecl::new("Thread")
//!         .with_field(FieldDefinition::attr("name"))
//!         .with_field(FieldDefinition::one2many("messages", "Message").inverse("thread")),
//! )?;
//! env.declare(
//!     ModelDecl::new("Message")
//!         .with_field(FieldDefinition::many2one("thread", "Thread").inverse("messages")),
//! )?;
//! env.start()?;
//!
//! let thread = env.create("Thread", Data::new().set("name", "General"))?;
//! let message = env.create("Message", Data::new().link("thread", &thread))?;
//! env.read(|manager| {
//!     let thread = manager.record(&thread).unwrap();
//!     assert!(thread.records("messages").unwrap().has(&message));
//! });
//! # Ok::<(), modelgraph::Error>(())
//! ```

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;

pub use modelgraph_core::*;

/// Shared handle to a model manager.
///
/// Every mutation takes the write lock for its whole duration, so readers
/// never observe a graph in the middle of stabilization.
#[derive(Clone)]
pub struct Env {
    manager: Arc<RwLock<ModelManager>>,
    #[cfg(feature = "async")]
    started: Arc<tokio::sync::watch::Sender<bool>>,
}

impl Default for Env {
    fn default() -> Self {
        Self::new(ModelManager::default())
    }
}

impl Env {
    /// Wrap a manager.
    pub fn new(manager: ModelManager) -> Self {
        #[cfg(feature = "async")]
        let started = Arc::new(tokio::sync::watch::channel(manager.is_started()).0);
        Self {
            manager: Arc::new(RwLock::new(manager)),
            #[cfg(feature = "async")]
            started,
        }
    }

    /// Create an environment with a custom manager configuration.
    pub fn with_config(config: ManagerConfig) -> Self {
        Self::new(ModelManager::with_config(ModelRegistry::new(), config))
    }

    /// Run `f` with shared access to the manager.
    pub fn read<R>(&self, f: impl FnOnce(&ModelManager) -> R) -> R {
        f(&*self.manager.read())
    }

    /// Run `f` with exclusive access to the manager.
    pub fn write<R>(&self, f: impl FnOnce(&mut ModelManager) -> R) -> R {
        f(&mut *self.manager.write())
    }

    /// Shared lock guard, for callers holding several views at once.
    pub fn lock_read(&self) -> RwLockReadGuard<'_, ModelManager> {
        self.manager.read()
    }

    /// Exclusive lock guard.
    pub fn lock_write(&self) -> RwLockWriteGuard<'_, ModelManager> {
        self.manager.write()
    }

    /// Declare a model before start.
    pub fn declare(&self, decl: ModelDecl) -> Result<()> {
        self.write(|m| m.declare(decl))
    }

    /// Register a model factory before start.
    pub fn register<I, S, F>(&self, name: impl Into<String>, dependencies: I, factory: F) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
        F: FnOnce(&Declared<'_>) -> ModelDecl + Send + Sync + 'static,
    {
        self.write(|m| m.register(name, dependencies, factory))
    }

    /// Patch a registered model before start.
    pub fn patch(&self, patch: ModelPatch) -> Result<()> {
        self.write(|m| m.patch(patch))
    }

    /// Require models to be registered before start.
    pub fn expect<I, S>(&self, names: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.write(|m| m.expect(names))
    }

    /// Freeze the registry and release everyone waiting on
    /// [`started`](Self::started).
    pub fn start(&self) -> Result<()> {
        self.write(ModelManager::start)?;
        #[cfg(feature = "async")]
        self.started.send_replace(true);
        tracing::debug!("environment started");
        Ok(())
    }

    /// Drop every record and return to the declaring state.
    pub fn teardown(&self) {
        self.write(ModelManager::teardown);
        #[cfg(feature = "async")]
        self.started.send_replace(false);
    }

    /// Whether the manager has started.
    pub fn is_started(&self) -> bool {
        self.read(ModelManager::is_started)
    }

    /// Wait until [`start`](Self::start) has frozen the registry.
    #[cfg(feature = "async")]
    pub async fn started(&self) {
        let mut rx = self.started.subscribe();
        // the sender lives as long as `self`, so waiting cannot fail
        let _ = rx.wait_for(|started| *started).await;
    }

    /// Create a record.
    pub fn create(&self, model: &str, data: Data) -> Result<LocalId> {
        self.write(|m| m.create(model, data))
    }

    /// Find-or-create a record by natural key.
    pub fn insert(&self, model: &str, data: Data) -> Result<LocalId> {
        self.write(|m| m.insert(model, data))
    }

    /// Update a record.
    pub fn update(&self, id: &LocalId, data: Data) -> Result<()> {
        self.write(|m| m.update(id, data))
    }

    /// Delete a record and what it causally owns.
    pub fn delete(&self, id: &LocalId) -> Result<()> {
        self.write(|m| m.delete(id))
    }

    /// Whether a record is alive.
    pub fn exists(&self, id: &LocalId) -> bool {
        self.read(|m| m.exists(id))
    }

    /// Work counters.
    pub fn stats(&self) -> ManagerStats {
        self.read(ModelManager::stats)
    }

    /// Subscribe to record changes.
    pub fn subscribe<F>(&self, model: Option<&str>, callback: F) -> ObserverId
    where
        F: FnMut(&ChangeEvent) + Send + Sync + 'static,
    {
        self.write(|m| m.subscribe(model, callback))
    }

    /// Remove a subscription.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        self.write(|m| m.unsubscribe(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Env>();
    }

    #[test]
    fn test_clones_share_manager() {
        let env = Env::default();
        env.declare(ModelDecl::new("Note").with_field(FieldDefinition::attr("text")))
            .unwrap();
        env.start().unwrap();

        let other = env.clone();
        let id = other.create("Note", Data::new().set("text", "hi")).unwrap();
        assert!(env.exists(&id));
        assert_eq!(env.stats().records, 1);
    }
}
