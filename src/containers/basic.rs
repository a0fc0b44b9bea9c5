use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use dashmap::DashMap;
use once_cell::sync::OnceCell;
use tracing::{debug, trace, warn};

use crate::error::ResolutionError;
use crate::interfaces::container::{Container, Instance};
use iconfig::ContainerConfig;

type Factory = Arc<dyn Fn(&BasicContainer) -> anyhow::Result<Instance> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Built on first resolve, then reused for the life of the container.
    Singleton,
    /// Built again on every resolve.
    Factory,
    /// Registered already built.
    Shared,
}

struct Binding {
    scope: Scope,
    factory: Option<Factory>,
    cell: OnceCell<Instance>,
}

thread_local! {
    // (container address, key) pairs currently under construction on this thread.
    static BUILDING: RefCell<Vec<(usize, String)>> = RefCell::new(Vec::new());
}

struct BuildGuard;

impl BuildGuard {
    fn enter(owner: usize, key: &str) -> Result<Self, ResolutionError> {
        BUILDING.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.iter().any(|(o, k)| *o == owner && k == key) {
                return Err(ResolutionError::Circular { key: key.to_string() });
            }
            stack.push((owner, key.to_string()));
            Ok(BuildGuard)
        })
    }
}

impl Drop for BuildGuard {
    fn drop(&mut self) {
        BUILDING.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

/// Which thread is building which singleton, and which key each blocked
/// thread is waiting on.
#[derive(Default)]
struct WaitGraph {
    owners: HashMap<String, ThreadId>,
    waiting: HashMap<ThreadId, String>,
}

impl WaitGraph {
    /// True if blocking `me` on `key` would close a wait cycle.
    fn closes_cycle(&self, me: ThreadId, key: &str) -> bool {
        let mut seen = HashSet::new();
        let mut next = self.owners.get(key).copied();
        while let Some(owner) = next {
            if owner == me {
                return true;
            }
            if !seen.insert(owner) {
                return false;
            }
            next = self
                .waiting
                .get(&owner)
                .and_then(|k| self.owners.get(k))
                .copied();
        }
        false
    }
}

/// Keyed service registry with singleton, factory and shared scopes.
///
/// Singletons are constructed at most once per binding, even when several
/// threads race on the first resolve. No map lock is held while a factory
/// runs, so factories may resolve their own dependencies from the container.
/// Singletons that depend on each other fail with
/// [`ResolutionError::Circular`] instead of blocking, whether the cycle stays
/// on one thread or spans several.
pub struct BasicContainer {
    bindings: DashMap<String, Arc<Binding>>,
    aliases: DashMap<String, String>,
    graph: Mutex<WaitGraph>,
}

impl BasicContainer {
    pub fn new() -> Self {
        BasicContainer {
            bindings: DashMap::new(),
            aliases: DashMap::new(),
            graph: Mutex::new(WaitGraph::default()),
        }
    }

    pub fn from_config(config: &ContainerConfig) -> Self {
        let container = Self::new();
        for (alias, key) in &config.aliases {
            container.alias(alias.clone(), key.clone());
        }
        container
    }

    /// Bind `key` to a factory that runs on every resolve.
    pub fn bind<S, F>(&self, key: impl Into<String>, factory: F)
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(&BasicContainer) -> anyhow::Result<Arc<S>> + Send + Sync + 'static,
    {
        self.register(key.into(), Scope::Factory, erase(factory));
    }

    /// Bind `key` to a factory that runs once, on first resolve.
    pub fn singleton<S, F>(&self, key: impl Into<String>, factory: F)
    where
        S: ?Sized + Send + Sync + 'static,
        F: Fn(&BasicContainer) -> anyhow::Result<Arc<S>> + Send + Sync + 'static,
    {
        self.register(key.into(), Scope::Singleton, erase(factory));
    }

    /// Bind `key` to an existing instance.
    pub fn instance<S>(&self, key: impl Into<String>, service: Arc<S>)
    where
        S: ?Sized + Send + Sync + 'static,
    {
        self.share(key.into(), Instance::new(service));
    }

    pub fn alias(&self, alias: impl Into<String>, key: impl Into<String>) {
        let (alias, key) = (alias.into(), key.into());
        debug!(alias = %alias, key = %key, "alias registered");
        self.aliases.insert(alias, key);
    }

    /// Drop the binding `key` resolves to. Aliases pointing at it are kept;
    /// instances already handed out stay alive.
    pub fn forget(&self, key: &str) -> bool {
        let canonical = match self.canonical(key) {
            Ok(canonical) => canonical,
            Err(_) => return false,
        };
        let removed = self.bindings.remove(&canonical).is_some();
        if removed {
            debug!(key = %key, canonical = %canonical, "binding forgotten");
        }
        removed
    }

    pub fn flush(&self) {
        debug!(bindings = self.bindings.len(), "container flushed");
        self.bindings.clear();
        self.aliases.clear();
    }

    pub fn scope(&self, key: &str) -> Option<Scope> {
        let key = self.canonical(key).ok()?;
        self.bindings.get(&key).map(|b| b.scope)
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.bindings.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        keys
    }

    fn register(&self, key: String, scope: Scope, factory: Factory) {
        debug!(key = %key, scope = ?scope, "binding registered");
        self.drop_alias(&key);
        let binding = Binding {
            scope,
            factory: Some(factory),
            cell: OnceCell::new(),
        };
        self.bindings.insert(key, Arc::new(binding));
    }

    fn share(&self, key: String, instance: Instance) {
        debug!(key = %key, scope = ?Scope::Shared, "binding registered");
        self.drop_alias(&key);
        let binding = Binding {
            scope: Scope::Shared,
            factory: None,
            cell: OnceCell::with_value(instance),
        };
        self.bindings.insert(key, Arc::new(binding));
    }

    /// A concrete binding under `key` takes over from any alias of that name.
    fn drop_alias(&self, key: &str) {
        if let Some((_, target)) = self.aliases.remove(key) {
            debug!(alias = %key, key = %target, "alias replaced by binding");
        }
    }

    fn graph(&self) -> MutexGuard<'_, WaitGraph> {
        // Poisoning is ignored: every critical section leaves the graph consistent.
        self.graph.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Initialise (or wait for) the singleton cell of `key`, failing instead of
    /// blocking when the wait would close a cycle between threads.
    fn shared_instance(
        &self,
        key: &str,
        binding: &Binding,
        factory: &Factory,
    ) -> Result<Instance, ResolutionError> {
        let me = thread::current().id();
        {
            let mut graph = self.graph();
            if graph.closes_cycle(me, key) {
                return Err(ResolutionError::Circular { key: key.to_string() });
            }
            graph.waiting.insert(me, key.to_string());
        }

        let result = binding
            .cell
            .get_or_try_init(|| {
                {
                    let mut graph = self.graph();
                    graph.waiting.remove(&me);
                    graph.owners.insert(key.to_string(), me);
                }
                let built = self.build(key, factory);
                self.graph().owners.remove(key);
                built
            })
            .cloned();

        self.graph().waiting.remove(&me);
        result
    }

    fn canonical(&self, key: &str) -> Result<String, ResolutionError> {
        let mut current = key.to_string();
        let mut seen = HashSet::new();
        while let Some(target) = self.aliases.get(&current).map(|t| t.value().clone()) {
            if !seen.insert(current.clone()) {
                return Err(ResolutionError::AliasCycle { key: key.to_string() });
            }
            current = target;
        }
        Ok(current)
    }

    fn build(&self, key: &str, factory: &Factory) -> Result<Instance, ResolutionError> {
        let _guard = BuildGuard::enter(self as *const Self as usize, key)?;
        factory(self).map_err(|source| {
            warn!(key = %key, error = %source, "construction failed");
            ResolutionError::Construction {
                key: key.to_string(),
                source,
            }
        })
    }
}

fn erase<S, F>(factory: F) -> Factory
where
    S: ?Sized + Send + Sync + 'static,
    F: Fn(&BasicContainer) -> anyhow::Result<Arc<S>> + Send + Sync + 'static,
{
    Arc::new(move |container: &BasicContainer| factory(container).map(Instance::new))
}

impl Container for BasicContainer {
    fn resolve_any(&self, key: &str) -> Result<Instance, ResolutionError> {
        let canonical = self.canonical(key)?;
        // Clone the binding out so the shard lock is released before any factory runs.
        let binding = self.bindings.get(&canonical).map(|b| Arc::clone(b.value()));
        let binding = binding.ok_or_else(|| ResolutionError::Unbound { key: key.to_string() })?;
        trace!(key = %key, canonical = %canonical, scope = ?binding.scope, "resolving");

        if let Some(instance) = binding.cell.get() {
            return Ok(instance.clone());
        }
        let factory = match &binding.factory {
            Some(factory) => factory,
            None => return Err(ResolutionError::Unbound { key: key.to_string() }),
        };
        match binding.scope {
            Scope::Factory => self.build(&canonical, factory),
            Scope::Singleton | Scope::Shared => {
                // Checked before entering the cell, which would otherwise block on itself.
                BuildGuard::enter(self as *const Self as usize, &canonical).map(drop)?;
                self.shared_instance(&canonical, &binding, factory)
            }
        }
    }

    fn has(&self, key: &str) -> bool {
        match self.canonical(key) {
            Ok(key) => self.bindings.contains_key(&key),
            Err(_) => false,
        }
    }

    fn instance_any(&self, key: &str, instance: Instance) {
        self.share(key.to_string(), instance);
    }
}

impl Default for BasicContainer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_container() {
        let container = BasicContainer::new();
        let test_value = Arc::new(String::from("test"));
        container.instance("greeting", Arc::clone(&test_value));

        let resolved = container.resolve::<String>("greeting").unwrap();
        assert_eq!(resolved.as_str(), "test");
        assert!(Arc::ptr_eq(&resolved, &test_value));
        assert_eq!(container.scope("greeting"), Some(Scope::Shared));
    }

    #[test]
    fn test_unbound() {
        let container = BasicContainer::new();
        let err = container.resolve_any("missing").unwrap_err();
        assert!(matches!(err, ResolutionError::Unbound { ref key } if key == "missing"));
        assert!(!container.has("missing"));
        assert!(container.keys().is_empty());
    }

    #[test]
    fn test_singleton_is_reused() {
        let container = BasicContainer::new();
        let built = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&built);
        container.singleton("counter", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(Arc::new(7u32))
        });

        let a = container.resolve::<u32>("counter").unwrap();
        let b = container.resolve::<u32>("counter").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(built.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_factory_builds_fresh() {
        let container = BasicContainer::new();
        container.bind("fresh", |_| Ok(Arc::new(String::from("x"))));

        let a = container.resolve::<String>("fresh").unwrap();
        let b = container.resolve::<String>("fresh").unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(container.scope("fresh"), Some(Scope::Factory));
    }

    #[test]
    fn test_failed_construction_is_not_cached() {
        let container = BasicContainer::new();
        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&attempts);
        container.singleton("flaky", move |_| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                anyhow::bail!("not ready");
            }
            Ok(Arc::new(1i64))
        });

        let err = container.resolve::<i64>("flaky").unwrap_err();
        match err {
            ResolutionError::Construction { key, source } => {
                assert_eq!(key, "flaky");
                assert_eq!(source.to_string(), "not ready");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(*container.resolve::<i64>("flaky").unwrap(), 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_factory_resolves_dependencies() {
        let container = BasicContainer::new();
        container.instance("name", Arc::new(String::from("world")));
        container.singleton("greeting", |c| {
            let name = c.resolve::<String>("name")?;
            Ok(Arc::new(format!("hello {name}")))
        });

        assert_eq!(container.resolve::<String>("greeting").unwrap().as_str(), "hello world");
    }

    #[test]
    fn test_missing_dependency_fails_construction() {
        let container = BasicContainer::new();
        container.singleton("greeting", |c| {
            let name = c.resolve::<String>("name")?;
            Ok(Arc::new(format!("hello {name}")))
        });

        let err = container.resolve::<String>("greeting").unwrap_err();
        assert!(matches!(err, ResolutionError::Construction { .. }));
    }

    #[test]
    fn test_circular_singleton() {
        let container = BasicContainer::new();
        container.singleton("a", |c| Ok(c.resolve::<u8>("b")?));
        container.singleton("b", |c| Ok(c.resolve::<u8>("a")?));

        let err = container.resolve::<u8>("a").unwrap_err();
        assert!(matches!(err, ResolutionError::Construction { .. }));
        let message = err.to_string();
        assert!(message.contains("circular dependency"), "{message}");
    }

    #[test]
    fn test_aliases() {
        let container = BasicContainer::new();
        container.instance("understand.field-provider", Arc::new(5u16));
        container.alias("fields", "understand.field-provider");
        container.alias("f", "fields");

        assert!(container.has("f"));
        assert_eq!(*container.resolve::<u16>("f").unwrap(), 5);
    }

    #[test]
    fn test_alias_cycle() {
        let container = BasicContainer::new();
        container.alias("a", "b");
        container.alias("b", "a");

        let err = container.resolve_any("a").unwrap_err();
        assert!(matches!(err, ResolutionError::AliasCycle { .. }));
        assert!(!container.has("a"));
    }

    #[test]
    fn test_type_mismatch() {
        let container = BasicContainer::new();
        container.instance("n", Arc::new(1u8));
        let err = container.resolve::<String>("n").unwrap_err();
        assert!(matches!(err, ResolutionError::TypeMismatch { .. }));
    }

    #[test]
    fn test_rebind_and_forget() {
        let container = BasicContainer::new();
        container.instance("v", Arc::new(1u8));
        let old = container.resolve::<u8>("v").unwrap();
        container.instance("v", Arc::new(2u8));

        assert_eq!(*old, 1);
        assert_eq!(*container.resolve::<u8>("v").unwrap(), 2);
        assert!(container.forget("v"));
        assert!(!container.forget("v"));
        assert!(!container.has("v"));
    }

    #[test]
    fn test_forget_through_alias() {
        let container = BasicContainer::new();
        container.instance("k", Arc::new(1u8));
        container.alias("a", "k");

        assert!(container.has("a"));
        assert!(container.forget("a"));
        assert!(!container.has("a"));
        assert!(!container.has("k"));
        assert!(!container.forget("a"));
    }

    #[test]
    fn test_binding_replaces_alias() {
        let container = BasicContainer::new();
        container.instance("real", Arc::new(1u8));
        container.alias("svc", "real");
        assert_eq!(*container.resolve::<u8>("svc").unwrap(), 1);

        container.singleton("svc", |_| Ok(Arc::new(2u8)));
        assert_eq!(*container.resolve::<u8>("svc").unwrap(), 2);
        assert_eq!(*container.resolve::<u8>("real").unwrap(), 1);
        assert_eq!(container.scope("svc"), Some(Scope::Singleton));
    }

    #[test]
    fn test_circular_singletons_across_threads() {
        use std::sync::atomic::AtomicBool;
        use std::sync::{mpsc, Barrier};
        use std::time::Duration;

        let container = Arc::new(BasicContainer::new());
        let barrier = Arc::new(Barrier::new(2));
        for (key, other) in [("a", "b"), ("b", "a")] {
            let barrier = Arc::clone(&barrier);
            let first = AtomicBool::new(true);
            container.singleton(key, move |c| {
                // Make sure both threads own their cell before crossing over.
                if first.swap(false, Ordering::SeqCst) {
                    barrier.wait();
                }
                Ok(c.resolve::<u8>(other)?)
            });
        }

        let (tx, rx) = mpsc::channel();
        for key in ["a", "b"] {
            let container = Arc::clone(&container);
            let tx = tx.clone();
            std::thread::spawn(move || {
                let result = container.resolve::<u8>(key).map_err(|e| e.to_string());
                let _ = tx.send(result);
            });
        }

        for _ in 0..2 {
            let result = rx.recv_timeout(Duration::from_secs(10)).expect("resolution deadlocked");
            let message = result.unwrap_err();
            assert!(message.contains("circular dependency"), "{message}");
        }
        assert_eq!(container.scope("a"), Some(Scope::Singleton));
        assert!(container.graph().owners.is_empty());
        assert!(container.graph().waiting.is_empty());
    }

    #[test]
    fn test_flush() {
        let container = BasicContainer::new();
        container.instance("a", Arc::new(1u8));
        container.instance("b", Arc::new(2u8));
        container.alias("c", "a");
        assert_eq!(container.keys(), vec!["a".to_string(), "b".to_string()]);

        container.flush();
        assert!(container.keys().is_empty());
        assert!(!container.has("c"));
    }

    #[test]
    fn test_from_config() {
        let mut config = ContainerConfig::default();
        config.aliases.insert("fp".to_string(), "understand.field-provider".to_string());
        let container = BasicContainer::from_config(&config);
        container.instance("understand.field-provider", Arc::new(3u8));

        assert_eq!(*container.resolve::<u8>("fp").unwrap(), 3);
    }
}
