//! Hierarchical namespaces for declared resources.
//!
//! A root scope exists per `(app, stage)`; child scopes group related
//! resources such as a test run or a sub-stack. A scope owns its children
//! and holds only a weak reference to its parent.

use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, Weak};

use crate::error::{Error, Result};
use crate::resource::Teardown;
use crate::sync::lock;
use crate::types::Phase;

/// Separator used by [`Scope::create_physical_name`].
pub const NAME_DELIMITER: &str = "-";

/// One declared resource inside a scope.
#[derive(Clone)]
pub struct ResourceInstance {
    /// Unique key within the scope
    pub identity: String,
    /// Provider-defined type, e.g. `docker::Container`
    pub type_tag: String,
    /// Phase of the last apply that reached the handler
    pub phase: Option<Phase>,
    /// Last known output, redacted
    pub output: Option<Value>,
    /// Props declared this run, redacted
    pub inputs: Value,
    /// Identities in the same scope this resource waited on
    pub depends_on: Vec<String>,
    /// An apply is running for this identity
    pub in_flight: bool,
    pub(crate) teardown: Option<Arc<dyn Teardown>>,
}

impl ResourceInstance {
    pub(crate) fn declared(
        identity: &str,
        type_tag: &str,
        inputs: Value,
        teardown: Arc<dyn Teardown>,
    ) -> Self {
        Self {
            identity: identity.to_string(),
            type_tag: type_tag.to_string(),
            phase: None,
            output: None,
            inputs,
            depends_on: Vec::new(),
            in_flight: true,
            teardown: Some(teardown),
        }
    }
}

impl fmt::Debug for ResourceInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceInstance")
            .field("identity", &self.identity)
            .field("type_tag", &self.type_tag)
            .field("phase", &self.phase)
            .field("output", &self.output)
            .field("inputs", &self.inputs)
            .field("depends_on", &self.depends_on)
            .field("in_flight", &self.in_flight)
            .finish_non_exhaustive()
    }
}

struct ScopeInner {
    name: String,
    app: String,
    stage: String,
    path: Vec<String>,
    parent: Weak<ScopeInner>,
    children: Mutex<Vec<Scope>>,
    resources: Mutex<Vec<ResourceInstance>>,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

/// A named node in the scope tree.
///
/// Cloning is cheap and yields a handle to the same node.
#[derive(Clone)]
pub struct Scope {
    inner: Arc<ScopeInner>,
}

impl Scope {
    /// Create the root scope for an application stage.
    pub fn root(app: &str, stage: &str) -> Self {
        Self {
            inner: Arc::new(ScopeInner {
                name: app.to_string(),
                app: app.to_string(),
                stage: stage.to_string(),
                path: vec![app.to_string(), stage.to_string()],
                parent: Weak::new(),
                children: Mutex::new(Vec::new()),
                resources: Mutex::new(Vec::new()),
                locks: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Get or create a nested scope.
    pub fn child(&self, name: &str) -> Scope {
        let mut children = lock(&self.inner.children);
        if let Some(existing) = children.iter().find(|c| c.name() == name) {
            return existing.clone();
        }

        let mut path = self.inner.path.clone();
        path.push(name.to_string());
        let child = Scope {
            inner: Arc::new(ScopeInner {
                name: name.to_string(),
                app: self.inner.app.clone(),
                stage: self.inner.stage.clone(),
                path,
                parent: Arc::downgrade(&self.inner),
                children: Mutex::new(Vec::new()),
                resources: Mutex::new(Vec::new()),
                locks: Mutex::new(HashMap::new()),
            }),
        };
        log::debug!("Created scope {}", child.key());
        children.push(child.clone());
        child
    }

    /// Scope name (the app name for a root scope)
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Application this scope belongs to
    pub fn app(&self) -> &str {
        &self.inner.app
    }

    /// Stage this scope belongs to
    pub fn stage(&self) -> &str {
        &self.inner.stage
    }

    /// Name chain from the root: `[app, stage, child, ...]`
    pub fn path(&self) -> &[String] {
        &self.inner.path
    }

    /// Store key for this scope, e.g. `app/dev/test-run`
    pub fn key(&self) -> String {
        self.inner.path.join("/")
    }

    /// Parent scope, if this is not a root and the parent is still alive
    pub fn parent(&self) -> Option<Scope> {
        self.inner.parent.upgrade().map(|inner| Scope { inner })
    }

    /// Child scopes in creation order
    pub fn children(&self) -> Vec<Scope> {
        lock(&self.inner.children).clone()
    }

    /// Deterministic physical name for a resource in this scope.
    ///
    /// `app-stage[-child...]-identity`; stable across runs so a repeated
    /// declaration targets the same remote object.
    pub fn create_physical_name(&self, identity: &str) -> String {
        let mut parts = self.inner.path.clone();
        parts.push(identity.to_string());
        parts.join(NAME_DELIMITER)
    }

    /// Physical name with a custom delimiter and a length limit.
    ///
    /// Names longer than `max_len` bytes keep their prefix and end with an
    /// 8-character hash of the full name, so truncation stays unique. The
    /// prefix is cut on a character boundary.
    pub fn create_physical_name_with(&self, identity: &str, delimiter: &str, max_len: usize) -> String {
        let mut parts = self.inner.path.clone();
        parts.push(identity.to_string());
        let full = parts.join(delimiter);
        if full.len() <= max_len {
            return full;
        }

        let hash = blake3::hash(full.as_bytes()).to_hex();
        let suffix = &hash.as_str()[..8];
        let keep = max_len.saturating_sub(suffix.len() + delimiter.len());
        let mut cut = keep.min(full.len());
        while !full.is_char_boundary(cut) {
            cut -= 1;
        }
        let prefix = &full[..cut];
        if prefix.is_empty() {
            suffix[..suffix.len().min(max_len)].to_string()
        } else {
            format!("{prefix}{delimiter}{suffix}")
        }
    }

    /// Declared identities in declaration order
    pub fn identities(&self) -> Vec<String> {
        lock(&self.inner.resources)
            .iter()
            .map(|r| r.identity.clone())
            .collect()
    }

    /// Snapshot of one declared resource
    pub fn instance(&self, identity: &str) -> Option<ResourceInstance> {
        lock(&self.inner.resources)
            .iter()
            .find(|r| r.identity == identity)
            .cloned()
    }

    /// Snapshot of every declared resource in declaration order
    pub fn instances(&self) -> Vec<ResourceInstance> {
        lock(&self.inner.resources).clone()
    }

    /// No resources declared here and no child scopes
    pub fn is_empty(&self) -> bool {
        lock(&self.inner.resources).is_empty() && lock(&self.inner.children).is_empty()
    }

    /// Declare a resource, or refresh an existing declaration in place.
    ///
    /// Re-declaring keeps the original declaration order. A different
    /// type tag under the same identity is rejected.
    pub(crate) fn register(&self, instance: ResourceInstance) -> Result<()> {
        let mut resources = lock(&self.inner.resources);
        match resources.iter_mut().find(|r| r.identity == instance.identity) {
            Some(existing) if existing.type_tag != instance.type_tag => {
                Err(Error::DuplicateIdentity {
                    scope: self.key(),
                    identity: instance.identity,
                    existing: existing.type_tag.clone(),
                })
            }
            Some(existing) => {
                existing.inputs = instance.inputs;
                existing.teardown = instance.teardown;
                existing.in_flight = true;
                Ok(())
            }
            None => {
                resources.push(instance);
                Ok(())
            }
        }
    }

    /// Mutate a declared resource, if present.
    pub(crate) fn update_instance(&self, identity: &str, f: impl FnOnce(&mut ResourceInstance)) {
        if let Some(instance) = lock(&self.inner.resources)
            .iter_mut()
            .find(|r| r.identity == identity)
        {
            f(instance);
        }
    }

    /// Forget a declared resource.
    ///
    /// The identity lock stays: other tasks may still be queued on it.
    pub(crate) fn remove(&self, identity: &str) {
        lock(&self.inner.resources).retain(|r| r.identity != identity);
    }

    /// Drop every resource and child scope.
    ///
    /// Only identity locks nobody else holds are released.
    pub(crate) fn clear(&self) {
        lock(&self.inner.resources).clear();
        lock(&self.inner.children).clear();
        lock(&self.inner.locks).retain(|_, l| Arc::strong_count(l) > 1);
    }

    /// Forget a child scope once it has been torn down.
    pub(crate) fn remove_child(&self, name: &str) {
        lock(&self.inner.children).retain(|c| c.name() != name);
    }

    /// Lock serializing applies for one identity.
    pub(crate) fn identity_lock(&self, identity: &str) -> Arc<tokio::sync::Mutex<()>> {
        lock(&self.inner.locks)
            .entry(identity.to_string())
            .or_default()
            .clone()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("key", &self.key())
            .field("resources", &self.identities())
            .finish()
    }
}

impl PartialEq for Scope {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_physical_name_is_stable() {
        let scope = Scope::root("shop", "dev");
        assert_eq!(scope.create_physical_name("db"), "shop-dev-db");
        assert_eq!(
            scope.create_physical_name("db"),
            Scope::root("shop", "dev").create_physical_name("db")
        );
    }

    #[test]
    fn test_child_scope_naming_and_reuse() {
        let root = Scope::root("shop", "dev");
        let run = root.child("test-run");
        assert_eq!(run.key(), "shop/dev/test-run");
        assert_eq!(run.create_physical_name("cache"), "shop-dev-test-run-cache");
        assert_eq!(run.parent(), Some(root.clone()));
        assert_eq!(root.child("test-run"), run);
        assert_eq!(root.children().len(), 1);
        assert!(root.parent().is_none());
    }

    #[test]
    fn test_physical_name_truncation() {
        let scope = Scope::root("a-very-long-application-name", "production");
        let name = scope.create_physical_name_with("primary-database", "_", 32);
        assert_eq!(name.len(), 32);
        assert!(name.starts_with("a-very-long-application_"));
        assert_eq!(name, scope.create_physical_name_with("primary-database", "_", 32));
        assert_ne!(name, scope.create_physical_name_with("replica-database", "_", 32));
        assert_eq!(scope.create_physical_name_with("db", "_", 255), "a-very-long-application-name_production_db");
    }

    #[test]
    fn test_register_preserves_order_and_rejects_type_change() {
        use crate::resource::tests::noop_teardown;

        let scope = Scope::root("shop", "dev");
        for id in ["network", "db", "api"] {
            scope
                .register(ResourceInstance::declared(id, "test::Thing", Value::Null, noop_teardown()))
                .unwrap();
        }
        scope
            .register(ResourceInstance::declared("network", "test::Thing", Value::Bool(true), noop_teardown()))
            .unwrap();
        assert_eq!(scope.identities(), vec!["network", "db", "api"]);
        assert_eq!(scope.instance("network").unwrap().inputs, Value::Bool(true));

        let err = scope
            .register(ResourceInstance::declared("db", "other::Thing", Value::Null, noop_teardown()))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateIdentity { .. }));

        scope.remove("db");
        assert_eq!(scope.identities(), vec!["network", "api"]);
        scope.clear();
        assert!(scope.is_empty());
    }

    #[test]
    fn test_truncation_counts_bytes_on_char_boundaries() {
        let scope = Scope::root("caf\u{e9}-\u{fc}bersicht-\u{65e5}\u{672c}\u{8a9e}", "prod");
        for max_len in 10..40 {
            let name = scope.create_physical_name_with("datenbank", "-", max_len);
            assert!(name.len() <= max_len, "{name} is longer than {max_len} bytes");
        }
        let name = scope.create_physical_name_with("datenbank", "-", 16);
        assert!(name.starts_with("caf\u{e9}-"));
    }

    #[tokio::test]
    async fn test_removed_identity_keeps_its_lock() {
        use crate::resource::tests::noop_teardown;

        let scope = Scope::root("shop", "dev");
        scope
            .register(ResourceInstance::declared("db", "test::Thing", Value::Null, noop_teardown()))
            .unwrap();

        let held = scope.identity_lock("db");
        let guard = held.lock().await;
        scope.remove("db");
        scope.clear();

        let later = scope.identity_lock("db");
        assert!(Arc::ptr_eq(&held, &later));
        assert!(later.try_lock().is_err());
        drop(guard);
        assert!(later.try_lock().is_ok());
    }
}
