//! Execution engine - the create/update/delete state machine
//!
//! `apply` decides the phase from the stored record, waits on declared
//! dependencies, invokes the handler and persists the result. A failed
//! handler never mutates the stored record.

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::{Arc, RwLock};

use crate::context::Context;
use crate::error::{Error, Result};
use crate::pending::Pending;
use crate::resource::{Bound, Registry, ResourceType, Teardown, run_delete};
use crate::scheduler;
use crate::scope::{ResourceInstance, Scope};
use crate::secret::{SecretDigest, digest, redacted_json};
use crate::state::{MemoryStateStore, StateRecord, StateStore};
use crate::sync::{read, write};
use crate::types::{ApplyOptions, Change, Outcome, Output, Phase};

struct EngineInner {
    store: Arc<dyn StateStore>,
    registry: RwLock<Registry>,
}

/// The reconciliation engine.
///
/// Cloning is cheap; clones share the store and the type registry.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

/// What tearing down one identity removed.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct Removed {
    pub destroyed: bool,
    pub replaced: usize,
}

impl Engine {
    /// Create an engine backed by `store`
    pub fn new(store: Arc<dyn StateStore>) -> Self {
        Self::builder().store(store).build()
    }

    /// Create an engine backed by a fresh [`MemoryStateStore`]
    pub fn in_memory() -> Self {
        Self::builder().build()
    }

    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// The state store this engine persists to
    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.inner.store
    }

    /// Register a resource type so records of its tag can be torn down
    /// without a live declaration.
    ///
    /// `apply` registers the types it sees automatically.
    pub fn register<R: ResourceType>(&self, resource: Arc<R>) {
        write(&self.inner.registry).register(resource);
    }

    /// Registered type tags in sorted order
    pub fn registered_types(&self) -> Vec<&'static str> {
        read(&self.inner.registry).tags()
    }

    pub(crate) fn teardown_for(&self, tag: &str) -> Result<Arc<dyn Teardown>> {
        read(&self.inner.registry).get(tag)
    }

    /// Converge one resource to its declared props.
    ///
    /// The phase is `create` when no record exists for `identity` in
    /// `scope`, `update` otherwise. An update whose redacted props equal the
    /// recorded inputs, and whose secrets hash as recorded, skips the
    /// handler unless the type asks for `always_update`.
    pub async fn apply<R: ResourceType>(
        &self,
        scope: &Scope,
        identity: &str,
        resource: &Arc<R>,
        props: R::Props,
        options: ApplyOptions,
    ) -> Result<Output<R::Output>> {
        self.apply_shared(scope, identity, resource, Arc::new(props), options)
            .await
    }

    /// Spawn an apply on the runtime and return a handle to its output.
    ///
    /// The resource joins the scope immediately, so declaration order is
    /// the order of `declare` calls. The handle can be passed to other
    /// resources' `depends_on`; it remembers which resource it belongs to
    /// so teardown can order by it.
    pub fn declare<R: ResourceType>(
        &self,
        scope: &Scope,
        identity: &str,
        resource: &Arc<R>,
        props: R::Props,
        options: ApplyOptions,
    ) -> Pending<Output<R::Output>> {
        let props = Arc::new(props);
        if let Err(e) = self.declare_instance(scope, identity, resource, &props) {
            return Pending::failed(e).with_target(&scope.key(), identity);
        }

        let engine = self.clone();
        let task_scope = scope.clone();
        let task_identity = identity.to_string();
        let resource = Arc::clone(resource);

        Pending::spawn(async move {
            engine
                .apply_shared(&task_scope, &task_identity, &resource, props, options)
                .await
        })
        .with_target(&scope.key(), identity)
    }

    /// Add or refresh the scope entry for a declaration.
    ///
    /// Returns the redacted inputs.
    fn declare_instance<R: ResourceType>(
        &self,
        scope: &Scope,
        identity: &str,
        resource: &Arc<R>,
        props: &Arc<R::Props>,
    ) -> Result<Value> {
        let inputs = redacted_json(props.as_ref())?;
        let teardown = Arc::new(Bound::declared(Arc::clone(resource), Arc::clone(props)));
        scope.register(ResourceInstance::declared(
            identity,
            resource.type_tag(),
            inputs.clone(),
            teardown,
        ))?;
        self.register(Arc::clone(resource));
        Ok(inputs)
    }

    async fn apply_shared<R: ResourceType>(
        &self,
        scope: &Scope,
        identity: &str,
        resource: &Arc<R>,
        props: Arc<R::Props>,
        options: ApplyOptions,
    ) -> Result<Output<R::Output>> {
        let ApplyOptions { adopt, depends_on } = options;
        let inputs = self.declare_instance(scope, identity, resource, &props)?;
        let edges = scheduler::local_edges(&scope.key(), &depends_on);
        let declared_edges = edges.clone();

        let request = Request {
            scope,
            identity,
            resource: resource.as_ref(),
            props: props.as_ref(),
            inputs,
            edges,
            adopt,
        };
        let result = self.run(request, depends_on).await;

        scope.update_instance(identity, |instance| {
            instance.in_flight = false;
            if let Ok((phase, output)) = &result {
                instance.phase = Some(*phase);
                instance.output = redacted_json(&output.value).ok();
                instance.depends_on = declared_edges;
            }
        });

        match result {
            Ok((_, output)) => Ok(output),
            Err(e) => {
                log::warn!("{}/{identity}: apply failed: {e}", scope.key());
                Err(e)
            }
        }
    }

    /// Run the delete phase for one identity and drop its record.
    ///
    /// Objects queued by an earlier replace are deleted first. An identity
    /// with no record is simply forgotten.
    pub async fn destroy_instance(&self, scope: &Scope, identity: &str) -> Result<()> {
        self.remove_identity(scope, identity).await.map(|_| ())
    }

    pub(crate) async fn remove_identity(&self, scope: &Scope, identity: &str) -> Result<Removed> {
        let lock = scope.identity_lock(identity);
        let _guard = lock.lock().await;
        let key = scope.key();

        let Some(mut record) = self.inner.store.load(scope, identity).await? else {
            log::debug!("{key}/{identity}: no record, nothing to delete");
            scope.remove(identity);
            return Ok(Removed::default());
        };

        let teardown = match scope.instance(identity).and_then(|i| i.teardown) {
            Some(t) if t.type_tag() == record.type_tag => t,
            _ => self.teardown_for(&record.type_tag)?,
        };

        let replaced = self.clean_replaced(scope, teardown.as_ref(), &mut record).await?;

        log::info!("{key}/{identity}: deleting");
        teardown
            .delete(scope, identity, &record.last_output, &record.last_inputs)
            .await?;
        self.inner.store.delete(scope, identity).await?;
        scope.remove(identity);

        Ok(Removed {
            destroyed: true,
            replaced,
        })
    }

    /// Delete objects queued by replaces, saving progress after each one.
    pub(crate) async fn clean_replaced(
        &self,
        scope: &Scope,
        teardown: &dyn Teardown,
        record: &mut StateRecord,
    ) -> Result<usize> {
        let mut cleaned = 0;
        while let Some(old) = record.replaced.first().cloned() {
            log::info!("{}/{}: deleting replaced object", scope.key(), record.identity);
            teardown
                .delete(scope, &record.identity, &old, &record.last_inputs)
                .await?;
            record.replaced.remove(0);
            self.inner.store.save(scope, &record.identity, record).await?;
            cleaned += 1;
        }
        Ok(cleaned)
    }

    async fn run<R: ResourceType>(
        &self,
        request: Request<'_, R>,
        depends_on: Vec<crate::pending::Dependency>,
    ) -> Result<(Phase, Output<R::Output>)> {
        scheduler::await_dependencies(request.identity, depends_on).await?;

        let lock = request.scope.identity_lock(request.identity);
        let _guard = lock.lock().await;
        log::trace!("{}: inputs {}", request.key(), request.inputs);

        match self.inner.store.load(request.scope, request.identity).await? {
            None => self.create(&request).await.map(|o| (Phase::Create, o)),
            Some(record) => self.update(&request, record).await.map(|o| (Phase::Update, o)),
        }
    }

    async fn create<R: ResourceType>(&self, request: &Request<'_, R>) -> Result<Output<R::Output>> {
        log::info!("{}: creating", request.key());
        let secrets = digest(request.props, None)?;
        let value = request.invoke_create().await?;
        let now = Utc::now();
        self.persist(request, &value, now, now, Vec::new(), secrets).await?;
        Ok(Output {
            value,
            created_at: now,
            updated_at: now,
            change: Change::Created,
        })
    }

    async fn update<R: ResourceType>(
        &self,
        request: &Request<'_, R>,
        record: StateRecord,
    ) -> Result<Output<R::Output>> {
        let prior: R::Output = serde_json::from_value(record.last_output.clone())?;
        let secrets = digest(request.props, record.secrets.as_ref().map(|d| d.salt.as_str()))?;

        if record.last_inputs == request.inputs
            && record.secrets == secrets
            && record.replaced.is_empty()
            && !request.resource.always_update()
        {
            log::debug!("{}: inputs unchanged, skipping handler", request.key());
            if record.depends_on != request.edges {
                let mut record = record.clone();
                record.depends_on = request.edges.clone();
                self.inner.store.save(request.scope, request.identity, &record).await?;
            }
            return Ok(Output {
                value: prior,
                created_at: record.created_at,
                updated_at: record.updated_at,
                change: Change::Unchanged,
            });
        }

        log::info!("{}: updating", request.key());
        let ctx = Context::new(Phase::Update, request.identity, request.scope)
            .with_prior(Some(&prior), Some(&record.last_inputs))
            .with_prior_secrets(record.secrets.as_ref())
            .with_adopt(request.adopt);
        let outcome = request
            .resource
            .handle(&ctx, request.identity, request.props)
            .await?;

        match outcome {
            Outcome::Applied(value) => {
                let now = Utc::now();
                self.persist(request, &value, record.created_at, now, record.replaced, secrets)
                    .await?;
                Ok(Output {
                    value,
                    created_at: record.created_at,
                    updated_at: now,
                    change: Change::Updated,
                })
            }
            Outcome::Replace { force: false } => {
                log::info!("{}: replacing, old object is deleted on finalize", request.key());
                let value = request.invoke_create().await?;
                let mut replaced = record.replaced;
                replaced.push(record.last_output);
                let now = Utc::now();
                self.persist(request, &value, now, now, replaced, secrets).await?;
                Ok(Output {
                    value,
                    created_at: now,
                    updated_at: now,
                    change: Change::Replaced,
                })
            }
            Outcome::Replace { force: true } => {
                log::info!("{}: replacing, deleting old object first", request.key());
                self.force_teardown(request, &prior, record).await?;
                let value = request.invoke_create().await?;
                let now = Utc::now();
                self.persist(request, &value, now, now, Vec::new(), secrets).await?;
                Ok(Output {
                    value,
                    created_at: now,
                    updated_at: now,
                    change: Change::Replaced,
                })
            }
            Outcome::Destroyed => Err(Error::UnexpectedOutcome {
                identity: request.identity.to_string(),
                phase: Phase::Update,
                outcome: "destroyed",
            }),
        }
    }

    /// Delete every object a record points at, then the record itself.
    ///
    /// The record goes once the remote objects are gone, so a failed
    /// create afterwards leaves no record behind.
    async fn force_teardown<R: ResourceType>(
        &self,
        request: &Request<'_, R>,
        prior: &R::Output,
        mut record: StateRecord,
    ) -> Result<()> {
        while let Some(old) = record.replaced.first().cloned() {
            let old: R::Output = serde_json::from_value(old)?;
            run_delete(
                request.resource,
                request.scope,
                request.identity,
                request.props,
                &old,
                Some(&record.last_inputs),
            )
            .await?;
            record.replaced.remove(0);
            self.inner.store.save(request.scope, request.identity, &record).await?;
        }
        run_delete(
            request.resource,
            request.scope,
            request.identity,
            request.props,
            prior,
            Some(&record.last_inputs),
        )
        .await?;
        self.inner.store.delete(request.scope, request.identity).await
    }

    async fn persist<R: ResourceType>(
        &self,
        request: &Request<'_, R>,
        value: &R::Output,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        replaced: Vec<Value>,
        secrets: Option<SecretDigest>,
    ) -> Result<()> {
        let record = StateRecord {
            identity: request.identity.to_string(),
            type_tag: request.resource.type_tag().to_string(),
            last_inputs: request.inputs.clone(),
            last_output: redacted_json(value)?,
            depends_on: request.edges.clone(),
            replaced,
            secrets,
            created_at,
            updated_at,
        };
        self.inner.store.save(request.scope, request.identity, &record).await
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("registry", &*read(&self.inner.registry))
            .finish_non_exhaustive()
    }
}

/// One apply, after its props have been redacted.
struct Request<'a, R: ResourceType> {
    scope: &'a Scope,
    identity: &'a str,
    resource: &'a R,
    props: &'a R::Props,
    inputs: Value,
    edges: Vec<String>,
    adopt: bool,
}

impl<R: ResourceType> Request<'_, R> {
    fn key(&self) -> String {
        format!("{}/{}", self.scope.key(), self.identity)
    }

    async fn invoke_create(&self) -> Result<R::Output> {
        let ctx = Context::new(Phase::Create, self.identity, self.scope).with_adopt(self.adopt);
        match self.resource.handle(&ctx, self.identity, self.props).await? {
            Outcome::Applied(value) => Ok(value),
            Outcome::Replace { .. } => Err(Error::ReplaceDuringCreate {
                identity: self.identity.to_string(),
            }),
            other => Err(Error::UnexpectedOutcome {
                identity: self.identity.to_string(),
                phase: Phase::Create,
                outcome: other.name(),
            }),
        }
    }
}

/// Builder for [`Engine`]
#[derive(Default)]
pub struct EngineBuilder {
    store: Option<Arc<dyn StateStore>>,
    registry: Registry,
}

impl EngineBuilder {
    /// Persist records to `store` instead of memory
    pub fn store(mut self, store: Arc<dyn StateStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Register a resource type up front
    pub fn register<R: ResourceType>(mut self, resource: Arc<R>) -> Self {
        self.registry.register(resource);
        self
    }

    pub fn build(self) -> Engine {
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(MemoryStateStore::new()));
        Engine {
            inner: Arc::new(EngineInner {
                store,
                registry: RwLock::new(self.registry),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::{Secret, wrap};
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    struct BucketProps {
        name: Option<String>,
        #[serde(default)]
        tier: String,
        token: Option<Secret>,
    }

    impl BucketProps {
        fn named(name: Option<&str>) -> Self {
            Self {
                name: name.map(str::to_string),
                tier: "standard".to_string(),
                token: None,
            }
        }
    }

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct BucketOutput {
        name: String,
        tier: String,
    }

    /// In-memory bucket provider; replaces on name change.
    #[derive(Default)]
    struct Buckets {
        live: Mutex<Vec<String>>,
        calls: AtomicUsize,
        seen_tokens: Mutex<Vec<String>>,
        fail_with: Mutex<Option<String>>,
        force: bool,
    }

    impl Buckets {
        fn live(&self) -> Vec<String> {
            self.live.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ResourceType for Buckets {
        type Props = BucketProps;
        type Output = BucketOutput;

        fn type_tag(&self) -> &'static str {
            "test::Bucket"
        }

        async fn handle(
            &self,
            ctx: &Context<'_, BucketOutput>,
            id: &str,
            props: &BucketProps,
        ) -> anyhow::Result<Outcome<BucketOutput>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(message) = self.fail_with.lock().unwrap().clone() {
                anyhow::bail!(message);
            }
            if let Some(token) = &props.token {
                self.seen_tokens.lock().unwrap().push(crate::secret::unwrap(token).to_string());
            }

            let name = props.name.clone().unwrap_or_else(|| ctx.scope().create_physical_name(id));
            match ctx.phase() {
                Phase::Delete => {
                    if let Some(prior) = ctx.output() {
                        self.live.lock().unwrap().retain(|n| n != &prior.name);
                    }
                    return Ok(ctx.destroy());
                }
                Phase::Update if ctx.output().is_some_and(|o| o.name != name) => {
                    return Ok(ctx.replace(self.force)?);
                }
                _ => {}
            }

            let mut live = self.live.lock().unwrap();
            if !live.contains(&name) {
                live.push(name.clone());
            }
            Ok(Outcome::Applied(BucketOutput {
                name,
                tier: props.tier.clone(),
            }))
        }
    }

    fn setup() -> (Engine, Scope, Arc<Buckets>) {
        (Engine::in_memory(), Scope::root("shop", "dev"), Arc::new(Buckets::default()))
    }

    #[tokio::test]
    async fn test_create_then_unchanged() {
        let (engine, scope, buckets) = setup();

        let first = engine
            .apply(&scope, "assets", &buckets, BucketProps::named(None), ApplyOptions::new())
            .await
            .unwrap();
        assert_eq!(first.change, Change::Created);
        assert_eq!(first.name, "shop-dev-assets");

        let second = engine
            .apply(&scope, "assets", &buckets, BucketProps::named(None), ApplyOptions::new())
            .await
            .unwrap();
        assert_eq!(second.change, Change::Unchanged);
        assert_eq!(second.value, first.value);
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(buckets.calls.load(Ordering::SeqCst), 1);

        let instance = scope.instance("assets").unwrap();
        assert_eq!(instance.phase, Some(Phase::Update));
        assert!(!instance.in_flight);
    }

    #[tokio::test]
    async fn test_changed_inputs_update_in_place() {
        let (engine, scope, buckets) = setup();
        let created = engine
            .apply(&scope, "assets", &buckets, BucketProps::named(None), ApplyOptions::new())
            .await
            .unwrap();

        let mut props = BucketProps::named(None);
        props.tier = "archive".to_string();
        let updated = engine
            .apply(&scope, "assets", &buckets, props, ApplyOptions::new())
            .await
            .unwrap();
        assert_eq!(updated.change, Change::Updated);
        assert_eq!(updated.tier, "archive");
        assert_eq!(updated.created_at, created.created_at);

        let record = engine.store().load(&scope, "assets").await.unwrap().unwrap();
        assert_eq!(record.last_inputs["tier"], "archive");
    }

    #[tokio::test]
    async fn test_failed_handler_leaves_record_untouched() {
        let (engine, scope, buckets) = setup();
        engine
            .apply(&scope, "assets", &buckets, BucketProps::named(None), ApplyOptions::new())
            .await
            .unwrap();
        let before = engine.store().load(&scope, "assets").await.unwrap();

        *buckets.fail_with.lock().unwrap() = Some("quota exceeded".to_string());
        let mut props = BucketProps::named(None);
        props.tier = "archive".to_string();
        let err = engine
            .apply(&scope, "assets", &buckets, props, ApplyOptions::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "quota exceeded");
        assert_eq!(engine.store().load(&scope, "assets").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_failed_create_persists_nothing() {
        let (engine, scope, buckets) = setup();
        *buckets.fail_with.lock().unwrap() = Some("denied".to_string());
        assert!(engine
            .apply(&scope, "assets", &buckets, BucketProps::named(None), ApplyOptions::new())
            .await
            .is_err());
        assert!(engine.store().load(&scope, "assets").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_replace_defers_old_delete_to_finalize() {
        let (engine, scope, buckets) = setup();
        engine
            .apply(&scope, "assets", &buckets, BucketProps::named(Some("old")), ApplyOptions::new())
            .await
            .unwrap();
        let replaced = engine
            .apply(&scope, "assets", &buckets, BucketProps::named(Some("new")), ApplyOptions::new())
            .await
            .unwrap();
        assert_eq!(replaced.change, Change::Replaced);
        assert_eq!(replaced.name, "new");
        assert_eq!(buckets.live(), vec!["old", "new"]);

        let summary = engine.finalize(&scope).await.unwrap();
        assert_eq!(summary.replaced_cleaned, 1);
        assert_eq!(buckets.live(), vec!["new"]);
        let record = engine.store().load(&scope, "assets").await.unwrap().unwrap();
        assert!(record.replaced.is_empty());
        assert_eq!(record.last_output["name"], "new");
    }

    #[tokio::test]
    async fn test_force_replace_deletes_first() {
        let engine = Engine::in_memory();
        let scope = Scope::root("shop", "dev");
        let buckets = Arc::new(Buckets {
            force: true,
            ..Buckets::default()
        });
        engine
            .apply(&scope, "assets", &buckets, BucketProps::named(Some("old")), ApplyOptions::new())
            .await
            .unwrap();
        let out = engine
            .apply(&scope, "assets", &buckets, BucketProps::named(Some("new")), ApplyOptions::new())
            .await
            .unwrap();
        assert_eq!(out.change, Change::Replaced);
        assert_eq!(buckets.live(), vec!["new"]);
        let record = engine.store().load(&scope, "assets").await.unwrap().unwrap();
        assert!(record.replaced.is_empty());
    }

    #[tokio::test]
    async fn test_destroy_instance_removes_record() {
        let (engine, scope, buckets) = setup();
        engine
            .apply(&scope, "assets", &buckets, BucketProps::named(None), ApplyOptions::new())
            .await
            .unwrap();
        engine.destroy_instance(&scope, "assets").await.unwrap();
        assert!(engine.store().load(&scope, "assets").await.unwrap().is_none());
        assert!(buckets.live().is_empty());
        assert!(scope.instance("assets").is_none());

        // Nothing left to delete.
        engine.destroy_instance(&scope, "assets").await.unwrap();
    }

    #[tokio::test]
    async fn test_secret_props_are_redacted_in_state() {
        let (engine, scope, buckets) = setup();
        let mut props = BucketProps::named(None);
        props.token = Some(wrap("super-secret-value"));
        engine
            .apply(&scope, "assets", &buckets, props, ApplyOptions::new())
            .await
            .unwrap();

        assert_eq!(*buckets.seen_tokens.lock().unwrap(), vec!["super-secret-value"]);
        let store = MemoryStateStore::new();
        let record = engine.store().load(&scope, "assets").await.unwrap().unwrap();
        store.save(&scope, "assets", &record).await.unwrap();
        assert!(!store.dump_json().await.unwrap().contains("super-secret-value"));
        assert!(!format!("{:?}", scope.instance("assets")).contains("super-secret-value"));
    }

    #[tokio::test]
    async fn test_rotated_secret_reaches_handler() {
        let (engine, scope, buckets) = setup();
        let with_token = |token: &str| {
            let mut props = BucketProps::named(None);
            props.token = Some(wrap(token));
            props
        };

        engine
            .apply(&scope, "assets", &buckets, with_token("old-pass"), ApplyOptions::new())
            .await
            .unwrap();
        let same = engine
            .apply(&scope, "assets", &buckets, with_token("old-pass"), ApplyOptions::new())
            .await
            .unwrap();
        assert_eq!(same.change, Change::Unchanged);

        let before = engine.store().load(&scope, "assets").await.unwrap().unwrap();
        let rotated = engine
            .apply(&scope, "assets", &buckets, with_token("new-pass"), ApplyOptions::new())
            .await
            .unwrap();
        assert_eq!(rotated.change, Change::Updated);
        assert_eq!(*buckets.seen_tokens.lock().unwrap(), vec!["old-pass", "new-pass"]);

        let after = engine.store().load(&scope, "assets").await.unwrap().unwrap();
        assert_eq!(after.last_inputs, before.last_inputs);
        let (old, new) = (before.secrets.unwrap(), after.secrets.unwrap());
        assert_eq!(old.salt, new.salt);
        assert_ne!(old.field("token"), new.field("token"));
    }

    #[tokio::test]
    async fn test_type_change_is_rejected() {
        use crate::resource::tests::{Named, Recorder};

        let (engine, scope, buckets) = setup();
        engine
            .apply(&scope, "assets", &buckets, BucketProps::named(None), ApplyOptions::new())
            .await
            .unwrap();
        let err = engine
            .apply(
                &scope,
                "assets",
                &Arc::new(Recorder::default()),
                Named { name: "x".to_string() },
                ApplyOptions::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateIdentity { .. }));
        assert_eq!(engine.registered_types(), vec!["test::Bucket"]);
    }
}
