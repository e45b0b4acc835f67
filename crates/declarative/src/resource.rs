//! Resource types and the type registry
//!
//! A resource type is the single integration surface between the engine and
//! a provider: one `handle` operation invoked in create, update and delete
//! phases. Everything the type does remotely happens inside `handle`.

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::scope::Scope;
use crate::types::{Outcome, Phase};

/// Core trait for declarable resource types
///
/// # Example
///
/// ```ignore
/// use declarative::{Context, Outcome, ResourceType};
///
/// struct Bucket { client: BlobClient }
///
/// #[async_trait::async_trait]
/// impl ResourceType for Bucket {
///     type Props = BucketProps;
///     type Output = BucketOutput;
///
///     fn type_tag(&self) -> &'static str { "blob::Bucket" }
///
///     async fn handle(
///         &self,
///         ctx: &Context<'_, BucketOutput>,
///         id: &str,
///         props: &BucketProps,
///     ) -> anyhow::Result<Outcome<BucketOutput>> {
///         let name = props.name.clone().unwrap_or_else(|| ctx.physical_name());
///         match ctx.phase() {
///             Phase::Delete => {
///                 self.client.delete(&ctx.output().unwrap().name).await?;
///                 Ok(ctx.destroy())
///             }
///             Phase::Update if ctx.output().is_some_and(|o| o.name != name) => {
///                 Ok(ctx.replace(false)?)
///             }
///             _ => Ok(Outcome::Applied(self.client.put(&name).await?)),
///         }
///     }
/// }
/// ```
#[async_trait]
pub trait ResourceType: Send + Sync + 'static {
    /// Declared inputs. Secret fields must use [`Secret`](crate::Secret) or
    /// [`MaybeSecret`](crate::MaybeSecret) so they are redacted in state.
    type Props: Serialize + DeserializeOwned + Send + Sync + 'static;

    /// Value returned to callers and persisted as the last output
    type Output: Serialize + DeserializeOwned + Clone + Send + Sync + 'static;

    /// Provider-defined type tag, e.g. `docker::Container`
    ///
    /// Must be unique across registered types.
    fn type_tag(&self) -> &'static str;

    /// Run the handler on every update even when inputs are unchanged
    ///
    /// For resources whose remote state drifts on its own, so the handler
    /// can re-verify it.
    fn always_update(&self) -> bool {
        false
    }

    /// Converge the remote object for one phase
    async fn handle(
        &self,
        ctx: &Context<'_, Self::Output>,
        identity: &str,
        props: &Self::Props,
    ) -> anyhow::Result<Outcome<Self::Output>>;
}

/// Type-erased delete path for one resource type.
///
/// Lets the engine tear down records whose declaration is gone.
#[async_trait]
pub(crate) trait Teardown: Send + Sync {
    fn type_tag(&self) -> &'static str;

    /// Run the delete phase against a recorded output.
    async fn delete(&self, scope: &Scope, identity: &str, output: &Value, inputs: &Value) -> Result<()>;
}

/// A resource type, optionally bound to the props declared this run.
///
/// Without declared props, the recorded (redacted) inputs are used.
pub(crate) struct Bound<R: ResourceType> {
    resource: Arc<R>,
    props: Option<Arc<R::Props>>,
}

impl<R: ResourceType> Bound<R> {
    pub(crate) fn registered(resource: Arc<R>) -> Self {
        Self {
            resource,
            props: None,
        }
    }

    pub(crate) fn declared(resource: Arc<R>, props: Arc<R::Props>) -> Self {
        Self {
            resource,
            props: Some(props),
        }
    }
}

#[async_trait]
impl<R: ResourceType> Teardown for Bound<R> {
    fn type_tag(&self) -> &'static str {
        self.resource.type_tag()
    }

    async fn delete(&self, scope: &Scope, identity: &str, output: &Value, inputs: &Value) -> Result<()> {
        let props = match &self.props {
            Some(props) => Arc::clone(props),
            None => Arc::new(serde_json::from_value(inputs.clone())?),
        };
        let output: R::Output = serde_json::from_value(output.clone())?;
        run_delete(self.resource.as_ref(), scope, identity, &props, &output, Some(inputs)).await
    }
}

/// Invoke a handler in delete phase and check that it reported `Destroyed`.
pub(crate) async fn run_delete<R: ResourceType>(
    resource: &R,
    scope: &Scope,
    identity: &str,
    props: &R::Props,
    output: &R::Output,
    inputs: Option<&Value>,
) -> Result<()> {
    let ctx = Context::new(Phase::Delete, identity, scope).with_prior(Some(output), inputs);
    match resource.handle(&ctx, identity, props).await? {
        Outcome::Destroyed => Ok(()),
        other => Err(Error::UnexpectedOutcome {
            identity: identity.to_string(),
            phase: Phase::Delete,
            outcome: other.name(),
        }),
    }
}

/// Registered resource types by tag
#[derive(Default)]
pub struct Registry {
    types: BTreeMap<&'static str, Arc<dyn Teardown>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a resource type, replacing any earlier one with the same tag
    pub fn register<R: ResourceType>(&mut self, resource: Arc<R>) {
        let tag = resource.type_tag();
        if self.types.insert(tag, Arc::new(Bound::registered(resource))).is_some() {
            log::debug!("Re-registered resource type {tag}");
        }
    }

    /// Check if a tag is registered
    pub fn contains(&self, tag: &str) -> bool {
        self.types.contains_key(tag)
    }

    /// Registered tags in sorted order
    pub fn tags(&self) -> Vec<&'static str> {
        self.types.keys().copied().collect()
    }

    pub(crate) fn get(&self, tag: &str) -> Result<Arc<dyn Teardown>> {
        self.types
            .get(tag)
            .cloned()
            .ok_or_else(|| Error::UnknownResourceType(tag.to_string()))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry").field("types", &self.tags()).finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use serde::Deserialize;
    use std::sync::Mutex;

    /// Records deletes; returns `Applied` from delete when `misbehave` is set.
    #[derive(Default)]
    pub(crate) struct Recorder {
        pub deleted: Mutex<Vec<String>>,
        pub misbehave: bool,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub(crate) struct Named {
        pub name: String,
    }

    #[async_trait]
    impl ResourceType for Recorder {
        type Props = Named;
        type Output = Named;

        fn type_tag(&self) -> &'static str {
            "test::Recorder"
        }

        async fn handle(&self, ctx: &Context<'_, Named>, _id: &str, props: &Named) -> anyhow::Result<Outcome<Named>> {
            if ctx.phase() == Phase::Delete && !self.misbehave {
                if let Some(output) = ctx.output() {
                    self.deleted.lock().unwrap().push(output.name.clone());
                }
                return Ok(ctx.destroy());
            }
            Ok(Outcome::Applied(props.clone()))
        }
    }

    pub(crate) fn noop_teardown() -> Arc<dyn Teardown> {
        Arc::new(Bound::registered(Arc::new(Recorder::default())))
    }

    #[tokio::test]
    async fn test_registered_teardown_uses_recorded_inputs() {
        let recorder = Arc::new(Recorder::default());
        let mut registry = Registry::new();
        registry.register(Arc::clone(&recorder));
        assert!(registry.contains("test::Recorder"));
        assert_eq!(registry.tags(), vec!["test::Recorder"]);

        let scope = Scope::root("shop", "dev");
        let teardown = registry.get("test::Recorder").unwrap();
        let value = serde_json::json!({ "name": "shop-dev-db" });
        teardown.delete(&scope, "db", &value, &value).await.unwrap();
        assert_eq!(*recorder.deleted.lock().unwrap(), vec!["shop-dev-db"]);
    }

    #[tokio::test]
    async fn test_delete_must_report_destroyed() {
        let recorder = Recorder {
            misbehave: true,
            ..Recorder::default()
        };
        let scope = Scope::root("shop", "dev");
        let named = Named { name: "x".to_string() };
        let err = run_delete(&recorder, &scope, "x", &named, &named, None).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedOutcome { phase: Phase::Delete, .. }));
    }

    #[test]
    fn test_unknown_tag() {
        assert!(matches!(
            Registry::new().get("nope"),
            Err(Error::UnknownResourceType(_))
        ));
    }
}
