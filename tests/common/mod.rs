//! Shared fixtures for the end-to-end tests
//!
//! `Cloud` is an in-process stand-in for a remote API: objects keyed by
//! physical name, `409` on duplicate creates, `404` on missing lookups and
//! a configurable run of `429` responses. `Containers` is a resource type
//! that talks to it through the retry policy.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use converge::provider::{self, RetryCallback, RetryConfig};
use converge::{Context, MaybeSecret, Outcome, Phase, ResourceType, unwrap};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub id: String,
    pub name: String,
    pub image: String,
}

/// Simulated remote API
#[derive(Debug, Default)]
pub struct Cloud {
    objects: Mutex<BTreeMap<String, RemoteObject>>,
    next_id: AtomicU64,
    throttled: AtomicU32,
    create_calls: AtomicU32,
    mutations: AtomicU32,
    passwords: Mutex<Vec<String>>,
}

impl Cloud {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next `n` creates with `429`.
    pub fn throttle(&self, n: u32) {
        self.throttled.store(n, Ordering::SeqCst);
    }

    /// Put an object in place without going through the engine.
    pub fn seed(&self, name: &str, image: &str) -> RemoteObject {
        let object = self.insert(name, image);
        self.mutations.store(0, Ordering::SeqCst);
        object
    }

    fn insert(&self, name: &str, image: &str) -> RemoteObject {
        let id = format!("obj-{}", self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let object = RemoteObject {
            id,
            name: name.to_string(),
            image: image.to_string(),
        };
        self.objects
            .lock()
            .unwrap()
            .insert(name.to_string(), object.clone());
        self.mutations.fetch_add(1, Ordering::SeqCst);
        object
    }

    pub async fn create(&self, name: &str, image: &str, password: &str) -> provider::Result<RemoteObject> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        let throttled = self
            .throttled
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if throttled {
            return Err(provider::Error::from_status(429, "slow down", None));
        }
        if self.objects.lock().unwrap().contains_key(name) {
            return Err(provider::Error::from_status(409, "exists", Some(name)));
        }
        self.passwords.lock().unwrap().push(password.to_string());
        Ok(self.insert(name, image))
    }

    pub async fn get(&self, name: &str) -> provider::Result<RemoteObject> {
        self.objects
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| provider::Error::from_status(404, "no such object", Some(name)))
    }

    pub async fn set_image(&self, name: &str, image: &str) -> provider::Result<RemoteObject> {
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(name)
            .ok_or_else(|| provider::Error::from_status(404, "no such object", Some(name)))?;
        if object.image != image {
            object.image = image.to_string();
            self.mutations.fetch_add(1, Ordering::SeqCst);
        }
        Ok(object.clone())
    }

    pub async fn set_password(&self, name: &str, password: &str) -> provider::Result<()> {
        if !self.objects.lock().unwrap().contains_key(name) {
            return Err(provider::Error::from_status(404, "no such object", Some(name)));
        }
        self.passwords.lock().unwrap().push(password.to_string());
        self.mutations.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    pub async fn delete(&self, name: &str) -> provider::Result<()> {
        match self.objects.lock().unwrap().remove(name) {
            Some(_) => {
                self.mutations.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            None => Err(provider::Error::from_status(404, "no such object", Some(name))),
        }
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn names(&self) -> Vec<String> {
        self.objects.lock().unwrap().keys().cloned().collect()
    }

    pub fn create_calls(&self) -> u32 {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn mutations(&self) -> u32 {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Passwords exactly as the provider received them
    pub fn passwords(&self) -> Vec<String> {
        self.passwords.lock().unwrap().clone()
    }
}

/// Records the delay before every retry.
#[derive(Debug, Default)]
pub struct DelayLog(Mutex<Vec<Duration>>);

impl DelayLog {
    pub fn delays(&self) -> Vec<Duration> {
        self.0.lock().unwrap().clone()
    }
}

impl RetryCallback for DelayLog {
    fn on_retry(&self, _attempt: u32, _max_attempts: u32, _error: &str, delay: Duration) {
        self.0.lock().unwrap().push(delay);
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerProps {
    /// Physical name; defaults to the scope's name for the identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub image: String,
    pub password: MaybeSecret,
}

impl ContainerProps {
    pub fn new(image: &str) -> Self {
        Self {
            name: None,
            image: image.to_string(),
            password: MaybeSecret::from(""),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn password(mut self, password: impl Into<MaybeSecret>) -> Self {
        self.password = password.into();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerOutput {
    pub id: String,
    pub name: String,
    pub image: String,
}

impl From<RemoteObject> for ContainerOutput {
    fn from(object: RemoteObject) -> Self {
        Self {
            id: object.id,
            name: object.name,
            image: object.image,
        }
    }
}

/// Container-like resource: renaming replaces after the new one is up,
/// changing the image tears the old one down first.
pub struct Containers {
    pub cloud: std::sync::Arc<Cloud>,
    pub retry: RetryConfig,
    pub delays: DelayLog,
}

impl Containers {
    pub fn new(cloud: std::sync::Arc<Cloud>) -> Self {
        Self {
            cloud,
            retry: RetryConfig::new(4, Duration::from_millis(100), 2.0),
            delays: DelayLog::default(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

#[async_trait]
impl ResourceType for Containers {
    type Props = ContainerProps;
    type Output = ContainerOutput;

    fn type_tag(&self) -> &'static str {
        "test::Container"
    }

    async fn handle(
        &self,
        ctx: &Context<'_, ContainerOutput>,
        _identity: &str,
        props: &ContainerProps,
    ) -> Result<Outcome<ContainerOutput>> {
        let name = props.name.clone().unwrap_or_else(|| ctx.physical_name());

        match ctx.phase() {
            Phase::Delete => {
                if let Some(prior) = ctx.output() {
                    match self.cloud.delete(&prior.name).await {
                        Ok(()) => {}
                        Err(e) if e.category() == provider::ErrorCategory::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                Ok(ctx.destroy())
            }
            Phase::Update => {
                let diff = ctx.diff(props)?;
                if diff.changed("name") {
                    return Ok(ctx.replace(false)?);
                }
                if diff.changed("image") {
                    return Ok(ctx.replace(true)?);
                }
                if diff.changed("password") {
                    self.cloud.set_password(&name, unwrap(&props.password)).await?;
                }
                let object = self.cloud.set_image(&name, &props.image).await?;
                Ok(Outcome::Applied(object.into()))
            }
            Phase::Create => {
                let password = unwrap(&props.password);
                let created = provider::with_backoff(
                    &self.retry,
                    Some(&self.delays),
                    || self.cloud.create(&name, &props.image, password),
                    provider::Error::is_retryable,
                )
                .await;
                match created {
                    Ok(object) => Ok(Outcome::Applied(object.into())),
                    Err(e) if e.category() == provider::ErrorCategory::Conflict && ctx.adopt() => {
                        let object = self.cloud.get(&name).await?;
                        Ok(Outcome::Applied(object.into()))
                    }
                    Err(e) => Err(e.into()),
                }
            }
        }
    }
}
