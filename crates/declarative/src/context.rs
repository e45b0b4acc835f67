//! Handler context
//!
//! What a resource handler sees about the apply it is running in, plus the
//! `destroy`/`replace` signals it returns to the engine.

use serde::Serialize;
use serde_json::Value;

use crate::diff::InputDiff;
use crate::error::{Error, Result};
use crate::scope::Scope;
use crate::secret::{SecretDigest, digest};
use crate::types::{Outcome, Phase};

/// Context passed to [`ResourceType::handle`](crate::ResourceType::handle)
pub struct Context<'a, O> {
    pub(crate) phase: Phase,
    pub(crate) identity: &'a str,
    pub(crate) scope: &'a Scope,
    pub(crate) output: Option<&'a O>,
    pub(crate) previous_inputs: Option<&'a Value>,
    pub(crate) previous_secrets: Option<&'a SecretDigest>,
    pub(crate) adopt: bool,
}

impl<'a, O> Context<'a, O> {
    pub(crate) fn new(phase: Phase, identity: &'a str, scope: &'a Scope) -> Self {
        Self {
            phase,
            identity,
            scope,
            output: None,
            previous_inputs: None,
            previous_secrets: None,
            adopt: false,
        }
    }

    pub(crate) fn with_prior(mut self, output: Option<&'a O>, inputs: Option<&'a Value>) -> Self {
        self.output = output;
        self.previous_inputs = inputs;
        self
    }

    pub(crate) fn with_prior_secrets(mut self, secrets: Option<&'a SecretDigest>) -> Self {
        self.previous_secrets = secrets;
        self
    }

    pub(crate) fn with_adopt(mut self, adopt: bool) -> Self {
        self.adopt = adopt;
        self
    }

    /// Phase of this apply
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Identity being applied
    pub fn identity(&self) -> &str {
        self.identity
    }

    /// Scope the resource is declared in
    pub fn scope(&self) -> &Scope {
        self.scope
    }

    /// Prior output; `None` on create
    pub fn output(&self) -> Option<&O> {
        self.output
    }

    /// Inputs recorded by the last successful apply, redacted
    pub fn previous_inputs(&self) -> Option<&Value> {
        self.previous_inputs
    }

    /// Whether a create may bind to a pre-existing remote object
    pub fn adopt(&self) -> bool {
        self.adopt
    }

    /// Deterministic physical name for this identity
    pub fn physical_name(&self) -> String {
        self.scope.create_physical_name(self.identity)
    }

    /// Field-level diff between the recorded inputs and `props`.
    ///
    /// On create every field shows up as added. A secret field whose
    /// value was rotated shows up as modified even though both sides read
    /// as redacted.
    pub fn diff<P: Serialize + ?Sized>(&self, props: &P) -> Result<InputDiff> {
        let next = serde_json::to_value(props)?;
        let Some(previous) = self.previous_inputs else {
            return Ok(InputDiff::between(&Value::Object(Default::default()), &next));
        };
        let mut diff = InputDiff::between(previous, &next);
        let secrets = digest(props, self.previous_secrets.map(|d| d.salt.as_str()))?;
        diff.mark_rotated(previous, &next, self.previous_secrets, secrets.as_ref());
        Ok(diff)
    }

    /// The remote object is gone. Return this from the delete phase.
    pub fn destroy(&self) -> Outcome<O> {
        Outcome::Destroyed
    }

    /// The declared inputs cannot be applied in place.
    ///
    /// With `force` the old object is deleted before the new one is
    /// created, which is required when both share a physical name.
    /// Not available during create: a handler that meets a conflicting
    /// object while creating must deal with it itself.
    pub fn replace(&self, force: bool) -> Result<Outcome<O>> {
        if self.phase == Phase::Create {
            return Err(Error::ReplaceDuringCreate {
                identity: self.identity.to_string(),
            });
        }
        Ok(Outcome::Replace { force })
    }
}
