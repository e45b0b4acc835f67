//! Teardown sweeps and finalize passes over a scope tree.
//!
//! A sweep tears down child scopes first, then deletes every live resource
//! of the scope itself, dependents first. One failure never stops unrelated deletes:
//! everything is attempted and all failures are reported together.

use futures::future::{BoxFuture, FutureExt};
use std::collections::HashSet;

use crate::error::{DestroyFailure, Error, Result};
use crate::executor::Engine;
use crate::planner::{TeardownNode, TeardownPlan};
use crate::scope::Scope;
use crate::state::StateRecord;
use crate::types::DestroySummary;

/// Accumulates results across a recursive pass.
#[derive(Default)]
struct Sweep {
    summary: DestroySummary,
    failures: Vec<DestroyFailure>,
}

impl Sweep {
    fn fail(&mut self, scope: &Scope, identity: &str, error: Error) {
        log::warn!("{}/{identity}: {error}", scope.key());
        self.failures.push(DestroyFailure {
            scope: scope.key(),
            identity: identity.to_string(),
            error,
        });
    }

    fn finish(self) -> Result<DestroySummary> {
        if self.failures.is_empty() {
            Ok(self.summary)
        } else {
            Err(Error::DestroySweep {
                failures: self.failures,
            })
        }
    }
}

/// Identity used in failures that concern a whole scope.
const WHOLE_SCOPE: &str = "*";

impl Engine {
    /// Tear down every resource in `scope` and its child scopes.
    ///
    /// Covers resources declared in this process and records left in the
    /// store by earlier runs. Child scopes are swept first, most recent
    /// first, since their resources may depend on the parent's. Within a
    /// scope, a resource that depended on another is deleted first;
    /// otherwise the last declared goes first. A scope is emptied only when
    /// everything in it was deleted.
    ///
    /// # Errors
    ///
    /// [`Error::DestroySweep`] listing every failure once the whole tree has
    /// been attempted.
    pub async fn destroy(&self, scope: &Scope) -> Result<DestroySummary> {
        log::info!("Destroying scope {}", scope.key());
        let mut sweep = Sweep::default();
        self.sweep_scope(scope, &mut sweep).await;
        sweep.finish()
    }

    /// Complete the pass after a round of applies.
    ///
    /// Deletes objects superseded by a non-forced replace, and tears down
    /// stored resources (and stored child scopes) that were not declared in
    /// this process. Run it only after every declaration of the run has
    /// been applied.
    pub async fn finalize(&self, scope: &Scope) -> Result<DestroySummary> {
        let mut sweep = Sweep::default();
        self.finalize_scope(scope, &mut sweep).await;
        sweep.finish()
    }

    fn sweep_scope<'a>(&'a self, scope: &'a Scope, sweep: &'a mut Sweep) -> BoxFuture<'a, ()> {
        async move {
            let before = sweep.failures.len();

            // Children first: their resources may depend on ours.
            let children = self.child_scopes(scope, sweep).await;
            for child in children.iter().rev() {
                let before_child = sweep.failures.len();
                self.sweep_scope(child, &mut *sweep).await;
                if sweep.failures.len() == before_child {
                    scope.remove_child(child.name());
                }
            }

            match self.stored(scope).await {
                Ok(stored) => {
                    let nodes = teardown_nodes(scope, &stored, true);
                    self.remove_planned(scope, &nodes, sweep).await;
                }
                Err(error) => sweep.fail(scope, WHOLE_SCOPE, error),
            }

            if sweep.failures.len() == before {
                scope.clear();
                log::debug!("Scope {} is empty", scope.key());
            }
        }
        .boxed()
    }

    fn finalize_scope<'a>(&'a self, scope: &'a Scope, sweep: &'a mut Sweep) -> BoxFuture<'a, ()> {
        async move {
            let declared: HashSet<String> = scope.identities().into_iter().collect();
            let known_children: Vec<String> = scope.children().iter().map(|c| c.name().to_string()).collect();

            for child in self.child_scopes(scope, sweep).await {
                if known_children.iter().any(|name| name == child.name()) {
                    self.finalize_scope(&child, &mut *sweep).await;
                } else {
                    let before_child = sweep.failures.len();
                    self.sweep_scope(&child, &mut *sweep).await;
                    if sweep.failures.len() == before_child {
                        scope.remove_child(child.name());
                    }
                }
            }

            match self.stored(scope).await {
                Ok(stored) => {
                    for record in &stored {
                        if declared.contains(&record.identity) && !record.replaced.is_empty() {
                            match self.clean_declared(scope, &record.identity).await {
                                Ok(cleaned) => sweep.summary.replaced_cleaned += cleaned,
                                Err(error) => sweep.fail(scope, &record.identity, error),
                            }
                        }
                    }

                    let orphans: Vec<StateRecord> = stored
                        .into_iter()
                        .filter(|r| !declared.contains(&r.identity))
                        .collect();
                    if !orphans.is_empty() {
                        log::info!("{}: pruning {} undeclared resource(s)", scope.key(), orphans.len());
                    }
                    let nodes = teardown_nodes(scope, &orphans, false);
                    self.remove_planned(scope, &nodes, sweep).await;
                }
                Err(error) => sweep.fail(scope, WHOLE_SCOPE, error),
            }
        }
        .boxed()
    }

    /// Delete a planned set of identities; skip anything a failed
    /// dependent still relies on.
    async fn remove_planned(&self, scope: &Scope, nodes: &[TeardownNode], sweep: &mut Sweep) {
        let plan = TeardownPlan::build(nodes);
        let key = scope.key();
        let mut failed: HashSet<String> = HashSet::new();

        for identity in &plan.order {
            if let Some(blocker) = plan.dependents_of(identity).iter().find(|d| failed.contains(*d)) {
                let error = Error::DestroyBlocked {
                    identity: identity.clone(),
                    blocked_by: blocker.clone(),
                };
                sweep.fail(scope, identity, error);
                failed.insert(identity.clone());
                continue;
            }

            match self.remove_identity(scope, identity).await {
                Ok(removed) => {
                    if removed.destroyed {
                        sweep.summary.destroyed.push(format!("{key}/{identity}"));
                    }
                    sweep.summary.replaced_cleaned += removed.replaced;
                }
                Err(error) => {
                    sweep.fail(scope, identity, error);
                    failed.insert(identity.clone());
                }
            }
        }
    }

    /// Delete the replaced objects of a still-declared identity.
    async fn clean_declared(&self, scope: &Scope, identity: &str) -> Result<usize> {
        let lock = scope.identity_lock(identity);
        let _guard = lock.lock().await;

        let Some(mut record) = self.store().load(scope, identity).await? else {
            return Ok(0);
        };
        let teardown = match scope.instance(identity).and_then(|i| i.teardown) {
            Some(t) if t.type_tag() == record.type_tag => t,
            _ => self.teardown_for(&record.type_tag)?,
        };
        self.clean_replaced(scope, teardown.as_ref(), &mut record).await
    }

    async fn stored(&self, scope: &Scope) -> Result<Vec<StateRecord>> {
        self.store().list(scope).await
    }

    /// In-memory children plus child scopes only the store knows about.
    async fn child_scopes(&self, scope: &Scope, sweep: &mut Sweep) -> Vec<Scope> {
        let mut children = scope.children();
        match self.store().child_scopes(scope).await {
            Ok(names) => {
                for name in names {
                    if !children.iter().any(|c| c.name() == name) {
                        children.push(scope.child(&name));
                    }
                }
            }
            Err(error) => sweep.fail(scope, WHOLE_SCOPE, error),
        }
        children
    }
}

/// Planner input for a scope.
///
/// Records from earlier runs that are not declared now come first (they
/// are older), followed by declared instances in declaration order. With
/// `include_declared` unset only `stored` is considered.
fn teardown_nodes(scope: &Scope, stored: &[StateRecord], include_declared: bool) -> Vec<TeardownNode> {
    let declared = if include_declared { scope.instances() } else { Vec::new() };

    let mut nodes: Vec<TeardownNode> = stored
        .iter()
        .filter(|r| !declared.iter().any(|i| i.identity == r.identity))
        .map(|r| TeardownNode::new(r.identity.clone(), r.depends_on.clone()))
        .collect();

    nodes.extend(declared.into_iter().map(|instance| {
        let depends_on = match stored.iter().find(|r| r.identity == instance.identity) {
            Some(record) if instance.depends_on.is_empty() => record.depends_on.clone(),
            _ => instance.depends_on,
        };
        TeardownNode::new(instance.identity, depends_on)
    }));
    nodes
}
