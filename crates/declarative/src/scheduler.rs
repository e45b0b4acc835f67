//! Dependency scheduling.
//!
//! A handler only runs once every `depends_on` input has settled. Inputs are
//! awaited concurrently; the first failure wins and is attached to the
//! dependent's error unchanged.

use futures::future::try_join_all;

use crate::error::{Error, Result};
use crate::pending::Dependency;

/// Same-scope identities a set of dependencies point at.
///
/// These become teardown edges. Cross-scope edges are ordered by the scope
/// traversal instead.
pub(crate) fn local_edges(scope_key: &str, deps: &[Dependency]) -> Vec<String> {
    let mut edges = Vec::new();
    for target in deps.iter().filter_map(Dependency::target) {
        if target.scope == scope_key && !edges.contains(&target.identity) {
            edges.push(target.identity.clone());
        }
    }
    edges
}

/// Wait until every dependency has settled.
pub(crate) async fn await_dependencies(identity: &str, deps: Vec<Dependency>) -> Result<()> {
    if deps.is_empty() {
        return Ok(());
    }

    log::debug!("{identity}: waiting on {} dependencies", deps.len());
    try_join_all(deps.into_iter().map(|d| d.future))
        .await
        .map(|_| ())
        .map_err(|source| Error::Dependency {
            identity: identity.to_string(),
            source: Box::new(source),
        })
}
