//! Teardown planner - orders the resources of one scope for deletion
//!
//! Dependents go first: a resource is only deleted once everything that
//! depended on it is gone. Among resources that are ready at the same
//! time, the most recently declared goes first.

use std::collections::{HashMap, HashSet};

/// A resource as the planner sees it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TeardownNode {
    /// Identity within the scope
    pub identity: String,
    /// Same-scope identities this resource depended on
    pub depends_on: Vec<String>,
}

impl TeardownNode {
    pub fn new(identity: impl Into<String>, depends_on: Vec<String>) -> Self {
        Self {
            identity: identity.into(),
            depends_on,
        }
    }
}

/// Deletion order for one scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TeardownPlan {
    /// Identities in the order they are deleted
    pub order: Vec<String>,
    /// For each identity, the resources that depended on it
    pub dependents: HashMap<String, Vec<String>>,
}

impl TeardownPlan {
    /// Build a plan from nodes listed in declaration order.
    ///
    /// Edges to identities not in `nodes` are ignored. A dependency cycle
    /// does not stall the plan: the latest-declared remaining node is
    /// taken next.
    pub fn build(nodes: &[TeardownNode]) -> Self {
        let known: HashSet<&str> = nodes.iter().map(|n| n.identity.as_str()).collect();

        let mut dependents: HashMap<String, Vec<String>> = HashMap::new();
        for node in nodes {
            for dep in &node.depends_on {
                if known.contains(dep.as_str()) && dep != &node.identity {
                    let entry = dependents.entry(dep.clone()).or_default();
                    if !entry.contains(&node.identity) {
                        entry.push(node.identity.clone());
                    }
                }
            }
        }

        let mut done: HashSet<&str> = HashSet::new();
        let mut order = Vec::with_capacity(nodes.len());

        while order.len() < nodes.len() {
            let remaining = || nodes.iter().rev().filter(|n| !done.contains(n.identity.as_str()));

            let ready = remaining().find(|n| {
                dependents
                    .get(&n.identity)
                    .is_none_or(|ds| ds.iter().all(|d| done.contains(d.as_str())))
            });

            let next = match ready.or_else(|| remaining().next()) {
                Some(node) => node,
                None => break,
            };
            if ready.is_none() {
                log::warn!("Dependency cycle at {}; tearing down in declaration order", next.identity);
            }
            done.insert(next.identity.as_str());
            order.push(next.identity.clone());
        }

        Self { order, dependents }
    }

    /// Resources that depended on `identity`
    pub fn dependents_of(&self, identity: &str) -> &[String] {
        self.dependents.get(identity).map(Vec::as_slice).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, deps: &[&str]) -> TeardownNode {
        TeardownNode::new(id, deps.iter().map(|d| d.to_string()).collect())
    }

    #[test]
    fn test_reverse_declaration_order_without_edges() {
        let plan = TeardownPlan::build(&[node("a", &[]), node("b", &[]), node("c", &[])]);
        assert_eq!(plan.order, vec!["c", "b", "a"]);
    }

    #[test]
    fn test_dependents_go_first_even_when_declared_earlier() {
        // `api` was declared before `db` but depends on it.
        let plan = TeardownPlan::build(&[node("network", &[]), node("api", &["db"]), node("db", &["network"])]);
        assert_eq!(plan.order, vec!["api", "db", "network"]);
        assert_eq!(plan.dependents_of("db"), ["api".to_string()]);
        assert!(plan.dependents_of("api").is_empty());
    }

    #[test]
    fn test_unknown_edges_are_ignored() {
        let plan = TeardownPlan::build(&[node("a", &["elsewhere"]), node("b", &[])]);
        assert_eq!(plan.order, vec!["b", "a"]);
    }

    #[test]
    fn test_cycle_still_terminates() {
        let plan = TeardownPlan::build(&[node("a", &["b"]), node("b", &["a"]), node("c", &[])]);
        assert_eq!(plan.order.len(), 3);
        assert_eq!(plan.order[0], "c");
    }
}
