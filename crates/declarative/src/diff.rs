//! Diff computation for declared inputs
//!
//! The engine never inspects props itself. Handlers use these helpers to
//! decide whether a change can be applied in place or needs a replace.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

use crate::secret::SecretDigest;

/// How one top-level input field changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum FieldChange {
    /// Field is new in this run
    Added { to: Value },
    /// Field was present last run and is gone now
    Removed { from: Value },
    /// Field value differs
    Modified { from: Value, to: Value },
}

/// A diff between the recorded inputs and the newly declared inputs
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InputDiff {
    /// Changed fields by name; unchanged fields are omitted
    pub changes: BTreeMap<String, FieldChange>,
}

impl InputDiff {
    /// Compare two redacted input values field by field.
    ///
    /// Non-object values are compared as a whole under the empty key.
    pub fn between(previous: &Value, next: &Value) -> Self {
        let mut changes = BTreeMap::new();

        match (previous, next) {
            (Value::Object(old), Value::Object(new)) => {
                for (key, to) in new {
                    match old.get(key) {
                        None => {
                            changes.insert(key.clone(), FieldChange::Added { to: to.clone() });
                        }
                        Some(from) if from != to => {
                            changes.insert(
                                key.clone(),
                                FieldChange::Modified {
                                    from: from.clone(),
                                    to: to.clone(),
                                },
                            );
                        }
                        Some(_) => {}
                    }
                }
                for (key, from) in old {
                    if !new.contains_key(key) {
                        changes.insert(key.clone(), FieldChange::Removed { from: from.clone() });
                    }
                }
            }
            (old, new) if old != new => {
                changes.insert(
                    String::new(),
                    FieldChange::Modified {
                        from: old.clone(),
                        to: new.clone(),
                    },
                );
            }
            _ => {}
        }

        Self { changes }
    }

    /// Flag fields whose redacted values match but whose secrets differ.
    pub(crate) fn mark_rotated(
        &mut self,
        previous: &Value,
        next: &Value,
        old: Option<&SecretDigest>,
        new: Option<&SecretDigest>,
    ) {
        let names: BTreeSet<&str> = old
            .into_iter()
            .chain(new)
            .flat_map(|d| d.fields.keys().map(String::as_str))
            .collect();
        for name in names {
            if self.changed(name) || old.and_then(|d| d.field(name)) == new.and_then(|d| d.field(name)) {
                continue;
            }
            let field = |value: &Value| match value {
                Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Null),
                other if name.is_empty() => other.clone(),
                _ => Value::Null,
            };
            self.changes.insert(
                name.to_string(),
                FieldChange::Modified {
                    from: field(previous),
                    to: field(next),
                },
            );
        }
    }

    /// Check if a field changed
    pub fn changed(&self, field: &str) -> bool {
        self.changes.contains_key(field)
    }

    /// Check if any of the given fields changed
    pub fn any_changed(&self, fields: &[&str]) -> bool {
        fields.iter().any(|f| self.changed(f))
    }

    /// Check if nothing changed
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Changed field names in sorted order
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.changes.keys().map(String::as_str)
    }

    pub fn summary(&self) -> DiffSummary {
        DiffSummary::from_diff(self)
    }
}

/// Diff summary statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffSummary {
    /// Number of fields added
    pub additions: usize,
    /// Number of fields removed
    pub removals: usize,
    /// Number of fields modified
    pub modifications: usize,
}

impl DiffSummary {
    /// Create a summary from a diff
    pub fn from_diff(diff: &InputDiff) -> Self {
        let mut summary = Self::default();
        for change in diff.changes.values() {
            match change {
                FieldChange::Added { .. } => summary.additions += 1,
                FieldChange::Removed { .. } => summary.removals += 1,
                FieldChange::Modified { .. } => summary.modifications += 1,
            }
        }
        summary
    }

    /// Total number of changes
    pub fn total(&self) -> usize {
        self.additions + self.removals + self.modifications
    }

    /// Check if there are any changes
    pub fn has_changes(&self) -> bool {
        self.total() > 0
    }
}
