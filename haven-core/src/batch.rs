//! Per-item outcomes of batch operations.
//!
//! Install and tier cleanup are sequences of independent attempts. Each
//! attempt is recorded here and the caller decides the aggregate policy.

use serde::{Deserialize, Serialize};

/// Outcome of a single attempt within a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum AttemptOutcome<E> {
    Success { identity: String },
    Failure { identity: String, cause: E },
}

impl<E> AttemptOutcome<E> {
    pub fn identity(&self) -> &str {
        match self {
            AttemptOutcome::Success { identity } | AttemptOutcome::Failure { identity, .. } => {
                identity
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success { .. })
    }
}

/// Ordered collection of attempt outcomes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport<E> {
    outcomes: Vec<AttemptOutcome<E>>,
}

impl<E> Default for BatchReport<E> {
    fn default() -> Self {
        Self {
            outcomes: Vec::new(),
        }
    }
}

impl<E> BatchReport<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, identity: impl Into<String>, result: Result<(), E>) {
        let identity = identity.into();
        self.outcomes.push(match result {
            Ok(()) => AttemptOutcome::Success { identity },
            Err(cause) => AttemptOutcome::Failure { identity, cause },
        });
    }

    pub fn success(&mut self, identity: impl Into<String>) {
        self.record(identity, Ok(()));
    }

    pub fn failure(&mut self, identity: impl Into<String>, cause: E) {
        self.record(identity, Err(cause));
    }

    pub fn outcomes(&self) -> &[AttemptOutcome<E>] {
        &self.outcomes
    }

    pub fn successes(&self) -> impl Iterator<Item = &str> {
        self.outcomes
            .iter()
            .filter(|o| o.is_success())
            .map(|o| o.identity())
    }

    pub fn failures(&self) -> impl Iterator<Item = (&str, &E)> {
        self.outcomes.iter().filter_map(|o| match o {
            AttemptOutcome::Failure { identity, cause } => Some((identity.as_str(), cause)),
            AttemptOutcome::Success { .. } => None,
        })
    }

    pub fn failure_count(&self) -> usize {
        self.failures().count()
    }

    /// Vacuously true for an empty batch.
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.is_success())
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }
}
