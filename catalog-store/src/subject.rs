//! The identity store writes are performed under.
//!
//! Post-ingest work runs after the triggering request has returned, so the
//! caller's identity is gone by then. Writes are wrapped in
//! [`Subject::run_as`] and gateways that care (auditing, access control) read
//! [`Subject::current`].

use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;

tokio::task_local! {
    static CURRENT_SUBJECT: Subject;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubjectKind {
    User,
    Service,
}

/// A principal on whose behalf a store call is made.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Subject {
    pub name: String,
    pub kind: SubjectKind,
}

impl Subject {
    /// The elevated identity background work runs as.
    pub fn service(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SubjectKind::Service,
        }
    }

    pub fn user(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: SubjectKind::User,
        }
    }

    pub fn is_service(&self) -> bool {
        self.kind == SubjectKind::Service
    }

    /// Runs `fut` with `self` as the current subject.
    pub async fn run_as<F: Future>(self, fut: F) -> F::Output {
        CURRENT_SUBJECT.scope(self, fut).await
    }

    /// The subject of the enclosing [`Subject::run_as`] scope, if any.
    pub fn current() -> Option<Subject> {
        CURRENT_SUBJECT.try_with(Clone::clone).ok()
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            SubjectKind::Service => write!(f, "service:{}", self.name),
            SubjectKind::User => write!(f, "user:{}", self.name),
        }
    }
}
