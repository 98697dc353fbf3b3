use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use url::Url;

/// One object in the source container. Immutable once enumerated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub container: String,
    pub name: String,
}

impl ObjectRef {
    pub fn new(container: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            name: name.into(),
        }
    }
}

/// A time-boxed, read-only URL for exactly one object. Never persisted;
/// handed to the analysis service and dropped.
#[derive(Clone)]
pub struct AccessDescriptor {
    url: Url,
    container: String,
    name: String,
    permissions: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl AccessDescriptor {
    pub(crate) fn new(
        url: Url,
        object: &ObjectRef,
        permissions: impl Into<String>,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            url,
            container: object.container.clone(),
            name: object.name.clone(),
            permissions: permissions.into(),
            issued_at,
            expires_at,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn permissions(&self) -> &str {
        &self.permissions
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// True only for the single object this descriptor was issued for.
    pub fn covers(&self, object: &ObjectRef) -> bool {
        self.container == object.container && self.name == object.name
    }
}

// The signed query string is a bearer credential; keep it out of Debug
// output so descriptors can be logged without leaking the token.
impl fmt::Debug for AccessDescriptor {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AccessDescriptor")
            .field("container", &self.container)
            .field("name", &self.name)
            .field("permissions", &self.permissions)
            .field("expires_at", &self.expires_at)
            .field("url", &"<redacted>")
            .finish()
    }
}

/// One page of analysis output: 1-based page number and its text lines in
/// source order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AnalysisPage {
    pub number: u32,
    pub lines: Vec<String>,
}

/// Structured output of one successful analysis, pages in document order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AnalysisResult {
    pub pages: Vec<AnalysisPage>,
}

impl AnalysisResult {
    pub fn line_count(&self) -> usize {
        self.pages.iter().map(|page| page.lines.len()).sum()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ObjectStatus {
    Succeeded,
    Failed,
}

/// Terminal per-run record for one object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectOutcome {
    pub name: String,
    pub status: ObjectStatus,
    pub error_kind: Option<String>,
    pub detail: Option<String>,
    pub pages: usize,
}

/// Final tally for one run. A run with failed objects still counts as a
/// completed run; failures are retried by the next run because their
/// names never entered the checkpoint set.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RunSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub outcomes: Vec<ObjectOutcome>,
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Upper bound on one object's submit-and-poll cycle.
    pub analysis_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            analysis_timeout: Duration::from_secs(300),
        }
    }
}
