//! Identifiers and the reference objects a job is built from.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque server-side identifier.
///
/// The service hands out ids as either JSON strings or integers; both
/// are accepted and normalised to a string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "RawOid")]
pub struct Oid(String);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawOid {
    Text(String),
    Int(i64),
}

impl From<RawOid> for Oid {
    fn from(raw: RawOid) -> Self {
        match raw {
            RawOid::Text(s) => Self(s),
            RawOid::Int(n) => Self(n.to_string()),
        }
    }
}

impl Oid {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Oid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Oid {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for Oid {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<i64> for Oid {
    fn from(n: i64) -> Self {
        Self(n.to_string())
    }
}

impl From<i32> for Oid {
    fn from(n: i32) -> Self {
        Self(n.to_string())
    }
}

impl From<u64> for Oid {
    fn from(n: u64) -> Self {
        Self(n.to_string())
    }
}

/// Identity of an analysis job on the service.
///
/// `analysis_job_id` stays `None` until the service accepts the job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobIdentity {
    pub project_id: Oid,
    pub analysis_job_id: Option<Oid>,
}

impl JobIdentity {
    /// Identity for a job that has not been submitted yet.
    pub fn unassigned(project_id: impl Into<Oid>) -> Self {
        Self {
            project_id: project_id.into(),
            analysis_job_id: None,
        }
    }

    pub fn is_assigned(&self) -> bool {
        self.analysis_job_id.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainRef {
    pub project_id: Oid,
    pub domain_id: Oid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DimensionRef {
    pub project_id: Oid,
    pub domain_id: Oid,
    pub dimension_id: Oid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricRef {
    pub project_id: Oid,
    pub domain_id: Oid,
    pub metric_id: Oid,
}
