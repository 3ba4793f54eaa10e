//! Execution-backend boundary
//!
//! Remote code execution is an external collaborator with its own service;
//! the session only needs to submit a source blob and poll for the outcome.
//! [`EchoBackend`] is the no-network stand-in used by tests.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{CoeditError, Result};

// ----------------------------------------------------------------------------
// Job Types
// ----------------------------------------------------------------------------

/// Opaque handle for a submitted execution job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One execution request: a source blob plus language and optional stdin.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRequest {
    pub language: String,
    pub source: String,
    #[serde(default)]
    pub stdin: String,
}

/// Completed-run details reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobOutput {
    pub stdout: String,
    pub stderr: String,
    /// Compiler diagnostics for compiled languages, empty otherwise.
    pub compile_output: String,
    /// Wall time in seconds, when the service reports one.
    pub time: Option<f64>,
    /// Peak memory in kilobytes, when the service reports one.
    pub memory: Option<u64>,
}

/// Lifecycle of a submitted job as seen through polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "kebab-case")]
pub enum JobStatus {
    Queued,
    Running,
    Done(JobOutput),
    /// The service rejected or aborted the run.
    Failed { reason: String },
}

// ----------------------------------------------------------------------------
// Execution Backend Trait
// ----------------------------------------------------------------------------

/// Contract against the remote execution service. Submissions return a
/// pollable handle; the session polls until [`JobStatus::Done`] or
/// [`JobStatus::Failed`].
#[async_trait]
pub trait ExecutionBackend: Send {
    async fn submit(&mut self, request: JobRequest) -> Result<JobId>;

    async fn poll(&mut self, job: &JobId) -> Result<JobStatus>;
}

// ----------------------------------------------------------------------------
// Echo Backend
// ----------------------------------------------------------------------------

/// Test backend that "runs" any submission by echoing its source to stdout
/// on the first poll. Never touches the network.
#[derive(Debug, Default)]
pub struct EchoBackend {
    jobs: HashMap<JobId, JobRequest>,
}

impl EchoBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExecutionBackend for EchoBackend {
    async fn submit(&mut self, request: JobRequest) -> Result<JobId> {
        let id = JobId::generate();
        self.jobs.insert(id.clone(), request);
        Ok(id)
    }

    async fn poll(&mut self, job: &JobId) -> Result<JobStatus> {
        match self.jobs.remove(job) {
            Some(request) => Ok(JobStatus::Done(JobOutput {
                stdout: request.source,
                ..JobOutput::default()
            })),
            None => Err(CoeditError::channel_error(format!(
                "unknown execution job {job}"
            ))),
        }
    }
}
