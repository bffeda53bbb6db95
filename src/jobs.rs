//! Process-wide job status registry.
//!
//! Both the CLI and the HTTP front-end observe pipeline progress through
//! this map. Keys are `{project}_{target}` where the target is a raw file
//! name or a sentinel such as `export`. State lives only for the process
//! lifetime; all persistent truth is in artifacts on disk.

use crate::error::{Result, SpeechsetError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub state: JobState,
    /// 0-100.
    pub progress: u8,
    pub message: String,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

/// Registry key: `(project, target)`, rendered as `{project}_{target}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobKey {
    pub project: String,
    pub target: String,
}

impl JobKey {
    #[must_use]
    pub fn new(project: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            project: project.into(),
            target: target.into(),
        }
    }

    /// Sentinel key for project-wide export jobs.
    #[must_use]
    pub fn export(project: impl Into<String>) -> Self {
        Self::new(project, "export")
    }
}

impl std::fmt::Display for JobKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.project, self.target)
    }
}

/// Thread-safe job registry shared by handle.
#[derive(Clone, Default)]
pub struct JobRegistry {
    inner: Arc<Mutex<HashMap<JobKey, JobStatus>>>,
}

impl JobRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a job as processing. Rejects a key whose job is already in
    /// flight; completed or failed entries are overwritten.
    pub fn start(&self, key: &JobKey) -> Result<()> {
        let mut map = self.inner.lock().unwrap();
        if let Some(existing) = map.get(key) {
            if existing.state == JobState::Processing {
                return Err(SpeechsetError::AlreadyProcessing {
                    key: key.to_string(),
                });
            }
        }
        map.insert(
            key.clone(),
            JobStatus {
                state: JobState::Processing,
                progress: 0,
                message: "Starting processing...".to_string(),
                started_at: Utc::now(),
                completed_at: None,
            },
        );
        Ok(())
    }

    /// Update progress and message of a running job. Unknown keys are
    /// ignored; status is advisory.
    pub fn update(&self, key: &JobKey, progress: u8, message: impl Into<String>) {
        let mut map = self.inner.lock().unwrap();
        if let Some(status) = map.get_mut(key) {
            status.progress = progress.min(100);
            status.message = message.into();
        }
    }

    /// Move a job to a terminal state.
    pub fn finish(&self, key: &JobKey, state: JobState, message: impl Into<String>) {
        let mut map = self.inner.lock().unwrap();
        if let Some(status) = map.get_mut(key) {
            status.state = state;
            status.message = message.into();
            status.completed_at = Some(Utc::now());
            if state == JobState::Completed {
                status.progress = 100;
            }
        }
    }

    /// Drop a job entry entirely. Used for cancelled jobs, which leave no
    /// failed marker behind.
    pub fn clear(&self, key: &JobKey) {
        self.inner.lock().unwrap().remove(key);
    }

    #[must_use]
    pub fn get(&self, key: &JobKey) -> Option<JobStatus> {
        self.inner.lock().unwrap().get(key).cloned()
    }

    /// A point-in-time copy of the whole map, for status endpoints.
    #[must_use]
    pub fn snapshot(&self) -> HashMap<JobKey, JobStatus> {
        self.inner.lock().unwrap().clone()
    }
}
