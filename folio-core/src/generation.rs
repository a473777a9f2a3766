//! Generation tasks and batch results.

use crate::{DocumentId, FolioError, FolioResult, SectionId, UpstreamError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One unit of section generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationTask {
    pub document_id: DocumentId,
    pub section_id: SectionId,
    pub title: String,
    /// Free-form guidance (outline, notes, excerpts) passed to the generator.
    #[serde(default)]
    pub context: String,
}

/// Generated text for one section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedSection {
    pub section_id: SectionId,
    pub title: String,
    pub content: String,
}

/// Lifecycle of a task inside a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Failed)
    }

    pub fn can_transition_to(&self, next: TaskState) -> bool {
        matches!(
            (self, next),
            (TaskState::Pending, TaskState::Running)
                | (TaskState::Running, TaskState::Succeeded)
                | (TaskState::Running, TaskState::Failed)
        )
    }
}

/// Terminal outcome of a task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum TaskOutcome {
    #[serde(rename = "success")]
    Succeeded {
        section: GeneratedSection,
        /// Version created when the batch persisted its results.
        #[serde(skip_serializing_if = "Option::is_none")]
        version_number: Option<u32>,
        attempts: u32,
    },
    #[serde(rename = "error")]
    Failed {
        message: String,
        code: String,
        attempts: u32,
    },
}

impl TaskOutcome {
    pub fn failed(error: &FolioError, attempts: u32) -> Self {
        TaskOutcome::Failed {
            message: error.to_string(),
            code: error.code().to_string(),
            attempts,
        }
    }

    pub fn state(&self) -> TaskState {
        match self {
            TaskOutcome::Succeeded { .. } => TaskState::Succeeded,
            TaskOutcome::Failed { .. } => TaskState::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, TaskOutcome::Succeeded { .. })
    }
}

/// Per-section outcomes of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub outcomes: BTreeMap<SectionId, TaskOutcome>,
    pub succeeded: usize,
    pub failed: usize,
}

impl BatchResult {
    pub fn from_outcomes(outcomes: BTreeMap<SectionId, TaskOutcome>) -> Self {
        let succeeded = outcomes.values().filter(|o| o.is_success()).count();
        let failed = outcomes.len() - succeeded;
        Self {
            outcomes,
            succeeded,
            failed,
        }
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_complete_success(&self) -> bool {
        self.failed == 0
    }

    pub fn get(&self, section_id: &SectionId) -> Option<&TaskOutcome> {
        self.outcomes.get(section_id)
    }

    /// All-or-nothing view: every section or an error naming the failures.
    pub fn require_all(self) -> FolioResult<BTreeMap<SectionId, GeneratedSection>> {
        if self.failed > 0 {
            return Err(UpstreamError::BatchIncomplete {
                failed: self.failed,
                total: self.total(),
            }
            .into());
        }
        Ok(self
            .outcomes
            .into_iter()
            .filter_map(|(id, outcome)| match outcome {
                TaskOutcome::Succeeded { section, .. } => Some((id, section)),
                TaskOutcome::Failed { .. } => None,
            })
            .collect())
    }
}
