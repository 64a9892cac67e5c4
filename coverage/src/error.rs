use backend::{BackendError, ConfigurationId, TestPlanId, TestPointId, WorkItemId};
use std::fmt;
use thiserror::Error;

/// An entity that a coverage run needs but the backend does not have.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MissingEntity {
    Collection(String),
    Project(String),
    WorkItem(WorkItemId),
    Category(String),
    LinkType(String),
}

impl fmt::Display for MissingEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingEntity::Collection(url) => write!(f, "project collection '{}'", url),
            MissingEntity::Project(name) => write!(f, "project '{}'", name),
            MissingEntity::WorkItem(id) => write!(f, "work item {}", id),
            MissingEntity::Category(name) => write!(f, "work item category '{}'", name),
            MissingEntity::LinkType(name) => write!(f, "link type '{}'", name),
        }
    }
}

#[derive(Error, Debug)]
pub enum CoverageError {
    #[error("Invalid input for {field}: {reason}")]
    InvalidInput { field: &'static str, reason: String },

    #[error("Not found: {entity}")]
    NotFound { entity: MissingEntity },

    #[error("Work item {work_item_id} has no linked test cases")]
    NoLinkedTestCases { work_item_id: WorkItemId },

    #[error("Project '{project}' has no active test plans")]
    NoActiveTestPlans { project: String },

    #[error("Test point {test_point_id} references unknown configuration {configuration_id}")]
    MissingConfiguration {
        configuration_id: ConfigurationId,
        test_point_id: TestPointId,
    },

    #[error("Querying test points of plan {plan_id} ('{plan_name}') failed: {source}")]
    PlanQueryFailed {
        plan_id: TestPlanId,
        plan_name: String,
        #[source]
        source: BackendError,
    },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Internal invariant violated: {message}")]
    InvariantViolation { message: String },

    #[error("Backend error: {0}")]
    Backend(#[from] BackendError),
}

pub type CoverageResult<T> = Result<T, CoverageError>;

impl CoverageError {
    pub(crate) fn invalid_input(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found(entity: MissingEntity) -> Self {
        Self::NotFound { entity }
    }

    pub(crate) fn invariant(message: impl Into<String>) -> Self {
        Self::InvariantViolation {
            message: message.into(),
        }
    }
}
