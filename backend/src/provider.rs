use crate::types::{
    LinkEndId, TestCase, TestCaseId, TestConfiguration, TestPlan, TestPoint, WorkItem,
    WorkItemCategory, WorkItemId,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Project collection not found: {url}")]
    CollectionNotFound { url: String },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Authentication failed")]
    Authentication,

    #[error("Service unavailable: {message}")]
    ServiceUnavailable { message: String },

    #[error("Unexpected response ({status}): {message}")]
    Unexpected { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Read-only queries against a project collection's work item and test
/// management stores.
///
/// Lookups that can miss return `Ok(None)` / `Ok(false)` so callers decide
/// which entity to name in their own not-found error.
#[async_trait]
pub trait TestManagementBackend: Send + Sync {
    async fn project_exists(&self, project: &str) -> BackendResult<bool>;

    async fn get_work_item(&self, project: &str, id: WorkItemId)
        -> BackendResult<Option<WorkItem>>;

    async fn get_forward_link_end(
        &self,
        link_type_reference_name: &str,
    ) -> BackendResult<Option<LinkEndId>>;

    async fn get_categories(&self, project: &str) -> BackendResult<Vec<WorkItemCategory>>;

    /// Returns the project's test plans. Implementations may pre-filter to
    /// active plans; callers still check the state.
    async fn get_test_plans(&self, project: &str) -> BackendResult<Vec<TestPlan>>;

    /// Returns the points in `plan` whose test case is one of `test_case_ids`.
    async fn query_test_points(
        &self,
        project: &str,
        plan: &TestPlan,
        test_case_ids: &[TestCaseId],
    ) -> BackendResult<Vec<TestPoint>>;

    async fn get_test_configurations(&self, project: &str)
        -> BackendResult<Vec<TestConfiguration>>;

    /// Ids that do not resolve to a work item are left out of the result.
    async fn resolve_test_cases(&self, ids: &[TestCaseId]) -> BackendResult<Vec<TestCase>>;

    fn backend_name(&self) -> &'static str;
}

/// Opens a backend for a project collection address.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    /// Fails with [`BackendError::CollectionNotFound`] when nothing answers
    /// at `collection_url`.
    async fn connect(&self, collection_url: &str) -> BackendResult<Arc<dyn TestManagementBackend>>;
}
