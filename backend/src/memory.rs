//! Snapshot-backed backend.
//!
//! Holds a fixed copy of everything a coverage run reads. Used for offline
//! evaluation of an exported snapshot file and as the fake in tests.

use crate::provider::{BackendConnector, BackendError, BackendResult, TestManagementBackend};
use crate::types::{
    LinkEndId, TestCase, TestCaseId, TestConfiguration, TestPlan, TestPoint, WorkItem,
    WorkItemCategory, WorkItemId,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Everything one project collection exposes to a coverage run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendSnapshot {
    pub collection_url: String,
    pub project: String,
    pub work_items: Vec<WorkItem>,
    /// Link type reference name and its forward end id.
    pub link_types: Vec<(String, LinkEndId)>,
    pub categories: Vec<WorkItemCategory>,
    pub test_plans: Vec<TestPlan>,
    pub test_points: Vec<TestPoint>,
    pub configurations: Vec<TestConfiguration>,
    pub test_cases: Vec<TestCase>,
}

impl BackendSnapshot {
    pub fn from_json_file(path: &Path) -> BackendResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| BackendError::InvalidConfig {
            message: format!("Cannot read snapshot {}: {}", path.display(), e),
        })?;
        Ok(serde_json::from_str(&content)?)
    }
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryBackend {
    snapshot: BackendSnapshot,
}

impl InMemoryBackend {
    pub fn new(collection_url: impl Into<String>, project: impl Into<String>) -> Self {
        Self {
            snapshot: BackendSnapshot {
                collection_url: collection_url.into(),
                project: project.into(),
                ..BackendSnapshot::default()
            },
        }
    }

    pub fn from_snapshot(snapshot: BackendSnapshot) -> Self {
        Self { snapshot }
    }

    pub fn snapshot(&self) -> &BackendSnapshot {
        &self.snapshot
    }

    pub fn with_work_item(mut self, work_item: WorkItem) -> Self {
        self.snapshot.work_items.push(work_item);
        self
    }

    pub fn with_link_type(
        mut self,
        reference_name: impl Into<String>,
        forward_end: impl Into<String>,
    ) -> Self {
        self.snapshot
            .link_types
            .push((reference_name.into(), LinkEndId::new(forward_end)));
        self
    }

    pub fn with_category(mut self, category: WorkItemCategory) -> Self {
        self.snapshot.categories.push(category);
        self
    }

    pub fn with_test_plan(mut self, plan: TestPlan) -> Self {
        self.snapshot.test_plans.push(plan);
        self
    }

    pub fn with_test_point(mut self, point: TestPoint) -> Self {
        self.snapshot.test_points.push(point);
        self
    }

    pub fn with_configuration(mut self, configuration: TestConfiguration) -> Self {
        self.snapshot.configurations.push(configuration);
        self
    }

    pub fn with_test_case(mut self, test_case: TestCase) -> Self {
        self.snapshot.test_cases.push(test_case);
        self
    }

    fn is_project(&self, project: &str) -> bool {
        self.snapshot.project.eq_ignore_ascii_case(project)
    }
}

#[async_trait]
impl TestManagementBackend for InMemoryBackend {
    async fn project_exists(&self, project: &str) -> BackendResult<bool> {
        Ok(self.is_project(project))
    }

    async fn get_work_item(
        &self,
        project: &str,
        id: WorkItemId,
    ) -> BackendResult<Option<WorkItem>> {
        if !self.is_project(project) {
            return Ok(None);
        }
        Ok(self.snapshot.work_items.iter().find(|w| w.id == id).cloned())
    }

    async fn get_forward_link_end(
        &self,
        link_type_reference_name: &str,
    ) -> BackendResult<Option<LinkEndId>> {
        Ok(self
            .snapshot
            .link_types
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(link_type_reference_name))
            .map(|(_, end)| end.clone()))
    }

    async fn get_categories(&self, project: &str) -> BackendResult<Vec<WorkItemCategory>> {
        if !self.is_project(project) {
            return Ok(Vec::new());
        }
        Ok(self.snapshot.categories.clone())
    }

    async fn get_test_plans(&self, project: &str) -> BackendResult<Vec<TestPlan>> {
        if !self.is_project(project) {
            return Ok(Vec::new());
        }
        Ok(self.snapshot.test_plans.clone())
    }

    async fn query_test_points(
        &self,
        project: &str,
        plan: &TestPlan,
        test_case_ids: &[TestCaseId],
    ) -> BackendResult<Vec<TestPoint>> {
        if !self.is_project(project) {
            return Ok(Vec::new());
        }

        let wanted: BTreeSet<TestCaseId> = test_case_ids.iter().copied().collect();
        let points: Vec<TestPoint> = self
            .snapshot
            .test_points
            .iter()
            .filter(|p| p.test_plan_id == plan.id && wanted.contains(&p.test_case_id))
            .cloned()
            .collect();

        debug!("Plan {} has {} matching test point(s)", plan.id, points.len());
        Ok(points)
    }

    async fn get_test_configurations(
        &self,
        project: &str,
    ) -> BackendResult<Vec<TestConfiguration>> {
        if !self.is_project(project) {
            return Ok(Vec::new());
        }
        Ok(self.snapshot.configurations.clone())
    }

    async fn resolve_test_cases(&self, ids: &[TestCaseId]) -> BackendResult<Vec<TestCase>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.snapshot.test_cases.iter().find(|t| t.id == *id))
            .cloned()
            .collect())
    }

    fn backend_name(&self) -> &'static str {
        "in-memory"
    }
}

/// Hands out a shared [`InMemoryBackend`] for its own collection url only.
#[derive(Debug, Clone)]
pub struct InMemoryConnector {
    backend: Arc<InMemoryBackend>,
}

impl InMemoryConnector {
    pub fn new(backend: InMemoryBackend) -> Self {
        Self {
            backend: Arc::new(backend),
        }
    }
}

#[async_trait]
impl BackendConnector for InMemoryConnector {
    async fn connect(&self, collection_url: &str) -> BackendResult<Arc<dyn TestManagementBackend>> {
        let known = self.backend.snapshot.collection_url.trim_end_matches('/');
        if !known.eq_ignore_ascii_case(collection_url.trim().trim_end_matches('/')) {
            return Err(BackendError::CollectionNotFound {
                url: collection_url.to_string(),
            });
        }
        Ok(self.backend.clone())
    }
}
