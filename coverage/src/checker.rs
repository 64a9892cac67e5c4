//! Coverage check orchestration.
//!
//! `check_coverage` runs the whole pipeline for one requirement:
//! 1. validate the caller's input
//! 2. connect and build the [`CoverageContext`]
//! 3. resolve TestedBy links into test cases
//! 4. fetch active plans, configurations and matching test points
//! 5. build the outcome matrix and reduce it to verdicts
//!
//! Any failure ends the run; there is no partial report.

use crate::config::CoverageConfig;
use crate::context::{CategoryTable, CoverageContext, LinkTypeRef};
use crate::error::{CoverageError, CoverageResult, MissingEntity};
use crate::links;
use crate::matrix::{self, OutcomeMatrix};
use crate::query::{self, TestPointQuery};
use crate::verdict::{self, Verdict};
use backend::{
    BackendConnector, BackendError, TestCase, TestCaseId, TestManagementBackend, TestPlan,
    TestPlanId, TestPoint, WorkItemId,
};
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RequirementSummary {
    pub id: WorkItemId,
    pub title: String,
    pub work_item_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverageReport {
    pub collection_url: String,
    pub project: String,
    pub requirement: RequirementSummary,
    pub matrix: OutcomeMatrix,
    pub test_case_verdicts: BTreeMap<TestCaseId, Verdict>,
    /// Most severe per-test-case verdict; Inconclusive when no linked test
    /// case is covered by an active plan.
    pub requirement_verdict: Verdict,
    /// Linked test cases without a test point in any active plan.
    pub uncovered_test_cases: Vec<TestCase>,
    pub generated_at: DateTime<Utc>,
}

impl CoverageReport {
    pub fn verdict_for(&self, id: TestCaseId) -> Option<Verdict> {
        self.test_case_verdicts.get(&id).copied()
    }
}

/// Validated `check_coverage` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverageRequest {
    pub collection_url: String,
    pub project: String,
    pub work_item_id: WorkItemId,
}

impl CoverageRequest {
    pub fn new(collection_url: &str, project: &str, work_item_id: i64) -> CoverageResult<Self> {
        let collection_url = collection_url.trim();
        if collection_url.is_empty() {
            return Err(CoverageError::invalid_input(
                "collection_url",
                "cannot be empty",
            ));
        }
        if !(collection_url.starts_with("http://") || collection_url.starts_with("https://")) {
            return Err(CoverageError::invalid_input(
                "collection_url",
                "must start with http:// or https://",
            ));
        }

        let project = project.trim();
        if project.is_empty() {
            return Err(CoverageError::invalid_input("project", "cannot be empty"));
        }

        if work_item_id <= 0 {
            return Err(CoverageError::invalid_input(
                "work_item_id",
                format!("must be greater than 0, got {}", work_item_id),
            ));
        }
        let work_item_id = u32::try_from(work_item_id).map_err(|_| {
            CoverageError::invalid_input(
                "work_item_id",
                format!("{} is out of range", work_item_id),
            )
        })?;

        Ok(Self {
            collection_url: collection_url.to_string(),
            project: project.to_string(),
            work_item_id: WorkItemId(work_item_id),
        })
    }
}

pub struct CoverageChecker {
    connector: Box<dyn BackendConnector>,
    config: CoverageConfig,
}

impl CoverageChecker {
    pub fn new(connector: Box<dyn BackendConnector>, config: CoverageConfig) -> CoverageResult<Self> {
        config
            .validate()
            .map_err(|message| CoverageError::InvalidConfig { message })?;
        Ok(Self { connector, config })
    }

    pub async fn check_coverage(
        &self,
        collection_url: &str,
        project: &str,
        work_item_id: i64,
    ) -> CoverageResult<CoverageReport> {
        let request = CoverageRequest::new(collection_url, project, work_item_id)?;
        info!(
            "Checking test coverage of work item {} in {} / {}",
            request.work_item_id, request.collection_url, request.project
        );

        let backend = self
            .connector
            .connect(&request.collection_url)
            .await
            .map_err(|e| match e {
                BackendError::CollectionNotFound { url } => {
                    CoverageError::not_found(MissingEntity::Collection(url))
                }
                other => CoverageError::Backend(other),
            })?;
        debug!("Using {} backend", backend.backend_name());

        let context = Self::load_context(backend.as_ref(), request).await?;
        self.evaluate(backend, &context).await
    }

    async fn load_context(
        backend: &dyn TestManagementBackend,
        request: CoverageRequest,
    ) -> CoverageResult<CoverageContext> {
        if !backend.project_exists(&request.project).await? {
            return Err(CoverageError::not_found(MissingEntity::Project(
                request.project,
            )));
        }

        let work_item = backend
            .get_work_item(&request.project, request.work_item_id)
            .await?
            .ok_or_else(|| {
                CoverageError::not_found(MissingEntity::WorkItem(request.work_item_id))
            })?;

        let categories =
            CategoryTable::from_categories(backend.get_categories(&request.project).await?)?;

        let link_type = LinkTypeRef::TestedBy.reference_name();
        let tested_by = backend
            .get_forward_link_end(link_type)
            .await?
            .ok_or_else(|| CoverageError::not_found(MissingEntity::LinkType(link_type.to_string())))?;

        let context = CoverageContext {
            collection_url: request.collection_url,
            project: request.project,
            work_item,
            categories,
            tested_by,
        };

        if !context.is_requirement() {
            warn!(
                "Work item {} is a '{}', which is not in the requirement category",
                context.work_item.id, context.work_item.work_item_type
            );
        }

        Ok(context)
    }

    async fn evaluate(
        &self,
        backend: Arc<dyn TestManagementBackend>,
        context: &CoverageContext,
    ) -> CoverageResult<CoverageReport> {
        let linked = links::resolve(&context.work_item, &context.tested_by)?;

        let linked_ids: Vec<TestCaseId> = linked.iter().copied().collect();
        let test_cases = context.retain_test_cases(backend.resolve_test_cases(&linked_ids).await?);
        let test_case_ids: BTreeSet<TestCaseId> = test_cases.iter().map(|t| t.id).collect();
        if test_case_ids.is_empty() {
            return Err(CoverageError::NoLinkedTestCases {
                work_item_id: context.work_item.id,
            });
        }

        let query = query::build(&test_case_ids, self.config.query_batch_size)?;
        debug!(
            "Test point query covers {} test case(s) in {} batch(es)",
            query.id_count(),
            query.batches().len()
        );

        let active_plans: Vec<TestPlan> = backend
            .get_test_plans(&context.project)
            .await?
            .into_iter()
            .filter(TestPlan::is_active)
            .collect();
        if active_plans.is_empty() {
            return Err(CoverageError::NoActiveTestPlans {
                project: context.project.clone(),
            });
        }
        info!("Found {} active test plan(s)", active_plans.len());

        let configurations = backend.get_test_configurations(&context.project).await?;
        let points_by_plan = self
            .fetch_points(backend, &context.project, &active_plans, &query)
            .await?;

        let matrix = matrix::build(&test_cases, &active_plans, &points_by_plan, &configurations)?;

        let mut test_case_verdicts = BTreeMap::new();
        for coverage in matrix.test_cases() {
            let case_verdict = verdict::evaluate(coverage.outcomes())?;
            debug!("Test case {} => {}", coverage.test_case.id, case_verdict);
            test_case_verdicts.insert(coverage.test_case.id, case_verdict);
        }

        let requirement_verdict = if test_case_verdicts.is_empty() {
            Verdict::Inconclusive
        } else {
            verdict::rollup(test_case_verdicts.values().copied())?
        };

        let uncovered_test_cases: Vec<TestCase> = test_cases
            .into_iter()
            .filter(|t| !matrix.contains(t.id))
            .collect();
        if !uncovered_test_cases.is_empty() {
            warn!(
                "{} linked test case(s) have no test points in an active plan",
                uncovered_test_cases.len()
            );
        }

        info!(
            "Work item {} coverage verdict: {}",
            context.work_item.id, requirement_verdict
        );

        Ok(CoverageReport {
            collection_url: context.collection_url.clone(),
            project: context.project.clone(),
            requirement: RequirementSummary {
                id: context.work_item.id,
                title: context.work_item.title.clone(),
                work_item_type: context.work_item.work_item_type.clone(),
            },
            matrix,
            test_case_verdicts,
            requirement_verdict,
            uncovered_test_cases,
            generated_at: Utc::now(),
        })
    }

    /// Queries each plan's points, up to `max_concurrent_plan_queries` plans
    /// at a time, and merges them by plan id.
    async fn fetch_points(
        &self,
        backend: Arc<dyn TestManagementBackend>,
        project: &str,
        plans: &[TestPlan],
        query: &TestPointQuery,
    ) -> CoverageResult<BTreeMap<TestPlanId, Vec<TestPoint>>> {
        let results: Vec<(TestPlanId, CoverageResult<Vec<TestPoint>>)> = stream::iter(plans)
            .map(|plan| {
                let backend = backend.clone();
                async move {
                    let points =
                        Self::fetch_plan_points(backend.as_ref(), project, plan, query).await;
                    (plan.id, points)
                }
            })
            .buffer_unordered(self.config.max_concurrent_plan_queries)
            .collect()
            .await;

        let mut failures: BTreeMap<TestPlanId, CoverageError> = BTreeMap::new();
        let mut points_by_plan = BTreeMap::new();
        for (plan_id, result) in results {
            match result {
                Ok(points) => {
                    points_by_plan.insert(plan_id, points);
                }
                Err(e) => {
                    failures.insert(plan_id, e);
                }
            }
        }

        // Report the lowest failing plan id so repeated runs fail the same way.
        if let Some((_, error)) = failures.into_iter().next() {
            return Err(error);
        }

        Ok(points_by_plan)
    }

    async fn fetch_plan_points(
        backend: &dyn TestManagementBackend,
        project: &str,
        plan: &TestPlan,
        query: &TestPointQuery,
    ) -> CoverageResult<Vec<TestPoint>> {
        let mut points = Vec::new();
        for batch in query.batches() {
            debug!("Plan {}: {}", plan.id, batch.to_query_text());
            let batch_points = backend
                .query_test_points(project, plan, batch.ids())
                .await
                .map_err(|source| CoverageError::PlanQueryFailed {
                    plan_id: plan.id,
                    plan_name: plan.name.clone(),
                    source,
                })?;
            points.extend(batch_points);
        }

        debug!(
            "Plan {} ({}) returned {} test point(s)",
            plan.id,
            plan.name,
            points.len()
        );
        Ok(points)
    }
}
