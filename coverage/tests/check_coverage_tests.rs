//! End-to-end tests for `CoverageChecker::check_coverage` against
//! snapshot-backed and scripted backends.

use async_trait::async_trait;
use backend::prelude::*;
use coverage::{
    CoverageChecker, CoverageConfig, CoverageError, MissingEntity, Verdict,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const COLLECTION: &str = "http://tfsserver.local:8080/tfs/DefaultCollection";
const PROJECT: &str = "Fabrikam";
const TESTED_BY: &str = "Microsoft.VSTS.Common.TestedBy";
const TESTED_BY_FORWARD: &str = "Microsoft.VSTS.Common.TestedBy-Forward";

fn categories() -> Vec<WorkItemCategory> {
    vec![
        WorkItemCategory::new(
            "Microsoft.RequirementCategory",
            "Requirement Category",
            &["User Story"],
        ),
        WorkItemCategory::new("Microsoft.TestCaseCategory", "Test Case Category", &["Test Case"]),
        WorkItemCategory::new("Microsoft.BugCategory", "Bug Category", &["Bug"]),
    ]
}

/// Project with categories, the TestedBy link type and two configurations,
/// but no work items or plans.
fn base_backend() -> InMemoryBackend {
    let mut backend = InMemoryBackend::new(COLLECTION, PROJECT)
        .with_link_type(TESTED_BY, TESTED_BY_FORWARD)
        .with_configuration(TestConfiguration::new(1, "Default", true))
        .with_configuration(TestConfiguration::new(2, "Chrome", false));
    for category in categories() {
        backend = backend.with_category(category);
    }
    backend
}

fn requirement(id: u32, linked: &[u32]) -> WorkItem {
    linked.iter().fold(
        WorkItem::new(id, "Customers can check out", "User Story"),
        |item, target| item.with_link(WorkItemLink::new(TESTED_BY_FORWARD, *target)),
    )
}

/// R1 → {T1, T2}; P1 has T1 under Default (Passed) and Chrome (Failed); T2
/// only has points in an inactive plan.
fn scenario_backend() -> InMemoryBackend {
    base_backend()
        .with_work_item(requirement(1, &[101, 102]))
        .with_test_case(TestCase::new(101, "Checkout with card"))
        .with_test_case(TestCase::new(102, "Checkout with voucher"))
        .with_test_plan(TestPlan::new(10, "P1", TestPlanState::Active))
        .with_test_plan(TestPlan::new(11, "Old release", TestPlanState::Inactive))
        .with_test_point(TestPoint::new(1, 101, 10, 1).with_outcome(Outcome::Passed))
        .with_test_point(TestPoint::new(2, 101, 10, 2).with_outcome(Outcome::Failed))
        .with_test_point(TestPoint::new(3, 102, 11, 1).with_outcome(Outcome::Passed))
}

fn checker(backend: InMemoryBackend) -> CoverageChecker {
    CoverageChecker::new(
        Box::new(InMemoryConnector::new(backend)),
        CoverageConfig::default(),
    )
    .unwrap()
}

#[tokio::test]
async fn test_requirement_scenario() {
    let report = checker(scenario_backend())
        .check_coverage(COLLECTION, PROJECT, 1)
        .await
        .unwrap();

    assert_eq!(report.matrix.len(), 1);
    let t1 = report.matrix.get(WorkItemId(101)).unwrap();
    assert_eq!(t1.plans.len(), 1);
    assert_eq!(t1.plans[&TestPlanId(10)].configurations.len(), 2);

    assert!(!report.matrix.contains(WorkItemId(102)));
    assert_eq!(report.uncovered_test_cases.len(), 1);
    assert_eq!(report.uncovered_test_cases[0].id, WorkItemId(102));

    assert_eq!(report.verdict_for(WorkItemId(101)), Some(Verdict::Failed));
    assert_eq!(report.verdict_for(WorkItemId(102)), None);
    assert_eq!(report.requirement_verdict, Verdict::Failed);
    assert_eq!(report.requirement.title, "Customers can check out");
}

#[tokio::test]
async fn test_rollup_across_test_cases() {
    let backend = base_backend()
        .with_work_item(requirement(1, &[101, 102, 103]))
        .with_test_case(TestCase::new(101, "A"))
        .with_test_case(TestCase::new(102, "B"))
        .with_test_case(TestCase::new(103, "C"))
        .with_test_plan(TestPlan::new(10, "Sprint 3", TestPlanState::Active))
        .with_test_plan(TestPlan::new(20, "Regression", TestPlanState::Active))
        .with_test_point(TestPoint::new(1, 101, 10, 1).with_outcome(Outcome::Passed))
        .with_test_point(TestPoint::new(2, 102, 10, 1).with_outcome(Outcome::Passed))
        .with_test_point(TestPoint::new(3, 102, 20, 2))
        .with_test_point(TestPoint::new(4, 103, 20, 1).with_outcome(Outcome::Passed));

    let report = checker(backend)
        .check_coverage(COLLECTION, PROJECT, 1)
        .await
        .unwrap();

    assert_eq!(report.verdict_for(WorkItemId(101)), Some(Verdict::Passed));
    assert_eq!(report.verdict_for(WorkItemId(102)), Some(Verdict::Inconclusive));
    assert_eq!(report.verdict_for(WorkItemId(103)), Some(Verdict::Passed));
    assert_eq!(report.requirement_verdict, Verdict::Inconclusive);
    assert!(report.uncovered_test_cases.is_empty());
}

#[tokio::test]
async fn test_all_passed() {
    let backend = base_backend()
        .with_work_item(requirement(1, &[101]))
        .with_test_case(TestCase::new(101, "A"))
        .with_test_plan(TestPlan::new(10, "Sprint 3", TestPlanState::Active))
        .with_test_point(TestPoint::new(1, 101, 10, 1).with_outcome(Outcome::Passed))
        .with_test_point(TestPoint::new(2, 101, 10, 2).with_outcome(Outcome::Passed));

    let report = checker(backend)
        .check_coverage(COLLECTION, PROJECT, 1)
        .await
        .unwrap();
    assert_eq!(report.requirement_verdict, Verdict::Passed);
}

#[tokio::test]
async fn test_no_active_plan_coverage_is_inconclusive() {
    let backend = base_backend()
        .with_work_item(requirement(1, &[101]))
        .with_test_case(TestCase::new(101, "A"))
        .with_test_plan(TestPlan::new(10, "Sprint 3", TestPlanState::Active))
        .with_test_plan(TestPlan::new(11, "Sprint 2", TestPlanState::Inactive))
        .with_test_point(TestPoint::new(1, 101, 11, 1).with_outcome(Outcome::Passed));

    let report = checker(backend)
        .check_coverage(COLLECTION, PROJECT, 1)
        .await
        .unwrap();

    assert!(report.matrix.is_empty());
    assert!(report.test_case_verdicts.is_empty());
    assert_eq!(report.requirement_verdict, Verdict::Inconclusive);
    assert_eq!(report.uncovered_test_cases.len(), 1);
}

#[tokio::test]
async fn test_no_linked_test_cases() {
    let backend = base_backend()
        .with_work_item(
            WorkItem::new(1, "Orphan", "User Story")
                .with_link(WorkItemLink::new("System.LinkTypes.Related-Forward", 5)),
        )
        .with_test_plan(TestPlan::new(10, "Sprint 3", TestPlanState::Active));

    let result = checker(backend).check_coverage(COLLECTION, PROJECT, 1).await;
    match result {
        Err(CoverageError::NoLinkedTestCases { work_item_id }) => {
            assert_eq!(work_item_id, WorkItemId(1))
        }
        other => panic!("expected NoLinkedTestCases, got {:?}", other),
    }
}

#[tokio::test]
async fn test_links_to_non_test_cases_do_not_count() {
    let mut task = TestCase::new(101, "Not a test");
    task.work_item_type = "Task".to_string();

    let backend = base_backend()
        .with_work_item(requirement(1, &[101]))
        .with_test_case(task)
        .with_test_plan(TestPlan::new(10, "Sprint 3", TestPlanState::Active));

    let result = checker(backend).check_coverage(COLLECTION, PROJECT, 1).await;
    assert!(matches!(result, Err(CoverageError::NoLinkedTestCases { .. })));
}

#[tokio::test]
async fn test_no_active_test_plans() {
    let backend = base_backend()
        .with_work_item(requirement(1, &[101]))
        .with_test_case(TestCase::new(101, "A"))
        .with_test_plan(TestPlan::new(11, "Sprint 2", TestPlanState::Inactive))
        .with_test_plan(TestPlan::new(12, "Draft", TestPlanState::Other("InPlanning".into())));

    match checker(backend).check_coverage(COLLECTION, PROJECT, 1).await {
        Err(CoverageError::NoActiveTestPlans { project }) => assert_eq!(project, PROJECT),
        other => panic!("expected NoActiveTestPlans, got {:?}", other),
    }
}

#[tokio::test]
async fn test_unknown_configuration_is_a_consistency_error() {
    let backend = InMemoryBackend::new(COLLECTION, PROJECT)
        .with_link_type(TESTED_BY, TESTED_BY_FORWARD)
        .with_work_item(requirement(1, &[101]))
        .with_test_case(TestCase::new(101, "A"))
        .with_test_plan(TestPlan::new(10, "Sprint 3", TestPlanState::Active))
        .with_test_point(TestPoint::new(9, 101, 10, 7).with_outcome(Outcome::Passed));
    let backend = categories()
        .into_iter()
        .fold(backend, |b, c| b.with_category(c));

    match checker(backend).check_coverage(COLLECTION, PROJECT, 1).await {
        Err(CoverageError::MissingConfiguration {
            configuration_id, ..
        }) => assert_eq!(configuration_id, ConfigurationId(7)),
        other => panic!("expected MissingConfiguration, got {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_entities_are_named() {
    let result = checker(scenario_backend())
        .check_coverage("http://tfsserver.local:8080/tfs/Other", PROJECT, 1)
        .await;
    assert!(matches!(
        result,
        Err(CoverageError::NotFound {
            entity: MissingEntity::Collection(_)
        })
    ));

    let result = checker(scenario_backend())
        .check_coverage(COLLECTION, "Contoso", 1)
        .await;
    match result {
        Err(CoverageError::NotFound {
            entity: MissingEntity::Project(name),
        }) => assert_eq!(name, "Contoso"),
        other => panic!("expected missing project, got {:?}", other),
    }

    let result = checker(scenario_backend())
        .check_coverage(COLLECTION, PROJECT, 999)
        .await;
    match result {
        Err(CoverageError::NotFound {
            entity: MissingEntity::WorkItem(id),
        }) => assert_eq!(id, WorkItemId(999)),
        other => panic!("expected missing work item, got {:?}", other),
    }

    let no_link_type = InMemoryBackend::new(COLLECTION, PROJECT)
        .with_work_item(requirement(1, &[101]));
    let no_link_type = categories()
        .into_iter()
        .fold(no_link_type, |b, c| b.with_category(c));
    let result = checker(no_link_type)
        .check_coverage(COLLECTION, PROJECT, 1)
        .await;
    match result {
        Err(CoverageError::NotFound {
            entity: MissingEntity::LinkType(name),
        }) => assert_eq!(name, TESTED_BY),
        other => panic!("expected missing link type, got {:?}", other),
    }

    let no_categories = InMemoryBackend::new(COLLECTION, PROJECT)
        .with_link_type(TESTED_BY, TESTED_BY_FORWARD)
        .with_work_item(requirement(1, &[101]));
    let result = checker(no_categories)
        .check_coverage(COLLECTION, PROJECT, 1)
        .await;
    assert!(matches!(
        result,
        Err(CoverageError::NotFound {
            entity: MissingEntity::Category(_)
        })
    ));
}

#[tokio::test]
async fn test_small_batches_and_sequential_fetch_agree() {
    let mut backend = base_backend()
        .with_test_plan(TestPlan::new(10, "A", TestPlanState::Active))
        .with_test_plan(TestPlan::new(20, "B", TestPlanState::Active));
    let linked: Vec<u32> = (101..=125).collect();
    backend = backend.with_work_item(requirement(1, &linked));
    for id in &linked {
        let outcome = if id % 7 == 0 {
            Outcome::Blocked
        } else {
            Outcome::Passed
        };
        backend = backend
            .with_test_case(TestCase::new(*id, format!("Case {}", id)))
            .with_test_point(TestPoint::new(*id, *id, 10 + 10 * (id % 2), 1).with_outcome(outcome));
    }

    let batched = CoverageChecker::new(
        Box::new(InMemoryConnector::new(backend.clone())),
        CoverageConfig::new()
            .with_query_batch_size(4)
            .with_max_concurrent_plan_queries(1),
    )
    .unwrap()
    .check_coverage(COLLECTION, PROJECT, 1)
    .await
    .unwrap();

    let default = checker(backend)
        .check_coverage(COLLECTION, PROJECT, 1)
        .await
        .unwrap();

    assert_eq!(batched.matrix, default.matrix);
    assert_eq!(batched.test_case_verdicts, default.test_case_verdicts);
    assert_eq!(batched.matrix.len(), linked.len());
    assert_eq!(default.requirement_verdict, Verdict::Failed);
}

/// Delegates to an [`InMemoryBackend`], counting calls and failing the
/// point query for one plan.
struct ScriptedBackend {
    inner: InMemoryBackend,
    failing_plans: Vec<TestPlanId>,
    calls: Arc<AtomicUsize>,
}

#[async_trait]
impl TestManagementBackend for ScriptedBackend {
    async fn project_exists(&self, project: &str) -> BackendResult<bool> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.project_exists(project).await
    }

    async fn get_work_item(
        &self,
        project: &str,
        id: WorkItemId,
    ) -> BackendResult<Option<WorkItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_work_item(project, id).await
    }

    async fn get_forward_link_end(
        &self,
        link_type_reference_name: &str,
    ) -> BackendResult<Option<LinkEndId>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_forward_link_end(link_type_reference_name).await
    }

    async fn get_categories(&self, project: &str) -> BackendResult<Vec<WorkItemCategory>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_categories(project).await
    }

    async fn get_test_plans(&self, project: &str) -> BackendResult<Vec<TestPlan>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_test_plans(project).await
    }

    async fn query_test_points(
        &self,
        project: &str,
        plan: &TestPlan,
        test_case_ids: &[TestCaseId],
    ) -> BackendResult<Vec<TestPoint>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing_plans.contains(&plan.id) {
            return Err(BackendError::ServiceUnavailable {
                message: "Request timeout".to_string(),
            });
        }
        self.inner.query_test_points(project, plan, test_case_ids).await
    }

    async fn get_test_configurations(
        &self,
        project: &str,
    ) -> BackendResult<Vec<TestConfiguration>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_test_configurations(project).await
    }

    async fn resolve_test_cases(&self, ids: &[TestCaseId]) -> BackendResult<Vec<TestCase>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.resolve_test_cases(ids).await
    }

    fn backend_name(&self) -> &'static str {
        "scripted"
    }
}

struct ScriptedConnector {
    backend: Arc<ScriptedBackend>,
    connects: Arc<AtomicUsize>,
}

#[async_trait]
impl BackendConnector for ScriptedConnector {
    async fn connect(&self, _collection_url: &str) -> BackendResult<Arc<dyn TestManagementBackend>> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.backend.clone())
    }
}

fn scripted(failing_plans: &[u32]) -> (CoverageChecker, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let connects = Arc::new(AtomicUsize::new(0));
    let backend = scenario_backend()
        .with_test_plan(TestPlan::new(30, "Nightly", TestPlanState::Active))
        .with_test_point(TestPoint::new(50, 102, 30, 1).with_outcome(Outcome::Passed));

    let connector = ScriptedConnector {
        backend: Arc::new(ScriptedBackend {
            inner: backend,
            failing_plans: failing_plans.iter().copied().map(TestPlanId).collect(),
            calls: calls.clone(),
        }),
        connects: connects.clone(),
    };
    let checker = CoverageChecker::new(Box::new(connector), CoverageConfig::default()).unwrap();
    (checker, calls, connects)
}

#[tokio::test]
async fn test_invalid_input_is_rejected_before_any_backend_call() {
    let (checker, calls, connects) = scripted(&[]);

    for (url, project, id) in [
        ("", PROJECT, 1),
        (COLLECTION, "  ", 1),
        (COLLECTION, PROJECT, 0),
        (COLLECTION, PROJECT, -3),
    ] {
        let result = checker.check_coverage(url, project, id).await;
        assert!(
            matches!(result, Err(CoverageError::InvalidInput { .. })),
            "({:?}, {:?}, {}) gave {:?}",
            url,
            project,
            id,
            result
        );
    }

    assert_eq!(connects.load(Ordering::SeqCst), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_plan_query_failure_names_the_plan() {
    let (checker, _, _) = scripted(&[30]);

    match checker.check_coverage(COLLECTION, PROJECT, 1).await {
        Err(CoverageError::PlanQueryFailed {
            plan_id, plan_name, ..
        }) => {
            assert_eq!(plan_id, TestPlanId(30));
            assert_eq!(plan_name, "Nightly");
        }
        other => panic!("expected PlanQueryFailed, got {:?}", other),
    }
}

#[tokio::test]
async fn test_lowest_failing_plan_is_reported_when_every_plan_fails() {
    let (checker, _, _) = scripted(&[10, 30]);

    for _ in 0..20 {
        match checker.check_coverage(COLLECTION, PROJECT, 1).await {
            Err(CoverageError::PlanQueryFailed {
                plan_id, plan_name, ..
            }) => {
                assert_eq!(plan_id, TestPlanId(10));
                assert_eq!(plan_name, "P1");
            }
            other => panic!("expected PlanQueryFailed, got {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_points_from_several_active_plans_are_merged() {
    let (checker, calls, connects) = scripted(&[]);

    let report = checker.check_coverage(COLLECTION, PROJECT, 1).await.unwrap();

    assert_eq!(connects.load(Ordering::SeqCst), 1);
    assert!(calls.load(Ordering::SeqCst) > 0);
    assert_eq!(report.matrix.len(), 2);
    assert_eq!(report.verdict_for(WorkItemId(102)), Some(Verdict::Passed));
    assert_eq!(report.requirement_verdict, Verdict::Failed);
    assert!(report.uncovered_test_cases.is_empty());
}

#[tokio::test]
async fn test_repeated_runs_produce_identical_matrices() {
    let checker = checker(scenario_backend());

    let first = checker.check_coverage(COLLECTION, PROJECT, 1).await.unwrap();
    let second = checker.check_coverage(COLLECTION, PROJECT, 1).await.unwrap();

    assert_eq!(first.matrix, second.matrix);
    assert_eq!(first.test_case_verdicts, second.test_case_verdicts);
    assert_eq!(first.requirement_verdict, second.requirement_verdict);
}
