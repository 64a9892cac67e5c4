//! Outcome matrix: test case → test plan → configuration → outcome.

use crate::error::{CoverageError, CoverageResult};
use backend::{
    ConfigurationId, Outcome, TestCase, TestCaseId, TestConfiguration, TestPlan, TestPlanId,
    TestPoint, TestPointId,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigurationOutcome {
    pub configuration: TestConfiguration,
    pub outcome: Outcome,
    /// The test point the outcome was read from.
    pub test_point_id: TestPointId,
    pub last_updated: Option<DateTime<Utc>>,
}

impl ConfigurationOutcome {
    fn recency(&self) -> (Option<DateTime<Utc>>, TestPointId) {
        (self.last_updated, self.test_point_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanCoverage {
    pub plan: TestPlan,
    pub configurations: BTreeMap<ConfigurationId, ConfigurationOutcome>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCaseCoverage {
    pub test_case: TestCase,
    pub plans: BTreeMap<TestPlanId, PlanCoverage>,
}

impl TestCaseCoverage {
    /// Every outcome across all plans and configurations.
    pub fn outcomes(&self) -> impl Iterator<Item = Outcome> + '_ {
        self.plans
            .values()
            .flat_map(|plan| plan.configurations.values().map(|c| c.outcome))
    }
}

/// Only test cases with at least one test point in an active plan are keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct OutcomeMatrix {
    entries: BTreeMap<TestCaseId, TestCaseCoverage>,
}

impl OutcomeMatrix {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: TestCaseId) -> Option<&TestCaseCoverage> {
        self.entries.get(&id)
    }

    pub fn contains(&self, id: TestCaseId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TestCaseId, &TestCaseCoverage)> {
        self.entries.iter()
    }

    pub fn test_cases(&self) -> impl Iterator<Item = &TestCaseCoverage> {
        self.entries.values()
    }
}

/// Joins test points against the resolved test cases, the active plans and
/// the configurations.
///
/// Points for test cases outside `test_cases` and for plans outside
/// `active_plans` are skipped. When several points land on the same
/// (test case, plan, configuration) the most recently updated one wins,
/// ties going to the higher point id.
pub fn build(
    test_cases: &[TestCase],
    active_plans: &[TestPlan],
    points_by_plan: &BTreeMap<TestPlanId, Vec<TestPoint>>,
    configurations: &[TestConfiguration],
) -> CoverageResult<OutcomeMatrix> {
    let cases: BTreeMap<TestCaseId, &TestCase> =
        test_cases.iter().map(|case| (case.id, case)).collect();
    let configs: BTreeMap<ConfigurationId, &TestConfiguration> = configurations
        .iter()
        .map(|config| (config.id, config))
        .collect();

    let mut entries: BTreeMap<TestCaseId, TestCaseCoverage> = BTreeMap::new();

    for plan in active_plans {
        if !plan.is_active() {
            warn!("Skipping plan {} ({}) in state {}", plan.id, plan.name, plan.state);
            continue;
        }

        let Some(points) = points_by_plan.get(&plan.id) else {
            continue;
        };

        for point in points {
            if point.test_plan_id != plan.id {
                continue;
            }
            let Some(test_case) = cases.get(&point.test_case_id) else {
                continue;
            };

            let configuration = configs.get(&point.configuration_id).ok_or(
                CoverageError::MissingConfiguration {
                    configuration_id: point.configuration_id,
                    test_point_id: point.id,
                },
            )?;

            let candidate = ConfigurationOutcome {
                configuration: (*configuration).clone(),
                outcome: point.most_recent_outcome.unwrap_or(Outcome::None),
                test_point_id: point.id,
                last_updated: point.last_updated,
            };

            let plan_coverage = entries
                .entry(test_case.id)
                .or_insert_with(|| TestCaseCoverage {
                    test_case: (*test_case).clone(),
                    plans: BTreeMap::new(),
                })
                .plans
                .entry(plan.id)
                .or_insert_with(|| PlanCoverage {
                    plan: plan.clone(),
                    configurations: BTreeMap::new(),
                });

            match plan_coverage.configurations.entry(configuration.id) {
                Entry::Vacant(slot) => {
                    slot.insert(candidate);
                }
                Entry::Occupied(mut slot) => {
                    if candidate.recency() > slot.get().recency() {
                        slot.insert(candidate);
                    }
                }
            }
        }
    }

    debug!(
        "Outcome matrix covers {} of {} test case(s)",
        entries.len(),
        cases.len()
    );
    Ok(OutcomeMatrix { entries })
}
