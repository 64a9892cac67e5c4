use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            pub fn get(self) -> u32 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                Self(value)
            }
        }
    };
}

numeric_id!(
    /// Identifier of any work item in the store.
    WorkItemId
);
numeric_id!(TestPlanId);
numeric_id!(ConfigurationId);
numeric_id!(TestPointId);

/// Test cases are work items, so they share the work item id space.
pub type TestCaseId = WorkItemId;

/// Identifier of one end of a link type, e.g. `Microsoft.VSTS.Common.TestedBy-Forward`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LinkEndId(pub String);

impl LinkEndId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Link end ids compare case-insensitively in the work item store.
    pub fn matches(&self, other: &str) -> bool {
        self.0.eq_ignore_ascii_case(other)
    }
}

impl fmt::Display for LinkEndId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemLink {
    pub link_end: LinkEndId,
    pub target: WorkItemId,
}

impl WorkItemLink {
    pub fn new(link_end: impl Into<String>, target: u32) -> Self {
        Self {
            link_end: LinkEndId::new(link_end),
            target: WorkItemId(target),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    pub id: WorkItemId,
    pub title: String,
    pub work_item_type: String,
    pub links: Vec<WorkItemLink>,
}

impl WorkItem {
    pub fn new(id: u32, title: impl Into<String>, work_item_type: impl Into<String>) -> Self {
        Self {
            id: WorkItemId(id),
            title: title.into(),
            work_item_type: work_item_type.into(),
            links: Vec::new(),
        }
    }

    pub fn with_link(mut self, link: WorkItemLink) -> Self {
        self.links.push(link);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    pub id: TestCaseId,
    pub title: String,
    pub work_item_type: String,
}

impl TestCase {
    pub fn new(id: u32, title: impl Into<String>) -> Self {
        Self {
            id: WorkItemId(id),
            title: title.into(),
            work_item_type: "Test Case".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TestPlanState {
    Active,
    Inactive,
    Other(String),
}

impl TestPlanState {
    pub fn parse(state: &str) -> Self {
        if state.eq_ignore_ascii_case("active") {
            Self::Active
        } else if state.eq_ignore_ascii_case("inactive") {
            Self::Inactive
        } else {
            Self::Other(state.to_string())
        }
    }
}

impl fmt::Display for TestPlanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => f.write_str("Active"),
            Self::Inactive => f.write_str("Inactive"),
            Self::Other(state) => f.write_str(state),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPlan {
    pub id: TestPlanId,
    pub name: String,
    pub state: TestPlanState,
}

impl TestPlan {
    pub fn new(id: u32, name: impl Into<String>, state: TestPlanState) -> Self {
        Self {
            id: TestPlanId(id),
            name: name.into(),
            state,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == TestPlanState::Active
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestConfiguration {
    pub id: ConfigurationId,
    pub name: String,
    pub is_default: bool,
}

impl TestConfiguration {
    pub fn new(id: u32, name: impl Into<String>, is_default: bool) -> Self {
        Self {
            id: ConfigurationId(id),
            name: name.into(),
            is_default,
        }
    }
}

/// Result classification of the most recent execution of a test point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Outcome {
    None,
    NotExecuted,
    Passed,
    Failed,
    Inconclusive,
    Warning,
    Aborted,
    Error,
    Blocked,
    Timeout,
}

impl Outcome {
    pub const ALL: [Outcome; 10] = [
        Outcome::None,
        Outcome::NotExecuted,
        Outcome::Passed,
        Outcome::Failed,
        Outcome::Inconclusive,
        Outcome::Warning,
        Outcome::Aborted,
        Outcome::Error,
        Outcome::Blocked,
        Outcome::Timeout,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::None => "None",
            Outcome::NotExecuted => "NotExecuted",
            Outcome::Passed => "Passed",
            Outcome::Failed => "Failed",
            Outcome::Inconclusive => "Inconclusive",
            Outcome::Warning => "Warning",
            Outcome::Aborted => "Aborted",
            Outcome::Error => "Error",
            Outcome::Blocked => "Blocked",
            Outcome::Timeout => "Timeout",
        }
    }

    /// Maps server outcome names onto the closed set. States that carry no
    /// completed result (`InProgress`, `Paused`, `NotApplicable`, ...) and
    /// anything unrecognised become `None`.
    pub fn from_server(value: &str) -> Self {
        value.parse().unwrap_or(Outcome::None)
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Outcome::ALL
            .into_iter()
            .find(|outcome| outcome.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown outcome: {}", s))
    }
}

/// Planned execution of one test case under one configuration in one plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestPoint {
    pub id: TestPointId,
    pub test_case_id: TestCaseId,
    pub test_plan_id: TestPlanId,
    pub configuration_id: ConfigurationId,
    /// `None` when the point has never been run.
    pub most_recent_outcome: Option<Outcome>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl TestPoint {
    pub fn new(id: u32, test_case_id: u32, test_plan_id: u32, configuration_id: u32) -> Self {
        Self {
            id: TestPointId(id),
            test_case_id: WorkItemId(test_case_id),
            test_plan_id: TestPlanId(test_plan_id),
            configuration_id: ConfigurationId(configuration_id),
            most_recent_outcome: None,
            last_updated: None,
        }
    }

    pub fn with_outcome(mut self, outcome: Outcome) -> Self {
        self.most_recent_outcome = Some(outcome);
        self
    }

    pub fn with_last_updated(mut self, last_updated: DateTime<Utc>) -> Self {
        self.last_updated = Some(last_updated);
        self
    }
}

/// A work item category, e.g. `Microsoft.RequirementCategory`, and the
/// work item types that belong to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItemCategory {
    pub reference_name: String,
    pub name: String,
    pub work_item_types: Vec<String>,
}

impl WorkItemCategory {
    pub fn new(
        reference_name: impl Into<String>,
        name: impl Into<String>,
        work_item_types: &[&str],
    ) -> Self {
        Self {
            reference_name: reference_name.into(),
            name: name.into(),
            work_item_types: work_item_types.iter().map(|t| t.to_string()).collect(),
        }
    }

    pub fn contains_type(&self, work_item_type: &str) -> bool {
        self.work_item_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(work_item_type))
    }
}
