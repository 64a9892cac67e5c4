pub mod azure;
pub mod config;
pub mod memory;
pub mod provider;
pub mod types;

pub use azure::{AzureDevOpsBackend, AzureDevOpsConnector};
pub use config::AzureDevOpsConfig;
pub use memory::{BackendSnapshot, InMemoryBackend, InMemoryConnector};
pub use provider::{BackendConnector, BackendError, BackendResult, TestManagementBackend};
pub use types::{
    ConfigurationId, LinkEndId, Outcome, TestCase, TestCaseId, TestConfiguration, TestPlan,
    TestPlanId, TestPlanState, TestPoint, TestPointId, WorkItem, WorkItemCategory, WorkItemId,
    WorkItemLink,
};

pub mod prelude {
    pub use crate::azure::*;
    pub use crate::config::*;
    pub use crate::memory::*;
    pub use crate::provider::*;
    pub use crate::types::*;
}
