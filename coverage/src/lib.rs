pub mod checker;
pub mod config;
pub mod context;
pub mod error;
pub mod links;
pub mod matrix;
pub mod query;
pub mod report;
pub mod verdict;

pub use checker::{CoverageChecker, CoverageReport, CoverageRequest, RequirementSummary};
pub use config::{AppConfig, CoverageConfig};
pub use context::{CategoryRef, CategoryTable, CoverageContext, LinkTypeRef};
pub use error::{CoverageError, CoverageResult, MissingEntity};
pub use matrix::{ConfigurationOutcome, OutcomeMatrix, PlanCoverage, TestCaseCoverage};
pub use query::{QueryBatch, TestPointQuery};
pub use report::{render, render_text, ReportFormat};
pub use verdict::Verdict;
