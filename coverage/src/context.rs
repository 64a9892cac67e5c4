//! Per-run context.
//!
//! Everything fetched once before aggregation starts (the project, the
//! requirement work item, the category table, the TestedBy link end)
//! lives in a [`CoverageContext`] that is passed explicitly to each step.

use crate::error::{CoverageError, CoverageResult, MissingEntity};
use backend::{LinkEndId, TestCase, WorkItem, WorkItemCategory};
use tracing::warn;

/// Work item categories a coverage run depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CategoryRef {
    Requirement,
    TestCase,
    Bug,
}

impl CategoryRef {
    pub fn reference_name(&self) -> &'static str {
        match self {
            CategoryRef::Requirement => "Microsoft.RequirementCategory",
            CategoryRef::TestCase => "Microsoft.TestCaseCategory",
            CategoryRef::Bug => "Microsoft.BugCategory",
        }
    }
}

/// Link types a coverage run depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkTypeRef {
    TestedBy,
}

impl LinkTypeRef {
    pub fn reference_name(&self) -> &'static str {
        match self {
            LinkTypeRef::TestedBy => "Microsoft.VSTS.Common.TestedBy",
        }
    }
}

/// Categories resolved by [`CategoryRef`], validated once on construction.
#[derive(Debug, Clone)]
pub struct CategoryTable {
    requirement: WorkItemCategory,
    test_case: WorkItemCategory,
    bug: WorkItemCategory,
}

impl CategoryTable {
    /// Fails with `NotFound` naming the first required category the project lacks.
    pub fn from_categories(available: Vec<WorkItemCategory>) -> CoverageResult<Self> {
        Ok(Self {
            requirement: Self::find(&available, CategoryRef::Requirement)?,
            test_case: Self::find(&available, CategoryRef::TestCase)?,
            bug: Self::find(&available, CategoryRef::Bug)?,
        })
    }

    fn find(available: &[WorkItemCategory], category_ref: CategoryRef) -> CoverageResult<WorkItemCategory> {
        let reference_name = category_ref.reference_name();
        available
            .iter()
            .find(|c| c.reference_name.eq_ignore_ascii_case(reference_name))
            .cloned()
            .ok_or_else(|| {
                CoverageError::not_found(MissingEntity::Category(reference_name.to_string()))
            })
    }

    pub fn get(&self, category_ref: CategoryRef) -> &WorkItemCategory {
        match category_ref {
            CategoryRef::Requirement => &self.requirement,
            CategoryRef::TestCase => &self.test_case,
            CategoryRef::Bug => &self.bug,
        }
    }

    /// Requirement types, with bug types excluded since some process
    /// templates place bugs in the requirement category.
    pub fn is_requirement_type(&self, work_item_type: &str) -> bool {
        self.get(CategoryRef::Requirement).contains_type(work_item_type)
            && !self.get(CategoryRef::Bug).contains_type(work_item_type)
    }

    pub fn is_test_case_type(&self, work_item_type: &str) -> bool {
        self.get(CategoryRef::TestCase).contains_type(work_item_type)
    }
}

#[derive(Debug, Clone)]
pub struct CoverageContext {
    pub collection_url: String,
    pub project: String,
    pub work_item: WorkItem,
    pub categories: CategoryTable,
    pub tested_by: LinkEndId,
}

impl CoverageContext {
    /// Drops linked items that are not test cases, logging each one.
    pub fn retain_test_cases(&self, resolved: Vec<TestCase>) -> Vec<TestCase> {
        resolved
            .into_iter()
            .filter(|case| {
                let keep = self.categories.is_test_case_type(&case.work_item_type);
                if !keep {
                    warn!(
                        "Work item {} ('{}') is linked as a test but is a '{}'",
                        case.id, case.title, case.work_item_type
                    );
                }
                keep
            })
            .collect()
    }

    pub fn is_requirement(&self) -> bool {
        self.categories
            .is_requirement_type(&self.work_item.work_item_type)
    }
}
