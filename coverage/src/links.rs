use crate::error::{CoverageError, CoverageResult};
use backend::{LinkEndId, TestCaseId, WorkItem};
use std::collections::BTreeSet;
use tracing::debug;

/// Collects the distinct targets of `work_item`'s links through `forward_end`.
pub fn resolve(work_item: &WorkItem, forward_end: &LinkEndId) -> CoverageResult<BTreeSet<TestCaseId>> {
    let targets: BTreeSet<TestCaseId> = work_item
        .links
        .iter()
        .filter(|link| forward_end.matches(link.link_end.as_str()))
        .map(|link| link.target)
        .collect();

    if targets.is_empty() {
        return Err(CoverageError::NoLinkedTestCases {
            work_item_id: work_item.id,
        });
    }

    debug!(
        "Work item {} links {} test case(s) through {}",
        work_item.id,
        targets.len(),
        forward_end
    );
    Ok(targets)
}
