//! Test point selection predicate.
//!
//! A [`TestPointQuery`] means "test case id is one of these ids". The id set
//! is split into batches so a backend with a request-size limit can send
//! one request per batch.

use crate::error::{CoverageError, CoverageResult};
use backend::TestCaseId;
use std::collections::BTreeSet;

const QUERY_PREFIX: &str = "SELECT * FROM TestPoint WHERE TestCaseId IN (";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryBatch {
    ids: Vec<TestCaseId>,
}

impl QueryBatch {
    pub fn ids(&self) -> &[TestCaseId] {
        &self.ids
    }

    /// Text form of the batch predicate, built in a single pre-sized buffer.
    pub fn to_query_text(&self) -> String {
        // u32 ids are at most 10 digits, plus ", ".
        let mut text = String::with_capacity(QUERY_PREFIX.len() + self.ids.len() * 12 + 1);
        text.push_str(QUERY_PREFIX);
        for (i, id) in self.ids.iter().enumerate() {
            if i > 0 {
                text.push_str(", ");
            }
            text.push_str(&id.to_string());
        }
        text.push(')');
        text
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestPointQuery {
    batches: Vec<QueryBatch>,
}

impl TestPointQuery {
    pub fn batches(&self) -> &[QueryBatch] {
        &self.batches
    }

    /// Number of test case ids across all batches.
    pub fn id_count(&self) -> usize {
        self.batches.iter().map(|batch| batch.ids.len()).sum()
    }
}

/// Splits `ids` into ascending batches of at most `batch_size` ids.
pub fn build(ids: &BTreeSet<TestCaseId>, batch_size: usize) -> CoverageResult<TestPointQuery> {
    if ids.is_empty() {
        return Err(CoverageError::invariant(
            "test point query requested for an empty test case set",
        ));
    }
    if batch_size == 0 {
        return Err(CoverageError::InvalidConfig {
            message: "Query batch size must be greater than 0".to_string(),
        });
    }

    let ordered: Vec<TestCaseId> = ids.iter().copied().collect();
    let batches = ordered
        .chunks(batch_size)
        .map(|chunk| QueryBatch {
            ids: chunk.to_vec(),
        })
        .collect();

    Ok(TestPointQuery { batches })
}
