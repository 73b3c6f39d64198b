//! Bulk importers
//!
//! One-off batch jobs run against a migrated database. Row-level failures
//! are tallied in the run summary and never abort the batch.

pub mod calendar;
pub mod customers;
pub mod phones;
pub mod tabular;

pub use calendar::import_events;
pub use customers::import_customers;
pub use phones::repair_phones;
pub use tabular::read_rows;

use crm_common::Error;
use serde_json::{json, Value};

/// Whether an error only concerns the row being processed
///
/// Constraint violations and validation problems skip the row; connection
/// and schema errors abort the run.
pub(crate) fn is_row_level(error: &Error) -> bool {
    match error {
        Error::Database(sqlx::Error::Database(_)) => true,
        other => !other.is_fatal(),
    }
}

/// Summary sample describing a skipped row
pub(crate) fn row_sample(line: usize, error: &Error) -> Value {
    json!({ "line": line, "error": error.to_string() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_level_classification() {
        assert!(is_row_level(&Error::Validation("bad".into())));
        assert!(!is_row_level(&Error::Database(sqlx::Error::PoolTimedOut)));
        assert!(!is_row_level(&Error::Config("x".into())));
    }
}
