// ABOUTME: Whole-run precondition: every source table must exist in the target
// ABOUTME: Evaluated once, before any row counts are taken

use std::collections::HashSet;

use crate::error::SyncError;

/// Fail with the full list of source tables the target lacks.
///
/// Names are compared exactly (case-sensitive). The returned list keeps the
/// source listing order. Tables that exist only in the target are logged and
/// otherwise ignored.
pub fn check_tables_match(
    source_tables: &[String],
    target_tables: &[String],
) -> Result<(), SyncError> {
    let target: HashSet<&str> = target_tables.iter().map(String::as_str).collect();
    let missing: Vec<String> = source_tables
        .iter()
        .filter(|t| !target.contains(t.as_str()))
        .cloned()
        .collect();

    if !missing.is_empty() {
        return Err(SyncError::MissingTables(missing));
    }

    let source: HashSet<&str> = source_tables.iter().map(String::as_str).collect();
    let extra: Vec<&str> = target_tables
        .iter()
        .map(String::as_str)
        .filter(|t| !source.contains(t))
        .collect();
    if !extra.is_empty() {
        tracing::warn!(
            "Target database has tables not present in source (ignored): {}",
            extra.join(", ")
        );
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(tables: &[&str]) -> Vec<String> {
        tables.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn test_identical_sets_pass() {
        assert!(check_tables_match(&names(&["users", "orders"]), &names(&["orders", "users"])).is_ok());
    }

    #[test]
    fn test_missing_tables_listed_in_source_order() {
        let err = check_tables_match(
            &names(&["users", "audit_log", "orders", "events"]),
            &names(&["orders", "users"]),
        )
        .unwrap_err();

        assert_eq!(
            err,
            SyncError::MissingTables(names(&["audit_log", "events"]))
        );
    }

    #[test]
    fn test_extra_target_tables_allowed() {
        assert!(check_tables_match(&names(&["users"]), &names(&["users", "tmp_import"])).is_ok());
    }

    #[test]
    fn test_names_are_case_sensitive() {
        let err = check_tables_match(&names(&["Users"]), &names(&["users"])).unwrap_err();
        assert_eq!(err, SyncError::MissingTables(names(&["Users"])));
    }
}
