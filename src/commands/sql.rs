//!
//! Commands for running editor SQL and saving grid edits.
//!
//! ## Overview
//!
//! - **Execution**: `execute_sql` runs raw editor text, one result per
//!   statement, fail-fast on the first error.
//! - **Batch mutation**: `batch_update_rows`, `batch_insert_rows` and
//!   `batch_delete_rows` apply grid edits atomically.
//!
//! Results and errors are plain serializable values; the frontend renders
//! them without further interpretation.

use indexmap::IndexMap;

use crate::db::{CellValue, MutationSummary, RowUpdate, SqlEngine, StructuredResult};
use crate::error::{EngineError, Result};

/// Executes a (possibly multi-statement) SQL text.
///
/// # Arguments
///
/// - `engine` - The shared engine instance.
/// - `database` - Registered database name.
/// - `sql` - Raw SQL text from the editor.
///
/// # Returns
///
/// One `StructuredResult` per executed statement, in textual order. A
/// failing statement contributes the final `Error` result; statements after
/// it are not executed. Statements already run keep their effects.
///
/// # Errors
///
/// Returns an `EngineError` when the database name is unknown or no
/// connection could be acquired.
pub async fn execute_sql(
    engine: &SqlEngine,
    database: &str,
    sql: &str,
) -> Result<Vec<StructuredResult>> {
    engine
        .execute_sql(database, sql)
        .await
        .map_err(EngineError::Db)
}

/// Applies a batch of row updates to one table, all-or-nothing.
///
/// # Arguments
///
/// - `updates` - Rows to change, each identified by its primary-key values;
///   every entry must carry at least one changed column.
///
/// # Returns
///
/// The affected-row count of the committed batch.
///
/// # Errors
///
/// Returns an `EngineError` when any row fails; the transaction is rolled
/// back and no change persists.
pub async fn batch_update_rows(
    engine: &SqlEngine,
    database: &str,
    schema: &str,
    table: &str,
    updates: Vec<RowUpdate>,
) -> Result<MutationSummary> {
    engine
        .batch_update_rows(database, schema, table, &updates)
        .await
        .map_err(EngineError::Db)
}

/// Inserts a batch of new rows into one table, all-or-nothing.
pub async fn batch_insert_rows(
    engine: &SqlEngine,
    database: &str,
    schema: &str,
    table: &str,
    rows: Vec<IndexMap<String, CellValue>>,
) -> Result<MutationSummary> {
    engine
        .batch_insert_rows(database, schema, table, &rows)
        .await
        .map_err(EngineError::Db)
}

/// Deletes a batch of rows from one table, all-or-nothing.
///
/// # Arguments
///
/// - `primary_keys` - One primary-key map per row to delete.
pub async fn batch_delete_rows(
    engine: &SqlEngine,
    database: &str,
    schema: &str,
    table: &str,
    primary_keys: Vec<IndexMap<String, CellValue>>,
) -> Result<MutationSummary> {
    engine
        .batch_delete_rows(database, schema, table, &primary_keys)
        .await
        .map_err(EngineError::Db)
}
