//!
//! Commands backing the table designer and the navigation tree.

use crate::db::{ddl, SqlEngine, TableChanges, TableDesign};
use crate::error::{EngineError, Result};

/// Reads the current design of a table for the designer's edit mode.
pub async fn get_table_schema(
    engine: &SqlEngine,
    database: &str,
    schema: &str,
    table: &str,
) -> Result<TableDesign> {
    engine
        .get_table_schema(database, schema, table)
        .await
        .map_err(EngineError::Db)
}

/// Creates a table from a designer draft.
///
/// # Errors
///
/// Returns an `EngineError` when any generated statement fails; nothing of
/// the design persists in that case.
pub async fn create_table(
    engine: &SqlEngine,
    database: &str,
    design: TableDesign,
) -> Result<()> {
    engine
        .create_table(database, &design)
        .await
        .map_err(EngineError::Db)
}

/// Applies computed designer changes to an existing table.
///
/// The frontend previews the same statements through
/// [`preview_alter_table`] before invoking this.
pub async fn alter_table(
    engine: &SqlEngine,
    database: &str,
    schema: &str,
    table: &str,
    changes: TableChanges,
) -> Result<()> {
    engine
        .alter_table(database, schema, table, &changes)
        .await
        .map_err(EngineError::Db)
}

/// Computes the change set between the saved design and the edited one.
///
/// Pure function of its inputs; neither design is modified.
pub fn diff_table_designs(original: &TableDesign, modified: &TableDesign) -> TableChanges {
    ddl::diff(original, modified)
}

/// Renders the CREATE TABLE script for a designer draft, for preview.
pub fn preview_create_table(design: &TableDesign) -> Vec<String> {
    ddl::generate_create_table(design)
}

/// Renders the ALTER script for a change set, for preview.
pub fn preview_alter_table(schema: &str, table: &str, changes: &TableChanges) -> Vec<String> {
    ddl::generate_alter_statements(schema, table, changes)
}

/// Lists the user schemas of a database for the navigation tree.
pub async fn list_schemas(engine: &SqlEngine, database: &str) -> Result<Vec<String>> {
    engine.list_schemas(database).await.map_err(EngineError::Db)
}

/// Lists the base tables of a schema for the navigation tree.
pub async fn list_tables(
    engine: &SqlEngine,
    database: &str,
    schema: &str,
) -> Result<Vec<String>> {
    engine
        .list_tables(database, schema)
        .await
        .map_err(EngineError::Db)
}

/// Checks that a registered database is reachable.
pub async fn test_connection(engine: &SqlEngine, database: &str) -> Result<()> {
    engine.test_connection(database).await.map_err(EngineError::Db)
}
