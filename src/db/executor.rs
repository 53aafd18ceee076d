//! Statement execution with structured, typed results.
//!
//! A script is split into statements and executed strictly in textual order
//! on one pooled connection. The loop is fail-fast but not transactional:
//! the first statement that errors ends the run, and the effects of
//! statements that already executed are kept. (Batch mutations, which do
//! need atomicity, go through `mutation` instead.)

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use log::{debug, warn};
use tokio_postgres::Client;

use super::error::DbError;
use super::manager::SqlEngine;
use super::statement::{classify, split_statements};
use super::types::{
    CellValue, ColumnInfo, DdlResult, MutationResult, SelectResult, StatementKind,
    StructuredResult,
};

impl SqlEngine {
    /// Executes a (possibly multi-statement) SQL text against a database.
    ///
    /// # Arguments
    ///
    /// * `database` - Registered database name.
    /// * `text` - Raw SQL as typed in the editor.
    ///
    /// # Returns
    ///
    /// One result per executed statement, in textual order. When a
    /// statement fails, its `Error` result is last: the remaining
    /// statements are not executed and produce no result at all.
    ///
    /// # Errors
    ///
    /// Returns a `DbError` only for engine-level failures (unknown database
    /// name, no connection available); database-level failures are reported
    /// inside the result list.
    pub async fn execute_sql(
        &self,
        database: &str,
        text: &str,
    ) -> Result<Vec<StructuredResult>, DbError> {
        let statements = split_statements(text);
        let mut results = Vec::with_capacity(statements.len());
        if statements.is_empty() {
            return Ok(results);
        }

        let conn = self.connection(database).await?;
        for sql in &statements {
            debug!("executing sql: {}", sql);
            let result = execute_statement(&conn, sql).await;
            let failed = result.is_error();
            results.push(result);
            if failed {
                // Fail fast; earlier statements keep their effects.
                break;
            }
        }
        Ok(results)
    }
}

/// Executes a single statement, dispatching on its classified kind.
pub(crate) async fn execute_statement(client: &Client, sql: &str) -> StructuredResult {
    let started = Instant::now();
    let kind = classify(sql);
    match kind {
        StatementKind::Select => run_query(client, sql, started).await,
        StatementKind::Insert | StatementKind::Update | StatementKind::Delete => {
            match client.execute(sql, &[]).await {
                Ok(affected_rows) => StructuredResult::mutation(
                    kind,
                    MutationResult {
                        affected_rows,
                        duration_ms: elapsed_ms(started),
                    },
                ),
                Err(e) => error_result(&e, sql, started),
            }
        }
        StatementKind::Ddl => match client.batch_execute(sql).await {
            Ok(()) => StructuredResult::Ddl(DdlResult {
                duration_ms: elapsed_ms(started),
            }),
            Err(e) => error_result(&e, sql, started),
        },
    }
}

async fn run_query(client: &Client, sql: &str, started: Instant) -> StructuredResult {
    // Preparing first keeps column metadata available even for zero rows.
    let statement = match client.prepare(sql).await {
        Ok(statement) => statement,
        Err(e) => return error_result(&e, sql, started),
    };
    let rows = match client.query(&statement, &[]).await {
        Ok(rows) => rows,
        Err(e) => return error_result(&e, sql, started),
    };

    let mut data = Vec::with_capacity(rows.len());
    for row in &rows {
        let mut cells = Vec::with_capacity(statement.columns().len());
        for index in 0..statement.columns().len() {
            match row.try_get::<_, CellValue>(index) {
                Ok(cell) => cells.push(cell),
                Err(e) => return error_result(&e, sql, started),
            }
        }
        data.push(cells);
    }

    let columns = column_info(client, statement.columns()).await;
    StructuredResult::Select(SelectResult {
        row_count: data.len(),
        columns,
        rows: data,
        duration_ms: elapsed_ms(started),
    })
}

/// Column attributes of a single table, keyed by attribute number.
const COLUMN_ATTRIBUTES: &str = "\
SELECT a.attnum, a.attnotnull,
       COALESCE((SELECT i.indisprimary FROM pg_index i
                 WHERE i.indrelid = a.attrelid AND i.indisprimary
                   AND a.attnum = ANY(i.indkey)), false) AS is_primary
FROM pg_attribute a
WHERE a.attrelid = $1 AND a.attnum > 0 AND NOT a.attisdropped";

/// Builds per-column metadata for a result set.
///
/// Nullability and primary-key membership can only be attributed reliably
/// when the result set is backed by a single source table; for joins and
/// computed columns they stay unknown.
async fn column_info(
    client: &Client,
    columns: &[tokio_postgres::Column],
) -> Vec<ColumnInfo> {
    let mut infos: Vec<ColumnInfo> = columns
        .iter()
        .map(|c| ColumnInfo {
            name: c.name().to_string(),
            type_name: c.type_().name().to_string(),
            nullable: None,
            is_primary_key: false,
        })
        .collect();

    let source_tables: HashSet<u32> = columns
        .iter()
        .filter_map(|c| c.table_oid())
        .filter(|oid| *oid != 0)
        .collect();
    let Some(table_oid) = single(&source_tables) else {
        return infos;
    };

    let rows = match client.query(COLUMN_ATTRIBUTES, &[&table_oid]).await {
        Ok(rows) => rows,
        Err(e) => {
            warn!("failed to resolve column attributes: {}", e);
            return infos;
        }
    };
    let mut attributes: HashMap<i16, (bool, bool)> = HashMap::with_capacity(rows.len());
    for row in &rows {
        match (row.try_get(0), row.try_get(1), row.try_get(2)) {
            (Ok(attnum), Ok(not_null), Ok(is_primary)) => {
                attributes.insert(attnum, (not_null, is_primary));
            }
            _ => warn!("unexpected column attribute row shape"),
        }
    }

    for (info, column) in infos.iter_mut().zip(columns) {
        if column.table_oid() != Some(table_oid) {
            continue;
        }
        if let Some((not_null, is_primary)) = column
            .column_id()
            .and_then(|attnum| attributes.get(&attnum).copied())
        {
            info.nullable = Some(!not_null);
            info.is_primary_key = is_primary;
        }
    }
    infos
}

fn single(set: &HashSet<u32>) -> Option<u32> {
    if set.len() == 1 {
        set.iter().next().copied()
    } else {
        None
    }
}

fn error_result(err: &tokio_postgres::Error, sql: &str, started: Instant) -> StructuredResult {
    StructuredResult::Error(DbError::from_driver(err, sql).to_result(elapsed_ms(started)))
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}
