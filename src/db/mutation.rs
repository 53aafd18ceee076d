//! Transactional batch mutations.
//!
//! Each batch runs on one pooled connection inside one transaction: rows are
//! written strictly in submission order, the first failure rolls the whole
//! batch back, and only a fully successful batch commits. Partial success is
//! never observable from outside the transaction.
//!
//! Statements are built with quoted identifiers and bound `$n` parameters;
//! cell values never pass through string interpolation.

use std::time::Instant;

use indexmap::IndexMap;
use log::{info, warn};
use rust_i18n::t;
use tokio_postgres::types::ToSql;

use super::ddl::{qualified, quote_ident};
use super::error::DbError;
use super::manager::SqlEngine;
use super::types::{CellValue, MutationSummary, RowUpdate};

type Params<'a> = Vec<&'a (dyn ToSql + Sync)>;

impl SqlEngine {
    /// Applies a batch of single-row updates to one table, atomically.
    ///
    /// # Arguments
    ///
    /// * `database` - Registered database name.
    /// * `schema` / `table` - The target table.
    /// * `updates` - Rows to change, each identified by its primary-key
    ///   values.
    ///
    /// # Returns
    ///
    /// The number of rows affected by the committed batch.
    ///
    /// # Errors
    ///
    /// Returns the translated error of the first failing row; the
    /// transaction is rolled back and no change of the batch persists.
    pub async fn batch_update_rows(
        &self,
        database: &str,
        schema: &str,
        table: &str,
        updates: &[RowUpdate],
    ) -> Result<MutationSummary, DbError> {
        for row in updates {
            if row.changes.is_empty() {
                return Err(DbError::InvalidData(t!("db.empty_changes").to_string()));
            }
            if row.primary_key.is_empty() {
                return Err(DbError::InvalidData(t!("db.empty_primary_key").to_string()));
            }
        }

        self.run_batch(database, updates.len(), |row_index| {
            build_update(schema, table, &updates[row_index])
        })
        .await
        .inspect(|summary| {
            info!(
                "committed batch update of {} rows on {}.{}",
                summary.affected_rows, schema, table
            );
        })
    }

    /// Inserts a batch of rows into one table, atomically.
    ///
    /// An empty column map inserts a row of defaults.
    pub async fn batch_insert_rows(
        &self,
        database: &str,
        schema: &str,
        table: &str,
        rows: &[IndexMap<String, CellValue>],
    ) -> Result<MutationSummary, DbError> {
        self.run_batch(database, rows.len(), |row_index| {
            build_insert(schema, table, &rows[row_index])
        })
        .await
        .inspect(|summary| {
            info!(
                "committed batch insert of {} rows into {}.{}",
                summary.affected_rows, schema, table
            );
        })
    }

    /// Deletes a batch of rows from one table, atomically.
    pub async fn batch_delete_rows(
        &self,
        database: &str,
        schema: &str,
        table: &str,
        primary_keys: &[IndexMap<String, CellValue>],
    ) -> Result<MutationSummary, DbError> {
        for key in primary_keys {
            if key.is_empty() {
                return Err(DbError::InvalidData(t!("db.empty_primary_key").to_string()));
            }
        }

        self.run_batch(database, primary_keys.len(), |row_index| {
            build_delete(schema, table, &primary_keys[row_index])
        })
        .await
        .inspect(|summary| {
            info!(
                "committed batch delete of {} rows from {}.{}",
                summary.affected_rows, schema, table
            );
        })
    }

    /// Shared transaction loop of the three batch operations.
    ///
    /// Empty batches are a no-op success and never open a transaction.
    async fn run_batch<'a, F>(
        &self,
        database: &str,
        row_count: usize,
        build: F,
    ) -> Result<MutationSummary, DbError>
    where
        F: Fn(usize) -> (String, Params<'a>),
    {
        let started = Instant::now();
        if row_count == 0 {
            return Ok(MutationSummary {
                affected_rows: 0,
                duration_ms: elapsed_ms(started),
            });
        }

        let mut conn = self.connection(database).await?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| DbError::from_driver(&e, ""))?;

        let mut affected = 0u64;
        for row_index in 0..row_count {
            let (sql, params) = build(row_index);
            match tx.execute(sql.as_str(), &params).await {
                Ok(n) => affected += n,
                Err(e) => {
                    let err = DbError::from_driver(&e, &sql);
                    if let Err(rollback_err) = tx.rollback().await {
                        warn!(
                            "rollback after failed batch row also failed: {}",
                            rollback_err
                        );
                    }
                    return Err(err);
                }
            }
        }

        tx.commit()
            .await
            .map_err(|e| DbError::from_driver(&e, ""))?;
        Ok(MutationSummary {
            affected_rows: affected,
            duration_ms: elapsed_ms(started),
        })
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    started.elapsed().as_millis() as u64
}

fn build_update<'a>(schema: &str, table: &str, row: &'a RowUpdate) -> (String, Params<'a>) {
    let mut sql = format!("UPDATE {} SET ", qualified(schema, table));
    let mut params: Params<'a> = Vec::with_capacity(row.changes.len() + row.primary_key.len());

    for (i, (column, value)) in row.changes.iter().enumerate() {
        if i > 0 {
            sql.push_str(", ");
        }
        sql.push_str(&quote_ident(column));
        sql.push_str(&format!(" = ${}", params.len() + 1));
        params.push(value);
    }

    sql.push_str(" WHERE ");
    append_key_filter(&mut sql, &mut params, &row.primary_key);
    (sql, params)
}

fn build_insert<'a>(
    schema: &str,
    table: &str,
    row: &'a IndexMap<String, CellValue>,
) -> (String, Params<'a>) {
    if row.is_empty() {
        return (
            format!("INSERT INTO {} DEFAULT VALUES", qualified(schema, table)),
            Vec::new(),
        );
    }

    let columns: Vec<String> = row.keys().map(|c| quote_ident(c)).collect();
    let placeholders: Vec<String> = (1..=row.len()).map(|i| format!("${}", i)).collect();
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        qualified(schema, table),
        columns.join(", "),
        placeholders.join(", ")
    );
    let params: Params<'a> = row.values().map(|v| v as &(dyn ToSql + Sync)).collect();
    (sql, params)
}

fn build_delete<'a>(
    schema: &str,
    table: &str,
    key: &'a IndexMap<String, CellValue>,
) -> (String, Params<'a>) {
    let mut sql = format!("DELETE FROM {} WHERE ", qualified(schema, table));
    let mut params: Params<'a> = Vec::with_capacity(key.len());
    append_key_filter(&mut sql, &mut params, key);
    (sql, params)
}

fn append_key_filter<'a>(
    sql: &mut String,
    params: &mut Params<'a>,
    key: &'a IndexMap<String, CellValue>,
) {
    for (i, (column, value)) in key.iter().enumerate() {
        if i > 0 {
            sql.push_str(" AND ");
        }
        sql.push_str(&quote_ident(column));
        sql.push_str(&format!(" = ${}", params.len() + 1));
        params.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, CellValue)]) -> IndexMap<String, CellValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn update_numbers_parameters_across_set_and_where() {
        let row = RowUpdate {
            primary_key: map(&[("id", CellValue::Int(1)), ("org", CellValue::Int(2))]),
            changes: map(&[
                ("name", CellValue::Text("A".to_string())),
                ("active", CellValue::Bool(true)),
            ]),
        };
        let (sql, params) = build_update("public", "users", &row);
        assert_eq!(
            sql,
            "UPDATE \"public\".\"users\" SET \"name\" = $1, \"active\" = $2 \
             WHERE \"id\" = $3 AND \"org\" = $4"
        );
        assert_eq!(params.len(), 4);
    }

    #[test]
    fn insert_lists_columns_in_declared_order() {
        let row = map(&[
            ("id", CellValue::Int(1)),
            ("name", CellValue::Text("A".to_string())),
        ]);
        let (sql, params) = build_insert("public", "users", &row);
        assert_eq!(
            sql,
            "INSERT INTO \"public\".\"users\" (\"id\", \"name\") VALUES ($1, $2)"
        );
        assert_eq!(params.len(), 2);
    }

    #[test]
    fn empty_insert_uses_default_values() {
        let row = map(&[]);
        let (sql, params) = build_insert("public", "users", &row);
        assert_eq!(sql, "INSERT INTO \"public\".\"users\" DEFAULT VALUES");
        assert!(params.is_empty());
    }

    #[test]
    fn delete_filters_on_every_key_column() {
        let key = map(&[("id", CellValue::Int(9))]);
        let (sql, params) = build_delete("sales", "orders", &key);
        assert_eq!(sql, "DELETE FROM \"sales\".\"orders\" WHERE \"id\" = $1");
        assert_eq!(params.len(), 1);
    }

    #[test]
    fn identifiers_with_quotes_are_doubled() {
        let key = map(&[("we\"ird", CellValue::Int(1))]);
        let (sql, _) = build_delete("public", "ta\"ble", &key);
        assert_eq!(
            sql,
            "DELETE FROM \"public\".\"ta\"\"ble\" WHERE \"we\"\"ird\" = $1"
        );
    }
}
