#[cfg(test)]
mod tests {
    use crate::logger::setup_test_logger;

    #[small_ctor::ctor]
    unsafe fn init() {
        let _ = setup_test_logger();
    }
}

use std::sync::Arc;

use crate::db::{ConnectionConfig, PoolManager, SqlEngine};

/// Builds an engine wired to a local test database registration.
///
/// The connection is never opened by unit tests; the ignored live tests
/// below do reach a server and take their settings from `PGDECK_TEST_*`
/// variables.
pub fn test_engine() -> SqlEngine {
    let pools = Arc::new(PoolManager::new());
    pools.register(
        "test",
        ConnectionConfig {
            host: std::env::var("PGDECK_TEST_HOST").unwrap_or_else(|_| "localhost".to_string()),
            port: 5432,
            user: std::env::var("PGDECK_TEST_USER").unwrap_or_else(|_| "postgres".to_string()),
            password: std::env::var("PGDECK_TEST_PASSWORD").unwrap_or_default(),
            dbname: std::env::var("PGDECK_TEST_DBNAME").unwrap_or_else(|_| "postgres".to_string()),
            pool_size: 2,
        },
    );
    SqlEngine::new(pools)
}

/// End-to-end checks against a running server. All of them are ignored by
/// default; run with `cargo test -- --ignored` against a disposable
/// database.
mod live {
    #![allow(dead_code)]

    use indexmap::IndexMap;

    use super::test_engine;
    use crate::db::{
        CellValue, ConstraintViolationKind, DbError, RowUpdate, StructuredResult,
    };

    fn row(pairs: &[(&str, CellValue)]) -> IndexMap<String, CellValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn first_int(result: &StructuredResult) -> i64 {
        match result {
            StructuredResult::Select(select) => match &select.rows[0][0] {
                CellValue::Int(value) => *value,
                other => panic!("expected an integer cell, got {:?}", other),
            },
            other => panic!("expected a select result, got {:?}", other),
        }
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL server, see PGDECK_TEST_* variables"]
    async fn multi_statement_execution_is_fail_fast_but_not_transactional() {
        let engine = test_engine();
        engine
            .execute_sql(
                "test",
                "DROP TABLE IF EXISTS ff_rows; DROP TABLE IF EXISTS ff_sentinel;
                 CREATE TABLE ff_rows(id int PRIMARY KEY)",
            )
            .await
            .unwrap();

        let results = engine
            .execute_sql(
                "test",
                "INSERT INTO ff_rows VALUES (1); SELECT no_such_column;
                 CREATE TABLE ff_sentinel(id int)",
            )
            .await
            .unwrap();
        // Exactly two results: the statement after the failure never ran.
        assert_eq!(results.len(), 2);
        assert!(results[1].is_error());

        // The insert before the failure kept its effect.
        let count = engine
            .execute_sql("test", "SELECT count(*)::int8 FROM ff_rows")
            .await
            .unwrap();
        assert_eq!(first_int(&count[0]), 1);

        // The sentinel table was never created.
        let sentinel = engine
            .execute_sql("test", "SELECT count(*) FROM ff_sentinel")
            .await
            .unwrap();
        assert!(sentinel[0].is_error());
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL server, see PGDECK_TEST_* variables"]
    async fn failed_batch_update_rolls_back_every_row() {
        let engine = test_engine();
        engine
            .execute_sql(
                "test",
                "DROP TABLE IF EXISTS batch_rows;
                 CREATE TABLE batch_rows(id int PRIMARY KEY, name text);
                 INSERT INTO batch_rows VALUES (1, 'before'), (2, 'before')",
            )
            .await
            .unwrap();

        let updates = vec![
            RowUpdate {
                primary_key: row(&[("id", CellValue::Int(1))]),
                changes: row(&[("name", CellValue::Text("after".to_string()))]),
            },
            RowUpdate {
                primary_key: row(&[("id", CellValue::Int(2))]),
                changes: row(&[("bad_col", CellValue::Null)]),
            },
        ];
        let err = engine
            .batch_update_rows("test", "public", "batch_rows", &updates)
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::ObjectNotFound(_)), "got {:?}", err);

        // Row 1 still holds its pre-batch value: nothing partial committed.
        let check = engine
            .execute_sql(
                "test",
                "SELECT count(*)::int8 FROM batch_rows WHERE name = 'before'",
            )
            .await
            .unwrap();
        assert_eq!(first_int(&check[0]), 2);
    }

    #[tokio::test]
    #[ignore = "requires a PostgreSQL server, see PGDECK_TEST_* variables"]
    async fn unique_violation_is_categorized_with_technical_detail() {
        let engine = test_engine();
        engine
            .execute_sql(
                "test",
                "DROP TABLE IF EXISTS uniq_rows;
                 CREATE TABLE uniq_rows(id int PRIMARY KEY);
                 INSERT INTO uniq_rows VALUES (1)",
            )
            .await
            .unwrap();

        let results = engine
            .execute_sql("test", "INSERT INTO uniq_rows VALUES (1)")
            .await
            .unwrap();
        match &results[0] {
            StructuredResult::Error(error) => {
                assert_eq!(error.code, "23505");
                assert!(error.technical_detail.contains("uniq_rows"));
                assert_ne!(error.message, error.technical_detail);
            }
            other => panic!("expected an error result, got {:?}", other),
        }

        // The same code surfaces as a typed constraint violation on the
        // batch path.
        let err = engine
            .batch_insert_rows(
                "test",
                "public",
                "uniq_rows",
                &[row(&[("id", CellValue::Int(1))])],
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::ConstraintViolation {
                kind: ConstraintViolationKind::Unique,
                ..
            }
        ));
    }
}
