//! Schema introspection and table-design operations.
//!
//! `get_table_schema` reads a table back into the declarative
//! [`TableDesign`] the designer edits; `create_table` and `alter_table`
//! apply generated DDL. Applied DDL runs inside one transaction, so an
//! "apply" from the designer either fully succeeds or leaves the table
//! untouched.

use log::{debug, warn};
use tokio_postgres::Row;

use super::ddl::{generate_alter_statements, generate_create_table};
use super::error::DbError;
use super::manager::SqlEngine;
use super::types::{
    ColumnDef, ConstraintDef, ConstraintKind, IndexDef, ReferentialAction, TableChanges,
    TableDesign,
};
use crate::constants::SYSTEM_SCHEMAS;

// information_schema columns are domain types (sql_identifier,
// cardinal_number, yes_or_no); cast to base types for the driver.
const COLUMNS_QUERY: &str = "\
SELECT column_name::text, data_type::text, udt_name::text,
       character_maximum_length::int4, numeric_precision::int4,
       numeric_scale::int4, is_nullable::text, column_default::text
FROM information_schema.columns
WHERE table_schema::text = $1 AND table_name::text = $2
ORDER BY ordinal_position";

const CONSTRAINTS_QUERY: &str = "\
SELECT con.conname,
       con.contype::text,
       ARRAY(SELECT att.attname::text
             FROM unnest(con.conkey) WITH ORDINALITY AS k(attnum, ord)
             JOIN pg_attribute att
               ON att.attrelid = con.conrelid AND att.attnum = k.attnum
             ORDER BY k.ord) AS columns,
       refns.nspname::text AS ref_schema,
       refrel.relname::text AS ref_table,
       ARRAY(SELECT att.attname::text
             FROM unnest(con.confkey) WITH ORDINALITY AS k(attnum, ord)
             JOIN pg_attribute att
               ON att.attrelid = con.confrelid AND att.attnum = k.attnum
             ORDER BY k.ord) AS ref_columns,
       con.confdeltype::text,
       con.confupdtype::text,
       CASE WHEN con.contype = 'c'
            THEN pg_get_expr(con.conbin, con.conrelid)
       END AS check_expression
FROM pg_constraint con
JOIN pg_class rel ON rel.oid = con.conrelid
JOIN pg_namespace ns ON ns.oid = rel.relnamespace
LEFT JOIN pg_class refrel ON refrel.oid = con.confrelid
LEFT JOIN pg_namespace refns ON refns.oid = refrel.relnamespace
WHERE ns.nspname = $1 AND rel.relname = $2
ORDER BY con.conname";

const INDEXES_QUERY: &str = "\
SELECT idx.relname AS index_name,
       am.amname AS method,
       ix.indisunique,
       ARRAY(SELECT pg_get_indexdef(ix.indexrelid, k + 1, true)
             FROM generate_series(0, ix.indnatts - 1) AS k
             ORDER BY k) AS columns
FROM pg_index ix
JOIN pg_class idx ON idx.oid = ix.indexrelid
JOIN pg_class tbl ON tbl.oid = ix.indrelid
JOIN pg_namespace ns ON ns.oid = tbl.relnamespace
JOIN pg_am am ON am.oid = idx.relam
WHERE ns.nspname = $1 AND tbl.relname = $2
  AND NOT EXISTS (SELECT 1 FROM pg_constraint c WHERE c.conindid = ix.indexrelid)
ORDER BY idx.relname";

impl SqlEngine {
    /// Reads a table's current design from the system catalogs.
    ///
    /// Columns come back in ordinal order, constraints and indexes ordered
    /// by name, so the same table always produces the same design.
    ///
    /// # Errors
    ///
    /// Returns a translated `DbError` when the database is unreachable or
    /// the catalog queries fail.
    pub async fn get_table_schema(
        &self,
        database: &str,
        schema: &str,
        table: &str,
    ) -> Result<TableDesign, DbError> {
        let conn = self.connection(database).await?;

        let columns = conn
            .query(COLUMNS_QUERY, &[&schema, &table])
            .await
            .map_err(|e| DbError::from_driver(&e, COLUMNS_QUERY))?
            .iter()
            .map(column_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        let mut constraints = Vec::new();
        for row in conn
            .query(CONSTRAINTS_QUERY, &[&schema, &table])
            .await
            .map_err(|e| DbError::from_driver(&e, CONSTRAINTS_QUERY))?
        {
            match constraint_from_row(&row)? {
                Some(constraint) => constraints.push(constraint),
                None => debug!("skipping constraint of unsupported type on {}.{}", schema, table),
            }
        }

        let indexes = conn
            .query(INDEXES_QUERY, &[&schema, &table])
            .await
            .map_err(|e| DbError::from_driver(&e, INDEXES_QUERY))?
            .iter()
            .map(index_from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TableDesign {
            table_name: table.to_string(),
            schema: schema.to_string(),
            columns,
            constraints,
            indexes,
        })
    }

    /// Lists the user-visible schemas of a database.
    pub async fn list_schemas(&self, database: &str) -> Result<Vec<String>, DbError> {
        const SQL: &str = "\
SELECT schema_name::text FROM information_schema.schemata
WHERE schema_name::text <> ALL($1) AND schema_name NOT LIKE 'pg_toast%'
  AND schema_name NOT LIKE 'pg_temp%'
ORDER BY schema_name";
        let conn = self.connection(database).await?;
        let system: Vec<&str> = SYSTEM_SCHEMAS.to_vec();
        let rows = conn
            .query(SQL, &[&system])
            .await
            .map_err(|e| DbError::from_driver(&e, SQL))?;
        Ok(rows.iter().filter_map(|r| r.try_get(0).ok()).collect())
    }

    /// Lists the base tables of a schema.
    pub async fn list_tables(&self, database: &str, schema: &str) -> Result<Vec<String>, DbError> {
        const SQL: &str = "\
SELECT table_name::text FROM information_schema.tables
WHERE table_schema::text = $1 AND table_type::text = 'BASE TABLE'
ORDER BY table_name";
        let conn = self.connection(database).await?;
        let rows = conn
            .query(SQL, &[&schema])
            .await
            .map_err(|e| DbError::from_driver(&e, SQL))?;
        Ok(rows.iter().filter_map(|r| r.try_get(0).ok()).collect())
    }

    /// Creates a table (and its indexes) from a design, atomically.
    ///
    /// # Errors
    ///
    /// Returns the translated error of the failing statement; nothing of
    /// the design persists in that case.
    pub async fn create_table(&self, database: &str, design: &TableDesign) -> Result<(), DbError> {
        let statements = generate_create_table(design);
        self.apply_ddl(database, &statements).await?;
        debug!("created table {}.{}", design.schema, design.table_name);
        Ok(())
    }

    /// Applies a set of computed design changes to a table, atomically.
    ///
    /// An empty change set is a no-op success.
    pub async fn alter_table(
        &self,
        database: &str,
        schema: &str,
        table: &str,
        changes: &TableChanges,
    ) -> Result<(), DbError> {
        if changes.is_empty() {
            return Ok(());
        }
        let statements = generate_alter_statements(schema, table, changes);
        self.apply_ddl(database, &statements).await?;
        debug!("altered table {}.{}", schema, table);
        Ok(())
    }

    /// Runs generated DDL statements inside one transaction.
    async fn apply_ddl(&self, database: &str, statements: &[String]) -> Result<(), DbError> {
        let mut conn = self.connection(database).await?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| DbError::from_driver(&e, ""))?;

        for sql in statements {
            debug!("applying ddl: {}", sql);
            if let Err(e) = tx.batch_execute(sql).await {
                let err = DbError::from_driver(&e, sql);
                if let Err(rollback_err) = tx.rollback().await {
                    warn!("rollback after failed ddl also failed: {}", rollback_err);
                }
                return Err(err);
            }
        }
        tx.commit()
            .await
            .map_err(|e| DbError::from_driver(&e, ""))
    }
}

fn column_from_row(row: &Row) -> Result<ColumnDef, DbError> {
    let name: String = get(row, 0)?;
    let data_type: String = get(row, 1)?;
    let udt_name: String = get(row, 2)?;
    let max_length: Option<i32> = get(row, 3)?;
    let precision: Option<i32> = get(row, 4)?;
    let scale: Option<i32> = get(row, 5)?;
    let is_nullable: String = get(row, 6)?;
    let default: Option<String> = get(row, 7)?;

    // Arrays and user-defined types only carry a usable name in udt_name.
    let data_type = match data_type.as_str() {
        "ARRAY" | "USER-DEFINED" => udt_name,
        _ => data_type,
    };
    // Integer types report their bit precision; only numeric keeps it as a
    // designer-editable attribute.
    let (precision, scale) = if data_type == "numeric" {
        (
            precision.map(|p| p as u32),
            scale.filter(|s| *s != 0).map(|s| s as u32),
        )
    } else {
        (None, None)
    };

    Ok(ColumnDef {
        name,
        data_type,
        length: max_length.map(|l| l as u32),
        precision,
        scale,
        nullable: is_nullable == "YES",
        default,
        unique: false,
    })
}

fn constraint_from_row(row: &Row) -> Result<Option<ConstraintDef>, DbError> {
    let name: String = get(row, 0)?;
    let contype: String = get(row, 1)?;
    let columns: Vec<String> = get(row, 2)?;
    let ref_schema: Option<String> = get(row, 3)?;
    let ref_table: Option<String> = get(row, 4)?;
    let ref_columns: Vec<String> = get(row, 5)?;
    let on_delete: Option<String> = get(row, 6)?;
    let on_update: Option<String> = get(row, 7)?;
    let check_expression: Option<String> = get(row, 8)?;

    let kind = match contype.as_str() {
        "p" => ConstraintKind::PrimaryKey,
        "f" => ConstraintKind::ForeignKey,
        "u" => ConstraintKind::Unique,
        "c" => ConstraintKind::Check,
        // Exclusion and trigger constraints are not designer-editable.
        _ => return Ok(None),
    };
    let is_foreign = kind == ConstraintKind::ForeignKey;

    Ok(Some(ConstraintDef {
        name,
        kind,
        columns,
        ref_schema: ref_schema.filter(|_| is_foreign),
        ref_table: ref_table.filter(|_| is_foreign),
        ref_columns: if is_foreign { ref_columns } else { Vec::new() },
        on_delete: on_delete.as_deref().and_then(referential_action).filter(|_| is_foreign),
        on_update: on_update.as_deref().and_then(referential_action).filter(|_| is_foreign),
        check_expression,
    }))
}

fn index_from_row(row: &Row) -> Result<IndexDef, DbError> {
    Ok(IndexDef {
        name: get(row, 0)?,
        method: get(row, 1)?,
        unique: get(row, 2)?,
        columns: {
            let columns: Vec<String> = get(row, 3)?;
            columns.into_iter().filter(|c| !c.is_empty()).collect()
        },
    })
}

fn referential_action(code: &str) -> Option<ReferentialAction> {
    match code {
        "a" => Some(ReferentialAction::NoAction),
        "r" => Some(ReferentialAction::Restrict),
        "c" => Some(ReferentialAction::Cascade),
        "n" => Some(ReferentialAction::SetNull),
        "d" => Some(ReferentialAction::SetDefault),
        _ => None,
    }
}

fn get<'a, T>(row: &'a Row, index: usize) -> Result<T, DbError>
where
    T: tokio_postgres::types::FromSql<'a>,
{
    row.try_get(index)
        .map_err(|e| DbError::from_driver(&e, ""))
}
