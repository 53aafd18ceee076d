//! DDL generation for the table designer.
//!
//! Everything in this module is a pure function of its inputs: the same
//! design always renders to byte-identical statement text, and the diff of
//! two designs never mutates either of them. The emitted order is fixed so
//! the designer's preview, the executed script and the tests all agree.

use super::types::{
    ColumnDef, ConstraintDef, ConstraintKind, IndexDef, ModifiedColumn, TableChanges, TableDesign,
};

/// Quotes an identifier, doubling embedded quotes.
pub(crate) fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Renders a schema-qualified table name.
pub(crate) fn qualified(schema: &str, table: &str) -> String {
    format!("{}.{}", quote_ident(schema), quote_ident(table))
}

/// Renders a column's type with its optional length or precision/scale.
fn render_type(column: &ColumnDef) -> String {
    if let Some(length) = column.length {
        return format!("{}({})", column.data_type, length);
    }
    match (column.precision, column.scale) {
        (Some(precision), Some(scale)) => format!("{}({},{})", column.data_type, precision, scale),
        (Some(precision), None) => format!("{}({})", column.data_type, precision),
        _ => column.data_type.clone(),
    }
}

/// Renders one column definition as it appears inside CREATE TABLE.
fn render_column(column: &ColumnDef) -> String {
    let mut text = format!("{} {}", quote_ident(&column.name), render_type(column));
    if !column.nullable {
        text.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        text.push_str(&format!(" DEFAULT {}", default));
    }
    if column.unique {
        text.push_str(" UNIQUE");
    }
    text
}

fn render_column_list(columns: &[String]) -> String {
    columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Renders a table-level constraint clause.
fn render_constraint(constraint: &ConstraintDef) -> String {
    let name = quote_ident(&constraint.name);
    match constraint.kind {
        ConstraintKind::PrimaryKey => format!(
            "CONSTRAINT {} PRIMARY KEY ({})",
            name,
            render_column_list(&constraint.columns)
        ),
        ConstraintKind::Unique => format!(
            "CONSTRAINT {} UNIQUE ({})",
            name,
            render_column_list(&constraint.columns)
        ),
        ConstraintKind::Check => format!(
            "CONSTRAINT {} CHECK ({})",
            name,
            constraint.check_expression.as_deref().unwrap_or("true")
        ),
        ConstraintKind::ForeignKey => {
            let target = match &constraint.ref_schema {
                Some(schema) => qualified(schema, constraint.ref_table.as_deref().unwrap_or("")),
                None => quote_ident(constraint.ref_table.as_deref().unwrap_or("")),
            };
            let mut text = format!(
                "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
                name,
                render_column_list(&constraint.columns),
                target,
                render_column_list(&constraint.ref_columns)
            );
            if let Some(action) = constraint.on_delete {
                text.push_str(&format!(" ON DELETE {}", action.as_sql()));
            }
            if let Some(action) = constraint.on_update {
                text.push_str(&format!(" ON UPDATE {}", action.as_sql()));
            }
            text
        }
    }
}

fn render_index(schema: &str, table: &str, index: &IndexDef) -> String {
    format!(
        "CREATE {}INDEX {} ON {} USING {} ({})",
        if index.unique { "UNIQUE " } else { "" },
        quote_ident(&index.name),
        qualified(schema, table),
        index.method,
        render_column_list(&index.columns)
    )
}

/// Generates the CREATE TABLE statement for a design, followed by one
/// CREATE INDEX statement per declared index.
///
/// Columns are emitted in declared order, then table-level constraints,
/// then the indexes. The output is deterministic for identical input.
pub fn generate_create_table(design: &TableDesign) -> Vec<String> {
    let mut lines: Vec<String> = design.columns.iter().map(render_column).collect();
    lines.extend(design.constraints.iter().map(render_constraint));

    let mut statements = vec![format!(
        "CREATE TABLE {} (\n    {}\n)",
        qualified(&design.schema, &design.table_name),
        lines.join(",\n    ")
    )];
    statements.extend(
        design
            .indexes
            .iter()
            .map(|index| render_index(&design.schema, &design.table_name, index)),
    );
    statements
}

/// Computes the difference between two designs of the same table.
///
/// Columns, constraints and indexes are each matched by name: present only
/// in `modified` means added, present in both with a differing definition
/// means modified (for columns) or replaced (drop + add, for constraints
/// and indexes), and present only in `original` means dropped. The inputs
/// are never mutated.
pub fn diff(original: &TableDesign, modified: &TableDesign) -> TableChanges {
    let mut changes = TableChanges::default();

    for column in &modified.columns {
        match original.columns.iter().find(|c| c.name == column.name) {
            None => changes.added_columns.push(column.clone()),
            Some(existing) if existing != column => changes.modified_columns.push(ModifiedColumn {
                old_name: existing.name.clone(),
                new_definition: column.clone(),
            }),
            Some(_) => {}
        }
    }
    for column in &original.columns {
        if !modified.columns.iter().any(|c| c.name == column.name) {
            changes.dropped_columns.push(column.name.clone());
        }
    }

    for constraint in &modified.constraints {
        match original.constraints.iter().find(|c| c.name == constraint.name) {
            None => changes.added_constraints.push(constraint.clone()),
            Some(existing) if existing != constraint => {
                // A changed constraint cannot be altered in place.
                changes.dropped_constraints.push(existing.name.clone());
                changes.added_constraints.push(constraint.clone());
            }
            Some(_) => {}
        }
    }
    for constraint in &original.constraints {
        if !modified.constraints.iter().any(|c| c.name == constraint.name) {
            changes.dropped_constraints.push(constraint.name.clone());
        }
    }

    for index in &modified.indexes {
        match original.indexes.iter().find(|i| i.name == index.name) {
            None => changes.added_indexes.push(index.clone()),
            Some(existing) if existing != index => {
                changes.dropped_indexes.push(existing.name.clone());
                changes.added_indexes.push(index.clone());
            }
            Some(_) => {}
        }
    }
    for index in &original.indexes {
        if !modified.indexes.iter().any(|i| i.name == index.name) {
            changes.dropped_indexes.push(index.name.clone());
        }
    }

    changes
}

/// Renders the ordered ALTER statements for a set of computed changes.
///
/// The order is fixed: added columns, column alterations, dropped columns,
/// constraint additions, constraint drops, index additions, index drops.
pub fn generate_alter_statements(
    schema: &str,
    table: &str,
    changes: &TableChanges,
) -> Vec<String> {
    let target = qualified(schema, table);
    let mut statements = Vec::new();

    for column in &changes.added_columns {
        statements.push(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            target,
            render_column(column)
        ));
    }

    for modified in &changes.modified_columns {
        let def = &modified.new_definition;
        if modified.old_name != def.name {
            statements.push(format!(
                "ALTER TABLE {} RENAME COLUMN {} TO {}",
                target,
                quote_ident(&modified.old_name),
                quote_ident(&def.name)
            ));
        }
        let column = quote_ident(&def.name);
        statements.push(format!(
            "ALTER TABLE {} ALTER COLUMN {} TYPE {} USING {}::{}",
            target,
            column,
            render_type(def),
            column,
            render_type(def)
        ));
        statements.push(match &def.default {
            Some(default) => format!(
                "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
                target, column, default
            ),
            None => format!("ALTER TABLE {} ALTER COLUMN {} DROP DEFAULT", target, column),
        });
        statements.push(if def.nullable {
            format!("ALTER TABLE {} ALTER COLUMN {} DROP NOT NULL", target, column)
        } else {
            format!("ALTER TABLE {} ALTER COLUMN {} SET NOT NULL", target, column)
        });
    }

    for column in &changes.dropped_columns {
        statements.push(format!(
            "ALTER TABLE {} DROP COLUMN {}",
            target,
            quote_ident(column)
        ));
    }

    for constraint in &changes.added_constraints {
        statements.push(format!(
            "ALTER TABLE {} ADD {}",
            target,
            render_constraint(constraint)
        ));
    }
    for name in &changes.dropped_constraints {
        statements.push(format!(
            "ALTER TABLE {} DROP CONSTRAINT {}",
            target,
            quote_ident(name)
        ));
    }

    for index in &changes.added_indexes {
        statements.push(render_index(schema, table, index));
    }
    for name in &changes.dropped_indexes {
        statements.push(format!("DROP INDEX {}.{}", quote_ident(schema), quote_ident(name)));
    }

    statements
}

/// Diffs two designs and renders the ALTER script in one step.
pub fn generate_alter_table(original: &TableDesign, modified: &TableDesign) -> Vec<String> {
    generate_alter_statements(
        &original.schema,
        &original.table_name,
        &diff(original, modified),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::types::ReferentialAction;

    fn column(name: &str, data_type: &str) -> ColumnDef {
        ColumnDef {
            name: name.to_string(),
            data_type: data_type.to_string(),
            length: None,
            precision: None,
            scale: None,
            nullable: true,
            default: None,
            unique: false,
        }
    }

    fn sample_design() -> TableDesign {
        TableDesign {
            table_name: "orders".to_string(),
            schema: "sales".to_string(),
            columns: vec![
                ColumnDef {
                    nullable: false,
                    ..column("id", "bigint")
                },
                ColumnDef {
                    length: Some(120),
                    nullable: false,
                    ..column("customer", "character varying")
                },
                ColumnDef {
                    precision: Some(12),
                    scale: Some(2),
                    default: Some("0".to_string()),
                    ..column("total", "numeric")
                },
            ],
            constraints: vec![
                ConstraintDef {
                    name: "orders_pkey".to_string(),
                    kind: ConstraintKind::PrimaryKey,
                    columns: vec!["id".to_string()],
                    ref_schema: None,
                    ref_table: None,
                    ref_columns: vec![],
                    on_delete: None,
                    on_update: None,
                    check_expression: None,
                },
                ConstraintDef {
                    name: "orders_customer_fkey".to_string(),
                    kind: ConstraintKind::ForeignKey,
                    columns: vec!["customer".to_string()],
                    ref_schema: Some("sales".to_string()),
                    ref_table: Some("customers".to_string()),
                    ref_columns: vec!["name".to_string()],
                    on_delete: Some(ReferentialAction::Cascade),
                    on_update: Some(ReferentialAction::NoAction),
                    check_expression: None,
                },
                ConstraintDef {
                    name: "orders_total_check".to_string(),
                    kind: ConstraintKind::Check,
                    columns: vec![],
                    ref_schema: None,
                    ref_table: None,
                    ref_columns: vec![],
                    on_delete: None,
                    on_update: None,
                    check_expression: Some("total >= 0".to_string()),
                },
            ],
            indexes: vec![IndexDef {
                name: "orders_customer_idx".to_string(),
                columns: vec!["customer".to_string()],
                unique: false,
                method: "btree".to_string(),
            }],
        }
    }

    #[test]
    fn create_table_contains_every_name_exactly_once() {
        let design = sample_design();
        let script = generate_create_table(&design).join("\n");

        // One definition per column (the name may legitimately reappear in
        // constraint or index column lists).
        for definition in [
            "\"id\" bigint",
            "\"customer\" character varying(120)",
            "\"total\" numeric(12,2)",
        ] {
            assert_eq!(
                script.matches(definition).count(),
                1,
                "{} should appear exactly once in:\n{}",
                definition,
                script
            );
        }
        // Constraint and index names are unique to their definition.
        for name in [
            "\"orders_pkey\"",
            "\"orders_customer_fkey\"",
            "\"orders_total_check\"",
            "\"orders_customer_idx\"",
        ] {
            assert_eq!(
                script.matches(name).count(),
                1,
                "{} should appear exactly once in:\n{}",
                name,
                script
            );
        }
    }

    #[test]
    fn create_table_renders_types_and_clauses() {
        let statements = generate_create_table(&sample_design());
        let table = &statements[0];
        assert!(table.starts_with("CREATE TABLE \"sales\".\"orders\" ("));
        assert!(table.contains("\"id\" bigint NOT NULL"));
        assert!(table.contains("\"customer\" character varying(120) NOT NULL"));
        assert!(table.contains("\"total\" numeric(12,2) DEFAULT 0"));
        assert!(table.contains("CONSTRAINT \"orders_pkey\" PRIMARY KEY (\"id\")"));
        assert!(table.contains(
            "CONSTRAINT \"orders_customer_fkey\" FOREIGN KEY (\"customer\") \
             REFERENCES \"sales\".\"customers\" (\"name\") ON DELETE CASCADE ON UPDATE NO ACTION"
        ));
        assert!(table.contains("CONSTRAINT \"orders_total_check\" CHECK (total >= 0)"));

        assert_eq!(
            statements[1],
            "CREATE INDEX \"orders_customer_idx\" ON \"sales\".\"orders\" USING btree (\"customer\")"
        );
    }

    #[test]
    fn generation_is_deterministic() {
        let design = sample_design();
        assert_eq!(generate_create_table(&design), generate_create_table(&design));

        let mut modified = design.clone();
        modified.columns.push(column("note", "text"));
        assert_eq!(
            generate_alter_table(&design, &modified),
            generate_alter_table(&design, &modified)
        );
    }

    #[test]
    fn diff_sorts_changes_into_buckets() {
        let original = sample_design();
        let mut modified = original.clone();
        modified.columns.push(column("note", "text"));
        modified.columns.retain(|c| c.name != "total");
        modified.columns[1].nullable = true;
        modified.indexes[0].unique = true;

        let changes = diff(&original, &modified);
        assert_eq!(changes.added_columns.len(), 1);
        assert_eq!(changes.added_columns[0].name, "note");
        assert_eq!(changes.dropped_columns, vec!["total".to_string()]);
        assert_eq!(changes.modified_columns.len(), 1);
        assert_eq!(changes.modified_columns[0].old_name, "customer");
        // The reshaped index is replaced, not altered.
        assert_eq!(changes.dropped_indexes, vec!["orders_customer_idx".to_string()]);
        assert_eq!(changes.added_indexes.len(), 1);
        assert!(changes.added_constraints.is_empty());
        assert!(changes.dropped_constraints.is_empty());
    }

    #[test]
    fn diff_of_identical_designs_is_empty() {
        let design = sample_design();
        assert!(diff(&design, &design.clone()).is_empty());
    }

    #[test]
    fn alter_emits_add_before_drop_for_columns() {
        let original = sample_design();
        let mut modified = original.clone();
        modified.columns.push(column("note", "text"));
        modified.columns.retain(|c| c.name != "total");

        let statements = generate_alter_table(&original, &modified);
        let adds: Vec<usize> = statements
            .iter()
            .enumerate()
            .filter(|(_, s)| s.contains("ADD COLUMN"))
            .map(|(i, _)| i)
            .collect();
        let drops: Vec<usize> = statements
            .iter()
            .enumerate()
            .filter(|(_, s)| s.contains("DROP COLUMN"))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(adds.len(), 1);
        assert_eq!(drops.len(), 1);
        assert!(adds[0] < drops[0], "ADD COLUMN must precede DROP COLUMN");
        assert_eq!(
            statements[adds[0]],
            "ALTER TABLE \"sales\".\"orders\" ADD COLUMN \"note\" text"
        );
    }

    #[test]
    fn renamed_column_emits_rename_first() {
        let original = sample_design();
        let mut changes = TableChanges::default();
        changes.modified_columns.push(ModifiedColumn {
            old_name: "customer".to_string(),
            new_definition: ColumnDef {
                length: Some(200),
                nullable: false,
                ..column("buyer", "character varying")
            },
        });

        let statements = generate_alter_statements("sales", "orders", &changes);
        assert_eq!(
            statements[0],
            "ALTER TABLE \"sales\".\"orders\" RENAME COLUMN \"customer\" TO \"buyer\""
        );
        assert!(statements[1].contains("ALTER COLUMN \"buyer\" TYPE character varying(200)"));
        assert!(statements.iter().any(|s| s.ends_with("SET NOT NULL")));
    }

    #[test]
    fn diff_does_not_mutate_its_inputs() {
        let original = sample_design();
        let mut modified = original.clone();
        modified.columns.push(column("note", "text"));

        let original_before = original.clone();
        let modified_before = modified.clone();
        let _ = diff(&original, &modified);
        assert_eq!(original, original_before);
        assert_eq!(modified, modified_before);
    }
}
