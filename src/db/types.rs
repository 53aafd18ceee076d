use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

// =================================================
// statement results
// =================================================

/// The kind of SQL statement, decided from the leading keyword of the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Ddl,
}

/// Metadata for one column of a result set.
///
/// `nullable` and `is_primary_key` are resolved from the system catalogs and
/// are only populated when every column of the result set comes from the same
/// source table; for computed columns or joins they stay unknown/false.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "typeName")]
    pub type_name: String,
    pub nullable: Option<bool>,
    #[serde(rename = "isPrimaryKey")]
    pub is_primary_key: bool,
}

/// A 1-based line/column position inside the submitted SQL text.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorPosition {
    pub line: usize,
    pub column: usize,
}

/// Rows and column metadata returned by a query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SelectResult {
    pub columns: Vec<ColumnInfo>,
    pub rows: Vec<Vec<CellValue>>,
    pub row_count: usize,
    pub duration_ms: u64,
}

/// Outcome of an INSERT/UPDATE/DELETE statement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MutationResult {
    pub affected_rows: u64,
    pub duration_ms: u64,
}

/// Outcome of a DDL (or other pass-through) statement.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DdlResult {
    pub duration_ms: u64,
}

/// A database failure, translated for display.
///
/// `message` is the friendly text shown in the result pane, while
/// `technical_detail` keeps the original driver message so nothing is lost
/// for debugging.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResult {
    pub message: String,
    pub technical_detail: String,
    pub code: String,
    #[serde(rename = "errorPosition", skip_serializing_if = "Option::is_none")]
    pub position: Option<ErrorPosition>,
    pub duration_ms: u64,
}

/// The typed result of one executed statement.
///
/// Exactly one variant is produced per statement; the frontend dispatches on
/// the `resultType` tag to pick the grid, the affected-row banner or the
/// error pane.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "resultType")]
pub enum StructuredResult {
    Select(SelectResult),
    Insert(MutationResult),
    Update(MutationResult),
    Delete(MutationResult),
    Ddl(DdlResult),
    Error(ErrorResult),
}

impl StructuredResult {
    /// Wraps a mutation outcome in the variant matching the statement kind.
    ///
    /// Statements classified as `Select` or `Ddl` never produce a mutation
    /// result, so those kinds are mapped to `Ddl` defensively rather than
    /// panicking.
    pub fn mutation(kind: StatementKind, result: MutationResult) -> Self {
        match kind {
            StatementKind::Insert => StructuredResult::Insert(result),
            StatementKind::Update => StructuredResult::Update(result),
            StatementKind::Delete => StructuredResult::Delete(result),
            _ => StructuredResult::Ddl(DdlResult {
                duration_ms: result.duration_ms,
            }),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, StructuredResult::Error(_))
    }
}

// =================================================
// cell values
// =================================================

/// The canonical, JSON-safe form of a database value.
///
/// Every native column value crossing the engine boundary is converted into
/// this closed union; the conversion is total, with unknown types falling
/// back to their text representation. `Bytes` carries base64 text and
/// `Temporal` an ISO-8601 string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(String),
    Temporal(String),
    Json(serde_json::Value),
}

impl CellValue {
    /// Renders the value as plain text, the form used when a parameter has
    /// to be handed to the server in its text representation.
    pub fn as_text(&self) -> String {
        match self {
            CellValue::Null => String::new(),
            CellValue::Bool(b) => b.to_string(),
            CellValue::Int(i) => i.to_string(),
            CellValue::Float(f) => f.to_string(),
            CellValue::Text(s) | CellValue::Bytes(s) | CellValue::Temporal(s) => s.clone(),
            CellValue::Json(v) => v.to_string(),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, CellValue::Null)
    }
}

// =================================================
// batch mutations
// =================================================

/// One row of a batch update.
///
/// The row is identified purely by its primary-key column values; `changes`
/// holds the columns to overwrite and must not be empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowUpdate {
    pub primary_key: IndexMap<String, CellValue>,
    pub changes: IndexMap<String, CellValue>,
}

/// Affected-row counts reported after a committed batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MutationSummary {
    pub affected_rows: u64,
    pub duration_ms: u64,
}

// =================================================
// table design
// =================================================

/// A column definition as edited in the table designer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDef {
    pub name: String,
    /// SQL type name, e.g. `integer`, `character varying`, `numeric`.
    pub data_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
    pub nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
    #[serde(default)]
    pub unique: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConstraintKind {
    PrimaryKey,
    ForeignKey,
    Unique,
    Check,
}

/// Referential action of a foreign key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferentialAction {
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ReferentialAction {
    pub fn as_sql(&self) -> &'static str {
        match self {
            ReferentialAction::NoAction => "NO ACTION",
            ReferentialAction::Restrict => "RESTRICT",
            ReferentialAction::Cascade => "CASCADE",
            ReferentialAction::SetNull => "SET NULL",
            ReferentialAction::SetDefault => "SET DEFAULT",
        }
    }
}

/// A table-level constraint definition.
///
/// Only the fields matching `kind` are meaningful: `columns` for primary
/// key/unique, the `ref_*` and action fields for foreign keys, and
/// `check_expression` for checks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintDef {
    pub name: String,
    pub kind: ConstraintKind,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_schema: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ref_table: Option<String>,
    #[serde(default)]
    pub ref_columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_delete: Option<ReferentialAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on_update: Option<ReferentialAction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub check_expression: Option<String>,
}

/// A secondary index definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IndexDef {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
    /// Index access method, e.g. `btree`, `hash`, `gin`.
    pub method: String,
}

/// The declarative design of one table, as shown in the designer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TableDesign {
    pub table_name: String,
    pub schema: String,
    pub columns: Vec<ColumnDef>,
    #[serde(default)]
    pub constraints: Vec<ConstraintDef>,
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
}

/// A column of the modified design matched against the original one.
///
/// `old_name` is the name the column has in the original design; it differs
/// from `definition.name` when the designer renamed the column.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ModifiedColumn {
    pub old_name: String,
    pub new_definition: ColumnDef,
}

/// The computed difference between two table designs.
///
/// Always derived as a pure function of an (original, modified) pair, never
/// mutated incrementally.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TableChanges {
    pub added_columns: Vec<ColumnDef>,
    pub modified_columns: Vec<ModifiedColumn>,
    pub dropped_columns: Vec<String>,
    pub added_constraints: Vec<ConstraintDef>,
    pub dropped_constraints: Vec<String>,
    pub added_indexes: Vec<IndexDef>,
    pub dropped_indexes: Vec<String>,
}

impl TableChanges {
    pub fn is_empty(&self) -> bool {
        self.added_columns.is_empty()
            && self.modified_columns.is_empty()
            && self.dropped_columns.is_empty()
            && self.added_constraints.is_empty()
            && self.dropped_constraints.is_empty()
            && self.added_indexes.is_empty()
            && self.dropped_indexes.is_empty()
    }
}
