pub mod ddl;
pub mod error;
pub mod executor;
pub mod manager;
pub mod mutation;
pub mod pool;
pub mod schema;
pub mod statement;
mod types;
mod value;

pub use error::{ConflictKind, ConstraintViolationKind, DbError, TranslatedError};
pub use manager::SqlEngine;
pub use pool::{ConnectionConfig, ConnectionPool, PoolManager, PooledConn};
pub use statement::{classify, split_statements};
pub use types::{
    CellValue, ColumnDef, ColumnInfo, ConstraintDef, ConstraintKind, DdlResult, ErrorPosition,
    ErrorResult, IndexDef, ModifiedColumn, MutationResult, MutationSummary, ReferentialAction,
    RowUpdate, SelectResult, StatementKind, StructuredResult, TableChanges, TableDesign,
};
