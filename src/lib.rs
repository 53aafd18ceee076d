// modules
pub mod commands;
mod constants;
pub mod db;
pub mod error;
pub mod logger;

#[cfg(test)]
pub mod test;

use rust_i18n::i18n;

// Initialize internationalization with the "i18n" directory.
// Friendly database-error messages are looked up here; the host application
// sets the locale from its interface-language setting.
i18n!("i18n", fallback = "en");

pub use db::{
    CellValue, ConnectionConfig, DbError, PoolManager, RowUpdate, SqlEngine, StructuredResult,
    TableChanges, TableDesign,
};
pub use error::{EngineError, Result};
