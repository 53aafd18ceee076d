// Connection pool defaults
pub const DEFAULT_POOL_SIZE: usize = 8;
pub const DEFAULT_PORT: u16 = 5432;

// Log file name under the host application's log directory
pub const LOG_FILE_NAME: &str = "pgdeck.log";

// Schemas hidden from the navigation tree
pub const SYSTEM_SCHEMAS: [&str; 2] = ["pg_catalog", "information_schema"];
