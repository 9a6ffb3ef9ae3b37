//! Ledger schema
//!
//! Column order is part of the on-disk compatibility surface: the query
//! builder selects columns in exactly this order and other tools read the
//! same file.

use rusqlite::Connection;
use tracing::debug;

use crate::error::Result;

/// Column names in select order.
pub const FIELD_NAMES: [&str; 12] = [
    "contract_address",
    "contract_name",
    "rpc",
    "deployer",
    "tx_hash",
    "broadcast_ts",
    "tx_dict",
    "receipt_dict",
    "source_code",
    "abi",
    "session_id",
    "deployment_id",
];

const CREATE_SQL: &str = "
CREATE TABLE IF NOT EXISTS deployments (
    contract_address TEXT NOT NULL,
    contract_name TEXT,
    rpc TEXT,
    deployer TEXT,
    tx_hash TEXT,
    broadcast_ts REAL NOT NULL,
    tx_dict TEXT,
    receipt_dict TEXT,
    source_code TEXT,
    abi TEXT,
    session_id TEXT,
    deployment_id INTEGER PRIMARY KEY AUTOINCREMENT
);

CREATE INDEX IF NOT EXISTS idx_deployments_name_ts
    ON deployments(contract_name, broadcast_ts);

CREATE INDEX IF NOT EXISTS idx_deployments_address
    ON deployments(contract_address);
";

/// Comma-joined field list, as it appears in SELECT statements.
pub fn field_names_str() -> String {
    FIELD_NAMES.join(",")
}

/// Create tables and indexes if missing.
pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(CREATE_SQL)?;
    debug!("Ledger schema initialized");
    Ok(())
}
