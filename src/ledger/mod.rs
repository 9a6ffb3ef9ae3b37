//! Deployment ledger
//!
//! Durable, append-only history of deployments for one network, stored in
//! SQLite. Records are never rewritten except for the one name backfill in
//! [`DeploymentLedger::associate_name`].
//!
//! ## Tables
//!
//! - `deployments` - one row per broadcast deployment

pub mod query;
pub mod schema;

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use rusqlite::types::Type;
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::artifact::ArtifactSource;
use crate::error::{ManifestError, Result};
use crate::integrity::{self, IntegrityDigest};
use crate::types::{chain_id_hex, Address};

pub use query::{build_query, DeploymentFilter, QueryParam};

/// One persisted deployment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    pub contract_address: Address,
    pub contract_name: Option<String>,
    pub rpc: Option<String>,
    pub deployer: Option<String>,
    pub tx_hash: Option<String>,
    /// Seconds since the epoch, fractional
    pub broadcast_ts: f64,
    pub tx_envelope: Value,
    pub receipt_envelope: Value,
    /// Source bundle; carries the `integrity` digest
    pub source_bundle: Value,
    pub abi: Vec<Value>,
    pub session_id: String,
    /// Assigned by the ledger on append
    pub deployment_id: Option<i64>,
}

impl DeploymentRecord {
    /// Integrity digest recorded at deploy time, if any.
    pub fn integrity(&self) -> Option<IntegrityDigest> {
        self.source_bundle
            .get("integrity")
            .and_then(Value::as_str)
            .map(IntegrityDigest::from_hex)
    }

    /// Chain id from the transaction envelope.
    pub fn chain_id(&self) -> Option<u64> {
        self.tx_envelope
            .get("chainId")
            .and_then(Value::as_str)
            .and_then(crate::types::parse_quantity)
    }

    fn from_row(row: &Row) -> std::result::Result<Self, rusqlite::Error> {
        let address: String = row.get(0)?;
        let contract_address = address.parse::<Address>().map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e))
        })?;

        Ok(Self {
            contract_address,
            contract_name: row.get(1)?,
            rpc: row.get(2)?,
            deployer: row.get(3)?,
            tx_hash: row.get(4)?,
            broadcast_ts: row.get(5)?,
            tx_envelope: json_column(row, 6)?,
            receipt_envelope: json_column(row, 7)?,
            source_bundle: json_column(row, 8)?,
            abi: match json_column(row, 9)? {
                Value::Array(items) => items,
                _ => Vec::new(),
            },
            session_id: row.get::<_, Option<String>>(10)?.unwrap_or_default(),
            deployment_id: row.get(11)?,
        })
    }
}

/// Nullable JSON text column; NULL reads as `Value::Null`.
fn json_column(row: &Row, idx: usize) -> std::result::Result<Value, rusqlite::Error> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        Some(text) => serde_json::from_str(&text)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
        None => Ok(Value::Null),
    }
}

/// Current time as fractional epoch seconds.
pub fn now_ts() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default()
}

/// SQLite-backed deployment ledger for one network.
pub struct DeploymentLedger {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for DeploymentLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeploymentLedger")
            .field("path", &self.path)
            .finish()
    }
}

impl DeploymentLedger {
    /// Open or create the ledger file at `path`.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path).map_err(|e| ManifestError::LedgerUnavailable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        schema::init_schema(&conn)?;

        info!(path = %path.display(), "Deployment ledger opened");
        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open an existing ledger for reading. Returns `None` on first run, when
    /// the file has never been created.
    pub fn open_existing(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| ManifestError::LedgerUnavailable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        schema::init_schema(&conn)?;

        debug!(path = %path.display(), "Existing deployment ledger opened");
        Ok(Some(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        }))
    }

    /// In-memory ledger, discarded with the process.
    pub fn open_in_memory() -> Result<Self> {
        debug!("Opening in-memory deployment ledger");
        let conn = Connection::open_in_memory()?;
        schema::init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| ManifestError::LedgerUnavailable {
                path: self.describe(),
                reason: format!("lock poisoned: {}", e),
            })?;
        f(&conn)
    }

    fn describe(&self) -> String {
        self.path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ":memory:".to_string())
    }

    /// Insert a record and return its deployment id.
    pub fn append(&self, record: &DeploymentRecord) -> Result<i64> {
        let tx_dict = serde_json::to_string(&record.tx_envelope)?;
        let receipt_dict = serde_json::to_string(&record.receipt_envelope)?;
        let source_code = serde_json::to_string(&record.source_bundle)?;
        let abi = serde_json::to_string(&record.abi)?;

        let id = self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO deployments (
                    contract_address, contract_name, rpc, deployer, tx_hash, broadcast_ts,
                    tx_dict, receipt_dict, source_code, abi, session_id
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    record.contract_address.to_string(),
                    record.contract_name,
                    record.rpc,
                    record.deployer,
                    record.tx_hash,
                    record.broadcast_ts,
                    tx_dict,
                    receipt_dict,
                    source_code,
                    abi,
                    record.session_id,
                ],
            )
            .map_err(|e| ManifestError::LedgerUnavailable {
                path: self.describe(),
                reason: e.to_string(),
            })?;
            Ok(conn.last_insert_rowid())
        })?;

        debug!(
            deployment_id = id,
            address = %record.contract_address,
            contract = record.contract_name.as_deref().unwrap_or("<unnamed>"),
            "Deployment recorded"
        );
        Ok(id)
    }

    /// Records matching `filter`, most recent first.
    pub fn query(&self, filter: &DeploymentFilter) -> Result<Vec<DeploymentRecord>> {
        let (sql, params) = build_query(filter);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(params.iter()), DeploymentRecord::from_row)?;
            let mut records = Vec::new();
            for row in rows {
                records.push(row?);
            }
            Ok(records)
        })
    }

    /// Like [`query`](Self::query), keeping only records whose integrity
    /// digest matches the artifact that can be located under their name
    /// today. The limit applies to the surviving records.
    pub fn query_checked(
        &self,
        filter: &DeploymentFilter,
        artifacts: &dyn ArtifactSource,
    ) -> Result<Vec<DeploymentRecord>> {
        let unlimited = DeploymentFilter {
            limit: None,
            ..filter.clone()
        };
        let records = self.query(&unlimited)?;

        let mut expected: HashMap<String, Option<IntegrityDigest>> = HashMap::new();
        let mut checked = Vec::new();
        for record in records {
            let name = match filter
                .contract_name
                .as_ref()
                .or(record.contract_name.as_ref())
            {
                Some(name) => name.clone(),
                None => continue,
            };
            let digest = expected
                .entry(name.clone())
                .or_insert_with(|| current_digest(&name, artifacts));

            let matches = match (digest.as_ref(), record.integrity()) {
                (Some(expected), Some(actual)) => *expected == actual,
                _ => false,
            };
            if matches {
                checked.push(record);
                if filter.limit.is_some_and(|limit| checked.len() >= limit as usize) {
                    break;
                }
            } else {
                debug!(
                    contract = %name,
                    address = %record.contract_address,
                    "Recorded deployment does not match current artifact"
                );
            }
        }
        Ok(checked)
    }

    /// Backfill `contract_name` on the most recent record for
    /// `(chain_id, address)` that is unnamed or already carries `name`.
    /// Returns whether a record was updated.
    pub fn associate_name(&self, chain_id: u64, address: &Address, name: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deployment_id: Option<i64> = conn
                .query_row(
                    "SELECT deployment_id FROM deployments
                     WHERE json_extract(tx_dict, '$.chainId') = ?1
                       AND lower(contract_address) = ?2
                       AND (contract_name IS NULL OR contract_name = '' OR contract_name = ?3)
                     ORDER BY broadcast_ts DESC LIMIT 1",
                    params![chain_id_hex(chain_id), address.to_string(), name],
                    |row| row.get(0),
                )
                .optional()?;

            match deployment_id {
                Some(id) => {
                    conn.execute(
                        "UPDATE deployments SET contract_name = ?1 WHERE deployment_id = ?2",
                        params![name, id],
                    )
                    .map_err(|e| ManifestError::LedgerUnavailable {
                        path: self.describe(),
                        reason: e.to_string(),
                    })?;
                    debug!(deployment_id = id, contract = name, "Backfilled contract name");
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    /// Total number of records.
    pub fn count(&self) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM deployments", [], |row| row.get(0))?;
            Ok(count as u64)
        })
    }
}

fn current_digest(name: &str, artifacts: &dyn ArtifactSource) -> Option<IntegrityDigest> {
    match artifacts.locate(name) {
        Ok(Some(artifact)) => match integrity::digest(&artifact) {
            Ok(digest) => Some(digest),
            Err(e) => {
                warn!(contract = name, error = %e, "Cannot compute integrity of current artifact");
                None
            }
        },
        Ok(None) => {
            debug!(contract = name, "No current artifact to check recorded deployments against");
            None
        }
        Err(e) => {
            warn!(contract = name, error = %e, "Artifact lookup failed");
            None
        }
    }
}
