//! Deployment query construction
//!
//! The generated SQL text is read by other tools against the same store, so
//! it is built from fixed fragments in a fixed order: name filter, then
//! chain-id filter, then limit.

use rusqlite::types::ToSqlOutput;
use rusqlite::ToSql;

use super::schema::field_names_str;
use crate::types::chain_id_hex;

const SQL_WHERE: &str = "WHERE ";
const SQL_CONTRACT_NAME: &str = "contract_name = ? ";
const SQL_AND: &str = "AND ";
const SQL_CHAIN_ID: &str = "json_extract(tx_dict, '$.chainId') = ? ";
const SQL_LIMIT: &str = "LIMIT ? ";

/// Filter for ledger queries. All fields optional.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentFilter {
    pub contract_name: Option<String>,
    pub chain_id: Option<u64>,
    pub limit: Option<u32>,
}

impl DeploymentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contract_name(mut self, name: impl Into<String>) -> Self {
        self.contract_name = Some(name.into());
        self
    }

    pub fn chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = Some(chain_id);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Positional parameter bound to a generated query.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Text(String),
    Integer(i64),
}

impl ToSql for QueryParam {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            QueryParam::Text(s) => s.to_sql(),
            QueryParam::Integer(i) => i.to_sql(),
        }
    }
}

/// Build the SELECT for a filter, returning SQL text and positional params.
pub fn build_query(filter: &DeploymentFilter) -> (String, Vec<QueryParam>) {
    let mut where_clauses: Vec<&str> = Vec::new();
    let mut params = Vec::new();

    if let Some(name) = &filter.contract_name {
        where_clauses.push(SQL_CONTRACT_NAME);
        params.push(QueryParam::Text(name.clone()));
    }

    if let Some(chain_id) = filter.chain_id {
        if !where_clauses.is_empty() {
            where_clauses.push(SQL_AND);
        }
        where_clauses.push(SQL_CHAIN_ID);
        params.push(QueryParam::Text(chain_id_hex(chain_id)));
    }

    let where_part = if where_clauses.is_empty() {
        String::new()
    } else {
        format!("{}{}", SQL_WHERE, where_clauses.concat())
    };

    let limit_part = match filter.limit {
        Some(limit) => {
            params.push(QueryParam::Integer(i64::from(limit)));
            SQL_LIMIT
        }
        None => "",
    };

    let sql = format!(
        "SELECT {} FROM deployments {}ORDER BY broadcast_ts DESC {}",
        field_names_str(),
        where_part,
        limit_part
    );
    (sql, params)
}
