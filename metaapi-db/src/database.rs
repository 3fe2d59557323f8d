//! Statement executor and verb façade
//!
//! Every query flows through [`Database::execute_in`]: resolve and render the
//! template, acquire the session, execute, and log the elapsed time. The verbs
//! layer their own commit/close and result-shaping contract on top:
//!
//! | verb | result | after execution |
//! |------|--------|-----------------|
//! | insert | last insert id | commit, close |
//! | update | rows affected | commit, close |
//! | delete | last insert id | commit, close |
//! | select | rows | commit, close |
//! | boolean | any rows | - |
//! | execute | rows | - |
//!
//! Closing after each committed verb means the next call reconnects. The
//! whole verb runs under one lock of the session slot, so concurrent callers
//! are serialised rather than interleaved on the shared session.

use std::time::Instant;

use serde_json::Value;
use tokio::sync::Mutex;

use crate::backoff::BackoffPolicy;
use crate::config::DbConfig;
use crate::connection::{ConnectionManager, Connector, ExecOutcome, Row, Session};
use crate::error::{DbError, Result};
use crate::mysql::MysqlConnector;
use crate::store::QueryStore;
use crate::template::Context;

/// Schemas never reported by [`Database::list_databases`]
pub const SYSTEM_SCHEMAS: &[&str] = &[
    "information_schema",
    "mysql",
    "sys",
    "innodb",
    "tmp",
    "tempDB",
    "performance_schema",
];

/// Single-session database handle shared by the whole process
pub struct Database<C: Connector = MysqlConnector> {
    store: QueryStore,
    manager: ConnectionManager<C>,
    session: Mutex<Option<C::Session>>,
}

impl Database<MysqlConnector> {
    /// Load the query file and connect using environment-derived settings
    pub async fn from_config(config: DbConfig) -> Result<Self> {
        let store = QueryStore::load(&config.query_file)?;
        let connector = MysqlConnector::new(config).await;
        Self::connect(connector, store, BackoffPolicy::default()).await
    }
}

impl<C: Connector> Database<C> {
    /// Establish the initial session (with backoff) and take ownership of the store
    pub async fn connect(connector: C, store: QueryStore, policy: BackoffPolicy) -> Result<Self> {
        let manager = ConnectionManager::new(connector, policy);
        let session = manager.connect().await?;
        Ok(Self {
            store,
            manager,
            session: Mutex::new(Some(session)),
        })
    }

    pub fn store(&self) -> &QueryStore {
        &self.store
    }

    pub fn connector(&self) -> &C {
        self.manager.connector()
    }

    /// Render a query as text without executing it
    pub fn render(&self, query: &str, ctx: &Context) -> Result<String> {
        self.store.render(query, ctx)
    }

    /// Render, acquire a session and execute. The session stays open in the
    /// slot; committing and closing belong to the calling verb.
    async fn execute_in(
        &self,
        slot: &mut Option<C::Session>,
        query: &str,
        ctx: &Context,
    ) -> Result<ExecOutcome> {
        let statement = self.store.statement(query, ctx)?;
        tracing::trace!(sql = %statement.sql, binds = statement.binds.len(), "rendered query");

        let session = self.manager.acquire(slot).await?;
        let started = Instant::now();
        let result = session.execute(&statement).await;

        tracing::debug!(
            query_signature = %statement.signature,
            query_args = ?ctx.keys().collect::<Vec<_>>(),
            duration_ms = started.elapsed().as_secs_f64() * 1000.0,
            "Database::execute"
        );
        result
    }

    /// Execute, commit, then close the session
    async fn execute_committed(&self, query: &str, ctx: &Context) -> Result<ExecOutcome> {
        let mut slot = self.session.lock().await;
        let outcome = self.execute_in(&mut slot, query, ctx).await?;
        slot.as_mut().ok_or(DbError::NoConnection)?.commit().await?;
        self.manager.release(&mut slot).await?;
        Ok(outcome)
    }

    /// Execute and leave the session open, uncommitted
    async fn execute_open(&self, query: &str, ctx: &Context) -> Result<ExecOutcome> {
        let mut slot = self.session.lock().await;
        self.execute_in(&mut slot, query, ctx).await
    }

    /// Returns the last inserted row id
    pub async fn insert(&self, query: &str, ctx: &Context) -> Result<u64> {
        Ok(self.execute_committed(query, ctx).await?.last_insert_id)
    }

    /// Returns the number of affected rows
    pub async fn update(&self, query: &str, ctx: &Context) -> Result<u64> {
        Ok(self.execute_committed(query, ctx).await?.rows_affected)
    }

    /// Returns the last inserted row id, like [`insert`](Self::insert);
    /// callers wanting a deleted-row count should use [`update`](Self::update).
    pub async fn delete(&self, query: &str, ctx: &Context) -> Result<u64> {
        Ok(self.execute_committed(query, ctx).await?.last_insert_id)
    }

    pub async fn select(&self, query: &str, ctx: &Context) -> Result<Vec<Row>> {
        Ok(self.execute_committed(query, ctx).await?.rows)
    }

    /// True if the query returned any row
    pub async fn boolean(&self, query: &str, ctx: &Context) -> Result<bool> {
        Ok(!self.execute_open(query, ctx).await?.rows.is_empty())
    }

    pub async fn execute(&self, query: &str, ctx: &Context) -> Result<Vec<Row>> {
        Ok(self.execute_open(query, ctx).await?.rows)
    }

    /// `id` of the first row, or `None` when nothing matched.
    /// A first row without an `id` column yields `Value::Null`.
    pub async fn get_id(&self, query: &str, ctx: &Context) -> Result<Option<Value>> {
        let rows = self.select(query, ctx).await?;
        Ok(rows
            .into_iter()
            .next()
            .map(|mut row| row.remove("id").unwrap_or(Value::Null)))
    }

    /// `id` of every row, or `None` (not an empty list) when nothing matched
    pub async fn get_ids(&self, query: &str, ctx: &Context) -> Result<Option<Vec<Value>>> {
        let rows = self.select(query, ctx).await?;
        if rows.is_empty() {
            return Ok(None);
        }
        Ok(Some(
            rows.into_iter()
                .map(|mut row| row.remove("id").unwrap_or(Value::Null))
                .collect(),
        ))
    }

    /// User databases, optionally restricted to names starting with `basename`
    pub async fn list_databases(&self, basename: Option<&str>) -> Result<Vec<String>> {
        let rows = match basename.filter(|b| !b.is_empty()) {
            Some(basename) => {
                let mut ctx = Context::new();
                ctx.insert("basename".into(), Value::from(basename));
                self.select("SHOW DATABASES LIKE '{{{basename}}}%'", &ctx)
                    .await?
            }
            None => self.select("SHOW DATABASES", &Context::new()).await?,
        };

        Ok(rows
            .into_iter()
            .filter_map(first_text)
            .filter(|name| !SYSTEM_SCHEMAS.contains(&name.as_str()))
            .collect())
    }

    pub async fn database_exists(&self, dbname: &str) -> Result<bool> {
        Ok(self
            .list_databases(None)
            .await?
            .iter()
            .any(|name| name == dbname))
    }

    /// Tables in `dbname`; empty if the schema is missing or the listing fails
    pub async fn list_tables(&self, dbname: &str) -> Vec<String> {
        if dbname.is_empty() {
            return Vec::new();
        }
        let mut ctx = Context::new();
        ctx.insert("dbname".into(), Value::from(dbname));

        match self.select("SHOW TABLES IN {{{dbname}}}", &ctx).await {
            Ok(rows) => rows.into_iter().filter_map(first_text).collect(),
            Err(e) => {
                tracing::error!(dbname, error = %e, "Could not find tables like {}", dbname);
                Vec::new()
            }
        }
    }
}

/// SHOW statements return a single column whose header embeds the pattern
fn first_text(row: Row) -> Option<String> {
    match row.into_iter().next() {
        Some((_, Value::String(name))) => Some(name),
        _ => None,
    }
}
