//! Connection lifecycle: the single session, its driver seam, and reconnects
//!
//! [`Connector`] and [`Session`] are the seam between the verb façade and a
//! concrete driver. [`ConnectionManager`] owns the retry policy and keeps the
//! one session slot healthy; the slot itself lives behind the caller's lock.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::backoff::BackoffPolicy;
use crate::error::{DbError, Result};
use crate::template::Statement;

/// One result row: field name -> value
pub type Row = Map<String, Value>;

/// Raw result of executing a single statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecOutcome {
    pub rows: Vec<Row>,
    pub rows_affected: u64,
    pub last_insert_id: u64,
}

impl ExecOutcome {
    pub fn with_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }
}

/// Host and user labels attached to connection log records
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub hostname: String,
    pub username: String,
}

/// Opens database sessions
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Session: Session;

    /// Open one session; called once per connect attempt
    async fn connect(&self) -> Result<Self::Session>;

    fn endpoint(&self) -> &Endpoint;
}

/// A live database session
#[async_trait]
pub trait Session: Send + 'static {
    /// Cheap liveness check; a failure marks the session stale
    async fn ping(&mut self) -> Result<()>;

    async fn execute(&mut self, statement: &Statement) -> Result<ExecOutcome>;

    async fn commit(&mut self) -> Result<()>;

    async fn close(self) -> Result<()>;
}

/// Establishes sessions with backoff and replaces stale ones
pub struct ConnectionManager<C: Connector> {
    connector: C,
    policy: BackoffPolicy,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(connector: C, policy: BackoffPolicy) -> Self {
        Self { connector, policy }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    pub fn policy(&self) -> &BackoffPolicy {
        &self.policy
    }

    /// Open a validated session, sleeping per the backoff policy between
    /// failed attempts. Fails once the policy runs out of delays.
    pub async fn connect(&self) -> Result<C::Session> {
        let endpoint = self.connector.endpoint();
        let mut failures = 0u32;

        loop {
            tracing::info!(
                db_hostname = %endpoint.hostname,
                db_username = %endpoint.username,
                "Attempting to connect to MySQL"
            );

            let error = match self.open_validated().await {
                Ok(session) => {
                    tracing::info!(
                        db_hostname = %endpoint.hostname,
                        db_username = %endpoint.username,
                        "MySQL connection successful"
                    );
                    return Ok(session);
                }
                Err(e) => e,
            };

            match self.policy.delay_after(failures) {
                Some(delay) => {
                    tracing::warn!(
                        db_hostname = %endpoint.hostname,
                        db_username = %endpoint.username,
                        error = %error,
                        "Connection attempt failed, retrying in {:?}",
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    failures += 1;
                }
                None => {
                    tracing::error!(
                        db_hostname = %endpoint.hostname,
                        db_username = %endpoint.username,
                        error = %error,
                        "Could not establish MySQL connection"
                    );
                    return Err(DbError::ConnectExhausted {
                        attempts: failures + 1,
                    });
                }
            }
        }
    }

    async fn open_validated(&self) -> Result<C::Session> {
        let mut session = self.connector.connect().await?;
        session.ping().await?;
        Ok(session)
    }

    /// Replace whatever is in the slot with a freshly connected session
    pub async fn reconnect(&self, slot: &mut Option<C::Session>) -> Result<()> {
        if let Some(stale) = slot.take() {
            if let Err(e) = stale.close().await {
                tracing::debug!(error = %e, "closing stale session failed");
            }
        }
        *slot = Some(self.connect().await?);
        Ok(())
    }

    /// Borrow the session for one statement, reconnecting first if the slot
    /// is empty or the session no longer answers.
    pub async fn acquire<'s>(&self, slot: &'s mut Option<C::Session>) -> Result<&'s mut C::Session> {
        let healthy = match slot.as_mut() {
            Some(session) => session.ping().await.is_ok(),
            None => false,
        };
        if !healthy {
            self.reconnect(slot).await?;
        }
        slot.as_mut().ok_or(DbError::NoConnection)
    }

    /// Close and empty the slot
    pub async fn release(&self, slot: &mut Option<C::Session>) -> Result<()> {
        if let Some(session) = slot.take() {
            session.close().await?;
        }
        Ok(())
    }
}
