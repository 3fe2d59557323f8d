//! Scripted in-memory connector for exercising the verb façade without MySQL
//!
//! Counts every connect, commit and close; replays queued outcomes in order
//! (an empty queue yields an empty outcome) and records executed statements.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::connection::{Connector, Endpoint, ExecOutcome, Row, Session};
use crate::error::{DbError, Result};
use crate::template::Statement;

#[derive(Debug, Default)]
struct FakeState {
    connects: AtomicUsize,
    commits: AtomicUsize,
    closes: AtomicUsize,
    pending_failures: AtomicUsize,
    generation: AtomicUsize,
    outcomes: Mutex<VecDeque<Result<ExecOutcome>>>,
    executed: Mutex<Vec<Statement>>,
}

/// Cloneable handle: clones share counters and scripts
#[derive(Debug, Clone)]
pub struct FakeConnector {
    endpoint: Endpoint,
    state: Arc<FakeState>,
}

impl Default for FakeConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeConnector {
    pub fn new() -> Self {
        Self {
            endpoint: Endpoint {
                hostname: "fake-host".into(),
                username: "fake-user".into(),
            },
            state: Arc::new(FakeState::default()),
        }
    }

    /// Make the next `n` connect attempts fail
    pub fn fail_next_connects(&self, n: usize) {
        self.state.pending_failures.store(n, Ordering::SeqCst);
    }

    /// Sessions opened before this call fail their next ping
    pub fn invalidate_sessions(&self) {
        self.state.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn push_outcome(&self, outcome: ExecOutcome) {
        self.lock_outcomes().push_back(Ok(outcome));
    }

    pub fn push_rows(&self, rows: Vec<Row>) {
        self.push_outcome(ExecOutcome::with_rows(rows));
    }

    /// Make the next statement fail with a driver error
    pub fn push_error(&self, message: &str) {
        self.lock_outcomes()
            .push_back(Err(DbError::Sqlx(sqlx::Error::Protocol(message.into()))));
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.state.commits.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.state.closes.load(Ordering::SeqCst)
    }

    /// Statements executed so far, oldest first
    pub fn statements(&self) -> Vec<Statement> {
        self.state
            .executed
            .lock()
            .map(|executed| executed.clone())
            .unwrap_or_default()
    }

    fn lock_outcomes(&self) -> std::sync::MutexGuard<'_, VecDeque<Result<ExecOutcome>>> {
        self.state
            .outcomes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl Connector for FakeConnector {
    type Session = FakeSession;

    async fn connect(&self) -> Result<FakeSession> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        let should_fail = self
            .state
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if should_fail {
            return Err(DbError::Sqlx(sqlx::Error::Io(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            ))));
        }
        Ok(FakeSession {
            connector: self.clone(),
            generation: self.state.generation.load(Ordering::SeqCst),
        })
    }

    fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

/// Session handed out by [`FakeConnector`]
#[derive(Debug)]
pub struct FakeSession {
    connector: FakeConnector,
    generation: usize,
}

#[async_trait]
impl Session for FakeSession {
    async fn ping(&mut self) -> Result<()> {
        if self.generation == self.connector.state.generation.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(DbError::Sqlx(sqlx::Error::Io(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "server has gone away",
            ))))
        }
    }

    async fn execute(&mut self, statement: &Statement) -> Result<ExecOutcome> {
        if let Ok(mut executed) = self.connector.state.executed.lock() {
            executed.push(statement.clone());
        }
        self.connector
            .lock_outcomes()
            .pop_front()
            .unwrap_or_else(|| Ok(ExecOutcome::default()))
    }

    async fn commit(&mut self) -> Result<()> {
        self.connector.state.commits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn close(self) -> Result<()> {
        self.connector.state.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
