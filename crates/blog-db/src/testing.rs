//! In-memory executors for unit tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::executor::{ExecError, Executor};
use crate::query_builder::BuiltQuery;
use crate::transaction::{TransactionSource, TxBackend, TxOptions};
use crate::value::Row;

/// Which execution path a call took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Path {
    Execute,
    FetchOne,
    FetchAll,
}

#[derive(Debug, Clone)]
pub(crate) struct Call {
    pub path: Path,
    pub query: BuiltQuery,
}

#[derive(Default)]
struct Recorded {
    calls: Vec<Call>,
    results: VecDeque<Vec<Row>>,
    rows_affected: u64,
    delay: Option<Duration>,
    began: Vec<TxOptions>,
}

/// Records every statement and answers from a queue of canned result sets
#[derive(Clone, Default)]
pub(crate) struct RecordingExecutor {
    inner: Arc<Mutex<Recorded>>,
}

impl RecordingExecutor {
    pub fn push_rows(&self, rows: Vec<Row>) {
        self.inner.lock().unwrap().results.push_back(rows);
    }

    pub fn set_rows_affected(&self, n: u64) {
        self.inner.lock().unwrap().rows_affected = n;
    }

    pub fn set_delay(&self, delay: Duration) {
        self.inner.lock().unwrap().delay = Some(delay);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.inner.lock().unwrap().calls.clone()
    }

    pub fn last_call(&self) -> Call {
        self.calls().pop().expect("no statement was executed")
    }

    pub fn began(&self) -> Vec<TxOptions> {
        self.inner.lock().unwrap().began.clone()
    }

    fn record(&self, path: Path, query: &BuiltQuery) -> (Option<Duration>, Option<Vec<Row>>) {
        let mut inner = self.inner.lock().unwrap();
        inner.calls.push(Call {
            path,
            query: query.clone(),
        });
        let rows = match path {
            Path::Execute => None,
            _ => inner.results.pop_front(),
        };
        (inner.delay, rows)
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn execute(&self, query: &BuiltQuery) -> Result<u64, ExecError> {
        let (delay, _) = self.record(Path::Execute, query);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.inner.lock().unwrap().rows_affected)
    }

    async fn fetch_one(&self, query: &BuiltQuery) -> Result<Row, ExecError> {
        let (delay, rows) = self.record(Path::FetchOne, query);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        rows.and_then(|rows| rows.into_iter().next())
            .ok_or(ExecError::Database(sqlx::Error::RowNotFound))
    }

    async fn fetch_all(&self, query: &BuiltQuery) -> Result<Vec<Row>, ExecError> {
        let (delay, rows) = self.record(Path::FetchAll, query);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(rows.unwrap_or_default())
    }
}

#[async_trait]
impl TransactionSource for RecordingExecutor {
    type Tx = FakeTx;

    async fn begin(&self, options: &TxOptions) -> Result<FakeTx, sqlx::Error> {
        self.inner.lock().unwrap().began.push(*options);
        Ok(FakeTx::new(self.clone()))
    }
}

#[derive(Default)]
struct TxLog {
    outcomes: Vec<&'static str>,
    fail_commit: bool,
}

/// Transaction backend that forwards statements to a recorder and logs
/// commit/rollback
#[derive(Clone)]
pub(crate) struct FakeTx {
    recorder: RecordingExecutor,
    log: Arc<Mutex<TxLog>>,
}

impl FakeTx {
    pub fn new(recorder: RecordingExecutor) -> Self {
        Self {
            recorder,
            log: Arc::default(),
        }
    }

    pub fn fail_commit(&self) {
        self.log.lock().unwrap().fail_commit = true;
    }

    pub fn outcomes(&self) -> Vec<&'static str> {
        self.log.lock().unwrap().outcomes.clone()
    }
}

#[async_trait]
impl TxBackend for FakeTx {
    async fn execute(&mut self, query: &BuiltQuery) -> Result<u64, ExecError> {
        self.recorder.execute(query).await
    }

    async fn fetch_one(&mut self, query: &BuiltQuery) -> Result<Row, ExecError> {
        self.recorder.fetch_one(query).await
    }

    async fn fetch_all(&mut self, query: &BuiltQuery) -> Result<Vec<Row>, ExecError> {
        self.recorder.fetch_all(query).await
    }

    async fn commit(self) -> Result<(), sqlx::Error> {
        let mut log = self.log.lock().unwrap();
        log.outcomes.push("commit");
        if log.fail_commit {
            return Err(sqlx::Error::PoolClosed);
        }
        Ok(())
    }

    async fn rollback(self) -> Result<(), sqlx::Error> {
        self.log.lock().unwrap().outcomes.push("rollback");
        Ok(())
    }
}
