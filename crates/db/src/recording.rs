//! An in-memory stand-in for the real stores, used by gateway and agent
//! tests. It records every acquire, execute, commit, rollback, and release so
//! tests can assert the transaction discipline, and it can be scripted to
//! fail at acquisition or execution.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use freightdesk_core::procedure::{BoundParam, TargetStore};

use crate::store::{ProcedureStore, StoreError, StoreTransaction};

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedCall {
    pub target: TargetStore,
    pub statement: String,
    pub params: Vec<BoundParam>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreCounts {
    pub acquired: usize,
    pub released: usize,
    pub committed: usize,
    pub rolled_back: usize,
}

#[derive(Default)]
struct RecordingState {
    begin_failure: Option<String>,
    execute_failure: Option<String>,
    counts: StoreCounts,
    calls: Vec<RecordedCall>,
}

#[derive(Clone, Default)]
pub struct RecordingStore {
    state: Arc<Mutex<RecordingState>>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every subsequent acquisition fails with the given reason.
    pub fn fail_begin(&self, reason: impl Into<String>) {
        self.state_mut().begin_failure = Some(reason.into());
    }

    /// Every subsequent execution fails with the given reason.
    pub fn fail_execute(&self, reason: impl Into<String>) {
        self.state_mut().execute_failure = Some(reason.into());
    }

    pub fn counts(&self) -> StoreCounts {
        self.state_mut().counts
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.state_mut().calls.clone()
    }

    fn state_mut(&self) -> MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ProcedureStore for RecordingStore {
    async fn begin(&self, target: TargetStore) -> Result<Box<dyn StoreTransaction>, StoreError> {
        let mut state = self.state_mut();
        if let Some(reason) = state.begin_failure.clone() {
            return Err(StoreError::Rejected(reason));
        }
        state.counts.acquired += 1;
        drop(state);

        Ok(Box::new(RecordingTransaction {
            target,
            state: Arc::clone(&self.state),
            finished: false,
        }))
    }
}

struct RecordingTransaction {
    target: TargetStore,
    state: Arc<Mutex<RecordingState>>,
    finished: bool,
}

impl RecordingTransaction {
    fn state_mut(&self) -> MutexGuard<'_, RecordingState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl StoreTransaction for RecordingTransaction {
    async fn execute(&mut self, statement: &str, params: &[BoundParam]) -> Result<(), StoreError> {
        let mut state = self.state_mut();
        if let Some(reason) = state.execute_failure.clone() {
            return Err(StoreError::Rejected(reason));
        }
        state.calls.push(RecordedCall {
            target: self.target,
            statement: statement.to_string(),
            params: params.to_vec(),
        });
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        this.finished = true;
        let mut state = this.state_mut();
        state.counts.committed += 1;
        state.counts.released += 1;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        let mut this = self;
        this.finished = true;
        let mut state = this.state_mut();
        state.counts.rolled_back += 1;
        state.counts.released += 1;
        Ok(())
    }
}

// Dropping an unfinished transaction still releases the connection, the same
// backstop the real store gets from sqlx's rollback-on-drop.
impl Drop for RecordingTransaction {
    fn drop(&mut self) {
        if !self.finished {
            let mut state = self.state_mut();
            state.counts.rolled_back += 1;
            state.counts.released += 1;
        }
    }
}
