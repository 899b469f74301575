//! Coroutine adapter over a blocking store.
//!
//! Any store operation can be moved off the caller's thread: [`AsyncStore::spawn`]
//! runs a closure against the wrapped store inside a `may` coroutine and hands back a
//! [`StoreTask`] for its result.
//!
//! ```no_run
//! # use quarry::prelude::*;
//! # fn demo(store: quarry::EntityDataStore) -> quarry::Result<()> {
//! let store = quarry::AsyncStore::new(store);
//! let task = store.spawn(|s| s.raw_update("DELETE FROM person", &[]))?;
//! let deleted = task.wait()?;
//! # let _ = deleted;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, TryRecvError};

use crate::error::{QuarryError, Result};

/// Default coroutine stack; SQLite statement preparation needs more than `may`'s default.
pub const DEFAULT_STACK_SIZE: usize = 0x10_0000;

/// Runs operations of a cloneable store on coroutines
#[derive(Debug, Clone)]
pub struct AsyncStore<S> {
    store: S,
    stack_size: usize,
}

impl<S> AsyncStore<S>
where
    S: Clone + Send + 'static,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            stack_size: DEFAULT_STACK_SIZE,
        }
    }

    pub fn with_stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = bytes;
        self
    }

    /// The blocking store underneath
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Starts `operation` on its own coroutine
    ///
    /// # Errors
    ///
    /// Only if the coroutine cannot be spawned; failures of the operation itself
    /// come back through [`StoreTask::wait`].
    pub fn spawn<T, F>(&self, operation: F) -> Result<StoreTask<T>>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> Result<T> + Send + 'static,
    {
        let (tx, rx) = bounded(1);
        let store = self.store.clone();
        let builder = may::coroutine::Builder::new()
            .name("quarry-store".to_string())
            .stack_size(self.stack_size);
        let spawned = may::go!(builder, move || {
            let outcome = operation(&store);
            if let Err(e) = &outcome {
                log::debug!("store task failed: {e}");
            }
            let _ = tx.send(outcome);
        });
        spawned.map_err(|e| QuarryError::Other(format!("failed to spawn store task: {e}")))?;
        Ok(StoreTask { rx })
    }
}

/// Pending result of one spawned store operation
#[derive(Debug)]
pub struct StoreTask<T> {
    rx: Receiver<Result<T>>,
}

impl<T> StoreTask<T> {
    /// Blocks until the operation finishes
    pub fn wait(self) -> Result<T> {
        self.rx.recv().unwrap_or_else(|_| Err(abandoned()))
    }

    /// `None` if the operation is still running after `timeout`
    pub fn wait_timeout(&self, timeout: Duration) -> Option<Result<T>> {
        match self.rx.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) => None,
            Err(RecvTimeoutError::Disconnected) => Some(Err(abandoned())),
        }
    }

    /// The result if it is already there
    pub fn try_take(&self) -> Option<Result<T>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => Some(Err(abandoned())),
        }
    }
}

// the coroutine dropped its sender without answering, i.e. it panicked
fn abandoned() -> QuarryError {
    QuarryError::Other("store task ended without producing a result".to_string())
}
