//! Per-path reader/writer lock with writer priority.
//!
//! Lock and unlock arrive as separate remote calls, possibly on different
//! connections, so the lock is not guard-based: holders are counted and
//! every release is an explicit call.
//!
//! - `lock_read` waits while a writer holds the lock or any writer is queued.
//! - `lock_write` queues itself, then waits until there are no readers and
//!   no writer.
//!
//! Waiters park on a [`Notify`]; every state change wakes all of them and
//! each re-checks its condition.

use std::pin::pin;

use dfs_proto::FsError;
use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum LockError {
    #[error("lock wait interrupted")]
    Interrupted,
    #[error("{0} lock is not held")]
    NotHeld(LockMode),
}

impl From<LockError> for FsError {
    fn from(e: LockError) -> Self {
        FsError::IllegalState(e.to_string())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

impl LockMode {
    pub fn from_exclusive(exclusive: bool) -> Self {
        if exclusive {
            LockMode::Exclusive
        } else {
            LockMode::Shared
        }
    }
}

impl std::fmt::Display for LockMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LockMode::Shared => write!(f, "shared"),
            LockMode::Exclusive => write!(f, "exclusive"),
        }
    }
}

/// Counters exposed for monitoring and the replication policy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LockStats {
    pub read_grants: u64,
    pub write_grants: u64,
    pub readers: usize,
    pub writer: bool,
    pub pending_writers: usize,
}

#[derive(Default)]
struct LockState {
    readers: usize,
    writer: bool,
    pending_writers: usize,
    interrupted: bool,
    read_grants: u64,
    write_grants: u64,
}

#[derive(Default)]
pub struct PathLock {
    state: Mutex<LockState>,
    changed: Notify,
}

impl PathLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire shared access.
    pub async fn lock_read(&self) -> Result<(), LockError> {
        loop {
            let mut notified = pin!(self.changed.notified());
            notified.as_mut().enable();
            {
                let mut s = self.state.lock();
                if s.interrupted {
                    return Err(LockError::Interrupted);
                }
                if !s.writer && s.pending_writers == 0 {
                    s.readers += 1;
                    s.read_grants += 1;
                    return Ok(());
                }
            }
            notified.await;
        }
    }

    /// Acquire exclusive access. Queued writers block new readers.
    pub async fn lock_write(&self) -> Result<(), LockError> {
        let mut pending = PendingWriter::enqueue(self);
        loop {
            let mut notified = pin!(self.changed.notified());
            notified.as_mut().enable();
            {
                let mut s = self.state.lock();
                if s.interrupted {
                    return Err(LockError::Interrupted);
                }
                if !s.writer && s.readers == 0 {
                    s.pending_writers -= 1;
                    pending.armed = false;
                    s.writer = true;
                    s.write_grants += 1;
                    return Ok(());
                }
            }
            notified.await;
        }
    }

    pub async fn lock(&self, mode: LockMode) -> Result<(), LockError> {
        match mode {
            LockMode::Shared => self.lock_read().await,
            LockMode::Exclusive => self.lock_write().await,
        }
    }

    pub fn unlock_read(&self) -> Result<(), LockError> {
        {
            let mut s = self.state.lock();
            if s.readers == 0 {
                return Err(LockError::NotHeld(LockMode::Shared));
            }
            s.readers -= 1;
        }
        self.changed.notify_waiters();
        Ok(())
    }

    pub fn unlock_write(&self) -> Result<(), LockError> {
        {
            let mut s = self.state.lock();
            if !s.writer {
                return Err(LockError::NotHeld(LockMode::Exclusive));
            }
            s.writer = false;
        }
        self.changed.notify_waiters();
        Ok(())
    }

    pub fn unlock(&self, mode: LockMode) -> Result<(), LockError> {
        match mode {
            LockMode::Shared => self.unlock_read(),
            LockMode::Exclusive => self.unlock_write(),
        }
    }

    /// Fail every current and future wait with [`LockError::Interrupted`].
    /// Holders keep what they hold and may still unlock.
    pub fn interrupt(&self) {
        self.state.lock().interrupted = true;
        self.changed.notify_waiters();
    }

    pub fn stats(&self) -> LockStats {
        let s = self.state.lock();
        LockStats {
            read_grants: s.read_grants,
            write_grants: s.write_grants,
            readers: s.readers,
            writer: s.writer,
            pending_writers: s.pending_writers,
        }
    }
}

/// Queue entry of a writer that has not been granted yet. Dropping it
/// while armed (interrupted, or the waiting future was abandoned) withdraws
/// the request and wakes the readers it was holding back.
struct PendingWriter<'a> {
    lock: &'a PathLock,
    armed: bool,
}

impl<'a> PendingWriter<'a> {
    fn enqueue(lock: &'a PathLock) -> Self {
        lock.state.lock().pending_writers += 1;
        Self { lock, armed: true }
    }
}

impl Drop for PendingWriter<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.lock.state.lock().pending_writers -= 1;
        self.lock.changed.notify_waiters();
    }
}
