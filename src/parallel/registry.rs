//! Session ownership of worker threads and the process-wide list of live sessions.
//!
//! Every `map` call creates one [`SessionControl`]. It owns the join handles of
//! the producer and workers it spawned and a broadcast cancellation channel:
//! nothing is ever sent on it, dropping its only sender wakes every thread
//! blocked in a `select!` on the receiving side.
//!
//! The global registry only tracks sessions, never individual threads.
//! [`terminate_all`] is the emergency stop for sessions whose result sequence
//! was leaked without being drained or dropped.

use super::error::MapError;
use crossbeam::channel::{Receiver, Sender, bounded};
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use uuid::Uuid;

static ACTIVE_SESSIONS: LazyLock<Mutex<HashMap<Uuid, Arc<SessionControl>>>> =
    LazyLock::new(|| Mutex::new(HashMap::new()));

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Which part of a session a thread plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Producer,
    Worker(usize),
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Producer => write!(f, "producer"),
            Role::Worker(id) => write!(f, "worker-{id}"),
        }
    }
}

/// A live producer or worker thread owned by a session.
#[derive(Debug)]
pub struct WorkerHandle {
    pub role: Role,
    thread: JoinHandle<()>,
}

/// Per-session control block shared by the collector, the threads it spawned
/// and the global registry.
pub struct SessionControl {
    id: Uuid,
    cancel_tx: Mutex<Option<Sender<()>>>,
    cancel_rx: Receiver<()>,
    cancelled: AtomicBool,
    /// Lowest failing index seen so far in ordered mode.
    cutoff: AtomicUsize,
    handles: Mutex<Vec<WorkerHandle>>,
}

impl fmt::Debug for SessionControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionControl")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .field("live_handles", &self.live_handles())
            .finish()
    }
}

impl SessionControl {
    pub fn new() -> Arc<Self> {
        let (cancel_tx, cancel_rx) = bounded(0);
        Arc::new(Self {
            id: Uuid::new_v4(),
            cancel_tx: Mutex::new(Some(cancel_tx)),
            cancel_rx,
            cancelled: AtomicBool::new(false),
            cutoff: AtomicUsize::new(usize::MAX),
            handles: Mutex::new(Vec::new()),
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Receiver that becomes disconnected once the session is cancelled.
    pub fn cancel_signal(&self) -> Receiver<()> {
        self.cancel_rx.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    pub fn cutoff(&self) -> usize {
        self.cutoff.load(Ordering::Acquire)
    }

    /// Lower the ordered-mode cutoff to `index` if it is below the current one.
    pub fn lower_cutoff(&self, index: usize) {
        self.cutoff.fetch_min(index, Ordering::AcqRel);
    }

    pub fn live_handles(&self) -> usize {
        lock(&self.handles).len()
    }

    /// Spawn a named thread and take ownership of its handle.
    pub fn spawn<F>(&self, role: Role, body: F) -> Result<(), MapError>
    where
        F: FnOnce() + Send + 'static,
    {
        let name = format!("parmap-{}-{}", &self.id.simple().to_string()[..8], role);
        let thread = thread::Builder::new()
            .name(name)
            .spawn(body)
            .map_err(|source| MapError::Spawn {
                role: role.to_string(),
                source,
            })?;

        tracing::debug!(session = %self.id, %role, "spawned");
        lock(&self.handles).push(WorkerHandle { role, thread });
        Ok(())
    }

    /// Wait for every owned thread to exit. Returns how many of them panicked.
    pub fn join_all(&self) -> usize {
        let handles: Vec<WorkerHandle> = lock(&self.handles).drain(..).collect();
        let mut panicked = 0;
        for handle in handles {
            if handle.thread.join().is_err() {
                tracing::warn!(session = %self.id, role = %handle.role, "thread panicked");
                panicked += 1;
            } else {
                tracing::debug!(session = %self.id, role = %handle.role, "joined");
            }
        }
        panicked
    }

    /// Cancel the session without joining: every blocked queue operation wakes
    /// up and the handles are released. A thread still running a user function
    /// exits after that call returns. Returns how many handles were released.
    pub fn terminate(&self) -> usize {
        self.cancelled.store(true, Ordering::Release);
        drop(lock(&self.cancel_tx).take());

        let released = lock(&self.handles).drain(..).count();
        if released > 0 {
            tracing::debug!(session = %self.id, released, "terminated");
        }
        released
    }
}

/// Cloneable handle that cancels one session from anywhere.
#[derive(Debug, Clone)]
pub struct CancelHandle {
    control: Arc<SessionControl>,
}

impl CancelHandle {
    pub(crate) fn new(control: Arc<SessionControl>) -> Self {
        Self { control }
    }

    pub fn session_id(&self) -> Uuid {
        self.control.id()
    }

    pub fn is_cancelled(&self) -> bool {
        self.control.is_cancelled()
    }

    pub fn cancel(&self) {
        self.control.terminate();
        deregister(self.control.id());
    }
}

pub fn register(control: &Arc<SessionControl>) {
    lock(&ACTIVE_SESSIONS).insert(control.id(), Arc::clone(control));
}

pub fn deregister(id: Uuid) {
    lock(&ACTIVE_SESSIONS).remove(&id);
}

pub fn is_active(id: Uuid) -> bool {
    lock(&ACTIVE_SESSIONS).contains_key(&id)
}

/// Ids of every session that has not finished, failed or been cancelled.
pub fn active_sessions() -> Vec<Uuid> {
    lock(&ACTIVE_SESSIONS).keys().copied().collect()
}

/// Cancel every live session in the process and clear the registry.
/// Returns the number of sessions cancelled.
pub fn terminate_all() -> usize {
    let sessions: Vec<Arc<SessionControl>> =
        lock(&ACTIVE_SESSIONS).drain().map(|(_, control)| control).collect();
    for control in &sessions {
        control.terminate();
    }
    if !sessions.is_empty() {
        tracing::info!(sessions = sessions.len(), "terminated all map sessions");
    }
    sessions.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::RecvError;
    use std::time::Duration;

    #[test]
    fn test_join_all_reports_panics() {
        let control = SessionControl::new();
        control.spawn(Role::Worker(0), || {}).unwrap();
        control
            .spawn(Role::Worker(1), || panic!("worker blew up"))
            .unwrap();

        assert_eq!(control.live_handles(), 2);
        assert_eq!(control.join_all(), 1);
        assert_eq!(control.live_handles(), 0);
    }

    #[test]
    fn test_terminate_wakes_blocked_threads() {
        let control = SessionControl::new();
        let signal = control.cancel_signal();
        let (done_tx, done_rx) = bounded(1);

        control
            .spawn(Role::Producer, move || {
                assert_eq!(signal.recv(), Err(RecvError));
                done_tx.send(()).unwrap();
            })
            .unwrap();

        assert!(!control.is_cancelled());
        assert_eq!(control.terminate(), 1);
        assert!(control.is_cancelled());
        assert!(done_rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_cutoff_only_moves_down() {
        let control = SessionControl::new();
        assert_eq!(control.cutoff(), usize::MAX);
        control.lower_cutoff(7);
        control.lower_cutoff(9);
        assert_eq!(control.cutoff(), 7);
        control.lower_cutoff(3);
        assert_eq!(control.cutoff(), 3);
    }

    #[test]
    fn test_cancel_handle_deregisters() {
        let control = SessionControl::new();
        register(&control);
        assert!(is_active(control.id()));

        let handle = CancelHandle::new(Arc::clone(&control));
        handle.cancel();
        assert!(handle.is_cancelled());
        assert!(!is_active(control.id()));
        assert!(!active_sessions().contains(&control.id()));
    }

    #[test]
    fn test_role_names() {
        assert_eq!(Role::Producer.to_string(), "producer");
        assert_eq!(Role::Worker(3).to_string(), "worker-3");
    }
}
