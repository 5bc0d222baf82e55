use super::error::{ItemError, MapError};
use super::job::Outcome;
use super::registry::{self, CancelHandle, SessionControl};
use crate::logs::LogManager;
use crossbeam::channel::{Receiver, select};
use std::collections::BTreeMap;
use std::iter::FusedIterator;
use std::sync::Arc;
use uuid::Uuid;

/// Lifecycle of one map session. `Closed` and `Aborted` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    /// Every worker finished and all results were yielded.
    Closed,
    /// A failure, a cancellation or an engine fault ended the session.
    Aborted,
}

/// Lazy, single-pass sequence of mapped values.
///
/// Each call to `next` drains the result channel until a value can be
/// yielded. In ordered mode values arriving ahead of a slower index are held
/// back until the gap closes, so one lagging item can keep arbitrarily many
/// finished results in memory.
///
/// Dropping an unfinished sequence cancels its session.
pub struct MapResults<R> {
    control: Arc<SessionControl>,
    result_rx: Receiver<Outcome<R>>,
    cancel: Receiver<()>,
    workers: usize,
    finished_workers: usize,
    ordered: bool,
    next_index: usize,
    pending: BTreeMap<usize, R>,
    failure: Option<ItemError>,
    logs: Option<LogManager>,
    retain_logs: bool,
    state: SessionState,
    yielded: usize,
}

pub(crate) struct CollectorSetup<R> {
    pub control: Arc<SessionControl>,
    pub result_rx: Receiver<Outcome<R>>,
    pub workers: usize,
    pub ordered: bool,
    pub logs: Option<LogManager>,
    pub retain_logs: bool,
}

impl<R> MapResults<R> {
    pub(crate) fn new(setup: CollectorSetup<R>) -> Self {
        let cancel = setup.control.cancel_signal();
        Self {
            control: setup.control,
            result_rx: setup.result_rx,
            cancel,
            workers: setup.workers,
            finished_workers: 0,
            ordered: setup.ordered,
            next_index: 0,
            pending: BTreeMap::new(),
            failure: None,
            logs: setup.logs,
            retain_logs: setup.retain_logs,
            state: SessionState::Running,
            yielded: 0,
        }
    }

    pub fn session_id(&self) -> Uuid {
        self.control.id()
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Number of out-of-order results currently held back.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Log directory and naming of this session, `None` without redirection.
    pub fn logs(&self) -> Option<&LogManager> {
        self.logs.as_ref()
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle::new(Arc::clone(&self.control))
    }

    /// Stop the session now. Worker logs are kept.
    pub fn cancel(&mut self) {
        if self.state == SessionState::Running {
            self.abort(MapError::Cancelled);
        }
    }

    fn failure_index(&self) -> usize {
        self.failure.as_ref().map_or(usize::MAX, |failure| failure.index)
    }

    /// Keep the failure with the lowest index; drop staged values behind it.
    fn record_failure(&mut self, error: ItemError) {
        if error.index >= self.failure_index() {
            return;
        }
        self.control.lower_cutoff(error.index);
        drop(self.pending.split_off(&error.index));
        self.failure = Some(error);
    }

    fn abort(&mut self, error: MapError) -> MapError {
        self.state = SessionState::Aborted;
        self.control.terminate();
        registry::deregister(self.control.id());
        tracing::warn!(session = %self.control.id(), "map session aborted: {error}");
        error
    }

    fn close(&mut self) {
        self.state = SessionState::Closed;
        let panicked = self.control.join_all();
        registry::deregister(self.control.id());
        if panicked > 0 {
            tracing::warn!(session = %self.control.id(), panicked, "threads panicked during teardown");
        }

        if let Some(logs) = &self.logs
            && !self.retain_logs
        {
            logs.sweep();
        }
        tracing::info!(session = %self.control.id(), results = self.yielded, "map session completed");
    }

    fn finish(&mut self) -> Option<Result<R, MapError>> {
        if let Some(failure) = self.failure.take() {
            return Some(Err(self.abort(MapError::Item(failure))));
        }
        if !self.pending.is_empty() {
            let next_index = self.next_index;
            return Some(Err(self.abort(MapError::Incomplete { next_index })));
        }
        self.close();
        None
    }
}

impl<R> Iterator for MapResults<R> {
    type Item = Result<R, MapError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.state != SessionState::Running {
                return None;
            }

            if self.ordered {
                if let Some(value) = self.pending.remove(&self.next_index) {
                    self.next_index += 1;
                    self.yielded += 1;
                    return Some(Ok(value));
                }
                if self.failure_index() == self.next_index
                    && let Some(failure) = self.failure.take()
                {
                    return Some(Err(self.abort(MapError::Item(failure))));
                }
            }

            if self.finished_workers == self.workers {
                return self.finish();
            }

            let outcome = select! {
                recv(self.result_rx) -> outcome => outcome,
                recv(self.cancel) -> _ => return Some(Err(self.abort(MapError::Cancelled))),
            };

            match outcome {
                Ok(Outcome::Success { index, value }) => {
                    if !self.ordered {
                        self.yielded += 1;
                        return Some(Ok(value));
                    }
                    if index < self.failure_index() {
                        self.pending.insert(index, value);
                    }
                }
                Ok(Outcome::Failure(error)) => {
                    if !self.ordered {
                        return Some(Err(self.abort(MapError::Item(error))));
                    }
                    self.record_failure(error);
                }
                Ok(Outcome::EndOfWork { worker_id }) => {
                    self.finished_workers += 1;
                    tracing::trace!(worker = worker_id, finished = self.finished_workers, "worker done");
                }
                Ok(Outcome::Fatal { worker_id, error }) => {
                    tracing::error!(worker = worker_id, "worker could not start: {error}");
                    return Some(Err(self.abort(error)));
                }
                Err(_) => {
                    let error = if self.control.is_cancelled() {
                        MapError::Cancelled
                    } else {
                        MapError::Disconnected
                    };
                    return Some(Err(self.abort(error)));
                }
            }
        }
    }
}

impl<R> FusedIterator for MapResults<R> {}

impl<R> Drop for MapResults<R> {
    fn drop(&mut self) {
        if self.state == SessionState::Running {
            tracing::debug!(session = %self.control.id(), "result sequence dropped early");
            self.state = SessionState::Aborted;
            self.control.terminate();
            registry::deregister(self.control.id());
        }
    }
}
