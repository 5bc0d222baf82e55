use super::error::{ErrorKind, ItemError};
use super::job::{Job, JobMessage, Outcome};
use super::producer::send_or_cancel;
use super::registry::SessionControl;
use crate::logs::{LogManager, WorkerLog};
use crossbeam::channel::{Receiver, Sender, select};
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

/// The per-item function as every worker of a session shares it.
pub(crate) type MapFn<T, R> = Arc<dyn Fn(T, &WorkerContext) -> anyhow::Result<R> + Send + Sync>;

/// What a mapped function can see of the worker running it.
#[derive(Debug)]
pub struct WorkerContext {
    worker_id: usize,
    session: Uuid,
    log: Option<WorkerLog>,
}

impl WorkerContext {
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    pub fn session_id(&self) -> Uuid {
        self.session
    }

    /// Log file of this worker, `None` when output is not redirected.
    pub fn log_path(&self) -> Option<&Path> {
        self.log.as_ref().map(WorkerLog::path)
    }

    /// Write one line of output: to this worker's log file when output is
    /// redirected, to stdout otherwise.
    pub fn log(&self, line: &str) -> io::Result<()> {
        match &self.log {
            Some(log) => log.write_line(line),
            None => writeln!(io::stdout().lock(), "{line}"),
        }
    }
}

pub(crate) struct WorkerSetup<T, R> {
    pub worker_id: usize,
    pub job_rx: Receiver<JobMessage<T>>,
    pub result_tx: Sender<Outcome<R>>,
    pub cancel: Receiver<()>,
    pub control: Arc<SessionControl>,
    pub func: MapFn<T, R>,
    pub logs: Option<LogManager>,
    pub ordered: bool,
}

enum Flow {
    Continue,
    Stop,
}

struct Worker<T, R> {
    context: WorkerContext,
    result_tx: Sender<Outcome<R>>,
    cancel: Receiver<()>,
    control: Arc<SessionControl>,
    func: MapFn<T, R>,
    ordered: bool,
}

impl<T, R> Worker<T, R> {
    fn publish(&self, outcome: Outcome<R>) -> bool {
        send_or_cancel(&self.result_tx, &self.cancel, outcome)
    }

    fn process(&self, job: Job<T>) -> Flow {
        if self.control.is_cancelled() {
            return Flow::Stop;
        }
        let index = job.index;
        if self.ordered && index > self.control.cutoff() {
            tracing::trace!(index, "skipping job past failed index");
            return Flow::Continue;
        }

        let func = &self.func;
        let context = &self.context;
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| func(job.argument, context)));

        let error = match outcome {
            Ok(Ok(value)) => {
                return if self.publish(Outcome::Success { index, value }) {
                    Flow::Continue
                } else {
                    Flow::Stop
                };
            }
            Ok(Err(e)) => ItemError::from_anyhow(index, ErrorKind::Item, &e),
            Err(payload) => ItemError::from_panic(index, ErrorKind::Panic, payload),
        };

        tracing::warn!(worker = self.context.worker_id, "{error}");
        if self.ordered {
            self.control.lower_cutoff(index);
        }
        self.publish(Outcome::Failure(error));
        Flow::Stop
    }
}

/// Worker thread body: take jobs until the end-of-stream sentinel, a
/// disconnected queue, cancellation or the first failing item.
pub(crate) fn run<T, R>(setup: WorkerSetup<T, R>) {
    let WorkerSetup {
        worker_id,
        job_rx,
        result_tx,
        cancel,
        control,
        func,
        logs,
        ordered,
    } = setup;

    let log = match logs.map(|manager| manager.open(worker_id)).transpose() {
        Ok(log) => log,
        Err(error) => {
            send_or_cancel(&result_tx, &cancel, Outcome::Fatal { worker_id, error });
            return;
        }
    };

    let worker = Worker {
        context: WorkerContext {
            worker_id,
            session: control.id(),
            log,
        },
        result_tx,
        cancel,
        control,
        func,
        ordered,
    };
    let _capture = worker.context.log.as_ref().map(WorkerLog::capture);

    let mut processed = 0_usize;
    loop {
        let message = select! {
            recv(job_rx) -> message => message,
            recv(worker.cancel) -> _ => return,
        };

        let flow = match message {
            Ok(JobMessage::Single(job)) => {
                processed += 1;
                worker.process(job)
            }
            Ok(JobMessage::Chunk(chunk)) => {
                let mut flow = Flow::Continue;
                for job in chunk {
                    processed += 1;
                    flow = worker.process(job);
                    if matches!(flow, Flow::Stop) {
                        break;
                    }
                }
                flow
            }
            Ok(JobMessage::EndOfStream) | Err(_) => break,
        };

        if matches!(flow, Flow::Stop) {
            break;
        }
    }

    tracing::debug!(worker = worker_id, processed, "worker finished");
    worker.publish(Outcome::EndOfWork { worker_id });
}
