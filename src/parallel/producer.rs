use super::error::{ErrorKind, ItemError};
use super::job::{Chunk, Job, JobMessage, Outcome};
use crossbeam::channel::{Receiver, Sender, select};
use std::panic::{self, AssertUnwindSafe};

/// Channels and settings the producer thread runs with.
pub(crate) struct ProducerContext<T, R> {
    pub job_tx: Sender<JobMessage<T>>,
    pub result_tx: Sender<Outcome<R>>,
    pub cancel: Receiver<()>,
    pub workers: usize,
    pub chunks: Option<usize>,
}

/// Send `message` unless the session is cancelled first. Returns false when the
/// message could not be delivered.
pub(crate) fn send_or_cancel<M>(tx: &Sender<M>, cancel: &Receiver<()>, message: M) -> bool {
    select! {
        send(tx, message) -> res => res.is_ok(),
        recv(cancel) -> _ => false,
    }
}

/// Numbers input items and turns enumeration failures into item errors.
/// Stops after the first failure.
pub struct Enumerate<I> {
    input: I,
    next_index: usize,
    failed: bool,
}

impl<I> Enumerate<I> {
    pub fn new(input: I) -> Self {
        Self {
            input,
            next_index: 0,
            failed: false,
        }
    }
}

impl<I, T> Iterator for Enumerate<I>
where
    I: Iterator<Item = anyhow::Result<T>>,
{
    type Item = Result<Job<T>, ItemError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        let index = self.next_index;
        let item = match panic::catch_unwind(AssertUnwindSafe(|| self.input.next())) {
            Ok(item) => item?,
            Err(payload) => {
                self.failed = true;
                return Some(Err(ItemError::from_panic(index, ErrorKind::Input, payload)));
            }
        };

        self.next_index += 1;
        match item {
            Ok(argument) => Some(Ok(Job::new(index, argument))),
            Err(e) => {
                self.failed = true;
                Some(Err(ItemError::from_anyhow(index, ErrorKind::Input, &e)))
            }
        }
    }
}

/// Deal jobs round-robin into `count` chunks.
pub fn split<T>(jobs: impl IntoIterator<Item = Job<T>>, count: usize) -> Vec<Chunk<T>> {
    let count = count.max(1);
    let mut chunks: Vec<Chunk<T>> = (0..count).map(|_| Vec::new()).collect();
    for (position, job) in jobs.into_iter().enumerate() {
        chunks[position % count].push(job);
    }
    chunks
}

/// Producer thread body: push every job once, forward an input failure if
/// enumeration breaks, then push one end-of-stream sentinel per worker.
pub(crate) fn run<I, T, R>(input: I, ctx: ProducerContext<T, R>)
where
    I: Iterator<Item = anyhow::Result<T>>,
{
    let push = |message: JobMessage<T>| send_or_cancel(&ctx.job_tx, &ctx.cancel, message);
    let mut jobs = Enumerate::new(input);
    let mut failure = None;
    let mut pushed = 0;

    match ctx.chunks {
        Some(count) => {
            let mut materialized = Vec::new();
            for job in jobs.by_ref() {
                match job {
                    Ok(job) => materialized.push(job),
                    Err(error) => {
                        failure = Some(error);
                        break;
                    }
                }
            }

            for chunk in split(materialized, count) {
                if chunk.is_empty() {
                    continue;
                }
                pushed += chunk.len();
                if !push(JobMessage::Chunk(chunk)) {
                    return;
                }
            }
        }
        None => {
            for job in jobs {
                match job {
                    Ok(job) => {
                        if !push(JobMessage::Single(job)) {
                            return;
                        }
                        pushed += 1;
                    }
                    Err(error) => {
                        failure = Some(error);
                        break;
                    }
                }
            }
        }
    }

    if let Some(error) = failure {
        tracing::warn!(index = error.index, "input enumeration failed: {}", error.message);
        if !send_or_cancel(&ctx.result_tx, &ctx.cancel, Outcome::Failure(error)) {
            return;
        }
    }

    for _ in 0..ctx.workers {
        if !push(JobMessage::EndOfStream) {
            return;
        }
    }
    tracing::debug!(pushed, "producer finished");
}
