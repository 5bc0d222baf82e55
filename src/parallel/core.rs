use super::collector::{CollectorSetup, MapResults};
use super::error::MapError;
use super::job::JobMessage;
use super::producer::{self, ProducerContext};
use super::registry::{self, Role, SessionControl};
use super::worker::{self, MapFn, WorkerContext, WorkerSetup};
use crate::config::EngineConfig;
use crate::logs::LogManager;
use crossbeam::channel::{Receiver, Sender, bounded, unbounded};
use std::path::PathBuf;
use std::sync::Arc;

/// Settings of one `map` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapOptions {
    /// Yield results in input order (`true`) or in arrival order.
    pub order: bool,
    /// Number of worker threads, at least 1.
    pub workers: usize,
    /// Materialize the input and deal it round-robin into this many chunks
    /// before distribution. `None` streams items one at a time.
    pub chunks: Option<usize>,
    /// Keep worker logs after a successful session.
    pub retain_logs: bool,
    /// Give every worker its own log file.
    pub redirect_output: bool,
    /// Log directory for this session instead of the process-wide log root.
    pub log_dir: Option<PathBuf>,
    /// Bound of the job queue; `None` is unbounded.
    pub job_capacity: Option<usize>,
    /// Bound of the result channel; `None` is unbounded.
    pub result_capacity: Option<usize>,
}

impl Default for MapOptions {
    fn default() -> Self {
        Self {
            order: true,
            workers: num_cpus::get(),
            chunks: None,
            retain_logs: false,
            redirect_output: true,
            log_dir: None,
            job_capacity: None,
            result_capacity: None,
        }
    }
}

impl MapOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve loaded configuration into options. Zero values in the
    /// configuration mean "automatic" or "unbounded". An explicit worker
    /// count is taken as is; `thread_percentage` only shapes the automatic one.
    pub fn from_config(config: &EngineConfig) -> Self {
        let nonzero = |value: usize| (value > 0).then_some(value);
        Self {
            order: config.order,
            workers: if config.workers > 0 {
                config.workers
            } else {
                optimal_workers(0, config.thread_percentage)
            },
            chunks: nonzero(config.chunks),
            retain_logs: config.retain_logs,
            redirect_output: config.redirect_output,
            log_dir: config.log_dir.clone(),
            job_capacity: nonzero(config.job_capacity),
            result_capacity: nonzero(config.result_capacity),
        }
    }

    pub fn ordered(mut self, order: bool) -> Self {
        self.order = order;
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn chunks(mut self, chunks: Option<usize>) -> Self {
        self.chunks = chunks;
        self
    }

    pub fn retain_logs(mut self, retain: bool) -> Self {
        self.retain_logs = retain;
        self
    }

    pub fn redirect_output(mut self, redirect: bool) -> Self {
        self.redirect_output = redirect;
        self
    }

    pub fn log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }

    pub fn job_capacity(mut self, capacity: Option<usize>) -> Self {
        self.job_capacity = capacity;
        self
    }

    pub fn result_capacity(mut self, capacity: Option<usize>) -> Self {
        self.result_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<(), MapError> {
        if self.workers == 0 {
            return Err(MapError::InvalidOptions(
                "worker count must be at least 1".to_string(),
            ));
        }
        if self.chunks == Some(0) {
            return Err(MapError::InvalidOptions(
                "chunk count must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Worker count from available cores and configuration limits.
///
/// ```text
/// 1. cores = num_cpus::get()
/// 2. by_percentage = max(1, cores * thread_percentage / 100)
/// 3. max_threads > 0 ? min(max_threads, by_percentage) : by_percentage
/// ```
pub fn optimal_workers(max_threads: usize, thread_percentage: u8) -> usize {
    let available_cores = num_cpus::get();
    let by_percentage = std::cmp::max(1, (available_cores * thread_percentage as usize) / 100);

    if max_threads > 0 {
        std::cmp::min(max_threads, by_percentage)
    } else {
        by_percentage
    }
}

fn channel<M>(capacity: Option<usize>) -> (Sender<M>, Receiver<M>) {
    match capacity {
        Some(capacity) => bounded(capacity),
        None => unbounded(),
    }
}

/// Map `func` over `input` on a pool of worker threads.
///
/// ```rust
/// use parmap::parallel::{map, MapOptions};
///
/// let options = MapOptions::new().workers(2).redirect_output(false);
/// let squares: Vec<u64> = map(|x: u64| Ok(x * x), 0..5, &options)
///     .unwrap()
///     .collect::<Result<_, _>>()
///     .unwrap();
/// assert_eq!(squares, vec![0, 1, 4, 9, 16]);
/// ```
pub fn map<T, R, I, F>(func: F, input: I, options: &MapOptions) -> Result<MapResults<R>, MapError>
where
    T: Send + 'static,
    R: Send + 'static,
    I: IntoIterator<Item = T>,
    I::IntoIter: Send + 'static,
    F: Fn(T) -> anyhow::Result<R> + Send + Sync + 'static,
{
    try_map(
        move |item, _ctx: &WorkerContext| func(item),
        input.into_iter().map(Ok::<T, anyhow::Error>),
        options,
    )
}

/// Like [`map`], handing the same extra arguments to every call.
pub fn map_with_args<T, R, A, I, F>(
    func: F,
    input: I,
    args: A,
    options: &MapOptions,
) -> Result<MapResults<R>, MapError>
where
    T: Send + 'static,
    R: Send + 'static,
    A: Send + Sync + 'static,
    I: IntoIterator<Item = T>,
    I::IntoIter: Send + 'static,
    F: Fn(T, &A) -> anyhow::Result<R> + Send + Sync + 'static,
{
    try_map(
        move |item, _ctx: &WorkerContext| func(item, &args),
        input.into_iter().map(Ok::<T, anyhow::Error>),
        options,
    )
}

/// Like [`map`], giving the function access to its [`WorkerContext`].
pub fn map_with_context<T, R, I, F>(
    func: F,
    input: I,
    options: &MapOptions,
) -> Result<MapResults<R>, MapError>
where
    T: Send + 'static,
    R: Send + 'static,
    I: IntoIterator<Item = T>,
    I::IntoIter: Send + 'static,
    F: Fn(T, &WorkerContext) -> anyhow::Result<R> + Send + Sync + 'static,
{
    try_map(
        func,
        input.into_iter().map(Ok::<T, anyhow::Error>),
        options,
    )
}

/// Map over a fallible input. An `Err` item (or a panic while enumerating)
/// fails the session at that item's position.
pub fn try_map<T, R, I, F>(func: F, input: I, options: &MapOptions) -> Result<MapResults<R>, MapError>
where
    T: Send + 'static,
    R: Send + 'static,
    I: IntoIterator<Item = anyhow::Result<T>>,
    I::IntoIter: Send + 'static,
    F: Fn(T, &WorkerContext) -> anyhow::Result<R> + Send + Sync + 'static,
{
    options.validate()?;

    let control = SessionControl::new();
    registry::register(&control);
    tracing::debug!(
        session = %control.id(),
        workers = options.workers,
        ordered = options.order,
        chunks = ?options.chunks,
        "starting map session"
    );

    let logs = options
        .redirect_output
        .then(|| LogManager::for_session(options.log_dir.as_deref(), control.id()));
    let (job_tx, job_rx) = channel::<JobMessage<T>>(options.job_capacity);
    let (result_tx, result_rx) = channel(options.result_capacity);
    let func: MapFn<T, R> = Arc::new(func);

    // Owns the session from here on: an early return drops it, which cancels
    // whatever was already spawned.
    let results = MapResults::new(CollectorSetup {
        control: Arc::clone(&control),
        result_rx,
        workers: options.workers,
        ordered: options.order,
        logs: logs.clone(),
        retain_logs: options.retain_logs,
    });

    for worker_id in 0..options.workers {
        let setup = WorkerSetup {
            worker_id,
            job_rx: job_rx.clone(),
            result_tx: result_tx.clone(),
            cancel: control.cancel_signal(),
            control: Arc::clone(&control),
            func: Arc::clone(&func),
            logs: logs.clone(),
            ordered: options.order,
        };
        control.spawn(Role::Worker(worker_id), move || worker::run(setup))?;
    }
    drop(job_rx);

    let producer_ctx = ProducerContext {
        job_tx,
        result_tx,
        cancel: control.cancel_signal(),
        workers: options.workers,
        chunks: options.chunks,
    };
    let input = input.into_iter();
    control.spawn(Role::Producer, move || producer::run(input, producer_ctx))?;

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiet() -> MapOptions {
        MapOptions::new().redirect_output(false)
    }

    #[test]
    fn test_options_validation() {
        assert!(quiet().validate().is_ok());
        assert!(matches!(
            quiet().workers(0).validate(),
            Err(MapError::InvalidOptions(_))
        ));
        assert!(matches!(
            quiet().chunks(Some(0)).validate(),
            Err(MapError::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_invalid_options_spawn_nothing() {
        let result = map(|x: u32| Ok(x), 0..3, &quiet().workers(0));
        assert!(result.is_err());
    }

    #[test]
    fn test_optimal_workers() {
        assert!(optimal_workers(0, 75) >= 1);
        assert!(optimal_workers(2, 100) <= 2);
        assert_eq!(optimal_workers(1, 1), 1);
    }

    #[test]
    fn test_from_config_zero_means_auto() {
        let config = EngineConfig {
            workers: 3,
            chunks: 0,
            job_capacity: 16,
            ..EngineConfig::default()
        };
        let options = MapOptions::from_config(&config);
        assert_eq!(options.workers, 3);
        assert_eq!(options.chunks, None);
        assert_eq!(options.job_capacity, Some(16));
        assert_eq!(options.result_capacity, None);
    }

    #[test]
    fn test_from_config_keeps_explicit_workers_above_core_count() {
        let workers = num_cpus::get() * 4 + 1;
        let config = EngineConfig {
            workers,
            thread_percentage: 1,
            ..EngineConfig::default()
        };
        assert_eq!(MapOptions::from_config(&config).workers, workers);
    }

    #[test]
    fn test_from_config_auto_workers_follow_thread_percentage() {
        let config = EngineConfig {
            workers: 0,
            thread_percentage: 50,
            ..EngineConfig::default()
        };
        let options = MapOptions::from_config(&config);
        assert_eq!(options.workers, optimal_workers(0, 50));
        assert!(options.workers >= 1 && options.workers <= num_cpus::get());
    }

    #[test]
    fn test_map_squares_in_order() {
        let results: Vec<u64> = map(|x: u64| Ok(x * x), 0..5, &quiet().workers(2))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(results, vec![0, 1, 4, 9, 16]);
    }

    #[test]
    fn test_map_with_args() {
        let results: Vec<String> = map_with_args(
            |x: u32, prefix: &String| Ok(format!("{prefix}{x}")),
            vec![1, 2, 3],
            "item-".to_string(),
            &quiet().workers(3),
        )
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
        assert_eq!(results, vec!["item-1", "item-2", "item-3"]);
    }

    #[test]
    fn test_map_with_context_sees_worker_ids() {
        let ids: Vec<usize> = map_with_context(
            |_x: u32, ctx: &WorkerContext| Ok(ctx.worker_id()),
            0..20,
            &quiet().workers(4),
        )
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
        assert_eq!(ids.len(), 20);
        assert!(ids.iter().all(|&id| id < 4));
    }

    #[test]
    fn test_empty_input_closes_cleanly() {
        let mut results = map(|x: u8| Ok(x), Vec::<u8>::new(), &quiet().workers(3)).unwrap();
        assert!(results.next().is_none());
        assert_eq!(results.state(), crate::parallel::SessionState::Closed);
    }
}
