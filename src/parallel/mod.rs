//! Parallel map engine
//!
//! Maps a function over an iterator on a fixed pool of worker threads and
//! hands the results back as an ordinary lazy iterator.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────┐  JobMessage   ┌────────────┐   Outcome    ┌─────────────┐
//! │  Producer  │──────────────▶│  Worker 0  │─────────────▶│  Collector  │
//! │            │   job queue   │  Worker 1  │ result chan  │ (MapResults)│
//! │ • indexing │               │  ...       │              │ • reorder   │
//! │ • chunking │               │ • apply fn │              │ • teardown  │
//! │ • sentinels│               │ • logs     │              │ • failures  │
//! └────────────┘               └────────────┘              └─────────────┘
//!        ▲                            ▲                           │
//!        └──────── SessionControl (handles, cancellation) ◀───────┘
//! ```
//!
//! - The **producer** numbers every input item, optionally deals the whole
//!   input round-robin into chunks, and finishes with one end-of-stream
//!   sentinel per worker.
//! - **Workers** apply the function until they see a sentinel, a failure or a
//!   cancellation. A worker stops at its first failing item. Panics inside the
//!   function are caught and reported like errors.
//! - The **collector** is the [`MapResults`] iterator returned to the caller.
//!   It restores input order when asked, joins everything after the last
//!   worker reports in, and sweeps worker logs unless they are retained.
//!
//! On a failure the session is cancelled without joining and worker logs are
//! kept. In ordered mode every result before the failing index is still
//! yielded first.
//!
//! # Cancellation
//!
//! Dropping a [`MapResults`] before it is exhausted cancels its session.
//! [`CancelHandle`] cancels from another thread, and [`terminate_all`] stops
//! every live session in the process, including leaked ones.
//!
//! A function that never returns keeps its thread busy: threads are signalled,
//! not killed.
//!
//! # Example
//!
//! ```rust
//! use parmap::parallel::{map, MapOptions};
//!
//! let options = MapOptions::new()
//!     .workers(4)
//!     .chunks(Some(8))
//!     .ordered(false)
//!     .redirect_output(false);
//!
//! let mut strings: Vec<String> = map(|x: u32| Ok(x.to_string()), 0..1000, &options)
//!     .unwrap()
//!     .collect::<Result<_, _>>()
//!     .unwrap();
//! strings.sort_by_key(|s| s.parse::<u32>().unwrap());
//! assert_eq!(strings.len(), 1000);
//! ```

pub mod collector;
pub mod core;
pub mod error;
pub mod job;
pub mod producer;
pub mod registry;
pub mod worker;

// Re-export main types for easier access
pub use collector::{MapResults, SessionState};
pub use self::core::{MapOptions, map, map_with_args, map_with_context, optimal_workers, try_map};
pub use error::{ErrorKind, ItemError, MapError};
pub use registry::{CancelHandle, active_sessions, terminate_all};
pub use worker::WorkerContext;
