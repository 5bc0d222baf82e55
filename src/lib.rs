//! # parmap - parallel map with ordered results
//!
//! Maps a function over any iterator on a fixed pool of worker threads and
//! returns the results as a lazy iterator, in input order or in arrival order.
//!
//! ## Features
//!
//! - **Ordered or unordered**: reassemble input order or take results as they land
//! - **Streaming or chunked**: push items one by one, or deal the input into chunks up front
//! - **Failure propagation**: the first failing item ends the session with its error
//! - **Per-worker logs**: each worker's tracing output goes to its own file
//! - **Cancellation**: drop the iterator, use a `CancelHandle`, or call `terminate_all`
//!
//! ## Quick Start
//!
//! ```rust
//! use parmap::{map, MapOptions};
//!
//! let options = MapOptions::new().workers(2).redirect_output(false);
//! let results: Vec<i64> = map(|x: i64| Ok(x * x), vec![0, 1, 2, 3, 4], &options)?
//!     .collect::<Result<_, _>>()?;
//! assert_eq!(results, vec![0, 1, 4, 9, 16]);
//! # Ok::<(), parmap::MapError>(())
//! ```

pub mod cli;
pub mod config;
pub mod logs;
pub mod parallel;

pub use config::{EngineConfig, ParmapConfig};
pub use parallel::{
    CancelHandle, ErrorKind, ItemError, MapError, MapOptions, MapResults, SessionState,
    WorkerContext, map, map_with_args, map_with_context, terminate_all, try_map,
};

/// Result type alias for parmap operations
pub type Result<T> = anyhow::Result<T>;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PKG_NAME: &str = env!("CARGO_PKG_NAME");
pub const PKG_DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
