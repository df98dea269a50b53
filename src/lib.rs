//! A live tail of a growing text file.
//!
//! On subscribe, an observer receives the most recent lines of the file as a
//! snapshot, then every line appended afterwards, in batches, as the file is
//! written by another process. Many observers can follow the same file; each
//! has its own bounded queue, so a slow one never holds up the others.
//!
//! # Example
//!
//! ```rust,no_run
//! use log_tail::{TailMessage, TailOptions, tail_file};
//! use tokio_stream::StreamExt;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut observer = tail_file("app.log", TailOptions::default()).await?;
//!
//!     while let Some(message) = observer.next().await {
//!         match message {
//!             TailMessage::Snapshot { lines } | TailMessage::Batch { lines } => {
//!                 for line in lines {
//!                     println!("{}", line);
//!                 }
//!             }
//!             other => eprintln!("{:?}", other),
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod accumulator;
mod config;
mod error;
mod hub;
mod message;
mod observer;
mod registry;
mod runner;
pub mod scanner;
mod session;
mod watcher;

#[cfg(test)]
mod test_helpers;

// Public API exports
pub use config::TailOptions;
pub use error::{Error, Result};
pub use message::TailMessage;
pub use observer::{Observer, ObserverId};
pub use registry::TailRegistry;
pub use scanner::ScanResult;
pub use session::TailSession;
pub use watcher::{ChangeKind, classify};

use std::path::Path;

/// Follows a single file in a session of its own.
///
/// The session lives as long as the returned observer does.
///
/// # Example
///
/// ```rust,no_run
/// use log_tail::{TailOptions, tail_file};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let options = TailOptions::default().with_backlog_size(3);
///     let mut observer = tail_file("app.log", options).await?;
///
///     if let Some(snapshot) = observer.recv().await {
///         println!("{:?}", snapshot);
///     }
///
///     Ok(())
/// }
/// ```
pub async fn tail_file<P: AsRef<Path>>(path: P, options: TailOptions) -> Result<Observer> {
    let (handle, _task) = runner::spawn_session(path.as_ref().to_path_buf(), options, None).await?;
    handle.subscribe().await
}
