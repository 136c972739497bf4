//! This crate exposes the internal functionality of the boxprobe scanner.
//!
//! boxprobe generates random short identifiers and asks a file host whether
//! `base_url + id + extension` exists, for a list of extensions, from a pool
//! of concurrent workers. Every file that is found is written to SQLite and
//! can additionally be posted to a webhook and downloaded.
//!
//! ## Architecture Overview
//!
//! The core scanning behaviour is managed by
//! [`Scanner`](crate::scanner::Scanner), which pulls identifiers from any
//! iterator (normally an [`IdGenerator`](crate::generator::IdGenerator)) and
//! feeds them through a bounded queue to its workers:
//!
//! 1. **Generation**: the dispatch loop enqueues identifiers while running
//! 2. **Probing**: a worker asks a [`Prober`](crate::scanner::prober::Prober)
//!    about every extension, retrying transport failures
//! 3. **Hits**: found files go to the [`sinks`](crate::sinks)
//! 4. **Control**: [`Control`](crate::scanner::control::Control) pauses,
//!    resumes and stops the scan; pausing throws away whatever is queued
//!
//! ## Basic Usage Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use boxprobe::generator::IdGenerator;
//! use boxprobe::scanner::prober::HttpProber;
//! use boxprobe::scanner::retry::RetryPolicy;
//! use boxprobe::scanner::{ScanContext, Scanner};
//! use boxprobe::sinks::SqliteStore;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let base_url = "https://files.catbox.moe/";
//!     let prober = HttpProber::direct(base_url, Duration::from_secs(10))?;
//!     let store = SqliteStore::connect("boxprobe.db").await?;
//!
//!     let context = ScanContext::new(
//!         base_url,
//!         vec![".png".to_owned(), ".mp4".to_owned()],
//!         Arc::new(prober),
//!         Arc::new(store.clone()),
//!     )
//!     .with_retry(RetryPolicy::new(3));
//!
//!     let scanner = Scanner::new(context, 16, IdGenerator::with_length(6));
//!     let control = scanner.control();
//!     tokio::spawn(async move {
//!         tokio::time::sleep(Duration::from_secs(60)).await;
//!         control.stop();
//!     });
//!
//!     let summary = scanner.run().await;
//!     println!("{summary}");
//!     store.close().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Performance Tuning
//!
//! - **Workers**: also the queue capacity, so it bounds memory as well as load
//! - **Timeout**: a slow host ties a worker up for the whole timeout
//! - **Retries**: only transport failures are retried; a miss is a miss
//! - **Proxies**: every probe goes through the next proxy in the list
//!
//! ## Error Handling
//!
//! Bad configuration is reported as a [`ConfigError`](crate::error::ConfigError)
//! before the scan starts. Once it is running nothing is fatal: probe
//! failures are retried and then counted as misses, and sink failures are
//! logged and skipped.
#![allow(clippy::needless_doctest_main)]
#![warn(missing_docs)]
#![doc(html_root_url = "https://docs.rs/boxprobe/0.3.0")]

pub mod command;

pub mod error;

pub mod generator;

pub mod input;

pub mod proxy;

pub mod scanner;

pub mod sinks;

pub mod telemetry;

#[cfg(test)]
mod test_utils;
