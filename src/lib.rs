//! # comic-courier
//!
//! Bounded-concurrency orchestrator for chat bots that fetch a comic by id,
//! package it into one file and upload it back to the chat.
//!
//! The crate owns admission, concurrency, retries and cleanup. Fetching,
//! packaging and the chat platform itself are supplied by the embedding
//! application through the traits in [`collaborators`].
//!
//! ## Flow
//!
//! 1. [`Courier::submit`] checks the request (feature switch, group allow-list,
//!    duplicates, queue capacity) and either starts the job or queues it
//! 2. A worker runs fetch, package and upload; risk-control rejections and
//!    slow uploads are retried with an upload timeout scaled to file size
//! 3. The submitter gets exactly one notification, and the job's working
//!    directory is deleted after a delay
//!
//! ## Quick Start
//!
//! ```no_run
//! use comic_courier::{Config, ContentId, Courier, Origin};
//! # use comic_courier::collaborators::{ContentFetcher, Packager, Transport};
//! # use std::sync::Arc;
//! # async fn example(
//! #     fetcher: Arc<dyn ContentFetcher>,
//! #     packager: Arc<dyn Packager>,
//! #     transport: Arc<dyn Transport>,
//! # ) -> Result<(), Box<dyn std::error::Error>> {
//! let config = Config::from_json_str(r#"{ "admission": { "max_concurrent": 2 } }"#)?;
//! let courier = Courier::new(config, fetcher, packager, transport).await?;
//!
//! let mut events = courier.subscribe();
//! tokio::spawn(async move {
//!     while let Ok(event) = events.recv().await {
//!         println!("Event: {:?}", event);
//!     }
//! });
//!
//! let mut handle = courier
//!     .submit(ContentId::from("350234"), Origin::group("1000", "42"))
//!     .await?;
//! let finished = handle.wait().await;
//! println!("{} finished as {}", handle.content_id(), finished.state);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// Deferred working-directory deletion
pub mod cleanup;
/// Fetcher, packager and transport traits
pub mod collaborators;
/// Configuration types
pub mod config;
/// Orchestrator (decomposed into focused submodules)
pub mod courier;
/// Error types
pub mod error;
/// Job records and handles
pub mod job;
/// Retry logic with backoff
pub mod retry;
/// Adaptive upload timeout
pub mod timeout;
/// Core types and events
pub mod types;
/// Retrying upload executor
pub mod upload;
/// Utility functions
pub mod utils;

// Re-export commonly used types
pub use collaborators::{Ack, Artifact, ContentFetcher, Packager, Transport};
pub use config::Config;
pub use courier::Courier;
pub use error::{
    AdmissionError, CancelError, Error, FetchError, PackageError, Result, TransportError,
    UploadError,
};
pub use job::JobHandle;
pub use types::{
    CancelReceipt, ContentId, Destination, Event, JobId, JobInfo, JobState, JobTimings, Origin,
    Placement, QueueSnapshot,
};

/// Run the courier until a termination signal arrives, then shut it down.
///
/// - **Unix:** SIGTERM or SIGINT; if neither handler can be registered,
///   falls back to `tokio::signal::ctrl_c()`.
/// - **Windows/other:** Ctrl+C.
///
/// # Example
///
/// ```no_run
/// # use comic_courier::{Courier, run_with_shutdown};
/// # async fn example(courier: Courier) -> comic_courier::Result<()> {
/// run_with_shutdown(courier).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_with_shutdown(courier: Courier) -> Result<()> {
    wait_for_signal().await;
    courier.shutdown().await
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{Signal, SignalKind, signal};

    async fn recv_or_pending(sig: &mut Option<Signal>) {
        match sig {
            Some(sig) => {
                sig.recv().await;
            }
            None => std::future::pending::<()>().await,
        }
    }

    // Registration can fail in restricted environments (containers, tests)
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| tracing::warn!(error = %e, "Could not register SIGTERM handler"))
        .ok();
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| tracing::warn!(error = %e, "Could not register SIGINT handler"))
        .ok();

    if sigterm.is_none() && sigint.is_none() {
        tracing::error!("Could not register any signal handlers, using ctrl_c fallback");
        tokio::signal::ctrl_c().await.ok();
        return;
    }

    tokio::select! {
        _ = recv_or_pending(&mut sigterm) => tracing::info!("Received SIGTERM signal"),
        _ = recv_or_pending(&mut sigint) => tracing::info!("Received SIGINT signal (Ctrl+C)"),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C signal");
        return;
    }
    tracing::info!("Received Ctrl+C signal");
}
