//! External collaborators
//!
//! The courier never fetches, renders or uploads anything itself. It drives
//! three collaborators through the traits in this module:
//!
//! - [`ContentFetcher`]: downloads the raw pages for a content id
//! - [`Packager`]: turns a directory of pages into one artifact file
//! - [`Transport`]: uploads the artifact and delivers text notifications
//!
//! Boundary types are explicit ([`Ack`], [`TransportError`](crate::error::TransportError))
//! so that failure classification does not depend on a live platform.
//!
//! ## Usage
//!
//! ```no_run
//! use async_trait::async_trait;
//! use comic_courier::collaborators::{Ack, Transport};
//! use comic_courier::error::TransportError;
//! use comic_courier::types::Destination;
//! use std::path::Path;
//! use std::time::Duration;
//!
//! struct StdoutTransport;
//!
//! #[async_trait]
//! impl Transport for StdoutTransport {
//!     async fn send(
//!         &self,
//!         destination: &Destination,
//!         file: &Path,
//!         _timeout: Duration,
//!     ) -> Result<Ack, TransportError> {
//!         println!("upload {} to {}", file.display(), destination);
//!         Ok(Ack::default())
//!     }
//!
//!     async fn notify(&self, destination: &Destination, text: &str) -> Result<(), TransportError> {
//!         println!("{}: {}", destination, text);
//!         Ok(())
//!     }
//! }
//! ```

mod traits;

pub use traits::{Ack, Artifact, ContentFetcher, Packager, Transport};
