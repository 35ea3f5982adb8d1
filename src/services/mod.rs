//! Core exam-bank logic: set packing, attempt scoring, progress annotation
//! and bulk ingestion. Everything here talks to storage only through
//! [`crate::store::Store`].

pub mod attempts;
pub mod catalog;
pub mod error;
pub mod ingest;
pub mod locks;
pub mod packer;
pub mod progress;

pub use attempts::AttemptTracker;
pub use error::{AttemptError, IngestError, PackError};
pub use packer::SetPacker;
