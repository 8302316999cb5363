//! Relay for forum events - forwards new posts and uploaded images to Kafka
//!
//! Uploaded images are moved from the forum's local disk into an
//! S3-compatible bucket, and the forum is handed a public URL in place of
//! the local path.

pub mod app;
pub mod broker;
pub mod config;
pub mod error;
pub mod forwarder;
pub mod models;
pub mod relocator;
pub mod storage;

pub use error::{Error, Result};
