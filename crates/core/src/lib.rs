//! Core library for the task tracker
//!
//! This crate contains the task storage logic:
//! - Task records and their canonical on-disk codec
//! - A file-backed store keeping the task list as one JSON array
//! - The service layer used by the HTTP front end

pub mod error;
pub mod task;

pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
