//! Core types, configuration, and error handling for the agent mail router.
//!
//! This crate provides:
//! - Configuration management (`Config`, environment parsing)
//! - Data models (`Agent`, `Message`, `Group`, `IssuedKey`, `RoundTable`)
//! - The shared error type and its HTTP/error-code mapping
//! - The process-global lock ordering discipline shared by storage, the DID
//!   cache, and webhook attempt counters

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod lock_order;
pub mod models;

pub use config::{Config, RegistrationPolicy};
pub use error::{Error, Result};
pub use lock_order::{LockLevel, OrderedMutex, OrderedRwLock};
pub use models::*;
