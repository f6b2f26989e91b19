//! # screenlint-core
//!
//! Core types for the screenlint UI-quality pipeline.
//!
//! A job explores one Android application on one device, captures screenshot /
//! state-snapshot pairs and runs rule checks over them. This crate holds what every
//! other crate shares:
//!
//! - Persisted entities (jobs, test runs, devices, screenshots, defects)
//! - The error taxonomy
//! - Configuration loaded from `screenlint.toml`
//! - The on-disk directory convention for exploration output
//! - Poll/timeout helpers with an injectable sleeper

pub mod config;
mod error;
pub mod fail_open;
pub mod layout;
pub mod poll;
mod types;

pub use config::ScreenlintConfig;
pub use error::{Result, ScreenlintError};
pub use layout::StorageLayout;
pub use poll::{poll_until, PollOutcome, PollPolicy, RecordingSleeper, Sleeper, TokioSleeper};
pub use types::*;
