//! # screenlint-orchestrator
//!
//! Job execution for screenlint.
//!
//! This crate provides:
//! - A pure state machine for the job phases
//! - The orchestrator that boots the device, installs the app, runs the exploration
//!   tool and analyzes the captures, with cleanup after every job
//! - A per-device dispatcher that runs submitted jobs one at a time

mod dispatcher;
mod job;
mod state_machine;

pub use dispatcher::JobDispatcher;
pub use job::{JobOrchestrator, JobOutcome};
pub use state_machine::{transition, JobAction, JobEvent, JobPhase};
