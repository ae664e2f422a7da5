//! Core engine for tget.
//!
//! Spreads a list of download tasks across independent outbound channels
//! (one proxied HTTP client each), runs a bounded worker pool per channel and
//! drives every task through the transfer state machine, reporting progress
//! into a shared aggregator.

pub mod channel;
pub mod config;
pub mod control;
pub mod distribute;
pub mod logging;
pub mod naming;
pub mod orchestrator;
pub mod pool;
pub mod progress;
pub mod storage;
pub mod task;
pub mod transfer;

pub use orchestrator::{Orchestrator, ResultSet, RunOptions, SetupError};
pub use task::{RequestTemplate, Task, TaskId};
pub use transfer::{AbortReason, Outcome, TaskReport, TransferError, TransferOptions};
