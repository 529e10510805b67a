//! taskboard - task and user management library
//!
//! Two entity stores (tasks, users) persisted to a key-value store, with
//! push-based change notification and an assignment coordinator that keeps
//! each user paired with at most one task.
//!
//! # Core Concepts
//!
//! - **Entity stores**: one collection each, mirrored to storage after every
//!   mutation and published to subscribers
//! - **Assignment**: `task.assignedUserId` and `user.assignedTaskId` always
//!   written together by the [`assign::Coordinator`]
//! - **Session**: login gate for the CLI
//!
//! # Module Organization
//!
//! - `assign`: Assignment coordinator and consistency audit
//! - `board`: Stores and coordinator opened together
//! - `cli`: Command-line interface using clap
//! - `config`: Configuration loading from `taskboard.toml`
//! - `entity`: Shared record trait
//! - `error`: Error types and result aliases
//! - `events`: JSONL event output
//! - `lock`: File locking and atomic writes
//! - `output`: JSON and human output formatting
//! - `session`: Login session
//! - `storage`: Key-value stores and the data directory
//! - `store`: Generic entity store
//! - `task` / `user`: Records, filters and statistics
//! - `watch`: Publish/subscribe over the latest value

pub mod assign;
pub mod board;
pub mod cli;
pub mod config;
pub mod entity;
pub mod error;
pub mod events;
pub mod lock;
pub mod output;
pub mod session;
pub mod storage;
pub mod store;
pub mod task;
pub mod user;
pub mod watch;

pub use assign::{Assignment, AssignmentPolicy, Coordinator, Rejection, Unassignment};
pub use board::Board;
pub use error::{Error, Result};
pub use task::{Task, TaskState};
pub use user::User;
