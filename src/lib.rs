//! Background ingestion of RSS, Atom and JSON Feed documents into SQLite.
//!
//! A [`scheduler::Scheduler`] decides which feeds are due and drives the
//! [`feed`] fetch cycle, which decodes, normalizes and stores items through
//! the [`storage::FeedStore`] gateway and records each feed's health.

pub mod config;
pub mod feed;
pub mod scheduler;
pub mod storage;
pub mod util;

pub use config::Config;
pub use scheduler::Scheduler;
pub use storage::{Database, FeedStore};
